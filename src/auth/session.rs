//! The session facade: what application code actually calls.
//!
//! Owns the observable authentication state and wires the credential
//! store, the session guard, and the forced-logout broadcaster together.
//! UI surfaces bind to [`Session::watch_state`]; everything else goes
//! through the typed methods.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::error::ClientError;
use crate::api::executor::{ApiRequest, CallOutcome, RequestExecutor};
use crate::api::guard::SessionGuard;
use crate::api::transport::HttpTransport;
use crate::auth::credentials::CredentialStore;
use crate::auth::events::{LogoutBroadcaster, LogoutEvent, Subscription};
use crate::models::{
    extract_list, extract_profile, extract_token, AppointmentSummary, DoctorSummary,
    LoginCredentials, UserProfile,
};

/// Authentication state as the UI sees it. `Unknown` until the stored
/// credential has been checked once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unknown,
    SignedIn,
    SignedOut,
}

/// Hook invoked once per forced logout, after local state is reset.
/// Navigation to the login entry point lives behind this.
pub type NavigationHandler = Arc<dyn Fn(&LogoutEvent) + Send + Sync>;

pub struct Session {
    store: Arc<CredentialStore>,
    executor: Arc<RequestExecutor>,
    guard: SessionGuard,
    state_tx: watch::Sender<AuthState>,
    // Held for the facade's lifetime; dropping it would deregister the
    // forced-logout handler.
    _subscription: Subscription,
}

impl Session {
    /// Production wiring: reqwest transport with the configured timeout,
    /// OS keychain credential storage.
    pub fn from_config(
        config: &crate::config::Config,
        broadcaster: Arc<LogoutBroadcaster>,
    ) -> Result<Self, ClientError> {
        let transport = crate::api::transport::ReqwestTransport::with_timeout(
            config.request_timeout(),
        )
        .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(Self::new(
            config.api_base_url.clone(),
            Arc::new(transport),
            Arc::new(CredentialStore::keyring()),
            broadcaster,
        ))
    }

    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        store: Arc<CredentialStore>,
        broadcaster: Arc<LogoutBroadcaster>,
    ) -> Self {
        Self::build(base_url, transport, store, broadcaster, None)
    }

    /// Like [`Session::new`], with a navigation hook fired exactly once
    /// per forced-logout transition.
    pub fn with_navigation(
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        store: Arc<CredentialStore>,
        broadcaster: Arc<LogoutBroadcaster>,
        navigation: NavigationHandler,
    ) -> Self {
        Self::build(base_url, transport, store, broadcaster, Some(navigation))
    }

    fn build(
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        store: Arc<CredentialStore>,
        broadcaster: Arc<LogoutBroadcaster>,
        navigation: Option<NavigationHandler>,
    ) -> Self {
        let executor = Arc::new(RequestExecutor::new(
            transport,
            Arc::clone(&store),
            base_url,
        ));
        let guard = SessionGuard::new(
            Arc::clone(&executor),
            Arc::clone(&store),
            Arc::clone(&broadcaster),
        );

        let (state_tx, _) = watch::channel(AuthState::Unknown);

        // The facade's one lifetime subscription: flip to signed-out and
        // navigate, but only on an actual transition - repeated events
        // from concurrent terminal failures are no-ops.
        let tx = state_tx.clone();
        let subscription = broadcaster.subscribe(move |event| {
            let flipped = tx.send_if_modified(|state| {
                if *state != AuthState::SignedOut {
                    *state = AuthState::SignedOut;
                    true
                } else {
                    false
                }
            });
            if flipped {
                info!(reason = %event.reason, "Forced logout applied");
                if let Some(ref navigate) = navigation {
                    navigate(event);
                }
            }
        });

        Self {
            store,
            executor,
            guard,
            state_tx,
            _subscription: subscription,
        }
    }

    /// Resolve the initial `Unknown` state from the credential store.
    /// Call once at startup, before rendering anything auth-dependent.
    pub fn restore(&self) -> AuthState {
        let state = if self.store.is_present() {
            AuthState::SignedIn
        } else {
            AuthState::SignedOut
        };
        self.state_tx.send_replace(state);
        debug!(?state, "Restored session state");
        state
    }

    /// Whether a credential is currently stored. No network call.
    pub fn is_authenticated(&self) -> bool {
        self.store.is_present()
    }

    pub fn auth_state(&self) -> AuthState {
        *self.state_tx.borrow()
    }

    /// Receiver for UI binding. The value changes on login, logout,
    /// restore, and forced logout.
    pub fn watch_state(&self) -> watch::Receiver<AuthState> {
        self.state_tx.subscribe()
    }

    /// Calls beyond the session surface go through here so they get the
    /// refresh-and-retry treatment.
    pub fn guard(&self) -> &SessionGuard {
        &self.guard
    }

    /// Authenticate against the backend and persist the returned
    /// credential.
    ///
    /// Goes through the executor directly - there is no credential to
    /// guard yet.
    pub async fn login(
        &self,
        credentials: LoginCredentials,
    ) -> Result<Option<UserProfile>, ClientError> {
        let request = ApiRequest::post(
            "/auth/login",
            json!({ "email": credentials.email, "password": credentials.password }),
        )
        .unauthenticated();

        let payload = match self.executor.execute(&request).await? {
            CallOutcome::Ok(payload) => payload,
            CallOutcome::Unauthorized { diagnostic, .. } => {
                return Err(ClientError::InvalidCredentials(diagnostic));
            }
            CallOutcome::HttpError { status, diagnostic } if (400..=403).contains(&status) => {
                return Err(ClientError::InvalidCredentials(diagnostic));
            }
            CallOutcome::HttpError { status, diagnostic } => {
                return Err(ClientError::from_status(status, &diagnostic));
            }
            CallOutcome::NetworkError(cause) => return Err(ClientError::Network(cause)),
        };

        let Some(token) = extract_token(&payload) else {
            return Err(ClientError::InvalidResponse(
                "login response carried no token".into(),
            ));
        };

        // A token we cannot store is useless even though the backend
        // accepted the login; retry the durable write once before giving
        // up.
        if let Err(first) = self.store.store(&token) {
            warn!(error = %first, "Storing login credential failed, retrying");
            if let Err(second) = self.store.store(&token) {
                // An unstored credential is useless even though the
                // backend accepted the login; roll back the fast path so
                // the session does not look authenticated.
                let _ = self.store.clear();
                return Err(ClientError::SessionPersist(second.to_string()));
            }
        }

        self.state_tx.send_replace(AuthState::SignedIn);
        info!("Login succeeded");
        Ok(extract_profile(&payload))
    }

    /// End the session. The server call is best effort; local logout
    /// always happens, because the user's intent to leave must be
    /// honorable even when the network is not.
    pub async fn logout(&self) {
        if self.store.is_present() {
            let request = ApiRequest::post("/auth/logout", json!({}));
            // Executor, not guard: a 401 here must not spin up refresh
            // machinery or a forced-logout broadcast.
            match self.executor.execute(&request).await {
                Ok(CallOutcome::Ok(_)) => debug!("Server-side logout acknowledged"),
                Ok(outcome) => debug!(?outcome, "Server-side logout not acknowledged"),
                Err(e) => warn!(error = %e, "Server-side logout failed"),
            }
        }

        if let Err(e) = self.store.clear() {
            // The fast path is already empty; only the durable delete can
            // fail, and the user still ends up signed out locally.
            warn!(error = %e, "Durable credential delete failed during logout");
        }
        self.state_tx.send_replace(AuthState::SignedOut);
        info!("Logged out");
    }

    /// Fetch the signed-in user's profile. A failure here is not evidence
    /// of an invalid session and never alters session state by itself -
    /// though the guard's own terminal path still applies underneath.
    pub async fn current_user(&self) -> Result<UserProfile, ClientError> {
        let payload = self
            .guard
            .call(ApiRequest::get("/auth/me"))
            .await
            .map_err(|e| match e {
                ClientError::SessionExpired(_) | ClientError::AuthenticationRequired => e,
                other => ClientError::ProfileFetch(other.to_string()),
            })?;

        extract_profile(&payload)
            .ok_or_else(|| ClientError::ProfileFetch("response carried no user".into()))
    }

    /// The signed-in user's appointments.
    pub async fn fetch_appointments(&self) -> Result<Vec<AppointmentSummary>, ClientError> {
        let payload = self.guard.call(ApiRequest::get("/appointments")).await?;
        Ok(extract_list(&payload, "appointments"))
    }

    /// Doctors available for booking.
    pub async fn fetch_doctors(&self) -> Result<Vec<DoctorSummary>, ClientError> {
        let payload = self.guard.call(ApiRequest::get("/doctors")).await?;
        Ok(extract_list(&payload, "doctors"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::api::transport::TransportError;
    use crate::testutil::{ok, status, ScriptedTransport};

    struct Harness {
        session: Session,
        transport: Arc<ScriptedTransport>,
        store: Arc<CredentialStore>,
        broadcaster: Arc<LogoutBroadcaster>,
        nav_calls: Arc<AtomicUsize>,
    }

    fn harness(responses: Vec<Result<crate::api::transport::RawResponse, TransportError>>) -> Harness {
        let transport = ScriptedTransport::new(responses);
        let store = Arc::new(CredentialStore::in_memory());
        let broadcaster = Arc::new(LogoutBroadcaster::new());
        let nav_calls = Arc::new(AtomicUsize::new(0));

        let n = Arc::clone(&nav_calls);
        let session = Session::with_navigation(
            "https://api.medibook.test",
            Arc::clone(&transport) as Arc<dyn HttpTransport>,
            Arc::clone(&store),
            Arc::clone(&broadcaster),
            Arc::new(move |_| {
                n.fetch_add(1, Ordering::SeqCst);
            }),
        );

        Harness {
            session,
            transport,
            store,
            broadcaster,
            nav_calls,
        }
    }

    #[tokio::test]
    async fn login_persists_token_and_flips_state() {
        let h = harness(vec![ok(
            r#"{"success":true,"data":{"token":"T1","user":{"id":1}}}"#,
        )]);

        let profile = h
            .session
            .login(LoginCredentials::new("a@b.com", "x"))
            .await
            .unwrap();

        assert_eq!(profile.unwrap().id, 1);
        assert_eq!(h.store.read().as_deref(), Some("T1"));
        assert!(h.session.is_authenticated());
        assert_eq!(h.session.auth_state(), AuthState::SignedIn);
    }

    #[tokio::test]
    async fn login_accepts_the_flat_envelope_shape() {
        let h = harness(vec![ok(r#"{"success":true,"token":"T9"}"#)]);
        let profile = h
            .session
            .login(LoginCredentials::new("a@b.com", "x"))
            .await
            .unwrap();
        assert!(profile.is_none());
        assert_eq!(h.store.read().as_deref(), Some("T9"));
    }

    #[tokio::test]
    async fn rejected_login_surfaces_the_backend_message() {
        let h = harness(vec![status(401, r#"{"message":"Wrong email or password"}"#)]);
        let err = h
            .session
            .login(LoginCredentials::new("a@b.com", "bad"))
            .await
            .unwrap_err();
        match err {
            ClientError::InvalidCredentials(message) => {
                assert_eq!(message, "Wrong email or password");
            }
            other => panic!("expected InvalidCredentials, got {:?}", other),
        }
        assert!(!h.session.is_authenticated());
    }

    #[tokio::test]
    async fn login_without_token_in_response_is_invalid() {
        let h = harness(vec![ok(r#"{"success":true}"#)]);
        let err = h
            .session
            .login(LoginCredentials::new("a@b.com", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn unstorable_credential_fails_login_after_one_retry() {
        use crate::auth::credentials::{CredentialError, MockCredentialBackend};

        let mut backend = MockCredentialBackend::new();
        backend.expect_read().returning(|| Ok(None));
        backend
            .expect_write()
            .times(2)
            .returning(|_| Err(CredentialError::StorageError("keychain locked".into())));
        backend.expect_delete().returning(|| Ok(()));

        let transport = ScriptedTransport::new(vec![ok(r#"{"success":true,"token":"T1"}"#)]);
        let store = Arc::new(CredentialStore::new(Box::new(backend)));
        let session = Session::new(
            "https://api.medibook.test",
            transport as Arc<dyn HttpTransport>,
            store,
            Arc::new(LogoutBroadcaster::new()),
        );

        let err = session
            .login(LoginCredentials::new("a@b.com", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::SessionPersist(_)));
        assert_ne!(session.auth_state(), AuthState::SignedIn);
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn logout_succeeds_locally_when_the_server_call_fails() {
        let h = harness(vec![Err(TransportError::Timeout)]);
        h.store.store("T1").unwrap();
        h.session.restore();

        h.session.logout().await;

        assert!(!h.session.is_authenticated());
        assert!(h.store.read().is_none());
        assert_eq!(h.session.auth_state(), AuthState::SignedOut);
        // The server call was attempted exactly once.
        assert_eq!(h.transport.requests_to("/auth/logout"), 1);
    }

    #[tokio::test]
    async fn logout_without_credential_skips_the_server_call() {
        let h = harness(vec![]);
        h.session.logout().await;
        assert_eq!(h.transport.total_requests(), 0);
        assert_eq!(h.session.auth_state(), AuthState::SignedOut);
    }

    #[tokio::test]
    async fn restore_resolves_the_unknown_state() {
        let h = harness(vec![]);
        assert_eq!(h.session.auth_state(), AuthState::Unknown);
        assert_eq!(h.session.restore(), AuthState::SignedOut);

        h.store.store("T1").unwrap();
        assert_eq!(h.session.restore(), AuthState::SignedIn);
    }

    #[tokio::test]
    async fn forced_logout_navigates_exactly_once_per_batch() {
        let h = harness(vec![]);
        h.store.store("T1").unwrap();
        h.session.restore();

        // Several concurrent terminal failures publish independently;
        // the facade handler must collapse them to one transition.
        for _ in 0..3 {
            h.broadcaster
                .publish(LogoutEvent::new("Your session has expired."));
        }

        assert_eq!(h.session.auth_state(), AuthState::SignedOut);
        assert_eq!(h.nav_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn guard_terminal_failure_reaches_the_facade() {
        let h = harness(vec![status(
            401,
            r#"{"code":"TOKEN_MALFORMED","message":"bad signature"}"#,
        )]);
        h.store.store("T1").unwrap();
        h.session.restore();

        let err = h.session.current_user().await.unwrap_err();
        assert!(matches!(err, ClientError::SessionExpired(_)));
        assert_eq!(h.session.auth_state(), AuthState::SignedOut);
        assert!(!h.session.is_authenticated());
        assert_eq!(h.nav_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_terminal_failures_converge_to_one_signed_out_state() {
        // Three in-flight calls hit the same expired credential. The
        // first reaches the terminal path and clears the store; the
        // others fail fast once the credential is gone. However the race
        // resolves, the end state is a single signed-out transition.
        let h = harness(vec![
            status(401, r#"{"code":"TOKEN_MALFORMED","message":"bad signature"}"#),
            status(401, r#"{"code":"TOKEN_MALFORMED","message":"bad signature"}"#),
            status(401, r#"{"code":"TOKEN_MALFORMED","message":"bad signature"}"#),
        ]);
        h.store.store("T1").unwrap();
        h.session.restore();

        let results = futures::future::join_all((0..3).map(|_| h.session.current_user())).await;

        assert!(results.iter().all(|r| r.is_err()));
        assert_eq!(h.session.auth_state(), AuthState::SignedOut);
        assert!(!h.session.is_authenticated());
        assert_eq!(h.nav_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn profile_failures_do_not_alter_session_state() {
        let h = harness(vec![status(503, r#"{"message":"maintenance"}"#)]);
        h.store.store("T1").unwrap();
        h.session.restore();

        let err = h.session.current_user().await.unwrap_err();
        assert!(matches!(err, ClientError::ProfileFetch(_)));
        assert!(h.session.is_authenticated());
        assert_eq!(h.session.auth_state(), AuthState::SignedIn);
        assert_eq!(h.nav_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn current_user_parses_the_me_envelope() {
        let h = harness(vec![ok(
            r#"{"success":true,"data":{"user":{"id":5,"name":"Ana","role":"patient"}}}"#,
        )]);
        h.store.store("T1").unwrap();

        let profile = h.session.current_user().await.unwrap();
        assert_eq!(profile.id, 5);
        assert_eq!(profile.role.as_deref(), Some("patient"));
    }

    #[tokio::test]
    async fn typed_fetches_go_through_the_guard() {
        // Expired on first attempt, refreshed, then served.
        let h = harness(vec![
            status(401, r#"{"message":"Token expired"}"#),
            ok(r#"{"token":"T2"}"#),
            ok(r#"{"success":true,"data":[{"id":1,"status":"confirmed"}]}"#),
        ]);
        h.store.store("T1").unwrap();

        let appointments = h.session.fetch_appointments().await.unwrap();
        assert_eq!(appointments.len(), 1);
        assert_eq!(h.store.read().as_deref(), Some("T2"));
    }
}
