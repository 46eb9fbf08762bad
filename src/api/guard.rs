//! The refresh-and-retry layer around the request executor.
//!
//! Every authenticated call in the crate goes through
//! [`SessionGuard::call`]. A 401 whose diagnostic is expiry-shaped gets
//! one refresh-and-retry cycle; any other 401, a failed refresh, or a
//! second 401 after the retry is terminal: the credential is cleared, a
//! forced logout is broadcast, and the caller sees
//! [`ClientError::SessionExpired`]. Network and non-401 HTTP failures
//! bypass all of this and surface unchanged - they are not session
//! problems.
//!
//! Concurrent logical calls refresh independently. The refresh endpoint is
//! idempotent server-side, so duplicate refreshes are tolerated instead of
//! coalesced behind a cross-call lock; what matters is that each logical
//! call retries at most once.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::api::error::ClientError;
use crate::api::executor::{ApiRequest, CallOutcome, RequestExecutor};
use crate::auth::{CredentialStore, LogoutBroadcaster, LogoutEvent};
use crate::models::extract_token;

/// Structured error codes the backend uses for an expired credential.
/// This is the primary contract for refresh eligibility.
const EXPIRY_CODES: &[&str] = &["TOKEN_EXPIRED", "SESSION_EXPIRED", "JWT_EXPIRED"];

/// Fallback markers for backends that only return prose. Matched
/// case-insensitively against the diagnostic text.
const EXPIRY_MARKERS: &[&str] = &["expired", "invalid token", "jwt"];

/// Message shown to the user when a forced logout happens.
const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please sign in again.";

pub struct SessionGuard {
    executor: Arc<RequestExecutor>,
    store: Arc<CredentialStore>,
    broadcaster: Arc<LogoutBroadcaster>,
}

impl SessionGuard {
    pub fn new(
        executor: Arc<RequestExecutor>,
        store: Arc<CredentialStore>,
        broadcaster: Arc<LogoutBroadcaster>,
    ) -> Self {
        Self {
            executor,
            store,
            broadcaster,
        }
    }

    /// Run one logical call: at most two physical attempts, at most one
    /// refresh.
    pub async fn call(&self, request: ApiRequest) -> Result<serde_json::Value, ClientError> {
        match self.executor.execute(&request).await? {
            CallOutcome::Ok(payload) => Ok(payload),
            CallOutcome::HttpError { status, diagnostic } => {
                Err(ClientError::from_status(status, &diagnostic))
            }
            CallOutcome::NetworkError(cause) => Err(ClientError::Network(cause)),
            CallOutcome::Unauthorized { code, diagnostic } => {
                if !is_expiry_shaped(code.as_deref(), &diagnostic) {
                    debug!(code = ?code, "401 not expiry-shaped, not attempting refresh");
                    return Err(self.terminate(&diagnostic));
                }
                if !self.try_refresh().await {
                    return Err(self.terminate(&diagnostic));
                }
                self.retry(&request).await
            }
        }
    }

    /// The single permitted replay after a successful refresh. A second
    /// 401 here is always terminal - never another refresh.
    async fn retry(&self, request: &ApiRequest) -> Result<serde_json::Value, ClientError> {
        debug!(path = %request.path, "Replaying call with refreshed credential");
        match self.executor.execute(request).await? {
            CallOutcome::Ok(payload) => Ok(payload),
            CallOutcome::HttpError { status, diagnostic } => {
                Err(ClientError::from_status(status, &diagnostic))
            }
            CallOutcome::NetworkError(cause) => Err(ClientError::Network(cause)),
            CallOutcome::Unauthorized { diagnostic, .. } => {
                warn!("Still unauthorized after refresh, forcing logout");
                Err(self.terminate(&diagnostic))
            }
        }
    }

    /// Exchange the current credential for a fresh one. Returns false on
    /// any failure; the caller decides that the session is over.
    async fn try_refresh(&self) -> bool {
        let Some(current) = self.store.read() else {
            debug!("No credential left to refresh");
            return false;
        };

        let request =
            ApiRequest::post("/auth/refresh-token", json!({ "token": current })).unauthenticated();

        let outcome = match self.executor.execute(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Refresh call could not be issued");
                return false;
            }
        };

        let payload = match outcome {
            CallOutcome::Ok(payload) => payload,
            CallOutcome::Unauthorized { diagnostic, .. } => {
                debug!(diagnostic = %diagnostic, "Refresh rejected");
                return false;
            }
            CallOutcome::HttpError { status, .. } => {
                debug!(status, "Refresh failed");
                return false;
            }
            CallOutcome::NetworkError(cause) => {
                warn!(cause = %cause, "Refresh failed with network error");
                return false;
            }
        };

        let Some(token) = extract_token(&payload) else {
            warn!("Refresh response carried no token");
            return false;
        };

        match self.store.store(&token) {
            Ok(()) => {
                info!("Session credential refreshed");
                true
            }
            Err(e) => {
                // A refreshed token we cannot store is useless; the retry
                // would replay the stale one and fail again.
                warn!(error = %e, "Failed to store refreshed credential");
                false
            }
        }
    }

    /// The terminal path: clear the credential, broadcast the forced
    /// logout, hand the caller a `SessionExpired`.
    fn terminate(&self, diagnostic: &str) -> ClientError {
        info!(diagnostic = %diagnostic, "Session is unrecoverable, logging out");
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear credential during forced logout");
        }
        self.broadcaster
            .publish(LogoutEvent::new(SESSION_EXPIRED_MESSAGE));
        ClientError::SessionExpired(diagnostic.to_string())
    }
}

/// Whether a 401 looks like credential expiry (refreshable), as opposed to
/// credential absence or malformed input (not refreshable).
fn is_expiry_shaped(code: Option<&str>, diagnostic: &str) -> bool {
    if let Some(code) = code {
        return EXPIRY_CODES.contains(&code);
    }
    let lowered = diagnostic.to_lowercase();
    EXPIRY_MARKERS.iter().any(|marker| lowered.contains(marker))
}
