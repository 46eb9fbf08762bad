//! Request construction and outcome classification.
//!
//! One [`RequestExecutor::execute`] call is one physical HTTP attempt.
//! The executor owns header construction, body decoding, and the
//! classification of every result into a [`CallOutcome`] - errors are
//! reserved for conditions the caller cannot act on uniformly, like
//! calling an authenticated endpoint with no stored credential.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::error::ClientError;
use crate::api::transport::{HttpTransport, PreparedRequest, RawResponse};
use crate::auth::CredentialStore;

/// One logical request as callers describe it: a path relative to the
/// API base, a method, an optional JSON body, and whether the endpoint
/// expects a bearer credential.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub path: String,
    pub method: Method,
    pub body: Option<Value>,
    pub requires_auth: bool,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::GET,
            body: None,
            requires_auth: true,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            path: path.into(),
            method: Method::POST,
            body: Some(body),
            requires_auth: true,
        }
    }

    pub fn unauthenticated(mut self) -> Self {
        self.requires_auth = false;
        self
    }
}

/// Every physical attempt resolves to exactly one of these.
#[derive(Debug)]
pub enum CallOutcome {
    /// 2xx. Structured responses are decoded; anything else is wrapped in
    /// a `{"raw": <text>}` envelope so callers always get JSON.
    Ok(Value),
    /// 401. `code` is the backend's structured error code when one was
    /// present in the body; `diagnostic` is the human-readable message.
    Unauthorized {
        code: Option<String>,
        diagnostic: String,
    },
    /// Any other non-2xx status. Never interpreted as a session problem.
    HttpError { status: u16, diagnostic: String },
    /// The request never produced an HTTP status.
    NetworkError(String),
}

pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    store: Arc<CredentialStore>,
    base_url: String,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<CredentialStore>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            store,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Issue a single HTTP attempt.
    ///
    /// Fails fast with [`ClientError::AuthenticationRequired`] when the
    /// endpoint needs a credential and none is stored - no network call
    /// is made in that case.
    pub async fn execute(&self, request: &ApiRequest) -> Result<CallOutcome, ClientError> {
        let authorization = if request.requires_auth {
            match self.store.read() {
                Some(token) => Some(format!("Bearer {}", token)),
                None => return Err(ClientError::AuthenticationRequired),
            }
        } else {
            None
        };

        let prepared = PreparedRequest {
            method: request.method.clone(),
            url: format!("{}{}", self.base_url, request.path),
            authorization,
            body: request.body.clone(),
        };

        let response = match self.transport.send(prepared).await {
            Ok(response) => response,
            Err(e) => {
                debug!(path = %request.path, error = %e, "Request failed before a response");
                return Ok(CallOutcome::NetworkError(e.to_string()));
            }
        };

        // Persist a rotated token before the caller sees the outcome, so
        // their very next call already uses the new value.
        if let Some(ref renewed) = response.renewed_token {
            if let Err(e) = self.store.store(renewed) {
                warn!(error = %e, "Failed to persist rotated token");
            } else {
                debug!("Persisted rotated session token");
            }
        }

        Ok(Self::classify(&request.path, response))
    }

    fn classify(path: &str, response: RawResponse) -> CallOutcome {
        match response.status {
            200..=299 => CallOutcome::Ok(Self::decode_body(path, &response)),
            401 => {
                let (code, diagnostic) = Self::parse_error_body(&response.body);
                debug!(path, code = ?code, "Unauthorized response");
                CallOutcome::Unauthorized { code, diagnostic }
            }
            status => {
                let (_, diagnostic) = Self::parse_error_body(&response.body);
                CallOutcome::HttpError {
                    status,
                    diagnostic: ClientError::truncate_body(&diagnostic),
                }
            }
        }
    }

    /// Decode a success body. Non-JSON (or undeclared) content is wrapped
    /// so callers see a uniform structured shape.
    fn decode_body(path: &str, response: &RawResponse) -> Value {
        if response.is_json() {
            match serde_json::from_str(&response.body) {
                Ok(value) => return value,
                Err(e) => {
                    warn!(path, error = %e, "Declared-JSON body failed to parse, wrapping raw");
                }
            }
        }
        serde_json::json!({ "raw": response.body })
    }

    /// Pull a structured error code and a human-readable message out of an
    /// error body. Backends are not uniform here: some send
    /// `{code, message}`, some `{error}`, some plain text.
    fn parse_error_body(body: &str) -> (Option<String>, String) {
        if let Ok(value) = serde_json::from_str::<Value>(body) {
            let code = value
                .get("code")
                .and_then(Value::as_str)
                .map(str::to_string);
            let message = value
                .get("message")
                .or_else(|| value.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string);
            if code.is_some() || message.is_some() {
                return (code, message.unwrap_or_else(|| body.to_string()));
            }
        }
        (None, body.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::MockHttpTransport;

    fn raw(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status,
            content_type: Some("application/json".into()),
            renewed_token: None,
            body: body.into(),
        }
    }

    fn executor_with(
        transport: MockHttpTransport,
        store: Arc<CredentialStore>,
    ) -> RequestExecutor {
        RequestExecutor::new(Arc::new(transport), store, "https://api.medibook.test")
    }

    #[tokio::test]
    async fn fails_fast_without_credential_and_without_network() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().times(0);

        let executor = executor_with(transport, Arc::new(CredentialStore::in_memory()));
        let result = executor.execute(&ApiRequest::get("/auth/me")).await;
        assert!(matches!(result, Err(ClientError::AuthenticationRequired)));
    }

    #[tokio::test]
    async fn attaches_bearer_header_when_credential_present() {
        let store = Arc::new(CredentialStore::in_memory());
        store.store("T1").unwrap();

        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .withf(|req| {
                req.authorization.as_deref() == Some("Bearer T1")
                    && req.url == "https://api.medibook.test/appointments"
            })
            .times(1)
            .returning(|_| Ok(raw(200, r#"{"success":true}"#)));

        let executor = executor_with(transport, store);
        let outcome = executor
            .execute(&ApiRequest::get("/appointments"))
            .await
            .unwrap();
        assert!(matches!(outcome, CallOutcome::Ok(_)));
    }

    #[tokio::test]
    async fn unauthenticated_requests_carry_no_authorization() {
        let store = Arc::new(CredentialStore::in_memory());
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .withf(|req| req.authorization.is_none())
            .times(1)
            .returning(|_| Ok(raw(200, r#"{"token":"T1"}"#)));

        let executor = executor_with(transport, store);
        let request = ApiRequest::post(
            "/auth/login",
            serde_json::json!({"email":"a@b.com","password":"x"}),
        )
        .unauthenticated();
        executor.execute(&request).await.unwrap();
    }

    #[tokio::test]
    async fn classifies_401_with_structured_code() {
        let store = Arc::new(CredentialStore::in_memory());
        store.store("T1").unwrap();

        let mut transport = MockHttpTransport::new();
        transport.expect_send().returning(|_| {
            Ok(raw(
                401,
                r#"{"code":"TOKEN_EXPIRED","message":"Token expired"}"#,
            ))
        });

        let executor = executor_with(transport, store);
        match executor.execute(&ApiRequest::get("/auth/me")).await.unwrap() {
            CallOutcome::Unauthorized { code, diagnostic } => {
                assert_eq!(code.as_deref(), Some("TOKEN_EXPIRED"));
                assert_eq!(diagnostic, "Token expired");
            }
            other => panic!("expected Unauthorized, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn other_statuses_are_not_session_problems() {
        let store = Arc::new(CredentialStore::in_memory());
        store.store("T1").unwrap();

        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .returning(|_| Ok(raw(503, "service unavailable")));

        let executor = executor_with(transport, store);
        match executor.execute(&ApiRequest::get("/doctors")).await.unwrap() {
            CallOutcome::HttpError { status, .. } => assert_eq!(status, 503),
            other => panic!("expected HttpError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn wraps_non_json_bodies_in_raw_envelope() {
        let store = Arc::new(CredentialStore::in_memory());
        store.store("T1").unwrap();

        let mut transport = MockHttpTransport::new();
        transport.expect_send().returning(|_| {
            Ok(RawResponse {
                status: 200,
                content_type: Some("text/plain".into()),
                renewed_token: None,
                body: "OK".into(),
            })
        });

        let executor = executor_with(transport, store);
        match executor.execute(&ApiRequest::get("/health")).await.unwrap() {
            CallOutcome::Ok(value) => assert_eq!(value["raw"], "OK"),
            other => panic!("expected Ok, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn persists_rotated_token_before_returning() {
        let store = Arc::new(CredentialStore::in_memory());
        store.store("T1").unwrap();

        let mut transport = MockHttpTransport::new();
        transport.expect_send().returning(|_| {
            Ok(RawResponse {
                status: 200,
                content_type: Some("application/json".into()),
                renewed_token: Some("T2".into()),
                body: r#"{"success":true}"#.into(),
            })
        });

        let executor = executor_with(transport, Arc::clone(&store));
        executor
            .execute(&ApiRequest::get("/appointments"))
            .await
            .unwrap();
        assert_eq!(store.read().as_deref(), Some("T2"));
    }
}
