//! Shared test doubles.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::api::transport::{HttpTransport, PreparedRequest, RawResponse, TransportError};

/// Plays back a fixed sequence of responses and records every request.
pub(crate) struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    log: Mutex<Vec<PreparedRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(responses: Vec<Result<RawResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            log: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests_to(&self, path_suffix: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.ends_with(path_suffix))
            .count()
    }

    pub(crate) fn total_requests(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
        self.log.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("transport script exhausted")
    }
}

pub(crate) fn ok(body: &str) -> Result<RawResponse, TransportError> {
    status(200, body)
}

pub(crate) fn status(code: u16, body: &str) -> Result<RawResponse, TransportError> {
    Ok(RawResponse {
        status: code,
        content_type: Some("application/json".into()),
        renewed_token: None,
        body: body.into(),
    })
}
