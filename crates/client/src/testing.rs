//! Scripted in-process transport for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use freightdesk_core::Error;
use serde_json::Value;

use crate::transport::{Transport, TransportRequest, TransportResponse};

/// Records every request and answers from a script.
///
/// Scripted responses are consumed in order; once the script runs out the
/// fallback is returned (a 200 with a `null` body unless replaced).
pub(crate) struct MockTransport {
    calls: Mutex<Vec<TransportRequest>>,
    script: Mutex<VecDeque<Result<TransportResponse, Error>>>,
    fallback: Mutex<Result<TransportResponse, Error>>,
    delay: Duration,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(TransportResponse::ok(Value::Null))),
            delay: Duration::ZERO,
        }
    }

    /// Every response waits `delay` (on the tokio clock) before completing.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn push(&self, response: Result<TransportResponse, Error>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub(crate) fn push_ok(&self, body: Value) {
        self.push(Ok(TransportResponse::ok(body)));
    }

    pub(crate) fn always(&self, response: Result<TransportResponse, Error>) {
        *self.fallback.lock().unwrap() = response;
    }

    pub(crate) fn calls(&self) -> Vec<TransportRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, Error> {
        self.calls.lock().unwrap().push(request);
        let response = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        response
    }
}
