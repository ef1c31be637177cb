//! Request/response hooks.
//!
//! Hooks run around every network exchange the client makes, including
//! background refreshes and offline replays. `before` may edit the outgoing
//! request; `after` only observes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use freightdesk_core::Error;

use crate::transport::{TransportRequest, TransportResponse};

pub trait RequestHook: Send + Sync {
    fn before(&self, _request: &mut TransportRequest) {}

    fn after(&self, _request: &TransportRequest, _outcome: Result<&TransportResponse, &Error>, _elapsed: Duration) {}
}

/// Adds fixed headers to every request, without overriding per-request ones.
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders {
    headers: BTreeMap<String, String>,
}

impl StaticHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

impl RequestHook for StaticHeaders {
    fn before(&self, request: &mut TransportRequest) {
        for (name, value) in &self.headers {
            request.headers.entry(name.clone()).or_insert_with(|| value.clone());
        }
    }
}

/// Logs each exchange at debug level, failures at warn.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHook;

impl RequestHook for TracingHook {
    fn after(&self, request: &TransportRequest, outcome: Result<&TransportResponse, &Error>, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        match outcome {
            Ok(response) => tracing::debug!(
                method = %request.method,
                url = %request.url,
                status = response.status(),
                elapsed_ms,
                "request completed"
            ),
            Err(e) => tracing::warn!(
                method = %request.method,
                url = %request.url,
                elapsed_ms,
                error = %e,
                "request failed"
            ),
        }
    }
}

/// Run `before` hooks in registration order.
pub(crate) fn run_before(hooks: &[Arc<dyn RequestHook>], request: &mut TransportRequest) {
    for hook in hooks {
        hook.before(request);
    }
}

/// Run `after` hooks in registration order.
pub(crate) fn run_after(
    hooks: &[Arc<dyn RequestHook>], request: &TransportRequest, outcome: Result<&TransportResponse, &Error>,
    elapsed: Duration,
) {
    for hook in hooks {
        hook.after(request, outcome, elapsed);
    }
}
