//! HTTP exchange abstraction.
//!
//! The orchestrator never talks to the network directly; it hands a
//! [`TransportRequest`] to a [`Transport`] and interprets the outcome.
//!
//! ### Contract
//! - Conditional requests carry the cached revision in `if_none_match`.
//! - A "not modified" answer is reported as [`TransportResponse::NotModified`],
//!   never as an error.
//! - Non-success statuses, timeouts and connection failures surface as
//!   [`freightdesk_core::Error`] transport variants.

pub mod endpoint;
pub mod http;

use std::collections::BTreeMap;

use freightdesk_core::{Error, Method, QueryParams};
use serde_json::Value;

pub use endpoint::{UrlError, parse_base, resolve};
pub use http::{HttpTransport, HttpTransportConfig};

/// A request ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    /// Path relative to the transport's base URL, or an absolute URL.
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub params: QueryParams,
    pub body: Option<Value>,
    /// Revision validator for a conditional fetch.
    pub if_none_match: Option<String>,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            params: QueryParams::new(),
            body: None,
            if_none_match: None,
        }
    }

    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    pub fn with_revision(mut self, revision: Option<String>) -> Self {
        self.if_none_match = revision;
        self
    }
}

/// Outcome of a completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportResponse {
    /// 2xx with a decoded JSON body (`Value::Null` when empty).
    Success {
        status: u16,
        headers: BTreeMap<String, String>,
        body: Value,
        /// Validator for later conditional fetches (e.g. the ETag).
        revision: Option<String>,
    },
    /// The conditional fetch matched the supplied revision.
    NotModified,
}

impl TransportResponse {
    /// Plain 200 response with no revision.
    pub fn ok(body: Value) -> Self {
        TransportResponse::Success { status: 200, headers: BTreeMap::new(), body, revision: None }
    }

    pub fn status(&self) -> u16 {
        match self {
            TransportResponse::Success { status, .. } => *status,
            TransportResponse::NotModified => 304,
        }
    }
}

/// Performs one HTTP exchange.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, Error>;
}
