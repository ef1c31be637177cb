//! Client code for freightdesk.
//!
//! This crate provides the request orchestrator ([`ApiClient`]), the HTTP
//! transport it sends through, and the hook chain wrapped around every
//! exchange.

pub mod client;
pub mod hooks;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{
    ApiClient, ApiClientBuilder, CacheOptions, GetOptions, TransportReplayer, WriteOptions, WriteOutcome, related_tags,
};
pub use hooks::{RequestHook, StaticHeaders, TracingHook};
pub use transport::{HttpTransport, HttpTransportConfig, Transport, TransportRequest, TransportResponse};
