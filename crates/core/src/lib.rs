//! Core types and shared functionality for freightdesk.
//!
//! This crate provides:
//! - Tag-indexed response cache with stale-while-revalidate support
//! - Request performance counters
//! - Durable offline write queue with retry ceiling
//! - Durable key/value stores (SQLite, in-memory)
//! - Connectivity signal
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod request;
pub mod store;

pub use cache::{CacheStats, CacheStore, EntryOptions, QueryParams};
pub use config::{AppConfig, ConfigError};
pub use connectivity::{Connectivity, ConnectivitySignal};
pub use error::Error;
pub use metrics::{PerformanceMonitor, PerformanceSnapshot};
pub use queue::{OfflineQueue, ProcessReport, QueueConfig, QueueEvent, QueueStatus, QueuedRequest, Replayer};
pub use request::{Method, RequestOptions};
pub use store::{DurableStore, MemoryStore, SqliteStore};
