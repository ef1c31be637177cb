//! Per-call options and outcomes.

use std::time::Duration;

use freightdesk_core::{QueryParams, RequestOptions};

/// Cache behaviour for a single read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Freshness budget; the client default when unset.
    pub max_age: Option<Duration>,
    /// Stale-while-revalidate window; the client default when unset.
    pub stale_while_revalidate: Option<Duration>,
    /// Cache key override. Derived from url + params when unset.
    pub key: Option<String>,
    /// Bypass the cache for both lookup and store.
    pub skip_cache: bool,
    /// Invalidation tags. Derived from the url path when unset.
    pub tags: Option<Vec<String>>,
}

impl CacheOptions {
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn stale_while_revalidate(mut self, window: Duration) -> Self {
        self.stale_while_revalidate = Some(window);
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }
}

/// Options for [`ApiClient::get`](super::ApiClient::get).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub params: QueryParams,
    pub cache: CacheOptions,
}

impl GetOptions {
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn cache(mut self, cache: CacheOptions) -> Self {
        self.cache = cache;
        self
    }
}

/// Options for mutating requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Headers and query parameters, kept with the item if it gets queued.
    pub request: RequestOptions,
    /// Retry ceiling if the write ends up in the offline queue.
    pub max_retries: Option<u32>,
}

impl WriteOptions {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request = self.request.with_header(name, value);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Result of a mutating request.
///
/// `Queued` means the write was accepted for later delivery, not that it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome<T> {
    Completed(T),
    Queued { id: String },
}

impl<T> WriteOutcome<T> {
    pub fn is_queued(&self) -> bool {
        matches!(self, WriteOutcome::Queued { .. })
    }

    pub fn completed(self) -> Option<T> {
        match self {
            WriteOutcome::Completed(value) => Some(value),
            WriteOutcome::Queued { .. } => None,
        }
    }
}
