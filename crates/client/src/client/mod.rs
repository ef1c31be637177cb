//! Cache-aware, deduplicated, offline-tolerant API client.
//!
//! ### Reads
//! 1. Key the request by url + params (or an explicit override key).
//! 2. A cache hit returns immediately and counts as a zero-latency hit. A
//!    stale hit inside its revalidation window also spawns a detached refresh.
//! 3. A miss joins an identical in-flight request if there is one; otherwise
//!    it sends the request, stores the body and counts as a miss.
//!
//! Conditional refetches attach the stored revision. A "not modified" answer
//! serves the cached body and counts as a hit.
//!
//! ### Writes
//! Related cache entries are invalidated first. While offline the write goes
//! to the [`OfflineQueue`] and the caller gets [`WriteOutcome::Queued`]; a
//! transport failure that coincides with losing connectivity is queued too.

pub mod invalidation;
pub mod options;
pub mod replay;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use freightdesk_core::cache::{compute_cache_key, request_key};
use freightdesk_core::{
    AppConfig, CacheStats, CacheStore, EntryOptions, Error, Method, OfflineQueue, PerformanceMonitor,
    PerformanceSnapshot, ProcessReport, QueryParams, QueueEvent, QueueStatus, Replayer,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::hooks::{RequestHook, run_after, run_before};
use crate::transport::{Transport, TransportRequest, TransportResponse};

pub use invalidation::related_tags;
pub use options::{CacheOptions, GetOptions, WriteOptions, WriteOutcome};
pub use replay::TransportReplayer;

const DEFAULT_CACHE_CAPACITY: usize = 100;
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(5 * 60);

/// Body of a completed read plus whether it came from revalidation.
#[derive(Debug, Clone)]
struct FetchOutcome {
    data: Value,
    /// Served from cache after a "not modified" answer.
    revalidated: bool,
}

type SharedResult = Result<FetchOutcome, Error>;

/// Everything needed to perform, store and share one read.
#[derive(Debug, Clone)]
struct ReadPlan {
    url: String,
    params: QueryParams,
    cache_key: String,
    dedup_key: String,
    /// `None` when the cache is bypassed.
    entry: Option<EntryOptions>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    cache: CacheStore<Value>,
    metrics: PerformanceMonitor,
    queue: Arc<OfflineQueue>,
    hooks: Vec<Arc<dyn RequestHook>>,
    replayer: Arc<dyn Replayer>,
    inflight: Mutex<HashMap<String, broadcast::Sender<SharedResult>>>,
    default_max_age: Duration,
    default_stale_window: Option<Duration>,
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    transport: Arc<dyn Transport>,
    queue: Arc<OfflineQueue>,
    cache_capacity: usize,
    default_max_age: Duration,
    default_stale_window: Option<Duration>,
    hooks: Vec<Arc<dyn RequestHook>>,
}

impl ApiClientBuilder {
    /// Apply cache sizing and freshness defaults from config.
    pub fn from_config(mut self, config: &AppConfig) -> Self {
        self.cache_capacity = config.cache_capacity;
        self.default_max_age = config.default_max_age();
        self.default_stale_window = config.default_stale_window();
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn default_max_age(mut self, max_age: Duration) -> Self {
        self.default_max_age = max_age;
        self
    }

    pub fn default_stale_window(mut self, window: Option<Duration>) -> Self {
        self.default_stale_window = window;
        self
    }

    /// Append a hook. Hooks run in the order they were added.
    pub fn hook(mut self, hook: impl RequestHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn build(self) -> ApiClient {
        let replayer = Arc::new(TransportReplayer::new(Arc::clone(&self.transport), self.hooks.clone()));
        ApiClient {
            inner: Arc::new(Inner {
                transport: self.transport,
                cache: CacheStore::new(self.cache_capacity),
                metrics: PerformanceMonitor::new(),
                queue: self.queue,
                hooks: self.hooks,
                replayer,
                inflight: Mutex::new(HashMap::new()),
                default_max_age: self.default_max_age,
                default_stale_window: self.default_stale_window,
            }),
        }
    }
}

/// Shared handle to the client. Clones share cache, metrics and queue.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    pub fn builder(transport: Arc<dyn Transport>, queue: Arc<OfflineQueue>) -> ApiClientBuilder {
        ApiClientBuilder {
            transport,
            queue,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            default_max_age: DEFAULT_MAX_AGE,
            default_stale_window: None,
            hooks: Vec::new(),
        }
    }

    /// Read `url`, decoding the body as `T`.
    pub async fn get<T: DeserializeOwned>(&self, url: &str, options: GetOptions) -> Result<T, Error> {
        let value = self.get_value(url, options).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Read `url` as raw JSON.
    pub async fn get_value(&self, url: &str, options: GetOptions) -> Result<Value, Error> {
        let start = Instant::now();
        let plan = self.plan_read(url, &options)?;

        if let Some(entry) = &plan.entry
            && let Some(hit) = self.inner.cache.get(&plan.cache_key).await
        {
            self.inner.metrics.record_request(Duration::ZERO, true);
            tracing::debug!(key = %plan.cache_key, stale = hit.is_stale, "cache hit");
            if hit.is_stale && entry.stale_after.is_some() {
                self.spawn_refresh(plan);
            }
            return Ok(hit.data);
        }

        let outcome = self.load(plan).await?;
        self.inner.metrics.record_request(start.elapsed(), outcome.revalidated);
        Ok(outcome.data)
    }

    /// Warm the cache for `url` unless a fresh entry exists. Not counted in metrics.
    pub async fn prefetch(&self, url: &str, options: GetOptions) -> Result<(), Error> {
        let plan = self.plan_read(url, &options)?;
        if plan.entry.is_some()
            && let Some(hit) = self.inner.cache.get(&plan.cache_key).await
            && !hit.is_stale
        {
            return Ok(());
        }
        self.load(plan).await.map(|_| ())
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self, url: &str, body: &B, options: WriteOptions,
    ) -> Result<WriteOutcome<T>, Error> {
        let body = serde_json::to_value(body)?;
        self.send(Method::Post, url, Some(body), options).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self, url: &str, body: &B, options: WriteOptions,
    ) -> Result<WriteOutcome<T>, Error> {
        let body = serde_json::to_value(body)?;
        self.send(Method::Put, url, Some(body), options).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self, url: &str, body: &B, options: WriteOptions,
    ) -> Result<WriteOutcome<T>, Error> {
        let body = serde_json::to_value(body)?;
        self.send(Method::Patch, url, Some(body), options).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, url: &str, options: WriteOptions) -> Result<WriteOutcome<T>, Error> {
        self.send(Method::Delete, url, None, options).await
    }

    /// Issue a mutating request, queueing it when offline.
    pub async fn send<T: DeserializeOwned>(
        &self, method: Method, url: &str, body: Option<Value>, options: WriteOptions,
    ) -> Result<WriteOutcome<T>, Error> {
        if !method.is_mutating() {
            return Err(Error::InvalidInput(format!("{} is not a write method", method)));
        }
        if url.trim().is_empty() {
            return Err(Error::InvalidInput("url must not be empty".into()));
        }

        self.invalidate_related(url).await;

        if !self.inner.queue.is_online() {
            return self.defer(method, url, body, options).await;
        }

        let request = TransportRequest::new(method, url)
            .with_headers(options.request.headers.clone())
            .with_params(options.request.params.clone())
            .with_body(body.clone());

        match exchange(self.inner.transport.as_ref(), &self.inner.hooks, request).await {
            Ok(TransportResponse::Success { body, .. }) => Ok(WriteOutcome::Completed(serde_json::from_value(body)?)),
            Ok(TransportResponse::NotModified) => Ok(WriteOutcome::Completed(serde_json::from_value(Value::Null)?)),
            Err(e) if e.is_transport() && !self.inner.queue.is_online() => {
                tracing::info!(method = %method, url = %url, error = %e, "write failed after going offline");
                self.defer(method, url, body, options).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats().await
    }

    pub fn performance_snapshot(&self) -> PerformanceSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.inner.metrics.reset();
    }

    pub async fn offline_status(&self) -> QueueStatus {
        self.inner.queue.status().await
    }

    pub async fn clear_cache(&self) {
        self.inner.cache.clear().await;
        tracing::debug!("cache cleared");
    }

    pub async fn invalidate_tag(&self, tag: &str) -> usize {
        let removed = self.inner.cache.invalidate_tag(tag).await;
        tracing::debug!(tag, removed, "invalidated cache tag");
        removed
    }

    pub async fn purge_expired(&self) -> usize {
        self.inner.cache.purge_expired().await
    }

    /// Run one replay pass over the offline queue.
    pub async fn flush_offline_queue(&self) -> Result<ProcessReport, Error> {
        self.inner.queue.process(self.inner.replayer.as_ref()).await
    }

    /// Subscribe to offline queue lifecycle events.
    pub fn queue_events(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.queue.subscribe()
    }

    /// Replay the offline queue whenever connectivity comes back.
    pub fn spawn_auto_replay(&self) -> JoinHandle<()> {
        self.inner.queue.spawn_auto_replay(Arc::clone(&self.inner.replayer))
    }

    fn plan_read(&self, url: &str, options: &GetOptions) -> Result<ReadPlan, Error> {
        if url.trim().is_empty() {
            return Err(Error::InvalidInput("url must not be empty".into()));
        }

        let cache = &options.cache;
        let cache_key = cache
            .key
            .clone()
            .unwrap_or_else(|| compute_cache_key(url, &options.params));

        let entry = (!cache.skip_cache).then(|| {
            let tags = cache.tags.clone().unwrap_or_else(|| related_tags(url));
            EntryOptions::new(cache.max_age.unwrap_or(self.inner.default_max_age))
                .with_stale_after(cache.stale_while_revalidate.or(self.inner.default_stale_window))
                .with_tags(tags)
        });

        Ok(ReadPlan {
            url: url.to_string(),
            params: options.params.clone(),
            cache_key,
            dedup_key: request_key(Method::Get.as_str(), url, &options.params),
            entry,
        })
    }

    /// Perform `plan`, sharing the result with identical concurrent reads.
    ///
    /// The exchange runs on its own task, so it completes (and stores its
    /// result) even if every caller stops waiting.
    async fn load(&self, plan: ReadPlan) -> SharedResult {
        let mut rx = {
            let mut inflight = self.inflight();
            if let Some(tx) = inflight.get(&plan.dedup_key) {
                tracing::debug!(key = %plan.dedup_key, "joining in-flight request");
                tx.subscribe()
            } else {
                let (tx, rx) = broadcast::channel(1);
                inflight.insert(plan.dedup_key.clone(), tx.clone());
                tracing::debug!(key = %plan.cache_key, "cache miss");

                let guard = InflightGuard { client: self.clone(), key: plan.dedup_key.clone(), tx: Some(tx) };
                let client = self.clone();
                tokio::spawn(async move {
                    let result = client.fetch_and_store(&plan).await;
                    guard.complete(result);
                });
                rx
            }
        };

        rx.recv()
            .await
            .map_err(|_| Error::Network("in-flight request ended without a result".into()))?
    }

    async fn fetch_and_store(&self, plan: &ReadPlan) -> SharedResult {
        let revision = match &plan.entry {
            Some(_) => self.inner.cache.revision(&plan.cache_key).await,
            None => None,
        };
        let conditional = revision.is_some();

        match self.fetch(plan, revision).await? {
            TransportResponse::NotModified if conditional => {
                if let Some(hit) = self.inner.cache.get(&plan.cache_key).await {
                    tracing::debug!(key = %plan.cache_key, "not modified, serving cached body");
                    return Ok(FetchOutcome { data: hit.data, revalidated: true });
                }
                tracing::debug!(key = %plan.cache_key, "entry gone after not modified, refetching");
                match self.fetch(plan, None).await? {
                    TransportResponse::Success { body, revision, .. } => Ok(self.store(plan, body, revision).await),
                    TransportResponse::NotModified => Err(unexpected_not_modified()),
                }
            }
            TransportResponse::NotModified => Err(unexpected_not_modified()),
            TransportResponse::Success { body, revision, .. } => Ok(self.store(plan, body, revision).await),
        }
    }

    async fn fetch(&self, plan: &ReadPlan, revision: Option<String>) -> Result<TransportResponse, Error> {
        let request = TransportRequest::new(Method::Get, plan.url.clone())
            .with_params(plan.params.clone())
            .with_revision(revision);
        exchange(self.inner.transport.as_ref(), &self.inner.hooks, request).await
    }

    async fn store(&self, plan: &ReadPlan, body: Value, revision: Option<String>) -> FetchOutcome {
        if let Some(entry) = &plan.entry {
            let entry = entry.clone().with_revision(revision);
            self.inner.cache.set(&plan.cache_key, body.clone(), entry).await;
        }
        FetchOutcome { data: body, revalidated: false }
    }

    fn spawn_refresh(&self, plan: ReadPlan) {
        let client = self.clone();
        tokio::spawn(async move {
            let key = plan.cache_key.clone();
            match client.load(plan).await {
                Ok(_) => tracing::debug!(key = %key, "background refresh complete"),
                Err(e) => tracing::warn!(key = %key, error = %e, "background refresh failed"),
            }
        });
    }

    async fn invalidate_related(&self, url: &str) {
        let mut removed = usize::from(self.inner.cache.invalidate(&compute_cache_key(url, &QueryParams::new())).await);
        for tag in related_tags(url) {
            removed += self.inner.cache.invalidate_tag(&tag).await;
        }
        tracing::debug!(url, removed, "invalidated entries related to write");
    }

    async fn defer<T>(
        &self, method: Method, url: &str, body: Option<Value>, options: WriteOptions,
    ) -> Result<WriteOutcome<T>, Error> {
        let id = self
            .inner
            .queue
            .enqueue(url, method, body, options.request, options.max_retries)
            .await?;
        Ok(WriteOutcome::Queued { id })
    }

    fn inflight(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<SharedResult>>> {
        self.inner.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-flight marker for a key, even if the fetch task panics.
struct InflightGuard {
    client: ApiClient,
    key: String,
    tx: Option<broadcast::Sender<SharedResult>>,
}

impl InflightGuard {
    fn complete(mut self, result: SharedResult) {
        if let Some(tx) = self.tx.take() {
            self.client.inflight().remove(&self.key);
            let _ = tx.send(result);
        }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        if self.tx.take().is_some() {
            self.client.inflight().remove(&self.key);
        }
    }
}

/// Send one request through the hook chain.
pub(crate) async fn exchange(
    transport: &dyn Transport, hooks: &[Arc<dyn RequestHook>], mut request: TransportRequest,
) -> Result<TransportResponse, Error> {
    run_before(hooks, &mut request);
    let start = Instant::now();
    let result = transport.send(request.clone()).await;
    run_after(hooks, &request, result.as_ref(), start.elapsed());
    result
}

fn unexpected_not_modified() -> Error {
    Error::Network("not modified answer to an unconditional request".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use freightdesk_core::{ConnectivitySignal, MemoryStore, QueueConfig};
    use serde_json::json;
    use std::collections::BTreeMap;
    use tokio::time::advance;

    struct Harness {
        client: ApiClient,
        transport: Arc<MockTransport>,
        signal: Arc<ConnectivitySignal>,
    }

    async fn harness_with(
        transport: MockTransport, online: bool, configure: impl FnOnce(ApiClientBuilder) -> ApiClientBuilder,
    ) -> Harness {
        let transport = Arc::new(transport);
        let signal = Arc::new(ConnectivitySignal::new(online));
        let queue = OfflineQueue::load(Arc::new(MemoryStore::new()), signal.clone(), QueueConfig::default())
            .await
            .unwrap();
        let builder = ApiClient::builder(transport.clone(), Arc::new(queue));
        Harness { client: configure(builder).build(), transport, signal }
    }

    async fn harness(online: bool) -> Harness {
        harness_with(MockTransport::new(), online, |b| b).await
    }

    fn etagged(body: Value, revision: &str) -> Result<TransportResponse, Error> {
        Ok(TransportResponse::Success {
            status: 200,
            headers: BTreeMap::new(),
            body,
            revision: Some(revision.to_string()),
        })
    }

    /// Let detached tasks run to completion on the paused clock.
    async fn settle() {
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn test_second_get_is_a_cache_hit() {
        let h = harness(true).await;
        h.transport.push_ok(json!({"id": "42", "status": "pending"}));

        let first: Value = h.client.get("/shipments/42", GetOptions::default()).await.unwrap();
        let second: Value = h.client.get("/shipments/42", GetOptions::default()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.transport.call_count(), 1);

        let snapshot = h.client.performance_snapshot();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_get_decodes_typed_body() {
        #[derive(Debug, serde::Deserialize, PartialEq)]
        struct Shipment {
            id: String,
            weight: u32,
        }

        let h = harness(true).await;
        h.transport.push_ok(json!({"id": "S-1", "weight": 120}));

        let shipment: Shipment = h.client.get("/shipments/S-1", GetOptions::default()).await.unwrap();
        assert_eq!(shipment, Shipment { id: "S-1".into(), weight: 120 });
    }

    #[tokio::test]
    async fn test_params_distinguish_entries() {
        let h = harness(true).await;
        h.transport.push_ok(json!(["page 1"]));
        h.transport.push_ok(json!(["page 2"]));

        let one: Value = h.client.get("/shipments", GetOptions::default().param("page", "1")).await.unwrap();
        let two: Value = h.client.get("/shipments", GetOptions::default().param("page", "2")).await.unwrap();

        assert_eq!(one, json!(["page 1"]));
        assert_eq!(two, json!(["page 2"]));
        assert_eq!(h.transport.call_count(), 2);
        assert_eq!(h.transport.calls()[1].params.get("page").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn test_empty_url_rejected() {
        let h = harness(true).await;
        let err = h.client.get::<Value>("  ", GetOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_gets_share_one_request() {
        let h = harness_with(MockTransport::new().with_delay(Duration::from_millis(50)), true, |b| b).await;
        h.transport.push_ok(json!({"clients": 3}));

        let (a, b) = tokio::join!(
            h.client.get::<Value>("/clients", GetOptions::default()),
            h.client.get::<Value>("/clients", GetOptions::default()),
        );

        assert_eq!(a.unwrap(), json!({"clients": 3}));
        assert_eq!(b.unwrap(), json!({"clients": 3}));
        assert_eq!(h.transport.call_count(), 1);
        assert!(h.client.inflight().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failure_reaches_every_caller() {
        let h = harness_with(MockTransport::new().with_delay(Duration::from_millis(50)), true, |b| b).await;
        h.transport.push(Err(Error::Timeout("deadline exceeded".into())));

        let (a, b) = tokio::join!(
            h.client.get::<Value>("/invoices", GetOptions::default()),
            h.client.get::<Value>("/invoices", GetOptions::default()),
        );

        assert!(matches!(a, Err(Error::Timeout(_))));
        assert!(matches!(b, Err(Error::Timeout(_))));
        assert_eq!(h.transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached_and_clears_marker() {
        let h = harness(true).await;
        h.transport.push(Err(Error::HttpError { status: 500, body: "boom".into() }));
        h.transport.push_ok(json!({"ok": true}));

        let err = h.client.get::<Value>("/cargo", GetOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::HttpError { status: 500, .. }));
        assert_eq!(h.client.cache_stats().await.size, 0);
        assert!(h.client.inflight().is_empty());

        let ok: Value = h.client.get("/cargo", GetOptions::default()).await.unwrap();
        assert_eq!(ok, json!({"ok": true}));
        assert_eq!(h.transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_skip_cache_always_fetches() {
        let h = harness(true).await;
        let options = GetOptions::default().cache(CacheOptions::default().skip_cache());

        h.client.get::<Value>("/clients/1", options.clone()).await.unwrap();
        h.client.get::<Value>("/clients/1", options).await.unwrap();

        assert_eq!(h.transport.call_count(), 2);
        assert_eq!(h.client.cache_stats().await.size, 0);
    }

    #[tokio::test]
    async fn test_key_override_shares_entry() {
        let h = harness(true).await;
        h.transport.push_ok(json!({"summary": 1}));
        let options = GetOptions::default().cache(CacheOptions::default().key("dashboard"));

        h.client.get::<Value>("/reports/summary", options.clone()).await.unwrap();
        let cached: Value = h.client.get("/reports/summary?v=2", options).await.unwrap();

        assert_eq!(cached, json!({"summary": 1}));
        assert_eq!(h.transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_max_age() {
        let h = harness(true).await;
        h.transport.push_ok(json!(1));
        h.transport.push_ok(json!(2));
        let options = GetOptions::default().cache(CacheOptions::default().max_age(Duration::from_millis(100)));

        assert_eq!(h.client.get::<Value>("/cargo/1", options.clone()).await.unwrap(), json!(1));
        advance(Duration::from_millis(101)).await;
        assert_eq!(h.client.get::<Value>("/cargo/1", options).await.unwrap(), json!(2));
        assert_eq!(h.transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_hit_refreshes_in_background() {
        let h = harness(true).await;
        h.transport.push_ok(json!({"v": 1}));
        h.transport.push_ok(json!({"v": 2}));
        let options = GetOptions::default().cache(
            CacheOptions::default()
                .max_age(Duration::from_millis(100))
                .stale_while_revalidate(Duration::from_millis(20)),
        );

        h.client.get::<Value>("/shipments", options.clone()).await.unwrap();
        advance(Duration::from_millis(90)).await;

        let stale: Value = h.client.get("/shipments", options.clone()).await.unwrap();
        assert_eq!(stale, json!({"v": 1}));

        settle().await;
        assert_eq!(h.transport.call_count(), 2);

        let fresh: Value = h.client.get("/shipments", options).await.unwrap();
        assert_eq!(fresh, json!({"v": 2}));
        assert_eq!(h.transport.call_count(), 2);

        // The refresh itself is not a tracked request.
        let snapshot = h.client.performance_snapshot();
        assert_eq!(snapshot.request_count, 3);
        assert_eq!(snapshot.cache_hits, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_serving_cached_body() {
        let h = harness(true).await;
        h.transport.push_ok(json!({"v": 1}));
        h.transport.always(Err(Error::Network("connection reset".into())));
        let options = GetOptions::default().cache(
            CacheOptions::default()
                .max_age(Duration::from_millis(100))
                .stale_while_revalidate(Duration::from_millis(50)),
        );

        h.client.get::<Value>("/clients", options.clone()).await.unwrap();
        advance(Duration::from_millis(60)).await;

        let value: Value = h.client.get("/clients", options.clone()).await.unwrap();
        assert_eq!(value, json!({"v": 1}));
        settle().await;

        let value: Value = h.client.get("/clients", options).await.unwrap();
        assert_eq!(value, json!({"v": 1}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_modified_serves_cached_body() {
        let h = harness(true).await;
        h.transport.push(etagged(json!({"rate": 4}), "\"r1\""));
        h.transport.push(Ok(TransportResponse::NotModified));
        let options = GetOptions::default().cache(
            CacheOptions::default()
                .max_age(Duration::from_millis(100))
                .stale_while_revalidate(Duration::from_millis(50)),
        );

        h.client.get::<Value>("/rates", options.clone()).await.unwrap();
        advance(Duration::from_millis(60)).await;

        h.client.prefetch("/rates", options.clone()).await.unwrap();

        let calls = h.transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].if_none_match, None);
        assert_eq!(calls[1].if_none_match.as_deref(), Some("\"r1\""));

        let value: Value = h.client.get("/rates", options).await.unwrap();
        assert_eq!(value, json!({"rate": 4}));
    }

    #[tokio::test]
    async fn test_prefetch_skips_fresh_entry() {
        let h = harness(true).await;
        h.transport.push_ok(json!([1, 2]));

        h.client.prefetch("/invoices", GetOptions::default()).await.unwrap();
        h.client.prefetch("/invoices", GetOptions::default()).await.unwrap();
        let value: Value = h.client.get("/invoices", GetOptions::default()).await.unwrap();

        assert_eq!(value, json!([1, 2]));
        assert_eq!(h.transport.call_count(), 1);
        assert_eq!(h.client.performance_snapshot().request_count, 1);
    }

    #[tokio::test]
    async fn test_write_invalidates_resource_and_collection() {
        let h = harness(true).await;
        h.transport.always(Ok(TransportResponse::ok(json!({"ok": true}))));

        h.client.get::<Value>("/shipments", GetOptions::default()).await.unwrap();
        h.client.get::<Value>("/shipments/42", GetOptions::default()).await.unwrap();
        h.client.get::<Value>("/clients/7", GetOptions::default()).await.unwrap();
        assert_eq!(h.client.cache_stats().await.size, 3);

        let outcome: WriteOutcome<Value> =
            h.client.put("/shipments/42", &json!({"status": "delivered"}), WriteOptions::default()).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Completed(json!({"ok": true})));

        assert_eq!(h.client.cache_stats().await.size, 1);
        h.client.get::<Value>("/clients/7", GetOptions::default()).await.unwrap();
        assert_eq!(h.transport.call_count(), 4);
    }

    #[tokio::test]
    async fn test_write_invalidates_exact_key_without_path_tags() {
        let h = harness(true).await;
        h.transport.always(Ok(TransportResponse::ok(json!({"ok": true}))));
        let tagged = GetOptions::default().cache(CacheOptions::default().tags(["dashboard"]));

        h.client.get::<Value>("/shipments/42", tagged.clone()).await.unwrap();
        h.client.get::<Value>("/reports/daily", tagged).await.unwrap();
        assert_eq!(h.client.cache_stats().await.size, 2);

        h.client
            .put::<Value, _>("/shipments/42", &json!({"status": "delivered"}), WriteOptions::default())
            .await
            .unwrap();

        // Only the written resource goes; the other dashboard entry stays.
        assert_eq!(h.client.cache_stats().await.size, 1);
        h.client
            .get::<Value>("/shipments/42", GetOptions::default().cache(CacheOptions::default().tags(["dashboard"])))
            .await
            .unwrap();
        assert_eq!(h.transport.call_count(), 4);
    }

    #[tokio::test]
    async fn test_explicit_tags_and_invalidate_tag() {
        let h = harness(true).await;
        let tagged = GetOptions::default().cache(CacheOptions::default().tags(["dashboard"]));

        h.client.get::<Value>("/reports/a", tagged.clone()).await.unwrap();
        h.client.get::<Value>("/reports/b", tagged).await.unwrap();
        h.client.get::<Value>("/clients", GetOptions::default()).await.unwrap();

        assert_eq!(h.client.invalidate_tag("dashboard").await, 2);
        assert_eq!(h.client.cache_stats().await.size, 1);

        h.client.clear_cache().await;
        assert_eq!(h.client.cache_stats().await, CacheStats { size: 0, capacity: 100, tag_count: 0 });
    }

    #[tokio::test]
    async fn test_online_write_failure_propagates() {
        let h = harness(true).await;
        h.transport.push(Err(Error::HttpError { status: 409, body: "conflict".into() }));

        let err = h
            .client
            .post::<Value, _>("/shipments", &json!({"ref": "S-2"}), WriteOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::HttpError { status: 409, .. }));
        assert_eq!(h.client.offline_status().await.length, 0);
    }

    #[tokio::test]
    async fn test_offline_post_is_queued_then_flushed() {
        let h = harness(false).await;

        let outcome: WriteOutcome<Value> = h
            .client
            .post("/shipments", &json!({"ref": "S-3"}), WriteOptions::default().header("X-Trace", "t1"))
            .await
            .unwrap();
        assert!(outcome.is_queued());
        assert_eq!(h.client.offline_status().await.length, 1);
        assert_eq!(h.transport.call_count(), 0);

        h.signal.set_online(true);
        let report = h.client.flush_offline_queue().await.unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(h.client.offline_status().await.length, 0);
        let calls = h.transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, Method::Post);
        assert_eq!(calls[0].body, Some(json!({"ref": "S-3"})));
        assert_eq!(calls[0].headers.get("X-Trace").map(String::as_str), Some("t1"));
    }

    /// Flips the connectivity signal offline when a request fails.
    struct DropsConnection(Arc<ConnectivitySignal>);

    impl RequestHook for DropsConnection {
        fn after(&self, _request: &TransportRequest, outcome: Result<&TransportResponse, &Error>, _elapsed: Duration) {
            if outcome.is_err() {
                self.0.set_online(false);
            }
        }
    }

    #[tokio::test]
    async fn test_write_failing_as_connection_drops_is_queued() {
        let transport = MockTransport::new();
        transport.push(Err(Error::Network("connection refused".into())));
        let signal = Arc::new(ConnectivitySignal::new(true));
        let queue = OfflineQueue::load(Arc::new(MemoryStore::new()), signal.clone(), QueueConfig::default())
            .await
            .unwrap();
        let client = ApiClient::builder(Arc::new(transport), Arc::new(queue))
            .hook(DropsConnection(signal.clone()))
            .build();

        let outcome: WriteOutcome<Value> = client.delete("/invoices/9", WriteOptions::default()).await.unwrap();

        assert!(outcome.is_queued());
        let status = client.offline_status().await;
        assert!(!status.is_online);
        assert_eq!(status.length, 1);
    }

    #[tokio::test]
    async fn test_get_method_rejected_for_writes() {
        let h = harness(true).await;
        let err = h
            .client
            .send::<Value>(Method::Get, "/shipments", None, WriteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_hooks_see_every_exchange() {
        let h = harness_with(MockTransport::new(), true, |b| {
            b.hook(crate::hooks::StaticHeaders::new().with("Authorization", "Bearer t"))
        })
        .await;

        h.client.get::<Value>("/clients", GetOptions::default()).await.unwrap();
        h.client.delete::<Value>("/clients/1", WriteOptions::default()).await.unwrap();

        for call in h.transport.calls() {
            assert_eq!(call.headers.get("Authorization").map(String::as_str), Some("Bearer t"));
        }
    }

    #[tokio::test]
    async fn test_builder_from_config() {
        let config = AppConfig { cache_capacity: 2, ..AppConfig::default() };
        let h = harness_with(MockTransport::new(), true, |b| b.from_config(&config)).await;

        for path in ["/a", "/b", "/c"] {
            h.client.get::<Value>(path, GetOptions::default()).await.unwrap();
        }

        let stats = h.client.cache_stats().await;
        assert_eq!(stats.size, 2);
        assert_eq!(stats.capacity, 2);

        h.client.reset_metrics();
        assert_eq!(h.client.performance_snapshot().request_count, 0);
    }

    #[tokio::test]
    async fn test_queue_events_report_delivery() {
        let h = harness(false).await;
        let mut events = h.client.queue_events();

        let outcome: WriteOutcome<Value> =
            h.client.patch("/cargo/3", &json!({"sealed": true}), WriteOptions::default()).await.unwrap();
        let WriteOutcome::Queued { id } = outcome else {
            panic!("expected the write to be queued");
        };

        h.signal.set_online(true);
        h.client.flush_offline_queue().await.unwrap();

        assert_eq!(events.recv().await.unwrap(), QueueEvent::Enqueued { id: id.clone() });
        assert_eq!(events.recv().await.unwrap(), QueueEvent::Delivered { id });
    }

    #[tokio::test]
    async fn test_auto_replay_sends_queued_writes_on_reconnect() {
        let h = harness(false).await;
        let mut events = h.client.queue_events();
        let handle = h.client.spawn_auto_replay();

        let outcome: WriteOutcome<Value> =
            h.client.post("/shipments", &json!({"ref": "S-9"}), WriteOptions::default()).await.unwrap();
        assert!(outcome.is_queued());

        h.signal.set_online(true);

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let QueueEvent::Delivered { .. } = events.recv().await.unwrap() {
                    break;
                }
            }
        })
        .await
        .expect("reconnect should replay the queued write");

        assert_eq!(h.client.offline_status().await.length, 0);
        let calls = h.transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].body, Some(json!({"ref": "S-9"})));

        handle.abort();
    }
}
