//! Durable offline write queue.
//!
//! Mutating requests issued while offline are appended here, persisted on
//! every change, and replayed in enqueue order once connectivity returns.
//!
//! ### Item lifecycle
//! - `enqueue` creates a pending item with `retry_count = 0`.
//! - A successful replay removes it (delivered).
//! - A failed replay bumps `retry_count`; reaching `max_retries` removes it
//!   (abandoned) and emits [`QueueEvent::Abandoned`].
//! - On load, items older than the retention window are dropped unreplayed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::connectivity::Connectivity;
use crate::request::{Method, RequestOptions};
use crate::store::DurableStore;
use crate::Error;

/// Key the serialized item list is stored under.
pub const QUEUE_STORAGE_KEY: &str = "offline_queue";

/// Events buffered per subscriber before the slowest one starts lagging.
pub const EVENT_CAPACITY: usize = 256;

/// A mutating request waiting for connectivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub id: String,
    pub url: String,
    pub method: Method,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub options: RequestOptions,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
}

/// Lifecycle notifications for queued items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Enqueued { id: String },
    Delivered { id: String },
    RetryScheduled { id: String, retry_count: u32 },
    /// Retry ceiling reached; the write is lost unless a subscriber acts on it.
    Abandoned { id: String, url: String, method: Method, last_error: String },
}

/// Snapshot of queue state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub is_online: bool,
    pub length: usize,
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
}

/// Outcome counts of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    pub attempted: usize,
    pub delivered: usize,
    pub retrying: usize,
    pub abandoned: usize,
}

/// Queue tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Default retry ceiling for new items.
    pub max_retries: u32,
    /// Items older than this are dropped on load.
    pub retention: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_retries: 3, retention: Duration::from_secs(24 * 60 * 60) }
    }
}

impl From<&AppConfig> for QueueConfig {
    fn from(config: &AppConfig) -> Self {
        Self { max_retries: config.max_retries, retention: config.queue_retention() }
    }
}

/// Sends a queued request over the network.
#[async_trait::async_trait]
pub trait Replayer: Send + Sync {
    async fn replay(&self, request: &QueuedRequest) -> Result<(), Error>;
}

/// Durable FIFO of pending writes.
pub struct OfflineQueue {
    store: Arc<dyn DurableStore>,
    connectivity: Arc<dyn Connectivity>,
    items: Mutex<Vec<QueuedRequest>>,
    /// Held for the duration of a replay pass so passes never overlap.
    processing: Mutex<()>,
    config: QueueConfig,
    events: broadcast::Sender<QueueEvent>,
}

impl OfflineQueue {
    /// Load the persisted queue, dropping items past the retention window.
    pub async fn load(
        store: Arc<dyn DurableStore>, connectivity: Arc<dyn Connectivity>, config: QueueConfig,
    ) -> Result<Self, Error> {
        let persisted = match store.load(QUEUE_STORAGE_KEY).await? {
            Some(blob) => serde_json::from_str::<Vec<QueuedRequest>>(&blob).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "discarding unreadable offline queue");
                Vec::new()
            }),
            None => Vec::new(),
        };

        let cutoff = chrono::Duration::from_std(config.retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention));
        let loaded = persisted.len();
        let items: Vec<QueuedRequest> = persisted
            .into_iter()
            .filter(|item| cutoff.is_none_or(|cutoff| item.enqueued_at >= cutoff))
            .collect();

        if items.len() < loaded {
            tracing::info!(dropped = loaded - items.len(), "dropped expired offline requests");
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let queue = Self {
            store,
            connectivity,
            items: Mutex::new(items),
            processing: Mutex::new(()),
            config,
            events,
        };

        let items = queue.items.lock().await;
        queue.persist(&items).await?;
        tracing::debug!(length = items.len(), "offline queue loaded");
        drop(items);

        Ok(queue)
    }

    /// Append a write and persist the queue. Returns the new item's id.
    ///
    /// If persisting fails the item is not kept.
    pub async fn enqueue(
        &self, url: &str, method: Method, body: Option<serde_json::Value>, options: RequestOptions,
        max_retries: Option<u32>,
    ) -> Result<String, Error> {
        let item = QueuedRequest {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.to_string(),
            method,
            body,
            options,
            enqueued_at: Utc::now(),
            retry_count: 0,
            max_retries: max_retries.unwrap_or(self.config.max_retries),
        };
        let id = item.id.clone();

        let mut items = self.items.lock().await;
        items.push(item);
        if let Err(e) = self.persist(&items).await {
            items.pop();
            return Err(e);
        }
        let length = items.len();
        drop(items);

        tracing::info!(id = %id, method = %method, url = %url, length, "queued offline request");
        let _ = self.events.send(QueueEvent::Enqueued { id: id.clone() });

        Ok(id)
    }

    /// Replay every queued item once, in enqueue order.
    ///
    /// A no-op while offline or empty. A failed item never blocks the ones
    /// after it. Items enqueued during the pass wait for the next one.
    pub async fn process(&self, replayer: &dyn Replayer) -> Result<ProcessReport, Error> {
        if !self.connectivity.is_online() {
            return Ok(ProcessReport::default());
        }

        let _pass = self.processing.lock().await;
        let pending = self.items.lock().await.clone();
        if pending.is_empty() {
            return Ok(ProcessReport::default());
        }

        let mut report = ProcessReport::default();
        let mut events = Vec::new();
        let mut finished: HashSet<String> = HashSet::new();
        let mut retried: HashMap<String, u32> = HashMap::new();

        for item in &pending {
            if item.retry_count >= item.max_retries {
                events.push(abandon(item, "retry ceiling already reached"));
                report.abandoned += 1;
                finished.insert(item.id.clone());
                continue;
            }

            report.attempted += 1;
            match replayer.replay(item).await {
                Ok(()) => {
                    tracing::debug!(id = %item.id, url = %item.url, "replayed offline request");
                    events.push(QueueEvent::Delivered { id: item.id.clone() });
                    report.delivered += 1;
                    finished.insert(item.id.clone());
                }
                Err(e) => {
                    let retry_count = item.retry_count + 1;
                    if retry_count >= item.max_retries {
                        events.push(abandon(item, &e.to_string()));
                        report.abandoned += 1;
                        finished.insert(item.id.clone());
                    } else {
                        tracing::debug!(id = %item.id, retry_count, error = %e, "offline replay failed");
                        events.push(QueueEvent::RetryScheduled { id: item.id.clone(), retry_count });
                        report.retrying += 1;
                        retried.insert(item.id.clone(), retry_count);
                    }
                }
            }
        }

        let mut items = self.items.lock().await;
        items.retain(|item| !finished.contains(&item.id));
        for item in items.iter_mut() {
            if let Some(&retry_count) = retried.get(&item.id) {
                item.retry_count = retry_count;
            }
        }
        let persisted = self.persist(&items).await;
        let remaining = items.len();
        drop(items);

        // Subscribers observe events only once the queue reflects them.
        for event in events {
            let _ = self.events.send(event);
        }
        persisted?;

        tracing::info!(
            delivered = report.delivered,
            retrying = report.retrying,
            abandoned = report.abandoned,
            remaining,
            "offline queue pass complete"
        );

        Ok(report)
    }

    pub async fn status(&self) -> QueueStatus {
        let items = self.items.lock().await;
        QueueStatus {
            is_online: self.connectivity.is_online(),
            length: items.len(),
            oldest_enqueued_at: items.iter().map(|item| item.enqueued_at).min(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Copy of the pending items in enqueue order.
    pub async fn items(&self) -> Vec<QueuedRequest> {
        self.items.lock().await.clone()
    }

    /// Receive lifecycle events, including abandonment.
    ///
    /// The channel buffers [`EVENT_CAPACITY`] events per subscriber. One that
    /// falls further behind gets `RecvError::Lagged` and misses the skipped
    /// events; [`ProcessReport::abandoned`] still counts them.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Run a replay pass on every offline-to-online transition.
    ///
    /// The receiver is subscribed before the task is spawned, so a flip that
    /// happens before the task first runs is still observed. Notifications
    /// coalesce: seeing `true` after any change means the signal went online
    /// at least once since the last observation.
    /// Runs until the returned handle is aborted.
    pub fn spawn_auto_replay(self: &Arc<Self>, replayer: Arc<dyn Replayer>) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        let mut rx = queue.connectivity.subscribe();
        let initially_online = *rx.borrow_and_update();
        tracing::debug!(initially_online, "watching connectivity for offline replay");

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                if online && let Err(e) = queue.process(replayer.as_ref()).await {
                    tracing::warn!(error = %e, "offline queue replay failed");
                }
            }
        })
    }

    async fn persist(&self, items: &[QueuedRequest]) -> Result<(), Error> {
        let blob = serde_json::to_string(items)?;
        self.store.save(QUEUE_STORAGE_KEY, &blob).await
    }
}

fn abandon(item: &QueuedRequest, last_error: &str) -> QueueEvent {
    tracing::warn!(
        id = %item.id,
        method = %item.method,
        url = %item.url,
        max_retries = item.max_retries,
        error = last_error,
        "abandoning offline request after exhausting retries"
    );
    QueueEvent::Abandoned {
        id: item.id.clone(),
        url: item.url.clone(),
        method: item.method,
        last_error: last_error.to_string(),
    }
}
