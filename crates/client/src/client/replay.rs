//! Offline queue delivery through the client's transport and hooks.

use std::sync::Arc;

use freightdesk_core::{Error, QueuedRequest, Replayer};

use super::exchange;
use crate::hooks::RequestHook;
use crate::transport::{Transport, TransportRequest};

/// Replays queued writes exactly as a live write would be sent.
pub struct TransportReplayer {
    transport: Arc<dyn Transport>,
    hooks: Vec<Arc<dyn RequestHook>>,
}

impl TransportReplayer {
    pub fn new(transport: Arc<dyn Transport>, hooks: Vec<Arc<dyn RequestHook>>) -> Self {
        Self { transport, hooks }
    }
}

#[async_trait::async_trait]
impl Replayer for TransportReplayer {
    async fn replay(&self, item: &QueuedRequest) -> Result<(), Error> {
        let request = TransportRequest::new(item.method, item.url.clone())
            .with_headers(item.options.headers.clone())
            .with_params(item.options.params.clone())
            .with_body(item.body.clone());

        exchange(self.transport.as_ref(), &self.hooks, request).await?;
        Ok(())
    }
}
