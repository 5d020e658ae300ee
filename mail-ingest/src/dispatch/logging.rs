use super::Dispatcher;
use crate::error::Result;
use crate::event::Event;
use async_trait::async_trait;
use tracing::{debug, error};

/// Logs every write of the wrapped dispatcher
pub struct DispatcherLogging<D> {
    inner: D,
}

impl<D: Dispatcher> DispatcherLogging<D> {
    pub fn new(inner: D) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<D: Dispatcher> Dispatcher for DispatcherLogging<D> {
    async fn write(&self, event: Event, group: &str, user_id: &str) -> Result<()> {
        let id = event.id.clone();
        let result = self.inner.write(event, group, user_id).await;
        match &result {
            Ok(()) => debug!("Dispatched event {} to group {} for {}", id, group, user_id),
            Err(e) => error!(
                "Failed to dispatch event {} to group {} for {}: {}",
                id, group, user_id, e
            ),
        }
        result
    }
}
