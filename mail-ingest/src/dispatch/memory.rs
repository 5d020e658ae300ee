use super::Dispatcher;
use crate::error::{GatewayError, Result};
use crate::event::Event;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// An event as it was handed to [`MemoryDispatcher`]
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedEvent {
    pub event: Event,
    pub group: String,
    pub user_id: String,
}

/// Keeps written events in memory; used for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryDispatcher {
    events: Mutex<Vec<DispatchedEvent>>,
    failing: AtomicBool,
}

impl MemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher whose writes fail until [`set_failing`](Self::set_failing)
    /// turns it off
    pub fn failing() -> Self {
        let dispatcher = Self::default();
        dispatcher.set_failing(true);
        dispatcher
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<DispatchedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Dispatcher for MemoryDispatcher {
    async fn write(&self, event: Event, group: &str, user_id: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Dispatch("dispatcher unavailable".to_string()));
        }
        let mut events = self
            .events
            .lock()
            .map_err(|_| GatewayError::Dispatch("event store poisoned".to_string()))?;
        events.push(DispatchedEvent {
            event,
            group: group.to_string(),
            user_id: user_id.to_string(),
        });
        Ok(())
    }
}
