//! Dispatch gateway interface
//!
//! Accepted events leave the gateway through a [`Dispatcher`]. Delivery,
//! batching and retry belong to the downstream platform: a failed write is
//! reported once and never retried here.

pub mod http;
pub mod logging;
pub mod memory;

pub use http::HttpDispatcher;
pub use logging::DispatcherLogging;
pub use memory::MemoryDispatcher;

use crate::error::Result;
use crate::event::Event;
use async_trait::async_trait;

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Hand one event to the platform under a routing group and user id
    async fn write(&self, event: Event, group: &str, user_id: &str) -> Result<()>;
}
