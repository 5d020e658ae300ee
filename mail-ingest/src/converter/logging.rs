use super::Converter;
use crate::error::Result;
use crate::event::Event;
use tracing::{debug, error};

/// Logs every conversion outcome of the wrapped converter
pub struct ConverterLogging<C> {
    inner: C,
}

impl<C: Converter> ConverterLogging<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: Converter> Converter for ConverterLogging<C> {
    fn convert(&self, raw: &[u8], from: &str, internal: bool) -> Result<Event> {
        let result = self.inner.convert(raw, from, internal);
        match &result {
            Ok(event) => debug!(
                "Converted {} bytes from {} (internal={}) into event {} for {}",
                raw.len(),
                from,
                internal,
                event.id,
                event.object_url().unwrap_or_default()
            ),
            Err(e) => error!(
                "Failed to convert {} bytes from {} (internal={}): {}",
                raw.len(),
                from,
                internal,
                e
            ),
        }
        result
    }
}
