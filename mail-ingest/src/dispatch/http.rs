use super::Dispatcher;
use crate::error::{GatewayError, Result};
use crate::event::Event;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

/// CloudEvents structured content mode
const CLOUDEVENTS_JSON: &str = "application/cloudevents+json";

pub const GROUP_HEADER: &str = "X-Group-Id";
pub const USER_HEADER: &str = "X-User-Id";

/// Posts each event as CloudEvents JSON to the event platform
pub struct HttpDispatcher {
    uri: String,
    client: reqwest::Client,
}

impl HttpDispatcher {
    pub fn new(uri: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            uri: uri.into(),
            client,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn write(&self, event: Event, group: &str, user_id: &str) -> Result<()> {
        let body = event
            .to_json()
            .map_err(|e| GatewayError::Dispatch(e.to_string()))?;

        let response = self
            .client
            .post(&self.uri)
            .header(CONTENT_TYPE, CLOUDEVENTS_JSON)
            .header(GROUP_HEADER, group)
            .header(USER_HEADER, user_id)
            .body(body)
            .send()
            .await
            .map_err(|e| GatewayError::Dispatch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Dispatch(format!(
                "{} responded with {}",
                self.uri, status
            )));
        }
        Ok(())
    }
}
