//! MIME to event conversion
//!
//! Turns a raw message into a canonical [`Event`]:
//! - headers become attributes under canonical keys; public messages only
//!   disclose allow-listed headers
//! - the body is the HTML part when present (sanitized for public
//!   messages), else the plain text part
//! - public recipient names are scrubbed from every outgoing text field
//!
//! Conversion either yields a complete event or fails with
//! [`GatewayError::Parse`].

pub mod headers;
pub mod html;
pub mod logging;
pub mod scrub;

pub use html::HtmlPolicy;
pub use logging::ConverterLogging;
pub use scrub::Scrubber;

use crate::config::{Config, InternalMarkerConfig};
use crate::error::{GatewayError, Result};
use crate::event::{
    AttributeValue, Event, ATTR_ATTACHMENT_CIDS, ATTR_ATTACHMENT_CTYPES,
    ATTR_ATTACHMENT_FILE_NAMES, ATTR_OBJECT_URL, ATTR_SUMMARY, ATTR_TIME, SPEC_VERSION,
};
use crate::mime::{MimeParser, ParsedEmail};
use crate::recipient::RecipientPolicy;
use chrono::{DateTime, Utc};
use headers::{bracketed_addr, canonical_key, clean_addr, is_public};
use tracing::debug;
use uuid::Uuid;

/// RFC 1123 with numeric zone, e.g. `Thu, 10 Oct 2024 12:34:56 +0000`
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Attribute keys a header may never overwrite
const RESERVED_KEYS: &[&str] = &[
    ATTR_OBJECT_URL,
    ATTR_SUMMARY,
    ATTR_TIME,
    ATTR_ATTACHMENT_CIDS,
    ATTR_ATTACHMENT_CTYPES,
    ATTR_ATTACHMENT_FILE_NAMES,
];

#[cfg_attr(test, mockall::automock)]
pub trait Converter: Send + Sync {
    /// Convert a raw MIME message received from `from`
    fn convert(&self, raw: &[u8], from: &str, internal: bool) -> Result<Event>;
}

pub struct MimeConverter {
    event_type: String,
    internal_marker: InternalMarkerConfig,
    html_policy: HtmlPolicy,
    scrubber: Scrubber,
}

impl MimeConverter {
    pub fn new(
        event_type: impl Into<String>,
        internal_marker: InternalMarkerConfig,
        html_policy: HtmlPolicy,
        scrubber: Scrubber,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            internal_marker,
            html_policy,
            scrubber,
        }
    }

    pub fn from_config(config: &Config, policy: &RecipientPolicy) -> Result<Self> {
        Ok(Self::new(
            config.event.event_type.clone(),
            config.event.internal.clone(),
            HtmlPolicy::from_config(&config.html),
            Scrubber::new(policy.public_names())?,
        ))
    }

    fn convert_headers(&self, parsed: &ParsedEmail, event: &mut Event, from: &str, internal: bool) {
        let mut list_url = None;

        for (name, value) in parsed.unique_headers() {
            let key = canonical_key(name);
            match key.as_str() {
                "date" => {
                    if let Some(time) = parse_date(value) {
                        event
                            .attributes
                            .insert(ATTR_TIME.to_string(), AttributeValue::Timestamp(time));
                    }
                }
                "from" => {
                    event.source = self.scrubber.scrub(clean_addr(bracketed_addr(value)));
                }
                "listurl" => {
                    list_url = Some(self.scrubber.scrub(clean_addr(value)));
                }
                "messageid" => {
                    let id = self.scrubber.scrub(clean_addr(value));
                    if !id.is_empty() {
                        event
                            .attributes
                            .insert(ATTR_OBJECT_URL.to_string(), AttributeValue::Uri(id));
                    }
                }
                "subject" => {
                    event.attributes.insert(
                        ATTR_SUMMARY.to_string(),
                        AttributeValue::String(self.scrubber.scrub(value)),
                    );
                }
                _ if RESERVED_KEYS.contains(&key.as_str()) || key == self.internal_marker.name => {
                    debug!("Ignoring header {} from {}: reserved attribute", name, from);
                }
                _ if internal || is_public(&key) => {
                    let value = clean_addr(value);
                    if !value.is_empty() {
                        event
                            .attributes
                            .insert(key, AttributeValue::String(self.scrubber.scrub(value)));
                    }
                }
                _ => {
                    debug!("Forbidden header from {}: {}={}", from, name, value);
                }
            }
        }

        // The mailing list original wins over the From header
        if let Some(url) = list_url.filter(|url| !url.is_empty()) {
            event.source = url;
        }

        event
            .attributes
            .entry(ATTR_TIME.to_string())
            .or_insert_with(|| AttributeValue::Timestamp(Utc::now()));
    }

    fn convert_body(&self, parsed: &ParsedEmail, event: &mut Event, internal: bool) -> Result<()> {
        let plain = parsed.text_body.as_deref().unwrap_or("");
        let mut text = plain.to_string();

        if let Some(html) = parsed.html_body.as_deref().filter(|h| !h.trim().is_empty()) {
            if let Some(url) = html::find_object_url(html) {
                let url = self.scrubber.scrub(&url);
                if !url.is_empty() {
                    event
                        .attributes
                        .insert(ATTR_OBJECT_URL.to_string(), AttributeValue::Uri(url));
                }
            }

            let html_text = if internal {
                html.to_string()
            } else {
                self.html_policy.sanitize(&html::strip_href_queries(html))
            };
            // Fall back to the plain part when sanitizing left nothing
            if !html_text.trim().is_empty() {
                text = html_text;
            }
        }

        let text = self.scrubber.scrub(&text);
        let text = text.trim();
        if text.is_empty() {
            return Err(GatewayError::parse("no text data"));
        }
        event.data = text.to_string();
        Ok(())
    }

    fn convert_identity(&self, event: &mut Event, from: &str) {
        event.id = Uuid::now_v7().to_string();
        if event.source.is_empty() {
            event.source = self.scrubber.scrub(from);
        }
        event.spec_version = SPEC_VERSION.to_string();
        event.event_type = self.event_type.clone();
    }

    fn convert_attachments(&self, parsed: &ParsedEmail, event: &mut Event) {
        let mut content_ids = Vec::new();
        let mut content_types = Vec::new();
        let mut file_names = Vec::new();

        for part in parsed.non_body_parts() {
            content_ids.push(part.content_id.clone().unwrap_or_default());
            content_types.push(part.content_type.clone());
            file_names.push(part.filename.clone().unwrap_or_default());
        }

        if content_types.is_empty() {
            return;
        }
        for (key, values) in [
            (ATTR_ATTACHMENT_CIDS, content_ids),
            (ATTR_ATTACHMENT_CTYPES, content_types),
            (ATTR_ATTACHMENT_FILE_NAMES, file_names),
        ] {
            event
                .attributes
                .insert(key.to_string(), AttributeValue::String(values.join(", ")));
        }
    }
}

impl Converter for MimeConverter {
    fn convert(&self, raw: &[u8], from: &str, internal: bool) -> Result<Event> {
        let parsed = MimeParser::parse(raw)?;

        let mut event = Event::default();
        self.convert_headers(&parsed, &mut event, from, internal);
        self.convert_body(&parsed, &mut event, internal)?;

        if event.object_url().is_none() {
            return Err(GatewayError::parse("no message id in the source data"));
        }

        self.convert_identity(&mut event, from);
        self.convert_attachments(&parsed, &mut event);

        if internal {
            event.attributes.insert(
                self.internal_marker.name.clone(),
                AttributeValue::Integer(self.internal_marker.value),
            );
        }
        Ok(event)
    }
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value.trim(), DATE_FORMAT)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
