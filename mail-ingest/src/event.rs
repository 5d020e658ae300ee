//! Canonical event record handed to the dispatch gateway
//!
//! Serializes to the CloudEvents 1.0 JSON structured format.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;

pub const SPEC_VERSION: &str = "1.0";

pub const ATTR_OBJECT_URL: &str = "objecturl";
pub const ATTR_SUMMARY: &str = "summary";
pub const ATTR_TIME: &str = "time";
pub const ATTR_ATTACHMENT_CIDS: &str = "attachmentcids";
pub const ATTR_ATTACHMENT_CTYPES: &str = "attachmentctypes";
pub const ATTR_ATTACHMENT_FILE_NAMES: &str = "attachmentfilenames";

/// Typed attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    String(String),
    Uri(String),
    Integer(i32),
    Timestamp(DateTime<Utc>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) | AttributeValue::Uri(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            AttributeValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AttributeValue::String(s) | AttributeValue::Uri(s) => serializer.serialize_str(s),
            AttributeValue::Integer(i) => serializer.serialize_i32(*i),
            AttributeValue::Timestamp(t) => {
                serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    pub id: String,
    pub source: String,
    pub spec_version: String,
    pub event_type: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub data: String,
}

impl Event {
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn object_url(&self) -> Option<&str> {
        self.attribute(ATTR_OBJECT_URL).and_then(AttributeValue::as_str)
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.attribute(ATTR_TIME).and_then(AttributeValue::as_timestamp)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("specversion", &self.spec_version)?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("source", &self.source)?;
        map.serialize_entry("type", &self.event_type)?;
        map.serialize_entry("datacontenttype", "text/plain")?;
        for (key, value) in &self.attributes {
            // context attributes above are reserved
            if matches!(
                key.as_str(),
                "specversion" | "id" | "source" | "type" | "datacontenttype" | "data"
            ) {
                continue;
            }
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry("data", &self.data)?;
        map.end()
    }
}
