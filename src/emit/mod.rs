//! Event envelope and the bus the input emits into.
//!
//! A decoded item becomes an [`Event`] whose `extra` fields equal the decoded
//! map. An undecodable item becomes an error-tagged event that still carries
//! the raw bytes, so operators can inspect and replay it.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tokio::sync::mpsc::Sender;

use crate::errors::InputError;
use crate::transform::decode::FieldMap;

/// Tag added to events whose item could not be decoded.
pub const ERROR_TAG: &str = "gogstash_input_redis_error";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub extra: FieldMap,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_raw_hex"
    )]
    pub raw: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Event {
    pub fn decoded(fields: FieldMap) -> Self {
        Self {
            timestamp: Utc::now(),
            message: None,
            tags: Vec::new(),
            extra: fields,
            raw: None,
            error: None,
        }
    }

    pub fn decode_failed(raw: Bytes, error: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: Some(String::from_utf8_lossy(&raw).into_owned()),
            tags: vec![ERROR_TAG.to_string()],
            extra: FieldMap::new(),
            raw: Some(raw),
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.tags.iter().any(|t| t == ERROR_TAG)
    }
}

fn serialize_raw_hex<S: Serializer>(raw: &Option<Bytes>, s: S) -> Result<S::Ok, S::Error> {
    match raw {
        Some(b) => s.serialize_str(&hex::encode(b)),
        None => s.serialize_none(),
    }
}

/// Downstream event bus. Delivery and backpressure belong to the bus.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event) -> Result<(), InputError>;
}

/// Bus backed by a bounded tokio channel; a full channel applies backpressure.
#[derive(Clone)]
pub struct ChannelSink {
    tx: Sender<Event>,
}

impl ChannelSink {
    pub fn new(tx: Sender<Event>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: Event) -> Result<(), InputError> {
        self.tx.send(event).await.map_err(|_| InputError::BusClosed)
    }
}
