// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Firehose envelope model.
//!
//! An envelope carries deployment metadata and exactly one event payload. On the wire
//! it is a JSON object with an `eventType` tag and one populated payload field:
//!
//! ```json
//! {
//!   "origin": "rep",
//!   "eventType": "ValueMetric",
//!   "deployment": "cf",
//!   "valueMetric": { "name": "memoryStats.lastGCPauseTimeNS", "value": 536182, "unit": "ns" }
//! }
//! ```
//!
//! A known `eventType` without its payload object decodes to a zero-valued payload. An
//! unrecognized `eventType` decodes to [`Event::Unsupported`] so the classifier can
//! report it instead of the decoder silently dropping it.

use derive_more::Display;
use serde::{Deserialize, Serialize};

const HTTP_START_STOP: &str = "HttpStartStop";
const LOG_MESSAGE: &str = "LogMessage";
const VALUE_METRIC: &str = "ValueMetric";
const COUNTER_EVENT: &str = "CounterEvent";
const ERROR: &str = "Error";
const CONTAINER_METRIC: &str = "ContainerMetric";

/// 128-bit identifier split into two little-endian words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uuid {
    pub low: u64,
    pub high: u64,
}

impl Uuid {
    /// Canonical lowercase hyphenated text form (8-4-4-4-12).
    #[must_use]
    pub fn to_canonical_string(&self) -> String {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.low.to_le_bytes());
        bytes[8..].copy_from_slice(&self.high.to_le_bytes());
        ::uuid::Uuid::from_bytes(bytes).hyphenated().to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpStartStop {
    pub start_timestamp: i64,
    pub stop_timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    pub peer_type: String,
    pub method: String,
    pub uri: String,
    pub remote_address: String,
    pub user_agent: String,
    pub status_code: i32,
    pub content_length: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<Uuid>,
    pub instance_index: i32,
    pub instance_id: String,
    pub forwarded: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogMessage {
    pub message: String,
    /// `OUT` or `ERR`
    pub message_type: String,
    pub timestamp: i64,
    pub app_id: String,
    pub source_type: String,
    pub source_instance: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValueMetric {
    pub name: String,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CounterEvent {
    pub name: String,
    pub delta: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorEvent {
    pub source: String,
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerMetric {
    pub application_id: String,
    pub instance_index: i32,
    pub cpu_percentage: f64,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
    pub memory_bytes_quota: u64,
    pub disk_bytes_quota: u64,
}

/// The event-type tag of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum EventType {
    HttpStartStop,
    LogMessage,
    ValueMetric,
    CounterEvent,
    Error,
    ContainerMetric,
    #[display("{_0}")]
    Unsupported(String),
}

/// Type-specific payload of an envelope, one variant per event type.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    HttpStartStop(HttpStartStop),
    LogMessage(LogMessage),
    ValueMetric(ValueMetric),
    CounterEvent(CounterEvent),
    Error(ErrorEvent),
    ContainerMetric(ContainerMetric),
    /// An event type this nozzle has no schema for, kept by its wire tag.
    Unsupported { event_type: String },
}

impl Event {
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Event::HttpStartStop(_) => EventType::HttpStartStop,
            Event::LogMessage(_) => EventType::LogMessage,
            Event::ValueMetric(_) => EventType::ValueMetric,
            Event::CounterEvent(_) => EventType::CounterEvent,
            Event::Error(_) => EventType::Error,
            Event::ContainerMetric(_) => EventType::ContainerMetric,
            Event::Unsupported { event_type } => EventType::Unsupported(event_type.clone()),
        }
    }
}

/// One discrete telemetry event from the firehose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEnvelope", into = "RawEnvelope")]
pub struct Envelope {
    pub origin: Option<String>,
    pub timestamp: Option<i64>,
    pub deployment: Option<String>,
    pub job: Option<String>,
    pub index: Option<String>,
    pub ip: Option<String>,
    pub event: Event,
}

impl Envelope {
    /// Envelope carrying `event` and no deployment metadata.
    #[must_use]
    pub fn new(event: Event) -> Self {
        Envelope {
            origin: None,
            timestamp: None,
            deployment: None,
            job: None,
            index: None,
            ip: None,
            event,
        }
    }

    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.event.event_type()
    }
}

#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    origin: Option<String>,
    event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deployment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    http_start_stop: Option<HttpStartStop>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_message: Option<LogMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value_metric: Option<ValueMetric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    counter_event: Option<CounterEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    container_metric: Option<ContainerMetric>,
}

impl From<RawEnvelope> for Envelope {
    fn from(raw: RawEnvelope) -> Self {
        let event = match raw.event_type.as_str() {
            HTTP_START_STOP => Event::HttpStartStop(raw.http_start_stop.unwrap_or_default()),
            LOG_MESSAGE => Event::LogMessage(raw.log_message.unwrap_or_default()),
            VALUE_METRIC => Event::ValueMetric(raw.value_metric.unwrap_or_default()),
            COUNTER_EVENT => Event::CounterEvent(raw.counter_event.unwrap_or_default()),
            ERROR => Event::Error(raw.error.unwrap_or_default()),
            CONTAINER_METRIC => Event::ContainerMetric(raw.container_metric.unwrap_or_default()),
            _ => Event::Unsupported {
                event_type: raw.event_type,
            },
        };
        Envelope {
            origin: raw.origin,
            timestamp: raw.timestamp,
            deployment: raw.deployment,
            job: raw.job,
            index: raw.index,
            ip: raw.ip,
            event,
        }
    }
}

impl From<Envelope> for RawEnvelope {
    fn from(envelope: Envelope) -> Self {
        let mut raw = RawEnvelope {
            origin: envelope.origin,
            timestamp: envelope.timestamp,
            deployment: envelope.deployment,
            job: envelope.job,
            index: envelope.index,
            ip: envelope.ip,
            ..RawEnvelope::default()
        };
        match envelope.event {
            Event::HttpStartStop(e) => {
                raw.event_type = HTTP_START_STOP.to_string();
                raw.http_start_stop = Some(e);
            }
            Event::LogMessage(e) => {
                raw.event_type = LOG_MESSAGE.to_string();
                raw.log_message = Some(e);
            }
            Event::ValueMetric(e) => {
                raw.event_type = VALUE_METRIC.to_string();
                raw.value_metric = Some(e);
            }
            Event::CounterEvent(e) => {
                raw.event_type = COUNTER_EVENT.to_string();
                raw.counter_event = Some(e);
            }
            Event::Error(e) => {
                raw.event_type = ERROR.to_string();
                raw.error = Some(e);
            }
            Event::ContainerMetric(e) => {
                raw.event_type = CONTAINER_METRIC.to_string();
                raw.container_metric = Some(e);
            }
            Event::Unsupported { event_type } => raw.event_type = event_type,
        }
        raw
    }
}
