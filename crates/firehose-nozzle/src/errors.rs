// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for classification, delivery and construction.

use thiserror::Error;

/// An envelope reached the classifier with an event type it has no schema for.
///
/// This is a programming fault rather than a recoverable per-call error: callers are
/// expected to log it loudly and move on to the next envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Classify {
    #[error("unknown event type: {0}")]
    UnknownEventType(String),
}

/// The backend rejected (or never received) a log or metric post.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Delivery {
    pub message: String,
}

impl Delivery {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result of dispatching a single envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandleEvent {
    #[error(transparent)]
    Classify(#[from] Classify),
    #[error(transparent)]
    Delivery(#[from] Delivery),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Creation {
    #[error("metrics buffer capacity must be at least 1")]
    ZeroCapacity,
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Debug, Error)]
pub enum Config {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {name}")]
    InvalidValue { name: &'static str, value: String },
    #[error("failed to load app metadata from {path}: {reason}")]
    AppMetadata { path: String, reason: String },
}
