// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Envelope classification and metric extraction.
//!
//! Each envelope is either a log (forwarded verbatim with labels) or a source of one
//! or more numeric metrics:
//!
//! | event type      | classification |
//! |-----------------|----------------|
//! | HttpStartStop   | log            |
//! | LogMessage      | log            |
//! | Error           | log            |
//! | CounterEvent    | log            |
//! | ValueMetric     | metric         |
//! | ContainerMetric | metric (six)   |
//!
//! Any other type is a [`Classify::UnknownEventType`] fault.

use std::sync::Arc;

use serde::Serialize;

use crate::app_cache::AppInfoCache;
use crate::envelope::{Envelope, Event};
use crate::errors::Classify;
use crate::labels::{self, Labels};

/// A named numeric sample with its labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    pub labels: Labels,
}

impl Metric {
    #[must_use]
    pub fn new(name: impl Into<String>, value: f64, labels: Labels) -> Self {
        Self {
            name: name.into(),
            value,
            labels,
        }
    }

    /// Two metrics share an identity when name and the full label map are equal.
    #[must_use]
    pub fn same_identity(&self, other: &Metric) -> bool {
        self.name == other.name && self.labels == other.labels
    }
}

/// An envelope forwarded as an unstructured log record.
#[derive(Debug, Clone, PartialEq)]
pub struct Log {
    pub payload: Envelope,
    pub labels: Labels,
}

#[derive(Clone, Default)]
pub struct Serializer {
    app_cache: Option<Arc<dyn AppInfoCache>>,
}

impl Serializer {
    #[must_use]
    pub fn new(app_cache: Option<Arc<dyn AppInfoCache>>) -> Self {
        Self { app_cache }
    }

    pub fn is_log(&self, envelope: &Envelope) -> Result<bool, Classify> {
        match &envelope.event {
            Event::HttpStartStop(_) | Event::LogMessage(_) | Event::Error(_) => Ok(true),
            Event::ValueMetric(_) | Event::ContainerMetric(_) => Ok(false),
            // counters are not forwarded as metrics yet
            Event::CounterEvent(_) => Ok(true),
            Event::Unsupported { event_type } => {
                Err(Classify::UnknownEventType(event_type.clone()))
            }
        }
    }

    #[must_use]
    pub fn get_log(&self, envelope: Envelope) -> Log {
        let labels = self.build_labels(&envelope);
        Log {
            payload: envelope,
            labels,
        }
    }

    pub fn get_metrics(&self, envelope: &Envelope) -> Result<Vec<Metric>, Classify> {
        match &envelope.event {
            Event::ValueMetric(value_metric) => Ok(vec![Metric::new(
                value_metric.name.clone(),
                value_metric.value,
                self.build_labels(envelope),
            )]),
            Event::ContainerMetric(container) => {
                let labels = self.build_labels(envelope);
                #[allow(clippy::cast_precision_loss)]
                let samples = [
                    ("diskBytesQuota", container.disk_bytes_quota as f64),
                    ("instanceIndex", f64::from(container.instance_index)),
                    ("cpuPercentage", container.cpu_percentage),
                    ("diskBytes", container.disk_bytes as f64),
                    ("memoryBytes", container.memory_bytes as f64),
                    ("memoryBytesQuota", container.memory_bytes_quota as f64),
                ];
                Ok(samples
                    .into_iter()
                    .map(|(name, value)| Metric::new(name, value, labels.clone()))
                    .collect())
            }
            other => Err(Classify::UnknownEventType(
                other.event_type().to_string(),
            )),
        }
    }

    fn build_labels(&self, envelope: &Envelope) -> Labels {
        labels::build_labels(envelope, self.app_cache.as_deref())
    }
}

impl std::fmt::Debug for Serializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Serializer")
            .field("app_cache", &self.app_cache.is_some())
            .finish()
    }
}
