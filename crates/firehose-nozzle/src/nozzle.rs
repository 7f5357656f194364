// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Routes one envelope at a time to the log sink or the metric sink.

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::envelope::Envelope;
use crate::errors::{self, Delivery};
use crate::labels::Labels;
use crate::serializer::Serializer;

/// Receives log records. Posting never reports failure back to the caller.
pub trait LogSink: Send {
    fn post_log(&mut self, payload: Envelope, labels: Labels);
}

/// Receives metrics one at a time.
#[async_trait]
pub trait MetricSink: Send {
    async fn post_metric(&mut self, name: &str, value: f64, labels: &Labels)
        -> Result<(), Delivery>;
}

pub struct Nozzle<L, M> {
    serializer: Serializer,
    log_sink: L,
    metric_sink: M,
}

impl<L: LogSink, M: MetricSink> Nozzle<L, M> {
    pub fn new(serializer: Serializer, log_sink: L, metric_sink: M) -> Self {
        Self {
            serializer,
            log_sink,
            metric_sink,
        }
    }

    /// Classifies `envelope` and forwards it.
    ///
    /// Every extracted metric is posted even when an earlier one fails; the returned
    /// error is the last failure seen for this envelope.
    pub async fn handle_event(&mut self, envelope: Envelope) -> Result<(), errors::HandleEvent> {
        let is_log = self.serializer.is_log(&envelope).map_err(|e| {
            error!("Cannot classify envelope: {e}");
            e
        })?;

        if is_log {
            let log = self.serializer.get_log(envelope);
            self.log_sink.post_log(log.payload, log.labels);
            return Ok(());
        }

        let metrics = self.serializer.get_metrics(&envelope)?;
        debug!("Posting {} metrics", metrics.len());

        let mut last_error = None;
        for metric in &metrics {
            if let Err(e) = self
                .metric_sink
                .post_metric(&metric.name, metric.value, &metric.labels)
                .await
            {
                warn!("Failed to post metric {}: {e}", metric.name);
                last_error = Some(e);
            }
        }

        match last_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub fn metric_sink(&self) -> &M {
        &self.metric_sink
    }
}
