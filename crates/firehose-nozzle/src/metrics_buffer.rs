// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Capacity-bounded batching of outbound metrics.
//!
//! The buffer is an append log of pending metrics with distinct identities (name plus
//! labels). Posting a metric whose identity is already pending does not touch the
//! pending entry: the new metric is flushed on its own right away. Once the log holds
//! `size` entries it is flushed as one batch and cleared, whatever the outcome.
//!
//! Flush failures never reach the caller of [`MetricsBuffer::post_metric`]. They are
//! handed to a bounded error channel with `try_send`, so a slow or absent consumer can
//! not stall ingestion. When the channel is full the error is dropped and counted in
//! [`MetricsBuffer::dropped_errors`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::constants::DEFAULT_ERROR_CHANNEL_CAPACITY;
use crate::errors::{self, Delivery};
use crate::labels::Labels;
use crate::nozzle::MetricSink;
use crate::serializer::Metric;

/// Posts a batch of metrics to the backend in one call.
#[async_trait]
pub trait MetricAdapter: Send + Sync {
    async fn post_metrics(&self, metrics: &[Metric]) -> Result<(), Delivery>;
}

pub struct MetricsBuffer<A> {
    size: usize,
    adapter: A,
    errs: mpsc::Sender<Delivery>,
    dropped_errors: Arc<AtomicU64>,
    metrics: Vec<Metric>,
}

impl<A: MetricAdapter> MetricsBuffer<A> {
    /// Creates a buffer flushing every `size` distinct metrics, and the receiving end
    /// of its error channel.
    pub fn new(
        size: usize,
        adapter: A,
    ) -> Result<(Self, mpsc::Receiver<Delivery>), errors::Creation> {
        Self::with_error_capacity(size, adapter, DEFAULT_ERROR_CHANNEL_CAPACITY)
    }

    pub fn with_error_capacity(
        size: usize,
        adapter: A,
        error_capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<Delivery>), errors::Creation> {
        if size == 0 {
            return Err(errors::Creation::ZeroCapacity);
        }
        let (errs, rx) = mpsc::channel(error_capacity.max(1));
        let buffer = Self {
            size,
            adapter,
            errs,
            dropped_errors: Arc::new(AtomicU64::new(0)),
            metrics: Vec::with_capacity(size),
        };
        Ok((buffer, rx))
    }

    pub async fn post_metric(&mut self, metric: Metric) {
        if self.metrics.iter().any(|m| m.same_identity(&metric)) {
            debug!("Metric {} already pending, posting it on its own", metric.name);
            self.post_metrics(&[metric]).await;
            return;
        }

        self.metrics.push(metric);
        if self.metrics.len() < self.size {
            return;
        }

        let batch = std::mem::take(&mut self.metrics);
        self.post_metrics(&batch).await;
        self.metrics.reserve(self.size);
    }

    /// Posts every pending metric, if any.
    pub async fn flush(&mut self) {
        if self.metrics.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.metrics);
        self.post_metrics(&batch).await;
    }

    async fn post_metrics(&self, metrics: &[Metric]) {
        debug!("Flushing {} metrics", metrics.len());
        if let Err(e) = self.adapter.post_metrics(metrics).await {
            self.report(e);
        }
    }

    fn report(&self, err: Delivery) {
        match self.errs.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                let dropped = self.dropped_errors.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("Error channel full, dropping flush error ({dropped} dropped so far): {err}");
            }
            Err(TrySendError::Closed(err)) => {
                debug!("No consumer for flush errors, discarding: {err}");
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Pending metrics, oldest first.
    #[must_use]
    pub fn pending(&self) -> &[Metric] {
        &self.metrics
    }

    /// Number of flush errors discarded because the error channel was full.
    #[must_use]
    pub fn dropped_errors(&self) -> u64 {
        self.dropped_errors.load(Ordering::Relaxed)
    }

    /// Shared view of the dropped error counter, for monitoring from other tasks.
    #[must_use]
    pub fn dropped_errors_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped_errors)
    }
}

#[async_trait]
impl<A: MetricAdapter> MetricSink for MetricsBuffer<A> {
    /// Always succeeds: flush failures are reported on the error channel.
    async fn post_metric(
        &mut self,
        name: &str,
        value: f64,
        labels: &Labels,
    ) -> Result<(), Delivery> {
        MetricsBuffer::post_metric(self, Metric::new(name, value, labels.clone())).await;
        Ok(())
    }
}
