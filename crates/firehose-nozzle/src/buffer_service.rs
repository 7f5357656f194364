// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::errors::Delivery;
use crate::labels::Labels;
use crate::metrics_buffer::{MetricAdapter, MetricsBuffer};
use crate::nozzle::MetricSink;
use crate::serializer::Metric;

#[derive(Debug)]
pub enum BufferCommand {
    Post(Metric),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Cloneable front for a [`BufferService`]; any number of producers may hold one.
#[derive(Clone, Debug)]
pub struct BufferHandle {
    tx: mpsc::UnboundedSender<BufferCommand>,
}

impl BufferHandle {
    pub fn post(&self, metric: Metric) -> Result<(), mpsc::error::SendError<BufferCommand>> {
        self.tx.send(BufferCommand::Post(metric))
    }

    /// Posts every pending metric and waits until the adapter call has returned.
    pub async fn flush(&self) -> Result<(), String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(BufferCommand::Flush(response_tx))
            .map_err(|e| format!("Failed to send flush command: {}", e))?;

        response_rx
            .await
            .map_err(|e| format!("Failed to receive flush response: {}", e))
    }

    pub fn shutdown(&self) -> Result<(), mpsc::error::SendError<BufferCommand>> {
        self.tx.send(BufferCommand::Shutdown)
    }
}

#[async_trait]
impl MetricSink for BufferHandle {
    async fn post_metric(
        &mut self,
        name: &str,
        value: f64,
        labels: &Labels,
    ) -> Result<(), Delivery> {
        self.post(Metric::new(name, value, labels.clone()))
            .map_err(|_| Delivery::new("metrics buffer service is not running"))
    }
}

/// Owns a [`MetricsBuffer`] and applies commands to it one at a time.
pub struct BufferService<A> {
    buffer: MetricsBuffer<A>,
    rx: mpsc::UnboundedReceiver<BufferCommand>,
}

impl<A: MetricAdapter> BufferService<A> {
    pub fn new(buffer: MetricsBuffer<A>) -> (Self, BufferHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { buffer, rx }, BufferHandle { tx })
    }

    pub async fn run(mut self) {
        debug!("Metrics buffer service started");

        while let Some(command) = self.rx.recv().await {
            match command {
                BufferCommand::Post(metric) => self.buffer.post_metric(metric).await,

                BufferCommand::Flush(response_tx) => {
                    self.buffer.flush().await;
                    if response_tx.send(()).is_err() {
                        error!("Failed to send flush response - receiver dropped");
                    }
                }

                BufferCommand::Shutdown => {
                    debug!("Metrics buffer service shutting down");
                    break;
                }
            }
        }

        // handles dropped or shut down: nothing pending is left behind
        self.buffer.flush().await;
        debug!("Metrics buffer service stopped");
    }
}
