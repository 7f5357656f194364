// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client for the metrics-and-logging backend.
//!
//! Metrics are posted as `{"metrics": [...]}` to `/v1/metrics`, logs as
//! `{"payload": <envelope>, "labels": {...}}` to `/v1/logs`. Bodies are JSON, optionally
//! zstd compressed. Any 2xx response counts as accepted. There are no retries here: a
//! failed post surfaces as a [`Delivery`] error to whoever issued it.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, error, warn};
use zstd::stream::write::Encoder;

use crate::constants::{LOGS_PATH, METRICS_PATH};
use crate::credentials::TokenFactory;
use crate::envelope::Envelope;
use crate::errors::{self, Delivery};
use crate::labels::Labels;
use crate::metrics_buffer::MetricAdapter;
use crate::nozzle::{LogSink, MetricSink};
use crate::serializer::Metric;

pub struct BackendConfig {
    /// Base URL, e.g. `https://metrics.example.com`
    pub endpoint: String,
    pub token_factory: Arc<TokenFactory>,
    pub timeout: Duration,
    pub https_proxy: Option<String>,
    /// zstd level; `None` sends bodies uncompressed
    pub compression_level: Option<i32>,
}

#[derive(Clone, Debug)]
pub struct BackendClient {
    client: reqwest::Client,
    endpoint: String,
    token_factory: Arc<TokenFactory>,
    compression_level: Option<i32>,
}

#[derive(Debug)]
pub enum ShippingError {
    Payload(String),
    Destination(Option<StatusCode>, String),
}

impl From<ShippingError> for Delivery {
    fn from(err: ShippingError) -> Self {
        match err {
            ShippingError::Payload(msg) => Delivery::new(format!("Failed to prepare payload: {msg}")),
            ShippingError::Destination(Some(status), msg) => Delivery::new(format!("{status}: {msg}")),
            ShippingError::Destination(None, msg) => Delivery::new(msg),
        }
    }
}

#[derive(Serialize)]
struct MetricsPayload<'a> {
    metrics: &'a [Metric],
}

#[derive(Serialize)]
struct LogPayload<'a> {
    payload: &'a Envelope,
    labels: &'a Labels,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Result<Self, errors::Creation> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if let Some(proxy) = &config.https_proxy {
            let proxy = reqwest::Proxy::https(proxy)
                .map_err(|e| errors::Creation::HttpClient(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| errors::Creation::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token_factory: config.token_factory,
            compression_level: config.compression_level,
        })
    }

    pub async fn ship_metrics(&self, metrics: &[Metric]) -> Result<(), Delivery> {
        let body = serde_json::to_vec(&MetricsPayload { metrics })
            .map_err(|e| ShippingError::Payload(e.to_string()))?;
        self.ship(METRICS_PATH, body).await?;
        debug!("Shipped {} metrics", metrics.len());
        Ok(())
    }

    pub async fn ship_log(&self, payload: &Envelope, labels: &Labels) -> Result<(), Delivery> {
        let body = serde_json::to_vec(&LogPayload { payload, labels })
            .map_err(|e| ShippingError::Payload(e.to_string()))?;
        self.ship(LOGS_PATH, body).await?;
        Ok(())
    }

    async fn ship(&self, path: &str, body: Vec<u8>) -> Result<(), ShippingError> {
        let url = format!("{}{path}", self.endpoint);
        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");

        let body = match self.compression_level {
            Some(level) => {
                request = request.header("Content-Encoding", "zstd");
                encode(&body, level).map_err(|e| ShippingError::Payload(e.to_string()))?
            }
            None => body,
        };
        if let Some(token) = self.token_factory.get_token() {
            request = request.bearer_auth(token);
        }

        let start = Instant::now();
        let resp = request
            .body(body)
            .send()
            .await
            .map_err(|e| ShippingError::Destination(e.status(), format!("Cannot reach {url}: {e}")))?;

        let status = resp.status();
        debug!(
            "Backend answered {status} for {path} in {}ms",
            start.elapsed().as_millis()
        );
        if status.is_success() {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(ShippingError::Destination(Some(status), text))
    }
}

fn encode(data: &[u8], level: i32) -> std::io::Result<Vec<u8>> {
    let mut encoder = Encoder::new(Vec::new(), level)?;
    encoder.write_all(data)?;
    encoder.finish()
}

#[async_trait]
impl MetricAdapter for BackendClient {
    async fn post_metrics(&self, metrics: &[Metric]) -> Result<(), Delivery> {
        self.ship_metrics(metrics).await
    }
}

#[async_trait]
impl MetricSink for BackendClient {
    async fn post_metric(
        &mut self,
        name: &str,
        value: f64,
        labels: &Labels,
    ) -> Result<(), Delivery> {
        self.ship_metrics(&[Metric::new(name, value, labels.clone())])
            .await
    }
}

impl LogSink for BackendClient {
    fn post_log(&mut self, payload: Envelope, labels: Labels) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("No async runtime available, dropping log");
            return;
        };
        let client = self.clone();
        runtime.spawn(async move {
            if let Err(e) = client.ship_log(&payload, &labels).await {
                warn!("Failed to post log: {e}");
            }
        });
    }
}
