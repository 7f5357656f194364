// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use firehose_nozzle::{
    app_cache::{AppInfoCache, StaticAppCache},
    backend::{BackendClient, BackendConfig},
    buffer_service::BufferService,
    config,
    credentials::TokenFactory,
    errors::Delivery,
    firehose::{FirehoseConfig, FirehoseServer},
    metrics_buffer::MetricsBuffer,
    nozzle::{MetricSink, Nozzle},
    serializer::Serializer,
};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("NOZZLE_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match config::Config::new() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating config on firehose nozzle startup: {e}");
            return;
        }
    };

    let app_cache: Option<Arc<dyn AppInfoCache>> = match &config.app_metadata_path {
        Some(path) => match StaticAppCache::from_json_file(path) {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                error!("{e}");
                return;
            }
        },
        None => None,
    };

    let client = match BackendClient::new(BackendConfig {
        endpoint: config.backend_url.clone(),
        token_factory: Arc::new(TokenFactory::from(config.backend_token.clone())),
        timeout: config.timeout,
        https_proxy: config.https_proxy.clone(),
        compression_level: config.compression_level,
    }) {
        Ok(client) => client,
        Err(e) => {
            error!("Error creating backend client: {e}");
            return;
        }
    };

    let firehose_config = FirehoseConfig {
        host: config.firehose_host.clone(),
        port: config.firehose_port,
    };
    let serializer = Serializer::new(app_cache);
    let cancel_token = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel_token.clone()));

    if !config.batching {
        info!("metric batching disabled");
        let nozzle = Nozzle::new(serializer, client.clone(), client);
        serve(&firehose_config, nozzle, cancel_token).await;
        return;
    }

    let (buffer, errs) = match MetricsBuffer::with_error_capacity(
        config.batch_size,
        client.clone(),
        config.error_channel_capacity,
    ) {
        Ok(created) => created,
        Err(e) => {
            error!("Error creating metrics buffer: {e}");
            return;
        }
    };
    let dropped_errors = buffer.dropped_errors_counter();
    tokio::spawn(log_flush_errors(errs));

    let (service, handle) = BufferService::new(buffer);
    let service_task = tokio::spawn(service.run());

    let nozzle = Nozzle::new(serializer, client, handle.clone());
    serve(&firehose_config, nozzle, cancel_token).await;

    // the service flushes whatever is pending before it stops
    if handle.shutdown().is_err() {
        warn!("Metrics buffer service already stopped");
    }
    if let Err(e) = service_task.await {
        error!("Metrics buffer service failed: {e}");
    }

    let dropped = dropped_errors.load(Ordering::Relaxed);
    if dropped > 0 {
        warn!("{dropped} flush errors were dropped because the error channel was full");
    }
}

async fn serve<M: MetricSink>(
    config: &FirehoseConfig,
    nozzle: Nozzle<BackendClient, M>,
    cancel_token: CancellationToken,
) {
    let server = match FirehoseServer::new(config, nozzle, cancel_token).await {
        Ok(server) => server,
        Err(e) => {
            error!(
                "Failed to bind firehose socket on {}:{}: {e}",
                config.host, config.port
            );
            return;
        }
    };
    info!("firehose-udp: starting to listen on port {}", config.port);
    server.spin().await;
}

async fn log_flush_errors(mut errs: mpsc::Receiver<Delivery>) {
    while let Some(e) = errs.recv().await {
        error!("Failed to flush metrics: {e}");
    }
}

async fn cancel_on_ctrl_c(cancel_token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for shutdown signal: {e}");
        return;
    }
    info!("Received shutdown signal");
    cancel_token.cancel();
}
