// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use firehose_nozzle::{
    backend::{BackendClient, BackendConfig},
    buffer_service::BufferService,
    credentials::TokenFactory,
    firehose::{FirehoseConfig, FirehoseServer},
    metrics_buffer::MetricsBuffer,
    nozzle::Nozzle,
    serializer::Serializer,
};
use mockito::{Matcher, Server};
use std::sync::Arc;
use tokio::{
    net::UdpSocket,
    time::{sleep, timeout, Duration},
};
use tokio_util::sync::CancellationToken;

fn backend(url: String) -> BackendClient {
    BackendClient::new(BackendConfig {
        endpoint: url,
        token_factory: Arc::new(TokenFactory::new_from_static_token("mock-token")),
        timeout: Duration::from_secs(5),
        https_proxy: None,
        compression_level: None,
    })
    .expect("failed to create backend client")
}

#[cfg(test)]
#[tokio::test]
async fn firehose_server_ships_metric_batches() {
    let mut mock_server = Server::new_async().await;

    let mock = mock_server
        .mock("POST", "/v1/metrics")
        .match_header("authorization", "Bearer mock-token")
        .match_header("Content-Type", "application/json")
        .match_body(Matcher::PartialJsonString(
            r#"{"metrics":[{"name":"requests","value":3.0,"labels":{"cloudFoundry/origin":"gorouter","cloudFoundry/eventType":"ValueMetric"}}]}"#
                .to_string(),
        ))
        .with_status(202)
        .create_async()
        .await;

    let client = backend(mock_server.url());
    let (buffer, _errs) =
        MetricsBuffer::new(10, client.clone()).expect("failed to create metrics buffer");
    let (service, handle) = BufferService::new(buffer);
    tokio::spawn(service.run());

    let cancel_token = CancellationToken::new();
    let server = FirehoseServer::new(
        &FirehoseConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        Nozzle::new(Serializer::default(), client, handle.clone()),
        cancel_token.clone(),
    )
    .await
    .expect("failed to bind firehose server");
    let server_address = server.local_addr().expect("server has no address");
    tokio::spawn(server.spin());

    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("unable to bind UDP socket");
    let envelope = r#"{"origin":"gorouter","eventType":"ValueMetric","valueMetric":{"name":"requests","value":3}}"#;
    socket
        .send_to(envelope.as_bytes(), server_address)
        .await
        .expect("unable to send envelope");

    let flush = async {
        while !mock.matched_async().await {
            sleep(Duration::from_millis(50)).await;
            handle.flush().await.expect("flush failed");
        }
    };

    let result = timeout(Duration::from_millis(2000), flush).await;
    cancel_token.cancel();

    match result {
        Ok(_) => mock.assert_async().await,
        Err(_) => panic!("timed out before backend received metric batch"),
    }
}

#[cfg(test)]
#[tokio::test]
async fn failed_batch_is_reported_on_error_channel() {
    let mut mock_server = Server::new_async().await;
    let _mock = mock_server
        .mock("POST", "/v1/metrics")
        .with_status(503)
        .with_body("unavailable")
        .create_async()
        .await;

    let (mut buffer, mut errs) = MetricsBuffer::new(1, backend(mock_server.url()))
        .expect("failed to create metrics buffer");

    buffer
        .post_metric(firehose_nozzle::serializer::Metric::new(
            "cpu",
            0.5,
            Default::default(),
        ))
        .await;

    let err = timeout(Duration::from_secs(2), errs.recv())
        .await
        .expect("timed out waiting for delivery error")
        .expect("error channel closed");
    assert!(err.to_string().starts_with("503"));
    assert!(err.to_string().ends_with("unavailable"));
}
