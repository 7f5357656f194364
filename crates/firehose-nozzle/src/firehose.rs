// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Firehose ingest server.
//!
//! Receives newline-delimited JSON envelopes over UDP, decodes them and hands each one
//! to the [`Nozzle`]. A bad line never stops the loop: decode failures and delivery
//! failures are logged and the next envelope is processed.

use std::net::SocketAddr;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::constants::BUFFER_SIZE;
use crate::envelope::Envelope;
use crate::errors::HandleEvent;
use crate::nozzle::{LogSink, MetricSink, Nozzle};

const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct FirehoseConfig {
    /// Host to bind the UDP socket to (e.g., "0.0.0.0")
    pub host: String,
    /// Port to bind the UDP socket to
    pub port: u16,
}

enum BufferReader {
    UdpSocket(tokio::net::UdpSocket),

    /// Replays a fixed buffer, for tests
    #[allow(dead_code)]
    MirrorTest(Vec<u8>, SocketAddr),

    /// Fails every read, for tests
    #[cfg(test)]
    FailingTest,
}

impl BufferReader {
    async fn read(&self) -> std::io::Result<(Vec<u8>, SocketAddr)> {
        match self {
            BufferReader::UdpSocket(socket) => {
                let mut buf = vec![0; BUFFER_SIZE];
                let (amt, src) = socket.recv_from(&mut buf).await?;
                buf.truncate(amt);
                Ok((buf, src))
            }
            BufferReader::MirrorTest(data, addr) => Ok((data.clone(), *addr)),
            #[cfg(test)]
            BufferReader::FailingTest => Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "socket closed",
            )),
        }
    }
}

pub struct FirehoseServer<L, M> {
    cancel_token: CancellationToken,
    nozzle: Nozzle<L, M>,
    buffer_reader: BufferReader,
}

impl<L: LogSink, M: MetricSink> FirehoseServer<L, M> {
    pub async fn new(
        config: &FirehoseConfig,
        nozzle: Nozzle<L, M>,
        cancel_token: CancellationToken,
    ) -> std::io::Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let socket = tokio::net::UdpSocket::bind(&addr).await?;
        debug!("Firehose listening on {addr}");

        Ok(Self {
            cancel_token,
            nozzle,
            buffer_reader: BufferReader::UdpSocket(socket),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.buffer_reader {
            BufferReader::UdpSocket(socket) => socket.local_addr().ok(),
            BufferReader::MirrorTest(_, addr) => Some(*addr),
            #[cfg(test)]
            BufferReader::FailingTest => None,
        }
    }

    /// Receives and dispatches envelopes until cancelled. Returns the nozzle so the
    /// caller can flush its sinks.
    ///
    /// A failing socket is retried after [`READ_RETRY_DELAY`]. Only the first failure of
    /// a streak is logged at error level.
    pub async fn spin(mut self) -> Nozzle<L, M> {
        let mut read_failures: u64 = 0;
        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                read = self.buffer_reader.read() => match read {
                    Ok((buf, src)) => {
                        read_failures = 0;
                        self.consume_envelopes(&buf, src).await;
                    }
                    Err(e) => {
                        read_failures += 1;
                        if read_failures == 1 {
                            error!("Failed to read from firehose socket: {e}");
                        } else {
                            debug!("Firehose socket read failed {read_failures} times in a row: {e}");
                        }
                        tokio::time::sleep(READ_RETRY_DELAY).await;
                    }
                },
            }
        }
        debug!("Firehose server stopped");
        self.nozzle
    }

    async fn consume_envelopes(&mut self, buf: &[u8], src: SocketAddr) {
        let msgs = match std::str::from_utf8(buf) {
            Ok(msgs) => msgs,
            Err(e) => {
                error!("Dropping non UTF-8 datagram from {src}: {e}");
                return;
            }
        };
        trace!("Received {} bytes from {src}", buf.len());

        for line in msgs.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let envelope: Envelope = match serde_json::from_str(line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    error!("Failed to decode envelope from {src}: {e}");
                    continue;
                }
            };
            match self.nozzle.handle_event(envelope).await {
                Ok(()) => {}
                Err(HandleEvent::Delivery(e)) => warn!("Failed to deliver envelope: {e}"),
                // already logged by the nozzle
                Err(HandleEvent::Classify(_)) => {}
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::labels::Labels;
    use crate::metrics_buffer::tests::MockAdapter;
    use crate::metrics_buffer::MetricsBuffer;
    use crate::serializer::Serializer;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::{Arc, Mutex};
    use tracing_test::traced_test;

    #[derive(Clone, Default)]
    struct RecordingLogSink {
        logs: Arc<Mutex<Vec<(Envelope, Labels)>>>,
    }

    impl LogSink for RecordingLogSink {
        fn post_log(&mut self, payload: Envelope, labels: Labels) {
            self.logs.lock().unwrap().push((payload, labels));
        }
    }

    fn mirror_server(
        data: &str,
        size: usize,
    ) -> (
        FirehoseServer<RecordingLogSink, MetricsBuffer<MockAdapter>>,
        RecordingLogSink,
        MockAdapter,
    ) {
        let logs = RecordingLogSink::default();
        let adapter = MockAdapter::default();
        let (buffer, _errs) = MetricsBuffer::new(size, adapter.clone()).unwrap();
        let server = FirehoseServer {
            cancel_token: CancellationToken::new(),
            nozzle: Nozzle::new(Serializer::default(), logs.clone(), buffer),
            buffer_reader: BufferReader::MirrorTest(
                data.as_bytes().to_vec(),
                SocketAddr::new(IpAddr::V4(Ipv4Addr::new(111, 112, 113, 114)), 0),
            ),
        };
        (server, logs, adapter)
    }

    async fn consume_once(server: &mut FirehoseServer<RecordingLogSink, MetricsBuffer<MockAdapter>>) {
        let (buf, src) = server.buffer_reader.read().await.unwrap();
        server.consume_envelopes(&buf, src).await;
    }

    #[tokio::test]
    async fn test_routes_logs_and_metrics() {
        let (mut server, logs, adapter) = mirror_server(
            r#"{"eventType":"LogMessage","logMessage":{"message":"hi","appId":"app-1"}}
{"eventType":"ValueMetric","valueMetric":{"name":"requests","value":3}}
{"eventType":"CounterEvent","counterEvent":{"name":"hits","delta":1,"total":9}}
"#,
            1,
        );

        consume_once(&mut server).await;

        assert_eq!(logs.logs.lock().unwrap().len(), 2);
        let batches = adapter.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].name, "requests");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_skips_undecodable_lines() {
        let (mut server, logs, _adapter) = mirror_server(
            "not json\n\n{\"eventType\":\"Error\",\"error\":{\"message\":\"x\"}}\n",
            10,
        );

        consume_once(&mut server).await;

        assert!(logs_contain("Failed to decode envelope"));
        assert_eq!(logs.logs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unknown_event_type_is_logged_loudly() {
        let (mut server, logs, adapter) = mirror_server("{\"eventType\":\"Heartbeat\"}", 1);

        consume_once(&mut server).await;

        assert!(logs_contain("unknown event type: Heartbeat"));
        assert!(logs.logs.lock().unwrap().is_empty());
        assert!(adapter.batches().is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failing_socket_backs_off() {
        let (buffer, _errs) = MetricsBuffer::new(10, MockAdapter::default()).unwrap();
        let server = FirehoseServer {
            cancel_token: CancellationToken::new(),
            nozzle: Nozzle::new(Serializer::default(), RecordingLogSink::default(), buffer),
            buffer_reader: BufferReader::FailingTest,
        };
        let cancel_token = server.cancel_token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(350)).await;
            cancel_token.cancel();
        });

        server.spin().await;

        logs_assert(|lines: &[&str]| {
            let errors = lines
                .iter()
                .filter(|line| line.contains("Failed to read from firehose socket"))
                .count();
            let repeats = lines
                .iter()
                .filter(|line| line.contains("times in a row"))
                .count();
            if errors != 1 {
                return Err(format!("expected one error line, got {errors}"));
            }
            if repeats == 0 || repeats > 10 {
                return Err(format!("expected a few retries, got {repeats}"));
            }
            Ok(())
        });
    }

    #[tokio::test]
    async fn test_spin_stops_when_cancelled() {
        let logs = RecordingLogSink::default();
        let adapter = MockAdapter::default();
        let (buffer, _errs) = MetricsBuffer::new(10, adapter).unwrap();
        let cancel_token = CancellationToken::new();
        let server = FirehoseServer::new(
            &FirehoseConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            Nozzle::new(Serializer::default(), logs, buffer),
            cancel_token.clone(),
        )
        .await
        .unwrap();
        assert!(server.local_addr().is_some());

        let task = tokio::spawn(server.spin());
        cancel_token.cancel();
        let nozzle = task.await.unwrap();

        assert!(nozzle.metric_sink().is_empty());
    }
}
