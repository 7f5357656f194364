// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Namespace for every label key attached to logs and metrics.
pub const LABEL_PREFIX: &str = "cloudFoundry/";

/// Default number of distinct metrics held before the buffer flushes.
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Default number of undelivered flush errors held for the error consumer.
pub const DEFAULT_ERROR_CHANNEL_CAPACITY: usize = 1024;

// Firehose datagrams carry newline-delimited JSON envelopes; 64KB is the UDP ceiling
pub const BUFFER_SIZE: usize = 65_535;

pub const METRICS_PATH: &str = "/v1/metrics";
pub const LOGS_PATH: &str = "/v1/logs";
