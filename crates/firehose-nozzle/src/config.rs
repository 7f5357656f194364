// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_ERROR_CHANNEL_CAPACITY};
use crate::errors;

const DEFAULT_FIREHOSE_HOST: &str = "0.0.0.0";
const DEFAULT_FIREHOSE_PORT: u16 = 8095;
const DEFAULT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub backend_url: String,
    pub backend_token: Option<String>,
    pub firehose_host: String,
    pub firehose_port: u16,
    /// distinct metrics held before a batch is flushed
    pub batch_size: usize,
    pub error_channel_capacity: usize,
    /// post metrics through the batching buffer instead of one request per metric
    pub batching: bool,
    pub timeout: Duration,
    pub compression_level: Option<i32>,
    pub app_metadata_path: Option<PathBuf>,
    pub https_proxy: Option<String>,
}

impl Config {
    pub fn new() -> Result<Config, errors::Config> {
        let backend_url = env::var("NOZZLE_BACKEND_URL")
            .map_err(|_| errors::Config::Missing("NOZZLE_BACKEND_URL"))?;

        let batch_size = non_zero(
            "NOZZLE_BATCH_SIZE",
            parse_var("NOZZLE_BATCH_SIZE")?.unwrap_or(DEFAULT_BATCH_SIZE),
        )?;
        let error_channel_capacity = non_zero(
            "NOZZLE_ERROR_CHANNEL_CAPACITY",
            parse_var("NOZZLE_ERROR_CHANNEL_CAPACITY")?.unwrap_or(DEFAULT_ERROR_CHANNEL_CAPACITY),
        )?;

        let batching = env::var("NOZZLE_BATCHING")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(true);

        Ok(Config {
            backend_url,
            backend_token: env::var("NOZZLE_BACKEND_TOKEN").ok(),
            firehose_host: env::var("NOZZLE_FIREHOSE_HOST")
                .unwrap_or_else(|_| DEFAULT_FIREHOSE_HOST.to_string()),
            firehose_port: parse_var("NOZZLE_FIREHOSE_PORT")?.unwrap_or(DEFAULT_FIREHOSE_PORT),
            batch_size,
            error_channel_capacity,
            batching,
            timeout: Duration::from_secs(
                parse_var("NOZZLE_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            compression_level: parse_var("NOZZLE_COMPRESSION_LEVEL")?,
            app_metadata_path: env::var("NOZZLE_APP_METADATA_PATH").ok().map(PathBuf::from),
            https_proxy: env::var("NOZZLE_PROXY_HTTPS")
                .or_else(|_| env::var("HTTPS_PROXY"))
                .ok(),
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, errors::Config> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| errors::Config::InvalidValue { name, value }),
        Err(_) => Ok(None),
    }
}

fn non_zero(name: &'static str, value: usize) -> Result<usize, errors::Config> {
    if value == 0 {
        return Err(errors::Config::InvalidValue {
            name,
            value: value.to_string(),
        });
    }
    Ok(value)
}
