// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Cloud Foundry firehose nozzle.
//!
//! Envelopes are classified as logs or metrics by the [`serializer`], labelled from
//! their origin and application metadata, and dispatched by the [`nozzle`] to a log sink
//! and a metric sink. The [`metrics_buffer`] batches distinct metrics before they reach
//! the [`backend`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod app_cache;
pub mod backend;
pub mod buffer_service;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod envelope;
pub mod errors;
pub mod firehose;
pub mod labels;
pub mod metrics_buffer;
pub mod nozzle;
pub mod serializer;
