// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batched delivery of application metrics to Kinesis Data Firehose.
//!
//! ```text
//! add() ─> MetricValidator ─> make_batches ─> Flusher ──> Firehose
//!                │                              │  ▲
//!                │                              │  └── FirehoseFactory <── CredentialCache
//!                └──────────> FailureNotifier <─┘
//! ```
//!
//! Credentials come from an assumed role and are renewed once expired; the
//! Firehose client is rebuilt whenever they change. Each batch is retried up
//! to [`config::MAX_ATTEMPTS`] times before it is handed to the
//! `create-error` listeners.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch;
pub mod client;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod firehose;
pub mod flusher;
pub mod http;
pub mod logger;
pub mod metric;
pub mod notifier;
pub mod sigv4;
pub mod validate;

pub use client::{MetricsClient, MetricsClientBuilder};
pub use config::{MetricsConfig, Settlement};
pub use errors::MetricError;
pub use notifier::{CreateError, EventKind, FailedMetrics, FailureNotifier};
