// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors surfaced by the metrics pipeline, either returned from
/// [`crate::client::MetricsClient::add`] or delivered through the failure notifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricError {
    #[error("Invalid metric: {0}")]
    InvalidMetric(String),

    #[error("{0}")]
    Firehose(String),

    #[error("{0}")]
    NoEnvironment(String),

    #[error("{0}")]
    AssumeRole(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MetricError {
    /// Stable numeric code for the error kind.
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            Self::InvalidMetric(_) => 1,
            Self::Firehose(_) => 2,
            Self::NoEnvironment(_) => 3,
            Self::AssumeRole(_) => 4,
            Self::InvalidConfig(_) => 5,
        }
    }
}

/// Failure of a single `PutRecordBatch` call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ShippingError {
    #[error("Failed to prepare payload: {0}")]
    Payload(String),

    #[error("Error shipping data: {1}")]
    Destination(Option<StatusCode>, String),
}
