// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Failure notification channel.
//!
//! Metrics are fire-and-forget for callers of [`crate::client::MetricsClient::add`];
//! listeners registered here are the only way to observe metrics that were
//! rejected or could not be delivered.
//!
//! ```text
//! validator ──┐
//!             ├──> FailureNotifier::publish ──> listener 1
//! flusher ────┘                            ├──> listener 2
//!                                          └──> ...
//! ```
//!
//! Listeners run synchronously on the publishing task, in registration order.
//! A panicking listener is logged and skipped; the remaining listeners still
//! receive the event and the publisher never sees the panic.

use crate::batch::Batch;
use crate::errors::MetricError;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::error;

pub const CREATE_ERROR: &str = "create-error";

/// Kinds of events listeners can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A metric was rejected or its delivery was abandoned.
    CreateError,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateError => CREATE_ERROR,
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            CREATE_ERROR => Ok(Self::CreateError),
            other => Err(format!("Unknown event '{other}'")),
        }
    }
}

/// Metrics attached to a failure event.
#[derive(Debug, Clone, PartialEq)]
pub enum FailedMetrics {
    /// Raw input that did not pass validation.
    Invalid(Value),
    /// Validated batches that were never acknowledged.
    Batches(Vec<Batch>),
}

impl FailedMetrics {
    /// Number of individual metrics carried by the event.
    pub fn len(&self) -> usize {
        match self {
            Self::Invalid(_) => 1,
            Self::Batches(batches) => batches.iter().map(Batch::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Payload of a `create-error` event.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateError {
    pub metrics: FailedMetrics,
    pub error: MetricError,
}

pub type Listener = Arc<dyn Fn(&CreateError) + Send + Sync>;

/// Multi-listener failure channel. Listeners can be added but never removed.
#[derive(Default)]
pub struct FailureNotifier {
    listeners: RwLock<Vec<(EventKind, Listener)>>,
}

impl FailureNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide notifier shared by clients that are not given their own.
    pub fn global() -> Arc<FailureNotifier> {
        static GLOBAL: OnceLock<Arc<FailureNotifier>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(FailureNotifier::new())))
    }

    pub fn on<F>(&self, event: EventKind, listener: F)
    where
        F: Fn(&CreateError) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event, Arc::new(listener)));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers `event` to every `create-error` listener.
    pub fn publish(&self, event: CreateError) {
        // Snapshot so listeners may register more listeners without deadlocking.
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(kind, _)| *kind == EventKind::CreateError)
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for (index, listener) in listeners.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                error!(
                    "{} listener #{index} panicked while handling: {}",
                    CREATE_ERROR, event.error
                );
            }
        }
    }
}

impl std::fmt::Debug for FailureNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FailureNotifier({} listeners)", self.listener_count())
    }
}
