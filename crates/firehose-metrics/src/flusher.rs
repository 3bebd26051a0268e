// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::batch::Batch;
use crate::config::{DeliveryStream, Settlement};
use crate::credentials::CredentialCache;
use crate::errors::{MetricError, ShippingError};
use crate::firehose::{Firehose, FirehoseFactory};
use crate::notifier::{CreateError, FailedMetrics, FailureNotifier};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub struct FlusherConfig {
    pub delivery_stream: DeliveryStream,
    pub credentials: Arc<CredentialCache>,
    pub firehose_factory: FirehoseFactory,
    pub notifier: Arc<FailureNotifier>,
    pub settlement: Settlement,
    pub max_attempts: usize,
}

/// Ships batches to Firehose, retrying failed batches up to `max_attempts`
/// times in total and reporting whatever is left to the notifier.
pub struct Flusher {
    delivery_stream: DeliveryStream,
    credentials: Arc<CredentialCache>,
    firehose_factory: FirehoseFactory,
    notifier: Arc<FailureNotifier>,
    settlement: Settlement,
    max_attempts: usize,
}

/// A batch together with its wire form, encoded once for all attempts.
struct PendingBatch {
    batch: Batch,
    records: Vec<Vec<u8>>,
}

impl Flusher {
    pub fn new(config: FlusherConfig) -> Self {
        Flusher {
            delivery_stream: config.delivery_stream,
            credentials: config.credentials,
            firehose_factory: config.firehose_factory,
            notifier: config.notifier,
            settlement: config.settlement,
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Delivers `batches`.
    ///
    /// Only configuration faults are returned; delivery failures end up in the
    /// notifier.
    pub async fn flush(&self, batches: Vec<Batch>) -> Result<(), MetricError> {
        if batches.is_empty() {
            return Ok(());
        }
        let stream = self.delivery_stream.name()?;

        let mut pending = Vec::with_capacity(batches.len());
        for batch in batches {
            match batch.encode() {
                Ok(records) => pending.push(PendingBatch { batch, records }),
                Err(e) => {
                    error!("Failed to prepare payload. Data dropped: {}", e);
                    self.report(vec![batch], ShippingError::Payload(e.to_string()));
                }
            }
        }

        let mut attempt = 0;
        while !pending.is_empty() {
            let firehose = match self.firehose().await {
                Ok(firehose) => firehose,
                Err(MetricError::AssumeRole(msg)) => {
                    error!("Dropping {} batches, cannot assume role: {msg}", pending.len());
                    self.notify(pending, MetricError::AssumeRole(msg));
                    return Ok(());
                }
                Err(MetricError::Firehose(msg)) => {
                    attempt += 1;
                    warn!("Attempt {attempt}/{} failed: {msg}", self.max_attempts);
                    if attempt >= self.max_attempts {
                        self.report(
                            pending.into_iter().map(|p| p.batch).collect(),
                            ShippingError::Destination(None, msg),
                        );
                        return Ok(());
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            let n_batches = pending.len();
            debug!("Flushing {n_batches} batches to {stream}, attempt {}", attempt + 1);

            let outcomes = join_all(
                pending
                    .iter()
                    .map(|p| firehose.put_record_batch(stream, p.records.clone())),
            )
            .await;
            attempt += 1;

            let (failed, last_error) = self.settle(pending, outcomes);
            pending = failed;

            let Some(last_error) = last_error else {
                debug!("Successfully flushed {n_batches} batches");
                break;
            };

            if attempt >= self.max_attempts {
                error!(
                    "Failed to flush {} batches after {attempt} attempts: {last_error}",
                    pending.len()
                );
                self.report(pending.into_iter().map(|p| p.batch).collect(), last_error);
                break;
            }

            warn!(
                "Attempt {attempt}/{} failed for {} of {n_batches} batches: {last_error}",
                self.max_attempts,
                pending.len()
            );
        }

        Ok(())
    }

    async fn firehose(&self) -> Result<Arc<dyn Firehose>, MetricError> {
        let credentials = self.credentials.get_credentials().await?;
        self.firehose_factory.get_client(&credentials).await
    }

    /// Splits an attempt into the batches to send again and the last error seen.
    fn settle(
        &self,
        pending: Vec<PendingBatch>,
        outcomes: Vec<Result<(), ShippingError>>,
    ) -> (Vec<PendingBatch>, Option<ShippingError>) {
        let last_error = outcomes.iter().rev().find_map(|o| o.as_ref().err()).cloned();
        if last_error.is_none() {
            return (Vec::new(), None);
        }

        let failed = match self.settlement {
            Settlement::AllOrNothing => pending,
            Settlement::PerBatch => pending
                .into_iter()
                .zip(outcomes)
                .filter_map(|(p, outcome)| outcome.is_err().then_some(p))
                .collect(),
        };
        (failed, last_error)
    }

    fn report(&self, batches: Vec<Batch>, error: ShippingError) {
        if batches.is_empty() {
            return;
        }
        let message = match &error {
            ShippingError::Payload(msg) => {
                format!("Unable to put the metrics into firehose, invalid payload: {msg}")
            }
            ShippingError::Destination(_, msg) => {
                format!("Unable to put the metrics into firehose, max attempts reached: {msg}")
            }
        };
        self.notifier.publish(CreateError {
            metrics: FailedMetrics::Batches(batches),
            error: MetricError::Firehose(message),
        });
    }

    fn notify(&self, pending: Vec<PendingBatch>, error: MetricError) {
        self.notifier.publish(CreateError {
            metrics: FailedMetrics::Batches(pending.into_iter().map(|p| p.batch).collect()),
            error,
        });
    }
}
