// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::batch::make_batches;
use crate::clock::{Clock, SystemClock};
use crate::config::{DeliveryStream, MetricsConfig};
use crate::credentials::{CredentialCache, RoleAssumer};
use crate::errors::MetricError;
use crate::firehose::{FirehoseConnector, FirehoseFactory};
use crate::flusher::{Flusher, FlusherConfig};
use crate::http::HttpFirehoseConnector;
use crate::notifier::{CreateError, EventKind, FailedMetrics, FailureNotifier};
use crate::validate::{DefaultValidator, MetricValidator};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Entry point: validates, batches and delivers metrics.
///
/// ```rust,ignore
/// let client = MetricsClient::builder(MetricsConfig::from_env()?)
///     .role_assumer(Arc::new(sts))
///     .build()?;
///
/// client.on(EventKind::CreateError, |event| {
///     eprintln!("lost {} metrics: {}", event.metrics.len(), event.error);
/// });
///
/// client.add("some-client", "orders-created", json!({"count": 3})).await?;
/// ```
pub struct MetricsClient {
    config: Arc<MetricsConfig>,
    validator: Arc<dyn MetricValidator>,
    credentials: Arc<CredentialCache>,
    notifier: Arc<FailureNotifier>,
    flusher: Flusher,
}

impl MetricsClient {
    pub fn builder(config: MetricsConfig) -> MetricsClientBuilder {
        MetricsClientBuilder {
            config,
            role_assumer: None,
            connector: None,
            validator: None,
            notifier: None,
            clock: None,
        }
    }

    /// Sends one metric, or one metric per element when `payload` is an array.
    ///
    /// Invalid metrics and undeliverable batches are reported to the
    /// `create-error` listeners and do not fail the call. Only an unresolvable
    /// environment does.
    pub async fn add(
        &self,
        client_code: &str,
        metric_name: &str,
        payload: Value,
    ) -> Result<(), MetricError> {
        if self.config.is_local() {
            debug!("Local environment, skipping metric {metric_name}");
            return Ok(());
        }

        let inputs = match payload {
            Value::Array(items) => items,
            single => vec![single],
        };

        let mut records = Vec::with_capacity(inputs.len());
        for input in inputs {
            match self.validator.validate(client_code, metric_name, &input) {
                Ok(record) => records.push(record),
                Err(error) => {
                    warn!("Discarding metric {metric_name} for {client_code}: {error}");
                    self.notifier.publish(CreateError {
                        metrics: FailedMetrics::Invalid(input),
                        error,
                    });
                }
            }
        }

        let batches = make_batches(records, self.config.batch_limit);
        self.flusher.flush(batches).await
    }

    pub fn on<F>(&self, event: EventKind, listener: F)
    where
        F: Fn(&CreateError) + Send + Sync + 'static,
    {
        self.notifier.on(event, listener);
    }

    pub fn notifier(&self) -> &Arc<FailureNotifier> {
        &self.notifier
    }

    pub fn credential_cache(&self) -> &Arc<CredentialCache> {
        &self.credentials
    }
}

pub struct MetricsClientBuilder {
    config: MetricsConfig,
    role_assumer: Option<Arc<dyn RoleAssumer>>,
    connector: Option<Arc<dyn FirehoseConnector>>,
    validator: Option<Arc<dyn MetricValidator>>,
    notifier: Option<Arc<FailureNotifier>>,
    clock: Option<Arc<dyn Clock>>,
}

impl MetricsClientBuilder {
    #[must_use]
    pub fn role_assumer(mut self, role_assumer: Arc<dyn RoleAssumer>) -> Self {
        self.role_assumer = Some(role_assumer);
        self
    }

    /// Replaces the HTTP transport.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn FirehoseConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn MetricValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Defaults to [`FailureNotifier::global`].
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<FailureNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<MetricsClient, MetricError> {
        let config = self.config;
        config.validate()?;

        if config.role_arn.is_some() && self.role_assumer.is_none() {
            return Err(MetricError::InvalidConfig(
                "A role ARN is configured but no role assumer was provided".to_string(),
            ));
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let connector = match self.connector {
            Some(connector) => connector,
            None => Arc::new(HttpFirehoseConnector::new(&config)?),
        };
        let validator = self.validator.unwrap_or_else(|| {
            Arc::new(DefaultValidator::with_clock(
                config.service_name.clone(),
                Arc::clone(&clock),
            ))
        });
        let notifier = self.notifier.unwrap_or_else(FailureNotifier::global);
        let credentials = Arc::new(CredentialCache::with_clock(
            config.role_arn.clone(),
            config.service_name.clone(),
            self.role_assumer,
            clock,
        ));

        let flusher = Flusher::new(FlusherConfig {
            delivery_stream: DeliveryStream::new(config.environment.clone()),
            credentials: Arc::clone(&credentials),
            firehose_factory: FirehoseFactory::new(connector),
            notifier: Arc::clone(&notifier),
            settlement: config.settlement,
            max_attempts: config.max_attempts,
        });

        Ok(MetricsClient {
            config: Arc::new(config),
            validator,
            credentials,
            notifier,
            flusher,
        })
    }
}
