// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::MetricError;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

/// Maximum number of records Firehose accepts in a single `PutRecordBatch` call.
pub const METRICS_BATCH_LIMIT: usize = 500;
pub const MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
pub const DELIVERY_STREAM_PREFIX: &str = "JanisTraceFirehose";
const DEFAULT_REGION: &str = "us-east-1";
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// How the outcome of concurrent batch deliveries feeds the next attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Settlement {
    /// Only batches whose call failed are sent again.
    #[default]
    PerBatch,
    /// A single failed call fails the whole attempt and every batch is sent again.
    AllOrNothing,
}

impl FromStr for Settlement {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "per-batch" | "per_batch" => Ok(Self::PerBatch),
            "all-or-nothing" | "all_or_nothing" => Ok(Self::AllOrNothing),
            other => Err(MetricError::InvalidConfig(format!(
                "Invalid delivery settlement '{other}'. Must be one of: per-batch, all-or-nothing"
            ))),
        }
    }
}

/// Deployment stage the process runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Beta,
    Qa,
    Prod,
}

impl Environment {
    pub fn parse(env: &str) -> Option<Self> {
        match env {
            "local" => Some(Self::Local),
            "beta" => Some(Self::Beta),
            "qa" => Some(Self::Qa),
            "prod" => Some(Self::Prod),
            _ => None,
        }
    }

    /// Name used as the delivery stream suffix.
    #[must_use]
    pub fn friendly_name(self) -> &'static str {
        match self {
            Self::Local => "Local",
            Self::Beta => "Beta",
            Self::Qa => "QA",
            Self::Prod => "Prod",
        }
    }
}

/// Configuration for the metrics pipeline
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Service identity, also used as the assumed-role session name
    pub service_name: Option<String>,
    /// Raw deployment stage (`local`, `beta`, `qa`, `prod`)
    pub environment: Option<String>,
    /// Role to assume before talking to Firehose; ambient identity when absent
    pub role_arn: Option<String>,
    /// AWS region of the delivery stream
    pub region: String,
    /// Firehose endpoint override, defaults to the regional endpoint
    pub firehose_endpoint: Option<String>,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    pub connect_timeout: Duration,
    pub batch_limit: usize,
    pub max_attempts: usize,
    pub settlement: Settlement,
    /// Log level (e.g., trace, debug, info, warn, error), applied by
    /// [`crate::logger::init_from`]
    pub log_level: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            service_name: None,
            environment: None,
            role_arn: None,
            region: DEFAULT_REGION.to_string(),
            firehose_endpoint: None,
            https_proxy: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            batch_limit: METRICS_BATCH_LIMIT,
            max_attempts: MAX_ATTEMPTS,
            settlement: Settlement::default(),
            log_level: "info".to_string(),
        }
    }
}

impl MetricsConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, MetricError> {
        let non_empty = |key: &str| env::var(key).ok().filter(|val| !val.trim().is_empty());

        let settlement = match non_empty("METRIC_DELIVERY_SETTLEMENT") {
            Some(val) => val.parse()?,
            None => Settlement::default(),
        };

        let config = Self {
            service_name: non_empty("JANIS_SERVICE_NAME"),
            environment: non_empty("JANIS_ENV"),
            role_arn: non_empty("METRIC_ROLE_ARN"),
            region: non_empty("AWS_DEFAULT_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            firehose_endpoint: non_empty("METRIC_FIREHOSE_ENDPOINT"),
            https_proxy: non_empty("HTTPS_PROXY"),
            settlement,
            log_level: non_empty("METRIC_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or_else(|| "info".to_string()),
            ..Default::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), MetricError> {
        if self.batch_limit == 0 || self.batch_limit > METRICS_BATCH_LIMIT {
            return Err(MetricError::InvalidConfig(format!(
                "Batch limit must be between 1 and {METRICS_BATCH_LIMIT}, got {}",
                self.batch_limit
            )));
        }

        if self.max_attempts == 0 {
            return Err(MetricError::InvalidConfig(
                "Max attempts must be greater than 0".to_string(),
            ));
        }

        if self.region.trim().is_empty() {
            return Err(MetricError::InvalidConfig(
                "AWS_DEFAULT_REGION cannot be empty".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(MetricError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    pub fn is_local(&self) -> bool {
        self.environment.as_deref() == Some("local")
    }

    /// Regional endpoint unless overridden.
    pub fn firehose_endpoint(&self) -> String {
        self.firehose_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://firehose.{}.amazonaws.com", self.region))
    }
}

/// Memoized delivery stream name derived from the environment.
#[derive(Debug)]
pub struct DeliveryStream {
    environment: Option<String>,
    name: OnceLock<String>,
}

impl DeliveryStream {
    pub fn new(environment: Option<String>) -> Self {
        Self {
            environment,
            name: OnceLock::new(),
        }
    }

    /// Resolves `<prefix><FriendlyEnv>` on first success and caches it.
    pub fn name(&self) -> Result<&str, MetricError> {
        if let Some(name) = self.name.get() {
            return Ok(name);
        }

        let env = self
            .environment
            .as_deref()
            .and_then(Environment::parse)
            .ok_or_else(|| MetricError::NoEnvironment("Unknown environment".to_string()))?;

        Ok(self
            .name
            .get_or_init(|| format!("{DELIVERY_STREAM_PREFIX}{}", env.friendly_name())))
    }
}
