// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::clock::{Clock, SystemClock};
use crate::errors::MetricError;
use crate::metric::MetricRecord;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Turns raw caller input into a [`MetricRecord`].
pub trait MetricValidator: Send + Sync {
    fn validate(
        &self,
        client_code: &str,
        metric_name: &str,
        metric_data: &Value,
    ) -> Result<MetricRecord, MetricError>;
}

/// Requires a non-empty client code and metric name, and object or array data.
/// Stamps every record with a fresh id, the service name and the creation time.
#[derive(Clone)]
pub struct DefaultValidator {
    service_name: Option<String>,
    clock: Arc<dyn Clock>,
}

impl DefaultValidator {
    pub fn new(service_name: Option<String>) -> Self {
        Self::with_clock(service_name, Arc::new(SystemClock))
    }

    pub fn with_clock(service_name: Option<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            service_name,
            clock,
        }
    }
}

impl MetricValidator for DefaultValidator {
    fn validate(
        &self,
        client_code: &str,
        metric_name: &str,
        metric_data: &Value,
    ) -> Result<MetricRecord, MetricError> {
        if client_code.trim().is_empty() {
            return Err(MetricError::InvalidMetric(
                "clientCode must be a non-empty string".to_string(),
            ));
        }
        if metric_name.trim().is_empty() {
            return Err(MetricError::InvalidMetric(
                "metricName must be a non-empty string".to_string(),
            ));
        }
        if !(metric_data.is_object() || metric_data.is_array()) {
            return Err(MetricError::InvalidMetric(format!(
                "metricData must be an object or an array, got: {metric_data}"
            )));
        }

        Ok(MetricRecord {
            id: Uuid::new_v4(),
            client_code: client_code.to_string(),
            metric_name: metric_name.to_string(),
            metric_data: metric_data.clone(),
            service: self.service_name.clone(),
            date_created: self.clock.now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::ManualClock;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_valid_metric() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let validator = DefaultValidator::with_clock(
            Some("default-service".to_string()),
            Arc::new(ManualClock::new(now)),
        );

        let record = validator
            .validate("some-client", "some-name", &json!({"some": "metric"}))
            .expect("metric should be valid");

        assert_eq!(record.client_code, "some-client");
        assert_eq!(record.metric_name, "some-name");
        assert_eq!(record.metric_data, json!({"some": "metric"}));
        assert_eq!(record.service.as_deref(), Some("default-service"));
        assert_eq!(record.date_created, now);
    }

    #[test]
    fn test_array_data_is_valid() {
        let validator = DefaultValidator::new(None);
        assert!(validator
            .validate("some-client", "some-name", &json!([1, 2, 3]))
            .is_ok());
    }

    #[test]
    fn test_invalid_metrics() {
        let validator = DefaultValidator::new(None);
        let cases = [
            ("some-client", "some-name", json!("not an object/array")),
            ("some-client", "some-name", json!(42)),
            ("some-client", "some-name", Value::Null),
            ("some-client", "", json!({"some": "metric"})),
            ("  ", "some-name", json!({"some": "metric"})),
        ];

        for (client_code, metric_name, metric_data) in cases {
            let result = validator.validate(client_code, metric_name, &metric_data);
            assert!(
                matches!(result, Err(MetricError::InvalidMetric(_))),
                "expected {client_code:?}/{metric_name:?}/{metric_data} to be rejected"
            );
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let validator = DefaultValidator::new(None);
        let data = json!({});
        let a = validator.validate("c", "n", &data).unwrap();
        let b = validator.validate("c", "n", &data).unwrap();
        assert_ne!(a.id, b.id);
    }
}
