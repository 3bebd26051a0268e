// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A validated metric, ready to be shipped.
///
/// Serialized as the JSON document Firehose receives for each record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub id: Uuid,
    pub client_code: String,
    pub metric_name: String,
    pub metric_data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(with = "iso_millis")]
    pub date_created: DateTime<Utc>,
}

impl MetricRecord {
    /// UTF-8 JSON bytes as sent on the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// ISO-8601 in UTC with millisecond precision, e.g. `2024-01-27T21:07:21.177Z`.
mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        date: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_date(date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|date| date.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

pub(crate) fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let record = MetricRecord {
            id: Uuid::nil(),
            client_code: "clientA".to_string(),
            metric_name: "metric-name".to_string(),
            metric_data: json!({"foo": 1}),
            service: Some("default-service".to_string()),
            date_created: Utc.with_ymd_and_hms(2024, 1, 27, 21, 7, 21).unwrap(),
        };

        let wire: Value = serde_json::from_slice(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(
            wire,
            json!({
                "id": "00000000-0000-0000-0000-000000000000",
                "clientCode": "clientA",
                "metricName": "metric-name",
                "metricData": {"foo": 1},
                "service": "default-service",
                "dateCreated": "2024-01-27T21:07:21.000Z"
            })
        );
    }

    #[test]
    fn test_service_is_omitted_when_unknown() {
        let record = MetricRecord {
            id: Uuid::new_v4(),
            client_code: "clientA".to_string(),
            metric_name: "metric-name".to_string(),
            metric_data: json!([1, 2]),
            service: None,
            date_created: Utc::now(),
        };

        let wire: Value = serde_json::from_slice(&record.to_bytes().unwrap()).unwrap();
        assert!(wire.get("service").is_none());

        let parsed: MetricRecord = serde_json::from_value(wire).unwrap();
        assert_eq!(parsed.client_code, "clientA");
    }
}
