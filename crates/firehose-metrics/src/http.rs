// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `PutRecordBatch` over the Firehose JSON 1.1 HTTP protocol.

use crate::config::MetricsConfig;
use crate::credentials::Credentials;
use crate::errors::{MetricError, ShippingError};
use crate::firehose::{Firehose, FirehoseConnector};
use crate::sigv4::{self, SignableRequest, SigningParams};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::env;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

const SERVICE: &str = "firehose";
const TARGET: &str = "Firehose_20150804.PutRecordBatch";
const CONTENT_TYPE_JSON: &str = "application/x-amz-json-1.1";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordBatchInput<'a> {
    delivery_stream_name: &'a str,
    records: Vec<Record>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Record {
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordBatchOutput {
    #[serde(default)]
    failed_put_count: u64,
    #[serde(default)]
    request_responses: Vec<RecordResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecordResponse {
    error_code: Option<String>,
    error_message: Option<String>,
}

/// Builds signed HTTP clients for the configured endpoint.
#[derive(Clone)]
pub struct HttpFirehoseConnector {
    endpoint: Url,
    region: String,
    https_proxy: Option<String>,
    connect_timeout: Duration,
    ambient: Credentials,
}

impl HttpFirehoseConnector {
    pub fn new(config: &MetricsConfig) -> Result<Self, MetricError> {
        let endpoint = Url::parse(&config.firehose_endpoint()).map_err(|e| {
            MetricError::InvalidConfig(format!("Invalid Firehose endpoint: {e}"))
        })?;

        Ok(Self {
            endpoint,
            region: config.region.clone(),
            https_proxy: config.https_proxy.clone(),
            connect_timeout: config.connect_timeout,
            ambient: ambient_credentials(),
        })
    }

    /// Uses these credentials whenever the pipeline has no assumed role.
    #[must_use]
    pub fn with_ambient_credentials(mut self, credentials: Credentials) -> Self {
        self.ambient = credentials;
        self
    }

    fn build_client(&self, allow_proxy: bool) -> Result<reqwest::Client, Box<dyn Error>> {
        let mut client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .pool_idle_timeout(Some(Duration::from_secs(270)))
            .tcp_keepalive(Some(Duration::from_secs(120)));

        if allow_proxy {
            if let Some(https_uri) = &self.https_proxy {
                client = client.proxy(reqwest::Proxy::https(https_uri.clone())?);
            }
        }

        Ok(client.build()?)
    }
}

impl FirehoseConnector for HttpFirehoseConnector {
    fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn Firehose>, MetricError> {
        let client = match self.build_client(true) {
            Ok(client) => client,
            Err(e) => {
                error!(
                    "Unable to parse proxy configuration: {}, falling back to direct connection",
                    e
                );
                self.build_client(false).map_err(|e| {
                    MetricError::Firehose(format!("Failed to build HTTP client: {e}"))
                })?
            }
        };

        let credentials = if credentials.is_ambient() {
            self.ambient.clone()
        } else {
            credentials.clone()
        };

        Ok(Arc::new(HttpFirehose {
            client,
            endpoint: self.endpoint.clone(),
            region: self.region.clone(),
            credentials,
        }))
    }
}

/// Process identity from the standard AWS environment variables.
fn ambient_credentials() -> Credentials {
    match (
        env::var("AWS_ACCESS_KEY_ID"),
        env::var("AWS_SECRET_ACCESS_KEY"),
    ) {
        (Ok(access_key_id), Ok(secret_access_key)) => Credentials {
            access_key_id,
            secret_access_key,
            session_token: env::var("AWS_SESSION_TOKEN").ok(),
            expiration: None,
        },
        _ => Credentials::default(),
    }
}

/// A Firehose client bound to one credential set. Requests go unsigned when
/// the credential set is empty.
pub struct HttpFirehose {
    client: reqwest::Client,
    endpoint: Url,
    region: String,
    credentials: Credentials,
}

impl HttpFirehose {
    fn host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    fn request(&self, body: Vec<u8>) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
            .header("X-Amz-Target", TARGET);

        if !self.credentials.is_ambient() {
            let now = Utc::now();
            let amz_date = sigv4::amz_date(&now);
            let mut headers = vec![
                ("content-type", CONTENT_TYPE_JSON.to_string()),
                ("host", self.host()),
                ("x-amz-date", amz_date.clone()),
                ("x-amz-target", TARGET.to_string()),
            ];
            if let Some(token) = &self.credentials.session_token {
                headers.push(("x-amz-security-token", token.clone()));
                request = request.header("X-Amz-Security-Token", token);
            }

            let signable = SignableRequest {
                method: "POST",
                path: self.endpoint.path(),
                query: self.endpoint.query().unwrap_or_default(),
                headers,
                payload: &body,
            };
            let params = SigningParams {
                access_key_id: &self.credentials.access_key_id,
                secret_access_key: &self.credentials.secret_access_key,
                region: &self.region,
                service: SERVICE,
                time: now,
            };

            request = request
                .header(HOST, self.host())
                .header("X-Amz-Date", amz_date)
                .header(AUTHORIZATION, sigv4::authorization(&signable, &params));
        }

        request.body(body)
    }
}

#[async_trait]
impl Firehose for HttpFirehose {
    async fn put_record_batch(
        &self,
        delivery_stream_name: &str,
        records: Vec<Vec<u8>>,
    ) -> Result<(), ShippingError> {
        let n_records = records.len();
        let input = PutRecordBatchInput {
            delivery_stream_name,
            records: records
                .iter()
                .map(|data| Record {
                    data: base64::engine::general_purpose::STANDARD.encode(data),
                })
                .collect(),
        };
        let body = serde_json::to_vec(&input).map_err(|e| ShippingError::Payload(e.to_string()))?;

        let resp = self.request(body).send().await.map_err(|e| {
            let message = format!("Cannot reach {}: {e}", self.endpoint);
            ShippingError::Destination(e.status(), message)
        })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| {
            ShippingError::Destination(Some(status), format!("Failed to read response: {e}"))
        })?;
        if !status.is_success() {
            return Err(ShippingError::Destination(Some(status), text));
        }

        // An unparsable 2xx body is still an acknowledgement.
        let Ok(output) = serde_json::from_str::<PutRecordBatchOutput>(&text) else {
            debug!("Delivered {n_records} records to {delivery_stream_name}");
            return Ok(());
        };

        if output.failed_put_count > 0 {
            let first_error = output
                .request_responses
                .iter()
                .find_map(|r| match (&r.error_code, &r.error_message) {
                    (Some(code), Some(message)) => Some(format!("{code}: {message}")),
                    (Some(code), None) => Some(code.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            return Err(ShippingError::Destination(
                Some(status),
                format!(
                    "{} of {n_records} records rejected by {delivery_stream_name} {first_error}",
                    output.failed_put_count
                ),
            ));
        }

        debug!("Delivered {n_records} records to {delivery_stream_name}");
        Ok(())
    }
}
