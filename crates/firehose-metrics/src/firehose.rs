// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::credentials::Credentials;
use crate::errors::{MetricError, ShippingError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Bulk ingestion into a delivery stream.
#[async_trait]
pub trait Firehose: Send + Sync {
    /// Ships `records`, each an encoded metric, in one call.
    async fn put_record_batch(
        &self,
        delivery_stream_name: &str,
        records: Vec<Vec<u8>>,
    ) -> Result<(), ShippingError>;
}

/// Builds a [`Firehose`] client authorized by a credential set.
pub trait FirehoseConnector: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn Firehose>, MetricError>;
}

/// Reuses the client built for the current credentials and rebuilds it
/// whenever the credentials change.
pub struct FirehoseFactory {
    connector: Arc<dyn FirehoseConnector>,
    current: Mutex<Option<(Credentials, Arc<dyn Firehose>)>>,
}

impl FirehoseFactory {
    pub fn new(connector: Arc<dyn FirehoseConnector>) -> Self {
        Self {
            connector,
            current: Mutex::new(None),
        }
    }

    pub async fn get_client(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn Firehose>, MetricError> {
        let mut current = self.current.lock().await;
        if let Some((bound_to, client)) = current.as_ref() {
            if bound_to == credentials {
                return Ok(Arc::clone(client));
            }
        }

        debug!("Building Firehose client for {:?}", credentials);
        let client = self.connector.connect(credentials)?;
        *current = Some((credentials.clone(), Arc::clone(&client)));
        Ok(client)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{ScriptedFirehose, SharedConnector};
    use super::*;

    fn credentials(access_key_id: &str) -> Credentials {
        Credentials {
            access_key_id: access_key_id.to_string(),
            secret_access_key: "secret".to_string(),
            session_token: Some("token".to_string()),
            expiration: None,
        }
    }

    #[tokio::test]
    async fn test_reuses_client_for_same_credentials() {
        let connector = Arc::new(SharedConnector::new(ScriptedFirehose::default()));
        let factory = FirehoseFactory::new(connector.clone());

        factory.get_client(&credentials("a")).await.unwrap();
        factory.get_client(&credentials("a")).await.unwrap();

        assert_eq!(connector.built_for.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rebuilds_client_when_credentials_change() {
        let connector = Arc::new(SharedConnector::new(ScriptedFirehose::default()));
        let factory = FirehoseFactory::new(connector.clone());

        factory.get_client(&credentials("a")).await.unwrap();
        factory.get_client(&credentials("b")).await.unwrap();
        factory.get_client(&credentials("b")).await.unwrap();

        let built_for = connector.built_for.lock().unwrap();
        assert_eq!(built_for.len(), 2);
        assert_eq!(built_for[1].access_key_id, "b");
    }

    #[tokio::test]
    async fn test_connect_error_is_not_cached() {
        struct Broken;
        impl FirehoseConnector for Broken {
            fn connect(&self, _: &Credentials) -> Result<Arc<dyn Firehose>, MetricError> {
                Err(MetricError::Firehose("no client".to_string()))
            }
        }

        let factory = FirehoseFactory::new(Arc::new(Broken));
        assert!(factory.get_client(&Credentials::default()).await.is_err());
        assert!(factory.get_client(&Credentials::default()).await.is_err());
    }
}
