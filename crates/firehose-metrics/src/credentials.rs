// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::clock::{Clock, SystemClock};
use crate::errors::MetricError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::sync::Arc;
use std::{future::Future, pin::Pin};
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Lifetime requested for assumed-role sessions: 30 minutes.
pub const ASSUME_ROLE_DURATION_SECONDS: u32 = 1800;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A set of AWS credentials.
///
/// The default value is the ambient set: no keys, no expiration. Transports
/// fall back to the process identity when handed ambient credentials.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn is_ambient(&self) -> bool {
        self.access_key_id.is_empty()
    }

    /// Valid while the expiration has not passed.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|expiration| expiration >= now)
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub role_session_name: String,
    pub duration_seconds: u32,
}

/// Temporary credentials returned by STS.
#[derive(Clone, PartialEq, Eq)]
pub struct AssumedRole {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl From<AssumedRole> for Credentials {
    fn from(role: AssumedRole) -> Self {
        Self {
            access_key_id: role.access_key_id,
            secret_access_key: role.secret_access_key,
            session_token: Some(role.session_token),
            expiration: Some(role.expiration),
        }
    }
}

/// Delegates identity by assuming a role. `Ok(None)` means the call
/// succeeded but returned nothing usable.
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(&self, request: AssumeRoleRequest)
        -> Result<Option<AssumedRole>, BoxError>;
}

pub type AssumeRoleFuture =
    Pin<Box<dyn Future<Output = Result<Option<AssumedRole>, BoxError>> + Send>>;

pub type AssumeRoleResolverFn = Arc<dyn Fn(AssumeRoleRequest) -> AssumeRoleFuture + Send + Sync>;

/// Adapts an async closure into a [`RoleAssumer`].
#[derive(Clone)]
pub struct AssumeRoleFn(pub AssumeRoleResolverFn);

#[async_trait]
impl RoleAssumer for AssumeRoleFn {
    async fn assume_role(
        &self,
        request: AssumeRoleRequest,
    ) -> Result<Option<AssumedRole>, BoxError> {
        (self.0)(request).await
    }
}

impl Debug for AssumeRoleFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AssumeRoleFn")
    }
}

/// Holds the live assumed-role credentials and renews them once expired.
pub struct CredentialCache {
    role_arn: Option<String>,
    session_name: Option<String>,
    assumer: Option<Arc<dyn RoleAssumer>>,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<Credentials>>,
}

impl CredentialCache {
    pub fn new(
        role_arn: Option<String>,
        session_name: Option<String>,
        assumer: Option<Arc<dyn RoleAssumer>>,
    ) -> Self {
        Self::with_clock(role_arn, session_name, assumer, Arc::new(SystemClock))
    }

    pub fn with_clock(
        role_arn: Option<String>,
        session_name: Option<String>,
        assumer: Option<Arc<dyn RoleAssumer>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            role_arn,
            session_name,
            assumer,
            clock,
            cached: Mutex::new(None),
        }
    }

    /// Returns the cached credentials while valid, assuming the role again otherwise.
    ///
    /// Without a role ARN this returns ambient credentials and never calls STS.
    pub async fn get_credentials(&self) -> Result<Credentials, MetricError> {
        let Some(role_arn) = self.role_arn.as_deref() else {
            return Ok(Credentials::default());
        };

        // Held across the refresh so concurrent callers wait for one renewal.
        let mut cached = self.cached.lock().await;
        if let Some(credentials) = cached.as_ref() {
            if credentials.is_valid_at(self.clock.now()) {
                return Ok(credentials.clone());
            }
            debug!("Assumed role credentials expired, renewing");
        }

        let credentials = self.assume(role_arn).await?;
        *cached = Some(credentials.clone());
        Ok(credentials)
    }

    /// Drops the cached credentials so the next call assumes the role again.
    pub async fn reset(&self) {
        self.cached.lock().await.take();
    }

    async fn assume(&self, role_arn: &str) -> Result<Credentials, MetricError> {
        let session_name = self.session_name.clone().ok_or_else(|| {
            MetricError::NoEnvironment(
                "Unknown service name, cannot name the assumed role session".to_string(),
            )
        })?;
        let assumer = self.assumer.as_ref().ok_or_else(|| {
            MetricError::AssumeRole(format!("No role assumer available for {role_arn}"))
        })?;

        let request = AssumeRoleRequest {
            role_arn: role_arn.to_string(),
            role_session_name: session_name,
            duration_seconds: ASSUME_ROLE_DURATION_SECONDS,
        };

        match assumer.assume_role(request).await {
            Ok(Some(role)) => {
                debug!("Assumed role {role_arn} until {}", role.expiration);
                Ok(role.into())
            }
            Ok(None) => {
                error!("Failed to assume role {role_arn}: empty response");
                Err(MetricError::AssumeRole(
                    "Failed to assume role, invalid response.".to_string(),
                ))
            }
            Err(e) => {
                error!("Failed to assume role {role_arn}: {e}");
                Err(MetricError::AssumeRole(e.to_string()))
            }
        }
    }
}

impl Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("role_arn", &self.role_arn)
            .field("session_name", &self.session_name)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{FakeAssumer, Reply};
    use super::*;
    use crate::clock::test_support::ManualClock;
    use chrono::Duration;

    fn cache_with(reply: Reply) -> (CredentialCache, Arc<FakeAssumer>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let assumer = Arc::new(FakeAssumer::new(clock.clone(), reply));
        let cache = CredentialCache::with_clock(
            Some("some-role-arn".to_string()),
            Some("default-service".to_string()),
            Some(assumer.clone()),
            clock.clone(),
        );
        (cache, assumer, clock)
    }

    #[tokio::test]
    async fn test_caches_credentials_while_valid() {
        let (cache, assumer, _clock) = cache_with(Reply::Role(Duration::zero()));

        let first = cache.get_credentials().await.unwrap();
        let second = cache.get_credentials().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(assumer.calls(), 1);
        assert_eq!(
            assumer.requests.lock().unwrap()[0],
            AssumeRoleRequest {
                role_arn: "some-role-arn".to_string(),
                role_session_name: "default-service".to_string(),
                duration_seconds: 1800,
            }
        );
    }

    #[tokio::test]
    async fn test_renews_after_expiration() {
        let (cache, assumer, clock) = cache_with(Reply::Role(Duration::seconds(1800)));

        let first = cache.get_credentials().await.unwrap();
        clock.advance(Duration::seconds(1799));
        assert_eq!(cache.get_credentials().await.unwrap(), first);
        assert_eq!(assumer.calls(), 1);

        clock.advance(Duration::seconds(101));
        let renewed = cache.get_credentials().await.unwrap();

        assert_eq!(assumer.calls(), 2);
        assert_ne!(renewed, first);
        assert_eq!(renewed.access_key_id, "some-access-key-id-1");
    }

    #[tokio::test]
    async fn test_reset_forces_renewal() {
        let (cache, assumer, _clock) = cache_with(Reply::Role(Duration::seconds(1800)));

        cache.get_credentials().await.unwrap();
        cache.reset().await;
        cache.get_credentials().await.unwrap();

        assert_eq!(assumer.calls(), 2);
    }

    #[tokio::test]
    async fn test_no_role_arn_uses_ambient_identity() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let assumer = Arc::new(FakeAssumer::new(
            clock.clone(),
            Reply::Role(Duration::seconds(1800)),
        ));
        let cache = CredentialCache::with_clock(
            None,
            Some("default-service".to_string()),
            Some(assumer.clone()),
            clock,
        );

        let credentials = cache.get_credentials().await.unwrap();

        assert!(credentials.is_ambient());
        assert_eq!(assumer.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_response_is_an_error() {
        let (cache, _assumer, _clock) = cache_with(Reply::Empty);
        assert_eq!(
            cache.get_credentials().await,
            Err(MetricError::AssumeRole(
                "Failed to assume role, invalid response.".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_assume_role_error_is_propagated() {
        let (cache, assumer, _clock) = cache_with(Reply::Fail);

        assert_eq!(
            cache.get_credentials().await,
            Err(MetricError::AssumeRole("sts unavailable".to_string()))
        );
        // failures are not cached
        assert!(cache.get_credentials().await.is_err());
        assert_eq!(assumer.calls(), 2);
    }

    /// Yields before answering so concurrent callers can interleave.
    struct SlowAssumer(Arc<FakeAssumer>);

    #[async_trait]
    impl RoleAssumer for SlowAssumer {
        async fn assume_role(
            &self,
            request: AssumeRoleRequest,
        ) -> Result<Option<AssumedRole>, BoxError> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.0.assume_role(request).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let assumer = Arc::new(FakeAssumer::new(
            clock.clone(),
            Reply::Role(Duration::seconds(1800)),
        ));
        let cache = CredentialCache::with_clock(
            Some("some-role-arn".to_string()),
            Some("default-service".to_string()),
            Some(Arc::new(SlowAssumer(assumer.clone()))),
            clock,
        );

        let (a, b, c) = tokio::join!(
            cache.get_credentials(),
            cache.get_credentials(),
            cache.get_credentials()
        );

        assert_eq!(assumer.calls(), 1);
        let a = a.unwrap();
        assert_eq!(a, b.unwrap());
        assert_eq!(a, c.unwrap());
    }

    #[tokio::test]
    async fn test_missing_service_name() {
        let cache = CredentialCache::new(Some("some-role-arn".to_string()), None, None);
        assert!(matches!(
            cache.get_credentials().await,
            Err(MetricError::NoEnvironment(_))
        ));
    }

    #[tokio::test]
    async fn test_assume_role_fn_adapter() {
        let resolver: AssumeRoleResolverFn = Arc::new(|request: AssumeRoleRequest| {
            Box::pin(async move {
                Ok::<_, BoxError>(Some(AssumedRole {
                    access_key_id: request.role_session_name,
                    secret_access_key: "secret".to_string(),
                    session_token: "token".to_string(),
                    expiration: Utc::now() + Duration::seconds(60),
                }))
            })
        });
        let assumer = AssumeRoleFn(resolver);
        let cache = CredentialCache::new(
            Some("some-role-arn".to_string()),
            Some("default-service".to_string()),
            Some(Arc::new(assumer)),
        );

        let credentials = cache.get_credentials().await.unwrap();
        assert_eq!(credentials.access_key_id, "default-service");
        assert_eq!(credentials.session_token.as_deref(), Some("token"));
    }
}
