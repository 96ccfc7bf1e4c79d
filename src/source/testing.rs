//! Scripted source for collector and API tests.

use async_trait::async_trait;
use std::time::Duration;

use super::{HealthSource, SourceError};
use crate::bundle::{
    AccountsStatus, ComponentDetail, ComponentStatusList, FailedLogin, HealthBundle, MaybeEmpty,
    SecurityActivity, SystemHealthReading, VaultStatus,
};

/// A source whose full fetch always fails, optionally after a delay.
#[derive(Default)]
pub struct UnreachableSource {
    pub delay: Option<Duration>,
    pub cached: Option<HealthBundle>,
}

impl UnreachableSource {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            cached: None,
        }
    }

    pub fn with_cache(bundle: HealthBundle) -> Self {
        Self {
            delay: None,
            cached: Some(bundle),
        }
    }
}

#[async_trait]
impl HealthSource for UnreachableSource {
    fn is_demo(&self) -> bool {
        false
    }

    async fn login(&self) -> Result<(), SourceError> {
        Err(SourceError::NotLoggedIn)
    }

    fn is_token_valid(&self) -> bool {
        false
    }

    async fn logout(&self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn fetch_all(&self) -> Result<HealthBundle, SourceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Err(SourceError::NotLoggedIn)
    }

    async fn fetch_component_status(&self) -> ComponentStatusList {
        ComponentStatusList::default()
    }

    async fn fetch_component_details(&self, _component_type: &str) -> Vec<ComponentDetail> {
        Vec::new()
    }

    async fn fetch_vault_status(&self) -> VaultStatus {
        VaultStatus::default()
    }

    async fn fetch_accounts_status(&self) -> AccountsStatus {
        AccountsStatus::default()
    }

    async fn fetch_system_health(&self) -> MaybeEmpty<SystemHealthReading> {
        MaybeEmpty::none()
    }

    async fn fetch_recent_activity(&self) -> Vec<SecurityActivity> {
        Vec::new()
    }

    async fn fetch_failed_logins(&self) -> Vec<FailedLogin> {
        Vec::new()
    }

    fn cached_bundle(&self) -> Option<HealthBundle> {
        self.cached.clone()
    }
}
