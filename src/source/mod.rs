//! Health sources for the PAM platform.
//!
//! A [`HealthSource`] is either the live web services client or the demo
//! generator; the collector only sees the trait.

mod demo;
mod generate;
mod live;
mod token;

#[cfg(test)]
pub(crate) mod testing;

pub use demo::*;
pub use generate::*;
pub use live::*;
pub use token::*;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::bundle::{
    AccountsStatus, ComponentDetail, ComponentStatusList, FailedLogin, HealthBundle, MaybeEmpty,
    SecurityActivity, SystemHealthReading, VaultStatus,
};
use crate::config::ServerConfig;

/// Source error types.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("authentication failed (HTTP {status}): {body}")]
    Authentication { status: u16, body: String },
    #[error("unsupported auth type: {0}")]
    UnsupportedAuth(String),
    #[error("HTTP {status} from {path}: {body}")]
    Status { path: String, status: u16, body: String },
    #[error("invalid response from {path}: {message}")]
    Decode { path: String, message: String },
    #[error("not logged in")]
    NotLoggedIn,
    #[error("incomplete health data, missing {}", .0.join(", "))]
    Incomplete(Vec<&'static str>),
    #[error("fixture error: {0}")]
    Fixture(String),
}

/// Contract shared by the live and demo sources.
///
/// Category fetchers never fail: on error they log and return an empty
/// structure. Only `login`, `logout` and `fetch_all` report failure.
#[async_trait]
pub trait HealthSource: Send + Sync {
    fn is_demo(&self) -> bool;

    async fn login(&self) -> Result<(), SourceError>;

    fn is_token_valid(&self) -> bool;

    /// Log in unless the current token is still valid.
    async fn ensure_logged_in(&self) -> Result<(), SourceError> {
        if self.is_token_valid() {
            return Ok(());
        }
        self.login().await
    }

    async fn logout(&self) -> Result<(), SourceError>;

    /// Fetch every category as one bundle.
    async fn fetch_all(&self) -> Result<HealthBundle, SourceError>;

    async fn fetch_component_status(&self) -> ComponentStatusList;

    async fn fetch_component_details(&self, component_type: &str) -> Vec<ComponentDetail>;

    async fn fetch_vault_status(&self) -> VaultStatus;

    async fn fetch_accounts_status(&self) -> AccountsStatus;

    async fn fetch_system_health(&self) -> MaybeEmpty<SystemHealthReading>;

    async fn fetch_recent_activity(&self) -> Vec<SecurityActivity>;

    async fn fetch_failed_logins(&self) -> Vec<FailedLogin>;

    /// Last bundle held in memory, if the source keeps one.
    fn cached_bundle(&self) -> Option<HealthBundle> {
        None
    }
}

/// Build the source selected by configuration.
pub fn source_from_config(cfg: &ServerConfig) -> Result<Arc<dyn HealthSource>, SourceError> {
    if cfg.demo_mode {
        tracing::info!("Using demo health source");
        Ok(Arc::new(DemoSource::new(cfg.demo_fixture.as_deref())))
    } else {
        tracing::info!("Using live health source at {}", cfg.source.base_url);
        Ok(Arc::new(LiveSource::new(cfg.source.clone())?))
    }
}
