//! Demo health source.
//!
//! Serves an in-memory bundle, optionally cached in a JSON fixture file,
//! and drifts a few values on every full fetch.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::path::Path;
use tracing::{info, warn};

use super::generate::{apply_drift, demo_component_details, generate_bundle};
use super::{HealthSource, SourceError, TokenState};
use crate::bundle::{
    AccountsStatus, ComponentDetail, ComponentStatusList, FailedLogin, HealthBundle, MaybeEmpty,
    SecurityActivity, SystemHealthReading, VaultStatus,
};

const DEMO_TOKEN: &str = "demo_token";

pub struct DemoSource {
    bundle: Mutex<HealthBundle>,
    token: Mutex<TokenState>,
}

impl DemoSource {
    /// Load the bundle from `fixture` if it exists, otherwise generate one
    /// and try to cache it there.
    pub fn new(fixture: Option<&Path>) -> Self {
        let bundle = match fixture {
            Some(path) if path.exists() => match load_fixture(path) {
                Ok(bundle) => {
                    info!("Loaded demo data from {}", path.display());
                    bundle
                }
                Err(e) => {
                    warn!("Ignoring demo fixture {}: {}", path.display(), e);
                    generate_bundle(&mut rand::thread_rng(), Utc::now())
                }
            },
            Some(path) => {
                let bundle = generate_bundle(&mut rand::thread_rng(), Utc::now());
                match save_fixture(path, &bundle) {
                    Ok(()) => info!("Saved generated demo data to {}", path.display()),
                    Err(e) => warn!("Could not save demo data: {}", e),
                }
                bundle
            }
            None => {
                info!("Generated demo data in memory");
                generate_bundle(&mut rand::thread_rng(), Utc::now())
            }
        };

        Self::from_bundle(bundle)
    }

    /// Serve a fixed starting bundle.
    pub fn from_bundle(bundle: HealthBundle) -> Self {
        Self {
            bundle: Mutex::new(bundle),
            token: Mutex::new(TokenState::default()),
        }
    }

    fn snapshot(&self) -> HealthBundle {
        self.bundle.lock().clone()
    }

    fn drift(&self) -> HealthBundle {
        let mut bundle = self.bundle.lock();
        apply_drift(&mut bundle, &mut rand::thread_rng(), Utc::now());
        bundle.clone()
    }

    fn details_for(&self, component_type: &str) -> Vec<ComponentDetail> {
        let bundle = self.bundle.lock();
        bundle
            .component_status
            .items
            .iter()
            .find(|item| item.component_type == component_type)
            .map(|item| demo_component_details(item, &mut rand::thread_rng(), Utc::now()))
            .unwrap_or_default()
    }
}

fn load_fixture(path: &Path) -> Result<HealthBundle, SourceError> {
    let data = std::fs::read_to_string(path).map_err(|e| SourceError::Fixture(e.to_string()))?;
    serde_json::from_str(&data).map_err(|e| SourceError::Fixture(e.to_string()))
}

fn save_fixture(path: &Path, bundle: &HealthBundle) -> Result<(), SourceError> {
    let data =
        serde_json::to_string_pretty(bundle).map_err(|e| SourceError::Fixture(e.to_string()))?;
    std::fs::write(path, data).map_err(|e| SourceError::Fixture(e.to_string()))
}

#[async_trait]
impl HealthSource for DemoSource {
    fn is_demo(&self) -> bool {
        true
    }

    async fn login(&self) -> Result<(), SourceError> {
        self.token.lock().set(DEMO_TOKEN.to_string(), Utc::now());
        info!("Logged in (demo mode)");
        Ok(())
    }

    fn is_token_valid(&self) -> bool {
        self.token.lock().is_valid_at(Utc::now())
    }

    async fn logout(&self) -> Result<(), SourceError> {
        self.token.lock().clear();
        info!("Logged out (demo mode)");
        Ok(())
    }

    async fn fetch_all(&self) -> Result<HealthBundle, SourceError> {
        Ok(self.drift())
    }

    async fn fetch_component_status(&self) -> ComponentStatusList {
        self.snapshot().component_status
    }

    async fn fetch_component_details(&self, component_type: &str) -> Vec<ComponentDetail> {
        self.details_for(component_type)
    }

    async fn fetch_vault_status(&self) -> VaultStatus {
        self.snapshot().vault_status
    }

    async fn fetch_accounts_status(&self) -> AccountsStatus {
        self.snapshot().accounts_status
    }

    async fn fetch_system_health(&self) -> MaybeEmpty<SystemHealthReading> {
        self.snapshot().system_health
    }

    async fn fetch_recent_activity(&self) -> Vec<SecurityActivity> {
        self.snapshot().recent_activities
    }

    async fn fetch_failed_logins(&self) -> Vec<FailedLogin> {
        self.snapshot().failed_logins
    }

    fn cached_bundle(&self) -> Option<HealthBundle> {
        Some(self.snapshot())
    }
}
