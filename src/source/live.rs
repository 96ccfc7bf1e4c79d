//! Live health source backed by the PAM platform's REST web services.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use serde_json::value::RawValue;
use tracing::{debug, error, info, warn};

use super::{HealthSource, SourceError, TokenState};
use crate::bundle::{
    AccountsStatus, ComponentDetail, ComponentStatusList, FailedLogin, HealthBundle, MaybeEmpty,
    SecurityActivity, SystemHealthReading, VaultStatus,
};
use crate::config::SourceConfig;

const API_ROOT: &str = "PasswordVault/API";

/// `{ "value": [...] }` list envelope, entries left undecoded.
#[derive(Debug, Deserialize)]
struct ValueList {
    #[serde(default)]
    value: Vec<Box<RawValue>>,
}

/// `{ "Items": [...] }` list envelope, entries left undecoded.
#[derive(Debug, Deserialize)]
struct ItemList {
    #[serde(rename = "Items", default)]
    items: Vec<Box<RawValue>>,
}

/// Decode each entry on its own, skipping malformed ones.
///
/// Returns every decoded entry with its text as received.
fn decode_entries<T: DeserializeOwned>(entries: Vec<Box<RawValue>>, what: &str) -> Vec<(T, String)> {
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_str::<T>(entry.get()) {
            Ok(decoded) => Some((decoded, entry.get().to_string())),
            Err(e) => {
                warn!("Skipping malformed {} entry: {}", what, e);
                None
            }
        })
        .collect()
}

pub struct LiveSource {
    http: reqwest::Client,
    config: SourceConfig,
    token: Mutex<TokenState>,
    /// Serializes logins so concurrent callers log in once.
    login_lock: tokio::sync::Mutex<()>,
}

impl LiveSource {
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;

        Ok(Self {
            http,
            config,
            token: Mutex::new(TokenState::default()),
            login_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.config.base_url.trim_end_matches('/'), API_ROOT, path)
    }

    fn current_token(&self) -> Option<String> {
        self.token.lock().token().map(str::to_owned)
    }

    /// Authenticated GET of a JSON document.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        self.ensure_logged_in().await?;
        let token = self.current_token().ok_or(SourceError::NotLoggedIn)?;

        let url = self.url(path);
        debug!("GET {}", url);

        let resp = self
            .http
            .get(&url)
            .header(AUTHORIZATION, token)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(SourceError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| SourceError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    /// Fetch one category, logging failures and falling back to an empty value.
    async fn fetch_or_default<T>(&self, path: &str, what: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        match self.get_json(path).await {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to fetch {}: {}", what, e);
                T::default()
            }
        }
    }
}

#[async_trait]
impl HealthSource for LiveSource {
    fn is_demo(&self) -> bool {
        false
    }

    async fn login(&self) -> Result<(), SourceError> {
        let username = self.config.username.as_str();
        let password = self.config.password.expose_secret();

        let body = match self.config.auth_type.as_str() {
            "cyberark" | "ldap" => json!({
                "username": username,
                "password": password,
                "concurrentSession": true,
            }),
            "radius" => json!({
                "username": username,
                "password": password,
            }),
            other => {
                error!("Unsupported auth type: {}", other);
                return Err(SourceError::UnsupportedAuth(other.to_string()));
            }
        };

        let url = self.url(&format!("auth/{}/Logon", self.config.auth_type));
        debug!("logging in at {}", url);

        let resp = match self.http.post(&url).json(&body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                error!("Logon request failed: {}", e);
                return Err(e.into());
            }
        };

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if status != StatusCode::OK {
            error!("Logon rejected: {} - {}", status, text);
            return Err(SourceError::Authentication {
                status: status.as_u16(),
                body: text,
            });
        }

        let token = text.trim().trim_matches('"').to_string();
        self.token.lock().set(token, Utc::now());

        info!("Logged in to {}", self.config.base_url);
        Ok(())
    }

    fn is_token_valid(&self) -> bool {
        self.token.lock().is_valid_at(Utc::now())
    }

    async fn ensure_logged_in(&self) -> Result<(), SourceError> {
        if self.is_token_valid() {
            return Ok(());
        }

        let _guard = self.login_lock.lock().await;
        // Another caller may have logged in while we waited.
        if self.is_token_valid() {
            return Ok(());
        }

        self.login().await
    }

    async fn logout(&self) -> Result<(), SourceError> {
        let Some(token) = self.current_token() else {
            return Ok(());
        };

        let url = self.url("auth/Logoff");
        debug!("logging out at {}", url);

        let resp = match self
            .http
            .post(&url)
            .header(AUTHORIZATION, token)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                error!("Logoff request failed: {}", e);
                return Err(e.into());
            }
        };

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            error!("Logoff rejected: {} - {}", status, body);
            return Err(SourceError::Status {
                path: "auth/Logoff".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        self.token.lock().clear();
        info!("Logged out from {}", self.config.base_url);
        Ok(())
    }

    async fn fetch_all(&self) -> Result<HealthBundle, SourceError> {
        if let Err(e) = self.ensure_logged_in().await {
            error!("Cannot log in to the PAM platform: {}", e);
            return Err(e);
        }

        let bundle = HealthBundle {
            component_status: self.fetch_component_status().await,
            vault_status: self.fetch_vault_status().await,
            accounts_status: self.fetch_accounts_status().await,
            system_health: self.fetch_system_health().await,
            recent_activities: self.fetch_recent_activity().await,
            failed_logins: self.fetch_failed_logins().await,
            last_update: Utc::now(),
        };

        let missing = bundle.missing_categories();
        if !missing.is_empty() {
            error!("Health data incomplete, missing {}", missing.join(", "));
            return Err(SourceError::Incomplete(missing));
        }

        Ok(bundle)
    }

    async fn fetch_component_status(&self) -> ComponentStatusList {
        match self.get_json::<ItemList>("v1/Components").await {
            Ok(list) => ComponentStatusList {
                items: decode_entries(list.items, "component status")
                    .into_iter()
                    .map(|(item, _)| item)
                    .collect(),
            },
            Err(e) => {
                error!("Failed to fetch component status: {}", e);
                ComponentStatusList::default()
            }
        }
    }

    async fn fetch_component_details(&self, component_type: &str) -> Vec<ComponentDetail> {
        let path = format!("v1/Components/{}/Details", component_type);
        match self.get_json::<ValueList>(&path).await {
            Ok(list) => decode_entries(list.value, "component detail")
                .into_iter()
                .map(|(detail, _)| detail)
                .collect(),
            Err(e) => {
                error!("Failed to fetch {} details: {}", component_type, e);
                Vec::new()
            }
        }
    }

    async fn fetch_vault_status(&self) -> VaultStatus {
        self.fetch_or_default("v1/Safes/Statistics", "vault status").await
    }

    async fn fetch_accounts_status(&self) -> AccountsStatus {
        self.fetch_or_default("v1/Accounts/Statistics", "accounts status").await
    }

    async fn fetch_system_health(&self) -> MaybeEmpty<SystemHealthReading> {
        self.fetch_or_default("v1/System/Health", "system health").await
    }

    async fn fetch_recent_activity(&self) -> Vec<SecurityActivity> {
        match self.get_json::<ValueList>("v1/Activities").await {
            Ok(list) => decode_entries::<SecurityActivity>(list.value, "activity")
                .into_iter()
                .map(|(mut activity, raw)| {
                    activity.raw = Some(raw);
                    activity
                })
                .collect(),
            Err(e) => {
                error!("Failed to fetch recent activity: {}", e);
                Vec::new()
            }
        }
    }

    async fn fetch_failed_logins(&self) -> Vec<FailedLogin> {
        match self.get_json::<ValueList>("v1/Activities/Failed").await {
            Ok(list) => decode_entries::<FailedLogin>(list.value, "failed login")
                .into_iter()
                .map(|(mut login, raw)| {
                    login.raw = Some(raw);
                    login
                })
                .collect(),
            Err(e) => {
                error!("Failed to fetch failed logins: {}", e);
                Vec::new()
            }
        }
    }
}
