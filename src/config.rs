//! Configuration module for pamwatch.
//!
//! Loads configuration from environment variables with sensible defaults.

use secrecy::SecretString;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Connection settings for the PAM platform's web services.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Base URL of the platform (default: "https://localhost")
    pub base_url: String,
    /// Logon method: "cyberark", "ldap" or "radius" (default: "cyberark")
    pub auth_type: String,
    pub username: String,
    pub password: SecretString,
    /// Per-request timeout (default: 30s)
    pub timeout: Duration,
    /// Verify TLS certificates (default: true)
    pub verify_tls: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost".to_string(),
            auth_type: "cyberark".to_string(),
            username: String::new(),
            password: SecretString::from(String::new()),
            timeout: Duration::from_secs(30),
            verify_tls: true,
        }
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Use generated demo data instead of a live source (default: true)
    pub demo_mode: bool,
    pub source: SourceConfig,
    /// Optional file caching the demo bundle between runs
    pub demo_fixture: Option<PathBuf>,
    /// Path to the SQLite database file (default: "pamwatch.db")
    pub db_path: String,
    /// Time between collection cycles (default: 3600s)
    pub collect_interval: Duration,
    /// Component types whose per-instance details are stored
    pub components_to_check: Vec<String>,
    /// Snapshot retention in days, 0 keeps everything (default: 0)
    pub retention_days: u32,
    /// Bind address (default: "0.0.0.0")
    pub http_host: String,
    /// HTTP port for the web server (default: 8000)
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            demo_mode: true,
            source: SourceConfig::default(),
            demo_fixture: None,
            db_path: "pamwatch.db".to_string(),
            collect_interval: Duration::from_secs(3600),
            components_to_check: parse_list("CPM,PSM,PVWA,AAM Credential Provider"),
            retention_days: 0,
            http_host: "0.0.0.0".to_string(),
            http_port: 8000,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PAMWATCH_DEMO_MODE`: "true"/"false" (default: true)
    /// - `PAMWATCH_SOURCE_URL`, `PAMWATCH_AUTH_TYPE`, `PAMWATCH_USERNAME`,
    ///   `PAMWATCH_PASSWORD`: live source connection
    /// - `PAMWATCH_SOURCE_TIMEOUT`: request timeout in seconds (default: 30)
    /// - `PAMWATCH_VERIFY_TLS`: "true"/"false" (default: true)
    /// - `PAMWATCH_DEMO_FIXTURE`: demo bundle cache file (default: none)
    /// - `PAMWATCH_DB_PATH`: database file path (default: "pamwatch.db")
    /// - `PAMWATCH_COLLECT_INTERVAL`: seconds between cycles (default: 3600)
    /// - `PAMWATCH_COMPONENTS`: comma-separated detail allow-list
    /// - `PAMWATCH_RETENTION_DAYS`: snapshot retention (default: 0, disabled)
    /// - `PAMWATCH_HOST` / `PAMWATCH_PORT`: bind address (default: 0.0.0.0:8000)
    pub fn load() -> Self {
        Self::load_from(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn load_from<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(flag) = lookup("PAMWATCH_DEMO_MODE").and_then(|v| parse_bool(&v)) {
            cfg.demo_mode = flag;
        }

        if let Some(url) = lookup("PAMWATCH_SOURCE_URL") {
            cfg.source.base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(auth_type) = lookup("PAMWATCH_AUTH_TYPE") {
            cfg.source.auth_type = auth_type.to_lowercase();
        }

        if let Some(username) = lookup("PAMWATCH_USERNAME") {
            cfg.source.username = username;
        }

        if let Some(password) = lookup("PAMWATCH_PASSWORD") {
            cfg.source.password = SecretString::from(password);
        }

        if let Some(secs) = lookup("PAMWATCH_SOURCE_TIMEOUT").and_then(|v| v.parse::<u64>().ok()) {
            if secs > 0 {
                cfg.source.timeout = Duration::from_secs(secs);
            }
        }

        if let Some(flag) = lookup("PAMWATCH_VERIFY_TLS").and_then(|v| parse_bool(&v)) {
            cfg.source.verify_tls = flag;
        }

        if let Some(path) = lookup("PAMWATCH_DEMO_FIXTURE") {
            if !path.is_empty() {
                cfg.demo_fixture = Some(PathBuf::from(path));
            }
        }

        if let Some(db_path) = lookup("PAMWATCH_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(secs) = lookup("PAMWATCH_COLLECT_INTERVAL").and_then(|v| v.parse::<u64>().ok()) {
            cfg.collect_interval = Duration::from_secs(secs.max(1));
        }

        if let Some(list) = lookup("PAMWATCH_COMPONENTS") {
            cfg.components_to_check = parse_list(&list);
        }

        if let Some(days) = lookup("PAMWATCH_RETENTION_DAYS").and_then(|v| v.parse().ok()) {
            cfg.retention_days = days;
        }

        if let Some(host) = lookup("PAMWATCH_HOST") {
            cfg.http_host = host;
        }

        if let Some(port) = lookup("PAMWATCH_PORT").and_then(|v| v.parse().ok()) {
            cfg.http_port = port;
        }

        cfg
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}
