//! Database model types.
//!
//! Every row is a point-in-time snapshot; `recorded_at` is the time of the
//! collection cycle that wrote it.

use chrono::{DateTime, Utc};

use crate::bundle::{ComponentState, LicenseStatus, Severity};

/// Aggregate connectivity of one component type.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentStatusSnapshot {
    pub id: i64,
    pub recorded_at: DateTime<Utc>,
    pub component_type: String,
    pub total_amount: i64,
    pub connected: i64,
    pub disconnected: i64,
    pub status: ComponentState,
}

/// One component instance, owned by a [`ComponentStatusSnapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDetailRow {
    pub id: i64,
    pub component_status_id: i64,
    pub recorded_at: DateTime<Utc>,
    pub component_type: String,
    pub version: String,
    pub ip_address: String,
    pub component_user: String,
    pub connected: bool,
    pub last_connection: Option<DateTime<Utc>>,
    pub os: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VaultStatusSnapshot {
    pub id: i64,
    pub recorded_at: DateTime<Utc>,
    pub total_safes: i64,
    pub total_accounts: i64,
    pub version: String,
    pub license_status: LicenseStatus,
    pub license_expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountsStatusSnapshot {
    pub id: i64,
    pub recorded_at: DateTime<Utc>,
    pub total_accounts: i64,
    pub managed: i64,
    pub non_managed: i64,
    pub pending: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemHealthSnapshot {
    pub id: i64,
    pub recorded_at: DateTime<Utc>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub network_latency: f64,
    pub last_backup: Option<DateTime<Utc>>,
}

/// A security event, including synthetic "Failed Login" events.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityEvent {
    pub id: i64,
    pub recorded_at: DateTime<Utc>,
    /// When the event happened at the source.
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub username: String,
    pub source_ip: String,
    pub target_safe: Option<String>,
    pub target_account: Option<String>,
    pub severity: Severity,
    pub description: String,
    /// Source payload as JSON.
    pub raw_data: String,
}
