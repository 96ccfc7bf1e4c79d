//! Typed health bundle.
//!
//! These records are the JSON contract shared by the sources, the
//! persistence fallback and the HTTP API. Field names follow the wire
//! format of the PAM web services, hence the renames.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

/// Event type used for failed logins once they are stored as security events.
pub const FAILED_LOGIN_EVENT: &str = "Failed Login";

/// Connectivity state of a component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentState {
    #[serde(rename = "OK")]
    Ok,
    Warning,
}

impl ComponentState {
    /// A component type is healthy iff nothing is disconnected.
    pub fn from_disconnected(disconnected: i64) -> Self {
        if disconnected == 0 {
            Self::Ok
        } else {
            Self::Warning
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warning => "Warning",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "OK" {
            Self::Ok
        } else {
            Self::Warning
        }
    }
}

/// Vault license state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LicenseStatus {
    Valid,
    #[serde(rename = "Expiring Soon")]
    ExpiringSoon,
    Expired,
    #[serde(other)]
    Unknown,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::ExpiringSoon => "Expiring Soon",
            Self::Expired => "Expired",
            Self::Unknown => "Unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Valid" => Self::Valid,
            "Expiring Soon" => Self::ExpiringSoon,
            "Expired" => Self::Expired,
            _ => Self::Unknown,
        }
    }
}

/// Severity of a security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
    #[serde(other)]
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Critical => "Critical",
            Self::Unknown => "Unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Info" => Self::Info,
            "Warning" => Self::Warning,
            "Critical" => Self::Critical,
            _ => Self::Unknown,
        }
    }
}

/// Aggregate connectivity for one component type.
///
/// Decoding is lenient: counts may be missing or sent as strings, and
/// `Status` is always re-derived from the disconnected count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ComponentStatusWire")]
pub struct ComponentStatusItem {
    #[serde(rename = "Component Type")]
    pub component_type: String,
    #[serde(rename = "Total Amount")]
    pub total_amount: i64,
    #[serde(rename = "Connected")]
    pub connected: i64,
    #[serde(rename = "Disconnected")]
    pub disconnected: i64,
    #[serde(rename = "Status")]
    pub status: ComponentState,
}

impl ComponentStatusItem {
    /// Build an item, deriving total and status from the counts.
    pub fn new(component_type: impl Into<String>, connected: i64, disconnected: i64) -> Self {
        Self {
            component_type: component_type.into(),
            total_amount: connected + disconnected,
            connected,
            disconnected,
            status: ComponentState::from_disconnected(disconnected),
        }
    }
}

#[derive(Deserialize)]
struct ComponentStatusWire {
    #[serde(rename = "Component Type")]
    component_type: String,
    #[serde(rename = "Total Amount", default)]
    total_amount: Option<Value>,
    #[serde(rename = "Connected", default)]
    connected: Option<Value>,
    #[serde(rename = "Disconnected", default)]
    disconnected: Option<Value>,
    #[serde(rename = "Status", default)]
    status: Option<Value>,
}

impl From<ComponentStatusWire> for ComponentStatusItem {
    fn from(wire: ComponentStatusWire) -> Self {
        let name = wire.component_type.as_str();
        let connected = coerce_count(wire.connected.as_ref(), name, "Connected");
        let disconnected = coerce_count(wire.disconnected.as_ref(), name, "Disconnected");
        let total_amount = match wire.total_amount {
            Some(ref value) => coerce_count(Some(value), name, "Total Amount"),
            None => {
                warn!("Component {}: no Total Amount, using connected + disconnected", name);
                connected + disconnected
            }
        };

        let status = ComponentState::from_disconnected(disconnected);
        if let Some(Value::String(reported)) = wire.status.as_ref() {
            if reported != status.as_str() {
                warn!(
                    "Component {}: reported status {} overridden by {} ({} disconnected)",
                    name,
                    reported,
                    status.as_str(),
                    disconnected
                );
            }
        }

        Self {
            component_type: wire.component_type,
            total_amount,
            connected,
            disconnected,
            status,
        }
    }
}

/// Read a count that should be an integer, coercing what can be coerced.
fn coerce_count(value: Option<&Value>, component: &str, field: &str) -> i64 {
    match value {
        Some(Value::Number(n)) => match n.as_i64() {
            Some(count) => count,
            None => {
                let count = n.as_f64().unwrap_or_default() as i64;
                warn!("Component {}: {} = {} coerced to {}", component, field, n, count);
                count
            }
        },
        Some(Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(count) => {
                warn!("Component {}: {} sent as string {:?}", component, field, s);
                count
            }
            Err(_) => {
                warn!("Component {}: {} = {:?} is not a number, using 0", component, field, s);
                0
            }
        },
        Some(other) => {
            warn!("Component {}: {} = {} is not a number, using 0", component, field, other);
            0
        }
        None => {
            warn!("Component {}: {} missing, using 0", component, field);
            0
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentStatusList {
    #[serde(rename = "Items", default)]
    pub items: Vec<ComponentStatusItem>,
}

/// One deployed instance of a component type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDetail {
    #[serde(rename = "Component Type")]
    pub component_type: String,
    #[serde(rename = "Component Version")]
    pub version: String,
    #[serde(rename = "IP Address")]
    pub ip_address: String,
    #[serde(rename = "Component User")]
    pub component_user: String,
    #[serde(rename = "Connected")]
    pub connected: bool,
    #[serde(rename = "Last Connection", default, deserialize_with = "timestamp::deserialize_option")]
    pub last_connection: Option<DateTime<Utc>>,
    #[serde(rename = "OS")]
    pub os: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultSummary {
    #[serde(rename = "Total_Safes")]
    pub total_safes: i64,
    #[serde(rename = "Total_Accounts")]
    pub total_accounts: i64,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "License_Status")]
    pub license_status: LicenseStatus,
    #[serde(rename = "License_Expiration", default, deserialize_with = "timestamp::deserialize_option")]
    pub license_expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultStatus {
    #[serde(rename = "Safes", default)]
    pub safes: MaybeEmpty<VaultSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountsSummary {
    #[serde(rename = "Total_Accounts")]
    pub total_accounts: i64,
    #[serde(rename = "Managed_Accounts")]
    pub managed: i64,
    #[serde(rename = "Non_Managed_Accounts")]
    pub non_managed: i64,
    #[serde(rename = "Pending_Accounts")]
    pub pending: i64,
    #[serde(rename = "Failed_Accounts")]
    pub failed: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountsStatus {
    #[serde(default)]
    pub value: MaybeEmpty<AccountsSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealthReading {
    #[serde(rename = "CPU_Usage")]
    pub cpu_usage: f64,
    #[serde(rename = "Memory_Usage")]
    pub memory_usage: f64,
    #[serde(rename = "Disk_Usage")]
    pub disk_usage: f64,
    #[serde(rename = "Network_Latency")]
    pub network_latency: f64,
    #[serde(rename = "Last_Backup", default, deserialize_with = "timestamp::deserialize_option")]
    pub last_backup: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityActivity {
    #[serde(rename = "EventType")]
    pub event_type: String,
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Source_IP")]
    pub source_ip: String,
    #[serde(rename = "Target_Safe", default, skip_serializing_if = "Option::is_none")]
    pub target_safe: Option<String>,
    #[serde(rename = "Target_Account", default, skip_serializing_if = "Option::is_none")]
    pub target_account: Option<String>,
    #[serde(rename = "Severity")]
    pub severity: Severity,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Timestamp", deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
    /// Entry exactly as the live source sent it.
    #[serde(skip)]
    pub raw: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedLogin {
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Source_IP")]
    pub source_ip: String,
    #[serde(rename = "Reason", default)]
    pub reason: String,
    #[serde(rename = "Severity")]
    pub severity: Severity,
    #[serde(rename = "Timestamp", deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
    /// Entry exactly as the live source sent it.
    #[serde(skip)]
    pub raw: Option<String>,
}

/// The full six-category snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthBundle {
    #[serde(default)]
    pub component_status: ComponentStatusList,
    #[serde(default)]
    pub vault_status: VaultStatus,
    #[serde(default)]
    pub accounts_status: AccountsStatus,
    #[serde(default)]
    pub system_health: MaybeEmpty<SystemHealthReading>,
    #[serde(default)]
    pub recent_activities: Vec<SecurityActivity>,
    #[serde(default)]
    pub failed_logins: Vec<FailedLogin>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub last_update: DateTime<Utc>,
}

impl HealthBundle {
    /// Bundle with every category present but empty.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            component_status: ComponentStatusList::default(),
            vault_status: VaultStatus::default(),
            accounts_status: AccountsStatus::default(),
            system_health: MaybeEmpty::none(),
            recent_activities: Vec::new(),
            failed_logins: Vec::new(),
            last_update: now,
        }
    }

    /// True when no category carries data.
    pub fn is_empty(&self) -> bool {
        self.component_status.items.is_empty()
            && self.vault_status.safes.is_none()
            && self.accounts_status.value.is_none()
            && self.system_health.is_none()
            && self.recent_activities.is_empty()
            && self.failed_logins.is_empty()
    }

    /// Names of the required categories that are missing.
    ///
    /// Activities and failed logins may legitimately be empty.
    pub fn missing_categories(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.component_status.items.is_empty() {
            missing.push("component_status");
        }
        if self.vault_status.safes.is_none() {
            missing.push("vault_status");
        }
        if self.accounts_status.value.is_none() {
            missing.push("accounts_status");
        }
        if self.system_health.is_none() {
            missing.push("system_health");
        }
        missing
    }
}

/// Timestamp decoding for payloads and stored rows.
///
/// Accepts RFC 3339 as well as ISO 8601 without an offset, which is read as UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    pub fn parse(s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }

        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {:?}", s)))
    }

    /// Null becomes `None`; so does anything unparsable, with a warning.
    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => {
                let parsed = parse(&s);
                if parsed.is_none() {
                    tracing::warn!("Ignoring invalid timestamp {:?}", s);
                }
                Ok(parsed)
            }
            Some(other) => {
                tracing::warn!("Ignoring non-string timestamp {}", other);
                Ok(None)
            }
        }
    }
}

/// An optional section that serializes as `{}` when absent.
///
/// Deserializing `{}` (or `null`) yields an absent section.
#[derive(Debug, Clone, PartialEq)]
pub struct MaybeEmpty<T>(pub Option<T>);

impl<T> MaybeEmpty<T> {
    pub fn some(value: T) -> Self {
        Self(Some(value))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn as_ref(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn as_mut(&mut self) -> Option<&mut T> {
        self.0.as_mut()
    }
}

impl<T> Default for MaybeEmpty<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> From<Option<T>> for MaybeEmpty<T> {
    fn from(value: Option<T>) -> Self {
        Self(value)
    }
}

impl<T: Serialize> Serialize for MaybeEmpty<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.0 {
            Some(value) => value.serialize(serializer),
            None => serde_json::Map::new().serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for MaybeEmpty<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match &value {
            serde_json::Value::Null => Ok(Self(None)),
            serde_json::Value::Object(map) if map.is_empty() => Ok(Self(None)),
            _ => serde_json::from_value(value)
                .map(|v| Self(Some(v)))
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_bundle_shape() {
        let bundle = HealthBundle::empty(Utc::now());
        let value = serde_json::to_value(&bundle).unwrap();

        assert_eq!(value["component_status"], json!({ "Items": [] }));
        assert_eq!(value["vault_status"], json!({ "Safes": {} }));
        assert_eq!(value["accounts_status"], json!({ "value": {} }));
        assert_eq!(value["system_health"], json!({}));
        assert_eq!(value["recent_activities"], json!([]));
        assert_eq!(value["failed_logins"], json!([]));
        assert!(bundle.is_empty());
    }

    #[test]
    fn test_empty_sections_deserialize_as_absent() {
        let status: VaultStatus = serde_json::from_value(json!({ "Safes": {} })).unwrap();
        assert!(status.safes.is_none());

        let status: AccountsStatus = serde_json::from_value(json!({})).unwrap();
        assert!(status.value.is_none());
    }

    #[test]
    fn test_component_item_wire_names() {
        let item: ComponentStatusItem = serde_json::from_value(json!({
            "Component Type": "CPM",
            "Total Amount": 4,
            "Connected": 3,
            "Disconnected": 1,
            "Status": "Warning"
        }))
        .unwrap();

        assert_eq!(item, ComponentStatusItem::new("CPM", 3, 1));
    }

    #[test]
    fn test_unknown_enums_are_coerced() {
        let vault: VaultSummary = serde_json::from_value(json!({
            "Total_Safes": 1,
            "Total_Accounts": 2,
            "Version": "14.0",
            "License_Status": "Grace Period"
        }))
        .unwrap();
        assert_eq!(vault.license_status, LicenseStatus::Unknown);
        assert_eq!(vault.license_expiration, None);
    }

    #[test]
    fn test_activity_omits_missing_targets() {
        let activity = SecurityActivity {
            event_type: "Login".to_string(),
            username: "admin".to_string(),
            source_ip: "10.0.0.1".to_string(),
            target_safe: None,
            target_account: None,
            severity: Severity::Info,
            description: "admin logged in".to_string(),
            timestamp: Utc::now(),
            raw: Some("{}".to_string()),
        };
        let value = serde_json::to_value(&activity).unwrap();
        assert!(value.get("Target_Safe").is_none());
        assert!(value.get("raw").is_none());
        assert_eq!(value["Severity"], "Info");
    }

    #[test]
    fn test_component_item_without_status_derives_it() {
        let item: ComponentStatusItem = serde_json::from_value(json!({
            "Component Type": "PSM",
            "Total Amount": 3,
            "Connected": 2,
            "Disconnected": 1
        }))
        .unwrap();
        assert_eq!(item.status, ComponentState::Warning);

        let item: ComponentStatusItem = serde_json::from_value(json!({
            "Component Type": "CPM",
            "Total Amount": 2,
            "Connected": 2,
            "Disconnected": 0,
            "Status": "Warning"
        }))
        .unwrap();
        assert_eq!(item.status, ComponentState::Ok);
    }

    #[test]
    fn test_component_counts_are_coerced() {
        let item: ComponentStatusItem = serde_json::from_value(json!({
            "Component Type": "PVWA",
            "Connected": "4",
            "Disconnected": null
        }))
        .unwrap();

        assert_eq!(item.connected, 4);
        assert_eq!(item.disconnected, 0);
        assert_eq!(item.total_amount, 4);
        assert_eq!(item.status, ComponentState::Ok);

        let missing_type = serde_json::from_value::<ComponentStatusItem>(json!({ "Connected": 1 }));
        assert!(missing_type.is_err());
    }

    #[test]
    fn test_timestamps_without_offset_read_as_utc() {
        let naive = timestamp::parse("2024-05-01T10:00:00.123456").unwrap();
        let rfc = timestamp::parse("2024-05-01T10:00:00.123456Z").unwrap();
        assert_eq!(naive, rfc);

        assert_eq!(
            timestamp::parse("2024-05-01 10:00:00"),
            timestamp::parse("2024-05-01T12:00:00+02:00")
        );
        assert!(timestamp::parse("yesterday").is_none());

        let health: SystemHealthReading = serde_json::from_value(json!({
            "CPU_Usage": 1.0,
            "Memory_Usage": 2.0,
            "Disk_Usage": 3.0,
            "Network_Latency": 4.0,
            "Last_Backup": "2024-05-01T10:00:00.123456"
        }))
        .unwrap();
        assert_eq!(health.last_backup, Some(naive));

        let vault: VaultSummary = serde_json::from_value(json!({
            "Total_Safes": 1,
            "Total_Accounts": 2,
            "Version": "14.0",
            "License_Status": "Valid",
            "License_Expiration": "soon"
        }))
        .unwrap();
        assert_eq!(vault.license_expiration, None);
    }

    #[test]
    fn test_bundle_with_naive_timestamps_loads() {
        let bundle: HealthBundle = serde_json::from_value(json!({
            "component_status": { "Items": [] },
            "vault_status": { "Safes": {} },
            "accounts_status": { "value": {} },
            "system_health": {},
            "recent_activities": [{
                "EventType": "Login",
                "Username": "admin",
                "Source_IP": "192.168.1.10",
                "Severity": "Info",
                "Description": "admin logged in",
                "Timestamp": "2024-05-01T09:30:00.000001"
            }],
            "failed_logins": [],
            "last_update": "2024-05-01T10:00:00.654321"
        }))
        .unwrap();

        assert_eq!(bundle.recent_activities.len(), 1);
        assert_eq!(bundle.recent_activities[0].raw, None);
        assert_eq!(
            bundle.last_update,
            timestamp::parse("2024-05-01T10:00:00.654321Z").unwrap()
        );
    }

    #[test]
    fn test_missing_categories() {
        let bundle = HealthBundle::empty(Utc::now());
        assert_eq!(
            bundle.missing_categories(),
            vec!["component_status", "vault_status", "accounts_status", "system_health"]
        );
    }
}
