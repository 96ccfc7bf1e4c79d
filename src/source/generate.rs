//! Demo data generator.
//!
//! Produces self-consistent bundles for running without a live platform.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::bundle::{
    AccountsStatus, AccountsSummary, ComponentDetail, ComponentState, ComponentStatusItem,
    ComponentStatusList, FailedLogin, HealthBundle, LicenseStatus, MaybeEmpty, SecurityActivity,
    Severity, SystemHealthReading, VaultStatus, VaultSummary,
};

pub const DEMO_COMPONENT_TYPES: [&str; 4] = ["CPM", "PSM", "PVWA", "AAM Credential Provider"];

const DEMO_ACTIVITY_COUNT: usize = 20;
const DEMO_FAILED_LOGIN_COUNT: usize = 10;

const EVENT_TYPES: [(&str, u32); 6] = [
    ("Login", 30),
    ("Logout", 20),
    ("Safe Access", 20),
    ("Account Access", 15),
    ("Policy Change", 8),
    ("Configuration Change", 7),
];

const SEVERITIES: [(Severity, u32); 3] = [
    (Severity::Info, 60),
    (Severity::Warning, 30),
    (Severity::Critical, 10),
];

const USERNAMES: [&str; 5] = ["admin", "operator", "user1", "user2", "svc_account"];
const SAFES: [&str; 5] = ["Root", "WindowsServers", "LinuxServers", "Domain Admins", "Service Accounts"];
const ACCOUNT_PREFIXES: [&str; 3] = ["WIN", "LIN", "SVC"];
const CHANGE_TARGETS: [&str; 4] = ["password policy", "rotation settings", "access rules", "platform settings"];
const FAILURE_REASONS: [&str; 5] = [
    "Invalid password",
    "Account locked",
    "Connection timeout",
    "MFA required",
    "Password expired",
];
const OPERATING_SYSTEMS: [&str; 4] = ["Windows Server 2019", "Windows Server 2016", "RHEL 8", "Ubuntu 20.04"];
const LICENSE_STATES: [LicenseStatus; 3] = [
    LicenseStatus::Valid,
    LicenseStatus::ExpiringSoon,
    LicenseStatus::Expired,
];

/// Generate a complete demo bundle.
pub fn generate_bundle<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> HealthBundle {
    let items = DEMO_COMPONENT_TYPES
        .iter()
        .map(|component_type| {
            let total = rng.gen_range(3..=10);
            let connected = roll_connected(rng, total);
            ComponentStatusItem::new(*component_type, connected, total - connected)
        })
        .collect();

    let vault = VaultSummary {
        total_safes: rng.gen_range(50..=200),
        total_accounts: rng.gen_range(1000..=5000),
        version: random_version(rng),
        license_status: *LICENSE_STATES.choose(rng).unwrap_or(&LicenseStatus::Valid),
        license_expiration: Some(now + ChronoDuration::days(rng.gen_range(1..=365))),
    };

    let total = vault.total_accounts;
    let managed = fraction(total, rng.gen_range(0.75..0.95));
    let non_managed = fraction(total, rng.gen_range(0.01..0.10));
    let pending = fraction(total, rng.gen_range(0.01..0.05));
    let accounts = AccountsSummary {
        total_accounts: total,
        managed,
        non_managed,
        pending,
        failed: total - managed - non_managed - pending,
    };

    let health = SystemHealthReading {
        cpu_usage: round1(rng.gen_range(10.0..=80.0)),
        memory_usage: round1(rng.gen_range(20.0..=90.0)),
        disk_usage: round1(rng.gen_range(30.0..=85.0)),
        network_latency: round1(rng.gen_range(1.0..=100.0)),
        last_backup: Some(now - ChronoDuration::hours(rng.gen_range(1..=24))),
    };

    let mut activities: Vec<SecurityActivity> = (0..DEMO_ACTIVITY_COUNT)
        .map(|_| random_activity(rng, now))
        .collect();
    activities.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut failed_logins: Vec<FailedLogin> = (0..DEMO_FAILED_LOGIN_COUNT)
        .map(|_| FailedLogin {
            username: pick(rng, &USERNAMES).to_string(),
            source_ip: random_ip(rng),
            reason: pick(rng, &FAILURE_REASONS).to_string(),
            severity: Severity::Warning,
            timestamp: now - ChronoDuration::minutes(rng.gen_range(1..=1440)),
            raw: None,
        })
        .collect();
    failed_logins.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    HealthBundle {
        component_status: ComponentStatusList { items },
        vault_status: VaultStatus {
            safes: MaybeEmpty::some(vault),
        },
        accounts_status: AccountsStatus {
            value: MaybeEmpty::some(accounts),
        },
        system_health: MaybeEmpty::some(health),
        recent_activities: activities,
        failed_logins,
        last_update: now,
    }
}

/// Simulate drift between two reads of the demo bundle.
///
/// Re-rolls CPU, memory and per-component connectivity.
pub fn apply_drift<R: Rng + ?Sized>(bundle: &mut HealthBundle, rng: &mut R, now: DateTime<Utc>) {
    if let Some(health) = bundle.system_health.as_mut() {
        health.cpu_usage = round1(rng.gen_range(10.0..=80.0));
        health.memory_usage = round1(rng.gen_range(20.0..=90.0));
    }

    for item in &mut bundle.component_status.items {
        let connected = roll_connected(rng, item.total_amount);
        item.connected = connected;
        item.disconnected = item.total_amount - connected;
        item.status = ComponentState::from_disconnected(item.disconnected);
    }

    bundle.last_update = now;
}

/// Synthesize one detail row per instance of a component type.
///
/// The first `connected` instances are reported as connected.
pub fn demo_component_details<R: Rng + ?Sized>(
    item: &ComponentStatusItem,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Vec<ComponentDetail> {
    (0..item.total_amount)
        .map(|i| {
            let connected = i < item.connected;
            ComponentDetail {
                component_type: item.component_type.clone(),
                version: random_version(rng),
                ip_address: format!("192.168.1.{}", rng.gen_range(1..=254)),
                component_user: format!(
                    "svc_{}_{}",
                    item.component_type.to_lowercase().replace(' ', "_"),
                    rng.gen_range(1..=5)
                ),
                connected,
                last_connection: connected
                    .then(|| now - ChronoDuration::minutes(rng.gen_range(0..=1440))),
                os: pick(rng, &OPERATING_SYSTEMS).to_string(),
            }
        })
        .collect()
}

fn random_activity<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> SecurityActivity {
    let event_type = EVENT_TYPES
        .choose_weighted(rng, |(_, weight)| *weight)
        .map(|(name, _)| *name)
        .unwrap_or("Login");
    let severity = SEVERITIES
        .choose_weighted(rng, |(_, weight)| *weight)
        .map(|(severity, _)| *severity)
        .unwrap_or(Severity::Info);
    let username = pick(rng, &USERNAMES).to_string();
    let source_ip = random_ip(rng);

    let (target_safe, target_account, description) = match event_type {
        "Safe Access" | "Account Access" => {
            let safe = pick(rng, &SAFES).to_string();
            let account = format!("{}-{}", pick(rng, &ACCOUNT_PREFIXES), rng.gen_range(100..=999));
            let description = format!("{} accessed {} in {}", username, account, safe);
            (Some(safe), Some(account), description)
        }
        "Policy Change" | "Configuration Change" => {
            let description = format!("{} modified {}", username, pick(rng, &CHANGE_TARGETS));
            (None, None, description)
        }
        "Logout" => (None, None, format!("{} logged out from {}", username, source_ip)),
        _ => (None, None, format!("{} logged in from {}", username, source_ip)),
    };

    SecurityActivity {
        event_type: event_type.to_string(),
        username,
        source_ip,
        target_safe,
        target_account,
        severity,
        description,
        timestamp: now - ChronoDuration::minutes(rng.gen_range(1..=1440)),
        raw: None,
    }
}

fn roll_connected<R: Rng + ?Sized>(rng: &mut R, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    rng.gen_range((total - 2).max(1)..=total)
}

fn random_version<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("12.{}.{}", rng.gen_range(0..=6), rng.gen_range(0..=9))
}

fn random_ip<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("192.168.1.{}", rng.gen_range(1..20))
}

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

fn fraction(total: i64, share: f64) -> i64 {
    (total as f64 * share) as i64
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_component_invariants() {
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut bundle = generate_bundle(&mut rng, Utc::now());
            apply_drift(&mut bundle, &mut rng, Utc::now());

            assert_eq!(bundle.component_status.items.len(), 4);
            for item in &bundle.component_status.items {
                assert_eq!(item.connected + item.disconnected, item.total_amount);
                assert_eq!(item.status == ComponentState::Ok, item.disconnected == 0);
                assert!(item.connected >= 1);
            }
        }
    }

    #[test]
    fn test_accounts_sum_to_total() {
        let mut rng = StdRng::seed_from_u64(7);
        let bundle = generate_bundle(&mut rng, Utc::now());
        let accounts = bundle.accounts_status.value.as_ref().unwrap();

        assert_eq!(
            accounts.managed + accounts.non_managed + accounts.pending + accounts.failed,
            accounts.total_accounts
        );
        assert!(accounts.failed >= 0);
    }

    #[test]
    fn test_events_sorted_newest_first() {
        let mut rng = StdRng::seed_from_u64(42);
        let bundle = generate_bundle(&mut rng, Utc::now());

        assert_eq!(bundle.recent_activities.len(), 20);
        assert_eq!(bundle.failed_logins.len(), 10);
        assert!(bundle
            .recent_activities
            .windows(2)
            .all(|w| w[0].timestamp >= w[1].timestamp));
        assert!(bundle
            .failed_logins
            .windows(2)
            .all(|w| w[0].timestamp >= w[1].timestamp));

        for activity in &bundle.recent_activities {
            let is_access = activity.event_type.ends_with("Access");
            assert_eq!(activity.target_safe.is_some(), is_access);
            assert_eq!(activity.target_account.is_some(), is_access);
        }
    }

    #[test]
    fn test_drift_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut bundle = generate_bundle(&mut rng, Utc::now());

        for _ in 0..100 {
            apply_drift(&mut bundle, &mut rng, Utc::now());
            let health = bundle.system_health.as_ref().unwrap();
            assert!((10.0..=80.0).contains(&health.cpu_usage));
            assert!((20.0..=90.0).contains(&health.memory_usage));
        }
    }

    #[test]
    fn test_component_details_follow_counts() {
        let mut rng = StdRng::seed_from_u64(9);
        let item = ComponentStatusItem::new("AAM Credential Provider", 3, 2);
        let details = demo_component_details(&item, &mut rng, Utc::now());

        assert_eq!(details.len(), 5);
        assert_eq!(details.iter().filter(|d| d.connected).count(), 3);
        assert!(details.iter().all(|d| d.connected == d.last_connection.is_some()));
        assert!(details[0].component_user.starts_with("svc_aam_credential_provider_"));
    }
}
