//! Mapping between bundle categories and snapshot rows.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::bundle::{
    AccountsStatus, AccountsSummary, ComponentDetail, ComponentState, ComponentStatusItem,
    ComponentStatusList, FailedLogin, HealthBundle, MaybeEmpty, SecurityActivity,
    SystemHealthReading, VaultStatus, VaultSummary, FAILED_LOGIN_EVENT,
};
use crate::db::{
    AccountsStatusSnapshot, ComponentDetailRow, ComponentStatusSnapshot, DbError, SecurityEvent,
    SnapshotWriter, Store, SystemHealthSnapshot, VaultStatusSnapshot,
};

/// Row cap for list categories read back from the store.
pub const LATEST_LIST_LIMIT: usize = 10;

/// Write every category of `bundle` through `writer`.
///
/// `details` holds the per-instance rows fetched for allow-listed
/// component types, keyed by component type.
pub fn store_bundle(
    writer: &SnapshotWriter<'_>,
    bundle: &HealthBundle,
    details: &HashMap<String, Vec<ComponentDetail>>,
    recorded_at: DateTime<Utc>,
) -> Result<(), DbError> {
    for item in &bundle.component_status.items {
        let mut status = component_snapshot(item, recorded_at);
        let mut rows: Vec<ComponentDetailRow> = details
            .get(&item.component_type)
            .map(|list| list.iter().map(|d| detail_row(d, recorded_at)).collect())
            .unwrap_or_default();
        writer.add_component_status(&mut status, &mut rows)?;
    }

    if let Some(vault) = bundle.vault_status.safes.as_ref() {
        writer.add_vault_status(&VaultStatusSnapshot {
            id: 0,
            recorded_at,
            total_safes: vault.total_safes,
            total_accounts: vault.total_accounts,
            version: vault.version.clone(),
            license_status: vault.license_status,
            license_expiration: vault.license_expiration,
        })?;
    }

    if let Some(accounts) = bundle.accounts_status.value.as_ref() {
        writer.add_accounts_status(&AccountsStatusSnapshot {
            id: 0,
            recorded_at,
            total_accounts: accounts.total_accounts,
            managed: accounts.managed,
            non_managed: accounts.non_managed,
            pending: accounts.pending,
            failed: accounts.failed,
        })?;
    }

    if let Some(health) = bundle.system_health.as_ref() {
        writer.add_system_health(&SystemHealthSnapshot {
            id: 0,
            recorded_at,
            cpu_usage: health.cpu_usage,
            memory_usage: health.memory_usage,
            disk_usage: health.disk_usage,
            network_latency: health.network_latency,
            last_backup: health.last_backup,
        })?;
    }

    for activity in &bundle.recent_activities {
        writer.add_security_event(&activity_event(activity, recorded_at))?;
    }

    for login in &bundle.failed_logins {
        writer.add_security_event(&failed_login_event(login, recorded_at))?;
    }

    Ok(())
}

/// Rebuild a bundle from the newest stored snapshots.
///
/// Returns `None` when nothing has been stored yet.
pub fn load_latest_bundle(store: &Store) -> Result<Option<HealthBundle>, DbError> {
    let components = store.latest_component_statuses(LATEST_LIST_LIMIT)?;
    let vault = store.latest_vault_status()?;
    let accounts = store.latest_accounts_status()?;
    let health = store.latest_system_health()?;
    let events = store.latest_security_events(LATEST_LIST_LIMIT)?;
    let logins = store.latest_failed_logins(LATEST_LIST_LIMIT)?;

    let last_update = components
        .iter()
        .map(|c| c.recorded_at)
        .chain(vault.iter().map(|v| v.recorded_at))
        .chain(accounts.iter().map(|a| a.recorded_at))
        .chain(health.iter().map(|h| h.recorded_at))
        .chain(events.iter().map(|e| e.recorded_at))
        .chain(logins.iter().map(|e| e.recorded_at))
        .max();

    let Some(last_update) = last_update else {
        return Ok(None);
    };

    Ok(Some(HealthBundle {
        component_status: ComponentStatusList {
            items: components.iter().map(item_from_snapshot).collect(),
        },
        vault_status: VaultStatus {
            safes: MaybeEmpty(vault.map(|v| VaultSummary {
                total_safes: v.total_safes,
                total_accounts: v.total_accounts,
                version: v.version,
                license_status: v.license_status,
                license_expiration: v.license_expiration,
            })),
        },
        accounts_status: AccountsStatus {
            value: MaybeEmpty(accounts.map(|a| AccountsSummary {
                total_accounts: a.total_accounts,
                managed: a.managed,
                non_managed: a.non_managed,
                pending: a.pending,
                failed: a.failed,
            })),
        },
        system_health: MaybeEmpty(health.map(|h| SystemHealthReading {
            cpu_usage: h.cpu_usage,
            memory_usage: h.memory_usage,
            disk_usage: h.disk_usage,
            network_latency: h.network_latency,
            last_backup: h.last_backup,
        })),
        recent_activities: events.into_iter().map(activity_from_event).collect(),
        failed_logins: logins.into_iter().map(failed_login_from_event).collect(),
        last_update,
    }))
}

fn component_snapshot(item: &ComponentStatusItem, recorded_at: DateTime<Utc>) -> ComponentStatusSnapshot {
    if item.connected + item.disconnected != item.total_amount {
        tracing::warn!(
            "Component {} reports total {} but {} connected + {} disconnected",
            item.component_type,
            item.total_amount,
            item.connected,
            item.disconnected
        );
    }

    ComponentStatusSnapshot {
        id: 0,
        recorded_at,
        component_type: item.component_type.clone(),
        total_amount: item.total_amount,
        connected: item.connected,
        disconnected: item.disconnected,
        status: ComponentState::from_disconnected(item.disconnected),
    }
}

fn item_from_snapshot(snapshot: &ComponentStatusSnapshot) -> ComponentStatusItem {
    ComponentStatusItem {
        component_type: snapshot.component_type.clone(),
        total_amount: snapshot.total_amount,
        connected: snapshot.connected,
        disconnected: snapshot.disconnected,
        status: snapshot.status,
    }
}

fn detail_row(detail: &ComponentDetail, recorded_at: DateTime<Utc>) -> ComponentDetailRow {
    ComponentDetailRow {
        id: 0,
        component_status_id: 0,
        recorded_at,
        component_type: detail.component_type.clone(),
        version: detail.version.clone(),
        ip_address: detail.ip_address.clone(),
        component_user: detail.component_user.clone(),
        connected: detail.connected,
        last_connection: detail.last_connection,
        os: detail.os.clone(),
    }
}

fn activity_event(activity: &SecurityActivity, recorded_at: DateTime<Utc>) -> SecurityEvent {
    SecurityEvent {
        id: 0,
        recorded_at,
        timestamp: activity.timestamp,
        event_type: activity.event_type.clone(),
        username: activity.username.clone(),
        source_ip: activity.source_ip.clone(),
        target_safe: activity.target_safe.clone(),
        target_account: activity.target_account.clone(),
        severity: activity.severity,
        description: activity.description.clone(),
        raw_data: raw_payload(activity.raw.as_deref(), activity),
    }
}

fn failed_login_event(login: &FailedLogin, recorded_at: DateTime<Utc>) -> SecurityEvent {
    SecurityEvent {
        id: 0,
        recorded_at,
        timestamp: login.timestamp,
        event_type: FAILED_LOGIN_EVENT.to_string(),
        username: login.username.clone(),
        source_ip: login.source_ip.clone(),
        target_safe: None,
        target_account: None,
        severity: login.severity,
        description: login.reason.clone(),
        raw_data: raw_payload(login.raw.as_deref(), login),
    }
}

fn activity_from_event(event: SecurityEvent) -> SecurityActivity {
    SecurityActivity {
        event_type: event.event_type,
        username: event.username,
        source_ip: event.source_ip,
        target_safe: event.target_safe,
        target_account: event.target_account,
        severity: event.severity,
        description: event.description,
        timestamp: event.timestamp,
        raw: None,
    }
}

fn failed_login_from_event(event: SecurityEvent) -> FailedLogin {
    FailedLogin {
        username: event.username,
        source_ip: event.source_ip,
        reason: event.description,
        severity: event.severity,
        timestamp: event.timestamp,
        raw: None,
    }
}

/// The entry as received when there is one, otherwise its serialized form.
fn raw_payload<T: Serialize>(raw: Option<&str>, entry: &T) -> String {
    match raw {
        Some(raw) => raw.to_string(),
        None => serde_json::to_string(entry).unwrap_or_default(),
    }
}
