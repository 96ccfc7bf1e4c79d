//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::models::*;
use crate::bundle::{ComponentState, LicenseStatus, Severity, FAILED_LOGIN_EVENT};

mod embedded {
    refinery::embed_migrations!("migrations");
}

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Create the schema if absent. Safe to run on every startup.
    fn init(&self) -> Result<(), DbError> {
        let mut conn = self.conn.lock();
        let report = embedded::migrations::runner()
            .run(&mut *conn)
            .map_err(|e| DbError::Migration(e.to_string()))?;

        for migration in report.applied_migrations() {
            tracing::info!("Applied migration {}", migration);
        }

        Ok(())
    }

    // --- Writes ---

    /// Run one collection cycle's writes in a single transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back otherwise.
    pub fn write_cycle<F>(&self, f: F) -> Result<(), DbError>
    where
        F: FnOnce(&SnapshotWriter<'_>) -> Result<(), DbError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        f(&SnapshotWriter { conn: &tx })?;
        tx.commit()?;
        Ok(())
    }

    // --- Component status ---

    /// Component rows from the most recent cycle, in insertion order.
    pub fn latest_component_statuses(&self, limit: usize) -> Result<Vec<ComponentStatusSnapshot>, DbError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, recorded_at, component_type, total_amount, connected, disconnected, status
             FROM component_status
             WHERE recorded_at = (SELECT MAX(recorded_at) FROM component_status)
             ORDER BY id ASC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], component_status_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(rows)
    }

    /// Detail rows owned by a component status row.
    pub fn component_details(&self, component_status_id: i64) -> Result<Vec<ComponentDetailRow>, DbError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, component_status_id, recorded_at, component_type, component_version,
                    ip_address, component_user, connected, last_connection, os
             FROM components WHERE component_status_id = ?1 ORDER BY id ASC",
        )?;

        let rows = stmt
            .query_map(params![component_status_id], |row| {
                Ok(ComponentDetailRow {
                    id: row.get(0)?,
                    component_status_id: row.get(1)?,
                    recorded_at: get_time(row, 2)?,
                    component_type: row.get(3)?,
                    version: row.get(4)?,
                    ip_address: row.get(5)?,
                    component_user: row.get(6)?,
                    connected: row.get(7)?,
                    last_connection: get_opt_time(row, 8)?,
                    os: row.get(9)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(rows)
    }

    // --- Singletons ---

    pub fn latest_vault_status(&self) -> Result<Option<VaultStatusSnapshot>, DbError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, recorded_at, total_safes, total_accounts, version, license_status, license_expiration
                 FROM vault_status ORDER BY recorded_at DESC, id DESC LIMIT 1",
                [],
                |row| {
                    let license: String = row.get(5)?;
                    Ok(VaultStatusSnapshot {
                        id: row.get(0)?,
                        recorded_at: get_time(row, 1)?,
                        total_safes: row.get(2)?,
                        total_accounts: row.get(3)?,
                        version: row.get(4)?,
                        license_status: LicenseStatus::parse(&license),
                        license_expiration: get_opt_time(row, 6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn latest_accounts_status(&self) -> Result<Option<AccountsStatusSnapshot>, DbError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, recorded_at, total_accounts, managed_accounts, non_managed_accounts,
                        pending_accounts, failed_accounts
                 FROM accounts_status ORDER BY recorded_at DESC, id DESC LIMIT 1",
                [],
                |row| {
                    Ok(AccountsStatusSnapshot {
                        id: row.get(0)?,
                        recorded_at: get_time(row, 1)?,
                        total_accounts: row.get(2)?,
                        managed: row.get(3)?,
                        non_managed: row.get(4)?,
                        pending: row.get(5)?,
                        failed: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Most recent system health readings, newest first.
    pub fn system_health_history(&self, limit: usize) -> Result<Vec<SystemHealthSnapshot>, DbError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, recorded_at, cpu_usage, memory_usage, disk_usage, network_latency, last_backup
             FROM system_health ORDER BY recorded_at DESC, id DESC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(SystemHealthSnapshot {
                    id: row.get(0)?,
                    recorded_at: get_time(row, 1)?,
                    cpu_usage: row.get(2)?,
                    memory_usage: row.get(3)?,
                    disk_usage: row.get(4)?,
                    network_latency: row.get(5)?,
                    last_backup: get_opt_time(row, 6)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(rows)
    }

    pub fn latest_system_health(&self) -> Result<Option<SystemHealthSnapshot>, DbError> {
        Ok(self.system_health_history(1)?.into_iter().next())
    }

    // --- Security events ---

    /// Non-login security events from the most recent cycle, newest first.
    pub fn latest_security_events(&self, limit: usize) -> Result<Vec<SecurityEvent>, DbError> {
        self.query_security_events(
            "SELECT id, recorded_at, timestamp, event_type, username, source_ip, target_safe,
                    target_account, severity, description, raw_data
             FROM security_events
             WHERE event_type != ?1
               AND recorded_at = (SELECT MAX(recorded_at) FROM security_events WHERE event_type != ?1)
             ORDER BY timestamp DESC, id ASC LIMIT ?2",
            limit,
        )
    }

    /// Failed login events from the most recent cycle, newest first.
    pub fn latest_failed_logins(&self, limit: usize) -> Result<Vec<SecurityEvent>, DbError> {
        self.query_security_events(
            "SELECT id, recorded_at, timestamp, event_type, username, source_ip, target_safe,
                    target_account, severity, description, raw_data
             FROM security_events
             WHERE event_type = ?1
               AND recorded_at = (SELECT MAX(recorded_at) FROM security_events WHERE event_type = ?1)
             ORDER BY timestamp DESC, id ASC LIMIT ?2",
            limit,
        )
    }

    fn query_security_events(&self, sql: &str, limit: usize) -> Result<Vec<SecurityEvent>, DbError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;

        let rows = stmt
            .query_map(params![FAILED_LOGIN_EVENT, limit as i64], |row| {
                let severity: String = row.get(8)?;
                Ok(SecurityEvent {
                    id: row.get(0)?,
                    recorded_at: get_time(row, 1)?,
                    timestamp: get_time(row, 2)?,
                    event_type: row.get(3)?,
                    username: row.get(4)?,
                    source_ip: row.get(5)?,
                    target_safe: row.get(6)?,
                    target_account: row.get(7)?,
                    severity: Severity::parse(&severity),
                    description: row.get(9)?,
                    raw_data: row.get(10)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(rows)
    }

    // --- Retention ---

    /// Delete every row recorded before `cutoff`. Returns the number of rows removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let cutoff = format_db_time(cutoff);
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let mut removed = tx.execute(
            "DELETE FROM components WHERE component_status_id IN
             (SELECT id FROM component_status WHERE recorded_at < ?1)",
            params![cutoff],
        )?;

        for table in [
            "component_status",
            "vault_status",
            "accounts_status",
            "system_health",
            "security_events",
        ] {
            removed += tx.execute(
                &format!("DELETE FROM {} WHERE recorded_at < ?1", table),
                params![cutoff],
            )?;
        }

        tx.commit()?;
        Ok(removed)
    }
}

/// Insert handle for one collection cycle, valid inside [`Store::write_cycle`].
pub struct SnapshotWriter<'a> {
    conn: &'a Connection,
}

impl SnapshotWriter<'_> {
    /// Insert a component status row and its detail rows. Returns the status row ID.
    pub fn add_component_status(
        &self,
        status: &mut ComponentStatusSnapshot,
        details: &mut [ComponentDetailRow],
    ) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO component_status (recorded_at, component_type, total_amount, connected, disconnected, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                format_db_time(status.recorded_at),
                status.component_type,
                status.total_amount,
                status.connected,
                status.disconnected,
                status.status.as_str(),
            ],
        )?;
        status.id = self.conn.last_insert_rowid();

        let mut stmt = self.conn.prepare(
            "INSERT INTO components (component_status_id, recorded_at, component_type, component_version,
                                     ip_address, component_user, connected, last_connection, os)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;

        for detail in details.iter_mut() {
            detail.component_status_id = status.id;
            stmt.execute(params![
                detail.component_status_id,
                format_db_time(detail.recorded_at),
                detail.component_type,
                detail.version,
                detail.ip_address,
                detail.component_user,
                detail.connected,
                detail.last_connection.map(format_db_time),
                detail.os,
            ])?;
            detail.id = self.conn.last_insert_rowid();
        }

        Ok(status.id)
    }

    pub fn add_vault_status(&self, vault: &VaultStatusSnapshot) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO vault_status (recorded_at, total_safes, total_accounts, version, license_status, license_expiration)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                format_db_time(vault.recorded_at),
                vault.total_safes,
                vault.total_accounts,
                vault.version,
                vault.license_status.as_str(),
                vault.license_expiration.map(format_db_time),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn add_accounts_status(&self, accounts: &AccountsStatusSnapshot) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO accounts_status (recorded_at, total_accounts, managed_accounts, non_managed_accounts,
                                          pending_accounts, failed_accounts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                format_db_time(accounts.recorded_at),
                accounts.total_accounts,
                accounts.managed,
                accounts.non_managed,
                accounts.pending,
                accounts.failed,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn add_system_health(&self, health: &SystemHealthSnapshot) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO system_health (recorded_at, cpu_usage, memory_usage, disk_usage, network_latency, last_backup)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                format_db_time(health.recorded_at),
                health.cpu_usage,
                health.memory_usage,
                health.disk_usage,
                health.network_latency,
                health.last_backup.map(format_db_time),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn add_security_event(&self, event: &SecurityEvent) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO security_events (recorded_at, timestamp, event_type, username, source_ip, target_safe,
                                          target_account, severity, description, raw_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                format_db_time(event.recorded_at),
                format_db_time(event.timestamp),
                event.event_type,
                event.username,
                event.source_ip,
                event.target_safe,
                event.target_account,
                event.severity.as_str(),
                event.description,
                event.raw_data,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}

fn component_status_from_row(row: &Row<'_>) -> SqlResult<ComponentStatusSnapshot> {
    let status: String = row.get(6)?;
    Ok(ComponentStatusSnapshot {
        id: row.get(0)?,
        recorded_at: get_time(row, 1)?,
        component_type: row.get(2)?,
        total_amount: row.get(3)?,
        connected: row.get(4)?,
        disconnected: row.get(5)?,
        status: ComponentState::parse(&status),
    })
}

fn get_time(row: &Row<'_>, idx: usize) -> SqlResult<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_db_time(&s).ok_or_else(|| bad_time(idx, &s))
}

fn get_opt_time(row: &Row<'_>, idx: usize) -> SqlResult<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| parse_db_time(&s).ok_or_else(|| bad_time(idx, &s)))
        .transpose()
}

fn bad_time(idx: usize, s: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("invalid timestamp {:?}", s).into(),
    )
}

/// Format a datetime for storage. Fixed width, so text order is time order.
fn format_db_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S%.9f").to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [
        "%Y-%m-%d %H:%M:%S%.9f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}
