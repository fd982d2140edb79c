use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::path::Path;

use crate::store::schema;

// ── Event types ─────────────────────────────────────────────────

/// What happened to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AccountCreated,
    LoginSucceeded,
    LoginFailed,
    LoginLocked,
    PasswordChanged,
    RoleChanged,
    AccountDeleted,
    LegacyMigrated,
    SettingChanged,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountCreated => "account_created",
            Self::LoginSucceeded => "login_succeeded",
            Self::LoginFailed => "login_failed",
            Self::LoginLocked => "login_locked",
            Self::PasswordChanged => "password_changed",
            Self::RoleChanged => "role_changed",
            Self::AccountDeleted => "account_deleted",
            Self::LegacyMigrated => "legacy_migrated",
            Self::SettingChanged => "setting_changed",
        }
    }
}

/// One stored audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub username: String,
    /// Stored as text so rows written by newer builds still load.
    pub action: String,
    pub details: String,
    /// RFC 3339, UTC, second precision.
    pub created_at: String,
    pub origin: String,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn day_start(day: NaiveDate) -> String {
    format!("{}T00:00:00Z", day.format("%Y-%m-%d"))
}

// ── SQLite store ────────────────────────────────────────────────

const SELECT_COLUMNS: &str =
    "SELECT id, username, action, details, created_at, origin FROM audit_log";

pub struct AuditLog {
    conn: Mutex<Connection>,
}

impl AuditLog {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = schema::open(db_path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
        Ok(AuditEntry {
            id: row.get(0)?,
            username: row.get(1)?,
            action: row.get(2)?,
            details: row.get(3)?,
            created_at: row.get(4)?,
            origin: row.get(5)?,
        })
    }

    /// Append an entry stamped with the current time.
    pub fn record(&self, username: &str, action: AuditAction, details: &str) -> Result<()> {
        self.record_at(username, action, details, Utc::now())
    }

    pub fn record_at(
        &self,
        username: &str,
        action: AuditAction,
        details: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO audit_log (username, action, details, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![username, action.as_str(), details, timestamp(at)],
        )?;
        tracing::debug!(username, action = action.as_str(), "Audit entry recorded");
        Ok(())
    }

    /// Latest entries first.
    pub fn recent(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(params![limit], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn for_user(&self, username: &str) -> Result<Vec<AuditEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE username = ?1 ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt
            .query_map(params![username], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Entries from the start of `from` through the end of `to` (UTC days).
    pub fn between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<AuditEntry>> {
        let end = to.succ_opt().unwrap_or(to);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS}
             WHERE created_at >= ?1 AND created_at < ?2
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt
            .query_map(params![day_start(from), day_start(end)], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete entries older than `days`. Returns the number removed.
    pub fn prune_older_than(&self, days: u32) -> Result<u64> {
        let cutoff = timestamp(Utc::now() - Duration::days(i64::from(days)));
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM audit_log WHERE created_at < ?1",
            params![cutoff],
        )?;
        if deleted > 0 {
            tracing::info!(deleted, days, "Pruned old audit entries");
        }
        Ok(deleted as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_log(tmp: &TempDir) -> AuditLog {
        AuditLog::open(&tmp.path().join("rollcall.db")).unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn record_and_read_back() {
        let tmp = TempDir::new().unwrap();
        let log = test_log(&tmp);

        log.record("maria", AuditAction::LoginSucceeded, "").unwrap();
        log.record("jose", AuditAction::LoginFailed, "").unwrap();

        let recent = log.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].origin, "localhost");

        let maria = log.for_user("maria").unwrap();
        assert_eq!(maria.len(), 1);
        assert_eq!(maria[0].action, "login_succeeded");
    }

    #[test]
    fn recent_respects_limit_and_order() {
        let tmp = TempDir::new().unwrap();
        let log = test_log(&tmp);

        log.record_at("a", AuditAction::AccountCreated, "", at("2026-01-01T08:00:00Z"))
            .unwrap();
        log.record_at("b", AuditAction::AccountCreated, "", at("2026-01-02T08:00:00Z"))
            .unwrap();
        log.record_at("c", AuditAction::AccountCreated, "", at("2026-01-03T08:00:00Z"))
            .unwrap();

        let recent = log.recent(2).unwrap();
        let users: Vec<&str> = recent.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(users, vec!["c", "b"]);
    }

    #[test]
    fn between_is_inclusive_of_whole_days() {
        let tmp = TempDir::new().unwrap();
        let log = test_log(&tmp);

        log.record_at("a", AuditAction::LoginFailed, "", at("2026-03-01T23:59:59Z"))
            .unwrap();
        log.record_at("b", AuditAction::LoginFailed, "", at("2026-03-02T00:00:00Z"))
            .unwrap();
        log.record_at("c", AuditAction::LoginFailed, "", at("2026-03-03T23:59:59Z"))
            .unwrap();
        log.record_at("d", AuditAction::LoginFailed, "", at("2026-03-04T00:00:00Z"))
            .unwrap();

        let from = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        let mut users: Vec<String> = log
            .between(from, to)
            .unwrap()
            .into_iter()
            .map(|e| e.username)
            .collect();
        users.sort();
        assert_eq!(users, vec!["b", "c"]);
    }

    #[test]
    fn prune_removes_only_old_entries() {
        let tmp = TempDir::new().unwrap();
        let log = test_log(&tmp);

        log.record_at(
            "old",
            AuditAction::LoginFailed,
            "",
            Utc::now() - Duration::days(45),
        )
        .unwrap();
        log.record("new", AuditAction::LoginFailed, "").unwrap();

        assert_eq!(log.prune_older_than(30).unwrap(), 1);
        let remaining = log.recent(10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].username, "new");
    }

    #[test]
    fn action_names_are_stable() {
        assert_eq!(AuditAction::LegacyMigrated.as_str(), "legacy_migrated");
        assert_eq!(AuditAction::LoginLocked.as_str(), "login_locked");
    }
}
