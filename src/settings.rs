//! Institution-wide settings kept in the database.
//!
//! These are the values attendance screens consult (late tolerance, absence
//! limits, entry time, institution name). Defaults are seeded by the schema
//! migration with `INSERT OR IGNORE`, so edits made here survive re-opening.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::store::schema;

pub const LATE_TOLERANCE_MINUTES: &str = "late_tolerance_minutes";
pub const MAX_ABSENCES_PER_MONTH: &str = "max_absences_per_month";
pub const MANDATORY_ENTRY_TIME: &str = "mandatory_entry_time";
pub const INSTITUTION_NAME: &str = "institution_name";

pub struct Settings {
    conn: Mutex<Connection>,
}

impl Settings {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = schema::open(db_path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Numeric setting. Missing keys yield `None`; unparsable values are an error.
    pub fn get_u32(&self, key: &str) -> Result<Option<u32>> {
        match self.get(key)? {
            Some(raw) => {
                let n = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("Setting '{key}' is not a number: {raw:?}"))?;
                Ok(Some(n))
            }
            None => Ok(None),
        }
    }

    /// Insert or overwrite a setting.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        tracing::info!(key, "Setting updated");
        Ok(())
    }

    /// Every setting, sorted by key.
    pub fn all(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
