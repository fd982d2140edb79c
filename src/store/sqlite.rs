//! SQLite-backed account rows.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use super::{schema, AccountRecord, AccountStore, StoreError};

const SELECT_COLUMNS: &str = "SELECT id, username, password_hash, salt, role, clave FROM users";

/// Account store over the `users` table.
///
/// The connection is locked per call; no guard outlives a single statement
/// or transaction.
pub struct SqliteAccountStore {
    conn: Mutex<Connection>,
}

impl SqliteAccountStore {
    /// Open (or create) the database at `db_path` and migrate its schema.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        let conn = schema::open(db_path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, for tests and dry runs.
    pub fn in_memory() -> anyhow::Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        schema::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<AccountRecord> {
        Ok(AccountRecord {
            id: row.get(0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            salt: row.get(3)?,
            role: row.get(4)?,
            legacy_secret: row.get(5)?,
        })
    }
}

impl AccountStore for SqliteAccountStore {
    fn insert(
        &self,
        username: &str,
        password_hash: &str,
        salt: &str,
        role: &str,
    ) -> Result<AccountRecord, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (username, password_hash, salt, role) VALUES (?1, ?2, ?3, ?4)",
            params![username, password_hash, salt, role],
        )?;
        Ok(AccountRecord {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            password_hash: Some(password_hash.to_string()),
            salt: Some(salt.to_string()),
            role: role.to_string(),
            legacy_secret: None,
        })
    }

    fn find(&self, username: &str) -> Result<Option<AccountRecord>, StoreError> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE username = ?1"),
                params![username],
                Self::map_row,
            )
            .optional()?;
        Ok(record)
    }

    fn update_credentials(
        &self,
        username: &str,
        password_hash: &str,
        salt: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE users SET password_hash = ?1, salt = ?2 WHERE username = ?3",
            params![password_hash, salt, username],
        )?;
        Ok(changed > 0)
    }

    fn backfill_credentials(
        &self,
        id: i64,
        password_hash: &str,
        salt: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE users SET password_hash = ?1, salt = ?2
             WHERE id = ?3
               AND (password_hash IS NULL OR password_hash = ''
                    OR salt IS NULL OR salt = '')",
            params![password_hash, salt, id],
        )?;
        Ok(changed > 0)
    }

    fn update_role(&self, username: &str, role: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE users SET role = ?1 WHERE username = ?2",
            params![role, username],
        )?;
        Ok(changed > 0)
    }

    fn delete(&self, username: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM users WHERE username = ?1", params![username])?;
        Ok(deleted > 0)
    }

    fn list(&self) -> Result<Vec<AccountRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id DESC"))?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn legacy_candidates(&self) -> Result<Vec<AccountRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS}
             WHERE clave IS NOT NULL
               AND (password_hash IS NULL OR password_hash = ''
                    OR salt IS NULL OR salt = '')
             ORDER BY id"
        ))?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, SqliteAccountStore) {
        let tmp = TempDir::new().unwrap();
        let store = SqliteAccountStore::open(&tmp.path().join("rollcall.db")).unwrap();
        (tmp, store)
    }

    #[test]
    fn insert_and_find() {
        let (_tmp, store) = test_store();

        let rec = store.insert("maria", "aa", "bb", "Teacher").unwrap();
        assert!(rec.id > 0);

        let found = store.find("maria").unwrap().unwrap();
        assert_eq!(found, rec);
        assert!(store.find("nobody").unwrap().is_none());
    }

    #[test]
    fn usernames_are_case_sensitive() {
        let (_tmp, store) = test_store();

        store.insert("Maria", "aa", "bb", "Teacher").unwrap();
        assert!(store.find("maria").unwrap().is_none());
        store.insert("maria", "cc", "dd", "Student").unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn duplicate_insert_is_unique_violation() {
        let (_tmp, store) = test_store();

        store.insert("maria", "aa", "bb", "Teacher").unwrap();
        let err = store.insert("maria", "cc", "dd", "Student").unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation));
    }

    #[test]
    fn update_credentials_reports_missing_rows() {
        let (_tmp, store) = test_store();

        store.insert("maria", "aa", "bb", "Teacher").unwrap();
        assert!(store.update_credentials("maria", "cc", "dd").unwrap());
        assert!(!store.update_credentials("ghost", "cc", "dd").unwrap());

        let rec = store.find("maria").unwrap().unwrap();
        assert_eq!(rec.password_hash.as_deref(), Some("cc"));
        assert_eq!(rec.salt.as_deref(), Some("dd"));
    }

    #[test]
    fn backfill_only_touches_incomplete_rows() {
        let (_tmp, store) = test_store();

        let rec = store.insert("maria", "aa", "bb", "Teacher").unwrap();
        assert!(!store.backfill_credentials(rec.id, "cc", "dd").unwrap());
        assert_eq!(
            store.find("maria").unwrap().unwrap().password_hash.as_deref(),
            Some("aa")
        );
    }

    #[test]
    fn list_is_newest_first() {
        let (_tmp, store) = test_store();

        store.insert("first", "aa", "bb", "Teacher").unwrap();
        store.insert("second", "aa", "bb", "Student").unwrap();

        let names: Vec<String> = store.list().unwrap().into_iter().map(|r| r.username).collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn role_update_and_delete() {
        let (_tmp, store) = test_store();

        store.insert("maria", "aa", "bb", "Teacher").unwrap();
        assert!(store.update_role("maria", "Administrator").unwrap());
        assert_eq!(store.find("maria").unwrap().unwrap().role, "Administrator");

        assert!(store.delete("maria").unwrap());
        assert!(!store.delete("maria").unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn in_memory_store_is_usable() {
        let store = SqliteAccountStore::in_memory().unwrap();
        store.insert("maria", "aa", "bb", "Teacher").unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }
}
