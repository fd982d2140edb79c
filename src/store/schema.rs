//! Versioned schema migrations.
//!
//! `PRAGMA user_version` holds the number of the last applied migration.
//! Each step runs in its own transaction and only when the database is
//! below its version, so opening the same file from several stores is safe.
//! Statements use `IF NOT EXISTS` / `INSERT OR IGNORE` so databases created
//! by older, unversioned builds are adopted rather than rejected; a legacy
//! `users` table missing the credential columns gets them added in place.

use rusqlite::Connection;

/// A numbered migration step.
struct Migration {
    version: u32,
    name: &'static str,
    apply: Apply,
}

enum Apply {
    Sql(&'static str),
    Code(fn(&Connection) -> rusqlite::Result<()>),
}

/// Columns the account store reads, with the definition used to add them
/// to a `users` table that predates them.
const USER_COLUMNS: &[(&str, &str)] = &[
    ("password_hash", "TEXT"),
    ("salt", "TEXT"),
    ("role", "TEXT NOT NULL DEFAULT 'Administrator'"),
    ("clave", "TEXT"),
];

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let cols = stmt
        .query_map([table], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(cols)
}

fn add_missing_user_columns(conn: &Connection) -> rusqlite::Result<()> {
    let existing = table_columns(conn, "users")?;
    for (name, definition) in USER_COLUMNS {
        if existing.iter().any(|c| c == name) {
            continue;
        }
        conn.execute_batch(&format!("ALTER TABLE users ADD COLUMN {name} {definition};"))?;
        tracing::info!(column = name, "Added missing column to legacy users table");
    }
    Ok(())
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "users",
        apply: Apply::Sql("CREATE TABLE IF NOT EXISTS users (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                username      TEXT NOT NULL UNIQUE,
                password_hash TEXT,
                salt          TEXT,
                role          TEXT NOT NULL DEFAULT 'Administrator',
                clave         TEXT
            );"),
    },
    Migration {
        version: 2,
        name: "audit_log",
        apply: Apply::Sql("CREATE TABLE IF NOT EXISTS audit_log (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                username   TEXT NOT NULL,
                action     TEXT NOT NULL,
                details    TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                origin     TEXT NOT NULL DEFAULT 'localhost'
            );
            CREATE INDEX IF NOT EXISTS idx_audit_username ON audit_log(username);
            CREATE INDEX IF NOT EXISTS idx_audit_created_at ON audit_log(created_at);"),
    },
    Migration {
        version: 3,
        name: "settings",
        apply: Apply::Sql("CREATE TABLE IF NOT EXISTS settings (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            INSERT OR IGNORE INTO settings (key, value) VALUES
                ('late_tolerance_minutes', '15'),
                ('max_absences_per_month', '3'),
                ('mandatory_entry_time', '07:00:00'),
                ('institution_name', 'Instituto Rubén Darío');"),
    },
    Migration {
        version: 4,
        name: "users_legacy_columns",
        apply: Apply::Code(add_missing_user_columns),
    },
];

/// Version the database ends up at after [`migrate`].
pub const LATEST_VERSION: u32 = 4;

/// Current `user_version` of the database.
pub fn current_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}

/// Apply every pending migration. Returns the number of steps applied.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<usize> {
    let mut applied = 0;
    for step in MIGRATIONS {
        if current_version(conn)? >= step.version {
            continue;
        }
        let tx = conn.transaction()?;
        match step.apply {
            Apply::Sql(sql) => tx.execute_batch(sql)?,
            Apply::Code(apply) => apply(&tx)?,
        }
        tx.pragma_update(None, "user_version", step.version)?;
        tx.commit()?;
        tracing::debug!(version = step.version, name = step.name, "Applied schema migration");
        applied += 1;
    }
    Ok(applied)
}

/// Open-time connection tuning shared by every store.
pub fn configure(conn: &Connection) -> rusqlite::Result<()> {
    // WAL mode for concurrent reads + crash safety
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

/// Open `db_path`, tune it and bring its schema up to date.
pub fn open(db_path: &std::path::Path) -> anyhow::Result<Connection> {
    use anyhow::Context;

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database dir: {}", parent.display()))?;
        }
    }
    let mut conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    configure(&conn)?;
    migrate(&mut conn).context("Failed to migrate database schema")?;
    Ok(conn)
}
