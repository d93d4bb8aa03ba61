//! Persistent SQLite store for keyword mappings and users.

use rusqlite::{Connection, OptionalExtension, params};
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Errors returned by the keyword store.
#[derive(Debug)]
pub enum StoreError {
    /// The keyword is already registered; carries the stored path.
    AlreadyExists { keyword: String, file_path: String },
    /// No keyword with this name.
    NotFound(String),
    Sqlite(rusqlite::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists { keyword, file_path } => {
                write!(f, "keyword '{keyword}' already exists: {file_path}")
            }
            Self::NotFound(keyword) => write!(f, "keyword '{keyword}' not found"),
            Self::Sqlite(e) => write!(f, "database error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

/// A stored bot user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub user_id: i64,
    pub contact: Option<String>,
    pub subscribed: bool,
    pub admin: bool,
    pub created_at: String,
}

/// Keyword usage as shown in statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordUsage {
    pub keyword: String,
    pub count: u64,
}

/// SQLite-backed keyword and user store.
///
/// Every mutating method is a single statement executed under the connection
/// lock, so concurrent callers never observe a half-applied change.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create a new in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self::with_connection(conn)?;

        let (keywords, users) = db.counts()?;
        info!("Loaded database from {:?} ({} keywords, {} users)", path, keywords, users);
        Ok(db)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                keyword TEXT NOT NULL UNIQUE,
                file_path TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                contact TEXT,
                subscribed INTEGER NOT NULL DEFAULT 0,
                admin INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_subscribed ON users(subscribed);
        "#,
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a statement half-applied.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn counts(&self) -> Result<(u64, u64), StoreError> {
        let conn = self.conn();
        let keywords: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok((keywords as u64, users as u64))
    }

    // ==================== KEYWORD METHODS ====================

    /// File path registered for `keyword`.
    pub fn lookup(&self, keyword: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn();
        let path = conn
            .query_row(
                "SELECT file_path FROM files WHERE keyword = ?1",
                params![keyword],
                |row| row.get(0),
            )
            .optional()?;
        Ok(path)
    }

    /// Like [`lookup`](Self::lookup), with an explicit existence flag.
    pub fn exists(&self, keyword: &str) -> Result<(bool, String), StoreError> {
        Ok(match self.lookup(keyword)? {
            Some(path) => (true, path),
            None => (false, String::new()),
        })
    }

    /// Register a new keyword.
    ///
    /// The insert relies on the `UNIQUE` constraint, so two racing admins can
    /// never both succeed. On conflict the stored path is returned unchanged.
    pub fn add(&self, keyword: &str, file_path: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO files (keyword, file_path, count, created_at) VALUES (?1, ?2, 0, ?3)
             ON CONFLICT(keyword) DO NOTHING",
            params![keyword, file_path, now()],
        )?;

        if inserted == 0 {
            let existing: String = conn.query_row(
                "SELECT file_path FROM files WHERE keyword = ?1",
                params![keyword],
                |row| row.get(0),
            )?;
            return Err(StoreError::AlreadyExists {
                keyword: keyword.to_string(),
                file_path: existing,
            });
        }

        info!("🔑 Keyword registered: {} -> {}", keyword, file_path);
        Ok(())
    }

    pub fn increment_count(&self, keyword: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE files SET count = count + 1 WHERE keyword = ?1",
            params![keyword],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(keyword.to_string()));
        }
        debug!("Keyword {} redeemed", keyword);
        Ok(())
    }

    /// All keywords with their usage counts, ordered by keyword.
    pub fn list_all(&self) -> Result<Vec<KeywordUsage>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT keyword, count FROM files ORDER BY keyword")?;
        let rows = stmt.query_map([], |row| {
            Ok(KeywordUsage {
                keyword: row.get(0)?,
                count: row.get::<_, i64>(1)? as u64,
            })
        })?;
        let usage = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(usage)
    }

    /// Sum of all keyword usage counts.
    pub fn total_redemptions(&self) -> Result<u64, StoreError> {
        let conn = self.conn();
        let total: i64 = conn.query_row("SELECT COALESCE(SUM(count), 0) FROM files", [], |row| row.get(0))?;
        Ok(total as u64)
    }

    // ==================== USER METHODS ====================

    /// Create the user record if it does not exist yet.
    pub fn ensure_user(&self, user_id: i64) -> Result<(), StoreError> {
        let conn = self.conn();
        let created = conn.execute(
            "INSERT OR IGNORE INTO users (user_id, created_at) VALUES (?1, ?2)",
            params![user_id, now()],
        )?;
        if created > 0 {
            info!("👋 New user: {}", user_id);
        }
        Ok(())
    }

    pub fn user(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        let conn = self.conn();
        let record = conn
            .query_row(
                "SELECT user_id, contact, subscribed, admin, created_at FROM users WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserRecord {
                        user_id: row.get(0)?,
                        contact: row.get(1)?,
                        subscribed: row.get(2)?,
                        admin: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Store the user's contact. A contact that is already stored is never
    /// overwritten; returns whether this call stored it.
    pub fn save_contact(&self, user_id: i64, contact: &str) -> Result<bool, StoreError> {
        let conn = self.conn();
        let changed = conn.execute(
            "INSERT INTO users (user_id, contact, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET contact = excluded.contact
             WHERE users.contact IS NULL",
            params![user_id, contact, now()],
        )?;
        if changed > 0 {
            info!("📇 Contact saved for user {}", user_id);
        }
        Ok(changed > 0)
    }

    /// Mark an existing user as admin. Users are only created by `/start` or
    /// a shared contact, so this never inserts a row.
    pub fn set_admin(&self, user_id: i64) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute("UPDATE users SET admin = 1 WHERE user_id = ?1", params![user_id])?;
        Ok(())
    }

    /// Record the last observed subscription of an existing user.
    pub fn set_subscribed(&self, user_id: i64, subscribed: bool) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE users SET subscribed = ?2 WHERE user_id = ?1",
            params![user_id, subscribed],
        )?;
        Ok(())
    }

    pub fn subscribed_user_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE subscribed = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
impl Database {
    /// Run raw SQL against the store, e.g. to install failing triggers.
    pub fn execute_raw(&self, sql: &str) -> Result<(), StoreError> {
        self.conn().execute_batch(sql)?;
        Ok(())
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
