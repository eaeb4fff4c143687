//! Repository layer for SQLite persistence.
//!
//! Each repository holds only the database path and opens a short-lived
//! connection per operation, so repositories are cheap to share across
//! worker tasks behind an `Arc`.

mod detections;
mod inventory;

pub use detections::{ComponentSummary, DetectionRepository};
pub use inventory::{CacheStatus, FetchOutcome, InventoryRepository, UpsertResult};

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;

/// Errors raised by the repository layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Open a connection with WAL journaling and a busy timeout.
pub fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

/// Run `f` inside a `BEGIN IMMEDIATE` transaction, committing on success
/// and rolling back on error.
pub(crate) fn with_immediate_tx<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    conn.execute("BEGIN IMMEDIATE", [])?;

    let result = f(conn);

    if result.is_ok() {
        conn.execute("COMMIT", [])?;
    } else {
        let _ = conn.execute("ROLLBACK", []);
    }

    result
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
