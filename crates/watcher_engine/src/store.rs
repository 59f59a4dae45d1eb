//! Durable set of every code ever seen, backed by SQLite.
//!
//! Uniqueness is enforced by the `UNIQUE` constraint on `codes.code`, not by a
//! read-then-write check, so several watcher processes sharing one database
//! file still report each code as new exactly once.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use engine_logging::engine_debug;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::persist::{ensure_dir, PersistError};

/// How long a writer waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS codes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    source TEXT NOT NULL,
    discovered_at INTEGER NOT NULL
);
";

const REQUIRED_COLUMNS: &[&str] = &["code", "source", "discovered_at"];

/// Source of `discovered_at` timestamps, in epoch seconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database location unusable: {0}")]
    Location(#[from] PersistError),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unexpected schema: {0}")]
    Schema(String),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("store task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRecord {
    pub code: String,
    pub source: String,
    pub discovered_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted { discovered_at: i64 },
    AlreadyExists,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted { .. })
    }
}

/// Handle to the code database; clones share one connection.
#[derive(Clone)]
pub struct CodeStore {
    conn: Arc<Mutex<Connection>>,
    clock: Clock,
}

impl fmt::Debug for CodeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeStore").finish_non_exhaustive()
    }
}

impl CodeStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    ///
    /// Safe to call on every run and from several processes at once.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }
        let conn = Connection::open(path)?;
        engine_debug!("Opened code store at {:?}", path);
        Self::initialize(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        verify_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock: Arc::new(|| chrono::Utc::now().timestamp()),
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Persist `code` unless it is already recorded.
    ///
    /// A duplicate is a normal outcome, never an error.
    pub fn insert_if_new(&self, code: &str, source: &str) -> Result<InsertOutcome, StoreError> {
        let discovered_at = (self.clock)();
        let conn = self.lock()?;
        let changed = conn.execute(
            "INSERT INTO codes (code, source, discovered_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(code) DO NOTHING",
            params![code, source, discovered_at],
        )?;
        Ok(if changed == 1 {
            InsertOutcome::Inserted { discovered_at }
        } else {
            InsertOutcome::AlreadyExists
        })
    }

    pub fn get(&self, code: &str) -> Result<Option<CodeRecord>, StoreError> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT code, source, discovered_at FROM codes WHERE code = ?1",
                params![code],
                |row| {
                    Ok(CodeRecord {
                        code: row.get(0)?,
                        source: row.get(1)?,
                        discovered_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn contains(&self, code: &str) -> Result<bool, StoreError> {
        Ok(self.get(code)?.is_some())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM codes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// All records in insertion order.
    pub fn records(&self) -> Result<Vec<CodeRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT code, source, discovered_at FROM codes ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(CodeRecord {
                code: row.get(0)?,
                source: row.get(1)?,
                discovered_at: row.get(2)?,
            })
        })?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn verify_schema(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('codes')")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for required in REQUIRED_COLUMNS {
        if !columns.iter().any(|c| c == required) {
            return Err(StoreError::Schema(format!(
                "table `codes` lacks column `{required}`"
            )));
        }
    }
    Ok(())
}
