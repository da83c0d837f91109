mod journal;
mod progress;
mod schedule;
pub mod types;

pub use journal::JournalStore;
pub use progress::UserProgressStore;
pub use schedule::ScheduleStore;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{Connection, params};
use tokio::sync::Mutex;

use super::error::EngineError;

/// Persistence collaborator contract. Records are JSON documents keyed by
/// (collection, key); transport failure surfaces as `StoreUnavailable`.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, EngineError>;

    async fn put(
        &self,
        collection: &str,
        key: &str,
        record: serde_json::Value,
    ) -> Result<(), EngineError>;

    /// All records in a collection, keyed. Order is unspecified.
    async fn query(
        &self,
        collection: &str,
    ) -> Result<Vec<(String, serde_json::Value)>, EngineError>;
}

/// SQLite-backed persistence. One connection guarded by a mutex; every
/// operation is a single statement, so per-key read-modify-write sequences
/// issued by one caller never interleave with another caller's write for
/// the same key mid-statement.
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let db = Connection::open(path)?;
        Self::with_connection(db)
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self, EngineError> {
        db.execute(
            "CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (collection, key)
            )",
            [],
        )?;
        db.execute(
            "CREATE TABLE IF NOT EXISTS journal_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                prompt TEXT NOT NULL,
                response TEXT NOT NULL,
                category TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_journal_entries_user_id
             ON journal_entries(user_id, id DESC)",
            [],
        )?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    pub(crate) fn connection(&self) -> Arc<Mutex<Connection>> {
        self.db.clone()
    }

    /// Cheap liveness probe used by the startup connect gate.
    pub async fn ping(&self) -> Result<(), EngineError> {
        let db = self.db.lock().await;
        db.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

#[async_trait]
impl Persistence for SqliteStore {
    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, EngineError> {
        let db = self.db.lock().await;
        let mut stmt =
            db.prepare("SELECT value FROM records WHERE collection = ?1 AND key = ?2")?;
        let mut rows = stmt.query(params![collection, key])?;

        if let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            Ok(Some(serde_json::from_str(&raw)?))
        } else {
            Ok(None)
        }
    }

    async fn put(
        &self,
        collection: &str,
        key: &str,
        record: serde_json::Value,
    ) -> Result<(), EngineError> {
        let raw = serde_json::to_string(&record)?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO records (collection, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(collection, key)
             DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
            params![collection, key, raw],
        )?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
    ) -> Result<Vec<(String, serde_json::Value)>, EngineError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare("SELECT key, value FROM records WHERE collection = ?1")?;
        let rows = stmt.query_map(params![collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (key, raw) = row?;
            results.push((key, serde_json::from_str(&raw)?));
        }
        Ok(results)
    }
}
