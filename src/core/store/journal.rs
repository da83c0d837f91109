use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tokio::sync::Mutex;

use super::types::JournalEntry;
use crate::core::catalog::Category;
use crate::core::error::EngineError;

/// Append-only reflection history. Shares the engine's SQLite connection
/// but lives in its own table; entries are never edited or deleted here.
pub struct JournalStore {
    db: Arc<Mutex<Connection>>,
}

impl JournalStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    pub async fn append(&self, entry: &JournalEntry) -> Result<(), EngineError> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO journal_entries (user_id, prompt, response, category, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.user_id,
                entry.prompt,
                entry.response,
                entry.category.as_str(),
                entry.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The user's most recent entries, newest first.
    pub async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<JournalEntry>, EngineError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT user_id, prompt, response, category, timestamp
             FROM journal_entries WHERE user_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (user_id, prompt, response, category, timestamp) = row?;
            let category: Category =
                serde_json::from_value(serde_json::Value::String(category))?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| EngineError::StoreUnavailable(format!("bad timestamp: {}", e)))?
                .with_timezone(&Utc);
            entries.push(JournalEntry {
                user_id,
                prompt,
                response,
                category,
                timestamp,
            });
        }
        Ok(entries)
    }
}
