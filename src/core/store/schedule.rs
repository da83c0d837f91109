use std::sync::Arc;

use chrono::Utc;

use super::types::SchedulePreference;
use super::Persistence;
use crate::core::error::EngineError;

const COLLECTION: &str = "schedule_preferences";

/// Per-user delivery preference store. Absence of a record is a normal
/// outcome (the user is simply not eligible), never an error.
pub struct ScheduleStore {
    store: Arc<dyn Persistence>,
}

impl ScheduleStore {
    pub fn new(store: Arc<dyn Persistence>) -> Self {
        Self { store }
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<SchedulePreference>, EngineError> {
        match self.store.get(COLLECTION, user_id).await? {
            Some(record) => Ok(Some(serde_json::from_value(record)?)),
            None => Ok(None),
        }
    }

    /// Fetch the user's preference, creating and persisting the default
    /// (Monday 09:00, enabled) when none exists yet.
    pub async fn ensure(&self, user_id: &str) -> Result<SchedulePreference, EngineError> {
        if let Some(pref) = self.get(user_id).await? {
            return Ok(pref);
        }
        let pref = SchedulePreference::new(user_id);
        self.put(&pref).await?;
        Ok(pref)
    }

    pub async fn put(&self, pref: &SchedulePreference) -> Result<(), EngineError> {
        self.store
            .put(COLLECTION, &pref.user_id, serde_json::to_value(pref)?)
            .await
    }

    /// Apply a configuration change and stamp `last_updated`.
    pub async fn update<F>(&self, user_id: &str, apply: F) -> Result<SchedulePreference, EngineError>
    where
        F: FnOnce(&mut SchedulePreference),
    {
        let mut pref = self.ensure(user_id).await?;
        apply(&mut pref);
        pref.last_updated = Utc::now();
        self.put(&pref).await?;
        Ok(pref)
    }

    /// Every stored preference; the dispatcher filters this to the
    /// eligible set each tick.
    pub async fn all(&self) -> Result<Vec<SchedulePreference>, EngineError> {
        let records = self.store.query(COLLECTION).await?;
        let mut prefs = Vec::with_capacity(records.len());
        for (_, record) in records {
            prefs.push(serde_json::from_value(record)?);
        }
        Ok(prefs)
    }
}
