use std::sync::Arc;

use chrono::Utc;

use super::types::{LastPrompt, UserProgress};
use super::Persistence;
use crate::core::catalog::Category;
use crate::core::error::EngineError;

const COLLECTION: &str = "user_progress";

/// The only component allowed to mutate persisted per-user rotation state.
/// All mutation is last-write-wins at single-user granularity.
pub struct UserProgressStore {
    store: Arc<dyn Persistence>,
}

impl UserProgressStore {
    pub fn new(store: Arc<dyn Persistence>) -> Self {
        Self { store }
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<UserProgress>, EngineError> {
        match self.store.get(COLLECTION, user_id).await? {
            Some(record) => Ok(Some(serde_json::from_value(record)?)),
            None => Ok(None),
        }
    }

    /// Record that `text` was shown to the user. Creates the progress
    /// record on first use; when the selector reported a fresh cycle, the
    /// category's shown-set is cleared before the new text is appended.
    pub async fn record_shown(
        &self,
        user_id: &str,
        category: Category,
        text: &str,
        is_new_cycle: bool,
    ) -> Result<UserProgress, EngineError> {
        let mut progress = self
            .get(user_id)
            .await?
            .unwrap_or_else(|| UserProgress::new(user_id));

        let cycle = progress.shown_in_cycle.entry(category).or_default();
        if is_new_cycle {
            cycle.clear();
        }
        cycle.insert(text.to_string());

        progress.total_prompts_shown += 1;
        progress.last_prompt = Some(LastPrompt {
            category,
            text: text.to_string(),
            shown_at: Utc::now(),
        });

        self.store
            .put(COLLECTION, user_id, serde_json::to_value(&progress)?)
            .await?;
        Ok(progress)
    }
}
