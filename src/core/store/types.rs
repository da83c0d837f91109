use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::catalog::Category;

/// The last prompt a user was shown, recorded alongside rotation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastPrompt {
    pub category: Category,
    pub text: String,
    pub shown_at: DateTime<Utc>,
}

/// Per-user rotation state. Created on a user's first prompt request,
/// mutated on every selection, never deleted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProgress {
    pub user_id: String,
    pub total_prompts_shown: u32,
    pub last_prompt: Option<LastPrompt>,
    /// Texts already shown in the current cycle, per category.
    #[serde(default)]
    pub shown_in_cycle: HashMap<Category, HashSet<String>>,
}

impl UserProgress {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_prompts_shown: 0,
            last_prompt: None,
            shown_in_cycle: HashMap::new(),
        }
    }

    pub fn shown_for(&self, category: Category) -> HashSet<String> {
        self.shown_in_cycle.get(&category).cloned().unwrap_or_default()
    }
}

/// Per-user delivery preference. Mutated only by explicit user
/// configuration actions; the dispatcher reads it and stamps the
/// idempotency marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulePreference {
    pub user_id: String,
    /// 0 = Sunday .. 6 = Saturday.
    pub day_of_week: u8,
    pub hour: u8,
    pub minute: u8,
    pub enabled: bool,
    pub last_updated: DateTime<Utc>,
    /// ISO week identifier (e.g. "2026-W32") of the last completed
    /// dispatch; guards against double-delivery on a retried tick.
    #[serde(default)]
    pub last_dispatched_week: Option<String>,
}

impl SchedulePreference {
    /// Defaults on creation: Monday 09:00, enabled.
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            day_of_week: 1,
            hour: 9,
            minute: 0,
            enabled: true,
            last_updated: Utc::now(),
            last_dispatched_week: None,
        }
    }
}

/// A saved reflection: the prompt the user answered and what they wrote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub user_id: String,
    pub prompt: String,
    pub response: String,
    pub category: Category,
    pub timestamp: DateTime<Utc>,
}
