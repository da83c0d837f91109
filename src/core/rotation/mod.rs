mod selector;

pub use selector::RotationSelector;

use std::sync::Arc;

use crate::core::catalog::Category;
use crate::core::error::EngineError;
use crate::core::store::UserProgressStore;

/// How the next prompt's category is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryPolicy {
    /// Alternate by lifetime prompt count: a user's odd-numbered prompts
    /// (including the very first) are Self-Awareness, even-numbered are
    /// Connections.
    Alternate,
    /// Explicit user choice.
    Fixed(Category),
}

/// A prompt handed to a caller, already durably recorded.
#[derive(Debug, Clone)]
pub struct PromptAssignment {
    pub category: Category,
    pub text: String,
}

/// Answers "what is this user's next prompt" and records the answer in the
/// same call: no prompt is returned without being recorded, and no record
/// is made without a prompt being returned.
pub struct RotationEngine {
    selector: RotationSelector,
    progress: UserProgressStore,
}

impl RotationEngine {
    pub fn new(selector: RotationSelector, progress: UserProgressStore) -> Self {
        Self { selector, progress }
    }

    pub async fn next_prompt_for(
        &self,
        user_id: &str,
        policy: CategoryPolicy,
    ) -> Result<PromptAssignment, EngineError> {
        let progress = self.progress.get(user_id).await?;
        let total_shown = progress.as_ref().map_or(0, |p| p.total_prompts_shown);

        let category = match policy {
            CategoryPolicy::Fixed(category) => category,
            CategoryPolicy::Alternate => {
                if (total_shown + 1) % 2 == 1 {
                    Category::SelfAwareness
                } else {
                    Category::Connections
                }
            }
        };

        let shown = progress.map(|p| p.shown_for(category)).unwrap_or_default();
        let (text, is_new_cycle) = self.selector.next(category, &shown);

        // Record before returning so a store failure yields no prompt.
        self.progress
            .record_shown(user_id, category, &text, is_new_cycle)
            .await?;

        Ok(PromptAssignment { category, text })
    }
}
