use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::core::catalog::{Category, PromptCatalog};

/// Stateless prompt selection. The caller owns the cycle set and is
/// responsible for recording the chosen text back into it.
pub struct RotationSelector {
    catalog: Arc<PromptCatalog>,
}

impl RotationSelector {
    pub fn new(catalog: Arc<PromptCatalog>) -> Self {
        Self { catalog }
    }

    /// Pick a prompt for `category` that is not in `already_shown`,
    /// uniformly at random. When every entry has been shown, the cycle
    /// resets and any entry may repeat. The returned flag is true whenever
    /// this selection starts a fresh pass through the category (empty
    /// cycle set or exhaustion reset); a single-entry category therefore
    /// reports a new cycle on every call.
    pub fn next(&self, category: Category, already_shown: &HashSet<String>) -> (String, bool) {
        let entries = self.catalog.entries_for(category);

        let available: Vec<&String> = entries
            .iter()
            .filter(|text| !already_shown.contains(*text))
            .collect();

        if available.is_empty() {
            let text = entries
                .choose(&mut rand::thread_rng())
                .expect("catalog categories are never empty");
            return (text.clone(), true);
        }

        let text = available
            .choose(&mut rand::thread_rng())
            .expect("available set is non-empty");
        ((*text).clone(), already_shown.is_empty())
    }
}
