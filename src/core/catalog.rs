use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::EngineError;

/// Topical bucket a prompt belongs to. Users alternate between the two
/// unless they explicitly pick one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SelfAwareness,
    Connections,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::SelfAwareness, Category::Connections];

    /// Human-facing label used in delivered messages.
    pub fn label(&self) -> &'static str {
        match self {
            Category::SelfAwareness => "Self-Awareness",
            Category::Connections => "Connections",
        }
    }

    /// Storage identifier, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::SelfAwareness => "self_awareness",
            Category::Connections => "connections",
        }
    }
}

// Prompts are defined in code rather than loaded from disk so a broken
// deployment artifact can never ship an empty catalog.
const SELF_AWARENESS_PROMPTS: &[&str] = &[
    "Think of one habit that has been holding you back this week. When does it \
     show up, what triggers it, and what would your better self do instead? \
     Describe the first small step.",
    "Recall a recent setback that knocked you off course. What emotions did it \
     bring up, and what hidden lesson did it leave behind?",
    "Write about one grudge or regret you have been carrying. How has it \
     weighed on you, and what is one symbolic way to set it down?",
    "Think of a recent mistake or insecurity that made you feel small. What \
     would you tell a close friend struggling with the same thing? Write that \
     note to yourself.",
    "How has your sleep been lately? What is one small change that would make \
     your evenings calmer, and what would your ideal wind-down look like?",
    "What patterns have you noticed in your behavior this week, and how have \
     your actions lined up with your values?",
];

const CONNECTIONS_PROMPTS: &[&str] = &[
    "Who is one person you haven't talked to in ages but miss? What memories \
     make you smile, and what would you say if you messaged them today?",
    "Think of a recent group conversation. Did you speak up or stay quiet? \
     What would make the next one better?",
    "Who in your life seems stressed or lonely lately? What is one small, \
     kind thing you could do for them this week?",
    "List three tiny things that made you happy today. Why did those moments \
     matter, and who could you thank for one of them?",
    "Recall a recent argument or tension. What sparked it, what role did you \
     play, and what would you do differently next time?",
    "Who always has your back? How have they helped you lately, and how could \
     you show them it mattered?",
];

/// Immutable, process-lifetime collection of prompt texts grouped by
/// category. Shared read-only across every task; never mutated after load.
pub struct PromptCatalog {
    entries: HashMap<Category, Vec<String>>,
}

impl PromptCatalog {
    /// Load the built-in catalog. Deterministic: the same binary always
    /// yields the same categories in the same order.
    pub fn load() -> Result<Self, EngineError> {
        let mut entries = HashMap::new();
        entries.insert(
            Category::SelfAwareness,
            SELF_AWARENESS_PROMPTS.iter().map(|s| s.to_string()).collect(),
        );
        entries.insert(
            Category::Connections,
            CONNECTIONS_PROMPTS.iter().map(|s| s.to_string()).collect(),
        );
        Self::from_entries(entries)
    }

    /// Build a catalog from explicit entries, validating that every
    /// category has at least one prompt.
    pub fn from_entries(entries: HashMap<Category, Vec<String>>) -> Result<Self, EngineError> {
        if entries.is_empty() {
            return Err(EngineError::CatalogLoad("no categories".to_string()));
        }
        for (category, texts) in &entries {
            if texts.is_empty() {
                return Err(EngineError::CatalogLoad(format!(
                    "category {:?} has no prompts",
                    category
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Prompt texts for a category in stable source order. Empty slice for
    /// a category the catalog does not carry.
    pub fn entries_for(&self, category: Category) -> &[String] {
        self.entries.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }
}
