#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Fatal at startup. The process must not serve prompts without a
    /// valid catalog.
    #[error("prompt catalog failed to load: {0}")]
    CatalogLoad(String),

    /// Transient persistence failure. Recovered by connect_with_retry at
    /// startup and by per-user isolation during dispatch ticks.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Transient delivery failure for a single user. Never escalated past
    /// the dispatcher's per-user boundary.
    #[error("delivery to user {user_id} failed: {reason}")]
    Delivery { user_id: String, reason: String },
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::StoreUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::StoreUnavailable(format!("record decode failed: {}", e))
    }
}
