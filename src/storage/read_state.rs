use async_trait::async_trait;
use std::collections::HashMap;

use super::schema::Database;
use super::types::PersistenceError;
use crate::article::ArticleId;

/// Preference key holding the serialized read-state map.
pub const READ_STATE_KEY: &str = "read_state";

/// Persisted article id → read flag map.
///
/// The whole map is loaded once at start-up and written back wholesale after
/// every mutation, so implementations need no incremental operations.
#[async_trait]
pub trait ReadStateStore: Send + Sync {
    async fn load_all(&self) -> Result<HashMap<ArticleId, bool>, PersistenceError>;

    async fn save_all(&self, state: &HashMap<ArticleId, bool>) -> Result<(), PersistenceError>;
}

#[async_trait]
impl ReadStateStore for Database {
    async fn load_all(&self) -> Result<HashMap<ArticleId, bool>, PersistenceError> {
        match self.get_preference(READ_STATE_KEY).await? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(HashMap::new()),
        }
    }

    async fn save_all(&self, state: &HashMap<ArticleId, bool>) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(state)?;
        self.set_preference(READ_STATE_KEY, &json).await?;
        tracing::trace!(entries = state.len(), "Read state saved");
        Ok(())
    }
}
