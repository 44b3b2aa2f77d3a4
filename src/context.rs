//! Optional process-wide [`FeedManager`].
//!
//! Applications that would rather not thread a manager through their own
//! types can install one here. Nothing inside the crate reads it.

use std::sync::{PoisonError, RwLock};

use crate::manager::FeedManager;

static CONTEXT: RwLock<Option<FeedManager>> = RwLock::new(None);

/// Installs `manager` unless one is already installed.
pub fn init(manager: FeedManager) -> bool {
    let mut slot = CONTEXT.write().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        tracing::warn!("Feed context already initialized, keeping the existing manager");
        return false;
    }
    *slot = Some(manager);
    true
}

/// Installs `manager`, returning the previous one.
pub fn replace(manager: FeedManager) -> Option<FeedManager> {
    CONTEXT
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(manager)
}

pub fn get() -> Option<FeedManager> {
    CONTEXT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Removes the installed manager. Its worker stops once the last clone is
/// dropped.
pub fn teardown() -> Option<FeedManager> {
    CONTEXT
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedConfig;

    // Single test: the context is process-wide and tests run in parallel.
    #[tokio::test]
    async fn test_lifecycle() {
        let manager = || async {
            FeedManager::builder()
                .config(FeedConfig::in_memory())
                .build()
                .await
                .unwrap()
        };

        assert!(get().is_none());
        assert!(init(manager().await));
        assert!(!init(manager().await));
        assert!(get().is_some());

        let previous = replace(manager().await);
        assert!(previous.is_some());

        assert!(teardown().is_some());
        assert!(teardown().is_none());
        assert!(get().is_none());
    }
}
