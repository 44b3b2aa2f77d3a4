use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::article::{Article, ArticleId};
use crate::storage::{PersistenceError, ReadStateStore};

// ============================================================================
// Article store
// ============================================================================

/// Safe URL → articles, in fetch order. Append-only for the process lifetime.
#[derive(Default)]
pub(crate) struct ArticleStore {
    feeds: RwLock<HashMap<String, Vec<Article>>>,
}

impl ArticleStore {
    pub(crate) fn append(&self, key: &str, articles: &[Article]) {
        let mut feeds = self.feeds.write().unwrap_or_else(PoisonError::into_inner);
        feeds
            .entry(key.to_string())
            .or_default()
            .extend_from_slice(articles);
    }

    pub(crate) fn get(&self, key: &str) -> Vec<Article> {
        let feeds = self.feeds.read().unwrap_or_else(PoisonError::into_inner);
        feeds.get(key).cloned().unwrap_or_default()
    }

    pub(crate) fn first(&self, key: &str) -> Option<Article> {
        let feeds = self.feeds.read().unwrap_or_else(PoisonError::into_inner);
        feeds.get(key).and_then(|list| list.first().cloned())
    }

    /// First stored article with `id`, scanning every feed.
    pub(crate) fn find(&self, id: ArticleId) -> Option<Article> {
        let feeds = self.feeds.read().unwrap_or_else(PoisonError::into_inner);
        feeds
            .values()
            .flat_map(|list| list.iter())
            .find(|a| a.id == id)
            .cloned()
    }

    pub(crate) fn ids(&self) -> HashSet<ArticleId> {
        let feeds = self.feeds.read().unwrap_or_else(PoisonError::into_inner);
        feeds.values().flatten().map(|a| a.id).collect()
    }

    pub(crate) fn snapshot(&self) -> HashMap<String, Vec<Article>> {
        self.feeds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ============================================================================
// Page tracker
// ============================================================================

/// Safe URL → last page requested for it.
#[derive(Default)]
pub(crate) struct PageTracker {
    pages: Mutex<HashMap<String, u32>>,
}

impl PageTracker {
    pub(crate) fn record(&self, key: &str, page: u32) {
        let mut pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
        pages.insert(key.to_string(), page);
    }

    pub(crate) fn get(&self, key: &str) -> Option<u32> {
        let pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
        pages.get(key).copied()
    }

    pub(crate) fn next(&self, key: &str) -> u32 {
        self.get(key).map_or(1, |page| page.saturating_add(1))
    }
}

// ============================================================================
// Read-state index
// ============================================================================

/// In-memory read flags mirrored to a [`ReadStateStore`].
///
/// Mutations apply to memory first and then persist the whole map. Persists
/// are serialized and each one snapshots the map after taking the lock, so
/// the last write to complete always carries the latest state.
pub(crate) struct ReadIndex {
    state: RwLock<HashMap<ArticleId, bool>>,
    persist_lock: tokio::sync::Mutex<()>,
    store: Arc<dyn ReadStateStore>,
}

impl ReadIndex {
    /// Loads the persisted map. A failed load starts from an empty index.
    pub(crate) async fn load(store: Arc<dyn ReadStateStore>) -> Self {
        let state = match store.load_all().await {
            Ok(state) => {
                tracing::debug!(entries = state.len(), "Read state loaded");
                state
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load read state, starting empty");
                HashMap::new()
            }
        };
        Self {
            state: RwLock::new(state),
            persist_lock: tokio::sync::Mutex::new(()),
            store,
        }
    }

    pub(crate) fn is_read(&self, id: ArticleId) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.get(&id).copied().unwrap_or(false)
    }

    pub(crate) fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) async fn mark(
        &self,
        ids: impl IntoIterator<Item = ArticleId>,
        read: bool,
    ) -> Result<(), PersistenceError> {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            for id in ids {
                // Absent means unread
                if read {
                    state.insert(id, true);
                } else {
                    state.remove(&id);
                }
            }
        }
        self.persist().await
    }

    pub(crate) async fn clear(&self) -> Result<(), PersistenceError> {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.persist().await
    }

    async fn persist(&self) -> Result<(), PersistenceError> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.store.save_all(&snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    fn article(id: ArticleId) -> Article {
        Article {
            id,
            title: format!("#{id}"),
            ..Default::default()
        }
    }

    #[test]
    fn test_store_appends_in_order() {
        let store = ArticleStore::default();
        store.append("a", &[article(1), article(2)]);
        store.append("a", &[article(3)]);
        store.append("b", &[article(9)]);

        let ids: Vec<ArticleId> = store.get("a").iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(store.first("a").map(|a| a.id), Some(1));
        assert_eq!(store.find(9).map(|a| a.title), Some("#9".to_string()));
        assert!(store.find(42).is_none());
        assert!(store.get("missing").is_empty());
        assert_eq!(store.ids().len(), 4);
    }

    #[test]
    fn test_page_tracker_next() {
        let pages = PageTracker::default();
        assert_eq!(pages.next("a"), 1);
        pages.record("a", 1);
        assert_eq!(pages.next("a"), 2);
        pages.record("a", 4);
        assert_eq!(pages.get("a"), Some(4));
        assert_eq!(pages.next("a"), 5);
    }

    #[tokio::test]
    async fn test_read_index_persists_wholesale() {
        let db = Arc::new(Database::open(":memory:").await.unwrap());
        let index = ReadIndex::load(db.clone()).await;

        index.mark([1, 2, 3], true).await.unwrap();
        index.mark([2], false).await.unwrap();
        assert!(index.is_read(1));
        assert!(!index.is_read(2));

        let reloaded = ReadIndex::load(db.clone()).await;
        assert!(reloaded.is_read(1));
        assert!(reloaded.is_read(3));
        assert!(!reloaded.is_read(2));

        reloaded.clear().await.unwrap();
        assert_eq!(ReadIndex::load(db).await.len(), 0);
    }
}
