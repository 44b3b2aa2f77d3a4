//! The orchestrator tying downloader, parser, stores and callbacks together.
//!
//! A [`FeedManager`] owns the in-memory article store and page tracker, the
//! persisted read-state index and favorites, and the background request
//! worker. It is cheap to clone; all clones share the same state.
//!
//! # Example
//!
//! ```ignore
//! let manager = FeedManager::builder().config(FeedConfig::load(path)?).build().await?;
//!
//! // Inline: errors come back directly
//! let articles = manager.load("https://blog.example.com/feed/").get().await?;
//!
//! // Queued: results arrive through the callback
//! manager
//!     .load("https://blog.example.com/feed/")
//!     .next_page()
//!     .callback(FnCallback::new().on_loaded(|a| println!("{} more", a.len())).into_arc())
//!     .enqueue();
//! ```

mod load;
mod scheduler;
mod stores;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

pub use load::LoadRequest;
pub use scheduler::RequestHandle;

use scheduler::Scheduler;
use stores::{ArticleStore, PageTracker, ReadIndex};

use crate::article::{Article, ArticleId};
use crate::callback::{CallbackDispatcher, CallbackExecutor};
use crate::config::FeedConfig;
use crate::error::{FeedError, Result};
use crate::feed::{Downloader, HttpDownloader, Parser, Rss2Parser};
use crate::request::{Request, FAVORITES_KEY};
use crate::storage::{Database, FavoritesStore, ReadStateStore, ResponseCache};

struct Inner {
    downloader: Arc<dyn Downloader>,
    parser: Arc<dyn Parser>,
    executor: Option<Arc<dyn CallbackExecutor>>,
    safe_callbacks: bool,
    articles: ArticleStore,
    pages: PageTracker,
    read: ReadIndex,
    favorites: Arc<dyn FavoritesStore>,
    scheduler: Scheduler,
}

/// Feed orchestrator. See the [module docs](self).
#[derive(Clone)]
pub struct FeedManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FeedManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedManager")
            .field("safe_callbacks", &self.inner.safe_callbacks)
            .field("executor", &self.inner.executor.is_some())
            .finish_non_exhaustive()
    }
}

impl FeedManager {
    pub fn builder() -> FeedManagerBuilder {
        FeedManagerBuilder::default()
    }

    /// Builds a manager with the default collaborators for `config`.
    pub async fn new(config: FeedConfig) -> Result<Self> {
        Self::builder().config(config).build().await
    }

    /// Starts a fluent request for `url`.
    pub fn load(&self, url: impl Into<String>) -> LoadRequest {
        LoadRequest::new(self.clone(), url.into())
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Runs `request` inline: fetch, parse, store, notify.
    ///
    /// Returns only the articles parsed by this request; the cumulative list
    /// is available through [`articles`](Self::articles). Errors are returned
    /// to the caller and are not reported to the request's callback.
    ///
    /// # Errors
    ///
    /// - [`FeedError::InvalidRequest`] for an empty URL, before any I/O
    /// - [`FeedError::Fetch`] when the download fails
    /// - [`FeedError::Parse`] when the body is not a well-formed feed
    pub async fn execute(&self, request: &Request) -> Result<Vec<Article>> {
        if request.url() == FAVORITES_KEY {
            tracing::debug!(tag = %request.tag(), "Favorites are served from storage, nothing to load");
            return Ok(Vec::new());
        }

        let dispatcher = self.dispatcher_for(request);
        let callback = request.callback();
        if let Some(callback) = callback {
            dispatcher.preload(callback);
        }

        if request.url().trim().is_empty() {
            return Err(FeedError::InvalidRequest("empty URL".to_string()));
        }

        let downloader = self.downloader_for(request);
        let parser = request.parser().unwrap_or(&self.inner.parser);
        let safe_url = downloader.to_safe_url(request);
        let fetch_url = downloader.to_fetch_url(request);

        // Recorded before the fetch so a failed page still counts as requested
        self.inner.pages.record(&safe_url, request.page());
        tracing::debug!(
            tag = %request.tag(),
            url = %fetch_url,
            page = request.page(),
            skip_cache = request.skip_cache(),
            "Loading feed"
        );

        let started = Instant::now();
        let body = downloader.execute(request).await?;
        let articles = parser.parse(&body)?;
        self.inner.articles.append(&safe_url, &articles);

        tracing::debug!(
            tag = %request.tag(),
            url = %fetch_url,
            articles = articles.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Feed loaded"
        );

        if let Some(callback) = callback {
            dispatcher.loaded(callback, Arc::from(articles.as_slice()));
        }
        Ok(articles)
    }

    /// Queues `request` on the background worker.
    ///
    /// Returns `None` when the request was dropped because an identically
    /// tagged request is in flight and `ignore_if_running` was set.
    pub fn enqueue(&self, request: Request) -> Option<RequestHandle> {
        self.inner.scheduler.submit(request, self.clone())
    }

    /// Whether a queued or running request carries `tag`.
    pub fn is_running(&self, tag: &str) -> bool {
        self.inner.scheduler.is_running(tag)
    }

    /// Worker entry point: failures go to the callback instead of a caller.
    async fn run_queued(&self, request: &Request) {
        if let Err(e) = self.execute(request).await {
            tracing::error!(
                tag = %request.tag(),
                url = %request.url(),
                error = %e,
                "Queued request failed"
            );
            if let Some(callback) = request.callback() {
                self.dispatcher_for(request)
                    .load_failed(callback, Arc::new(e));
            }
        }
    }

    fn dispatcher_for(&self, request: &Request) -> CallbackDispatcher {
        let executor = request
            .executor()
            .or(self.inner.executor.as_ref())
            .cloned();
        let safe = request.safe().unwrap_or(self.inner.safe_callbacks);
        CallbackDispatcher::new(executor, safe)
    }

    pub(crate) fn downloader_for<'a>(&'a self, request: &'a Request) -> &'a Arc<dyn Downloader> {
        request.downloader().unwrap_or(&self.inner.downloader)
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Every article stored under `safe_url`, oldest fetch first.
    ///
    /// [`FAVORITES_KEY`] returns the favorites, newest first.
    pub async fn articles(&self, safe_url: &str) -> Result<Vec<Article>> {
        if safe_url == FAVORITES_KEY {
            return self.favorites().await;
        }
        Ok(self.inner.articles.get(safe_url))
    }

    /// Articles stored for a search of `url`.
    pub async fn articles_with_search(&self, url: &str, search: &str) -> Result<Vec<Article>> {
        let probe = Request::builder(url).search(search).build();
        let key = self.inner.downloader.to_safe_url(&probe);
        self.articles(&key).await
    }

    /// Snapshot of the whole in-memory store.
    pub fn all_articles(&self) -> HashMap<String, Vec<Article>> {
        self.inner.articles.snapshot()
    }

    /// Last page requested for `safe_url`.
    pub fn page_of(&self, safe_url: &str) -> Option<u32> {
        self.inner.pages.get(safe_url)
    }

    /// Looks `id` up in the loaded feeds, then in favorites.
    pub async fn find_article(&self, id: ArticleId) -> Result<Option<Article>> {
        if let Some(article) = self.inner.articles.find(id) {
            return Ok(Some(article));
        }
        Ok(self.inner.favorites.get(id).await?)
    }

    pub async fn favorites(&self) -> Result<Vec<Article>> {
        Ok(self.inner.favorites.get_all().await?)
    }

    /// `false` when the favorites store cannot be read.
    pub async fn contains_favorite(&self, id: ArticleId) -> bool {
        match self.inner.favorites.contains(id).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(id = id, error = %e, "Favorites lookup failed");
                false
            }
        }
    }

    pub fn is_read(&self, id: ArticleId) -> bool {
        self.inner.read.is_read(id)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub async fn mark_read(&self, id: ArticleId, read: bool) -> Result<()> {
        self.inner.read.mark([id], read).await?;
        Ok(())
    }

    /// `true` marks every loaded article and every favorite as read; `false`
    /// empties the index.
    pub async fn mark_all_read(&self, read: bool) -> Result<()> {
        if !read {
            self.inner.read.clear().await?;
            return Ok(());
        }
        let mut ids = self.inner.articles.ids();
        ids.extend(self.inner.favorites.get_all().await?.iter().map(|a| a.id));
        tracing::debug!(articles = ids.len(), "Marking all articles read");
        self.inner.read.mark(ids, true).await?;
        Ok(())
    }

    /// Adds or removes `article` from favorites. Persistence failures are
    /// logged and reported as `false`.
    pub async fn save_favorite(&self, article: &Article, favorite: bool) -> bool {
        let result = if favorite {
            self.inner.favorites.add(article).await
        } else {
            self.inner.favorites.delete(article.id).await.map(|_| ())
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(id = article.id, favorite = favorite, error = %e, "Failed to update favorite");
                false
            }
        }
    }

    /// [`save_favorite`](Self::save_favorite) for an article known only by id.
    pub async fn save_favorite_by_id(&self, id: ArticleId, favorite: bool) -> bool {
        match self.find_article(id).await {
            Ok(Some(article)) => self.save_favorite(&article, favorite).await,
            Ok(None) => {
                tracing::debug!(id = id, "No article with this id to favorite");
                false
            }
            Err(e) => {
                tracing::warn!(id = id, error = %e, "Failed to look up article");
                false
            }
        }
    }

    pub async fn delete_all_favorites(&self) -> Result<u64> {
        let removed = self.inner.favorites.delete_all().await?;
        tracing::debug!(removed = removed, "Favorites cleared");
        Ok(removed)
    }

    /// Clears the default downloader's response cache.
    pub async fn clear_cache(&self) -> bool {
        self.inner.downloader.clear_cache().await
    }

    /// Wipes the response cache, favorites and read state, in that order,
    /// stopping at the first step that fails.
    pub async fn clear_data(&self) -> bool {
        if !self.clear_cache().await {
            tracing::warn!("Failed to clear response cache, keeping remaining data");
            return false;
        }
        if let Err(e) = self.inner.favorites.delete_all().await {
            tracing::warn!(error = %e, "Failed to clear favorites, keeping read state");
            return false;
        }
        if let Err(e) = self.inner.read.clear().await {
            tracing::warn!(error = %e, "Failed to clear read state");
            return false;
        }
        tracing::info!("Cleared cached and persisted data");
        true
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles a [`FeedManager`].
///
/// Anything not supplied is built from the [`FeedConfig`]: an
/// [`HttpDownloader`] with its response cache at `cache_path`, the
/// [`Rss2Parser`], and SQLite-backed stores at `database_path`.
#[derive(Default)]
pub struct FeedManagerBuilder {
    config: FeedConfig,
    downloader: Option<Arc<dyn Downloader>>,
    parser: Option<Arc<dyn Parser>>,
    executor: Option<Arc<dyn CallbackExecutor>>,
    read_state: Option<Arc<dyn ReadStateStore>>,
    favorites: Option<Arc<dyn FavoritesStore>>,
}

impl FeedManagerBuilder {
    pub fn config(mut self, config: FeedConfig) -> Self {
        self.config = config;
        self
    }

    pub fn downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    pub fn parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Default execution context for callbacks; inline when unset.
    pub fn executor(mut self, executor: Arc<dyn CallbackExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn read_state_store(mut self, store: Arc<dyn ReadStateStore>) -> Self {
        self.read_state = Some(store);
        self
    }

    pub fn favorites_store(mut self, store: Arc<dyn FavoritesStore>) -> Self {
        self.favorites = Some(store);
        self
    }

    /// Opens whatever storage is needed, loads the read state and starts the
    /// request worker on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Database`] if a SQLite database cannot be opened
    /// and [`FeedError::Fetch`] if the HTTP client cannot be constructed.
    pub async fn build(self) -> Result<FeedManager> {
        let config = self.config;

        let (read_state, favorites) = match (self.read_state, self.favorites) {
            (Some(read_state), Some(favorites)) => (read_state, favorites),
            (read_state, favorites) => {
                let db = Arc::new(Database::open(&config.database_path).await?);
                (
                    read_state.unwrap_or_else(|| Arc::clone(&db) as Arc<dyn ReadStateStore>),
                    favorites.unwrap_or_else(|| db as Arc<dyn FavoritesStore>),
                )
            }
        };

        let downloader = match self.downloader {
            Some(downloader) => downloader,
            None => {
                let cache = ResponseCache::open(&config.cache_path, config.cache_max_bytes).await?;
                match cache.evict_older_than(config.cache_max_age_secs).await {
                    Ok(0) => {}
                    Ok(evicted) => tracing::debug!(evicted = evicted, "Dropped stale cached responses"),
                    Err(e) => tracing::warn!(error = %e, "Failed to evict stale cached responses"),
                }
                Arc::new(HttpDownloader::new(&config, Some(cache))?)
            }
        };

        let read = ReadIndex::load(read_state).await;
        tracing::info!(
            database = %config.database_path,
            read_entries = read.len(),
            safe_callbacks = config.safe_callbacks,
            "Feed manager started"
        );

        Ok(FeedManager {
            inner: Arc::new(Inner {
                downloader,
                parser: self.parser.unwrap_or_else(|| Arc::new(Rss2Parser)),
                executor: self.executor,
                safe_callbacks: config.safe_callbacks,
                articles: ArticleStore::default(),
                pages: PageTracker::default(),
                read,
                favorites,
                scheduler: Scheduler::spawn(),
            }),
        })
    }
}
