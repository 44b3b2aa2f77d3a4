use std::sync::Arc;
use std::time::Duration;

use super::{FeedManager, RequestHandle};
use crate::article::Article;
use crate::callback::{Callback, CallbackExecutor};
use crate::error::Result;
use crate::feed::{Downloader, Parser};
use crate::request::{Request, RequestBuilder, FAVORITES_KEY};

/// Fluent request bound to a [`FeedManager`], created by
/// [`FeedManager::load`].
///
/// Finish with [`get`](Self::get) to run inline or
/// [`enqueue`](Self::enqueue) to hand the request to the worker.
#[must_use = "a load request does nothing until it is run or enqueued"]
pub struct LoadRequest {
    manager: FeedManager,
    builder: RequestBuilder,
}

impl LoadRequest {
    pub(super) fn new(manager: FeedManager, url: String) -> Self {
        Self {
            manager,
            builder: RequestBuilder::new(url),
        }
    }

    pub fn tag(self, tag: impl Into<String>) -> Self {
        self.map(|b| b.tag(tag))
    }

    pub fn search(self, search: impl Into<String>) -> Self {
        self.map(|b| b.search(search))
    }

    pub fn individual(self, individual: bool) -> Self {
        self.map(|b| b.individual(individual))
    }

    pub fn skip_cache(self, skip_cache: bool) -> Self {
        self.map(|b| b.skip_cache(skip_cache))
    }

    pub fn page(self, page: u32) -> Self {
        self.map(|b| b.page(page))
    }

    /// Selects the page after the last one requested for this feed, or the
    /// first page if none was.
    ///
    /// The feed is identified by the URL, search and individual settings made
    /// so far, so call this after them.
    pub fn next_page(self) -> Self {
        let probe = self.builder.clone().build();
        let key = self.manager.downloader_for(&probe).to_safe_url(&probe);
        let page = self.manager.inner.pages.next(&key);
        self.page(page)
    }

    pub fn callback(self, callback: Arc<dyn Callback>) -> Self {
        self.map(|b| b.callback(callback))
    }

    pub fn executor(self, executor: Arc<dyn CallbackExecutor>) -> Self {
        self.map(|b| b.executor(executor))
    }

    pub fn downloader(self, downloader: Arc<dyn Downloader>) -> Self {
        self.map(|b| b.downloader(downloader))
    }

    pub fn parser(self, parser: Arc<dyn Parser>) -> Self {
        self.map(|b| b.parser(parser))
    }

    pub fn safe(self, safe: bool) -> Self {
        self.map(|b| b.safe(safe))
    }

    pub fn ignore_if_running(self, ignore: bool) -> Self {
        self.map(|b| b.ignore_if_running(ignore))
    }

    pub fn delay(self, delay: Duration) -> Self {
        self.map(|b| b.delay(delay))
    }

    fn map(mut self, f: impl FnOnce(RequestBuilder) -> RequestBuilder) -> Self {
        self.builder = f(self.builder);
        self
    }

    /// The underlying request, detached from the manager.
    pub fn build(self) -> Request {
        self.builder.build()
    }

    /// Runs the request inline and returns every article now stored for the
    /// feed, including those from earlier pages.
    ///
    /// The favorites key returns the favorites without loading anything.
    pub async fn get(self) -> Result<Vec<Article>> {
        let manager = self.manager;
        let request = self.builder.build();
        if request.url() == FAVORITES_KEY {
            return manager.favorites().await;
        }

        manager.execute(&request).await?;
        let key = manager.downloader_for(&request).to_safe_url(&request);
        Ok(manager.inner.articles.get(&key))
    }

    /// Runs the request inline and returns the first article stored for the
    /// feed. Failures are logged and yield `None`.
    pub async fn get_first(self) -> Option<Article> {
        let manager = self.manager.clone();
        let request = self.builder.build();
        if request.url() == FAVORITES_KEY {
            return match manager.favorites().await {
                Ok(favorites) => favorites.into_iter().next(),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read favorites");
                    None
                }
            };
        }

        if let Err(e) = manager.execute(&request).await {
            tracing::warn!(tag = %request.tag(), url = %request.url(), error = %e, "Load failed");
            return None;
        }
        let key = manager.downloader_for(&request).to_safe_url(&request);
        manager.inner.articles.first(&key)
    }

    /// Queues the request. See [`FeedManager::enqueue`].
    pub fn enqueue(self) -> Option<RequestHandle> {
        let request = self.builder.build();
        self.manager.enqueue(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedConfig;
    use crate::feed::FetchError;
    use async_trait::async_trait;

    const FEED: &str = r#"<rss><channel>
        <item><title>One</title><link>https://example.com/1</link></item>
        <item><title>Two</title><link>https://example.com/2</link></item>
    </channel></rss>"#;

    /// Serves `FEED` for any request and records the fetch URLs.
    #[derive(Default)]
    struct StaticDownloader {
        seen: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Downloader for StaticDownloader {
        async fn execute(&self, request: &Request) -> std::result::Result<String, FetchError> {
            self.seen.lock().unwrap().push(self.to_fetch_url(request));
            Ok(FEED.to_string())
        }

        async fn clear_cache(&self) -> bool {
            true
        }
    }

    async fn manager(downloader: Arc<StaticDownloader>) -> FeedManager {
        FeedManager::builder()
            .config(FeedConfig::in_memory())
            .downloader(downloader)
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_returns_cumulative_list() {
        let downloader = Arc::new(StaticDownloader::default());
        let manager = manager(downloader.clone()).await;

        let first = manager.load("https://example.com/feed/").get().await.unwrap();
        assert_eq!(first.len(), 2);
        let both = manager
            .load("https://example.com/feed/")
            .next_page()
            .get()
            .await
            .unwrap();
        assert_eq!(both.len(), 4);

        let seen = downloader.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                "https://example.com/feed/".to_string(),
                "https://example.com/feed/?paged=2".to_string(),
            ]
        );
        assert_eq!(manager.page_of("https://example.com/feed/"), Some(2));
    }

    #[tokio::test]
    async fn test_get_first() {
        let manager = manager(Arc::new(StaticDownloader::default())).await;
        let first = manager.load("https://example.com/feed/").get_first().await;
        assert_eq!(first.map(|a| a.title), Some("One".to_string()));
    }

    #[tokio::test]
    async fn test_get_first_on_empty_url_is_none() {
        let manager = manager(Arc::new(StaticDownloader::default())).await;
        assert!(manager.load("").get_first().await.is_none());
    }

    #[tokio::test]
    async fn test_favorites_key_never_downloads() {
        let downloader = Arc::new(StaticDownloader::default());
        let manager = manager(downloader.clone()).await;

        let article = Article {
            id: 7,
            title: "Kept".to_string(),
            ..Default::default()
        };
        assert!(manager.save_favorite(&article, true).await);

        let favorites = manager.load(FAVORITES_KEY).get().await.unwrap();
        assert_eq!(favorites.len(), 1);
        assert!(downloader.seen.lock().unwrap().is_empty());
    }
}
