//! Immutable fetch descriptors and their builder.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::callback::{Callback, CallbackExecutor};
use crate::feed::{Downloader, Parser};

/// Reserved URL under which the favorites collection is exposed.
///
/// Requests for this URL never touch the network; lookups are served from the
/// favorites store.
pub const FAVORITES_KEY: &str = "FAVORITES";

/// Generated tags continue from start-up time so they don't collide with tags
/// issued by a previous process that persisted them somewhere.
static TAG_COUNTER: LazyLock<AtomicU64> = LazyLock::new(|| {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    AtomicU64::new(millis.saturating_mul(100_000))
});

fn next_tag() -> String {
    TAG_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

/// A single fetch, fixed at build time.
///
/// Tag equality is what the scheduler treats as "the same logical request";
/// the other fields play no part in deduplication.
#[derive(Clone)]
pub struct Request {
    tag: String,
    url: String,
    search: Option<String>,
    individual: bool,
    skip_cache: bool,
    page: u32,
    safe: Option<bool>,
    ignore_if_running: bool,
    delay: Option<Duration>,
    callback: Option<Arc<dyn Callback>>,
    executor: Option<Arc<dyn CallbackExecutor>>,
    downloader: Option<Arc<dyn Downloader>>,
    parser: Option<Arc<dyn Parser>>,
}

impl Request {
    pub fn builder(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(url)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn individual(&self) -> bool {
        self.individual
    }

    pub fn skip_cache(&self) -> bool {
        self.skip_cache
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// Per-request callback failure mode; `None` inherits the manager default.
    pub fn safe(&self) -> Option<bool> {
        self.safe
    }

    pub fn ignore_if_running(&self) -> bool {
        self.ignore_if_running
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    pub fn callback(&self) -> Option<&Arc<dyn Callback>> {
        self.callback.as_ref()
    }

    pub fn executor(&self) -> Option<&Arc<dyn CallbackExecutor>> {
        self.executor.as_ref()
    }

    pub fn downloader(&self) -> Option<&Arc<dyn Downloader>> {
        self.downloader.as_ref()
    }

    pub fn parser(&self) -> Option<&Arc<dyn Parser>> {
        self.parser.as_ref()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("tag", &self.tag)
            .field("url", &self.url)
            .field("search", &self.search)
            .field("individual", &self.individual)
            .field("skip_cache", &self.skip_cache)
            .field("page", &self.page)
            .field("safe", &self.safe)
            .field("ignore_if_running", &self.ignore_if_running)
            .field("delay", &self.delay)
            .field("callback", &self.callback.is_some())
            .field("executor", &self.executor.is_some())
            .field("downloader", &self.downloader.is_some())
            .field("parser", &self.parser.is_some())
            .finish()
    }
}

/// Fluent builder for [`Request`]. Each method sets exactly one field.
///
/// No validation happens here: an empty URL is rejected when the request
/// executes, not when it is built.
#[derive(Clone)]
pub struct RequestBuilder {
    tag: Option<String>,
    url: String,
    search: Option<String>,
    individual: bool,
    skip_cache: bool,
    page: u32,
    safe: Option<bool>,
    ignore_if_running: bool,
    delay: Option<Duration>,
    callback: Option<Arc<dyn Callback>>,
    executor: Option<Arc<dyn CallbackExecutor>>,
    downloader: Option<Arc<dyn Downloader>>,
    parser: Option<Arc<dyn Parser>>,
}

impl RequestBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            tag: None,
            url: url.into(),
            search: None,
            individual: false,
            skip_cache: false,
            page: 1,
            safe: None,
            ignore_if_running: false,
            delay: None,
            callback: None,
            executor: None,
            downloader: None,
            parser: None,
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn individual(mut self, individual: bool) -> Self {
        self.individual = individual;
        self
    }

    pub fn skip_cache(mut self, skip_cache: bool) -> Self {
        self.skip_cache = skip_cache;
        self
    }

    /// Pages start at 1; 0 is clamped up.
    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn safe(mut self, safe: bool) -> Self {
        self.safe = Some(safe);
        self
    }

    pub fn ignore_if_running(mut self, ignore: bool) -> Self {
        self.ignore_if_running = ignore;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn CallbackExecutor>) -> Self {
        self.executor = Some(executor);
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

    pub fn build(self) -> Request {
        Request {
            tag: self.tag.unwrap_or_else(next_tag),
            url: self.url,
            search: self.search,
            individual: self.individual,
            skip_cache: self.skip_cache,
            page: self.page,
            safe: self.safe,
            ignore_if_running: self.ignore_if_running,
            delay: self.delay,
            callback: self.callback,
            executor: self.executor,
            downloader: self.downloader,
            parser: self.parser,
        }
    }
}
