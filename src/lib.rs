//! Feed ingestion for content-site clients.
//!
//! `feedpipe` fetches RSS 2.0 (and Atom) feeds over HTTP with a response cache,
//! parses them into [`Article`]s with a streaming XML reader, accumulates
//! articles per feed across pages, and tracks favorites and read state in
//! SQLite. Results are delivered either inline or through a [`Callback`] from a
//! single background worker.
//!
//! - [`FeedManager`] - the orchestrator; start here
//! - [`Request`] / [`LoadRequest`] - what to fetch and how to report it
//! - [`feed`] - downloader and parser seams with their default implementations
//! - [`storage`] - SQLite-backed read state, favorites and response cache
//!
//! # Example
//!
//! ```ignore
//! use feedpipe::{FeedConfig, FeedManager};
//!
//! let manager = FeedManager::new(FeedConfig::default()).await?;
//! for article in manager.load("https://blog.example.com/feed/").get().await? {
//!     println!("{}", article.short());
//! }
//! ```

pub mod article;
pub mod callback;
pub mod config;
pub mod context;
pub mod error;
pub mod feed;
pub mod logging;
pub mod manager;
pub mod request;
pub mod storage;
pub mod util;

pub use article::{Article, ArticleId, Enclosure, MediaContent};
pub use callback::{Callback, CallbackDispatcher, CallbackExecutor, CallbackTask, FnCallback};
pub use config::{ConfigError, FeedConfig};
pub use error::{FeedError, Result};
pub use manager::{FeedManager, FeedManagerBuilder, LoadRequest, RequestHandle};
pub use request::{Request, RequestBuilder, FAVORITES_KEY};
