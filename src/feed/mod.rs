//! Feed retrieval and parsing.
//!
//! - [`Downloader`] - URL grammar plus the network/cache layer; [`HttpDownloader`]
//!   is the reqwest-backed default
//! - [`Parser`] - body to articles; [`Rss2Parser`] (default) and [`AtomParser`]
//!
//! Both seams are object-safe so a [`Request`](crate::Request) can override
//! either one.
//!
//! # Example
//!
//! ```ignore
//! use feedpipe::feed::{Parser, Rss2Parser};
//!
//! let articles = Rss2Parser.parse(&body)?;
//! ```

mod atom;
mod downloader;
mod fetcher;
mod parser;

pub use atom::AtomParser;
pub use downloader::{encode_search, fetch_url, safe_url, Downloader, INDIVIDUAL_SUFFIX};
pub use fetcher::{FetchError, HttpDownloader};
pub use parser::{parse_date, ParseError, Parser, Rss2Parser};
