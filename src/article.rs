//! Article records produced by the feed parsers.
//!
//! An [`Article`] is immutable once it reaches the article store. Its `id` is
//! derived from the content fields when the parser reaches the closing item
//! boundary, so re-parsing the same document always yields the same ids.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Content-derived article identity. Always fits in 31 bits.
pub type ArticleId = u32;

/// An attachment declared with `<enclosure url=".." length=".." type=".."/>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Enclosure {
    pub url: String,
    /// Size in bytes, when the feed provided a parsable value.
    pub length: Option<u64>,
    pub mime_type: Option<String>,
}

/// A `media:content` element (Media RSS vendor extension).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaContent {
    pub url: String,
    pub mime_type: Option<String>,
    pub medium: Option<String>,
    pub file_size: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Duration in seconds.
    pub duration: Option<u64>,
    pub is_default: bool,
}

/// A single decoded feed item.
///
/// String fields the feed did not provide are empty rather than absent, except
/// `comments` and `author`, which are genuinely optional in the dialects we read.
/// `extras` is a free-form bag for caller metadata: the parser never fills it,
/// it does not participate in the id, and favorites do not persist it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub source: String,
    pub image: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub comments: Option<String>,
    pub author: Option<String>,
    /// Milliseconds since the Unix epoch; 0 when the feed date was unparsable.
    pub date: i64,
    pub tags: Vec<String>,
    pub enclosure: Option<Enclosure>,
    pub media: Vec<MediaContent>,
    #[serde(skip)]
    pub extras: BTreeMap<String, String>,
}

impl Article {
    /// Computes the content-derived id.
    ///
    /// SHA-256 over every content field (length-prefixed so adjacent fields
    /// cannot alias), truncated to 32 bits with the sign bit cleared.
    pub fn content_id(&self) -> ArticleId {
        let mut hasher = Sha256::new();
        let mut field = |bytes: &[u8]| {
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };

        field(self.source.as_bytes());
        field(self.image.as_bytes());
        field(self.title.as_bytes());
        field(self.description.as_bytes());
        field(self.content.as_bytes());
        field(self.comments.as_deref().unwrap_or_default().as_bytes());
        field(self.author.as_deref().unwrap_or_default().as_bytes());
        field(&self.date.to_le_bytes());
        for tag in &self.tags {
            field(tag.as_bytes());
        }
        if let Some(enclosure) = &self.enclosure {
            field(enclosure.url.as_bytes());
        }
        for media in &self.media {
            field(media.url.as_bytes());
        }

        let digest = hasher.finalize();
        let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        head & (i32::MAX as u32)
    }

    /// Attaches caller metadata. Does not change the id.
    pub fn put_extra(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.extras.insert(key.into(), value.to_string());
        self
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extras.get(key).map(String::as_str)
    }

    /// One-line summary used in debug logs.
    pub fn short(&self) -> ShortArticle<'_> {
        ShortArticle(self)
    }
}

/// Display adapter returned by [`Article::short`].
pub struct ShortArticle<'a>(&'a Article);

impl fmt::Display for ShortArticle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = self.0;
        write!(
            f,
            "Article {{ id: {}, title: {:?}, source: {:?}, date: {} }}",
            a.id, a.title, a.source, a.date
        )
    }
}
