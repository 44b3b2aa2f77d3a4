use thiserror::Error;

use crate::article::{Article, ArticleId, Enclosure, MediaContent};

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while opening the SQLite database
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("Database is locked by another process")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_error(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

// SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
pub(crate) fn is_lock_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

/// Errors raised by the persisted stores (read state, favorites, response cache)
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Storage error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored JSON column or preference could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ============================================================================
// Helper Types
// ============================================================================

/// Row type for the favorites table (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FavoriteRow {
    pub id: i64,
    pub source: String,
    pub image: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub comments: Option<String>,
    pub author: Option<String>,
    pub date: i64,
    pub tags: String,
    pub enclosure: Option<String>,
    pub media: String,
}

impl FavoriteRow {
    pub(crate) fn into_article(self) -> Result<Article, PersistenceError> {
        let enclosure: Option<Enclosure> = match self.enclosure {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        let media: Vec<MediaContent> = serde_json::from_str(&self.media)?;

        Ok(Article {
            id: self.id as ArticleId,
            source: self.source,
            image: self.image,
            title: self.title,
            description: self.description,
            content: self.content,
            comments: self.comments,
            author: self.author,
            date: self.date,
            tags: serde_json::from_str(&self.tags)?,
            enclosure,
            media,
            extras: Default::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_messages_detected() {
        assert!(is_lock_error("error returned from database: database is locked"));
        assert!(is_lock_error("(code: 14) unable to open database file"));
        assert!(!is_lock_error("no such table: favorites"));
    }

    #[test]
    fn test_row_with_bad_json_fails() {
        let row = FavoriteRow {
            id: 1,
            source: String::new(),
            image: String::new(),
            title: String::new(),
            description: String::new(),
            content: String::new(),
            comments: None,
            author: None,
            date: 0,
            tags: "not json".to_string(),
            enclosure: None,
            media: "[]".to_string(),
        };
        assert!(matches!(
            row.into_article(),
            Err(PersistenceError::Serialization(_))
        ));
    }
}
