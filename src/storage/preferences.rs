//! Key/value blobs in `user_preferences`, the home of the persisted read-state map.

use super::schema::Database;
use super::types::PersistenceError;

impl Database {
    /// Stored value for `key`, or `None` if it was never written.
    pub async fn get_preference(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM user_preferences WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    /// Writes `value` under `key`, replacing any earlier value.
    pub async fn set_preference(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO user_preferences (key, value, updated_at) \
             VALUES (?1, ?2, datetime('now')) \
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::Database;

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let db = Database::open(":memory:").await.unwrap();
        assert_eq!(db.get_preference("never.written").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let db = Database::open(":memory:").await.unwrap();
        db.set_preference("read_state", "{}").await.unwrap();
        db.set_preference("read_state", r#"{"1":true}"#).await.unwrap();

        assert_eq!(
            db.get_preference("read_state").await.unwrap().as_deref(),
            Some(r#"{"1":true}"#)
        );
    }
}
