use chrono::Utc;

use super::schema::Database;
use super::types::PersistenceError;

/// Response bodies keyed by fetch URL.
///
/// Owned by [`HttpDownloader`](crate::feed::HttpDownloader); nothing else reads
/// or writes it. Freshness is decided by the caller-supplied max age. The
/// stored bodies never total more than `max_bytes`: each store evicts the
/// oldest entries past the limit.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    db: Database,
    max_bytes: u64,
}

impl ResponseCache {
    pub fn new(db: Database, max_bytes: u64) -> Self {
        Self { db, max_bytes }
    }

    /// Opens (or creates) a dedicated cache database at `path`.
    pub async fn open(path: &str, max_bytes: u64) -> Result<Self, super::DatabaseError> {
        Ok(Self::new(Database::open(path).await?, max_bytes))
    }

    /// Cached body for `url` if it was stored within the last `max_age_secs`.
    pub async fn get_fresh(
        &self,
        url: &str,
        max_age_secs: u64,
    ) -> Result<Option<String>, PersistenceError> {
        let cutoff = cutoff(max_age_secs);
        let row: Option<(String,)> =
            sqlx::query_as("SELECT body FROM http_cache WHERE url = ? AND fetched_at >= ?")
                .bind(url)
                .bind(cutoff)
                .fetch_optional(&self.db.pool)
                .await?;
        Ok(row.map(|(body,)| body))
    }

    pub async fn store(&self, url: &str, body: &str) -> Result<(), PersistenceError> {
        sqlx::query("INSERT OR REPLACE INTO http_cache (url, body, fetched_at) VALUES (?, ?, ?)")
            .bind(url)
            .bind(body)
            .bind(Utc::now().timestamp())
            .execute(&self.db.pool)
            .await?;

        let used = self.size_bytes().await?;
        if used > self.max_bytes {
            let evicted = self.evict_over_limit().await?;
            tracing::debug!(
                used = used,
                limit = self.max_bytes,
                evicted = evicted,
                "Response cache over limit, evicted oldest entries"
            );
        }
        Ok(())
    }

    /// Total size of the stored bodies in bytes.
    pub async fn size_bytes(&self) -> Result<u64, PersistenceError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(LENGTH(CAST(body AS BLOB))), 0) FROM http_cache",
        )
        .fetch_one(&self.db.pool)
        .await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    /// Drops every entry outside the newest run of bodies that fits the limit.
    /// A single body larger than the limit is not kept either.
    async fn evict_over_limit(&self) -> Result<u64, PersistenceError> {
        let limit = i64::try_from(self.max_bytes).unwrap_or(i64::MAX);
        let result = sqlx::query(
            "DELETE FROM http_cache WHERE url IN ( \
                SELECT url FROM ( \
                    SELECT url, SUM(LENGTH(CAST(body AS BLOB))) \
                        OVER (ORDER BY fetched_at DESC, rowid DESC) AS running \
                    FROM http_cache \
                ) WHERE running > ? \
             )",
        )
        .bind(limit)
        .execute(&self.db.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Removes every entry, returning how many were dropped.
    pub async fn clear(&self) -> Result<u64, PersistenceError> {
        let result = sqlx::query("DELETE FROM http_cache")
            .execute(&self.db.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Removes entries older than `max_age_secs`. They can never be served
    /// again, so this runs once when the default downloader is built.
    pub async fn evict_older_than(&self, max_age_secs: u64) -> Result<u64, PersistenceError> {
        let result = sqlx::query("DELETE FROM http_cache WHERE fetched_at < ?")
            .bind(cutoff(max_age_secs))
            .execute(&self.db.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn cutoff(max_age_secs: u64) -> i64 {
    let max_age = i64::try_from(max_age_secs).unwrap_or(i64::MAX);
    Utc::now().timestamp().saturating_sub(max_age)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn cache() -> ResponseCache {
        ResponseCache::new(Database::open(":memory:").await.unwrap(), 1024 * 1024)
    }

    async fn count(cache: &ResponseCache) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM http_cache")
            .fetch_one(&cache.db.pool)
            .await
            .unwrap()
    }

    async fn backdate(cache: &ResponseCache, url: &str, secs: i64) {
        sqlx::query("UPDATE http_cache SET fetched_at = fetched_at - ? WHERE url = ?")
            .bind(secs)
            .bind(url)
            .execute(&cache.db.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_store_and_get_fresh() {
        let cache = cache().await;
        cache.store("https://e.com/feed/", "<rss/>").await.unwrap();
        assert_eq!(
            cache.get_fresh("https://e.com/feed/", 60).await.unwrap(),
            Some("<rss/>".to_string())
        );
        assert_eq!(cache.get_fresh("https://e.com/other/", 60).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stale_entry_not_returned() {
        let cache = cache().await;
        cache.store("u", "old").await.unwrap();
        backdate(&cache, "u", 120).await;
        assert_eq!(cache.get_fresh("u", 60).await.unwrap(), None);
        assert_eq!(cache.get_fresh("u", 600).await.unwrap(), Some("old".to_string()));
    }

    #[tokio::test]
    async fn test_store_overwrites() {
        let cache = cache().await;
        cache.store("u", "one").await.unwrap();
        cache.store("u", "two").await.unwrap();
        assert_eq!(cache.get_fresh("u", 60).await.unwrap(), Some("two".to_string()));
    }

    #[tokio::test]
    async fn test_clear_and_evict() {
        let cache = cache().await;
        cache.store("a", "1").await.unwrap();
        cache.store("b", "2").await.unwrap();
        backdate(&cache, "a", 1000).await;

        assert_eq!(cache.evict_older_than(500).await.unwrap(), 1);
        assert_eq!(cache.clear().await.unwrap(), 1);
        assert_eq!(cache.get_fresh("b", 60).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_byte_limit_evicts_oldest() {
        let cache = ResponseCache::new(Database::open(":memory:").await.unwrap(), 100);
        for page in 1..=10 {
            let url = format!("https://e.com/feed/?paged={page}");
            cache.store(&url, &"x".repeat(30)).await.unwrap();
            assert!(cache.size_bytes().await.unwrap() <= 100);
        }

        assert_eq!(count(&cache).await, 3);
        assert_eq!(cache.size_bytes().await.unwrap(), 90);
        assert!(cache.get_fresh("https://e.com/feed/?paged=10", 60).await.unwrap().is_some());
        assert!(cache.get_fresh("https://e.com/feed/?paged=8", 60).await.unwrap().is_some());
        assert!(cache.get_fresh("https://e.com/feed/?paged=7", 60).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_body_larger_than_limit_not_kept() {
        let cache = ResponseCache::new(Database::open(":memory:").await.unwrap(), 10);
        cache.store("small", "12345").await.unwrap();
        cache.store("huge", &"y".repeat(50)).await.unwrap();
        assert_eq!(count(&cache).await, 0);
        assert_eq!(cache.size_bytes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_multibyte_bodies_measured_in_bytes() {
        let cache = cache().await;
        cache.store("u", "é").await.unwrap();
        assert_eq!(cache.size_bytes().await.unwrap(), 2);
    }
}
