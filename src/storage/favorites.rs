use async_trait::async_trait;

use super::schema::Database;
use super::types::{FavoriteRow, PersistenceError};
use crate::article::{Article, ArticleId};

/// Persisted favorites, keyed by article id.
///
/// Stored snapshots never include `extras`. `get_all` returns the most recently
/// saved article first; saving an existing id moves it to the front.
#[async_trait]
pub trait FavoritesStore: Send + Sync {
    async fn add(&self, article: &Article) -> Result<(), PersistenceError>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: ArticleId) -> Result<bool, PersistenceError>;

    async fn get(&self, id: ArticleId) -> Result<Option<Article>, PersistenceError>;

    async fn contains(&self, id: ArticleId) -> Result<bool, PersistenceError>;

    async fn get_all(&self) -> Result<Vec<Article>, PersistenceError>;

    /// Returns the number of rows removed.
    async fn delete_all(&self) -> Result<u64, PersistenceError>;
}

const SELECT_FAVORITE: &str = r#"
    SELECT id, source, image, title, description, content, comments, author, date,
           tags, enclosure, media
    FROM favorites
"#;

#[async_trait]
impl FavoritesStore for Database {
    async fn add(&self, article: &Article) -> Result<(), PersistenceError> {
        let tags = serde_json::to_string(&article.tags)?;
        let enclosure = article
            .enclosure
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let media = serde_json::to_string(&article.media)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO favorites
                (id, saved_seq, source, image, title, description, content,
                 comments, author, date, tags, enclosure, media)
            VALUES (?, (SELECT COALESCE(MAX(saved_seq), 0) + 1 FROM favorites),
                    ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(i64::from(article.id))
        .bind(&article.source)
        .bind(&article.image)
        .bind(&article.title)
        .bind(&article.description)
        .bind(&article.content)
        .bind(&article.comments)
        .bind(&article.author)
        .bind(article.date)
        .bind(&tags)
        .bind(&enclosure)
        .bind(&media)
        .execute(&self.pool)
        .await?;

        tracing::debug!(id = article.id, "Favorite saved");
        Ok(())
    }

    async fn delete(&self, id: ArticleId) -> Result<bool, PersistenceError> {
        let result = sqlx::query("DELETE FROM favorites WHERE id = ?")
            .bind(i64::from(id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: ArticleId) -> Result<Option<Article>, PersistenceError> {
        let row: Option<FavoriteRow> = sqlx::query_as(&format!("{SELECT_FAVORITE} WHERE id = ?"))
            .bind(i64::from(id))
            .fetch_optional(&self.pool)
            .await?;
        row.map(FavoriteRow::into_article).transpose()
    }

    async fn contains(&self, id: ArticleId) -> Result<bool, PersistenceError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM favorites WHERE id = ?")
            .bind(i64::from(id))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn get_all(&self) -> Result<Vec<Article>, PersistenceError> {
        let rows: Vec<FavoriteRow> =
            sqlx::query_as(&format!("{SELECT_FAVORITE} ORDER BY saved_seq DESC"))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(FavoriteRow::into_article).collect()
    }

    async fn delete_all(&self) -> Result<u64, PersistenceError> {
        let result = sqlx::query("DELETE FROM favorites")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
