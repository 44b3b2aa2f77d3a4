//! Integration tests for favorites and read state as seen through the manager.
//!
//! Most tests use an in-memory database; the persistence test writes a
//! temporary SQLite file and rebuilds the manager on top of it.

use feedpipe::{Article, ArticleId, FeedConfig, FeedManager, FAVORITES_KEY};
use pretty_assertions::assert_eq;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn article(title: &str) -> Article {
    let mut article = Article {
        source: format!("https://example.com/{title}"),
        title: title.to_string(),
        tags: vec!["news".to_string()],
        ..Default::default()
    };
    article.id = article.content_id();
    article
}

async fn manager() -> FeedManager {
    FeedManager::new(FeedConfig::in_memory()).await.unwrap()
}

fn ids(articles: &[Article]) -> Vec<ArticleId> {
    articles.iter().map(|a| a.id).collect()
}

// ============================================================================
// Favorites
// ============================================================================

#[tokio::test]
async fn test_save_and_remove_favorite() {
    let manager = manager().await;
    let a = article("a");

    assert!(!manager.contains_favorite(a.id).await);
    assert!(manager.save_favorite(&a, true).await);
    assert!(manager.contains_favorite(a.id).await);

    assert!(manager.save_favorite(&a, false).await);
    assert!(!manager.contains_favorite(a.id).await);
}

#[tokio::test]
async fn test_favorites_newest_first() {
    let manager = manager().await;
    let (a, b, c) = (article("a"), article("b"), article("c"));
    for x in [&a, &b, &c] {
        assert!(manager.save_favorite(x, true).await);
    }
    assert_eq!(ids(&manager.favorites().await.unwrap()), vec![c.id, b.id, a.id]);

    // Saving again moves it to the front
    manager.save_favorite(&a, true).await;
    let favorites = manager.articles(FAVORITES_KEY).await.unwrap();
    assert_eq!(ids(&favorites), vec![a.id, c.id, b.id]);
    assert_eq!(favorites[0], a);
}

#[tokio::test]
async fn test_extras_not_persisted() {
    let manager = manager().await;
    let mut a = article("a");
    a.put_extra("position", 3);
    manager.save_favorite(&a, true).await;

    let stored = manager.favorites().await.unwrap();
    assert!(stored[0].extras.is_empty());
    assert_eq!(stored[0].id, a.id);
}

#[tokio::test]
async fn test_find_article_falls_back_to_favorites() {
    let manager = manager().await;
    let a = article("a");
    assert_eq!(manager.find_article(a.id).await.unwrap(), None);

    manager.save_favorite(&a, true).await;
    assert_eq!(manager.find_article(a.id).await.unwrap(), Some(a.clone()));
}

#[tokio::test]
async fn test_save_favorite_by_id_uses_loaded_articles() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<rss><channel><item><title>Loaded</title><link>https://x/1</link></item></channel></rss>",
        ))
        .mount(&server)
        .await;
    let manager = manager().await;

    let loaded = manager
        .load(format!("{}/feed/", server.uri()))
        .get()
        .await
        .unwrap();
    let id = loaded[0].id;

    assert!(manager.save_favorite_by_id(id, true).await);
    assert!(manager.contains_favorite(id).await);
    assert!(!manager.save_favorite_by_id(12345, true).await);
}

#[tokio::test]
async fn test_delete_all_favorites() {
    let manager = manager().await;
    manager.save_favorite(&article("a"), true).await;
    manager.save_favorite(&article("b"), true).await;

    assert_eq!(manager.delete_all_favorites().await.unwrap(), 2);
    assert!(manager.favorites().await.unwrap().is_empty());
}

// ============================================================================
// Read state
// ============================================================================

#[tokio::test]
async fn test_mark_read_and_unread() {
    let manager = manager().await;
    assert!(!manager.is_read(1));

    manager.mark_read(1, true).await.unwrap();
    assert!(manager.is_read(1));

    manager.mark_read(1, false).await.unwrap();
    assert!(!manager.is_read(1));
}

#[tokio::test]
async fn test_mark_all_read_covers_favorites() {
    let manager = manager().await;
    let a = article("a");
    manager.save_favorite(&a, true).await;

    manager.mark_all_read(true).await.unwrap();
    assert!(manager.is_read(a.id));

    manager.mark_all_read(false).await.unwrap();
    assert!(!manager.is_read(a.id));
}

#[tokio::test]
async fn test_clear_data_wipes_everything() {
    let manager = manager().await;
    let a = article("a");
    manager.save_favorite(&a, true).await;
    manager.mark_read(a.id, true).await.unwrap();

    assert!(manager.clear_data().await);
    assert!(manager.favorites().await.unwrap().is_empty());
    assert!(!manager.is_read(a.id));
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_state_survives_rebuild() {
    let dir = std::env::temp_dir().join(format!("feedpipe_lifecycle_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let config = FeedConfig {
        database_path: dir.join("state.db").to_string_lossy().into_owned(),
        cache_path: ":memory:".to_string(),
        ..FeedConfig::default()
    };
    let a = article("a");

    {
        let manager = FeedManager::new(config.clone()).await.unwrap();
        manager.save_favorite(&a, true).await;
        manager.mark_read(a.id, true).await.unwrap();
        manager.mark_read(99, true).await.unwrap();
    }

    let manager = FeedManager::new(config).await.unwrap();
    assert!(manager.contains_favorite(a.id).await);
    assert!(manager.is_read(a.id));
    assert!(manager.is_read(99));
    assert_eq!(manager.favorites().await.unwrap(), vec![a]);

    drop(manager);
    std::fs::remove_dir_all(&dir).ok();
}
