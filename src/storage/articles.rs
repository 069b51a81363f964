use async_trait::async_trait;

use super::schema::Database;
use super::types::{Article, StoreError};
use super::ArticleStore;

/// Preference row holding the last headlines filter; survives restarts.
const HEADLINES_FILTER_KEY: &str = "headlines.last_query";

#[async_trait]
impl ArticleStore for Database {
    /// Upserts articles inside one transaction.
    ///
    /// Uses INSERT ... ON CONFLICT(url) DO UPDATE so `is_favorite` survives a
    /// re-fetch; the remote payload never carries it. RETURNING yields the row
    /// as stored, so callers see the preserved favorite flag.
    async fn upsert_articles(&self, articles: &[Article]) -> Result<Vec<Article>, StoreError> {
        if articles.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;
        let mut stored = Vec::with_capacity(articles.len());

        for article in articles {
            let row = sqlx::query_as::<_, Article>(
                r#"
                INSERT INTO articles (url, title, description, image_url, is_favorite)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(url) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    image_url = excluded.image_url
                RETURNING url, title, description, image_url, is_favorite
            "#,
            )
            .bind(&article.url)
            .bind(&article.title)
            .bind(&article.description)
            .bind(&article.image_url)
            .bind(article.is_favorite)
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;
            stored.push(row);
        }

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        tracing::debug!(count = stored.len(), "Upserted articles");
        Ok(stored)
    }

    async fn all_articles(&self) -> Result<Vec<Article>, StoreError> {
        let rows = sqlx::query_as::<_, Article>(
            r#"
            SELECT url, title, description, image_url, is_favorite
            FROM articles
            ORDER BY rowid
        "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(rows)
    }

    async fn favorite_articles(&self) -> Result<Vec<Article>, StoreError> {
        let rows = sqlx::query_as::<_, Article>(
            r#"
            SELECT url, title, description, image_url, is_favorite
            FROM articles
            WHERE is_favorite = 1
            ORDER BY rowid
        "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(rows)
    }

    async fn article_by_url(&self, url: &str) -> Result<Option<Article>, StoreError> {
        let row = sqlx::query_as::<_, Article>(
            r#"
            SELECT url, title, description, image_url, is_favorite
            FROM articles
            WHERE url = ?
        "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(row)
    }

    async fn update_article(&self, article: &Article) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE articles
            SET title = ?, description = ?, image_url = ?, is_favorite = ?
            WHERE url = ?
        "#,
        )
        .bind(&article.title)
        .bind(&article.description)
        .bind(&article.image_url)
        .bind(article.is_favorite)
        .bind(&article.url)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    async fn headlines_filter(&self) -> Result<Option<String>, StoreError> {
        self.get_preference(HEADLINES_FILTER_KEY).await
    }

    async fn set_headlines_filter(&self, filter: &str) -> Result<(), StoreError> {
        self.set_preference(HEADLINES_FILTER_KEY, filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn article(url: &str, title: &str) -> Article {
        Article {
            url: url.to_string(),
            title: title.to_string(),
            description: format!("About {title}"),
            image_url: format!("{url}/cover.jpg"),
            is_favorite: false,
        }
    }

    #[tokio::test]
    async fn test_upsert_inserts_new_articles() {
        let db = test_db().await;
        let input = vec![article("https://a.example/1", "One"), article("https://a.example/2", "Two")];

        let stored = db.upsert_articles(&input).await.unwrap();
        assert_eq!(stored, input);

        let all = db.all_articles().await.unwrap();
        assert_eq!(all, input);
    }

    #[tokio::test]
    async fn test_upsert_empty_slice_is_noop() {
        let db = test_db().await;
        let stored = db.upsert_articles(&[]).await.unwrap();
        assert!(stored.is_empty());
        assert!(db.all_articles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_remote_fields() {
        let db = test_db().await;
        db.upsert_articles(&[article("https://a.example/1", "Old")])
            .await
            .unwrap();

        let mut fresh = article("https://a.example/1", "New");
        fresh.description = "Rewritten".to_string();
        db.upsert_articles(&[fresh.clone()]).await.unwrap();

        let all = db.all_articles().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], fresh);
    }

    #[tokio::test]
    async fn test_upsert_preserves_favorite_flag() {
        let db = test_db().await;
        let mut original = article("https://a.example/1", "Old");
        db.upsert_articles(&[original.clone()]).await.unwrap();

        original.is_favorite = true;
        assert!(db.update_article(&original).await.unwrap());

        // Remote payloads never carry the favorite flag
        let refetched = article("https://a.example/1", "New");
        let stored = db.upsert_articles(&[refetched]).await.unwrap();

        assert_eq!(stored[0].title, "New");
        assert!(stored[0].is_favorite);
        let from_db = db.article_by_url("https://a.example/1").await.unwrap().unwrap();
        assert!(from_db.is_favorite);
    }

    #[tokio::test]
    async fn test_all_articles_keeps_first_insertion_order() {
        let db = test_db().await;
        db.upsert_articles(&[article("https://a.example/b", "B"), article("https://a.example/a", "A")])
            .await
            .unwrap();
        // Updating an existing row must not move it to the end
        db.upsert_articles(&[article("https://a.example/b", "B2")])
            .await
            .unwrap();

        let urls: Vec<String> = db
            .all_articles()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.url)
            .collect();
        assert_eq!(urls, vec!["https://a.example/b", "https://a.example/a"]);
    }

    #[tokio::test]
    async fn test_article_by_url_missing_returns_none() {
        let db = test_db().await;
        let found = db.article_by_url("https://nowhere.example/").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_update_article_unknown_url_returns_false() {
        let db = test_db().await;
        let changed = db
            .update_article(&article("https://nowhere.example/", "Ghost"))
            .await
            .unwrap();
        assert!(!changed);
        assert!(db.all_articles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_favorite_articles_filters_by_flag() {
        let db = test_db().await;
        db.upsert_articles(&[
            article("https://a.example/1", "One"),
            article("https://a.example/2", "Two"),
            article("https://a.example/3", "Three"),
        ])
        .await
        .unwrap();

        let mut two = db.article_by_url("https://a.example/2").await.unwrap().unwrap();
        two.is_favorite = true;
        db.update_article(&two).await.unwrap();

        let favorites = db.favorite_articles().await.unwrap();
        assert_eq!(favorites, vec![two]);
    }

    #[tokio::test]
    async fn test_headlines_filter_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("newsdesk_filter_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("news.db");
        let path_str = path.to_str().unwrap();

        let db = Database::open(path_str).await.unwrap();
        assert_eq!(db.headlines_filter().await.unwrap(), None);
        db.set_headlines_filter("first").await.unwrap();
        db.set_headlines_filter("second").await.unwrap();
        db.pool.close().await;

        let reopened = Database::open(path_str).await.unwrap();
        assert_eq!(
            reopened.headlines_filter().await.unwrap().as_deref(),
            Some("second")
        );
        reopened.pool.close().await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_upsert_under_foreign_write_lock_reports_instance_locked() {
        use sqlx::{Connection, SqliteConnection};

        let dir = std::env::temp_dir().join(format!("newsdesk_locked_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("news.db");
        let path_str = path.to_str().unwrap();
        let db = Database::open(path_str).await.unwrap();

        // A second process holding the write lock
        let mut other = SqliteConnection::connect(&format!("sqlite:{}", path_str))
            .await
            .unwrap();
        sqlx::query("BEGIN EXCLUSIVE").execute(&mut other).await.unwrap();

        let result = db
            .upsert_articles(&[article("https://a.example/1", "One")])
            .await;
        assert!(
            matches!(result, Err(StoreError::InstanceLocked)),
            "got {:?}",
            result
        );

        sqlx::query("ROLLBACK").execute(&mut other).await.unwrap();
        other.close().await.unwrap();
        db.pool.close().await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeSet;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            /// Favorites are exactly the stored articles whose flag was set an odd number of times.
            #[test]
            fn favorites_are_subset_with_flag_set(toggles in proptest::collection::vec(0usize..6, 0..24)) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();

                rt.block_on(async {
                    let db = test_db().await;
                    let articles: Vec<Article> = (0..6)
                        .map(|i| article(&format!("https://p.example/{i}"), &format!("T{i}")))
                        .collect();
                    db.upsert_articles(&articles).await.unwrap();

                    let mut expected = BTreeSet::new();
                    for idx in &toggles {
                        let url = &articles[*idx].url;
                        let mut current = db.article_by_url(url).await.unwrap().unwrap();
                        current.is_favorite = !current.is_favorite;
                        db.update_article(&current).await.unwrap();
                        if !expected.remove(url) {
                            expected.insert(url.clone());
                        }
                    }

                    let favorites = db.favorite_articles().await.unwrap();
                    let all = db.all_articles().await.unwrap();
                    prop_assert!(favorites.iter().all(|a| a.is_favorite));
                    prop_assert!(favorites.iter().all(|a| all.contains(a)));
                    let got: BTreeSet<String> = favorites.into_iter().map(|a| a.url).collect();
                    prop_assert_eq!(got, expected);
                    Ok::<(), TestCaseError>(())
                })?;
            }
        }
    }
}
