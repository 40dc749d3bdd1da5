use chrono::Utc;

use super::{timestamp, Database, News};

/// Editable fields of an article
#[derive(Debug, Clone)]
pub struct NewsDraft {
    pub title: String,
    pub body: String,
    pub category: String,
    pub author: String,
    pub is_draft: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewsStats {
    pub total: i64,
    pub drafts: i64,
    pub views: i64,
}

impl Database {
    pub async fn create_news(&self, draft: &NewsDraft) -> anyhow::Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO news (title, body, category, author, is_draft, views, date_posted)
            VALUES (?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.body)
        .bind(&draft.category)
        .bind(&draft.author)
        .bind(draft.is_draft)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Updates content fields; author, views and posting date are kept
    pub async fn update_news(&self, news_id: i64, draft: &NewsDraft) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE news
            SET title = ?, body = ?, category = ?, is_draft = ?
            WHERE id = ?
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.body)
        .bind(&draft.category)
        .bind(draft.is_draft)
        .bind(news_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_news(&self, news_id: i64) -> anyhow::Result<Option<News>> {
        let news = sqlx::query_as::<_, News>("SELECT * FROM news WHERE id = ?")
            .bind(news_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(news)
    }

    pub async fn list_published(&self) -> anyhow::Result<Vec<News>> {
        let news = sqlx::query_as::<_, News>(
            r#"
            SELECT * FROM news
            WHERE is_draft = 0
            ORDER BY date_posted DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(news)
    }

    /// Drafts included; `None` returns every article
    pub async fn list_all_news(&self, limit: Option<i64>) -> anyhow::Result<Vec<News>> {
        let news = sqlx::query_as::<_, News>(
            r#"
            SELECT * FROM news
            ORDER BY date_posted DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;
        Ok(news)
    }

    pub async fn list_published_by_category(&self, category: &str) -> anyhow::Result<Vec<News>> {
        let news = sqlx::query_as::<_, News>(
            r#"
            SELECT * FROM news
            WHERE category = ? AND is_draft = 0
            ORDER BY date_posted DESC, id DESC
            "#,
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await?;
        Ok(news)
    }

    /// All of an author's articles, drafts included
    pub async fn list_news_by_author(&self, author: &str) -> anyhow::Result<Vec<News>> {
        let news = sqlx::query_as::<_, News>(
            r#"
            SELECT * FROM news
            WHERE author = ?
            ORDER BY date_posted DESC, id DESC
            "#,
        )
        .bind(author)
        .fetch_all(&self.pool)
        .await?;
        Ok(news)
    }

    pub async fn published_categories(&self) -> anyhow::Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT category FROM news WHERE is_draft = 0 ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(category,)| category).collect())
    }

    /// Returns false when the article does not exist
    pub async fn increment_views(&self, news_id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE news SET views = views + 1 WHERE id = ?")
            .bind(news_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Most-viewed published articles sharing the category, excluding `news` itself
    pub async fn related_news(&self, news: &News, limit: i64) -> anyhow::Result<Vec<News>> {
        let related = sqlx::query_as::<_, News>(
            r#"
            SELECT * FROM news
            WHERE category = ? AND id != ? AND is_draft = 0
            ORDER BY views DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(&news.category)
        .bind(news.id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(related)
    }

    pub async fn set_draft(&self, news_id: i64, is_draft: bool) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE news SET is_draft = ? WHERE id = ?")
            .bind(is_draft)
            .bind(news_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_news(&self, news_id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM news WHERE id = ?")
            .bind(news_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn news_stats(&self) -> anyhow::Result<NewsStats> {
        let (total, drafts, views): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN is_draft = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(views), 0)
            FROM news
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(NewsStats {
            total,
            drafts,
            views,
        })
    }
}
