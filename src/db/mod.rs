mod messages;
mod news;
mod sessions;
mod users;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};

pub use news::{NewsDraft, NewsStats};

/// Role names as stored in `users.role`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin.as_str()
    }

    pub fn joined_display(&self) -> String {
        display_date(&self.created_at)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct News {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub category: String,
    pub author: String,
    pub is_draft: bool,
    pub views: i64,
    pub date_posted: String,
}

impl News {
    pub fn posted_display(&self) -> String {
        display_date(&self.date_posted)
    }

    /// First paragraph, cut at a word boundary
    pub fn excerpt(&self) -> String {
        const MAX: usize = 200;
        let first = self.body.split("\n\n").next().unwrap_or_default().trim();
        if first.chars().count() <= MAX {
            return first.to_string();
        }
        let cut: String = first.chars().take(MAX).collect();
        match cut.rfind(' ') {
            Some(idx) => format!("{}…", &cut[..idx]),
            None => format!("{}…", cut),
        }
    }

    pub fn paragraphs(&self) -> Vec<&str> {
        self.body
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect()
    }

    pub fn category_url(&self) -> String {
        category_url(&self.category)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct ContactMessage {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub message: String,
    pub created_at: String,
}

impl ContactMessage {
    pub fn received_display(&self) -> String {
        display_date(&self.created_at)
    }
}

pub fn category_url(category: &str) -> String {
    format!("/category/{}", urlencoding::encode(category))
}

/// Fixed-width UTC timestamp; stored strings sort chronologically.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn display_date(stored: &str) -> String {
    DateTime::parse_from_rfc3339(stored)
        .map(|dt| dt.format("%B %-d, %Y").to_string())
        .unwrap_or_else(|_| stored.to_string())
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS news (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                category TEXT NOT NULL,
                author TEXT NOT NULL REFERENCES users(username) ON DELETE CASCADE,
                is_draft INTEGER NOT NULL DEFAULT 0,
                views INTEGER NOT NULL DEFAULT 0,
                date_posted TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_news_published
            ON news(is_draft, date_posted DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_news_category
            ON news(category, views DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_news_author ON news(author)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contact_messages (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    mod initialization_tests {
        use super::*;

        #[tokio::test]
        async fn test_database_creation() {
            let db = Database::new("sqlite::memory:").await;
            assert!(db.is_ok());
        }

        #[tokio::test]
        async fn test_database_initialization() {
            let db = create_test_db().await;
            assert!(db.list_users().await.unwrap().is_empty());
            assert!(db.list_all_news(None).await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_double_initialization_is_safe() {
            let db = create_test_db().await;
            let result = db.initialize().await;
            assert!(result.is_ok());
        }
    }

    mod model_tests {
        use super::*;

        fn news_with_body(body: &str) -> News {
            News {
                id: 1,
                title: "Title".to_string(),
                body: body.to_string(),
                category: "Local Politics".to_string(),
                author: "alice".to_string(),
                is_draft: false,
                views: 0,
                date_posted: "2026-03-05T08:30:00Z".to_string(),
            }
        }

        #[test]
        fn test_role_round_trip_names() {
            assert_eq!(Role::parse("admin"), Some(Role::Admin));
            assert_eq!(Role::parse("user"), Some(Role::User));
            assert_eq!(Role::parse("root"), None);
            assert_eq!(Role::Admin.as_str(), "admin");
        }

        #[test]
        fn test_timestamp_is_second_precision_utc() {
            let at = DateTime::parse_from_rfc3339("2026-10-17T09:15:42.123456+00:00")
                .unwrap()
                .with_timezone(&Utc);
            assert_eq!(timestamp(at), "2026-10-17T09:15:42Z");
        }

        #[test]
        fn test_posted_display() {
            assert_eq!(news_with_body("x").posted_display(), "March 5, 2026");
        }

        #[test]
        fn test_posted_display_falls_back_to_raw_value() {
            let mut news = news_with_body("x");
            news.date_posted = "yesterday".to_string();
            assert_eq!(news.posted_display(), "yesterday");
        }

        #[test]
        fn test_excerpt_uses_first_paragraph() {
            let news = news_with_body("Lead paragraph.\n\nSecond paragraph.");
            assert_eq!(news.excerpt(), "Lead paragraph.");
        }

        #[test]
        fn test_excerpt_truncates_long_paragraph() {
            let body = "word ".repeat(100);
            let excerpt = news_with_body(&body).excerpt();
            assert!(excerpt.ends_with('…'));
            assert!(excerpt.chars().count() <= 201);
        }

        #[test]
        fn test_paragraphs_skip_blank_blocks() {
            let news = news_with_body("One\n\n\n\nTwo\n\n  ");
            assert_eq!(news.paragraphs(), vec!["One", "Two"]);
        }

        #[test]
        fn test_category_url_is_encoded() {
            assert_eq!(
                news_with_body("x").category_url(),
                "/category/Local%20Politics"
            );
        }
    }

    #[tokio::test]
    async fn test_deleting_user_cascades_to_news_and_sessions() {
        let db = create_test_db().await;
        let alice = create_user(&db, "alice", Role::User).await;
        create_user(&db, "bob", Role::User).await;

        db.create_news(&draft("Alice story", "World", "alice", false))
            .await
            .unwrap();
        db.create_news(&draft("Bob story", "World", "bob", false))
            .await
            .unwrap();
        let session = db
            .create_session(alice, chrono::Duration::hours(1))
            .await
            .unwrap();

        assert!(db.delete_user(alice).await.unwrap());

        let remaining = db.list_all_news(None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].author, "bob");
        assert!(db.get_session_user(&session.id).await.unwrap().is_none());
    }
}
