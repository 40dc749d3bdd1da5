use chrono::Utc;
use uuid::Uuid;

use super::{timestamp, Database, Session, User};

impl Database {
    pub async fn create_session(
        &self,
        user_id: i64,
        lifetime: chrono::Duration,
    ) -> anyhow::Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().simple().to_string(),
            user_id,
            expires_at: timestamp(now + lifetime),
            created_at: timestamp(now),
        };

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, expires_at, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(session.user_id)
        .bind(&session.expires_at)
        .bind(&session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    /// Resolves a session token to its user; expired sessions resolve to `None`
    pub async fn get_session_user(&self, token: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT users.* FROM sessions
            JOIN users ON users.id = sessions.user_id
            WHERE sessions.id = ? AND sessions.expires_at > ?
            "#,
        )
        .bind(token)
        .bind(timestamp(Utc::now()))
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn delete_session(&self, token: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_expired_sessions(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(timestamp(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
