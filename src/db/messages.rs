use chrono::Utc;

use super::{timestamp, ContactMessage, Database};

impl Database {
    pub async fn create_message(
        &self,
        name: &str,
        email: &str,
        message: &str,
    ) -> anyhow::Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO contact_messages (name, email, message, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(message)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Newest first; `limit` of `None` returns everything
    pub async fn list_messages(&self, limit: Option<i64>) -> anyhow::Result<Vec<ContactMessage>> {
        let messages = sqlx::query_as::<_, ContactMessage>(
            r#"
            SELECT * FROM contact_messages
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    pub async fn delete_message(&self, message_id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM contact_messages WHERE id = ?")
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
