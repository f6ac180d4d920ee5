//! PostgreSQL conversation store adapter.
//!
//! Runtime-checked sqlx queries over the `conversations` and
//! `direct_messages` tables. Concurrent first-contact safety comes from the
//! uniqueness constraint on the canonical participant pair: the insert uses
//! `ON CONFLICT DO NOTHING` and then reads back whichever row won.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::backend::error::StoreError;
use crate::shared::messaging::{
    Conversation, ConversationSummary, DirectMessage, MediaAttachment,
};

use super::store::ConversationStore;

pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_conversation(row: &PgRow) -> Conversation {
    Conversation {
        id: row.get("id"),
        participant_low: row.get("participant_low"),
        participant_high: row.get("participant_high"),
        created_at: row.get("created_at"),
        last_activity_at: row.get("last_activity_at"),
    }
}

fn row_to_message(row: &PgRow) -> DirectMessage {
    let media: Option<String> = row.get("media");
    let media: Vec<MediaAttachment> = media
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();

    DirectMessage {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        media,
        created_at: row.get("created_at"),
        is_read: row.get("is_read"),
        read_at: row.get("read_at"),
    }
}

fn encode_media(media: &[MediaAttachment]) -> Result<Option<String>, StoreError> {
    if media.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(media)
        .map(Some)
        .map_err(|e| StoreError::Unavailable(format!("media encoding failed: {e}")))
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn find_by_pair(
        &self,
        low: Uuid,
        high: Uuid,
    ) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, participant_low, participant_high, created_at, last_activity_at
            FROM conversations
            WHERE participant_low = $1 AND participant_high = $2
            "#,
        )
        .bind(low)
        .bind(high)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_conversation))
    }

    async fn create_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO conversations (id, participant_low, participant_high, created_at, last_activity_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (participant_low, participant_high) DO NOTHING
            "#,
        )
        .bind(conversation.id)
        .bind(conversation.participant_low)
        .bind(conversation.participant_high)
        .bind(conversation.created_at)
        .bind(conversation.last_activity_at)
        .execute(&self.pool)
        .await?;

        // Read back whichever row won the race.
        self.find_by_pair(conversation.participant_low, conversation.participant_high)
            .await?
            .ok_or_else(|| StoreError::Unavailable("conversation vanished after insert".into()))
    }

    async fn conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, participant_low, participant_high, created_at, last_activity_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_conversation))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, participant_low, participant_high, created_at, last_activity_at
            FROM conversations
            WHERE participant_low = $1 OR participant_high = $1
            ORDER BY last_activity_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let conversation = row_to_conversation(row);

            let last_row = sqlx::query(
                r#"
                SELECT id, conversation_id, sender_id, content, media, created_at, is_read, read_at
                FROM direct_messages
                WHERE conversation_id = $1
                ORDER BY created_at DESC
                LIMIT 1
                "#,
            )
            .bind(conversation.id)
            .fetch_optional(&self.pool)
            .await?;

            let unread_row = sqlx::query(
                r#"
                SELECT COUNT(*) AS count
                FROM direct_messages
                WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE
                "#,
            )
            .bind(conversation.id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

            summaries.push(ConversationSummary {
                other_user_id: conversation.other_participant(user_id).unwrap_or(user_id),
                last_message: last_row.as_ref().map(row_to_message),
                unread_count: unread_row.get::<i64, _>("count"),
                conversation,
            });
        }

        Ok(summaries)
    }

    async fn append_message(&self, message: &DirectMessage) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO direct_messages (id, conversation_id, sender_id, content, media, created_at, is_read, read_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(encode_media(&message.media)?)
        .bind(message.created_at)
        .bind(message.is_read)
        .bind(message.read_at)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            UPDATE conversations SET last_activity_at = $1 WHERE id = $2
            "#,
        )
        .bind(message.created_at)
        .bind(message.conversation_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        before: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<DirectMessage>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, sender_id, content, media, created_at, is_read, read_at
            FROM direct_messages
            WHERE conversation_id = $1
              AND ($2::uuid IS NULL
                   OR created_at < (SELECT created_at FROM direct_messages WHERE id = $2))
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(conversation_id)
        .bind(before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        // Fetched newest-first for the cursor; hand back chronological.
        let mut messages: Vec<DirectMessage> = rows.iter().map(row_to_message).collect();
        messages.reverse();
        Ok(messages)
    }

    async fn message(&self, id: Uuid) -> Result<Option<DirectMessage>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, conversation_id, sender_id, content, media, created_at, is_read, read_at
            FROM direct_messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_message))
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE direct_messages
            SET is_read = TRUE, read_at = $1
            WHERE conversation_id = $2 AND sender_id <> $3 AND is_read = FALSE
            "#,
        )
        .bind(Utc::now())
        .bind(conversation_id)
        .bind(reader_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_message(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM direct_messages WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM direct_messages m
            INNER JOIN conversations c ON c.id = m.conversation_id
            WHERE m.is_read = FALSE
              AND m.sender_id <> $1
              AND (c.participant_low = $1 OR c.participant_high = $1)
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("count"))
    }
}
