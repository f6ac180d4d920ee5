//! PostgreSQL group store adapter.
//!
//! Reads the platform-owned `groups` and `group_memberships` tables and
//! owns the `group_messages` table. Message appends bump the group's
//! message counter in the same statement batch.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::backend::error::StoreError;
use crate::shared::rooms::{Group, GroupMembership, GroupMessage, GroupRole};

use super::store::{GroupStore, MembershipChange};

pub struct PgGroupStore {
    pool: PgPool,
}

impl PgGroupStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_group(row: &PgRow) -> Group {
    Group {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        visibility: row.get("visibility"),
        message_count: row.get("message_count"),
    }
}

fn row_to_membership(row: &PgRow) -> GroupMembership {
    GroupMembership {
        group_id: row.get("group_id"),
        user_id: row.get("user_id"),
        role: GroupRole::parse(row.get::<String, _>("role").as_str()),
        banned: row.get("banned"),
        joined_at: row.get("joined_at"),
    }
}

fn row_to_message(row: &PgRow) -> GroupMessage {
    GroupMessage {
        id: row.get("id"),
        group_id: row.get("group_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl GroupStore for PgGroupStore {
    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, visibility, message_count
            FROM groups
            WHERE id = $1
            "#,
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_group))
    }

    async fn find_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMembership>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT group_id, user_id, role, banned, joined_at
            FROM group_memberships
            WHERE group_id = $1 AND user_id = $2
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_membership))
    }

    async fn list_members(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<GroupMembership>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT group_id, user_id, role, banned, joined_at
            FROM group_memberships
            WHERE group_id = $1
            ORDER BY joined_at ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_membership).collect())
    }

    async fn append_message(&self, message: &GroupMessage) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO group_messages (id, group_id, sender_id, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(message.id)
        .bind(message.group_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            UPDATE groups SET message_count = message_count + 1 WHERE id = $1
            "#,
        )
        .bind(message.group_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn message(
        &self,
        group_id: Uuid,
        message_id: Uuid,
    ) -> Result<Option<GroupMessage>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, group_id, sender_id, content, created_at
            FROM group_messages
            WHERE id = $1 AND group_id = $2
            "#,
        )
        .bind(message_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_message))
    }

    async fn list_messages(
        &self,
        group_id: Uuid,
        before: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<GroupMessage>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, group_id, sender_id, content, created_at
            FROM group_messages
            WHERE group_id = $1
              AND ($2::uuid IS NULL
                   OR created_at < (SELECT created_at FROM group_messages WHERE id = $2))
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(group_id)
        .bind(before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<GroupMessage> = rows.iter().map(row_to_message).collect();
        messages.reverse();
        Ok(messages)
    }

    async fn delete_message(
        &self,
        group_id: Uuid,
        message_id: Uuid,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM group_messages WHERE id = $1 AND group_id = $2
            "#,
        )
        .bind(message_id)
        .bind(group_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        change: MembershipChange,
    ) -> Result<(), StoreError> {
        let result = match change {
            MembershipChange::Ban => {
                sqlx::query(
                    r#"
                    UPDATE group_memberships SET banned = TRUE
                    WHERE group_id = $1 AND user_id = $2
                    "#,
                )
                .bind(group_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?
            }
            MembershipChange::Remove => {
                sqlx::query(
                    r#"
                    DELETE FROM group_memberships
                    WHERE group_id = $1 AND user_id = $2
                    "#,
                )
                .bind(group_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
