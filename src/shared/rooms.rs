//! Group room data structures.
//!
//! Groups themselves (name, description, visibility) are owned by the
//! platform's CRUD layer. The gateway consumes the group id, owner and
//! visibility, and owns nothing here beyond the message/membership records
//! it relays and validates against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a member inside a group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GroupRole {
    Owner,
    Moderator,
    Member,
}

impl GroupRole {
    /// Convert to string for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRole::Owner => "owner",
            GroupRole::Moderator => "moderator",
            GroupRole::Member => "member",
        }
    }

    /// Parse from string (database). Unknown values fall back to `Member`.
    pub fn parse(s: &str) -> Self {
        match s {
            "owner" => GroupRole::Owner,
            "moderator" => GroupRole::Moderator,
            _ => GroupRole::Member,
        }
    }

    /// Whether this role carries moderation rights (message deletion,
    /// member removal).
    pub fn can_moderate(&self) -> bool {
        matches!(self, GroupRole::Owner | GroupRole::Moderator)
    }
}

/// The slice of a platform group the gateway cares about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub visibility: String,
    pub message_count: i64,
}

/// A persisted group membership row.
///
/// A banned member keeps the row (for audit) but is denied every room
/// action; there is no self-service transition out of the banned state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupMembership {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub role: GroupRole,
    pub banned: bool,
    pub joined_at: DateTime<Utc>,
}

impl GroupMembership {
    pub fn new(group_id: Uuid, user_id: Uuid, role: GroupRole) -> Self {
        Self {
            group_id,
            user_id,
            role,
            banned: false,
            joined_at: Utc::now(),
        }
    }
}

/// A persisted group chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupMessage {
    pub id: Uuid,
    pub group_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl GroupMessage {
    pub fn new(group_id: Uuid, sender_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id,
            sender_id,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_storage_form() {
        for role in [GroupRole::Owner, GroupRole::Moderator, GroupRole::Member] {
            assert_eq!(GroupRole::parse(role.as_str()), role);
        }
    }

    #[test]
    fn unknown_role_falls_back_to_member() {
        assert_eq!(GroupRole::parse("superuser"), GroupRole::Member);
    }

    #[test]
    fn moderation_rights() {
        assert!(GroupRole::Owner.can_moderate());
        assert!(GroupRole::Moderator.can_moderate());
        assert!(!GroupRole::Member.can_moderate());
    }
}
