//! Direct-messaging data structures.
//!
//! Conversations are 1:1 and keyed by the *canonical pair* of their two
//! participants: the unordered pair is normalized to `(low, high)` id order
//! before any lookup or insert, so a conversation between A and B has exactly
//! one row no matter which side made first contact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalize an unordered participant pair to `(low, high)` order.
///
/// Both `(a, b)` and `(b, a)` map to the same canonical pair, which is what
/// the store's uniqueness constraint is declared on.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// A persisted 1:1 conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    /// Unique conversation id
    pub id: Uuid,
    /// Lower participant id of the canonical pair
    pub participant_low: Uuid,
    /// Higher participant id of the canonical pair
    pub participant_high: Uuid,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent message
    pub last_activity_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new conversation record for an unordered pair.
    pub fn new(a: Uuid, b: Uuid) -> Self {
        let (low, high) = canonical_pair(a, b);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            participant_low: low,
            participant_high: high,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Check whether `user_id` is one of the two participants.
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participant_low == user_id || self.participant_high == user_id
    }

    /// The participant that is not `user_id`.
    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        if self.participant_low == user_id {
            Some(self.participant_high)
        } else if self.participant_high == user_id {
            Some(self.participant_low)
        } else {
            None
        }
    }
}

/// A media attachment referenced from a message.
///
/// The gateway relays attachment references as-is; uploading and storage are
/// the platform's media service's concern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaAttachment {
    pub url: String,
    pub mime_type: Option<String>,
}

/// A persisted direct message.
///
/// Immutable after creation except for the read flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectMessage {
    /// Unique message id
    pub id: Uuid,
    /// Conversation this message belongs to
    pub conversation_id: Uuid,
    /// User who sent the message
    pub sender_id: Uuid,
    /// Message text
    pub content: String,
    /// Attachments, empty for plain text messages
    #[serde(default)]
    pub media: Vec<MediaAttachment>,
    /// When the message was sent
    pub created_at: DateTime<Utc>,
    /// Whether the other participant has read the message
    pub is_read: bool,
    /// When the message was read, if it has been
    pub read_at: Option<DateTime<Utc>>,
}

impl DirectMessage {
    /// Build a new unread message for a conversation.
    pub fn new(
        conversation_id: Uuid,
        sender_id: Uuid,
        content: impl Into<String>,
        media: Vec<MediaAttachment>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content: content.into(),
            media,
            created_at: Utc::now(),
            is_read: false,
            read_at: None,
        }
    }
}

/// A conversation annotated for the caller's conversation list: the other
/// participant, the latest message, and how many messages the caller has not
/// read yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub other_user_id: Uuid,
    pub last_message: Option<DirectMessage>,
    pub unread_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn canonical_pair_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(canonical_pair(a, b), canonical_pair(b, a));
    }

    #[test]
    fn conversation_participants() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conv = Conversation::new(a, b);

        assert!(conv.has_participant(a));
        assert!(conv.has_participant(b));
        assert_eq!(conv.other_participant(a), Some(b));
        assert_eq!(conv.other_participant(b), Some(a));
        assert_eq!(conv.other_participant(Uuid::new_v4()), None);
    }

    #[test]
    fn conversation_stores_pair_canonicalized() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c1 = Conversation::new(a, b);
        let c2 = Conversation::new(b, a);
        assert_eq!(
            (c1.participant_low, c1.participant_high),
            (c2.participant_low, c2.participant_high)
        );
        assert!(c1.participant_low <= c1.participant_high);
    }
}
