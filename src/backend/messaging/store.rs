//! Conversation store adapter interface.
//!
//! The relational conversation/message store is an external collaborator;
//! the gateway only talks to it through this trait. `PgConversationStore`
//! (in `db.rs`) is the production adapter; `MemoryConversationStore` backs
//! local development without a database and the test suite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::backend::error::StoreError;
use crate::shared::messaging::{Conversation, ConversationSummary, DirectMessage};

/// Persistence operations over 1:1 conversations and their messages.
///
/// Pair lookups take the *canonical* `(low, high)` pair; callers normalize
/// with [`crate::shared::canonical_pair`] first. `create_conversation` must
/// be idempotent under concurrent first-contact: when the pair already
/// exists the existing row is returned, never a duplicate.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn find_by_pair(
        &self,
        low: Uuid,
        high: Uuid,
    ) -> Result<Option<Conversation>, StoreError>;

    async fn create_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation, StoreError>;

    async fn conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError>;

    /// Conversations of `user_id`, most recent activity first, annotated
    /// with the latest message and the caller's unread count.
    async fn list_for_user(&self, user_id: Uuid)
        -> Result<Vec<ConversationSummary>, StoreError>;

    /// Persist a message and bump the conversation's last-activity time.
    async fn append_message(&self, message: &DirectMessage) -> Result<(), StoreError>;

    /// Page backwards through a conversation. `before` is a message-id
    /// cursor; the page of messages immediately preceding it is returned in
    /// chronological order. Without a cursor the newest page is returned.
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        before: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<DirectMessage>, StoreError>;

    async fn message(&self, id: Uuid) -> Result<Option<DirectMessage>, StoreError>;

    /// Flip the read flag on all unread messages in the conversation that
    /// were not sent by `reader_id`. Returns how many were flipped.
    async fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid)
        -> Result<u64, StoreError>;

    async fn delete_message(&self, id: Uuid) -> Result<(), StoreError>;

    /// Aggregate unread count for `user_id` across all conversations.
    async fn unread_count(&self, user_id: Uuid) -> Result<i64, StoreError>;
}

#[derive(Default)]
struct MemoryState {
    conversations: HashMap<Uuid, Conversation>,
    messages: HashMap<Uuid, DirectMessage>,
}

/// In-memory conversation store.
///
/// Used when the gateway runs without `DATABASE_URL` and as the test fake.
/// `set_failing` lets tests simulate an unavailable backend to verify that
/// failed persistence produces no broadcast.
#[derive(Default)]
pub struct MemoryConversationStore {
    state: Mutex<MemoryState>,
    failing: AtomicBool,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("simulated store failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn find_by_pair(
        &self,
        low: Uuid,
        high: Uuid,
    ) -> Result<Option<Conversation>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .conversations
            .values()
            .find(|c| c.participant_low == low && c.participant_high == high)
            .cloned())
    }

    async fn create_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        // Idempotent under the pair constraint: a concurrent creator wins
        // and its row is returned.
        if let Some(existing) = state
            .conversations
            .values()
            .find(|c| {
                c.participant_low == conversation.participant_low
                    && c.participant_high == conversation.participant_high
            })
            .cloned()
        {
            return Ok(existing);
        }
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        self.check_available()?;
        Ok(self.state.lock().unwrap().conversations.get(&id).cloned())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        let mut summaries: Vec<ConversationSummary> = state
            .conversations
            .values()
            .filter(|c| c.has_participant(user_id))
            .map(|c| {
                let mut in_conversation: Vec<&DirectMessage> = state
                    .messages
                    .values()
                    .filter(|m| m.conversation_id == c.id)
                    .collect();
                in_conversation.sort_by_key(|m| m.created_at);
                let unread = in_conversation
                    .iter()
                    .filter(|m| m.sender_id != user_id && !m.is_read)
                    .count() as i64;
                ConversationSummary {
                    conversation: c.clone(),
                    other_user_id: c.other_participant(user_id).unwrap_or(user_id),
                    last_message: in_conversation.last().map(|m| (*m).clone()),
                    unread_count: unread,
                }
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.conversation
                .last_activity_at
                .cmp(&a.conversation.last_activity_at)
        });
        Ok(summaries)
    }

    async fn append_message(&self, message: &DirectMessage) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        if !state.conversations.contains_key(&message.conversation_id) {
            return Err(StoreError::NotFound);
        }
        state.messages.insert(message.id, message.clone());
        if let Some(conversation) = state.conversations.get_mut(&message.conversation_id) {
            conversation.last_activity_at = message.created_at;
        }
        Ok(())
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        before: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<DirectMessage>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        let mut in_conversation: Vec<DirectMessage> = state
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        in_conversation.sort_by_key(|m| m.created_at);

        let cutoff = match before {
            Some(cursor_id) => match state.messages.get(&cursor_id) {
                Some(cursor) => in_conversation
                    .iter()
                    .position(|m| m.id == cursor.id)
                    .unwrap_or(in_conversation.len()),
                None => in_conversation.len(),
            },
            None => in_conversation.len(),
        };

        let start = cutoff.saturating_sub(limit as usize);
        Ok(in_conversation[start..cutoff].to_vec())
    }

    async fn message(&self, id: Uuid) -> Result<Option<DirectMessage>, StoreError> {
        self.check_available()?;
        Ok(self.state.lock().unwrap().messages.get(&id).cloned())
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let mut flipped = 0;
        for message in state.messages.values_mut() {
            if message.conversation_id == conversation_id
                && message.sender_id != reader_id
                && !message.is_read
            {
                message.is_read = true;
                message.read_at = Some(now);
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn delete_message(&self, id: Uuid) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        match state.messages.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<i64, StoreError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        let count = state
            .messages
            .values()
            .filter(|m| {
                !m.is_read
                    && m.sender_id != user_id
                    && state
                        .conversations
                        .get(&m.conversation_id)
                        .is_some_and(|c| c.has_participant(user_id))
            })
            .count();
        Ok(count as i64)
    }
}
