//! Direct messaging service.
//!
//! Orchestrates conversation lookup, message persistence and read-state
//! transitions over the conversation store, then fans resulting events out
//! through the connection registry. Persistence always completes before any
//! broadcast: a failed store call returns an error to the caller and nobody
//! else observes anything.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::backend::error::{with_store_timeout, GatewayError};
use crate::backend::registry::ConnectionRegistry;
use crate::shared::canonical_pair;
use crate::shared::messaging::{
    Conversation, ConversationSummary, DirectMessage, MediaAttachment,
};
use crate::shared::ServerEvent;

use super::store::ConversationStore;

const DEFAULT_PAGE: u32 = 50;
const MAX_PAGE: u32 = 200;

pub struct DirectMessagingService {
    store: Arc<dyn ConversationStore>,
    registry: Arc<ConnectionRegistry>,
    store_timeout: Duration,
}

impl DirectMessagingService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        registry: Arc<ConnectionRegistry>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            store_timeout,
        }
    }

    /// Look up the conversation for an unordered pair, creating it lazily on
    /// first contact.
    ///
    /// The pair is canonicalized before touching the store, and creation is
    /// idempotent under the store's pair constraint, so concurrent first
    /// contact from both ends converges on a single conversation.
    pub async fn get_or_create_conversation(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Conversation, GatewayError> {
        if a == b {
            return Err(GatewayError::invalid_argument(
                "cannot open a conversation with yourself",
            ));
        }

        let (low, high) = canonical_pair(a, b);
        if let Some(existing) = with_store_timeout(
            self.store_timeout,
            "find_by_pair",
            self.store.find_by_pair(low, high),
        )
        .await?
        {
            return Ok(existing);
        }

        with_store_timeout(
            self.store_timeout,
            "create_conversation",
            self.store.create_conversation(Conversation::new(low, high)),
        )
        .await
    }

    /// The caller's conversations, most recent activity first.
    pub async fn list_conversations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, GatewayError> {
        with_store_timeout(
            self.store_timeout,
            "list_for_user",
            self.store.list_for_user(user_id),
        )
        .await
    }

    /// Page backwards through a conversation the caller participates in.
    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        before: Option<Uuid>,
        limit: Option<u32>,
    ) -> Result<Vec<DirectMessage>, GatewayError> {
        self.participant_conversation(conversation_id, user_id)
            .await?;
        let limit = limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE);
        with_store_timeout(
            self.store_timeout,
            "list_messages",
            self.store.list_messages(conversation_id, before, limit),
        )
        .await
    }

    /// Persist a message and deliver it.
    ///
    /// Delivery happens only after persistence succeeded: the other
    /// participant's devices and the sender's other devices each receive one
    /// `dm:message:new`. `origin` is the connection the frame arrived on; it
    /// gets the message back as the dispatch reply instead.
    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: String,
        media: Vec<MediaAttachment>,
        origin: Option<Uuid>,
    ) -> Result<DirectMessage, GatewayError> {
        if content.trim().is_empty() && media.is_empty() {
            return Err(GatewayError::invalid_argument("empty message"));
        }

        let conversation = self
            .participant_conversation(conversation_id, sender_id)
            .await?;

        let message = DirectMessage::new(conversation_id, sender_id, content, media);
        with_store_timeout(
            self.store_timeout,
            "append_message",
            self.store.append_message(&message),
        )
        .await?;

        tracing::debug!(
            conversation = %conversation_id,
            message = %message.id,
            sender = %sender_id,
            "direct message persisted"
        );

        let event = ServerEvent::DmMessageNew {
            message: message.clone(),
        };
        if let Some(other) = conversation.other_participant(sender_id) {
            self.registry.send(other, event.clone()).await;
        }
        self.registry
            .send_excluding(sender_id, origin, event)
            .await;

        Ok(message)
    }

    /// Relay a typing indicator to the other participant. Ephemeral: no
    /// persistence, best effort.
    pub async fn typing(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        typing: bool,
    ) -> Result<(), GatewayError> {
        let conversation = self
            .participant_conversation(conversation_id, user_id)
            .await?;

        if let Some(other) = conversation.other_participant(user_id) {
            self.registry
                .send(
                    other,
                    ServerEvent::DmTyping {
                        conversation_id,
                        user_id,
                        typing,
                    },
                )
                .await;
        }
        Ok(())
    }

    /// Flip the read flag on everything the caller has not read yet and
    /// notify the other participant their messages were seen.
    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> Result<u64, GatewayError> {
        let conversation = self
            .participant_conversation(conversation_id, reader_id)
            .await?;

        let flipped = with_store_timeout(
            self.store_timeout,
            "mark_read",
            self.store.mark_read(conversation_id, reader_id),
        )
        .await?;

        if flipped > 0 {
            if let Some(other) = conversation.other_participant(reader_id) {
                self.registry
                    .send(
                        other,
                        ServerEvent::DmRead {
                            conversation_id,
                            reader_id,
                        },
                    )
                    .await;
            }
        }
        Ok(flipped)
    }

    /// Delete one of the caller's own messages. Only the original sender may
    /// delete; there is no time window for direct messages. Returns the
    /// deleted message.
    pub async fn delete_message(
        &self,
        message_id: Uuid,
        requester_id: Uuid,
        origin: Option<Uuid>,
    ) -> Result<DirectMessage, GatewayError> {
        let message = with_store_timeout(
            self.store_timeout,
            "message",
            self.store.message(message_id),
        )
        .await?
        .ok_or_else(|| GatewayError::not_found("message not found"))?;

        if message.sender_id != requester_id {
            return Err(GatewayError::forbidden(
                "only the sender may delete a message",
            ));
        }

        with_store_timeout(
            self.store_timeout,
            "delete_message",
            self.store.delete_message(message_id),
        )
        .await?;

        let conversation = with_store_timeout(
            self.store_timeout,
            "conversation",
            self.store.conversation(message.conversation_id),
        )
        .await?;

        let event = ServerEvent::DmMessageDeleted {
            conversation_id: message.conversation_id,
            message_id,
        };
        if let Some(other) =
            conversation.and_then(|c| c.other_participant(requester_id))
        {
            self.registry.send(other, event.clone()).await;
        }
        self.registry
            .send_excluding(requester_id, origin, event)
            .await;

        Ok(message)
    }

    /// Aggregate unread count across all of the caller's conversations.
    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64, GatewayError> {
        with_store_timeout(
            self.store_timeout,
            "unread_count",
            self.store.unread_count(user_id),
        )
        .await
    }

    /// Fetch a conversation and require `user_id` to be a participant.
    async fn participant_conversation(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Conversation, GatewayError> {
        let conversation = with_store_timeout(
            self.store_timeout,
            "conversation",
            self.store.conversation(conversation_id),
        )
        .await?
        .ok_or_else(|| GatewayError::not_found("conversation not found"))?;

        if !conversation.has_participant(user_id) {
            return Err(GatewayError::forbidden(
                "not a participant of this conversation",
            ));
        }
        Ok(conversation)
    }
}
