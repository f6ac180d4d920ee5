//! Group room manager.
//!
//! Presence (rosters, typing) is served from memory; authorization is
//! re-validated against the persisted membership store on every join and
//! every send — a stale roster entry never grants anything. Message
//! broadcasts target the full persisted member list through the registry,
//! not just the roster, so members who are online but not watching the room
//! still receive them; offline members are the notification collaborator's
//! concern.
//!
//! Per member and group the state machine is
//! `NOT_MEMBER -> MEMBER -> (BANNED | left)`; `BANNED` has no self-service
//! exit.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::backend::error::{with_store_timeout, GatewayError};
use crate::backend::registry::ConnectionRegistry;
use crate::shared::rooms::{Group, GroupMembership, GroupMessage};
use crate::shared::{Identity, ServerEvent};

use super::roster::RoomRoster;
use super::store::{GroupStore, MembershipChange};

const DEFAULT_PAGE: u32 = 50;
const MAX_PAGE: u32 = 200;

pub struct GroupRoomManager {
    store: Arc<dyn GroupStore>,
    registry: Arc<ConnectionRegistry>,
    roster: RoomRoster,
    store_timeout: Duration,
    /// How long a sender may delete their own group message.
    delete_grace: Duration,
}

impl GroupRoomManager {
    pub fn new(
        store: Arc<dyn GroupStore>,
        registry: Arc<ConnectionRegistry>,
        store_timeout: Duration,
        delete_grace: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            roster: RoomRoster::new(),
            store_timeout,
            delete_grace,
        }
    }

    /// Join a room's live channel.
    ///
    /// Membership and ban state are checked against the store on every join;
    /// nothing is cached across sessions. Returns the roster snapshot after
    /// joining.
    pub async fn join_room(
        &self,
        group_id: Uuid,
        identity: &Identity,
    ) -> Result<Vec<Identity>, GatewayError> {
        self.require_member(group_id, identity.id).await?;

        let newly_joined = self.roster.join(group_id, identity.id).await;
        if newly_joined {
            self.send_to_roster(
                group_id,
                Some(identity.id),
                ServerEvent::RoomUserOnline {
                    group_id,
                    identity: identity.clone(),
                },
            )
            .await;
            tracing::debug!(group = %group_id, user = %identity.id, "joined room");
        }

        let mut snapshot = Vec::new();
        for user_id in self.roster.members(group_id).await {
            if let Some(member_identity) = self.registry.identity(user_id).await {
                snapshot.push(member_identity);
            }
        }
        Ok(snapshot)
    }

    /// Leave a room's live channel.
    pub async fn leave_room(&self, group_id: Uuid, user_id: Uuid) {
        if self.roster.leave(group_id, user_id).await {
            self.send_to_roster(
                group_id,
                None,
                ServerEvent::RoomUserOffline { group_id, user_id },
            )
            .await;
            tracing::debug!(group = %group_id, user = %user_id, "left room");
        }
    }

    /// Implicit leave: the identity's last connection went away. Walks every
    /// room the identity was in.
    pub async fn disconnect_cleanup(&self, user_id: Uuid) {
        for group_id in self.roster.remove_everywhere(user_id).await {
            self.send_to_roster(
                group_id,
                None,
                ServerEvent::RoomUserOffline { group_id, user_id },
            )
            .await;
        }
    }

    /// Persist a group message and broadcast it to the full persisted
    /// member list. Membership and ban state are re-validated on every send;
    /// the roster is presence only and never grants authorization.
    pub async fn send_message(
        &self,
        group_id: Uuid,
        sender_id: Uuid,
        content: String,
        origin: Option<Uuid>,
    ) -> Result<GroupMessage, GatewayError> {
        if content.trim().is_empty() {
            return Err(GatewayError::invalid_argument("empty message"));
        }
        self.require_member(group_id, sender_id).await?;

        let message = GroupMessage::new(group_id, sender_id, content);
        with_store_timeout(
            self.store_timeout,
            "append_group_message",
            self.store.append_message(&message),
        )
        .await?;

        tracing::debug!(group = %group_id, message = %message.id, sender = %sender_id, "group message persisted");

        let members = with_store_timeout(
            self.store_timeout,
            "list_members",
            self.store.list_members(group_id),
        )
        .await?;

        let event = ServerEvent::RoomMessageNew {
            message: message.clone(),
        };
        self.fan_out_to_members(&members, sender_id, origin, event)
            .await;

        Ok(message)
    }

    /// Relay a typing indicator to the room. Ephemeral best-effort UX
    /// signal: no persistence, no store round-trip — roster membership is
    /// the only gate.
    pub async fn typing(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        typing: bool,
    ) -> Result<(), GatewayError> {
        if !self.roster.contains(group_id, user_id).await {
            return Err(GatewayError::forbidden("not in this room"));
        }
        self.send_to_roster(
            group_id,
            Some(user_id),
            ServerEvent::RoomTyping {
                group_id,
                user_id,
                typing,
            },
        )
        .await;
        Ok(())
    }

    /// Page backwards through the room's persisted history.
    pub async fn history(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        before: Option<Uuid>,
        limit: Option<u32>,
    ) -> Result<Vec<GroupMessage>, GatewayError> {
        self.require_member(group_id, user_id).await?;
        let limit = limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE);
        with_store_timeout(
            self.store_timeout,
            "list_group_messages",
            self.store.list_messages(group_id, before, limit),
        )
        .await
    }

    /// Delete a group message.
    ///
    /// Permitted for the group owner, members holding a moderating role,
    /// platform admins, and the original sender while the message is within
    /// the delete grace window. Everyone else gets `Forbidden`.
    pub async fn delete_message(
        &self,
        group_id: Uuid,
        message_id: Uuid,
        requester: &Identity,
        origin: Option<Uuid>,
    ) -> Result<(), GatewayError> {
        let group = self.require_group(group_id).await?;
        let message = with_store_timeout(
            self.store_timeout,
            "group_message",
            self.store.message(group_id, message_id),
        )
        .await?
        .ok_or_else(|| GatewayError::not_found("message not found"))?;

        let membership = with_store_timeout(
            self.store_timeout,
            "find_membership",
            self.store.find_membership(group_id, requester.id),
        )
        .await?;

        if !self.may_delete(&group, &message, requester, membership.as_ref()) {
            return Err(GatewayError::forbidden(
                "not allowed to delete this message",
            ));
        }

        with_store_timeout(
            self.store_timeout,
            "delete_group_message",
            self.store.delete_message(group_id, message_id),
        )
        .await?;

        let members = with_store_timeout(
            self.store_timeout,
            "list_members",
            self.store.list_members(group_id),
        )
        .await?;
        self.fan_out_to_members(
            &members,
            requester.id,
            origin,
            ServerEvent::RoomMessageDeleted {
                group_id,
                message_id,
            },
        )
        .await;

        Ok(())
    }

    /// Remove a member from the group. Owner/moderator/admin only; the
    /// group owner can never be removed.
    pub async fn remove_member(
        &self,
        group_id: Uuid,
        target_id: Uuid,
        requester: &Identity,
    ) -> Result<(), GatewayError> {
        self.change_membership(group_id, target_id, requester, MembershipChange::Remove)
            .await
    }

    /// Ban a member. The row is kept (audit) but every room action is
    /// denied from now on, and there is no self-service way back in. The
    /// group owner can never be banned.
    pub async fn ban_member(
        &self,
        group_id: Uuid,
        target_id: Uuid,
        requester: &Identity,
    ) -> Result<(), GatewayError> {
        self.change_membership(group_id, target_id, requester, MembershipChange::Ban)
            .await
    }

    /// Invoked by the platform's HTTP CRUD layer when a member was added
    /// outside the gateway, so live viewers see the membership change.
    pub async fn emit_member_joined(&self, group_id: Uuid, member: GroupMembership) {
        self.send_to_roster(
            group_id,
            None,
            ServerEvent::RoomMemberJoined { group_id, member },
        )
        .await;
    }

    /// Invoked by the platform's HTTP CRUD layer when a member left or was
    /// removed outside the gateway. Keeps the roster consistent with
    /// HTTP-driven mutations.
    pub async fn emit_member_left(&self, group_id: Uuid, user_id: Uuid) {
        if self.roster.leave(group_id, user_id).await {
            self.send_to_roster(
                group_id,
                None,
                ServerEvent::RoomUserOffline { group_id, user_id },
            )
            .await;
        }
        self.send_to_roster(
            group_id,
            None,
            ServerEvent::RoomMemberLeft { group_id, user_id },
        )
        .await;
        self.registry
            .send(user_id, ServerEvent::RoomMemberLeft { group_id, user_id })
            .await;
    }

    async fn change_membership(
        &self,
        group_id: Uuid,
        target_id: Uuid,
        requester: &Identity,
        change: MembershipChange,
    ) -> Result<(), GatewayError> {
        let group = self.require_group(group_id).await?;

        // Owner immunity comes first: no requester role may touch the owner.
        if target_id == group.owner_id {
            return Err(GatewayError::forbidden(
                "the group owner cannot be removed or banned",
            ));
        }

        let membership = with_store_timeout(
            self.store_timeout,
            "find_membership",
            self.store.find_membership(group_id, requester.id),
        )
        .await?;
        let may_moderate = requester.admin
            || group.owner_id == requester.id
            || membership.is_some_and(|m| !m.banned && m.role.can_moderate());
        if !may_moderate {
            return Err(GatewayError::forbidden(
                "moderator or owner rights required",
            ));
        }

        with_store_timeout(
            self.store_timeout,
            "update_membership",
            self.store.update_membership(group_id, target_id, change),
        )
        .await?;

        tracing::info!(
            group = %group_id,
            target = %target_id,
            requester = %requester.id,
            change = ?change,
            "membership updated"
        );

        if self.roster.leave(group_id, target_id).await {
            self.send_to_roster(
                group_id,
                None,
                ServerEvent::RoomUserOffline {
                    group_id,
                    user_id: target_id,
                },
            )
            .await;
        }
        self.send_to_roster(
            group_id,
            None,
            ServerEvent::RoomMemberLeft {
                group_id,
                user_id: target_id,
            },
        )
        .await;
        self.registry
            .send(
                target_id,
                ServerEvent::RoomMemberLeft {
                    group_id,
                    user_id: target_id,
                },
            )
            .await;

        Ok(())
    }

    fn may_delete(
        &self,
        group: &Group,
        message: &GroupMessage,
        requester: &Identity,
        membership: Option<&GroupMembership>,
    ) -> bool {
        if requester.admin || group.owner_id == requester.id {
            return true;
        }
        let Some(membership) = membership else {
            return false;
        };
        if membership.banned {
            return false;
        }
        if membership.role.can_moderate() {
            return true;
        }
        if message.sender_id != requester.id {
            return false;
        }
        let age = Utc::now().signed_duration_since(message.created_at);
        age.to_std()
            .map(|age| age <= self.delete_grace)
            .unwrap_or(true)
    }

    async fn require_group(&self, group_id: Uuid) -> Result<Group, GatewayError> {
        with_store_timeout(
            self.store_timeout,
            "find_group",
            self.store.find_group(group_id),
        )
        .await?
        .ok_or_else(|| GatewayError::not_found("group not found"))
    }

    /// Fetch the membership row and require a current, non-banned member.
    async fn require_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<GroupMembership, GatewayError> {
        let membership = with_store_timeout(
            self.store_timeout,
            "find_membership",
            self.store.find_membership(group_id, user_id),
        )
        .await?
        .ok_or_else(|| GatewayError::forbidden("not a member of this group"))?;

        if membership.banned {
            return Err(GatewayError::forbidden("banned from this group"));
        }
        Ok(membership)
    }

    async fn send_to_roster(
        &self,
        group_id: Uuid,
        except_user: Option<Uuid>,
        event: ServerEvent,
    ) {
        for user_id in self.roster.members(group_id).await {
            if Some(user_id) == except_user {
                continue;
            }
            self.registry.send(user_id, event.clone()).await;
        }
    }

    /// Deliver an event to every non-banned persisted member; the acting
    /// user's originating device is skipped (it receives the dispatch reply
    /// instead).
    async fn fan_out_to_members(
        &self,
        members: &[GroupMembership],
        actor_id: Uuid,
        origin: Option<Uuid>,
        event: ServerEvent,
    ) {
        for member in members {
            if member.banned {
                continue;
            }
            if member.user_id == actor_id {
                self.registry
                    .send_excluding(member.user_id, origin, event.clone())
                    .await;
            } else {
                self.registry.send(member.user_id, event.clone()).await;
            }
        }
    }
}
