//! Group/membership store adapter interface.
//!
//! The platform's CRUD layer owns groups and memberships; the gateway reads
//! them through this trait and writes only what its own actions produce:
//! group messages, bans and removals. The store is the sole source of truth
//! for membership, roles and ban flags — rosters never stand in for it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::backend::error::StoreError;
use crate::shared::rooms::{Group, GroupMembership, GroupMessage};

/// A membership mutation requested through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    /// Set the banned flag; the row is kept for audit.
    Ban,
    /// Drop the membership row entirely.
    Remove,
}

#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, StoreError>;

    async fn find_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMembership>, StoreError>;

    async fn list_members(&self, group_id: Uuid)
        -> Result<Vec<GroupMembership>, StoreError>;

    /// Persist a group message and increment the group's message counter.
    async fn append_message(&self, message: &GroupMessage) -> Result<(), StoreError>;

    async fn message(
        &self,
        group_id: Uuid,
        message_id: Uuid,
    ) -> Result<Option<GroupMessage>, StoreError>;

    /// Page backwards through room history; same cursor semantics as the
    /// conversation store.
    async fn list_messages(
        &self,
        group_id: Uuid,
        before: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<GroupMessage>, StoreError>;

    async fn delete_message(
        &self,
        group_id: Uuid,
        message_id: Uuid,
    ) -> Result<(), StoreError>;

    async fn update_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        change: MembershipChange,
    ) -> Result<(), StoreError>;
}

#[derive(Default)]
struct MemoryState {
    groups: HashMap<Uuid, Group>,
    memberships: HashMap<(Uuid, Uuid), GroupMembership>,
    messages: HashMap<Uuid, GroupMessage>,
}

/// In-memory group store: development fallback and test fake.
#[derive(Default)]
pub struct MemoryGroupStore {
    state: Mutex<MemoryState>,
    failing: AtomicBool,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Seed a group (normally the platform's CRUD layer creates these).
    pub fn insert_group(&self, group: Group) {
        self.state.lock().unwrap().groups.insert(group.id, group);
    }

    /// Seed a membership row.
    pub fn insert_membership(&self, membership: GroupMembership) {
        self.state
            .lock()
            .unwrap()
            .memberships
            .insert((membership.group_id, membership.user_id), membership);
    }

    /// Seed a message directly, bypassing the counter. Tests use this to
    /// place messages with arbitrary timestamps.
    pub fn insert_message(&self, message: GroupMessage) {
        self.state
            .lock()
            .unwrap()
            .messages
            .insert(message.id, message);
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
impl GroupStore for MemoryGroupStore {
    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, StoreError> {
        self.check_available()?;
        Ok(self.state.lock().unwrap().groups.get(&group_id).cloned())
    }

    async fn find_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMembership>, StoreError> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .memberships
            .get(&(group_id, user_id))
            .cloned())
    }

    async fn list_members(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<GroupMembership>, StoreError> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .memberships
            .values()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn append_message(&self, message: &GroupMessage) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        if !state.groups.contains_key(&message.group_id) {
            return Err(StoreError::NotFound);
        }
        state.messages.insert(message.id, message.clone());
        if let Some(group) = state.groups.get_mut(&message.group_id) {
            group.message_count += 1;
        }
        Ok(())
    }

    async fn message(
        &self,
        group_id: Uuid,
        message_id: Uuid,
    ) -> Result<Option<GroupMessage>, StoreError> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .messages
            .get(&message_id)
            .filter(|m| m.group_id == group_id)
            .cloned())
    }

    async fn list_messages(
        &self,
        group_id: Uuid,
        before: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<GroupMessage>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        let mut in_group: Vec<GroupMessage> = state
            .messages
            .values()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        in_group.sort_by_key(|m| m.created_at);

        let cutoff = match before {
            Some(cursor_id) => in_group
                .iter()
                .position(|m| m.id == cursor_id)
                .unwrap_or(in_group.len()),
            None => in_group.len(),
        };
        let start = cutoff.saturating_sub(limit as usize);
        Ok(in_group[start..cutoff].to_vec())
    }

    async fn delete_message(
        &self,
        group_id: Uuid,
        message_id: Uuid,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        match state.messages.get(&message_id) {
            Some(m) if m.group_id == group_id => {
                state.messages.remove(&message_id);
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn update_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        change: MembershipChange,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        match change {
            MembershipChange::Ban => match state.memberships.get_mut(&(group_id, user_id)) {
                Some(membership) => {
                    membership.banned = true;
                    Ok(())
                }
                None => Err(StoreError::NotFound),
            },
            MembershipChange::Remove => {
                match state.memberships.remove(&(group_id, user_id)) {
                    Some(_) => Ok(()),
                    None => Err(StoreError::NotFound),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::rooms::GroupRole;

    fn group(owner: Uuid) -> Group {
        Group {
            id: Uuid::new_v4(),
            owner_id: owner,
            visibility: "public".into(),
            message_count: 0,
        }
    }

    #[tokio::test]
    async fn append_increments_the_message_counter() {
        let store = MemoryGroupStore::new();
        let owner = Uuid::new_v4();
        let g = group(owner);
        let group_id = g.id;
        store.insert_group(g);

        store
            .append_message(&GroupMessage::new(group_id, owner, "first"))
            .await
            .unwrap();
        store
            .append_message(&GroupMessage::new(group_id, owner, "second"))
            .await
            .unwrap();

        let stored = store.find_group(group_id).await.unwrap().unwrap();
        assert_eq!(stored.message_count, 2);
    }

    #[tokio::test]
    async fn ban_keeps_the_row_remove_drops_it() {
        let store = MemoryGroupStore::new();
        let group_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        store.insert_membership(GroupMembership::new(group_id, user_id, GroupRole::Member));

        store
            .update_membership(group_id, user_id, MembershipChange::Ban)
            .await
            .unwrap();
        let membership = store
            .find_membership(group_id, user_id)
            .await
            .unwrap()
            .unwrap();
        assert!(membership.banned);

        store
            .update_membership(group_id, user_id, MembershipChange::Remove)
            .await
            .unwrap();
        assert!(store
            .find_membership(group_id, user_id)
            .await
            .unwrap()
            .is_none());
    }
}
