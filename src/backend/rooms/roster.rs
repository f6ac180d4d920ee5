//! In-memory room rosters.
//!
//! A roster is the set of identities currently connected to a room's live
//! channel. It is a presence view only: rebuilt as users join, discarded on
//! leave or disconnect, and never consulted for authorization (membership
//! and ban state always come from the persisted store).

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;
use uuid::Uuid;

/// Live per-room presence, keyed by group id.
#[derive(Default)]
pub struct RoomRoster {
    rooms: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl RoomRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to a room. Returns `false` if they were already present.
    pub async fn join(&self, group_id: Uuid, user_id: Uuid) -> bool {
        self.rooms
            .write()
            .await
            .entry(group_id)
            .or_default()
            .insert(user_id)
    }

    /// Remove a user from a room, dropping the room when it empties.
    /// Returns `false` if they were not present.
    pub async fn leave(&self, group_id: Uuid, user_id: Uuid) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(&group_id) else {
            return false;
        };
        let was_present = members.remove(&user_id);
        if members.is_empty() {
            rooms.remove(&group_id);
        }
        was_present
    }

    pub async fn contains(&self, group_id: Uuid, user_id: Uuid) -> bool {
        self.rooms
            .read()
            .await
            .get(&group_id)
            .is_some_and(|members| members.contains(&user_id))
    }

    /// Snapshot of a room's member ids.
    pub async fn members(&self, group_id: Uuid) -> Vec<Uuid> {
        self.rooms
            .read()
            .await
            .get(&group_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Remove a user from every room they are in, returning the affected
    /// group ids. Called when the identity's last connection goes away.
    pub async fn remove_everywhere(&self, user_id: Uuid) -> Vec<Uuid> {
        let mut rooms = self.rooms.write().await;
        let mut affected = Vec::new();
        let mut empty = Vec::new();
        for (group_id, members) in rooms.iter_mut() {
            if members.remove(&user_id) {
                affected.push(*group_id);
                if members.is_empty() {
                    empty.push(*group_id);
                }
            }
        }
        for group_id in empty {
            rooms.remove(&group_id);
        }
        affected
    }
}
