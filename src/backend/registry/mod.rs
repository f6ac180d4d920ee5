//! Connection registry: the live mapping from identity to connection handles.
//!
//! One user may be connected from several devices at once, so the registry
//! keeps `Identity -> { connection handle -> outbound channel }` and treats a
//! user as online iff that set is non-empty. Presence transitions are edge
//! triggered: `identity:online` fires only when the first handle registers
//! and `identity:offline` only when the last one goes away, never on the
//! intermediate disconnects of a multi-device user.
//!
//! The registry is created once at server start and injected into every
//! service; no other code touches the connection map directly. It holds no
//! persistent state and performs no I/O beyond pushing events into the
//! per-connection channels.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::shared::{Identity, ServerEvent};

/// Outbound channel of one live connection. The socket's write task drains
/// the receiving end.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// One live transport-level connection (one device/tab).
struct Handle {
    sender: EventSender,
    #[allow(dead_code)]
    connected_at: DateTime<Utc>,
}

/// All live connections of one identity.
struct Presence {
    identity: Identity,
    handles: HashMap<Uuid, Handle>,
}

#[derive(Default)]
struct RegistryInner {
    presences: HashMap<Uuid, Presence>,
    /// Reverse index: connection handle -> owning user.
    conn_owner: HashMap<Uuid, Uuid>,
}

impl RegistryInner {
    /// Push an event to every handle of every user except `except_user`.
    fn broadcast_others(&self, except_user: Uuid, event: &ServerEvent) {
        for (user_id, presence) in &self.presences {
            if *user_id == except_user {
                continue;
            }
            for handle in presence.handles.values() {
                let _ = handle.sender.send(event.clone());
            }
        }
    }
}

/// Registry of currently connected users.
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Add a handle to the identity's connection set.
    ///
    /// If this is the identity's first handle, `identity:online` is emitted
    /// to every other registered connection.
    pub async fn register(&self, identity: Identity, conn_id: Uuid, sender: EventSender) {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let user_id = identity.id;

        let presence = inner
            .presences
            .entry(user_id)
            .or_insert_with(|| Presence {
                identity: identity.clone(),
                handles: HashMap::new(),
            });
        let came_online = presence.handles.is_empty();
        presence.handles.insert(conn_id, Handle {
            sender,
            connected_at: Utc::now(),
        });
        inner.conn_owner.insert(conn_id, user_id);

        tracing::debug!(user = %user_id, conn = %conn_id, came_online, "connection registered");

        if came_online {
            inner.broadcast_others(user_id, &ServerEvent::IdentityOnline { identity });
        }
    }

    /// Remove a handle from its owning identity's set.
    ///
    /// Returns `(user_id, went_offline)` for the owning identity, or `None`
    /// if the handle was not registered. `identity:offline` is emitted to
    /// every remaining connection exactly when the set becomes empty.
    pub async fn unregister(&self, conn_id: Uuid) -> Option<(Uuid, bool)> {
        let mut inner = self.inner.write().await;
        let user_id = inner.conn_owner.remove(&conn_id)?;

        let went_offline = match inner.presences.get_mut(&user_id) {
            Some(presence) => {
                presence.handles.remove(&conn_id);
                presence.handles.is_empty()
            }
            None => false,
        };

        tracing::debug!(user = %user_id, conn = %conn_id, went_offline, "connection unregistered");

        if went_offline {
            inner.presences.remove(&user_id);
            inner.broadcast_others(user_id, &ServerEvent::IdentityOffline { user_id });
        }

        Some((user_id, went_offline))
    }

    /// Whether the identity has at least one live connection.
    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.read().await.presences.contains_key(&user_id)
    }

    /// Best-effort delivery to every registered handle of `user_id` (device
    /// fan-out). Silently no-ops if the identity has no handles; the caller
    /// decides whether absence is an error.
    pub async fn send(&self, user_id: Uuid, event: ServerEvent) {
        self.send_excluding(user_id, None, event).await;
    }

    /// Like [`send`](Self::send) but skips one connection handle, used to
    /// avoid echoing an event back to the device that produced it.
    pub async fn send_excluding(&self, user_id: Uuid, except: Option<Uuid>, event: ServerEvent) {
        let inner = self.inner.read().await;
        let Some(presence) = inner.presences.get(&user_id) else {
            return;
        };
        for (conn_id, handle) in &presence.handles {
            if Some(*conn_id) == except {
                continue;
            }
            let _ = handle.sender.send(event.clone());
        }
    }

    /// The identity record of an online user.
    pub async fn identity(&self, user_id: Uuid) -> Option<Identity> {
        self.inner
            .read()
            .await
            .presences
            .get(&user_id)
            .map(|p| p.identity.clone())
    }

    /// Snapshot of every currently online identity.
    pub async fn list_online(&self) -> Vec<Identity> {
        self.inner
            .read()
            .await
            .presences
            .values()
            .map(|p| p.identity.clone())
            .collect()
    }

    /// Number of live connection handles across all identities.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.conn_owner.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn alice() -> Identity {
        Identity::new(Uuid::new_v4(), "alice")
    }

    async fn connect(
        registry: &ConnectionRegistry,
        identity: &Identity,
    ) -> (Uuid, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = Uuid::new_v4();
        registry.register(identity.clone(), conn_id, tx).await;
        (conn_id, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn online_iff_connection_set_non_empty() {
        let registry = ConnectionRegistry::new();
        let user = alice();

        assert!(!registry.is_online(user.id).await);
        let (conn, _rx) = connect(&registry, &user).await;
        assert!(registry.is_online(user.id).await);

        registry.unregister(conn).await;
        assert!(!registry.is_online(user.id).await);
    }

    #[tokio::test]
    async fn second_device_does_not_re_announce_online() {
        let registry = ConnectionRegistry::new();
        let user = alice();
        let observer = Identity::new(Uuid::new_v4(), "bob");

        let (_oc, mut observer_rx) = connect(&registry, &observer).await;

        let (_c1, _rx1) = connect(&registry, &user).await;
        let (_c2, _rx2) = connect(&registry, &user).await;

        let online_events = drain(&mut observer_rx)
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::IdentityOnline { identity } if identity.id == user.id))
            .count();
        assert_eq!(online_events, 1);
    }

    #[tokio::test]
    async fn offline_fires_once_when_last_device_disconnects() {
        let registry = ConnectionRegistry::new();
        let user = alice();
        let observer = Identity::new(Uuid::new_v4(), "bob");

        let (_oc, mut observer_rx) = connect(&registry, &observer).await;
        let (c1, _rx1) = connect(&registry, &user).await;
        let (c2, _rx2) = connect(&registry, &user).await;
        drain(&mut observer_rx);

        let (_, went_offline) = registry.unregister(c1).await.unwrap();
        assert!(!went_offline);
        assert!(registry.is_online(user.id).await);
        assert!(drain(&mut observer_rx).is_empty());

        let (_, went_offline) = registry.unregister(c2).await.unwrap();
        assert!(went_offline);

        let offline_events = drain(&mut observer_rx)
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::IdentityOffline { user_id } if *user_id == user.id))
            .count();
        assert_eq!(offline_events, 1);
    }

    #[tokio::test]
    async fn send_fans_out_to_every_device() {
        let registry = ConnectionRegistry::new();
        let user = alice();
        let (_c1, mut rx1) = connect(&registry, &user).await;
        let (_c2, mut rx2) = connect(&registry, &user).await;

        registry
            .send(user.id, ServerEvent::IdentityOffline { user_id: user.id })
            .await;

        assert_eq!(drain(&mut rx1).len(), 1);
        assert_eq!(drain(&mut rx2).len(), 1);
    }

    #[tokio::test]
    async fn send_excluding_skips_the_origin_device() {
        let registry = ConnectionRegistry::new();
        let user = alice();
        let (c1, mut rx1) = connect(&registry, &user).await;
        let (_c2, mut rx2) = connect(&registry, &user).await;

        registry
            .send_excluding(
                user.id,
                Some(c1),
                ServerEvent::IdentityOffline { user_id: user.id },
            )
            .await;

        assert!(drain(&mut rx1).is_empty());
        assert_eq!(drain(&mut rx2).len(), 1);
    }

    #[tokio::test]
    async fn send_to_absent_identity_is_a_no_op() {
        let registry = ConnectionRegistry::new();
        registry
            .send(Uuid::new_v4(), ServerEvent::IdentityOffline { user_id: Uuid::new_v4() })
            .await;
    }

    #[tokio::test]
    async fn list_online_reflects_the_registry() {
        let registry = ConnectionRegistry::new();
        let a = alice();
        let b = Identity::new(Uuid::new_v4(), "bob");
        let (_ca, _rxa) = connect(&registry, &a).await;
        let (_cb, _rxb) = connect(&registry, &b).await;

        let online = registry.list_online().await;
        assert_eq!(online.len(), 2);
        assert!(online.iter().any(|i| i.id == a.id));
        assert!(online.iter().any(|i| i.id == b.id));
        assert_eq!(registry.connection_count().await, 2);
    }
}
