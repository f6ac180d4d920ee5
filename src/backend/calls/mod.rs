//! Call-signaling relay.
//!
//! A stateless relay between two identified peers: `offer`, `answer` and
//! `ice-candidate` payloads are forwarded verbatim and never interpreted or
//! persisted. The only liveness logic is on `initiate`, which refuses to
//! ring an offline target with `TargetOffline` instead of contacting it.
//!
//! The call state machine lives at the endpoints
//! (`IDLE -> RINGING -> ACTIVE -> ENDED`); the relay does not track it.
//! Ringing timeouts and single-call exclusivity are client policy.

use std::sync::Arc;

use uuid::Uuid;

use crate::backend::error::GatewayError;
use crate::backend::registry::ConnectionRegistry;
use crate::shared::{Identity, ServerEvent};

pub struct CallSignalingRelay {
    registry: Arc<ConnectionRegistry>,
}

impl CallSignalingRelay {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Ring `target`. Checked against the registry first: an offline target
    /// yields `TargetOffline` and the target observes nothing.
    pub async fn initiate(
        &self,
        caller: &Identity,
        target: Uuid,
    ) -> Result<(), GatewayError> {
        if caller.id == target {
            return Err(GatewayError::invalid_argument("cannot call yourself"));
        }
        if !self.registry.is_online(target).await {
            return Err(GatewayError::TargetOffline);
        }

        tracing::debug!(caller = %caller.id, %target, "call initiated");
        self.registry
            .send(
                target,
                ServerEvent::CallIncoming {
                    from: caller.clone(),
                },
            )
            .await;
        Ok(())
    }

    pub async fn accept(&self, from: Uuid, target: Uuid) {
        self.registry
            .send(target, ServerEvent::CallAccepted { from })
            .await;
    }

    /// Decline an incoming call; the optional reason is forwarded to the
    /// caller untouched.
    pub async fn reject(&self, from: Uuid, target: Uuid, reason: Option<String>) {
        self.registry
            .send(target, ServerEvent::CallRejected { from, reason })
            .await;
    }

    /// Hang up. Symmetric: either peer may send it and the other side is
    /// told.
    pub async fn end(&self, from: Uuid, target: Uuid) {
        tracing::debug!(%from, %target, "call ended");
        self.registry
            .send(target, ServerEvent::CallEnded { from })
            .await;
    }

    pub async fn offer(&self, from: Uuid, target: Uuid, sdp: String) {
        self.registry
            .send(target, ServerEvent::CallOffer { from, sdp })
            .await;
    }

    pub async fn answer(&self, from: Uuid, target: Uuid, sdp: String) {
        self.registry
            .send(target, ServerEvent::CallAnswer { from, sdp })
            .await;
    }

    pub async fn ice_candidate(&self, from: Uuid, target: Uuid, candidate: serde_json::Value) {
        self.registry
            .send(target, ServerEvent::CallIceCandidate { from, candidate })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn relay() -> (CallSignalingRelay, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        (CallSignalingRelay::new(registry.clone()), registry)
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
    async fn offline_target_is_reported_without_ringing_anyone() {
        let (relay, _registry) = relay();
        let caller = Identity::new(Uuid::new_v4(), "alice");

        let err = relay.initiate(&caller, Uuid::new_v4()).await.unwrap_err();
        assert_matches!(err, GatewayError::TargetOffline);
    }

    #[tokio::test]
    async fn initiate_rings_every_device_of_the_callee() {
        let (relay, registry) = relay();
        let caller = Identity::new(Uuid::new_v4(), "alice");
        let callee = Identity::new(Uuid::new_v4(), "bob");
        let (_c1, mut rx1) = connect(&registry, &callee).await;
        let (_c2, mut rx2) = connect(&registry, &callee).await;
        drain(&mut rx1);
        drain(&mut rx2);

        relay.initiate(&caller, callee.id).await.unwrap();

        for rx in [&mut rx1, &mut rx2] {
            assert_matches!(
                drain(rx).as_slice(),
                [ServerEvent::CallIncoming { from }] if from.id == caller.id
            );
        }
    }

    #[tokio::test]
    async fn self_call_is_invalid() {
        let (relay, registry) = relay();
        let caller = Identity::new(Uuid::new_v4(), "alice");
        let (_c, _rx) = connect(&registry, &caller).await;

        let err = relay.initiate(&caller, caller.id).await.unwrap_err();
        assert_matches!(err, GatewayError::InvalidArgument(_));
    }

    #[tokio::test]
    async fn sdp_and_ice_are_relayed_verbatim() {
        let (relay, registry) = relay();
        let alice = Identity::new(Uuid::new_v4(), "alice");
        let bob = Identity::new(Uuid::new_v4(), "bob");
        let (_cb, mut bob_rx) = connect(&registry, &bob).await;
        drain(&mut bob_rx);

        relay
            .offer(alice.id, bob.id, "v=0\r\no=- 42 2 IN IP4 127.0.0.1".into())
            .await;
        let candidate = serde_json::json!({
            "candidate": "candidate:0 1 UDP 2122252543 192.0.2.1 54400 typ host",
            "sdpMLineIndex": 0,
        });
        relay.ice_candidate(alice.id, bob.id, candidate.clone()).await;

        let events = drain(&mut bob_rx);
        assert_matches!(
            &events[0],
            ServerEvent::CallOffer { from, sdp }
                if *from == alice.id && sdp.starts_with("v=0")
        );
        assert_matches!(
            &events[1],
            ServerEvent::CallIceCandidate { candidate: relayed, .. }
                if *relayed == candidate
        );
    }

    #[tokio::test]
    async fn reject_carries_the_reason_and_end_is_symmetric() {
        let (relay, registry) = relay();
        let alice = Identity::new(Uuid::new_v4(), "alice");
        let bob = Identity::new(Uuid::new_v4(), "bob");
        let (_ca, mut alice_rx) = connect(&registry, &alice).await;
        let (_cb, mut bob_rx) = connect(&registry, &bob).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        relay
            .reject(bob.id, alice.id, Some("in a meeting".into()))
            .await;
        assert_matches!(
            drain(&mut alice_rx).as_slice(),
            [ServerEvent::CallRejected { reason: Some(reason), .. }]
                if reason == "in a meeting"
        );

        // Either peer may end; the other side is told.
        relay.end(alice.id, bob.id).await;
        assert_matches!(
            drain(&mut bob_rx).as_slice(),
            [ServerEvent::CallEnded { from }] if *from == alice.id
        );
    }
}
