//! Common test utilities: an in-memory gateway and connection helpers.

use std::sync::Arc;
use std::time::Duration;

use presage::backend::auth::{IdentityIssuer, JwtIssuer};
use presage::backend::calls::CallSignalingRelay;
use presage::backend::gateway::ConnContext;
use presage::backend::messaging::{DirectMessagingService, MemoryConversationStore};
use presage::backend::registry::ConnectionRegistry;
use presage::backend::rooms::{GroupRoomManager, MemoryGroupStore};
use presage::backend::server::{AppState, GatewayConfig};
use presage::shared::{Identity, ServerEvent};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use uuid::Uuid;

pub const TEST_SECRET: &str = "integration-test-secret";

pub struct TestGateway {
    pub state: AppState,
    pub conversations: Arc<MemoryConversationStore>,
    pub groups: Arc<MemoryGroupStore>,
}

/// Build a gateway on in-memory stores, the same wiring `create_app` uses
/// when no database is configured.
pub fn gateway() -> TestGateway {
    let config = Arc::new(GatewayConfig {
        bind_addr: "127.0.0.1".into(),
        port: 0,
        database_url: None,
        jwt_secret: TEST_SECRET.into(),
        auth_deadline: Duration::from_secs(5),
        store_timeout: Duration::from_secs(1),
        delete_grace: Duration::from_secs(300),
    });

    let registry = Arc::new(ConnectionRegistry::new());
    let conversations = Arc::new(MemoryConversationStore::new());
    let groups = Arc::new(MemoryGroupStore::new());

    let messaging = Arc::new(DirectMessagingService::new(
        conversations.clone(),
        registry.clone(),
        config.store_timeout,
    ));
    let rooms = Arc::new(GroupRoomManager::new(
        groups.clone(),
        registry.clone(),
        config.store_timeout,
        config.delete_grace,
    ));
    let calls = Arc::new(CallSignalingRelay::new(registry.clone()));
    let issuer: Arc<dyn IdentityIssuer> = Arc::new(JwtIssuer::new(TEST_SECRET));

    TestGateway {
        state: AppState {
            config,
            registry,
            messaging,
            rooms,
            calls,
            issuer,
        },
        conversations,
        groups,
    }
}

/// Register a live connection for `identity`, as the socket layer does
/// after a successful `connect`.
pub async fn connect(
    state: &AppState,
    identity: &Identity,
) -> (ConnContext, UnboundedReceiver<ServerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let conn_id = Uuid::new_v4();
    state.registry.register(identity.clone(), conn_id, tx).await;
    (
        ConnContext {
            conn_id,
            identity: identity.clone(),
        },
        rx,
    )
}

pub fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn user(name: &str) -> Identity {
    Identity::new(Uuid::new_v4(), name)
}
