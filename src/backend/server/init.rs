//! Server initialization.
//!
//! Builds the application in dependency order: registry first, then the
//! store adapters (PostgreSQL when configured and reachable, in-memory
//! otherwise), the services on top, and finally the router.

use std::sync::Arc;

use axum::Router;

use crate::backend::auth::{IdentityIssuer, JwtIssuer};
use crate::backend::calls::CallSignalingRelay;
use crate::backend::messaging::{
    ConversationStore, DirectMessagingService, MemoryConversationStore, PgConversationStore,
};
use crate::backend::registry::ConnectionRegistry;
use crate::backend::rooms::{GroupRoomManager, GroupStore, MemoryGroupStore, PgGroupStore};
use crate::backend::routes::router::create_router;
use crate::backend::server::config::{load_database, GatewayConfig};
use crate::backend::server::state::AppState;

/// Create and wire the Axum application.
pub async fn create_app(config: GatewayConfig) -> Router {
    tracing::info!("initializing presage gateway");

    let config = Arc::new(config);
    let registry = Arc::new(ConnectionRegistry::new());

    let db_pool = load_database(&config).await;
    let (conversations, groups): (Arc<dyn ConversationStore>, Arc<dyn GroupStore>) =
        match db_pool {
            Some(pool) => (
                Arc::new(PgConversationStore::new(pool.clone())),
                Arc::new(PgGroupStore::new(pool)),
            ),
            None => (
                Arc::new(MemoryConversationStore::new()),
                Arc::new(MemoryGroupStore::new()),
            ),
        };

    let messaging = Arc::new(DirectMessagingService::new(
        conversations,
        registry.clone(),
        config.store_timeout,
    ));
    let rooms = Arc::new(GroupRoomManager::new(
        groups,
        registry.clone(),
        config.store_timeout,
        config.delete_grace,
    ));
    let calls = Arc::new(CallSignalingRelay::new(registry.clone()));
    let issuer: Arc<dyn IdentityIssuer> = Arc::new(JwtIssuer::new(config.jwt_secret.clone()));

    let state = AppState {
        config,
        registry,
        messaging,
        rooms,
        calls,
        issuer,
    };

    tracing::info!("services wired, building router");
    create_router(state)
}
