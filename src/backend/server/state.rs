//! Application state.
//!
//! One `AppState` is assembled at startup and handed to the router; every
//! handler and the dispatcher reach the services through it. The connection
//! registry and room rosters inside the services are the only in-memory
//! shared structures, and they are mutated exclusively through their own
//! operations — nothing here reaches into them directly.

use std::sync::Arc;

use crate::backend::auth::IdentityIssuer;
use crate::backend::calls::CallSignalingRelay;
use crate::backend::messaging::DirectMessagingService;
use crate::backend::registry::ConnectionRegistry;
use crate::backend::rooms::GroupRoomManager;
use crate::backend::server::config::GatewayConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub registry: Arc<ConnectionRegistry>,
    pub messaging: Arc<DirectMessagingService>,
    pub rooms: Arc<GroupRoomManager>,
    pub calls: Arc<CallSignalingRelay>,
    pub issuer: Arc<dyn IdentityIssuer>,
}
