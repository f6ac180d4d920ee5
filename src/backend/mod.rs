//! Backend module.
//!
//! Server-side code of the real-time gateway. The gateway is the only
//! stateful, connection-oriented part of the platform: it tracks presence,
//! relays direct and group chat with persistence-then-broadcast ordering,
//! and forwards WebRTC call signaling between peers.
//!
//! # Architecture
//!
//! - **`registry`** - live identity -> connection-handle map (presence)
//! - **`messaging`** - 1:1 conversations: store adapters and service
//! - **`rooms`** - group rooms: membership validation, rosters, service
//! - **`calls`** - stateless WebRTC signaling relay
//! - **`gateway`** - WebSocket lifecycle and frame dispatch
//! - **`auth`** - session-token verification (identity issuer)
//! - **`server`** - configuration, state, application assembly
//! - **`routes`** - HTTP route configuration
//! - **`error`** - error taxonomy and wire conversion
//!
//! The external relational store is the sole source of truth for
//! membership, roles and ban flags; the registry and rosters are presence
//! caches and are never used for authorization.

/// Session-token verification
pub mod auth;

/// WebRTC call-signaling relay
pub mod calls;

/// Error taxonomy and conversions
pub mod error;

/// WebSocket lifecycle and dispatch
pub mod gateway;

/// Direct messaging
pub mod messaging;

/// Connection registry (presence)
pub mod registry;

/// Group rooms
pub mod rooms;

/// HTTP routes
pub mod routes;

/// Server setup and configuration
pub mod server;

/// Re-export commonly used types
pub use error::{GatewayError, StoreError};
pub use registry::ConnectionRegistry;
pub use server::{create_app, AppState, GatewayConfig};
