//! Presage - real-time gateway library
//!
//! Presage is the real-time subsystem of the platform: a WebSocket gateway
//! that tracks which users are online (from any number of devices), relays
//! direct and group chat with persistence-then-broadcast ordering, enforces
//! per-room authorization on every event, and forwards WebRTC call
//! signaling between peers.
//!
//! # Module Structure
//!
//! - **`shared`** - Types that cross the wire: identities, conversations,
//!   rooms, and the protocol frames
//! - **`backend`** - The gateway server: connection registry, services,
//!   dispatcher, and Axum wiring
//!
//! The relational conversation/group store and the identity issuer are
//! external collaborators, reached through the traits in
//! `backend::messaging::store`, `backend::rooms::store` and `backend::auth`.

pub mod backend;
pub mod shared;
