//! Group rooms: persisted membership validation, in-memory rosters, and the
//! room manager service.

pub mod db;
pub mod roster;
pub mod service;
pub mod store;

pub use db::PgGroupStore;
pub use roster::RoomRoster;
pub use service::GroupRoomManager;
pub use store::{GroupStore, MembershipChange, MemoryGroupStore};
