//! Direct messaging: conversation store adapters and the messaging service.

pub mod db;
pub mod service;
pub mod store;

pub use db::PgConversationStore;
pub use service::DirectMessagingService;
pub use store::{ConversationStore, MemoryConversationStore};
