//! Types shared between the gateway and its clients.
//!
//! Everything in this module crosses the wire: identities, conversation and
//! room records, and the protocol frames themselves. Server-only state (the
//! connection registry, room rosters) lives under `backend`.

pub mod identity;
pub mod messaging;
pub mod protocol;
pub mod rooms;

pub use identity::Identity;
pub use messaging::{
    canonical_pair, Conversation, ConversationSummary, DirectMessage, MediaAttachment,
};
pub use protocol::{ClientFrame, ServerEvent};
pub use rooms::{Group, GroupMembership, GroupMessage, GroupRole};
