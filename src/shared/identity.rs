//! Authenticated user identity.
//!
//! Identities are owned by the platform's identity issuer; the gateway only
//! reads them out of verified session tokens and never mutates them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated user as presented by the identity issuer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Opaque user id, assigned by the platform
    pub id: Uuid,
    /// Display name shown in presence lists and call invitations
    pub display_name: String,
    /// Avatar reference, if the user has one
    pub avatar_url: Option<String>,
    /// Whether the platform issued this session with admin rights
    #[serde(default)]
    pub admin: bool,
}

impl Identity {
    pub fn new(id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            avatar_url: None,
            admin: false,
        }
    }
}
