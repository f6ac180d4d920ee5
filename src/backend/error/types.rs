//! Error taxonomy for gateway actions.
//!
//! Every inbound frame resolves to either a success event or exactly one of
//! these variants. Authorization and validation failures are returned to the
//! originating caller only and never produce a broadcast; persistence
//! failures abort the whole operation before any broadcast is emitted.

use thiserror::Error;

/// Failure of a single gateway action.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Bad, missing or expired credential. Terminates the connection attempt.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Authenticated but not authorized for this specific action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed request, e.g. a conversation with oneself.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Call signaling only: the callee has no live connection.
    #[error("target is offline")]
    TargetOffline,

    /// External store timeout or transient failure. Safe to retry the whole
    /// operation: no partial state was committed.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Stable machine-readable code carried in the wire error frame.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Unauthenticated(_) => "unauthenticated",
            GatewayError::Forbidden(_) => "forbidden",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::InvalidArgument(_) => "invalid_argument",
            GatewayError::TargetOffline => "target_offline",
            GatewayError::Unavailable(_) => "unavailable",
        }
    }

    /// Whether the connection should be closed after reporting this error.
    ///
    /// Only authentication failures terminate the connection; everything
    /// else is a per-action result.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::Unauthenticated(_))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Failure inside a persistence adapter.
///
/// Adapters collapse driver-level detail into these two cases; the cause is
/// logged at the adapter, not carried to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => GatewayError::NotFound("record not found".into()),
            StoreError::Unavailable(message) => {
                tracing::error!(%message, "store operation failed");
                GatewayError::Unavailable("storage backend unavailable".into())
            }
        }
    }
}
