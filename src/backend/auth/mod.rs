//! Connection authentication.
//!
//! The gateway does not own accounts, passwords or signup; it only verifies
//! session tokens minted by the platform's identity issuer. The issuer is
//! modeled as a trait so tests can substitute a fake that accepts canned
//! tokens.

pub mod sessions;

use async_trait::async_trait;

use crate::backend::error::GatewayError;
use crate::shared::Identity;

pub use sessions::{create_token, Claims, JwtIssuer};

/// The identity-issuer collaborator.
///
/// `verify` fails with `Unauthenticated` when the token is missing,
/// malformed, expired, or references an identity the issuer no longer
/// recognizes. Authentication failure terminates the connection attempt and
/// never partially registers a handle.
#[async_trait]
pub trait IdentityIssuer: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, GatewayError>;
}
