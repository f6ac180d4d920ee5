//! Session token verification (JWT).
//!
//! The platform issues HS256 session tokens whose claims carry everything
//! the gateway needs to know about a user: id, display name, avatar and the
//! admin flag. Verifying a token is a purely local operation; the shared
//! secret comes from configuration.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::error::GatewayError;
use crate::shared::Identity;

use super::IdentityIssuer;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Display name
    pub name: String,
    /// Avatar reference, if any
    #[serde(default)]
    pub avatar: Option<String>,
    /// Whether this session carries admin rights
    #[serde(default)]
    pub admin: bool,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at time (Unix timestamp)
    pub iat: u64,
}

/// Create a session token for a user.
///
/// The platform's identity issuer is the production source of tokens; this
/// is kept for local tooling and tests.
pub fn create_token(
    secret: &str,
    identity: &Identity,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    // Token expires in 30 days
    let exp = now + (30 * 24 * 60 * 60);

    let claims = Claims {
        sub: identity.id.to_string(),
        name: identity.display_name.clone(),
        avatar: identity.avatar_url.clone(),
        admin: identity.admin,
        exp,
        iat: now,
    };

    let key = EncodingKey::from_secret(secret.as_ref());
    encode(&Header::default(), &claims, &key)
}

/// Verify and decode a session token against the shared secret.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(secret.as_ref());
    let validation = Validation::default();

    let token_data = decode::<Claims>(token, &key, &validation)?;
    Ok(token_data.claims)
}

/// JWT-backed implementation of the identity-issuer collaborator.
pub struct JwtIssuer {
    secret: String,
}

impl JwtIssuer {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl IdentityIssuer for JwtIssuer {
    async fn verify(&self, token: &str) -> Result<Identity, GatewayError> {
        if token.is_empty() {
            return Err(GatewayError::Unauthenticated("missing token".into()));
        }

        let claims = verify_token(&self.secret, token)
            .map_err(|e| GatewayError::Unauthenticated(format!("invalid token: {e}")))?;

        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| GatewayError::Unauthenticated("invalid user id in token".into()))?;

        Ok(Identity {
            id,
            display_name: claims.name,
            avatar_url: claims.avatar,
            admin: claims.admin,
        })
    }
}
