//! Connection authentication: an HS256 JWT carried in the `token` query
//! parameter, whose `user_id` claim names the connecting user. Token
//! issuance lives in the external account service.

use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;

use tandem_protocol::UserId;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Deserialize)]
struct Claims {
    user_id: UserId,
    #[allow(dead_code)]
    exp: u64,
}

/// Validate the token (signature + expiry) and extract the user id.
pub fn verify(token: &str, secret: &str) -> Result<UserId, AuthError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims.user_id)
}

/// Authenticate from an optional `token` query value.
pub fn authenticate(token: Option<&str>, secret: &str) -> Result<UserId, AuthError> {
    verify(token.ok_or(AuthError::MissingToken)?, secret)
}
