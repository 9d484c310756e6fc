use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// JWT Claims structure.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Owner ID on the social platform
    pub handle: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub exp: usize, // Expiration timestamp
}

/// Sign a token for `owner_id`, valid for `ttl`.
pub fn sign(
    secret: &str,
    owner_id: &str,
    handle: &str,
    permissions: &[&str],
    ttl: Duration,
) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(ttl)
        .context("token expiry overflows")?
        .timestamp();

    let claims = Claims {
        sub: owner_id.to_owned(),
        handle: handle.to_owned(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        exp: expiration as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Verify and decode a JWT token.
pub fn verify(secret: &str, token: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}
