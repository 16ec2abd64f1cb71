//! Bearer access tokens (HS256 JWTs) accepted by the hub.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Role that may originate notifications over REST.
pub const ADMIN_ROLE: &str = "admin";

/// Default lifetime of tokens minted by [`mint_access_token`].
pub const ACCESS_TOKEN_TTL_SECS: i64 = 3600;

/// Claims carried by a storefront access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id. Targets `User(..)` broadcasts.
    pub sub: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: &str, roles: &[&str], ttl_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            iss: None,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ttl_secs)).timestamp(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Sign `claims` with the shared secret.
pub fn encode_claims(claims: &Claims, secret: &str) -> Result<String, ApiError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!(?e, "failed to sign access token");
        ApiError::internal("Failed to sign token")
    })
}

/// Mint a token for `user_id` with `roles`, valid for [`ACCESS_TOKEN_TTL_SECS`].
pub fn mint_access_token(
    secret: &str,
    issuer: Option<&str>,
    user_id: &str,
    roles: &[&str],
) -> Result<String, ApiError> {
    let mut claims = Claims::new(user_id, roles, ACCESS_TOKEN_TTL_SECS);
    claims.iss = issuer.map(String::from);
    encode_claims(&claims, secret)
}

/// Validate signature, expiry and (when configured) issuer.
pub fn validate_access_token(
    token: &str,
    secret: &str,
    issuer: Option<&str>,
) -> Result<Claims, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    if let Some(issuer) = issuer {
        validation.set_issuer(&[issuer]);
    }

    jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(?e, "access token validation failed");
            ApiError::unauthorized("Invalid or expired token")
        })
}
