use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// JWT claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Admin privilege flag
    pub admin: bool,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiration (unix seconds)
    pub exp: i64,
}

/// Verification failure. Deliberately carries no detail: callers must not
/// be able to distinguish an expired token from a forged one.
#[derive(Debug, thiserror::Error)]
#[error("invalid or expired token")]
pub struct TokenError;

/// Issues and verifies signed session tokens.
///
/// Holds keys derived from the configured signing secret, threaded in at
/// construction so multiple instances can be tested with distinct secrets.
/// Verification is pure: no shared mutable state, no storage access.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry: Duration::hours(expiry_hours),
        }
    }

    pub fn issue(&self, username: &str, is_admin: bool) -> Result<String> {
        let now = Utc::now();

        let claims = Claims {
            sub: username.to_string(),
            admin: is_admin,
            iat: now.timestamp(),
            exp: (now + self.expiry).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Token generation failed: {e}"))
    }

    /// Rejects signature mismatch, structural malformation, and past expiry
    /// alike. Expiry is compared against this process's clock, no leeway.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError)
    }
}
