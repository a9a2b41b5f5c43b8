//! Trollbox authentication tokens.
//!
//! The forum mints a token for the logged-in user; the widget fetches it and
//! presents it to the gateway, which verifies it against the shared secret.
//! Two formats exist:
//! - structured: url-safe base64 of `{"credentials": {...}, "signature": "..."}`
//! - compact: `signature.timestamp.username`

mod compact;
mod signed;

pub use compact::CompactToken;
pub use signed::SignedCredentials;

use trollbox_types::{Credentials, Role};

/// Tokens older than this are rejected (six hours).
pub const DEFAULT_EXPIRY_SECS: u64 = 3600 * 6;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is empty")]
    Empty,
    #[error("token is not valid url-safe base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("token JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("compact token is malformed: {0}")]
    CompactFormat(&'static str),
    #[error("token has expired")]
    Expired,
    #[error("token signature does not match")]
    BadSignature,
}

/// A decoded token in either format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthToken {
    Structured(SignedCredentials),
    Compact(CompactToken),
}

impl AuthToken {
    /// Decode without verifying the signature.
    ///
    /// Base64url never contains `.`, so a dotted token is taken to be compact.
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Empty);
        }
        if token.contains('.') {
            CompactToken::decode(token).map(AuthToken::Compact)
        } else {
            SignedCredentials::decode(token).map(AuthToken::Structured)
        }
    }

    /// The identity the token vouches for. Compact tokens carry neither uid
    /// nor role, so they map to uid 0 with the `user` role.
    pub fn credentials(&self) -> Credentials {
        match self {
            AuthToken::Structured(signed) => signed.credentials.clone(),
            AuthToken::Compact(compact) => Credentials {
                timestamp: compact.timestamp,
                username: compact.username.clone(),
                uid: 0,
                role: Role::User,
            },
        }
    }

    pub fn verify(&self, secret: &str, now: u64, expiry_secs: u64) -> Result<(), TokenError> {
        match self {
            AuthToken::Structured(signed) => signed.verify(secret, now, expiry_secs),
            AuthToken::Compact(compact) => compact.verify(secret, now, expiry_secs),
        }
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Mint a structured token for `credentials`, ready to hand to a client.
pub fn mint_token(credentials: Credentials, secret: &str) -> Result<String, TokenError> {
    SignedCredentials::sign(credentials, secret)?.encode()
}
