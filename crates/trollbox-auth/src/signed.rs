use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use trollbox_types::Credentials;

use crate::TokenError;

/// Structured token body: credentials plus
/// `sha256_hex(json(credentials) + secret)`.
///
/// On the wire this is the JSON object encoded as url-safe base64 without
/// padding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCredentials {
    pub credentials: Credentials,
    pub signature: String,
}

impl SignedCredentials {
    /// Sign `credentials` with the shared secret.
    pub fn sign(credentials: Credentials, secret: &str) -> Result<Self, TokenError> {
        let signature = Self::compute_signature(&credentials, secret)?;
        Ok(Self {
            credentials,
            signature,
        })
    }

    pub fn compute_signature(credentials: &Credentials, secret: &str) -> Result<String, TokenError> {
        let credentials_text = serde_json::to_string(credentials)?;
        let mut hasher = Sha256::new();
        hasher.update(credentials_text.as_bytes());
        hasher.update(secret.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Encode as the opaque token string handed to clients.
    pub fn encode(&self) -> Result<String, TokenError> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode without verifying. Padded input is accepted too.
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        let bytes = URL_SAFE_NO_PAD.decode(token.trim().trim_end_matches('='))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Check the signature against `secret` and that the token is at most
    /// `expiry_secs` old at `now`.
    pub fn verify(&self, secret: &str, now: u64, expiry_secs: u64) -> Result<(), TokenError> {
        if now.saturating_sub(self.credentials.timestamp) > expiry_secs {
            return Err(TokenError::Expired);
        }
        if Self::compute_signature(&self.credentials, secret)? != self.signature {
            return Err(TokenError::BadSignature);
        }
        Ok(())
    }
}
