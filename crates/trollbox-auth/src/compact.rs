use sha2::{Digest, Sha256};

use crate::TokenError;

const SIGNATURE_HEX_LEN: usize = 64;

/// Compact token: `sha256_hex(timestamp + "." + username + secret) + "." +
/// timestamp + "." + username`.
///
/// Carries no uid or role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactToken {
    pub signature: String,
    pub timestamp: u64,
    pub username: String,
}

impl CompactToken {
    pub fn sign(timestamp: u64, username: impl Into<String>, secret: &str) -> Self {
        let username = username.into();
        let signature = Self::compute_signature(timestamp, &username, secret);
        Self {
            signature,
            timestamp,
            username,
        }
    }

    pub fn compute_signature(timestamp: u64, username: &str, secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}.{}", timestamp, username).as_bytes());
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn encode(&self) -> String {
        format!("{}.{}.{}", self.signature, self.timestamp, self.username)
    }

    /// Parse without verifying. The username is everything after the second
    /// dot, so it may contain dots itself.
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        let mut parts = token.trim().splitn(3, '.');
        let signature = parts.next().unwrap_or_default();
        let timestamp = parts.next().ok_or(TokenError::CompactFormat("missing timestamp"))?;
        let username = parts.next().ok_or(TokenError::CompactFormat("missing username"))?;

        if signature.len() != SIGNATURE_HEX_LEN || !signature.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TokenError::CompactFormat("signature is not a sha256 hex digest"));
        }
        let timestamp = timestamp
            .parse()
            .map_err(|_| TokenError::CompactFormat("timestamp is not an integer"))?;
        if username.is_empty() {
            return Err(TokenError::CompactFormat("empty username"));
        }

        Ok(Self {
            signature: signature.to_ascii_lowercase(),
            timestamp,
            username: username.to_string(),
        })
    }

    pub fn verify(&self, secret: &str, now: u64, expiry_secs: u64) -> Result<(), TokenError> {
        if now.saturating_sub(self.timestamp) > expiry_secs {
            return Err(TokenError::Expired);
        }
        if Self::compute_signature(self.timestamp, &self.username, secret) != self.signature {
            return Err(TokenError::BadSignature);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_token_verifies() {
        let token = CompactToken::sign(1_000, "alice", "s3cret");
        let parsed = CompactToken::decode(&token.encode()).unwrap();
        assert_eq!(parsed, token);
        assert!(parsed.verify("s3cret", 1_010, 60).is_ok());
        assert!(matches!(parsed.verify("nope", 1_010, 60), Err(TokenError::BadSignature)));
        assert!(matches!(parsed.verify("s3cret", 2_000, 60), Err(TokenError::Expired)));
    }

    #[test]
    fn username_may_contain_dots() {
        let token = CompactToken::sign(5, "j.r.r.tolkien", "k");
        let parsed = CompactToken::decode(&token.encode()).unwrap();
        assert_eq!(parsed.username, "j.r.r.tolkien");
        assert!(parsed.verify("k", 5, 60).is_ok());
    }

    #[test]
    fn rejects_malformed_compact_tokens() {
        assert!(CompactToken::decode("abc.1.alice").is_err());
        let sig = "a".repeat(64);
        assert!(CompactToken::decode(&format!("{}.notanumber.alice", sig)).is_err());
        assert!(CompactToken::decode(&format!("{}.12", sig)).is_err());
        assert!(CompactToken::decode(&format!("{}.12.", sig)).is_err());
    }
}
