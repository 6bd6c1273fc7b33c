//! Per-process session token.
//!
//! Clients must present this token as the first message of a session. It is
//! generated once at startup and never leaves the process except through the
//! transport layer that hands it to authenticated clients.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use constant_time_eq::constant_time_eq;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;

/// Error type for token generation.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("could not generate token: {0}")]
    GenerationFailed(String),
}

/// Random token, 256 bits of entropy, URL-safe base64 without padding.
#[derive(Clone)]
pub struct SessionToken {
    value: String,
}

impl SessionToken {
    /// Number of random bytes behind a token.
    pub const ENTROPY_BYTES: usize = 32;

    /// Generate a fresh token from the OS RNG.
    pub fn generate() -> Result<Self, TokenError> {
        let mut bytes = [0u8; Self::ENTROPY_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| TokenError::GenerationFailed(e.to_string()))?;

        Ok(Self {
            value: URL_SAFE_NO_PAD.encode(bytes),
        })
    }

    /// Wrap an existing token value.
    pub fn from_value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Get the token value.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Constant-time comparison against a presented token.
    ///
    /// The length comparison and the byte comparison both always execute: the
    /// candidate is fitted to the expected length first, so a length mismatch
    /// takes the same path as a content mismatch.
    pub fn verify(&self, candidate: &str) -> bool {
        let expected = self.value.as_bytes();
        let presented = candidate.as_bytes();

        let mut fitted = vec![0u8; expected.len()];
        let overlap = presented.len().min(expected.len());
        fitted[..overlap].copy_from_slice(&presented[..overlap]);

        let lengths_match = constant_time_eq(
            &(presented.len() as u64).to_le_bytes(),
            &(expected.len() as u64).to_le_bytes(),
        );
        let bytes_match = constant_time_eq(&fitted, expected);

        lengths_match & bytes_match
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_url_safe() {
        let token = SessionToken::generate().unwrap();
        // 32 bytes -> 43 base64 characters without padding
        assert_eq!(token.as_str().len(), 43);
        assert!(token
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(token.as_str(), SessionToken::generate().unwrap().as_str());
    }

    #[test]
    fn test_verify_exact_match() {
        let token = SessionToken::from_value("s3cret-token");
        assert!(token.verify("s3cret-token"));
    }

    #[test]
    fn test_verify_rejects_wrong_content() {
        let token = SessionToken::from_value("s3cret-token");
        assert!(!token.verify("s3cret-tokeN"));
    }

    #[test]
    fn test_verify_rejects_prefix_and_extension() {
        let token = SessionToken::from_value("s3cret-token");
        assert!(!token.verify("s3cret"));
        assert!(!token.verify("s3cret-token-and-more"));
        assert!(!token.verify(""));
    }

    #[test]
    fn test_debug_hides_value() {
        let token = SessionToken::from_value("s3cret-token");
        assert!(!format!("{:?}", token).contains("s3cret"));
    }
}
