//! PKCE (RFC 7636) verifier and challenge handling.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{Result, SmartError};

/// The only challenge method SMART servers are allowed to accept.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

pub const MIN_VERIFIER_LEN: usize = 43;
pub const MAX_VERIFIER_LEN: usize = 128;

/// 96 bytes encode to exactly 128 unpadded Base64 characters.
const VERIFIER_BYTES: usize = 96;

/// PKCE code verifier and challenge pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkce {
    verifier: String,
    challenge: String,
}

impl Pkce {
    /// Generate a fresh pair from a random verifier.
    pub fn generate() -> Self {
        let verifier = generate_verifier();
        let challenge = derive_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    /// Build a pair from an externally supplied verifier.
    pub fn from_verifier(verifier: impl Into<String>) -> Result<Self> {
        let verifier = verifier.into();
        validate_verifier(&verifier)?;
        let challenge = derive_challenge(&verifier);
        Ok(Self {
            verifier,
            challenge,
        })
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub fn method(&self) -> &'static str {
        CODE_CHALLENGE_METHOD
    }
}

/// Generate a 128-character code verifier.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; VERIFIER_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Derive the S256 challenge for a verifier.
pub fn derive_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Check a verifier against the RFC 7636 length and charset rules.
pub fn validate_verifier(verifier: &str) -> Result<()> {
    let len = verifier.chars().count();
    if !(MIN_VERIFIER_LEN..=MAX_VERIFIER_LEN).contains(&len) {
        return Err(SmartError::Validation(format!(
            "code_verifier must be between {} and {} characters, got {}",
            MIN_VERIFIER_LEN, MAX_VERIFIER_LEN, len
        )));
    }

    if let Some(bad) = verifier.chars().find(|c| !is_unreserved(*c)) {
        return Err(SmartError::Validation(format!(
            "code_verifier contains invalid character '{}'",
            bad
        )));
    }

    Ok(())
}

fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_vector() {
        assert_eq!(
            derive_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_generated_verifier_shape() {
        let verifier = generate_verifier();
        assert_eq!(verifier.len(), 128);
        assert!(validate_verifier(&verifier).is_ok());
    }

    #[test]
    fn test_generated_verifiers_are_unique() {
        let a = generate_verifier();
        let b = generate_verifier();
        assert_ne!(a, b);
        assert_ne!(derive_challenge(&a), derive_challenge(&b));
    }

    #[test]
    fn test_challenge_is_deterministic() {
        let verifier = generate_verifier();
        let first = derive_challenge(&verifier);
        assert_eq!(first, derive_challenge(&verifier));
        assert_eq!(first.len(), 43);
    }

    #[test]
    fn test_length_boundaries() {
        assert!(validate_verifier(&"a".repeat(42)).is_err());
        assert!(validate_verifier(&"a".repeat(43)).is_ok());
        assert!(validate_verifier(&"a".repeat(128)).is_ok());
        assert!(validate_verifier(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_length_counts_characters() {
        // 43 characters but 86 bytes
        let err = validate_verifier(&"é".repeat(43)).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("invalid character"));

        let err = validate_verifier(&"é".repeat(30)).unwrap_err();
        assert!(err.to_string().contains("got 30"));
    }

    #[test]
    fn test_rejects_base64_standard_characters() {
        let base = "a".repeat(50);
        for bad in ['+', '/', '='] {
            let verifier = format!("{}{}", base, bad);
            let err = validate_verifier(&verifier).unwrap_err();
            assert!(err.is_validation());
        }
    }

    #[test]
    fn test_accepts_unreserved_punctuation() {
        let verifier = format!("{}-._~", "Az09".repeat(11));
        assert!(validate_verifier(&verifier).is_ok());
    }

    #[test]
    fn test_from_verifier() {
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk").unwrap();
        assert_eq!(pkce.challenge(), "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
        assert_eq!(pkce.method(), "S256");

        assert!(Pkce::from_verifier("too-short").is_err());
    }

    #[test]
    fn test_generate_pair() {
        let pkce = Pkce::generate();
        assert_eq!(pkce.challenge(), derive_challenge(pkce.verifier()));
        assert_ne!(pkce.verifier(), pkce.challenge());
    }
}
