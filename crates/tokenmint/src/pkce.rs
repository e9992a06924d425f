//! RFC 7636 Proof Key for Code Exchange.
//!
//! The verifier is 22 random bytes rendered as lowercase hex (44 characters),
//! which keeps it inside the 43..=128 character window RFC 7636 §4.1 allows.
//! The challenge method is always `S256`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// A verifier and its matching challenge, generated together.
#[derive(Clone, veil::Redact)]
pub struct PkcePair {
    #[redact]
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    #[must_use]
    pub fn generate() -> Self {
        let verifier = verifier();
        let challenge = challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// Generate a high-entropy code verifier.
#[must_use]
pub fn verifier() -> String {
    let mut bytes = [0u8; 22];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// The `S256` challenge for a verifier: base64url-encoded (unpadded) SHA-256
/// of the verifier's UTF-8 bytes.
#[must_use]
pub fn challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn verifier_is_44_lowercase_hex_chars() {
        let v = verifier();
        assert_eq!(v.len(), 44);
        assert!(v.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn verifiers_are_random() {
        assert_ne!(verifier(), verifier());
    }

    #[test]
    fn challenge_matches_rfc7636_appendix_b() {
        assert_eq!(
            challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn challenge_is_unpadded_base64url() {
        // sha256("test") contains bytes that hit `+`/`/` in plain base64.
        assert_eq!(challenge("test"), "n4bQgYhMfWWaL-qgxVrQFaO_TxsrC4Is0V1sFbDwCgg");
    }

    #[test]
    fn pair_is_internally_consistent() {
        let pair = PkcePair::generate();
        assert_eq!(pair.challenge, challenge(&pair.verifier));
    }

    #[test]
    fn debug_redacts_verifier() {
        let pair = PkcePair::generate();
        assert!(!format!("{pair:?}").contains(&pair.verifier));
    }
}
