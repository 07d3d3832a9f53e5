// crates/opspilot-security/src/api_key.rs
// ============================================================================
// Module: Static API Key Verification
// Description: Constant-time comparison of a presented key against a
// configured static key.
// Purpose: Authenticate simple machine-to-machine callers without the
// overhead of bearer token issuance.
// Dependencies: hmac, sha2, subtle
// ============================================================================

//! ## Overview
//! Comparing secrets byte-by-byte with `==` leaks timing information about
//! how many leading bytes matched. [`ApiKeyVerifier`] instead normalizes both
//! the configured key and the presented key through an HMAC-SHA256 of a
//! fixed, process-local key (folding variable-length input into a
//! fixed-length digest) and compares the two digests with
//! [`subtle::ConstantTimeEq`].

use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Fixed key used only to normalize inputs to the comparator; it does not
/// need to be secret, since it never leaves the process and both sides of
/// the comparison are folded through it identically.
const NORMALIZATION_KEY: &[u8] = b"opspilot-security/api-key-normalization";

/// Verifies a presented API key against a configured static key in constant
/// time.
pub struct ApiKeyVerifier {
    digest: [u8; 32],
}

impl ApiKeyVerifier {
    /// Builds a verifier for the given configured key.
    #[must_use]
    pub fn new(configured_key: &str) -> Self {
        Self { digest: normalize(configured_key) }
    }

    /// Returns true if `presented_key` matches the configured key.
    #[must_use]
    pub fn verify(&self, presented_key: &str) -> bool {
        let presented_digest = normalize(presented_key);
        presented_digest.ct_eq(&self.digest).into()
    }
}

/// Folds an arbitrary-length key into a fixed-length digest via
/// HMAC-SHA256(`NORMALIZATION_KEY`, key).
#[allow(clippy::expect_used, reason = "HMAC-SHA256 accepts a key of any length; NORMALIZATION_KEY is a fixed constant")]
fn normalize(key: &str) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(NORMALIZATION_KEY).expect("NORMALIZATION_KEY is a valid HMAC-SHA256 key");
    mac.update(key.as_bytes());
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::ApiKeyVerifier;

    #[test]
    fn accepts_the_matching_key() {
        let verifier = ApiKeyVerifier::new("correct-horse-battery-staple");
        assert!(verifier.verify("correct-horse-battery-staple"));
    }

    #[test]
    fn rejects_a_wrong_key() {
        let verifier = ApiKeyVerifier::new("correct-horse-battery-staple");
        assert!(!verifier.verify("wrong-key"));
    }

    #[test]
    fn rejects_a_prefix_of_the_right_key() {
        let verifier = ApiKeyVerifier::new("correct-horse-battery-staple");
        assert!(!verifier.verify("correct-horse"));
    }
}
