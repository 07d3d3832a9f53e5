// crates/opspilot-security/src/token.rs
// ============================================================================
// Module: Bearer Token Verification
// Description: HMAC-SHA256-signed bearer token parsing and verification.
// Purpose: Authenticate external callers without a standing session store.
// Dependencies: hmac, sha2, serde_json
// ============================================================================

//! ## Overview
//! A bearer token is `<base64url(claims_json)>.<base64url(hmac_sha256(secret,
//! claims_json))>`. [`TokenVerifier`] recomputes the signature over the
//! claims bytes it actually received and rejects the token unless the
//! digests match, the issuer matches the configured issuer, and the role
//! claim is one of the three recognized roles.

use hmac::Hmac;
use hmac::Mac;
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

/// Caller role asserted by a bearer token's claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full administrative access.
    Admin,
    /// Can approve and execute actions but not administer the system.
    Operator,
    /// Read-only access.
    Viewer,
}

/// Claims carried by a verified bearer token.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Subject (caller identity).
    pub sub: String,
    /// Asserted role.
    pub role: Role,
    /// Unix seconds when the token was issued.
    pub iat: i64,
    /// Token issuer; must match the verifier's configured issuer.
    pub issuer: String,
}

/// Bearer token verification failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// The token did not have the `<claims>.<signature>` shape.
    #[error("malformed bearer token")]
    Malformed,
    /// The claims segment was not valid base64url.
    #[error("claims segment is not valid base64url")]
    InvalidClaimsEncoding,
    /// The signature segment was not valid base64url.
    #[error("signature segment is not valid base64url")]
    InvalidSignatureEncoding,
    /// The claims segment did not decode to the expected JSON shape.
    #[error("claims segment is not valid JSON: {0}")]
    InvalidClaimsJson(String),
    /// The recomputed HMAC did not match the supplied signature.
    #[error("signature verification failed")]
    BadSignature,
    /// The token's issuer did not match the configured issuer.
    #[error("issuer mismatch")]
    IssuerMismatch,
    /// The verifier's configured secret could not key an HMAC-SHA256 instance.
    #[error("verifier secret is not a valid HMAC key")]
    InvalidKey,
}

/// Verifies HMAC-SHA256-signed bearer tokens against a shared secret and a
/// configured issuer.
pub struct TokenVerifier {
    secret: Vec<u8>,
    issuer: String,
}

impl TokenVerifier {
    /// Builds a verifier keyed by `secret` that only accepts tokens whose
    /// `issuer` claim equals `issuer`.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>, issuer: impl Into<String>) -> Self {
        Self { secret: secret.into(), issuer: issuer.into() }
    }

    /// Verifies `token` and returns its claims on success.
    ///
    /// # Errors
    /// Returns [`TokenError`] if the token is malformed, its signature does
    /// not match, or its issuer does not match the configured issuer.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let (claims_segment, signature_segment) = token.split_once('.').ok_or(TokenError::Malformed)?;
        if claims_segment.is_empty() || signature_segment.is_empty() || signature_segment.contains('.') {
            return Err(TokenError::Malformed);
        }
        let claims_bytes = decode_base64url(claims_segment).ok_or(TokenError::InvalidClaimsEncoding)?;
        let signature = decode_base64url(signature_segment).ok_or(TokenError::InvalidSignatureEncoding)?;

        let mut mac = Hmac::<Sha256>::new_from_slice(&self.secret).map_err(|_err| TokenError::InvalidKey)?;
        mac.update(&claims_bytes);
        mac.verify_slice(&signature).map_err(|_err| TokenError::BadSignature)?;

        let claims: Claims = serde_json::from_slice(&claims_bytes).map_err(|err| TokenError::InvalidClaimsJson(err.to_string()))?;
        if claims.issuer != self.issuer {
            return Err(TokenError::IssuerMismatch);
        }
        Ok(claims)
    }
}

/// Decodes a base64url (unpadded) string, rejecting standard-alphabet input.
fn decode_base64url(input: &str) -> Option<Vec<u8>> {
    if input.contains(['+', '/', '=']) {
        return None;
    }
    let mut bytes = Vec::with_capacity(input.len() * 3 / 4 + 3);
    let mut buffer = 0u32;
    let mut bits = 0u32;
    for symbol in input.bytes() {
        let value = match symbol {
            b'A'..=b'Z' => symbol - b'A',
            b'a'..=b'z' => symbol - b'a' + 26,
            b'0'..=b'9' => symbol - b'0' + 52,
            b'-' => 62,
            b'_' => 63,
            _ => return None,
        };
        buffer = (buffer << 6) | u32::from(value);
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            #[allow(clippy::cast_possible_truncation, reason = "only the low 8 bits are kept, shifted out of a 6-bit-per-symbol accumulator")]
            bytes.push((buffer >> bits) as u8);
        }
    }
    Some(bytes)
}

/// Encodes `bytes` as unpadded base64url. Used only by tests to build
/// fixture tokens; production verification only ever decodes.
#[cfg(test)]
fn encode_base64url(bytes: &[u8]) -> String {
    const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
    let mut out = String::with_capacity(bytes.len() * 4 / 3 + 3);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied();
        let b2 = chunk.get(2).copied();
        out.push(ALPHABET[usize::from(b0 >> 2)] as char);
        out.push(ALPHABET[usize::from(((b0 & 0x03) << 4) | (b1.unwrap_or(0) >> 4))] as char);
        if let Some(b1) = b1 {
            out.push(ALPHABET[usize::from(((b1 & 0x0f) << 2) | (b2.unwrap_or(0) >> 6))] as char);
        }
        if let Some(b2) = b2 {
            out.push(ALPHABET[usize::from(b2 & 0x3f)] as char);
        }
    }
    out
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

    use hmac::Hmac;
    use hmac::Mac;
    use sha2::Sha256;

    use super::encode_base64url;
    use super::Role;
    use super::TokenError;
    use super::TokenVerifier;

    fn sign(secret: &[u8], claims_json: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("key of any length is valid");
        mac.update(claims_json.as_bytes());
        let signature = mac.finalize().into_bytes();
        format!("{}.{}", encode_base64url(claims_json.as_bytes()), encode_base64url(&signature))
    }

    #[test]
    fn verifies_a_correctly_signed_token() {
        let secret = b"shared-secret";
        let claims_json = r#"{"sub":"alice","role":"operator","iat":1700000000,"issuer":"opspilot"}"#;
        let token = sign(secret, claims_json);
        let verifier = TokenVerifier::new(secret.to_vec(), "opspilot");
        let claims = verifier.verify(&token).expect("valid token");
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.role, Role::Operator);
    }

    #[test]
    fn rejects_a_tampered_signature() {
        let secret = b"shared-secret";
        let claims_json = r#"{"sub":"alice","role":"admin","iat":1700000000,"issuer":"opspilot"}"#;
        let mut token = sign(secret, claims_json);
        token.push('x');
        let verifier = TokenVerifier::new(secret.to_vec(), "opspilot");
        assert_eq!(verifier.verify(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn rejects_a_mismatched_issuer() {
        let secret = b"shared-secret";
        let claims_json = r#"{"sub":"alice","role":"viewer","iat":1700000000,"issuer":"someone-else"}"#;
        let token = sign(secret, claims_json);
        let verifier = TokenVerifier::new(secret.to_vec(), "opspilot");
        assert_eq!(verifier.verify(&token), Err(TokenError::IssuerMismatch));
    }

    #[test]
    fn rejects_a_malformed_token() {
        let verifier = TokenVerifier::new(b"secret".to_vec(), "opspilot");
        assert_eq!(verifier.verify("no-dot-here"), Err(TokenError::Malformed));
    }
}
