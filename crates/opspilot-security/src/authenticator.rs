// crates/opspilot-security/src/authenticator.rs
// ============================================================================
// Module: Request Authenticator
// Description: Combines the bearer token verifier, the API key verifier, and
// the public path matcher into the single decision external callers see.
// Purpose: A request is authenticated if its path is public, or if either
// the bearer token or the API key verifies.
// Dependencies: opspilot-security::{token, api_key, public_path}
// ============================================================================

use crate::api_key::ApiKeyVerifier;
use crate::public_path::PublicPathMatcher;
use crate::token::Claims;
use crate::token::TokenVerifier;

/// Outcome of authenticating one request.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// The path is in the public set; no credential was checked.
    Public,
    /// A bearer token verified successfully.
    Bearer(Claims),
    /// A static API key verified successfully.
    ApiKey,
    /// Neither credential verified, and the path is not public.
    Denied,
}

impl AuthOutcome {
    /// Returns true for every outcome except [`AuthOutcome::Denied`].
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, AuthOutcome::Denied)
    }
}

/// One incoming request's credentials, as lifted from its transport (HTTP
/// headers, in practice) by the caller.
#[derive(Debug, Clone, Default)]
pub struct RequestCredentials<'a> {
    /// Path being requested, checked against the public path matcher first.
    pub path: &'a str,
    /// `Authorization: Bearer <token>` header value, token only (no scheme).
    pub bearer_token: Option<&'a str>,
    /// Static API key header value.
    pub api_key: Option<&'a str>,
}

/// Wraps a [`TokenVerifier`], an [`ApiKeyVerifier`], and a
/// [`PublicPathMatcher`] into the single authentication decision consumed by
/// the external surface.
pub struct Authenticator {
    token_verifier: TokenVerifier,
    api_key_verifier: Option<ApiKeyVerifier>,
    public_paths: PublicPathMatcher,
}

impl Authenticator {
    /// Builds an authenticator. `api_key_verifier` is `None` when no static
    /// API key is configured, in which case API-key auth always fails.
    #[must_use]
    pub fn new(token_verifier: TokenVerifier, api_key_verifier: Option<ApiKeyVerifier>, public_paths: PublicPathMatcher) -> Self {
        Self { token_verifier, api_key_verifier, public_paths }
    }

    /// Authenticates `credentials`, trying the public path set, then the
    /// bearer token, then the static API key.
    #[must_use]
    pub fn authenticate(&self, credentials: &RequestCredentials<'_>) -> AuthOutcome {
        if self.public_paths.is_public(credentials.path) {
            return AuthOutcome::Public;
        }
        if let Some(token) = credentials.bearer_token {
            if let Ok(claims) = self.token_verifier.verify(token) {
                return AuthOutcome::Bearer(claims);
            }
        }
        if let (Some(presented), Some(verifier)) = (credentials.api_key, &self.api_key_verifier) {
            if verifier.verify(presented) {
                return AuthOutcome::ApiKey;
            }
        }
        AuthOutcome::Denied
    }
}

#[cfg(test)]
mod tests {
    use super::Authenticator;
    use super::RequestCredentials;
    use crate::api_key::ApiKeyVerifier;
    use crate::public_path::PublicPathMatcher;
    use crate::token::TokenVerifier;

    fn authenticator() -> Authenticator {
        Authenticator::new(
            TokenVerifier::new(b"secret".to_vec(), "opspilot"),
            Some(ApiKeyVerifier::new("static-key")),
            PublicPathMatcher::new(["/healthz", "/health/*"]),
        )
    }

    #[test]
    fn public_paths_skip_verification_entirely() {
        let auth = authenticator();
        let outcome = auth.authenticate(&RequestCredentials { path: "/health/ready", bearer_token: None, api_key: None });
        assert!(matches!(outcome, super::AuthOutcome::Public));
    }

    #[test]
    fn a_valid_api_key_authenticates_a_non_public_path() {
        let auth = authenticator();
        let outcome = auth.authenticate(&RequestCredentials { path: "/api/incidents", bearer_token: None, api_key: Some("static-key") });
        assert!(outcome.is_authenticated());
    }

    #[test]
    fn an_invalid_bearer_token_falls_through_to_denial_without_an_api_key() {
        let auth = authenticator();
        let outcome = auth.authenticate(&RequestCredentials { path: "/api/incidents", bearer_token: Some("garbage"), api_key: None });
        assert!(!outcome.is_authenticated());
    }
}
