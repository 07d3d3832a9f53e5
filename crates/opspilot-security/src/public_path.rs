// crates/opspilot-security/src/public_path.rs
// ============================================================================
// Module: Public Path Matcher
// Description: Exact and prefix matching for paths that skip authentication.
// Purpose: Let liveness/readiness probes and other unauthenticated endpoints
// bypass the bearer/API-key gate without a full ACL engine.
// ============================================================================

//! ## Overview
//! A public path entry is either an exact string or a `*`-suffixed prefix
//! (`/health/*` matches `/health/live` and `/health/ready` but not
//! `/health`). [`PublicPathMatcher`] checks a candidate path against both
//! kinds in one pass.

/// Matches request paths against a configured set of exact strings and
/// `*`-suffixed prefixes that skip authentication entirely.
pub struct PublicPathMatcher {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl PublicPathMatcher {
    /// Builds a matcher from a mixed list of exact paths and `*`-suffixed
    /// prefix patterns.
    #[must_use]
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut exact = Vec::new();
        let mut prefixes = Vec::new();
        for pattern in patterns {
            let pattern = pattern.into();
            if let Some(prefix) = pattern.strip_suffix('*') {
                prefixes.push(prefix.to_string());
            } else {
                exact.push(pattern);
            }
        }
        Self { exact, prefixes }
    }

    /// Returns true if `path` is covered by an exact entry or a prefix
    /// pattern.
    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        self.exact.iter().any(|entry| entry == path) || self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::PublicPathMatcher;

    #[test]
    fn matches_an_exact_path() {
        let matcher = PublicPathMatcher::new(["/healthz"]);
        assert!(matcher.is_public("/healthz"));
        assert!(!matcher.is_public("/healthz/extra"));
    }

    #[test]
    fn matches_a_prefix_pattern() {
        let matcher = PublicPathMatcher::new(["/health/*"]);
        assert!(matcher.is_public("/health/live"));
        assert!(matcher.is_public("/health/ready"));
        assert!(!matcher.is_public("/health"));
    }

    #[test]
    fn rejects_unlisted_paths() {
        let matcher = PublicPathMatcher::new(["/healthz", "/metrics/*"]);
        assert!(!matcher.is_public("/api/incidents"));
    }
}
