// crates/opspilot-security/src/lib.rs
// ============================================================================
// Crate: opspilot-security
// Description: External-surface wrapping: bearer/API-key authentication and
// the health aggregator behind the liveness/readiness probes.
// Purpose: Give the runtime's HTTP-facing edge one place to authenticate a
// request and one place to decide whether the system is ready to serve.
// ============================================================================

//! # opspilot-security
//!
//! [`Authenticator`] combines [`token::TokenVerifier`], [`api_key::ApiKeyVerifier`],
//! and [`public_path::PublicPathMatcher`] into the single pass/fail decision
//! the external surface needs per request. [`health::aggregate`] rolls up
//! every module's self-reported [`opspilot_core::Health`] into one
//! [`health::ReadinessReport`].

pub mod api_key;
pub mod authenticator;
pub mod health;
pub mod public_path;
pub mod token;

pub use api_key::ApiKeyVerifier;
pub use authenticator::AuthOutcome;
pub use authenticator::Authenticator;
pub use authenticator::RequestCredentials;
pub use health::aggregate;
pub use health::is_live;
pub use health::ReadinessReport;
pub use public_path::PublicPathMatcher;
pub use token::Claims;
pub use token::Role;
pub use token::TokenError;
pub use token::TokenVerifier;
