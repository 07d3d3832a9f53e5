// crates/opspilot-detect/src/lib.rs
// ============================================================================
// Crate: opspilot-detect
// Description: Threshold detection, the shared rate limiter, and retry with
// backoff.
// Purpose: Turn raw telemetry lines into incidents, and give the rest of the
// runtime shared admission control and retry primitives.
// ============================================================================

//! # opspilot-detect
//!
//! [`ThresholdDetector`] is the pluggable [`opspilot_core::Module`] that
//! watches `log.ingested` events for sustained regex-matched breaches.
//! [`SlidingWindowRateLimiter`] and [`retry_with_backoff`] are standalone
//! primitives the detector (and other modules, e.g. connectors and
//! notifiers) share rather than each hand-rolling their own.

pub mod rate_limiter;
pub mod retry;
pub mod threshold;

pub use rate_limiter::RateLimitOutcome;
pub use rate_limiter::SlidingWindowRateLimiter;
pub use retry::retry_with_backoff;
pub use retry::RetryPolicy;
pub use threshold::RuleStats;
pub use threshold::ThresholdDetector;
