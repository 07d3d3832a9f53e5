// crates/opspilot-core/src/bus.rs
// ============================================================================
// Module: OpsPilot Event Bus Contract
// Description: Publish/subscribe interface consumed through the module
// context; the dispatcher implementation lives in opspilot-bus.
// Purpose: Let modules and the kernel depend on "a bus" abstractly.
// Dependencies: async-trait, crate::event
// ============================================================================

//! ## Overview
//! [`EventBus`] is the contract a module's context hands it: subscribe by
//! event type, publish an envelope, unsubscribe. The concrete dispatcher
//! (subscription-order sequential delivery, handler isolation) lives in
//! `opspilot-bus`; this crate only fixes the shape every implementation and
//! every caller agrees on.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::event::EventEnvelope;

/// Opaque handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Wraps a raw subscription sequence number.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw sequence number.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A handler registered against an event type.
///
/// Handler failures must be isolated by the bus implementation: a panic or
/// logged failure in one handler must never prevent delivery to handlers
/// registered after it, nor propagate to the publisher.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one delivered envelope.
    async fn handle(&self, envelope: &EventEnvelope);
}

/// Publish/subscribe contract for typed event envelopes.
///
/// # Invariants
/// - `publish` delivers to every handler currently registered for the
///   envelope's event type, in subscription order.
/// - Handler invocations within one `publish` call execute sequentially.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Registers `handler` for `event_type`, returning a subscription id.
    async fn subscribe(&self, event_type: &'static str, handler: Arc<dyn EventHandler>) -> SubscriptionId;

    /// Delivers `envelope` to every handler registered for its event type.
    async fn publish(&self, envelope: EventEnvelope);

    /// Removes a single subscription.
    async fn unsubscribe(&self, subscription_id: SubscriptionId);

    /// Removes every subscription, used at shutdown.
    async fn unsubscribe_all(&self);
}
