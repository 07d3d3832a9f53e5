// crates/opspilot-bus/src/lib.rs
// ============================================================================
// Crate: opspilot-bus
// Description: In-process publish/subscribe dispatcher with subscription-
// ordered, sequential delivery and handler isolation.
// Purpose: Implement opspilot_core::EventBus for the composition root to
// hand to every module's context.
// Dependencies: opspilot-core, tokio::sync::Mutex
// ============================================================================

//! # opspilot-bus
//!
//! [`InProcessBus`] delivers each published envelope to every handler
//! currently registered for its event type, in the order those handlers
//! subscribed. Delivery is sequential: the next handler only runs once the
//! previous one's `handle` future resolves. A handler that panics is
//! isolated — the bus catches it, logs it, and continues to the next
//! handler — per the event bus's "handler exceptions do not propagate"
//! contract.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use opspilot_core::EventBus;
use opspilot_core::EventEnvelope;
use opspilot_core::EventHandler;
use opspilot_core::Field;
use opspilot_core::LogLevel;
use opspilot_core::Logger;
use opspilot_core::StderrLogger;
use opspilot_core::SubscriptionId;
use tokio::sync::Mutex;

type Registrations = HashMap<&'static str, Vec<(SubscriptionId, Arc<dyn EventHandler>)>>;

/// Sequential, subscription-ordered in-process event bus.
pub struct InProcessBus {
    registrations: Mutex<Registrations>,
    next_id: AtomicU64,
    logger: Arc<dyn Logger>,
}

impl InProcessBus {
    /// Creates an empty bus logging handler failures through `logger`.
    #[must_use]
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            registrations: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            logger,
        }
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new(Arc::new(StderrLogger))
    }
}

#[async_trait]
impl EventBus for InProcessBus {
    async fn subscribe(&self, event_type: &'static str, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut registrations = self.registrations.lock().await;
        registrations.entry(event_type).or_default().push((id, handler));
        id
    }

    async fn publish(&self, envelope: EventEnvelope) {
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let registrations = self.registrations.lock().await;
            registrations.get(envelope.event_type()).map(|entries| entries.iter().map(|(_, handler)| Arc::clone(handler)).collect()).unwrap_or_default()
        };
        for handler in handlers {
            let envelope = envelope.clone();
            let handler = Arc::clone(&handler);
            let outcome = tokio::spawn(async move { handler.handle(&envelope).await }).await;
            if let Err(join_error) = outcome {
                self.logger.log(
                    LogLevel::Error,
                    "opspilot-bus",
                    "event handler panicked",
                    &[Field::new("event_type", envelope.event_type()), Field::new("error", join_error)],
                );
            }
        }
    }

    async fn unsubscribe(&self, subscription_id: SubscriptionId) {
        let mut registrations = self.registrations.lock().await;
        for entries in registrations.values_mut() {
            entries.retain(|(id, _)| *id != subscription_id);
        }
    }

    async fn unsubscribe_all(&self) {
        let mut registrations = self.registrations.lock().await;
        registrations.clear();
    }
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

    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use opspilot_core::Event;
    use opspilot_core::EventBus;
    use opspilot_core::EventEnvelope;
    use opspilot_core::EventHandler;
    use opspilot_core::ModuleId;
    use opspilot_core::ModuleLifecycle;

    use super::InProcessBus;

    struct RecordingHandler {
        order: Arc<StdMutex<Vec<usize>>>,
        tag: usize,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, _envelope: &EventEnvelope) {
            self.order.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(self.tag);
        }
    }

    struct PanickingHandler;

    #[async_trait]
    impl EventHandler for PanickingHandler {
        async fn handle(&self, _envelope: &EventEnvelope) {
            panic!("boom");
        }
    }

    fn lifecycle_envelope() -> EventEnvelope {
        EventEnvelope::new(
            Event::ModuleLifecycle(ModuleLifecycle {
                module_id: ModuleId::new("kernel"),
                state: "running".into(),
                error: None,
            }),
            ModuleId::new("kernel"),
            0,
        )
    }

    #[tokio::test]
    async fn handlers_are_invoked_in_subscription_order() {
        let bus = InProcessBus::default();
        let order = Arc::new(StdMutex::new(Vec::new()));
        bus.subscribe("module.lifecycle", Arc::new(RecordingHandler { order: Arc::clone(&order), tag: 1 })).await;
        bus.subscribe("module.lifecycle", Arc::new(RecordingHandler { order: Arc::clone(&order), tag: 2 })).await;
        bus.publish(lifecycle_envelope()).await;
        assert_eq!(*order.lock().unwrap_or_else(std::sync::PoisonError::into_inner), vec![1, 2]);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_block_later_handlers() {
        let bus = InProcessBus::default();
        let called = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(StdMutex::new(Vec::new()));
        bus.subscribe("module.lifecycle", Arc::new(PanickingHandler)).await;
        bus.subscribe("module.lifecycle", Arc::new(RecordingHandler { order: Arc::clone(&order), tag: 9 })).await;
        bus.publish(lifecycle_envelope()).await;
        called.fetch_add(1, Ordering::Relaxed);
        assert_eq!(*order.lock().unwrap_or_else(std::sync::PoisonError::into_inner), vec![9]);
    }

    #[tokio::test]
    async fn unsubscribe_all_clears_every_registration() {
        let bus = InProcessBus::default();
        let order = Arc::new(StdMutex::new(Vec::new()));
        bus.subscribe("module.lifecycle", Arc::new(RecordingHandler { order: Arc::clone(&order), tag: 1 })).await;
        bus.unsubscribe_all().await;
        bus.publish(lifecycle_envelope()).await;
        assert!(order.lock().unwrap_or_else(std::sync::PoisonError::into_inner).is_empty());
    }
}
