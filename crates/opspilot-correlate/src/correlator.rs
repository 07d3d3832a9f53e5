// crates/opspilot-correlate/src/correlator.rs
// ============================================================================
// Module: Correlation Engine
// Description: Groups `incident.created` events by token overlap, emitting
// `enrichment.completed` per join and `incident.storm` once a group crosses
// its member-count threshold.
// Purpose: Collapse a burst of related incidents into one correlation group
// instead of paging an operator once per incident.
// Dependencies: opspilot-core, tokio::{sync, time}
// ============================================================================

//! ## Overview
//! [`Correlator`] tokenizes each incoming incident's title and description,
//! compares it against every still-active group via Jaccard similarity, and
//! joins the best-scoring group that clears its effective threshold (the
//! base threshold, scaled by 0.7 when the incident's detecting module
//! matches the group's). No match creates a new group, evicting the
//! least-recently-active one first if the group table is full. A background
//! sweep, spawned in `start`, drops groups that have gone `groupTtl` past
//! their last activity.
//!
//! `incident.created` carries no explicit "source" field; the correlator
//! uses the incident's `detectedBy` module id as that tag, since it is the
//! closest stand-in the event vocabulary offers and is exactly what the
//! same-source threshold discount is meant to key off of.

use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use opspilot_core::CorrelationId;
use opspilot_core::EnrichmentCompleted;
use opspilot_core::Event;
use opspilot_core::EventEnvelope;
use opspilot_core::EventHandler;
use opspilot_core::GroupId;
use opspilot_core::Health;
use opspilot_core::IncidentCreated;
use opspilot_core::IncidentId;
use opspilot_core::IncidentStorm;
use opspilot_core::Module;
use opspilot_core::ModuleCategory;
use opspilot_core::ModuleContext;
use opspilot_core::ModuleError;
use opspilot_core::ModuleId;
use opspilot_core::ModuleManifest;
use opspilot_core::SubscriptionId;
use serde::Deserialize;
use serde_json::json;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

/// On-disk shape of the correlator's config section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CorrelatorConfig {
    /// Base Jaccard similarity an incident must clear to join a group.
    similarity_threshold: f64,
    /// Milliseconds of inactivity after which a group stops accepting new
    /// members (it may still be swept away later by `group_ttl_ms`).
    time_window_ms: i64,
    /// Maximum members a single group may hold.
    #[serde(default = "default_max_group_size")]
    max_group_size: usize,
    /// Maximum number of groups tracked at once.
    #[serde(default = "default_max_groups")]
    max_groups: usize,
    /// Member count at which a group is declared a storm.
    storm_threshold: usize,
    /// Milliseconds after which a group is removed outright by the sweep.
    group_ttl_ms: i64,
}

/// Default cap on members per group when the config omits `maxGroupSize`.
fn default_max_group_size() -> usize {
    50
}

/// Default cap on tracked groups when the config omits `maxGroups`.
fn default_max_groups() -> usize {
    500
}

/// One correlation group.
struct Group {
    /// Group identifier.
    id: GroupId,
    /// Incident that seeded the group.
    root_incident_id: IncidentId,
    /// Member incident ids, in join order.
    members: Vec<IncidentId>,
    /// Member titles, in join order; carried on the storm event.
    titles: Vec<String>,
    /// Union of every member's token set.
    tokens: HashSet<String>,
    /// Source tag (the seeding incident's `detectedBy`), used for the
    /// same-source threshold discount.
    source: String,
    /// Severity of the seeding incident, carried on the storm event.
    severity: opspilot_core::Severity,
    /// Unix milliseconds of the most recent join.
    last_activity_at: i64,
    /// Whether `incident.storm` has already been emitted for this group.
    storm_emitted: bool,
}

/// Lowercases `text`, replaces non-alphanumeric runs with spaces, and drops
/// tokens of length `<= 2`.
fn tokenize(text: &str) -> HashSet<String> {
    let normalized: String = text.chars().map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' }).collect();
    normalized.split_whitespace().filter(|token| token.len() > 2).map(ToString::to_string).collect()
}

/// `|A ∩ B| / |A ∪ B|`, `0` when both sets are empty.
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        let intersection = intersection as f64;
        let union = union as f64;
        intersection / union
    }
}

/// Shared correlator state, populated once `initialize` parses its config.
struct CorrelatorInner {
    /// This correlator instance's scoped context.
    context: ModuleContext,
    /// Base similarity threshold, before the same-source discount.
    similarity_threshold: f64,
    /// Inactivity window after which a group stops accepting new members.
    time_window_ms: i64,
    /// Maximum members a single group may hold.
    max_group_size: usize,
    /// Maximum number of groups tracked at once.
    max_groups: usize,
    /// Member count at which a group is declared a storm.
    storm_threshold: usize,
    /// Milliseconds after which a fully idle group is swept away.
    group_ttl_ms: i64,
    /// Live groups, in creation order.
    groups: AsyncMutex<Vec<Group>>,
    /// Monotonic counter used to mint group ids.
    next_group_seq: AtomicU64,
    /// Subscription created in `start`, released in `stop`.
    subscription: StdMutex<Option<SubscriptionId>>,
    /// The background sweep task spawned in `start`.
    sweep_handle: StdMutex<Option<JoinHandle<()>>>,
}

impl CorrelatorInner {
    /// Mints a unique, process-local group id.
    fn mint_group_id(&self) -> GroupId {
        let seq = self.next_group_seq.fetch_add(1, Ordering::SeqCst);
        GroupId::new(format!("group-{seq}"))
    }

    /// Joins `payload` to its best-scoring active group, or seeds a new one.
    async fn on_incident_created(&self, payload: &IncidentCreated, correlation_id: Option<CorrelationId>) {
        let tokens = tokenize(&format!("{} {}", payload.title, payload.description));
        let source = payload.detected_by.as_str().to_string();
        let now = self.context.now_millis();

        let mut groups = self.groups.lock().await;
        let mut best: Option<(usize, f64)> = None;
        for (index, group) in groups.iter().enumerate() {
            if now - group.last_activity_at > self.time_window_ms {
                continue;
            }
            if group.members.len() >= self.max_group_size {
                continue;
            }
            let score = jaccard(&tokens, &group.tokens);
            let effective_threshold = if group.source == source { self.similarity_threshold * 0.7 } else { self.similarity_threshold };
            if score < effective_threshold {
                continue;
            }
            let replace = match best {
                Some((_, best_score)) => score > best_score,
                None => true,
            };
            if replace {
                best = Some((index, score));
            }
        }

        let Some((index, _)) = best else {
            self.create_group(&mut groups, payload, tokens, source, now);
            return;
        };

        let group = &mut groups[index];
        group.members.push(payload.incident_id.clone());
        group.titles.push(payload.title.clone());
        group.tokens.extend(tokens);
        group.last_activity_at = now;
        let member_count = group.members.len();
        let storm_crossed = member_count >= self.storm_threshold && !group.storm_emitted;
        if storm_crossed {
            group.storm_emitted = true;
        }
        let group_id = group.id.clone();
        let root_incident_id = group.root_incident_id.clone();
        let group_source = group.source.clone();
        let group_severity = group.severity;
        let titles = group.titles.clone();
        drop(groups);

        self.emit_enrichment(payload.incident_id.clone(), group_id.clone(), root_incident_id.clone(), member_count, storm_crossed, correlation_id.clone(), now).await;
        if storm_crossed {
            self.emit_storm(group_id, root_incident_id, member_count, group_severity, group_source, titles, correlation_id, now).await;
        }
    }

    /// Seeds a new group from `payload`, evicting the least-recently-active
    /// group first if the table is already at `max_groups`.
    fn create_group(&self, groups: &mut Vec<Group>, payload: &IncidentCreated, tokens: HashSet<String>, source: String, now: i64) {
        if groups.len() + 1 > self.max_groups {
            if let Some((evict_index, _)) = groups.iter().enumerate().min_by_key(|(_, group)| group.last_activity_at) {
                self.context.logger.warn("evicting oldest correlation group to admit a new one at capacity");
                groups.remove(evict_index);
            }
        }
        groups.push(Group {
            id: self.mint_group_id(),
            root_incident_id: payload.incident_id.clone(),
            members: vec![payload.incident_id.clone()],
            titles: vec![payload.title.clone()],
            tokens,
            source,
            severity: payload.severity,
            last_activity_at: now,
            storm_emitted: false,
        });
    }

    /// Publishes `enrichment.completed` for a single group join.
    async fn emit_enrichment(&self, incident_id: IncidentId, group_id: GroupId, root_incident_id: IncidentId, member_count: usize, storm: bool, correlation_id: Option<CorrelationId>, now: i64) {
        let mut data = std::collections::HashMap::new();
        data.insert("groupId".to_string(), json!(group_id.as_str()));
        data.insert("rootIncidentId".to_string(), json!(root_incident_id.as_str()));
        data.insert("memberCount".to_string(), json!(member_count));
        data.insert("storm".to_string(), json!(storm));
        let enrichment = EnrichmentCompleted {
            incident_id,
            enricher_module: self.context.module_id.clone(),
            enrichment_type: "correlation".to_string(),
            data,
            completed_at: now,
        };
        let mut envelope = EventEnvelope::new(Event::EnrichmentCompleted(enrichment), self.context.module_id.clone(), now);
        if let Some(correlation_id) = correlation_id {
            envelope = envelope.with_correlation_id(correlation_id);
        }
        self.context.bus.publish(envelope).await;
    }

    /// Publishes `incident.storm` the first time a group crosses `storm_threshold`.
    async fn emit_storm(&self, group_id: GroupId, root_incident_id: IncidentId, member_count: usize, severity: opspilot_core::Severity, source: String, titles: Vec<String>, correlation_id: Option<CorrelationId>, now: i64) {
        let storm = IncidentStorm {
            group_id,
            root_incident_id,
            member_count,
            severity,
            source,
            time_window_ms: self.time_window_ms,
            titles,
        };
        let mut envelope = EventEnvelope::new(Event::IncidentStorm(storm), self.context.module_id.clone(), now);
        if let Some(correlation_id) = correlation_id {
            envelope = envelope.with_correlation_id(correlation_id);
        }
        self.context.bus.publish(envelope).await;
    }

    /// Drops every group that has been idle past `group_ttl_ms`.
    async fn sweep_expired_groups(&self) {
        let now = self.context.now_millis();
        let mut groups = self.groups.lock().await;
        groups.retain(|group| now - group.last_activity_at <= self.group_ttl_ms);
    }

    /// Number of groups currently tracked.
    async fn active_group_count(&self) -> usize {
        self.groups.lock().await.len()
    }
}

/// Adapts a [`CorrelatorInner`] to the bus's [`EventHandler`] contract.
struct HandlerAdapter(Arc<CorrelatorInner>);

#[async_trait]
impl EventHandler for HandlerAdapter {
    async fn handle(&self, envelope: &EventEnvelope) {
        if let Event::IncidentCreated(payload) = &envelope.event {
            self.0.on_incident_created(payload, envelope.correlation_id.clone()).await;
        }
    }
}

/// Background loop: sweeps expired groups every `group_ttl_ms / 4`
/// (clamped to `[1s, 60s]`) until the module's cancellation token fires.
async fn run_sweep_loop(inner: Arc<CorrelatorInner>) {
    let tick_ms = (inner.group_ttl_ms / 4).min(60_000).max(1000);
    let interval = Duration::from_millis(u64::try_from(tick_ms).unwrap_or(60_000));
    loop {
        tokio::select! {
            () = tokio::time::sleep(interval) => {
                inner.sweep_expired_groups().await;
            }
            () = inner.context.cancellation.cancelled() => break,
        }
    }
}

/// Wraps any error into a [`ModuleError::Lifecycle`] tagged with `module_id`
/// and `operation`.
fn lifecycle_error(module_id: &ModuleId, operation: &str, err: impl std::error::Error + Send + Sync + 'static) -> ModuleError {
    ModuleError::Lifecycle {
        module_id: module_id.clone(),
        operation: operation.to_string(),
        message: err.to_string(),
        cause: Some(Box::new(err)),
    }
}

/// Token-overlap incident correlator.
pub struct Correlator {
    manifest: ModuleManifest,
    inner: tokio::sync::OnceCell<Arc<CorrelatorInner>>,
}

impl Correlator {
    /// Builds a correlator with the given module id and its declared config
    /// schema.
    #[must_use]
    pub fn new(id: impl Into<ModuleId>) -> Self {
        let schema = json!({
            "type": "object",
            "required": ["similarityThreshold", "timeWindowMs", "stormThreshold", "groupTtlMs"],
            "properties": {
                "similarityThreshold": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                "timeWindowMs": { "type": "integer", "minimum": 0 },
                "maxGroupSize": { "type": "integer", "minimum": 1 },
                "maxGroups": { "type": "integer", "minimum": 1 },
                "stormThreshold": { "type": "integer", "minimum": 1 },
                "groupTtlMs": { "type": "integer", "minimum": 0 }
            }
        });
        Self {
            manifest: ModuleManifest::new(id, "1.0.0", ModuleCategory::Enricher)
                .with_description("Token-overlap correlation engine over incident.created")
                .with_config_schema(schema),
            inner: tokio::sync::OnceCell::new(),
        }
    }

    /// Returns the number of groups currently tracked (active or merely not
    /// yet swept).
    pub async fn group_count(&self) -> Option<usize> {
        let inner = self.inner.get()?;
        Some(inner.active_group_count().await)
    }

    /// Fetches the initialized inner state, or a `Lifecycle` error if
    /// `initialize` was never called (or failed).
    fn require_inner(&self) -> Result<Arc<CorrelatorInner>, ModuleError> {
        self.inner.get().cloned().ok_or_else(|| ModuleError::Lifecycle {
            module_id: self.manifest.id.clone(),
            operation: "start".to_string(),
            message: "initialize was not called, or failed".to_string(),
            cause: None,
        })
    }
}

#[async_trait]
impl Module for Correlator {
    fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }

    async fn initialize(&self, context: ModuleContext) -> Result<(), ModuleError> {
        let config: CorrelatorConfig = serde_json::from_value(Value::clone(&context.config)).map_err(|err| lifecycle_error(&context.module_id, "initialize", err))?;
        let inner = Arc::new(CorrelatorInner {
            similarity_threshold: config.similarity_threshold,
            time_window_ms: config.time_window_ms,
            max_group_size: config.max_group_size,
            max_groups: config.max_groups,
            storm_threshold: config.storm_threshold,
            group_ttl_ms: config.group_ttl_ms,
            groups: AsyncMutex::new(Vec::new()),
            next_group_seq: AtomicU64::new(0),
            subscription: StdMutex::new(None),
            sweep_handle: StdMutex::new(None),
            context,
        });
        self.inner.set(inner).map_err(|_err| ModuleError::Lifecycle {
            module_id: self.manifest.id.clone(),
            operation: "initialize".to_string(),
            message: "initialize called more than once".to_string(),
            cause: None,
        })
    }

    async fn start(&self) -> Result<(), ModuleError> {
        let inner = self.require_inner()?;
        let handler: Arc<dyn EventHandler> = Arc::new(HandlerAdapter(Arc::clone(&inner)));
        let subscription_id = inner.context.bus.subscribe("incident.created", handler).await;
        *inner.subscription.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(subscription_id);
        let handle = tokio::spawn(run_sweep_loop(Arc::clone(&inner)));
        *inner.sweep_handle.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        let inner = self.require_inner()?;
        inner.context.cancellation.cancel();
        let subscription_id = inner.subscription.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
        if let Some(subscription_id) = subscription_id {
            inner.context.bus.unsubscribe(subscription_id).await;
        }
        let handle = inner.sweep_handle.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn health(&self) -> Health {
        match self.inner.get() {
            Some(inner) => Health::healthy(inner.context.now_millis()),
            None => Health::unhealthy("not initialized", 0),
        }
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

    use std::sync::Arc;

    use opspilot_bus::InProcessBus;
    use opspilot_core::CancellationToken;
    use opspilot_core::CapturingLogger;
    use opspilot_core::Clock;
    use opspilot_core::EventBus;
    use opspilot_core::EventHandler;
    use opspilot_core::IncidentId;
    use opspilot_core::Logger;
    use opspilot_core::ModuleId;
    use opspilot_core::PrefixedLogger;
    use opspilot_core::Severity;
    use opspilot_core::StorageBackend;
    use opspilot_core::TestClock;
    use opspilot_storage::MemoryBackend;
    use serde_json::json;

    use super::Correlator;
    use super::Event;
    use super::EventEnvelope;
    use super::IncidentCreated;
    use super::ModuleContext;

    struct RecordingHandler {
        envelopes: std::sync::Mutex<Vec<EventEnvelope>>,
    }

    #[async_trait::async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, envelope: &EventEnvelope) {
            self.envelopes.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(envelope.clone());
        }
    }

    fn make_context(bus: Arc<dyn EventBus>, clock: Arc<dyn Clock>, config: serde_json::Value) -> ModuleContext {
        let module_id = ModuleId::new("enricher.correlate");
        let audit = Arc::new(opspilot_audit::StorageAuditLog::new(Arc::new(MemoryBackend::new()), Arc::clone(&clock)));
        let approval_gate = Arc::new(opspilot_gate::StorageApprovalGate::new(
            Arc::new(MemoryBackend::new()),
            audit,
            Arc::clone(&bus),
            Arc::clone(&clock),
            module_id.clone(),
        ));
        ModuleContext {
            module_id: module_id.clone(),
            config,
            bus,
            storage: Arc::new(MemoryBackend::new()) as Arc<dyn StorageBackend>,
            logger: PrefixedLogger::new(Arc::new(CapturingLogger::new()) as Arc<dyn Logger>, module_id),
            approval_gate,
            clock,
            cancellation: CancellationToken::new(),
        }
    }

    fn incident(id: &str, title: &str, detected_by: &str, now: i64) -> IncidentCreated {
        IncidentCreated {
            incident_id: IncidentId::new(id),
            title: title.to_string(),
            description: String::new(),
            severity: Severity::Warning,
            detected_by: ModuleId::new(detected_by),
            source_event: None,
            detected_at: now,
            context: None,
        }
    }

    #[tokio::test]
    async fn three_similar_incidents_join_one_group_and_trigger_storm() {
        let bus: Arc<dyn EventBus> = Arc::new(InProcessBus::new(Arc::new(opspilot_core::StderrLogger) as Arc<dyn Logger>));
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(0));
        let enrichment_recorder = Arc::new(RecordingHandler { envelopes: std::sync::Mutex::new(Vec::new()) });
        let storm_recorder = Arc::new(RecordingHandler { envelopes: std::sync::Mutex::new(Vec::new()) });
        bus.subscribe("enrichment.completed", enrichment_recorder.clone()).await;
        bus.subscribe("incident.storm", storm_recorder.clone()).await;

        let config = json!({
            "similarityThreshold": 0.4,
            "timeWindowMs": 60_000,
            "stormThreshold": 3,
            "groupTtlMs": 300_000
        });
        let correlator = Correlator::new("enricher.correlate");
        let context = make_context(Arc::clone(&bus), Arc::clone(&clock), config);
        let module_id = context.module_id.clone();
        correlator.initialize(context).await.expect("initialize");
        correlator.start().await.expect("start");

        for (index, title) in ["High CPU usage on web-01", "High CPU usage on web-02", "High CPU usage on web-03"].iter().enumerate() {
            clock.advance(std::time::Duration::from_millis(30));
            let payload = incident(&format!("inc-{index}"), title, "detector.threshold.cpu", clock.now_millis());
            bus.publish(EventEnvelope::new(Event::IncidentCreated(payload), module_id.clone(), clock.now_millis())).await;
        }

        assert_eq!(correlator.group_count().await, Some(1));
        assert_eq!(enrichment_recorder.envelopes.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len(), 2);
        assert_eq!(storm_recorder.envelopes.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len(), 1);

        correlator.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn dissimilar_incidents_create_separate_groups() {
        let bus: Arc<dyn EventBus> = Arc::new(InProcessBus::new(Arc::new(opspilot_core::StderrLogger) as Arc<dyn Logger>));
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(0));
        let config = json!({
            "similarityThreshold": 0.6,
            "timeWindowMs": 60_000,
            "stormThreshold": 5,
            "groupTtlMs": 300_000
        });
        let correlator = Correlator::new("enricher.correlate");
        let context = make_context(Arc::clone(&bus), Arc::clone(&clock), config);
        let module_id = context.module_id.clone();
        correlator.initialize(context).await.expect("initialize");
        correlator.start().await.expect("start");

        let first = incident("inc-a", "High CPU usage on web-01", "detector.threshold.cpu", 0);
        let second = incident("inc-b", "Disk space critically low on db-07", "detector.threshold.disk", 0);
        bus.publish(EventEnvelope::new(Event::IncidentCreated(first), module_id.clone(), 0)).await;
        bus.publish(EventEnvelope::new(Event::IncidentCreated(second), module_id.clone(), 0)).await;

        assert_eq!(correlator.group_count().await, Some(2));
        correlator.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn jaccard_of_two_empty_sets_is_zero() {
        let empty = std::collections::HashSet::new();
        assert!((super::jaccard(&empty, &empty) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn tokenize_drops_short_tokens_and_lowercases() {
        let tokens = super::tokenize("CPU at 99% on Web-01!!");
        assert!(tokens.contains("web"));
        assert!(tokens.contains("cpu"));
        assert!(!tokens.contains("at"));
        assert!(!tokens.contains("on"));
    }
}
