// crates/opspilot-detect/src/threshold.rs
// ============================================================================
// Module: Threshold Detector
// Description: Per-rule sliding window of (timestamp, value) samples mined
// from `log.ingested` lines via regex, firing `incident.created` on sustained
// breach subject to cooldown and a shared rate limiter.
// Purpose: Turn raw log lines into incidents without a metrics pipeline.
// Dependencies: opspilot-core, regex, serde_json, tokio::sync
// ============================================================================

//! ## Overview
//! [`ThresholdDetector`] compiles its rules once, at [`opspilot_core::Module::initialize`]
//! time, so a rule with an invalid regex fails startup rather than silently
//! never firing. Each rule keeps its own sliding window and cooldown clock;
//! all rules share one [`SlidingWindowRateLimiter`] instance as the global
//! per-minute incident cap. Suppression is counted separately for cooldown
//! and for the rate limiter, since an operator tuning `cooldownDuration`
//! needs to tell those two causes apart.
//!
//! `Module::initialize` only receives `&self`, so the compiled rules and
//! context live behind an `Arc<DetectorInner>` stashed in a
//! [`tokio::sync::OnceCell`]; `start` subscribes a [`HandlerAdapter`] wrapping
//! a clone of that `Arc` to the bus, and `stop` releases the subscription.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::PoisonError;
use std::time::Duration;

use async_trait::async_trait;
use opspilot_core::CorrelationId;
use opspilot_core::Event;
use opspilot_core::EventEnvelope;
use opspilot_core::EventHandler;
use opspilot_core::Health;
use opspilot_core::IncidentCreated;
use opspilot_core::IncidentId;
use opspilot_core::LogIngested;
use opspilot_core::Module;
use opspilot_core::ModuleCategory;
use opspilot_core::ModuleContext;
use opspilot_core::ModuleError;
use opspilot_core::ModuleId;
use opspilot_core::ModuleManifest;
use opspilot_core::RuleId;
use opspilot_core::Severity;
use opspilot_core::SubscriptionId;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::OnceCell;

use crate::rate_limiter::SlidingWindowRateLimiter;

/// On-disk shape of one rule, before its regexes are compiled.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleConfig {
    id: String,
    metric_regex: String,
    value_regex: String,
    threshold: f64,
    comparison: String,
    window_duration_ms: i64,
    min_samples: usize,
    severity: Severity,
    title_template: String,
    description_template: String,
    cooldown_duration_ms: i64,
}

/// On-disk shape of the detector's full config section.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectorConfig {
    rules: Vec<RuleConfig>,
    #[serde(default = "default_max_incidents_per_minute")]
    max_incidents_per_minute: u64,
}

fn default_max_incidents_per_minute() -> u64 {
    60
}

/// A rule failing to compile at startup, per the "fail at init, not at
/// runtime" requirement.
#[derive(Debug, thiserror::Error)]
enum DetectorConfigError {
    /// `metricRegex` or `valueRegex` did not compile.
    #[error("rule {rule_id}: invalid {field}: {message}")]
    InvalidRegex {
        /// Offending rule id.
        rule_id: String,
        /// Which regex field failed (`"metricRegex"` or `"valueRegex"`).
        field: &'static str,
        /// Underlying regex compiler message.
        message: String,
    },
    /// `comparison` was not one of `<`, `<=`, `>`, `>=`, `=`.
    #[error("rule {rule_id}: unrecognized comparison operator {operator:?}")]
    InvalidComparison {
        /// Offending rule id.
        rule_id: String,
        /// The operator string that failed to parse.
        operator: String,
    },
}

/// A comparison operator over a sample value and a rule's threshold.
#[derive(Debug, Clone, Copy)]
enum Comparison {
    /// `<`
    LessThan,
    /// `<=`
    LessOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterOrEqual,
    /// `=`
    Equal,
}

impl Comparison {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "<" => Some(Self::LessThan),
            "<=" | "\u{2264}" => Some(Self::LessOrEqual),
            ">" => Some(Self::GreaterThan),
            ">=" | "\u{2265}" => Some(Self::GreaterOrEqual),
            "=" | "==" => Some(Self::Equal),
            _ => None,
        }
    }

    fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::LessThan => value < threshold,
            Self::LessOrEqual => value <= threshold,
            Self::GreaterThan => value > threshold,
            Self::GreaterOrEqual => value >= threshold,
            Self::Equal => (value - threshold).abs() < f64::EPSILON,
        }
    }
}

/// Mutable per-rule state: the retained sample window, the cooldown clock,
/// and the two suppression counters.
#[derive(Debug, Default)]
struct RuleState {
    /// Retained `(timestamp_ms, value)` samples, oldest first.
    samples: VecDeque<(i64, f64)>,
    /// Unix milliseconds of the last successful fire, if any.
    last_fired_at: Option<i64>,
    /// Incidents this rule has fired.
    fired_count: u64,
    /// Sustained breaches withheld because `cooldownDuration` had not
    /// elapsed since the last fire.
    suppressed_by_cooldown: u64,
    /// Sustained breaches withheld because the shared rate limiter denied
    /// admission.
    suppressed_by_rate_limit: u64,
}

/// A rule with its regexes compiled and its mutable state attached.
struct CompiledRule {
    /// Rule identifier, used in incident context and in logs.
    id: RuleId,
    /// Matched against each ingested line; a non-match skips the rule.
    metric_regex: Regex,
    /// Applied to lines the metric regex matched; its first capture group
    /// is parsed as the sample value.
    value_regex: Regex,
    /// Comparison threshold.
    threshold: f64,
    /// Comparison operator.
    comparison: Comparison,
    /// Sliding window length, in milliseconds.
    window_ms: i64,
    /// Minimum number of window samples (and of breaching samples) required
    /// before firing.
    min_samples: usize,
    /// Severity attached to incidents this rule creates.
    severity: Severity,
    /// Incident title template; supports `{metric}`, `{value}`,
    /// `{average}`, `{threshold}` placeholders.
    title_template: String,
    /// Incident description template; same placeholders as the title.
    description_template: String,
    /// Minimum milliseconds between fires.
    cooldown_ms: i64,
    /// Mutable window/cooldown/counter state.
    state: AsyncMutex<RuleState>,
}

impl CompiledRule {
    fn compile(config: RuleConfig) -> Result<Self, DetectorConfigError> {
        let metric_regex = Regex::new(&config.metric_regex).map_err(|err| DetectorConfigError::InvalidRegex {
            rule_id: config.id.clone(),
            field: "metricRegex",
            message: err.to_string(),
        })?;
        let value_regex = Regex::new(&config.value_regex).map_err(|err| DetectorConfigError::InvalidRegex {
            rule_id: config.id.clone(),
            field: "valueRegex",
            message: err.to_string(),
        })?;
        let comparison = Comparison::parse(&config.comparison).ok_or_else(|| DetectorConfigError::InvalidComparison {
            rule_id: config.id.clone(),
            operator: config.comparison.clone(),
        })?;
        Ok(Self {
            id: RuleId::new(config.id),
            metric_regex,
            value_regex,
            threshold: config.threshold,
            comparison,
            window_ms: config.window_duration_ms,
            min_samples: config.min_samples,
            severity: config.severity,
            title_template: config.title_template,
            description_template: config.description_template,
            cooldown_ms: config.cooldown_duration_ms,
            state: AsyncMutex::new(RuleState::default()),
        })
    }
}

fn render_template(template: &str, metric: &str, latest: f64, average: f64, threshold: f64) -> String {
    template
        .replace("{metric}", metric)
        .replace("{value}", &format!("{latest:.2}"))
        .replace("{average}", &format!("{average:.2}"))
        .replace("{threshold}", &format!("{threshold:.2}"))
}

/// A rule's fire/suppression counters and current window occupancy, as of
/// the moment it was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleStats {
    /// Incidents this rule has fired.
    pub fired_count: u64,
    /// Sustained breaches withheld by the cooldown.
    pub suppressed_by_cooldown: u64,
    /// Sustained breaches withheld by the shared rate limiter.
    pub suppressed_by_rate_limit: u64,
    /// Samples currently retained in the rule's sliding window.
    pub retained_samples: usize,
}

/// Shared detector state, constructed once `initialize` has parsed and
/// compiled its config.
struct DetectorInner {
    /// This detector instance's scoped context.
    context: ModuleContext,
    /// Compiled rules, evaluated in declaration order on each ingested line.
    rules: Vec<CompiledRule>,
    /// Shared per-minute incident admission cap.
    rate_limiter: SlidingWindowRateLimiter,
    /// The bus subscription created in `start`, released in `stop`.
    subscription: StdMutex<Option<SubscriptionId>>,
}

impl DetectorInner {
    async fn rule_stats(&self, rule_id: &str) -> Option<RuleStats> {
        for rule in &self.rules {
            if rule.id.as_str() == rule_id {
                let state = rule.state.lock().await;
                return Some(RuleStats {
                    fired_count: state.fired_count,
                    suppressed_by_cooldown: state.suppressed_by_cooldown,
                    suppressed_by_rate_limit: state.suppressed_by_rate_limit,
                    retained_samples: state.samples.len(),
                });
            }
        }
        None
    }

    async fn on_log_ingested(&self, payload: &LogIngested, correlation_id: Option<CorrelationId>) {
        for rule in &self.rules {
            self.evaluate_rule(rule, payload, correlation_id.clone()).await;
        }
    }

    async fn evaluate_rule(&self, rule: &CompiledRule, payload: &LogIngested, correlation_id: Option<CorrelationId>) {
        let line = payload.line.as_str();
        if !rule.metric_regex.is_match(line) {
            return;
        }
        let Some(captures) = rule.value_regex.captures(line) else {
            return;
        };
        let Some(raw_value) = captures.get(1) else {
            return;
        };
        let Ok(value) = raw_value.as_str().parse::<f64>() else {
            return;
        };

        let now = self.context.now_millis();
        let mut state = rule.state.lock().await;
        state.samples.push_back((now, value));
        while let Some(&(timestamp, _)) = state.samples.front() {
            if now - timestamp > rule.window_ms {
                state.samples.pop_front();
            } else {
                break;
            }
        }
        if state.samples.len() < rule.min_samples {
            return;
        }
        let breaching = state.samples.iter().filter(|(_, sample)| rule.comparison.holds(*sample, rule.threshold)).count();
        if breaching < rule.min_samples {
            return;
        }
        if let Some(last_fired_at) = state.last_fired_at {
            if now - last_fired_at < rule.cooldown_ms {
                state.suppressed_by_cooldown += 1;
                return;
            }
        }
        let outcome = self.rate_limiter.try_acquire(None).await;
        if !outcome.allowed {
            state.suppressed_by_rate_limit += 1;
            return;
        }

        state.last_fired_at = Some(now);
        state.fired_count += 1;
        let latest_value = value;
        let sample_count = state.samples.len();
        let average_value = state.samples.iter().map(|(_, sample)| sample).sum::<f64>() / sample_count as f64;
        drop(state);

        self.emit_incident(rule, line, latest_value, average_value, correlation_id, now).await;
    }

    async fn emit_incident(&self, rule: &CompiledRule, line: &str, latest_value: f64, average_value: f64, correlation_id: Option<CorrelationId>, now: i64) {
        let metric_label = rule.metric_regex.find(line).map_or_else(|| rule.id.as_str(), |m| m.as_str());
        let title = render_template(&rule.title_template, metric_label, latest_value, average_value, rule.threshold);
        let description = render_template(&rule.description_template, metric_label, latest_value, average_value, rule.threshold);

        let mut context_bag = HashMap::new();
        context_bag.insert("literalValue".to_string(), json!(latest_value));
        context_bag.insert("averageValue".to_string(), json!(average_value));
        context_bag.insert("ruleId".to_string(), json!(rule.id.as_str()));

        let correlation_id = correlation_id.unwrap_or_else(|| CorrelationId::new(format!("{}-{now}", rule.id.as_str())));
        let incident = IncidentCreated {
            incident_id: IncidentId::new(format!("{}-{now}", rule.id.as_str())),
            title,
            description,
            severity: rule.severity,
            detected_by: self.context.module_id.clone(),
            source_event: Some("log.ingested".to_string()),
            detected_at: now,
            context: Some(context_bag),
        };
        let envelope = EventEnvelope::new(Event::IncidentCreated(incident), self.context.module_id.clone(), now).with_correlation_id(correlation_id);
        self.context.bus.publish(envelope).await;
    }
}

/// Adapts a [`DetectorInner`] to the bus's [`EventHandler`] contract.
struct HandlerAdapter(Arc<DetectorInner>);

#[async_trait]
impl EventHandler for HandlerAdapter {
    async fn handle(&self, envelope: &EventEnvelope) {
        if let Event::LogIngested(payload) = &envelope.event {
            self.0.on_log_ingested(payload, envelope.correlation_id.clone()).await;
        }
    }
}

fn lifecycle_error(module_id: &ModuleId, operation: &str, err: impl std::error::Error + Send + Sync + 'static) -> ModuleError {
    ModuleError::Lifecycle {
        module_id: module_id.clone(),
        operation: operation.to_string(),
        message: err.to_string(),
        cause: Some(Box::new(err)),
    }
}

/// Regex-driven sliding-window threshold detector.
pub struct ThresholdDetector {
    manifest: ModuleManifest,
    inner: OnceCell<Arc<DetectorInner>>,
}

impl ThresholdDetector {
    /// Builds a detector with the given module id and its declared config
    /// schema.
    #[must_use]
    pub fn new(id: impl Into<ModuleId>) -> Self {
        let schema = json!({
            "type": "object",
            "required": ["rules"],
            "properties": {
                "rules": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": [
                            "id", "metricRegex", "valueRegex", "threshold", "comparison",
                            "windowDurationMs", "minSamples", "severity", "titleTemplate",
                            "descriptionTemplate", "cooldownDurationMs"
                        ]
                    }
                },
                "maxIncidentsPerMinute": { "type": "integer", "minimum": 1 }
            }
        });
        Self {
            manifest: ModuleManifest::new(id, "1.0.0", ModuleCategory::Detector)
                .with_description("Sliding-window threshold detector over log.ingested lines")
                .with_config_schema(schema),
            inner: OnceCell::new(),
        }
    }

    /// Returns the named rule's current counters, or `None` if the detector
    /// is not initialized or has no rule with that id.
    pub async fn rule_stats(&self, rule_id: &str) -> Option<RuleStats> {
        let inner = self.inner.get()?;
        inner.rule_stats(rule_id).await
    }

    fn require_inner(&self) -> Result<Arc<DetectorInner>, ModuleError> {
        self.inner.get().cloned().ok_or_else(|| ModuleError::Lifecycle {
            module_id: self.manifest.id.clone(),
            operation: "start".to_string(),
            message: "initialize was not called, or failed".to_string(),
            cause: None,
        })
    }
}

#[async_trait]
impl Module for ThresholdDetector {
    fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }

    async fn initialize(&self, context: ModuleContext) -> Result<(), ModuleError> {
        let config: DetectorConfig = serde_json::from_value(Value::clone(&context.config)).map_err(|err| lifecycle_error(&context.module_id, "initialize", err))?;

        let mut rules = Vec::with_capacity(config.rules.len());
        for rule_config in config.rules {
            let rule = CompiledRule::compile(rule_config).map_err(|err| lifecycle_error(&context.module_id, "initialize", err))?;
            rules.push(rule);
        }

        let rate_limiter = SlidingWindowRateLimiter::new(Duration::from_secs(60), config.max_incidents_per_minute, Arc::clone(&context.clock));
        let inner = Arc::new(DetectorInner {
            context,
            rules,
            rate_limiter,
            subscription: StdMutex::new(None),
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
        let subscription_id = inner.context.bus.subscribe("log.ingested", handler).await;
        *inner.subscription.lock().unwrap_or_else(PoisonError::into_inner) = Some(subscription_id);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        let inner = self.require_inner()?;
        let subscription_id = inner.subscription.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(subscription_id) = subscription_id {
            inner.context.bus.unsubscribe(subscription_id).await;
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
    use opspilot_core::Logger;
    use opspilot_core::ModuleId;
    use opspilot_core::PrefixedLogger;
    use opspilot_core::StorageBackend;
    use opspilot_core::TestClock;
    use serde_json::json;

    use super::Event;
    use super::EventEnvelope;
    use super::ModuleContext;
    use super::ThresholdDetector;

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
        use opspilot_storage::MemoryBackend;

        let module_id = ModuleId::new("detector.threshold.cpu");
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

    fn cpu_rule_config() -> serde_json::Value {
        json!({
            "rules": [{
                "id": "cpu-high",
                "metricRegex": "cpu_usage_percent",
                "valueRegex": "cpu_usage_percent=(\\d+(?:\\.\\d+)?)",
                "threshold": 90.0,
                "comparison": ">",
                "windowDurationMs": 60_000,
                "minSamples": 3,
                "severity": "warning",
                "titleTemplate": "High CPU: {value}%",
                "descriptionTemplate": "cpu_usage_percent sustained above {threshold}, average {average}",
                "cooldownDurationMs": 60_000
            }],
            "maxIncidentsPerMinute": 60
        })
    }

    async fn ingest(bus: &Arc<dyn EventBus>, module_id: &ModuleId, now: i64, line: &str) {
        use opspilot_core::LogIngested;

        let payload = LogIngested {
            source: "test".to_string(),
            line: line.to_string(),
            line_number: None,
            ingested_at: now,
            encoding: None,
            metadata: None,
        };
        bus.publish(EventEnvelope::new(Event::LogIngested(payload), module_id.clone(), now)).await;
    }

    #[tokio::test]
    async fn fires_exactly_once_on_sustained_breach_then_honors_cooldown() {
        let bus: Arc<dyn EventBus> = Arc::new(InProcessBus::new(Arc::new(opspilot_core::StderrLogger) as Arc<dyn opspilot_core::Logger>));
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(0));
        let recorder = Arc::new(RecordingHandler { envelopes: std::sync::Mutex::new(Vec::new()) });
        bus.subscribe("incident.created", recorder.clone()).await;

        let detector = ThresholdDetector::new("detector.threshold.cpu");
        let context = make_context(Arc::clone(&bus), Arc::clone(&clock), cpu_rule_config());
        let source_id = context.module_id.clone();
        detector.initialize(context).await.expect("initialize");
        detector.start().await.expect("start");

        ingest(&bus, &source_id, 0, "[METRIC] cpu_usage_percent=92").await;
        ingest(&bus, &source_id, 0, "[METRIC] cpu_usage_percent=95").await;
        ingest(&bus, &source_id, 0, "[METRIC] cpu_usage_percent=97").await;

        let fired = recorder.envelopes.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(fired.len(), 1);
        let Event::IncidentCreated(incident) = &fired[0].event else {
            panic!("expected an incident.created envelope");
        };
        let context = incident.context.as_ref().expect("incident carries context");
        assert_eq!(context.get("literalValue").and_then(serde_json::Value::as_f64), Some(97.0));
        let average = context.get("averageValue").and_then(serde_json::Value::as_f64).expect("averageValue present");
        assert!((average - 94.666_666_666_666_67).abs() < 0.01);
        drop(fired);

        ingest(&bus, &source_id, 0, "[METRIC] cpu_usage_percent=93").await;
        let fired = recorder.envelopes.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(fired.len(), 1, "fourth sample within cooldown must not fire again");
        drop(fired);

        let stats = detector.rule_stats("cpu-high").await.expect("rule exists");
        assert_eq!(stats.fired_count, 1);
        assert_eq!(stats.suppressed_by_cooldown, 1);
        assert_eq!(stats.suppressed_by_rate_limit, 0);
    }

    #[tokio::test]
    async fn does_not_fire_with_fewer_samples_than_min_samples() {
        let bus: Arc<dyn EventBus> = Arc::new(InProcessBus::new(Arc::new(opspilot_core::StderrLogger) as Arc<dyn opspilot_core::Logger>));
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(0));
        let recorder = Arc::new(RecordingHandler { envelopes: std::sync::Mutex::new(Vec::new()) });
        bus.subscribe("incident.created", recorder.clone()).await;

        let detector = ThresholdDetector::new("detector.threshold.cpu");
        let context = make_context(Arc::clone(&bus), Arc::clone(&clock), cpu_rule_config());
        let source_id = context.module_id.clone();
        detector.initialize(context).await.expect("initialize");
        detector.start().await.expect("start");

        ingest(&bus, &source_id, 0, "[METRIC] cpu_usage_percent=92").await;
        ingest(&bus, &source_id, 0, "[METRIC] cpu_usage_percent=95").await;

        assert!(recorder.envelopes.lock().unwrap_or_else(std::sync::PoisonError::into_inner).is_empty());
    }

    #[tokio::test]
    async fn invalid_regex_fails_initialize_not_later() {
        let bus: Arc<dyn EventBus> = Arc::new(InProcessBus::new(Arc::new(opspilot_core::StderrLogger) as Arc<dyn opspilot_core::Logger>));
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(0));
        let detector = ThresholdDetector::new("detector.threshold.cpu");
        let mut config = cpu_rule_config();
        config["rules"][0]["metricRegex"] = json!("(unclosed");
        let context = make_context(bus, clock, config);
        assert!(detector.initialize(context).await.is_err());
    }
}
