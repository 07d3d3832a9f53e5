// crates/opspilot-runtime/src/registry.rs
// ============================================================================
// Module: Builtin Module Registry
// Description: Maps a module id's category to the concrete Module
// implementation this workspace ships, for construction by the composition
// root.
// Purpose: Give bootstrap a single place to know "detector.* constructs a
// ThresholdDetector, enricher.* constructs a Correlator" without scattering
// that knowledge across the boot sequence.
// Dependencies: opspilot-core, opspilot-detect, opspilot-correlate
// ============================================================================

//! ## Overview
//! This workspace ships exactly two concrete, non-plugin module
//! implementations: [`opspilot_detect::ThresholdDetector`] (category
//! `detector`) and [`opspilot_correlate::Correlator`] (category `enricher`).
//! [`construct_builtin`] dispatches on [`ModuleId::category_and_name`]'s
//! category to build the matching instance. A module id whose category
//! matches neither is not a builtin; bootstrap falls back to plugin
//! discovery (`pluginsDir`) for it, and reports an error if that also comes
//! up empty.

use std::sync::Arc;

use opspilot_core::Module;
use opspilot_core::ModuleId;
use opspilot_correlate::Correlator;
use opspilot_detect::ThresholdDetector;

/// Category prefix [`ThresholdDetector`] is registered under.
const DETECTOR_CATEGORY: &str = "detector";
/// Category prefix [`Correlator`] is registered under.
const ENRICHER_CATEGORY: &str = "enricher";

/// Constructs the builtin module `id` resolves to, if any.
///
/// Returns `None` for ids without a `<category>.<name>` shape, or whose
/// category is not one of this workspace's builtins (`detector`, `enricher`)
/// — those are left for plugin discovery to resolve instead.
#[must_use]
pub fn construct_builtin(id: &ModuleId) -> Option<Arc<dyn Module>> {
    let (category, _name) = id.category_and_name()?;
    match category {
        DETECTOR_CATEGORY => Some(Arc::new(ThresholdDetector::new(id.clone()))),
        ENRICHER_CATEGORY => Some(Arc::new(Correlator::new(id.clone()))),
        _ => None,
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

    use opspilot_core::ModuleId;

    use super::construct_builtin;

    #[test]
    fn resolves_a_detector_id_to_a_threshold_detector() {
        let module = construct_builtin(&ModuleId::new("detector.threshold.cpu")).expect("detector category is a builtin");
        assert_eq!(module.manifest().id.as_str(), "detector.threshold.cpu");
    }

    #[test]
    fn resolves_an_enricher_id_to_a_correlator() {
        let module = construct_builtin(&ModuleId::new("enricher.correlator.main")).expect("enricher category is a builtin");
        assert_eq!(module.manifest().id.as_str(), "enricher.correlator.main");
    }

    #[test]
    fn an_unregistered_category_resolves_to_nothing() {
        assert!(construct_builtin(&ModuleId::new("connector.tail.app")).is_none());
    }

    #[test]
    fn an_id_without_a_category_separator_resolves_to_nothing() {
        assert!(construct_builtin(&ModuleId::new("kernel")).is_none());
    }
}
