// crates/opspilot-kernel/tests/proptest_resolver.rs
// ============================================================================
// Module: Dependency Resolver Property Tests
// Description: Property tests for resolve_order's ordering guarantee across
// randomly generated acyclic dependency graphs.
// ============================================================================

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions are permitted.")]

use std::collections::HashMap;

use opspilot_core::ModuleCategory;
use opspilot_core::ModuleId;
use opspilot_core::ModuleManifest;
use opspilot_kernel::resolve_order;
use proptest::prelude::*;

/// Builds `node_count` manifests `m0..mN`, where `mi` may depend on any `mj`
/// with `j < i`. Depending only on lower indices makes every graph this can
/// produce acyclic by construction.
fn acyclic_manifests(node_count: usize, edge_flags: &[bool]) -> Vec<ModuleManifest> {
    let mut manifests = Vec::with_capacity(node_count);
    let mut flag_index = 0;
    for i in 0..node_count {
        let mut deps = Vec::new();
        for j in 0..i {
            if edge_flags.get(flag_index).copied().unwrap_or(false) {
                deps.push(ModuleId::new(format!("m{j}")));
            }
            flag_index += 1;
        }
        manifests.push(ModuleManifest::new(format!("m{i}"), "1.0.0", ModuleCategory::Detector).with_dependencies(deps));
    }
    manifests
}

proptest! {
    #[test]
    fn resolved_order_always_respects_every_dependency_edge(
        node_count in 1usize..8,
        edge_flags in prop::collection::vec(any::<bool>(), 28),
    ) {
        let manifests = acyclic_manifests(node_count, &edge_flags);
        let order = resolve_order(&manifests).expect("an acyclic graph always resolves");
        prop_assert_eq!(order.len(), manifests.len());
        let position: HashMap<&ModuleId, usize> = order.iter().enumerate().map(|(index, id)| (id, index)).collect();
        for manifest in &manifests {
            for dependency in &manifest.dependencies {
                prop_assert!(position[dependency] < position[&manifest.id]);
            }
        }
    }
}
