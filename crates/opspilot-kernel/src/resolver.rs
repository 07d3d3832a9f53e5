// crates/opspilot-kernel/src/resolver.rs
// ============================================================================
// Module: Dependency Resolver
// Description: Topological ordering of module manifests with cycle
// detection, breaking ties lexicographically for determinism.
// Purpose: Turn a set of manifests into a deterministic startup order.
// Dependencies: opspilot-core
// ============================================================================

//! ## Overview
//! [`resolve_order`] builds a directed graph where an edge `A -> B` means "A
//! depends on B", verifies every dependency is present and non-self-
//! referential, then runs Kahn's algorithm with a lexicographically ordered
//! ready set so the emitted order is deterministic. If the emitted order is
//! shorter than the node count, the unresolved remainder is a cycle.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use opspilot_core::DependencyError;
use opspilot_core::ModuleId;
use opspilot_core::ModuleManifest;

/// Computes a startup order for `manifests` satisfying every dependency
/// edge, breaking ties lexicographically by module id.
///
/// # Errors
///
/// Returns [`DependencyError::SelfLoop`] if a manifest depends on itself,
/// [`DependencyError::Missing`] if a referenced dependency is not present in
/// `manifests`, or [`DependencyError::Cycle`] if the graph cannot be fully
/// ordered.
pub fn resolve_order(manifests: &[ModuleManifest]) -> Result<Vec<ModuleId>, DependencyError> {
    let known: BTreeSet<&ModuleId> = manifests.iter().map(|m| &m.id).collect();

    for manifest in manifests {
        for dependency in &manifest.dependencies {
            if dependency == &manifest.id {
                return Err(DependencyError::SelfLoop(manifest.id.clone()));
            }
            if !known.contains(dependency) {
                return Err(DependencyError::Missing {
                    module_id: manifest.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }

    let mut in_degree: BTreeMap<ModuleId, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<ModuleId, Vec<ModuleId>> = BTreeMap::new();
    for manifest in manifests {
        in_degree.entry(manifest.id.clone()).or_insert(0);
        for dependency in &manifest.dependencies {
            *in_degree.entry(manifest.id.clone()).or_insert(0) += 1;
            dependents.entry(dependency.clone()).or_default().push(manifest.id.clone());
        }
    }

    let mut ready: BTreeSet<ModuleId> = in_degree.iter().filter(|(_, degree)| **degree == 0).map(|(id, _)| id.clone()).collect();
    let mut order = Vec::with_capacity(manifests.len());

    while let Some(id) = ready.iter().next().cloned() {
        ready.remove(&id);
        order.push(id.clone());
        if let Some(deps) = dependents.get(&id) {
            for dependent in deps {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent.clone());
                    }
                }
            }
        }
    }

    if order.len() != manifests.len() {
        let resolved: BTreeSet<&ModuleId> = order.iter().collect();
        let residual: Vec<ModuleId> = manifests.iter().map(|m| &m.id).filter(|id| !resolved.contains(id)).cloned().collect();
        return Err(DependencyError::Cycle(residual));
    }

    Ok(order)
}
