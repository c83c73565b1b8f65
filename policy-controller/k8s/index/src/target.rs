use crate::selector;
use envoy_policy_controller_core::{ResourceId, TargetMechanism};
use envoy_policy_controller_k8s_api::{
    policy::{LocalPolicyTargetReferenceWithSectionName, PolicyTargetReferences},
    Labels,
};
use std::collections::BTreeMap;

/// A resource that policies may attach to, as observed in the cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetResource {
    pub id: ResourceId,
    pub labels: Labels,
}

/// The resources a policy targets, each with the strongest mechanism through
/// which it is targeted.
pub type TargetSet = BTreeMap<ResourceId, TargetMechanism>;

/// Computes the set of resources targeted by a policy in `namespace`.
///
/// Direct references are included whether or not the resource exists.
/// Selectors are evaluated against `candidates` in the policy's namespace and
/// are always additive, even when the legacy `targetRef` is set.
pub fn resolve<'c>(
    namespace: &str,
    refs: &PolicyTargetReferences,
    candidates: impl IntoIterator<Item = &'c TargetResource>,
) -> TargetSet {
    let mut targets = TargetSet::new();

    let direct = if refs.target_ref.is_some() {
        TargetMechanism::LegacyTargetRef
    } else {
        TargetMechanism::TargetRefs
    };
    for target_ref in refs.direct_refs() {
        insert(&mut targets, resource_id(namespace, target_ref), direct);
    }

    if refs.target_selectors.is_empty() {
        return targets;
    }
    for candidate in candidates {
        if candidate.id.namespace != namespace {
            continue;
        }
        if refs
            .target_selectors
            .iter()
            .any(|sel| selector::matches(sel, candidate))
        {
            insert(
                &mut targets,
                candidate.id.clone(),
                TargetMechanism::TargetSelector,
            );
        }
    }

    targets
}

fn insert(targets: &mut TargetSet, id: ResourceId, mechanism: TargetMechanism) {
    targets
        .entry(id)
        .and_modify(|m| *m = (*m).min(mechanism))
        .or_insert(mechanism);
}

fn resource_id(namespace: &str, target: &LocalPolicyTargetReferenceWithSectionName) -> ResourceId {
    ResourceId {
        group: target.group.clone(),
        kind: target.kind.clone(),
        namespace: namespace.to_string(),
        name: target.name.clone(),
        section_name: target.section_name.clone(),
    }
}
