use envoy_policy_controller_core::{Conflict, PolicyRef, ResourceId, TargetMechanism};
use std::collections::BTreeMap;

/// A policy that targets a resource, and how it does so.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub policy: PolicyRef,
    pub mechanism: TargetMechanism,
}

/// The outcome of resolving the policies that target a single resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub winner: Option<Candidate>,
    /// Candidates that lost to the winner, in precedence order.
    pub overridden: Vec<PolicyRef>,
    pub conflict: Option<Conflict>,
}

/// Picks the policy that governs `target`.
///
/// Policies that reference the resource directly outrank policies that only
/// select it by label. Within a tier, the policy with the smallest
/// (namespace, name) wins. The result does not depend on the order of
/// `candidates`, and a policy that appears more than once is ranked by its
/// strongest mechanism.
pub fn resolve(target: &ResourceId, candidates: impl IntoIterator<Item = Candidate>) -> Resolution {
    let mut by_policy = BTreeMap::<PolicyRef, TargetMechanism>::new();
    for Candidate { policy, mechanism } in candidates {
        by_policy
            .entry(policy)
            .and_modify(|m| *m = (*m).min(mechanism))
            .or_insert(mechanism);
    }

    let mut ranked = by_policy
        .into_iter()
        .map(|(policy, mechanism)| Candidate { policy, mechanism })
        .collect::<Vec<_>>();
    ranked.sort_by(|a, b| precedence(a).cmp(&precedence(b)));

    let mut ranked = ranked.into_iter();
    let Some(winner) = ranked.next() else {
        return Resolution::default();
    };
    let rest = ranked.collect::<Vec<_>>();

    // Candidates are unique per policy, so (tier, namespace, name) is a total
    // order today. A tie is only possible if a mechanism shares a tier without
    // one.
    let tied = rest
        .iter()
        .take_while(|c| precedence(c) == precedence(&winner))
        .map(|c| c.policy.clone())
        .collect::<Vec<_>>();
    if !tied.is_empty() {
        let policies = std::iter::once(winner.policy)
            .chain(tied)
            .collect::<Vec<_>>();
        tracing::warn!(%target, ?policies, "unable to order policies");
        return Resolution {
            winner: None,
            overridden: rest
                .into_iter()
                .map(|c| c.policy)
                .filter(|p| !policies.contains(p))
                .collect(),
            conflict: Some(Conflict {
                target: target.clone(),
                policies,
            }),
        };
    }

    Resolution {
        overridden: rest.into_iter().map(|c| c.policy).collect(),
        winner: Some(winner),
        conflict: None,
    }
}

fn precedence(c: &Candidate) -> (u8, &str, &str) {
    (c.mechanism.tier(), &c.policy.namespace, &c.policy.name)
}
