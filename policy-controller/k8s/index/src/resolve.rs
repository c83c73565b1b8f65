use crate::{
    conflict::{self, Candidate},
    ext_proc, target,
    target::TargetResource,
};
use envoy_policy_controller_core::{
    EffectivePolicy, PolicyRef, PolicyStatus, ResourceId, TargetStatus,
};
use envoy_policy_controller_k8s_api::policy::EnvoyExtensionPolicySpec;
use std::{collections::BTreeMap, sync::Arc};

/// The observed policies and target resources that a resolution pass reads.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub policies: BTreeMap<PolicyRef, Arc<EnvoyExtensionPolicySpec>>,
    pub targets: BTreeMap<ResourceId, TargetResource>,
}

/// The result of a resolution pass. Rebuilt from scratch on every pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub effective: BTreeMap<ResourceId, EffectivePolicy>,
    pub statuses: BTreeMap<PolicyRef, PolicyStatus>,
}

/// Determines the policy that governs each targeted resource.
///
/// This is a pure function of the snapshot.
pub fn resolve(snapshot: &Snapshot) -> Resolution {
    let mut statuses = BTreeMap::new();
    let mut ext_procs = BTreeMap::new();
    let mut by_target = BTreeMap::<ResourceId, Vec<Candidate>>::new();

    for (policy, spec) in &snapshot.policies {
        let targets = target::resolve(
            &policy.namespace,
            &spec.targets,
            snapshot.targets_in(&policy.namespace),
        );
        tracing::trace!(%policy, ?targets);
        for (id, mechanism) in targets {
            by_target.entry(id).or_default().push(Candidate {
                policy: policy.clone(),
                mechanism,
            });
        }

        let mut status = PolicyStatus::default();
        match spec
            .ext_proc
            .iter()
            .map(|ep| ext_proc::validate(&policy.namespace, ep))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(validated) => {
                ext_procs.insert(policy.clone(), validated);
            }
            Err(error) => {
                tracing::debug!(%policy, %error, "invalid policy");
                status.invalid = Some(error.to_string());
            }
        }
        statuses.insert(policy.clone(), status);
    }

    let mut effective = BTreeMap::new();
    for (id, candidates) in by_target {
        let exists = snapshot.targets.contains_key(&id.without_section());
        let resolved = conflict::resolve(&id, candidates);

        let mut set_status = |policy: &PolicyRef, status: TargetStatus| {
            let status = if exists {
                status
            } else {
                TargetStatus::NoMatchingTarget
            };
            if let Some(s) = statuses.get_mut(policy) {
                s.targets.insert(id.clone(), status);
            }
        };

        if let Some(conflict) = resolved.conflict {
            for policy in &conflict.policies {
                set_status(policy, TargetStatus::Conflicted(conflict.clone()));
            }
            for policy in &resolved.overridden {
                set_status(policy, TargetStatus::Conflicted(conflict.clone()));
            }
            continue;
        }

        let Some(winner) = resolved.winner else {
            continue;
        };
        set_status(&winner.policy, TargetStatus::Accepted);
        for policy in &resolved.overridden {
            set_status(
                policy,
                TargetStatus::Overridden {
                    by: winner.policy.clone(),
                },
            );
        }
        if !exists {
            continue;
        }

        effective.insert(
            id.clone(),
            EffectivePolicy {
                ext_proc: ext_procs.get(&winner.policy).cloned().unwrap_or_default(),
                target: id,
                policy: winner.policy,
                mechanism: winner.mechanism,
            },
        );
    }

    Resolution {
        effective,
        statuses,
    }
}

// === impl Snapshot ===

impl Snapshot {
    pub fn targets_in<'s>(
        &'s self,
        namespace: &'s str,
    ) -> impl Iterator<Item = &'s TargetResource> {
        self.targets
            .values()
            .filter(move |t| t.id.namespace == namespace)
    }
}

// === impl Resolution ===

impl Resolution {
    /// Returns the effective policy for a resource.
    ///
    /// A policy attached to a section of a resource (e.g. a Gateway listener)
    /// takes precedence over one attached to the resource as a whole.
    pub fn effective_policy(&self, id: &ResourceId) -> Option<&EffectivePolicy> {
        self.effective
            .get(id)
            .or_else(|| self.effective.get(&id.without_section()))
    }

    pub fn invalid_policies(&self) -> usize {
        self.statuses.values().filter(|s| s.invalid.is_some()).count()
    }

    pub fn overridden_targets(&self) -> usize {
        self.statuses
            .values()
            .flat_map(|s| s.targets.values())
            .filter(|t| matches!(t, TargetStatus::Overridden { .. }))
            .count()
    }
}
