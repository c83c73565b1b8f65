use crate::{ExtProc, ResourceId, TargetMechanism};
use std::{collections::BTreeMap, fmt};

/// Identifies a policy resource.
///
/// The derived ordering (namespace, then name) is the tie-breaker between
/// policies that target a resource through the same mechanism.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PolicyRef {
    pub namespace: String,
    pub name: String,
}

/// The single policy that governs a target resource after conflict
/// resolution.
///
/// `ext_proc` is empty when the winning policy failed validation; an invalid
/// policy still shadows lower-precedence policies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EffectivePolicy {
    pub target: ResourceId,
    pub policy: PolicyRef,
    pub mechanism: TargetMechanism,
    pub ext_proc: Vec<ExtProc>,
}

/// Reported when precedence rules cannot order the policies that target a
/// resource.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{target} is targeted by policies that cannot be ordered: {}", display_refs(.policies))]
pub struct Conflict {
    pub target: ResourceId,
    pub policies: Vec<PolicyRef>,
}

/// Control-plane visible status of a policy after a resolution pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyStatus {
    /// Set when the policy's extension configuration failed validation.
    pub invalid: Option<String>,
    pub targets: BTreeMap<ResourceId, TargetStatus>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetStatus {
    Accepted,
    Overridden { by: PolicyRef },
    Conflicted(Conflict),
    /// The policy names a resource that does not exist.
    NoMatchingTarget,
}

// === impl PolicyRef ===

impl PolicyRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// === impl PolicyStatus ===

impl PolicyStatus {
    pub fn is_accepted(&self) -> bool {
        self.invalid.is_none()
            && self
                .targets
                .values()
                .any(|s| matches!(s, TargetStatus::Accepted))
    }
}

fn display_refs(refs: &[PolicyRef]) -> String {
    refs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
