use crate::labels::Map;

/// Group of the resources a [`TargetSelector`] selects when no group is set.
pub const DEFAULT_SELECTOR_GROUP: &str = "gateway.networking.k8s.io";

/// References a resource in the same namespace as the policy, optionally
/// narrowed to a named section of it (e.g. a Gateway listener).
#[derive(
    Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct LocalPolicyTargetReferenceWithSectionName {
    pub group: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

/// The targeting mechanisms a policy may use. Inlined into policy specs.
#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTargetReferences {
    /// Deprecated: use `targetRefs`/`targetSelectors` instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<LocalPolicyTargetReferenceWithSectionName>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_refs: Vec<LocalPolicyTargetReferenceWithSectionName>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_selectors: Vec<TargetSelector>,
}

/// Selects resources of a kind by their labels.
#[derive(
    Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct TargetSelector {
    /// Defaults to `gateway.networking.k8s.io`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub kind: String,
    pub match_labels: Option<Map>,
}

// === impl LocalPolicyTargetReferenceWithSectionName ===

impl LocalPolicyTargetReferenceWithSectionName {
    /// Returns the target ref kind, qualified by its group, if necessary.
    pub fn canonical_kind(&self) -> String {
        if self.group.is_empty() {
            self.kind.clone()
        } else {
            format!("{}.{}", self.kind, self.group)
        }
    }
}

// === impl PolicyTargetReferences ===

impl PolicyTargetReferences {
    /// Returns the directly referenced targets.
    ///
    /// The deprecated singular `targetRef` masks `targetRefs` entirely when it
    /// is set.
    pub fn direct_refs(&self) -> &[LocalPolicyTargetReferenceWithSectionName] {
        match self.target_ref.as_ref() {
            Some(target_ref) => std::slice::from_ref(target_ref),
            None => &self.target_refs,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.target_ref.is_none() && self.target_refs.is_empty() && self.target_selectors.is_empty()
    }
}

// === impl TargetSelector ===

impl TargetSelector {
    pub fn group(&self) -> &str {
        self.group.as_deref().unwrap_or(DEFAULT_SELECTOR_GROUP)
    }

    pub fn match_labels(&self) -> &Map {
        static EMPTY: Map = Map::new();
        self.match_labels.as_ref().unwrap_or(&EMPTY)
    }
}
