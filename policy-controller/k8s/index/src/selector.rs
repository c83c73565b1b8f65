use crate::target::TargetResource;
use envoy_policy_controller_core::CANONICAL_GROUP;
use envoy_policy_controller_k8s_api::policy::TargetSelector;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("group must be {CANONICAL_GROUP}, not {0}")]
    InvalidGroup(String),
}

/// Checks that a selector may be evaluated.
pub fn validate(selector: &TargetSelector) -> Result<(), SelectorError> {
    if selector.group() != CANONICAL_GROUP {
        return Err(SelectorError::InvalidGroup(selector.group().to_string()));
    }
    Ok(())
}

/// Returns true if `selector` selects `target`.
///
/// A selector matches resources of its group and kind that carry every one of
/// its labels. A selector without labels matches every resource of its kind. A
/// selector with a non-canonical group never matches anything.
pub fn matches(selector: &TargetSelector, target: &TargetResource) -> bool {
    if validate(selector).is_err() {
        return false;
    }

    target.id.group == selector.group()
        && target.id.kind == selector.kind
        && target.labels.contains_all(selector.match_labels())
}
