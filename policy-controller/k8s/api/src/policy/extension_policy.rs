use super::{ExtProc, PolicyTargetReferences};

/// Attaches extensions to Gateway API resources.
#[derive(
    Clone,
    Debug,
    PartialEq,
    kube::CustomResource,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "gateway.envoyproxy.io",
    version = "v1alpha1",
    kind = "EnvoyExtensionPolicy",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyExtensionPolicySpec {
    #[serde(flatten)]
    pub targets: PolicyTargetReferences,

    /// External processing filters, applied in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ext_proc: Vec<ExtProc>,
}
