pub mod ext_proc;
pub mod extension_policy;
pub mod target_ref;

pub use self::{
    ext_proc::{
        BackendCluster, BackendRef, ExtProc, ExtProcBodyProcessingMode, ExtProcProcessingMode,
        ProcessingModeOptions,
    },
    extension_policy::{EnvoyExtensionPolicy, EnvoyExtensionPolicySpec},
    target_ref::{
        LocalPolicyTargetReferenceWithSectionName, PolicyTargetReferences, TargetSelector,
        DEFAULT_SELECTOR_GROUP,
    },
};
