#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod ext_proc;
pub mod policy;
pub mod target;

pub use self::{
    ext_proc::{BodyProcessingMode, ExtProc, ExtProcBackend, ProcessingMode, ProcessingModeOptions},
    policy::{Conflict, EffectivePolicy, PolicyRef, PolicyStatus, TargetStatus},
    target::{ResourceId, TargetMechanism},
};

/// The API group of the resources a policy may attach to.
pub const CANONICAL_GROUP: &str = "gateway.networking.k8s.io";

/// The API group of the policy resources themselves, and of `Backend` resources.
pub const POLICY_GROUP: &str = "gateway.envoyproxy.io";
