pub use envoy_policy_controller_core as core;
pub use envoy_policy_controller_k8s_api as k8s;
pub use envoy_policy_controller_k8s_index as index;

mod admission;
mod args;
mod reporter;

pub use self::args::Args;
