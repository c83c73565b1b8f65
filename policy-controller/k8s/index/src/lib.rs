//! Envoy Extension Policy Index
//!
//! The index determines which `EnvoyExtensionPolicy` governs each Gateway API resource. It watches
//! the following cluster resources:
//!
//! - Each `EnvoyExtensionPolicy` targets resources in its own namespace, either directly by
//!   reference (`targetRef`, `targetRefs`) or by label (`targetSelectors`).
//! - Each `Gateway`, `HTTPRoute`, and `GRPCRoute` is a candidate target. Only its identity and
//!   labels are indexed.
//!
//! ```text
//! [ EnvoyExtensionPolicy ] -> [ targetRef(s) ] -> [ Gateway | HTTPRoute | GRPCRoute ]
//!                          -> [ targetSelectors ] --^
//! ```
//!
//! When several policies target the same resource, direct references outrank selectors, and ties
//! are broken by the policy's namespace and name. The result of each resolution pass is published
//! on a watch so that consumers always observe a complete, consistent view.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod conflict;
pub mod ext_proc;
mod index;
pub mod metrics;
pub mod resolve;
pub mod selector;
pub mod target;


pub use self::{
    index::{Index, SharedIndex},
    resolve::{Resolution, Snapshot},
};
