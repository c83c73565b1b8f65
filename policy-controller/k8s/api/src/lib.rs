#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod duration;
pub mod labels;
pub mod policy;

pub use self::{duration::Duration, labels::Labels};
pub use k8s_openapi::api;
pub use kube::{
    api::{ObjectMeta, ResourceExt},
    runtime::watcher,
    Client, Resource,
};

/// Gateway API resources that policies attach to.
pub mod gateway {
    pub use gateway_api::apis::standard::{
        gateways::{Gateway, GatewaySpec},
        grpcroutes::{GRPCRoute, GRPCRouteSpec},
        httproutes::{HTTPRoute, HTTPRouteSpec},
    };
}
