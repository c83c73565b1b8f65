//! This module handles all of the indexing logic without dealing with the specifics of how
//! policies are resolved (see the `resolve` module).
//!
//! The `Index` holds the most recently observed `EnvoyExtensionPolicy` resources and the Gateway
//! API resources they may target. Every update discards the previous result and re-runs the
//! resolution pass over the current snapshot, publishing the new `Resolution` to watchers when it
//! changes. The index never writes to the cluster.

use crate::resolve::{self, Resolution, Snapshot};
use crate::target::TargetResource;
use envoy_policy_controller_core::{EffectivePolicy, PolicyRef, ResourceId};
use envoy_policy_controller_k8s_api::{
    gateway, policy::EnvoyExtensionPolicy, Labels, Resource, ResourceExt,
};
use kubert::index::NamespacedRemoved;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;

pub type SharedIndex = Arc<RwLock<Index>>;

#[derive(Debug)]
pub struct Index {
    snapshot: Snapshot,
    tx: watch::Sender<Arc<Resolution>>,
}

// === impl Index ===

impl Index {
    pub fn shared() -> SharedIndex {
        Arc::new(RwLock::new(Self::new()))
    }

    fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(Resolution::default()));
        Self {
            snapshot: Snapshot::default(),
            tx,
        }
    }

    /// Subscribes to the results of resolution passes.
    pub fn resolution_rx(&self) -> watch::Receiver<Arc<Resolution>> {
        self.tx.subscribe()
    }

    pub fn resolution(&self) -> Arc<Resolution> {
        self.tx.borrow().clone()
    }

    pub fn effective_policy(&self, id: &ResourceId) -> Option<EffectivePolicy> {
        self.tx.borrow().effective_policy(id).cloned()
    }

    pub(crate) fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    fn apply_target<T>(&mut self, resource: T)
    where
        T: Resource<DynamicType = ()>,
    {
        if self.insert_target(resource) {
            self.reindex();
        }
    }

    /// Records a target in the snapshot, returning true if the snapshot changed.
    fn insert_target<T>(&mut self, resource: T) -> bool
    where
        T: Resource<DynamicType = ()>,
    {
        let Some(namespace) = resource.namespace() else {
            let kind = T::kind(&());
            tracing::warn!(%kind, name = %resource.name_any(), "ignoring resource without a namespace");
            return false;
        };
        let id = ResourceId::new(
            T::group(&()),
            T::kind(&()),
            namespace,
            resource.name_unchecked(),
        );
        let target = TargetResource {
            id: id.clone(),
            labels: Labels::from(resource.meta().labels.as_ref()),
        };
        if self.snapshot.targets.get(&id) == Some(&target) {
            tracing::trace!(%id, "unchanged");
            return false;
        }

        tracing::debug!(%id, "indexing target");
        self.snapshot.targets.insert(id, target);
        true
    }

    fn remove_target<T>(&mut self, namespace: String, name: String) -> bool
    where
        T: Resource<DynamicType = ()>,
    {
        let id = ResourceId::new(T::group(&()), T::kind(&()), namespace, name);
        let removed = self.snapshot.targets.remove(&id).is_some();
        if removed {
            tracing::debug!(%id, "deleted target");
        }
        removed
    }

    fn delete_target<T>(&mut self, namespace: String, name: String)
    where
        T: Resource<DynamicType = ()>,
    {
        if self.remove_target::<T>(namespace, name) {
            self.reindex();
        }
    }

    /// Replaces all targets of kind `T` with `resources`, resolving once.
    fn reset_targets<T>(&mut self, resources: Vec<T>, removed: NamespacedRemoved)
    where
        T: Resource<DynamicType = ()>,
    {
        let mut changed = false;
        for resource in resources {
            changed |= self.insert_target(resource);
        }
        for (namespace, names) in removed {
            for name in names {
                changed |= self.remove_target::<T>(namespace.clone(), name);
            }
        }
        if changed {
            self.reindex();
        }
    }

    fn insert_policy(&mut self, policy: EnvoyExtensionPolicy) -> bool {
        let Some(namespace) = policy.namespace() else {
            tracing::warn!(name = %policy.name_any(), "ignoring policy without a namespace");
            return false;
        };
        let id = PolicyRef::new(namespace, policy.name_unchecked());

        if self.snapshot.policies.get(&id).map(|s| s.as_ref()) == Some(&policy.spec) {
            tracing::trace!(policy = %id, "unchanged");
            return false;
        }

        tracing::debug!(policy = %id, "indexing policy");
        self.snapshot.policies.insert(id, Arc::new(policy.spec));
        true
    }

    fn remove_policy(&mut self, namespace: String, name: String) -> bool {
        let id = PolicyRef::new(namespace, name);
        let removed = self.snapshot.policies.remove(&id).is_some();
        if removed {
            tracing::debug!(policy = %id, "deleted policy");
        }
        removed
    }

    /// Re-runs resolution over the current snapshot and publishes the result if it changed.
    fn reindex(&mut self) {
        let resolution = resolve::resolve(&self.snapshot);
        let changed = self.tx.send_if_modified(|current| {
            if **current == resolution {
                return false;
            }
            *current = Arc::new(resolution);
            true
        });
        if changed {
            tracing::debug!(
                policies = self.snapshot.policies.len(),
                targets = self.snapshot.targets.len(),
                "published resolution"
            );
        }
    }
}

impl kubert::index::IndexNamespacedResource<EnvoyExtensionPolicy> for Index {
    fn apply(&mut self, policy: EnvoyExtensionPolicy) {
        if self.insert_policy(policy) {
            self.reindex();
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        if self.remove_policy(namespace, name) {
            self.reindex();
        }
    }

    fn reset(&mut self, policies: Vec<EnvoyExtensionPolicy>, removed: NamespacedRemoved) {
        let mut changed = false;
        for policy in policies {
            changed |= self.insert_policy(policy);
        }
        for (namespace, names) in removed {
            for name in names {
                changed |= self.remove_policy(namespace.clone(), name);
            }
        }
        if changed {
            self.reindex();
        }
    }
}

impl kubert::index::IndexNamespacedResource<gateway::Gateway> for Index {
    fn apply(&mut self, gateway: gateway::Gateway) {
        self.apply_target(gateway)
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.delete_target::<gateway::Gateway>(namespace, name)
    }

    fn reset(&mut self, gateways: Vec<gateway::Gateway>, removed: NamespacedRemoved) {
        self.reset_targets(gateways, removed)
    }
}

impl kubert::index::IndexNamespacedResource<gateway::HTTPRoute> for Index {
    fn apply(&mut self, route: gateway::HTTPRoute) {
        self.apply_target(route)
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.delete_target::<gateway::HTTPRoute>(namespace, name)
    }

    fn reset(&mut self, routes: Vec<gateway::HTTPRoute>, removed: NamespacedRemoved) {
        self.reset_targets(routes, removed)
    }
}

impl kubert::index::IndexNamespacedResource<gateway::GRPCRoute> for Index {
    fn apply(&mut self, route: gateway::GRPCRoute) {
        self.apply_target(route)
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.delete_target::<gateway::GRPCRoute>(namespace, name)
    }

    fn reset(&mut self, routes: Vec<gateway::GRPCRoute>, removed: NamespacedRemoved) {
        self.reset_targets(routes, removed)
    }
}
