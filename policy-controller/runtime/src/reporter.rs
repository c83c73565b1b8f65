use crate::{
    core::{EffectivePolicy, PolicyRef, ResourceId, TargetStatus},
    index::Resolution,
};
use std::{collections::BTreeSet, sync::Arc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A change between two successive resolutions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Change {
    /// A policy now governs a resource that it did not govern before.
    Attached(EffectivePolicy),
    /// A resource is no longer governed by `policy`.
    Detached {
        target: ResourceId,
        policy: PolicyRef,
    },
    /// A policy lost a resource to another policy.
    Overridden {
        policy: PolicyRef,
        target: ResourceId,
        by: PolicyRef,
    },
    /// A policy became invalid.
    Invalid { policy: PolicyRef, reason: String },
}

/// Logs changes to the effective policies published by the index until the
/// resolution watch closes or the process begins to shut down.
pub(crate) async fn run(
    mut rx: watch::Receiver<Arc<Resolution>>,
    drain: kubert::shutdown::Watch,
) {
    let mut prev = rx.borrow_and_update().clone();
    report(&Resolution::default(), &prev);

    let shutdown = drain.signaled();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            res = rx.changed() => {
                if res.is_err() {
                    debug!("Index closed");
                    return;
                }
            }
            _ = &mut shutdown => {
                debug!("Shutting down");
                return;
            }
        }

        let next = rx.borrow_and_update().clone();
        report(&prev, &next);
        prev = next;
    }
}

fn report(prev: &Resolution, next: &Resolution) {
    for change in diff(prev, next) {
        match change {
            Change::Attached(ep) => info!(
                target = %ep.target,
                policy = %ep.policy,
                mechanism = %ep.mechanism,
                ext_procs = ep.ext_proc.len(),
                "Attached"
            ),
            Change::Detached { target, policy } => info!(%target, %policy, "Detached"),
            Change::Overridden { policy, target, by } => {
                info!(%policy, %target, %by, "Overridden")
            }
            Change::Invalid { policy, reason } => warn!(%policy, %reason, "Invalid policy"),
        }
    }
}

/// Computes the changes between two resolutions, in a stable order.
pub(crate) fn diff(prev: &Resolution, next: &Resolution) -> Vec<Change> {
    let mut changes = Vec::new();

    let targets = prev
        .effective
        .keys()
        .chain(next.effective.keys())
        .collect::<BTreeSet<_>>();
    for target in targets {
        match (prev.effective.get(target), next.effective.get(target)) {
            (None, Some(ep)) => changes.push(Change::Attached(ep.clone())),
            (Some(old), None) => changes.push(Change::Detached {
                target: target.clone(),
                policy: old.policy.clone(),
            }),
            (Some(old), Some(new)) if old != new => {
                if old.policy != new.policy {
                    changes.push(Change::Detached {
                        target: target.clone(),
                        policy: old.policy.clone(),
                    });
                }
                changes.push(Change::Attached(new.clone()));
            }
            _ => {}
        }
    }

    for (policy, status) in &next.statuses {
        let old = prev.statuses.get(policy);
        for (target, ts) in &status.targets {
            if let TargetStatus::Overridden { by } = ts {
                if old.and_then(|s| s.targets.get(target)) != Some(ts) {
                    changes.push(Change::Overridden {
                        policy: policy.clone(),
                        target: target.clone(),
                        by: by.clone(),
                    });
                }
            }
        }

        if let Some(reason) = &status.invalid {
            if old.and_then(|s| s.invalid.as_ref()) != Some(reason) {
                changes.push(Change::Invalid {
                    policy: policy.clone(),
                    reason: reason.clone(),
                });
            }
        }
    }

    changes
}
