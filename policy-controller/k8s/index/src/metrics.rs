use crate::index::SharedIndex;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeMetric},
    metrics::{gauge::ConstGauge, MetricType},
    registry::Registry,
};
use std::collections::BTreeMap;

#[derive(Debug)]
struct Instrumented(SharedIndex);

pub fn register(reg: &mut Registry, index: SharedIndex) {
    reg.register_collector(Box::new(Instrumented(index)));
}

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let this = self.0.read();
        let snapshot = this.snapshot();

        let mut policies = BTreeMap::<&str, u32>::new();
        for policy in snapshot.policies.keys() {
            *policies.entry(policy.namespace.as_str()).or_default() += 1;
        }
        let mut policies_encoder = encoder.encode_descriptor(
            "policy_index_size",
            "The number of extension policies in index",
            None,
            MetricType::Gauge,
        )?;
        for (ns, count) in policies {
            let labels = [("namespace", ns)];
            let gauge = ConstGauge::new(count);
            gauge.encode(policies_encoder.encode_family(&labels)?)?;
        }

        let mut targets = BTreeMap::<&str, u32>::new();
        for target in snapshot.targets.keys() {
            *targets.entry(target.namespace.as_str()).or_default() += 1;
        }
        let mut targets_encoder = encoder.encode_descriptor(
            "target_index_size",
            "The number of policy target resources in index",
            None,
            MetricType::Gauge,
        )?;
        for (ns, count) in targets {
            let labels = [("namespace", ns)];
            let gauge = ConstGauge::new(count);
            gauge.encode(targets_encoder.encode_family(&labels)?)?;
        }

        let resolution = this.resolution();
        for (name, help, value) in [
            (
                "effective_policies",
                "The number of targets governed by an extension policy",
                resolution.effective.len(),
            ),
            (
                "invalid_policies",
                "The number of extension policies that failed validation",
                resolution.invalid_policies(),
            ),
            (
                "overridden_targets",
                "The number of policy targets overridden by another policy",
                resolution.overridden_targets(),
            ),
        ] {
            let gauge = ConstGauge::new(value as u32);
            gauge.encode(encoder.encode_descriptor(name, help, None, MetricType::Gauge)?)?;
        }

        Ok(())
    }
}
