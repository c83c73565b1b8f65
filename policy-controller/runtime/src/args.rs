use crate::{
    admission::Admission,
    index::{self, Index},
    k8s::{gateway, policy::EnvoyExtensionPolicy, watcher, Client, Resource},
    reporter,
};
use anyhow::{bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "policy", about = "An Envoy extension policy controller")]
pub struct Args {
    #[clap(
        long,
        default_value = "envoy=info,warn",
        env = "ENVOY_POLICY_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Disables the admission controller server.
    #[clap(long)]
    admission_controller_disabled: bool,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            admission_controller_disabled,
        } = self;

        let server = if admission_controller_disabled {
            None
        } else {
            Some(server)
        };

        let index = Index::shared();

        let mut prom = <Registry>::default();
        index::metrics::register(
            prom.sub_registry_with_prefix("extension_policy_index"),
            index.clone(),
        );
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(server)
            .build()
            .await?;

        // Spawn resource watches.

        let policies = runtime.watch_all::<EnvoyExtensionPolicy>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), policies)
                .instrument(info_span!("envoyextensionpolicies")),
        );

        if api_resource_exists::<gateway::Gateway>(&runtime.client()).await {
            let gateways = runtime.watch_all::<gateway::Gateway>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(index.clone(), gateways)
                    .instrument(info_span!("gateways.gateway.networking.k8s.io")),
            );
        } else {
            tracing::warn!(
                "gateways.gateway.networking.k8s.io resource kind not found, skipping watches"
            );
        }

        if api_resource_exists::<gateway::HTTPRoute>(&runtime.client()).await {
            let http_routes = runtime.watch_all::<gateway::HTTPRoute>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(index.clone(), http_routes)
                    .instrument(info_span!("httproutes.gateway.networking.k8s.io")),
            );
        } else {
            tracing::warn!(
                "httproutes.gateway.networking.k8s.io resource kind not found, skipping watches"
            );
        }

        if api_resource_exists::<gateway::GRPCRoute>(&runtime.client()).await {
            let grpc_routes = runtime.watch_all::<gateway::GRPCRoute>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(index.clone(), grpc_routes)
                    .instrument(info_span!("grpcroutes.gateway.networking.k8s.io")),
            );
        } else {
            tracing::warn!(
                "grpcroutes.gateway.networking.k8s.io resource kind not found, skipping watches"
            );
        }

        // Report effective policy changes as the index publishes them.
        let resolutions = index.read().resolution_rx();
        tokio::spawn(
            reporter::run(resolutions, runtime.shutdown_handle())
                .instrument(info_span!("reporter")),
        );

        let runtime = runtime.spawn_server(Admission::new);

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    client
        .list_api_group_resources(&T::api_version(&dt))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt))
}
