use envoy_policy_controller_core::{
    BodyProcessingMode, ExtProc, ExtProcBackend, ProcessingMode, ProcessingModeOptions,
    POLICY_GROUP,
};
use envoy_policy_controller_k8s_api::policy as api;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("BackendRefs must be used, backendRef is not supported")]
    BackendRefUnsupported,

    #[error("BackendRefs must contain at least one backend")]
    MissingBackendRefs,

    #[error("BackendRefs only supports Service and Backend kind, not {0}")]
    UnsupportedBackendKind(String),

    #[error("BackendRefs only supports Core and {POLICY_GROUP} group, not {0}")]
    UnsupportedBackendGroup(String),

    #[error("invalid backend port: {0}")]
    InvalidPort(i32),
}

/// Validates an ExtProc declared by a policy in `namespace`, applying defaults
/// for unset fields.
///
/// Validation is structural: referenced backends are not required to exist.
pub fn validate(namespace: &str, ext_proc: &api::ExtProc) -> Result<ExtProc, ValidationError> {
    let cluster = &ext_proc.backend_cluster;
    if cluster.backend_ref.is_some() {
        return Err(ValidationError::BackendRefUnsupported);
    }

    let backends = cluster
        .backend_refs
        .iter()
        .flatten()
        .map(|br| backend(namespace, br))
        .collect::<Result<Vec<_>, _>>()?;
    if backends.is_empty() {
        return Err(ValidationError::MissingBackendRefs);
    }

    let message_timeout = ext_proc
        .message_timeout
        .map(Into::into)
        .unwrap_or(ExtProc::DEFAULT_MESSAGE_TIMEOUT);
    let fail_open = ext_proc.fail_open.unwrap_or(ExtProc::DEFAULT_FAIL_OPEN);
    let processing_mode = ext_proc
        .processing_mode
        .as_ref()
        .map(|mode| ProcessingMode {
            request: mode.request.as_ref().map(options),
            response: mode.response.as_ref().map(options),
        })
        .unwrap_or_default();

    Ok(ExtProc {
        backends,
        message_timeout,
        fail_open,
        processing_mode,
    })
}

fn backend(namespace: &str, br: &api::BackendRef) -> Result<ExtProcBackend, ValidationError> {
    let group = br.group();
    if !group.is_empty() && group != POLICY_GROUP {
        return Err(ValidationError::UnsupportedBackendGroup(group.to_string()));
    }

    let port = br
        .port
        .map(|port| {
            u16::try_from(port)
                .ok()
                .filter(|p| *p > 0)
                .ok_or(ValidationError::InvalidPort(port))
        })
        .transpose()?;
    let namespace = br.namespace.clone().unwrap_or_else(|| namespace.to_string());
    let name = br.name.clone();

    match br.kind() {
        "Service" => Ok(ExtProcBackend::Service {
            namespace,
            name,
            port,
        }),
        "Backend" => Ok(ExtProcBackend::Backend { namespace, name }),
        kind => Err(ValidationError::UnsupportedBackendKind(kind.to_string())),
    }
}

fn options(opts: &api::ProcessingModeOptions) -> ProcessingModeOptions {
    ProcessingModeOptions {
        body: opts.body.map(|body| match body {
            api::ExtProcBodyProcessingMode::Streamed => BodyProcessingMode::Streamed,
            api::ExtProcBodyProcessingMode::Buffered => BodyProcessingMode::Buffered,
            api::ExtProcBodyProcessingMode::BufferedPartial => BodyProcessingMode::BufferedPartial,
        }),
    }
}
