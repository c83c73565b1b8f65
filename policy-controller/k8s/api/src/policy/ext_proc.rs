use crate::duration::Duration;

/// Configures an external processing filter.
#[derive(
    Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ExtProc {
    #[serde(flatten)]
    pub backend_cluster: BackendCluster,

    /// The timeout for a response to be returned from the external processor.
    /// Defaults to 200ms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_timeout: Option<Duration>,

    /// Whether requests or responses that cannot be processed due to
    /// connectivity to the external processor are passed through rather than
    /// terminated. Defaults to false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_open: Option<bool>,

    /// Defaults to sending neither headers nor body to the external processor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_mode: Option<ExtProcProcessingMode>,
}

/// The backend(s) that serve an extension.
///
/// Only `backendRefs` is supported. The singular `backendRef` is accepted on
/// the wire so that it can be rejected explicitly.
#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct BackendCluster {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_ref: Option<BackendRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_refs: Option<Vec<BackendRef>>,
}

#[derive(
    Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct BackendRef {
    /// Defaults to the core API group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Defaults to `Service`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ExtProcProcessingMode {
    /// When set, request headers are sent and the request body is processed
    /// according to the options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ProcessingModeOptions>,

    /// When set, response headers are sent and the response body is processed
    /// according to the options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ProcessingModeOptions>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingModeOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ExtProcBodyProcessingMode>,
}

#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
)]
pub enum ExtProcBodyProcessingMode {
    Streamed,
    Buffered,
    BufferedPartial,
}

// === impl BackendRef ===

impl BackendRef {
    pub const DEFAULT_KIND: &'static str = "Service";

    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(Self::DEFAULT_KIND)
    }

    /// The empty string denotes the core API group.
    pub fn group(&self) -> &str {
        self.group.as_deref().unwrap_or("")
    }
}
