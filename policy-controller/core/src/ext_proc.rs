use std::time::Duration;

/// A validated external processing configuration with all defaults applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtProc {
    pub backends: Vec<ExtProcBackend>,
    pub message_timeout: Duration,
    pub fail_open: bool,
    pub processing_mode: ProcessingMode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtProcBackend {
    Service {
        namespace: String,
        name: String,
        port: Option<u16>,
    },
    Backend {
        namespace: String,
        name: String,
    },
}

/// Describes whether and how each direction of an exchange is sent to the
/// external processor.
///
/// When a direction's options are absent, neither headers nor body are sent
/// for that direction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessingMode {
    pub request: Option<ProcessingModeOptions>,
    pub response: Option<ProcessingModeOptions>,
}

/// Headers are always sent for a direction that has options. The body is
/// only sent when a body mode is set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessingModeOptions {
    pub body: Option<BodyProcessingMode>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BodyProcessingMode {
    /// Chunks are sent to the processor as they arrive.
    Streamed,
    /// The whole body is buffered and sent at once. Bodies that exceed the
    /// buffer limit fail the exchange.
    Buffered,
    /// The body is buffered and sent at once, truncated to the buffer limit.
    BufferedPartial,
}

// === impl ExtProc ===

impl ExtProc {
    pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_millis(200);
    pub const DEFAULT_FAIL_OPEN: bool = false;
}
