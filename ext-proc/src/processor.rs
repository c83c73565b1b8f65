use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::{fmt, sync::Arc};

/// The half of an exchange being processed.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

/// A message sent to the external processor at a send point.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessingRequest {
    pub direction: Direction,
    pub message: Message,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Headers(HeaderMap),
    Body { chunk: Bytes, end_of_stream: bool },
}

/// The processor's reply to a [`ProcessingRequest`].
#[derive(Clone, Debug, PartialEq)]
pub enum ProcessingResponse {
    /// Leave the message as it is.
    Continue,
    Headers(HeaderMutation),
    /// Replaces the body chunk that was sent.
    Body(Bytes),
    /// Stops the exchange and answers the client directly.
    Reject(ImmediateResponse),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeaderMutation {
    pub set: Vec<(HeaderName, HeaderValue)>,
    pub remove: Vec<HeaderName>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImmediateResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// The processor could not be reached or did not produce a response.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("external processor unavailable: {0}")]
pub struct ProcessorError(pub String);

/// A connection to an external processor.
///
/// Each call corresponds to a single send point of an exchange.
#[async_trait::async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, req: ProcessingRequest) -> Result<ProcessingResponse, ProcessorError>;
}

// === impl Direction ===

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("request"),
            Self::Response => f.write_str("response"),
        }
    }
}

// === impl HeaderMutation ===

impl HeaderMutation {
    pub fn apply(self, headers: &mut HeaderMap) {
        for name in self.remove {
            headers.remove(name);
        }
        for (name, value) in self.set {
            headers.insert(name, value);
        }
    }
}

// === impl ImmediateResponse ===

impl ImmediateResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

#[async_trait::async_trait]
impl<P: Processor + ?Sized> Processor for Arc<P> {
    async fn process(
        &self,
        req: ProcessingRequest,
    ) -> Result<ProcessingResponse, ProcessorError> {
        (**self).process(req).await
    }
}
