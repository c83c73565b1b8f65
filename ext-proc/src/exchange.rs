use crate::processor::{
    Direction, ImmediateResponse, Message, ProcessingRequest, ProcessingResponse, Processor,
};
use bytes::{Bytes, BytesMut};
use envoy_policy_controller_core::{BodyProcessingMode, ExtProc, ProcessingModeOptions};
use futures::prelude::*;
use http::HeaderMap;
use std::time::Duration;
use tokio::{sync::mpsc, time};
use tracing::{debug, trace};

/// The number of body bytes an exchange buffers when no limit is configured.
pub const DEFAULT_BUFFER_LIMIT: usize = 32 * 1024;

/// Drives one request/response exchange through an external processor.
///
/// Each call to [`Exchange::process`] handles one direction of the exchange.
/// The exchange holds no state shared with other exchanges.
#[derive(Debug)]
pub struct Exchange<P> {
    config: ExtProc,
    processor: P,
    buffer_limit: usize,
    state: State,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    HeadersSent,
    BodyStreaming,
    BodyBuffering,
    BodyBufferingPartial,
    BodySkipped,
    Completed,
    Failed(Failure),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Failure {
    /// The processor did not respond within the message timeout.
    Timeout,
    /// The processor could not be reached.
    Unavailable,
    /// A buffered body exceeded the buffer limit.
    OverLimit,
    /// The downstream consumer went away.
    Cancelled,
}

/// How a direction of an exchange completed.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Processed,
    /// The exchange failed, and the original traffic was passed through.
    FailedOpen(Failure),
    /// The processor answered on behalf of the upstream.
    Rejected(ImmediateResponse),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("external processor did not respond within {0:?}")]
    Timeout(Duration),

    #[error("external processor unavailable")]
    Unavailable,

    #[error("body exceeds the {limit} byte buffer limit")]
    OverLimit { limit: usize },

    #[error("exchange cancelled")]
    Cancelled,
}

enum Interrupt {
    /// `pending` holds original body chunks that were read but not forwarded.
    Failed {
        failure: Failure,
        pending: Vec<Bytes>,
    },
    Rejected(ImmediateResponse),
}

type Downstream = mpsc::Sender<Result<Bytes, Error>>;

// === impl Exchange ===

impl<P: Processor> Exchange<P> {
    pub fn new(config: ExtProc, processor: P) -> Self {
        Self {
            config,
            processor,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            state: State::Idle,
        }
    }

    pub fn with_buffer_limit(self, buffer_limit: usize) -> Self {
        Self {
            buffer_limit,
            ..self
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Processes one direction of the exchange.
    ///
    /// `headers` are mutated in place as the processor directs, and restored
    /// to their original value if the exchange fails. Body chunks, possibly
    /// replaced by the processor, are sent on `downstream`. When the exchange
    /// fails closed, the error is also sent on `downstream`.
    pub async fn process<B>(
        &mut self,
        direction: Direction,
        headers: &mut HeaderMap,
        body: B,
        downstream: &Downstream,
    ) -> Result<Outcome, Error>
    where
        B: Stream<Item = Bytes> + Unpin,
    {
        self.state = State::Idle;
        let mut body = body.fuse();
        // Mutations are undone if a later send point fails.
        let original = headers.clone();

        let result = match self.mode(direction).cloned() {
            Some(opts) => self.run(direction, opts, headers, &mut body, downstream).await,
            None => {
                trace!(%direction, "Not sent to processor");
                self.state = State::BodySkipped;
                Ok(())
            }
        };

        let (failure, pending) = match result {
            Ok(()) => match pass_through(Vec::new(), &mut body, downstream).await {
                Ok(()) => {
                    self.state = State::Completed;
                    return Ok(Outcome::Processed);
                }
                Err(failure) => (failure, Vec::new()),
            },
            Err(Interrupt::Rejected(rsp)) => {
                debug!(%direction, status = %rsp.status, "Rejected by processor");
                self.state = State::Completed;
                return Ok(Outcome::Rejected(rsp));
            }
            Err(Interrupt::Failed { failure, pending }) => (failure, pending),
        };

        *headers = original;
        self.state = State::Failed(failure);
        if self.config.fail_open && failure != Failure::Cancelled {
            debug!(%direction, ?failure, "Failing open");
            return match pass_through(pending, &mut body, downstream).await {
                Ok(()) => Ok(Outcome::FailedOpen(failure)),
                Err(failure) => {
                    self.state = State::Failed(failure);
                    Err(self.error(failure))
                }
            };
        }

        let error = self.error(failure);
        debug!(%direction, %error, "Failing closed");
        let _ = downstream.send(Err(error.clone())).await;
        Err(error)
    }

    async fn run<B>(
        &mut self,
        direction: Direction,
        opts: ProcessingModeOptions,
        headers: &mut HeaderMap,
        body: &mut B,
        downstream: &Downstream,
    ) -> Result<(), Interrupt>
    where
        B: Stream<Item = Bytes> + Unpin,
    {
        self.state = State::HeadersSent;
        let rsp = self
            .call(direction, Message::Headers(headers.clone()), downstream)
            .await
            .map_err(Interrupt::failed)?;
        match rsp {
            ProcessingResponse::Headers(mutation) => mutation.apply(headers),
            ProcessingResponse::Reject(rsp) => return Err(Interrupt::Rejected(rsp)),
            ProcessingResponse::Continue | ProcessingResponse::Body(_) => {}
        }

        match opts.body {
            None => {
                self.state = State::BodySkipped;
                Ok(())
            }
            Some(BodyProcessingMode::Streamed) => self.stream(direction, body, downstream).await,
            Some(BodyProcessingMode::Buffered) => {
                self.buffer(direction, false, body, downstream).await
            }
            Some(BodyProcessingMode::BufferedPartial) => {
                self.buffer(direction, true, body, downstream).await
            }
        }
    }

    async fn stream<B>(
        &mut self,
        direction: Direction,
        body: &mut B,
        downstream: &Downstream,
    ) -> Result<(), Interrupt>
    where
        B: Stream<Item = Bytes> + Unpin,
    {
        self.state = State::BodyStreaming;
        while let Some(chunk) = body.next().await {
            let message = Message::Body {
                chunk: chunk.clone(),
                end_of_stream: false,
            };
            let rsp = match self.call(direction, message, downstream).await {
                Ok(rsp) => rsp,
                Err(failure) => {
                    return Err(Interrupt::Failed {
                        failure,
                        pending: vec![chunk],
                    })
                }
            };
            let chunk = replace(chunk, rsp)?;
            forward(chunk, downstream).await.map_err(Interrupt::failed)?;
        }

        let message = Message::Body {
            chunk: Bytes::new(),
            end_of_stream: true,
        };
        let rsp = self
            .call(direction, message, downstream)
            .await
            .map_err(Interrupt::failed)?;
        let tail = replace(Bytes::new(), rsp)?;
        forward(tail, downstream).await.map_err(Interrupt::failed)
    }

    async fn buffer<B>(
        &mut self,
        direction: Direction,
        partial: bool,
        body: &mut B,
        downstream: &Downstream,
    ) -> Result<(), Interrupt>
    where
        B: Stream<Item = Bytes> + Unpin,
    {
        self.state = if partial {
            State::BodyBufferingPartial
        } else {
            State::BodyBuffering
        };

        let limit = self.buffer_limit;
        let mut chunks = Vec::new();
        let mut len = 0;
        let mut over_limit = false;
        while let Some(chunk) = body.next().await {
            len += chunk.len();
            chunks.push(chunk);
            if len > limit {
                over_limit = true;
                break;
            }
        }

        if over_limit && !partial {
            debug!(%direction, limit, "Body exceeds buffer limit");
            return Err(Interrupt::Failed {
                failure: Failure::OverLimit,
                pending: chunks,
            });
        }

        let mut buffered = BytesMut::with_capacity(len);
        for chunk in chunks {
            buffered.extend_from_slice(&chunk);
        }
        let rest = over_limit.then(|| buffered.split_off(limit).freeze());
        let buffered = buffered.freeze();

        let message = Message::Body {
            chunk: buffered.clone(),
            end_of_stream: rest.is_none(),
        };
        let rsp = match self.call(direction, message, downstream).await {
            Ok(rsp) => rsp,
            Err(failure) => {
                return Err(Interrupt::Failed {
                    failure,
                    pending: std::iter::once(buffered).chain(rest).collect(),
                })
            }
        };

        let chunk = replace(buffered, rsp)?;
        forward(chunk, downstream)
            .await
            .map_err(Interrupt::failed)?;
        if let Some(rest) = rest {
            trace!(%direction, bytes = rest.len(), "Forwarding unprocessed remainder");
            forward(rest, downstream).await.map_err(Interrupt::failed)?;
        }
        Ok(())
    }

    /// Sends a message to the processor, waiting at most the message timeout
    /// for its response. Gives up early if the downstream consumer goes away.
    async fn call(
        &self,
        direction: Direction,
        message: Message,
        downstream: &Downstream,
    ) -> Result<ProcessingResponse, Failure> {
        trace!(%direction, ?message, "Sending");
        let req = ProcessingRequest { direction, message };
        tokio::select! {
            res = time::timeout(self.config.message_timeout, self.processor.process(req)) => {
                match res {
                    Ok(Ok(rsp)) => {
                        trace!(?rsp);
                        Ok(rsp)
                    }
                    Ok(Err(error)) => {
                        debug!(%direction, %error);
                        Err(Failure::Unavailable)
                    }
                    Err(_) => {
                        debug!(%direction, timeout = ?self.config.message_timeout, "Processor timed out");
                        Err(Failure::Timeout)
                    }
                }
            }
            _ = downstream.closed() => Err(Failure::Cancelled),
        }
    }

    fn mode(&self, direction: Direction) -> Option<&ProcessingModeOptions> {
        match direction {
            Direction::Request => self.config.processing_mode.request.as_ref(),
            Direction::Response => self.config.processing_mode.response.as_ref(),
        }
    }

    fn error(&self, failure: Failure) -> Error {
        match failure {
            Failure::Timeout => Error::Timeout(self.config.message_timeout),
            Failure::Unavailable => Error::Unavailable,
            Failure::OverLimit => Error::OverLimit {
                limit: self.buffer_limit,
            },
            Failure::Cancelled => Error::Cancelled,
        }
    }
}

// === impl Interrupt ===

impl Interrupt {
    fn failed(failure: Failure) -> Self {
        Self::Failed {
            failure,
            pending: Vec::new(),
        }
    }
}

fn replace(chunk: Bytes, rsp: ProcessingResponse) -> Result<Bytes, Interrupt> {
    match rsp {
        ProcessingResponse::Body(replacement) => Ok(replacement),
        ProcessingResponse::Reject(rsp) => Err(Interrupt::Rejected(rsp)),
        ProcessingResponse::Continue | ProcessingResponse::Headers(_) => Ok(chunk),
    }
}

async fn forward(chunk: Bytes, downstream: &Downstream) -> Result<(), Failure> {
    if chunk.is_empty() {
        return Ok(());
    }
    downstream
        .send(Ok(chunk))
        .await
        .map_err(|_| Failure::Cancelled)
}

/// Forwards `pending` and the rest of `body` downstream without processing.
async fn pass_through<B>(
    pending: Vec<Bytes>,
    body: &mut B,
    downstream: &Downstream,
) -> Result<(), Failure>
where
    B: Stream<Item = Bytes> + Unpin,
{
    for chunk in pending {
        forward(chunk, downstream).await?;
    }
    while let Some(chunk) = body.next().await {
        forward(chunk, downstream).await?;
    }
    Ok(())
}
