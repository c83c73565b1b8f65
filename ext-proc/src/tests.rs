use super::*;
use bytes::Bytes;
use envoy_policy_controller_core::{
    BodyProcessingMode, ExtProcBackend, ProcessingMode, ProcessingModeOptions,
};
use futures::{future, stream};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, time};

enum Reply {
    Respond(ProcessingResponse),
    Fail,
    Hang,
}

/// A processor that records every request and replies as scripted.
struct Scripted<F> {
    seen: Seen,
    reply: F,
}

#[async_trait::async_trait]
impl<F> Processor for Scripted<F>
where
    F: Fn(&ProcessingRequest) -> Reply + Send + Sync,
{
    async fn process(&self, req: ProcessingRequest) -> Result<ProcessingResponse, ProcessorError> {
        let reply = (self.reply)(&req);
        self.seen.lock().push(req);
        match reply {
            Reply::Respond(rsp) => Ok(rsp),
            Reply::Fail => Err(ProcessorError("connection refused".to_string())),
            Reply::Hang => future::pending().await,
        }
    }
}

/// An incoming body of 2048 bytes, in 256 byte chunks.
fn large_body() -> (Bytes, Vec<Bytes>) {
    let body = (0..2048).map(|i| (i % 251) as u8).collect::<Vec<_>>();
    let body = Bytes::from(body);
    let chunks = (0..8).map(|i| body.slice(i * 256..(i + 1) * 256)).collect();
    (body, chunks)
}

fn chunks(parts: &[&'static str]) -> Vec<Bytes> {
    parts.iter().map(|p| Bytes::from_static(p.as_bytes())).collect()
}

fn config(
    request: Option<Option<BodyProcessingMode>>,
    response: Option<Option<BodyProcessingMode>>,
    fail_open: bool,
) -> ExtProc {
    ExtProc {
        backends: vec![ExtProcBackend::Service {
            namespace: "ns-0".to_string(),
            name: "proc".to_string(),
            port: Some(9002),
        }],
        message_timeout: ExtProc::DEFAULT_MESSAGE_TIMEOUT,
        fail_open,
        processing_mode: ProcessingMode {
            request: request.map(|body| ProcessingModeOptions { body }),
            response: response.map(|body| ProcessingModeOptions { body }),
        },
    }
}

type Seen = Arc<Mutex<Vec<ProcessingRequest>>>;

fn exchange<F>(config: ExtProc, reply: F) -> (Exchange<Scripted<F>>, Seen)
where
    F: Fn(&ProcessingRequest) -> Reply + Send + Sync,
{
    let seen = Arc::new(Mutex::new(Vec::new()));
    let processor = Scripted {
        seen: seen.clone(),
        reply,
    };
    (Exchange::new(config, processor), seen)
}

fn continue_all(_: &ProcessingRequest) -> Reply {
    Reply::Respond(ProcessingResponse::Continue)
}

/// Rewrites headers, then replies to body messages with `body`.
fn mutate_headers_then(
    body: fn() -> Reply,
) -> impl Fn(&ProcessingRequest) -> Reply + Send + Sync {
    move |req: &ProcessingRequest| match req.message {
        Message::Headers(_) => Reply::Respond(ProcessingResponse::Headers(HeaderMutation {
            set: vec![(
                HeaderName::from_static("x-ext-proc"),
                HeaderValue::from_static("mutated"),
            )],
            remove: vec![HeaderName::from_static("x-orig")],
        })),
        Message::Body { .. } => body(),
    }
}

fn original_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-orig", HeaderValue::from_static("1"));
    headers
}

/// Processes a body, returning the outcome along with everything the downstream consumer received.
async fn process<P: Processor>(
    exchange: &mut Exchange<P>,
    direction: Direction,
    headers: &mut HeaderMap,
    body: Vec<Bytes>,
) -> (Result<Outcome, Error>, Vec<Result<Bytes, Error>>) {
    let (tx, mut rx) = mpsc::channel(64);
    let res = exchange
        .process(direction, headers, stream::iter(body), &tx)
        .await;
    drop(tx);
    let mut received = Vec::new();
    while let Some(item) = rx.recv().await {
        received.push(item);
    }
    (res, received)
}

fn concat(received: &[Result<Bytes, Error>]) -> Bytes {
    let mut body = Vec::new();
    for item in received {
        body.extend_from_slice(item.as_ref().expect("downstream must not see an error"));
    }
    Bytes::from(body)
}

fn bodies(seen: &[ProcessingRequest]) -> Vec<(Bytes, bool)> {
    seen.iter()
        .filter_map(|req| match &req.message {
            Message::Body {
                chunk,
                end_of_stream,
            } => Some((chunk.clone(), *end_of_stream)),
            Message::Headers(_) => None,
        })
        .collect()
}

#[tokio::test]
async fn buffered_over_limit_fails_closed() {
    let (_, body) = large_body();
    let (exchange, seen) = exchange(
        config(Some(Some(BodyProcessingMode::Buffered)), None, false),
        continue_all,
    );
    let mut exchange = exchange.with_buffer_limit(1024);

    let (res, received) =
        process(&mut exchange, Direction::Request, &mut HeaderMap::new(), body).await;

    assert_eq!(res, Err(Error::OverLimit { limit: 1024 }));
    assert_eq!(received, vec![Err(Error::OverLimit { limit: 1024 })]);
    assert_eq!(exchange.state(), &State::Failed(Failure::OverLimit));
    // Only the headers reached the processor.
    assert_eq!(seen.lock().len(), 1);
    assert!(bodies(&seen.lock()).is_empty());
}

#[tokio::test]
async fn buffered_over_limit_fails_open() {
    let (original, body) = large_body();
    let (exchange, seen) = exchange(
        config(Some(Some(BodyProcessingMode::Buffered)), None, true),
        continue_all,
    );
    let mut exchange = exchange.with_buffer_limit(1024);

    let (res, received) =
        process(&mut exchange, Direction::Request, &mut HeaderMap::new(), body).await;

    assert_eq!(res, Ok(Outcome::FailedOpen(Failure::OverLimit)));
    assert_eq!(concat(&received), original);
    assert!(bodies(&seen.lock()).is_empty());
}

#[tokio::test]
async fn buffered_over_limit_fails_open_with_original_headers() {
    let (original, body) = large_body();
    let (exchange, _) = exchange(
        config(Some(Some(BodyProcessingMode::Buffered)), None, true),
        mutate_headers_then(|| Reply::Respond(ProcessingResponse::Continue)),
    );
    let mut exchange = exchange.with_buffer_limit(1024);

    let mut headers = original_headers();
    let (res, received) = process(&mut exchange, Direction::Request, &mut headers, body).await;

    assert_eq!(res, Ok(Outcome::FailedOpen(Failure::OverLimit)));
    assert_eq!(headers, original_headers());
    assert_eq!(concat(&received), original);
}

#[tokio::test]
async fn buffered_partial_forwards_limit_once() {
    for fail_open in [false, true] {
        let (original, body) = large_body();
        let (exchange, seen) = exchange(
            config(Some(Some(BodyProcessingMode::BufferedPartial)), None, fail_open),
            continue_all,
        );
        let mut exchange = exchange.with_buffer_limit(1024);

        let (res, received) =
            process(&mut exchange, Direction::Request, &mut HeaderMap::new(), body).await;

        assert_eq!(res, Ok(Outcome::Processed));
        assert_eq!(exchange.state(), &State::Completed);
        assert_eq!(bodies(&seen.lock()), vec![(original.slice(..1024), false)]);
        assert_eq!(concat(&received), original);
    }
}

#[tokio::test]
async fn buffered_body_is_replaced() {
    let (mut exchange, seen) = exchange(
        config(Some(Some(BodyProcessingMode::Buffered)), None, false),
        |req: &ProcessingRequest| match req.message {
            Message::Body { .. } => Reply::Respond(ProcessingResponse::Body(Bytes::from_static(
                b"HELLO",
            ))),
            Message::Headers(_) => Reply::Respond(ProcessingResponse::Continue),
        },
    );

    let (res, received) = process(
        &mut exchange,
        Direction::Request,
        &mut HeaderMap::new(),
        chunks(&["hello ", "world"]),
    )
    .await;

    assert_eq!(res, Ok(Outcome::Processed));
    assert_eq!(
        bodies(&seen.lock()),
        vec![(Bytes::from_static(b"hello world"), true)]
    );
    assert_eq!(concat(&received), Bytes::from_static(b"HELLO"));
}

#[tokio::test]
async fn absent_direction_is_never_sent() {
    let (mut exchange, seen) = exchange(
        config(None, Some(Some(BodyProcessingMode::Streamed)), false),
        continue_all,
    );

    let mut headers = HeaderMap::new();
    headers.insert("x-request", HeaderValue::from_static("1"));
    let (res, received) = process(
        &mut exchange,
        Direction::Request,
        &mut headers,
        chunks(&["ping"]),
    )
    .await;
    assert_eq!(res, Ok(Outcome::Processed));
    assert_eq!(concat(&received), Bytes::from_static(b"ping"));
    assert!(seen.lock().is_empty());

    let mut headers = HeaderMap::new();
    headers.insert("x-response", HeaderValue::from_static("1"));
    let (res, received) = process(
        &mut exchange,
        Direction::Response,
        &mut headers,
        chunks(&["a", "b", "c"]),
    )
    .await;
    assert_eq!(res, Ok(Outcome::Processed));
    assert_eq!(concat(&received), Bytes::from_static(b"abc"));

    let seen = seen.lock();
    assert!(seen.iter().all(|req| req.direction == Direction::Response));
    assert_eq!(seen[0].message, Message::Headers(headers));
    assert_eq!(
        bodies(&seen),
        vec![
            (Bytes::from_static(b"a"), false),
            (Bytes::from_static(b"b"), false),
            (Bytes::from_static(b"c"), false),
            (Bytes::new(), true),
        ]
    );
}

#[tokio::test]
async fn streamed_chunks_are_forwarded_as_they_arrive() {
    let (mut exchange, _) = exchange(
        config(None, Some(Some(BodyProcessingMode::Streamed)), false),
        continue_all,
    );

    let (body_tx, body_rx) = mpsc::channel::<Bytes>(1);
    let body = Box::pin(stream::unfold(body_rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    }));
    let (tx, mut rx) = mpsc::channel(8);
    let mut headers = HeaderMap::new();

    let res = {
        let process = exchange.process(Direction::Response, &mut headers, body, &tx);
        tokio::pin!(process);

        body_tx
            .send(Bytes::from_static(b"first"))
            .await
            .expect("body must be read");
        let first = tokio::select! {
            _ = &mut process => panic!("body has not ended"),
            item = rx.recv() => item,
        };
        assert_eq!(first, Some(Ok(Bytes::from_static(b"first"))));

        drop(body_tx);
        process.await
    };
    assert_eq!(res, Ok(Outcome::Processed));
    assert_eq!(exchange.state(), &State::Completed);
}

#[tokio::test]
async fn headers_only_mode_skips_body() {
    let (mut exchange, seen) = exchange(
        config(Some(None), None, false),
        |_: &ProcessingRequest| {
            Reply::Respond(ProcessingResponse::Headers(HeaderMutation {
                set: vec![(
                    HeaderName::from_static("x-ext-proc"),
                    HeaderValue::from_static("seen"),
                )],
                remove: vec![HeaderName::from_static("x-drop")],
            }))
        },
    );

    let mut headers = HeaderMap::new();
    headers.insert("x-drop", HeaderValue::from_static("1"));
    headers.insert("x-keep", HeaderValue::from_static("1"));
    let (res, received) = process(
        &mut exchange,
        Direction::Request,
        &mut headers,
        chunks(&["body"]),
    )
    .await;

    assert_eq!(res, Ok(Outcome::Processed));
    assert_eq!(headers.get("x-ext-proc").unwrap(), "seen");
    assert_eq!(headers.get("x-keep").unwrap(), "1");
    assert!(headers.get("x-drop").is_none());
    assert_eq!(concat(&received), Bytes::from_static(b"body"));
    assert!(bodies(&seen.lock()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn timeout_fails_closed() {
    let (mut exchange, _) = exchange(
        config(Some(Some(BodyProcessingMode::Streamed)), None, false),
        |_: &ProcessingRequest| Reply::Hang,
    );

    let start = time::Instant::now();
    let (res, received) = process(
        &mut exchange,
        Direction::Request,
        &mut HeaderMap::new(),
        chunks(&["body"]),
    )
    .await;

    assert_eq!(res, Err(Error::Timeout(Duration::from_millis(200))));
    assert_eq!(received, vec![Err(Error::Timeout(Duration::from_millis(200)))]);
    assert_eq!(exchange.state(), &State::Failed(Failure::Timeout));
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn timeout_fails_open() {
    let (mut exchange, _) = exchange(
        config(Some(Some(BodyProcessingMode::Streamed)), None, true),
        |_: &ProcessingRequest| Reply::Hang,
    );

    let mut headers = HeaderMap::new();
    headers.insert("x-request", HeaderValue::from_static("1"));
    let original = headers.clone();
    let (res, received) = process(
        &mut exchange,
        Direction::Request,
        &mut headers,
        chunks(&["un", "modified"]),
    )
    .await;

    assert_eq!(res, Ok(Outcome::FailedOpen(Failure::Timeout)));
    assert_eq!(headers, original);
    assert_eq!(concat(&received), Bytes::from_static(b"unmodified"));
}

#[tokio::test(start_paused = true)]
async fn body_timeout_restores_headers() {
    for mode in [BodyProcessingMode::Streamed, BodyProcessingMode::Buffered] {
        for fail_open in [false, true] {
            let (mut exchange, seen) = exchange(
                config(Some(Some(mode)), None, fail_open),
                mutate_headers_then(|| Reply::Hang),
            );

            let mut headers = original_headers();
            let (res, received) = process(
                &mut exchange,
                Direction::Request,
                &mut headers,
                chunks(&["un", "modified"]),
            )
            .await;

            let timeout = Error::Timeout(Duration::from_millis(200));
            if fail_open {
                assert_eq!(res, Ok(Outcome::FailedOpen(Failure::Timeout)), "{mode:?}");
                assert_eq!(concat(&received), Bytes::from_static(b"unmodified"), "{mode:?}");
            } else {
                assert_eq!(res, Err(timeout.clone()), "{mode:?}");
                assert_eq!(received, vec![Err(timeout)], "{mode:?}");
            }
            assert_eq!(exchange.state(), &State::Failed(Failure::Timeout), "{mode:?}");
            assert_eq!(headers, original_headers(), "{mode:?}");

            // The processor saw the headers and exactly one body message.
            let seen = seen.lock();
            assert_eq!(seen.len(), 2, "{mode:?}");
            let expected = match mode {
                BodyProcessingMode::Buffered => (Bytes::from_static(b"unmodified"), true),
                _ => (Bytes::from_static(b"un"), false),
            };
            assert_eq!(bodies(&seen), vec![expected], "{mode:?}");
        }
    }
}

#[tokio::test]
async fn unavailable_processor_fails_closed() {
    let (mut exchange, _) = exchange(
        config(Some(None), None, false),
        |_: &ProcessingRequest| Reply::Fail,
    );

    let (res, received) = process(
        &mut exchange,
        Direction::Request,
        &mut HeaderMap::new(),
        chunks(&["body"]),
    )
    .await;

    assert_eq!(res, Err(Error::Unavailable));
    assert_eq!(received, vec![Err(Error::Unavailable)]);
}

#[tokio::test]
async fn mid_stream_failure_passes_remaining_chunks() {
    let (mut exchange, seen) = exchange(
        config(Some(Some(BodyProcessingMode::Streamed)), None, true),
        |req: &ProcessingRequest| match &req.message {
            Message::Body { chunk, .. } if &chunk[..] == b"b" => Reply::Fail,
            Message::Body { chunk, .. } => Reply::Respond(ProcessingResponse::Body(
                Bytes::from(chunk.to_ascii_uppercase()),
            )),
            Message::Headers(_) => Reply::Respond(ProcessingResponse::Continue),
        },
    );

    let (res, received) = process(
        &mut exchange,
        Direction::Request,
        &mut HeaderMap::new(),
        chunks(&["a", "b", "c"]),
    )
    .await;

    assert_eq!(res, Ok(Outcome::FailedOpen(Failure::Unavailable)));
    // The first chunk was processed; the rest pass through as they were.
    assert_eq!(concat(&received), Bytes::from_static(b"Abc"));
    assert_eq!(
        bodies(&seen.lock()),
        vec![
            (Bytes::from_static(b"a"), false),
            (Bytes::from_static(b"b"), false),
        ]
    );
}

#[tokio::test]
async fn rejection_is_never_failed_open() {
    let (mut exchange, _) = exchange(
        config(Some(Some(BodyProcessingMode::Buffered)), None, true),
        |_: &ProcessingRequest| {
            Reply::Respond(ProcessingResponse::Reject(ImmediateResponse::new(
                StatusCode::FORBIDDEN,
            )))
        },
    );

    let (res, received) = process(
        &mut exchange,
        Direction::Request,
        &mut HeaderMap::new(),
        chunks(&["body"]),
    )
    .await;

    assert_eq!(
        res,
        Ok(Outcome::Rejected(ImmediateResponse::new(StatusCode::FORBIDDEN)))
    );
    assert!(received.is_empty());
    assert_eq!(exchange.state(), &State::Completed);
}

#[tokio::test]
async fn closed_downstream_cancels() {
    let (mut exchange, _) = exchange(
        config(Some(Some(BodyProcessingMode::Streamed)), None, true),
        |_: &ProcessingRequest| Reply::Hang,
    );

    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let res = exchange
        .process(
            Direction::Request,
            &mut HeaderMap::new(),
            stream::iter(chunks(&["body"])),
            &tx,
        )
        .await;

    assert_eq!(res, Err(Error::Cancelled));
    assert_eq!(exchange.state(), &State::Failed(Failure::Cancelled));
}
