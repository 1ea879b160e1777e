use std::ops::ControlFlow;
use std::sync::Arc;

use futures::StreamExt as _;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::client::{ClientInner, error_from_response};
use crate::errors::RequestError;
use crate::model::{Answer, StreamRequest, decode_answer};
use crate::protocol::{FrameEvent, LineDecoder, parse_frame};
use crate::stream::{ChannelObserver, StreamEvent, StreamObserver};

const EVENT_STREAM: &str = "text/event-stream";

/// Handle used to abort an in-flight request.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Returns a signal to pass to the request being controlled.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Requests cancellation.
    ///
    /// Takes effect at the next suspension point of the request; after that
    /// no observer callback fires.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of an `AbortHandle`.
#[derive(Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once abort was requested; pends forever if the handle is gone.
    pub async fn aborted(&mut self) {
        let closed = self.rx.wait_for(|aborted| *aborted).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

/// Result of one streaming attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamOutcome {
    /// The answer completed (explicitly, or by the server closing the stream).
    Completed(Answer),
    /// The attempt failed; the observer's `on_error` has fired.
    Failed(RequestError),
    /// The caller aborted; no terminal callback fired.
    Aborted,
}

impl StreamOutcome {
    /// Converts to a plain result, mapping `Aborted` to `RequestError::Cancelled`.
    pub fn into_result(self) -> Result<Answer, RequestError> {
        match self {
            Self::Completed(answer) => Ok(answer),
            Self::Failed(error) => Err(error),
            Self::Aborted => Err(RequestError::Cancelled),
        }
    }
}

/// Consumes the streaming endpoint and reconstructs the answer as it arrives.
///
/// Never retries; the caller decides whether to fall back (see
/// `ChatClient::ask_with_fallback`).
#[derive(Clone)]
pub struct StreamConsumer {
    pub(crate) inner: Arc<ClientInner>,
}

impl StreamConsumer {
    /// Streams one answer, notifying `observer` as tokens arrive.
    pub async fn run<O>(&self, request: &StreamRequest, observer: &mut O) -> StreamOutcome
    where
        O: StreamObserver + ?Sized,
    {
        self.run_until_aborted(request, observer, AbortSignal::never())
            .await
    }

    /// Like `run`, but stops silently when `signal` fires.
    pub async fn run_until_aborted<O>(
        &self,
        request: &StreamRequest,
        observer: &mut O,
        mut signal: AbortSignal,
    ) -> StreamOutcome
    where
        O: StreamObserver + ?Sized,
    {
        let request_id = request.request_id();
        let deadline = self.inner.config.stream_timeout;
        let result = tokio::select! {
            biased;
            _ = signal.aborted() => {
                info!(request_id = %request_id, "answer stream aborted by caller");
                return StreamOutcome::Aborted;
            }
            result = tokio::time::timeout(deadline, self.attempt(request, &mut *observer)) => {
                result.unwrap_or(Err(RequestError::Timeout))
            }
        };
        notify_terminal(request_id, observer, result)
    }

    /// Starts streaming on a spawned task and returns a channel-backed handle.
    pub fn start(&self, request: StreamRequest) -> ChatStream {
        let request_id = request.request_id();
        let (tx, rx) = mpsc::unbounded_channel();
        let (final_tx, final_rx) = oneshot::channel();
        let abort_handle = AbortHandle::new();
        let signal = abort_handle.signal();
        let consumer = self.clone();
        tokio::spawn(async move {
            let mut observer = ChannelObserver::new(request_id, tx);
            let outcome = consumer
                .run_until_aborted(&request, &mut observer, signal)
                .await;
            let _ = final_tx.send(outcome);
        });
        ChatStream {
            request_id,
            rx,
            final_rx,
            abort_handle,
            saw_terminal: false,
        }
    }

    async fn attempt<O>(
        &self,
        request: &StreamRequest,
        observer: &mut O,
    ) -> Result<Answer, RequestError>
    where
        O: StreamObserver + ?Sized,
    {
        let url = self.inner.config.stream_url();
        debug!(
            request_id = %request.request_id(),
            chat_id = ?request.chat_id().map(|id| id.as_str()),
            url = %url,
            "starting answer stream"
        );
        let response = self
            .inner
            .post(&url, request)
            .await
            .header(ACCEPT, EVENT_STREAM)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        if is_event_stream(response.headers()) {
            let bytes = Box::pin(response.bytes_stream());
            consume_event_stream(bytes, observer, request.request_id()).await
        } else {
            debug!(request_id = %request.request_id(), "server answered without streaming");
            let body = response.bytes().await?;
            let answer = decode_answer(&body)?;
            observer.on_token(&answer.text, &answer.text);
            Ok(answer)
        }
    }
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase().starts_with(EVENT_STREAM))
        .unwrap_or(false)
}

fn notify_terminal<O>(
    request_id: uuid::Uuid,
    observer: &mut O,
    result: Result<Answer, RequestError>,
) -> StreamOutcome
where
    O: StreamObserver + ?Sized,
{
    match result {
        Ok(answer) => {
            info!(request_id = %request_id, chars = answer.text.chars().count(), "answer stream completed");
            observer.on_done(&answer.text);
            StreamOutcome::Completed(answer)
        }
        Err(error) => {
            warn!(request_id = %request_id, class = ?error.class(), error = %error, "answer stream failed");
            observer.on_error(&error);
            StreamOutcome::Failed(error)
        }
    }
}

/// Text accumulated for one request, in frame order.
struct AccumulatedAnswer {
    request_id: uuid::Uuid,
    text: String,
    seq: u64,
}

impl AccumulatedAnswer {
    fn apply_line<O>(
        &mut self,
        line: &str,
        observer: &mut O,
    ) -> ControlFlow<Result<Answer, RequestError>>
    where
        O: StreamObserver + ?Sized,
    {
        let Some(events) = parse_frame(line) else {
            return ControlFlow::Continue(());
        };
        for event in events {
            match event {
                FrameEvent::Token(delta) => {
                    self.text.push_str(&delta);
                    debug!(request_id = %self.request_id, seq = self.seq, "answer token");
                    self.seq = self.seq.saturating_add(1);
                    observer.on_token(&delta, &self.text);
                }
                FrameEvent::Done => {
                    return ControlFlow::Break(Ok(Answer::from_text(std::mem::take(
                        &mut self.text,
                    ))));
                }
                FrameEvent::Error(message) => {
                    return ControlFlow::Break(Err(RequestError::server(None, message)));
                }
            }
        }
        ControlFlow::Continue(())
    }
}

/// Reads an event stream to its terminal frame, or to the end of transport.
///
/// Token callbacks fire from here; the terminal callback is left to the
/// caller so it fires exactly once. A stream that closes without `done` or
/// `error` completes with whatever was accumulated.
pub(crate) async fn consume_event_stream<S, E, O>(
    mut bytes: S,
    observer: &mut O,
    request_id: uuid::Uuid,
) -> Result<Answer, RequestError>
where
    S: futures::Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Into<RequestError>,
    O: StreamObserver + ?Sized,
{
    let mut decoder = LineDecoder::default();
    let mut answer = AccumulatedAnswer {
        request_id,
        text: String::new(),
        seq: 0,
    };
    while let Some(chunk) = bytes.next().await {
        let chunk = chunk.map_err(Into::into)?;
        for line in decoder.push_chunk(&chunk) {
            if let ControlFlow::Break(result) = answer.apply_line(&line, observer) {
                return result;
            }
        }
    }
    if let Some(tail) = decoder.finish()
        && let ControlFlow::Break(result) = answer.apply_line(&tail, observer)
    {
        return result;
    }
    debug!(request_id = %request_id, tokens = answer.seq, "answer stream closed without terminator");
    Ok(Answer::from_text(answer.text))
}

/// Channel-backed handle returned by `StreamConsumer::start`.
///
/// Dropping the handle aborts the request.
pub struct ChatStream {
    request_id: uuid::Uuid,
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    final_rx: oneshot::Receiver<StreamOutcome>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl ChatStream {
    pub fn request_id(&self) -> uuid::Uuid {
        self.request_id
    }

    /// Returns a handle that can cancel the request.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next event; `None` once the stream has ended or was aborted.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        let event = self.rx.recv().await;
        if event.as_ref().is_some_and(StreamEvent::is_terminal) {
            self.saw_terminal = true;
        }
        event
    }

    /// Drains remaining events and returns the final answer.
    pub async fn finish(mut self) -> Result<Answer, RequestError> {
        while !self.saw_terminal {
            match self.rx.recv().await {
                Some(event) if event.is_terminal() => self.saw_terminal = true,
                Some(_) => {}
                None => break,
            }
        }
        match (&mut self.final_rx).await {
            Ok(outcome) => outcome.into_result(),
            Err(_) => Err(RequestError::Cancelled),
        }
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}
