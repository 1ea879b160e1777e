use crate::errors::RequestError;

/// Lifecycle events published by `ChatStream`.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Incremental text delta, with the answer accumulated so far.
    Token {
        request_id: uuid::Uuid,
        seq: u64,
        delta: String,
        accumulated: String,
    },
    /// Terminal success with the final answer text.
    Done {
        request_id: uuid::Uuid,
        text: String,
    },
    /// Terminal failure.
    Error {
        request_id: uuid::Uuid,
        error: RequestError,
    },
}

impl StreamEvent {
    /// Returns the identity of the request that produced this event.
    pub fn request_id(&self) -> uuid::Uuid {
        match self {
            Self::Token { request_id, .. }
            | Self::Done { request_id, .. }
            | Self::Error { request_id, .. } => *request_id,
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// Receives notifications for one streaming request.
///
/// `on_token` fires in frame order. Exactly one of `on_done`/`on_error`
/// fires afterwards, once, and nothing fires after it. An aborted request
/// fires neither.
pub trait StreamObserver: Send {
    /// A new delta arrived; `accumulated` already includes it.
    fn on_token(&mut self, delta: &str, accumulated: &str);

    /// The answer is complete.
    fn on_done(&mut self, text: &str);

    /// The request failed.
    fn on_error(&mut self, error: &RequestError);
}

/// Observer assembled from three closures. See [`callbacks`].
pub struct Callbacks<T, D, E> {
    on_token: T,
    on_done: D,
    on_error: E,
}

/// Builds a `StreamObserver` from token, completion and error closures.
pub fn callbacks<T, D, E>(on_token: T, on_done: D, on_error: E) -> Callbacks<T, D, E>
where
    T: FnMut(&str, &str) + Send,
    D: FnMut(&str) + Send,
    E: FnMut(&RequestError) + Send,
{
    Callbacks {
        on_token,
        on_done,
        on_error,
    }
}

impl<T, D, E> StreamObserver for Callbacks<T, D, E>
where
    T: FnMut(&str, &str) + Send,
    D: FnMut(&str) + Send,
    E: FnMut(&RequestError) + Send,
{
    fn on_token(&mut self, delta: &str, accumulated: &str) {
        (self.on_token)(delta, accumulated)
    }

    fn on_done(&mut self, text: &str) {
        (self.on_done)(text)
    }

    fn on_error(&mut self, error: &RequestError) {
        (self.on_error)(error)
    }
}

impl<O: StreamObserver + ?Sized> StreamObserver for &mut O {
    fn on_token(&mut self, delta: &str, accumulated: &str) {
        (**self).on_token(delta, accumulated)
    }

    fn on_done(&mut self, text: &str) {
        (**self).on_done(text)
    }

    fn on_error(&mut self, error: &RequestError) {
        (**self).on_error(error)
    }
}

/// Forwards events into an unbounded channel, tagged with the request id.
pub(crate) struct ChannelObserver {
    request_id: uuid::Uuid,
    seq: u64,
    tx: tokio::sync::mpsc::UnboundedSender<StreamEvent>,
}

impl ChannelObserver {
    pub(crate) fn new(
        request_id: uuid::Uuid,
        tx: tokio::sync::mpsc::UnboundedSender<StreamEvent>,
    ) -> Self {
        Self {
            request_id,
            seq: 0,
            tx,
        }
    }
}

impl StreamObserver for ChannelObserver {
    fn on_token(&mut self, delta: &str, accumulated: &str) {
        let _ = self.tx.send(StreamEvent::Token {
            request_id: self.request_id,
            seq: self.seq,
            delta: delta.to_string(),
            accumulated: accumulated.to_string(),
        });
        self.seq = self.seq.saturating_add(1);
    }

    fn on_done(&mut self, text: &str) {
        let _ = self.tx.send(StreamEvent::Done {
            request_id: self.request_id,
            text: text.to_string(),
        });
    }

    fn on_error(&mut self, error: &RequestError) {
        let _ = self.tx.send(StreamEvent::Error {
            request_id: self.request_id,
            error: error.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_receive_forwarded_calls() {
        let mut tokens = Vec::new();
        let mut done = None;
        let mut errors = 0;
        {
            let mut observer = callbacks(
                |delta: &str, acc: &str| tokens.push((delta.to_string(), acc.to_string())),
                |text: &str| done = Some(text.to_string()),
                |_: &RequestError| errors += 1,
            );
            observer.on_token("a", "a");
            observer.on_done("a");
        }
        assert_eq!(tokens, vec![("a".to_string(), "a".to_string())]);
        assert_eq!(done.as_deref(), Some("a"));
        assert_eq!(errors, 0);
    }

    #[test]
    fn channel_observer_numbers_tokens() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let id = uuid::Uuid::new_v4();
        let mut observer = ChannelObserver::new(id, tx);
        observer.on_token("a", "a");
        observer.on_token("b", "ab");
        observer.on_error(&RequestError::Timeout);

        let first = rx.try_recv().expect("first");
        assert!(matches!(first, StreamEvent::Token { seq: 0, .. }));
        let second = rx.try_recv().expect("second");
        assert!(matches!(second, StreamEvent::Token { seq: 1, ref accumulated, .. } if accumulated == "ab"));
        let third = rx.try_recv().expect("third");
        assert!(third.is_terminal());
        assert_eq!(third.request_id(), id);
    }
}
