//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, AbortSignal, Answer, AskOutcome, ChatClient, ChatId, ClientConfig, ClientError,
    ErrorClass, RequestError, StaticToken, StreamEvent, StreamObserver, StreamRequest, callbacks,
};
