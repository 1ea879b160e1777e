//! Client for the MedChat question-answering service.
//!
//! Answers are streamed from `/chat/stream` as newline-delimited `data: {json}`
//! frames and reassembled token by token. When streaming fails, the same
//! question can be asked once through the single-shot `/chat/ask` endpoint.
//!
//! # Streaming with fallback
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use medchat_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ChatClient::builder()
//!     .config(ClientConfig::from_env()?)
//!     .credentials(Arc::new(StaticToken::new("secret")))
//!     .build()?;
//!
//! let request = StreamRequest::new("What helps with a mild fever?", None)?;
//! let mut observer = callbacks(
//!     |delta: &str, _acc: &str| print!("{delta}"),
//!     |_text: &str| println!(),
//!     |err: &RequestError| eprintln!("{}", err.user_message()),
//! );
//! let outcome = client
//!     .ask_with_fallback(&request, &mut observer, AbortSignal::never())
//!     .await?;
//! if let Some(advisory) = outcome.answer.advisory() {
//!     eprintln!("{advisory}");
//! }
//! # Ok(())
//! # }
//! ```

/// `ChatClient` entry point, builder and fallback orchestration.
pub mod client;
/// Endpoint and deadline configuration.
pub mod config;
/// Stream consumption, abort handles and the channel-backed stream handle.
pub mod consumer;
/// Bearer token sources.
pub mod credentials;
/// Public error types.
pub mod errors;
/// Single-shot requester for the non-streaming endpoint.
pub mod fallback;
/// Request and answer types.
pub mod model;
/// Process-wide logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
mod protocol;
/// Observer contract and normalized stream events.
pub mod stream;

pub use client::{AnswerPath, AskOutcome, ChatClient, ChatClientBuilder};
pub use config::ClientConfig;
pub use consumer::{AbortHandle, AbortSignal, ChatStream, StreamConsumer, StreamOutcome};
pub use credentials::{CredentialProvider, NoCredentials, StaticToken};
pub use errors::{ClientError, ErrorClass, RequestError};
pub use fallback::FallbackRequester;
pub use model::{Answer, ChatId, StreamRequest};
pub use observability::init_observability;
pub use stream::{Callbacks, StreamEvent, StreamObserver, callbacks};
