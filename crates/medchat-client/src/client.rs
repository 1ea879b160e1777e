use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::consumer::{AbortSignal, ChatStream, StreamConsumer, StreamOutcome};
use crate::credentials::{CredentialProvider, NoCredentials};
use crate::errors::{ClientError, RequestError, error_message_from_body};
use crate::fallback::FallbackRequester;
use crate::model::{Answer, StreamRequest};
use crate::stream::StreamObserver;

pub(crate) struct ClientInner {
    pub(crate) http: reqwest::Client,
    pub(crate) config: ClientConfig,
    pub(crate) credentials: Arc<dyn CredentialProvider>,
}

impl ClientInner {
    /// POST carrying the shared request body and, when available, the bearer token.
    pub(crate) async fn post(&self, url: &str, request: &StreamRequest) -> reqwest::RequestBuilder {
        let mut builder = self.http.post(url).json(&request.body());
        if let Some(token) = self.credentials.bearer_token().await {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

/// Builds the error for a non-success response from its body.
pub(crate) async fn error_from_response(response: reqwest::Response) -> RequestError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = error_message_from_body(&body)
        .unwrap_or_else(|| format!("request failed with status {status}"));
    RequestError::server(Some(status.as_u16()), message)
}

/// How the answer of `ask_with_fallback` was obtained.
#[derive(Clone, Debug, PartialEq)]
pub enum AnswerPath {
    /// Delivered by the event stream.
    Streamed,
    /// Fetched by the single-shot request after the stream failed.
    Fallback { stream_error: RequestError },
}

/// Result of a question answered with fallback.
#[derive(Clone, Debug, PartialEq)]
pub struct AskOutcome {
    pub answer: Answer,
    pub path: AnswerPath,
}

/// Entry point: owns the HTTP client, configuration and credentials.
#[derive(Clone)]
pub struct ChatClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl ChatClient {
    /// Starts a builder.
    pub fn builder() -> ChatClientBuilder {
        ChatClientBuilder::default()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Streaming consumer sharing this client's connection pool.
    pub fn consumer(&self) -> StreamConsumer {
        StreamConsumer {
            inner: self.inner.clone(),
        }
    }

    /// Fallback requester sharing this client's connection pool.
    pub fn fallback(&self) -> FallbackRequester {
        FallbackRequester {
            inner: self.inner.clone(),
        }
    }

    /// Streams one answer into `observer`. See `StreamConsumer::run`.
    pub async fn stream<O>(&self, request: &StreamRequest, observer: &mut O) -> StreamOutcome
    where
        O: StreamObserver + ?Sized,
    {
        self.consumer().run(request, observer).await
    }

    /// Streams one answer on a spawned task. See `StreamConsumer::start`.
    pub fn start_stream(&self, request: StreamRequest) -> ChatStream {
        self.consumer().start(request)
    }

    /// Asks without streaming. See `FallbackRequester::request`.
    pub async fn ask(&self, request: &StreamRequest) -> Result<Answer, RequestError> {
        self.fallback().request(request).await
    }

    /// Streams the answer and, if streaming fails, asks once more without
    /// streaming.
    ///
    /// `observer` receives the stream's tokens as they arrive, then exactly
    /// one `on_done` or `on_error` for the whole turn. When the fallback
    /// answers, `on_done` carries its full text, which supersedes any
    /// partial tokens already delivered. An abort fires nothing and returns
    /// `RequestError::Cancelled`.
    pub async fn ask_with_fallback<O>(
        &self,
        request: &StreamRequest,
        observer: &mut O,
        signal: AbortSignal,
    ) -> Result<AskOutcome, RequestError>
    where
        O: StreamObserver + ?Sized,
    {
        let mut relay = TokenRelay {
            inner: &mut *observer,
        };
        let outcome = self
            .consumer()
            .run_until_aborted(request, &mut relay, signal.clone())
            .await;
        let stream_error = match outcome {
            StreamOutcome::Completed(answer) => {
                observer.on_done(&answer.text);
                return Ok(AskOutcome {
                    answer,
                    path: AnswerPath::Streamed,
                });
            }
            StreamOutcome::Aborted => return Err(RequestError::Cancelled),
            StreamOutcome::Failed(error) => error,
        };

        info!(
            request_id = %request.request_id(),
            class = ?stream_error.class(),
            "falling back to single-shot question"
        );
        let mut signal = signal;
        let fallback = self.fallback();
        let result = tokio::select! {
            biased;
            _ = signal.aborted() => return Err(RequestError::Cancelled),
            result = fallback.request(request) => result,
        };
        match result {
            Ok(answer) => {
                observer.on_done(&answer.text);
                Ok(AskOutcome {
                    answer,
                    path: AnswerPath::Fallback { stream_error },
                })
            }
            Err(error) => {
                warn!(
                    request_id = %request.request_id(),
                    stream_error = %stream_error,
                    error = %error,
                    "both streaming and single-shot attempts failed"
                );
                observer.on_error(&error);
                Err(error)
            }
        }
    }
}

/// Forwards tokens only; terminal notifications are decided by the caller.
struct TokenRelay<'a, O: ?Sized> {
    inner: &'a mut O,
}

impl<O> StreamObserver for TokenRelay<'_, O>
where
    O: StreamObserver + ?Sized,
{
    fn on_token(&mut self, delta: &str, accumulated: &str) {
        self.inner.on_token(delta, accumulated);
    }

    fn on_done(&mut self, _text: &str) {}

    fn on_error(&mut self, _error: &RequestError) {}
}

/// Builder used to configure a `ChatClient`.
pub struct ChatClientBuilder {
    config: ClientConfig,
    credentials: Arc<dyn CredentialProvider>,
    http: Option<reqwest::Client>,
}

impl Default for ChatClientBuilder {
    fn default() -> Self {
        Self {
            config: ClientConfig::default(),
            credentials: Arc::new(NoCredentials),
            http: None,
        }
    }
}

impl ChatClientBuilder {
    /// Sets the endpoint and timeout configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the bearer token source.
    pub fn credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Reuses an existing `reqwest::Client` (connection pool, proxy, TLS setup).
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Validates the configuration and builds the client.
    pub fn build(self) -> Result<ChatClient, ClientError> {
        self.config.validate()?;
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .user_agent(concat!("medchat-client/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?,
        };
        Ok(ChatClient {
            inner: Arc::new(ClientInner {
                http,
                config: self.config,
                credentials: self.credentials,
            }),
        })
    }
}
