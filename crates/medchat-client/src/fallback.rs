use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::client::{ClientInner, error_from_response};
use crate::errors::RequestError;
use crate::model::{Answer, StreamRequest, decode_answer};

/// Single round-trip requester for the non-streaming endpoint.
#[derive(Clone)]
pub struct FallbackRequester {
    pub(crate) inner: Arc<ClientInner>,
}

impl FallbackRequester {
    /// Asks `request` in one blocking round trip bounded by `fallback_timeout`.
    pub async fn request(&self, request: &StreamRequest) -> Result<Answer, RequestError> {
        let config = &self.inner.config;
        let url = config.ask_url();
        debug!(
            request_id = %request.request_id(),
            chat_id = ?request.chat_id().map(|id| id.as_str()),
            url = %url,
            "sending single-shot question"
        );

        let result = tokio::time::timeout(config.fallback_timeout, self.send_once(&url, request))
            .await
            .unwrap_or(Err(RequestError::Timeout));

        match &result {
            Ok(answer) => info!(
                request_id = %request.request_id(),
                chars = answer.text.chars().count(),
                in_domain = ?answer.in_domain(),
                "single-shot answer received"
            ),
            Err(error) => warn!(
                request_id = %request.request_id(),
                class = ?error.class(),
                error = %error,
                "single-shot question failed"
            ),
        }
        result
    }

    async fn send_once(&self, url: &str, request: &StreamRequest) -> Result<Answer, RequestError> {
        let response = self
            .inner
            .post(url, request)
            .await
            .timeout(self.inner.config.fallback_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let body = response.bytes().await?;
        decode_answer(&body)
    }
}
