//! Bearer credentials supplied by the caller's session management.

/// Source of the bearer token attached to outbound requests.
///
/// Token storage and refresh belong to the caller; the client only asks for
/// the current value right before each request.
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns the current bearer token, or `None` to send the request
    /// unauthenticated.
    async fn bearer_token(&self) -> Option<String>;
}

/// Sends every request without an `Authorization` header.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCredentials;

#[async_trait::async_trait]
impl CredentialProvider for NoCredentials {
    async fn bearer_token(&self) -> Option<String> {
        None
    }
}

/// Fixed token, typically read once from configuration.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

#[async_trait::async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> Option<String> {
        let token = self.0.trim();
        (!token.is_empty()).then(|| token.to_string())
    }
}
