use std::error::Error as _;
use std::io;

/// Coarse failure class shown to end users.
///
/// Every `RequestError` resolves to exactly one class so callers never have
/// to render raw protocol fragments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// The server could not be reached or the connection dropped.
    Network,
    /// The request exceeded its deadline.
    Timeout,
    /// The server answered with an explicit failure.
    Server,
    /// Anything else (malformed payloads, cancellation).
    Unknown,
}

/// Failure of a single streaming or fallback attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// The attempt exceeded its deadline.
    #[error("request timed out")]
    Timeout,
    /// The server refused the TCP connection.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),
    /// No route to the server's network or host.
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),
    /// Any other transport failure (reset, broken pipe, TLS, body read).
    #[error("transport error: {0}")]
    Transport(String),
    /// The server signaled failure, either with an error status (`status`
    /// set) or with an in-stream error frame (`status` is `None`).
    #[error("server error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Server {
        status: Option<u16>,
        message: String,
    },
    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// The caller aborted the attempt.
    #[error("request cancelled")]
    Cancelled,
}

impl RequestError {
    /// Creates a server-signaled error.
    pub fn server(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Creates a malformed-response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Returns the user-facing failure class.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ConnectionRefused(_) | Self::NetworkUnreachable(_) | Self::Transport(_) => {
                ErrorClass::Network
            }
            Self::Timeout => ErrorClass::Timeout,
            Self::Server { .. } => ErrorClass::Server,
            Self::MalformedResponse(_) | Self::Cancelled => ErrorClass::Unknown,
        }
    }

    /// Returns the HTTP status when the server answered with one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => *status,
            _ => None,
        }
    }

    /// Human-readable message suitable for display to the person asking.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout => {
                "The answer is taking too long. Please try again in a moment.".to_string()
            }
            Self::ConnectionRefused(_) => {
                "Cannot reach the MedChat server. Make sure it is running.".to_string()
            }
            Self::NetworkUnreachable(_) => {
                "Network unreachable. Check your internet connection.".to_string()
            }
            Self::Transport(_) => "The connection to the server was interrupted.".to_string(),
            Self::Server {
                status: Some(401), ..
            } => "Your session has expired. Please sign in again.".to_string(),
            Self::Server {
                status: Some(429), ..
            } => "Too many requests. Please wait a moment and try again.".to_string(),
            Self::Server { message, .. } if !message.trim().is_empty() => {
                format!("The server could not answer: {}", message.trim())
            }
            Self::Server { .. } => "The server could not answer your question.".to_string(),
            Self::MalformedResponse(_) => {
                "Received an unexpected response from the server.".to_string()
            }
            Self::Cancelled => "The request was cancelled.".to_string(),
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        match io_error_kind(&err) {
            Some(io::ErrorKind::TimedOut) => return Self::Timeout,
            Some(io::ErrorKind::ConnectionRefused) => {
                return Self::ConnectionRefused(err.to_string());
            }
            Some(io::ErrorKind::NetworkUnreachable | io::ErrorKind::HostUnreachable) => {
                return Self::NetworkUnreachable(err.to_string());
            }
            _ => {}
        }
        if err.is_decode() {
            return Self::MalformedResponse(err.to_string());
        }
        Self::Transport(err.to_string())
    }
}

fn io_error_kind(err: &reqwest::Error) -> Option<io::ErrorKind> {
    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io_err) = inner.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        source = inner.source();
    }
    None
}

/// Errors raised while configuring a client or building a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid user input.
    #[error("validation error: {0}")]
    Validation(String),
}

/// Extracts the server's error text from a failed response body.
///
/// Prefers the `error` field, then `message`; returns `None` when the body
/// is not JSON or carries neither.
pub(crate) fn error_message_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error", "message"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find_map(render_error_value)
}

/// Renders an `error` value that may be a plain string or an object with a
/// `message` field. Other shapes yield `None` so raw JSON never reaches users.
pub(crate) fn render_error_value(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::String(s) => s.as_str(),
        serde_json::Value::Object(map) => map.get("message")?.as_str()?,
        _ => return None,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_maps_to_a_class() {
        assert_eq!(RequestError::Timeout.class(), ErrorClass::Timeout);
        assert_eq!(
            RequestError::ConnectionRefused("x".into()).class(),
            ErrorClass::Network
        );
        assert_eq!(
            RequestError::NetworkUnreachable("x".into()).class(),
            ErrorClass::Network
        );
        assert_eq!(RequestError::Transport("x".into()).class(), ErrorClass::Network);
        assert_eq!(
            RequestError::server(Some(500), "boom").class(),
            ErrorClass::Server
        );
        assert_eq!(RequestError::server(None, "boom").class(), ErrorClass::Server);
        assert_eq!(RequestError::malformed("x").class(), ErrorClass::Unknown);
        assert_eq!(RequestError::Cancelled.class(), ErrorClass::Unknown);
    }

    #[test]
    fn user_messages_are_distinct_across_fallback_taxonomy() {
        let messages = [
            RequestError::Timeout.user_message(),
            RequestError::ConnectionRefused("refused".into()).user_message(),
            RequestError::NetworkUnreachable("unreachable".into()).user_message(),
            RequestError::server(Some(500), "").user_message(),
            RequestError::malformed("bad json").user_message(),
        ];
        for (i, a) in messages.iter().enumerate() {
            for b in messages.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn user_message_never_leaks_transport_detail() {
        let err = RequestError::Transport("hyper::Error(IncompleteMessage)".into());
        assert!(!err.user_message().contains("hyper"));
        let err = RequestError::malformed("expected value at line 1 column 1");
        assert!(!err.user_message().contains("column"));
    }

    #[test]
    fn server_message_is_surfaced_and_status_is_kept() {
        let err = RequestError::server(Some(400), "Question is required");
        assert_eq!(err.status_code(), Some(400));
        assert!(err.user_message().contains("Question is required"));
        assert_eq!(err.to_string(), "server error (400): Question is required");
        assert_eq!(
            RequestError::server(None, "downstream unavailable").to_string(),
            "server error: downstream unavailable"
        );
    }

    #[test]
    fn unauthorized_gets_session_message() {
        let err = RequestError::server(Some(401), "Unauthorized");
        assert!(err.user_message().contains("sign in"));
    }

    #[test]
    fn error_body_prefers_error_then_message() {
        assert_eq!(
            error_message_from_body(r#"{"error":"Failed to stream response"}"#).as_deref(),
            Some("Failed to stream response")
        );
        assert_eq!(
            error_message_from_body(r#"{"message":"Invalid data"}"#).as_deref(),
            Some("Invalid data")
        );
        assert_eq!(
            error_message_from_body(r#"{"error":{"message":"quota exceeded"}}"#).as_deref(),
            Some("quota exceeded")
        );
        assert_eq!(error_message_from_body("<html>502</html>"), None);
        assert_eq!(error_message_from_body(r#"{"answer":"x"}"#), None);
    }

    #[test]
    fn error_values_without_text_are_not_rendered() {
        assert_eq!(render_error_value(&serde_json::json!(false)), None);
        assert_eq!(render_error_value(&serde_json::json!(["a", {"b": 1}])), None);
        assert_eq!(render_error_value(&serde_json::json!(42)), None);
        assert_eq!(render_error_value(&serde_json::json!({"code": 7})), None);
        assert_eq!(render_error_value(&serde_json::json!("  ")), None);
        assert_eq!(
            render_error_value(&serde_json::json!(" down ")).as_deref(),
            Some("down")
        );
        assert_eq!(
            error_message_from_body(r#"{"error":[1,2],"message":"Invalid data"}"#).as_deref(),
            Some("Invalid data")
        );
    }
}
