use std::time::Duration;

use crate::errors::ClientError;

const DEFAULT_BASE_URL: &str = "http://localhost:5000";
const DEFAULT_STREAM_PATH: &str = "/chat/stream";
const DEFAULT_ASK_PATH: &str = "/chat/ask";

/// Configuration shared by the streaming consumer and the fallback requester.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the chat service.
    ///
    /// Useful for proxies or local test servers.
    pub base_url: String,
    /// Path of the event-stream endpoint.
    pub stream_path: String,
    /// Path of the single-shot endpoint used by the fallback path.
    pub ask_path: String,
    /// Overall deadline for one streaming attempt, including the read loop.
    pub stream_timeout: Duration,
    /// Deadline for one fallback round trip.
    pub fallback_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            ask_path: DEFAULT_ASK_PATH.to_string(),
            stream_timeout: Duration::from_secs(120),
            fallback_timeout: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    /// Creates a config with default paths and timeouts for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::default().base_url(base_url)
    }

    /// Builds a config from the process environment.
    ///
    /// - `MEDCHAT_BASE_URL`: service base URL (default `http://localhost:5000`).
    /// - `MEDCHAT_STREAM_TIMEOUT_SECS`: streaming deadline in seconds.
    /// - `MEDCHAT_FALLBACK_TIMEOUT_SECS`: fallback deadline in seconds.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ClientError> {
        let mut config = Self::default();
        if let Some(base_url) = lookup("MEDCHAT_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config.base_url = base_url.trim().to_string();
        }
        if let Some(raw) = lookup("MEDCHAT_STREAM_TIMEOUT_SECS") {
            config.stream_timeout = parse_secs("MEDCHAT_STREAM_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = lookup("MEDCHAT_FALLBACK_TIMEOUT_SECS") {
            config.fallback_timeout = parse_secs("MEDCHAT_FALLBACK_TIMEOUT_SECS", &raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the streaming endpoint path.
    pub fn stream_path(mut self, path: impl Into<String>) -> Self {
        self.stream_path = path.into();
        self
    }

    /// Overrides the fallback endpoint path.
    pub fn ask_path(mut self, path: impl Into<String>) -> Self {
        self.ask_path = path.into();
        self
    }

    /// Overrides the streaming deadline.
    pub fn stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    /// Overrides the fallback deadline.
    pub fn fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }

    /// Checks that the URL has an http(s) scheme and both deadlines are non-zero.
    pub fn validate(&self) -> Result<(), ClientError> {
        let base = self.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "base_url must start with http:// or https:// (got {base:?})"
            )));
        }
        if self.stream_timeout.is_zero() {
            return Err(ClientError::Config(
                "stream_timeout must be greater than 0".into(),
            ));
        }
        if self.fallback_timeout.is_zero() {
            return Err(ClientError::Config(
                "fallback_timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn stream_url(&self) -> String {
        join_url(&self.base_url, &self.stream_path)
    }

    pub(crate) fn ask_url(&self) -> String {
        join_url(&self.base_url, &self.ask_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim().trim_end_matches('/'),
        path.trim().trim_start_matches('/')
    )
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration, ClientError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ClientError::Config(format!("{key} must be a whole number of seconds: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_local_server() {
        let config = ClientConfig::default();
        assert_eq!(config.stream_url(), "http://localhost:5000/chat/stream");
        assert_eq!(config.ask_url(), "http://localhost:5000/chat/ask");
        assert_eq!(config.fallback_timeout, Duration::from_secs(60));
    }

    #[test]
    fn url_join_tolerates_slashes() {
        let config = ClientConfig::new("https://api.example.com/").stream_path("chat/stream");
        assert_eq!(config.stream_url(), "https://api.example.com/chat/stream");
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("MEDCHAT_BASE_URL", "http://10.0.0.2:8080"),
            ("MEDCHAT_STREAM_TIMEOUT_SECS", "30"),
            ("MEDCHAT_FALLBACK_TIMEOUT_SECS", " 45 "),
        ]))
        .expect("config");
        assert_eq!(config.base_url, "http://10.0.0.2:8080");
        assert_eq!(config.stream_timeout, Duration::from_secs(30));
        assert_eq!(config.fallback_timeout, Duration::from_secs(45));
    }

    #[test]
    fn invalid_timeout_is_config_error() {
        let err = ClientConfig::from_lookup(lookup_from(&[("MEDCHAT_STREAM_TIMEOUT_SECS", "soon")]))
            .expect_err("should fail");
        assert!(matches!(err, ClientError::Config(msg) if msg.contains("MEDCHAT_STREAM_TIMEOUT_SECS")));
    }

    #[test]
    fn validate_rejects_bad_scheme_and_zero_deadline() {
        assert!(ClientConfig::new("localhost:5000").validate().is_err());
        assert!(
            ClientConfig::default()
                .fallback_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
