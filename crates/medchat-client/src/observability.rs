use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_JSON_LOG_FILE: &str = "medchat.logs.jsonl";

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn logging_enabled(lookup: impl Fn(&str) -> Option<String>) -> bool {
    lookup("MEDCHAT_OBSERVABILITY_ENABLED")
        .map(|value| parse_bool_env(&value).unwrap_or(true))
        .unwrap_or(true)
}

fn resolve_env_filter(default_level: &str) -> tracing_subscriber::EnvFilter {
    if let Ok(level) = std::env::var("MEDCHAT_LOG_LEVEL")
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level))
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `MEDCHAT_OBSERVABILITY_ENABLED`: optional enable/disable flag (default enabled).
/// - `MEDCHAT_LOG_LEVEL`: optional level/filter override (`info`, `debug`, etc.).
/// - `MEDCHAT_JSON_LOG_PATH`: optional log file path. If set, logs are JSONL in that file.
///   If unset, logs go to stderr in a compact console format so stdout stays
///   free for answer text.
/// - `RUST_LOG`: optional filter override.
///
/// `default_level` applies when neither filter variable is set.
pub fn init_observability(default_level: &str) {
    INIT.get_or_init(|| {
        if !logging_enabled(|key| std::env::var(key).ok()) {
            return;
        }

        let env_filter = resolve_env_filter(default_level);
        if let Ok(path_raw) = std::env::var("MEDCHAT_JSON_LOG_PATH") {
            let path = std::path::PathBuf::from(path_raw);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                let _ = std::fs::create_dir_all(parent);
            }
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(DEFAULT_JSON_LOG_FILE);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}
