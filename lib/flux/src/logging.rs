use sloggers::{Config, LoggerConfig};
use std::path::Path;

const DEFAULT_CONFIG: &str = r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#;

/// Build the root logger. Reads a `LoggerConfig` (same shape sloggers itself
/// defines) from `path` if given; falls back to a terminal/debug logger
/// otherwise.
pub fn init(path: Option<&Path>) -> slog::Logger {
    let config: LoggerConfig = match path {
        Some(path) => serdeconv::from_toml_file(path)
            .unwrap_or_else(|_| serdeconv::from_toml_str(DEFAULT_CONFIG).unwrap()),
        None => serdeconv::from_toml_str(DEFAULT_CONFIG).unwrap(),
    };

    config.build_logger().expect("failed to build root logger")
}
