//! Command-line driver for the relay engine over captured files.

mod commands;
mod config;
mod logging;

pub use commands::{
    aggregate_json, convert_capture, harmony_format_text, harmony_parse_json, replay_capture,
    run_aggregate, run_convert, run_harmony_format, run_harmony_parse, run_replay,
    AggregateOptions, ConvertOptions, Route,
};
pub use config::{
    load_relay_config, parse_relay_config, resolve_conf_dir, ConfigError, LogConfig, RelayConfig,
    CONFIG_FILE_NAME, DEFAULT_LOG_LEVEL, DEFAULT_MODEL,
};
pub use logging::init_tracing;
