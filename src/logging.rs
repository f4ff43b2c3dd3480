//! Structured logging and tracing for Chargeshare
//!
//! Console and rolling-file layers on top of `tracing-subscriber`, plus a
//! small context-carrying logger used by the control loop components.

use crate::config::LoggingConfig;
use crate::error::{ChargeShareError, Result};
use std::path::Path;
use tracing::{Level, info};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub mod level;
mod state;
mod structured;

pub use level::{level_rank, min_level, parse_log_level};
pub use structured::{LogContext, StructuredLogger, get_logger, get_logger_with_context};

/// Environment variable that forces console-only logging
pub const DISABLE_FILE_LOG_ENV: &str = "CHARGESHARE_DISABLE_FILE_LOG";

/// Initialize logging system based on configuration
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    state::INIT_ONCE.call_once(|| {
        let init_result = (|| -> Result<()> {
            let base_level = parse_log_level(&config.level)?;

            let console_level = config
                .console_level
                .as_ref()
                .and_then(|s| parse_log_level(s).ok())
                .unwrap_or(base_level);
            let file_level = config
                .file_level
                .as_ref()
                .and_then(|s| parse_log_level(s).ok())
                .unwrap_or(base_level);

            // Most verbose level so layer-specific filters can down-filter
            let filter = build_env_filter(min_level(console_level, file_level));

            if should_use_console_only() {
                init_console_only_logging(filter, config.json_format, console_level);
                return Ok(());
            }

            init_file_logging(config, filter, console_level, file_level)
        })();

        if let Err(e) = init_result {
            let _ = state::INIT_ERROR.set(e.to_string());
        }
    });

    if let Some(err) = state::INIT_ERROR.get() {
        return Err(ChargeShareError::config(err.clone()));
    }
    Ok(())
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| format!("chargeshare={}", level).into())
}

fn should_use_console_only() -> bool {
    cfg!(test) || std::env::var_os(DISABLE_FILE_LOG_ENV).is_some()
}

/// Formatting layer shared by the console and file outputs
fn fmt_layer<S, W>(writer: W, json_format: bool, ansi: bool, level: Level) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);
    let filter = LevelFilter::from_level(level);
    if json_format {
        layer.json().with_filter(filter).boxed()
    } else {
        layer.with_filter(filter).boxed()
    }
}

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Directory the rolling appender writes into.
///
/// `file` may name a log file (its parent is used) or a directory.
fn log_directory(file: &str) -> &Path {
    let path = Path::new(file);
    match (path.extension(), path.parent()) {
        (Some(_), Some(parent)) if !parent.as_os_str().is_empty() => parent,
        (Some(_), _) => Path::new("."),
        (None, _) => path,
    }
}

fn init_console_only_logging(filter: EnvFilter, json_format: bool, console_level: Level) {
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer(std::io::stderr, json_format, true, console_level))
        .try_init()
        .is_ok();

    // A test harness may already have installed a subscriber
    if installed {
        info!("Logging initialized - console_level: {:?}, console-only", console_level);
    }
}

fn init_file_logging(
    config: &LoggingConfig,
    filter: EnvFilter,
    console_level: Level,
    file_level: Level,
) -> Result<()> {
    let directory = log_directory(&config.file);
    let appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix("chargeshare")
        .filename_suffix("log")
        .max_log_files(config.backup_count.max(1) as usize)
        .build(directory)
        .map_err(|e| {
            ChargeShareError::io(format!(
                "Failed to create log appender in {}: {}",
                directory.display(),
                e
            ))
        })?;

    let (writer, guard) = non_blocking(appender);
    let _ = state::LOG_GUARD.set(guard);

    let console = config
        .console_output
        .then(|| fmt_layer(std::io::stderr, config.json_format, true, console_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer(writer, config.json_format, false, file_level))
        .with(console)
        .try_init()
        .map_err(|e| ChargeShareError::config(format!("Failed to install logger: {}", e)))?;

    info!(
        "Logging initialized - console_level: {:?}, file_level: {:?}, directory: {}",
        console_level,
        file_level,
        directory.display()
    );
    Ok(())
}
