//! Logging bootstrap for alarmd
//!
//! Console output plus an optional daily-rolling log file, both using the
//! `timestamp [LEVEL] message` layout. The filter can be changed at runtime.

use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    reload,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::error::{Error, Result};

/// Environment variable overriding the log directory
pub const LOG_DIR_ENV: &str = "ALARMD_LOG_DIR";

/// Log directory used when neither env nor config name one
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2026-01-05T06:30:00.000120Z [INFO] Alarms fired: [2]`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Keeps the non-blocking file writer flushing until process exit
static FILE_GUARD: OnceLock<Mutex<Option<WorkerGuard>>> = OnceLock::new();

type EnvFilterReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;
static LOG_FILTER_HANDLE: OnceLock<EnvFilterReloadHandle> = OnceLock::new();
static CURRENT_LOG_LEVEL: OnceLock<Mutex<String>> = OnceLock::new();

/// Pick the log directory. Priority: env > config > default
pub fn resolve_log_dir(env_dir: Option<&str>, config_dir: Option<&str>) -> PathBuf {
    env_dir
        .filter(|d| !d.is_empty())
        .or(config_dir.filter(|d| !d.is_empty()))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR))
}

/// Log directory from `ALARMD_LOG_DIR` or the configured value
pub fn log_root(config_dir: Option<&str>) -> PathBuf {
    let env_dir = std::env::var(LOG_DIR_ENV).ok();
    resolve_log_dir(env_dir.as_deref(), config_dir)
}

/// Filter directive. `RUST_LOG` wins; a bare level applies to the service
/// and scheduler crates with dependencies kept at info; anything else is
/// taken as a full directive.
pub fn filter_directive(service_name: &str, level: &str, rust_log: Option<&str>) -> String {
    if let Some(env) = rust_log.filter(|s| !s.is_empty()) {
        return env.to_string();
    }
    if level.contains(',') || level.contains('=') {
        return level.to_string();
    }
    let crate_target = service_name.replace('-', "_");
    format!("info,{}={},alarm_scheduler={}", crate_target, level, level)
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as the log file prefix
    pub service_name: String,
    pub log_dir: PathBuf,
    /// Level or full filter directive (e.g. "debug", "info,alarmd=trace")
    pub level: String,
    pub file_enabled: bool,
    pub enable_json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "alarmd".to_string(),
            log_dir: log_root(None),
            level: "info".to_string(),
            file_enabled: true,
            enable_json: false,
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_with_config(config: LogConfig) -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(&config.service_name, &config.level, rust_log.as_deref());
    let env_filter = EnvFilter::try_new(&directive)
        .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directive, e)))?;

    let (reload_filter, reload_handle) = reload::Layer::new(env_filter);
    let _ = LOG_FILTER_HANDLE.set(reload_handle);
    let _ = CURRENT_LOG_LEVEL.set(Mutex::new(directive));

    let console_layer = fmt::layer()
        .with_ansi(true)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = if config.file_enabled {
        fs::create_dir_all(&config.log_dir)?;
        let appender = tracing_appender::rolling::daily(
            &config.log_dir,
            format!("{}.log", config.service_name),
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        let slot = FILE_GUARD.get_or_init(|| Mutex::new(None));
        match slot.lock() {
            Ok(mut slot) => *slot = Some(guard),
            Err(poisoned) => *poisoned.into_inner() = Some(guard),
        }

        let layer = if config.enable_json {
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_target(true)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .event_format(BracketedLevelFormat)
                .boxed()
        };
        Some(layer)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(reload_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Generic(format!("Logging already initialized: {}", e)))?;

    if config.file_enabled {
        tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);
    }
    Ok(())
}

/// Console-only logging at `level`
pub fn init(level: &str) -> Result<()> {
    init_with_config(LogConfig {
        level: level.to_string(),
        file_enabled: false,
        ..Default::default()
    })
}

/// Change the active filter at runtime
///
/// Accepts a level ("debug") or a full directive ("info,alarm_scheduler=debug").
pub fn set_log_level(level: &str) -> std::result::Result<(), String> {
    let handle = LOG_FILTER_HANDLE
        .get()
        .ok_or("Logging not initialized with reload support")?;

    let new_filter =
        EnvFilter::try_new(level).map_err(|e| format!("Invalid log level '{}': {}", level, e))?;

    handle
        .reload(new_filter)
        .map_err(|e| format!("Failed to reload log filter: {}", e))?;

    if let Some(current) = CURRENT_LOG_LEVEL.get() {
        if let Ok(mut guard) = current.lock() {
            *guard = level.to_string();
        }
    }

    tracing::info!("Log level changed to: {}", level);
    Ok(())
}

/// Current filter directive, "unknown" before init
pub fn get_log_level() -> String {
    CURRENT_LOG_LEVEL
        .get()
        .and_then(|m| m.lock().ok())
        .map(|guard| guard.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_level() {
        assert_eq!(format_level(&Level::INFO), "[INFO]");
        assert_eq!(format_level(&Level::ERROR), "[ERROR]");
    }

    #[test]
    fn test_log_dir_priority() {
        assert_eq!(
            resolve_log_dir(Some("/var/log/alarmd"), Some("cfg")),
            PathBuf::from("/var/log/alarmd")
        );
        assert_eq!(resolve_log_dir(None, Some("cfg")), PathBuf::from("cfg"));
        assert_eq!(resolve_log_dir(Some(""), None), PathBuf::from(DEFAULT_LOG_DIR));
    }

    #[test]
    fn test_filter_directive() {
        assert_eq!(
            filter_directive("alarmd", "debug", None),
            "info,alarmd=debug,alarm_scheduler=debug"
        );
        assert_eq!(filter_directive("alarmd", "warn,alarmd=trace", None), "warn,alarmd=trace");
        assert_eq!(filter_directive("alarmd", "debug", Some("warn")), "warn");
        assert!(EnvFilter::try_new(filter_directive("alarm-d", "info", None)).is_ok());
    }

    #[test]
    fn test_set_level_before_init_fails() {
        // No subscriber is installed by this test binary
        if LOG_FILTER_HANDLE.get().is_none() {
            assert!(set_log_level("debug").is_err());
            assert_eq!(get_log_level(), "unknown");
        }
    }
}
