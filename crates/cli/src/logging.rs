use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use waffle_core::config::{LogFormat, LoggingConfig};

pub const LOG_FILE_PREFIX: &str = "waffle.log";

pub fn filter_directive(cfg: &LoggingConfig) -> String {
    // SDK internals are noisy at debug
    format!("{},aws_config=warn,aws_smithy_runtime=warn,hyper=warn", cfg.level.as_filter())
}

/// Console output on stderr in the configured format, plus a daily JSON
/// file in `log_dir`. Keep the guard alive until exit so the file flushes.
pub fn init(cfg: &LoggingConfig, log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir).with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX));

    let filter = EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new(filter_directive(cfg)));
    let json = (cfg.format == LogFormat::Json)
        .then(|| fmt::layer().json().with_span_events(FmtSpan::CLOSE).with_writer(std::io::stderr));
    let text = (cfg.format == LogFormat::Text).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));
    let file = fmt::layer().json().with_ansi(false).with_writer(file_writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .with(file)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use waffle_core::config::LogLevel;

    #[test]
    fn directive_follows_level() {
        let cfg = LoggingConfig { level: LogLevel::Warning, format: LogFormat::Text };
        assert!(filter_directive(&cfg).starts_with("warn,"));
        assert!(EnvFilter::try_new(filter_directive(&cfg)).is_ok());
    }
}
