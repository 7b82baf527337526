//! Logging Configuration
//!
//! Library crates log through the `log` facade; the subscriber installed here
//! picks those records up as well.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

const LOG_LEVEL_ENV: &str = "MEDASSIST_LOG_LEVEL";

pub fn init_logging(verbose: bool) {
    let configured = std::env::var(LOG_LEVEL_ENV).ok();
    let level = resolve_default_level(verbose, configured.as_deref());
    let filter = EnvFilter::default().add_directive(level.into());

    // Logs go to stderr so they never interleave with the streamed answer.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    tracing::debug!("Logging initialized: level={}", level);
}

fn resolve_default_level(verbose: bool, configured: Option<&str>) -> LevelFilter {
    let fallback = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    match configured {
        Some(val) => parse_log_level(val).unwrap_or_else(|| {
            eprintln!(
                "Warning: Invalid {} '{}', falling back to default",
                LOG_LEVEL_ENV, val
            );
            fallback
        }),
        None => fallback,
    }
}

pub fn parse_log_level(value: &str) -> Option<LevelFilter> {
    match value.trim().to_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" => Some(LevelFilter::WARN),
        "error" => Some(LevelFilter::ERROR),
        "off" => Some(LevelFilter::OFF),
        _ => None,
    }
}
