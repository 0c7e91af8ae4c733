use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, fmt::time::OffsetTime, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// HTTP client internals are only interesting when asked for explicitly.
const QUIET_DEPS: &[&str] = &["hyper=warn", "hyper_util=warn", "reqwest=warn", "h2=warn"];

pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = mk_filter(cfg.level.as_str())?;
    let layer = match cfg.format {
        LoggerFormat::Text => text_layer(cfg),
        LoggerFormat::Json => json_layer(cfg),
        LoggerFormat::Journald => journald_layer()?,
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("global default") || msg.contains("SetGlobalDefaultError") {
                LoggerError::AlreadyInitialized
            } else {
                LoggerError::InitializationFailed(msg)
            }
        })
}

// stdout belongs to nobody: the runner agent's output is relayed through tracing
fn text_layer(cfg: &LoggerConfig) -> BoxedLayer {
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg.use_color)
        .with_target(cfg.with_targets)
        .with_timer(mk_timer())
        .boxed()
}

fn json_layer(cfg: &LoggerConfig) -> BoxedLayer {
    fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(cfg.with_targets)
        .with_timer(mk_timer())
        .boxed()
}

fn mk_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    let mut directives = level.to_string();
    for dep in QUIET_DEPS {
        let name = dep.split('=').next().unwrap_or(dep);
        if !level.contains(name) {
            directives.push(',');
            directives.push_str(dep);
        }
    }
    EnvFilter::try_new(&directives).map_err(|_| LoggerError::InvalidLogLevel(level.to_string()))
}

// The local offset can only be read safely before other threads start.
fn mk_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald_layer() -> Result<BoxedLayer, LoggerError> {
    let layer = tracing_journald::layer()
        .map_err(|e| LoggerError::Journald(e.to_string()))?
        .with_syslog_identifier("cirun-agentd".to_string());
    Ok(layer.boxed())
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald_layer() -> Result<BoxedLayer, LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiets_http_stack_unless_named() {
        assert!(mk_filter("info").is_ok());
        assert!(mk_filter("debug,reqwest=trace").is_ok());
    }

    #[test]
    fn timer_writes_rfc3339() {
        use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

        let mut out = String::new();
        mk_timer().format_time(&mut Writer::new(&mut out)).unwrap();

        // 2026-10-15T09:30:00.123456789+02:00
        assert_eq!(out.as_bytes()[4], b'-');
        assert_eq!(out.as_bytes()[10], b'T');
        assert!(out.ends_with('Z') || out[out.len() - 6..].starts_with(['+', '-']));
    }

    #[test]
    fn rejects_bad_directive() {
        assert!(matches!(
            mk_filter("info,cirun=loud"),
            Err(LoggerError::InvalidLogLevel(_))
        ));
    }
}
