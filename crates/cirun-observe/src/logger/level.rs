use std::str::FromStr;

use tracing_subscriber::EnvFilter;

use crate::logger::error::LoggerError;

/// Validated `EnvFilter` directive string (e.g. `info`, `cirun_core=debug,warn`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerLevel(String);

impl LoggerLevel {
    pub fn new(level: impl Into<String>) -> Result<Self, LoggerError> {
        let level = level.into();
        EnvFilter::try_new(&level).map_err(|_| LoggerError::InvalidLogLevel(level.clone()))?;
        Ok(Self(level))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LoggerLevel {
    fn default() -> Self {
        Self("info".to_string())
    }
}

impl FromStr for LoggerLevel {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
