use std::{fmt, str::FromStr};

use crate::logger::error::LoggerError;

/// Where and how log records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggerFormat {
    /// Human-readable lines on stderr.
    #[default]
    Text,
    /// One JSON object per record on stderr; for log shippers on cloud instances.
    Json,
    /// systemd journal, when the agent runs as a unit.
    Journald,
}

impl LoggerFormat {
    pub const JOURNALD_AVAILABLE: bool = cfg!(all(target_os = "linux", feature = "journald"));

    pub fn as_str(&self) -> &'static str {
        match self {
            LoggerFormat::Text => "text",
            LoggerFormat::Json => "json",
            LoggerFormat::Journald => "journald",
        }
    }
}

impl fmt::Display for LoggerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoggerFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => LoggerFormat::Text,
            "json" => LoggerFormat::Json,
            "journald" | "journal" => LoggerFormat::Journald,
            _ => return Err(LoggerError::InvalidFormat(s.to_string())),
        };
        if format == LoggerFormat::Journald && !Self::JOURNALD_AVAILABLE {
            return Err(LoggerError::JournaldNotSupported);
        }
        Ok(format)
    }
}
