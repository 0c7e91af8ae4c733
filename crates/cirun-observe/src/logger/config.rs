use std::io::IsTerminal;

use crate::logger::{format::LoggerFormat, level::LoggerLevel};

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    pub level: LoggerLevel,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let use_color = std::io::stderr().is_terminal();
        Self {
            format: LoggerFormat::default(),
            level: LoggerLevel::default(),
            with_targets: false,
            use_color,
        }
    }
}
