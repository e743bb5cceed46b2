//! Structured logging utilities for shunt components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//! These macros go through `tracing` and may allocate, so they are only used
//! outside hook bodies: while loading config and from the layer constructor.
//! Hook bodies use the non-allocating logger in `shunt-core`.
//!
//! # Usage
//!
//! ```ignore
//! use shunt_config::log_layer_info;
//!
//! log_layer_info!("layer loaded", rules = 2, strategy = %"alias");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const CONFIG: &'static str = "CONFIG";
    pub const LAYER: &'static str = "LAYER";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level: {0}")]
pub struct ParseLogLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

// === CONFIG logging macros ===

#[macro_export]
macro_rules! log_config_warn {
    ($msg:literal $(, $($field:tt)*)?) => {
        tracing::warn!(component = $crate::logging::Component::CONFIG, $($($field)*,)? $msg)
    };
}

#[macro_export]
macro_rules! log_config_debug {
    ($msg:literal $(, $($field:tt)*)?) => {
        tracing::debug!(component = $crate::logging::Component::CONFIG, $($($field)*,)? $msg)
    };
}

// === LAYER logging macros ===

#[macro_export]
macro_rules! log_layer_warn {
    ($msg:literal $(, $($field:tt)*)?) => {
        tracing::warn!(component = $crate::logging::Component::LAYER, $($($field)*,)? $msg)
    };
}

#[macro_export]
macro_rules! log_layer_info {
    ($msg:literal $(, $($field:tt)*)?) => {
        tracing::info!(component = $crate::logging::Component::LAYER, $($($field)*,)? $msg)
    };
}

#[macro_export]
macro_rules! log_layer_debug {
    ($msg:literal $(, $($field:tt)*)?) => {
        tracing::debug!(component = $crate::logging::Component::LAYER, $($($field)*,)? $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at startup; later calls are no-ops.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    if level == LogLevel::Off {
        return;
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    // A host program may already own the global subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_constants() {
        assert_eq!(Component::LAYER, "LAYER");
        assert_eq!(Component::CONFIG, "CONFIG");
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!(" trace ".parse::<LogLevel>(), Ok(LogLevel::Trace));
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Off < LogLevel::Error);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging(LogLevel::Debug);
        init_logging(LogLevel::Debug);
        log_layer_debug!("after init", attempt = 2);
        log_layer_warn!("after init", attempt = 2);
    }
}
