//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::sections::LogConfig;

/// Environment variable overriding the configured default level for any
/// new logger.
pub const LOG_ENV_VAR: &str = "NFD_LOG";

/// Log severity levels of the configuration surface, mapped onto the
/// tracing level filters.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd)]
pub enum LogLevel {
    None,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    All,
}

// ===== impl LogLevel =====

impl LogLevel {
    pub fn to_filter(self) -> LevelFilter {
        match self {
            LogLevel::None => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace | LogLevel::All => LevelFilter::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    // Accepts symbolic levels and the numeric forms 0..5 and 255.
    fn from_str(s: &str) -> Result<LogLevel, ()> {
        match s {
            "NONE" | "none" | "0" => Ok(LogLevel::None),
            "ERROR" | "error" | "1" => Ok(LogLevel::Error),
            "WARN" | "warn" | "2" => Ok(LogLevel::Warn),
            "INFO" | "info" | "3" => Ok(LogLevel::Info),
            "DEBUG" | "debug" | "4" => Ok(LogLevel::Debug),
            "TRACE" | "trace" | "5" => Ok(LogLevel::Trace),
            "ALL" | "all" | "255" => Ok(LogLevel::All),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self {
            LogLevel::None => "NONE",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
            LogLevel::All => "ALL",
        };
        write!(f, "{level}")
    }
}

// ===== global functions =====

/// Effective default level: the `NFD_LOG` environment variable beats the
/// configured default, which beats INFO.
pub fn effective_default_level(config: &LogConfig) -> LogLevel {
    std::env::var(LOG_ENV_VAR)
        .ok()
        .and_then(|value| value.parse().ok())
        .or(config.default_level)
        .unwrap_or(LogLevel::Info)
}

/// Builds the tracing filter from the log configuration: the default
/// level plus one directive per configured module. Module names are
/// tracing targets, e.g. `nomen_fwd::forwarder`.
pub fn build_filter(config: &LogConfig) -> EnvFilter {
    let default = effective_default_level(config);
    let mut filter = EnvFilter::builder()
        .with_default_directive(default.to_filter().into())
        .parse_lossy("");
    for (module, level) in &config.module_levels {
        let directive = format!("{}={}", module, level.to_filter());
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Initializes tracing for the daemon process.
pub fn init(config: &LogConfig) {
    let layer = tracing_subscriber::fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(build_filter(config))
        .with(layer)
        .init();
}

// ===== tests =====
