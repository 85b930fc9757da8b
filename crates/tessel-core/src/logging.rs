//! Logging system for Tessel
//!
//! Events go through `tracing`. Each [`LogCategory`] maps to its own tracing
//! target (`tessel::<category>`), so the per-category levels from
//! [`LoggingConfig`] become `EnvFilter` directives. Per-frame messages use the
//! rate-limited macros, which drop events once a category exceeds its budget
//! for the current window.

use crate::config::LoggingConfig;
use crate::error::{Result, TesselError};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[doc(hidden)]
pub use tracing as __tracing;

/// Log levels supported by the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert LogLevel to string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn to_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = TesselError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(TesselError::configuration(format!(
                "unknown log level '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Log categories for organizing log messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Core,
    Device,
    Surface,
    Registry,
    Transfer,
    Pipeline,
    Pass,
}

impl LogCategory {
    pub const ALL: [LogCategory; 7] = [
        LogCategory::Core,
        LogCategory::Device,
        LogCategory::Surface,
        LogCategory::Registry,
        LogCategory::Transfer,
        LogCategory::Pipeline,
        LogCategory::Pass,
    ];

    /// Convert LogCategory to string
    pub const fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Core => "core",
            LogCategory::Device => "device",
            LogCategory::Surface => "surface",
            LogCategory::Registry => "registry",
            LogCategory::Transfer => "transfer",
            LogCategory::Pipeline => "pipeline",
            LogCategory::Pass => "pass",
        }
    }

    /// Tracing target used for events of this category
    pub const fn target(&self) -> &'static str {
        match self {
            LogCategory::Core => "tessel::core",
            LogCategory::Device => "tessel::device",
            LogCategory::Surface => "tessel::surface",
            LogCategory::Registry => "tessel::registry",
            LogCategory::Transfer => "tessel::transfer",
            LogCategory::Pipeline => "tessel::pipeline",
            LogCategory::Pass => "tessel::pass",
        }
    }
}

impl std::fmt::Display for LogCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rate limiting state for a specific category
#[derive(Debug)]
struct RateLimitState {
    last_reset: Instant,
    count: u32,
    max_count: u32,
    duration: Duration,
}

impl RateLimitState {
    fn new(max_count: u32, duration: Duration) -> Self {
        Self {
            last_reset: Instant::now(),
            count: 0,
            max_count,
            duration,
        }
    }

    fn should_allow(&mut self) -> bool {
        let now = Instant::now();

        if now.duration_since(self.last_reset) >= self.duration {
            self.last_reset = now;
            self.count = 0;
        }

        if self.count < self.max_count {
            self.count += 1;
            true
        } else {
            false
        }
    }
}

/// Per-category rate limiter shared by the rate-limited macros
#[derive(Debug)]
pub struct RateLimiter {
    limiters: Mutex<HashMap<LogCategory, RateLimitState>>,
    settings: RwLock<(u32, Duration)>,
}

impl RateLimiter {
    pub fn new(config: &LoggingConfig) -> Self {
        Self {
            limiters: Mutex::new(HashMap::new()),
            settings: RwLock::new(Self::settings_from(config)),
        }
    }

    fn settings_from(config: &LoggingConfig) -> (u32, Duration) {
        (
            config.max_rate_limit_count,
            Duration::from_secs(config.rate_limit_seconds),
        )
    }

    /// Check if a message of this category may be emitted now
    pub fn should_allow(&self, category: LogCategory) -> bool {
        let (max_count, duration) = *self.settings.read();
        self.limiters
            .lock()
            .entry(category)
            .or_insert_with(|| RateLimitState::new(max_count, duration))
            .should_allow()
    }

    /// Apply new limits and forget the current windows
    pub fn update(&self, config: &LoggingConfig) {
        *self.settings.write() = Self::settings_from(config);
        self.limiters.lock().clear();
    }
}

static RATE_LIMITER: OnceLock<RateLimiter> = OnceLock::new();

fn rate_limiter() -> &'static RateLimiter {
    RATE_LIMITER.get_or_init(|| RateLimiter::new(&LoggingConfig::default()))
}

/// Used by the rate-limited macros
#[doc(hidden)]
pub fn should_allow(category: LogCategory) -> bool {
    rate_limiter().should_allow(category)
}

/// Build `EnvFilter` directives from a logging configuration
///
/// Category names that match a [`LogCategory`] map onto its target; any other
/// name is passed through as a raw target so third-party crates (for example
/// `wgpu_core`) can be tuned from the same table.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let default = config
        .default_level
        .parse::<LogLevel>()
        .unwrap_or(LogLevel::Info);
    let mut directives = vec![default.as_str().to_string()];

    let mut entries: Vec<_> = config.category_levels.iter().collect();
    entries.sort();
    for (name, level) in entries {
        let Ok(level) = level.parse::<LogLevel>() else {
            continue;
        };
        let target = LogCategory::ALL
            .iter()
            .find(|c| c.as_str() == name.as_str())
            .map(|c| c.target().to_string())
            .unwrap_or_else(|| name.clone());
        directives.push(format!("{}={}", target, level));
    }

    directives.join(",")
}

/// Initialize the logging system
///
/// Installs a `tracing-subscriber` fmt subscriber. `RUST_LOG` takes precedence
/// over the configured levels when set. Calling this more than once only
/// refreshes the rate limits.
pub fn init(config: &LoggingConfig) -> Result<()> {
    config.validate()?;

    if RATE_LIMITER.set(RateLimiter::new(config)).is_err() {
        rate_limiter().update(config);
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directives(config))
            .map_err(|e| TesselError::configuration(format!("invalid log filter: {}", e)))?,
    };

    // A subscriber installed by the host application wins.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    Ok(())
}

// Core logging macros
#[macro_export]
macro_rules! tessel_trace {
    ($category:expr, $($arg:tt)+) => {
        $crate::logging::__tracing::trace!(target: $category.target(), $($arg)+)
    };
}

#[macro_export]
macro_rules! tessel_debug {
    ($category:expr, $($arg:tt)+) => {
        $crate::logging::__tracing::debug!(target: $category.target(), $($arg)+)
    };
}

#[macro_export]
macro_rules! tessel_info {
    ($category:expr, $($arg:tt)+) => {
        $crate::logging::__tracing::info!(target: $category.target(), $($arg)+)
    };
}

#[macro_export]
macro_rules! tessel_warn {
    ($category:expr, $($arg:tt)+) => {
        $crate::logging::__tracing::warn!(target: $category.target(), $($arg)+)
    };
}

#[macro_export]
macro_rules! tessel_error {
    ($category:expr, $($arg:tt)+) => {
        $crate::logging::__tracing::error!(target: $category.target(), $($arg)+)
    };
}

// Rate-limited logging macros
#[macro_export]
macro_rules! tessel_debug_rate_limited {
    ($category:expr, $($arg:tt)+) => {
        if $crate::logging::should_allow($category) {
            $crate::logging::__tracing::debug!(target: $category.target(), $($arg)+)
        }
    };
}

#[macro_export]
macro_rules! tessel_warn_rate_limited {
    ($category:expr, $($arg:tt)+) => {
        if $crate::logging::should_allow($category) {
            $crate::logging::__tracing::warn!(target: $category.target(), $($arg)+)
        }
    };
}

#[macro_export]
macro_rules! tessel_error_rate_limited {
    ($category:expr, $($arg:tt)+) => {
        if $crate::logging::should_allow($category) {
            $crate::logging::__tracing::error!(target: $category.target(), $($arg)+)
        }
    };
}

pub use tessel_debug;
pub use tessel_debug_rate_limited;
pub use tessel_error;
pub use tessel_error_rate_limited;
pub use tessel_info;
pub use tessel_trace;
pub use tessel_warn;
pub use tessel_warn_rate_limited;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert!("invalid".parse::<LogLevel>().is_err());

        assert_eq!(LogLevel::Info.as_str(), "info");
        assert_eq!(LogLevel::Error.to_tracing(), tracing::Level::ERROR);
    }

    #[test]
    fn test_rate_limiting() {
        let mut state = RateLimitState::new(2, Duration::from_millis(100));

        assert!(state.should_allow());
        assert!(state.should_allow());
        assert!(!state.should_allow());

        std::thread::sleep(Duration::from_millis(150));
        assert!(state.should_allow());
    }

    #[test]
    fn test_rate_limiter_is_per_category() {
        let config = LoggingConfig {
            max_rate_limit_count: 1,
            rate_limit_seconds: 60,
            ..LoggingConfig::default()
        };
        let limiter = RateLimiter::new(&config);

        assert!(limiter.should_allow(LogCategory::Pass));
        assert!(!limiter.should_allow(LogCategory::Pass));
        assert!(limiter.should_allow(LogCategory::Transfer));

        limiter.update(&config);
        assert!(limiter.should_allow(LogCategory::Pass));
    }

    #[test]
    fn test_filter_directives() {
        let mut category_levels = HashMap::new();
        category_levels.insert("transfer".to_string(), "trace".to_string());
        category_levels.insert("pass".to_string(), "warn".to_string());
        category_levels.insert("wgpu_core".to_string(), "error".to_string());
        category_levels.insert("broken".to_string(), "loud".to_string());

        let config = LoggingConfig {
            category_levels,
            default_level: "debug".to_string(),
            ..LoggingConfig::default()
        };

        assert_eq!(
            filter_directives(&config),
            "debug,tessel::pass=warn,tessel::transfer=trace,wgpu_core=error"
        );
    }

    #[test]
    fn test_targets_are_namespaced() {
        for category in LogCategory::ALL {
            assert_eq!(
                category.target(),
                format!("tessel::{}", category.as_str())
            );
        }
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        assert!(init(&config).is_ok());
        assert!(init(&config).is_ok());
        tessel_info!(LogCategory::Core, "logging initialized twice");
        tessel_warn_rate_limited!(LogCategory::Pass, frame = 1, "rate limited");
    }
}
