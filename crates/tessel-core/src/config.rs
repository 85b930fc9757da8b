//! Configuration system for Tessel

use crate::error::{ErrorContext, Result, TesselError};
use crate::logging::LogLevel;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Staging buffer capacity used when nothing else is configured (16 MiB)
pub const DEFAULT_STAGING_CAPACITY: u32 = 16 * 1024 * 1024;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesselConfig {
    /// Renderer settings
    pub renderer: RendererConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Depth format of the default depth-stencil screen texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthFormat {
    D16Unorm,
    D24UnormS8Uint,
    D32Float,
    D32FloatS8Uint,
}

impl DepthFormat {
    /// Whether the format carries a stencil aspect
    pub fn has_stencil(self) -> bool {
        matches!(self, DepthFormat::D24UnormS8Uint | DepthFormat::D32FloatS8Uint)
    }
}

/// Renderer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Capacity in bytes of each staging buffer (upload and download)
    pub staging_capacity: u32,
    /// Present with vertical sync
    pub vsync: bool,
    /// Enable GPU API validation layers
    pub validation: bool,
    /// Format of the default depth-stencil screen texture
    pub depth_format: DepthFormat,
    /// Clear color of the window render pass
    pub clear_color: [f32; 4],
    /// Near plane used by `generate_perspective`
    pub near_plane: f32,
    /// Far plane used by `generate_perspective`
    pub far_plane: f32,
    /// Upper bound applied to sampler anisotropy requests
    pub max_anisotropy: f32,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Category-specific log levels (category name -> level string)
    pub category_levels: HashMap<String, String>,
    /// Level for everything not covered by a category entry
    pub default_level: String,
    /// Rate limiting window in seconds
    pub rate_limit_seconds: u64,
    /// Maximum number of rate-limited messages per category and window
    pub max_rate_limit_count: u32,
}

impl Default for TesselConfig {
    fn default() -> Self {
        let mut category_levels = HashMap::new();

        category_levels.insert("core".to_string(), "info".to_string());
        category_levels.insert("device".to_string(), "info".to_string());
        category_levels.insert("surface".to_string(), "info".to_string());
        category_levels.insert("pipeline".to_string(), "info".to_string());
        category_levels.insert("pass".to_string(), "warn".to_string());
        category_levels.insert("registry".to_string(), "warn".to_string());
        category_levels.insert("transfer".to_string(), "warn".to_string()); // per-chunk noise

        Self {
            renderer: RendererConfig {
                staging_capacity: DEFAULT_STAGING_CAPACITY,
                vsync: true,
                validation: cfg!(debug_assertions),
                depth_format: DepthFormat::D24UnormS8Uint,
                clear_color: [0.0, 0.0, 0.0, 1.0],
                near_plane: 0.01,
                far_plane: 4096.0,
                max_anisotropy: 16.0,
            },
            logging: LoggingConfig {
                category_levels,
                default_level: "info".to_string(),
                rate_limit_seconds: 5,
                max_rate_limit_count: 10,
            },
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        TesselConfig::default().renderer
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        TesselConfig::default().logging
    }
}

impl RendererConfig {
    /// Check the settings for values the renderer cannot work with
    pub fn validate(&self) -> Result<()> {
        let ctx = || ErrorContext::new("validate", "renderer_config");

        if self.staging_capacity == 0 {
            return Err(TesselError::configuration_with_context(
                "staging capacity must be non-zero",
                ctx(),
            ));
        }
        if self.staging_capacity % 4 != 0 {
            return Err(TesselError::configuration_with_context(
                format!(
                    "staging capacity {} is not a multiple of 4",
                    self.staging_capacity
                ),
                ctx().with_metadata("staging_capacity", self.staging_capacity),
            ));
        }
        if !(self.near_plane > 0.0 && self.near_plane < self.far_plane) {
            return Err(TesselError::configuration_with_context(
                format!(
                    "invalid clip planes: near={} far={}",
                    self.near_plane, self.far_plane
                ),
                ctx(),
            ));
        }
        if self.max_anisotropy < 1.0 {
            return Err(TesselError::configuration_with_context(
                format!("max anisotropy {} is below 1", self.max_anisotropy),
                ctx(),
            ));
        }
        Ok(())
    }
}

impl LoggingConfig {
    /// Check that every level string parses
    pub fn validate(&self) -> Result<()> {
        if self.default_level.parse::<LogLevel>().is_err() {
            return Err(TesselError::configuration(format!(
                "unknown default log level '{}'",
                self.default_level
            )));
        }
        for (category, level) in &self.category_levels {
            if level.parse::<LogLevel>().is_err() {
                return Err(TesselError::configuration_with_context(
                    format!("unknown log level '{}' for category '{}'", level, category),
                    ErrorContext::new("validate", "logging_config")
                        .with_metadata("category", category),
                ));
            }
        }
        Ok(())
    }
}

impl TesselConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.renderer.validate()?;
        self.logging.validate()
    }
}

/// Shared, mutable configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigManager {
    config: Arc<RwLock<TesselConfig>>,
}

impl ConfigManager {
    /// Create a configuration manager with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration manager with custom config
    pub fn with_config(config: TesselConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// Get a copy of the current configuration
    pub fn get_config(&self) -> TesselConfig {
        self.config.read().clone()
    }

    /// Update the configuration, rejecting updates that fail validation
    pub fn update_config<F>(&self, updater: F) -> Result<()>
    where
        F: FnOnce(&mut TesselConfig),
    {
        let mut candidate = self.get_config();
        updater(&mut candidate);
        candidate.validate()?;
        *self.config.write() = candidate;
        Ok(())
    }

    /// Get the current renderer configuration
    pub fn renderer_config(&self) -> RendererConfig {
        self.config.read().renderer.clone()
    }

    /// Get the current logging configuration
    pub fn logging_config(&self) -> LoggingConfig {
        self.config.read().logging.clone()
    }

    /// Set log level for a specific category
    pub fn set_category_level(&self, category: &str, level: LogLevel) {
        self.config
            .write()
            .logging
            .category_levels
            .insert(category.to_string(), level.as_str().to_string());
    }

    /// Get log level for a specific category
    pub fn category_level(&self, category: &str) -> Option<LogLevel> {
        self.config
            .read()
            .logging
            .category_levels
            .get(category)
            .and_then(|level| level.parse().ok())
    }
}
