//! Core building blocks for Tessel
//!
//! This crate holds everything the renderer needs that does not talk to a GPU:
//! typed handles and the slot registry behind them, the error type,
//! configuration, logging and injectable allocation tracking.

pub mod config;
pub mod error;
pub mod handle;
pub mod logging;
pub mod registry;
pub mod tracking;

pub use config::{ConfigManager, DepthFormat, LoggingConfig, RendererConfig, TesselConfig};
pub use error::{ErrorContext, Result, TesselError};
pub use handle::{Handle, HandleKind};
pub use logging::{LogCategory, LogLevel};
pub use registry::{Registry, ReusePolicy};
pub use tracking::{AllocationStats, AllocationTracker, KindStats, ResourceKind};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        config::{RendererConfig, TesselConfig},
        error::{Result, TesselError},
        handle::Handle,
        logging::{LogCategory, LogLevel},
        tracking::AllocationTracker,
    };
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Validate the configuration and bring up logging
pub fn init(config: &TesselConfig) -> Result<()> {
    config.validate()?;
    logging::init(&config.logging).map_err(|e| TesselError::Initialization {
        message: format!("Failed to initialize logging: {}", e),
        context: None,
    })?;

    tessel_info!(LogCategory::Core, "Tessel core v{} initialized", VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_init_rejects_invalid_config() {
        let mut config = TesselConfig::default();
        config.renderer.staging_capacity = 3;
        assert!(init(&config).is_err());
        assert!(init(&TesselConfig::default()).is_ok());
    }
}
