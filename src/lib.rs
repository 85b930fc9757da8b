//! Tessel - handle-based GPU resources, chunked transfers and render passes
//!
//! Tessel sits one step above an explicit graphics API: applications create
//! buffers, textures, samplers and shaders through a [`Renderer`] and get
//! small copyable handles back. Data moves through fixed staging buffers in
//! copy passes, and drawing happens in render passes that check bindings
//! before anything reaches the GPU.
//!
//! ```no_run
//! use tessel::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = TesselConfig::default();
//!     tessel::init(&config)?;
//!
//!     let backend = HeadlessBackend::new(800, 600);
//!     let mut renderer = Renderer::new(backend, config.renderer)?;
//!     let buffer = renderer.create_buffer(BufferUsage::VERTEX, 64)?;
//!
//!     let mut pass = renderer.begin_copy_pass();
//!     pass.upload_buffer(&[0u8; 64], buffer)?;
//!     renderer.end_copy_pass(pass)
//! }
//! ```

pub use tessel_core;
pub use tessel_renderer;

use std::path::Path;

pub use tessel_core::{ConfigManager, Result, TesselConfig, TesselError};
pub use tessel_renderer::{HeadlessBackend, Renderer, WgpuBackend};

/// Unified prelude module that exports all commonly used types
pub mod prelude {
    pub use tessel_core::prelude::*;
    pub use tessel_renderer::prelude::*;
    pub use tessel_renderer::{HeadlessBackend, WgpuBackend};
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Validate configuration and bring up logging
///
/// Call once before creating a renderer.
pub fn init(config: &TesselConfig) -> Result<()> {
    tessel_core::init(config)
}

/// Load a JSON configuration file, initialize with it and hand back a
/// manager for runtime changes
pub fn init_from_file(path: impl AsRef<Path>) -> Result<ConfigManager> {
    let config = TesselConfig::from_json_file(path)?;
    init(&config)?;
    Ok(ConfigManager::with_config(config))
}
