//! Surface management for window integration
//!
//! Handles surface configuration, resize and image acquisition

use super::convert::from_wgpu_format;
use crate::types::TextureFormat;
use tessel_core::{tessel_debug, tessel_info, ErrorContext, LogCategory, Result, TesselError};
use wgpu::{
    Adapter, Device, PresentMode, Surface, SurfaceConfiguration, SurfaceError, SurfaceTexture,
    TextureUsages,
};

/// Manages a wgpu surface and its configuration
pub struct SurfaceManager {
    surface: Surface<'static>,
    config: SurfaceConfiguration,
    format: TextureFormat,
}

impl SurfaceManager {
    /// Configure `surface` for presentation
    ///
    /// Picks the first sRGB format the renderer can describe, falling back
    /// to the first describable one.
    pub fn new(
        surface: Surface<'static>,
        device: &Device,
        adapter: &Adapter,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Self> {
        let capabilities = surface.get_capabilities(adapter);
        let context = || ErrorContext::new("configure", "surface");

        let candidates: Vec<(wgpu::TextureFormat, TextureFormat)> = capabilities
            .formats
            .iter()
            .filter_map(|&f| from_wgpu_format(f).map(|ours| (f, ours)))
            .collect();
        let (wgpu_format, format) = candidates
            .iter()
            .copied()
            .find(|(f, _)| f.is_srgb())
            .or_else(|| candidates.first().copied())
            .ok_or_else(|| {
                TesselError::unsupported_with_context(
                    format!("no usable surface format in {:?}", capabilities.formats),
                    context(),
                )
            })?;
        let alpha_mode = capabilities
            .alpha_modes
            .first()
            .copied()
            .ok_or_else(|| TesselError::unsupported_with_context("surface reports no alpha modes", context()))?;

        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: wgpu_format,
            width: width.max(1),
            height: height.max(1),
            present_mode: if vsync {
                PresentMode::AutoVsync
            } else {
                PresentMode::AutoNoVsync
            },
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(device, &config);

        tessel_info!(
            LogCategory::Surface,
            format = ?format,
            width = config.width,
            height = config.height,
            vsync,
            "surface configured"
        );

        Ok(Self {
            surface,
            config,
            format,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32, device: &Device) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(TesselError::configuration(format!(
                "invalid surface dimensions: {}x{}",
                width, height
            )));
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(device, &self.config);
        tessel_debug!(LogCategory::Surface, width, height, "surface resized");
        Ok(())
    }

    /// Next presentable image
    ///
    /// Outdated and lost surfaces are reconfigured and reported as `None`,
    /// as are timeouts. Anything else is a device error.
    pub fn acquire(&mut self, device: &Device) -> Result<Option<SurfaceTexture>> {
        match self.surface.get_current_texture() {
            Ok(texture) => Ok(Some(texture)),
            Err(SurfaceError::Outdated | SurfaceError::Lost) => {
                self.surface.configure(device, &self.config);
                Ok(None)
            }
            Err(SurfaceError::Timeout) => Ok(None),
            Err(e) => Err(TesselError::device_with_context(
                format!("failed to acquire swapchain image: {}", e),
                ErrorContext::new("acquire", "surface"),
            )),
        }
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }
}
