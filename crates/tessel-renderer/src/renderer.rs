//! Resource owner
//!
//! [`Renderer`] owns the backend, every registry, the staging buffers and the
//! screen-sized textures. It hands out passes, and takes them back to submit
//! the recorded work.

use crate::backend::commands::{
    AttachmentTarget, ColorAttachment, DepthAttachment, DownloadTicket, GpuCommand,
    RenderPassTargets,
};
use crate::backend::{
    BufferDesc, GpuBackend, RawBuffer, RawTexture, TransferBufferDesc, TransferUsage,
};
use crate::handles::{
    BufferHandle, SamplerHandle, ScreenTextureHandle, ShaderHandle, TextureHandle, TextureRef,
};
use crate::render_pass::{cleared_depth, swapchain_attachment, ActiveRenderPass, CustomInfo};
use crate::resources::{
    BufferEntry, ResourceTables, SamplerEntry, SharedTables, TextureEntry, TextureState,
};
use crate::shader::{CompiledPipelineInfo, PipelineInfo, ShaderStageInfo, VisualShader};
use crate::transfer::{ActiveCopyPass, StagingBuffer};
use crate::types::{
    BufferUsage, Color, LoadOp, SamplerDesc, TextureDesc, TextureFormat, TextureKind,
    TextureUsage, Viewport,
};
use glam::Mat4;
use smallvec::SmallVec;
use tessel_core::{
    tessel_debug, tessel_debug_rate_limited, tessel_info, tessel_warn, AllocationTracker,
    ErrorContext, LogCategory, RendererConfig, ResourceKind, Result, TesselError,
};

/// What `clean_resources` leaves alive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupExclude {
    /// Destroy everything, including the staging buffers and the default depth texture
    None,
    /// Keep the staging buffers and the default depth texture
    Internals,
    /// Keep internals and compiled shaders
    #[default]
    Default,
}

/// Owner of a GPU backend and every resource created through it
pub struct Renderer<B: GpuBackend> {
    backend: B,
    config: RendererConfig,
    tracker: AllocationTracker,
    tables: SharedTables,
    upload: Option<StagingBuffer>,
    download: Option<StagingBuffer>,
    depth_texture: ScreenTextureHandle,
    window_size: (u32, u32),
}

fn texture_bytes(desc: &TextureDesc) -> u64 {
    (0..desc.mip_levels).map(|mip| desc.mip_size_bytes(mip)).sum()
}

impl<B: GpuBackend> Renderer<B> {
    /// Create a renderer with its own allocation tracker
    pub fn new(backend: B, config: RendererConfig) -> Result<Self> {
        Self::with_tracker(backend, config, AllocationTracker::new())
    }

    /// Create a renderer reporting allocations to `tracker`
    pub fn with_tracker(
        backend: B,
        config: RendererConfig,
        tracker: AllocationTracker,
    ) -> Result<Self> {
        config.validate()?;

        let window_size = backend.surface_size();
        let mut renderer = Self {
            backend,
            config,
            tracker,
            tables: ResourceTables::shared(),
            upload: None,
            download: None,
            depth_texture: ScreenTextureHandle::INVALID,
            window_size,
        };

        renderer.upload = Some(renderer.create_staging(TransferUsage::Upload)?);
        renderer.download = Some(renderer.create_staging(TransferUsage::Download)?);

        let depth_format = TextureFormat::from(renderer.config.depth_format);
        renderer.depth_texture =
            renderer.create_screen_texture(depth_format, TextureUsage::DEPTH_STENCIL_TARGET)?;

        tessel_info!(
            LogCategory::Core,
            backend = renderer.backend.name(),
            width = window_size.0,
            height = window_size.1,
            staging_capacity = renderer.config.staging_capacity,
            "renderer initialized"
        );
        Ok(renderer)
    }

    fn create_staging(&mut self, usage: TransferUsage) -> Result<StagingBuffer> {
        let capacity = self.config.staging_capacity;
        let raw = self.backend.create_transfer_buffer(&TransferBufferDesc {
            usage,
            size: capacity,
        })?;
        self.tracker
            .record_create(ResourceKind::TransferBuffer, capacity as u64);
        Ok(StagingBuffer { raw, capacity })
    }

    fn release_staging(&mut self, staging: Option<StagingBuffer>) {
        if let Some(staging) = staging {
            self.backend.destroy_transfer_buffer(staging.raw);
            self.tracker
                .record_release(ResourceKind::TransferBuffer, staging.capacity as u64);
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn tracker(&self) -> &AllocationTracker {
        &self.tracker
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    pub fn swapchain_format(&self) -> TextureFormat {
        self.backend.swapchain_format()
    }

    // Buffers

    pub fn create_buffer(&mut self, usage: BufferUsage, size: u32) -> Result<BufferHandle> {
        let raw = self.backend.create_buffer(&BufferDesc {
            usage,
            size: size as u64,
        })?;
        self.tracker.record_create(ResourceKind::Buffer, size as u64);
        let handle = self
            .tables
            .write()
            .buffers
            .allocate(BufferEntry { raw, usage, size });
        tessel_debug!(LogCategory::Registry, buffer = %handle, size, "buffer created");
        Ok(handle)
    }

    /// Replace the backing storage of `buffer` with `new_size` bytes
    ///
    /// The handle and usage are kept. Contents are not preserved.
    pub fn resize_buffer(&mut self, buffer: BufferHandle, new_size: u32) -> Result<()> {
        let entry = *self.tables.read().buffer(buffer)?;
        let raw = self.backend.create_buffer(&BufferDesc {
            usage: entry.usage,
            size: new_size as u64,
        })?;
        self.backend.destroy_buffer(entry.raw);
        self.tracker
            .record_release(ResourceKind::Buffer, entry.size as u64);
        self.tracker
            .record_create(ResourceKind::Buffer, new_size as u64);

        if let Some(slot) = self.tables.write().buffers.get_mut(buffer) {
            slot.raw = raw;
            slot.size = new_size;
        }
        tessel_debug!(
            LogCategory::Registry,
            buffer = %buffer,
            old_size = entry.size,
            new_size,
            "buffer resized"
        );
        Ok(())
    }

    pub fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        let entry = self
            .tables
            .write()
            .buffers
            .destroy(buffer)
            .ok_or(TesselError::InvalidHandle {
                kind: "buffer",
                index: buffer.index(),
            })?;
        self.backend.destroy_buffer(entry.raw);
        self.tracker
            .record_release(ResourceKind::Buffer, entry.size as u64);
        Ok(())
    }

    pub fn is_buffer_valid(&self, buffer: BufferHandle) -> bool {
        self.tables.read().buffers.is_valid(buffer)
    }

    pub fn buffer_size(&self, buffer: BufferHandle) -> Option<u32> {
        self.tables.read().buffers.get(buffer).map(|entry| entry.size)
    }

    /// Backend object currently behind `buffer`
    pub fn raw_buffer(&self, buffer: BufferHandle) -> Option<RawBuffer> {
        self.tables.read().buffers.get(buffer).map(|entry| entry.raw)
    }

    // Textures

    fn validate_texture(desc: &TextureDesc) -> Result<()> {
        let context = || {
            ErrorContext::new("create_texture", "renderer")
                .with_metadata("kind", format!("{:?}", desc.kind))
                .with_metadata("extent", format!("{}x{}x{}", desc.width, desc.height, desc.depth))
        };
        if desc.width == 0 || desc.height == 0 || desc.depth == 0 {
            return Err(TesselError::unsupported_with_context(
                "texture extent must be non-zero",
                context(),
            ));
        }
        let layers_ok = match desc.kind {
            TextureKind::D2 => desc.depth == 1,
            TextureKind::Cube => desc.depth == 6,
            TextureKind::CubeArray => desc.depth % 6 == 0,
            TextureKind::D2Array | TextureKind::D3 => true,
        };
        if !layers_ok {
            return Err(TesselError::unsupported_with_context(
                format!("invalid layer count {} for {:?}", desc.depth, desc.kind),
                context(),
            ));
        }
        if matches!(desc.kind, TextureKind::Cube | TextureKind::CubeArray)
            && desc.width != desc.height
        {
            return Err(TesselError::unsupported_with_context(
                "cube faces must be square",
                context(),
            ));
        }
        if desc.mip_levels > desc.full_mip_chain() {
            return Err(TesselError::unsupported_with_context(
                format!(
                    "{} mip levels requested, at most {} possible",
                    desc.mip_levels,
                    desc.full_mip_chain()
                ),
                context(),
            ));
        }
        Ok(())
    }

    /// Create a texture; `mip_levels == 0` requests a full chain
    pub fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle> {
        Self::validate_texture(desc)?;
        let state = TextureState::from_desc(desc);
        let resolved = state.desc();
        let raw = self.backend.create_texture(&resolved)?;
        self.tracker
            .record_create(ResourceKind::Texture, texture_bytes(&resolved));

        let handle = self
            .tables
            .write()
            .textures
            .allocate(TextureEntry::new(raw, state));
        tessel_debug!(
            LogCategory::Registry,
            texture = %handle,
            format = ?resolved.format,
            width = resolved.width,
            height = resolved.height,
            depth = resolved.depth,
            mips = resolved.mip_levels,
            "texture created"
        );
        Ok(handle)
    }

    pub fn destroy_texture(&mut self, texture: TextureHandle) -> Result<()> {
        let entry = self
            .tables
            .write()
            .textures
            .destroy(texture)
            .ok_or(TesselError::InvalidHandle {
                kind: "texture",
                index: texture.index(),
            })?;
        self.backend.destroy_texture(entry.raw);
        self.tracker
            .record_release(ResourceKind::Texture, texture_bytes(&entry.state.desc()));
        Ok(())
    }

    pub fn is_texture_valid(&self, texture: TextureHandle) -> bool {
        self.tables.read().textures.is_valid(texture)
    }

    /// Description and mip state of a live texture
    pub fn texture_info(&self, texture: TextureHandle) -> Option<TextureState> {
        self.tables.read().textures.get(texture).map(|entry| entry.state)
    }

    /// Backend object currently behind a texture or screen texture
    pub fn raw_texture(&self, texture: impl Into<TextureRef>) -> Option<RawTexture> {
        self.tables
            .read()
            .texture_ref(texture.into())
            .ok()
            .map(|entry| entry.raw)
    }

    // Screen textures

    /// Create a texture that follows the window size
    pub fn create_screen_texture(
        &mut self,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Result<ScreenTextureHandle> {
        let (width, height) = self.window_size;
        let desc = TextureDesc {
            format,
            kind: TextureKind::D2,
            usage,
            width: width.max(1),
            height: height.max(1),
            depth: 1,
            mip_levels: 1,
        };
        let raw = self.backend.create_texture(&desc)?;
        self.tracker
            .record_create(ResourceKind::ScreenTexture, texture_bytes(&desc));
        let handle = self
            .tables
            .write()
            .screen_textures
            .allocate(TextureEntry::new(raw, TextureState::from_desc(&desc)));
        tessel_debug!(LogCategory::Registry, texture = %handle, format = ?format, "screen texture created");
        Ok(handle)
    }

    pub fn destroy_screen_texture(&mut self, texture: ScreenTextureHandle) -> Result<()> {
        let entry = self
            .tables
            .write()
            .screen_textures
            .destroy(texture)
            .ok_or(TesselError::InvalidHandle {
                kind: "screen texture",
                index: texture.index(),
            })?;
        self.backend.destroy_texture(entry.raw);
        self.tracker.record_release(
            ResourceKind::ScreenTexture,
            texture_bytes(&entry.state.desc()),
        );
        Ok(())
    }

    pub fn is_screen_texture_valid(&self, texture: ScreenTextureHandle) -> bool {
        self.tables.read().screen_textures.is_valid(texture)
    }

    /// The depth-stencil texture used by window passes
    pub fn depth_texture(&self) -> ScreenTextureHandle {
        self.depth_texture
    }

    // Samplers

    /// Create a sampler; anisotropy is clamped to the configured maximum
    pub fn create_sampler(
        &mut self,
        linear: bool,
        clamp: bool,
        anisotropy: f32,
    ) -> Result<SamplerHandle> {
        let desc = SamplerDesc {
            linear,
            clamp,
            anisotropy: anisotropy.clamp(0.0, self.config.max_anisotropy),
        };
        let raw = self.backend.create_sampler(&desc)?;
        self.tracker.record_create(ResourceKind::Sampler, 0);
        Ok(self
            .tables
            .write()
            .samplers
            .allocate(SamplerEntry { raw, desc }))
    }

    pub fn destroy_sampler(&mut self, sampler: SamplerHandle) -> Result<()> {
        let entry = self
            .tables
            .write()
            .samplers
            .destroy(sampler)
            .ok_or(TesselError::InvalidHandle {
                kind: "sampler",
                index: sampler.index(),
            })?;
        self.backend.destroy_sampler(entry.raw);
        self.tracker.record_release(ResourceKind::Sampler, 0);
        Ok(())
    }

    pub fn is_sampler_valid(&self, sampler: SamplerHandle) -> bool {
        self.tables.read().samplers.is_valid(sampler)
    }

    /// Settings a live sampler was created with, anisotropy already clamped
    pub fn sampler_info(&self, sampler: SamplerHandle) -> Option<SamplerDesc> {
        self.tables.read().samplers.get(sampler).map(|entry| entry.desc)
    }

    // Shaders

    /// Compile a vertex/fragment pair into a graphics pipeline
    pub fn add_shader(
        &mut self,
        vertex: &ShaderStageInfo,
        fragment: &ShaderStageInfo,
        info: &PipelineInfo,
    ) -> Result<ShaderHandle> {
        let shader = VisualShader::compile(&mut self.backend, vertex, fragment, info)?;
        self.tracker.record_create(ResourceKind::Shader, 0);
        self.tracker.record_create(ResourceKind::Shader, 0);
        self.tracker.record_create(ResourceKind::Pipeline, 0);
        Ok(self.tables.write().shaders.allocate(shader))
    }

    pub fn destroy_shader(&mut self, shader: ShaderHandle) -> Result<()> {
        let entry = self
            .tables
            .write()
            .shaders
            .destroy(shader)
            .ok_or(TesselError::InvalidHandle {
                kind: "shader",
                index: shader.index(),
            })?;
        self.release_shader(&entry);
        Ok(())
    }

    fn release_shader(&mut self, shader: &VisualShader) {
        shader.release(&mut self.backend);
        self.tracker.record_release(ResourceKind::Pipeline, 0);
        self.tracker.record_release(ResourceKind::Shader, 0);
        self.tracker.record_release(ResourceKind::Shader, 0);
    }

    pub fn is_shader_valid(&self, shader: ShaderHandle) -> bool {
        self.tables.read().shaders.is_valid(shader)
    }

    /// Binding metadata recorded when `shader` was compiled
    pub fn pipeline_info(&self, shader: ShaderHandle) -> Option<CompiledPipelineInfo> {
        self.tables
            .read()
            .shaders
            .get(shader)
            .map(|shader| shader.info.clone())
    }

    // Copy passes

    /// Open a copy pass; invalid once the staging buffers were released
    pub fn begin_copy_pass(&mut self) -> ActiveCopyPass {
        let (Some(upload), Some(download)) = (self.upload, self.download) else {
            tessel_warn!(LogCategory::Transfer, "copy pass requested without staging buffers");
            return ActiveCopyPass::default();
        };
        let stream = self.backend.acquire_command_stream();
        ActiveCopyPass::open(
            self.tables.clone(),
            stream,
            upload,
            download,
            self.tracker.clone(),
        )
    }

    /// Close a copy pass and submit it
    ///
    /// Textures whose base level this pass wrote get their mip chains rebuilt
    /// at the end of the same stream, as do dirty textures left behind by a
    /// failed submit. Dirty flags clear only once the submit succeeded. When
    /// the pass recorded downloads this blocks until they are readable.
    pub fn end_copy_pass(&mut self, pass: ActiveCopyPass) -> Result<()> {
        let Some(mut state) = pass.into_state() else {
            return Ok(());
        };
        state.stream.push(GpuCommand::EndCopyPass);

        let regenerate: Vec<(TextureHandle, RawTexture)> = {
            let tables = self.tables.read();
            let own = state
                .dirtied
                .iter()
                .filter_map(|&handle| tables.textures.get(handle).map(|e| (handle, e.raw)));
            let orphaned = tables
                .textures
                .iter()
                .filter(|(handle, entry)| {
                    entry.is_orphaned_dirty() && !state.dirtied.contains(handle)
                })
                .map(|(handle, entry)| (handle, entry.raw));
            own.chain(orphaned).collect()
        };
        state.release_mip_writers();
        for &(_, texture) in &regenerate {
            state.stream.push(GpuCommand::GenerateMipmaps { texture });
        }

        let commands = state.stream.len();
        let downloads = state.pending_downloads;
        let stream = std::mem::take(&mut state.stream);
        self.backend.submit(stream)?;

        {
            let mut tables = self.tables.write();
            for &(handle, raw) in &regenerate {
                if let Some(entry) = tables.textures.get_mut(handle) {
                    if entry.raw == raw && entry.mip_writers == 0 {
                        entry.state.dirty_mip = false;
                    }
                }
            }
        }
        if downloads > 0 {
            self.backend.wait_idle()?;
        }
        let regenerated = regenerate.len();

        tessel_debug!(
            LogCategory::Transfer,
            commands,
            downloads,
            mip_chains = regenerated,
            "copy pass submitted"
        );
        Ok(())
    }

    /// Bytes of a download recorded in an ended copy pass
    pub fn take_download(&mut self, ticket: DownloadTicket) -> Result<Vec<u8>> {
        if ticket.is_empty() {
            return if self.tables.write().redeem_empty_download(ticket.id()) {
                Ok(Vec::new())
            } else {
                Err(TesselError::UnknownDownload { ticket: ticket.id() })
            };
        }
        self.backend
            .take_download(ticket)
            .ok_or(TesselError::UnknownDownload { ticket: ticket.id() })
    }

    // Render passes

    /// Open a pass that draws into the next window image
    ///
    /// Returns an invalid pass when no image is available; that frame is
    /// simply skipped.
    pub fn begin_window_render_pass(&mut self) -> Result<ActiveRenderPass> {
        let mut stream = self.backend.acquire_command_stream();
        let image = match self.backend.acquire_swapchain_image(&mut stream) {
            Ok(Some(image)) => image,
            Ok(None) => {
                self.backend.submit(stream)?;
                tessel_debug_rate_limited!(LogCategory::Surface, "no swapchain image, frame skipped");
                return Ok(ActiveRenderPass::default());
            }
            Err(e) => {
                self.backend.cancel(stream);
                return Err(e);
            }
        };

        if (image.width, image.height) != self.window_size {
            tessel_debug!(
                LogCategory::Surface,
                width = image.width,
                height = image.height,
                "swapchain size changed, following it"
            );
            if let Err(e) = self.recreate_screen_textures(image.width, image.height) {
                self.backend.cancel(stream);
                return Err(e);
            }
        }

        let depth = self
            .tables
            .read()
            .screen_textures
            .get(self.depth_texture)
            .map(|entry| cleared_depth(entry.raw, entry.state.format.has_stencil()));

        let mut colors = SmallVec::new();
        colors.push(swapchain_attachment(Color::from(self.config.clear_color)));
        Ok(ActiveRenderPass::open(
            self.tables.clone(),
            stream,
            RenderPassTargets { colors, depth },
            Viewport::full(image.width, image.height),
        ))
    }

    /// Open a pass that draws into explicit targets
    pub fn begin_custom_render_pass(&mut self, info: &CustomInfo) -> Result<ActiveRenderPass> {
        if info.color_targets.is_empty() && info.depth.is_none() {
            return Err(TesselError::unsupported(
                "custom render pass needs a color or depth target",
            ));
        }

        let (targets, extent) = {
            let tables = self.tables.read();
            let mut extent = None;
            let mut colors = SmallVec::new();
            for target in &info.color_targets {
                let entry = tables.texture_ref(target.texture)?;
                check_target_usage(target.texture, entry, TextureUsage::COLOR_TARGET)?;
                extent.get_or_insert((entry.state.width, entry.state.height));
                colors.push(ColorAttachment {
                    target: AttachmentTarget::Texture(entry.raw),
                    load: target.load,
                    clear: target.clear_color,
                    cycle: target.load == LoadOp::Clear,
                });
            }
            let depth = match &info.depth {
                Some(depth) => {
                    let entry = tables.texture_ref(depth.texture)?;
                    check_target_usage(depth.texture, entry, TextureUsage::DEPTH_STENCIL_TARGET)?;
                    extent.get_or_insert((entry.state.width, entry.state.height));
                    Some(DepthAttachment {
                        texture: entry.raw,
                        load: depth.load,
                        clear_depth: depth.clear_depth,
                        clear_stencil: depth.clear_stencil,
                        has_stencil: entry.state.format.has_stencil(),
                    })
                }
                None => None,
            };
            (RenderPassTargets { colors, depth }, extent.unwrap_or(self.window_size))
        };

        let viewport = info
            .viewport
            .unwrap_or_else(|| Viewport::full(extent.0, extent.1));
        let stream = self.backend.acquire_command_stream();
        Ok(ActiveRenderPass::open(
            self.tables.clone(),
            stream,
            targets,
            viewport,
        ))
    }

    /// Close a render pass and submit its stream
    pub fn end_render_pass(&mut self, pass: ActiveRenderPass) -> Result<()> {
        match pass.finish() {
            Some(stream) => self.backend.submit(stream),
            None => Ok(()),
        }
    }

    // Window

    /// Follow a window resize
    ///
    /// Waits for the device to go idle, then recreates the surface and every
    /// screen texture at the new size. Handles stay valid. Zero-sized
    /// (minimized) windows are ignored.
    pub fn resize_window(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            tessel_debug!(LogCategory::Surface, width, height, "ignoring zero-sized resize");
            return Ok(());
        }
        self.backend.wait_idle()?;
        self.backend.resize_surface(width, height)?;
        self.recreate_screen_textures(width, height)
    }

    /// Replace every screen texture, or none of them
    fn recreate_screen_textures(&mut self, width: u32, height: u32) -> Result<()> {
        let old: Vec<(ScreenTextureHandle, TextureEntry)> = self
            .tables
            .read()
            .screen_textures
            .iter()
            .map(|(handle, entry)| (handle, *entry))
            .collect();

        let mut created: Vec<RawTexture> = Vec::with_capacity(old.len());
        for (_, entry) in &old {
            let desc = TextureDesc {
                width,
                height,
                ..entry.state.desc()
            };
            match self.backend.create_texture(&desc) {
                Ok(raw) => created.push(raw),
                Err(e) => {
                    for raw in created {
                        self.backend.destroy_texture(raw);
                    }
                    return Err(e);
                }
            }
        }

        let mut tables = self.tables.write();
        for ((handle, previous), raw) in old.into_iter().zip(created) {
            let old_desc = previous.state.desc();
            let desc = TextureDesc {
                width,
                height,
                ..old_desc
            };
            self.backend.destroy_texture(previous.raw);
            self.tracker
                .record_release(ResourceKind::ScreenTexture, texture_bytes(&old_desc));
            self.tracker
                .record_create(ResourceKind::ScreenTexture, texture_bytes(&desc));
            if let Some(entry) = tables.screen_textures.get_mut(handle) {
                entry.raw = raw;
                entry.state.width = width;
                entry.state.height = height;
            }
        }
        drop(tables);
        self.window_size = (width, height);
        tessel_info!(LogCategory::Surface, width, height, "screen textures resized");
        Ok(())
    }

    /// Right-handed perspective projection for the current window aspect
    pub fn generate_perspective(&self, fov_y_radians: f32) -> Mat4 {
        let (width, height) = self.window_size;
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        Mat4::perspective_rh(
            fov_y_radians,
            aspect,
            self.config.near_plane,
            self.config.far_plane,
        )
    }

    // Cleanup

    /// Destroy resources, keeping what `exclude` names
    ///
    /// Waits for the device first. After `CleanupExclude::None` the renderer
    /// can no longer open copy passes.
    pub fn clean_resources(&mut self, exclude: CleanupExclude) -> Result<()> {
        let idle = self.backend.wait_idle();
        let depth_texture = self.depth_texture;

        let (buffers, textures, screen_textures, samplers, shaders) = {
            let mut tables = self.tables.write();
            let buffers = tables.buffers.take_all();
            let textures = tables.textures.take_all();
            let doomed: Vec<ScreenTextureHandle> = tables
                .screen_textures
                .iter()
                .map(|(handle, _)| handle)
                .filter(|handle| exclude == CleanupExclude::None || *handle != depth_texture)
                .collect();
            let screen_textures: Vec<(ScreenTextureHandle, TextureEntry)> = doomed
                .into_iter()
                .filter_map(|handle| {
                    tables
                        .screen_textures
                        .destroy(handle)
                        .map(|entry| (handle, entry))
                })
                .collect();
            let samplers = tables.samplers.take_all();
            let shaders = if exclude == CleanupExclude::Default {
                Vec::new()
            } else {
                tables.shaders.take_all()
            };
            (buffers, textures, screen_textures, samplers, shaders)
        };

        let counts = (
            buffers.len(),
            textures.len() + screen_textures.len(),
            samplers.len(),
            shaders.len(),
        );

        for (_, entry) in buffers {
            self.backend.destroy_buffer(entry.raw);
            self.tracker
                .record_release(ResourceKind::Buffer, entry.size as u64);
        }
        for (_, entry) in textures {
            self.backend.destroy_texture(entry.raw);
            self.tracker
                .record_release(ResourceKind::Texture, texture_bytes(&entry.state.desc()));
        }
        for (_, entry) in screen_textures {
            self.backend.destroy_texture(entry.raw);
            self.tracker.record_release(
                ResourceKind::ScreenTexture,
                texture_bytes(&entry.state.desc()),
            );
        }
        for (_, entry) in samplers {
            self.backend.destroy_sampler(entry.raw);
            self.tracker.record_release(ResourceKind::Sampler, 0);
        }
        for (_, shader) in shaders {
            self.release_shader(&shader);
        }

        if exclude == CleanupExclude::None {
            let upload = self.upload.take();
            let download = self.download.take();
            self.release_staging(upload);
            self.release_staging(download);
            self.depth_texture = ScreenTextureHandle::INVALID;
        }

        tessel_debug!(
            LogCategory::Registry,
            exclude = ?exclude,
            buffers = counts.0,
            textures = counts.1,
            samplers = counts.2,
            shaders = counts.3,
            "resources cleaned"
        );
        idle
    }
}

fn check_target_usage(texture: TextureRef, entry: &TextureEntry, usage: TextureUsage) -> Result<()> {
    if entry.state.usage.contains(usage) {
        return Ok(());
    }
    Err(TesselError::unsupported_with_context(
        format!("texture lacks {:?} usage", usage),
        ErrorContext::new("begin_custom_render_pass", "renderer")
            .with_metadata("texture", format!("{:?}", texture)),
    ))
}

impl<B: GpuBackend> Drop for Renderer<B> {
    fn drop(&mut self) {
        if let Err(e) = self.clean_resources(CleanupExclude::None) {
            tessel_warn!(LogCategory::Core, error = %e, "device did not go idle during shutdown");
        }
    }
}
