use crate::shader::{ColorTargetInfo, ShaderFormat, ShaderResources, VertexInputLayout};
use crate::types::{
    BufferUsage, CullMode, SamplerDesc, ShaderStage, TextureDesc, TextureFormat, TextureKind,
};
use tessel_core::Result;

pub use self::commands::{CommandStream, DownloadTicket, GpuCommand};

pub mod commands;
pub mod headless;
pub mod wgpu;

pub use self::headless::HeadlessBackend;
pub use self::wgpu::WgpuBackend;

macro_rules! raw_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);
        )*
    };
}

raw_id! {
    /// Backend buffer object
    RawBuffer,
    /// Backend texture object
    RawTexture,
    RawSampler,
    /// Backend staging buffer
    RawTransferBuffer,
    RawShader,
    RawPipeline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub usage: BufferUsage,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferUsage {
    Upload,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferBufferDesc {
    pub usage: TransferUsage,
    pub size: u32,
}

/// One shader stage ready for the device
#[derive(Debug, Clone, Copy)]
pub struct ShaderDesc<'a> {
    pub stage: ShaderStage,
    pub code: &'a [u8],
    pub format: ShaderFormat,
    pub entry_point: &'a str,
    pub resources: ShaderResources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilDesc {
    pub format: TextureFormat,
    pub depth_test: bool,
    pub stencil_test: bool,
}

/// Everything a backend needs to build a graphics pipeline
#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    pub vertex: RawShader,
    pub fragment: RawShader,
    pub vertex_resources: ShaderResources,
    pub fragment_resources: ShaderResources,
    /// Dimensionality of each vertex-stage sampler slot; missing slots are 2D
    pub vertex_sampler_kinds: &'a [TextureKind],
    pub fragment_sampler_kinds: &'a [TextureKind],
    pub vertex_input: &'a VertexInputLayout,
    pub color_targets: &'a [ColorTargetInfo],
    pub depth_stencil: Option<DepthStencilDesc>,
    pub cull_mode: CullMode,
}

/// The presentable image acquired for a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainImage {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Device and presentation surface behind a renderer
///
/// Every creation is fallible. Destruction of an id the backend does not know
/// is ignored. Streams are executed in submission order.
pub trait GpuBackend: Send {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Current presentation surface size in pixels
    fn surface_size(&self) -> (u32, u32);

    fn swapchain_format(&self) -> TextureFormat;

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<()>;

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<RawBuffer>;
    fn destroy_buffer(&mut self, buffer: RawBuffer);

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<RawTexture>;
    fn destroy_texture(&mut self, texture: RawTexture);

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<RawSampler>;
    fn destroy_sampler(&mut self, sampler: RawSampler);

    fn create_transfer_buffer(&mut self, desc: &TransferBufferDesc) -> Result<RawTransferBuffer>;
    fn destroy_transfer_buffer(&mut self, buffer: RawTransferBuffer);

    fn create_shader(&mut self, desc: &ShaderDesc<'_>) -> Result<RawShader>;
    fn destroy_shader(&mut self, shader: RawShader);

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc<'_>)
        -> Result<RawPipeline>;
    fn destroy_graphics_pipeline(&mut self, pipeline: RawPipeline);

    /// Start recording a new stream
    fn acquire_command_stream(&mut self) -> CommandStream {
        CommandStream::new()
    }

    /// Acquire the next presentable image for `stream`
    ///
    /// `Ok(None)` means no image is available right now (minimized window,
    /// outdated surface) and the frame should be skipped.
    fn acquire_swapchain_image(&mut self, stream: &mut CommandStream)
        -> Result<Option<SwapchainImage>>;

    /// Execute a stream, presenting its image if it acquired one
    fn submit(&mut self, stream: CommandStream) -> Result<()>;

    /// Drop a stream without executing it, releasing any acquired image
    fn cancel(&mut self, stream: CommandStream);

    /// Block until all submitted work has finished
    fn wait_idle(&mut self) -> Result<()>;

    /// Bytes of a finished download, once
    fn take_download(&mut self, ticket: DownloadTicket) -> Option<Vec<u8>>;
}
