//! Tessel Renderer
//!
//! A thin resource and pass layer over explicit GPU APIs.
//!
//! ## Features
//! - Typed, reusable handles for buffers, textures, samplers and shaders
//! - Pipeline compilation from a vertex/instance attribute description
//! - Chunked uploads and downloads through fixed-size staging buffers
//! - Render passes that validate bindings before recording draws
//! - Pluggable backends: wgpu for real GPUs, a headless one for tests

pub mod backend;
pub mod gpu;
pub mod handles;
pub mod render_pass;
pub mod renderer;
pub(crate) mod resources;
pub mod shader;
pub mod transfer;
pub mod types;

// Re-export commonly used types
pub use backend::{
    CommandStream, DownloadTicket, GpuBackend, GpuCommand, HeadlessBackend, WgpuBackend,
};
pub use handles::{
    BufferHandle, SamplerHandle, ScreenTextureHandle, ShaderHandle, TextureHandle, TextureRef,
};
pub use render_pass::{ActiveRenderPass, CustomDepthInfo, CustomInfo, CustomTargetInfo};
pub use renderer::{CleanupExclude, Renderer};
pub use resources::TextureState;
pub use shader::{
    ColorTargetInfo, CompiledPipelineInfo, PipelineInfo, ShaderFormat, ShaderResources,
    ShaderStageInfo,
};
pub use transfer::ActiveCopyPass;
pub use types::{
    AttributeFormat, BufferUsage, Color, CullMode, LoadOp, SamplerDesc, ShaderStage, TextureDesc,
    TextureFormat, TextureKind, TextureUsage, Viewport,
};

pub mod prelude {
    pub use crate::{
        ActiveCopyPass, ActiveRenderPass, AttributeFormat, BufferHandle, BufferUsage,
        CleanupExclude, Color, CullMode, CustomInfo, CustomTargetInfo, GpuBackend, PipelineInfo,
        Renderer, SamplerHandle, ShaderHandle, ShaderStageInfo, TextureDesc, TextureFormat,
        TextureHandle, TextureUsage,
    };
}
