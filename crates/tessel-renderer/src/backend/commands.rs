//! Backend-agnostic command streams
//!
//! Passes record [`GpuCommand`]s into a [`CommandStream`]; a backend executes
//! the whole stream when it is submitted. Commands reference backend objects
//! by raw id only, so a stream can be inspected, compared or replayed without
//! touching the registries that produced it.

use super::{RawBuffer, RawPipeline, RawSampler, RawTexture, RawTransferBuffer};
use crate::types::{Color, LoadOp, ShaderStage, Viewport};
use smallvec::SmallVec;

/// Receipt for a pending readback, redeemed after the copy pass is submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DownloadTicket {
    id: u64,
    len: u64,
}

impl DownloadTicket {
    pub fn new(id: u64, len: u64) -> Self {
        Self { id, len }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Total bytes the download will produce
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRegion {
    pub buffer: RawBuffer,
    pub offset: u64,
    pub size: u64,
}

/// Destination of a texture copy
///
/// `layer` addresses array layers (2D arrays, cube arrays) while `z`
/// addresses depth slices (3D, cube), mirroring how explicit APIs split the
/// two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRegion {
    pub texture: RawTexture,
    pub mip_level: u32,
    pub layer: u32,
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBinding {
    pub buffer: RawBuffer,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerBinding {
    pub sampler: RawSampler,
    pub texture: RawTexture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentTarget {
    /// The presentable image acquired for this stream
    Swapchain,
    Texture(RawTexture),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub target: AttachmentTarget,
    pub load: LoadOp,
    pub clear: Color,
    pub cycle: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    pub texture: RawTexture,
    pub load: LoadOp,
    pub clear_depth: f32,
    pub clear_stencil: u32,
    pub has_stencil: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassTargets {
    pub colors: SmallVec<[ColorAttachment; 4]>,
    pub depth: Option<DepthAttachment>,
}

/// One recorded GPU operation
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    BeginCopyPass,
    EndCopyPass,
    /// Write `data` into a staging buffer at `offset`
    StageUpload {
        staging: RawTransferBuffer,
        offset: u32,
        data: Vec<u8>,
        cycle: bool,
    },
    CopyToBuffer {
        staging: RawTransferBuffer,
        staging_offset: u32,
        dst: BufferRegion,
    },
    CopyToTexture {
        staging: RawTransferBuffer,
        staging_offset: u32,
        bytes_per_row: u32,
        dst: TextureRegion,
    },
    /// Copy a buffer range into staging, then into the ticket's bytes at `ticket_offset`
    CopyFromBuffer {
        src: BufferRegion,
        staging: RawTransferBuffer,
        staging_offset: u32,
        cycle: bool,
        ticket: DownloadTicket,
        ticket_offset: u64,
    },
    /// Rebuild mips 1.. from mip 0
    GenerateMipmaps {
        texture: RawTexture,
    },
    BeginRenderPass(RenderPassTargets),
    SetViewport(Viewport),
    BindPipeline(RawPipeline),
    BindVertexBuffers {
        first_slot: u32,
        buffers: SmallVec<[BufferBinding; 2]>,
    },
    /// Index buffer with 32-bit indices
    BindIndexBuffer(BufferBinding),
    BindSamplers {
        stage: ShaderStage,
        first_slot: u32,
        bindings: SmallVec<[SamplerBinding; 4]>,
    },
    PushUniform {
        stage: ShaderStage,
        slot: u32,
        data: Vec<u8>,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    EndRenderPass,
}

/// Ordered commands recorded by one pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandStream {
    commands: Vec<GpuCommand>,
    presents: bool,
}

impl CommandStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: GpuCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<GpuCommand> {
        self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Whether a presentable image was acquired on this stream
    pub fn presents(&self) -> bool {
        self.presents
    }

    pub fn mark_presents(&mut self) {
        self.presents = true;
    }

    /// Staging writes as `(byte count, cycle)` pairs
    pub fn staged_writes(&self) -> impl Iterator<Item = (usize, bool)> + '_ {
        self.commands.iter().filter_map(|c| match c {
            GpuCommand::StageUpload { data, cycle, .. } => Some((data.len(), *cycle)),
            _ => None,
        })
    }

    /// Destination regions of every staging to buffer copy
    pub fn buffer_copies(&self) -> impl Iterator<Item = &BufferRegion> + '_ {
        self.commands.iter().filter_map(|c| match c {
            GpuCommand::CopyToBuffer { dst, .. } => Some(dst),
            _ => None,
        })
    }

    /// Destination regions of every staging to texture copy
    pub fn texture_copies(&self) -> impl Iterator<Item = &TextureRegion> + '_ {
        self.commands.iter().filter_map(|c| match c {
            GpuCommand::CopyToTexture { dst, .. } => Some(dst),
            _ => None,
        })
    }
}
