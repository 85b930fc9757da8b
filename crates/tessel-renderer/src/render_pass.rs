//! Render pass recording
//!
//! A pass is open from `Renderer::begin_*_render_pass` until it is handed
//! back to `Renderer::end_render_pass`. Ending consumes the pass, so a closed
//! pass cannot be recorded into again. A pass that failed to acquire its
//! target is invalid and silently ignores every call.

use crate::backend::commands::{
    AttachmentTarget, BufferBinding, ColorAttachment, DepthAttachment, GpuCommand,
    RenderPassTargets, SamplerBinding,
};
use crate::backend::{CommandStream, RawBuffer, RawPipeline, RawTexture};
use crate::handles::{BufferHandle, SamplerHandle, ShaderHandle, TextureRef};
use crate::resources::SharedTables;
use crate::shader::CompiledPipelineInfo;
use crate::types::{Color, LoadOp, ShaderStage, Viewport};
use bytemuck::Pod;
use smallvec::SmallVec;
use tessel_core::{tessel_trace, LogCategory, Result, TesselError};

/// One color attachment of a custom pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CustomTargetInfo {
    pub texture: TextureRef,
    pub clear_color: Color,
    pub load: LoadOp,
}

impl CustomTargetInfo {
    /// Cleared to `clear_color` when the pass begins
    pub fn cleared(texture: impl Into<TextureRef>, clear_color: Color) -> Self {
        Self {
            texture: texture.into(),
            clear_color,
            load: LoadOp::Clear,
        }
    }

    /// Previous contents are kept
    pub fn loaded(texture: impl Into<TextureRef>) -> Self {
        Self {
            texture: texture.into(),
            clear_color: Color::TRANSPARENT,
            load: LoadOp::Load,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CustomDepthInfo {
    pub texture: TextureRef,
    pub clear_depth: f32,
    pub clear_stencil: u32,
    pub load: LoadOp,
}

impl CustomDepthInfo {
    pub fn cleared(texture: impl Into<TextureRef>) -> Self {
        Self {
            texture: texture.into(),
            clear_depth: 1.0,
            clear_stencil: 0,
            load: LoadOp::Clear,
        }
    }
}

/// Targets of a render pass that does not draw to the window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomInfo {
    pub color_targets: Vec<CustomTargetInfo>,
    pub depth: Option<CustomDepthInfo>,
    /// Defaults to the full extent of the first attachment
    pub viewport: Option<Viewport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrawMode {
    Vertices(u32),
    Indexed(u32),
}

pub(crate) struct RenderPassState {
    tables: SharedTables,
    stream: CommandStream,
    active: Option<CompiledPipelineInfo>,
    draw: Option<DrawMode>,
}

/// An open render pass
#[derive(Default)]
pub struct ActiveRenderPass {
    inner: Option<RenderPassState>,
}

impl ActiveRenderPass {
    pub(crate) fn open(
        tables: SharedTables,
        mut stream: CommandStream,
        targets: RenderPassTargets,
        viewport: Viewport,
    ) -> Self {
        stream.push(GpuCommand::BeginRenderPass(targets));
        stream.push(GpuCommand::SetViewport(viewport));
        Self {
            inner: Some(RenderPassState {
                tables,
                stream,
                active: None,
                draw: None,
            }),
        }
    }

    /// Close the pass and hand back its stream, `None` for an invalid pass
    pub(crate) fn finish(self) -> Option<CommandStream> {
        self.inner.map(|mut state| {
            state.stream.push(GpuCommand::EndRenderPass);
            state.stream
        })
    }

    pub fn is_valid(&self) -> bool {
        self.inner.is_some()
    }

    /// Bind a compiled pipeline for the draws that follow
    pub fn use_shader(&mut self, shader: ShaderHandle) -> Result<()> {
        let Some(state) = self.inner.as_mut() else {
            return Ok(());
        };
        let (pipeline, info): (RawPipeline, CompiledPipelineInfo) = {
            let tables = state.tables.read();
            let shader = tables.shader(shader)?;
            (shader.pipeline, shader.info.clone())
        };
        state.stream.push(GpuCommand::BindPipeline(pipeline));
        state.active = Some(info);
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        if let Some(state) = self.inner.as_mut() {
            state.stream.push(GpuCommand::SetViewport(viewport));
        }
    }

    /// Copy `data` into vertex-stage uniform slot `slot`
    pub fn push_vertex_uniform(&mut self, slot: u32, data: &[u8]) {
        self.push_uniform(ShaderStage::Vertex, slot, data);
    }

    /// Copy `data` into fragment-stage uniform slot `slot`
    pub fn push_fragment_uniform(&mut self, slot: u32, data: &[u8]) {
        self.push_uniform(ShaderStage::Fragment, slot, data);
    }

    pub fn push_vertex_uniform_pod<T: Pod>(&mut self, slot: u32, value: &T) {
        self.push_uniform(ShaderStage::Vertex, slot, bytemuck::bytes_of(value));
    }

    pub fn push_fragment_uniform_pod<T: Pod>(&mut self, slot: u32, value: &T) {
        self.push_uniform(ShaderStage::Fragment, slot, bytemuck::bytes_of(value));
    }

    fn push_uniform(&mut self, stage: ShaderStage, slot: u32, data: &[u8]) {
        if let Some(state) = self.inner.as_mut() {
            state.stream.push(GpuCommand::PushUniform {
                stage,
                slot,
                data: data.to_vec(),
            });
        }
    }

    /// Bind vertex streams for a non-indexed draw of `vertex_count` vertices
    ///
    /// With both a per-vertex and a per-instance stream in the active
    /// pipeline, `instance_buffer` feeds the instance slot; without it the
    /// instance data is read from `vertex_buffer` at the instance stream's
    /// offset.
    pub fn bind_mesh(
        &mut self,
        vertex_count: u32,
        vertex_buffer: BufferHandle,
        instance_buffer: Option<BufferHandle>,
    ) -> Result<()> {
        let Some(state) = self.inner.as_mut() else {
            return Ok(());
        };
        state.bind_vertex_streams(vertex_buffer, instance_buffer)?;
        state.draw = Some(DrawMode::Vertices(vertex_count));
        Ok(())
    }

    /// Bind vertex streams and a 32-bit index buffer for an indexed draw
    pub fn bind_mesh_indexed(
        &mut self,
        index_count: u32,
        index_buffer: BufferHandle,
        vertex_buffer: BufferHandle,
        instance_buffer: Option<BufferHandle>,
    ) -> Result<()> {
        let Some(state) = self.inner.as_mut() else {
            return Ok(());
        };
        let index = state.tables.read().buffer(index_buffer)?.raw;
        state.bind_vertex_streams(vertex_buffer, instance_buffer)?;
        state.stream.push(GpuCommand::BindIndexBuffer(BufferBinding {
            buffer: index,
            offset: 0,
        }));
        state.draw = Some(DrawMode::Indexed(index_count));
        Ok(())
    }

    /// Bind (sampler, texture) pairs to vertex-stage slots starting at `first_slot`
    pub fn bind_vert_samplers<T>(
        &mut self,
        first_slot: u32,
        samplers: &[SamplerHandle],
        textures: &[T],
    ) -> Result<()>
    where
        T: Into<TextureRef> + Copy,
    {
        self.bind_samplers(ShaderStage::Vertex, first_slot, samplers, textures)
    }

    /// Bind (sampler, texture) pairs to fragment-stage slots starting at `first_slot`
    pub fn bind_frag_samplers<T>(
        &mut self,
        first_slot: u32,
        samplers: &[SamplerHandle],
        textures: &[T],
    ) -> Result<()>
    where
        T: Into<TextureRef> + Copy,
    {
        self.bind_samplers(ShaderStage::Fragment, first_slot, samplers, textures)
    }

    fn bind_samplers<T>(
        &mut self,
        stage: ShaderStage,
        first_slot: u32,
        samplers: &[SamplerHandle],
        textures: &[T],
    ) -> Result<()>
    where
        T: Into<TextureRef> + Copy,
    {
        let Some(state) = self.inner.as_mut() else {
            return Ok(());
        };
        if state.active.is_none() {
            return Err(TesselError::NoActivePipeline);
        }
        if samplers.len() != textures.len() {
            return Err(TesselError::BindingMismatch {
                samplers: samplers.len(),
                textures: textures.len(),
            });
        }

        let bindings = {
            let tables = state.tables.read();
            samplers
                .iter()
                .zip(textures)
                .map(|(&sampler, &texture)| {
                    Ok(SamplerBinding {
                        sampler: tables.sampler(sampler)?.raw,
                        texture: tables.texture_ref(texture.into())?.raw,
                    })
                })
                .collect::<Result<SmallVec<[SamplerBinding; 4]>>>()?
        };

        if !bindings.is_empty() {
            state.stream.push(GpuCommand::BindSamplers {
                stage,
                first_slot,
                bindings,
            });
        }
        Ok(())
    }

    /// Draw one instance of the most recently bound mesh
    pub fn draw(&mut self) -> Result<()> {
        self.draw_instanced(1)
    }

    /// Draw `instance_count` instances of the most recently bound mesh
    pub fn draw_instanced(&mut self, instance_count: u32) -> Result<()> {
        let Some(state) = self.inner.as_mut() else {
            return Ok(());
        };
        if state.active.is_none() {
            return Err(TesselError::NoActivePipeline);
        }
        let command = match state.draw {
            Some(DrawMode::Vertices(vertex_count)) => GpuCommand::Draw {
                vertex_count,
                instance_count,
            },
            Some(DrawMode::Indexed(index_count)) => GpuCommand::DrawIndexed {
                index_count,
                instance_count,
            },
            None => return Err(TesselError::NoMeshBound),
        };
        state.stream.push(command);
        Ok(())
    }
}

impl RenderPassState {
    fn bind_vertex_streams(
        &mut self,
        vertex_buffer: BufferHandle,
        instance_buffer: Option<BufferHandle>,
    ) -> Result<()> {
        let Some(info) = self.active.as_ref() else {
            return Err(TesselError::NoActivePipeline);
        };

        let (vertex, instance) = {
            let tables = self.tables.read();
            let vertex = tables.buffer(vertex_buffer)?.raw;
            let instance = instance_buffer
                .map(|handle| tables.buffer(handle).map(|entry| entry.raw))
                .transpose()?;
            (vertex, instance)
        };

        let buffers = vertex_bindings(info, vertex, instance);
        tessel_trace!(
            LogCategory::Pass,
            slots = buffers.len(),
            interleaved = instance.is_none() && buffers.len() == 2,
            "vertex streams bound"
        );
        if !buffers.is_empty() {
            self.stream.push(GpuCommand::BindVertexBuffers {
                first_slot: 0,
                buffers,
            });
        }
        Ok(())
    }
}

/// Buffer slots a mesh bind fills for the given pipeline layout
fn vertex_bindings(
    info: &CompiledPipelineInfo,
    vertex: RawBuffer,
    instance: Option<RawBuffer>,
) -> SmallVec<[BufferBinding; 2]> {
    let mut buffers = SmallVec::new();
    match (info.vert_slot_offset, info.inst_slot_offset) {
        (Some(_), Some(instance_offset)) => {
            buffers.push(BufferBinding {
                buffer: vertex,
                offset: 0,
            });
            buffers.push(match instance {
                Some(buffer) => BufferBinding { buffer, offset: 0 },
                None => BufferBinding {
                    buffer: vertex,
                    offset: instance_offset as u64,
                },
            });
        }
        (Some(_), None) | (None, Some(_)) => buffers.push(BufferBinding {
            buffer: vertex,
            offset: 0,
        }),
        (None, None) => {}
    }
    buffers
}

/// Color attachment for the presentable image
pub(crate) fn swapchain_attachment(clear: Color) -> ColorAttachment {
    ColorAttachment {
        target: AttachmentTarget::Swapchain,
        load: LoadOp::Clear,
        clear,
        cycle: true,
    }
}

pub(crate) fn cleared_depth(texture: RawTexture, has_stencil: bool) -> DepthAttachment {
    DepthAttachment {
        texture,
        load: LoadOp::Clear,
        clear_depth: 1.0,
        clear_stencil: 0,
        has_stencil,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextureFormat;
    use smallvec::smallvec;

    fn info(vertex: Option<u32>, instance: Option<u32>) -> CompiledPipelineInfo {
        CompiledPipelineInfo {
            vert_slot_offset: vertex,
            inst_slot_offset: instance,
            vertex_stride: 20,
            instance_stride: 64,
            target_formats: smallvec![TextureFormat::Bgra8UnormSrgb],
        }
    }

    #[test]
    fn test_two_streams_with_instance_buffer() {
        let bindings = vertex_bindings(&info(Some(0), Some(20)), RawBuffer(1), Some(RawBuffer(2)));
        assert_eq!(
            bindings.as_slice(),
            &[
                BufferBinding { buffer: RawBuffer(1), offset: 0 },
                BufferBinding { buffer: RawBuffer(2), offset: 0 },
            ]
        );
    }

    #[test]
    fn test_two_streams_interleaved() {
        let bindings = vertex_bindings(&info(Some(0), Some(20)), RawBuffer(1), None);
        assert_eq!(bindings[1], BufferBinding { buffer: RawBuffer(1), offset: 20 });
    }

    #[test]
    fn test_single_stream_binds_one_slot() {
        let bindings = vertex_bindings(&info(None, Some(0)), RawBuffer(7), Some(RawBuffer(8)));
        assert_eq!(bindings.as_slice(), &[BufferBinding { buffer: RawBuffer(7), offset: 0 }]);
        assert!(vertex_bindings(&info(None, None), RawBuffer(7), None).is_empty());
    }

    #[test]
    fn test_invalid_pass_ignores_calls() {
        let mut pass = ActiveRenderPass::default();
        assert!(!pass.is_valid());
        assert!(pass.use_shader(ShaderHandle::INVALID).is_ok());
        assert!(pass.draw().is_ok());
        assert!(pass.finish().is_none());
    }
}
