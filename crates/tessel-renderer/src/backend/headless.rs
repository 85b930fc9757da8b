//! CPU-side backend for tests and tools without a GPU
//!
//! Buffers, textures and staging memory are plain byte vectors. Submitted
//! streams are executed immediately and kept so callers can inspect exactly
//! what a pass recorded.

use super::commands::{BufferRegion, DownloadTicket, GpuCommand, TextureRegion};
use super::{
    BufferDesc, CommandStream, GpuBackend, GraphicsPipelineDesc, RawBuffer, RawPipeline,
    RawSampler, RawShader, RawTexture, RawTransferBuffer, ShaderDesc, SwapchainImage,
    TransferBufferDesc,
};
use crate::types::{SamplerDesc, TextureDesc, TextureFormat};
use std::collections::{HashMap, HashSet};
use tessel_core::{tessel_trace, ErrorContext, LogCategory, ResourceKind, Result, TesselError};

#[derive(Debug)]
struct SimTexture {
    desc: TextureDesc,
    /// One tightly packed byte vector per mip level, layer after layer
    levels: Vec<Vec<u8>>,
}

#[derive(Debug)]
struct SimTransfer {
    data: Vec<u8>,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassKind {
    Copy,
    Render,
}

/// Backend that simulates a device in host memory
#[derive(Debug)]
pub struct HeadlessBackend {
    size: (u32, u32),
    format: TextureFormat,
    next_id: u64,
    buffers: HashMap<RawBuffer, Vec<u8>>,
    textures: HashMap<RawTexture, SimTexture>,
    samplers: HashSet<RawSampler>,
    transfers: HashMap<RawTransferBuffer, SimTransfer>,
    shaders: HashSet<RawShader>,
    pipelines: HashSet<RawPipeline>,
    downloads: HashMap<u64, Vec<u8>>,
    mip_generations: HashMap<RawTexture, u32>,
    submitted: Vec<CommandStream>,
    swapchain_available: bool,
    fail_next: Option<(ResourceKind, u32)>,
    cancelled: usize,
    waits: usize,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            format: TextureFormat::Bgra8UnormSrgb,
            next_id: 0,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            samplers: HashSet::new(),
            transfers: HashMap::new(),
            shaders: HashSet::new(),
            pipelines: HashSet::new(),
            downloads: HashMap::new(),
            mip_generations: HashMap::new(),
            submitted: Vec::new(),
            swapchain_available: true,
            fail_next: None,
            cancelled: 0,
            waits: 0,
        }
    }

    /// Make window passes find (or not find) a presentable image
    pub fn set_swapchain_available(&mut self, available: bool) {
        self.swapchain_available = available;
    }

    /// Fail the next creation of `kind`
    pub fn fail_next(&mut self, kind: ResourceKind) {
        self.fail_nth(kind, 0);
    }

    /// Let `skip` creations of `kind` through, then fail the one after
    pub fn fail_nth(&mut self, kind: ResourceKind, skip: u32) {
        self.fail_next = Some((kind, skip));
    }

    /// Streams executed so far, oldest first
    pub fn submitted(&self) -> &[CommandStream] {
        &self.submitted
    }

    pub fn take_submitted(&mut self) -> Vec<CommandStream> {
        std::mem::take(&mut self.submitted)
    }

    pub fn last_submitted(&self) -> Option<&CommandStream> {
        self.submitted.last()
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled
    }

    pub fn waits(&self) -> usize {
        self.waits
    }

    pub fn buffer_contents(&self, buffer: RawBuffer) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    /// Packed bytes of one mip level, every layer
    pub fn texture_level(&self, texture: RawTexture, mip_level: u32) -> Option<&[u8]> {
        self.textures
            .get(&texture)
            .and_then(|t| t.levels.get(mip_level as usize))
            .map(Vec::as_slice)
    }

    pub fn texture_desc(&self, texture: RawTexture) -> Option<TextureDesc> {
        self.textures.get(&texture).map(|t| t.desc)
    }

    /// How often the mip chain of `texture` was rebuilt
    pub fn mip_generations(&self, texture: RawTexture) -> u32 {
        self.mip_generations.get(&texture).copied().unwrap_or(0)
    }

    /// How often `staging` was handed fresh memory
    pub fn transfer_generation(&self, staging: RawTransferBuffer) -> Option<u64> {
        self.transfers.get(&staging).map(|t| t.generation)
    }

    /// Objects currently alive on the simulated device
    pub fn live_objects(&self) -> usize {
        self.buffers.len()
            + self.textures.len()
            + self.samplers.len()
            + self.transfers.len()
            + self.shaders.len()
            + self.pipelines.len()
    }

    fn next_id(&mut self, kind: ResourceKind) -> Result<u64> {
        if let Some((failing, skip)) = self.fail_next {
            if failing == kind {
                if skip == 0 {
                    self.fail_next = None;
                    return Err(TesselError::creation(kind.as_str(), "injected failure"));
                }
                self.fail_next = Some((failing, skip - 1));
            }
        }
        self.next_id += 1;
        Ok(self.next_id)
    }

    fn execute(&mut self, stream: &CommandStream) -> Result<()> {
        let mut open: Option<PassKind> = None;
        for command in stream.commands() {
            match command {
                GpuCommand::BeginCopyPass => begin(&mut open, PassKind::Copy)?,
                GpuCommand::BeginRenderPass(_) => begin(&mut open, PassKind::Render)?,
                GpuCommand::EndCopyPass => end(&mut open, PassKind::Copy)?,
                GpuCommand::EndRenderPass => end(&mut open, PassKind::Render)?,
                GpuCommand::StageUpload {
                    staging,
                    offset,
                    data,
                    cycle,
                } => {
                    let transfer = self.transfer_mut(*staging)?;
                    if *cycle {
                        transfer.generation += 1;
                    }
                    let range = checked_range(*offset as u64, data.len() as u64, transfer.data.len())?;
                    transfer.data[range].copy_from_slice(data);
                }
                GpuCommand::CopyToBuffer {
                    staging,
                    staging_offset,
                    dst,
                } => {
                    let bytes = self.staged(*staging, *staging_offset, dst.size)?;
                    let buffer = self.buffer_mut(dst.buffer)?;
                    let range = checked_range(dst.offset, dst.size, buffer.len())?;
                    buffer[range].copy_from_slice(&bytes);
                }
                GpuCommand::CopyToTexture {
                    staging,
                    staging_offset,
                    bytes_per_row,
                    dst,
                } => {
                    let size = *bytes_per_row as u64 * dst.height as u64 * dst.depth as u64;
                    let bytes = self.staged(*staging, *staging_offset, size)?;
                    self.write_texture(dst, *bytes_per_row, &bytes)?;
                }
                GpuCommand::CopyFromBuffer {
                    src,
                    staging,
                    staging_offset,
                    cycle,
                    ticket,
                    ticket_offset,
                } => self.read_back(src, *staging, *staging_offset, *cycle, ticket, *ticket_offset)?,
                GpuCommand::GenerateMipmaps { texture } => {
                    if !self.textures.contains_key(texture) {
                        return Err(unknown("texture", texture.0));
                    }
                    *self.mip_generations.entry(*texture).or_default() += 1;
                }
                GpuCommand::BindPipeline(pipeline) => {
                    if !self.pipelines.contains(pipeline) {
                        return Err(unknown("pipeline", pipeline.0));
                    }
                }
                GpuCommand::SetViewport(_)
                | GpuCommand::BindVertexBuffers { .. }
                | GpuCommand::BindIndexBuffer(_)
                | GpuCommand::BindSamplers { .. }
                | GpuCommand::PushUniform { .. }
                | GpuCommand::Draw { .. }
                | GpuCommand::DrawIndexed { .. } => {}
            }
        }
        match open {
            Some(kind) => Err(TesselError::device(format!("{:?} pass left open", kind))),
            None => Ok(()),
        }
    }

    fn transfer_mut(&mut self, staging: RawTransferBuffer) -> Result<&mut SimTransfer> {
        self.transfers
            .get_mut(&staging)
            .ok_or_else(|| unknown("transfer buffer", staging.0))
    }

    fn buffer_mut(&mut self, buffer: RawBuffer) -> Result<&mut Vec<u8>> {
        self.buffers
            .get_mut(&buffer)
            .ok_or_else(|| unknown("buffer", buffer.0))
    }

    fn staged(&mut self, staging: RawTransferBuffer, offset: u32, size: u64) -> Result<Vec<u8>> {
        let transfer = self.transfer_mut(staging)?;
        let range = checked_range(offset as u64, size, transfer.data.len())?;
        Ok(transfer.data[range].to_vec())
    }

    fn write_texture(&mut self, dst: &TextureRegion, bytes_per_row: u32, bytes: &[u8]) -> Result<()> {
        let texture = self
            .textures
            .get_mut(&dst.texture)
            .ok_or_else(|| unknown("texture", dst.texture.0))?;
        let (width, height, layers) = texture.desc.mip_extent(dst.mip_level);
        let texel = texture.desc.format.texel_size() as u64;
        let level = texture
            .levels
            .get_mut(dst.mip_level as usize)
            .ok_or_else(|| TesselError::device(format!("mip level {} out of range", dst.mip_level)))?;

        if dst.x + dst.width > width
            || dst.y + dst.height > height
            || dst.layer + dst.z + dst.depth > layers
        {
            return Err(TesselError::device("texture copy outside the destination"));
        }

        let row_bytes = dst.width as u64 * texel;
        let mip_row = width as u64 * texel;
        for slice in 0..dst.depth {
            let layer = (dst.layer + dst.z + slice) as u64;
            for row in 0..dst.height {
                let src = (slice as u64 * dst.height as u64 + row as u64) * bytes_per_row as u64;
                let dst_offset = (layer * height as u64 + (dst.y + row) as u64) * mip_row
                    + dst.x as u64 * texel;
                let src_range = checked_range(src, row_bytes, bytes.len())?;
                let dst_range = checked_range(dst_offset, row_bytes, level.len())?;
                level[dst_range].copy_from_slice(&bytes[src_range]);
            }
        }
        Ok(())
    }

    fn read_back(
        &mut self,
        src: &BufferRegion,
        staging: RawTransferBuffer,
        staging_offset: u32,
        cycle: bool,
        ticket: &DownloadTicket,
        ticket_offset: u64,
    ) -> Result<()> {
        let buffer = self
            .buffers
            .get(&src.buffer)
            .ok_or_else(|| unknown("buffer", src.buffer.0))?;
        let range = checked_range(src.offset, src.size, buffer.len())?;
        let bytes = buffer[range].to_vec();

        let transfer = self.transfer_mut(staging)?;
        if cycle {
            transfer.generation += 1;
        }
        let staged = checked_range(staging_offset as u64, src.size, transfer.data.len())?;
        transfer.data[staged.clone()].copy_from_slice(&bytes);
        let bytes = transfer.data[staged].to_vec();

        let out = self
            .downloads
            .entry(ticket.id())
            .or_insert_with(|| vec![0; ticket.len() as usize]);
        let range = checked_range(ticket_offset, src.size, out.len())?;
        out[range].copy_from_slice(&bytes);
        Ok(())
    }
}

fn begin(open: &mut Option<PassKind>, kind: PassKind) -> Result<()> {
    if let Some(current) = open {
        return Err(TesselError::device(format!(
            "{:?} pass begun inside a {:?} pass",
            kind, current
        )));
    }
    *open = Some(kind);
    Ok(())
}

fn end(open: &mut Option<PassKind>, kind: PassKind) -> Result<()> {
    if *open != Some(kind) {
        return Err(TesselError::device(format!("{:?} pass ended while not open", kind)));
    }
    *open = None;
    Ok(())
}

fn unknown(kind: &str, id: u64) -> TesselError {
    TesselError::device_with_context(
        format!("unknown {} {}", kind, id),
        ErrorContext::new("execute", "headless"),
    )
}

fn checked_range(offset: u64, size: u64, len: usize) -> Result<std::ops::Range<usize>> {
    let end = offset
        .checked_add(size)
        .filter(|&end| end <= len as u64)
        .ok_or(TesselError::OutOfBounds {
            offset,
            length: size,
            size: len as u64,
        })?;
    Ok(offset as usize..end as usize)
}

impl GpuBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn swapchain_format(&self) -> TextureFormat {
        self.format
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<()> {
        self.size = (width, height);
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<RawBuffer> {
        let raw = RawBuffer(self.next_id(ResourceKind::Buffer)?);
        self.buffers.insert(raw, vec![0; desc.size as usize]);
        Ok(raw)
    }

    fn destroy_buffer(&mut self, buffer: RawBuffer) {
        self.buffers.remove(&buffer);
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<RawTexture> {
        let raw = RawTexture(self.next_id(ResourceKind::Texture)?);
        let levels = (0..desc.mip_levels.max(1))
            .map(|mip| vec![0; desc.mip_size_bytes(mip) as usize])
            .collect();
        self.textures.insert(raw, SimTexture { desc: *desc, levels });
        Ok(raw)
    }

    fn destroy_texture(&mut self, texture: RawTexture) {
        self.textures.remove(&texture);
        self.mip_generations.remove(&texture);
    }

    fn create_sampler(&mut self, _desc: &SamplerDesc) -> Result<RawSampler> {
        let raw = RawSampler(self.next_id(ResourceKind::Sampler)?);
        self.samplers.insert(raw);
        Ok(raw)
    }

    fn destroy_sampler(&mut self, sampler: RawSampler) {
        self.samplers.remove(&sampler);
    }

    fn create_transfer_buffer(&mut self, desc: &TransferBufferDesc) -> Result<RawTransferBuffer> {
        let raw = RawTransferBuffer(self.next_id(ResourceKind::TransferBuffer)?);
        self.transfers.insert(
            raw,
            SimTransfer {
                data: vec![0; desc.size as usize],
                generation: 0,
            },
        );
        Ok(raw)
    }

    fn destroy_transfer_buffer(&mut self, buffer: RawTransferBuffer) {
        self.transfers.remove(&buffer);
    }

    fn create_shader(&mut self, desc: &ShaderDesc<'_>) -> Result<RawShader> {
        let raw = RawShader(self.next_id(ResourceKind::Shader)?);
        tessel_trace!(LogCategory::Pipeline, stage = desc.stage.as_str(), bytes = desc.code.len(), "headless shader");
        self.shaders.insert(raw);
        Ok(raw)
    }

    fn destroy_shader(&mut self, shader: RawShader) {
        self.shaders.remove(&shader);
    }

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc<'_>) -> Result<RawPipeline> {
        if !self.shaders.contains(&desc.vertex) || !self.shaders.contains(&desc.fragment) {
            return Err(TesselError::creation("pipeline", "shader stage not found"));
        }
        let raw = RawPipeline(self.next_id(ResourceKind::Pipeline)?);
        self.pipelines.insert(raw);
        Ok(raw)
    }

    fn destroy_graphics_pipeline(&mut self, pipeline: RawPipeline) {
        self.pipelines.remove(&pipeline);
    }

    fn acquire_swapchain_image(
        &mut self,
        stream: &mut CommandStream,
    ) -> Result<Option<SwapchainImage>> {
        if !self.swapchain_available {
            return Ok(None);
        }
        stream.mark_presents();
        Ok(Some(SwapchainImage {
            width: self.size.0,
            height: self.size.1,
            format: self.format,
        }))
    }

    fn submit(&mut self, stream: CommandStream) -> Result<()> {
        self.execute(&stream)?;
        self.submitted.push(stream);
        Ok(())
    }

    fn cancel(&mut self, _stream: CommandStream) {
        self.cancelled += 1;
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.waits += 1;
        Ok(())
    }

    fn take_download(&mut self, ticket: DownloadTicket) -> Option<Vec<u8>> {
        self.downloads.remove(&ticket.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TransferUsage;
    use crate::types::BufferUsage;

    #[test]
    fn test_injected_failure_is_one_shot() {
        let mut backend = HeadlessBackend::default();
        backend.fail_next(ResourceKind::Buffer);
        let desc = BufferDesc {
            usage: BufferUsage::VERTEX,
            size: 16,
        };
        assert!(backend.create_buffer(&desc).is_err());
        assert!(backend.create_buffer(&desc).is_ok());
    }

    #[test]
    fn test_copy_outside_buffer_fails() {
        let mut backend = HeadlessBackend::default();
        let staging = backend
            .create_transfer_buffer(&TransferBufferDesc {
                usage: TransferUsage::Upload,
                size: 8,
            })
            .unwrap();
        let buffer = backend
            .create_buffer(&BufferDesc {
                usage: BufferUsage::VERTEX,
                size: 4,
            })
            .unwrap();

        let mut stream = CommandStream::new();
        stream.push(GpuCommand::BeginCopyPass);
        stream.push(GpuCommand::StageUpload {
            staging,
            offset: 0,
            data: vec![1; 8],
            cycle: true,
        });
        stream.push(GpuCommand::CopyToBuffer {
            staging,
            staging_offset: 0,
            dst: BufferRegion {
                buffer,
                offset: 0,
                size: 8,
            },
        });
        stream.push(GpuCommand::EndCopyPass);

        assert!(matches!(
            backend.submit(stream),
            Err(TesselError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_unbalanced_pass_is_rejected() {
        let mut backend = HeadlessBackend::default();
        let mut stream = CommandStream::new();
        stream.push(GpuCommand::BeginCopyPass);
        assert!(backend.submit(stream).is_err());
    }
}
