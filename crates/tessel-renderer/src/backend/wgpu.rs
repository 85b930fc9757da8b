use super::commands::{
    AttachmentTarget, BufferRegion, DownloadTicket, GpuCommand, RenderPassTargets,
    SamplerBinding, TextureRegion,
};
use super::{
    BufferDesc, CommandStream, GpuBackend, GraphicsPipelineDesc, RawBuffer, RawPipeline,
    RawSampler, RawShader, RawTexture, RawTransferBuffer, ShaderDesc, SwapchainImage,
    TransferBufferDesc,
};
use crate::gpu::convert;
use crate::gpu::{create_instance, DeviceManager, MipmapGenerator, SurfaceManager};
use crate::shader::{ShaderFormat, ShaderResources, StepMode};
use crate::types::{SamplerDesc, ShaderStage, TextureDesc, TextureFormat, TextureKind, Viewport};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use tessel_core::{
    tessel_debug, tessel_trace, ErrorContext, LogCategory, RendererConfig, Result, TesselError,
};
use wgpu::util::DeviceExt;

/// Bind group slots shared by every pipeline
const GROUP_VERTEX_SAMPLERS: usize = 0;
const GROUP_VERTEX_UNIFORMS: usize = 1;
const GROUP_FRAGMENT_SAMPLERS: usize = 2;
const GROUP_FRAGMENT_UNIFORMS: usize = 3;

struct GpuTexture {
    texture: wgpu::Texture,
    /// View over every layer and mip, used for sampling
    sample_view: wgpu::TextureView,
    desc: TextureDesc,
}

struct GpuShader {
    module: wgpu::ShaderModule,
    entry_point: String,
}

struct GpuPipeline {
    pipeline: wgpu::RenderPipeline,
    layouts: [wgpu::BindGroupLayout; 4],
    vertex: ShaderResources,
    fragment: ShaderResources,
}

struct PendingReadback {
    buffer: wgpu::Buffer,
    size: u64,
    ticket: DownloadTicket,
    ticket_offset: u64,
}

/// Draw state replayed into a `wgpu::RenderPass` once every resource it
/// borrows has been created
enum PassOp {
    Viewport(Viewport),
    Pipeline(RawPipeline),
    VertexBuffer { slot: u32, buffer: RawBuffer, offset: u64 },
    IndexBuffer { buffer: RawBuffer, offset: u64 },
    BindGroup { index: u32, group: usize },
    Draw { vertex_count: u32, instance_count: u32 },
    DrawIndexed { index_count: u32, instance_count: u32 },
}

#[derive(Default)]
struct StageBindings {
    samplers: HashMap<u32, SamplerBinding>,
    uniforms: HashMap<u32, Vec<u8>>,
}

/// Backend drawing through wgpu
pub struct WgpuBackend {
    device: DeviceManager,
    surface: Option<SurfaceManager>,
    offscreen_size: (u32, u32),
    mipmaps: MipmapGenerator,
    next_id: u64,
    buffers: HashMap<RawBuffer, wgpu::Buffer>,
    textures: HashMap<RawTexture, GpuTexture>,
    samplers: HashMap<RawSampler, wgpu::Sampler>,
    transfers: HashMap<RawTransferBuffer, Vec<u8>>,
    shaders: HashMap<RawShader, GpuShader>,
    pipelines: HashMap<RawPipeline, GpuPipeline>,
    frame: Option<wgpu::SurfaceTexture>,
    downloads: HashMap<u64, Vec<u8>>,
}

fn aligned(size: u64) -> u64 {
    size.div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT
}

fn unknown(kind: &str, id: u64) -> TesselError {
    TesselError::device_with_context(
        format!("unknown {} {}", kind, id),
        ErrorContext::new("submit", "wgpu"),
    )
}

impl WgpuBackend {
    /// Create a backend presenting to `target`
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        config: &RendererConfig,
    ) -> Result<Self> {
        let instance = Arc::new(create_instance(config));
        let surface = instance.create_surface(target).map_err(|e| {
            TesselError::initialization_with_context(
                format!("failed to create surface: {}", e),
                ErrorContext::new("create_surface", "wgpu"),
            )
        })?;
        let device = DeviceManager::new(instance, Some(&surface)).await?;
        let surface = SurfaceManager::new(
            surface,
            device.device(),
            device.adapter(),
            width,
            height,
            config.vsync,
        )?;
        Ok(Self::assemble(device, Some(surface), (width, height)))
    }

    /// Create a backend without a window
    ///
    /// Window passes are always skipped; custom passes draw normally.
    pub async fn offscreen(width: u32, height: u32, config: &RendererConfig) -> Result<Self> {
        let instance = Arc::new(create_instance(config));
        let device = DeviceManager::new(instance, None).await?;
        Ok(Self::assemble(device, None, (width, height)))
    }

    fn assemble(device: DeviceManager, surface: Option<SurfaceManager>, size: (u32, u32)) -> Self {
        let mipmaps = MipmapGenerator::new(device.device());
        Self {
            device,
            surface,
            offscreen_size: size,
            mipmaps,
            next_id: 0,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            samplers: HashMap::new(),
            transfers: HashMap::new(),
            shaders: HashMap::new(),
            pipelines: HashMap::new(),
            frame: None,
            downloads: HashMap::new(),
        }
    }

    pub fn device_manager(&self) -> &DeviceManager {
        &self.device
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn staged(&self, staging: RawTransferBuffer, offset: u32, size: u64) -> Result<&[u8]> {
        let data = self
            .transfers
            .get(&staging)
            .ok_or_else(|| unknown("transfer buffer", staging.0))?;
        let start = offset as usize;
        let end = start + size as usize;
        data.get(start..end).ok_or(TesselError::OutOfBounds {
            offset: offset as u64,
            length: size,
            size: data.len() as u64,
        })
    }

    fn bind_group_layouts(
        device: &wgpu::Device,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> [wgpu::BindGroupLayout; 4] {
        let samplers = |visibility, count: u32, kinds: &[TextureKind]| {
            let entries: Vec<wgpu::BindGroupLayoutEntry> = (0..count)
                .flat_map(|n| {
                    let kind = kinds.get(n as usize).copied().unwrap_or_default();
                    [
                        wgpu::BindGroupLayoutEntry {
                            binding: 2 * n,
                            visibility,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: convert::view_dimension(kind),
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 2 * n + 1,
                            visibility,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                    ]
                })
                .collect();
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Tessel Sampler Layout"),
                entries: &entries,
            })
        };
        let uniforms = |visibility, count: u32| {
            let entries: Vec<wgpu::BindGroupLayoutEntry> = (0..count)
                .map(|n| wgpu::BindGroupLayoutEntry {
                    binding: n,
                    visibility,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                })
                .collect();
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Tessel Uniform Layout"),
                entries: &entries,
            })
        };

        let vs = wgpu::ShaderStages::VERTEX;
        let fs = wgpu::ShaderStages::FRAGMENT;
        [
            samplers(vs, desc.vertex_resources.num_samplers, desc.vertex_sampler_kinds),
            uniforms(vs, desc.vertex_resources.num_uniform_buffers),
            samplers(fs, desc.fragment_resources.num_samplers, desc.fragment_sampler_kinds),
            uniforms(fs, desc.fragment_resources.num_uniform_buffers),
        ]
    }

    fn execute(&mut self, stream: &CommandStream) -> Result<Vec<PendingReadback>> {
        let device = self.device.device();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Tessel Stream"),
        });
        let mut readbacks = Vec::new();

        let commands = stream.commands();
        let mut i = 0;
        while i < commands.len() {
            match &commands[i] {
                GpuCommand::BeginCopyPass | GpuCommand::EndCopyPass => {}
                GpuCommand::StageUpload {
                    staging,
                    offset,
                    data,
                    ..
                } => {
                    // cycling is implicit: each copy reads from its own temporary buffer
                    let target = self
                        .transfers
                        .get_mut(staging)
                        .ok_or_else(|| unknown("transfer buffer", staging.0))?;
                    let start = *offset as usize;
                    let end = start + data.len();
                    let len = target.len();
                    target
                        .get_mut(start..end)
                        .ok_or(TesselError::OutOfBounds {
                            offset: start as u64,
                            length: data.len() as u64,
                            size: len as u64,
                        })?
                        .copy_from_slice(data);
                }
                GpuCommand::CopyToBuffer {
                    staging,
                    staging_offset,
                    dst,
                } => self.copy_to_buffer(device, &mut encoder, *staging, *staging_offset, dst)?,
                GpuCommand::CopyToTexture {
                    staging,
                    staging_offset,
                    bytes_per_row,
                    dst,
                } => self.copy_to_texture(
                    device,
                    &mut encoder,
                    *staging,
                    *staging_offset,
                    *bytes_per_row,
                    dst,
                )?,
                GpuCommand::CopyFromBuffer {
                    src,
                    ticket,
                    ticket_offset,
                    ..
                } => readbacks.push(self.copy_from_buffer(
                    device,
                    &mut encoder,
                    src,
                    *ticket,
                    *ticket_offset,
                )?),
                GpuCommand::GenerateMipmaps { texture } => {
                    let gpu = self
                        .textures
                        .get(texture)
                        .ok_or_else(|| unknown("texture", texture.0))?;
                    self.mipmaps
                        .generate(device, &mut encoder, &gpu.texture, &gpu.desc);
                }
                GpuCommand::BeginRenderPass(targets) => {
                    let end = commands[i..]
                        .iter()
                        .position(|c| matches!(c, GpuCommand::EndRenderPass))
                        .map(|p| i + p)
                        .ok_or_else(|| TesselError::device("render pass without end"))?;
                    self.record_render_pass(device, &mut encoder, targets, &commands[i + 1..end])?;
                    i = end;
                }
                other => {
                    return Err(TesselError::device(format!(
                        "{:?} recorded outside a render pass",
                        other
                    )))
                }
            }
            i += 1;
        }

        self.device.queue().submit(Some(encoder.finish()));
        Ok(readbacks)
    }

    fn copy_to_buffer(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        staging: RawTransferBuffer,
        staging_offset: u32,
        dst: &BufferRegion,
    ) -> Result<()> {
        if dst.offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(TesselError::unsupported(format!(
                "buffer copy offset {} is not 4-byte aligned",
                dst.offset
            )));
        }
        let target = self
            .buffers
            .get(&dst.buffer)
            .ok_or_else(|| unknown("buffer", dst.buffer.0))?;

        let padded = aligned(dst.size);
        if padded != dst.size && dst.offset + padded != target.size() {
            return Err(TesselError::unsupported(format!(
                "unaligned copy of {} bytes at {} does not end the buffer",
                dst.size, dst.offset
            )));
        }

        // zero padding only lands in the rounded-up part of the allocation
        let mut bytes = self.staged(staging, staging_offset, dst.size)?.to_vec();
        bytes.resize(padded as usize, 0);

        let temp = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Tessel Upload Chunk"),
            contents: &bytes,
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        encoder.copy_buffer_to_buffer(&temp, 0, target, dst.offset, padded);
        Ok(())
    }

    fn copy_to_texture(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        staging: RawTransferBuffer,
        staging_offset: u32,
        bytes_per_row: u32,
        dst: &TextureRegion,
    ) -> Result<()> {
        let target = self
            .textures
            .get(&dst.texture)
            .ok_or_else(|| unknown("texture", dst.texture.0))?;
        let rows = dst.height * dst.depth;
        let bytes = self.staged(staging, staging_offset, bytes_per_row as u64 * rows as u64)?;

        // buffer to texture copies need rows aligned to 256 bytes
        let padded_row = bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let mut packed = vec![0u8; padded_row as usize * rows as usize];
        for (row, chunk) in bytes.chunks_exact(bytes_per_row as usize).enumerate() {
            let start = row * padded_row as usize;
            packed[start..start + chunk.len()].copy_from_slice(chunk);
        }

        let temp = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Tessel Texture Chunk"),
            contents: &packed,
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        encoder.copy_buffer_to_texture(
            wgpu::ImageCopyBuffer {
                buffer: &temp,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(dst.height),
                },
            },
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: dst.mip_level,
                origin: wgpu::Origin3d {
                    x: dst.x,
                    y: dst.y,
                    z: dst.layer + dst.z,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: dst.width,
                height: dst.height,
                depth_or_array_layers: dst.depth,
            },
        );
        Ok(())
    }

    fn copy_from_buffer(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        src: &BufferRegion,
        ticket: DownloadTicket,
        ticket_offset: u64,
    ) -> Result<PendingReadback> {
        if src.offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(TesselError::unsupported(format!(
                "buffer download offset {} is not 4-byte aligned",
                src.offset
            )));
        }
        let source = self
            .buffers
            .get(&src.buffer)
            .ok_or_else(|| unknown("buffer", src.buffer.0))?;
        let padded = aligned(src.size);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Tessel Readback Chunk"),
            size: padded,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        encoder.copy_buffer_to_buffer(source, src.offset, &buffer, 0, padded);
        Ok(PendingReadback {
            buffer,
            size: src.size,
            ticket,
            ticket_offset,
        })
    }

    fn resolve_readbacks(&mut self, readbacks: Vec<PendingReadback>) -> Result<()> {
        if readbacks.is_empty() {
            return Ok(());
        }
        let mut receivers = Vec::with_capacity(readbacks.len());
        for readback in &readbacks {
            let (sender, receiver) = futures::channel::oneshot::channel();
            readback
                .buffer
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |result| {
                    let _ = sender.send(result);
                });
            receivers.push(receiver);
        }
        self.device.wait_idle();

        for (readback, receiver) in readbacks.into_iter().zip(receivers) {
            match pollster::block_on(receiver) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(TesselError::device(format!("readback mapping failed: {}", e)))
                }
                Err(_) => return Err(TesselError::device("readback callback dropped")),
            }
            let out = self
                .downloads
                .entry(readback.ticket.id())
                .or_insert_with(|| vec![0; readback.ticket.len() as usize]);
            {
                let view = readback.buffer.slice(..).get_mapped_range();
                let start = readback.ticket_offset as usize;
                out[start..start + readback.size as usize]
                    .copy_from_slice(&view[..readback.size as usize]);
            }
            readback.buffer.unmap();
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        stage: ShaderStage,
        resources: &ShaderResources,
        bindings: &StageBindings,
        samplers_group: bool,
        textures: &HashMap<RawTexture, GpuTexture>,
        samplers: &HashMap<RawSampler, wgpu::Sampler>,
        uniform_arena: &mut Vec<wgpu::Buffer>,
    ) -> Result<wgpu::BindGroup> {
        let unbound = |what: &str, slot: u32| {
            TesselError::device_with_context(
                format!("{} {} slot {} not bound before draw", stage.as_str(), what, slot),
                ErrorContext::new("draw", "wgpu"),
            )
        };

        if samplers_group {
            let mut pairs = Vec::with_capacity(resources.num_samplers as usize);
            for slot in 0..resources.num_samplers {
                let binding = bindings
                    .samplers
                    .get(&slot)
                    .ok_or_else(|| unbound("sampler", slot))?;
                let texture = textures
                    .get(&binding.texture)
                    .ok_or_else(|| unknown("texture", binding.texture.0))?;
                let sampler = samplers
                    .get(&binding.sampler)
                    .ok_or_else(|| unknown("sampler", binding.sampler.0))?;
                pairs.push((slot, &texture.sample_view, sampler));
            }
            let entries: Vec<wgpu::BindGroupEntry> = pairs
                .iter()
                .flat_map(|&(slot, view, sampler)| {
                    [
                        wgpu::BindGroupEntry {
                            binding: 2 * slot,
                            resource: wgpu::BindingResource::TextureView(view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2 * slot + 1,
                            resource: wgpu::BindingResource::Sampler(sampler),
                        },
                    ]
                })
                .collect();
            return Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Tessel Samplers"),
                layout,
                entries: &entries,
            }));
        }

        let first = uniform_arena.len();
        for slot in 0..resources.num_uniform_buffers {
            let data = bindings
                .uniforms
                .get(&slot)
                .ok_or_else(|| unbound("uniform", slot))?;
            let mut contents = data.clone();
            contents.resize(contents.len().div_ceil(16).max(1) * 16, 0);
            uniform_arena.push(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Tessel Uniform"),
                contents: &contents,
                usage: wgpu::BufferUsages::UNIFORM,
            }));
        }
        let entries: Vec<wgpu::BindGroupEntry> = uniform_arena[first..]
            .iter()
            .enumerate()
            .map(|(slot, buffer)| wgpu::BindGroupEntry {
                binding: slot as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Tessel Uniforms"),
            layout,
            entries: &entries,
        }))
    }

    /// Build all four bind groups for the next draw from the current bindings
    #[allow(clippy::too_many_arguments)]
    fn bind_draw_groups(
        &self,
        device: &wgpu::Device,
        pipeline: &GpuPipeline,
        [vertex, fragment]: [&StageBindings; 2],
        groups: &mut Vec<wgpu::BindGroup>,
        uniform_arena: &mut Vec<wgpu::Buffer>,
        ops: &mut Vec<PassOp>,
    ) -> Result<()> {
        let sets = [
            (GROUP_VERTEX_SAMPLERS, ShaderStage::Vertex, &pipeline.vertex, vertex, true),
            (GROUP_VERTEX_UNIFORMS, ShaderStage::Vertex, &pipeline.vertex, vertex, false),
            (GROUP_FRAGMENT_SAMPLERS, ShaderStage::Fragment, &pipeline.fragment, fragment, true),
            (GROUP_FRAGMENT_UNIFORMS, ShaderStage::Fragment, &pipeline.fragment, fragment, false),
        ];
        for (index, stage, resources, bindings, samplers_group) in sets {
            groups.push(Self::bind_group(
                device,
                &pipeline.layouts[index],
                stage,
                resources,
                bindings,
                samplers_group,
                &self.textures,
                &self.samplers,
                uniform_arena,
            )?);
            ops.push(PassOp::BindGroup {
                index: index as u32,
                group: groups.len() - 1,
            });
        }
        Ok(())
    }

    fn record_render_pass(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        targets: &RenderPassTargets,
        commands: &[GpuCommand],
    ) -> Result<()> {
        // phase 1: resolve every bind group and view the pass will borrow
        let mut ops = Vec::with_capacity(commands.len());
        let mut groups: Vec<wgpu::BindGroup> = Vec::new();
        let mut uniform_arena: Vec<wgpu::Buffer> = Vec::new();
        let mut vertex = StageBindings::default();
        let mut fragment = StageBindings::default();
        let mut current: Option<&GpuPipeline> = None;

        for command in commands {
            match command {
                GpuCommand::SetViewport(viewport) => ops.push(PassOp::Viewport(*viewport)),
                GpuCommand::BindPipeline(raw) => {
                    let pipeline = self
                        .pipelines
                        .get(raw)
                        .ok_or_else(|| unknown("pipeline", raw.0))?;
                    current = Some(pipeline);
                    ops.push(PassOp::Pipeline(*raw));
                }
                GpuCommand::BindVertexBuffers {
                    first_slot,
                    buffers,
                } => {
                    for (n, binding) in buffers.iter().enumerate() {
                        ops.push(PassOp::VertexBuffer {
                            slot: first_slot + n as u32,
                            buffer: binding.buffer,
                            offset: binding.offset,
                        });
                    }
                }
                GpuCommand::BindIndexBuffer(binding) => ops.push(PassOp::IndexBuffer {
                    buffer: binding.buffer,
                    offset: binding.offset,
                }),
                GpuCommand::BindSamplers {
                    stage,
                    first_slot,
                    bindings,
                } => {
                    let target = match stage {
                        ShaderStage::Vertex => &mut vertex,
                        ShaderStage::Fragment => &mut fragment,
                    };
                    for (n, binding) in bindings.iter().enumerate() {
                        target.samplers.insert(first_slot + n as u32, *binding);
                    }
                }
                GpuCommand::PushUniform { stage, slot, data } => {
                    let target = match stage {
                        ShaderStage::Vertex => &mut vertex,
                        ShaderStage::Fragment => &mut fragment,
                    };
                    target.uniforms.insert(*slot, data.clone());
                }
                GpuCommand::Draw {
                    vertex_count,
                    instance_count,
                } => {
                    let pipeline = current.ok_or(TesselError::NoActivePipeline)?;
                    self.bind_draw_groups(
                        device,
                        pipeline,
                        [&vertex, &fragment],
                        &mut groups,
                        &mut uniform_arena,
                        &mut ops,
                    )?;
                    ops.push(PassOp::Draw {
                        vertex_count: *vertex_count,
                        instance_count: *instance_count,
                    });
                }
                GpuCommand::DrawIndexed {
                    index_count,
                    instance_count,
                } => {
                    let pipeline = current.ok_or(TesselError::NoActivePipeline)?;
                    self.bind_draw_groups(
                        device,
                        pipeline,
                        [&vertex, &fragment],
                        &mut groups,
                        &mut uniform_arena,
                        &mut ops,
                    )?;
                    ops.push(PassOp::DrawIndexed {
                        index_count: *index_count,
                        instance_count: *instance_count,
                    });
                }
                other => {
                    return Err(TesselError::device(format!(
                        "{:?} recorded inside a render pass",
                        other
                    )))
                }
            }
        }

        let wants_swapchain = targets
            .colors
            .iter()
            .any(|c| c.target == AttachmentTarget::Swapchain);
        let frame_view = match (&self.frame, wants_swapchain) {
            (Some(frame), true) => Some(
                frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default()),
            ),
            (None, true) => return Err(TesselError::device("no swapchain image acquired")),
            _ => None,
        };
        let attachment_view = |texture: &GpuTexture| {
            texture.texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("Tessel Attachment"),
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_mip_level: 0,
                mip_level_count: Some(1),
                base_array_layer: 0,
                array_layer_count: Some(1),
                ..Default::default()
            })
        };

        let mut color_views = Vec::with_capacity(targets.colors.len());
        for color in &targets.colors {
            color_views.push(match color.target {
                AttachmentTarget::Swapchain => None,
                AttachmentTarget::Texture(raw) => Some(attachment_view(
                    self.textures.get(&raw).ok_or_else(|| unknown("texture", raw.0))?,
                )),
            });
        }
        let depth_view = match &targets.depth {
            Some(depth) => Some(attachment_view(
                self.textures
                    .get(&depth.texture)
                    .ok_or_else(|| unknown("texture", depth.texture.0))?,
            )),
            None => None,
        };

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = targets
            .colors
            .iter()
            .zip(&color_views)
            .map(|(color, view)| {
                let view = view.as_ref().or(frame_view.as_ref())?;
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: convert::color_load(color.load, color.clear),
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();
        let depth_stencil_attachment = targets.depth.as_ref().zip(depth_view.as_ref()).map(|(depth, view)| {
            wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: convert::value_load(depth.load, depth.clear_depth),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: depth.has_stencil.then(|| wgpu::Operations {
                    load: convert::value_load(depth.load, depth.clear_stencil),
                    store: wgpu::StoreOp::Store,
                }),
            }
        });

        // phase 2: replay
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Tessel Render Pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        for op in &ops {
            match *op {
                PassOp::Viewport(v) => {
                    pass.set_viewport(v.x, v.y, v.width, v.height, v.min_depth, v.max_depth)
                }
                PassOp::Pipeline(raw) => {
                    if let Some(pipeline) = self.pipelines.get(&raw) {
                        pass.set_pipeline(&pipeline.pipeline);
                    }
                }
                PassOp::VertexBuffer {
                    slot,
                    buffer,
                    offset,
                } => {
                    let buffer = self
                        .buffers
                        .get(&buffer)
                        .ok_or_else(|| unknown("buffer", buffer.0))?;
                    pass.set_vertex_buffer(slot, buffer.slice(offset..));
                }
                PassOp::IndexBuffer { buffer, offset } => {
                    let buffer = self
                        .buffers
                        .get(&buffer)
                        .ok_or_else(|| unknown("buffer", buffer.0))?;
                    pass.set_index_buffer(buffer.slice(offset..), wgpu::IndexFormat::Uint32);
                }
                PassOp::BindGroup { index, group } => pass.set_bind_group(index, &groups[group], &[]),
                PassOp::Draw {
                    vertex_count,
                    instance_count,
                } => pass.draw(0..vertex_count, 0..instance_count),
                PassOp::DrawIndexed {
                    index_count,
                    instance_count,
                } => pass.draw_indexed(0..index_count, 0, 0..instance_count),
            }
        }
        drop(pass);

        tessel_trace!(
            LogCategory::Pass,
            ops = ops.len(),
            bind_groups = groups.len(),
            uniforms = uniform_arena.len(),
            "render pass recorded"
        );
        Ok(())
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn surface_size(&self) -> (u32, u32) {
        match &self.surface {
            Some(surface) => (surface.width(), surface.height()),
            None => self.offscreen_size,
        }
    }

    fn swapchain_format(&self) -> TextureFormat {
        self.surface
            .as_ref()
            .map(SurfaceManager::format)
            .unwrap_or(TextureFormat::Rgba8UnormSrgb)
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<()> {
        match &mut self.surface {
            Some(surface) => surface.resize(width, height, self.device.device()),
            None => {
                self.offscreen_size = (width, height);
                Ok(())
            }
        }
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<RawBuffer> {
        let buffer = self.device.scoped("buffer", |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Tessel Buffer"),
                size: aligned(desc.size.max(1)),
                usage: convert::buffer_usage(desc.usage),
                mapped_at_creation: false,
            })
        })?;
        let raw = RawBuffer(self.next_id());
        self.buffers.insert(raw, buffer);
        Ok(raw)
    }

    fn destroy_buffer(&mut self, buffer: RawBuffer) {
        if let Some(buffer) = self.buffers.remove(&buffer) {
            buffer.destroy();
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<RawTexture> {
        let format = convert::texture_format(desc.format);
        let (texture, sample_view) = self.device.scoped("texture", |device| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Tessel Texture"),
                size: wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: desc.depth,
                },
                mip_level_count: desc.mip_levels.max(1),
                sample_count: 1,
                dimension: convert::texture_dimension(desc.kind),
                format,
                usage: convert::texture_usage(desc.usage, desc.mip_levels),
                view_formats: &[],
            });
            let sample_view = texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("Tessel Sample View"),
                dimension: Some(convert::view_dimension(desc.kind)),
                aspect: if desc.format.is_depth() {
                    wgpu::TextureAspect::DepthOnly
                } else {
                    wgpu::TextureAspect::All
                },
                ..Default::default()
            });
            (texture, sample_view)
        })?;
        let raw = RawTexture(self.next_id());
        self.textures.insert(
            raw,
            GpuTexture {
                texture,
                sample_view,
                desc: *desc,
            },
        );
        Ok(raw)
    }

    fn destroy_texture(&mut self, texture: RawTexture) {
        if let Some(texture) = self.textures.remove(&texture) {
            texture.texture.destroy();
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<RawSampler> {
        let filter = if desc.linear {
            wgpu::FilterMode::Linear
        } else {
            wgpu::FilterMode::Nearest
        };
        let address = if desc.clamp {
            wgpu::AddressMode::ClampToEdge
        } else {
            wgpu::AddressMode::Repeat
        };
        // anisotropic filtering requires linear filtering on every axis
        let anisotropy_clamp = if desc.linear && desc.anisotropy >= 1.0 {
            desc.anisotropy.min(16.0) as u16
        } else {
            1
        };
        let sampler = self.device.scoped("sampler", |device| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("Tessel Sampler"),
                address_mode_u: address,
                address_mode_v: address,
                address_mode_w: address,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: filter,
                anisotropy_clamp,
                ..Default::default()
            })
        })?;
        let raw = RawSampler(self.next_id());
        self.samplers.insert(raw, sampler);
        Ok(raw)
    }

    fn destroy_sampler(&mut self, sampler: RawSampler) {
        self.samplers.remove(&sampler);
    }

    fn create_transfer_buffer(&mut self, desc: &TransferBufferDesc) -> Result<RawTransferBuffer> {
        let raw = RawTransferBuffer(self.next_id());
        self.transfers.insert(raw, vec![0; desc.size as usize]);
        tessel_debug!(LogCategory::Transfer, usage = ?desc.usage, size = desc.size, "staging buffer created");
        Ok(raw)
    }

    fn destroy_transfer_buffer(&mut self, buffer: RawTransferBuffer) {
        self.transfers.remove(&buffer);
    }

    fn create_shader(&mut self, desc: &ShaderDesc<'_>) -> Result<RawShader> {
        let resources = desc.resources;
        if resources.num_storage_buffers > 0 || resources.num_storage_textures > 0 {
            return Err(TesselError::unsupported_with_context(
                "storage bindings are not supported",
                ErrorContext::new("create_shader", "wgpu").with_metadata("stage", desc.stage.as_str()),
            ));
        }
        let source = match desc.format {
            ShaderFormat::SpirV => wgpu::util::make_spirv(desc.code),
            ShaderFormat::Wgsl => {
                let text = std::str::from_utf8(desc.code).map_err(|e| TesselError::ShaderLoad {
                    stage: desc.stage.as_str(),
                    message: e.to_string(),
                })?;
                wgpu::ShaderSource::Wgsl(Cow::Borrowed(text))
            }
        };
        let module = self.device.scoped("shader", |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.stage.as_str()),
                source,
            })
        })?;
        let raw = RawShader(self.next_id());
        self.shaders.insert(
            raw,
            GpuShader {
                module,
                entry_point: desc.entry_point.to_string(),
            },
        );
        Ok(raw)
    }

    fn destroy_shader(&mut self, shader: RawShader) {
        self.shaders.remove(&shader);
    }

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc<'_>) -> Result<RawPipeline> {
        let vertex = self
            .shaders
            .get(&desc.vertex)
            .ok_or_else(|| TesselError::creation("pipeline", "vertex shader not found"))?;
        let fragment = self
            .shaders
            .get(&desc.fragment)
            .ok_or_else(|| TesselError::creation("pipeline", "fragment shader not found"))?;

        let device = self.device.device();
        let layouts = Self::bind_group_layouts(device, desc);

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = desc
            .vertex_input
            .buffers
            .iter()
            .map(|buffer| {
                desc.vertex_input
                    .attributes
                    .iter()
                    .filter(|a| a.slot == buffer.slot)
                    .map(|a| wgpu::VertexAttribute {
                        format: convert::vertex_format(a.format),
                        offset: a.offset as u64,
                        shader_location: a.location,
                    })
                    .collect()
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = desc
            .vertex_input
            .buffers
            .iter()
            .zip(&attributes)
            .map(|(buffer, attributes)| wgpu::VertexBufferLayout {
                array_stride: buffer.stride as u64,
                step_mode: match buffer.step {
                    StepMode::Vertex => wgpu::VertexStepMode::Vertex,
                    StepMode::Instance => wgpu::VertexStepMode::Instance,
                },
                attributes,
            })
            .collect();

        let targets: Vec<Option<wgpu::ColorTargetState>> = desc
            .color_targets
            .iter()
            .map(|target| {
                Some(wgpu::ColorTargetState {
                    format: convert::texture_format(target.format),
                    blend: target
                        .alpha_blending
                        .then_some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let depth_stencil = desc.depth_stencil.map(|ds| {
            let face = wgpu::StencilFaceState {
                compare: wgpu::CompareFunction::Always,
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::Keep,
                pass_op: wgpu::StencilOperation::Replace,
            };
            wgpu::DepthStencilState {
                format: convert::texture_format(ds.format),
                depth_write_enabled: ds.depth_test,
                depth_compare: if ds.depth_test {
                    wgpu::CompareFunction::Less
                } else {
                    wgpu::CompareFunction::Always
                },
                stencil: if ds.stencil_test {
                    wgpu::StencilState {
                        front: face,
                        back: face,
                        read_mask: 0xff,
                        write_mask: 0xff,
                    }
                } else {
                    wgpu::StencilState::default()
                },
                bias: wgpu::DepthBiasState::default(),
            }
        });

        let pipeline = self.device.scoped("pipeline", |device| {
            let layout_refs: Vec<&wgpu::BindGroupLayout> = layouts.iter().collect();
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Tessel Pipeline Layout"),
                bind_group_layouts: &layout_refs,
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Tessel Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex.module,
                    entry_point: &vertex.entry_point,
                    buffers: &buffers,
                    compilation_options: Default::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: convert::cull_mode(desc.cull_mode),
                    ..Default::default()
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment.module,
                    entry_point: &fragment.entry_point,
                    targets: &targets,
                    compilation_options: Default::default(),
                }),
                multiview: None,
            })
        })?;

        let raw = RawPipeline(self.next_id());
        self.pipelines.insert(
            raw,
            GpuPipeline {
                pipeline,
                layouts,
                vertex: desc.vertex_resources,
                fragment: desc.fragment_resources,
            },
        );
        Ok(raw)
    }

    fn destroy_graphics_pipeline(&mut self, pipeline: RawPipeline) {
        self.pipelines.remove(&pipeline);
    }

    fn acquire_swapchain_image(
        &mut self,
        stream: &mut CommandStream,
    ) -> Result<Option<SwapchainImage>> {
        let Some(surface) = self.surface.as_mut() else {
            return Ok(None);
        };
        let Some(frame) = surface.acquire(self.device.device())? else {
            return Ok(None);
        };
        let image = SwapchainImage {
            width: frame.texture.width(),
            height: frame.texture.height(),
            format: surface.format(),
        };
        self.frame = Some(frame);
        stream.mark_presents();
        Ok(Some(image))
    }

    fn submit(&mut self, stream: CommandStream) -> Result<()> {
        self.device
            .device()
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let executed = self.execute(&stream);
        let scope = pollster::block_on(self.device.device().pop_error_scope());

        if stream.presents() {
            if let Some(frame) = self.frame.take() {
                frame.present();
            }
        }

        let readbacks = executed?;
        if let Some(error) = scope {
            return Err(TesselError::device_with_context(
                error.to_string(),
                ErrorContext::new("submit", "wgpu").with_metadata("commands", stream.len()),
            ));
        }
        self.resolve_readbacks(readbacks)
    }

    fn cancel(&mut self, stream: CommandStream) {
        if stream.presents() {
            // dropping an acquired image without presenting releases it
            self.frame = None;
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.device.wait_idle();
        Ok(())
    }

    fn take_download(&mut self, ticket: DownloadTicket) -> Option<Vec<u8>> {
        self.downloads.remove(&ticket.id())
    }
}
