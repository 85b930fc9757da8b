//! Pipeline compilation
//!
//! Turns two shader stages and a [`PipelineInfo`] into a backend pipeline and
//! the [`CompiledPipelineInfo`] the render pass consults when binding meshes.
//!
//! Vertex input layout rules:
//! - per-vertex attributes live on slot 0, offsets accumulated from 0
//! - per-instance attributes live on slot 1, or slot 0 when there are no
//!   per-vertex attributes, offsets accumulated independently
//! - shader locations run sequentially through the vertex list, then the
//!   instance list
//! - the instance stream's recorded offset is the vertex stride, which is
//!   where instance data starts when both streams share one buffer

use crate::backend::{
    DepthStencilDesc, GpuBackend, GraphicsPipelineDesc, RawPipeline, RawShader, ShaderDesc,
};
use crate::types::{AttributeFormat, CullMode, ShaderStage, TextureFormat, TextureKind};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tessel_core::{tessel_debug, tessel_warn, LogCategory, Result, TesselError};

const SPIRV_MAGIC: u32 = 0x0723_0203;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderFormat {
    #[default]
    SpirV,
    Wgsl,
}

/// Resource binding counts declared by one stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderResources {
    pub num_samplers: u32,
    pub num_storage_textures: u32,
    pub num_storage_buffers: u32,
    pub num_uniform_buffers: u32,
}

/// One shader stage: the binary plus what it binds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderStageInfo {
    pub code: Vec<u8>,
    pub format: ShaderFormat,
    pub entry_point: String,
    pub resources: ShaderResources,
    /// Dimensionality per sampler slot; slots past the end are 2D
    #[serde(default)]
    pub sampler_kinds: Vec<TextureKind>,
}

impl ShaderStageInfo {
    /// SPIR-V stage with entry point `main`
    pub fn spirv(code: impl Into<Vec<u8>>) -> Self {
        Self {
            code: code.into(),
            format: ShaderFormat::SpirV,
            entry_point: "main".to_string(),
            resources: ShaderResources::default(),
            sampler_kinds: Vec::new(),
        }
    }

    /// WGSL stage with the given entry point
    pub fn wgsl(source: &str, entry_point: &str) -> Self {
        Self {
            code: source.as_bytes().to_vec(),
            format: ShaderFormat::Wgsl,
            entry_point: entry_point.to_string(),
            resources: ShaderResources::default(),
            sampler_kinds: Vec::new(),
        }
    }

    pub fn with_samplers(mut self, count: u32) -> Self {
        self.resources.num_samplers = count;
        self
    }

    pub fn with_uniform_buffers(mut self, count: u32) -> Self {
        self.resources.num_uniform_buffers = count;
        self
    }

    pub fn with_sampler_kinds(mut self, kinds: impl Into<Vec<TextureKind>>) -> Self {
        self.sampler_kinds = kinds.into();
        self
    }

    /// Reject binaries that cannot possibly load
    pub fn validate(&self, stage: ShaderStage) -> Result<()> {
        let fail = |message: String| TesselError::ShaderLoad {
            stage: stage.as_str(),
            message,
        };

        if self.code.is_empty() {
            return Err(fail("empty shader binary".to_string()));
        }
        if self.entry_point.is_empty() {
            return Err(fail("missing entry point".to_string()));
        }

        match self.format {
            ShaderFormat::SpirV => {
                if self.code.len() % 4 != 0 {
                    return Err(fail(format!(
                        "SPIR-V length {} is not a multiple of 4",
                        self.code.len()
                    )));
                }
                let magic = u32::from_le_bytes([
                    self.code[0],
                    self.code[1],
                    self.code[2],
                    self.code[3],
                ]);
                if magic != SPIRV_MAGIC {
                    return Err(fail(format!("bad SPIR-V magic {:#010x}", magic)));
                }
            }
            ShaderFormat::Wgsl => {
                if let Err(e) = std::str::from_utf8(&self.code) {
                    return Err(fail(format!("WGSL source is not UTF-8: {}", e)));
                }
            }
        }
        Ok(())
    }

    fn desc(&self, stage: ShaderStage) -> ShaderDesc<'_> {
        ShaderDesc {
            stage,
            code: &self.code,
            format: self.format,
            entry_point: &self.entry_point,
            resources: self.resources,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorTargetInfo {
    pub format: TextureFormat,
    pub alpha_blending: bool,
}

/// Fixed-function state and vertex layout of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineInfo {
    pub depth_test: bool,
    pub stencil_test: bool,
    pub targets: Vec<ColorTargetInfo>,
    pub vert_attribs: Vec<AttributeFormat>,
    pub inst_attribs: Vec<AttributeFormat>,
    pub cull_mode: CullMode,
    /// Depth-stencil attachment format, `None` for passes without depth
    pub depth_format: Option<TextureFormat>,
}

impl Default for PipelineInfo {
    fn default() -> Self {
        Self {
            depth_test: true,
            stencil_test: false,
            targets: Vec::new(),
            vert_attribs: Vec::new(),
            inst_attribs: Vec::new(),
            cull_mode: CullMode::None,
            depth_format: Some(TextureFormat::Depth24PlusStencil8),
        }
    }
}

impl PipelineInfo {
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() && self.depth_format.is_none() {
            return Err(TesselError::unsupported(
                "pipeline has neither color targets nor a depth format",
            ));
        }
        if let Some(target) = self.targets.iter().find(|t| t.format.is_depth()) {
            return Err(TesselError::unsupported(format!(
                "color target uses depth format {:?}",
                target.format
            )));
        }
        match self.depth_format {
            Some(format) if !format.is_depth() => Err(TesselError::unsupported(format!(
                "depth attachment uses color format {:?}",
                format
            ))),
            Some(format) if self.stencil_test && !format.has_stencil() => Err(
                TesselError::unsupported(format!("stencil test on stencil-less {:?}", format)),
            ),
            None if self.depth_test || self.stencil_test => Err(TesselError::unsupported(
                "depth or stencil test without a depth format",
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    Vertex,
    Instance,
}

/// One vertex buffer slot the pipeline reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferDescription {
    pub slot: u32,
    pub stride: u32,
    pub step: StepMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub slot: u32,
    pub format: AttributeFormat,
    pub offset: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexInputLayout {
    pub buffers: SmallVec<[VertexBufferDescription; 2]>,
    pub attributes: Vec<VertexAttribute>,
}

/// Binding metadata derived while compiling a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPipelineInfo {
    /// Offset of the per-vertex stream, `None` when the pipeline has no vertex attributes
    pub vert_slot_offset: Option<u32>,
    /// Offset of the per-instance stream, `None` when the pipeline has no instance attributes
    pub inst_slot_offset: Option<u32>,
    pub vertex_stride: u32,
    pub instance_stride: u32,
    pub target_formats: SmallVec<[TextureFormat; 4]>,
}

impl CompiledPipelineInfo {
    /// Number of vertex buffer slots a mesh bind fills
    pub fn stream_count(&self) -> usize {
        self.vert_slot_offset.is_some() as usize + self.inst_slot_offset.is_some() as usize
    }
}

fn stream_attributes(
    attributes: &[AttributeFormat],
    slot: u32,
    first_location: u32,
) -> (Vec<VertexAttribute>, u32) {
    let mut offset = 0;
    let list = attributes
        .iter()
        .enumerate()
        .map(|(i, &format)| {
            let attribute = VertexAttribute {
                location: first_location + i as u32,
                slot,
                format,
                offset,
            };
            offset += format.size();
            attribute
        })
        .collect();
    (list, offset)
}

/// Derive the vertex input layout and binding metadata of a pipeline
pub fn compile_vertex_input(info: &PipelineInfo) -> (VertexInputLayout, CompiledPipelineInfo) {
    let mut layout = VertexInputLayout::default();

    let (vertex_attributes, vertex_stride) = stream_attributes(&info.vert_attribs, 0, 0);
    let has_vertex = !info.vert_attribs.is_empty();
    if has_vertex {
        layout.buffers.push(VertexBufferDescription {
            slot: 0,
            stride: vertex_stride,
            step: StepMode::Vertex,
        });
    }

    let instance_slot = if has_vertex { 1 } else { 0 };
    let (instance_attributes, instance_stride) = stream_attributes(
        &info.inst_attribs,
        instance_slot,
        info.vert_attribs.len() as u32,
    );
    let has_instance = !info.inst_attribs.is_empty();
    if has_instance {
        layout.buffers.push(VertexBufferDescription {
            slot: instance_slot,
            stride: instance_stride,
            step: StepMode::Instance,
        });
    }

    layout.attributes = vertex_attributes;
    layout.attributes.extend(instance_attributes);

    let compiled = CompiledPipelineInfo {
        vert_slot_offset: has_vertex.then_some(0),
        inst_slot_offset: has_instance.then_some(vertex_stride),
        vertex_stride,
        instance_stride,
        target_formats: info.targets.iter().map(|t| t.format).collect(),
    };

    (layout, compiled)
}

/// A compiled pipeline and the stages it owns
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VisualShader {
    pub vertex: RawShader,
    pub fragment: RawShader,
    pub pipeline: RawPipeline,
    pub info: CompiledPipelineInfo,
}

impl VisualShader {
    /// Load both stages and build the pipeline, releasing partial work on failure
    pub fn compile<B: GpuBackend>(
        backend: &mut B,
        vertex: &ShaderStageInfo,
        fragment: &ShaderStageInfo,
        info: &PipelineInfo,
    ) -> Result<Self> {
        vertex.validate(ShaderStage::Vertex)?;
        fragment.validate(ShaderStage::Fragment)?;
        info.validate()?;

        let (vertex_input, compiled) = compile_vertex_input(info);

        let vertex_shader = backend.create_shader(&vertex.desc(ShaderStage::Vertex))?;
        let fragment_shader = match backend.create_shader(&fragment.desc(ShaderStage::Fragment)) {
            Ok(shader) => shader,
            Err(e) => {
                backend.destroy_shader(vertex_shader);
                return Err(e);
            }
        };

        let desc = GraphicsPipelineDesc {
            vertex: vertex_shader,
            fragment: fragment_shader,
            vertex_resources: vertex.resources,
            fragment_resources: fragment.resources,
            vertex_sampler_kinds: &vertex.sampler_kinds,
            fragment_sampler_kinds: &fragment.sampler_kinds,
            vertex_input: &vertex_input,
            color_targets: &info.targets,
            depth_stencil: info.depth_format.map(|format| DepthStencilDesc {
                format,
                depth_test: info.depth_test,
                stencil_test: info.stencil_test,
            }),
            cull_mode: info.cull_mode,
        };

        let pipeline = match backend.create_graphics_pipeline(&desc) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                tessel_warn!(LogCategory::Pipeline, error = %e, "pipeline creation failed");
                backend.destroy_shader(vertex_shader);
                backend.destroy_shader(fragment_shader);
                return Err(e);
            }
        };

        tessel_debug!(
            LogCategory::Pipeline,
            vertex_stride = compiled.vertex_stride,
            instance_stride = compiled.instance_stride,
            streams = compiled.stream_count(),
            "pipeline compiled"
        );

        Ok(Self {
            vertex: vertex_shader,
            fragment: fragment_shader,
            pipeline,
            info: compiled,
        })
    }

    /// Destroy the pipeline, then its stages
    pub fn release<B: GpuBackend>(&self, backend: &mut B) {
        backend.destroy_graphics_pipeline(self.pipeline);
        backend.destroy_shader(self.vertex);
        backend.destroy_shader(self.fragment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn info(vert: &[AttributeFormat], inst: &[AttributeFormat]) -> PipelineInfo {
        PipelineInfo {
            vert_attribs: vert.to_vec(),
            inst_attribs: inst.to_vec(),
            targets: vec![ColorTargetInfo {
                format: TextureFormat::Bgra8UnormSrgb,
                alpha_blending: false,
            }],
            ..PipelineInfo::default()
        }
    }

    #[test]
    fn test_both_streams() {
        use AttributeFormat::*;
        let (layout, compiled) = compile_vertex_input(&info(&[Float3, Float2], &[Float4, Float4]));

        assert_eq!(compiled.vert_slot_offset, Some(0));
        assert_eq!(compiled.inst_slot_offset, Some(20));
        assert_eq!(compiled.instance_stride, 32);
        assert_eq!(
            layout.buffers.to_vec(),
            vec![
                VertexBufferDescription { slot: 0, stride: 20, step: StepMode::Vertex },
                VertexBufferDescription { slot: 1, stride: 32, step: StepMode::Instance },
            ]
        );

        let summary: Vec<_> = layout
            .attributes
            .iter()
            .map(|a| (a.location, a.slot, a.offset))
            .collect();
        assert_eq!(summary, vec![(0, 0, 0), (1, 0, 12), (2, 1, 0), (3, 1, 16)]);
    }

    #[test]
    fn test_instance_only_uses_slot_zero() {
        use AttributeFormat::*;
        let (layout, compiled) = compile_vertex_input(&info(&[], &[Float2, Float]));

        assert_eq!(compiled.vert_slot_offset, None);
        assert_eq!(compiled.inst_slot_offset, Some(0));
        assert_eq!(layout.buffers.len(), 1);
        assert_eq!(layout.buffers[0].slot, 0);
        assert_eq!(layout.buffers[0].step, StepMode::Instance);
        assert_eq!(layout.attributes[1].offset, 8);
        assert_eq!(layout.attributes[1].location, 1);
    }

    #[test]
    fn test_no_attributes() {
        let (layout, compiled) = compile_vertex_input(&info(&[], &[]));
        assert!(layout.buffers.is_empty());
        assert_eq!(compiled.stream_count(), 0);
        assert_eq!(compiled.target_formats.to_vec(), vec![TextureFormat::Bgra8UnormSrgb]);
    }

    #[test]
    fn test_stage_validation() {
        assert!(matches!(
            ShaderStageInfo::spirv(Vec::new()).validate(ShaderStage::Vertex),
            Err(TesselError::ShaderLoad { stage: "vertex", .. })
        ));
        assert!(ShaderStageInfo::spirv(vec![1, 2, 3]).validate(ShaderStage::Vertex).is_err());
        assert!(ShaderStageInfo::spirv(vec![0; 8]).validate(ShaderStage::Vertex).is_err());

        let mut words = SPIRV_MAGIC.to_le_bytes().to_vec();
        words.extend_from_slice(&[0; 4]);
        assert!(ShaderStageInfo::spirv(words).validate(ShaderStage::Fragment).is_ok());

        let wgsl = ShaderStageInfo::wgsl("@fragment fn fs_main() {}", "fs_main");
        assert!(wgsl.validate(ShaderStage::Fragment).is_ok());
        assert!(ShaderStageInfo::wgsl("fn f() {}", "")
            .validate(ShaderStage::Fragment)
            .is_err());
    }

    #[test]
    fn test_pipeline_info_validation() {
        // depth-only pipelines are fine, attachment-less ones are not
        assert!(PipelineInfo::default().validate().is_ok());
        let empty = PipelineInfo {
            depth_test: false,
            depth_format: None,
            ..PipelineInfo::default()
        };
        assert!(empty.validate().is_err());
        assert!(info(&[], &[]).validate().is_ok());

        let no_depth = PipelineInfo {
            depth_format: None,
            ..info(&[], &[])
        };
        assert!(no_depth.validate().is_err());

        let stencil_less = PipelineInfo {
            stencil_test: true,
            depth_format: Some(TextureFormat::Depth32Float),
            ..info(&[], &[])
        };
        assert!(stencil_less.validate().is_err());
    }
}
