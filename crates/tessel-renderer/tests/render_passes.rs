//! Render pass recording against the headless backend

use pretty_assertions::assert_eq;
use smallvec::smallvec;
use tessel_core::{RendererConfig, TesselError};
use tessel_renderer::backend::commands::{AttachmentTarget, BufferBinding};
use tessel_renderer::prelude::*;
use tessel_renderer::{
    CustomDepthInfo, GpuCommand, HeadlessBackend, ShaderStage, TextureKind, Viewport,
};

const SOURCE: &str = "@vertex fn vs_main() {} @fragment fn fs_main() {}";

fn renderer() -> Renderer<HeadlessBackend> {
    Renderer::new(HeadlessBackend::new(320, 240), RendererConfig::default()).unwrap()
}

fn shader(
    renderer: &mut Renderer<HeadlessBackend>,
    vert: &[AttributeFormat],
    inst: &[AttributeFormat],
) -> ShaderHandle {
    let vertex = ShaderStageInfo::wgsl(SOURCE, "vs_main").with_uniform_buffers(1);
    let fragment = ShaderStageInfo::wgsl(SOURCE, "fs_main").with_samplers(1);
    let info = PipelineInfo {
        vert_attribs: vert.to_vec(),
        inst_attribs: inst.to_vec(),
        targets: vec![tessel_renderer::ColorTargetInfo {
            format: renderer.swapchain_format(),
            alpha_blending: true,
        }],
        ..PipelineInfo::default()
    };
    renderer.add_shader(&vertex, &fragment, &info).unwrap()
}

#[test]
fn test_window_pass_records_a_full_draw() {
    let mut renderer = renderer();
    let shader = shader(&mut renderer, &[AttributeFormat::Float3], &[]);
    let vertices = renderer.create_buffer(BufferUsage::VERTEX, 36).unwrap();
    let texture = renderer
        .create_texture(&TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 8, 8))
        .unwrap();
    let sampler = renderer.create_sampler(true, true, 4.0).unwrap();

    let mut pass = renderer.begin_window_render_pass().unwrap();
    assert!(pass.is_valid());
    pass.use_shader(shader).unwrap();
    pass.push_vertex_uniform_pod(0, &[1.0f32; 16]);
    pass.bind_frag_samplers(0, &[sampler], &[texture]).unwrap();
    pass.bind_mesh(3, vertices, None).unwrap();
    pass.draw().unwrap();
    renderer.end_render_pass(pass).unwrap();

    let stream = renderer.backend().last_submitted().unwrap();
    assert!(stream.presents());

    let commands = stream.commands();
    match &commands[0] {
        GpuCommand::BeginRenderPass(targets) => {
            assert_eq!(targets.colors.len(), 1);
            assert_eq!(targets.colors[0].target, AttachmentTarget::Swapchain);
            assert!(targets.depth.is_some());
        }
        other => panic!("expected BeginRenderPass, got {:?}", other),
    }
    assert_eq!(
        commands[1],
        GpuCommand::SetViewport(Viewport::full(320, 240))
    );
    assert!(matches!(commands[2], GpuCommand::BindPipeline(_)));
    assert!(matches!(
        commands[3],
        GpuCommand::PushUniform {
            stage: ShaderStage::Vertex,
            slot: 0,
            ..
        }
    ));
    assert!(matches!(
        commands[4],
        GpuCommand::BindSamplers {
            stage: ShaderStage::Fragment,
            first_slot: 0,
            ..
        }
    ));
    assert!(matches!(commands[5], GpuCommand::BindVertexBuffers { .. }));
    assert_eq!(
        commands[6],
        GpuCommand::Draw {
            vertex_count: 3,
            instance_count: 1
        }
    );
    assert_eq!(commands[7], GpuCommand::EndRenderPass);
}

#[test]
fn test_window_pass_without_swapchain_image_is_skipped() {
    let mut renderer = renderer();
    let shader = shader(&mut renderer, &[AttributeFormat::Float3], &[]);
    renderer.backend_mut().set_swapchain_available(false);

    let mut pass = renderer.begin_window_render_pass().unwrap();
    assert!(!pass.is_valid());

    // every call on an invalid pass is a no-op
    pass.use_shader(shader).unwrap();
    pass.draw().unwrap();
    let submitted = renderer.backend().submitted().len();
    renderer.end_render_pass(pass).unwrap();
    assert_eq!(renderer.backend().submitted().len(), submitted);

    // the stream acquired for the attempt was still submitted, empty
    assert!(renderer.backend().last_submitted().unwrap().is_empty());
}

#[test]
fn test_binding_before_use_shader_fails() {
    let mut renderer = renderer();
    let vertices = renderer.create_buffer(BufferUsage::VERTEX, 36).unwrap();

    let mut pass = renderer.begin_window_render_pass().unwrap();
    assert!(matches!(
        pass.bind_mesh(3, vertices, None),
        Err(TesselError::NoActivePipeline)
    ));
    assert!(matches!(pass.draw(), Err(TesselError::NoActivePipeline)));
    renderer.end_render_pass(pass).unwrap();
}

#[test]
fn test_draw_without_mesh_fails() {
    let mut renderer = renderer();
    let shader = shader(&mut renderer, &[AttributeFormat::Float3], &[]);

    let mut pass = renderer.begin_window_render_pass().unwrap();
    pass.use_shader(shader).unwrap();
    assert!(matches!(pass.draw(), Err(TesselError::NoMeshBound)));
    renderer.end_render_pass(pass).unwrap();
}

#[test]
fn test_sampler_texture_count_mismatch() {
    let mut renderer = renderer();
    let shader = shader(&mut renderer, &[AttributeFormat::Float3], &[]);
    let texture = renderer
        .create_texture(&TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 8, 8))
        .unwrap();
    let a = renderer.create_sampler(true, true, 1.0).unwrap();
    let b = renderer.create_sampler(false, false, 0.0).unwrap();

    let mut pass = renderer.begin_window_render_pass().unwrap();
    pass.use_shader(shader).unwrap();
    assert!(matches!(
        pass.bind_frag_samplers(0, &[a, b], &[texture]),
        Err(TesselError::BindingMismatch {
            samplers: 2,
            textures: 1
        })
    ));
    renderer.end_render_pass(pass).unwrap();
}

#[test]
fn test_interleaved_instances_read_from_the_vertex_buffer() {
    let mut renderer = renderer();
    let shader = shader(
        &mut renderer,
        &[AttributeFormat::Float3, AttributeFormat::Float2],
        &[AttributeFormat::Float4],
    );
    assert_eq!(renderer.pipeline_info(shader).unwrap().inst_slot_offset, Some(20));

    let mesh = renderer.create_buffer(BufferUsage::VERTEX, 256).unwrap();
    let indices = renderer.create_buffer(BufferUsage::INDEX, 24).unwrap();
    let raw_mesh = renderer.raw_buffer(mesh).unwrap();
    let raw_indices = renderer.raw_buffer(indices).unwrap();

    let mut pass = renderer.begin_window_render_pass().unwrap();
    pass.use_shader(shader).unwrap();
    pass.bind_mesh_indexed(6, indices, mesh, None).unwrap();
    pass.draw_instanced(4).unwrap();
    renderer.end_render_pass(pass).unwrap();

    let commands = renderer.backend().last_submitted().unwrap().commands().to_vec();
    assert!(commands.contains(&GpuCommand::BindVertexBuffers {
        first_slot: 0,
        buffers: smallvec![
            BufferBinding {
                buffer: raw_mesh,
                offset: 0
            },
            BufferBinding {
                buffer: raw_mesh,
                offset: 20
            },
        ],
    }));
    assert!(commands.contains(&GpuCommand::BindIndexBuffer(BufferBinding {
        buffer: raw_indices,
        offset: 0
    })));
    assert!(commands.contains(&GpuCommand::DrawIndexed {
        index_count: 6,
        instance_count: 4
    }));
}

#[test]
fn test_custom_pass_targets_and_viewport() {
    let mut renderer = renderer();
    let color = renderer
        .create_texture(
            &TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 128, 64)
                .with_mip_levels(1)
                .with_usage(TextureUsage::COLOR_TARGET | TextureUsage::SAMPLER),
        )
        .unwrap();
    let depth = renderer.depth_texture();

    let info = CustomInfo {
        color_targets: vec![CustomTargetInfo::cleared(color, Color::TRANSPARENT)],
        depth: Some(CustomDepthInfo::cleared(depth)),
        viewport: None,
    };
    let pass = renderer.begin_custom_render_pass(&info).unwrap();
    renderer.end_render_pass(pass).unwrap();

    let stream = renderer.backend().last_submitted().unwrap();
    assert!(!stream.presents());
    match &stream.commands()[0] {
        GpuCommand::BeginRenderPass(targets) => {
            let raw = renderer.raw_texture(color).unwrap();
            assert_eq!(targets.colors[0].target, AttachmentTarget::Texture(raw));
            assert!(targets.colors[0].cycle);
            let depth = targets.depth.unwrap();
            assert_eq!(Some(depth.texture), renderer.raw_texture(renderer.depth_texture()));
            assert!(depth.has_stencil);
        }
        other => panic!("expected BeginRenderPass, got {:?}", other),
    }
    assert_eq!(
        stream.commands()[1],
        GpuCommand::SetViewport(Viewport::full(128, 64))
    );
}

#[test]
fn test_custom_pass_rejects_textures_without_target_usage() {
    let mut renderer = renderer();
    let sampled = renderer
        .create_texture(&TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 16, 16))
        .unwrap();

    let info = CustomInfo {
        color_targets: vec![CustomTargetInfo::loaded(sampled)],
        ..CustomInfo::default()
    };
    assert!(renderer.begin_custom_render_pass(&info).is_err());
    assert!(renderer
        .begin_custom_render_pass(&CustomInfo::default())
        .is_err());
}

#[test]
fn test_cube_sampler_kinds_compile() {
    let mut renderer = renderer();
    let vertex = ShaderStageInfo::wgsl(SOURCE, "vs_main");
    let fragment = ShaderStageInfo::wgsl(SOURCE, "fs_main")
        .with_samplers(2)
        .with_sampler_kinds(vec![TextureKind::D2, TextureKind::Cube]);
    let info = PipelineInfo {
        targets: vec![tessel_renderer::ColorTargetInfo {
            format: TextureFormat::Rgba16Float,
            alpha_blending: false,
        }],
        depth_format: None,
        depth_test: false,
        ..PipelineInfo::default()
    };
    let shader = renderer.add_shader(&vertex, &fragment, &info).unwrap();
    assert!(renderer.is_shader_valid(shader));
}

#[test]
fn test_swapchain_resize_is_followed_by_screen_textures() {
    let mut renderer = renderer();
    let depth = renderer.depth_texture();
    renderer.backend_mut().resize_surface(640, 480).unwrap();

    let pass = renderer.begin_window_render_pass().unwrap();
    renderer.end_render_pass(pass).unwrap();

    assert_eq!(renderer.window_size(), (640, 480));
    let raw = renderer.raw_texture(depth).unwrap();
    let desc = renderer.backend().texture_desc(raw).unwrap();
    assert_eq!((desc.width, desc.height), (640, 480));
}
