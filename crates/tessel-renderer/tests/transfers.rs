//! Copy pass behavior against the headless backend

use pretty_assertions::assert_eq;
use tessel_core::{RendererConfig, ResourceKind, TesselError};
use tessel_renderer::backend::commands::TextureRegion;
use tessel_renderer::{
    BufferUsage, GpuCommand, HeadlessBackend, Renderer, TextureDesc, TextureFormat, TextureKind,
};

fn renderer(staging_capacity: u32) -> Renderer<HeadlessBackend> {
    let config = RendererConfig {
        staging_capacity,
        ..Default::default()
    };
    Renderer::new(HeadlessBackend::new(64, 64), config).unwrap()
}

fn ramp(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn test_buffer_upload_is_split_into_staging_sized_chunks() {
    let mut renderer = renderer(4);
    let buffer = renderer.create_buffer(BufferUsage::VERTEX, 10).unwrap();
    let data = ramp(10);

    let mut pass = renderer.begin_copy_pass();
    pass.upload_buffer(&data, buffer).unwrap();
    renderer.end_copy_pass(pass).unwrap();

    let stream = renderer.backend().last_submitted().unwrap();
    let copies: Vec<(u64, u64)> = stream.buffer_copies().map(|r| (r.offset, r.size)).collect();
    assert_eq!(copies, vec![(0, 4), (4, 4), (8, 2)]);

    let staged: Vec<(usize, bool)> = stream.staged_writes().collect();
    assert_eq!(staged, vec![(4, true), (4, false), (2, false)]);

    let raw = renderer.raw_buffer(buffer).unwrap();
    assert_eq!(renderer.backend().buffer_contents(raw).unwrap(), &data[..]);
}

#[test]
fn test_buffer_upload_at_offset() {
    let mut renderer = renderer(8);
    let buffer = renderer.create_buffer(BufferUsage::UNIFORM, 16).unwrap();

    let mut pass = renderer.begin_copy_pass();
    pass.upload_buffer_at(&[7; 12], buffer, 4).unwrap();
    renderer.end_copy_pass(pass).unwrap();

    let stream = renderer.backend().last_submitted().unwrap();
    let copies: Vec<(u64, u64)> = stream.buffer_copies().map(|r| (r.offset, r.size)).collect();
    assert_eq!(copies, vec![(4, 8), (12, 4)]);

    let raw = renderer.raw_buffer(buffer).unwrap();
    let contents = renderer.backend().buffer_contents(raw).unwrap();
    assert_eq!(&contents[..4], &[0; 4]);
    assert_eq!(&contents[4..], &[7; 12]);
}

#[test]
fn test_each_upload_call_cycles_once() {
    let mut renderer = renderer(4);
    let a = renderer.create_buffer(BufferUsage::VERTEX, 8).unwrap();
    let b = renderer.create_buffer(BufferUsage::VERTEX, 8).unwrap();

    let mut pass = renderer.begin_copy_pass();
    pass.upload_buffer(&[1; 8], a).unwrap();
    pass.upload_buffer(&[2; 8], b).unwrap();
    renderer.end_copy_pass(pass).unwrap();

    let cycles: Vec<bool> = renderer
        .backend()
        .last_submitted()
        .unwrap()
        .staged_writes()
        .map(|(_, cycle)| cycle)
        .collect();
    assert_eq!(cycles, vec![true, false, true, false]);

    let stats = renderer.tracker().snapshot();
    assert_eq!(stats.chunks_staged, 4);
    assert_eq!(stats.bytes_staged, 16);
    assert_eq!(stats.cycles, 2);
}

#[test]
fn test_upload_past_end_of_buffer_is_rejected() {
    let mut renderer = renderer(16);
    let buffer = renderer.create_buffer(BufferUsage::INDEX, 8).unwrap();

    let mut pass = renderer.begin_copy_pass();
    let err = pass.upload_buffer_at(&[0; 8], buffer, 4).unwrap_err();
    assert!(matches!(
        err,
        TesselError::OutOfBounds {
            offset: 4,
            length: 8,
            size: 8
        }
    ));
    renderer.end_copy_pass(pass).unwrap();

    let stream = renderer.backend().last_submitted().unwrap();
    assert_eq!(stream.buffer_copies().count(), 0);
}

#[test]
fn test_texture_upload_one_row_per_chunk() {
    let mut renderer = renderer(16);
    let desc = TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 4, 4).with_mip_levels(1);
    let texture = renderer.create_texture(&desc).unwrap();
    let data = ramp(64);

    let mut pass = renderer.begin_copy_pass();
    pass.upload_texture(&data, texture).unwrap();
    renderer.end_copy_pass(pass).unwrap();

    let raw = renderer.raw_texture(texture).unwrap();
    let stream = renderer.backend().last_submitted().unwrap();
    let regions: Vec<TextureRegion> = stream.texture_copies().copied().collect();
    let expected: Vec<TextureRegion> = (0..4)
        .map(|y| TextureRegion {
            texture: raw,
            mip_level: 0,
            layer: 0,
            x: 0,
            y,
            z: 0,
            width: 4,
            height: 1,
            depth: 1,
        })
        .collect();
    assert_eq!(regions, expected);

    let staged: Vec<(usize, bool)> = stream.staged_writes().collect();
    assert_eq!(staged, vec![(16, true), (16, false), (16, false), (16, false)]);

    assert_eq!(renderer.backend().texture_level(raw, 0).unwrap(), &data[..]);
}

#[test]
fn test_texture_upload_with_partial_last_row_group() {
    let mut renderer = renderer(32);
    let desc = TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 4, 5).with_mip_levels(1);
    let texture = renderer.create_texture(&desc).unwrap();
    let data = ramp(80);

    let mut pass = renderer.begin_copy_pass();
    pass.upload_texture(&data, texture).unwrap();
    renderer.end_copy_pass(pass).unwrap();

    let raw = renderer.raw_texture(texture).unwrap();
    let stream = renderer.backend().last_submitted().unwrap();
    let rows: Vec<(u32, u32)> = stream.texture_copies().map(|r| (r.y, r.height)).collect();
    assert_eq!(rows, vec![(0, 2), (2, 2), (4, 1)]);
    assert_eq!(renderer.backend().texture_level(raw, 0).unwrap(), &data[..]);
}

#[test]
fn test_row_wider_than_staging_is_rejected() {
    let mut renderer = renderer(16);
    let desc = TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 8, 1).with_mip_levels(1);
    let texture = renderer.create_texture(&desc).unwrap();

    let mut pass = renderer.begin_copy_pass();
    let err = pass.upload_texture(&[0; 32], texture).unwrap_err();
    assert!(matches!(
        err,
        TesselError::RowExceedsStaging {
            row_bytes: 32,
            capacity: 16
        }
    ));
    renderer.end_copy_pass(pass).unwrap();
}

#[test]
fn test_short_texture_data_is_rejected() {
    let mut renderer = renderer(64);
    let desc = TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 4, 4).with_mip_levels(1);
    let texture = renderer.create_texture(&desc).unwrap();

    let mut pass = renderer.begin_copy_pass();
    let err = pass.upload_texture(&[0; 60], texture).unwrap_err();
    assert!(matches!(
        err,
        TesselError::DataTooShort {
            expected: 64,
            actual: 60
        }
    ));
    renderer.end_copy_pass(pass).unwrap();
}

#[test]
fn test_cube_faces_are_addressed_as_depth_slices() {
    let mut renderer = renderer(16);
    let desc = TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 2, 2)
        .with_kind(TextureKind::Cube, 6)
        .with_mip_levels(1);
    let texture = renderer.create_texture(&desc).unwrap();
    let data = ramp(6 * 16);

    let mut pass = renderer.begin_copy_pass();
    pass.upload_texture(&data, texture).unwrap();
    renderer.end_copy_pass(pass).unwrap();

    let raw = renderer.raw_texture(texture).unwrap();
    let stream = renderer.backend().last_submitted().unwrap();
    let faces: Vec<(u32, u32)> = stream.texture_copies().map(|r| (r.layer, r.z)).collect();
    assert_eq!(faces, (0..6).map(|face| (0, face)).collect::<Vec<_>>());
    assert_eq!(stream.staged_writes().filter(|(_, cycle)| *cycle).count(), 1);
    assert_eq!(renderer.backend().texture_level(raw, 0).unwrap(), &data[..]);
}

#[test]
fn test_array_layers_are_addressed_as_layers() {
    let mut renderer = renderer(64);
    let desc = TextureDesc::new_2d(TextureFormat::R8Unorm, 4, 4)
        .with_kind(TextureKind::D2Array, 3)
        .with_mip_levels(1);
    let texture = renderer.create_texture(&desc).unwrap();

    let mut pass = renderer.begin_copy_pass();
    pass.upload_texture(&ramp(48), texture).unwrap();
    renderer.end_copy_pass(pass).unwrap();

    let stream = renderer.backend().last_submitted().unwrap();
    let layers: Vec<(u32, u32)> = stream.texture_copies().map(|r| (r.layer, r.z)).collect();
    assert_eq!(layers, vec![(0, 0), (1, 0), (2, 0)]);
}

#[test]
fn test_base_level_upload_regenerates_mips_once() {
    let mut renderer = renderer(1024);
    let desc = TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 4, 4);
    let texture = renderer.create_texture(&desc).unwrap();
    assert_eq!(renderer.texture_info(texture).unwrap().mip_levels, 3);

    let mut pass = renderer.begin_copy_pass();
    pass.upload_texture(&ramp(64), texture).unwrap();
    renderer.end_copy_pass(pass).unwrap();

    let raw = renderer.raw_texture(texture).unwrap();
    let stream = renderer.backend().last_submitted().unwrap();
    assert_eq!(
        stream.commands().last(),
        Some(&GpuCommand::GenerateMipmaps { texture: raw })
    );
    assert_eq!(renderer.backend().mip_generations(raw), 1);
    assert!(!renderer.texture_info(texture).unwrap().dirty_mip);

    // an upload to a lower level leaves the chain alone
    let mut pass = renderer.begin_copy_pass();
    pass.upload_texture_level(&ramp(16), texture, 1).unwrap();
    renderer.end_copy_pass(pass).unwrap();
    assert_eq!(renderer.backend().mip_generations(raw), 1);
}

#[test]
fn test_single_level_texture_is_never_regenerated() {
    let mut renderer = renderer(1024);
    let desc = TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 4, 4).with_mip_levels(1);
    let texture = renderer.create_texture(&desc).unwrap();

    let mut pass = renderer.begin_copy_pass();
    pass.upload_texture(&ramp(64), texture).unwrap();
    renderer.end_copy_pass(pass).unwrap();

    let raw = renderer.raw_texture(texture).unwrap();
    assert_eq!(renderer.backend().mip_generations(raw), 0);
}

#[test]
fn test_mip_level_out_of_range() {
    let mut renderer = renderer(1024);
    let desc = TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 4, 4).with_mip_levels(2);
    let texture = renderer.create_texture(&desc).unwrap();

    let mut pass = renderer.begin_copy_pass();
    assert!(pass.upload_texture_level(&[0; 4], texture, 2).is_err());
    renderer.end_copy_pass(pass).unwrap();
}

#[test]
fn test_download_returns_uploaded_bytes() {
    let mut renderer = renderer(4);
    let buffer = renderer.create_buffer(BufferUsage::STORAGE, 10).unwrap();
    let data = ramp(10);

    let mut pass = renderer.begin_copy_pass();
    pass.upload_buffer(&data, buffer).unwrap();
    let whole = pass.download_buffer(buffer).unwrap().unwrap();
    let tail = pass.download_buffer_range(buffer, 4, 6).unwrap().unwrap();
    renderer.end_copy_pass(pass).unwrap();

    assert_eq!(renderer.take_download(whole).unwrap(), data);
    assert_eq!(renderer.take_download(tail).unwrap(), &data[4..]);

    let stats = renderer.tracker().snapshot();
    assert_eq!(stats.download_chunks, 5);
    assert_eq!(stats.bytes_downloaded, 16);

    // tickets are redeemed once
    assert!(matches!(
        renderer.take_download(whole),
        Err(TesselError::UnknownDownload { .. })
    ));
}

#[test]
fn test_downloads_wait_for_the_device() {
    let mut renderer = renderer(64);
    let buffer = renderer.create_buffer(BufferUsage::VERTEX, 4).unwrap();
    let waits = renderer.backend().waits();

    let pass = renderer.begin_copy_pass();
    renderer.end_copy_pass(pass).unwrap();
    assert_eq!(renderer.backend().waits(), waits);

    let mut pass = renderer.begin_copy_pass();
    pass.download_buffer(buffer).unwrap();
    renderer.end_copy_pass(pass).unwrap();
    assert_eq!(renderer.backend().waits(), waits + 1);
}

#[test]
fn test_empty_download_needs_no_copy() {
    let mut renderer = renderer(64);
    let buffer = renderer.create_buffer(BufferUsage::VERTEX, 4).unwrap();

    let mut pass = renderer.begin_copy_pass();
    let ticket = pass.download_buffer_range(buffer, 4, 0).unwrap().unwrap();
    renderer.end_copy_pass(pass).unwrap();

    assert!(ticket.is_empty());
    assert_eq!(renderer.take_download(ticket).unwrap(), Vec::<u8>::new());
    assert!(matches!(
        renderer.take_download(ticket),
        Err(TesselError::UnknownDownload { .. })
    ));
}

#[test]
fn test_failed_upload_leaves_earlier_work_in_the_pass() {
    let mut renderer = renderer(16);
    let good = renderer.create_buffer(BufferUsage::VERTEX, 4).unwrap();
    let gone = renderer.create_buffer(BufferUsage::VERTEX, 4).unwrap();
    renderer.destroy_buffer(gone).unwrap();

    let mut pass = renderer.begin_copy_pass();
    pass.upload_buffer(&[9; 4], good).unwrap();
    assert!(matches!(
        pass.upload_buffer(&[1; 4], gone),
        Err(TesselError::InvalidHandle { .. })
    ));
    renderer.end_copy_pass(pass).unwrap();

    let raw = renderer.raw_buffer(good).unwrap();
    assert_eq!(renderer.backend().buffer_contents(raw).unwrap(), &[9; 4]);
    assert_eq!(renderer.tracker().live(ResourceKind::Buffer), 1);
}

#[test]
fn test_unaligned_buffer_offsets_are_rejected_when_recorded() {
    let mut renderer = renderer(64);
    let buffer = renderer.create_buffer(BufferUsage::STORAGE, 16).unwrap();

    let mut pass = renderer.begin_copy_pass();
    pass.upload_buffer(&[3; 4], buffer).unwrap();
    assert!(matches!(
        pass.upload_buffer_at(&[1; 4], buffer, 6),
        Err(TesselError::Unsupported { .. })
    ));
    assert!(matches!(
        pass.download_buffer_range(buffer, 2, 4),
        Err(TesselError::Unsupported { .. })
    ));
    renderer.end_copy_pass(pass).unwrap();

    let raw = renderer.raw_buffer(buffer).unwrap();
    let contents = renderer.backend().buffer_contents(raw).unwrap();
    assert_eq!(&contents[..4], &[3; 4]);
    assert_eq!(&contents[4..], &[0; 12]);
}

#[test]
fn test_unaligned_tail_must_end_the_buffer() {
    let mut renderer = renderer(64);
    let buffer = renderer.create_buffer(BufferUsage::STORAGE, 10).unwrap();

    let mut pass = renderer.begin_copy_pass();
    assert!(matches!(
        pass.upload_buffer(&[1; 6], buffer),
        Err(TesselError::Unsupported { .. })
    ));
    pass.upload_buffer_at(&[2; 6], buffer, 4).unwrap();
    renderer.end_copy_pass(pass).unwrap();

    let raw = renderer.raw_buffer(buffer).unwrap();
    let contents = renderer.backend().buffer_contents(raw).unwrap();
    assert_eq!(contents, &[0, 0, 0, 0, 2, 2, 2, 2, 2, 2]);
}

#[test]
fn test_mips_are_regenerated_by_the_pass_that_dirtied_them() {
    let mut renderer = renderer(1024);
    let desc = TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 4, 4);
    let texture = renderer.create_texture(&desc).unwrap();
    let raw = renderer.raw_texture(texture).unwrap();

    let mut first = renderer.begin_copy_pass();
    first.upload_texture(&ramp(64), texture).unwrap();
    let second = renderer.begin_copy_pass();
    renderer.end_copy_pass(second).unwrap();

    let stream = renderer.backend().last_submitted().unwrap();
    assert!(!stream
        .commands()
        .iter()
        .any(|c| matches!(c, GpuCommand::GenerateMipmaps { .. })));
    assert!(renderer.texture_info(texture).unwrap().dirty_mip);

    renderer.end_copy_pass(first).unwrap();
    let stream = renderer.backend().last_submitted().unwrap();
    assert_eq!(
        stream.commands().last(),
        Some(&GpuCommand::GenerateMipmaps { texture: raw })
    );
    assert_eq!(renderer.backend().mip_generations(raw), 1);
    assert!(!renderer.texture_info(texture).unwrap().dirty_mip);
}

#[test]
fn test_failed_submit_keeps_mips_dirty_until_the_next_pass() {
    let mut renderer = renderer(1024);
    let desc = TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 4, 4);
    let texture = renderer.create_texture(&desc).unwrap();
    let raw = renderer.raw_texture(texture).unwrap();
    let buffer = renderer.create_buffer(BufferUsage::VERTEX, 4).unwrap();

    let mut pass = renderer.begin_copy_pass();
    pass.upload_texture(&ramp(64), texture).unwrap();
    pass.upload_buffer(&[1; 4], buffer).unwrap();
    renderer.destroy_buffer(buffer).unwrap();
    assert!(renderer.end_copy_pass(pass).is_err());

    assert!(renderer.texture_info(texture).unwrap().dirty_mip);
    assert_eq!(renderer.backend().mip_generations(raw), 0);

    let pass = renderer.begin_copy_pass();
    renderer.end_copy_pass(pass).unwrap();
    assert_eq!(renderer.backend().mip_generations(raw), 1);
    assert!(!renderer.texture_info(texture).unwrap().dirty_mip);
}

#[test]
fn test_abandoned_pass_leaves_mips_for_the_next_one() {
    let mut renderer = renderer(1024);
    let desc = TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 4, 4);
    let texture = renderer.create_texture(&desc).unwrap();
    let raw = renderer.raw_texture(texture).unwrap();

    let mut pass = renderer.begin_copy_pass();
    pass.upload_texture(&ramp(64), texture).unwrap();
    drop(pass);

    let pass = renderer.begin_copy_pass();
    renderer.end_copy_pass(pass).unwrap();
    assert_eq!(renderer.backend().mip_generations(raw), 1);
    assert!(!renderer.texture_info(texture).unwrap().dirty_mip);
}
