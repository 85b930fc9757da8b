//! Mapping of renderer types onto wgpu types

use crate::types::{
    AttributeFormat, BufferUsage, Color, CullMode, LoadOp, TextureFormat, TextureKind,
    TextureUsage,
};

pub fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    use wgpu::TextureFormat as W;
    match format {
        TextureFormat::R8Unorm => W::R8Unorm,
        TextureFormat::Rg8Unorm => W::Rg8Unorm,
        TextureFormat::Rgba8Unorm => W::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => W::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm => W::Bgra8Unorm,
        TextureFormat::Bgra8UnormSrgb => W::Bgra8UnormSrgb,
        TextureFormat::R16Float => W::R16Float,
        TextureFormat::Rg16Float => W::Rg16Float,
        TextureFormat::Rgba16Float => W::Rgba16Float,
        TextureFormat::R32Float => W::R32Float,
        TextureFormat::Rg32Float => W::Rg32Float,
        TextureFormat::Rgba32Float => W::Rgba32Float,
        TextureFormat::R32Uint => W::R32Uint,
        TextureFormat::Depth16Unorm => W::Depth16Unorm,
        TextureFormat::Depth24PlusStencil8 => W::Depth24PlusStencil8,
        TextureFormat::Depth32Float => W::Depth32Float,
        TextureFormat::Depth32FloatStencil8 => W::Depth32FloatStencil8,
    }
}

/// Reverse mapping, for formats reported by the surface
pub fn from_wgpu_format(format: wgpu::TextureFormat) -> Option<TextureFormat> {
    use wgpu::TextureFormat as W;
    Some(match format {
        W::Rgba8Unorm => TextureFormat::Rgba8Unorm,
        W::Rgba8UnormSrgb => TextureFormat::Rgba8UnormSrgb,
        W::Bgra8Unorm => TextureFormat::Bgra8Unorm,
        W::Bgra8UnormSrgb => TextureFormat::Bgra8UnormSrgb,
        W::Rgba16Float => TextureFormat::Rgba16Float,
        _ => return None,
    })
}

pub fn texture_dimension(kind: TextureKind) -> wgpu::TextureDimension {
    match kind {
        TextureKind::D3 => wgpu::TextureDimension::D3,
        _ => wgpu::TextureDimension::D2,
    }
}

pub fn view_dimension(kind: TextureKind) -> wgpu::TextureViewDimension {
    match kind {
        TextureKind::D2 => wgpu::TextureViewDimension::D2,
        TextureKind::D2Array => wgpu::TextureViewDimension::D2Array,
        TextureKind::D3 => wgpu::TextureViewDimension::D3,
        TextureKind::Cube => wgpu::TextureViewDimension::Cube,
        TextureKind::CubeArray => wgpu::TextureViewDimension::CubeArray,
    }
}

pub fn texture_usage(usage: TextureUsage, mip_levels: u32) -> wgpu::TextureUsages {
    let mut out = wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC;
    if usage.contains(TextureUsage::SAMPLER) {
        out |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.intersects(TextureUsage::COLOR_TARGET | TextureUsage::DEPTH_STENCIL_TARGET) {
        out |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    if usage.contains(TextureUsage::STORAGE) {
        out |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    // the mip blit renders into every level below the base
    if mip_levels > 1 {
        out |= wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
    }
    out
}

pub fn buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut out = wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
    if usage.contains(BufferUsage::VERTEX) {
        out |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        out |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::INDIRECT) {
        out |= wgpu::BufferUsages::INDIRECT;
    }
    if usage.contains(BufferUsage::STORAGE) {
        out |= wgpu::BufferUsages::STORAGE;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        out |= wgpu::BufferUsages::UNIFORM;
    }
    out
}

pub fn vertex_format(format: AttributeFormat) -> wgpu::VertexFormat {
    use wgpu::VertexFormat as V;
    match format {
        AttributeFormat::Float => V::Float32,
        AttributeFormat::Float2 => V::Float32x2,
        AttributeFormat::Float3 => V::Float32x3,
        AttributeFormat::Float4 => V::Float32x4,
        AttributeFormat::Int => V::Sint32,
        AttributeFormat::Int2 => V::Sint32x2,
        AttributeFormat::Int3 => V::Sint32x3,
        AttributeFormat::Int4 => V::Sint32x4,
        AttributeFormat::UInt => V::Uint32,
        AttributeFormat::UInt2 => V::Uint32x2,
        AttributeFormat::UInt3 => V::Uint32x3,
        AttributeFormat::UInt4 => V::Uint32x4,
        AttributeFormat::UByte4Norm => V::Unorm8x4,
        AttributeFormat::Half2 => V::Float16x2,
        AttributeFormat::Half4 => V::Float16x4,
    }
}

pub fn cull_mode(mode: CullMode) -> Option<wgpu::Face> {
    match mode {
        CullMode::None => None,
        CullMode::Front => Some(wgpu::Face::Front),
        CullMode::Back => Some(wgpu::Face::Back),
    }
}

pub fn color(color: Color) -> wgpu::Color {
    wgpu::Color {
        r: color.r as f64,
        g: color.g as f64,
        b: color.b as f64,
        a: color.a as f64,
    }
}

pub fn color_load(load: LoadOp, clear: Color) -> wgpu::LoadOp<wgpu::Color> {
    match load {
        LoadOp::Clear => wgpu::LoadOp::Clear(self::color(clear)),
        LoadOp::Load => wgpu::LoadOp::Load,
    }
}

pub fn value_load<V>(load: LoadOp, clear: V) -> wgpu::LoadOp<V> {
    match load {
        LoadOp::Clear => wgpu::LoadOp::Clear(clear),
        LoadOp::Load => wgpu::LoadOp::Load,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mipmapped_textures_are_renderable() {
        let usage = texture_usage(TextureUsage::SAMPLER, 4);
        assert!(usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
        let usage = texture_usage(TextureUsage::SAMPLER, 1);
        assert!(!usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
    }

    #[test]
    fn test_surface_formats_round_trip() {
        for format in [TextureFormat::Bgra8UnormSrgb, TextureFormat::Rgba8Unorm] {
            assert_eq!(from_wgpu_format(texture_format(format)), Some(format));
        }
        assert_eq!(from_wgpu_format(wgpu::TextureFormat::Rgb10a2Unorm), None);
    }

    #[test]
    fn test_attribute_sizes_match_wgpu() {
        for format in [
            AttributeFormat::Float3,
            AttributeFormat::UByte4Norm,
            AttributeFormat::Half4,
            AttributeFormat::UInt2,
        ] {
            assert_eq!(vertex_format(format).size(), format.size() as u64);
        }
    }
}
