//! Plain data types shared by the renderer and its backends

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tessel_core::DepthFormat;

/// Texel formats the renderer knows how to size and copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureFormat {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgba32Float,
    R32Uint,
    Depth16Unorm,
    Depth24PlusStencil8,
    Depth32Float,
    Depth32FloatStencil8,
}

impl TextureFormat {
    /// Bytes per texel
    pub fn texel_size(self) -> u32 {
        use TextureFormat::*;
        match self {
            R8Unorm => 1,
            Rg8Unorm | R16Float | Depth16Unorm => 2,
            Rgba8Unorm | Rgba8UnormSrgb | Bgra8Unorm | Bgra8UnormSrgb | Rg16Float | R32Float
            | R32Uint | Depth24PlusStencil8 | Depth32Float => 4,
            Rgba16Float | Rg32Float | Depth32FloatStencil8 => 8,
            Rgba32Float => 16,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(
            self,
            TextureFormat::Depth16Unorm
                | TextureFormat::Depth24PlusStencil8
                | TextureFormat::Depth32Float
                | TextureFormat::Depth32FloatStencil8
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(
            self,
            TextureFormat::Depth24PlusStencil8 | TextureFormat::Depth32FloatStencil8
        )
    }

    /// Whether the format can be sampled with linear filtering and rendered to
    /// by the mip blit
    pub fn supports_mip_blit(self) -> bool {
        !self.is_depth() && self != TextureFormat::R32Uint
    }
}

impl From<DepthFormat> for TextureFormat {
    fn from(format: DepthFormat) -> Self {
        match format {
            DepthFormat::D16Unorm => TextureFormat::Depth16Unorm,
            DepthFormat::D24UnormS8Uint => TextureFormat::Depth24PlusStencil8,
            DepthFormat::D32Float => TextureFormat::Depth32Float,
            DepthFormat::D32FloatS8Uint => TextureFormat::Depth32FloatStencil8,
        }
    }
}

/// Texture dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureKind {
    #[default]
    D2,
    D2Array,
    D3,
    Cube,
    CubeArray,
}

impl TextureKind {
    /// Whether the layers of this kind are addressed through the depth-slice
    /// field of a copy region instead of the array-layer field
    pub fn layers_are_depth_slices(self) -> bool {
        matches!(self, TextureKind::D3 | TextureKind::Cube)
    }
}

bitflags! {
    /// How a buffer will be bound
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const INDIRECT = 1 << 2;
        const STORAGE = 1 << 3;
        const UNIFORM = 1 << 4;
    }
}

bitflags! {
    /// How a texture will be bound
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const SAMPLER = 1 << 0;
        const COLOR_TARGET = 1 << 1;
        const DEPTH_STENCIL_TARGET = 1 << 2;
        const STORAGE = 1 << 3;
    }
}

/// Description of a user texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub format: TextureFormat,
    pub kind: TextureKind,
    pub usage: TextureUsage,
    pub width: u32,
    pub height: u32,
    /// Array layers for array and cube kinds, depth slices for 3D
    pub depth: u32,
    /// Zero requests a full mip chain
    pub mip_levels: u32,
}

impl TextureDesc {
    /// Single-layer sampled 2D texture with a full mip chain
    pub fn new_2d(format: TextureFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            kind: TextureKind::D2,
            usage: TextureUsage::SAMPLER,
            width,
            height,
            depth: 1,
            mip_levels: 0,
        }
    }

    pub fn with_kind(mut self, kind: TextureKind, depth: u32) -> Self {
        self.kind = kind;
        self.depth = depth;
        self
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub fn with_usage(mut self, usage: TextureUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Mip count of a complete chain: `floor(log2(max extent)) + 1`
    ///
    /// Depth only counts towards the extent for 3D textures.
    pub fn full_mip_chain(&self) -> u32 {
        let mut extent = self.width.max(self.height);
        if self.kind == TextureKind::D3 {
            extent = extent.max(self.depth);
        }
        u32::BITS - extent.max(1).leading_zeros()
    }

    /// Mip count after resolving the automatic request
    pub fn resolved_mip_levels(&self) -> u32 {
        if self.mip_levels == 0 {
            self.full_mip_chain()
        } else {
            self.mip_levels
        }
    }

    /// Extent of `mip` as (width, height, depth-or-layers)
    pub fn mip_extent(&self, mip: u32) -> (u32, u32, u32) {
        let w = (self.width >> mip).max(1);
        let h = (self.height >> mip).max(1);
        let d = if self.kind == TextureKind::D3 {
            (self.depth >> mip).max(1)
        } else {
            self.depth
        };
        (w, h, d)
    }

    /// Bytes needed to fill one mip level
    pub fn mip_size_bytes(&self, mip: u32) -> u64 {
        let (w, h, d) = self.mip_extent(mip);
        w as u64 * h as u64 * d as u64 * self.format.texel_size() as u64
    }
}

/// Vertex attribute formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeFormat {
    Float,
    Float2,
    Float3,
    Float4,
    Int,
    Int2,
    Int3,
    Int4,
    UInt,
    UInt2,
    UInt3,
    UInt4,
    UByte4Norm,
    Half2,
    Half4,
}

impl AttributeFormat {
    /// Size in bytes
    pub fn size(self) -> u32 {
        use AttributeFormat::*;
        match self {
            UByte4Norm | Half2 => 4,
            Float | Int | UInt => 4,
            Float2 | Int2 | UInt2 | Half4 => 8,
            Float3 | Int3 | UInt3 => 12,
            Float4 | Int4 | UInt4 => 16,
        }
    }
}

/// Combined size of an attribute list
pub fn attribute_list_size(attributes: &[AttributeFormat]) -> u32 {
    attributes.iter().map(|a| a.size()).sum()
}

/// Byte offset of attribute `index` inside an interleaved element
pub fn attribute_list_offset(attributes: &[AttributeFormat], index: usize) -> u32 {
    attribute_list_size(&attributes[..index.min(attributes.len())])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

impl From<[f32; 4]> for Color {
    fn from([r, g, b, a]: [f32; 4]) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// What happens to an attachment's previous contents when a pass begins
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LoadOp {
    #[default]
    Clear,
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Viewport covering a whole target
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Sampler configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    /// Linear filtering for min, mag and mip; nearest otherwise
    pub linear: bool,
    /// Clamp to edge; repeat otherwise
    pub clamp: bool,
    /// Zero disables anisotropic filtering
    pub anisotropy: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_mip_chain() {
        assert_eq!(TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 1, 1).full_mip_chain(), 1);
        assert_eq!(TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 4, 4).full_mip_chain(), 3);
        assert_eq!(TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 256, 100).full_mip_chain(), 9);
        assert_eq!(TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 300, 2).full_mip_chain(), 9);

        let volume = TextureDesc::new_2d(TextureFormat::R8Unorm, 4, 4).with_kind(TextureKind::D3, 64);
        assert_eq!(volume.full_mip_chain(), 7);

        let array = TextureDesc::new_2d(TextureFormat::R8Unorm, 4, 4)
            .with_kind(TextureKind::D2Array, 64);
        assert_eq!(array.full_mip_chain(), 3);
    }

    #[test]
    fn test_explicit_mip_levels_win() {
        let desc = TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 512, 512).with_mip_levels(1);
        assert_eq!(desc.resolved_mip_levels(), 1);
    }

    #[test]
    fn test_mip_extent() {
        let desc = TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 8, 2).with_kind(TextureKind::D3, 4);
        assert_eq!(desc.mip_extent(0), (8, 2, 4));
        assert_eq!(desc.mip_extent(2), (2, 1, 1));
        assert_eq!(desc.mip_size_bytes(1), 4 * 1 * 2 * 4);

        let cube = TextureDesc::new_2d(TextureFormat::Rgba8Unorm, 8, 8).with_kind(TextureKind::Cube, 6);
        assert_eq!(cube.mip_extent(3), (1, 1, 6));
    }

    #[test]
    fn test_attribute_helpers() {
        let attribs = [
            AttributeFormat::Float3,
            AttributeFormat::Float2,
            AttributeFormat::UByte4Norm,
        ];
        assert_eq!(attribute_list_size(&attribs), 24);
        assert_eq!(attribute_list_offset(&attribs, 0), 0);
        assert_eq!(attribute_list_offset(&attribs, 2), 20);
        assert_eq!(attribute_list_offset(&attribs, 10), 24);
    }

    #[test]
    fn test_layer_addressing() {
        assert!(TextureKind::D3.layers_are_depth_slices());
        assert!(TextureKind::Cube.layers_are_depth_slices());
        assert!(!TextureKind::D2Array.layers_are_depth_slices());
        assert!(!TextureKind::CubeArray.layers_are_depth_slices());
    }
}
