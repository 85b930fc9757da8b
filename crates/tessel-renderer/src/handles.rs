//! Handle types for each resource registry

use tessel_core::{Handle, HandleKind};

/// Marker types naming each registry
pub mod kind {
    use super::HandleKind;

    #[derive(Debug)]
    pub enum Buffer {}
    #[derive(Debug)]
    pub enum Texture {}
    #[derive(Debug)]
    pub enum ScreenTexture {}
    #[derive(Debug)]
    pub enum Sampler {}
    #[derive(Debug)]
    pub enum Shader {}

    impl HandleKind for Buffer {
        const NAME: &'static str = "buffer";
    }
    impl HandleKind for Texture {
        const NAME: &'static str = "texture";
    }
    impl HandleKind for ScreenTexture {
        const NAME: &'static str = "screen texture";
    }
    impl HandleKind for Sampler {
        const NAME: &'static str = "sampler";
    }
    impl HandleKind for Shader {
        const NAME: &'static str = "shader";
    }
}

pub type BufferHandle = Handle<kind::Buffer>;
pub type TextureHandle = Handle<kind::Texture>;
pub type ScreenTextureHandle = Handle<kind::ScreenTexture>;
pub type SamplerHandle = Handle<kind::Sampler>;
/// A compiled pipeline together with its shader stages
pub type ShaderHandle = Handle<kind::Shader>;

/// Either kind of texture, for places that accept both
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureRef {
    Texture(TextureHandle),
    Screen(ScreenTextureHandle),
}

impl From<TextureHandle> for TextureRef {
    fn from(handle: TextureHandle) -> Self {
        TextureRef::Texture(handle)
    }
}

impl From<ScreenTextureHandle> for TextureRef {
    fn from(handle: ScreenTextureHandle) -> Self {
        TextureRef::Screen(handle)
    }
}
