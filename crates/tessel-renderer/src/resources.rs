//! Registries owned by a renderer and shared with its open passes

use crate::backend::{RawBuffer, RawSampler, RawTexture};
use crate::handles::{
    kind, BufferHandle, SamplerHandle, ScreenTextureHandle, ShaderHandle, TextureHandle,
    TextureRef,
};
use crate::shader::VisualShader;
use crate::types::{BufferUsage, SamplerDesc, TextureDesc, TextureFormat, TextureKind, TextureUsage};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tessel_core::{Registry, Result};

/// Public view of a texture's description and mip state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureState {
    pub format: TextureFormat,
    pub kind: TextureKind,
    pub usage: TextureUsage,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    /// Mip 0 was written since the chain was last regenerated
    pub dirty_mip: bool,
}

impl TextureState {
    pub(crate) fn from_desc(desc: &TextureDesc) -> Self {
        Self {
            format: desc.format,
            kind: desc.kind,
            usage: desc.usage,
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
            mip_levels: desc.resolved_mip_levels(),
            dirty_mip: false,
        }
    }

    /// Description with the mip count resolved
    pub fn desc(&self) -> TextureDesc {
        TextureDesc {
            format: self.format,
            kind: self.kind,
            usage: self.usage,
            width: self.width,
            height: self.height,
            depth: self.depth,
            mip_levels: self.mip_levels,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BufferEntry {
    pub raw: RawBuffer,
    pub usage: BufferUsage,
    pub size: u32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TextureEntry {
    pub raw: RawTexture,
    pub state: TextureState,
    /// Open copy passes that wrote mip 0 and will regenerate the chain
    pub mip_writers: u32,
}

impl TextureEntry {
    pub fn new(raw: RawTexture, state: TextureState) -> Self {
        Self {
            raw,
            state,
            mip_writers: 0,
        }
    }

    /// Dirty with no open pass left to regenerate it
    pub fn is_orphaned_dirty(&self) -> bool {
        self.state.dirty_mip && self.mip_writers == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SamplerEntry {
    pub raw: RawSampler,
    pub desc: SamplerDesc,
}

#[derive(Debug)]
pub(crate) struct ResourceTables {
    pub buffers: Registry<kind::Buffer, BufferEntry>,
    pub textures: Registry<kind::Texture, TextureEntry>,
    pub screen_textures: Registry<kind::ScreenTexture, TextureEntry>,
    pub samplers: Registry<kind::Sampler, SamplerEntry>,
    pub shaders: Registry<kind::Shader, VisualShader>,
    next_ticket: u64,
    empty_downloads: HashSet<u64>,
}

pub(crate) type SharedTables = Arc<RwLock<ResourceTables>>;

impl ResourceTables {
    pub fn new() -> Self {
        Self {
            buffers: Registry::first_fit(),
            textures: Registry::first_fit(),
            screen_textures: Registry::append_only(),
            samplers: Registry::append_only(),
            shaders: Registry::append_only(),
            next_ticket: 0,
            empty_downloads: HashSet::new(),
        }
    }

    pub fn shared() -> SharedTables {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn buffer(&self, handle: BufferHandle) -> Result<&BufferEntry> {
        self.buffers.try_get(handle)
    }

    pub fn texture(&self, handle: TextureHandle) -> Result<&TextureEntry> {
        self.textures.try_get(handle)
    }

    pub fn screen_texture(&self, handle: ScreenTextureHandle) -> Result<&TextureEntry> {
        self.screen_textures.try_get(handle)
    }

    pub fn texture_ref(&self, texture: TextureRef) -> Result<&TextureEntry> {
        match texture {
            TextureRef::Texture(handle) => self.texture(handle),
            TextureRef::Screen(handle) => self.screen_texture(handle),
        }
    }

    pub fn sampler(&self, handle: SamplerHandle) -> Result<&SamplerEntry> {
        self.samplers.try_get(handle)
    }

    pub fn shader(&self, handle: ShaderHandle) -> Result<&VisualShader> {
        self.shaders.try_get(handle)
    }

    pub fn next_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// Remember a zero-length download so it can be redeemed exactly once
    pub fn issue_empty_download(&mut self, ticket: u64) {
        self.empty_downloads.insert(ticket);
    }

    pub fn redeem_empty_download(&mut self, ticket: u64) -> bool {
        self.empty_downloads.remove(&ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_core::TesselError;

    fn buffer(raw: u64) -> BufferEntry {
        BufferEntry {
            raw: RawBuffer(raw),
            usage: BufferUsage::VERTEX,
            size: 16,
        }
    }

    #[test]
    fn test_reuse_policies_per_table() {
        let mut tables = ResourceTables::new();

        let a = tables.buffers.allocate(buffer(1));
        tables.buffers.destroy(a);
        assert_eq!(tables.buffers.allocate(buffer(2)), a);

        let desc = SamplerDesc {
            linear: true,
            clamp: true,
            anisotropy: 0.0,
        };
        let s = tables.samplers.allocate(SamplerEntry {
            raw: RawSampler(1),
            desc,
        });
        tables.samplers.destroy(s);
        assert_ne!(
            tables.samplers.allocate(SamplerEntry {
                raw: RawSampler(2),
                desc
            }),
            s
        );
    }

    #[test]
    fn test_lookup_errors_name_the_kind() {
        let tables = ResourceTables::new();
        let err = tables.texture(TextureHandle::INVALID).unwrap_err();
        assert!(matches!(
            err,
            TesselError::InvalidHandle {
                kind: "texture",
                index: None
            }
        ));
    }

    #[test]
    fn test_empty_downloads_redeem_once() {
        let mut tables = ResourceTables::new();
        let ticket = tables.next_ticket();
        tables.issue_empty_download(ticket);
        assert!(tables.redeem_empty_download(ticket));
        assert!(!tables.redeem_empty_download(ticket));
    }

    #[test]
    fn test_tickets_are_unique() {
        let mut tables = ResourceTables::new();
        let a = tables.next_ticket();
        let b = tables.next_ticket();
        assert_ne!(a, b);
    }
}
