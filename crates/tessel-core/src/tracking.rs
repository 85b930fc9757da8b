//! Allocation tracking
//!
//! An [`AllocationTracker`] is handed to the renderer by its owner and shared
//! by clone. Nothing here is process-wide: two renderers built with two
//! trackers never see each other's numbers.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Resource families counted by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Buffer,
    Texture,
    ScreenTexture,
    Sampler,
    Shader,
    Pipeline,
    TransferBuffer,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Buffer,
        ResourceKind::Texture,
        ResourceKind::ScreenTexture,
        ResourceKind::Sampler,
        ResourceKind::Shader,
        ResourceKind::Pipeline,
        ResourceKind::TransferBuffer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::Texture => "texture",
            ResourceKind::ScreenTexture => "screen texture",
            ResourceKind::Sampler => "sampler",
            ResourceKind::Shader => "shader",
            ResourceKind::Pipeline => "pipeline",
            ResourceKind::TransferBuffer => "transfer buffer",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counters for one resource family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindStats {
    pub created: u64,
    pub released: u64,
    pub live: u64,
    pub live_bytes: u64,
    pub peak_bytes: u64,
}

/// Snapshot of everything a tracker has recorded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationStats {
    kinds: HashMap<ResourceKind, KindStats>,
    /// Staging chunks written by uploads
    pub chunks_staged: u64,
    /// Bytes written into staging buffers
    pub bytes_staged: u64,
    /// Staging writes that requested a fresh backing allocation
    pub cycles: u64,
    /// Readback chunks copied into download staging
    pub download_chunks: u64,
    pub bytes_downloaded: u64,
}

impl AllocationStats {
    /// Counters for `kind`, zeroed if nothing was recorded
    pub fn kind(&self, kind: ResourceKind) -> KindStats {
        self.kinds.get(&kind).copied().unwrap_or_default()
    }

    /// Live objects across every family
    pub fn total_live(&self) -> u64 {
        self.kinds.values().map(|s| s.live).sum()
    }

    pub fn total_live_bytes(&self) -> u64 {
        self.kinds.values().map(|s| s.live_bytes).sum()
    }
}

/// Shared allocation counters
#[derive(Debug, Clone, Default)]
pub struct AllocationTracker {
    inner: Arc<Mutex<AllocationStats>>,
}

impl AllocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_create(&self, kind: ResourceKind, bytes: u64) {
        let mut stats = self.inner.lock();
        let entry = stats.kinds.entry(kind).or_default();
        entry.created += 1;
        entry.live += 1;
        entry.live_bytes += bytes;
        entry.peak_bytes = entry.peak_bytes.max(entry.live_bytes);
    }

    pub fn record_release(&self, kind: ResourceKind, bytes: u64) {
        let mut stats = self.inner.lock();
        let entry = stats.kinds.entry(kind).or_default();
        entry.released += 1;
        entry.live = entry.live.saturating_sub(1);
        entry.live_bytes = entry.live_bytes.saturating_sub(bytes);
    }

    /// One chunk written into upload staging
    pub fn record_staging(&self, bytes: u64, cycle: bool) {
        let mut stats = self.inner.lock();
        stats.chunks_staged += 1;
        stats.bytes_staged += bytes;
        if cycle {
            stats.cycles += 1;
        }
    }

    /// One chunk copied into download staging
    pub fn record_download(&self, bytes: u64, cycle: bool) {
        let mut stats = self.inner.lock();
        stats.download_chunks += 1;
        stats.bytes_downloaded += bytes;
        if cycle {
            stats.cycles += 1;
        }
    }

    pub fn snapshot(&self) -> AllocationStats {
        self.inner.lock().clone()
    }

    /// Live objects of one family
    pub fn live(&self, kind: ResourceKind) -> u64 {
        self.inner.lock().kind(kind).live
    }

    pub fn reset(&self) {
        *self.inner.lock() = AllocationStats::default();
    }
}
