//! Chunked transfers through the staging buffers
//!
//! Every upload goes through one fixed-size staging buffer. Payloads larger
//! than the staging capacity are split into chunks; each chunk is staged and
//! copied before the next one overwrites the staging memory. Only the first
//! chunk of a logical transfer asks for a fresh backing allocation (cycle),
//! later chunks of the same call reuse it.
//!
//! Textures are split on whole rows. A single row wider than the staging
//! buffer is rejected with [`TesselError::RowExceedsStaging`].
//!
//! Buffer transfers start on a 4-byte boundary. An upload may end unaligned
//! only at the end of its buffer, so padded copies never touch caller data.

use crate::backend::commands::{BufferRegion, DownloadTicket, GpuCommand, TextureRegion};
use crate::backend::{CommandStream, RawTransferBuffer};
use crate::handles::{BufferHandle, TextureHandle};
use crate::resources::SharedTables;
use bytemuck::Pod;
use tessel_core::{
    tessel_trace, AllocationTracker, ErrorContext, LogCategory, Result, TesselError,
};

/// Offset and size granularity of buffer copies
pub const COPY_BUFFER_ALIGNMENT: u64 = 4;

fn check_buffer_alignment(operation: &str, dest: BufferHandle, offset: u64) -> Result<()> {
    if offset % COPY_BUFFER_ALIGNMENT == 0 {
        return Ok(());
    }
    Err(TesselError::unsupported_with_context(
        format!("buffer offset {} is not {}-byte aligned", offset, COPY_BUFFER_ALIGNMENT),
        ErrorContext::new(operation, "transfer").with_metadata("buffer", dest),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StagingBuffer {
    pub raw: RawTransferBuffer,
    pub capacity: u32,
}

pub(crate) struct CopyPassState {
    tables: SharedTables,
    pub stream: CommandStream,
    upload: StagingBuffer,
    download: StagingBuffer,
    tracker: AllocationTracker,
    pub pending_downloads: usize,
    /// Textures whose mip 0 this pass wrote
    pub dirtied: Vec<TextureHandle>,
}

impl CopyPassState {
    fn stage(&mut self, chunk: &[u8], cycle: bool) {
        self.tracker.record_staging(chunk.len() as u64, cycle);
        self.stream.push(GpuCommand::StageUpload {
            staging: self.upload.raw,
            offset: 0,
            data: chunk.to_vec(),
            cycle,
        });
    }

    /// Give up this pass's claim on regenerating the textures it dirtied
    pub fn release_mip_writers(&mut self) {
        let mut tables = self.tables.write();
        for handle in self.dirtied.drain(..) {
            if let Some(entry) = tables.textures.get_mut(handle) {
                entry.mip_writers = entry.mip_writers.saturating_sub(1);
            }
        }
    }
}

/// An open copy pass
///
/// Obtained from `Renderer::begin_copy_pass` and handed back to
/// `Renderer::end_copy_pass`, which submits the recorded copies. A default
/// constructed pass is invalid and ignores every call.
#[derive(Default)]
pub struct ActiveCopyPass {
    inner: Option<CopyPassState>,
}

impl ActiveCopyPass {
    pub(crate) fn open(
        tables: SharedTables,
        mut stream: CommandStream,
        upload: StagingBuffer,
        download: StagingBuffer,
        tracker: AllocationTracker,
    ) -> Self {
        stream.push(GpuCommand::BeginCopyPass);
        Self {
            inner: Some(CopyPassState {
                tables,
                stream,
                upload,
                download,
                tracker,
                pending_downloads: 0,
                dirtied: Vec::new(),
            }),
        }
    }

    pub(crate) fn into_state(mut self) -> Option<CopyPassState> {
        self.inner.take()
    }

    pub fn is_valid(&self) -> bool {
        self.inner.is_some()
    }

    /// Upload `data` to the start of `dest`
    pub fn upload_buffer(&mut self, data: &[u8], dest: BufferHandle) -> Result<()> {
        self.upload_buffer_at(data, dest, 0)
    }

    /// Upload a slice of plain values to the start of `dest`
    pub fn upload_buffer_pod<T: Pod>(&mut self, data: &[T], dest: BufferHandle) -> Result<()> {
        self.upload_buffer_at(bytemuck::cast_slice(data), dest, 0)
    }

    /// Upload `data` to `dest` starting at byte `offset`
    pub fn upload_buffer_at(&mut self, data: &[u8], dest: BufferHandle, offset: u32) -> Result<()> {
        let Some(state) = self.inner.as_mut() else {
            return Ok(());
        };

        let entry = *state.tables.read().buffer(dest)?;
        let end = offset as u64 + data.len() as u64;
        if end > entry.size as u64 {
            return Err(TesselError::OutOfBounds {
                offset: offset as u64,
                length: data.len() as u64,
                size: entry.size as u64,
            });
        }
        check_buffer_alignment("upload_buffer", dest, offset as u64)?;
        if end % COPY_BUFFER_ALIGNMENT != 0 && end != entry.size as u64 {
            return Err(TesselError::unsupported_with_context(
                format!(
                    "upload ends at byte {}, which is neither {}-byte aligned nor the end of the buffer",
                    end, COPY_BUFFER_ALIGNMENT
                ),
                ErrorContext::new("upload_buffer", "transfer").with_metadata("buffer", dest),
            ));
        }

        let capacity = state.upload.capacity as usize;
        let staging = state.upload.raw;
        let mut written = 0usize;
        while written < data.len() {
            let size = capacity.min(data.len() - written);
            state.stage(&data[written..written + size], written == 0);
            state.stream.push(GpuCommand::CopyToBuffer {
                staging,
                staging_offset: 0,
                dst: BufferRegion {
                    buffer: entry.raw,
                    offset: offset as u64 + written as u64,
                    size: size as u64,
                },
            });
            written += size;
        }
        debug_assert_eq!(written, data.len());

        tessel_trace!(
            LogCategory::Transfer,
            buffer = %dest,
            bytes = data.len(),
            chunks = data.len().div_ceil(capacity),
            "buffer upload recorded"
        );
        Ok(())
    }

    /// Upload mip 0 of `dest`, every layer
    ///
    /// `data` holds tightly packed rows, layer after layer. Marks the mip
    /// chain dirty when the texture has more than one level.
    pub fn upload_texture(&mut self, data: &[u8], dest: TextureHandle) -> Result<()> {
        self.upload_texture_level(data, dest, 0)
    }

    /// Upload one mip level of `dest`, every layer
    pub fn upload_texture_level(
        &mut self,
        data: &[u8],
        dest: TextureHandle,
        mip_level: u32,
    ) -> Result<()> {
        let Some(state) = self.inner.as_mut() else {
            return Ok(());
        };

        let tables = state.tables.clone();
        let mut tables = tables.write();
        let entry = *tables.texture(dest)?;
        let texture = entry.state;

        let context = || {
            ErrorContext::new("upload_texture", "transfer")
                .with_metadata("texture", dest)
                .with_metadata("mip_level", mip_level)
        };
        if mip_level >= texture.mip_levels {
            return Err(TesselError::unsupported_with_context(
                format!(
                    "mip level {} out of range for {} levels",
                    mip_level, texture.mip_levels
                ),
                context(),
            ));
        }
        if texture.format.is_depth() {
            return Err(TesselError::unsupported_with_context(
                format!("{:?} textures cannot be uploaded", texture.format),
                context(),
            ));
        }

        let (width, height, layers) = texture.desc().mip_extent(mip_level);
        let capacity = state.upload.capacity;
        let bytes_per_row = texture.format.texel_size() as u64 * width as u64;
        if bytes_per_row > capacity as u64 {
            return Err(TesselError::RowExceedsStaging {
                row_bytes: bytes_per_row,
                capacity,
            });
        }

        let layer_bytes = bytes_per_row * height as u64;
        let expected = layer_bytes * layers as u64;
        if (data.len() as u64) < expected {
            return Err(TesselError::DataTooShort {
                expected,
                actual: data.len() as u64,
            });
        }

        // bytes_per_row <= capacity, so both fit in u32
        let bytes_per_row = bytes_per_row as u32;
        let max_rows = capacity / bytes_per_row;
        let layers_are_slices = texture.kind.layers_are_depth_slices();
        let staging = state.upload.raw;

        let mut first = true;
        let mut rows_copied = 0u64;
        for layer in 0..layers {
            let layer_start = (layer as u64 * layer_bytes) as usize;

            let mut y = 0u32;
            while y < height {
                let rows = max_rows.min(height - y);
                let start = layer_start + y as usize * bytes_per_row as usize;
                let end = start + rows as usize * bytes_per_row as usize;
                state.stage(&data[start..end], first);

                let (array_layer, z) = if layers_are_slices { (0, layer) } else { (layer, 0) };
                state.stream.push(GpuCommand::CopyToTexture {
                    staging,
                    staging_offset: 0,
                    bytes_per_row,
                    dst: TextureRegion {
                        texture: entry.raw,
                        mip_level,
                        layer: array_layer,
                        x: 0,
                        y,
                        z,
                        width,
                        height: rows,
                        depth: 1,
                    },
                });

                first = false;
                y += rows;
                rows_copied += rows as u64;
            }
        }
        debug_assert_eq!(rows_copied, height as u64 * layers as u64);

        if !first && mip_level == 0 && texture.mip_levels > 1 {
            if let Some(entry) = tables.textures.get_mut(dest) {
                entry.state.dirty_mip = true;
                if !state.dirtied.contains(&dest) {
                    entry.mip_writers += 1;
                    state.dirtied.push(dest);
                }
            }
        }

        tessel_trace!(
            LogCategory::Transfer,
            texture = %dest,
            mip_level,
            rows = rows_copied,
            rows_per_chunk = max_rows,
            "texture upload recorded"
        );
        Ok(())
    }

    /// Read back all of `source`
    ///
    /// Returns `None` on an invalid pass. The bytes become available from
    /// `Renderer::take_download` once the pass has ended.
    pub fn download_buffer(&mut self, source: BufferHandle) -> Result<Option<DownloadTicket>> {
        let Some(state) = self.inner.as_ref() else {
            return Ok(None);
        };
        let size = state.tables.read().buffer(source)?.size;
        self.download_buffer_range(source, 0, size)
    }

    /// Read back `length` bytes of `source` starting at `offset`
    pub fn download_buffer_range(
        &mut self,
        source: BufferHandle,
        offset: u32,
        length: u32,
    ) -> Result<Option<DownloadTicket>> {
        let Some(state) = self.inner.as_mut() else {
            return Ok(None);
        };

        let entry = *state.tables.read().buffer(source)?;
        if offset as u64 + length as u64 > entry.size as u64 {
            return Err(TesselError::OutOfBounds {
                offset: offset as u64,
                length: length as u64,
                size: entry.size as u64,
            });
        }
        check_buffer_alignment("download_buffer", source, offset as u64)?;

        let id = {
            let mut tables = state.tables.write();
            let id = tables.next_ticket();
            if length == 0 {
                tables.issue_empty_download(id);
            }
            id
        };
        let ticket = DownloadTicket::new(id, length as u64);
        let capacity = state.download.capacity as u64;
        let length = length as u64;
        let mut read = 0u64;
        while read < length {
            let size = capacity.min(length - read);
            let cycle = read == 0;
            state.tracker.record_download(size, cycle);
            state.stream.push(GpuCommand::CopyFromBuffer {
                src: BufferRegion {
                    buffer: entry.raw,
                    offset: offset as u64 + read,
                    size,
                },
                staging: state.download.raw,
                staging_offset: 0,
                cycle,
                ticket,
                ticket_offset: read,
            });
            read += size;
        }
        debug_assert_eq!(read, length);

        state.pending_downloads += 1;
        Ok(Some(ticket))
    }
}

impl Drop for ActiveCopyPass {
    fn drop(&mut self) {
        // dropped without being ended
        if let Some(mut state) = self.inner.take() {
            state.release_mip_writers();
        }
    }
}
