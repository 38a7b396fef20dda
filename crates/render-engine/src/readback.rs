//! GPU texture readback into pooled CPU frames.

use frameport_common::{FrameportError, FrameportResult};
use frameport_render_model::Resolution;

use crate::frame_pool::{Frame, FramePool};

/// Size of a texture as reported by the graphics API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDescription {
    pub width: u32,
    pub height: u32,
}

/// CPU-visible view of a mapped staging texture.
#[derive(Debug, Clone, Copy)]
pub struct MappedRegion<'a> {
    pub data: &'a [u8],
    /// Bytes between the starts of two consecutive rows. May exceed
    /// `width * 4` because of driver alignment.
    pub row_pitch: usize,
}

/// A BGRA8 texture that can be mapped for CPU reads.
///
/// Implemented by the host's graphics layer. `map_for_read` and `unmap` are
/// always called in pairs by [`ReadbackAdapter`].
pub trait ReadableTexture {
    fn description(&self) -> TextureDescription;

    /// Whether the underlying GPU resource has already been released.
    fn is_released(&self) -> bool;

    /// Map the texture. Return a `FrameportError::Readback` for failures
    /// worth retrying on the next tick; any other error ends the export.
    fn map_for_read(&self) -> FrameportResult<MappedRegion<'_>>;

    fn unmap(&self);
}

impl TextureDescription {
    pub fn resolution(self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Copies textures of one fixed size into frames rented from a pool.
pub struct ReadbackAdapter {
    pool: FramePool,
}

struct UnmapGuard<'a, T: ReadableTexture + ?Sized>(&'a T);

impl<T: ReadableTexture + ?Sized> Drop for UnmapGuard<'_, T> {
    fn drop(&mut self) {
        self.0.unmap();
    }
}

impl ReadbackAdapter {
    pub fn new(pool: FramePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    pub fn resolution(&self) -> Resolution {
        self.pool.resolution()
    }

    /// Copy `texture` into a fresh frame.
    ///
    /// The texture is unmapped before returning, whether the copy succeeded
    /// or not.
    pub fn read_back<T: ReadableTexture + ?Sized>(&self, texture: &T) -> FrameportResult<Frame> {
        if texture.is_released() {
            return Err(FrameportError::readback("texture was released"));
        }

        let expected = self.pool.resolution();
        let actual = texture.description().resolution();
        if actual != expected {
            return Err(FrameportError::readback(format!(
                "texture is {actual}, export expects {expected}"
            )));
        }

        let region = texture.map_for_read()?;
        let _unmap = UnmapGuard(texture);

        let stride = expected.width as usize * 4;
        let rows = expected.height as usize;
        if region.row_pitch < stride {
            return Err(FrameportError::readback(format!(
                "row pitch {} is smaller than row stride {stride}",
                region.row_pitch
            )));
        }
        // The last row only needs `stride` bytes, not a full pitch.
        let required = region.row_pitch * rows.saturating_sub(1) + stride;
        if region.data.len() < required {
            return Err(FrameportError::readback(format!(
                "mapped region holds {} bytes, need {required}",
                region.data.len()
            )));
        }

        let mut frame = self.pool.rent();
        let dst = frame.as_mut_bytes();
        if region.row_pitch == stride {
            dst.copy_from_slice(&region.data[..stride * rows]);
        } else {
            for (row, out) in dst.chunks_exact_mut(stride).enumerate() {
                let start = row * region.row_pitch;
                out.copy_from_slice(&region.data[start..start + stride]);
            }
        }

        tracing::trace!(
            width = expected.width,
            height = expected.height,
            row_pitch = region.row_pitch,
            "Read back frame"
        );
        Ok(frame)
    }
}
