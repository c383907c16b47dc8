//! Frame buffer access and the scoped lock adapter.
//!
//! A capture source hands out frame buffers in one of two shapes: a
//! planar buffer with direct 2D addressing (pointer plus stride), or a
//! flat buffer where the caller supplies the stride computed from the
//! negotiated format. [`BufferLock`] hides the difference and guarantees
//! the unlock runs on every exit path.

use crate::errors::CaptureError;

/// A pointer to scanline zero of an image together with the actual
/// stride of the locked buffer. The stride is negative for bottom-up
/// images; the pointer always addresses the visually-topmost row.
#[derive(Debug, Clone, Copy)]
pub struct Scanlines {
    pub scanline0: *const u8,
    pub stride: isize,
}

/// A flat locked region with no intrinsic row layout.
#[derive(Debug, Clone, Copy)]
pub struct FlatRegion {
    pub data: *const u8,
    pub len: usize,
}

/// A borrowed native frame buffer.
///
/// Implementations that support direct 2D addressing return `true` from
/// `supports_2d` and service `lock_2d`; all implementations service the
/// flat `lock`. Locks are exclusive: a second lock before unlock is an
/// implementation error.
pub trait FrameBuffer {
    fn supports_2d(&self) -> bool;

    /// Lock with direct 2D addressing. Only called when `supports_2d`.
    fn lock_2d(&self) -> Result<Scanlines, CaptureError>;

    fn unlock_2d(&self);

    /// Lock the flat representation.
    fn lock(&self) -> Result<FlatRegion, CaptureError>;

    fn unlock(&self);
}

enum LockShape {
    Planar,
    Flat,
}

/// Scoped read lock on a [`FrameBuffer`].
///
/// Prefers the 2D lock when the buffer supports it; otherwise locks the
/// flat buffer and derives the top-of-image pointer from the
/// caller-supplied default stride, stepping backwards through memory for
/// bottom-up (negative stride) images. Dropping the adapter unlocks
/// whichever representation was locked; double-unlock is a no-op.
pub struct BufferLock<'a> {
    buffer: &'a dyn FrameBuffer,
    locked: Option<LockShape>,
}

impl<'a> BufferLock<'a> {
    pub fn new(buffer: &'a dyn FrameBuffer) -> Self {
        Self {
            buffer,
            locked: None,
        }
    }

    /// Lock the buffer and return scanline zero plus the actual stride.
    ///
    /// `default_stride` is the minimum stride computed from the media
    /// type, used only when the buffer has no 2D representation.
    pub fn lock(
        &mut self,
        default_stride: isize,
        height: usize,
    ) -> Result<Scanlines, CaptureError> {
        if self.buffer.supports_2d() {
            let scanlines = self.buffer.lock_2d()?;
            self.locked = Some(LockShape::Planar);
            return Ok(scanlines);
        }

        let region = self.buffer.lock()?;
        self.locked = Some(LockShape::Flat);

        let scanline0 = if default_stride < 0 {
            // Bottom-up image: scanline zero is the start of the last
            // row in memory.
            let offset = (-default_stride) as usize * height.saturating_sub(1);
            if offset >= region.len && height > 1 {
                self.unlock();
                return Err(CaptureError::ConversionFailure(format!(
                    "buffer of {} bytes too small for {} rows of stride {}",
                    region.len, height, default_stride
                )));
            }
            unsafe { region.data.add(offset) }
        } else {
            region.data
        };

        Ok(Scanlines {
            scanline0,
            stride: default_stride,
        })
    }

    /// Unlock early. Dropping the adapter does the same.
    pub fn unlock(&mut self) {
        match self.locked.take() {
            Some(LockShape::Planar) => self.buffer.unlock_2d(),
            Some(LockShape::Flat) => self.buffer.unlock(),
            None => {}
        }
    }
}

impl Drop for BufferLock<'_> {
    fn drop(&mut self) {
        self.unlock();
    }
}
