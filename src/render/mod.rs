//! GPU presentation backend seam.
//!
//! The pipeline only consumes lock/blit/present primitives; the device
//! itself (Direct3D, Metal, a software rasterizer in tests) lives behind
//! these traits. [`surface::PresentationSurface`] owns one device and
//! one swap chain and is the only code that mutates them.

pub mod geometry;
pub mod surface;

pub use surface::{DrawOutcome, DrawResult, PresentationSurface, SnapshotImage};

use crate::errors::CaptureError;
use crate::types::Rect;

/// Opaque native window handle passed through to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHandle(pub isize);

/// Background fill for the letterbox bars, as B, G, R, X.
pub const BACKGROUND_GRAY: [u8; 4] = [128, 128, 128, 0];

/// A back buffer mapped for CPU writes.
#[derive(Debug, Clone, Copy)]
pub struct LockedRegion {
    pub data: *mut u8,
    pub pitch: isize,
}

/// Creates render devices against a window.
pub trait RenderBackend: Send {
    fn create_device(&mut self, window: WindowHandle)
        -> Result<Box<dyn RenderDevice>, CaptureError>;
}

/// A GPU device bound to one window.
///
/// `test_lost` follows the cooperative-level protocol: `Ok(())` while
/// healthy, `Err(DeviceLost)` once the surface has been invalidated and
/// a reset is required.
pub trait RenderDevice: Send {
    /// Current client area of the device's window, origin at (0, 0).
    fn client_rect(&self) -> Rect;

    fn test_lost(&self) -> Result<(), CaptureError>;

    /// Reset the device in place, preserving its creation parameters.
    fn reset(&mut self) -> Result<(), CaptureError>;

    /// Create a double-buffered swap chain sized to the video frame.
    fn create_swap_chain(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn SwapChain>, CaptureError>;

    /// Fill the window back buffer with a solid color.
    fn color_fill(&mut self, color: [u8; 4]) -> Result<(), CaptureError>;

    /// Blit `src` from the chain's front surface into `dst` on the
    /// window back buffer with linear filtering.
    fn stretch_blit(
        &mut self,
        chain: &dyn SwapChain,
        src: Rect,
        dst: Rect,
    ) -> Result<(), CaptureError>;

    fn present(&mut self) -> Result<(), CaptureError>;
}

/// A lockable swap chain surface holding the converted frame.
pub trait SwapChain: Send {
    fn size(&self) -> (u32, u32);

    fn lock_back_buffer(&mut self) -> Result<LockedRegion, CaptureError>;

    fn unlock_back_buffer(&mut self);
}

/// Scoped back-buffer lock, released on drop even when conversion bails
/// out early.
pub(crate) struct BackBufferLock<'a> {
    chain: &'a mut dyn SwapChain,
    pub region: LockedRegion,
}

impl<'a> BackBufferLock<'a> {
    pub fn acquire(chain: &'a mut dyn SwapChain) -> Result<Self, CaptureError> {
        let region = chain.lock_back_buffer()?;
        Ok(Self { chain, region })
    }
}

impl Drop for BackBufferLock<'_> {
    fn drop(&mut self) {
        self.chain.unlock_back_buffer();
    }
}
