//! Presentation surface manager.
//!
//! Owns the render device, the video-sized swap chain, the conversion
//! function bound to the current native format, and the letterboxed
//! destination rectangle. Everything here runs under the capture
//! session's lock; the GPU is never touched from two threads at once.

use crate::buffer::{BufferLock, FrameBuffer};
use crate::convert::{self, ConvertFn};
use crate::errors::CaptureError;
use crate::render::{
    geometry, BackBufferLock, LockedRegion, RenderBackend, RenderDevice, SwapChain, WindowHandle,
    BACKGROUND_GRAY,
};
use crate::types::{PixelFormat, Ratio, Rect, VideoFormat};

/// What a `draw_frame` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    Presented,
    /// No conversion function or device is bound; nothing was drawn.
    /// Benign: the caller keeps feeding frames.
    NotReady,
}

/// A BGRX copy of the converted frame, captured on request while the
/// back buffer was mapped.
#[derive(Debug, Clone)]
pub struct SnapshotImage {
    pub width: u32,
    pub height: u32,
    pub bgra: Vec<u8>,
}

#[derive(Debug)]
pub struct DrawResult {
    pub outcome: DrawOutcome,
    pub snapshot: Option<SnapshotImage>,
}

impl DrawResult {
    fn not_ready() -> Self {
        Self {
            outcome: DrawOutcome::NotReady,
            snapshot: None,
        }
    }
}

pub struct PresentationSurface {
    backend: Box<dyn RenderBackend>,
    window: Option<WindowHandle>,
    device: Option<Box<dyn RenderDevice>>,
    swap_chain: Option<Box<dyn SwapChain>>,
    subtype: Option<PixelFormat>,
    convert_fn: Option<ConvertFn>,
    width: u32,
    height: u32,
    default_stride: isize,
    pixel_aspect: Ratio,
    dest_rect: Rect,
}

impl PresentationSurface {
    pub fn new(backend: Box<dyn RenderBackend>) -> Self {
        Self {
            backend,
            window: None,
            device: None,
            swap_chain: None,
            subtype: None,
            convert_fn: None,
            width: 0,
            height: 0,
            default_stride: 0,
            pixel_aspect: Ratio::ONE,
            dest_rect: Rect::default(),
        }
    }

    /// Establish the render device for `window`. No-op if one exists.
    pub fn create_device(&mut self, window: WindowHandle) -> Result<(), CaptureError> {
        if self.device.is_some() {
            return Ok(());
        }
        self.device = Some(self.backend.create_device(window)?);
        self.window = Some(window);
        Ok(())
    }

    /// Whether `subtype` can be converted for presentation directly.
    pub fn is_format_supported(&self, subtype: PixelFormat) -> bool {
        convert::is_supported(subtype)
    }

    /// Acceptable decode target by preference index, for negotiation.
    pub fn decode_target(&self, index: usize) -> Option<PixelFormat> {
        convert::format_at(index)
    }

    /// The source format currently bound, if any.
    pub fn bound_format(&self) -> Option<PixelFormat> {
        self.subtype
    }

    /// Current letterboxed destination rectangle.
    pub fn destination_rect(&self) -> Rect {
        self.dest_rect
    }

    /// Bind a negotiated native format.
    ///
    /// Resolves the conversion function, derives the stride when the
    /// format carries none, recreates the swap chain at the frame size
    /// and recomputes the destination rectangle. On failure no
    /// conversion function stays bound and `draw_frame` degrades to
    /// [`DrawOutcome::NotReady`].
    pub fn set_format(&mut self, format: &VideoFormat) -> Result<(), CaptureError> {
        let result = self.try_set_format(format);
        if result.is_err() {
            self.subtype = None;
            self.convert_fn = None;
        }
        result
    }

    fn try_set_format(&mut self, format: &VideoFormat) -> Result<(), CaptureError> {
        self.convert_fn = Some(convert::conversion_for(format.subtype)?);
        self.subtype = Some(format.subtype);

        self.width = format.width;
        self.height = format.height;
        self.default_stride = match format.default_stride {
            Some(stride) => stride,
            None => format
                .subtype
                .default_stride(format.width)
                .ok_or(CaptureError::UnsupportedFormat(format.subtype))?,
        };
        self.pixel_aspect = format.pixel_aspect;

        let device = self.device.as_mut().ok_or_else(|| {
            CaptureError::DeviceUnavailable("render device not created".to_string())
        })?;
        self.swap_chain = Some(device.create_swap_chain(self.width, self.height)?);
        self.update_dest_rect();

        log::debug!(
            "presentation format bound: {} {}x{} stride {}",
            format.subtype,
            self.width,
            self.height,
            self.default_stride
        );
        Ok(())
    }

    /// Convert and present one frame.
    ///
    /// Tests device health first and performs a single reset attempt if
    /// the device reports lost, returning the reset's error without
    /// drawing when it fails. Conversion runs with both the source
    /// buffer and the back buffer locked through RAII guards, so both
    /// release on every failure path. `want_snapshot` copies the
    /// converted image out before presenting.
    pub fn draw_frame(
        &mut self,
        buffer: &dyn FrameBuffer,
        want_snapshot: bool,
    ) -> Result<DrawResult, CaptureError> {
        if self.convert_fn.is_none() {
            return Ok(DrawResult::not_ready());
        }
        if self.device.is_none() || self.swap_chain.is_none() {
            return Ok(DrawResult::not_ready());
        }

        let mut lock = BufferLock::new(buffer);

        if let Some(device) = &self.device {
            if device.test_lost().is_err() {
                self.reset_device()?;
                if self.device.is_none() || self.swap_chain.is_none() {
                    return Ok(DrawResult::not_ready());
                }
            }
        }

        let scan = lock.lock(self.default_stride, self.height as usize)?;
        let convert_fn = self.convert_fn.expect("conversion bound");

        let snapshot = {
            let chain = self.swap_chain.as_mut().expect("swap chain bound");
            let back = BackBufferLock::acquire(chain.as_mut())?;
            unsafe {
                convert_fn(
                    back.region.data,
                    back.region.pitch,
                    scan.scanline0,
                    scan.stride,
                    self.width as usize,
                    self.height as usize,
                );
            }
            want_snapshot.then(|| copy_converted(back.region, self.width, self.height))
        };
        lock.unlock();

        let device = self.device.as_mut().expect("device bound");
        let chain = self.swap_chain.as_ref().expect("swap chain bound");
        device.color_fill(BACKGROUND_GRAY)?;
        device.stretch_blit(
            chain.as_ref(),
            Rect::of_size(self.width as i32, self.height as i32),
            self.dest_rect,
        )?;
        device.present()?;

        Ok(DrawResult {
            outcome: DrawOutcome::Presented,
            snapshot,
        })
    }

    /// Recover from swap-chain loss: reset (or recreate) the device with
    /// its original creation parameters, then rebuild the swap chain and
    /// destination rectangle if a format is bound.
    pub fn reset_device(&mut self) -> Result<(), CaptureError> {
        self.swap_chain = None;

        if let Some(device) = self.device.as_mut() {
            if let Err(err) = device.reset() {
                log::warn!("device reset failed, recreating: {err}");
                self.device = None;
            }
        }

        if self.device.is_none() {
            let window = self.window.ok_or_else(|| {
                CaptureError::DeviceUnavailable("no render window bound".to_string())
            })?;
            self.device = Some(self.backend.create_device(window)?);
        }

        if self.convert_fn.is_some() {
            let device = self.device.as_mut().expect("device recreated");
            self.swap_chain = Some(device.create_swap_chain(self.width, self.height)?);
            self.update_dest_rect();
        }

        Ok(())
    }

    /// Track a window size change: recompute the destination rectangle
    /// against the new client area. The device itself is only touched
    /// when it already reports lost.
    pub fn resize(&mut self) -> Result<(), CaptureError> {
        if let Some(device) = &self.device {
            if device.test_lost().is_err() {
                self.reset_device()?;
            }
        }
        self.update_dest_rect();
        Ok(())
    }

    fn update_dest_rect(&mut self) {
        let Some(device) = &self.device else {
            return;
        };
        let src = Rect::of_size(self.width as i32, self.height as i32);
        let corrected = geometry::correct_aspect_ratio(src, self.pixel_aspect);
        self.dest_rect = geometry::letterbox(corrected, device.client_rect());
    }
}

fn copy_converted(region: LockedRegion, width: u32, height: u32) -> SnapshotImage {
    let row_bytes = width as usize * 4;
    let mut bgra = vec![0u8; row_bytes * height as usize];
    for y in 0..height as usize {
        unsafe {
            let src = region.data.offset(y as isize * region.pitch);
            std::ptr::copy_nonoverlapping(src, bgra[y * row_bytes..].as_mut_ptr(), row_bytes);
        }
    }
    SnapshotImage {
        width,
        height,
        bgra,
    }
}
