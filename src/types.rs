//! Core data model: devices, pixel formats, negotiated video formats and
//! the small geometry types shared by the presentation path.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamps throughout the crate are in units of 100 nanoseconds,
/// matching what capture sources deliver.
pub type Timestamp = i64;

/// Identifies a capture device as reported by platform enumeration.
///
/// The symbolic name is the stable unique identifier; the display name is
/// what a device picker shows. A descriptor has no ownership relation to
/// an active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: String,
    pub symbolic_name: String,
}

impl DeviceDescriptor {
    pub fn new(name: impl Into<String>, symbolic_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbolic_name: symbolic_name.into(),
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Source pixel formats a capture device may deliver.
///
/// Only a subset has a conversion path to the BGRA presentation format;
/// see [`crate::convert::supported_formats`]. The rest are recognized so
/// negotiation can reject them per candidate instead of failing outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 32-bit packed BGRX, the presentation format itself.
    Rgb32,
    /// 24-bit packed BGR.
    Rgb24,
    /// Packed 4:2:2, two luma samples sharing one chroma pair.
    Yuy2,
    /// Planar 4:2:0, full-resolution luma plane plus interleaved
    /// half-resolution CbCr plane.
    Nv12,
    Uyvy,
    I420,
    Mjpeg,
}

impl PixelFormat {
    /// Bytes per pixel for packed formats; `None` for planar/compressed.
    pub fn packed_bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelFormat::Rgb32 => Some(4),
            PixelFormat::Rgb24 => Some(3),
            PixelFormat::Yuy2 | PixelFormat::Uyvy => Some(2),
            PixelFormat::Nv12 | PixelFormat::I420 | PixelFormat::Mjpeg => None,
        }
    }

    /// Minimum stride for a row of `width` pixels, without padding.
    ///
    /// RGB rows are DWORD-aligned, matching the platform convention for
    /// bitmap scanlines; planar 4:2:0 strides equal the luma width.
    pub fn default_stride(&self, width: u32) -> Option<isize> {
        let w = width as isize;
        match self {
            PixelFormat::Rgb32 => Some(w * 4),
            PixelFormat::Rgb24 => Some((w * 3 + 3) & !3),
            PixelFormat::Yuy2 | PixelFormat::Uyvy => Some(w * 2),
            PixelFormat::Nv12 | PixelFormat::I420 => Some(w),
            PixelFormat::Mjpeg => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgb32 => "RGB32",
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Yuy2 => "YUY2",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Uyvy => "UYVY",
            PixelFormat::I420 => "I420",
            PixelFormat::Mjpeg => "MJPG",
        };
        f.write_str(name)
    }
}

/// Scan ordering of the frames a source delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterlaceMode {
    #[default]
    Progressive,
    FieldInterleaved,
    Unknown,
}

/// An exact rational, used for pixel aspect ratios and frame rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    pub numerator: u32,
    pub denominator: u32,
}

impl Ratio {
    pub const ONE: Ratio = Ratio {
        numerator: 1,
        denominator: 1,
    };

    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn as_f64(&self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            self.numerator as f64 / self.denominator as f64
        }
    }
}

impl Default for Ratio {
    fn default() -> Self {
        Ratio::ONE
    }
}

/// A native format negotiated with a capture source.
///
/// One of these is fixed per active session; switching devices
/// renegotiates from scratch.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFormat {
    pub subtype: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Stride of the delivered buffers. When absent it is derived from
    /// the subtype and width at format-set time. Negative means
    /// bottom-up scan order.
    pub default_stride: Option<isize>,
    pub pixel_aspect: Ratio,
    pub frame_rate: Ratio,
    pub interlace: InterlaceMode,
}

impl VideoFormat {
    pub fn new(subtype: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            subtype,
            width,
            height,
            default_stride: None,
            pixel_aspect: Ratio::ONE,
            frame_rate: Ratio::new(30, 1),
            interlace: InterlaceMode::Progressive,
        }
    }

    pub fn with_frame_rate(mut self, numerator: u32, denominator: u32) -> Self {
        self.frame_rate = Ratio::new(numerator, denominator);
        self
    }

    pub fn with_pixel_aspect(mut self, numerator: u32, denominator: u32) -> Self {
        self.pixel_aspect = Ratio::new(numerator, denominator);
        self
    }

    pub fn with_stride(mut self, stride: isize) -> Self {
        self.default_stride = Some(stride);
        self
    }

    pub fn with_subtype(mut self, subtype: PixelFormat) -> Self {
        self.subtype = subtype;
        self
    }

    /// Frames per second as a float, for display and selection.
    pub fn fps(&self) -> f64 {
        self.frame_rate.as_f64()
    }

    /// Average frame interval in 100 ns units, zero when unknown.
    pub fn frame_interval(&self) -> Timestamp {
        if self.frame_rate.numerator == 0 {
            return 0;
        }
        (10_000_000u64 * self.frame_rate.denominator as u64 / self.frame_rate.numerator as u64)
            as Timestamp
    }

    /// The "WxH @ Nfps" string announced after negotiation.
    pub fn announcement(&self) -> String {
        format!("{}x{} @ {:.0}fps", self.width, self.height, self.fps())
    }
}

/// Integer rectangle in window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn of_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stride_dword_aligns_rgb24() {
        assert_eq!(PixelFormat::Rgb24.default_stride(2), Some(8));
        assert_eq!(PixelFormat::Rgb24.default_stride(640), Some(1920));
        assert_eq!(PixelFormat::Rgb32.default_stride(640), Some(2560));
        assert_eq!(PixelFormat::Yuy2.default_stride(640), Some(1280));
        assert_eq!(PixelFormat::Nv12.default_stride(640), Some(640));
        assert_eq!(PixelFormat::Mjpeg.default_stride(640), None);
    }

    #[test]
    fn test_announcement_string() {
        let format = VideoFormat::new(PixelFormat::Yuy2, 1920, 1080).with_frame_rate(30000, 1001);
        assert_eq!(format.announcement(), "1920x1080 @ 30fps");
    }

    #[test]
    fn test_frame_interval() {
        let format = VideoFormat::new(PixelFormat::Nv12, 1280, 720).with_frame_rate(30, 1);
        assert_eq!(format.frame_interval(), 333_333);
    }

    #[test]
    fn test_rect_containment() {
        let outer = Rect::of_size(100, 100);
        assert!(outer.contains(&Rect::new(10, 10, 80, 80)));
        assert!(outer.contains(&outer));
        assert!(!outer.contains(&Rect::new(50, 50, 60, 10)));
    }
}
