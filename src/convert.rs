//! Pixel conversion engine.
//!
//! Pure, stateless scanline converters from device-native formats into
//! 32-bit BGRX, the presentation format. Conversion functions are
//! resolved once per format-set through a static dispatch table; an
//! unknown format is a hard [`CaptureError::UnsupportedFormat`].
//!
//! Every kernel walks rows through explicit `(pointer, stride)` pairs
//! with no shared mutable state between scanlines, so full-resolution
//! 30fps conversion parallelizes cleanly: RGB24 and YUY2 split per
//! scanline, NV12 per 2x2 block row.

use crate::errors::CaptureError;
use crate::types::PixelFormat;
use rayon::prelude::*;

/// Converts one frame from a native format into 32-bit BGRX.
///
/// # Safety
///
/// `src` must point to a frame of `height` scanlines laid out with
/// `src_stride` (negative for bottom-up images, in which case it points
/// at the top-of-image scanline as produced by
/// [`crate::buffer::BufferLock`]). `dst` must point to `height`
/// writable scanlines of `dst_stride` bytes, each holding at least
/// `width * 4` bytes. For planar formats the chroma plane must follow
/// the luma plane at `height * src_stride`.
pub type ConvertFn = unsafe fn(
    dst: *mut u8,
    dst_stride: isize,
    src: *const u8,
    src_stride: isize,
    width: usize,
    height: usize,
);

struct FormatEntry {
    subtype: PixelFormat,
    convert: ConvertFn,
}

// Order matters: negotiation offers decode targets in this order.
static FORMAT_TABLE: [FormatEntry; 4] = [
    FormatEntry {
        subtype: PixelFormat::Rgb32,
        convert: convert_rgb32,
    },
    FormatEntry {
        subtype: PixelFormat::Rgb24,
        convert: convert_rgb24,
    },
    FormatEntry {
        subtype: PixelFormat::Yuy2,
        convert: convert_yuy2,
    },
    FormatEntry {
        subtype: PixelFormat::Nv12,
        convert: convert_nv12,
    },
];

/// Resolve the conversion function for a source format.
pub fn conversion_for(subtype: PixelFormat) -> Result<ConvertFn, CaptureError> {
    FORMAT_TABLE
        .iter()
        .find(|entry| entry.subtype == subtype)
        .map(|entry| entry.convert)
        .ok_or(CaptureError::UnsupportedFormat(subtype))
}

/// Whether a direct conversion path exists for `subtype`.
pub fn is_supported(subtype: PixelFormat) -> bool {
    FORMAT_TABLE.iter().any(|entry| entry.subtype == subtype)
}

/// The supported source formats, in negotiation preference order.
pub fn supported_formats() -> impl Iterator<Item = PixelFormat> {
    FORMAT_TABLE.iter().map(|entry| entry.subtype)
}

/// Supported format by enumeration index, `None` past the end.
pub fn format_at(index: usize) -> Option<PixelFormat> {
    FORMAT_TABLE.get(index).map(|entry| entry.subtype)
}

#[inline]
fn clip(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// BT.601-class integer YCbCr -> BGRX transform shared by the packed and
/// planar kernels. Output byte order is B, G, R, X.
#[inline]
fn ycbcr_to_bgrx(y: u8, cb: u8, cr: u8) -> [u8; 4] {
    let c = y as i32 - 16;
    let d = cb as i32 - 128;
    let e = cr as i32 - 128;

    [
        clip((298 * c + 516 * d + 128) >> 8),
        clip((298 * c - 100 * d - 208 * e + 128) >> 8),
        clip((298 * c + 409 * e + 128) >> 8),
        0,
    ]
}

// Raw row pointers handed to rayon workers. Each worker touches a
// disjoint set of rows, which is what makes the wrapper sound.
#[derive(Clone, Copy)]
struct RowBase(*mut u8);
unsafe impl Send for RowBase {}
unsafe impl Sync for RowBase {}

#[derive(Clone, Copy)]
struct RowBaseConst(*const u8);
unsafe impl Send for RowBaseConst {}
unsafe impl Sync for RowBaseConst {}

/// 32-bit BGRX to BGRX: a strided block copy. Needed because the native
/// buffer arrives in system memory, not on the render surface.
unsafe fn convert_rgb32(
    dst: *mut u8,
    dst_stride: isize,
    src: *const u8,
    src_stride: isize,
    width: usize,
    height: usize,
) {
    let dst_base = RowBase(dst);
    let src_base = RowBaseConst(src);
    let row_bytes = width * 4;

    (0..height).into_par_iter().for_each(|y| unsafe {
        // Force whole-struct capture of the Send+Sync wrappers rather
        // than edition-2021 disjoint capture of the raw-pointer fields.
        let (src_base, dst_base) = (src_base, dst_base);
        let src_row = src_base.0.offset(y as isize * src_stride);
        let dst_row = dst_base.0.offset(y as isize * dst_stride);
        std::ptr::copy_nonoverlapping(src_row, dst_row, row_bytes);
    });
}

/// 24-bit BGR to BGRX, alpha forced to zero.
unsafe fn convert_rgb24(
    dst: *mut u8,
    dst_stride: isize,
    src: *const u8,
    src_stride: isize,
    width: usize,
    height: usize,
) {
    let dst_base = RowBase(dst);
    let src_base = RowBaseConst(src);

    (0..height).into_par_iter().for_each(|y| unsafe {
        let (src_base, dst_base) = (src_base, dst_base);
        let mut src_px = src_base.0.offset(y as isize * src_stride);
        let mut dst_px = dst_base.0.offset(y as isize * dst_stride);
        for _ in 0..width {
            *dst_px = *src_px; // B
            *dst_px.add(1) = *src_px.add(1); // G
            *dst_px.add(2) = *src_px.add(2); // R
            *dst_px.add(3) = 0;
            src_px = src_px.add(3);
            dst_px = dst_px.add(4);
        }
    });
}

/// Packed 4:2:2 to BGRX. Each Y0 U Y1 V macropixel yields two output
/// pixels sharing the same chroma pair.
unsafe fn convert_yuy2(
    dst: *mut u8,
    dst_stride: isize,
    src: *const u8,
    src_stride: isize,
    width: usize,
    height: usize,
) {
    let dst_base = RowBase(dst);
    let src_base = RowBaseConst(src);

    (0..height).into_par_iter().for_each(|y| unsafe {
        let (src_base, dst_base) = (src_base, dst_base);
        let mut src_px = src_base.0.offset(y as isize * src_stride);
        let mut dst_px = dst_base.0.offset(y as isize * dst_stride);
        for _ in 0..width / 2 {
            let y0 = *src_px;
            let cb = *src_px.add(1);
            let y1 = *src_px.add(2);
            let cr = *src_px.add(3);

            let first = ycbcr_to_bgrx(y0, cb, cr);
            dst_px.copy_from_nonoverlapping(first.as_ptr(), 4);
            let second = ycbcr_to_bgrx(y1, cb, cr);
            dst_px.add(4).copy_from_nonoverlapping(second.as_ptr(), 4);

            src_px = src_px.add(4);
            dst_px = dst_px.add(8);
        }
    });
}

/// Planar 4:2:0 to BGRX, processed in 2x2 luma blocks. The four luma
/// samples of a block share one CbCr pair from the interleaved chroma
/// plane that follows the luma plane.
unsafe fn convert_nv12(
    dst: *mut u8,
    dst_stride: isize,
    src: *const u8,
    src_stride: isize,
    width: usize,
    height: usize,
) {
    let dst_base = RowBase(dst);
    let luma_base = RowBaseConst(src);
    let chroma_base = RowBaseConst(src.offset(height as isize * src_stride));
    let chroma_rows = height.div_ceil(2);

    (0..height)
        .into_par_iter()
        .step_by(2)
        .for_each(|row| unsafe {
            let (luma_base, chroma_base, dst_base) = (luma_base, chroma_base, dst_base);
            let luma0 = luma_base.0.offset(row as isize * src_stride);
            // A trailing odd row reuses its own luma line for the pair.
            let luma1 = if row + 1 < height {
                luma0.offset(src_stride)
            } else {
                luma0
            };
            let chroma_row = (row / 2).min(chroma_rows - 1);
            let chroma = chroma_base.0.offset(chroma_row as isize * src_stride);

            let dst0 = dst_base.0.offset(row as isize * dst_stride);
            let dst1 = if row + 1 < height {
                dst0.offset(dst_stride)
            } else {
                dst0
            };

            for x in (0..width).step_by(2) {
                // A trailing odd column clamps to the last full chroma
                // pair so the read stays inside the row.
                let pair = (x / 2).min((width / 2).saturating_sub(1));
                let cb = *chroma.add(pair * 2);
                let cr = *chroma.add(pair * 2 + 1);

                let px = ycbcr_to_bgrx(*luma0.add(x), cb, cr);
                dst0.add(x * 4).copy_from_nonoverlapping(px.as_ptr(), 4);
                if row + 1 < height {
                    let px = ycbcr_to_bgrx(*luma1.add(x), cb, cr);
                    dst1.add(x * 4).copy_from_nonoverlapping(px.as_ptr(), 4);
                }

                if x + 1 < width {
                    let px = ycbcr_to_bgrx(*luma0.add(x + 1), cb, cr);
                    dst0.add((x + 1) * 4)
                        .copy_from_nonoverlapping(px.as_ptr(), 4);
                    if row + 1 < height {
                        let px = ycbcr_to_bgrx(*luma1.add(x + 1), cb, cr);
                        dst1.add((x + 1) * 4)
                            .copy_from_nonoverlapping(px.as_ptr(), 4);
                    }
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    // Independent rendering of the reference transform from the format
    // documentation, kept separate from the kernel's helper on purpose.
    fn reference_bgrx(y: u8, cb: u8, cr: u8) -> [u8; 4] {
        let c = y as i32 - 16;
        let d = cb as i32 - 128;
        let e = cr as i32 - 128;
        let clip = |v: i32| v.clamp(0, 255) as u8;
        [
            clip((298 * c + 516 * d + 128) >> 8),
            clip((298 * c - 100 * d - 208 * e + 128) >> 8),
            clip((298 * c + 409 * e + 128) >> 8),
            0,
        ]
    }

    fn run(
        convert: ConvertFn,
        src: &[u8],
        src_stride: isize,
        width: usize,
        height: usize,
        dst_stride: usize,
    ) -> Vec<u8> {
        let mut dst = vec![0xAAu8; dst_stride * height];
        unsafe {
            convert(
                dst.as_mut_ptr(),
                dst_stride as isize,
                src.as_ptr(),
                src_stride,
                width,
                height,
            );
        }
        dst
    }

    #[test]
    fn test_table_lookup() {
        assert!(conversion_for(PixelFormat::Yuy2).is_ok());
        assert!(conversion_for(PixelFormat::Nv12).is_ok());
        assert!(matches!(
            conversion_for(PixelFormat::Mjpeg),
            Err(CaptureError::UnsupportedFormat(PixelFormat::Mjpeg))
        ));
        assert!(is_supported(PixelFormat::Rgb24));
        assert!(!is_supported(PixelFormat::Uyvy));
    }

    #[test]
    fn test_format_enumeration_is_ordered() {
        let formats: Vec<_> = supported_formats().collect();
        assert_eq!(
            formats,
            vec![
                PixelFormat::Rgb32,
                PixelFormat::Rgb24,
                PixelFormat::Yuy2,
                PixelFormat::Nv12
            ]
        );
        assert_eq!(format_at(0), Some(PixelFormat::Rgb32));
        assert_eq!(format_at(4), None);
    }

    #[test]
    fn test_rgb32_strided_copy() {
        // 2x2 frame with 4 bytes of stride padding per source row.
        let width = 2;
        let height = 2;
        let src_stride = 12usize;
        let mut src = vec![0xFFu8; src_stride * height];
        for (i, px) in [[1u8, 2, 3, 0], [4, 5, 6, 0], [7, 8, 9, 0], [10, 11, 12, 0]]
            .iter()
            .enumerate()
        {
            let row = i / 2;
            let col = i % 2;
            src[row * src_stride + col * 4..row * src_stride + col * 4 + 4].copy_from_slice(px);
        }

        let dst = run(convert_rgb32, &src, src_stride as isize, width, height, 8);
        assert_eq!(&dst[0..4], &[1, 2, 3, 0]);
        assert_eq!(&dst[4..8], &[4, 5, 6, 0]);
        assert_eq!(&dst[8..12], &[7, 8, 9, 0]);
        assert_eq!(&dst[12..16], &[10, 11, 12, 0]);
    }

    #[test]
    fn test_rgb24_forces_zero_alpha() {
        let width = 3;
        let height = 1;
        let src = vec![10u8, 20, 30, 40, 50, 60, 70, 80, 90];
        let dst = run(convert_rgb24, &src, 9, width, height, width * 4);
        assert_eq!(&dst[0..4], &[10, 20, 30, 0]);
        assert_eq!(&dst[4..8], &[40, 50, 60, 0]);
        assert_eq!(&dst[8..12], &[70, 80, 90, 0]);
    }

    #[test]
    fn test_yuy2_macropixel_shares_chroma() {
        // One macropixel: Y0=41 U=240 Y1=90 V=110.
        let src = [41u8, 240, 90, 110];
        let dst = run(convert_yuy2, &src, 4, 2, 1, 8);
        assert_eq!(&dst[0..4], &reference_bgrx(41, 240, 110));
        assert_eq!(&dst[4..8], &reference_bgrx(90, 240, 110));
    }

    #[test]
    fn test_yuy2_black_white_and_clipping() {
        // Nominal black (16) and super-white (255, clips to 255).
        let src = [16u8, 128, 255, 128];
        let dst = run(convert_yuy2, &src, 4, 2, 1, 8);
        assert_eq!(&dst[0..4], &[0, 0, 0, 0]);
        assert_eq!(&dst[4..8], &[255, 255, 255, 0]);
    }

    #[test]
    fn test_nv12_block_shares_chroma() {
        // 2x2 frame: luma plane then one interleaved CbCr pair.
        let width = 2;
        let height = 2;
        let stride = 2isize;
        let src = [
            60u8, 70, // luma row 0
            80, 90, // luma row 1
            100, 200, // Cb, Cr
        ];
        let dst = run(convert_nv12, &src, stride, width, height, width * 4);
        assert_eq!(&dst[0..4], &reference_bgrx(60, 100, 200));
        assert_eq!(&dst[4..8], &reference_bgrx(70, 100, 200));
        assert_eq!(&dst[8..12], &reference_bgrx(80, 100, 200));
        assert_eq!(&dst[12..16], &reference_bgrx(90, 100, 200));
    }

    #[test]
    fn test_nv12_odd_dimensions() {
        // 3x3: the trailing column and row must reuse the edge chroma
        // pair without reading past either plane.
        let width = 3;
        let height = 3;
        let stride = 3isize;
        let mut src = Vec::new();
        src.extend_from_slice(&[10, 20, 30, 40, 50, 60, 70, 80, 90]); // luma
        src.extend_from_slice(&[128, 128, 0]); // chroma row 0 (one pair + pad)
        src.extend_from_slice(&[150, 96, 0]); // chroma row 1

        let dst = run(convert_nv12, &src, stride, width, height, width * 4);

        assert_eq!(&dst[0..4], &reference_bgrx(10, 128, 128));
        // Trailing odd column clamps to the row's only chroma pair.
        assert_eq!(&dst[8..12], &reference_bgrx(30, 128, 128));
        // Row 2 (odd trailing row) uses chroma row 1.
        let row2 = &dst[2 * width * 4..];
        assert_eq!(&row2[0..4], &reference_bgrx(70, 150, 96));
        assert_eq!(&row2[8..12], &reference_bgrx(90, 150, 96));
    }

    #[test]
    fn test_yuy2_matches_reference_across_levels() {
        // Sweep a spread of YCbCr triples through a full frame and
        // compare every pixel with the reference transform.
        let width = 16;
        let height = 8;
        let mut src = vec![0u8; width * 2 * height];
        for (i, sample) in src.iter_mut().enumerate() {
            *sample = ((i * 37) % 256) as u8;
        }
        let dst = run(
            convert_yuy2,
            &src,
            (width * 2) as isize,
            width,
            height,
            width * 4,
        );

        for y in 0..height {
            for mx in 0..width / 2 {
                let s = y * width * 2 + mx * 4;
                let (y0, cb, y1, cr) = (src[s], src[s + 1], src[s + 2], src[s + 3]);
                let d = y * width * 4 + mx * 8;
                assert_eq!(&dst[d..d + 4], &reference_bgrx(y0, cb, cr));
                assert_eq!(&dst[d + 4..d + 8], &reference_bgrx(y1, cb, cr));
            }
        }
    }
}
