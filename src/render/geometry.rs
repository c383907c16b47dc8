//! Destination rectangle math: pixel-aspect correction and letterboxing.

use crate::types::{Ratio, Rect};

/// Integer scale with rounding to nearest, Win32 `MulDiv` style.
fn mul_div(value: i32, numerator: i32, denominator: i32) -> i32 {
    debug_assert!(denominator != 0);
    let product = value as i64 * numerator as i64;
    let half = denominator as i64 / 2;
    ((product + half) / denominator as i64) as i32
}

/// Convert a source rectangle from the source's pixel aspect ratio to
/// square pixels.
///
/// Wide pixels (numerator > denominator) stretch the width; tall pixels
/// stretch the height; 1:1 is a no-op. A 720x486 rectangle with a 9:10
/// pixel aspect, for example, corrects to 720x540.
pub fn correct_aspect_ratio(src: Rect, par: Ratio) -> Rect {
    let mut width = src.width;
    let mut height = src.height;

    if par.numerator != par.denominator && par.numerator != 0 && par.denominator != 0 {
        if par.numerator > par.denominator {
            width = mul_div(width, par.numerator as i32, par.denominator as i32);
        } else {
            height = mul_div(height, par.denominator as i32, par.numerator as i32);
        }
    }

    Rect::of_size(width, height)
}

/// Fit `src` into `dst` preserving its shape: the largest centered
/// rectangle inside `dst` with the same width/height ratio as `src`.
///
/// Assumes square pixels on both sides; run
/// [`correct_aspect_ratio`] first when the source has non-square pixels.
pub fn letterbox(src: Rect, dst: Rect) -> Rect {
    if src.is_empty() || dst.is_empty() {
        return Rect::new(dst.x, dst.y, 0, 0);
    }

    let (lb_width, lb_height) = if mul_div(src.width, dst.height, src.height) <= dst.width {
        // Pillar box: full height, centered columns.
        (mul_div(dst.height, src.width, src.height), dst.height)
    } else {
        // Letter box: full width, centered rows.
        (dst.width, mul_div(dst.width, src.height, src.width))
    };

    Rect::new(
        dst.x + (dst.width - lb_width) / 2,
        dst.y + (dst.height - lb_height) / 2,
        lb_width,
        lb_height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_par_correction_stretches_width() {
        let corrected = correct_aspect_ratio(Rect::of_size(720, 480), Ratio::new(10, 11));
        // Tall pixels stretch the height.
        assert_eq!(corrected, Rect::of_size(720, 528));

        let corrected = correct_aspect_ratio(Rect::of_size(720, 480), Ratio::new(40, 33));
        // Wide pixels stretch the width.
        assert_eq!(corrected, Rect::of_size(873, 480));
    }

    #[test]
    fn test_par_one_is_noop() {
        let src = Rect::of_size(1920, 1080);
        assert_eq!(correct_aspect_ratio(src, Ratio::ONE), src);
    }

    #[test]
    fn test_letterbox_wide_source_in_tall_window() {
        let dst = letterbox(Rect::of_size(1920, 1080), Rect::of_size(800, 800));
        assert_eq!(dst, Rect::new(0, 175, 800, 450));
    }

    #[test]
    fn test_pillarbox_tall_source_in_wide_window() {
        let dst = letterbox(Rect::of_size(480, 640), Rect::of_size(1000, 500));
        assert_eq!(dst, Rect::new(312, 0, 375, 500));
    }

    #[test]
    fn test_exact_fit() {
        let client = Rect::of_size(1280, 720);
        assert_eq!(letterbox(Rect::of_size(1920, 1080), client), client);
    }

    #[test]
    fn test_letterbox_respects_offset_destination() {
        let dst = letterbox(Rect::of_size(100, 100), Rect::new(10, 20, 200, 100));
        assert_eq!(dst, Rect::new(60, 20, 100, 100));
    }

    #[test]
    fn test_degenerate_rectangles() {
        let empty = letterbox(Rect::of_size(0, 0), Rect::of_size(100, 100));
        assert!(empty.is_empty());
        let empty = letterbox(Rect::of_size(100, 100), Rect::of_size(0, 0));
        assert!(empty.is_empty());
    }
}
