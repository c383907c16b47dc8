//! Property-based tests for destination-rectangle math.
//!
//! Invariants: the computed destination rectangle is always contained
//! in the client rectangle, and its shape matches the (aspect-corrected)
//! source shape within one pixel of integer rounding.

use proptest::prelude::*;
use viewfinder::render::geometry::{correct_aspect_ratio, letterbox};
use viewfinder::types::{Ratio, Rect};

proptest! {
    #[test]
    fn letterbox_result_is_contained_and_centered(
        src_w in 1i32..8192,
        src_h in 1i32..8192,
        dst_x in -500i32..500,
        dst_y in -500i32..500,
        dst_w in 1i32..4096,
        dst_h in 1i32..4096,
    ) {
        let src = Rect::of_size(src_w, src_h);
        let dst = Rect::new(dst_x, dst_y, dst_w, dst_h);
        let boxed = letterbox(src, dst);

        prop_assert!(dst.contains(&boxed), "{boxed:?} outside {dst:?}");

        // Centered: slack splits evenly, odd pixel goes right/bottom.
        let slack_x = dst.width - boxed.width;
        let slack_y = dst.height - boxed.height;
        prop_assert_eq!(boxed.x - dst.x, slack_x / 2);
        prop_assert_eq!(boxed.y - dst.y, slack_y / 2);

        // One dimension always fills the client rect.
        prop_assert!(boxed.width == dst.width || boxed.height == dst.height);
    }

    #[test]
    fn letterbox_preserves_source_shape(
        src_w in 16i32..8192,
        src_h in 16i32..8192,
        dst_w in 64i32..4096,
        dst_h in 64i32..4096,
    ) {
        let boxed = letterbox(Rect::of_size(src_w, src_h), Rect::of_size(dst_w, dst_h));

        // Cross-multiplied ratios differ by at most one pixel of
        // rounding in the scaled dimension.
        let lhs = boxed.width as i64 * src_h as i64;
        let rhs = boxed.height as i64 * src_w as i64;
        let tolerance = src_w.max(src_h) as i64;
        prop_assert!(
            (lhs - rhs).abs() <= tolerance,
            "shape drifted: {}x{} vs source {}x{}",
            boxed.width, boxed.height, src_w, src_h
        );
    }

    #[test]
    fn aspect_correction_only_grows_one_dimension(
        w in 1i32..4096,
        h in 1i32..4096,
        num in 1u32..30,
        den in 1u32..30,
    ) {
        let src = Rect::of_size(w, h);
        let corrected = correct_aspect_ratio(src, Ratio::new(num, den));

        if num > den {
            prop_assert_eq!(corrected.height, h);
            prop_assert!(corrected.width >= w);
        } else if num < den {
            prop_assert_eq!(corrected.width, w);
            prop_assert!(corrected.height >= h);
        } else {
            prop_assert_eq!(corrected, src);
        }
    }

    #[test]
    fn correction_then_letterbox_stays_inside_client(
        w in 16i32..4096,
        h in 16i32..4096,
        num in 1u32..30,
        den in 1u32..30,
        dst_w in 64i32..4096,
        dst_h in 64i32..4096,
    ) {
        let client = Rect::of_size(dst_w, dst_h);
        let corrected = correct_aspect_ratio(Rect::of_size(w, h), Ratio::new(num, den));
        let boxed = letterbox(corrected, client);
        prop_assert!(client.contains(&boxed));
    }
}
