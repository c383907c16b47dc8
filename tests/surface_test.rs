//! Presentation surface tests against the scripted GPU backend.

use viewfinder::render::{DrawOutcome, PresentationSurface, WindowHandle};
use viewfinder::testing::{
    synthetic_yuy2_frame, Memory2dBuffer, MemoryFlatBuffer, MockGpu, RenderOp,
};
use viewfinder::types::{PixelFormat, Rect, VideoFormat};
use viewfinder::CaptureError;

fn surface_with_gpu(client: Rect) -> (PresentationSurface, MockGpu) {
    let gpu = MockGpu::new(client);
    let mut surface = PresentationSurface::new(gpu.backend());
    surface.create_device(WindowHandle(1)).expect("device");
    (surface, gpu)
}

fn yuy2_buffer(width: u32, height: u32) -> Memory2dBuffer {
    Memory2dBuffer::new(
        synthetic_yuy2_frame(0, width, height),
        width as isize * 2,
    )
}

#[test]
fn create_device_is_idempotent() {
    let (mut surface, gpu) = surface_with_gpu(Rect::of_size(640, 480));
    surface.create_device(WindowHandle(1)).expect("again");
    assert_eq!(gpu.count(&RenderOp::CreateDevice), 1);
}

#[test]
fn set_format_recreates_swap_chain_and_dest_rect() {
    let (mut surface, gpu) = surface_with_gpu(Rect::of_size(1280, 720));
    let format = VideoFormat::new(PixelFormat::Yuy2, 640, 480);
    surface.set_format(&format).expect("set_format");

    assert_eq!(
        gpu.count(&RenderOp::CreateSwapChain {
            width: 640,
            height: 480
        }),
        1
    );
    // 4:3 source pillarboxed into a 16:9 client.
    assert_eq!(surface.destination_rect(), Rect::new(160, 0, 960, 720));
    assert_eq!(surface.bound_format(), Some(PixelFormat::Yuy2));
}

#[test]
fn set_format_unknown_subtype_leaves_surface_not_ready() {
    let (mut surface, gpu) = surface_with_gpu(Rect::of_size(640, 480));

    let result = surface.set_format(&VideoFormat::new(PixelFormat::Mjpeg, 640, 480));
    assert!(matches!(
        result,
        Err(CaptureError::UnsupportedFormat(PixelFormat::Mjpeg))
    ));
    assert_eq!(surface.bound_format(), None);

    gpu.clear_ops();
    let buffer = yuy2_buffer(640, 480);
    let draw = surface.draw_frame(&buffer, false).expect("draw");
    assert_eq!(draw.outcome, DrawOutcome::NotReady);
    // A not-ready draw never touches the GPU.
    assert!(gpu.ops().is_empty());
}

#[test]
fn draw_frame_converts_fills_blits_presents_in_order() {
    let (mut surface, gpu) = surface_with_gpu(Rect::of_size(1280, 720));
    surface
        .set_format(&VideoFormat::new(PixelFormat::Yuy2, 640, 480))
        .expect("set_format");

    gpu.clear_ops();
    let buffer = yuy2_buffer(640, 480);
    let draw = surface.draw_frame(&buffer, false).expect("draw");
    assert_eq!(draw.outcome, DrawOutcome::Presented);
    assert!(buffer.is_unlocked());

    assert_eq!(
        gpu.ops(),
        vec![
            RenderOp::LockBackBuffer,
            RenderOp::UnlockBackBuffer,
            RenderOp::ColorFill,
            RenderOp::Blit {
                src: Rect::of_size(640, 480),
                dst: Rect::new(160, 0, 960, 720),
            },
            RenderOp::Present,
        ]
    );
}

#[test]
fn draw_frame_writes_converted_pixels_into_swap_chain() {
    let (mut surface, gpu) = surface_with_gpu(Rect::of_size(64, 64));

    // Tightly packed RGB24 rows; the stride rides in on the format.
    let src = vec![
        1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, // row 0
        13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, // row 1
    ];
    let format = VideoFormat::new(PixelFormat::Rgb24, 4, 2).with_stride(12);
    surface.set_format(&format).expect("set_format with stride");

    let buffer = MemoryFlatBuffer::new(src);
    surface.draw_frame(&buffer, false).expect("draw");

    let pixels = gpu.chain_pixels().expect("chain exists");
    assert_eq!(&pixels[0..4], &[1, 2, 3, 0]);
    assert_eq!(&pixels[4 * 4..4 * 4 + 4], &[13, 14, 15, 0]);
}

#[test]
fn lost_device_triggers_exactly_one_reset_then_draws() {
    let (mut surface, gpu) = surface_with_gpu(Rect::of_size(1280, 720));
    surface
        .set_format(&VideoFormat::new(PixelFormat::Yuy2, 640, 480))
        .expect("set_format");

    gpu.set_lost(true);
    gpu.clear_ops();

    let buffer = yuy2_buffer(640, 480);
    let draw = surface.draw_frame(&buffer, false).expect("draw");
    assert_eq!(draw.outcome, DrawOutcome::Presented);

    assert_eq!(gpu.count(&RenderOp::Reset), 1);
    assert_eq!(gpu.count(&RenderOp::Present), 1);
    // The swap chain was rebuilt after the reset.
    assert_eq!(
        gpu.count(&RenderOp::CreateSwapChain {
            width: 640,
            height: 480
        }),
        1
    );
}

#[test]
fn failed_reset_returns_error_without_drawing() {
    let (mut surface, gpu) = surface_with_gpu(Rect::of_size(1280, 720));
    surface
        .set_format(&VideoFormat::new(PixelFormat::Yuy2, 640, 480))
        .expect("set_format");

    gpu.set_lost(true);
    gpu.set_fail_reset(true);
    gpu.set_fail_create_device(true);
    gpu.clear_ops();

    let buffer = yuy2_buffer(640, 480);
    let result = surface.draw_frame(&buffer, false);
    assert!(result.is_err());

    assert_eq!(gpu.count(&RenderOp::Reset), 1);
    assert_eq!(gpu.count(&RenderOp::LockBackBuffer), 0);
    assert_eq!(gpu.count(&RenderOp::Present), 0);
    // The source buffer still came back unlocked.
    assert!(buffer.is_unlocked());
}

#[test]
fn failed_buffer_lock_releases_and_skips_gpu() {
    let (mut surface, gpu) = surface_with_gpu(Rect::of_size(1280, 720));
    surface
        .set_format(&VideoFormat::new(PixelFormat::Yuy2, 640, 480))
        .expect("set_format");
    gpu.clear_ops();

    let buffer = MemoryFlatBuffer::failing(vec![0u8; 640 * 2 * 480]);
    let result = surface.draw_frame(&buffer, false);
    assert!(matches!(result, Err(CaptureError::ConversionFailure(_))));
    assert_eq!(gpu.count(&RenderOp::Present), 0);
}

#[test]
fn resize_recomputes_destination_rect_only() {
    let (mut surface, gpu) = surface_with_gpu(Rect::of_size(1280, 720));
    surface
        .set_format(&VideoFormat::new(PixelFormat::Yuy2, 640, 480))
        .expect("set_format");

    gpu.set_client_rect(Rect::of_size(800, 600));
    gpu.clear_ops();
    surface.resize().expect("resize");

    assert_eq!(surface.destination_rect(), Rect::of_size(800, 600));
    // Healthy device: no reset, no swap-chain churn.
    assert!(gpu.ops().is_empty());
}

#[test]
fn pixel_aspect_ratio_stretches_before_letterboxing() {
    let (mut surface, _gpu) = surface_with_gpu(Rect::of_size(720, 540));
    // 720x540 with wide 4:3 pixels corrects to 960x540.
    let format = VideoFormat::new(PixelFormat::Yuy2, 720, 540).with_pixel_aspect(4, 3);
    surface.set_format(&format).expect("set_format");

    let dest = surface.destination_rect();
    assert_eq!(dest, Rect::new(0, 67, 720, 405));
}

#[test]
fn snapshot_copy_matches_converted_frame() {
    let (mut surface, gpu) = surface_with_gpu(Rect::of_size(64, 64));
    surface
        .set_format(&VideoFormat::new(PixelFormat::Rgb32, 2, 2))
        .expect("set_format");

    let src = vec![
        10u8, 11, 12, 0, 20, 21, 22, 0, //
        30, 31, 32, 0, 40, 41, 42, 0,
    ];
    let buffer = MemoryFlatBuffer::new(src.clone());
    let draw = surface.draw_frame(&buffer, true).expect("draw");

    let snapshot = draw.snapshot.expect("snapshot requested");
    assert_eq!((snapshot.width, snapshot.height), (2, 2));
    assert_eq!(snapshot.bgra, src);
    assert_eq!(gpu.chain_pixels().expect("chain"), src);
}
