//! Viewfinder: a live video capture pipeline
//!
//! This crate drives a capture device end to end: frames are pulled
//! asynchronously from a hardware source, converted from device-native
//! pixel formats into 32-bit BGRX, presented through a double-buffered
//! swap chain with aspect-correct letterboxing, and optionally teed
//! into an MP4 recording or a still snapshot.
//!
//! # Architecture
//! - [`convert`] - pure scanline converters (RGB32/RGB24/YUY2/NV12)
//! - [`buffer`] - scoped locking over planar and flat frame buffers
//! - [`render`] - presentation surface over a pluggable GPU backend
//! - [`session`] - the capture state machine and single-credit read loop
//! - [`monitor`] - device hot-plug filtering and polling
//! - [`recording`] - MP4/H.264 sink (with the `recording` feature)
//!
//! The capture device, GPU backend and recording sink are collaborators
//! behind traits in [`source`], [`render`] and [`sink`]; scripted
//! implementations for tests live in [`testing`].
//!
//! # Usage
//! ```rust,no_run
//! use std::sync::Arc;
//! use viewfinder::notify::NotificationHub;
//! use viewfinder::render::{PresentationSurface, WindowHandle};
//! use viewfinder::session::{CaptureSession, SessionOptions};
//! use viewfinder::testing::{FakeDevice, MemorySinkFactory, MockGpu};
//! use viewfinder::types::{PixelFormat, Rect, VideoFormat};
//!
//! let gpu = MockGpu::new(Rect::of_size(1280, 720));
//! let hub = NotificationHub::new();
//! let session = CaptureSession::new(
//!     PresentationSurface::new(gpu.backend()),
//!     Box::new(MemorySinkFactory::new()),
//!     hub.sender(),
//!     SessionOptions::default(),
//! );
//! session.init_display(WindowHandle(0)).unwrap();
//!
//! let device = FakeDevice::new(
//!     "Integrated Webcam",
//!     r"\\?\usb#vid_0001",
//!     vec![VideoFormat::new(PixelFormat::Yuy2, 1920, 1080)],
//! );
//! let format = session.bind_device(&device).unwrap();
//! assert_eq!(format.announcement(), "1920x1080 @ 30fps");
//! ```

pub mod buffer;
pub mod config;
pub mod convert;
pub mod errors;
pub mod monitor;
pub mod notify;
pub mod render;
pub mod session;
pub mod sink;
pub mod snapshot;
pub mod source;
pub mod types;

#[cfg(feature = "recording")]
pub mod recording;

// Testing utilities - scripted collaborators for offline testing
pub mod testing;

// Re-exports for convenience
pub use errors::CaptureError;
pub use render::{DrawOutcome, PresentationSurface, WindowHandle};
pub use session::{CaptureSession, SessionOptions, SessionState};
pub use types::{DeviceDescriptor, PixelFormat, Ratio, Rect, Timestamp, VideoFormat};

/// Initialize logging for the capture pipeline.
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "viewfinder=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_metadata() {
        assert_eq!(NAME, "viewfinder");
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
