//! Media capture source seam.
//!
//! The capture device is an opaque asynchronous collaborator: once a
//! reader exists, frames arrive through [`ReaderCallback`] on a thread
//! the source owns, and the next frame is delivered only after
//! [`SourceReader::request_next_frame`] — a single-credit pull protocol,
//! not a push stream.

use crate::buffer::FrameBuffer;
use crate::errors::CaptureError;
use crate::types::{DeviceDescriptor, Timestamp, VideoFormat};
use std::sync::Arc;

/// The only stream this crate reads; multi-stream sessions are out of
/// scope.
pub const FIRST_VIDEO_STREAM: u32 = 0;

/// Status a read completion carries.
pub type ReadStatus = Result<(), CaptureError>;

/// Delivery flags accompanying a read completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadFlags {
    pub end_of_stream: bool,
    pub format_changed: bool,
}

/// A delivered media sample. The frame buffer it exposes is borrowed
/// and must be locked through [`crate::buffer::BufferLock`] before any
/// pixel access.
pub trait Sample: Send {
    fn frame_buffer(&self) -> Result<&dyn FrameBuffer, CaptureError>;
}

/// Completion callback a reader invokes for every finished read.
pub trait ReaderCallback: Send + Sync {
    fn on_read_sample(
        &self,
        status: ReadStatus,
        stream: u32,
        flags: ReadFlags,
        timestamp: Timestamp,
        sample: Option<Box<dyn Sample>>,
    );
}

/// Asynchronous reader over an activated media source.
pub trait SourceReader: Send {
    /// The formats the device can deliver natively, in device order.
    fn native_formats(&mut self, stream: u32) -> Result<Vec<VideoFormat>, CaptureError>;

    /// Ask the source to deliver `format`. Fails when the source cannot
    /// produce or decode to it; other candidates may still succeed.
    fn set_current_format(&mut self, stream: u32, format: &VideoFormat)
        -> Result<(), CaptureError>;

    /// The format the source currently delivers.
    fn current_format(&self, stream: u32) -> Result<VideoFormat, CaptureError>;

    /// Issue one asynchronous read. Completion arrives on the callback
    /// registered at reader creation.
    fn request_next_frame(&mut self, stream: u32) -> Result<(), CaptureError>;
}

/// An activated media source, ready to hand out one reader.
pub trait MediaSource: Send {
    fn create_reader(
        &mut self,
        callback: Arc<dyn ReaderCallback>,
    ) -> Result<Box<dyn SourceReader>, CaptureError>;
}

/// A capture device resolved from platform enumeration. Activation may
/// fail at any time (device unplugged, in use elsewhere).
pub trait CaptureDevice {
    fn descriptor(&self) -> &DeviceDescriptor;

    fn activate(&self) -> Result<Box<dyn MediaSource>, CaptureError>;
}

/// Enumerates currently-present capture devices, for the polling device
/// monitor.
pub trait DeviceEnumerator: Send + Sync {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, CaptureError>;
}
