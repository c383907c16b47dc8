//! Recording sink seam.
//!
//! A sink accepts one encoded stream per recording: the session adds a
//! stream with a target format, declares the native input format,
//! begins writing, then feeds `(rebased timestamp, sample)` pairs until
//! finalize. Codec internals are the sink's business; a concrete
//! MP4/H.264 sink ships behind the `recording` feature.

use crate::errors::CaptureError;
use crate::source::Sample;
use crate::types::{InterlaceMode, Ratio, Timestamp, VideoFormat};
use std::path::Path;

/// Target codec for a recording stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    H264,
    Hevc,
}

/// Target format of one sink stream: the codec plus the attributes
/// copied from the negotiated native type.
#[derive(Debug, Clone)]
pub struct OutputStreamFormat {
    pub codec: CodecId,
    pub bitrate: u32,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Ratio,
    pub pixel_aspect: Ratio,
    pub interlace: InterlaceMode,
}

impl OutputStreamFormat {
    /// Build the output format for `native`, copying frame size, frame
    /// rate, pixel aspect ratio and interlace mode across.
    pub fn from_native(codec: CodecId, bitrate: u32, native: &VideoFormat) -> Self {
        Self {
            codec,
            bitrate,
            width: native.width,
            height: native.height,
            frame_rate: native.frame_rate,
            pixel_aspect: native.pixel_aspect,
            interlace: native.interlace,
        }
    }
}

/// A recording sink bound to one output container.
pub trait RecordingSink: Send {
    /// Add an output stream; returns the stream index for writes.
    fn add_stream(&mut self, output: &OutputStreamFormat) -> Result<u32, CaptureError>;

    /// Declare the native format samples for `stream` will arrive in.
    fn set_input_format(&mut self, stream: u32, input: &VideoFormat) -> Result<(), CaptureError>;

    /// Start accepting samples. Called once, after streams are set up.
    fn begin_writing(&mut self) -> Result<(), CaptureError>;

    /// Write one sample. `timestamp` has already been rebased so the
    /// recording's clock starts at zero.
    fn write_sample(
        &mut self,
        stream: u32,
        timestamp: Timestamp,
        sample: &dyn Sample,
    ) -> Result<(), CaptureError>;

    /// Flush and close the container. The sink is unusable afterwards.
    fn finalize(&mut self) -> Result<(), CaptureError>;
}

/// Creates sinks against target paths. Owned by the session so
/// `start_recording` can build a sink on demand.
pub trait SinkFactory: Send + Sync {
    fn create_sink(&self, path: &Path) -> Result<Box<dyn RecordingSink>, CaptureError>;
}
