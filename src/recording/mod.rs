//! MP4/H.264 recording sink, available with the `recording` feature.
//!
//! Implements [`crate::sink::RecordingSink`] by converting incoming
//! native frames to BGRX with the conversion engine, encoding with
//! openh264 and muxing into MP4 with muxide.

mod encoder;
mod mp4_sink;

pub use encoder::{EncodedFrame, H264Encoder};
pub use mp4_sink::{Mp4Sink, Mp4SinkFactory};
