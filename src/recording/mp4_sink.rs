//! MP4 recording sink over openh264 + muxide.

use crate::buffer::BufferLock;
use crate::convert::{self, ConvertFn};
use crate::errors::CaptureError;
use crate::recording::encoder::H264Encoder;
use crate::sink::{CodecId, OutputStreamFormat, RecordingSink, SinkFactory};
use crate::source::Sample;
use crate::types::{Timestamp, VideoFormat};
use muxide::api::{Metadata, Muxer, MuxerBuilder, VideoCodec};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Creates [`Mp4Sink`]s. Hand one to
/// [`crate::session::CaptureSession::new`] to record through the
/// default MP4 path.
pub struct Mp4SinkFactory {
    fast_start: bool,
}

impl Mp4SinkFactory {
    pub fn new() -> Self {
        Self { fast_start: true }
    }

    /// Toggle fast-start layout (moov before mdat) for web playback.
    pub fn with_fast_start(mut self, fast_start: bool) -> Self {
        self.fast_start = fast_start;
        self
    }
}

impl Default for Mp4SinkFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkFactory for Mp4SinkFactory {
    fn create_sink(&self, path: &Path) -> Result<Box<dyn RecordingSink>, CaptureError> {
        Ok(Box::new(Mp4Sink::new(path, self.fast_start)))
    }
}

struct InputBinding {
    format: VideoFormat,
    convert_fn: ConvertFn,
    stride: isize,
}

/// One-stream MP4/H.264 sink. Native frames are converted to BGRX with
/// the conversion engine, encoded, and muxed with the rebased timestamp
/// as presentation time.
pub struct Mp4Sink {
    path: PathBuf,
    fast_start: bool,
    output: Option<OutputStreamFormat>,
    input: Option<InputBinding>,
    encoder: Option<H264Encoder>,
    muxer: Option<Muxer<BufWriter<File>>>,
    scratch: Vec<u8>,
}

impl Mp4Sink {
    fn new(path: &Path, fast_start: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            fast_start,
            output: None,
            input: None,
            encoder: None,
            muxer: None,
            scratch: Vec::new(),
        }
    }
}

impl RecordingSink for Mp4Sink {
    fn add_stream(&mut self, output: &OutputStreamFormat) -> Result<u32, CaptureError> {
        if output.codec != CodecId::H264 {
            return Err(CaptureError::RecordingSinkFailure(format!(
                "unsupported codec {:?}, only H264 is available",
                output.codec
            )));
        }
        if self.output.is_some() {
            return Err(CaptureError::RecordingSinkFailure(
                "sink supports a single stream".to_string(),
            ));
        }
        self.output = Some(output.clone());
        Ok(0)
    }

    fn set_input_format(&mut self, _stream: u32, input: &VideoFormat) -> Result<(), CaptureError> {
        let convert_fn = convert::conversion_for(input.subtype).map_err(|e| {
            CaptureError::RecordingSinkFailure(format!(
                "cannot encode from {}: {e}",
                input.subtype
            ))
        })?;
        let stride = input
            .default_stride
            .or_else(|| input.subtype.default_stride(input.width))
            .ok_or_else(|| {
                CaptureError::RecordingSinkFailure(format!(
                    "no stride for input format {}",
                    input.subtype
                ))
            })?;

        self.input = Some(InputBinding {
            format: input.clone(),
            convert_fn,
            stride,
        });
        Ok(())
    }

    fn begin_writing(&mut self) -> Result<(), CaptureError> {
        let output = self.output.as_ref().ok_or_else(|| {
            CaptureError::RecordingSinkFailure("no stream added before begin".to_string())
        })?;
        if self.input.is_none() {
            return Err(CaptureError::RecordingSinkFailure(
                "no input format declared before begin".to_string(),
            ));
        }

        let file = File::create(&self.path)?;
        let writer = BufWriter::new(file);

        self.encoder = Some(H264Encoder::new(output.width, output.height, output.bitrate)?);

        let muxer = MuxerBuilder::new(writer)
            .video(
                VideoCodec::H264,
                output.width,
                output.height,
                output.frame_rate.as_f64(),
            )
            .with_fast_start(self.fast_start)
            .with_metadata(Metadata::new().with_current_time())
            .build()
            .map_err(|e| {
                CaptureError::RecordingSinkFailure(format!("failed to create muxer: {e}"))
            })?;
        self.muxer = Some(muxer);

        log::info!("mp4 sink writing to {}", self.path.display());
        Ok(())
    }

    fn write_sample(
        &mut self,
        _stream: u32,
        timestamp: Timestamp,
        sample: &dyn Sample,
    ) -> Result<(), CaptureError> {
        let input = self.input.as_ref().ok_or_else(|| {
            CaptureError::RecordingSinkFailure("write before begin".to_string())
        })?;
        if self.muxer.is_none() {
            return Err(CaptureError::RecordingSinkFailure(
                "write before begin".to_string(),
            ));
        }

        let width = input.format.width as usize;
        let height = input.format.height as usize;
        self.scratch.resize(width * height * 4, 0);

        {
            let buffer = sample.frame_buffer()?;
            let mut lock = BufferLock::new(buffer);
            let scan = lock.lock(input.stride, height)?;
            unsafe {
                (input.convert_fn)(
                    self.scratch.as_mut_ptr(),
                    (width * 4) as isize,
                    scan.scanline0,
                    scan.stride,
                    width,
                    height,
                );
            }
        }

        let encoder = self.encoder.as_mut().expect("encoder created at begin");
        let encoded = encoder.encode_bgra(&self.scratch)?;
        if encoded.data.is_empty() {
            return Ok(());
        }

        let pts = timestamp as f64 / 10_000_000.0;
        self.muxer
            .as_mut()
            .expect("muxer created at begin")
            .write_video(pts, &encoded.data, encoded.is_keyframe)
            .map_err(|e| {
                CaptureError::RecordingSinkFailure(format!("failed to write frame: {e}"))
            })?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), CaptureError> {
        if let Some(muxer) = self.muxer.take() {
            let stats = muxer.finish_with_stats().map_err(|e| {
                CaptureError::RecordingSinkFailure(format!("failed to finalize: {e}"))
            })?;
            log::info!(
                "recording finalized: {} frames, {} bytes, {:.1}s",
                stats.video_frames,
                stats.bytes_written,
                stats.duration_secs
            );
        }
        self.encoder = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{synthetic_yuy2_frame, TestSample};
    use crate::types::PixelFormat;

    fn output_format(native: &VideoFormat) -> OutputStreamFormat {
        OutputStreamFormat::from_native(
            CodecId::H264,
            native.width * native.height * 20,
            native,
        )
    }

    #[test]
    fn test_rejects_non_h264() {
        let dir = tempfile::tempdir().expect("tempdir");
        let native = VideoFormat::new(PixelFormat::Yuy2, 320, 240);
        let mut sink = Mp4Sink::new(&dir.path().join("out.mp4"), true);

        let mut output = output_format(&native);
        output.codec = CodecId::Hevc;
        assert!(matches!(
            sink.add_stream(&output),
            Err(CaptureError::RecordingSinkFailure(_))
        ));
    }

    #[test]
    fn test_rejects_unconvertible_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = Mp4Sink::new(&dir.path().join("out.mp4"), true);
        let native = VideoFormat::new(PixelFormat::Mjpeg, 320, 240);
        assert!(matches!(
            sink.set_input_format(0, &native),
            Err(CaptureError::RecordingSinkFailure(_))
        ));
    }

    #[test]
    fn test_records_yuy2_frames_to_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("recording.mp4");
        let native = VideoFormat::new(PixelFormat::Yuy2, 320, 240).with_frame_rate(30, 1);

        let mut sink = Mp4Sink::new(&path, true);
        let stream = sink.add_stream(&output_format(&native)).expect("stream");
        sink.set_input_format(stream, &native).expect("input");
        sink.begin_writing().expect("begin");

        for frame in 0..10u64 {
            let sample = TestSample::planar(synthetic_yuy2_frame(frame, 320, 240), 320 * 2);
            let pts = frame as Timestamp * 333_333;
            sink.write_sample(stream, pts, &sample).expect("write");
        }
        sink.finalize().expect("finalize");

        let metadata = std::fs::metadata(&path).expect("file exists");
        assert!(metadata.len() > 0, "file should have content");
    }

    #[test]
    fn test_write_before_begin_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = Mp4Sink::new(&dir.path().join("out.mp4"), true);
        let sample = TestSample::flat(vec![0u8; 64]);
        assert!(matches!(
            sink.write_sample(0, 0, &sample),
            Err(CaptureError::RecordingSinkFailure(_))
        ));
    }
}
