//! Capture session: the state machine that owns the device binding, the
//! read loop and the recording hand-off.
//!
//! All session state lives behind one exclusive lock. The reader's
//! completion callback, command methods (bind, record, resize, close)
//! and every touch of the presentation surface serialize on it, so
//! convert/draw/encode for a frame finishes before the next frame's
//! callback can begin. Flow control is single-credit: exactly one read
//! request is outstanding, and the next one is issued only after the
//! current frame is fully handled.

use crate::errors::CaptureError;
use crate::notify::NoticeSender;
use crate::render::{PresentationSurface, SnapshotImage, WindowHandle};
use crate::sink::{CodecId, OutputStreamFormat, RecordingSink, SinkFactory};
use crate::snapshot::{self, SnapshotFormat};
use crate::source::{
    CaptureDevice, ReadFlags, ReadStatus, ReaderCallback, Sample, SourceReader,
    FIRST_VIDEO_STREAM,
};
use crate::types::{Timestamp, VideoFormat};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Output bitrate is derived from frame area at this factor.
const BITRATE_PER_PIXEL: u32 = 20;

/// Observable session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    DeviceBound,
    Negotiating,
    Streaming,
    /// Streaming with an active recording sink.
    Capturing,
    Closing,
}

/// Host-side knobs that are fixed for the session's lifetime.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Directory snapshots are written into.
    pub snapshot_directory: PathBuf,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            snapshot_directory: PathBuf::from("."),
        }
    }
}

struct RecordingBinding {
    sink: Box<dyn RecordingSink>,
    stream: u32,
    awaiting_first_sample: bool,
    base_time: Timestamp,
}

struct SessionInner {
    state: SessionState,
    source: Option<Box<dyn crate::source::MediaSource>>,
    reader: Option<Box<dyn SourceReader>>,
    symbolic_name: Option<String>,
    surface: PresentationSurface,
    recording: Option<RecordingBinding>,
    pending_snapshot: Option<SnapshotFormat>,
}

/// One capture session: at most one bound device, one negotiated format
/// and one outstanding read at any time.
pub struct CaptureSession {
    // Handed to readers as the completion callback.
    weak_self: Weak<CaptureSession>,
    inner: Mutex<SessionInner>,
    sink_factory: Box<dyn SinkFactory>,
    notices: NoticeSender,
    options: SessionOptions,
}

impl CaptureSession {
    pub fn new(
        surface: PresentationSurface,
        sink_factory: Box<dyn SinkFactory>,
        notices: NoticeSender,
        options: SessionOptions,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak_self: weak.clone(),
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                source: None,
                reader: None,
                symbolic_name: None,
                surface,
                recording: None,
                pending_snapshot: None,
            }),
            sink_factory,
            notices,
            options,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().expect("session lock poisoned")
    }

    /// Establish the render device for the preview window. Idempotent.
    pub fn init_display(&self, window: WindowHandle) -> Result<(), CaptureError> {
        let mut inner = self.lock();
        inner.surface.create_device(window)
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_recording(&self) -> bool {
        self.lock().recording.is_some()
    }

    /// Bind a capture device and start the read loop.
    ///
    /// Closes any existing binding, activates the device, creates an
    /// asynchronous reader with this session as the completion callback,
    /// negotiates the native format maximizing (width, then frame rate)
    /// among formats the presentation surface can accept directly or the
    /// source can decode into an accepted format, and issues the first
    /// read. Any failure mid-sequence unwinds every partial resource and
    /// returns the session to idle.
    pub fn bind_device(&self, device: &dyn CaptureDevice) -> Result<VideoFormat, CaptureError> {
        let mut inner = self.lock();
        close_device_locked(&mut inner);

        let result = self.bind_device_locked(&mut inner, device);
        match &result {
            Ok(format) => {
                inner.state = SessionState::Streaming;
                log::info!(
                    "device bound: {} ({})",
                    device.descriptor().name,
                    format.announcement()
                );
                self.notices.format_announced(format.announcement());
            }
            Err(err) => {
                log::warn!("device bind failed: {err}");
                close_device_locked(&mut inner);
                inner.state = SessionState::Idle;
            }
        }
        result
    }

    fn bind_device_locked(
        &self,
        inner: &mut SessionInner,
        device: &dyn CaptureDevice,
    ) -> Result<VideoFormat, CaptureError> {
        let mut source = device.activate()?;
        inner.state = SessionState::DeviceBound;
        inner.symbolic_name = Some(device.descriptor().symbolic_name.clone());

        let callback: Arc<dyn ReaderCallback> = self
            .weak_self
            .upgrade()
            .ok_or_else(|| CaptureError::DeviceUnavailable("session dropped".to_string()))?;
        let mut reader = source.create_reader(callback)?;

        inner.state = SessionState::Negotiating;
        let negotiated = negotiate_format(reader.as_mut(), &inner.surface)?;
        inner.surface.set_format(&negotiated)?;

        reader.request_next_frame(FIRST_VIDEO_STREAM)?;

        inner.source = Some(source);
        inner.reader = Some(reader);
        Ok(negotiated)
    }

    /// Begin recording to `path`, encoding with `codec`.
    ///
    /// Fails with [`CaptureError::NoActiveDevice`] when no reader is
    /// bound. The output stream copies subtype, frame size, frame rate,
    /// pixel aspect ratio and interlace mode from the negotiated native
    /// type, with the bitrate derived from the frame area. The first
    /// frame seen after this call establishes the recording time origin.
    pub fn start_recording(&self, path: &Path, codec: CodecId) -> Result<(), CaptureError> {
        let mut inner = self.lock();
        if inner.reader.is_none() {
            return Err(CaptureError::NoActiveDevice);
        }
        stop_recording_locked(&mut inner)?;

        let native = inner
            .reader
            .as_ref()
            .expect("reader bound")
            .current_format(FIRST_VIDEO_STREAM)?;
        let bitrate = native.width * native.height * BITRATE_PER_PIXEL;
        let output = OutputStreamFormat::from_native(codec, bitrate, &native);

        let mut sink = self.sink_factory.create_sink(path)?;
        let stream = sink.add_stream(&output)?;
        sink.set_input_format(stream, &native)?;
        sink.begin_writing()?;

        inner.recording = Some(RecordingBinding {
            sink,
            stream,
            awaiting_first_sample: true,
            base_time: 0,
        });
        inner.state = SessionState::Capturing;
        log::info!("recording started: {}", path.display());
        Ok(())
    }

    /// Finalize and release the recording sink. No-op when not
    /// recording.
    pub fn stop_recording(&self) -> Result<(), CaptureError> {
        let mut inner = self.lock();
        stop_recording_locked(&mut inner)
    }

    /// Latch a snapshot request; the next drawn frame is saved in
    /// `format` under the configured snapshot directory.
    pub fn request_snapshot(&self, format: SnapshotFormat) {
        let mut inner = self.lock();
        inner.pending_snapshot = Some(format);
    }

    /// Track a preview window size change.
    pub fn resize(&self) -> Result<(), CaptureError> {
        let mut inner = self.lock();
        inner.surface.resize()
    }

    /// Whether a hot-plug removal for `symbolic_name` concerns this
    /// session's bound device. Comparison is case-insensitive.
    pub fn check_device_lost(&self, symbolic_name: &str) -> bool {
        let inner = self.lock();
        inner
            .symbolic_name
            .as_deref()
            .map(|bound| bound.eq_ignore_ascii_case(symbolic_name))
            .unwrap_or(false)
    }

    /// Stop recording and release the reader and device activation.
    /// Safe to call repeatedly; an in-flight frame handler finishes
    /// first (it holds the same lock), after which no further reads are
    /// requested.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.state = SessionState::Closing;
        close_device_locked(&mut inner);
        inner.state = SessionState::Idle;
    }

    fn handle_frame(
        &self,
        inner: &mut SessionInner,
        timestamp: Timestamp,
        sample: &dyn Sample,
    ) -> Result<(), CaptureError> {
        let want_snapshot = inner.pending_snapshot.is_some();
        let draw = {
            let buffer = sample.frame_buffer()?;
            inner.surface.draw_frame(buffer, want_snapshot)?
        };

        if let Some(image) = draw.snapshot {
            // Consumed: one request, one frame.
            let format = inner.pending_snapshot.take().expect("snapshot pending");
            self.spawn_snapshot(format, image);
        }

        if let Some(recording) = inner.recording.as_mut() {
            if recording.awaiting_first_sample {
                recording.base_time = timestamp;
                recording.awaiting_first_sample = false;
            }
            let rebased = timestamp - recording.base_time;
            if let Err(err) = recording
                .sink
                .write_sample(recording.stream, rebased, sample)
            {
                // A failed write stops the recording, not the preview.
                self.notices
                    .error(format!("recording stopped: {err}"), err.code());
                if let Some(mut binding) = inner.recording.take() {
                    let _ = binding.sink.finalize();
                }
                inner.state = SessionState::Streaming;
            }
        }

        Ok(())
    }

    fn spawn_snapshot(&self, format: SnapshotFormat, image: SnapshotImage) {
        let directory = self.options.snapshot_directory.clone();
        std::thread::spawn(move || {
            match snapshot::save_snapshot(&directory, format, &image) {
                Ok(path) => log::info!("snapshot saved: {}", path.display()),
                Err(err) => log::warn!("snapshot failed: {err}"),
            }
        });
    }
}

impl ReaderCallback for CaptureSession {
    /// Single entry point for read completions, serialized under the
    /// session lock.
    fn on_read_sample(
        &self,
        status: ReadStatus,
        stream: u32,
        _flags: ReadFlags,
        timestamp: Timestamp,
        sample: Option<Box<dyn Sample>>,
    ) {
        let mut inner = self.lock();
        if inner.state == SessionState::Closing || inner.reader.is_none() {
            return;
        }

        if let Err(err) = status {
            // Reader-level failure: surface once, stop the loop.
            self.notices
                .error(format!("capture read failed: {err}"), err.code());
            return;
        }

        if let Some(sample) = sample {
            if let Err(err) = self.handle_frame(&mut inner, timestamp, sample.as_ref()) {
                // Best-effort presentation: the frame is dropped, the
                // loop keeps running.
                log::warn!("frame dropped: {err}");
            }
        }

        if let Some(reader) = inner.reader.as_mut() {
            if let Err(err) = reader.request_next_frame(stream) {
                self.notices
                    .error(format!("failed to request next frame: {err}"), err.code());
            }
        }
    }
}

fn stop_recording_locked(inner: &mut SessionInner) -> Result<(), CaptureError> {
    if let Some(mut binding) = inner.recording.take() {
        if inner.state == SessionState::Capturing {
            inner.state = SessionState::Streaming;
        }
        binding.sink.finalize()?;
        log::info!("recording stopped");
    }
    Ok(())
}

fn close_device_locked(inner: &mut SessionInner) {
    if let Err(err) = stop_recording_locked(inner) {
        log::warn!("failed to finalize recording on close: {err}");
    }
    inner.reader = None;
    inner.source = None;
    inner.symbolic_name = None;
    inner.pending_snapshot = None;
}

/// Pick the best native format the presentation path can handle.
///
/// A native format is deliverable either directly (the engine converts
/// its subtype) or by asking the source to decode into one of the
/// engine's formats, tried in preference order. Among deliverable
/// candidates the widest wins, frame rate breaking ties. The winner is
/// set on the reader definitively before the first read.
fn negotiate_format(
    reader: &mut dyn SourceReader,
    surface: &PresentationSurface,
) -> Result<VideoFormat, CaptureError> {
    let natives = reader.native_formats(FIRST_VIDEO_STREAM)?;

    let mut best: Option<(u32, f64, VideoFormat)> = None;
    for native in &natives {
        let deliverable = if surface.is_format_supported(native.subtype) {
            Some(native.clone())
        } else {
            resolve_decode_target(reader, native, surface)
        };
        let Some(deliverable) = deliverable else {
            log::debug!("skipping {}: no conversion path", native.subtype);
            continue;
        };

        let better = match &best {
            None => true,
            Some((width, fps, _)) => {
                native.width > *width || (native.width == *width && native.fps() > *fps)
            }
        };
        if better {
            best = Some((native.width, native.fps(), deliverable));
        }
    }

    let (_, _, chosen) = best.ok_or_else(|| {
        CaptureError::DeviceUnavailable("no native format can be presented".to_string())
    })?;
    reader.set_current_format(FIRST_VIDEO_STREAM, &chosen)?;
    Ok(chosen)
}

fn resolve_decode_target(
    reader: &mut dyn SourceReader,
    native: &VideoFormat,
    surface: &PresentationSurface,
) -> Option<VideoFormat> {
    let mut index = 0;
    while let Some(subtype) = surface.decode_target(index) {
        let mut candidate = native.clone();
        candidate.subtype = subtype;
        // The decoded layout has its own stride; derive it at format-set.
        candidate.default_stride = None;
        if reader
            .set_current_format(FIRST_VIDEO_STREAM, &candidate)
            .is_ok()
        {
            return Some(candidate);
        }
        index += 1;
    }
    None
}
