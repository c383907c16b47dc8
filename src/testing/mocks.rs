//! Scripted collaborators: memory frame buffers, a recording GPU mock,
//! a fake capture device and an in-memory recording sink.

use crate::buffer::{FlatRegion, FrameBuffer, Scanlines};
use crate::errors::CaptureError;
use crate::render::{LockedRegion, RenderBackend, RenderDevice, SwapChain, WindowHandle};
use crate::sink::{OutputStreamFormat, RecordingSink, SinkFactory};
use crate::source::{
    CaptureDevice, MediaSource, ReadFlags, ReaderCallback, Sample, SourceReader,
    FIRST_VIDEO_STREAM,
};
use crate::types::{DeviceDescriptor, PixelFormat, Rect, Timestamp, VideoFormat};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared ordered record of notable mock events ("draw", "write",
/// "request"), for asserting cross-collaborator ordering.
#[derive(Clone, Default)]
pub struct EventTrace {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().expect("lock poisoned").push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("lock poisoned").clone()
    }
}

// ---------------------------------------------------------------------
// Frame buffers
// ---------------------------------------------------------------------

#[derive(Default)]
struct LockStats {
    locked: bool,
    unlock_count: usize,
}

/// A frame buffer with direct 2D addressing.
pub struct Memory2dBuffer {
    data: Vec<u8>,
    stride: isize,
    stats: Mutex<LockStats>,
}

impl Memory2dBuffer {
    pub fn new(data: Vec<u8>, stride: isize) -> Self {
        Self {
            data,
            stride,
            stats: Mutex::new(LockStats::default()),
        }
    }

    pub fn is_unlocked(&self) -> bool {
        !self.stats.lock().expect("lock poisoned").locked
    }

    pub fn unlock_count(&self) -> usize {
        self.stats.lock().expect("lock poisoned").unlock_count
    }
}

impl FrameBuffer for Memory2dBuffer {
    fn supports_2d(&self) -> bool {
        true
    }

    fn lock_2d(&self) -> Result<Scanlines, CaptureError> {
        let mut stats = self.stats.lock().expect("lock poisoned");
        assert!(!stats.locked, "buffer locked twice");
        stats.locked = true;
        Ok(Scanlines {
            scanline0: self.data.as_ptr(),
            stride: self.stride,
        })
    }

    fn unlock_2d(&self) {
        let mut stats = self.stats.lock().expect("lock poisoned");
        stats.locked = false;
        stats.unlock_count += 1;
    }

    fn lock(&self) -> Result<FlatRegion, CaptureError> {
        unreachable!("2D buffers are locked through lock_2d")
    }

    fn unlock(&self) {
        unreachable!("2D buffers are unlocked through unlock_2d")
    }
}

/// A flat frame buffer with no intrinsic row layout.
pub struct MemoryFlatBuffer {
    data: Vec<u8>,
    fail_lock: bool,
    stats: Mutex<LockStats>,
}

impl MemoryFlatBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            fail_lock: false,
            stats: Mutex::new(LockStats::default()),
        }
    }

    /// A buffer whose lock always fails, for failure-path tests.
    pub fn failing(data: Vec<u8>) -> Self {
        Self {
            fail_lock: true,
            ..Self::new(data)
        }
    }

    pub fn base_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    pub fn is_unlocked(&self) -> bool {
        !self.stats.lock().expect("lock poisoned").locked
    }

    pub fn unlock_count(&self) -> usize {
        self.stats.lock().expect("lock poisoned").unlock_count
    }
}

impl FrameBuffer for MemoryFlatBuffer {
    fn supports_2d(&self) -> bool {
        false
    }

    fn lock_2d(&self) -> Result<Scanlines, CaptureError> {
        unreachable!("flat buffers are locked through lock")
    }

    fn unlock_2d(&self) {
        unreachable!("flat buffers are unlocked through unlock")
    }

    fn lock(&self) -> Result<FlatRegion, CaptureError> {
        if self.fail_lock {
            return Err(CaptureError::ConversionFailure(
                "scripted lock failure".to_string(),
            ));
        }
        let mut stats = self.stats.lock().expect("lock poisoned");
        assert!(!stats.locked, "buffer locked twice");
        stats.locked = true;
        Ok(FlatRegion {
            data: self.data.as_ptr(),
            len: self.data.len(),
        })
    }

    fn unlock(&self) {
        let mut stats = self.stats.lock().expect("lock poisoned");
        stats.locked = false;
        stats.unlock_count += 1;
    }
}

/// A sample wrapping an owned frame buffer.
pub struct TestSample {
    buffer: Box<dyn FrameBuffer + Send + Sync>,
    broken: bool,
}

impl TestSample {
    pub fn flat(data: Vec<u8>) -> Self {
        Self {
            buffer: Box::new(MemoryFlatBuffer::new(data)),
            broken: false,
        }
    }

    pub fn planar(data: Vec<u8>, stride: isize) -> Self {
        Self {
            buffer: Box::new(Memory2dBuffer::new(data, stride)),
            broken: false,
        }
    }

    /// A sample whose buffer cannot be locked.
    pub fn failing(len: usize) -> Self {
        Self {
            buffer: Box::new(MemoryFlatBuffer::failing(vec![0u8; len])),
            broken: false,
        }
    }

    /// A sample that refuses to expose a buffer at all.
    pub fn broken() -> Self {
        Self {
            buffer: Box::new(MemoryFlatBuffer::new(Vec::new())),
            broken: true,
        }
    }
}

impl Sample for TestSample {
    fn frame_buffer(&self) -> Result<&dyn FrameBuffer, CaptureError> {
        if self.broken {
            return Err(CaptureError::ConversionFailure(
                "sample carries no buffer".to_string(),
            ));
        }
        Ok(self.buffer.as_ref())
    }
}

// ---------------------------------------------------------------------
// GPU mock
// ---------------------------------------------------------------------

/// One recorded backend/device operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOp {
    CreateDevice,
    CreateSwapChain { width: u32, height: u32 },
    Reset,
    LockBackBuffer,
    UnlockBackBuffer,
    ColorFill,
    Blit { src: Rect, dst: Rect },
    Present,
}

#[derive(Default)]
struct GpuShared {
    ops: Vec<RenderOp>,
    lost: bool,
    fail_reset: bool,
    fail_create_device: bool,
    client: Rect,
    chain_pixels: Option<Arc<Mutex<Vec<u8>>>>,
    trace: Option<EventTrace>,
}

/// Handle to a scripted GPU backend: records operations, injects device
/// loss and reset/create failures, exposes the converted back buffer.
#[derive(Clone)]
pub struct MockGpu {
    shared: Arc<Mutex<GpuShared>>,
}

impl MockGpu {
    pub fn new(client: Rect) -> Self {
        Self {
            shared: Arc::new(Mutex::new(GpuShared {
                client,
                ..GpuShared::default()
            })),
        }
    }

    pub fn backend(&self) -> Box<dyn RenderBackend> {
        Box::new(MockBackend {
            shared: Arc::clone(&self.shared),
        })
    }

    pub fn set_trace(&self, trace: EventTrace) {
        self.shared.lock().expect("lock poisoned").trace = Some(trace);
    }

    pub fn ops(&self) -> Vec<RenderOp> {
        self.shared.lock().expect("lock poisoned").ops.clone()
    }

    pub fn clear_ops(&self) {
        self.shared.lock().expect("lock poisoned").ops.clear();
    }

    pub fn count(&self, op: &RenderOp) -> usize {
        self.ops().iter().filter(|o| *o == op).count()
    }

    pub fn set_lost(&self, lost: bool) {
        self.shared.lock().expect("lock poisoned").lost = lost;
    }

    pub fn set_fail_reset(&self, fail: bool) {
        self.shared.lock().expect("lock poisoned").fail_reset = fail;
    }

    pub fn set_fail_create_device(&self, fail: bool) {
        self.shared.lock().expect("lock poisoned").fail_create_device = fail;
    }

    pub fn set_client_rect(&self, client: Rect) {
        self.shared.lock().expect("lock poisoned").client = client;
    }

    /// Copy of the most recent swap chain's pixel storage.
    pub fn chain_pixels(&self) -> Option<Vec<u8>> {
        let shared = self.shared.lock().expect("lock poisoned");
        shared
            .chain_pixels
            .as_ref()
            .map(|p| p.lock().expect("lock poisoned").clone())
    }

    fn record(&self, op: RenderOp) {
        self.shared.lock().expect("lock poisoned").ops.push(op);
    }
}

struct MockBackend {
    shared: Arc<Mutex<GpuShared>>,
}

impl RenderBackend for MockBackend {
    fn create_device(
        &mut self,
        _window: WindowHandle,
    ) -> Result<Box<dyn RenderDevice>, CaptureError> {
        let mut shared = self.shared.lock().expect("lock poisoned");
        shared.ops.push(RenderOp::CreateDevice);
        if shared.fail_create_device {
            return Err(CaptureError::DeviceUnavailable(
                "scripted device-create failure".to_string(),
            ));
        }
        drop(shared);
        Ok(Box::new(MockDevice {
            gpu: MockGpu {
                shared: Arc::clone(&self.shared),
            },
        }))
    }
}

struct MockDevice {
    gpu: MockGpu,
}

impl RenderDevice for MockDevice {
    fn client_rect(&self) -> Rect {
        self.gpu.shared.lock().expect("lock poisoned").client
    }

    fn test_lost(&self) -> Result<(), CaptureError> {
        if self.gpu.shared.lock().expect("lock poisoned").lost {
            Err(CaptureError::DeviceLost)
        } else {
            Ok(())
        }
    }

    fn reset(&mut self) -> Result<(), CaptureError> {
        let mut shared = self.gpu.shared.lock().expect("lock poisoned");
        shared.ops.push(RenderOp::Reset);
        if shared.fail_reset {
            return Err(CaptureError::DeviceLost);
        }
        shared.lost = false;
        Ok(())
    }

    fn create_swap_chain(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn SwapChain>, CaptureError> {
        let pixels = Arc::new(Mutex::new(vec![0u8; (width * height * 4) as usize]));
        let mut shared = self.gpu.shared.lock().expect("lock poisoned");
        shared.ops.push(RenderOp::CreateSwapChain { width, height });
        shared.chain_pixels = Some(Arc::clone(&pixels));
        Ok(Box::new(MockSwapChain {
            width,
            height,
            pixels,
            gpu: self.gpu.clone(),
        }))
    }

    fn color_fill(&mut self, _color: [u8; 4]) -> Result<(), CaptureError> {
        self.gpu.record(RenderOp::ColorFill);
        Ok(())
    }

    fn stretch_blit(
        &mut self,
        _chain: &dyn SwapChain,
        src: Rect,
        dst: Rect,
    ) -> Result<(), CaptureError> {
        self.gpu.record(RenderOp::Blit { src, dst });
        Ok(())
    }

    fn present(&mut self) -> Result<(), CaptureError> {
        let shared = self.gpu.shared.lock().expect("lock poisoned");
        if let Some(trace) = &shared.trace {
            trace.push("present");
        }
        drop(shared);
        self.gpu.record(RenderOp::Present);
        Ok(())
    }
}

struct MockSwapChain {
    width: u32,
    height: u32,
    pixels: Arc<Mutex<Vec<u8>>>,
    gpu: MockGpu,
}

impl SwapChain for MockSwapChain {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn lock_back_buffer(&mut self) -> Result<LockedRegion, CaptureError> {
        self.gpu.record(RenderOp::LockBackBuffer);
        // The vec is never resized, so the pointer stays valid between
        // lock and unlock.
        let mut pixels = self.pixels.lock().expect("lock poisoned");
        Ok(LockedRegion {
            data: pixels.as_mut_ptr(),
            pitch: self.width as isize * 4,
        })
    }

    fn unlock_back_buffer(&mut self) {
        self.gpu.record(RenderOp::UnlockBackBuffer);
    }
}

// ---------------------------------------------------------------------
// Capture source fakes
// ---------------------------------------------------------------------

/// Observation/driving handle for a [`FakeDevice`]'s reader: the test
/// plays the role of the device's delivery thread through `deliver`.
pub struct SourceProbe {
    callback: Mutex<Option<Arc<dyn ReaderCallback>>>,
    read_requests: AtomicUsize,
    fail_request: AtomicBool,
    current_format: Mutex<Option<VideoFormat>>,
    set_format_attempts: Mutex<Vec<PixelFormat>>,
    trace: Mutex<Option<EventTrace>>,
}

impl SourceProbe {
    fn new() -> Self {
        Self {
            callback: Mutex::new(None),
            read_requests: AtomicUsize::new(0),
            fail_request: AtomicBool::new(false),
            current_format: Mutex::new(None),
            set_format_attempts: Mutex::new(Vec::new()),
            trace: Mutex::new(None),
        }
    }

    pub fn set_trace(&self, trace: EventTrace) {
        *self.trace.lock().expect("lock poisoned") = Some(trace);
    }

    pub fn read_requests(&self) -> usize {
        self.read_requests.load(Ordering::SeqCst)
    }

    pub fn fail_next_requests(&self, fail: bool) {
        self.fail_request.store(fail, Ordering::SeqCst);
    }

    pub fn current_format(&self) -> Option<VideoFormat> {
        self.current_format.lock().expect("lock poisoned").clone()
    }

    /// Every subtype the session probed via `set_current_format`.
    pub fn format_attempts(&self) -> Vec<PixelFormat> {
        self.set_format_attempts
            .lock()
            .expect("lock poisoned")
            .clone()
    }

    pub fn has_callback(&self) -> bool {
        self.callback.lock().expect("lock poisoned").is_some()
    }

    /// Deliver one successful read completion, as the device would.
    pub fn deliver(&self, timestamp: Timestamp, sample: Box<dyn Sample>) {
        let callback = self
            .callback
            .lock()
            .expect("lock poisoned")
            .clone()
            .expect("no reader callback registered");
        callback.on_read_sample(
            Ok(()),
            FIRST_VIDEO_STREAM,
            ReadFlags::default(),
            timestamp,
            Some(sample),
        );
    }

    /// Deliver a failed read completion.
    pub fn deliver_error(&self, error: CaptureError) {
        let callback = self
            .callback
            .lock()
            .expect("lock poisoned")
            .clone()
            .expect("no reader callback registered");
        callback.on_read_sample(
            Err(error),
            FIRST_VIDEO_STREAM,
            ReadFlags::default(),
            0,
            None,
        );
    }
}

/// A scripted capture device with a fixed native format list.
pub struct FakeDevice {
    descriptor: DeviceDescriptor,
    formats: Vec<VideoFormat>,
    /// Subtypes the source can decode into on request.
    decodable: Vec<PixelFormat>,
    fail_activate: bool,
    probe: Arc<SourceProbe>,
}

impl FakeDevice {
    pub fn new(
        name: impl Into<String>,
        symbolic_name: impl Into<String>,
        formats: Vec<VideoFormat>,
    ) -> Self {
        Self {
            descriptor: DeviceDescriptor::new(name, symbolic_name),
            formats,
            decodable: Vec::new(),
            fail_activate: false,
            probe: Arc::new(SourceProbe::new()),
        }
    }

    /// Let the source accept decode requests into these subtypes.
    pub fn with_decodable(mut self, subtypes: Vec<PixelFormat>) -> Self {
        self.decodable = subtypes;
        self
    }

    pub fn failing_activation(mut self) -> Self {
        self.fail_activate = true;
        self
    }

    pub fn probe(&self) -> Arc<SourceProbe> {
        Arc::clone(&self.probe)
    }
}

impl CaptureDevice for FakeDevice {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn activate(&self) -> Result<Box<dyn MediaSource>, CaptureError> {
        if self.fail_activate {
            return Err(CaptureError::DeviceUnavailable(
                "scripted activation failure".to_string(),
            ));
        }
        Ok(Box::new(FakeSource {
            formats: self.formats.clone(),
            decodable: self.decodable.clone(),
            probe: Arc::clone(&self.probe),
        }))
    }
}

struct FakeSource {
    formats: Vec<VideoFormat>,
    decodable: Vec<PixelFormat>,
    probe: Arc<SourceProbe>,
}

impl MediaSource for FakeSource {
    fn create_reader(
        &mut self,
        callback: Arc<dyn ReaderCallback>,
    ) -> Result<Box<dyn SourceReader>, CaptureError> {
        *self.probe.callback.lock().expect("lock poisoned") = Some(callback);
        Ok(Box::new(FakeReader {
            formats: self.formats.clone(),
            decodable: self.decodable.clone(),
            probe: Arc::clone(&self.probe),
        }))
    }
}

struct FakeReader {
    formats: Vec<VideoFormat>,
    decodable: Vec<PixelFormat>,
    probe: Arc<SourceProbe>,
}

impl SourceReader for FakeReader {
    fn native_formats(&mut self, _stream: u32) -> Result<Vec<VideoFormat>, CaptureError> {
        Ok(self.formats.clone())
    }

    fn set_current_format(
        &mut self,
        _stream: u32,
        format: &VideoFormat,
    ) -> Result<(), CaptureError> {
        self.probe
            .set_format_attempts
            .lock()
            .expect("lock poisoned")
            .push(format.subtype);

        let native_match = self.formats.iter().any(|f| {
            f.subtype == format.subtype && f.width == format.width && f.height == format.height
        });
        if native_match || self.decodable.contains(&format.subtype) {
            *self.probe.current_format.lock().expect("lock poisoned") = Some(format.clone());
            Ok(())
        } else {
            Err(CaptureError::UnsupportedFormat(format.subtype))
        }
    }

    fn current_format(&self, _stream: u32) -> Result<VideoFormat, CaptureError> {
        self.probe
            .current_format
            .lock()
            .expect("lock poisoned")
            .clone()
            .ok_or_else(|| CaptureError::ReaderFailure("no format negotiated".to_string()))
    }

    fn request_next_frame(&mut self, _stream: u32) -> Result<(), CaptureError> {
        if self.probe.fail_request.load(Ordering::SeqCst) {
            return Err(CaptureError::ReaderFailure(
                "scripted read-request failure".to_string(),
            ));
        }
        if let Some(trace) = self.probe.trace.lock().expect("lock poisoned").as_ref() {
            trace.push("request");
        }
        self.probe.read_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Recording sink mock
// ---------------------------------------------------------------------

/// Observation handle for [`MemorySinkFactory`] sinks.
pub struct SinkProbe {
    streams: Mutex<Vec<OutputStreamFormat>>,
    input_format: Mutex<Option<VideoFormat>>,
    writes: Mutex<Vec<(u32, Timestamp)>>,
    began: AtomicBool,
    finalized: AtomicBool,
    fail_writes: AtomicBool,
    fail_create: AtomicBool,
    trace: Mutex<Option<EventTrace>>,
}

impl SinkProbe {
    fn new() -> Self {
        Self {
            streams: Mutex::new(Vec::new()),
            input_format: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            began: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            trace: Mutex::new(None),
        }
    }

    pub fn set_trace(&self, trace: EventTrace) {
        *self.trace.lock().expect("lock poisoned") = Some(trace);
    }

    pub fn streams(&self) -> Vec<OutputStreamFormat> {
        self.streams.lock().expect("lock poisoned").clone()
    }

    pub fn input_format(&self) -> Option<VideoFormat> {
        self.input_format.lock().expect("lock poisoned").clone()
    }

    pub fn writes(&self) -> Vec<(u32, Timestamp)> {
        self.writes.lock().expect("lock poisoned").clone()
    }

    pub fn began(&self) -> bool {
        self.began.load(Ordering::SeqCst)
    }

    pub fn finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }
}

/// Factory for in-memory sinks sharing one probe.
pub struct MemorySinkFactory {
    probe: Arc<SinkProbe>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(SinkProbe::new()),
        }
    }

    pub fn probe(&self) -> Arc<SinkProbe> {
        Arc::clone(&self.probe)
    }
}

impl Default for MemorySinkFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkFactory for MemorySinkFactory {
    fn create_sink(&self, _path: &std::path::Path) -> Result<Box<dyn RecordingSink>, CaptureError> {
        if self.probe.fail_create.load(Ordering::SeqCst) {
            return Err(CaptureError::RecordingSinkFailure(
                "scripted sink-create failure".to_string(),
            ));
        }
        Ok(Box::new(MemorySink {
            probe: Arc::clone(&self.probe),
        }))
    }
}

struct MemorySink {
    probe: Arc<SinkProbe>,
}

impl RecordingSink for MemorySink {
    fn add_stream(&mut self, output: &OutputStreamFormat) -> Result<u32, CaptureError> {
        let mut streams = self.probe.streams.lock().expect("lock poisoned");
        streams.push(output.clone());
        Ok(streams.len() as u32 - 1)
    }

    fn set_input_format(&mut self, _stream: u32, input: &VideoFormat) -> Result<(), CaptureError> {
        *self.probe.input_format.lock().expect("lock poisoned") = Some(input.clone());
        Ok(())
    }

    fn begin_writing(&mut self) -> Result<(), CaptureError> {
        self.probe.began.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn write_sample(
        &mut self,
        stream: u32,
        timestamp: Timestamp,
        _sample: &dyn Sample,
    ) -> Result<(), CaptureError> {
        if self.probe.fail_writes.load(Ordering::SeqCst) {
            return Err(CaptureError::RecordingSinkFailure(
                "scripted write failure".to_string(),
            ));
        }
        if let Some(trace) = self.probe.trace.lock().expect("lock poisoned").as_ref() {
            trace.push("write");
        }
        self.probe
            .writes
            .lock()
            .expect("lock poisoned")
            .push((stream, timestamp));
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), CaptureError> {
        self.probe.finalized.store(true, Ordering::SeqCst);
        Ok(())
    }
}
