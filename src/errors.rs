use crate::types::PixelFormat;
use thiserror::Error;

/// Crate-wide error taxonomy for the capture pipeline.
///
/// Session-level variants propagate to callers; per-frame variants are
/// swallowed into best-effort continuation by the read loop (see the
/// session module).
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Enumeration or activation failure. Fatal to the current bind,
    /// recoverable by retrying or picking a different device.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// No conversion path exists for a source format. Fatal only to the
    /// candidate format being negotiated.
    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(PixelFormat),

    /// The GPU surface was invalidated. Recovered by reset-and-retry on
    /// the next draw.
    #[error("render device lost")]
    DeviceLost,

    /// A frame buffer could not be locked or converted. The frame is
    /// dropped and the loop continues.
    #[error("frame conversion failed: {0}")]
    ConversionFailure(String),

    /// The asynchronous reader reported an error. The read loop stops
    /// and the failure is surfaced once.
    #[error("reader failure: {0}")]
    ReaderFailure(String),

    /// The recording sink rejected a format or write. Recording stops;
    /// the session keeps presenting.
    #[error("recording sink failure: {0}")]
    RecordingSinkFailure(String),

    /// A recording or snapshot was requested without a bound device.
    #[error("no active capture device")]
    NoActiveDevice,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// Stable numeric code carried by error notifications.
    pub fn code(&self) -> i32 {
        match self {
            CaptureError::DeviceUnavailable(_) => 1,
            CaptureError::UnsupportedFormat(_) => 2,
            CaptureError::DeviceLost => 3,
            CaptureError::ConversionFailure(_) => 4,
            CaptureError::ReaderFailure(_) => 5,
            CaptureError::RecordingSinkFailure(_) => 6,
            CaptureError::NoActiveDevice => 7,
            CaptureError::Io(_) => 8,
        }
    }
}
