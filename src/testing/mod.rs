//! Offline test support: synthetic frame data and scripted stand-ins
//! for the capture, render and sink collaborators. Compiled
//! unconditionally so downstream crates can reuse them in their own
//! tests.

mod mocks;
mod synthetic;

pub use mocks::{
    EventTrace, FakeDevice, Memory2dBuffer, MemoryFlatBuffer, MemorySinkFactory, MockGpu,
    RenderOp, SinkProbe, SourceProbe, TestSample,
};
pub use synthetic::{
    synthetic_nv12_frame, synthetic_rgb24_frame, synthetic_rgb32_frame, synthetic_yuy2_frame,
};
