//! Property-based tests for the MP4 recording path.
//!
//! Run with: cargo test --test recording_props --features recording

use proptest::prelude::*;
use tempfile::tempdir;
use viewfinder::recording::H264Encoder;
use viewfinder::sink::{CodecId, OutputStreamFormat, RecordingSink, SinkFactory};
use viewfinder::testing::{synthetic_yuy2_frame, TestSample};
use viewfinder::types::{PixelFormat, Timestamp, VideoFormat};

proptest! {
    // Encoders come up for any 16-aligned frame size in the practical
    // range.
    #[test]
    fn encoder_accepts_aligned_dimensions(
        width in (1u32..60).prop_map(|w| w * 16),
        height in (1u32..34).prop_map(|h| h * 16),
        bitrate in 500_000u32..10_000_000,
    ) {
        let result = H264Encoder::new(width, height, bitrate);
        prop_assert!(result.is_ok(), "encoder failed for {width}x{height}");
    }

    // Every non-empty encoded frame is valid Annex B.
    #[test]
    fn encoded_frames_are_annex_b(gray in 0u8..=255) {
        let (width, height) = (320u32, 240u32);
        let mut encoder = H264Encoder::new(width, height, 1_000_000)
            .expect("encoder");

        let bgra = vec![gray; (width * height * 4) as usize];
        let encoded = encoder.encode_bgra(&bgra).expect("encode");

        prop_assert!(!encoded.data.is_empty());
        prop_assert!(
            encoded.data.starts_with(&[0, 0, 0, 1]) || encoded.data.starts_with(&[0, 0, 1]),
            "missing Annex B start code"
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    // Whatever (sorted) timestamps the session rebases, the sink writes
    // them all and the file comes out non-empty.
    #[test]
    fn sink_accepts_monotonic_rebased_timestamps(
        mut offsets in proptest::collection::vec(0i64..50_000_000, 2..6),
    ) {
        offsets.sort_unstable();
        offsets.dedup();

        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("prop.mp4");
        let native = VideoFormat::new(PixelFormat::Yuy2, 160, 112).with_frame_rate(30, 1);

        let factory = viewfinder::recording::Mp4SinkFactory::new();
        let mut sink = factory.create_sink(&path).expect("sink");
        let stream = sink
            .add_stream(&OutputStreamFormat::from_native(
                CodecId::H264,
                native.width * native.height * 20,
                &native,
            ))
            .expect("stream");
        sink.set_input_format(stream, &native).expect("input");
        sink.begin_writing().expect("begin");

        for (i, ts) in offsets.iter().enumerate() {
            let sample = TestSample::planar(
                synthetic_yuy2_frame(i as u64, native.width, native.height),
                native.width as isize * 2,
            );
            sink.write_sample(stream, *ts as Timestamp, &sample).expect("write");
        }
        sink.finalize().expect("finalize");

        let len = std::fs::metadata(&path).expect("file").len();
        prop_assert!(len > 0);
    }
}
