//! H.264 encoder wrapper using openh264

use crate::errors::CaptureError;
use openh264::encoder::{Encoder, FrameType};
use openh264::formats::YUVBuffer;

/// H.264 encoder fed with converted BGRX frames.
pub struct H264Encoder {
    encoder: Encoder,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl H264Encoder {
    /// Create an encoder for the given frame size. Bitrate is a rate
    /// control hint; openh264 infers dimensions from the source at
    /// encode time.
    pub fn new(width: u32, height: u32, _bitrate: u32) -> Result<Self, CaptureError> {
        let encoder = Encoder::new().map_err(|e| {
            CaptureError::RecordingSinkFailure(format!("failed to create encoder: {e}"))
        })?;

        Ok(Self {
            encoder,
            width,
            height,
            frame_count: 0,
        })
    }

    /// Encode one BGRX frame. Returns the NAL units in Annex B format;
    /// the data may be empty for frames the encoder absorbs.
    pub fn encode_bgra(&mut self, bgra: &[u8]) -> Result<EncodedFrame, CaptureError> {
        let expected = (self.width * self.height * 4) as usize;
        if bgra.len() != expected {
            return Err(CaptureError::RecordingSinkFailure(format!(
                "invalid frame size: expected {expected} bytes, got {}",
                bgra.len()
            )));
        }

        let yuv = bgra_to_yuv420(bgra, self.width, self.height);
        let yuv_buffer =
            YUVBuffer::from_vec(yuv, self.width as usize, self.height as usize);

        let bitstream = self
            .encoder
            .encode(&yuv_buffer)
            .map_err(|e| CaptureError::RecordingSinkFailure(format!("encoding failed: {e}")))?;

        self.frame_count += 1;

        let is_keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);

        Ok(EncodedFrame {
            data: bitstream.to_vec(),
            is_keyframe,
        })
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Force the next frame to be a keyframe.
    pub fn force_keyframe(&mut self) {
        self.encoder.force_intra_frame();
    }
}

/// Result of encoding a single frame.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Encoded H.264 data in Annex B format (with start codes).
    pub data: Vec<u8>,
    /// Whether this frame is a keyframe (IDR/I frame).
    pub is_keyframe: bool,
}

/// Convert BGRX to YUV420 planar, BT.601.
fn bgra_to_yuv420(bgra: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;

    let y_size = w * h;
    let uv_size = (w / 2) * (h / 2);
    let mut yuv = vec![0u8; y_size + uv_size * 2];

    let (y_plane, uv_planes) = yuv.split_at_mut(y_size);
    let (u_plane, v_plane) = uv_planes.split_at_mut(uv_size);

    for y in 0..h {
        for x in 0..w {
            let i = (y * w + x) * 4;
            let b = bgra[i] as i32;
            let g = bgra[i + 1] as i32;
            let r = bgra[i + 2] as i32;

            let y_val = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
            y_plane[y * w + x] = y_val.clamp(0, 255) as u8;

            // Subsample chroma over 2x2 blocks.
            if y % 2 == 0 && x % 2 == 0 {
                let uv_idx = (y / 2) * (w / 2) + (x / 2);
                let u_val = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
                let v_val = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
                u_plane[uv_idx] = u_val.clamp(0, 255) as u8;
                v_plane[uv_idx] = v_val.clamp(0, 255) as u8;
            }
        }
    }

    yuv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgra_to_yuv420_size() {
        let bgra = vec![128u8; 640 * 480 * 4];
        let yuv = bgra_to_yuv420(&bgra, 640, 480);
        assert_eq!(yuv.len(), 640 * 480 * 3 / 2);
    }

    #[test]
    fn test_encoder_rejects_wrong_size() {
        let mut encoder = H264Encoder::new(640, 480, 5_000_000).expect("encoder");
        let result = encoder.encode_bgra(&[0u8; 16]);
        assert!(matches!(
            result,
            Err(CaptureError::RecordingSinkFailure(_))
        ));
    }

    #[test]
    fn test_encode_frame_produces_annex_b() {
        let mut encoder = H264Encoder::new(320, 240, 1_000_000).expect("encoder");
        let bgra = vec![128u8; 320 * 240 * 4];

        let encoded = encoder.encode_bgra(&bgra).expect("encode");
        assert!(!encoded.data.is_empty());
        assert!(
            encoded.data.starts_with(&[0x00, 0x00, 0x00, 0x01])
                || encoded.data.starts_with(&[0x00, 0x00, 0x01]),
            "should start with Annex B start code"
        );
        assert!(encoded.is_keyframe, "first frame should be a keyframe");
    }
}
