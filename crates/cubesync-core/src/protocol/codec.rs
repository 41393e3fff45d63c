//! Frame codec.
//!
//! A frame travels as two acknowledged units: one duration byte, then the
//! pixel payload. Nothing on the wire marks where a unit ends, so every
//! function here checks lengths exactly instead of truncating or padding.

use super::error::CodecError;
use super::layout;
use crate::model::Frame;

pub fn encode_count(count: u8) -> [u8; layout::COUNT_LEN] {
    [count]
}

/// Split a frame into its duration unit and its pixel unit.
pub fn encode_frame(frame: &Frame) -> ([u8; layout::DURATION_LEN], [u8; layout::FRAME_PIXELS]) {
    ([frame.duration()], *frame.pixels())
}

/// Pack raw pixels into a payload unit.
///
/// # Examples
/// ```
/// use cubesync_core::protocol::codec::encode_pixels;
///
/// assert!(encode_pixels(&[0u8; 64]).is_ok());
/// assert!(encode_pixels(&[0u8; 32]).is_err());
/// ```
pub fn encode_pixels(pixels: &[u8]) -> Result<[u8; layout::FRAME_PIXELS], CodecError> {
    pixels.try_into().map_err(|_| CodecError::Length {
        expected: layout::FRAME_PIXELS,
        actual: pixels.len(),
    })
}

/// Decode a single-byte unit (ack, count, or duration).
pub fn decode_byte(unit: &[u8]) -> Result<u8, CodecError> {
    match unit {
        [value] => Ok(*value),
        _ => Err(CodecError::Length {
            expected: 1,
            actual: unit.len(),
        }),
    }
}

pub fn decode_frame(duration: u8, pixels: &[u8]) -> Result<Frame, CodecError> {
    let pixels = encode_pixels(pixels)?;
    Ok(Frame::from_array(duration, pixels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_splits_into_duration_and_payload() {
        let mut pixels = [0u8; layout::FRAME_PIXELS];
        pixels[0] = 0x81;
        pixels[63] = 0x18;
        let frame = Frame::from_array(9, pixels);

        let (duration, payload) = encode_frame(&frame);
        assert_eq!(duration, [9]);
        assert_eq!(payload, pixels);
        assert_eq!(decode_frame(duration[0], &payload).unwrap(), frame);
    }

    #[test]
    fn pixels_must_be_exact() {
        let err = encode_pixels(&[1u8; 65]).unwrap_err();
        assert_eq!(
            err,
            CodecError::Length {
                expected: 64,
                actual: 65
            }
        );
        let err = decode_frame(1, &[1u8; 12]).unwrap_err();
        assert!(err.to_string().contains("expected 64 bytes, got 12"));
    }

    #[test]
    fn single_byte_units() {
        assert_eq!(decode_byte(&[0x42]).unwrap(), 0x42);
        assert!(decode_byte(&[]).is_err());
        assert!(decode_byte(&[1, 2]).is_err());
        assert_eq!(encode_count(255), [255]);
    }
}
