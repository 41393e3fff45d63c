//! In-memory animation store.
//!
//! An [`AnimationSet`] is the unit exchanged with the cube: it is uploaded
//! wholesale and downloaded wholesale. Counts are bounded by the single-byte
//! wire encoding (0..=255) and every frame carries exactly
//! [`PIXELS_PER_FRAME`] pixel bytes. Both bounds are enforced on construction
//! and on deserialization, so a value of these types is always transferable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::layout;

/// Number of pixel bytes in one frame (an 8x8x8 cube, one bit per LED).
pub const PIXELS_PER_FRAME: usize = layout::FRAME_PIXELS;
/// Maximum number of animations in a set.
pub const MAX_ANIMATIONS: usize = layout::MAX_COUNT;
/// Maximum number of frames in one animation.
pub const MAX_FRAMES: usize = layout::MAX_COUNT;

/// Errors raised when a value would break a model invariant.
///
/// # Examples
/// ```
/// use cubesync_core::{Frame, ModelError};
///
/// let err = Frame::new(1, &[0u8; 10]).unwrap_err();
/// assert!(matches!(err, ModelError::PixelCount { actual: 10 }));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("frame payload must be {} bytes, got {actual}", PIXELS_PER_FRAME)]
    PixelCount { actual: usize },
    #[error("animation holds at most {} frames, got {actual}", MAX_FRAMES)]
    TooManyFrames { actual: usize },
    #[error("animation set holds at most {} animations, got {actual}", MAX_ANIMATIONS)]
    TooManyAnimations { actual: usize },
}

/// One still image of the cube plus its display duration.
///
/// # Examples
/// ```
/// use cubesync_core::{Frame, PIXELS_PER_FRAME};
///
/// let frame = Frame::new(5, &[0xff; PIXELS_PER_FRAME]).unwrap();
/// assert_eq!(frame.duration(), 5);
/// assert_eq!(frame.pixels()[63], 0xff);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "FrameRepr", try_from = "FrameRepr")]
pub struct Frame {
    duration: u8,
    pixels: [u8; PIXELS_PER_FRAME],
}

impl Frame {
    /// Build a frame from a pixel slice, rejecting any length other than
    /// [`PIXELS_PER_FRAME`].
    pub fn new(duration: u8, pixels: &[u8]) -> Result<Self, ModelError> {
        let pixels: [u8; PIXELS_PER_FRAME] = pixels
            .try_into()
            .map_err(|_| ModelError::PixelCount {
                actual: pixels.len(),
            })?;
        Ok(Self { duration, pixels })
    }

    pub const fn from_array(duration: u8, pixels: [u8; PIXELS_PER_FRAME]) -> Self {
        Self { duration, pixels }
    }

    /// Display time of the frame, in device time units.
    pub fn duration(&self) -> u8 {
        self.duration
    }

    pub fn pixels(&self) -> &[u8; PIXELS_PER_FRAME] {
        &self.pixels
    }
}

#[derive(Serialize, Deserialize)]
struct FrameRepr {
    duration: u8,
    pixels: Vec<u8>,
}

impl From<Frame> for FrameRepr {
    fn from(frame: Frame) -> Self {
        Self {
            duration: frame.duration,
            pixels: frame.pixels.to_vec(),
        }
    }
}

impl TryFrom<FrameRepr> for Frame {
    type Error = ModelError;

    fn try_from(repr: FrameRepr) -> Result<Self, Self::Error> {
        Frame::new(repr.duration, &repr.pixels)
    }
}

/// Ordered frames forming one playable sequence.
///
/// The frame count is always the length of the frame list.
///
/// # Examples
/// ```
/// use cubesync_core::{Animation, Frame};
///
/// let mut animation = Animation::new();
/// animation.push(Frame::from_array(3, [0u8; 64])).unwrap();
/// assert_eq!(animation.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Frame>", into = "Vec<Frame>")]
pub struct Animation {
    frames: Vec<Frame>,
}

impl Animation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an animation from frames, rejecting more than [`MAX_FRAMES`].
    pub fn from_frames(frames: Vec<Frame>) -> Result<Self, ModelError> {
        if frames.len() > MAX_FRAMES {
            return Err(ModelError::TooManyFrames {
                actual: frames.len(),
            });
        }
        Ok(Self { frames })
    }

    /// Frames decoded from a count byte, so never more than [`MAX_FRAMES`].
    pub(crate) fn from_wire(frames: Vec<Frame>) -> Self {
        debug_assert!(frames.len() <= MAX_FRAMES);
        Self { frames }
    }

    /// Append a frame at the end of the playback order.
    pub fn push(&mut self, frame: Frame) -> Result<(), ModelError> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(ModelError::TooManyFrames {
                actual: self.frames.len() + 1,
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame count as it appears on the wire.
    pub fn frame_count(&self) -> u8 {
        // bounded by MAX_FRAMES on every constructor
        self.frames.len() as u8
    }
}

impl TryFrom<Vec<Frame>> for Animation {
    type Error = ModelError;

    fn try_from(frames: Vec<Frame>) -> Result<Self, Self::Error> {
        Animation::from_frames(frames)
    }
}

impl From<Animation> for Vec<Frame> {
    fn from(animation: Animation) -> Self {
        animation.frames
    }
}

/// The complete ordered collection of animations stored on a cube.
///
/// # Examples
/// ```
/// use cubesync_core::{Animation, AnimationSet};
///
/// let set = AnimationSet::from_animations(vec![Animation::new(); 2]).unwrap();
/// assert_eq!(set.animation_count(), 2);
/// assert_eq!(set.total_frames(), 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Animation>", into = "Vec<Animation>")]
pub struct AnimationSet {
    animations: Vec<Animation>,
}

impl AnimationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from animations, rejecting more than [`MAX_ANIMATIONS`].
    pub fn from_animations(animations: Vec<Animation>) -> Result<Self, ModelError> {
        if animations.len() > MAX_ANIMATIONS {
            return Err(ModelError::TooManyAnimations {
                actual: animations.len(),
            });
        }
        Ok(Self { animations })
    }

    pub(crate) fn from_wire(animations: Vec<Animation>) -> Self {
        debug_assert!(animations.len() <= MAX_ANIMATIONS);
        Self { animations }
    }

    pub fn push(&mut self, animation: Animation) -> Result<(), ModelError> {
        if self.animations.len() >= MAX_ANIMATIONS {
            return Err(ModelError::TooManyAnimations {
                actual: self.animations.len() + 1,
            });
        }
        self.animations.push(animation);
        Ok(())
    }

    pub fn animations(&self) -> &[Animation] {
        &self.animations
    }

    pub fn len(&self) -> usize {
        self.animations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.animations.is_empty()
    }

    /// Animation count as it appears on the wire.
    pub fn animation_count(&self) -> u8 {
        self.animations.len() as u8
    }

    pub fn total_frames(&self) -> usize {
        self.animations.iter().map(Animation::len).sum()
    }
}

impl TryFrom<Vec<Animation>> for AnimationSet {
    type Error = ModelError;

    fn try_from(animations: Vec<Animation>) -> Result<Self, Self::Error> {
        AnimationSet::from_animations(animations)
    }
}

impl From<AnimationSet> for Vec<Animation> {
    fn from(set: AnimationSet) -> Self {
        set.animations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(duration: u8) -> Frame {
        Frame::from_array(duration, [0u8; PIXELS_PER_FRAME])
    }

    #[test]
    fn frame_rejects_short_and_long_payloads() {
        assert_eq!(
            Frame::new(1, &[0u8; 63]).unwrap_err(),
            ModelError::PixelCount { actual: 63 }
        );
        assert_eq!(
            Frame::new(1, &[0u8; 65]).unwrap_err(),
            ModelError::PixelCount { actual: 65 }
        );
        assert!(Frame::new(1, &[0u8; 64]).is_ok());
    }

    #[test]
    fn animation_caps_frame_count() {
        let mut animation = Animation::from_frames(vec![blank(1); MAX_FRAMES]).unwrap();
        assert_eq!(animation.frame_count(), 255);
        let err = animation.push(blank(2)).unwrap_err();
        assert_eq!(err, ModelError::TooManyFrames { actual: 256 });
        assert_eq!(animation.len(), MAX_FRAMES);
    }

    #[test]
    fn set_caps_animation_count() {
        let err = AnimationSet::from_animations(vec![Animation::new(); 256]).unwrap_err();
        assert_eq!(err, ModelError::TooManyAnimations { actual: 256 });

        let mut set = AnimationSet::from_animations(vec![Animation::new(); 255]).unwrap();
        assert_eq!(set.animation_count(), 255);
        assert!(set.push(Animation::new()).is_err());
    }

    #[test]
    fn json_round_trip_keeps_order() {
        let mut first = Animation::new();
        first.push(blank(1)).unwrap();
        first.push(Frame::from_array(2, [7u8; PIXELS_PER_FRAME])).unwrap();
        let set = AnimationSet::from_animations(vec![first, Animation::new()]).unwrap();

        let json = serde_json::to_string(&set).expect("serialize set");
        let parsed: AnimationSet = serde_json::from_str(&json).expect("parse set");
        assert_eq!(parsed, set);
        assert_eq!(parsed.animations()[0].frames()[1].duration(), 2);
    }

    #[test]
    fn json_rejects_wrong_pixel_count() {
        let json = r#"[[{"duration": 1, "pixels": [1, 2, 3]}]]"#;
        let err = serde_json::from_str::<AnimationSet>(json).unwrap_err();
        assert!(err.to_string().contains("frame payload must be 64 bytes"));
    }
}
