use std::fmt;

use thiserror::Error;

use crate::link::LinkError;

/// Position in a protocol exchange, used to tag abort reasons.
///
/// # Examples
/// ```
/// use cubesync_core::Step;
///
/// let step = Step::FrameData { animation: 1, frame: 0 };
/// assert_eq!(step.to_string(), "pixel data of frame 0 in animation 1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Probe,
    Command,
    AnimationCount,
    FrameCount { animation: usize },
    FrameDuration { animation: usize, frame: usize },
    FrameData { animation: usize, frame: usize },
    Finish,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Probe => write!(f, "probe"),
            Step::Command => write!(f, "command"),
            Step::AnimationCount => write!(f, "animation count"),
            Step::FrameCount { animation } => {
                write!(f, "frame count of animation {animation}")
            }
            Step::FrameDuration { animation, frame } => {
                write!(f, "duration of frame {frame} in animation {animation}")
            }
            Step::FrameData { animation, frame } => {
                write!(f, "pixel data of frame {frame} in animation {animation}")
            }
            Step::Finish => write!(f, "finish marker"),
        }
    }
}

/// Wire unit with the wrong length.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

/// Reasons a probe, download, upload or clear was aborted.
///
/// Every variant aborts the whole operation; none of them is retried.
///
/// # Examples
/// ```
/// use cubesync_core::{ProtocolError, Step};
///
/// let err = ProtocolError::Mismatch {
///     step: Step::Command,
///     expected: 0x42,
///     actual: 0x00,
/// };
/// assert!(err.to_string().contains("expected 0x42, got 0x00"));
/// ```
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("timeout during {step}")]
    Timeout { step: Step },
    #[error("unexpected response during {step}: expected {expected:#04x}, got {actual:#04x}")]
    Mismatch { step: Step, expected: u8, actual: u8 },
    #[error("device reported an error during {step}")]
    DeviceError { step: Step },
    #[error("malformed response during {step}: {source}")]
    Malformed {
        step: Step,
        #[source]
        source: CodecError,
    },
    #[error("link failure during {step}: {source}")]
    Link {
        step: Step,
        #[source]
        source: LinkError,
    },
}

impl ProtocolError {
    pub(crate) fn from_link(step: Step, err: LinkError) -> Self {
        match err {
            LinkError::Timeout { .. } => ProtocolError::Timeout { step },
            source => ProtocolError::Link { step, source },
        }
    }

    pub(crate) fn malformed(step: Step, source: CodecError) -> Self {
        ProtocolError::Malformed { step, source }
    }

    pub fn step(&self) -> Step {
        match self {
            ProtocolError::Timeout { step }
            | ProtocolError::Mismatch { step, .. }
            | ProtocolError::DeviceError { step }
            | ProtocolError::Malformed { step, .. }
            | ProtocolError::Link { step, .. } => *step,
        }
    }

    /// True when the device did not answer within the bounded deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProtocolError::Timeout { .. })
    }
}
