use std::time::Duration;

use thiserror::Error;

/// Errors returned by bounded link operations.
///
/// # Examples
/// ```
/// use cubesync_core::LinkError;
///
/// let err = LinkError::Disconnected;
/// assert!(err.to_string().contains("worker stopped"));
/// ```
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no completion for {len} byte(s) within {after:?}")]
    Timeout { len: usize, after: Duration },
    #[error("link fenced: an abandoned request was still running after {waited:?}")]
    Fenced { waited: Duration },
    #[error("link worker stopped")]
    Disconnected,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}
