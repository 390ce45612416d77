//! Error taxonomy shared by every terminal operation.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TermError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Interrupted by signal")]
    Interrupted,

    #[error("Stream closed")]
    Closed,

    #[error("Unsupported on this platform: {0}")]
    PlatformUnsupported(String),

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, TermError>;

impl TermError {
    /// Classify an OS error raised by a discipline call (get/set mode, flush,
    /// window size). "Not a terminal" style failures become
    /// `DeviceUnavailable`.
    pub fn from_discipline(op: &str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::Interrupted {
            return TermError::Interrupted;
        }
        if err.kind() == io::ErrorKind::Unsupported {
            return TermError::PlatformUnsupported(format!("{}: {}", op, err));
        }
        if err.kind() == io::ErrorKind::InvalidInput {
            return TermError::InvalidArgument(format!("{}: {}", op, err));
        }
        #[cfg(unix)]
        {
            if let Some(libc::ENOTTY) | Some(libc::ENODEV) | Some(libc::EBADF) = err.raw_os_error() {
                return TermError::DeviceUnavailable(format!("{}: not a terminal ({})", op, err));
            }
        }
        TermError::DeviceUnavailable(format!("{}: {}", op, err))
    }

    /// Whether this error means the stream cannot take part in the requested
    /// operation at all.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, TermError::Closed | TermError::PlatformUnsupported(_))
    }
}

impl From<io::Error> for TermError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::Interrupted => TermError::Interrupted,
            io::ErrorKind::Unsupported => TermError::PlatformUnsupported(err.to_string()),
            _ => TermError::Io(err),
        }
    }
}
