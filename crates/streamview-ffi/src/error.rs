//! Error codes returned across the C ABI.

use streamview_core::ErrorKind;

/// FFI status codes matching `include/Streamview.h`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamviewError {
    Ok = 0,
    NullPtr = 1,
    InvalidArgument = 2,
    InvalidUtf8 = 3,
    Internal = 4,
    Disposed = 5,
}

impl StreamviewError {
    /// Convert to the raw i32 for FFI return.
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Error classification carried by `STREAMVIEW_EVENT_ERROR`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamviewErrorKind {
    /// Not an error event
    None = 0,
    InvalidUrl = 1,
    EngineConstructionFailure = 2,
    PlaybackStartFailure = 3,
    AsyncEngineError = 4,
}

impl From<ErrorKind> for StreamviewErrorKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::InvalidUrl => StreamviewErrorKind::InvalidUrl,
            ErrorKind::EngineConstructionFailure => StreamviewErrorKind::EngineConstructionFailure,
            ErrorKind::PlaybackStartFailure => StreamviewErrorKind::PlaybackStartFailure,
            ErrorKind::AsyncEngineError => StreamviewErrorKind::AsyncEngineError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(StreamviewError::Ok.as_raw(), 0);
        assert_eq!(StreamviewError::Disposed.as_raw(), 5);
        assert_eq!(
            StreamviewErrorKind::from(ErrorKind::AsyncEngineError) as i32,
            4
        );
    }
}
