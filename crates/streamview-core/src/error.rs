//! Error types for the decoder boundary and configuration.
//!
//! Nothing in this crate hands an `Err` back to the host. Engine failures are
//! either reported as [`PlayerEvent::Error`](crate::events::PlayerEvent) or, for
//! teardown steps, logged and dropped via [`best_effort`].

use thiserror::Error;

use crate::engine::SessionId;

/// Errors returned by a [`DecoderEngine`](crate::engine::DecoderEngine) or
/// [`DecoderHandle`](crate::engine::DecoderHandle).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine instance could not be constructed
    #[error("engine construction failed: {0}")]
    Construction(String),
    /// Media could not be created or assigned
    #[error("failed to load media: {0}")]
    Load(String),
    /// Play/pause/stop was rejected
    #[error("{0}")]
    Playback(String),
    /// Surface attach/detach failed
    #[error("surface error: {0}")]
    Surface(String),
    /// Releasing engine resources failed
    #[error("release failed: {0}")]
    Release(String),
    /// The engine does not implement the operation
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Classification of errors surfaced to the host.
///
/// `InvalidUrl` exists for completeness of the taxonomy; it is never emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Empty or unparsable url (silently stops playback)
    InvalidUrl,
    /// The decoder engine could not be constructed
    EngineConstructionFailure,
    /// `play()` or `load_media()` failed synchronously
    PlaybackStartFailure,
    /// The engine reported an error while playing
    AsyncEngineError,
}

/// Errors from loading a [`PlayerConfig`](crate::config::PlayerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Logs a failed teardown step and swallows it.
///
/// Teardown must always run to completion so engine resources are never leaked.
/// Returns whether the step succeeded.
pub(crate) fn best_effort(
    session: SessionId,
    step: &'static str,
    result: Result<(), EngineError>,
) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("session {session}: {step} failed during teardown: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_error_display_is_bare_message() {
        let err = EngineError::Playback("no media".to_string());
        assert_eq!(err.to_string(), "no media");
    }

    #[test]
    fn test_best_effort_swallows() {
        assert!(best_effort(SessionId(1), "stop", Ok(())));
        assert!(!best_effort(
            SessionId(1),
            "stop",
            Err(EngineError::Release("busy".into()))
        ));
    }
}
