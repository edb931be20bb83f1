//! Events emitted to the host.

use std::fmt;

use crate::error::ErrorKind;

/// Host-facing player events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// First Playing transition after a load
    Load { url: String },
    /// Every Playing transition
    Playing { url: String },
    /// A reported failure. `url` is absent when none was set.
    Error {
        kind: ErrorKind,
        message: String,
        url: Option<String>,
    },
}

impl PlayerEvent {
    /// Host-side event name (`onLoad`, `onPlaying`, `onError`).
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::Load { .. } => "onLoad",
            PlayerEvent::Playing { .. } => "onPlaying",
            PlayerEvent::Error { .. } => "onError",
        }
    }
}

/// Single callback through which all [`PlayerEvent`]s leave the controller.
pub struct EventEmitter {
    callback: Box<dyn FnMut(PlayerEvent) + Send>,
}

impl EventEmitter {
    pub fn new(callback: impl FnMut(PlayerEvent) + Send + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Emitter that discards everything.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn emit(&mut self, event: PlayerEvent) {
        tracing::debug!("emit {}", event.name());
        (self.callback)(event);
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventEmitter")
    }
}
