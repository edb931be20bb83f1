//! streamview-core: Session lifecycle control for embeddable stream players.
//!
//! This crate keeps a native decoder engine in line with what a host view
//! declares (url, paused flag, decoder options, aspect ratio, resize mode)
//! while the view is attached, detached, backgrounded and resumed. It contains:
//!
//! - Decoder boundary: [`engine`]
//! - Option handling: [`options`], [`intent`]
//! - Controller: [`controller`], [`watchdog`], [`lifecycle`]
//! - Runtime: [`runtime`], [`scheduler`], [`config`]
//!
//! The engine itself is not part of this crate. It is consumed by:
//! - `streamview-ffi` (C ABI for iOS/Android hosts)

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod events;
pub mod intent;
pub mod lifecycle;
pub mod options;
pub mod runtime;
pub mod scheduler;
mod session;
pub mod watchdog;

/// Test doubles shared with the integration suites and `streamview-ffi`.
/// NOT semver-stable.
#[doc(hidden)]
pub mod testing;

pub use config::PlayerConfig;
pub use controller::{ControllerParts, SessionController};
pub use engine::{
    DecoderEngine, DecoderHandle, EngineEvent, EngineEventSink, SessionId, SurfaceHandle,
    VideoScale,
};
pub use error::{ConfigError, EngineError, ErrorKind};
pub use events::{EventEmitter, PlayerEvent};
pub use intent::{PlaybackIntent, ResizeMode};
pub use lifecycle::{AppActivity, AppLifecycle, LifecycleReconciler, LifecycleSubscription};
pub use runtime::PlayerView;
pub use session::SessionState;
