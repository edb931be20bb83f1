//! Decoder engine boundary.
//!
//! The controller never decodes anything itself. It drives a native engine
//! (libVLC, AVPlayer, ExoPlayer, ...) through [`DecoderEngine`] and
//! [`DecoderHandle`], and learns about asynchronous state changes through an
//! [`EngineEventSink`] handed to the engine at construction time.
//!
//! Engine callbacks typically arrive on the engine's own threads. The sink only
//! forwards them; they are applied to controller state on the owner thread.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::error::EngineError;

/// Identifies one decoder session within a controller.
///
/// Events are tagged with the id of the session that produced them so that
/// callbacks from a replaced session can be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Asynchronous notifications from the decoder engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Playback started (or resumed) and the engine is rendering
    Playing,
    /// Playback stopped
    Stopped,
    /// The engine hit an error during playback
    Error(String),
}

/// How decoded video is scaled into the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoScale {
    /// Letterbox: whole frame visible, aspect preserved
    Fit,
    /// Crop: surface fully covered, aspect preserved
    AspectFill,
    /// Surface fully covered, aspect ignored
    Stretch,
    /// Native pixel size, centered
    Original,
}

/// Opaque rendering target the engine draws into.
///
/// The controller only passes it through to [`DecoderHandle::attach`]. Engines
/// downcast it to their platform view type.
#[derive(Clone)]
pub struct SurfaceHandle {
    inner: Arc<dyn Any + Send + Sync>,
}

impl SurfaceHandle {
    /// Wraps a platform surface.
    pub fn new<T: Any + Send + Sync>(surface: T) -> Self {
        Self {
            inner: Arc::new(surface),
        }
    }

    /// Returns the wrapped surface if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Returns true if both handles wrap the same surface.
    pub fn same_as(&self, other: &SurfaceHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceHandle")
            .field("ptr", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

type DeliverFn = dyn Fn(SessionId, EngineEvent) + Send + Sync;

/// Callback channel from an engine instance back to its controller.
///
/// Cloneable and callable from any thread.
#[derive(Clone)]
pub struct EngineEventSink {
    session: SessionId,
    deliver: Arc<DeliverFn>,
}

impl EngineEventSink {
    /// Creates a sink that tags every event with `session`.
    pub fn new(session: SessionId, deliver: Arc<DeliverFn>) -> Self {
        Self { session, deliver }
    }

    /// The session this sink reports for.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Delivers an event towards the owning controller.
    pub fn send(&self, event: EngineEvent) {
        (self.deliver)(self.session, event);
    }
}

impl fmt::Debug for EngineEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineEventSink")
            .field("session", &self.session)
            .finish()
    }
}

/// Factory for decoder engine instances.
///
/// One instance is constructed per session, with that session's frozen
/// init options.
pub trait DecoderEngine: Send {
    /// Constructs a new engine instance.
    fn construct(
        &mut self,
        init_options: &[String],
        events: EngineEventSink,
    ) -> Result<Box<dyn DecoderHandle>, EngineError>;
}

/// One live engine instance.
///
/// All methods are called on the owner thread.
pub trait DecoderHandle: Send {
    /// Replaces the current media with a fresh one for `url`, applying
    /// `media_options` in order.
    fn load_media(&mut self, url: &Url, media_options: &[String]) -> Result<(), EngineError>;

    /// Releases the current media, if any.
    fn release_media(&mut self) -> Result<(), EngineError>;

    /// Starts or resumes playback.
    fn play(&mut self) -> Result<(), EngineError>;

    /// Pauses playback.
    fn pause(&mut self) -> Result<(), EngineError>;

    /// Stops playback.
    fn stop(&mut self) -> Result<(), EngineError>;

    /// Binds video output to `surface`.
    fn attach(&mut self, surface: &SurfaceHandle) -> Result<(), EngineError>;

    /// Unbinds video output.
    fn detach(&mut self) -> Result<(), EngineError>;

    /// Returns true once the engine produces video output (tracks/frames).
    fn has_video_output(&self) -> bool;

    /// Returns true while the engine is playing.
    fn is_playing(&self) -> bool;

    /// Sets a forced aspect ratio (`"16:9"`), or the engine default for `None`.
    fn set_aspect_ratio(&mut self, ratio: Option<&str>) -> Result<(), EngineError>;

    /// Sets the scaling behavior.
    fn set_video_scale(&mut self, scale: VideoScale) -> Result<(), EngineError>;

    /// Releases the engine instance. No other method is called afterwards.
    fn release(&mut self) -> Result<(), EngineError>;
}
