//! One live decoder instance.
//!
//! A [`Session`] wraps a [`DecoderHandle`] constructed with a frozen set of init
//! options. It performs the engine calls for load/play/pause/stop and tracks
//! what the engine was last told. Policy (watchdog, events, intent) lives in the
//! controller.

use url::Url;

use crate::engine::{DecoderHandle, EngineEvent, SessionId, SurfaceHandle, VideoScale};
use crate::error::{best_effort, EngineError};

/// Observed state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Engine constructed, nothing loaded
    Created,
    /// Media assigned, waiting for the engine to start
    Loading,
    Playing,
    Paused,
    Stopped,
    /// The engine reported an error
    Errored,
    /// Engine released; terminal
    Released,
}

pub(crate) struct Session {
    id: SessionId,
    handle: Box<dyn DecoderHandle>,
    init_options: Vec<String>,
    pub(crate) attached: bool,
    pub(crate) loaded_url: Option<Url>,
    pub(crate) play_when_attached: bool,
    pub(crate) load_event_dispatched: bool,
    state: SessionState,
}

impl Session {
    pub(crate) fn new(id: SessionId, handle: Box<dyn DecoderHandle>, init_options: Vec<String>) -> Self {
        tracing::info!("session {id}: created with {} init options", init_options.len());
        Self {
            id,
            handle,
            init_options,
            attached: false,
            loaded_url: None,
            play_when_attached: false,
            load_event_dispatched: false,
            state: SessionState::Created,
        }
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn init_options(&self) -> &[String] {
        &self.init_options
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    /// Applies aspect ratio and scaling. Failures are logged.
    pub(crate) fn apply_presentation(&mut self, aspect_ratio: Option<&str>, scale: VideoScale) {
        if let Err(e) = self.handle.set_aspect_ratio(aspect_ratio) {
            tracing::warn!("session {}: set_aspect_ratio failed: {e}", self.id);
        }
        if let Err(e) = self.handle.set_video_scale(scale) {
            tracing::warn!("session {}: set_video_scale failed: {e}", self.id);
        }
    }

    pub(crate) fn attach(&mut self, surface: &SurfaceHandle) -> Result<(), EngineError> {
        self.handle.attach(surface)?;
        self.attached = true;
        Ok(())
    }

    pub(crate) fn detach(&mut self) {
        if self.attached {
            best_effort(self.id, "detach", self.handle.detach());
            self.attached = false;
        }
    }

    /// Replaces the current media.
    ///
    /// Stops in-flight playback and releases the previous media first; both are
    /// best-effort. Only the assignment of the new media can fail.
    pub(crate) fn load(&mut self, url: &Url, media_options: &[String]) -> Result<(), EngineError> {
        self.load_event_dispatched = false;
        if self.handle.is_playing() {
            best_effort(self.id, "stop", self.handle.stop());
        }
        if self.loaded_url.take().is_some() {
            best_effort(self.id, "release_media", self.handle.release_media());
        }
        self.handle.load_media(url, media_options)?;
        self.loaded_url = Some(url.clone());
        self.state = SessionState::Loading;
        tracing::info!("session {}: loading {url}", self.id);
        Ok(())
    }

    pub(crate) fn start(&mut self) -> Result<(), EngineError> {
        self.handle.play()
    }

    pub(crate) fn pause(&mut self) {
        if best_effort(self.id, "pause", self.handle.pause()) && self.state == SessionState::Playing {
            self.state = SessionState::Paused;
        }
    }

    pub(crate) fn stop(&mut self) {
        best_effort(self.id, "stop", self.handle.stop());
        if self.loaded_url.take().is_some() {
            best_effort(self.id, "release_media", self.handle.release_media());
        }
        self.state = SessionState::Stopped;
    }

    pub(crate) fn has_video_output(&self) -> bool {
        self.handle.has_video_output()
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.handle.is_playing()
    }

    /// Records an engine-reported transition.
    pub(crate) fn observe(&mut self, event: &EngineEvent) {
        self.state = match event {
            EngineEvent::Playing => SessionState::Playing,
            EngineEvent::Stopped => SessionState::Stopped,
            EngineEvent::Error(_) => SessionState::Errored,
        };
    }

    /// Stops, detaches and releases the engine.
    pub(crate) fn release(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.state == SessionState::Released {
            return;
        }
        tracing::info!("session {}: releasing", self.id);
        best_effort(self.id, "stop", self.handle.stop());
        if self.loaded_url.take().is_some() {
            best_effort(self.id, "release_media", self.handle.release_media());
        }
        self.detach();
        best_effort(self.id, "release", self.handle.release());
        self.play_when_attached = false;
        self.state = SessionState::Released;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}
