//! Session lifecycle controller.
//!
//! [`SessionController`] reconciles the host's [`PlaybackIntent`] with one live
//! decoder [`Session`]. It decides when a session must be rebuilt (init options
//! changed) versus reconfigured (everything else), drives load/play/pause/stop,
//! and owns the resume watchdog.
//!
//! The controller is single-threaded. Every method must be called on the owner
//! thread; see [`PlayerView`](crate::runtime::PlayerView) for the runtime that
//! guarantees this.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::config::PlayerConfig;
use crate::engine::{DecoderEngine, EngineEvent, EngineEventSink, SessionId, SurfaceHandle};
use crate::error::ErrorKind;
use crate::events::{EventEmitter, PlayerEvent};
use crate::intent::{normalize_aspect_ratio, parse_url, PlaybackIntent, ResizeMode};
use crate::options::OptionsNormalizer;
use crate::scheduler::{TaskScheduler, TimerTask};
use crate::session::{Session, SessionState};
use crate::watchdog::{GenerationCounter, ResumeWatchdog};

/// Route from engine sinks back to the owner thread.
pub type EngineEventRoute = Arc<dyn Fn(SessionId, EngineEvent) + Send + Sync>;

/// Outcome of [`SessionController::ensure_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStatus {
    /// The existing session matches the intent
    Reused,
    /// A new session was built (and the url, if any, loaded)
    Created,
    /// Engine construction failed; there is no session
    Unavailable,
}

/// Collaborators a controller is built from.
pub struct ControllerParts {
    pub engine: Box<dyn DecoderEngine>,
    pub scheduler: Box<dyn TaskScheduler>,
    pub emitter: EventEmitter,
    /// Where engine callbacks are delivered; must end up in
    /// [`SessionController::handle_engine_event`] on the owner thread.
    pub engine_events: EngineEventRoute,
}

pub struct SessionController {
    engine: Box<dyn DecoderEngine>,
    scheduler: Box<dyn TaskScheduler>,
    emitter: EventEmitter,
    engine_events: EngineEventRoute,
    normalizer: OptionsNormalizer,
    intent: PlaybackIntent,
    session: Option<Session>,
    /// Surface the view is attached to
    surface: Option<SurfaceHandle>,
    /// Video output unbound while the app is in the background
    output_suspended: bool,
    watchdog: ResumeWatchdog,
    deferred_play: GenerationCounter,
    post_attach_play_delay: Duration,
    /// Background time handed to the next watchdog arm; consumed once
    resume_elapsed: Duration,
    next_session_id: u64,
    destroyed: bool,
}

impl SessionController {
    pub fn new(config: &PlayerConfig, parts: ControllerParts) -> Self {
        let normalizer = config.normalizer();
        let defaults = normalizer.normalize(None);
        Self {
            engine: parts.engine,
            scheduler: parts.scheduler,
            emitter: parts.emitter,
            engine_events: parts.engine_events,
            normalizer,
            intent: PlaybackIntent {
                init_options: defaults.init,
                media_options: defaults.media,
                ..PlaybackIntent::default()
            },
            session: None,
            surface: None,
            output_suspended: false,
            watchdog: ResumeWatchdog::new(config.watchdog_timing()),
            deferred_play: GenerationCounter::default(),
            post_attach_play_delay: config.post_attach_play_delay(),
            resume_elapsed: Duration::ZERO,
            next_session_id: 1,
            destroyed: false,
        }
    }

    pub fn intent(&self) -> &PlaybackIntent {
        &self.intent
    }

    pub fn is_disposed(&self) -> bool {
        self.destroyed
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(Session::id)
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.session.as_ref().map(Session::state)
    }

    /// Whether the engine itself reports playing.
    pub fn session_is_playing(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_playing)
    }

    pub fn is_attached(&self) -> bool {
        self.surface.is_some()
    }

    // ---- host setters ----

    /// Sets the stream url. Blank or unparsable input stops playback.
    pub fn set_url(&mut self, raw: Option<&str>) {
        if self.destroyed {
            return;
        }
        let Some(url) = parse_url(raw) else {
            tracing::info!("url cleared, stopping");
            self.intent.url = None;
            self.stop();
            return;
        };
        if self.intent.url.as_ref() == Some(&url) && self.has_loaded(&url) {
            return;
        }
        self.intent.url = Some(url);
        self.load_current(self.intent.playing);
    }

    /// Replaces the decoder options.
    ///
    /// Init-option changes rebuild the session; media-only changes reload the
    /// current url on the existing one.
    pub fn set_options(&mut self, raw: Option<&[String]>) {
        if self.destroyed {
            return;
        }
        let normalized = self.normalizer.normalize(raw);
        if normalized.init == self.intent.init_options
            && normalized.media == self.intent.media_options
        {
            return;
        }
        self.intent.init_options = normalized.init;
        self.intent.media_options = normalized.media;
        if self.session.is_some() {
            self.load_current(self.intent.playing);
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        if self.destroyed {
            return;
        }
        self.intent.playing = !paused;
        if paused {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn set_aspect_ratio(&mut self, raw: Option<&str>) {
        if self.destroyed {
            return;
        }
        self.intent.aspect_ratio = normalize_aspect_ratio(raw);
        self.apply_presentation();
    }

    pub fn set_resize_mode(&mut self, mode: ResizeMode) {
        if self.destroyed {
            return;
        }
        self.intent.resize_mode = mode;
        self.apply_presentation();
    }

    /// Forces a fresh load of the current url with autoplay.
    pub fn retry(&mut self) {
        if self.destroyed {
            return;
        }
        let Some(url) = self.intent.url.clone() else {
            return;
        };
        tracing::info!("retry {url}");
        self.intent.playing = true;
        self.watchdog.invalidate();
        self.resume_elapsed = Duration::ZERO;
        if self.ensure_session(true) == SessionStatus::Reused {
            self.load(url, true);
        }
    }

    // ---- surface ----

    /// Binds the view's surface and plays if playback is wanted.
    ///
    /// While output is suspended the surface is only recorded; binding and
    /// playback wait for [`resume_output`](Self::resume_output).
    pub fn attach(&mut self, surface: SurfaceHandle) {
        if self.destroyed {
            return;
        }
        self.surface = Some(surface);
        if !self.bind_output() {
            return;
        }
        let wants_play = self.intent.playing
            || self.session.as_ref().is_some_and(|s| s.play_when_attached);
        if wants_play && self.intent.url.is_some() {
            self.play();
        } else {
            self.cancel_pending();
        }
    }

    /// Unbinds the surface; playback is paused but still wanted.
    pub fn detach(&mut self) {
        if self.destroyed {
            return;
        }
        self.pause();
        if let Some(session) = self.session.as_mut() {
            session.detach();
        }
        self.surface = None;
    }

    /// Pauses and unbinds video output while keeping the view attached.
    pub fn suspend_output(&mut self) {
        if self.destroyed {
            return;
        }
        self.pause();
        if let Some(session) = self.session.as_mut() {
            session.detach();
        }
        self.output_suspended = true;
    }

    /// Re-binds video output after [`suspend_output`](Self::suspend_output).
    pub fn resume_output(&mut self) {
        if self.destroyed {
            return;
        }
        self.output_suspended = false;
        self.bind_output();
    }

    // ---- playback ----

    /// Starts playback, or remembers the request until media and surface exist.
    pub fn play(&mut self) {
        if self.destroyed {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.play_when_attached = true;
        if session.loaded_url.is_none() || !session.attached {
            tracing::debug!("session {}: play deferred", session.id());
            return;
        }

        let elapsed = mem::take(&mut self.resume_elapsed);
        let (generation, delay) = self.watchdog.arm(elapsed);
        self.scheduler
            .schedule(delay, TimerTask::ResumeCheck { generation });

        let Err(e) = session.start() else {
            return;
        };
        tracing::error!("session {}: play failed: {e}", session.id());
        session.play_when_attached = false;
        let url = session.loaded_url.as_ref().map(Url::to_string);
        self.intent.playing = false;
        self.watchdog.invalidate();
        self.emit_error(ErrorKind::PlaybackStartFailure, e.to_string(), url);
    }

    /// Pauses without touching the desired play state.
    pub fn pause(&mut self) {
        if self.destroyed {
            return;
        }
        self.cancel_pending();
        if let Some(session) = self.session.as_mut() {
            session.play_when_attached = false;
            session.pause();
        }
    }

    /// Stops and releases the current media.
    pub fn stop(&mut self) {
        if self.destroyed {
            return;
        }
        self.cancel_pending();
        if let Some(session) = self.session.as_mut() {
            session.play_when_attached = false;
            session.stop();
        }
    }

    /// Full load of the current url, recreating the session if needed.
    pub fn reload(&mut self, autoplay: bool) {
        if self.destroyed {
            return;
        }
        self.load_current(autoplay);
    }

    /// Records background time for the next watchdog arm.
    pub fn set_resume_elapsed(&mut self, elapsed: Duration) {
        self.resume_elapsed = elapsed;
    }

    /// Schedules a `play()` after the post-attach settle delay.
    pub fn schedule_deferred_play(&mut self) {
        if self.destroyed {
            return;
        }
        let generation = self.deferred_play.next();
        self.scheduler.schedule(
            self.post_attach_play_delay,
            TimerTask::DeferredPlay { generation },
        );
    }

    // ---- async continuations ----

    /// Runs a timer task delivered by the scheduler.
    pub fn fire(&mut self, task: TimerTask) {
        if self.destroyed {
            return;
        }
        match task {
            TimerTask::ResumeCheck { generation } => self.check_resume(generation),
            TimerTask::DeferredPlay { generation } => {
                if self.deferred_play.is_current(generation) {
                    self.play();
                }
            }
        }
    }

    /// Applies an engine callback.
    pub fn handle_engine_event(&mut self, id: SessionId, event: EngineEvent) {
        if self.destroyed {
            return;
        }
        let Some(session) = self.session.as_mut().filter(|s| s.id() == id) else {
            tracing::debug!("dropping {event:?} from stale session {id}");
            return;
        };
        // Media already stopped; a queued Playing must not resurrect it.
        if event == EngineEvent::Playing && session.loaded_url.is_none() {
            tracing::debug!("session {id}: dropping Playing with no media loaded");
            return;
        }
        session.observe(&event);
        self.watchdog.invalidate();

        match event {
            EngineEvent::Playing => {
                let Some(url) = session.loaded_url.as_ref().map(Url::to_string) else {
                    return;
                };
                let first = !mem::replace(&mut session.load_event_dispatched, true);
                if first {
                    self.emitter.emit(PlayerEvent::Load { url: url.clone() });
                }
                self.emitter.emit(PlayerEvent::Playing { url });
            }
            EngineEvent::Stopped => {}
            EngineEvent::Error(message) => {
                tracing::error!("session {id}: engine error: {message}");
                session.play_when_attached = false;
                self.intent.playing = false;
                let url = self.intent.url.as_ref().map(Url::to_string);
                self.emit_error(ErrorKind::AsyncEngineError, message, url);
            }
        }
    }

    /// Releases everything. Idempotent; afterwards every method is a no-op.
    pub fn dispose(&mut self) {
        if mem::replace(&mut self.destroyed, true) {
            return;
        }
        tracing::info!("disposing controller");
        self.watchdog.invalidate();
        self.deferred_play.invalidate();
        if let Some(session) = self.session.take() {
            session.release();
        }
        self.surface = None;
        self.intent = PlaybackIntent::default();
        self.resume_elapsed = Duration::ZERO;
    }

    // ---- internals ----

    fn check_resume(&mut self, generation: u64) {
        if !self.watchdog.is_current(generation) {
            return;
        }
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.has_video_output() {
            tracing::debug!("session {}: resume check passed", session.id());
            return;
        }
        tracing::warn!("session {}: no video output after play, reloading", session.id());
        self.resume_elapsed = self.watchdog.timing().reload_threshold;
        self.load_current(self.intent.playing);
    }

    fn has_loaded(&self, url: &Url) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.loaded_url.as_ref() == Some(url))
    }

    fn cancel_pending(&mut self) {
        self.watchdog.invalidate();
        self.deferred_play.invalidate();
        self.resume_elapsed = Duration::ZERO;
    }

    /// Loads the current url once, whether or not the session had to be rebuilt.
    fn load_current(&mut self, autoplay: bool) {
        if self.ensure_session(autoplay) != SessionStatus::Reused {
            return;
        }
        if let Some(url) = self.intent.url.clone() {
            self.load(url, autoplay);
        }
    }

    fn ensure_session(&mut self, autoplay: bool) -> SessionStatus {
        if let Some(session) = &self.session {
            if session.init_options() == self.intent.init_options.as_slice() {
                return SessionStatus::Reused;
            }
        }

        if let Some(old) = self.session.take() {
            tracing::info!("session {}: init options changed, recreating", old.id());
            self.watchdog.invalidate();
            old.release();
        }

        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;
        let sink = EngineEventSink::new(id, Arc::clone(&self.engine_events));
        let handle = match self.engine.construct(&self.intent.init_options, sink) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("session {id}: {e}");
                let url = self.intent.url.as_ref().map(Url::to_string);
                self.emit_error(ErrorKind::EngineConstructionFailure, e.to_string(), url);
                return SessionStatus::Unavailable;
            }
        };

        self.session = Some(Session::new(id, handle, self.intent.init_options.clone()));
        self.apply_presentation();
        self.bind_output();
        if let Some(url) = self.intent.url.clone() {
            self.load(url, autoplay);
        }
        SessionStatus::Created
    }

    fn load(&mut self, url: Url, autoplay: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        self.watchdog.invalidate();
        if let Err(e) = session.load(&url, &self.intent.media_options) {
            tracing::error!("session {}: {e}", session.id());
            session.play_when_attached = false;
            self.intent.playing = false;
            self.emit_error(
                ErrorKind::PlaybackStartFailure,
                e.to_string(),
                Some(url.to_string()),
            );
            return;
        }
        let scale = self.intent.resize_mode.to_video_scale();
        session.apply_presentation(self.intent.aspect_ratio.as_deref(), scale);

        if autoplay {
            self.play();
        } else {
            session.play_when_attached = false;
        }
    }

    /// Binds the session to the view surface unless output is suspended.
    ///
    /// Returns true if the session ends up attached.
    fn bind_output(&mut self) -> bool {
        let (Some(session), Some(surface)) = (self.session.as_mut(), self.surface.as_ref()) else {
            return false;
        };
        if self.output_suspended {
            return false;
        }
        if session.attached {
            return true;
        }
        match session.attach(surface) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("session {}: attach failed: {e}", session.id());
                false
            }
        }
    }

    fn apply_presentation(&mut self) {
        if let Some(session) = self.session.as_mut() {
            let scale = self.intent.resize_mode.to_video_scale();
            session.apply_presentation(self.intent.aspect_ratio.as_deref(), scale);
        }
    }

    fn emit_error(&mut self, kind: ErrorKind, message: String, url: Option<String>) {
        self.emitter.emit(PlayerEvent::Error { kind, message, url });
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ControllerHarness, EngineCall, FailPoint};

    const URL: &str = "rtsp://cam.local/1";

    #[test]
    fn test_set_url_creates_session_and_loads_once() {
        let mut h = ControllerHarness::new();
        h.player.set_url(Some(URL));

        assert_eq!(h.engine.constructed(), 1);
        assert_eq!(h.engine.count(|c| matches!(c, EngineCall::LoadMedia { .. })), 1);
        assert!(h.emitter.events().is_empty());
    }

    #[test]
    fn test_same_url_twice_is_not_reloaded() {
        let mut h = ControllerHarness::new();
        h.player.set_url(Some(URL));
        h.player.set_url(Some(URL));
        assert_eq!(h.engine.count(|c| matches!(c, EngineCall::LoadMedia { .. })), 1);
    }

    #[test]
    fn test_invalid_url_stops_silently() {
        let mut h = ControllerHarness::new();
        h.player.set_paused(false);
        h.player.attach(SurfaceHandle::new(()));
        h.player.set_url(Some(URL));
        h.engine.clear_calls();

        h.player.set_url(Some("   "));
        assert!(h.player.intent().url.is_none());
        assert!(h.engine.calls().contains(&EngineCall::Stop));
        assert!(h.emitter.events().is_empty());
    }

    #[test]
    fn test_play_waits_for_attach() {
        let mut h = ControllerHarness::new();
        h.player.set_paused(false);
        h.player.set_url(Some(URL));
        assert_eq!(h.engine.count(|c| *c == EngineCall::Play), 0);

        h.player.attach(SurfaceHandle::new(()));
        assert_eq!(h.engine.count(|c| *c == EngineCall::Play), 1);
        assert_eq!(h.scheduler.pending(), 1);
    }

    #[test]
    fn test_sync_play_failure_reports_and_clears_intent() {
        let mut h = ControllerHarness::new();
        h.player.attach(SurfaceHandle::new(()));
        h.player.set_url(Some(URL));
        h.engine.fail_next(FailPoint::Play, "decoder busy");
        h.player.set_paused(false);

        assert!(!h.player.intent().playing);
        let events = h.emitter.events();
        assert_eq!(
            events,
            vec![PlayerEvent::Error {
                kind: ErrorKind::PlaybackStartFailure,
                message: "decoder busy".into(),
                url: Some(URL.into()),
            }]
        );
        // The armed check was invalidated.
        h.advance(Duration::from_secs(5));
        assert_eq!(h.engine.count(|c| matches!(c, EngineCall::LoadMedia { .. })), 1);
    }

    #[test]
    fn test_construction_failure_is_reported() {
        let mut h = ControllerHarness::new();
        h.engine.fail_next(FailPoint::Construct, "no libvlc");
        h.player.set_url(Some(URL));

        assert!(!h.player.has_session());
        assert!(matches!(
            &h.emitter.events()[..],
            [PlayerEvent::Error { kind: ErrorKind::EngineConstructionFailure, url: Some(_), .. }]
        ));
    }

    #[test]
    fn test_playing_emits_load_once_per_load() {
        let mut h = ControllerHarness::new();
        h.player.attach(SurfaceHandle::new(()));
        h.player.set_paused(false);
        h.player.set_url(Some(URL));

        h.engine.emit(EngineEvent::Playing);
        h.pump();
        h.engine.emit(EngineEvent::Playing);
        h.pump();

        let names: Vec<_> = h.emitter.events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["onLoad", "onPlaying", "onPlaying"]);

        h.player.retry();
        h.engine.emit(EngineEvent::Playing);
        h.pump();
        let names: Vec<_> = h.emitter.events().iter().map(|e| e.name()).collect();
        assert_eq!(names[3..], ["onLoad", "onPlaying"]);
    }

    #[test]
    fn test_async_error_clears_desired_playing() {
        let mut h = ControllerHarness::new();
        h.player.attach(SurfaceHandle::new(()));
        h.player.set_paused(false);
        h.player.set_url(Some(URL));

        h.engine.emit(EngineEvent::Error("stream ended".into()));
        h.pump();

        assert!(!h.player.intent().playing);
        assert_eq!(h.player.session_state(), Some(SessionState::Errored));
        assert!(matches!(
            &h.emitter.events()[..],
            [PlayerEvent::Error { kind: ErrorKind::AsyncEngineError, .. }]
        ));
    }

    #[test]
    fn test_events_from_replaced_session_are_dropped() {
        let mut h = ControllerHarness::new();
        h.player.attach(SurfaceHandle::new(()));
        h.player.set_url(Some(URL));
        let old = h.engine.latest_sink().expect("sink");

        h.player.set_options(Some(&["--rtsp-tcp".to_string()]));
        assert_eq!(h.engine.constructed(), 2);

        old.send(EngineEvent::Playing);
        h.pump();
        assert!(h.emitter.events().is_empty());
    }

    #[test]
    fn test_media_only_change_reuses_session() {
        let mut h = ControllerHarness::new();
        h.player.set_url(Some(URL));
        h.player.set_options(Some(&[":network-caching=1000".to_string()]));

        assert_eq!(h.engine.constructed(), 1);
        assert_eq!(h.engine.count(|c| matches!(c, EngineCall::LoadMedia { .. })), 2);

        // Unchanged options are a no-op.
        h.player.set_options(Some(&[":network-caching=1000".to_string()]));
        assert_eq!(h.engine.count(|c| matches!(c, EngineCall::LoadMedia { .. })), 2);
    }

    #[test]
    fn test_aspect_and_resize_apply_live_and_without_session() {
        let mut h = ControllerHarness::new();
        h.player.set_aspect_ratio(Some(" 4:3 "));
        h.player.set_resize_mode(ResizeMode::Cover);
        assert!(h.engine.calls().is_empty());

        h.player.set_url(Some(URL));
        assert!(h
            .engine
            .calls()
            .contains(&EngineCall::SetAspectRatio(Some("4:3".into()))));

        h.engine.clear_calls();
        h.player.set_aspect_ratio(Some(""));
        assert!(h.engine.calls().contains(&EngineCall::SetAspectRatio(None)));
    }

    #[test]
    fn test_dispose_is_terminal() {
        let mut h = ControllerHarness::new();
        h.player.attach(SurfaceHandle::new(()));
        h.player.set_paused(false);
        h.player.set_url(Some(URL));
        h.player.dispose();
        h.player.dispose();

        assert_eq!(h.engine.live_handles(), 0);
        h.engine.clear_calls();

        h.player.set_url(Some("rtsp://other/2"));
        h.player.retry();
        h.player.set_paused(false);
        h.engine.emit(EngineEvent::Playing);
        h.pump();
        h.advance(Duration::from_secs(10));

        assert!(h.engine.calls().is_empty());
        assert!(h.emitter.events().is_empty());
    }
}
