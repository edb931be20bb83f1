//! Controller and lifecycle scenarios, driven on a manual clock.

use std::collections::HashSet;
use std::time::Duration;

use streamview_core::options::{canonical_key, OptionCategory};
use streamview_core::scheduler::TimerTask;
use streamview_core::testing::{ControllerHarness, EngineCall, FailPoint};
use streamview_core::{
    AppActivity, AppLifecycle, EngineEvent, LifecycleReconciler, SessionState, SurfaceHandle,
};

const URL: &str = "rtsp://host/1";

fn loads(h: &ControllerHarness<impl Sized>) -> usize {
    h.engine.count(|c| matches!(c, EngineCall::LoadMedia { .. }))
}

fn plays(h: &ControllerHarness<impl Sized>) -> usize {
    h.engine.count(|c| *c == EngineCall::Play)
}

fn last_check_delay(h: &ControllerHarness<impl Sized>) -> Option<Duration> {
    h.scheduler
        .history()
        .into_iter()
        .rev()
        .find(|(_, task)| matches!(task, TimerTask::ResumeCheck { .. }))
        .map(|(delay, _)| delay)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Attached, desired-playing, url loaded and engine reporting Playing.
fn playing_controller() -> ControllerHarness {
    let mut h = ControllerHarness::new();
    h.player.attach(SurfaceHandle::new(()));
    h.player.set_paused(false);
    h.player.set_url(Some(URL));
    h.engine.emit(EngineEvent::Playing);
    h.pump();
    h
}

fn playing_reconciler(app: &AppLifecycle) -> ControllerHarness<LifecycleReconciler> {
    let mut h = ControllerHarness::reconciler(app);
    h.player.on_attach(SurfaceHandle::new(()));
    h.player.controller_mut().set_paused(false);
    h.player.controller_mut().set_url(Some(URL));
    h.engine.emit(EngineEvent::Playing);
    h.engine.set_video_output(true);
    h.pump();
    h.emitter.clear();
    h
}

// =========================================================================
// SessionController
// =========================================================================

#[test]
fn option_lists_stay_key_unique() {
    let mut h = ControllerHarness::new();
    h.player.set_url(Some(URL));
    let batches = [
        strings(&["--rtsp-tcp", "rtsp-tcp", ":network-caching=50"]),
        strings(&[":Network-Caching=10", ":NETWORK-CACHING=20", "-v", "--v"]),
        strings(&[]),
        strings(&["avcodec-hw=none", ":rtsp-caching=0", "--avcodec-hw=any"]),
    ];

    for batch in &batches {
        h.player.set_options(Some(batch));
        let intent = h.player.intent();
        let init: HashSet<_> = intent
            .init_options
            .iter()
            .map(|o| canonical_key(o, OptionCategory::Init))
            .collect();
        let media: HashSet<_> = intent
            .media_options
            .iter()
            .map(|o| canonical_key(o, OptionCategory::Media))
            .collect();
        assert_eq!(init.len(), intent.init_options.len());
        assert_eq!(media.len(), intent.media_options.len());
    }
}

#[test]
fn invalid_url_stops_without_events() {
    let mut h = playing_controller();
    h.emitter.clear();

    for bad in [Some(""), Some("   "), Some("no scheme here"), None] {
        h.player.set_url(bad);
        assert!(h.player.intent().url.is_none());
    }
    h.advance(Duration::from_secs(5));

    assert!(h.emitter.events().is_empty());
    assert!(!h.player.session_is_playing());
}

#[test]
fn dispose_silences_in_flight_timers() {
    let mut h = ControllerHarness::new();
    h.player.attach(SurfaceHandle::new(()));
    h.player.set_paused(false);
    h.player.set_url(Some(URL));
    assert_eq!(h.scheduler.pending(), 1);

    h.player.dispose();
    h.engine.clear_calls();
    h.engine.emit(EngineEvent::Error("late".into()));
    h.advance(Duration::from_secs(10));

    assert!(h.engine.calls().is_empty());
    assert!(h.emitter.events().is_empty());
}

#[test]
fn retry_twice_loads_twice() {
    let mut h = playing_controller();
    h.engine.clear_calls();

    h.player.retry();
    h.player.retry();

    assert_eq!(loads(&h), 2);
    assert_eq!(h.engine.constructed(), 1);
}

#[test]
fn retry_without_url_is_noop() {
    let mut h = ControllerHarness::new();
    h.player.retry();
    assert!(h.engine.calls().is_empty());
    assert!(!h.player.intent().playing);
}

#[test]
fn cancelled_generation_has_no_effect() {
    let mut h = ControllerHarness::new();
    h.player.attach(SurfaceHandle::new(()));
    h.player.set_paused(false);
    h.player.set_url(Some(URL));

    h.player.set_paused(true);
    h.advance(Duration::from_secs(2));
    assert_eq!(loads(&h), 1);
}

#[test]
fn superseded_generation_has_no_effect() {
    let mut h = ControllerHarness::new();
    h.player.attach(SurfaceHandle::new(()));
    h.player.set_paused(false);
    h.player.set_url(Some(URL));

    h.advance(Duration::from_millis(200));
    h.player.set_paused(false);

    // First check was due at 400ms; only the second one (600ms) may act.
    h.advance(Duration::from_millis(300));
    assert_eq!(loads(&h), 1);
    h.advance(Duration::from_millis(300));
    assert_eq!(loads(&h), 2);
}

#[test]
fn init_option_change_recreates_once() {
    let mut h = ControllerHarness::new();
    h.player.set_url(Some(URL));
    h.player.set_options(Some(&strings(&["--rtsp-tcp"])));

    let calls = h.engine.calls();
    let constructs: Vec<_> = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, EngineCall::Construct { .. }))
        .collect();
    assert_eq!(constructs.len(), 2);

    let (second_idx, second) = constructs[1];
    assert_eq!(
        *second,
        EngineCall::Construct {
            init_options: strings(&["--rtsp-tcp"])
        }
    );
    let loads_after: Vec<_> = calls[second_idx..]
        .iter()
        .filter(|c| matches!(c, EngineCall::LoadMedia { .. }))
        .collect();
    assert_eq!(
        loads_after,
        vec![&EngineCall::LoadMedia {
            url: URL.to_string(),
            options: strings(&[":network-caching=200", ":rtsp-caching=200"]),
        }]
    );
    assert_eq!(h.engine.live_handles(), 1);
}

#[test]
fn watchdog_skips_reload_when_video_present() {
    let mut h = ControllerHarness::new();
    h.player.attach(SurfaceHandle::new(()));
    h.player.set_paused(false);
    h.engine.set_video_output(true);
    h.player.set_url(Some(URL));

    h.advance(Duration::from_secs(1));
    assert_eq!(loads(&h), 1);
}

#[test]
fn watchdog_reloads_stalled_stream_with_long_follow_up() {
    let mut h = ControllerHarness::new();
    h.player.attach(SurfaceHandle::new(()));
    h.player.set_paused(false);
    h.player.set_url(Some(URL));
    assert_eq!(last_check_delay(&h), Some(Duration::from_millis(400)));

    h.advance(Duration::from_millis(400));
    assert_eq!(loads(&h), 2);
    assert_eq!(plays(&h), 2);
    assert_eq!(last_check_delay(&h), Some(Duration::from_millis(1000)));
}

#[test]
fn load_failure_reports_with_url() {
    let mut h = ControllerHarness::new();
    h.player.set_paused(false);
    h.engine.fail_next(FailPoint::LoadMedia, "unsupported container");
    h.player.set_url(Some(URL));

    let events = h.emitter.events();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0],
        streamview_core::PlayerEvent::Error {
            kind: streamview_core::ErrorKind::PlaybackStartFailure,
            message: "failed to load media: unsupported container".into(),
            url: Some(URL.into()),
        }
    );
    assert!(!h.player.intent().playing);
}

#[test]
fn playing_queued_before_url_cleared_is_dropped() {
    let mut h = ControllerHarness::new();
    h.player.set_url(Some(URL));
    h.engine.emit(EngineEvent::Playing);
    h.player.set_url(Some(""));
    h.pump();

    assert!(h.emitter.events().is_empty());
    assert_eq!(h.player.session_state(), Some(SessionState::Stopped));
}

// =========================================================================
// LifecycleReconciler
// =========================================================================

#[test]
fn short_background_takes_light_path() {
    let app = AppLifecycle::new();
    let mut h = playing_reconciler(&app);
    h.engine.clear_calls();

    app.notify(AppActivity::Background);
    h.pump();
    assert!(h.engine.calls().contains(&EngineCall::Pause));
    assert!(h.engine.calls().contains(&EngineCall::Detach));
    assert!(h.player.controller().intent().playing);

    h.advance(Duration::from_millis(500));
    app.notify(AppActivity::Foreground);
    h.pump();
    assert!(h.engine.calls().contains(&EngineCall::Attach));
    assert_eq!(plays(&h), 0);

    // Post-attach settle delay, then play plus a fresh check.
    h.advance(Duration::from_millis(100));
    assert_eq!(plays(&h), 1);
    assert_eq!(loads(&h), 0);
    assert_eq!(last_check_delay(&h), Some(Duration::from_millis(400)));

    h.advance(Duration::from_secs(1));
    assert_eq!(loads(&h), 0);
}

#[test]
fn long_background_forces_reload() {
    let app = AppLifecycle::new();
    let mut h = playing_reconciler(&app);
    h.engine.clear_calls();

    app.notify(AppActivity::Background);
    h.pump();
    h.advance(Duration::from_secs(5));
    app.notify(AppActivity::Foreground);
    h.pump();

    assert_eq!(loads(&h), 1);
    assert_eq!(plays(&h), 1);
    assert_eq!(last_check_delay(&h), Some(Duration::from_millis(1000)));
}

#[test]
fn foreground_without_session_loads_when_resuming() {
    let app = AppLifecycle::new();
    let mut h = ControllerHarness::reconciler(&app);
    h.player.on_attach(SurfaceHandle::new(()));
    h.player.controller_mut().set_paused(false);
    h.engine.fail_next(FailPoint::Construct, "pipeline busy");
    h.player.controller_mut().set_url(Some(URL));
    assert!(!h.player.controller().has_session());

    app.notify(AppActivity::Background);
    app.notify(AppActivity::Foreground);
    h.pump();

    assert!(h.player.controller().has_session());
    assert_eq!(loads(&h), 1);
    assert_eq!(plays(&h), 1);
}

#[test]
fn foreground_without_desire_stays_paused() {
    let app = AppLifecycle::new();
    let mut h = ControllerHarness::reconciler(&app);
    h.player.on_attach(SurfaceHandle::new(()));
    h.player.controller_mut().set_url(Some(URL));

    app.notify(AppActivity::Background);
    h.advance(Duration::from_secs(10));
    app.notify(AppActivity::Foreground);
    h.advance(Duration::from_secs(1));

    assert_eq!(plays(&h), 0);
    assert_eq!(loads(&h), 1);
}

#[test]
fn attach_plays_deferred_request_once() {
    let app = AppLifecycle::new();
    let mut h = ControllerHarness::reconciler(&app);
    h.player.controller_mut().set_paused(false);
    h.player.controller_mut().set_url(Some(URL));
    assert_eq!(plays(&h), 0);

    h.player.on_attach(SurfaceHandle::new(()));
    assert_eq!(plays(&h), 1);
    assert_eq!(h.engine.count(|c| *c == EngineCall::Attach), 1);
}

#[test]
fn detach_pauses_and_reattach_resumes() {
    let app = AppLifecycle::new();
    let mut h = playing_reconciler(&app);
    h.engine.clear_calls();

    h.player.on_detach();
    assert_eq!(
        h.engine.calls(),
        vec![EngineCall::Pause, EngineCall::Detach]
    );
    assert!(!h.player.controller().is_attached());

    h.player.on_attach(SurfaceHandle::new(()));
    assert_eq!(plays(&h), 1);
}

#[test]
fn dispose_unsubscribes_and_ignores_lifecycle() {
    let app = AppLifecycle::new();
    let mut h = playing_reconciler(&app);
    assert!(h.player.is_subscribed());
    assert_eq!(app.listener_count(), 1);

    app.notify(AppActivity::Background);
    h.pump();
    app.notify(AppActivity::Foreground);
    h.pump();

    h.player.dispose();
    h.player.dispose();
    assert_eq!(app.listener_count(), 0);
    assert!(!h.player.is_subscribed());
    assert_eq!(h.engine.live_handles(), 0);

    h.engine.clear_calls();
    app.notify(AppActivity::Background);
    h.player.on_attach(SurfaceHandle::new(()));
    h.advance(Duration::from_secs(10));
    assert!(h.engine.calls().is_empty());
    assert!(h.emitter.events().is_empty());
}

#[test]
fn attach_while_backgrounded_waits_for_foreground() {
    let app = AppLifecycle::new();
    let mut h = playing_reconciler(&app);
    app.notify(AppActivity::Background);
    h.pump();
    h.player.on_detach();
    h.engine.clear_calls();

    h.player.on_attach(SurfaceHandle::new(()));
    h.advance(Duration::from_secs(1));
    assert!(h.player.controller().is_attached());
    assert!(h.engine.calls().is_empty());

    app.notify(AppActivity::Foreground);
    h.pump();
    assert!(h.engine.calls().contains(&EngineCall::Attach));
    h.advance(Duration::from_millis(100));
    assert_eq!(plays(&h), 1);
    assert_eq!(loads(&h), 0);
}

#[test]
fn detached_through_long_background_reloads_on_attach() {
    let app = AppLifecycle::new();
    let mut h = playing_reconciler(&app);
    app.notify(AppActivity::Background);
    h.pump();
    h.player.on_detach();
    h.advance(Duration::from_secs(10));
    app.notify(AppActivity::Foreground);
    h.pump();
    h.engine.clear_calls();

    h.player.on_attach(SurfaceHandle::new(()));
    assert_eq!(loads(&h), 1);
    assert_eq!(plays(&h), 1);
    assert_eq!(last_check_delay(&h), Some(Duration::from_millis(1000)));
}

#[test]
fn detached_background_gap_reaches_watchdog_on_attach() {
    let app = AppLifecycle::new();
    let mut h = playing_reconciler(&app);
    app.notify(AppActivity::Background);
    h.pump();
    h.player.on_detach();
    // Past the long-delay threshold, short of a stale reload.
    h.advance(Duration::from_millis(2500));
    app.notify(AppActivity::Foreground);
    h.pump();
    h.engine.clear_calls();

    h.player.on_attach(SurfaceHandle::new(()));
    assert_eq!(loads(&h), 0);
    assert_eq!(plays(&h), 1);
    assert_eq!(last_check_delay(&h), Some(Duration::from_millis(1000)));
}
