//! Deterministic doubles for controller tests.
//!
//! Everything here runs on the test thread: [`ManualScheduler`] and
//! [`ManualClock`] replace wall time, [`FakeEngine`] records every engine call
//! and can be scripted to fail, and [`ControllerHarness`] wires them to a
//! [`SessionController`] or [`LifecycleReconciler`] the way
//! [`PlayerView`](crate::runtime::PlayerView) does with real threads.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use url::Url;

use crate::config::PlayerConfig;
use crate::controller::{ControllerParts, SessionController};
use crate::engine::{
    DecoderEngine, DecoderHandle, EngineEvent, EngineEventSink, SessionId, SurfaceHandle,
    VideoScale,
};
use crate::error::EngineError;
use crate::events::{EventEmitter, PlayerEvent};
use crate::lifecycle::{AppActivity, AppLifecycle, LifecycleReconciler};
use crate::scheduler::{Clock, TaskScheduler, TimerTask};

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Construct { init_options: Vec<String> },
    LoadMedia { url: String, options: Vec<String> },
    ReleaseMedia,
    Play,
    Pause,
    Stop,
    Attach,
    Detach,
    SetAspectRatio(Option<String>),
    SetVideoScale(VideoScale),
    Release,
}

/// Engine operations that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Construct,
    LoadMedia,
    Play,
    Pause,
    Stop,
    Attach,
    Detach,
    Release,
}

impl FailPoint {
    fn error(self, message: String) -> EngineError {
        match self {
            FailPoint::Construct => EngineError::Construction(message),
            FailPoint::LoadMedia => EngineError::Load(message),
            FailPoint::Play | FailPoint::Pause | FailPoint::Stop => EngineError::Playback(message),
            FailPoint::Attach | FailPoint::Detach => EngineError::Surface(message),
            FailPoint::Release => EngineError::Release(message),
        }
    }
}

#[derive(Default)]
struct FakeState {
    calls: Vec<EngineCall>,
    failures: HashMap<FailPoint, VecDeque<String>>,
    video_output: bool,
    constructed: usize,
    released: usize,
    sinks: Vec<EngineEventSink>,
}

impl FakeState {
    fn record(&mut self, call: EngineCall, point: Option<FailPoint>) -> Result<(), EngineError> {
        self.calls.push(call);
        let Some(point) = point else {
            return Ok(());
        };
        match self.failures.get_mut(&point).and_then(VecDeque::pop_front) {
            Some(message) => Err(point.error(message)),
            None => Ok(()),
        }
    }
}

/// Recording decoder engine. Clones share state.
#[derive(Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<FakeState>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Makes the next call at `point` fail with `message`.
    pub fn fail_next(&self, point: FailPoint, message: &str) {
        self.state
            .lock()
            .failures
            .entry(point)
            .or_default()
            .push_back(message.to_string());
    }

    /// Sets what `has_video_output` reports for every handle.
    pub fn set_video_output(&self, present: bool) {
        self.state.lock().video_output = present;
    }

    pub fn constructed(&self) -> usize {
        self.state.lock().constructed
    }

    /// Handles constructed and not yet released.
    pub fn live_handles(&self) -> usize {
        let state = self.state.lock();
        state.constructed - state.released
    }

    /// Sink of the most recently constructed handle.
    pub fn latest_sink(&self) -> Option<EngineEventSink> {
        self.state.lock().sinks.last().cloned()
    }

    /// Emits `event` from the most recently constructed handle.
    pub fn emit(&self, event: EngineEvent) {
        if let Some(sink) = self.latest_sink() {
            sink.send(event);
        }
    }
}

impl DecoderEngine for FakeEngine {
    fn construct(
        &mut self,
        init_options: &[String],
        events: EngineEventSink,
    ) -> Result<Box<dyn DecoderHandle>, EngineError> {
        let mut state = self.state.lock();
        state.record(
            EngineCall::Construct {
                init_options: init_options.to_vec(),
            },
            Some(FailPoint::Construct),
        )?;
        state.constructed += 1;
        state.sinks.push(events);
        Ok(Box::new(FakeHandle {
            state: Arc::clone(&self.state),
            playing: false,
            released: false,
        }))
    }
}

struct FakeHandle {
    state: Arc<Mutex<FakeState>>,
    playing: bool,
    released: bool,
}

impl FakeHandle {
    fn record(&self, call: EngineCall, point: Option<FailPoint>) -> Result<(), EngineError> {
        self.state.lock().record(call, point)
    }
}

impl DecoderHandle for FakeHandle {
    fn load_media(&mut self, url: &Url, media_options: &[String]) -> Result<(), EngineError> {
        self.record(
            EngineCall::LoadMedia {
                url: url.to_string(),
                options: media_options.to_vec(),
            },
            Some(FailPoint::LoadMedia),
        )
    }

    fn release_media(&mut self) -> Result<(), EngineError> {
        self.record(EngineCall::ReleaseMedia, None)
    }

    fn play(&mut self) -> Result<(), EngineError> {
        self.record(EngineCall::Play, Some(FailPoint::Play))?;
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.playing = false;
        self.record(EngineCall::Pause, Some(FailPoint::Pause))
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.playing = false;
        self.record(EngineCall::Stop, Some(FailPoint::Stop))
    }

    fn attach(&mut self, _surface: &SurfaceHandle) -> Result<(), EngineError> {
        self.record(EngineCall::Attach, Some(FailPoint::Attach))
    }

    fn detach(&mut self) -> Result<(), EngineError> {
        self.record(EngineCall::Detach, Some(FailPoint::Detach))
    }

    fn has_video_output(&self) -> bool {
        self.state.lock().video_output
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn set_aspect_ratio(&mut self, ratio: Option<&str>) -> Result<(), EngineError> {
        self.record(EngineCall::SetAspectRatio(ratio.map(str::to_string)), None)
    }

    fn set_video_scale(&mut self, scale: VideoScale) -> Result<(), EngineError> {
        self.record(EngineCall::SetVideoScale(scale), None)
    }

    fn release(&mut self) -> Result<(), EngineError> {
        self.playing = false;
        let result = self.record(EngineCall::Release, Some(FailPoint::Release));
        if !self.released {
            self.released = true;
            self.state.lock().released += 1;
        }
        result
    }
}

/// Clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Moves the clock forward to `at`; never backwards.
    pub fn advance_to(&self, at: Instant) {
        let mut now = self.now.lock();
        if at > *now {
            *now = at;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

#[derive(Default)]
struct ManualQueue {
    pending: Vec<(Instant, u64, TimerTask)>,
    history: Vec<(Duration, TimerTask)>,
    seq: u64,
}

/// Scheduler that queues tasks against a [`ManualClock`].
#[derive(Clone)]
pub struct ManualScheduler {
    clock: ManualClock,
    queue: Arc<Mutex<ManualQueue>>,
}

impl ManualScheduler {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            queue: Arc::new(Mutex::new(ManualQueue::default())),
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().pending.len()
    }

    /// Every `(delay, task)` ever scheduled, in order.
    pub fn history(&self) -> Vec<(Duration, TimerTask)> {
        self.queue.lock().history.clone()
    }

    /// Removes and returns the earliest task due at or before `until`.
    pub fn pop_due(&self, until: Instant) -> Option<(Instant, TimerTask)> {
        let mut queue = self.queue.lock();
        let idx = queue
            .pending
            .iter()
            .enumerate()
            .filter(|(_, (deadline, _, _))| *deadline <= until)
            .min_by_key(|(_, (deadline, seq, _))| (*deadline, *seq))
            .map(|(idx, _)| idx)?;
        let (deadline, _, task) = queue.pending.remove(idx);
        Some((deadline, task))
    }
}

impl TaskScheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, task: TimerTask) {
        let deadline = self.clock.now() + delay;
        let mut queue = self.queue.lock();
        let seq = queue.seq;
        queue.seq += 1;
        queue.pending.push((deadline, seq, task));
        queue.history.push((delay, task));
    }
}

/// Collects emitted [`PlayerEvent`]s.
#[derive(Clone, Default)]
pub struct RecordingEmitter {
    events: Arc<Mutex<Vec<PlayerEvent>>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitter(&self) -> EventEmitter {
        let events = Arc::clone(&self.events);
        EventEmitter::new(move |event| events.lock().push(event))
    }

    pub fn events(&self) -> Vec<PlayerEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// Something a [`ControllerHarness`] can drive.
pub trait DrivenPlayer {
    fn deliver_engine_event(&mut self, id: SessionId, event: EngineEvent);
    fn fire_task(&mut self, task: TimerTask);
    fn deliver_activity(&mut self, _activity: AppActivity) {}
}

impl DrivenPlayer for SessionController {
    fn deliver_engine_event(&mut self, id: SessionId, event: EngineEvent) {
        self.handle_engine_event(id, event);
    }

    fn fire_task(&mut self, task: TimerTask) {
        self.fire(task);
    }
}

impl DrivenPlayer for LifecycleReconciler {
    fn deliver_engine_event(&mut self, id: SessionId, event: EngineEvent) {
        self.handle_engine_event(id, event);
    }

    fn fire_task(&mut self, task: TimerTask) {
        self.fire(task);
    }

    fn deliver_activity(&mut self, activity: AppActivity) {
        self.handle_app_activity(activity);
    }
}

enum Inbox {
    Engine(SessionId, EngineEvent),
    Activity(AppActivity),
}

/// Single-threaded stand-in for the owner-thread runtime.
///
/// Engine callbacks and app-activity notifications are queued and applied on
/// [`pump`](Self::pump); timers fire in deadline order on
/// [`advance`](Self::advance).
pub struct ControllerHarness<P = SessionController> {
    pub player: P,
    pub engine: FakeEngine,
    pub scheduler: ManualScheduler,
    pub clock: ManualClock,
    pub emitter: RecordingEmitter,
    inbox: Receiver<Inbox>,
}

struct Wiring {
    controller: SessionController,
    engine: FakeEngine,
    scheduler: ManualScheduler,
    clock: ManualClock,
    emitter: RecordingEmitter,
    inbox_tx: Sender<Inbox>,
    inbox: Receiver<Inbox>,
}

fn wire(config: &PlayerConfig) -> Wiring {
    let engine = FakeEngine::new();
    let clock = ManualClock::new();
    let scheduler = ManualScheduler::new(clock.clone());
    let emitter = RecordingEmitter::new();
    let (inbox_tx, inbox) = crossbeam_channel::unbounded();

    let route_tx = inbox_tx.clone();
    let controller = SessionController::new(
        config,
        ControllerParts {
            engine: Box::new(engine.clone()),
            scheduler: Box::new(scheduler.clone()),
            emitter: emitter.emitter(),
            engine_events: Arc::new(move |id, event| {
                let _ = route_tx.send(Inbox::Engine(id, event));
            }),
        },
    );

    Wiring {
        controller,
        engine,
        scheduler,
        clock,
        emitter,
        inbox_tx,
        inbox,
    }
}

impl ControllerHarness<SessionController> {
    pub fn new() -> Self {
        Self::with_config(PlayerConfig::default())
    }

    pub fn with_config(config: PlayerConfig) -> Self {
        let w = wire(&config);
        Self {
            player: w.controller,
            engine: w.engine,
            scheduler: w.scheduler,
            clock: w.clock,
            emitter: w.emitter,
            inbox: w.inbox,
        }
    }
}

impl Default for ControllerHarness<SessionController> {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerHarness<LifecycleReconciler> {
    /// Reconciler subscribed to `app`.
    pub fn reconciler(app: &AppLifecycle) -> Self {
        Self::reconciler_with_config(app, PlayerConfig::default())
    }

    pub fn reconciler_with_config(app: &AppLifecycle, config: PlayerConfig) -> Self {
        let w = wire(&config);
        let mut reconciler =
            LifecycleReconciler::new(w.controller, Arc::new(w.clock.clone()), &config);
        let activity_tx = w.inbox_tx.clone();
        reconciler.bind_subscription(app.subscribe(move |activity| {
            let _ = activity_tx.send(Inbox::Activity(activity));
        }));
        Self {
            player: reconciler,
            engine: w.engine,
            scheduler: w.scheduler,
            clock: w.clock,
            emitter: w.emitter,
            inbox: w.inbox,
        }
    }
}

impl<P: DrivenPlayer> ControllerHarness<P> {
    /// Applies queued engine events and app notifications.
    pub fn pump(&mut self) {
        while let Ok(msg) = self.inbox.try_recv() {
            match msg {
                Inbox::Engine(id, event) => self.player.deliver_engine_event(id, event),
                Inbox::Activity(activity) => self.player.deliver_activity(activity),
            }
        }
    }

    /// Moves time forward by `by`, firing every task that comes due.
    pub fn advance(&mut self, by: Duration) {
        let target = self.clock.now() + by;
        self.pump();
        while let Some((deadline, task)) = self.scheduler.pop_due(target) {
            self.clock.advance_to(deadline);
            self.player.fire_task(task);
            self.pump();
        }
        self.clock.advance_to(target);
    }
}
