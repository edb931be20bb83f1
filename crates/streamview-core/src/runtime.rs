//! Owner-thread runtime.
//!
//! A [`PlayerView`] spawns one named thread that owns a
//! [`LifecycleReconciler`] (and through it the controller, session and
//! counters). Everything that may happen on another thread is turned into a
//! [`ViewCommand`] and sent over a crossbeam channel:
//!
//! ```text
//! host setters ──┐
//! engine sinks ──┼──► command channel ──► owner thread ──► controller
//! app lifecycle ─┤                            ▲
//! timers ────────┘        deadline heap ──────┘ (recv_timeout)
//! ```
//!
//! No lock guards controller state; only the owner thread ever touches it.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::config::PlayerConfig;
use crate::controller::{ControllerParts, SessionController};
use crate::engine::{DecoderEngine, EngineEvent, SessionId, SurfaceHandle};
use crate::events::{EventEmitter, PlayerEvent};
use crate::intent::ResizeMode;
use crate::lifecycle::{AppActivity, AppLifecycle, LifecycleReconciler};
use crate::options::merge_split_options;
use crate::scheduler::{SystemClock, TaskScheduler, TimerTask};

const OWNER_THREAD_NAME: &str = "streamview-owner";

/// Work marshaled onto the owner thread.
#[derive(Debug)]
pub enum ViewCommand {
    SetUrl(Option<String>),
    SetOptions(Option<Vec<String>>),
    SetPaused(bool),
    SetAspectRatio(Option<String>),
    SetResizeMode(ResizeMode),
    Retry,
    Attach(SurfaceHandle),
    Detach,
    App(AppActivity),
    Engine(SessionId, EngineEvent),
    /// Schedule `task` at `deadline`
    Arm { deadline: Instant, task: TimerTask },
    /// Reply once every earlier command has been applied
    Sync(Sender<()>),
    /// Tear down and exit; the sender (if any) is acked when done
    Dispose(Option<Sender<()>>),
}

/// Scheduler that arms timers on the owner thread's deadline heap.
struct ThreadScheduler {
    commands: Sender<ViewCommand>,
}

impl TaskScheduler for ThreadScheduler {
    fn schedule(&mut self, delay: Duration, task: TimerTask) {
        let deadline = Instant::now() + delay;
        let _ = self.commands.send(ViewCommand::Arm { deadline, task });
    }
}

/// Handle to one player and its owner thread.
///
/// Every method is non-blocking except [`dispose`](Self::dispose) and
/// [`sync`](Self::sync) when called from another thread.
pub struct PlayerView {
    command_tx: Sender<ViewCommand>,
    thread: Option<JoinHandle<()>>,
    owner: ThreadId,
    disposed: Arc<AtomicBool>,
}

impl PlayerView {
    /// Starts a player.
    ///
    /// `on_event` runs on the owner thread. If `app` is given the player
    /// follows its background/foreground transitions until disposed.
    pub fn spawn(
        config: PlayerConfig,
        engine: Box<dyn DecoderEngine>,
        mut on_event: impl FnMut(PlayerEvent) + Send + 'static,
        app: Option<&AppLifecycle>,
    ) -> io::Result<Self> {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let disposed = Arc::new(AtomicBool::new(false));

        let gate = Arc::clone(&disposed);
        let emitter = EventEmitter::new(move |event| {
            if !gate.load(Ordering::Acquire) {
                on_event(event);
            }
        });

        let route_tx = command_tx.clone();
        let controller = SessionController::new(
            &config,
            ControllerParts {
                engine,
                scheduler: Box::new(ThreadScheduler {
                    commands: command_tx.clone(),
                }),
                emitter,
                engine_events: Arc::new(move |id, event| {
                    let _ = route_tx.send(ViewCommand::Engine(id, event));
                }),
            },
        );
        let mut reconciler = LifecycleReconciler::new(controller, Arc::new(SystemClock), &config);
        if let Some(app) = app {
            let app_tx = command_tx.clone();
            reconciler.bind_subscription(app.subscribe(move |activity| {
                let _ = app_tx.send(ViewCommand::App(activity));
            }));
        }

        let thread = thread::Builder::new()
            .name(OWNER_THREAD_NAME.to_string())
            .spawn(move || owner_loop(reconciler, command_rx))?;
        let owner = thread.thread().id();
        tracing::info!("player view started");

        Ok(Self {
            command_tx,
            thread: Some(thread),
            owner,
            disposed,
        })
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn send(&self, command: ViewCommand) {
        if self.is_disposed() {
            return;
        }
        if self.command_tx.send(command).is_err() {
            tracing::warn!("owner thread gone, dropping command");
        }
    }

    pub fn set_url(&self, url: Option<&str>) {
        self.send(ViewCommand::SetUrl(url.map(str::to_string)));
    }

    pub fn set_options(&self, options: Option<Vec<String>>) {
        self.send(ViewCommand::SetOptions(options));
    }

    /// Accepts separate init and media lists and merges them into one options
    /// list.
    pub fn set_split_options(&self, init: Option<&[String]>, media: Option<&[String]>) {
        if init.is_none() && media.is_none() {
            self.set_options(None);
            return;
        }
        let merged = merge_split_options(init.unwrap_or_default(), media.unwrap_or_default());
        self.set_options(Some(merged));
    }

    pub fn set_paused(&self, paused: bool) {
        self.send(ViewCommand::SetPaused(paused));
    }

    pub fn set_aspect_ratio(&self, ratio: Option<&str>) {
        self.send(ViewCommand::SetAspectRatio(ratio.map(str::to_string)));
    }

    pub fn set_resize_mode(&self, mode: ResizeMode) {
        self.send(ViewCommand::SetResizeMode(mode));
    }

    pub fn retry(&self) {
        self.send(ViewCommand::Retry);
    }

    pub fn attach(&self, surface: SurfaceHandle) {
        self.send(ViewCommand::Attach(surface));
    }

    pub fn detach(&self) {
        self.send(ViewCommand::Detach);
    }

    /// Delivers an app transition directly, for hosts without an
    /// [`AppLifecycle`] hub.
    pub fn app_activity(&self, activity: AppActivity) {
        self.send(ViewCommand::App(activity));
    }

    /// Blocks until every command sent before this call has been applied.
    ///
    /// Returns immediately on the owner thread or after disposal.
    pub fn sync(&self) {
        if self.is_disposed() || thread::current().id() == self.owner {
            return;
        }
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if self.command_tx.send(ViewCommand::Sync(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Tears the player down. Idempotent.
    ///
    /// Off the owner thread this blocks until teardown has finished; no event
    /// reaches the host after it returns.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if thread::current().id() == self.owner {
            let _ = self.command_tx.send(ViewCommand::Dispose(None));
            return;
        }
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if self
            .command_tx
            .send(ViewCommand::Dispose(Some(ack_tx)))
            .is_ok()
        {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for PlayerView {
    fn drop(&mut self) {
        self.dispose();
        if thread::current().id() == self.owner {
            return;
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("owner thread panicked");
            }
        }
    }
}

fn owner_loop(mut reconciler: LifecycleReconciler, commands: Receiver<ViewCommand>) {
    let mut timers: BinaryHeap<Reverse<(Instant, u64, TimerTask)>> = BinaryHeap::new();
    let mut seq = 0u64;

    loop {
        let command = match timers.peek() {
            Some(Reverse((deadline, _, _))) => {
                let now = Instant::now();
                if *deadline <= now {
                    if let Some(Reverse((_, _, task))) = timers.pop() {
                        reconciler.fire(task);
                    }
                    continue;
                }
                match commands.recv_timeout(*deadline - now) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match commands.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
        };

        match command {
            ViewCommand::SetUrl(url) => reconciler.controller_mut().set_url(url.as_deref()),
            ViewCommand::SetOptions(options) => {
                reconciler.controller_mut().set_options(options.as_deref())
            }
            ViewCommand::SetPaused(paused) => reconciler.controller_mut().set_paused(paused),
            ViewCommand::SetAspectRatio(ratio) => {
                reconciler.controller_mut().set_aspect_ratio(ratio.as_deref())
            }
            ViewCommand::SetResizeMode(mode) => reconciler.controller_mut().set_resize_mode(mode),
            ViewCommand::Retry => reconciler.controller_mut().retry(),
            ViewCommand::Attach(surface) => reconciler.on_attach(surface),
            ViewCommand::Detach => reconciler.on_detach(),
            ViewCommand::App(activity) => reconciler.handle_app_activity(activity),
            ViewCommand::Engine(id, event) => reconciler.handle_engine_event(id, event),
            ViewCommand::Arm { deadline, task } => {
                timers.push(Reverse((deadline, seq, task)));
                seq += 1;
            }
            ViewCommand::Sync(ack) => {
                let _ = ack.send(());
            }
            ViewCommand::Dispose(ack) => {
                reconciler.dispose();
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
                break;
            }
        }
    }

    reconciler.dispose();
    tracing::info!("owner thread exiting");
}
