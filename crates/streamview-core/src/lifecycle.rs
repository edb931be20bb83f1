//! View and app lifecycle reconciliation.
//!
//! Two signal families reach a player from outside:
//!
//! - view attachment: the surface appears or disappears
//! - app activity: the whole app moves to the background or comes back
//!
//! [`LifecycleReconciler`] turns both into [`SessionController`] calls and
//! restores the right play state afterwards. [`AppLifecycle`] is the
//! process-wide hub that fans app activity out to every subscribed view.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::PlayerConfig;
use crate::controller::SessionController;
use crate::engine::{EngineEvent, SessionId, SurfaceHandle};
use crate::scheduler::{Clock, TimerTask};

/// App-wide activity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppActivity {
    Foreground,
    Background,
}

type Listener = Arc<dyn Fn(AppActivity) + Send + Sync>;

struct HubState {
    current: AppActivity,
    listeners: Vec<(u64, Listener)>,
    next_id: u64,
}

/// Fan-out of app background/foreground transitions.
///
/// Cloning yields another handle to the same hub. Repeated notifications of the
/// current state are swallowed, so listeners see each real transition once.
#[derive(Clone)]
pub struct AppLifecycle {
    state: Arc<Mutex<HubState>>,
}

impl Default for AppLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl AppLifecycle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                current: AppActivity::Foreground,
                listeners: Vec::new(),
                next_id: 0,
            })),
        }
    }

    pub fn current(&self) -> AppActivity {
        self.state.lock().current
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Registers `listener` until the returned subscription is dropped or
    /// unsubscribed.
    pub fn subscribe(
        &self,
        listener: impl Fn(AppActivity) + Send + Sync + 'static,
    ) -> LifecycleSubscription {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.push((id, Arc::new(listener)));
        LifecycleSubscription {
            id,
            hub: Some(Arc::downgrade(&self.state)),
        }
    }

    /// Publishes a transition. No-op if `activity` is already current.
    pub fn notify(&self, activity: AppActivity) {
        let listeners: Vec<Listener> = {
            let mut state = self.state.lock();
            if state.current == activity {
                return;
            }
            state.current = activity;
            state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        tracing::info!("app moved to {activity:?}, notifying {} views", listeners.len());
        // Called outside the lock so listeners may subscribe/unsubscribe.
        for listener in listeners {
            listener(activity);
        }
    }
}

/// Registration with an [`AppLifecycle`] hub.
///
/// Unsubscribes on drop.
pub struct LifecycleSubscription {
    id: u64,
    hub: Option<Weak<Mutex<HubState>>>,
}

impl LifecycleSubscription {
    /// Removes the listener. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        let Some(hub) = self.hub.take() else {
            return;
        };
        if let Some(state) = hub.upgrade() {
            state.lock().listeners.retain(|(id, _)| *id != self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.hub.is_some()
    }
}

impl Drop for LifecycleSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// State carried from a background event to the matching foreground event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    pub backgrounded_at: Option<Instant>,
    pub was_playing_before_background: bool,
}

/// Resume deferred until the view attaches again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingResume {
    time_away: Duration,
    /// The media was reloaded on foreground already
    reloaded: bool,
}

/// Drives a [`SessionController`] through attach/detach and
/// background/foreground transitions.
pub struct LifecycleReconciler {
    controller: SessionController,
    clock: Arc<dyn Clock>,
    snapshot: LifecycleSnapshot,
    /// Foreground resume of a view that was detached at the time
    pending_resume: Option<PendingResume>,
    stale_background_threshold: Duration,
    subscription: Option<LifecycleSubscription>,
}

impl LifecycleReconciler {
    pub fn new(controller: SessionController, clock: Arc<dyn Clock>, config: &PlayerConfig) -> Self {
        Self {
            controller,
            clock,
            snapshot: LifecycleSnapshot::default(),
            pending_resume: None,
            stale_background_threshold: config.stale_background_threshold(),
            subscription: None,
        }
    }

    /// Takes ownership of the app-lifecycle registration; it is released on
    /// [`dispose`](Self::dispose).
    pub fn bind_subscription(&mut self, subscription: LifecycleSubscription) {
        if self.controller.is_disposed() {
            return;
        }
        self.subscription = Some(subscription);
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut SessionController {
        &mut self.controller
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.snapshot
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(LifecycleSubscription::is_active)
    }

    fn elapsed_since_background(&self) -> Duration {
        self.snapshot
            .backgrounded_at
            .map(|at| self.clock.now().saturating_duration_since(at))
            .unwrap_or_default()
    }

    pub fn on_attach(&mut self, surface: SurfaceHandle) {
        if self.controller.is_disposed() {
            return;
        }
        tracing::debug!("view attached");
        if self.snapshot.backgrounded_at.is_some() {
            // Output stays suspended; on_foreground binds and resumes.
            self.controller.attach(surface);
            return;
        }
        let Some(pending) = self.pending_resume.take() else {
            self.controller.attach(surface);
            return;
        };
        self.controller.set_resume_elapsed(pending.time_away);
        if !pending.reloaded && pending.time_away > self.stale_background_threshold {
            tracing::info!("background gap too long, reloading on attach");
            // Play defers until the surface is bound, keeping the long check delay.
            self.controller.reload(true);
        }
        self.controller.attach(surface);
    }

    pub fn on_detach(&mut self) {
        if self.controller.is_disposed() {
            return;
        }
        tracing::debug!("view detached");
        self.controller.detach();
    }

    pub fn on_background(&mut self) {
        if self.controller.is_disposed() || self.snapshot.backgrounded_at.is_some() {
            return;
        }
        self.snapshot = LifecycleSnapshot {
            backgrounded_at: Some(self.clock.now()),
            was_playing_before_background: self.controller.session_is_playing(),
        };
        tracing::info!(
            "backgrounded (was playing: {})",
            self.snapshot.was_playing_before_background
        );
        self.controller.suspend_output();
    }

    pub fn on_foreground(&mut self) {
        if self.controller.is_disposed() {
            return;
        }
        let time_away = self.elapsed_since_background();
        let should_resume =
            self.snapshot.was_playing_before_background || self.controller.intent().playing;
        self.snapshot = LifecycleSnapshot::default();
        self.pending_resume = None;
        tracing::info!(
            "foregrounded after {}ms (resume: {should_resume})",
            time_away.as_millis()
        );

        self.controller.resume_output();
        if !should_resume || self.controller.intent().url.is_none() {
            return;
        }
        if !self.controller.is_attached() {
            // Detached views resume from on_attach with this gap.
            let reloaded = !self.controller.has_session();
            if reloaded {
                self.controller.reload(true);
            }
            self.pending_resume = Some(PendingResume { time_away, reloaded });
            return;
        }
        self.controller.set_resume_elapsed(time_away);
        if !self.controller.has_session() {
            self.controller.reload(true);
            return;
        }
        if time_away > self.stale_background_threshold {
            tracing::info!("background gap too long, reloading");
            self.controller.reload(true);
        } else {
            self.controller.schedule_deferred_play();
        }
    }

    pub fn handle_app_activity(&mut self, activity: AppActivity) {
        match activity {
            AppActivity::Background => self.on_background(),
            AppActivity::Foreground => self.on_foreground(),
        }
    }

    pub fn handle_engine_event(&mut self, id: SessionId, event: EngineEvent) {
        self.controller.handle_engine_event(id, event);
    }

    pub fn fire(&mut self, task: TimerTask) {
        self.controller.fire(task);
    }

    /// Unsubscribes from app lifecycle, then disposes the controller.
    pub fn dispose(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.controller.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_hub_dedupes_transitions() {
        let hub = AppLifecycle::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _sub = hub.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        hub.notify(AppActivity::Foreground);
        hub.notify(AppActivity::Background);
        hub.notify(AppActivity::Background);
        hub.notify(AppActivity::Foreground);

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_is_idempotent_and_runs_on_drop() {
        let hub = AppLifecycle::new();
        let mut a = hub.subscribe(|_| {});
        let b = hub.subscribe(|_| {});
        assert_eq!(hub.listener_count(), 2);

        a.unsubscribe();
        a.unsubscribe();
        assert!(!a.is_active());
        assert_eq!(hub.listener_count(), 1);

        drop(b);
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn test_subscription_outlives_hub() {
        let hub = AppLifecycle::new();
        let mut sub = hub.subscribe(|_| {});
        drop(hub);
        sub.unsubscribe();
        assert!(!sub.is_active());
    }
}
