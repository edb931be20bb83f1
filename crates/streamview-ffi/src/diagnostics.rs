//! FFI safety diagnostics: player registry + debug metrics.
//!
//! ## Always-on (release + debug)
//!
//! **Player registry**: Tracks live player pointers in a `HashSet<usize>`.
//! - `register_player(ptr)`: adds pointer, returns false if already present.
//! - `unregister_player(ptr)`: removes pointer, returns false if unknown (double-free attempt).
//!
//! Used by `streamview_player_destroy` to prevent double-free UB in production.
//!
//! ## Debug-only (`cfg(debug_assertions)`)
//!
//! **Metrics**: Counters for created/destroyed/peak/live players, engine
//! events delivered through `streamview_engine_emit`, and total FFI calls.
//! Exposed via `snapshot()` → `FfiMetricsSnapshot`.
//!
//! ## Limitations
//!
//! Address-only tracking cannot detect stale-pointer aliasing after allocator
//! reuse. The registry catches a repeated destroy of the same pointer without an
//! intervening allocation, nothing more.

use std::collections::HashSet;
use std::sync::LazyLock;

use parking_lot::Mutex;

static PLAYER_REGISTRY: LazyLock<Mutex<HashSet<usize>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Registers a player pointer. Returns `false` if already registered (bug).
pub fn register_player(ptr: *const u8) -> bool {
    PLAYER_REGISTRY.lock().insert(ptr as usize)
}

/// Unregisters a player pointer. Returns `false` if unknown (double-free attempt).
pub fn unregister_player(ptr: *const u8) -> bool {
    PLAYER_REGISTRY.lock().remove(&(ptr as usize))
}

/// Returns true if `ptr` is a live player.
pub fn is_registered(ptr: *const u8) -> bool {
    PLAYER_REGISTRY.lock().contains(&(ptr as usize))
}

#[cfg(debug_assertions)]
mod metrics {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::LazyLock;

    use parking_lot::Mutex;

    struct FfiMetrics {
        players_created: AtomicU64,
        players_destroyed: AtomicU64,
        players_peak: AtomicU64,
        engine_events: AtomicU64,
        ffi_calls: AtomicU64,
        // Protected by lock for correct peak tracking
        players_live: Mutex<u64>,
    }

    static METRICS: LazyLock<FfiMetrics> = LazyLock::new(|| FfiMetrics {
        players_created: AtomicU64::new(0),
        players_destroyed: AtomicU64::new(0),
        players_peak: AtomicU64::new(0),
        engine_events: AtomicU64::new(0),
        ffi_calls: AtomicU64::new(0),
        players_live: Mutex::new(0),
    });

    pub fn record_player_created() {
        METRICS.players_created.fetch_add(1, Ordering::Relaxed);
        let mut live = METRICS.players_live.lock();
        *live += 1;
        METRICS.players_peak.fetch_max(*live, Ordering::Relaxed);
    }

    pub fn record_player_destroyed() {
        METRICS.players_destroyed.fetch_add(1, Ordering::Relaxed);
        let mut live = METRICS.players_live.lock();
        *live = live.saturating_sub(1);
    }

    pub fn record_engine_event() {
        METRICS.engine_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ffi_call() {
        METRICS.ffi_calls.fetch_add(1, Ordering::Relaxed);
    }

    #[derive(Debug, Clone, Copy, Default)]
    pub struct FfiMetricsSnapshot {
        pub players_created: u64,
        pub players_destroyed: u64,
        pub players_peak: u64,
        pub players_live: u64,
        pub engine_events: u64,
        pub ffi_calls: u64,
    }

    pub fn snapshot() -> FfiMetricsSnapshot {
        FfiMetricsSnapshot {
            players_created: METRICS.players_created.load(Ordering::Relaxed),
            players_destroyed: METRICS.players_destroyed.load(Ordering::Relaxed),
            players_peak: METRICS.players_peak.load(Ordering::Relaxed),
            players_live: *METRICS.players_live.lock(),
            engine_events: METRICS.engine_events.load(Ordering::Relaxed),
            ffi_calls: METRICS.ffi_calls.load(Ordering::Relaxed),
        }
    }
}

#[cfg(debug_assertions)]
pub use metrics::{
    record_engine_event, record_ffi_call, record_player_created, record_player_destroyed,
    snapshot, FfiMetricsSnapshot,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_detects_double_unregister() {
        let value = Box::new(0u8);
        let ptr = &*value as *const u8;

        assert!(register_player(ptr));
        assert!(!register_player(ptr));
        assert!(is_registered(ptr));
        assert!(unregister_player(ptr));
        assert!(!unregister_player(ptr));
        assert!(!is_registered(ptr));
    }
}
