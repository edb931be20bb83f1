//! C FFI layer for streamview-core (iOS/Android host integration).
//!
//! Provides `#[no_mangle] pub extern "C"` entry points matching
//! `include/Streamview.h`. All functions are thread-safe; every player call is
//! marshaled onto that player's owner thread and returns immediately, except
//! `streamview_player_sync`, `streamview_player_dispose` and
//! `streamview_player_destroy`, which wait for the owner thread.
//!
//! The decoder engine is supplied by the host as a [`StreamviewEngineVTable`].
//! Player events come back through a [`StreamviewEventCallback`] invoked on the
//! owner thread.

// FFI functions intentionally take raw pointers without `unsafe` on the fn signature.
// Safety is enforced inside each function body via null checks + ffi_boundary().
#![allow(clippy::not_unsafe_ptr_arg_deref)]
#![allow(clippy::macro_metavars_in_unsafe)]

pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod handle;
pub mod safety;

use std::ffi::c_void;
use std::os::raw::c_char;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::LazyLock;

use streamview_core::{
    AppActivity, AppLifecycle, PlayerConfig, PlayerView, ResizeMode, SurfaceHandle,
};
use tracing_subscriber::EnvFilter;

pub use crate::engine::{StreamviewEngineSink, StreamviewEngineVTable, StreamviewVideoScale};
pub use crate::handle::{
    StreamviewEvent, StreamviewEventCallback, StreamviewEventKind, StreamviewPlayer,
};

use crate::engine::{FfiEngine, HostSurface};
use crate::error::StreamviewError;
use crate::handle::{EventForwarder, HostPtr};
use crate::safety::{ffi_boundary, ffi_boundary_or, opt_str, opt_str_list};

/// Process-wide app activity hub every player subscribes to.
static APP_LIFECYCLE: LazyLock<AppLifecycle> = LazyLock::new(AppLifecycle::new);

fn player_ref<'a>(
    player: *const StreamviewPlayer,
) -> Result<&'a StreamviewPlayer, StreamviewError> {
    Ok(check_not_null!(player))
}

fn load_config(config_toml: *const c_char) -> Result<PlayerConfig, StreamviewError> {
    let text = unsafe { opt_str(config_toml) }?;
    let mut config = match text {
        Some(text) => PlayerConfig::from_toml_str(text).map_err(|e| {
            tracing::error!("FFI: rejected player config: {e}");
            StreamviewError::InvalidArgument
        })?,
        None => PlayerConfig::default(),
    };
    config.apply_env_overrides().map_err(|e| {
        tracing::error!("FFI: rejected environment override: {e}");
        StreamviewError::InvalidArgument
    })?;
    Ok(config)
}

// =========================================================================
// Player lifecycle
// =========================================================================

/// Creates a player driving the engine described by `vtable`.
///
/// `config_toml` may be NULL for defaults. `callback` may be NULL to ignore
/// events. Once the vtable is accepted `engine_ctx` belongs to the player:
/// `destroy_ctx` runs when the player is destroyed or when creation fails
/// afterwards.
///
/// # Safety
/// - `vtable` must point to a valid `StreamviewEngineVTable`.
/// - `config_toml` must be NULL or a valid null-terminated UTF-8 C string.
/// - `out_player` must be a valid non-null pointer to a `*mut StreamviewPlayer`.
#[no_mangle]
pub extern "C" fn streamview_player_create(
    vtable: *const StreamviewEngineVTable,
    engine_ctx: *mut c_void,
    config_toml: *const c_char,
    callback: Option<StreamviewEventCallback>,
    user_data: *mut c_void,
    out_player: *mut *mut StreamviewPlayer,
) -> i32 {
    ffi_boundary(|| {
        if vtable.is_null() || out_player.is_null() {
            return Err(StreamviewError::NullPtr);
        }

        // Null out first so callers always see NULL on failure
        unsafe {
            *out_player = std::ptr::null_mut();
        }

        let vtable = unsafe { *vtable };
        if !vtable.is_complete() {
            tracing::error!("FFI: engine vtable is missing required entries");
            return Err(StreamviewError::InvalidArgument);
        }
        let engine = FfiEngine::new(vtable, engine_ctx);
        let config = load_config(config_toml)?;

        let forwarder = EventForwarder {
            callback,
            user_data: HostPtr(user_data),
        };
        let view = PlayerView::spawn(
            config,
            Box::new(engine),
            move |event| forwarder.forward(event),
            Some(&*APP_LIFECYCLE),
        )
        .map_err(|e| {
            tracing::error!("FFI: failed to spawn player thread: {e}");
            StreamviewError::Internal
        })?;

        let raw = Box::into_raw(Box::new(StreamviewPlayer { view }));
        diagnostics::register_player(raw as *const u8);
        #[cfg(debug_assertions)]
        diagnostics::record_player_created();

        unsafe {
            *out_player = raw;
        }
        Ok(())
    })
}

/// Destroys a player: tears down its session, joins its owner thread and frees
/// the handle.
///
/// # Safety
/// - `player` must be a valid non-null pointer to a `*mut StreamviewPlayer`.
/// - After return, `*player` is NULL.
/// - Must not be called from inside the player's own event callback; use
///   `streamview_player_dispose` there.
#[no_mangle]
pub extern "C" fn streamview_player_destroy(player: *mut *mut StreamviewPlayer) -> i32 {
    ffi_boundary(|| {
        if player.is_null() {
            return Err(StreamviewError::NullPtr);
        }

        // Atomic swap: read the pointer and null it in one operation so two
        // threads cannot both reach Box::from_raw.
        let atomic = unsafe { AtomicPtr::from_ptr(player) };
        let player_ptr = atomic.swap(std::ptr::null_mut(), Ordering::AcqRel);

        if player_ptr.is_null() {
            return Ok(()); // Already destroyed
        }

        if !diagnostics::unregister_player(player_ptr as *const u8) {
            tracing::error!(
                "FFI: streamview_player_destroy called with unknown pointer {:?} (possible double-free)",
                player_ptr
            );
            return Err(StreamviewError::Internal);
        }

        // Drop: PlayerView disposes and joins the owner thread
        let _player = unsafe { Box::from_raw(player_ptr) };

        #[cfg(debug_assertions)]
        diagnostics::record_player_destroyed();

        Ok(())
    })
}

/// Tears the player down without freeing the handle. Idempotent.
///
/// Safe to call from the event callback. Later calls on the handle return
/// `STREAMVIEW_ERROR_DISPOSED`.
///
/// # Safety
/// `player` must be a valid non-null `StreamviewPlayer` pointer.
#[no_mangle]
pub extern "C" fn streamview_player_dispose(player: *const StreamviewPlayer) -> i32 {
    ffi_boundary(|| {
        player_ref(player)?.view.dispose();
        Ok(())
    })
}

/// Blocks until every call made before it has been applied.
///
/// # Safety
/// `player` must be a valid non-null `StreamviewPlayer` pointer.
#[no_mangle]
pub extern "C" fn streamview_player_sync(player: *const StreamviewPlayer) -> i32 {
    ffi_boundary(|| {
        player_ref(player)?.live_view()?.sync();
        Ok(())
    })
}

// =========================================================================
// Host props
// =========================================================================

/// Sets the stream url. NULL or empty stops playback.
///
/// # Safety
/// - `player` must be a valid non-null `StreamviewPlayer` pointer.
/// - `url` must be NULL or a valid null-terminated C string.
#[no_mangle]
pub extern "C" fn streamview_player_set_url(
    player: *const StreamviewPlayer,
    url: *const c_char,
) -> i32 {
    ffi_boundary(|| {
        let view = player_ref(player)?.live_view()?;
        let url = unsafe { opt_str(url) }?;
        view.set_url(url);
        Ok(())
    })
}

/// Sets the desired paused state.
///
/// # Safety
/// `player` must be a valid non-null `StreamviewPlayer` pointer.
#[no_mangle]
pub extern "C" fn streamview_player_set_paused(
    player: *const StreamviewPlayer,
    paused: bool,
) -> i32 {
    ffi_boundary(|| {
        player_ref(player)?.live_view()?.set_paused(paused);
        Ok(())
    })
}

/// Sets the decoder option list. Entries starting with `:` are media options,
/// the rest are init options. A NULL list restores the defaults.
///
/// # Safety
/// - `player` must be a valid non-null `StreamviewPlayer` pointer.
/// - `options` must be NULL or point to `count` valid C strings.
#[no_mangle]
pub extern "C" fn streamview_player_set_options(
    player: *const StreamviewPlayer,
    options: *const *const c_char,
    count: usize,
) -> i32 {
    ffi_boundary(|| {
        let view = player_ref(player)?.live_view()?;
        let options = unsafe { opt_str_list(options, count) }?;
        view.set_options(options);
        Ok(())
    })
}

/// Sets init and media options as two separate lists.
///
/// # Safety
/// - `player` must be a valid non-null `StreamviewPlayer` pointer.
/// - `init` / `media` must each be NULL or point to `init_count` /
///   `media_count` valid C strings.
#[no_mangle]
pub extern "C" fn streamview_player_set_split_options(
    player: *const StreamviewPlayer,
    init: *const *const c_char,
    init_count: usize,
    media: *const *const c_char,
    media_count: usize,
) -> i32 {
    ffi_boundary(|| {
        let view = player_ref(player)?.live_view()?;
        let init = unsafe { opt_str_list(init, init_count) }?;
        let media = unsafe { opt_str_list(media, media_count) }?;
        view.set_split_options(init.as_deref(), media.as_deref());
        Ok(())
    })
}

/// Sets a forced aspect ratio such as `"16:9"`. NULL or empty restores the
/// engine default.
///
/// # Safety
/// - `player` must be a valid non-null `StreamviewPlayer` pointer.
/// - `ratio` must be NULL or a valid null-terminated C string.
#[no_mangle]
pub extern "C" fn streamview_player_set_aspect_ratio(
    player: *const StreamviewPlayer,
    ratio: *const c_char,
) -> i32 {
    ffi_boundary(|| {
        let view = player_ref(player)?.live_view()?;
        let ratio = unsafe { opt_str(ratio) }?;
        view.set_aspect_ratio(ratio);
        Ok(())
    })
}

/// Sets the resize mode (`contain`, `cover`, `stretch`, `fill`, `original`,
/// `center`). Unknown values and NULL mean `contain`.
///
/// # Safety
/// - `player` must be a valid non-null `StreamviewPlayer` pointer.
/// - `mode` must be NULL or a valid null-terminated C string.
#[no_mangle]
pub extern "C" fn streamview_player_set_resize_mode(
    player: *const StreamviewPlayer,
    mode: *const c_char,
) -> i32 {
    ffi_boundary(|| {
        let view = player_ref(player)?.live_view()?;
        let mode = unsafe { opt_str(mode) }?;
        view.set_resize_mode(ResizeMode::from_value(mode));
        Ok(())
    })
}

/// Forces a fresh load of the current url and starts playback.
///
/// # Safety
/// `player` must be a valid non-null `StreamviewPlayer` pointer.
#[no_mangle]
pub extern "C" fn streamview_player_retry(player: *const StreamviewPlayer) -> i32 {
    ffi_boundary(|| {
        player_ref(player)?.live_view()?.retry();
        Ok(())
    })
}

// =========================================================================
// Surface and app lifecycle
// =========================================================================

/// Attaches the player to a platform surface (`UIView*`, `Surface`, ...).
///
/// # Safety
/// - `player` must be a valid non-null `StreamviewPlayer` pointer.
/// - `surface` must stay valid until `streamview_player_detach` or destroy.
#[no_mangle]
pub extern "C" fn streamview_player_attach(
    player: *const StreamviewPlayer,
    surface: *mut c_void,
) -> i32 {
    ffi_boundary(|| {
        let view = player_ref(player)?.live_view()?;
        if surface.is_null() {
            return Err(StreamviewError::NullPtr);
        }
        view.attach(SurfaceHandle::new(HostSurface(HostPtr(surface))));
        Ok(())
    })
}

/// Detaches the player from its surface and pauses playback.
///
/// # Safety
/// `player` must be a valid non-null `StreamviewPlayer` pointer.
#[no_mangle]
pub extern "C" fn streamview_player_detach(player: *const StreamviewPlayer) -> i32 {
    ffi_boundary(|| {
        player_ref(player)?.live_view()?.detach();
        Ok(())
    })
}

/// Notifies every live player that the app moved to the background.
#[no_mangle]
pub extern "C" fn streamview_app_background() {
    ffi_boundary_or((), || APP_LIFECYCLE.notify(AppActivity::Background));
}

/// Notifies every live player that the app returned to the foreground.
#[no_mangle]
pub extern "C" fn streamview_app_foreground() {
    ffi_boundary_or((), || APP_LIFECYCLE.notify(AppActivity::Foreground));
}

// =========================================================================
// Engine → player
// =========================================================================

/// Reports an engine event (`STREAMVIEW_ENGINE_PLAYING`, `_STOPPED`, `_ERROR`).
///
/// Callable from any thread. `message` is only read for errors and may be NULL.
///
/// # Safety
/// - `sink` must be the pointer passed to the vtable's `construct`, and the
///   instance must not have been released yet.
/// - `message` must be NULL or a valid null-terminated C string.
#[no_mangle]
pub extern "C" fn streamview_engine_emit(
    sink: *const StreamviewEngineSink,
    kind: i32,
    message: *const c_char,
) -> i32 {
    ffi_boundary(|| {
        let sink = check_not_null!(sink);
        let message = unsafe { opt_str(message) }?;
        let event =
            StreamviewEngineSink::event_for(kind, message).ok_or(StreamviewError::InvalidArgument)?;
        sink.send(event);
        #[cfg(debug_assertions)]
        diagnostics::record_engine_event();
        Ok(())
    })
}

// =========================================================================
// Diagnostics and logging
// =========================================================================

/// FFI diagnostics snapshot (matches `StreamviewDiagnostics` in the C header).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamviewDiagnostics {
    /// Total players created over the process lifetime.
    pub players_created: u64,
    /// Total players destroyed over the process lifetime.
    pub players_destroyed: u64,
    /// Peak concurrent players.
    pub players_peak: u64,
    /// Current number of live players.
    pub players_live: u64,
    /// Engine events delivered through `streamview_engine_emit`.
    pub engine_events: u64,
    /// Total FFI calls made.
    pub ffi_calls: u64,
}

/// Fills a diagnostics snapshot.
///
/// All fields are zero in release builds (debug_assertions disabled).
///
/// # Safety
/// `out` must be a valid non-null pointer to `StreamviewDiagnostics`.
#[no_mangle]
pub extern "C" fn streamview_diagnostics_snapshot(out: *mut StreamviewDiagnostics) -> i32 {
    ffi_boundary(|| {
        if out.is_null() {
            return Err(StreamviewError::NullPtr);
        }

        #[cfg(debug_assertions)]
        {
            let snap = diagnostics::snapshot();
            unsafe {
                *out = StreamviewDiagnostics {
                    players_created: snap.players_created,
                    players_destroyed: snap.players_destroyed,
                    players_peak: snap.players_peak,
                    players_live: snap.players_live,
                    engine_events: snap.engine_events,
                    ffi_calls: snap.ffi_calls,
                };
            }
        }

        #[cfg(not(debug_assertions))]
        unsafe {
            *out = StreamviewDiagnostics::default();
        }

        Ok(())
    })
}

/// Installs a `tracing` subscriber writing to stderr, filtered by `RUST_LOG`
/// (default `info`). Calls after the first are ignored.
#[no_mangle]
pub extern "C" fn streamview_init_logging() {
    ffi_boundary_or((), || {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
            .is_ok();
        if installed {
            tracing::info!("streamview logging initialized");
        }
    });
}
