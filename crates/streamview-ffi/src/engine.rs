//! Host-supplied decoder engines.
//!
//! The native side (libVLC behind a Swift or Kotlin shim) fills a
//! [`StreamviewEngineVTable`] and hands it to `streamview_player_create`
//! together with an opaque context pointer. [`FfiEngine`] adapts that table to
//! the core [`DecoderEngine`] trait.
//!
//! Every vtable call happens on the player's owner thread. Status-returning
//! entries return 0 on success and any other value on failure.

use std::ffi::{c_void, CString, NulError};
use std::os::raw::c_char;

use streamview_core::{
    DecoderEngine, DecoderHandle, EngineError, EngineEvent, EngineEventSink, SurfaceHandle,
    VideoScale,
};
use url::Url;

use crate::handle::HostPtr;

pub type StatusFn = extern "C" fn(instance: *mut c_void) -> i32;
pub type QueryFn = extern "C" fn(instance: *mut c_void) -> bool;

/// Function table implementing one decoder engine.
///
/// Every field except `destroy_ctx` is required.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct StreamviewEngineVTable {
    /// Creates an engine instance. Returns NULL on failure. `sink` stays valid
    /// until `release` returns for that instance.
    pub construct: Option<
        extern "C" fn(
            ctx: *mut c_void,
            init_options: *const *const c_char,
            init_count: usize,
            sink: *const StreamviewEngineSink,
        ) -> *mut c_void,
    >,
    pub load_media: Option<
        extern "C" fn(
            instance: *mut c_void,
            url: *const c_char,
            media_options: *const *const c_char,
            media_count: usize,
        ) -> i32,
    >,
    pub release_media: Option<StatusFn>,
    pub play: Option<StatusFn>,
    pub pause: Option<StatusFn>,
    pub stop: Option<StatusFn>,
    pub attach: Option<extern "C" fn(instance: *mut c_void, surface: *mut c_void) -> i32>,
    pub detach: Option<StatusFn>,
    pub has_video_output: Option<QueryFn>,
    pub is_playing: Option<QueryFn>,
    /// `ratio` is NULL for the engine default
    pub set_aspect_ratio: Option<extern "C" fn(instance: *mut c_void, ratio: *const c_char) -> i32>,
    /// `scale` is a `StreamviewVideoScale` value
    pub set_video_scale: Option<extern "C" fn(instance: *mut c_void, scale: i32) -> i32>,
    pub release: Option<extern "C" fn(instance: *mut c_void)>,
    /// Frees `ctx` once the player is gone
    pub destroy_ctx: Option<extern "C" fn(ctx: *mut c_void)>,
}

impl StreamviewEngineVTable {
    /// Returns true if every required entry is present.
    pub fn is_complete(&self) -> bool {
        self.construct.is_some()
            && self.load_media.is_some()
            && self.release_media.is_some()
            && self.play.is_some()
            && self.pause.is_some()
            && self.stop.is_some()
            && self.attach.is_some()
            && self.detach.is_some()
            && self.has_video_output.is_some()
            && self.is_playing.is_some()
            && self.set_aspect_ratio.is_some()
            && self.set_video_scale.is_some()
            && self.release.is_some()
    }
}

/// Scale codes passed to `set_video_scale`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamviewVideoScale {
    Fit = 0,
    AspectFill = 1,
    Stretch = 2,
    Original = 3,
}

impl From<VideoScale> for StreamviewVideoScale {
    fn from(scale: VideoScale) -> Self {
        match scale {
            VideoScale::Fit => StreamviewVideoScale::Fit,
            VideoScale::AspectFill => StreamviewVideoScale::AspectFill,
            VideoScale::Stretch => StreamviewVideoScale::Stretch,
            VideoScale::Original => StreamviewVideoScale::Original,
        }
    }
}

/// Engine event codes accepted by `streamview_engine_emit`.
pub const STREAMVIEW_ENGINE_PLAYING: i32 = 0;
pub const STREAMVIEW_ENGINE_STOPPED: i32 = 1;
pub const STREAMVIEW_ENGINE_ERROR: i32 = 2;

/// Opaque event sink given to each engine instance.
pub struct StreamviewEngineSink {
    events: EngineEventSink,
}

impl StreamviewEngineSink {
    /// Translates a raw event code. Returns `None` for unknown codes.
    pub(crate) fn event_for(kind: i32, message: Option<&str>) -> Option<EngineEvent> {
        match kind {
            STREAMVIEW_ENGINE_PLAYING => Some(EngineEvent::Playing),
            STREAMVIEW_ENGINE_STOPPED => Some(EngineEvent::Stopped),
            STREAMVIEW_ENGINE_ERROR => Some(EngineEvent::Error(
                message.unwrap_or("engine error").to_string(),
            )),
            _ => None,
        }
    }

    pub(crate) fn send(&self, event: EngineEvent) {
        self.events.send(event);
    }
}

/// Surface pointer wrapped for [`SurfaceHandle`].
pub(crate) struct HostSurface(pub(crate) HostPtr);

/// Owned C copies of a string list plus the pointer array the host reads.
struct CStringList {
    _owned: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

impl CStringList {
    fn new(items: &[String]) -> Result<Self, NulError> {
        let owned = items
            .iter()
            .map(|s| CString::new(s.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let ptrs = owned.iter().map(|s| s.as_ptr()).collect();
        Ok(Self {
            _owned: owned,
            ptrs,
        })
    }

    fn as_ptr(&self) -> *const *const c_char {
        self.ptrs.as_ptr()
    }

    fn len(&self) -> usize {
        self.ptrs.len()
    }
}

fn required<F>(entry: Option<F>, name: &str) -> Result<F, EngineError> {
    entry.ok_or_else(|| EngineError::Unsupported(format!("vtable entry {name} missing")))
}

fn check(code: i32, step: &str, err: fn(String) -> EngineError) -> Result<(), EngineError> {
    if code == 0 {
        Ok(())
    } else {
        Err(err(format!("{step} returned {code}")))
    }
}

/// [`DecoderEngine`] backed by a host vtable.
pub struct FfiEngine {
    vtable: StreamviewEngineVTable,
    ctx: HostPtr,
}

impl FfiEngine {
    /// Takes ownership of `ctx`; `destroy_ctx` runs on drop.
    pub fn new(vtable: StreamviewEngineVTable, ctx: *mut c_void) -> Self {
        Self {
            vtable,
            ctx: HostPtr(ctx),
        }
    }
}

impl DecoderEngine for FfiEngine {
    fn construct(
        &mut self,
        init_options: &[String],
        events: EngineEventSink,
    ) -> Result<Box<dyn DecoderHandle>, EngineError> {
        let construct = required(self.vtable.construct, "construct")?;
        let options =
            CStringList::new(init_options).map_err(|e| EngineError::Construction(e.to_string()))?;
        let sink = Box::new(StreamviewEngineSink { events });

        let instance = construct(self.ctx.0, options.as_ptr(), options.len(), &*sink);
        if instance.is_null() {
            return Err(EngineError::Construction(
                "host engine returned NULL".to_string(),
            ));
        }
        Ok(Box::new(FfiHandle {
            vtable: self.vtable,
            instance: HostPtr(instance),
            _sink: sink,
        }))
    }
}

impl Drop for FfiEngine {
    fn drop(&mut self) {
        if let Some(destroy) = self.vtable.destroy_ctx {
            destroy(self.ctx.0);
        }
    }
}

/// One host engine instance.
struct FfiHandle {
    vtable: StreamviewEngineVTable,
    instance: HostPtr,
    // Address handed to the host in `construct`; freed with the handle.
    _sink: Box<StreamviewEngineSink>,
}

impl FfiHandle {
    fn status(
        &self,
        entry: Option<StatusFn>,
        step: &str,
        err: fn(String) -> EngineError,
    ) -> Result<(), EngineError> {
        let f = required(entry, step)?;
        check(f(self.instance.0), step, err)
    }
}

impl DecoderHandle for FfiHandle {
    fn load_media(&mut self, url: &Url, media_options: &[String]) -> Result<(), EngineError> {
        let load = required(self.vtable.load_media, "load_media")?;
        let c_url = CString::new(url.as_str()).map_err(|e| EngineError::Load(e.to_string()))?;
        let options =
            CStringList::new(media_options).map_err(|e| EngineError::Load(e.to_string()))?;
        check(
            load(self.instance.0, c_url.as_ptr(), options.as_ptr(), options.len()),
            "load_media",
            EngineError::Load,
        )
    }

    fn release_media(&mut self) -> Result<(), EngineError> {
        self.status(self.vtable.release_media, "release_media", EngineError::Release)
    }

    fn play(&mut self) -> Result<(), EngineError> {
        self.status(self.vtable.play, "play", EngineError::Playback)
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.status(self.vtable.pause, "pause", EngineError::Playback)
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.status(self.vtable.stop, "stop", EngineError::Playback)
    }

    fn attach(&mut self, surface: &SurfaceHandle) -> Result<(), EngineError> {
        let attach = required(self.vtable.attach, "attach")?;
        let Some(HostSurface(ptr)) = surface.downcast_ref::<HostSurface>() else {
            return Err(EngineError::Surface("not a host surface".to_string()));
        };
        check(attach(self.instance.0, ptr.0), "attach", EngineError::Surface)
    }

    fn detach(&mut self) -> Result<(), EngineError> {
        self.status(self.vtable.detach, "detach", EngineError::Surface)
    }

    fn has_video_output(&self) -> bool {
        self.vtable
            .has_video_output
            .is_some_and(|f| f(self.instance.0))
    }

    fn is_playing(&self) -> bool {
        self.vtable.is_playing.is_some_and(|f| f(self.instance.0))
    }

    fn set_aspect_ratio(&mut self, ratio: Option<&str>) -> Result<(), EngineError> {
        let set = required(self.vtable.set_aspect_ratio, "set_aspect_ratio")?;
        let c_ratio = ratio
            .map(CString::new)
            .transpose()
            .map_err(|e| EngineError::Playback(e.to_string()))?;
        let ptr = c_ratio.as_ref().map_or(std::ptr::null(), |r| r.as_ptr());
        check(set(self.instance.0, ptr), "set_aspect_ratio", EngineError::Playback)
    }

    fn set_video_scale(&mut self, scale: VideoScale) -> Result<(), EngineError> {
        let set = required(self.vtable.set_video_scale, "set_video_scale")?;
        let code = StreamviewVideoScale::from(scale) as i32;
        check(set(self.instance.0, code), "set_video_scale", EngineError::Playback)
    }

    fn release(&mut self) -> Result<(), EngineError> {
        let release = required(self.vtable.release, "release")?;
        release(self.instance.0);
        Ok(())
    }
}
