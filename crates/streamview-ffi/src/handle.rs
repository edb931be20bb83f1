//! FFI handle types.
//!
//! [`StreamviewPlayer`] wraps a core `PlayerView`. The view is already
//! thread-safe (commands are marshaled onto its owner thread), so the handle
//! needs no lock of its own.

use std::ffi::{c_void, CString};
use std::os::raw::c_char;

use streamview_core::{PlayerEvent, PlayerView};

use crate::error::{StreamviewError, StreamviewErrorKind};

/// Host pointer passed back verbatim to host callbacks.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HostPtr(pub(crate) *mut c_void);

// SAFETY: host pointers are opaque to Rust and only ever handed back to the
// host, whose contract requires them to be usable from the player's owner
// thread.
unsafe impl Send for HostPtr {}
unsafe impl Sync for HostPtr {}

/// Opaque player handle exposed via FFI.
pub struct StreamviewPlayer {
    pub(crate) view: PlayerView,
}

impl StreamviewPlayer {
    /// Returns the view, or `Disposed` once it has been torn down.
    pub(crate) fn live_view(&self) -> Result<&PlayerView, StreamviewError> {
        if self.view.is_disposed() {
            return Err(StreamviewError::Disposed);
        }
        Ok(&self.view)
    }
}

/// Event kinds delivered to [`StreamviewEventCallback`].
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamviewEventKind {
    Load = 0,
    Playing = 1,
    Error = 2,
}

/// One player event. Pointers are valid only for the duration of the callback.
#[repr(C)]
#[derive(Debug)]
pub struct StreamviewEvent {
    pub kind: StreamviewEventKind,
    /// `None` unless `kind` is `Error`
    pub error_kind: StreamviewErrorKind,
    /// NULL if no url was set
    pub url: *const c_char,
    /// NULL unless `kind` is `Error`
    pub message: *const c_char,
}

/// Event callback, invoked on the player's owner thread.
pub type StreamviewEventCallback =
    extern "C" fn(user_data: *mut c_void, event: *const StreamviewEvent);

fn to_c(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

/// Turns core events into C callbacks.
pub(crate) struct EventForwarder {
    pub(crate) callback: Option<StreamviewEventCallback>,
    pub(crate) user_data: HostPtr,
}

impl EventForwarder {
    pub(crate) fn forward(&self, event: PlayerEvent) {
        let Some(callback) = self.callback else {
            return;
        };
        let (kind, error_kind, url, message) = match event {
            PlayerEvent::Load { url } => (
                StreamviewEventKind::Load,
                StreamviewErrorKind::None,
                Some(url),
                None,
            ),
            PlayerEvent::Playing { url } => (
                StreamviewEventKind::Playing,
                StreamviewErrorKind::None,
                Some(url),
                None,
            ),
            PlayerEvent::Error { kind, message, url } => (
                StreamviewEventKind::Error,
                kind.into(),
                url,
                Some(message),
            ),
        };
        let url = url.as_deref().map(to_c);
        let message = message.as_deref().map(to_c);
        let raw = StreamviewEvent {
            kind,
            error_kind,
            url: url.as_ref().map_or(std::ptr::null(), |s| s.as_ptr()),
            message: message.as_ref().map_or(std::ptr::null(), |s| s.as_ptr()),
        };
        callback(self.user_data.0, &raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;
    use std::sync::LazyLock;

    use parking_lot::Mutex;
    use streamview_core::ErrorKind;

    type Seen = (
        StreamviewEventKind,
        StreamviewErrorKind,
        Option<String>,
        Option<String>,
    );

    static SEEN: LazyLock<Mutex<Vec<Seen>>> = LazyLock::new(|| Mutex::new(Vec::new()));

    extern "C" fn record(_user_data: *mut c_void, event: *const StreamviewEvent) {
        let event = unsafe { &*event };
        let text = |p: *const c_char| {
            (!p.is_null()).then(|| unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned())
        };
        SEEN.lock().push((
            event.kind,
            event.error_kind,
            text(event.url),
            text(event.message),
        ));
    }

    #[test]
    fn test_forwarder_maps_events() {
        let forwarder = EventForwarder {
            callback: Some(record),
            user_data: HostPtr(std::ptr::null_mut()),
        };
        forwarder.forward(PlayerEvent::Playing {
            url: "rtsp://cam/1".into(),
        });
        forwarder.forward(PlayerEvent::Error {
            kind: ErrorKind::EngineConstructionFailure,
            message: "no libvlc".into(),
            url: None,
        });

        let seen = SEEN.lock();
        assert_eq!(
            seen[0],
            (
                StreamviewEventKind::Playing,
                StreamviewErrorKind::None,
                Some("rtsp://cam/1".into()),
                None
            )
        );
        assert_eq!(
            seen[1],
            (
                StreamviewEventKind::Error,
                StreamviewErrorKind::EngineConstructionFailure,
                None,
                Some("no libvlc".into())
            )
        );
    }
}
