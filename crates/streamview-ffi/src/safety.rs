//! FFI boundary safety utilities.
//!
//! All FFI entry points wrap their body in [`ffi_boundary`] which:
//! 1. Catches panics via `std::panic::catch_unwind()`
//! 2. Converts `Result<(), StreamviewError>` to raw `i32`
//!
//! String arguments are decoded with [`opt_str`] and [`opt_str_list`]; a NULL
//! pointer means "unset" wherever the header allows it.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

#[cfg(debug_assertions)]
use crate::diagnostics;
use crate::error::StreamviewError;

/// Wraps an FFI entry point body with panic catching.
///
/// Returns `STREAMVIEW_ERROR_INTERNAL` if the closure panics.
///
/// The closure is wrapped in [`AssertUnwindSafe`] because all shared state
/// across the FFI boundary uses `parking_lot::Mutex` (poison-free) or lives on
/// the player's owner thread, which a panic here cannot reach.
pub fn ffi_boundary<F>(f: F) -> i32
where
    F: FnOnce() -> Result<(), StreamviewError>,
{
    #[cfg(debug_assertions)]
    diagnostics::record_ffi_call();

    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => StreamviewError::Ok.as_raw(),
        Ok(Err(e)) => e.as_raw(),
        Err(_panic) => {
            tracing::error!("FFI: caught Rust panic at FFI boundary");
            StreamviewError::Internal.as_raw()
        }
    }
}

/// Wraps a non-Result FFI entry point with panic catching.
///
/// Returns `default` if the closure panics.
pub fn ffi_boundary_or<T, F>(default: T, f: F) -> T
where
    F: FnOnce() -> T,
{
    #[cfg(debug_assertions)]
    diagnostics::record_ffi_call();

    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(val) => val,
        Err(_panic) => {
            tracing::error!("FFI: caught Rust panic at FFI boundary");
            default
        }
    }
}

/// Decodes an optional C string.
///
/// # Safety
/// `ptr` must be NULL or point to a valid null-terminated string that stays
/// alive for `'a`.
pub unsafe fn opt_str<'a>(ptr: *const c_char) -> Result<Option<&'a str>, StreamviewError> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(Some)
        .map_err(|_| StreamviewError::InvalidUtf8)
}

/// Decodes an optional array of `len` C strings.
///
/// A NULL array is `None`; a NULL element is rejected.
///
/// # Safety
/// `items` must be NULL or point to `len` valid string pointers.
pub unsafe fn opt_str_list(
    items: *const *const c_char,
    len: usize,
) -> Result<Option<Vec<String>>, StreamviewError> {
    if items.is_null() {
        return Ok(None);
    }
    let mut out = Vec::with_capacity(len);
    for &item in std::slice::from_raw_parts(items, len) {
        match opt_str(item)? {
            Some(s) => out.push(s.to_string()),
            None => return Err(StreamviewError::NullPtr),
        }
    }
    Ok(Some(out))
}

/// Validates a pointer is non-null, returning a reference.
///
/// # Safety
/// The pointer must be valid, properly aligned, and no mutable reference
/// (`&mut T`) to the same allocation may exist for the lifetime of the
/// yielded `&T` reference.
#[macro_export]
macro_rules! check_not_null {
    ($ptr:expr) => {
        if $ptr.is_null() {
            return Err($crate::error::StreamviewError::NullPtr);
        } else {
            unsafe { &*$ptr }
        }
    };
}
