//! C-ABI wrapper around `fetch-core`.
//!
//! # Overview
//! Exposes the blocking client through `extern "C"` functions so any
//! language with a C FFI can perform HTTP requests with connection pooling,
//! redirects, and timeouts without reimplementing them.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - `fetch_perform` buffers the whole response into one `FfiFetchResult`
//!   envelope that carries either the response or an error code + message.
//! - The C caller owns all returned pointers and must call the matching
//!   `fetch_free_*` function to release them.

pub mod types;

use std::ffi::CString;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use log::debug;

use types::*;

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a client with default configuration and its own connection pool.
///
/// Returns null if an internal panic occurs.
/// The caller must free the returned pointer with `fetch_client_free`.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_client_new() -> *mut FfiClient {
    catch_unwind(|| {
        let client = fetch_core::Client::new();
        Box::into_raw(Box::new(FfiClient { inner: client }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client created by `fetch_client_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_client_free(client: *mut FfiClient) {
    if !client.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(client) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Options for a plain GET: no headers, no body, no overall timeout,
/// redirects followed up to the default limit.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_options_default() -> FfiFetchOptions {
    FfiFetchOptions::defaults()
}

/// Perform a request and buffer the response.
///
/// `options` may be null, meaning `fetch_options_default()`. Never returns
/// null; free the result with `fetch_free_result`.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_perform(
    client: *const FfiClient,
    url: *const c_char,
    options: *const FfiFetchOptions,
) -> *mut FfiFetchResult {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return FfiFetchResult::null_arg("client");
        }
        if url.is_null() {
            return FfiFetchResult::null_arg("url");
        }
        let client = unsafe { &*client };
        let Some(url) = (unsafe { c_str(url) }) else {
            return FfiFetchResult::error(FfiErrorCode::InvalidUrl, "url is not valid UTF-8");
        };

        let defaults;
        let options = if options.is_null() {
            defaults = FfiFetchOptions::defaults();
            &defaults
        } else {
            unsafe { &*options }
        };
        let options = match unsafe { options.to_core() } {
            Ok(options) => options,
            Err((code, msg)) => return FfiFetchResult::error(code, &msg),
        };

        match client.inner.fetch(url, options) {
            Ok(res) => FfiFetchResult::from_response(res),
            Err(err) => {
                debug!("fetch_perform {url} failed: {err}");
                FfiFetchResult::from_error(&err)
            }
        }
    }))
    .unwrap_or_else(|_| FfiFetchResult::error(FfiErrorCode::Panic, "panic in fetch_perform"))
}

// ---------------------------------------------------------------------------
// Memory management
// ---------------------------------------------------------------------------

/// Free an `FfiFetchResult` returned by `fetch_perform`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_free_result(result: *mut FfiFetchResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| unsafe { FfiFetchResult::free(result) }));
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { CString::from_raw(s) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
