//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Inputs (`FfiFetchOptions`, `FfiHeaderInput`) are borrowed from the caller
//! and only read. Outputs (`FfiFetchResult`, `FfiHeader`) are allocated here
//! and must be released with `fetch_free_result`. Strings cross as
//! NUL-terminated `char*`; bodies cross as pointer plus length because they
//! may contain NUL bytes.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::time::Duration;

use fetch_core::{FetchError, FetchOptions, Method, Response};

/// Opaque handle to a `Client`. C callers receive a pointer to this and
/// pass it back into `fetch_perform`.
pub struct FfiClient {
    pub(crate) inner: fetch_core::Client,
}

// ---------------------------------------------------------------------------
// Request options (caller-provided, read-only)
// ---------------------------------------------------------------------------

/// HTTP method as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiMethod {
    Get = 0,
    Post = 1,
    Put = 2,
    Delete = 3,
    Patch = 4,
    Head = 5,
    Options = 6,
    Trace = 7,
}

impl From<FfiMethod> for Method {
    fn from(m: FfiMethod) -> Self {
        match m {
            FfiMethod::Get => Method::Get,
            FfiMethod::Post => Method::Post,
            FfiMethod::Put => Method::Put,
            FfiMethod::Delete => Method::Delete,
            FfiMethod::Patch => Method::Patch,
            FfiMethod::Head => Method::Head,
            FfiMethod::Options => Method::Options,
            FfiMethod::Trace => Method::Trace,
        }
    }
}

/// A request header supplied by the caller.
#[repr(C)]
pub struct FfiHeaderInput {
    pub key: *const c_char,
    pub value: *const c_char,
}

/// Options for `fetch_perform`. Start from `fetch_options_default()`.
///
/// `headers` points to `headers_len` entries; `body` to `body_len` bytes.
/// Either may be null when its length is zero. A `timeout_ms` of zero
/// means no overall timeout.
#[repr(C)]
pub struct FfiFetchOptions {
    pub method: FfiMethod,
    pub headers: *const FfiHeaderInput,
    pub headers_len: u32,
    pub body: *const u8,
    pub body_len: usize,
    pub timeout_ms: u64,
    pub follow_redirects: bool,
    pub max_redirects: u32,
}

impl FfiFetchOptions {
    pub(crate) fn defaults() -> Self {
        Self {
            method: FfiMethod::Get,
            headers: std::ptr::null(),
            headers_len: 0,
            body: std::ptr::null(),
            body_len: 0,
            timeout_ms: 0,
            follow_redirects: true,
            max_redirects: fetch_core::request::DEFAULT_MAX_REDIRECTS,
        }
    }

    /// Copy everything the caller pointed at into owned `FetchOptions`.
    ///
    /// # Safety
    /// `headers` and `body` must be valid for their stated lengths, and every
    /// header key and value must be a NUL-terminated string.
    pub(crate) unsafe fn to_core(&self) -> Result<FetchOptions, (FfiErrorCode, String)> {
        let mut options = FetchOptions::new()
            .method(self.method.into())
            .follow_redirects(self.follow_redirects)
            .max_redirects(self.max_redirects);

        if self.headers_len > 0 {
            if self.headers.is_null() {
                return Err((FfiErrorCode::NullArg, "null argument: options.headers".into()));
            }
            let headers = unsafe { std::slice::from_raw_parts(self.headers, self.headers_len as usize) };
            for header in headers {
                let (Some(key), Some(value)) = (unsafe { c_str(header.key) }, unsafe { c_str(header.value) })
                else {
                    return Err((
                        FfiErrorCode::InvalidHeader,
                        "header key and value must be non-null UTF-8 strings".into(),
                    ));
                };
                options = options.append_header(key, value);
            }
        }

        if self.body_len > 0 {
            if self.body.is_null() {
                return Err((FfiErrorCode::NullArg, "null argument: options.body".into()));
            }
            let body = unsafe { std::slice::from_raw_parts(self.body, self.body_len) };
            options = options.body(body.to_vec());
        }

        if self.timeout_ms > 0 {
            options = options.timeout(Duration::from_millis(self.timeout_ms));
        }
        Ok(options)
    }
}

/// Borrow a C string as UTF-8, or `None` if it is null or not UTF-8.
///
/// # Safety
/// A non-null `ptr` must point to a NUL-terminated string.
pub(crate) unsafe fn c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

fn c_string(s: impl Into<Vec<u8>>) -> *mut c_char {
    CString::new(s).unwrap_or_default().into_raw()
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Error codes returned in `FfiFetchResult`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    InvalidUrl = 1,
    InvalidMethod = 2,
    InvalidHeader = 3,
    Connection = 4,
    Timeout = 5,
    TooManyRedirects = 6,
    BodyConsumed = 7,
    InvalidCharset = 8,
    Protocol = 9,
    Decode = 10,
    Io = 11,
    Panic = 12,
    NullArg = 13,
}

impl From<&FetchError> for FfiErrorCode {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::InvalidUrl { .. } => FfiErrorCode::InvalidUrl,
            FetchError::InvalidMethod(_) => FfiErrorCode::InvalidMethod,
            FetchError::InvalidHeader(_) => FfiErrorCode::InvalidHeader,
            FetchError::Connection { .. } => FfiErrorCode::Connection,
            FetchError::Timeout(_) => FfiErrorCode::Timeout,
            FetchError::TooManyRedirects { .. } => FfiErrorCode::TooManyRedirects,
            FetchError::BodyAlreadyConsumed => FfiErrorCode::BodyConsumed,
            FetchError::InvalidCharset(_) => FfiErrorCode::InvalidCharset,
            FetchError::Protocol(_) => FfiErrorCode::Protocol,
            FetchError::Decode(_) => FfiErrorCode::Decode,
            FetchError::Io(_) => FfiErrorCode::Io,
        }
    }
}

/// A response header returned to C.
#[repr(C)]
pub struct FfiHeader {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// Result envelope for `fetch_perform`.
///
/// On success `error_code` is `Ok` and `error_message` is null. If the
/// response head arrived but reading the body failed, `status`, `url`, and
/// `headers` are still filled in alongside the error.
#[repr(C)]
pub struct FfiFetchResult {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub status: u16,
    pub url: *mut c_char,
    pub headers: *mut FfiHeader,
    pub headers_len: u32,
    pub body: *mut u8,
    pub body_len: usize,
}

impl FfiFetchResult {
    fn empty(error_code: FfiErrorCode, error_message: *mut c_char) -> Self {
        Self {
            error_code,
            error_message,
            status: 0,
            url: std::ptr::null_mut(),
            headers: std::ptr::null_mut(),
            headers_len: 0,
            body: std::ptr::null_mut(),
            body_len: 0,
        }
    }

    /// Buffer the whole response into a heap-allocated result.
    pub(crate) fn from_response(mut res: Response) -> *mut Self {
        let headers: Box<[FfiHeader]> = res
            .headers()
            .iter()
            .map(|(k, v)| FfiHeader {
                key: c_string(k),
                value: c_string(v),
            })
            .collect();
        let headers_len = headers.len() as u32;

        let mut result = Self::empty(FfiErrorCode::Ok, std::ptr::null_mut());
        result.status = res.status();
        result.url = c_string(res.url().as_str());
        result.headers_len = headers_len;
        result.headers = if headers.is_empty() {
            std::ptr::null_mut()
        } else {
            Box::into_raw(headers).cast()
        };

        match res.bytes() {
            Ok(bytes) if bytes.is_empty() => {}
            Ok(bytes) => {
                result.body_len = bytes.len();
                result.body = Box::into_raw(bytes.to_vec().into_boxed_slice()).cast();
            }
            Err(err) => {
                result.error_code = FfiErrorCode::from(&err);
                result.error_message = c_string(err.to_string());
            }
        }
        Box::into_raw(Box::new(result))
    }

    pub(crate) fn from_error(err: &FetchError) -> *mut Self {
        Self::error(err.into(), &err.to_string())
    }

    pub(crate) fn error(code: FfiErrorCode, msg: &str) -> *mut Self {
        Box::into_raw(Box::new(Self::empty(code, c_string(msg))))
    }

    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Self::error(FfiErrorCode::NullArg, &format!("null argument: {name}"))
    }

    /// Release a result and everything it owns.
    ///
    /// # Safety
    /// `ptr` must come from one of the constructors above and not be freed twice.
    pub(crate) unsafe fn free(ptr: *mut Self) {
        let result = unsafe { Box::from_raw(ptr) };
        for s in [result.error_message, result.url] {
            if !s.is_null() {
                drop(unsafe { CString::from_raw(s) });
            }
        }
        if !result.headers.is_null() {
            let headers = unsafe {
                Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                    result.headers,
                    result.headers_len as usize,
                ))
            };
            for h in headers.iter() {
                for s in [h.key, h.value] {
                    if !s.is_null() {
                        drop(unsafe { CString::from_raw(s) });
                    }
                }
            }
        }
        if !result.body.is_null() {
            drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(result.body, result.body_len)) });
        }
    }
}
