//! C-ABI wrapper around `beacon-core`.
//!
//! # Overview
//! Exposes the polling HTTP engine and the analytics uploader through
//! `extern "C"` functions. Nothing here blocks except
//! `beacon_analytics_upload`; a C host drives progress by calling
//! `beacon_http_poll` or `beacon_analytics_update` from its own loop.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Handles are opaque boxes created by `*_create` / `*_new` and released
//!   by the matching `*_destroy` / `*_free`.
//! - Strings returned to C are owned by the caller and released with
//!   `beacon_free_string`.
//! - Upload outcomes are delivered synchronously through C callbacks that
//!   receive the collection name, valid only for the duration of the call.

pub mod types;

use std::ffi::CString;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use beacon_core::{
    Analytics, AnalyticsConfig, Credentials, Document, HttpClient, HttpConfig, UploadEvent,
    STATUS_FAILED,
};

use types::*;

const BLOCKING_POLL_INTERVAL: Duration = Duration::from_millis(1);

// ---------------------------------------------------------------------------
// HTTP engine
// ---------------------------------------------------------------------------

/// Create an HTTP context that connects on port 80.
///
/// The caller must free the returned pointer with `beacon_http_destroy`.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_http_create() -> *mut FfiHttp {
    beacon_http_create_with_port(beacon_core::config::DEFAULT_PORT)
}

/// Create an HTTP context that connects on `port` instead of 80.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_http_create_with_port(port: u16) -> *mut FfiHttp {
    catch_unwind(|| {
        let client = HttpClient::with_config(HttpConfig::default().with_port(port));
        Box::into_raw(Box::new(FfiHttp { inner: client }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Close any open sockets and free the context. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_http_destroy(ctx: *mut FfiHttp) {
    if !ctx.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(ctx) });
        }));
    }
}

/// Attach a header sent with every later request on this context.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_http_add_custom_header(
    ctx: *mut FfiHttp,
    name: *const c_char,
    value: *const c_char,
) -> BeaconResult {
    catch_unwind(AssertUnwindSafe(|| {
        if ctx.is_null() {
            return BeaconResult::NullArg;
        }
        let (name, value) = match unsafe { (str_arg(name), str_arg(value)) } {
            (Ok(n), Ok(v)) => (n, v),
            (Err(e), _) | (_, Err(e)) => return e,
        };
        unsafe { &mut *ctx }.inner.add_custom_header(name, value);
        BeaconResult::Ok
    }))
    .unwrap_or(BeaconResult::Panic)
}

/// Start a request. A null `post` issues a GET; otherwise the string is
/// sent as the body of a POST.
///
/// Ignored while a previous request on the context is still in flight.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_http_request(
    ctx: *mut FfiHttp,
    url: *const c_char,
    post: *const c_char,
) -> BeaconResult {
    catch_unwind(AssertUnwindSafe(|| {
        if ctx.is_null() {
            return BeaconResult::NullArg;
        }
        let url = match unsafe { str_arg(url) } {
            Ok(u) => u,
            Err(e) => return e,
        };
        let body = if post.is_null() {
            None
        } else {
            match unsafe { str_arg(post) } {
                Ok(b) => Some(b),
                Err(e) => return e,
            }
        };
        unsafe { &mut *ctx }.inner.request(url, body);
        BeaconResult::Ok
    }))
    .unwrap_or(BeaconResult::Panic)
}

/// Advance the exchange without blocking. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_http_poll(ctx: *mut FfiHttp) {
    if ctx.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| unsafe { &mut *ctx }.inner.poll()));
}

/// Poll once, then return 1 if no exchange is in flight and 0 otherwise.
///
/// A null context reports 1 so wait loops terminate.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_http_request_complete(ctx: *mut FfiHttp) -> i32 {
    if ctx.is_null() {
        return 1;
    }
    catch_unwind(AssertUnwindSafe(|| {
        i32::from(unsafe { &mut *ctx }.inner.request_complete())
    }))
    .unwrap_or(1)
}

/// `0` before any status is known, `-1` on failure, else the HTTP status.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_http_response_status(ctx: *const FfiHttp) -> i32 {
    if ctx.is_null() {
        return STATUS_FAILED;
    }
    catch_unwind(AssertUnwindSafe(|| unsafe { &*ctx }.inner.status())).unwrap_or(STATUS_FAILED)
}

/// Copy of the response content. Empty until the peer has closed.
///
/// Returns null if `ctx` is null. Free with `beacon_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_http_response_content(ctx: *const FfiHttp) -> *mut c_char {
    if ctx.is_null() {
        return std::ptr::null_mut();
    }
    catch_unwind(AssertUnwindSafe(|| {
        to_c_string(unsafe { &*ctx }.inner.content())
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Free a string returned by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { CString::from_raw(s) });
        });
    }
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

/// Create an analytics context.
///
/// `config_json` is a JSON object such as
/// `{"base_url": "http://example.com", "interval_ms": 2000, "http": {"port": 80}}`;
/// only `base_url` is required. Returns null on a null argument or a
/// config that does not parse. Free with `beacon_analytics_free`.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_analytics_new(
    access_key: *const c_char,
    access_secret: *const c_char,
    config_json: *const c_char,
) -> *mut FfiAnalytics {
    catch_unwind(|| {
        let (key, secret, json) = match unsafe {
            (str_arg(access_key), str_arg(access_secret), str_arg(config_json))
        } {
            (Ok(k), Ok(s), Ok(j)) => (k, s, j),
            _ => return std::ptr::null_mut(),
        };
        let config: AnalyticsConfig = match serde_json::from_str(json) {
            Ok(c) => c,
            Err(_) => return std::ptr::null_mut(),
        };
        let analytics = Analytics::new(Credentials::new(key, secret), config);
        Box::into_raw(Box::new(FfiAnalytics { inner: analytics }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Abandon in-flight uploads and free the context. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_analytics_free(ctx: *mut FfiAnalytics) {
    if !ctx.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(ctx) });
        }));
    }
}

/// Change the upload interval. Negative values are treated as zero.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_analytics_set_interval(ctx: *mut FfiAnalytics, millis: i32) {
    if ctx.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let millis = u64::try_from(millis).unwrap_or(0);
        unsafe { &mut *ctx }
            .inner
            .set_interval(Duration::from_millis(millis));
    }));
}

#[unsafe(no_mangle)]
pub extern "C" fn beacon_analytics_create_collection(
    ctx: *mut FfiAnalytics,
    name: *const c_char,
) -> BeaconResult {
    catch_unwind(AssertUnwindSafe(|| {
        if ctx.is_null() {
            return BeaconResult::NullArg;
        }
        match unsafe { str_arg(name) } {
            Ok(name) => unsafe { &mut *ctx }.inner.create_collection(name).into(),
            Err(e) => e,
        }
    }))
    .unwrap_or(BeaconResult::Panic)
}

/// Queue `doc` on the named collection.
///
/// Ownership of `doc` passes to the library whatever the result; the caller
/// must not touch or free it afterwards.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_analytics_add_document(
    ctx: *mut FfiAnalytics,
    name: *const c_char,
    doc: *mut FfiDocument,
) -> BeaconResult {
    catch_unwind(AssertUnwindSafe(|| {
        if doc.is_null() {
            return BeaconResult::NullArg;
        }
        let doc = unsafe { Box::from_raw(doc) };
        if ctx.is_null() {
            return BeaconResult::NullArg;
        }
        match unsafe { str_arg(name) } {
            Ok(name) => unsafe { &mut *ctx }.inner.add_document(name, doc.inner).into(),
            Err(e) => e,
        }
    }))
    .unwrap_or(BeaconResult::Panic)
}

/// Poll every collection, start uploads that are due and report finished
/// ones through the callbacks. Either callback may be null.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_analytics_update(
    ctx: *mut FfiAnalytics,
    on_success: SuccessCallback,
    on_error: ErrorCallback,
) {
    if ctx.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let events = unsafe { &mut *ctx }.inner.update(Instant::now());
        for event in &events {
            dispatch(event, on_success, on_error);
        }
    }));
}

/// Upload the named collection now and block until it finishes, reporting
/// the outcome through the callbacks before returning.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_analytics_upload(
    ctx: *mut FfiAnalytics,
    name: *const c_char,
    on_success: SuccessCallback,
    on_error: ErrorCallback,
) -> BeaconResult {
    catch_unwind(AssertUnwindSafe(|| {
        if ctx.is_null() {
            return BeaconResult::NullArg;
        }
        let name = match unsafe { str_arg(name) } {
            Ok(n) => n,
            Err(e) => return e,
        };
        match unsafe { &mut *ctx }
            .inner
            .upload_blocking(name, BLOCKING_POLL_INTERVAL)
        {
            Ok(event) => {
                dispatch(&event, on_success, on_error);
                BeaconResult::Ok
            }
            Err(e) => BeaconResult::from(&e),
        }
    }))
    .unwrap_or(BeaconResult::Panic)
}

fn dispatch(event: &UploadEvent, on_success: SuccessCallback, on_error: ErrorCallback) {
    let Ok(name) = CString::new(event.collection()) else {
        return;
    };
    match *event {
        UploadEvent::Success { documents, .. } => {
            if let Some(cb) = on_success {
                cb(name.as_ptr(), i32::try_from(documents).unwrap_or(i32::MAX));
            }
        }
        UploadEvent::Failure { status, .. } => {
            if let Some(cb) = on_error {
                cb(name.as_ptr(), status);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Create an empty document. Free with `beacon_document_free` unless it is
/// handed to `beacon_analytics_add_document`.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_document_new() -> *mut FfiDocument {
    catch_unwind(|| {
        Box::into_raw(Box::new(FfiDocument {
            inner: Document::new(),
        }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_document_free(doc: *mut FfiDocument) {
    if !doc.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(doc) });
        }));
    }
}

fn with_document(
    doc: *mut FfiDocument,
    path: *const c_char,
    set: impl FnOnce(&mut Document, &str) -> Result<(), beacon_core::AnalyticsError>,
) -> BeaconResult {
    catch_unwind(AssertUnwindSafe(|| {
        if doc.is_null() {
            return BeaconResult::NullArg;
        }
        match unsafe { str_arg(path) } {
            Ok(path) => set(&mut unsafe { &mut *doc }.inner, path).into(),
            Err(e) => e,
        }
    }))
    .unwrap_or(BeaconResult::Panic)
}

/// Set a string at dotted `path`, e.g. `"device.os"`.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_document_add_cstr(
    doc: *mut FfiDocument,
    path: *const c_char,
    value: *const c_char,
) -> BeaconResult {
    let value = match unsafe { str_arg(value) } {
        Ok(v) => v,
        Err(e) => return e,
    };
    with_document(doc, path, |d, p| d.set_str(p, value))
}

#[unsafe(no_mangle)]
pub extern "C" fn beacon_document_add_int(
    doc: *mut FfiDocument,
    path: *const c_char,
    value: i64,
) -> BeaconResult {
    with_document(doc, path, |d, p| d.set_int(p, value))
}

/// Non-finite values are stored as JSON `null`.
#[unsafe(no_mangle)]
pub extern "C" fn beacon_document_add_double(
    doc: *mut FfiDocument,
    path: *const c_char,
    value: f64,
) -> BeaconResult {
    with_document(doc, path, |d, p| d.set_double(p, value))
}

#[unsafe(no_mangle)]
pub extern "C" fn beacon_document_add_bool(
    doc: *mut FfiDocument,
    path: *const c_char,
    value: bool,
) -> BeaconResult {
    with_document(doc, path, |d, p| d.set_bool(p, value))
}
