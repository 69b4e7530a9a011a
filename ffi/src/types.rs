//! `#[repr(C)]` types and string helpers for the FFI boundary.
//!
//! # Design
//! The engine, the analytics context and documents are exposed as opaque
//! handles: C callers only ever hold a pointer and pass it back. Fallible
//! operations return a `BeaconResult` code instead of a message so the C
//! side can switch on it without freeing anything.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use beacon_core::AnalyticsError;

/// Opaque handle to an `HttpClient`.
pub struct FfiHttp {
    pub(crate) inner: beacon_core::HttpClient,
}

/// Opaque handle to an `Analytics` context.
pub struct FfiAnalytics {
    pub(crate) inner: beacon_core::Analytics,
}

/// Opaque handle to a `Document` under construction.
pub struct FfiDocument {
    pub(crate) inner: beacon_core::Document,
}

/// Called with the collection name and how many documents were uploaded.
pub type SuccessCallback = Option<extern "C" fn(collection: *const c_char, count: i32)>;

/// Called with the collection name and the exchange status.
pub type ErrorCallback = Option<extern "C" fn(collection: *const c_char, status: i32)>;

/// Outcome code for fallible FFI calls.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconResult {
    Ok = 0,
    NullArg = 1,
    InvalidUtf8 = 2,
    UnknownCollection = 3,
    DuplicateCollection = 4,
    InvalidPath = 5,
    Serialization = 6,
    Panic = 7,
}

impl From<&AnalyticsError> for BeaconResult {
    fn from(err: &AnalyticsError) -> Self {
        match err {
            AnalyticsError::UnknownCollection(_) => BeaconResult::UnknownCollection,
            AnalyticsError::DuplicateCollection(_) => BeaconResult::DuplicateCollection,
            AnalyticsError::InvalidPath(_) => BeaconResult::InvalidPath,
            AnalyticsError::Serialization(_) => BeaconResult::Serialization,
        }
    }
}

impl From<Result<(), AnalyticsError>> for BeaconResult {
    fn from(result: Result<(), AnalyticsError>) -> Self {
        match result {
            Ok(()) => BeaconResult::Ok,
            Err(e) => BeaconResult::from(&e),
        }
    }
}

/// Borrow a C string as UTF-8. `Err` carries the code to hand back.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
pub(crate) unsafe fn str_arg<'a>(ptr: *const c_char) -> Result<&'a str, BeaconResult> {
    if ptr.is_null() {
        return Err(BeaconResult::NullArg);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| BeaconResult::InvalidUtf8)
}

/// Copy `s` into a heap C string owned by the caller. Content after an
/// interior NUL cannot be represented and is cut off.
pub(crate) fn to_c_string(s: &str) -> *mut c_char {
    let c = CString::new(s).unwrap_or_else(|e| {
        let nul = e.nul_position();
        let mut bytes = e.into_vec();
        bytes.truncate(nul);
        CString::new(bytes).unwrap_or_default()
    });
    c.into_raw()
}
