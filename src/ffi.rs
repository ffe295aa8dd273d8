//! FFI bindings for RatRopy
//!
//! C-compatible entry points for hosts that drive trials in another language and only
//! need the scoring and report rendering. All strings are null-terminated; returned
//! strings are allocated here and must be freed with `ratropy_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::entropy::EntropyEngine;
use crate::report::TextReportExporter;
use crate::types::{Subject, TrialRecord};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Parse a JSON array of label strings
unsafe fn parse_labels(labels_json: *const c_char) -> Result<Vec<String>, String> {
    let json = cstr_to_string(labels_json).ok_or("Invalid labels string pointer")?;
    serde_json::from_str(&json).map_err(|e| format!("Labels must be a JSON array of strings: {}", e))
}

// ============================================================================
// Entropy
// ============================================================================

/// Compute the entropy score of a JSON array of labels.
///
/// # Safety
/// - `labels_json` must be a valid null-terminated C string.
/// - Returns NaN on error; call `ratropy_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ratropy_compute_entropy(labels_json: *const c_char) -> f64 {
    clear_last_error();

    match parse_labels(labels_json) {
        Ok(labels) => EntropyEngine::compute(&labels),
        Err(msg) => {
            set_last_error(&msg);
            f64::NAN
        }
    }
}

/// Compute the per-order entropy terms of a JSON array of labels, as JSON.
///
/// # Safety
/// - `labels_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `ratropy_free_string`.
/// - Returns NULL on error; call `ratropy_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ratropy_entropy_breakdown(labels_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let labels = match parse_labels(labels_json) {
        Ok(labels) => labels,
        Err(msg) => {
            set_last_error(&msg);
            return ptr::null_mut();
        }
    };

    match serde_json::to_string(&EntropyEngine::breakdown(&labels)) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Render a plain-text report for a trial record and subject (both JSON).
///
/// # Safety
/// - `trial_json` and `subject_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `ratropy_free_string`.
/// - Returns NULL on error; call `ratropy_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ratropy_render_text_report(
    trial_json: *const c_char,
    subject_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let trial_str = match cstr_to_string(trial_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid trial string pointer");
            return ptr::null_mut();
        }
    };

    let subject_str = match cstr_to_string(subject_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid subject string pointer");
            return ptr::null_mut();
        }
    };

    let trial: TrialRecord = match serde_json::from_str(&trial_str) {
        Ok(t) => t,
        Err(e) => {
            set_last_error(&format!("Invalid trial JSON: {}", e));
            return ptr::null_mut();
        }
    };

    let subject: Subject = match serde_json::from_str(&subject_str) {
        Ok(s) => s,
        Err(e) => {
            set_last_error(&format!("Invalid subject JSON: {}", e));
            return ptr::null_mut();
        }
    };

    string_to_cstr(&TextReportExporter.render_string(&trial, &subject))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by RatRopy functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a RatRopy function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn ratropy_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next RatRopy call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn ratropy_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn ratropy_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
