//! C Bindings for shm_json
//!
//! Provides a raw C API for creating, attaching to and using mailboxes.
//! Values cross the boundary as JSON text.

use crate::mailbox::Mailbox;
use crate::shm::Role;
use serde_json::Value;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::ptr;
use std::time::Duration;

// Opaque handle
pub struct ShmJsonHandle(Mailbox);

unsafe fn str_arg<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    CStr::from_ptr(s).to_str().ok()
}

unsafe fn open_handle(name: *const c_char, capacity: usize, role: Role) -> *mut ShmJsonHandle {
    let name = match str_arg(name) {
        Some(s) => s,
        None => return ptr::null_mut(),
    };

    match Mailbox::open(name, capacity, role) {
        Ok(mailbox) => Box::into_raw(Box::new(ShmJsonHandle(mailbox))),
        Err(e) => {
            tracing::warn!(name = %name, error = %e, "C API failed to open mailbox");
            ptr::null_mut()
        }
    }
}

/// Copy `text` into `buf` as a NUL-terminated string, truncating if needed
///
/// Truncation stops at a UTF-8 character boundary, so the copied prefix is
/// always valid text. Returns the full length of `text`, so callers can
/// detect truncation.
unsafe fn copy_out(text: &str, buf: *mut c_char, buf_len: usize) -> usize {
    if !buf.is_null() && buf_len > 0 {
        let mut n = text.len().min(buf_len - 1);
        while !text.is_char_boundary(n) {
            n -= 1;
        }
        ptr::copy_nonoverlapping(text.as_ptr(), buf.cast::<u8>(), n);
        *buf.add(n) = 0;
    }
    text.len()
}

/// Create a new mailbox as its owner
///
/// Returns null on failure.
///
/// # Safety
/// name must be a valid null-terminated string
#[no_mangle]
pub unsafe extern "C" fn shm_json_create(name: *const c_char, capacity: usize) -> *mut ShmJsonHandle {
    open_handle(name, capacity, Role::Owner)
}

/// Attach to an existing mailbox
///
/// Returns null if it does not exist.
///
/// # Safety
/// name must be a valid null-terminated string
#[no_mangle]
pub unsafe extern "C" fn shm_json_attach(name: *const c_char, capacity: usize) -> *mut ShmJsonHandle {
    open_handle(name, capacity, Role::Attacher)
}

/// Destroy a handle; owners also remove the named objects
#[no_mangle]
pub unsafe extern "C" fn shm_json_destroy(handle: *mut ShmJsonHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Write a JSON document given as text
///
/// Returns false if the text does not parse or does not fit.
#[no_mangle]
pub unsafe extern "C" fn shm_json_write(handle: *mut ShmJsonHandle, json: *const c_char) -> bool {
    if handle.is_null() {
        return false;
    }
    let mailbox = &(*handle).0;
    match str_arg(json) {
        Some(text) => mailbox.write_json(text).is_ok(),
        None => false,
    }
}

/// Read the current value as JSON text into buf
///
/// Returns the text length (may be larger than buf_len - 1), or -1 on error.
#[no_mangle]
pub unsafe extern "C" fn shm_json_read(
    handle: *mut ShmJsonHandle,
    buf: *mut c_char,
    buf_len: usize,
) -> isize {
    if handle.is_null() {
        return -1;
    }
    let mailbox = &(*handle).0;
    match mailbox.read::<Value>() {
        Ok(value) => copy_out(&value.to_string(), buf, buf_len) as isize,
        Err(_) => -1,
    }
}

/// Wait up to timeout_ms for a value newer than last_seq
///
/// Same return convention as `shm_json_read`.
#[no_mangle]
pub unsafe extern "C" fn shm_json_read_with_timeout(
    handle: *mut ShmJsonHandle,
    buf: *mut c_char,
    buf_len: usize,
    timeout_ms: u64,
    last_seq: u64,
) -> isize {
    if handle.is_null() {
        return -1;
    }
    let mailbox = &(*handle).0;
    match mailbox.read_with_timeout::<Value>(Duration::from_millis(timeout_ms), last_seq) {
        Ok(value) => copy_out(&value.to_string(), buf, buf_len) as isize,
        Err(_) => -1,
    }
}

/// Current sequence number (0 on error)
#[no_mangle]
pub unsafe extern "C" fn shm_json_sequence_number(handle: *mut ShmJsonHandle) -> u64 {
    if handle.is_null() {
        return 0;
    }
    (*handle).0.sequence_number().unwrap_or(0)
}

/// Payload capacity in bytes
#[no_mangle]
pub unsafe extern "C" fn shm_json_capacity(handle: *mut ShmJsonHandle) -> usize {
    if handle.is_null() {
        return 0;
    }
    (*handle).0.capacity()
}

/// Copy the last error message into buf
///
/// Returns the message length, or 0 if no operation has failed yet.
#[no_mangle]
pub unsafe extern "C" fn shm_json_last_error(
    handle: *mut ShmJsonHandle,
    buf: *mut c_char,
    buf_len: usize,
) -> usize {
    if handle.is_null() {
        return 0;
    }
    match (*handle).0.last_error() {
        Some(message) => copy_out(&message, buf, buf_len),
        None => 0,
    }
}
