//! Core FFI infrastructure: error handling, runtime, memory helpers.

use std::cell::RefCell;
use std::ffi::{CStr, CString, c_char};
use std::sync::OnceLock;

use tokio::runtime::Runtime;

/// Internal fallible result; errors become thread-local messages.
pub(crate) type FfiResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Message buffers crossing the boundary
// ---------------------------------------------------------------------------

/// A byte payload crossing the ABI boundary. Allocated by this library;
/// ownership transfers to the caller, who must release it with
/// [`p2p_free_message`]. A zero-size message carries a null `data`.
#[repr(C)]
#[derive(Debug)]
pub struct P2pMessage {
    /// Pointer to `data_size` bytes, or null when `data_size` is 0.
    pub data: *mut u8,
    /// Number of bytes behind `data`.
    pub data_size: usize,
}

/// Copy `bytes` into a fresh caller-owned message sized exactly to fit.
pub(crate) fn message_from_bytes(bytes: &[u8]) -> *mut P2pMessage {
    let data_size = bytes.len();
    let data = if data_size == 0 {
        std::ptr::null_mut()
    } else {
        Box::leak(bytes.to_vec().into_boxed_slice()).as_mut_ptr()
    };
    Box::into_raw(Box::new(P2pMessage { data, data_size }))
}

/// Allocate a zeroed message of `size` bytes for the caller to fill
/// (typically before [`p2p_send`]). Free with [`p2p_free_message`].
///
/// [`p2p_send`]: crate::client::p2p_send
#[unsafe(no_mangle)]
pub extern "C" fn p2p_malloc_message(size: usize) -> *mut P2pMessage {
    message_from_bytes(&vec![0u8; size])
}

/// Free a message previously returned by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn p2p_free_message(msg: *mut P2pMessage) {
    if msg.is_null() {
        return;
    }
    let msg = unsafe { Box::from_raw(msg) };
    if !msg.data.is_null() && msg.data_size > 0 {
        drop(unsafe { Vec::from_raw_parts(msg.data, msg.data_size, msg.data_size) });
    }
}

// ---------------------------------------------------------------------------
// Thread-local error
// ---------------------------------------------------------------------------

thread_local! {
    static LAST_ERROR: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Store an error message for later retrieval.
pub(crate) fn set_last_error(msg: impl Into<String>) {
    LAST_ERROR.with(|e| *e.borrow_mut() = msg.into());
}

/// Get the length of the last error message (including NUL terminator).
/// Returns 0 if no error.
#[unsafe(no_mangle)]
pub extern "C" fn p2p_last_error_length() -> i32 {
    LAST_ERROR.with(|e| {
        let s = e.borrow();
        if s.is_empty() { 0 } else { s.len() as i32 + 1 }
    })
}

/// Copy the last error message into `buf`. Returns bytes written
/// (excluding NUL), or -1 if `buf` is null or too small.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn p2p_last_error_message(buf: *mut c_char, buf_len: i32) -> i32 {
    if buf.is_null() || buf_len <= 0 {
        return -1;
    }
    LAST_ERROR.with(|e| {
        let s = e.borrow();
        if s.is_empty() {
            unsafe {
                *buf = 0;
            }
            return 0;
        }
        let bytes = s.as_bytes();
        let copy_len = bytes.len().min((buf_len - 1) as usize);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf.cast::<u8>(), copy_len);
            *buf.add(copy_len) = 0;
        }
        copy_len as i32
    })
}

// ---------------------------------------------------------------------------
// Error-catching wrappers
// ---------------------------------------------------------------------------

/// Execute a closure, set the thread-local error on failure, return code.
pub(crate) fn catch<F>(f: F) -> i32
where
    F: FnOnce() -> FfiResult,
{
    match f() {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(e.to_string());
            -1
        }
    }
}

/// Execute an async closure on the shared runtime, set error on failure,
/// return code.
pub(crate) fn catch_async<F, Fut>(f: F) -> i32
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = FfiResult>,
{
    catch(|| runtime().block_on(f()))
}

// ---------------------------------------------------------------------------
// Shared tokio runtime
// ---------------------------------------------------------------------------

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Get or initialize the global tokio runtime.
pub(crate) fn runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| Runtime::new().expect("failed to create tokio runtime"))
}

// ---------------------------------------------------------------------------
// String helpers
// ---------------------------------------------------------------------------

/// Convert a C string to an owned Rust `String`. `Err` on null or invalid
/// UTF-8.
pub(crate) unsafe fn c_str_to_string(s: *const c_char) -> FfiResult<String> {
    if s.is_null() {
        return Err("null string pointer".into());
    }
    Ok(unsafe { CStr::from_ptr(s) }.to_str()?.to_owned())
}

/// Convert a nullable C string, treating null as empty. Config string
/// fields use this: the original flat record never distinguishes null
/// from "".
pub(crate) unsafe fn c_str_or_empty(s: *const c_char) -> FfiResult<String> {
    if s.is_null() {
        return Ok(String::new());
    }
    unsafe { c_str_to_string(s) }
}

/// Allocate a new C string from a Rust `&str`. Caller must free with
/// [`p2p_free_string`].
pub(crate) fn to_c_string(s: &str) -> *mut c_char {
    CString::new(s)
        .map(CString::into_raw)
        .unwrap_or(std::ptr::null_mut())
}

/// Free a string previously returned by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn p2p_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_message_has_null_data() {
        let msg = message_from_bytes(&[]);
        let view = unsafe { &*msg };
        assert_eq!(view.data_size, 0);
        assert!(view.data.is_null());
        unsafe { p2p_free_message(msg) };
    }

    #[test]
    fn message_copies_bytes_exactly() {
        let msg = message_from_bytes(b"abc\x00def");
        let view = unsafe { &*msg };
        assert_eq!(view.data_size, 7);
        let copy = unsafe { std::slice::from_raw_parts(view.data, view.data_size) };
        assert_eq!(copy, b"abc\x00def");
        unsafe { p2p_free_message(msg) };
    }

    #[test]
    fn malloc_message_zeroes_the_buffer() {
        let msg = p2p_malloc_message(4);
        let view = unsafe { &*msg };
        assert_eq!(view.data_size, 4);
        let copy = unsafe { std::slice::from_raw_parts(view.data, view.data_size) };
        assert_eq!(copy, &[0, 0, 0, 0]);
        unsafe { p2p_free_message(msg) };
    }

    #[test]
    fn last_error_round_trips() {
        set_last_error("boom");
        let len = p2p_last_error_length();
        assert_eq!(len, 5);
        let mut buf: Vec<c_char> = vec![0; len as usize];
        let written = unsafe { p2p_last_error_message(buf.as_mut_ptr(), len) };
        assert_eq!(written, 4);
        let text = unsafe { CStr::from_ptr(buf.as_ptr()) };
        assert_eq!(text.to_str().expect("utf8"), "boom");
    }
}
