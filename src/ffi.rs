//! C ABI over the global timer context.
//!
//! Every entry point returns an [`ErrorCode`] and never unwinds: timer
//! errors and panics alike become a code, and the message of the last call
//! made on the current thread can be fetched with
//! [`tictoc_last_error_message`]. Reports are copied into caller-provided
//! buffers, truncated to fit and always NUL-terminated.
#![allow(unsafe_code)]

use std::cell::RefCell;
use std::ffi::{CStr, c_char};
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};

use tictoc_runtime::{ErrorKind, TimerError};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Ok = 0,
    AlreadyRunning = 1,
    NoOpenInterval = 2,
    LabelMismatch = 3,
    UnstoppedInterval = 4,
    InvalidArgument = 5,
    Io = 6,
    Panic = 7,
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::AlreadyRunning => ErrorCode::AlreadyRunning,
            ErrorKind::NoOpenInterval => ErrorCode::NoOpenInterval,
            ErrorKind::LabelMismatch => ErrorCode::LabelMismatch,
            ErrorKind::UnstoppedInterval => ErrorCode::UnstoppedInterval,
        }
    }
}

struct Failure {
    code: ErrorCode,
    message: String,
}

impl Failure {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidArgument,
            message: message.into(),
        }
    }
}

impl From<TimerError> for Failure {
    fn from(err: TimerError) -> Self {
        Self {
            code: err.kind().into(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for Failure {
    fn from(err: std::io::Error) -> Self {
        Self {
            code: ErrorCode::Io,
            message: err.to_string(),
        }
    }
}

thread_local! {
    static LAST_ERROR: RefCell<(ErrorCode, String)> = const { RefCell::new((ErrorCode::Ok, String::new())) };
}

/// Run `body`, turning its failure or panic into a code and remembering the
/// message for this thread.
fn guarded(body: impl FnOnce() -> Result<(), Failure>) -> ErrorCode {
    let (code, message) = match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => (ErrorCode::Ok, String::new()),
        Ok(Err(failure)) => (failure.code, failure.message),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic in timer library".to_owned());
            (ErrorCode::Panic, message)
        }
    };
    if code != ErrorCode::Ok {
        tracing::warn!(?code, "{message}");
    }
    LAST_ERROR.with(|last| *last.borrow_mut() = (code, message));
    code
}

/// Copy as much of `text` as fits into `buf`, leaving room for a NUL byte.
/// Returns the number of text bytes written.
pub fn copy_to_buffer(text: &str, buf: &mut [u8]) -> usize {
    let Some(room) = buf.len().checked_sub(1) else {
        return 0;
    };
    let n = text.len().min(room);
    buf[..n].copy_from_slice(&text.as_bytes()[..n]);
    buf[n] = 0;
    n
}

/// # Safety
///
/// `name` must be null or point to a NUL-terminated string that stays valid
/// for `'a`.
unsafe fn name_arg<'a>(name: *const c_char) -> Result<&'a str, Failure> {
    if name.is_null() {
        return Err(Failure::invalid("timer name is a null pointer"));
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract.
    let name = unsafe { CStr::from_ptr(name) };
    name.to_str()
        .map_err(|e| Failure::invalid(format!("timer name is not valid UTF-8: {e}")))
}

/// # Safety
///
/// `buf` must be null or valid for writes of `n` bytes.
unsafe fn write_out(text: &str, buf: *mut c_char, n: usize) -> Result<(), Failure> {
    if n == 0 {
        return Ok(());
    }
    if buf.is_null() {
        return Err(Failure::invalid("output buffer is a null pointer"));
    }
    // SAFETY: non-null and valid for `n` bytes per the caller's contract.
    let out = unsafe { std::slice::from_raw_parts_mut(buf.cast::<u8>(), n) };
    copy_to_buffer(text, out);
    Ok(())
}

/// Start the interval `name` on the calling thread.
///
/// # Safety
///
/// `name` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tictoc_tic(name: *const c_char) -> ErrorCode {
    guarded(|| {
        // SAFETY: forwarded from this function's contract.
        let name = unsafe { name_arg(name) }?;
        tictoc_runtime::tic(name)?;
        Ok(())
    })
}

/// Stop the innermost interval of the calling thread, which must be `name`.
///
/// # Safety
///
/// `name` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tictoc_toc(name: *const c_char) -> ErrorCode {
    guarded(|| {
        // SAFETY: forwarded from this function's contract.
        let name = unsafe { name_arg(name) }?;
        tictoc_runtime::toc(name)?;
        Ok(())
    })
}

/// Render the report into `buf` (at most `n - 1` bytes plus a NUL).
///
/// # Safety
///
/// `buf` must be null or valid for writes of `n` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tictoc_report_to_buffer(buf: *mut c_char, n: usize) -> ErrorCode {
    guarded(|| {
        let report = tictoc_runtime::render_report()?;
        // SAFETY: forwarded from this function's contract.
        unsafe { write_out(&report, buf, n) }
    })
}

/// Print the report to standard output.
#[unsafe(no_mangle)]
pub extern "C" fn tictoc_report_to_stdout() -> ErrorCode {
    guarded(|| {
        let report = tictoc_runtime::render_report()?;
        let mut out = anstream::stdout();
        out.write_all(report.as_bytes())?;
        out.flush()?;
        Ok(())
    })
}

/// Drop all collected timings of all threads.
#[unsafe(no_mangle)]
pub extern "C" fn tictoc_reset() -> ErrorCode {
    guarded(|| {
        tictoc_runtime::reset();
        Ok(())
    })
}

/// Code returned by the calling thread's most recent call.
#[unsafe(no_mangle)]
pub extern "C" fn tictoc_last_error_code() -> ErrorCode {
    LAST_ERROR.with(|last| last.borrow().0)
}

/// Copy the message of the calling thread's most recent failure into `buf`.
/// Empty after a successful call.
///
/// # Safety
///
/// `buf` must be null or valid for writes of `n` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tictoc_last_error_message(buf: *mut c_char, n: usize) {
    LAST_ERROR.with(|last| {
        // SAFETY: forwarded from this function's contract.
        let _ = unsafe { write_out(&last.borrow().1, buf, n) };
    });
}
