use crate::error::{DeviceError, Error, ErrorKind};
use crate::DbPv::{EventHandle, NotifyHandle};
use std::ffi::CStr;
use std::os::raw::{c_char, c_long};

// Error codes
pub const DBPV_SUCCESS: i32 = 0;
pub const DBPV_ERROR_NULL_POINTER: i32 = -1;
pub const DBPV_ERROR_CONFIGURATION: i32 = -2;
pub const DBPV_ERROR_INVALID_ARG: i32 = -3;
pub const DBPV_ERROR_INVALID_STATE: i32 = -4;
pub const DBPV_ERROR_UNAVAILABLE: i32 = -5;
pub const DBPV_ERROR_DEVICE: i32 = -6;

/// Status code a C caller sees for `err`.
pub fn error_code(err: &Error) -> i32 {
    match err.kind() {
        ErrorKind::Configuration => DBPV_ERROR_CONFIGURATION,
        ErrorKind::InvalidArgument => DBPV_ERROR_INVALID_ARG,
        ErrorKind::InvalidState => DBPV_ERROR_INVALID_STATE,
        ErrorKind::Unavailable => DBPV_ERROR_UNAVAILABLE,
        ErrorKind::DeviceFailure => DBPV_ERROR_DEVICE,
    }
}

/// Static, NUL-terminated description of a status code.
#[no_mangle]
pub extern "C" fn dbpv_status_string(code: i32) -> *const c_char {
    let text: &'static [u8] = match code {
        DBPV_SUCCESS => b"success\0",
        DBPV_ERROR_NULL_POINTER => b"null pointer\0",
        DBPV_ERROR_CONFIGURATION => b"configuration error\0",
        DBPV_ERROR_INVALID_ARG => b"invalid argument\0",
        DBPV_ERROR_INVALID_STATE => b"invalid state\0",
        DBPV_ERROR_UNAVAILABLE => b"not available\0",
        DBPV_ERROR_DEVICE => b"device failure\0",
        _ => b"unknown status\0",
    };
    text.as_ptr() as *const c_char
}

// -----------------------------------------------------------------------------
// Monitor events
// -----------------------------------------------------------------------------

/// Deliver one change event to the monitor behind `handle`.
///
/// Safe to call from any thread, at any time, until the handle is freed.
/// Events for a monitor that has been dropped are ignored.
///
/// # Returns
/// * 0 on success, `DBPV_ERROR_NULL_POINTER` for a null handle.
#[no_mangle]
pub extern "C" fn dbpv_event_handle_fire(handle: *const EventHandle) -> i32 {
    if handle.is_null() {
        return DBPV_ERROR_NULL_POINTER;
    }
    let handle = unsafe { &*handle };
    handle.fire();
    DBPV_SUCCESS
}

/// Free an event handle obtained from `EventHandle::into_raw`.
#[no_mangle]
pub extern "C" fn dbpv_event_handle_free(handle: *mut EventHandle) {
    if !handle.is_null() {
        unsafe {
            let _ = EventHandle::from_raw(handle); // Dropped automatically
        }
    }
}

// -----------------------------------------------------------------------------
// Process completion
// -----------------------------------------------------------------------------

/// Report the end of record processing and consume the notify handle.
///
/// # Arguments
/// * `handle` - Pointer from `NotifyHandle::into_raw`; invalid afterwards.
/// * `status` - 0 for success, the subsystem's status code otherwise.
/// * `message` - Optional NUL-terminated failure text; may be null.
///
/// # Returns
/// * 0 on success, `DBPV_ERROR_NULL_POINTER` for a null handle.
#[no_mangle]
pub extern "C" fn dbpv_notify_complete(
    handle: *mut NotifyHandle,
    status: c_long,
    message: *const c_char,
) -> i32 {
    if handle.is_null() {
        return DBPV_ERROR_NULL_POINTER;
    }
    let notify = unsafe { NotifyHandle::from_raw(handle) };
    let outcome = if status == 0 {
        Ok(())
    } else {
        let text = if message.is_null() {
            "record processing failed".to_string()
        } else {
            unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned()
        };
        Err(DeviceError::new(status as i64, text))
    };
    notify.complete(outcome);
    DBPV_SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_distinct_code() {
        let codes = [
            error_code(&Error::Configuration(String::new())),
            error_code(&Error::InvalidStride),
            error_code(&Error::AlreadyStarted),
            error_code(&DeviceError::new(1, "x").into()),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert!(*a < 0);
            assert!(codes[i + 1..].iter().all(|b| b != a));
        }
    }

    #[test]
    fn status_strings_are_terminated() {
        let text = unsafe { CStr::from_ptr(dbpv_status_string(DBPV_ERROR_DEVICE)) };
        assert_eq!(text.to_str().unwrap(), "device failure");
    }
}
