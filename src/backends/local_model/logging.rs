use std::os::raw::{c_char, c_void};
use std::sync::Once;

unsafe extern "C" fn discard_whisper_log(
    _level: u32,
    _msg: *const c_char,
    _user_data: *mut c_void,
) {
}

/// Route whisper.cpp's own logging into a no-op sink, once per process.
pub(super) fn silence_whisper_logging() {
    static INIT: Once = Once::new();

    INIT.call_once(|| unsafe {
        whisper_rs::set_log_callback(Some(discard_whisper_log), std::ptr::null_mut());
    });
}
