//! Linux-PAM account management entry point.
//!
//! Built into `libpam_flux.so` with the `pam` feature and listed in a stack
//! as e.g. `account required pam_flux.so allow-guest-user`.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use flux_client::LibFluxConnector;

use crate::driver::{Authorizer, Conversation, SystemUsers, Verdict};
use crate::error::{PamFluxError, Result};
use crate::logging::with_syslog;

const PAM_SUCCESS: c_int = 0;
const PAM_USER: c_int = 2;
const PAM_CONV: c_int = 5;
const PAM_ERROR_MSG: c_int = 3;
const PAM_MAX_MSG_SIZE: usize = 512;

#[repr(C)]
pub struct PamHandle {
    _private: [u8; 0],
}

#[repr(C)]
struct PamMessage {
    msg_style: c_int,
    msg: *const c_char,
}

#[repr(C)]
struct PamResponse {
    resp: *mut c_char,
    resp_retcode: c_int,
}

type ConvFn = unsafe extern "C" fn(
    num_msg: c_int,
    msg: *mut *const PamMessage,
    resp: *mut *mut PamResponse,
    appdata_ptr: *mut c_void,
) -> c_int;

#[repr(C)]
struct PamConv {
    conv: Option<ConvFn>,
    appdata_ptr: *mut c_void,
}

#[link(name = "pam")]
extern "C" {
    fn pam_get_item(pamh: *const PamHandle, item_type: c_int, item: *mut *const c_void) -> c_int;
    fn pam_strerror(pamh: *mut PamHandle, errnum: c_int) -> *const c_char;
}

extern "C" {
    fn free(ptr: *mut c_void);
}

fn strerror(pamh: *mut PamHandle, rc: c_int) -> String {
    // SAFETY: pam_strerror returns a static string for any code.
    let s = unsafe { pam_strerror(pamh, rc) };
    if s.is_null() {
        return format!("PAM error {rc}");
    }
    unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned()
}

fn get_item(pamh: *mut PamHandle, item_type: c_int) -> Result<*const c_void> {
    let mut item: *const c_void = ptr::null();
    // SAFETY: pamh is the handle PAM passed to this call.
    let rc = unsafe { pam_get_item(pamh, item_type, &mut item) };
    if rc != PAM_SUCCESS {
        return Err(PamFluxError::Conversation(strerror(pamh, rc)));
    }
    Ok(item)
}

fn pam_user(pamh: *mut PamHandle) -> Option<String> {
    match get_item(pamh, PAM_USER) {
        Ok(item) if !item.is_null() => {
            // SAFETY: PAM_USER is a NUL-terminated string owned by PAM.
            let user = unsafe { CStr::from_ptr(item as *const c_char) };
            Some(user.to_string_lossy().into_owned())
        }
        Ok(_) => None,
        Err(e) => {
            tracing::error!("unable to identify user: {e}");
            None
        }
    }
}

/// Copy `argv` into owned strings.
///
/// # Safety
///
/// `argv` must point to `argc` valid NUL-terminated strings.
unsafe fn module_args(argc: c_int, argv: *const *const c_char) -> Vec<String> {
    if argv.is_null() || argc <= 0 {
        return Vec::new();
    }
    (0..argc as usize)
        .map(|i| *argv.add(i))
        .filter(|arg| !arg.is_null())
        .map(|arg| CStr::from_ptr(arg).to_string_lossy().into_owned())
        .collect()
}

/// Truncate to what PAM will carry, on a char boundary.
fn clamp_message(message: &str) -> CString {
    let mut end = message.len().min(PAM_MAX_MSG_SIZE - 1);
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    let bytes: Vec<u8> = message[..end].bytes().filter(|b| *b != 0).collect();
    CString::new(bytes).unwrap_or_default()
}

/// The application's conversation function.
struct PamConversation {
    pamh: *mut PamHandle,
}

impl Conversation for PamConversation {
    fn error_message(&mut self, message: &str) -> Result<()> {
        let conv = get_item(self.pamh, PAM_CONV)? as *const PamConv;
        // SAFETY: PAM_CONV, when set, points to the application's pam_conv.
        let Some(conv) = (unsafe { conv.as_ref() }) else {
            return Err(PamFluxError::Conversation("no conversation function".into()));
        };
        let Some(conv_fn) = conv.conv else {
            return Err(PamFluxError::Conversation("no conversation function".into()));
        };

        let text = clamp_message(message);
        let msg = PamMessage {
            msg_style: PAM_ERROR_MSG,
            msg: text.as_ptr(),
        };
        let mut msgs = [&msg as *const PamMessage];
        let mut resp: *mut PamResponse = ptr::null_mut();

        // SAFETY: msgs and text live across the call; the response, if any,
        // is allocated by the application and ours to free.
        let rc = unsafe { conv_fn(1, msgs.as_mut_ptr(), &mut resp, conv.appdata_ptr) };
        if !resp.is_null() {
            unsafe {
                free((*resp).resp as *mut c_void);
                free(resp as *mut c_void);
            }
        }
        if rc != PAM_SUCCESS {
            return Err(PamFluxError::Conversation(strerror(self.pamh, rc)));
        }
        Ok(())
    }
}

/// # Safety
///
/// Called by libpam with a live handle and `argc` valid strings in `argv`.
unsafe fn acct_mgmt(pamh: *mut PamHandle, argc: c_int, argv: *const *const c_char) -> c_int {
    let user = pam_user(pamh);
    let args = module_args(argc, argv);
    let mut conv = PamConversation { pamh };

    Authorizer::new(LibFluxConnector::new(), &SystemUsers)
        .authorize(user.as_deref(), &args, &mut conv)
        .pam_code()
}

/// Account management hook. Panics are reported as `PAM_SYSTEM_ERR`.
#[no_mangle]
pub extern "C" fn pam_sm_acct_mgmt(
    pamh: *mut PamHandle,
    _flags: c_int,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        with_syslog(|| unsafe { acct_mgmt(pamh, argc, argv) })
    }));
    result.unwrap_or(Verdict::SystemError.pam_code())
}
