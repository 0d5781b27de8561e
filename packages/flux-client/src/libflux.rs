//! Connector backed by libflux-core.
//!
//! Only the string-payload entry points are bound, so no variadic pack/unpack
//! calls cross the FFI boundary: requests are serialized with `serde_json`
//! and responses parsed from the returned JSON text.

use std::ffi::{c_char, c_int, CStr, CString};
use std::io;
use std::ptr;

use serde_json::Value;

use crate::error::{ClientError, Result};
use crate::handle::{Connector, Endpoint, Handle};

/// Route a request to any rank that provides the service.
const FLUX_NODEID_ANY: u32 = 0xFFFF_FFFF;

#[repr(C)]
struct FluxHandle {
    _private: [u8; 0],
}

#[repr(C)]
struct FluxFuture {
    _private: [u8; 0],
}

#[link(name = "flux-core")]
extern "C" {
    fn flux_open(uri: *const c_char, flags: c_int) -> *mut FluxHandle;
    fn flux_close(h: *mut FluxHandle);
    fn flux_get_rank(h: *mut FluxHandle, rank: *mut u32) -> c_int;
    fn flux_attr_get(h: *mut FluxHandle, name: *const c_char) -> *const c_char;
    fn flux_rpc(
        h: *mut FluxHandle,
        topic: *const c_char,
        s: *const c_char,
        nodeid: u32,
        flags: c_int,
    ) -> *mut FluxFuture;
    fn flux_rpc_get(f: *mut FluxFuture, s: *mut *const c_char) -> c_int;
    fn flux_future_destroy(f: *mut FluxFuture);
}

fn c_string(s: &str) -> io::Result<CString> {
    CString::new(s).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// Opens real broker connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibFluxConnector;

impl LibFluxConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for LibFluxConnector {
    fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Handle>> {
        let connect_err = |source| ClientError::Connect {
            uri: endpoint.to_string(),
            source,
        };
        let uri = endpoint
            .as_uri()
            .map(c_string)
            .transpose()
            .map_err(connect_err)?;

        // SAFETY: uri is either null or a valid NUL-terminated string that
        // outlives the call.
        let raw = unsafe { flux_open(uri.as_ref().map_or(ptr::null(), |u| u.as_ptr()), 0) };
        if raw.is_null() {
            return Err(connect_err(io::Error::last_os_error()));
        }
        tracing::debug!(%endpoint, "Opened broker handle");
        Ok(Box::new(LibFluxHandle { raw }))
    }
}

/// An open libflux handle, closed on drop.
pub struct LibFluxHandle {
    raw: *mut FluxHandle,
}

/// Owns a future until its response has been copied out.
struct RpcFuture(*mut FluxFuture);

impl Drop for RpcFuture {
    fn drop(&mut self) {
        // SAFETY: the pointer came from flux_rpc and is destroyed once.
        unsafe { flux_future_destroy(self.0) }
    }
}

impl Handle for LibFluxHandle {
    fn rank(&self) -> Result<u32> {
        let mut rank: u32 = 0;
        // SAFETY: raw is a live handle; rank is a valid out pointer.
        if unsafe { flux_get_rank(self.raw, &mut rank) } < 0 {
            return Err(ClientError::Rank(io::Error::last_os_error()));
        }
        Ok(rank)
    }

    fn attr_get(&self, name: &str) -> Result<String> {
        let attr_err = |source| ClientError::Attr {
            name: name.to_string(),
            source,
        };
        let c_name = c_string(name).map_err(attr_err)?;
        // SAFETY: raw is a live handle; the returned string is owned by the
        // handle and copied before the handle can be dropped.
        let value = unsafe { flux_attr_get(self.raw, c_name.as_ptr()) };
        if value.is_null() {
            return Err(attr_err(io::Error::last_os_error()));
        }
        let value = unsafe { CStr::from_ptr(value) };
        Ok(value.to_string_lossy().into_owned())
    }

    fn rpc(&self, topic: &str, payload: Value) -> Result<Value> {
        let rpc_err = |source| ClientError::Rpc {
            topic: topic.to_string(),
            source,
        };
        let c_topic = c_string(topic).map_err(rpc_err)?;
        let body = match payload {
            Value::Null => None,
            other => Some(c_string(&serde_json::to_string(&other)?).map_err(rpc_err)?),
        };

        // SAFETY: raw is a live handle; topic and body outlive the call.
        let future = unsafe {
            flux_rpc(
                self.raw,
                c_topic.as_ptr(),
                body.as_ref().map_or(ptr::null(), |b| b.as_ptr()),
                FLUX_NODEID_ANY,
                0,
            )
        };
        if future.is_null() {
            return Err(rpc_err(io::Error::last_os_error()));
        }
        let future = RpcFuture(future);

        let mut response: *const c_char = ptr::null();
        // SAFETY: future is live until RpcFuture drops; response points into
        // the future's message and is copied before that.
        if unsafe { flux_rpc_get(future.0, &mut response) } < 0 {
            return Err(rpc_err(io::Error::last_os_error()));
        }
        if response.is_null() {
            return Ok(Value::Null);
        }
        let text = unsafe { CStr::from_ptr(response) }.to_string_lossy();
        Ok(serde_json::from_str(&text)?)
    }
}

impl Drop for LibFluxHandle {
    fn drop(&mut self) {
        // SAFETY: raw came from flux_open and is closed exactly once.
        unsafe { flux_close(self.raw) }
    }
}
