//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Handles wrap core values behind opaque pointers. Requests go out as plain
//! C data for the host to execute; responses come back the same way. Parsed
//! payloads cross the boundary as JSON text, since their shape is whatever
//! the documented endpoint returns.

use std::ffi::CString;
use std::os::raw::c_char;
use std::sync::Arc;

use habit_core::{ApiError, ApiProxy, EndpointNode, HttpMethod, HttpRequest};

/// Opaque handle to a parsed endpoint tree.
pub struct FfiApiTree {
    pub(crate) inner: Arc<EndpointNode>,
}

/// Opaque handle to a proxy position. Every descent returns a new handle;
/// each must be freed with `habit_proxy_free`.
pub struct FfiApiProxy {
    pub(crate) inner: ApiProxy,
}

/// Allocate a C string, dropping it to empty if `s` holds an interior NUL.
pub(crate) fn c_string(s: impl Into<Vec<u8>>) -> *mut c_char {
    CString::new(s).unwrap_or_default().into_raw()
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiHttpMethod {
    Get = 0,
    Post = 1,
    Put = 2,
    Delete = 3,
}

impl From<HttpMethod> for FfiHttpMethod {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => FfiHttpMethod::Get,
            HttpMethod::Post => FfiHttpMethod::Post,
            HttpMethod::Put => FfiHttpMethod::Put,
            HttpMethod::Delete => FfiHttpMethod::Delete,
        }
    }
}

impl From<FfiHttpMethod> for HttpMethod {
    fn from(m: FfiHttpMethod) -> Self {
        match m {
            FfiHttpMethod::Get => HttpMethod::Get,
            FfiHttpMethod::Post => HttpMethod::Post,
            FfiHttpMethod::Put => HttpMethod::Put,
            FfiHttpMethod::Delete => HttpMethod::Delete,
        }
    }
}

#[repr(C)]
pub struct FfiHeader {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// A request described as C-compatible plain data. `url` is absolute and
/// already carries the query string; `body` is null for GET.
#[repr(C)]
pub struct FfiHttpRequest {
    pub method: FfiHttpMethod,
    pub url: *mut c_char,
    pub headers: *mut FfiHeader,
    pub headers_len: u32,
    pub body: *mut c_char,
}

impl FfiHttpRequest {
    pub(crate) fn from_core(req: HttpRequest) -> *mut Self {
        let body = match req.body {
            Some(b) => c_string(b),
            None => std::ptr::null_mut(),
        };

        let headers_len = req.headers.len() as u32;
        let headers = if req.headers.is_empty() {
            std::ptr::null_mut()
        } else {
            let ffi_headers: Box<[FfiHeader]> = req
                .headers
                .into_iter()
                .map(|(k, v)| FfiHeader {
                    key: c_string(k),
                    value: c_string(v),
                })
                .collect();
            Box::into_raw(ffi_headers) as *mut FfiHeader
        };

        Box::into_raw(Box::new(FfiHttpRequest {
            method: req.method.into(),
            url: c_string(req.url),
            headers,
            headers_len,
            body,
        }))
    }
}

// ---------------------------------------------------------------------------
// Response input (caller-owned)
// ---------------------------------------------------------------------------

/// Filled in by the host after executing an `FfiHttpRequest`. The library
/// reads but never frees these fields.
#[repr(C)]
pub struct FfiHttpResponse {
    pub status: u16,
    pub body: *const c_char,
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    NotFound = 1,
    Api = 2,
    MissingParameter = 3,
    UnexpectedStatus = 4,
    Transport = 5,
    Decode = 6,
    Serialization = 7,
    InvalidUrl = 8,
    InvalidArg = 9,
    Panic = 10,
    NullArg = 11,
}

/// Result envelope for parse and invoke.
///
/// On success `error_code` is `Ok`, `error_message` is null and `data` is
/// the payload serialized as JSON. On failure `data` is null and
/// `http_status` is set when the server answered.
#[repr(C)]
pub struct FfiResult {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub http_status: u16,
    pub data: *mut c_char,
}

impl FfiResult {
    fn boxed(error_code: FfiErrorCode, message: Option<String>, http_status: u16, data: *mut c_char) -> *mut Self {
        Box::into_raw(Box::new(FfiResult {
            error_code,
            error_message: message.map_or(std::ptr::null_mut(), c_string),
            http_status,
            data,
        }))
    }

    pub(crate) fn ok_json(value: &serde_json::Value) -> *mut Self {
        Self::boxed(FfiErrorCode::Ok, None, 0, c_string(value.to_string()))
    }

    pub(crate) fn from_error(err: ApiError) -> *mut Self {
        let (code, status) = match &err {
            ApiError::NotFound(_) => (FfiErrorCode::NotFound, 0),
            ApiError::Api { status, .. } => (FfiErrorCode::Api, *status),
            ApiError::MissingParameter { .. } => (FfiErrorCode::MissingParameter, 0),
            ApiError::UnexpectedStatus { status, .. } => (FfiErrorCode::UnexpectedStatus, *status),
            ApiError::Transport(_) => (FfiErrorCode::Transport, 0),
            ApiError::Decode(_) => (FfiErrorCode::Decode, 0),
            ApiError::Serialization(_) => (FfiErrorCode::Serialization, 0),
            ApiError::InvalidUrl(_) => (FfiErrorCode::InvalidUrl, 0),
        };
        Self::boxed(code, Some(err.to_string()), status, std::ptr::null_mut())
    }

    pub(crate) fn invalid_arg(message: String) -> *mut Self {
        Self::boxed(FfiErrorCode::InvalidArg, Some(message), 0, std::ptr::null_mut())
    }

    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Self::boxed(
            FfiErrorCode::NullArg,
            Some(format!("null argument: {name}")),
            0,
            std::ptr::null_mut(),
        )
    }

    pub(crate) fn panic(msg: &str) -> *mut Self {
        Self::boxed(FfiErrorCode::Panic, Some(msg.to_string()), 0, std::ptr::null_mut())
    }
}
