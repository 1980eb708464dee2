//! C-ABI wrapper around `habit-core`.
//!
//! # Overview
//! Lets any language with a C FFI walk the documented endpoint tree, build
//! requests for a position and interpret the responses, without linking to
//! an HTTP stack of its own. `habit_invoke` is there for hosts happy to let
//! the library do the round-trip itself.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Handles are opaque: `FfiApiTree` for the parsed documentation,
//!   `FfiApiProxy` for one position in it.
//! - `FfiResult` carries either an error code and message or the payload
//!   as a JSON string.
//! - The C caller owns all returned pointers and must call the matching
//!   `habit_*_free` function to release them.

pub mod types;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use habit_core::{
    parse_task_ids, ApiProxy, ClientConfig, Connection, EndpointNode, HttpResponse, BUNDLED_APIDOC,
};
use serde_json::Value;

use types::*;

/// Borrow a C string as UTF-8. `None` for null or invalid UTF-8.
fn str_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

// ---------------------------------------------------------------------------
// Endpoint tree
// ---------------------------------------------------------------------------

/// Parse apiDoc text into an endpoint tree.
///
/// Returns null if `apidoc` is null, not UTF-8 or has no usable endpoints.
/// Free with `habit_tree_free`.
#[unsafe(no_mangle)]
pub extern "C" fn habit_tree_new(apidoc: *const c_char) -> *mut FfiApiTree {
    catch_unwind(|| {
        let Some(text) = str_arg(apidoc) else {
            return std::ptr::null_mut();
        };
        match EndpointNode::from_apidoc(text) {
            Ok((tree, _skipped)) => Box::into_raw(Box::new(FfiApiTree { inner: Arc::new(tree) })),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Tree built from the documentation bundled with the library.
#[unsafe(no_mangle)]
pub extern "C" fn habit_tree_bundled() -> *mut FfiApiTree {
    catch_unwind(|| match EndpointNode::from_apidoc(BUNDLED_APIDOC) {
        Ok((tree, _)) => Box::into_raw(Box::new(FfiApiTree { inner: Arc::new(tree) })),
        Err(_) => std::ptr::null_mut(),
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a tree. Proxies created from it stay valid. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn habit_tree_free(tree: *mut FfiApiTree) {
    if !tree.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(tree) });
        });
    }
}

// ---------------------------------------------------------------------------
// Proxy navigation
// ---------------------------------------------------------------------------

/// Create a proxy at `/api/v3` for the service at `base_url`.
///
/// `user` and `key` may both be null for unauthenticated use. Returns null
/// if `tree` or `base_url` is null, or the tree has no `/api/v3` prefix.
#[unsafe(no_mangle)]
pub extern "C" fn habit_proxy_new(
    tree: *const FfiApiTree,
    base_url: *const c_char,
    user: *const c_char,
    key: *const c_char,
) -> *mut FfiApiProxy {
    catch_unwind(|| {
        if tree.is_null() {
            return std::ptr::null_mut();
        }
        let Some(url) = str_arg(base_url) else {
            return std::ptr::null_mut();
        };
        let tree = unsafe { &*tree };
        let mut config = ClientConfig::new(url);
        if let (Some(user), Some(key)) = (str_arg(user), str_arg(key)) {
            config = config.with_credentials(user, key);
        }
        let connection = Arc::new(Connection::blocking(config));
        match ApiProxy::new(Arc::clone(&tree.inner), connection) {
            Ok(proxy) => Box::into_raw(Box::new(FfiApiProxy { inner: proxy })),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a proxy. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn habit_proxy_free(proxy: *mut FfiApiProxy) {
    if !proxy.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(proxy) });
        }));
    }
}

/// New proxy one segment below `proxy`. The original is left untouched.
///
/// Returns null if either argument is null or the segment does not exist.
#[unsafe(no_mangle)]
pub extern "C" fn habit_proxy_descend(proxy: *const FfiApiProxy, segment: *const c_char) -> *mut FfiApiProxy {
    catch_unwind(AssertUnwindSafe(|| {
        if proxy.is_null() {
            return std::ptr::null_mut();
        }
        let Some(segment) = str_arg(segment) else {
            return std::ptr::null_mut();
        };
        let proxy = unsafe { &*proxy };
        match proxy.inner.descend(segment) {
            Ok(child) => Box::into_raw(Box::new(FfiApiProxy { inner: child })),
            Err(_) => std::ptr::null_mut(),
        }
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Copy of `proxy` that also sends `name=value` on every call.
#[unsafe(no_mangle)]
pub extern "C" fn habit_proxy_with_query(
    proxy: *const FfiApiProxy,
    name: *const c_char,
    value: *const c_char,
) -> *mut FfiApiProxy {
    catch_unwind(AssertUnwindSafe(|| {
        if proxy.is_null() {
            return std::ptr::null_mut();
        }
        let (Some(name), Some(value)) = (str_arg(name), str_arg(value)) else {
            return std::ptr::null_mut();
        };
        let proxy = unsafe { &*proxy };
        let inner = proxy.inner.clone().with_query(name, value);
        Box::into_raw(Box::new(FfiApiProxy { inner }))
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Literal path of the proxy position. Free with `habit_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn habit_proxy_path(proxy: *const FfiApiProxy) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        if proxy.is_null() {
            return std::ptr::null_mut();
        }
        c_string(unsafe { &*proxy }.inner.path())
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Child segments of the position as a JSON array of strings.
/// Free with `habit_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn habit_proxy_keys(proxy: *const FfiApiProxy) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        if proxy.is_null() {
            return std::ptr::null_mut();
        }
        match unsafe { &*proxy }.inner.keys() {
            Ok(keys) => c_string(Value::from(keys).to_string()),
            Err(_) => std::ptr::null_mut(),
        }
    }))
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Build / parse
// ---------------------------------------------------------------------------

fn body_arg(body_json: *const c_char) -> Result<Option<Value>, String> {
    if body_json.is_null() {
        return Ok(None);
    }
    let text = str_arg(body_json).ok_or_else(|| "body is not UTF-8".to_string())?;
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| format!("body is not JSON: {e}"))
}

/// Build the request for `method` at the proxy position.
///
/// `body_json` may be null. Returns null if `proxy` is null, the body is
/// not JSON, or the method is not documented at this position.
/// Free with `habit_free_request`.
#[unsafe(no_mangle)]
pub extern "C" fn habit_build_request(
    proxy: *const FfiApiProxy,
    method: FfiHttpMethod,
    body_json: *const c_char,
) -> *mut FfiHttpRequest {
    catch_unwind(AssertUnwindSafe(|| {
        if proxy.is_null() {
            return std::ptr::null_mut();
        }
        let Ok(body) = body_arg(body_json) else {
            return std::ptr::null_mut();
        };
        let proxy = unsafe { &*proxy };
        match proxy.inner.build_request(method.into(), &[], body.as_ref()) {
            Ok(req) => FfiHttpRequest::from_core(req),
            Err(_) => std::ptr::null_mut(),
        }
    }))
    .unwrap_or(std::ptr::null_mut())
}

fn ffi_response_to_core(resp: &FfiHttpResponse) -> HttpResponse {
    HttpResponse {
        status: resp.status,
        headers: Vec::new(),
        body: str_arg(resp.body).unwrap_or_default().to_string(),
    }
}

/// Interpret the host's response to a request built for `method` at the
/// proxy position. Free with `habit_free_result`.
#[unsafe(no_mangle)]
pub extern "C" fn habit_parse_response(
    proxy: *const FfiApiProxy,
    method: FfiHttpMethod,
    response: *const FfiHttpResponse,
) -> *mut FfiResult {
    catch_unwind(AssertUnwindSafe(|| {
        if proxy.is_null() {
            return FfiResult::null_arg("proxy");
        }
        if response.is_null() {
            return FfiResult::null_arg("response");
        }
        let proxy = unsafe { &*proxy };
        let resp = ffi_response_to_core(unsafe { &*response });
        match proxy.inner.parse_response(method.into(), resp) {
            Ok(value) => FfiResult::ok_json(&value),
            Err(e) => FfiResult::from_error(e),
        }
    }))
    .unwrap_or_else(|_| FfiResult::panic("panic in habit_parse_response"))
}

/// Build, send and parse in one blocking call.
#[unsafe(no_mangle)]
pub extern "C" fn habit_invoke(
    proxy: *const FfiApiProxy,
    method: FfiHttpMethod,
    body_json: *const c_char,
) -> *mut FfiResult {
    catch_unwind(AssertUnwindSafe(|| {
        if proxy.is_null() {
            return FfiResult::null_arg("proxy");
        }
        let body = match body_arg(body_json) {
            Ok(body) => body,
            Err(msg) => return FfiResult::invalid_arg(msg),
        };
        let proxy = unsafe { &*proxy };
        match proxy.inner.invoke(method.into(), &[], body.as_ref()) {
            Ok(value) => FfiResult::ok_json(&value),
            Err(e) => FfiResult::from_error(e),
        }
    }))
    .unwrap_or_else(|_| FfiResult::panic("panic in habit_invoke"))
}

/// Expand a task-id expression such as `1,3-5` into a JSON array.
#[unsafe(no_mangle)]
pub extern "C" fn habit_parse_task_ids(input: *const c_char) -> *mut FfiResult {
    catch_unwind(|| {
        let Some(input) = str_arg(input) else {
            return FfiResult::null_arg("input");
        };
        match parse_task_ids(input) {
            Ok(ids) => FfiResult::ok_json(&Value::from(ids)),
            Err(e) => FfiResult::invalid_arg(e.to_string()),
        }
    })
    .unwrap_or_else(|_| FfiResult::panic("panic in habit_parse_task_ids"))
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free a request from `habit_build_request`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn habit_free_request(req: *mut FfiHttpRequest) {
    if req.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let req = unsafe { Box::from_raw(req) };
        if !req.url.is_null() {
            drop(unsafe { CString::from_raw(req.url) });
        }
        if !req.body.is_null() {
            drop(unsafe { CString::from_raw(req.body) });
        }
        if !req.headers.is_null() && req.headers_len > 0 {
            let slice = std::ptr::slice_from_raw_parts_mut(req.headers, req.headers_len as usize);
            let headers = unsafe { Box::from_raw(slice) };
            for h in headers.iter() {
                if !h.key.is_null() {
                    drop(unsafe { CString::from_raw(h.key) });
                }
                if !h.value.is_null() {
                    drop(unsafe { CString::from_raw(h.value) });
                }
            }
        }
    });
}

/// Free a result from `habit_parse_response` or `habit_invoke`.
/// Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn habit_free_result(result: *mut FfiResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let result = unsafe { Box::from_raw(result) };
        if !result.error_message.is_null() {
            drop(unsafe { CString::from_raw(result.error_message) });
        }
        if !result.data.is_null() {
            drop(unsafe { CString::from_raw(result.data) });
        }
    });
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn habit_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { CString::from_raw(s) });
        });
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    const DOC: &str = "\
@api {get} /api/v3/tasks/user Get tasks
@apiParam (Query) {String} [type] Filter
@api {post} /api/v3/tasks/user Create a task
@apiSuccess (201) {Object} data The task
@api {get} /api/v3/tasks/:taskId Get a task
@api {post} /api/v3/tasks/:taskId/score/:direction Score a task
";

    fn setup() -> (*mut FfiApiTree, *mut FfiApiProxy) {
        let doc = CString::new(DOC).unwrap();
        let tree = habit_tree_new(doc.as_ptr());
        assert!(!tree.is_null());
        let url = CString::new("http://localhost:3000").unwrap();
        let user = CString::new("user-1").unwrap();
        let key = CString::new("key-1").unwrap();
        let proxy = habit_proxy_new(tree, url.as_ptr(), user.as_ptr(), key.as_ptr());
        assert!(!proxy.is_null());
        (tree, proxy)
    }

    fn descend(proxy: *const FfiApiProxy, segments: &[&str]) -> *mut FfiApiProxy {
        let mut current = habit_proxy_descend(proxy, CString::new(segments[0]).unwrap().as_ptr());
        for seg in &segments[1..] {
            let next = habit_proxy_descend(current, CString::new(*seg).unwrap().as_ptr());
            habit_proxy_free(current);
            current = next;
        }
        current
    }

    fn take_string(s: *mut c_char) -> String {
        assert!(!s.is_null());
        let out = unsafe { CStr::from_ptr(s) }.to_str().unwrap().to_string();
        habit_free_string(s);
        out
    }

    #[test]
    fn tree_new_null_or_empty_returns_null() {
        assert!(habit_tree_new(std::ptr::null()).is_null());
        let empty = CString::new("no endpoints here").unwrap();
        assert!(habit_tree_new(empty.as_ptr()).is_null());
    }

    #[test]
    fn bundled_tree_supports_a_proxy() {
        let tree = habit_tree_bundled();
        assert!(!tree.is_null());
        let url = CString::new("https://habitica.com").unwrap();
        let proxy = habit_proxy_new(tree, url.as_ptr(), std::ptr::null(), std::ptr::null());
        assert!(!proxy.is_null());
        habit_proxy_free(proxy);
        habit_tree_free(tree);
    }

    #[test]
    fn free_null_handles_is_safe() {
        habit_tree_free(std::ptr::null_mut());
        habit_proxy_free(std::ptr::null_mut());
        habit_free_request(std::ptr::null_mut());
        habit_free_result(std::ptr::null_mut());
        habit_free_string(std::ptr::null_mut());
    }

    #[test]
    fn descend_substitutes_parameter_segments() {
        let (tree, proxy) = setup();
        let scored = descend(proxy, &["tasks", "abc-123", "score", "up"]);
        assert!(!scored.is_null());
        assert_eq!(take_string(habit_proxy_path(scored)), "/api/v3/tasks/abc-123/score/up");

        let req = habit_build_request(scored, FfiHttpMethod::Post, std::ptr::null());
        assert!(!req.is_null());
        let r = unsafe { &*req };
        assert_eq!(r.method, FfiHttpMethod::Post);
        let url = unsafe { CStr::from_ptr(r.url) }.to_str().unwrap();
        assert_eq!(url, "http://localhost:3000/api/v3/tasks/abc-123/score/up");
        let body = unsafe { CStr::from_ptr(r.body) }.to_str().unwrap();
        assert_eq!(body, "{}");
        assert_eq!(r.headers_len, 3);
        let headers = unsafe { std::slice::from_raw_parts(r.headers, r.headers_len as usize) };
        let first = unsafe { CStr::from_ptr(headers[0].key) }.to_str().unwrap();
        assert_eq!(first, "x-api-user");

        habit_free_request(req);
        habit_proxy_free(scored);
        habit_proxy_free(proxy);
        habit_tree_free(tree);
    }

    #[test]
    fn descend_unknown_segment_returns_null() {
        let (tree, proxy) = setup();
        let missing = descend(proxy, &["groups"]);
        assert!(missing.is_null());
        habit_proxy_free(proxy);
        habit_tree_free(tree);
    }

    #[test]
    fn keys_are_json() {
        let (tree, proxy) = setup();
        let tasks = descend(proxy, &["tasks"]);
        assert_eq!(take_string(habit_proxy_keys(tasks)), r#"[":taskId","user"]"#);
        habit_proxy_free(tasks);
        habit_proxy_free(proxy);
        habit_tree_free(tree);
    }

    #[test]
    fn build_request_carries_query_and_body() {
        let (tree, proxy) = setup();
        let user = descend(proxy, &["tasks", "user"]);
        let name = CString::new("type").unwrap();
        let value = CString::new("todos").unwrap();
        let filtered = habit_proxy_with_query(user, name.as_ptr(), value.as_ptr());

        let req = habit_build_request(filtered, FfiHttpMethod::Get, std::ptr::null());
        let r = unsafe { &*req };
        let url = unsafe { CStr::from_ptr(r.url) }.to_str().unwrap();
        assert_eq!(url, "http://localhost:3000/api/v3/tasks/user?type=todos");
        assert!(r.body.is_null());
        habit_free_request(req);

        let body = CString::new(r#"{"text":"Milk","type":"todo"}"#).unwrap();
        let req = habit_build_request(user, FfiHttpMethod::Post, body.as_ptr());
        let r = unsafe { &*req };
        let sent: Value = serde_json::from_str(unsafe { CStr::from_ptr(r.body) }.to_str().unwrap()).unwrap();
        assert_eq!(sent["text"], "Milk");
        habit_free_request(req);

        let bad = CString::new("{not json").unwrap();
        assert!(habit_build_request(user, FfiHttpMethod::Post, bad.as_ptr()).is_null());
        assert!(habit_build_request(user, FfiHttpMethod::Delete, std::ptr::null()).is_null());

        habit_proxy_free(filtered);
        habit_proxy_free(user);
        habit_proxy_free(proxy);
        habit_tree_free(tree);
    }

    #[test]
    fn parse_response_unwraps_data() {
        let (tree, proxy) = setup();
        let user = descend(proxy, &["tasks", "user"]);
        let body = CString::new(r#"{"success":true,"data":{"text":"Milk"}}"#).unwrap();
        let resp = FfiHttpResponse {
            status: 201,
            body: body.as_ptr(),
        };
        let result = habit_parse_response(user, FfiHttpMethod::Post, &resp);
        let r = unsafe { &*result };
        assert_eq!(r.error_code, FfiErrorCode::Ok);
        assert!(r.error_message.is_null());
        let data = unsafe { CStr::from_ptr(r.data) }.to_str().unwrap();
        assert_eq!(data, r#"{"text":"Milk"}"#);

        habit_free_result(result);
        habit_proxy_free(user);
        habit_proxy_free(proxy);
        habit_tree_free(tree);
    }

    #[test]
    fn parse_response_reports_server_errors() {
        let (tree, proxy) = setup();
        let task = descend(proxy, &["tasks", "missing"]);
        let body = CString::new(r#"{"success":false,"error":"NotFound","message":"Task not found."}"#).unwrap();
        let resp = FfiHttpResponse {
            status: 404,
            body: body.as_ptr(),
        };
        let result = habit_parse_response(task, FfiHttpMethod::Get, &resp);
        let r = unsafe { &*result };
        assert_eq!(r.error_code, FfiErrorCode::Api);
        assert_eq!(r.http_status, 404);
        assert!(r.data.is_null());
        let msg = unsafe { CStr::from_ptr(r.error_message) }.to_str().unwrap();
        assert!(msg.contains("Task not found."), "{msg}");

        habit_free_result(result);
        habit_proxy_free(task);
        habit_proxy_free(proxy);
        habit_tree_free(tree);
    }

    #[test]
    fn parse_response_undocumented_method_is_not_found() {
        let (tree, proxy) = setup();
        let task = descend(proxy, &["tasks", "abc"]);
        let resp = FfiHttpResponse {
            status: 200,
            body: std::ptr::null(),
        };
        let result = habit_parse_response(task, FfiHttpMethod::Put, &resp);
        assert_eq!(unsafe { &*result }.error_code, FfiErrorCode::NotFound);
        habit_free_result(result);
        habit_proxy_free(task);
        habit_proxy_free(proxy);
        habit_tree_free(tree);
    }

    #[test]
    fn parse_null_args_return_null_arg() {
        let (tree, proxy) = setup();
        let resp = FfiHttpResponse {
            status: 200,
            body: std::ptr::null(),
        };
        let result = habit_parse_response(std::ptr::null(), FfiHttpMethod::Get, &resp);
        assert_eq!(unsafe { &*result }.error_code, FfiErrorCode::NullArg);
        habit_free_result(result);

        let result = habit_parse_response(proxy, FfiHttpMethod::Get, std::ptr::null());
        assert_eq!(unsafe { &*result }.error_code, FfiErrorCode::NullArg);
        habit_free_result(result);

        habit_proxy_free(proxy);
        habit_tree_free(tree);
    }

    #[test]
    fn task_ids_expand_or_fail() {
        let input = CString::new("1,3-5").unwrap();
        let result = habit_parse_task_ids(input.as_ptr());
        let r = unsafe { &*result };
        assert_eq!(r.error_code, FfiErrorCode::Ok);
        assert_eq!(unsafe { CStr::from_ptr(r.data) }.to_str().unwrap(), "[1,3,4,5]");
        habit_free_result(result);

        for bad in ["5-3", "1-4000000000"] {
            let input = CString::new(bad).unwrap();
            let result = habit_parse_task_ids(input.as_ptr());
            assert_eq!(unsafe { &*result }.error_code, FfiErrorCode::InvalidArg, "{bad}");
            habit_free_result(result);
        }
    }

    #[test]
    fn invoke_round_trips_through_mock_server() {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
                mock_server::run(listener).await
            })
            .unwrap();
        });

        let doc = CString::new(mock_server::APIDOC).unwrap();
        let tree = habit_tree_new(doc.as_ptr());
        let url = CString::new(format!("http://{addr}")).unwrap();
        let user = CString::new(mock_server::TEST_USER).unwrap();
        let key = CString::new(mock_server::TEST_KEY).unwrap();
        let proxy = habit_proxy_new(tree, url.as_ptr(), user.as_ptr(), key.as_ptr());

        let shoes = descend(proxy, &["tasks", "shoes"]);
        let result = habit_invoke(shoes, FfiHttpMethod::Get, std::ptr::null());
        let r = unsafe { &*result };
        assert_eq!(r.error_code, FfiErrorCode::Ok);
        let task: Value = serde_json::from_str(unsafe { CStr::from_ptr(r.data) }.to_str().unwrap()).unwrap();
        assert_eq!(task["text"], "Buy running shoes");

        habit_free_result(result);
        habit_proxy_free(shoes);
        habit_proxy_free(proxy);
        habit_tree_free(tree);
    }
}
