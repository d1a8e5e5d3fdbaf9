/*
 * lib.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Gemmule, a Gemini protocol client and server.
 *
 * Gemmule is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Gemmule is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Gemmule.  If not, see <http://www.gnu.org/licenses/>.
 */

//! C FFI for gemmule core. Fetches run on one shared tokio runtime.
//! All string parameters are UTF-8 NUL-terminated. Returned strings and responses are
//! owned by the caller and freed with gemmule_free_string / gemmule_free_response.

use libc::{c_char, c_int, c_void, size_t};
use std::ffi::{CStr, CString};
use std::ptr;
use std::time::Duration;

use gemmule_core::protocol::gemini::{fetch, FetchOptions, GeminiError};
use gemmule_core::uri::encode_input;
use tokio::io::AsyncReadExt;

/// Fetch options as seen from C. Zero/NULL fields keep the defaults
/// (follow up to 5 redirects, not safe, 30 s timeout, system trust roots).
#[repr(C)]
pub struct GemmuleFetchOptions {
    /// Nonzero: return 3x responses instead of following them.
    pub no_follow: c_int,
    /// Nonzero: return non-2x/3x responses instead of failing.
    pub safe: c_int,
    /// Redirect hop limit; negative keeps the default.
    pub max_redirects: c_int,
    /// Status line timeout in milliseconds; 0 keeps the default.
    pub timeout_ms: u64,
    /// Connect here instead of the URL's host. May be NULL.
    pub hostname: *const c_char,
    /// Connect to this port instead of the URL's; 0 keeps the URL's.
    pub port: u16,
    /// Replaces the query component (already percent-encoded). May be NULL.
    pub input: *const c_char,
    /// PEM CA certificates to trust instead of the system roots. May be NULL.
    pub ca_cert_pem: *const c_char,
}

/// Completed response: status, meta (NULL if absent) and the whole body.
#[repr(C)]
pub struct GemmuleResponse {
    pub status: c_int,
    pub meta: *mut c_char,
    pub body: *mut u8,
    pub body_len: size_t,
}

/// Status line received: (status, meta or NULL, user_data).
type OnStatus = extern "C" fn(c_int, *const c_char, *mut c_void);
/// Body chunk: (data, len, user_data). Data is valid only during the call.
type OnBody = extern "C" fn(*const u8, size_t, *mut c_void);
/// Fetch finished: 0 on success, -1 on error (gemmule_last_error is set on the calling thread).
type OnComplete = extern "C" fn(c_int, *mut c_void);

const BODY_CHUNK: usize = 8192;

struct Registry {
    runtime: tokio::runtime::Runtime,
}

fn registry() -> &'static Registry {
    static REGISTRY: once_cell::sync::OnceCell<Registry> = once_cell::sync::OnceCell::new();
    REGISTRY.get_or_init(|| {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("failed to create tokio runtime");
        Registry { runtime }
    })
}

thread_local! {
    static LAST_ERROR: std::cell::RefCell<Option<CString>> = const { std::cell::RefCell::new(None) };
}

fn set_last_error(message: &str) {
    let msg = CString::new(message.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|e| *e.borrow_mut() = Some(msg));
}

fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

fn ptr_to_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string()) }
}

fn to_c_string(s: &str) -> *mut c_char {
    CString::new(s.replace('\0', " ")).unwrap_or_default().into_raw()
}

/// Convert C options; NULL means all defaults.
unsafe fn fetch_options(options: *const GemmuleFetchOptions) -> Result<FetchOptions, String> {
    let mut out = FetchOptions::default();
    let Some(o) = options.as_ref() else {
        return Ok(out);
    };
    out.follow_redirects = o.no_follow == 0;
    out.safe = o.safe != 0;
    if o.max_redirects >= 0 {
        out.max_redirects = o.max_redirects as usize;
    }
    if o.timeout_ms > 0 {
        out.timeout = Duration::from_millis(o.timeout_ms);
    }
    if !o.hostname.is_null() {
        out.hostname = Some(ptr_to_str(o.hostname).ok_or("hostname is not valid UTF-8")?);
    }
    if o.port != 0 {
        out.port = Some(o.port);
    }
    if !o.input.is_null() {
        out.input = Some(ptr_to_str(o.input).ok_or("input is not valid UTF-8")?);
    }
    if !o.ca_cert_pem.is_null() {
        out.ca_certs
            .push(ptr_to_str(o.ca_cert_pem).ok_or("ca_cert_pem is not valid UTF-8")?);
    }
    Ok(out)
}

async fn fetch_all(url: String, options: FetchOptions) -> Result<GemmuleResponse, GeminiError> {
    let mut response = fetch(url, &options).await?;
    let body = response.bytes().await?.to_vec().into_boxed_slice();
    let body_len = body.len();
    Ok(GemmuleResponse {
        status: c_int::from(response.status().code()),
        meta: response.meta().map(to_c_string).unwrap_or(ptr::null_mut()),
        body: if body_len == 0 {
            ptr::null_mut()
        } else {
            Box::into_raw(body) as *mut u8
        },
        body_len,
    })
}

/// Version string (static, do not free).
#[no_mangle]
pub extern "C" fn gemmule_version() -> *const c_char {
    b"0.1.0\0".as_ptr() as *const c_char
}

/// Last error message from a failed call on this thread. Valid until the next FFI call. Do not free.
#[no_mangle]
pub extern "C" fn gemmule_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|s| s.as_ptr())
            .unwrap_or(ptr::null())
    })
}

/// Free a string returned by gemmule_encode_input. No-op if ptr is NULL.
#[no_mangle]
pub unsafe extern "C" fn gemmule_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        let _ = CString::from_raw(ptr);
    }
}

/// Percent-encode prompt input for GemmuleFetchOptions.input. Caller frees with gemmule_free_string.
#[no_mangle]
pub unsafe extern "C" fn gemmule_encode_input(text: *const c_char) -> *mut c_char {
    match ptr_to_str(text) {
        Some(t) => {
            clear_last_error();
            to_c_string(&encode_input(&t))
        }
        None => {
            set_last_error("text is null or not valid UTF-8");
            ptr::null_mut()
        }
    }
}

/// Fetch `url` and wait for the whole body. Returns NULL on error (see gemmule_last_error).
/// Blocks the calling thread; do not call from inside a gemmule callback.
#[no_mangle]
pub unsafe extern "C" fn gemmule_fetch_sync(
    url: *const c_char,
    options: *const GemmuleFetchOptions,
) -> *mut GemmuleResponse {
    let Some(url) = ptr_to_str(url) else {
        set_last_error("url is null or not valid UTF-8");
        return ptr::null_mut();
    };
    let options = match fetch_options(options) {
        Ok(o) => o,
        Err(e) => {
            set_last_error(&e);
            return ptr::null_mut();
        }
    };
    match registry().runtime.block_on(fetch_all(url, options)) {
        Ok(response) => {
            clear_last_error();
            Box::into_raw(Box::new(response))
        }
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a response from gemmule_fetch_sync. No-op if ptr is NULL.
#[no_mangle]
pub unsafe extern "C" fn gemmule_free_response(ptr: *mut GemmuleResponse) {
    if ptr.is_null() {
        return;
    }
    let response = Box::from_raw(ptr);
    if !response.meta.is_null() {
        let _ = CString::from_raw(response.meta);
    }
    if !response.body.is_null() {
        let body = ptr::slice_from_raw_parts_mut(response.body, response.body_len);
        let _ = Box::from_raw(body);
    }
}

/// Fetch `url` in the background. Calls on_status once, on_body per chunk, then on_complete.
/// Callbacks run on a runtime worker thread; the UI must marshal to its own thread.
/// Returns 0 if the fetch was started, -1 on bad arguments (on_complete is not called).
#[no_mangle]
pub unsafe extern "C" fn gemmule_fetch(
    url: *const c_char,
    options: *const GemmuleFetchOptions,
    on_status: Option<OnStatus>,
    on_body: Option<OnBody>,
    on_complete: OnComplete,
    user_data: *mut c_void,
) -> c_int {
    let Some(url) = ptr_to_str(url) else {
        set_last_error("url is null or not valid UTF-8");
        return -1;
    };
    let options = match fetch_options(options) {
        Ok(o) => o,
        Err(e) => {
            set_last_error(&e);
            return -1;
        }
    };
    clear_last_error();
    // raw pointers are not Send
    let user = user_data as usize;
    registry().runtime.spawn(async move {
        let result: Result<(), GeminiError> = async {
            let response = fetch(url, &options).await?;
            if let Some(cb) = on_status {
                let meta = response.meta().map(|m| CString::new(m.replace('\0', " ")).unwrap_or_default());
                cb(
                    c_int::from(response.status().code()),
                    meta.as_ref().map(|m| m.as_ptr()).unwrap_or(ptr::null()),
                    user as *mut c_void,
                );
            }
            let mut body = response.into_body();
            let mut buf = vec![0u8; BODY_CHUNK];
            loop {
                let n = body.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                if let Some(cb) = on_body {
                    cb(buf.as_ptr(), n, user as *mut c_void);
                }
            }
            Ok(())
        }
        .await;
        match result {
            Ok(()) => {
                clear_last_error();
                on_complete(0, user as *mut c_void);
            }
            Err(e) => {
                set_last_error(&e.to_string());
                on_complete(-1, user as *mut c_void);
            }
        }
    });
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::sync::Arc;

    use gemmule_core::net::ServerIdentity;
    use gemmule_core::protocol::gemini::{Handler, HandlerFuture, Request, Server, ServerResponse, StatusCode};

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../core/tests/fixtures")
            .join(name)
    }

    struct Hello;

    impl Handler for Hello {
        fn handle<'a>(&'a self, request: &'a Request, response: &'a mut ServerResponse) -> HandlerFuture<'a> {
            Box::pin(async move {
                if request.url().path() == "/gone" {
                    response.set_status(StatusCode::GONE, None)?;
                    return Ok(());
                }
                response.send_text("hello").await
            })
        }
    }

    /// Serve `Hello` on the shared runtime; returns the port.
    fn start_server() -> u16 {
        let identity = ServerIdentity::from_files(&fixture("localhost.pem"), &fixture("localhost.key")).unwrap();
        let server = registry()
            .runtime
            .block_on(Server::bind("127.0.0.1:0", &identity))
            .unwrap();
        let port = server.local_addr().unwrap().port();
        registry()
            .runtime
            .spawn(server.serve(Arc::new(Hello), std::future::pending::<()>()));
        port
    }

    fn options_with_ca(ca: &CString) -> GemmuleFetchOptions {
        GemmuleFetchOptions {
            no_follow: 0,
            safe: 0,
            max_redirects: -1,
            timeout_ms: 0,
            hostname: ptr::null(),
            port: 0,
            input: ptr::null(),
            ca_cert_pem: ca.as_ptr(),
        }
    }

    #[test]
    fn fetch_sync_returns_body() {
        let port = start_server();
        let ca = CString::new(std::fs::read_to_string(fixture("ca.pem")).unwrap()).unwrap();
        let options = options_with_ca(&ca);
        let url = CString::new(format!("gemini://localhost:{}/", port)).unwrap();
        unsafe {
            let response = gemmule_fetch_sync(url.as_ptr(), &options);
            assert!(!response.is_null());
            assert_eq!((*response).status, 20);
            assert_eq!(CStr::from_ptr((*response).meta).to_str().unwrap(), "text/gemini");
            let body = std::slice::from_raw_parts((*response).body, (*response).body_len);
            assert_eq!(body, b"hello");
            gemmule_free_response(response);

            let gone = CString::new(format!("gemini://localhost:{}/gone", port)).unwrap();
            assert!(gemmule_fetch_sync(gone.as_ptr(), &options).is_null());
            let err = CStr::from_ptr(gemmule_last_error()).to_str().unwrap();
            assert!(err.contains("52"), "{}", err);
        }
    }

    extern "C" fn record_status(status: c_int, _meta: *const c_char, user_data: *mut c_void) {
        let tx = unsafe { &*(user_data as *const mpsc::Sender<String>) };
        let _ = tx.send(format!("status {}", status));
    }

    extern "C" fn record_body(data: *const u8, len: size_t, user_data: *mut c_void) {
        let tx = unsafe { &*(user_data as *const mpsc::Sender<String>) };
        let chunk = unsafe { std::slice::from_raw_parts(data, len) };
        let _ = tx.send(format!("body {}", String::from_utf8_lossy(chunk)));
    }

    extern "C" fn record_complete(code: c_int, user_data: *mut c_void) {
        let tx = unsafe { &*(user_data as *const mpsc::Sender<String>) };
        let _ = tx.send(format!("complete {}", code));
    }

    #[test]
    fn fetch_reports_through_callbacks() {
        let port = start_server();
        let ca = CString::new(std::fs::read_to_string(fixture("ca.pem")).unwrap()).unwrap();
        let options = options_with_ca(&ca);
        let url = CString::new(format!("gemini://localhost:{}/", port)).unwrap();
        let (tx, rx) = mpsc::channel::<String>();
        let started = unsafe {
            gemmule_fetch(
                url.as_ptr(),
                &options,
                Some(record_status),
                Some(record_body),
                record_complete,
                &tx as *const mpsc::Sender<String> as *mut c_void,
            )
        };
        assert_eq!(started, 0);
        let events: Vec<String> = rx.iter().take_while(|e| !e.starts_with("complete")).collect();
        assert_eq!(events, vec!["status 20".to_string(), "body hello".to_string()]);
    }

    #[test]
    fn bad_arguments_set_last_error() {
        unsafe {
            assert!(gemmule_fetch_sync(ptr::null(), ptr::null()).is_null());
            let err = CStr::from_ptr(gemmule_last_error()).to_str().unwrap();
            assert_eq!(err, "url is null or not valid UTF-8");

            let url = CString::new("not a url").unwrap();
            assert!(gemmule_fetch_sync(url.as_ptr(), ptr::null()).is_null());
            let err = CStr::from_ptr(gemmule_last_error()).to_str().unwrap();
            assert!(err.starts_with("malformed URL"), "{}", err);
        }
    }

    #[test]
    fn encode_input_allocates() {
        let text = CString::new("two words").unwrap();
        unsafe {
            let encoded = gemmule_encode_input(text.as_ptr());
            assert_eq!(CStr::from_ptr(encoded).to_str().unwrap(), "two%20words");
            gemmule_free_string(encoded);
        }
    }
}
