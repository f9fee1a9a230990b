//! Request dispatch module
//!
//! Entry point for HTTP request processing: method validation, dispatch to
//! the static file responder, no-cache header injection and access logging.

use crate::config::AppState;
use crate::handler::static_files;
use crate::http;
use crate::logger::{self, AccessLogEntry};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_LENGTH, SERVER};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Request context encapsulating information needed for request processing
pub struct RequestContext<'a> {
    /// Raw (still percent-encoded) request path
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub is_head: bool,
    pub if_modified_since: Option<String>,
    pub if_none_match: Option<String>,
}

impl<'a> RequestContext<'a> {
    pub fn from_parts(parts: &'a Parts) -> Self {
        Self {
            path: parts.uri.path(),
            query: parts.uri.query(),
            is_head: parts.method == Method::HEAD,
            if_modified_since: header_string(parts, "if-modified-since"),
            if_none_match: header_string(parts, "if-none-match"),
        }
    }
}

fn header_string(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

/// Main entry point for HTTP request handling
///
/// Every response leaving this function carries the cache-suppression headers,
/// whatever its status.
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();

    // Request bodies are never read; only the head matters
    let (parts, _) = req.into_parts();

    let mut response = respond(&parts, &state).await;
    // Requests hyper cannot parse are answered with a 400 before reaching this
    // function, so that response goes out without the no-cache headers.
    http::apply_no_cache_headers(&mut response);
    if let Ok(server) = HeaderValue::from_str(&state.config.http.server_name) {
        response.headers_mut().insert(SERVER, server);
    }

    if state.config.logging.access_log {
        log_access(&parts, &response, peer_addr, started, &state);
    }

    Ok(response)
}

async fn respond(parts: &Parts, state: &AppState) -> Response<Full<Bytes>> {
    let ctx = RequestContext::from_parts(parts);

    match parts.method {
        Method::GET | Method::HEAD => static_files::serve(&ctx, state).await,
        ref method => {
            logger::log_warning(&format!("Unsupported method: {method}"));
            http::build_501_response(method.as_str(), false)
        }
    }
}

fn log_access(
    parts: &Parts,
    response: &Response<Full<Bytes>>,
    peer_addr: SocketAddr,
    started: Instant,
    state: &AppState,
) {
    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        parts.method.to_string(),
        parts.uri.path().to_string(),
    );
    entry.query = parts.uri.query().map(ToString::to_string);
    entry.http_version = version_label(parts.version).to_string();
    entry.status = response.status().as_u16();
    entry.body_bytes = if parts.method == Method::HEAD {
        None
    } else {
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    };
    entry.referer = header_string(parts, "referer");
    entry.user_agent = header_string(parts, "user-agent");
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

    logger::log_access(&entry, &state.config.logging.access_log_format);
}

fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use http_body_util::{BodyExt, Empty};
    use hyper::header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, LAST_MODIFIED, LOCATION, PRAGMA};
    use hyper::StatusCode;
    use std::path::Path;

    fn state_for(root: &Path) -> Arc<AppState> {
        let config =
            Config::load_with_overrides(vec![("logging.access_log", false.into())]).unwrap();
        Arc::new(AppState::new(config, root.canonicalize().unwrap()))
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    async fn send(
        state: &Arc<AppState>,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
    ) -> (StatusCode, hyper::HeaderMap, Bytes) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let req = builder.body(Empty::<Bytes>::new()).unwrap();
        let response = handle_request(req, Arc::clone(state), peer()).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    fn assert_no_cache(headers: &hyper::HeaderMap) {
        assert_eq!(
            headers[CACHE_CONTROL],
            "no-store, no-cache, must-revalidate, max-age=0"
        );
        assert_eq!(headers[PRAGMA], "no-cache");
        assert_eq!(headers[EXPIRES], "0");
    }

    #[tokio::test]
    async fn test_serves_file_with_no_cache_headers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "hello").unwrap();
        let state = state_for(dir.path());

        let (status, headers, body) = send(&state, Method::GET, "/index.html", &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"hello");
        assert_eq!(headers[CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(headers[CONTENT_LENGTH], "5");
        assert!(headers.contains_key(LAST_MODIFIED));
        assert!(headers[SERVER].to_str().unwrap().starts_with("devserve/"));
        assert_no_cache(&headers);
    }

    #[tokio::test]
    async fn test_missing_file_is_404_with_headers() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path());

        let (status, headers, body) = send(&state, Method::GET, "/nope.css", &[]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(String::from_utf8_lossy(&body).contains("File not found"));
        assert_no_cache(&headers);
    }

    #[tokio::test]
    async fn test_head_has_headers_but_no_body() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log(1);").unwrap();
        let state = state_for(dir.path());

        let (status, headers, body) = send(&state, Method::HEAD, "/app.js", &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert_eq!(headers[CONTENT_LENGTH], "15");
        assert_eq!(headers[CONTENT_TYPE], "text/javascript");
        assert_no_cache(&headers);
    }

    #[tokio::test]
    async fn test_unsupported_method_is_501() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path());

        let (status, headers, body) = send(&state, Method::POST, "/", &[]).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert!(String::from_utf8_lossy(&body).contains("Unsupported method ('POST')"));
        assert_no_cache(&headers);
    }

    #[tokio::test]
    async fn test_directory_without_slash_redirects() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        let state = state_for(dir.path());

        let (status, headers, _) = send(&state, Method::GET, "/docs?tab=2", &[]).await;
        assert_eq!(status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(headers[LOCATION], "/docs/?tab=2");
        assert_no_cache(&headers);
    }

    #[tokio::test]
    async fn test_directory_uses_index_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs").join("index.htm"), "<p>docs</p>").unwrap();
        let state = state_for(dir.path());

        let (status, headers, body) = send(&state, Method::GET, "/docs/", &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"<p>docs</p>");
        assert_no_cache(&headers);
    }

    #[tokio::test]
    async fn test_directory_listing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "n").unwrap();
        std::fs::create_dir(dir.path().join("img")).unwrap();
        let state = state_for(dir.path());

        let (status, headers, body) = send(&state, Method::GET, "/", &[]).await;
        let html = String::from_utf8_lossy(&body);
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Directory listing for /"));
        assert!(html.contains("<a href=\"img/\">img/</a>"));
        assert!(html.contains("<a href=\"notes.txt\">notes.txt</a>"));
        assert_no_cache(&headers);
    }

    #[tokio::test]
    async fn test_trailing_slash_on_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.html"), "x").unwrap();
        let state = state_for(dir.path());

        let (status, headers, _) = send(&state, Method::GET, "/page.html/", &[]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_no_cache(&headers);
    }

    #[tokio::test]
    async fn test_if_modified_since_returns_304() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("style.css"), "body{}").unwrap();
        let state = state_for(dir.path());

        let future = "Fri, 01 Jan 2100 00:00:00 GMT";
        let (status, headers, body) =
            send(&state, Method::GET, "/style.css", &[("If-Modified-Since", future)]).await;
        assert_eq!(status, StatusCode::NOT_MODIFIED);
        assert!(body.is_empty());
        assert_no_cache(&headers);

        // If-None-Match disables the date check
        let (status, _, body) = send(
            &state,
            Method::GET,
            "/style.css",
            &[("If-Modified-Since", future), ("If-None-Match", "\"x\"")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"body{}");
    }

    #[tokio::test]
    async fn test_stale_if_modified_since_serves_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("style.css"), "body{}").unwrap();
        let state = state_for(dir.path());

        let (status, _, body) = send(
            &state,
            Method::GET,
            "/style.css",
            &[("If-Modified-Since", "Thu, 01 Jan 1970 00:00:00 GMT")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"body{}");
    }

    #[tokio::test]
    async fn test_traversal_stays_inside_root() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("site");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(parent.path().join("secret.txt"), "secret").unwrap();
        let state = state_for(&root);

        let (status, headers, _) = send(&state, Method::GET, "/../secret.txt", &[]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_no_cache(&headers);

        let (status, _, _) = send(&state, Method::GET, "/%2e%2e/secret.txt", &[]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unlistable_directory_is_404_with_headers() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        // Privileged users can still read the directory
        let readable = std::fs::read_dir(&locked).is_ok();
        let state = state_for(dir.path());

        let (status, headers, body) = send(&state, Method::GET, "/locked/", &[]).await;
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        if readable {
            return;
        }
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(String::from_utf8_lossy(&body).contains("No permission to list directory"));
        assert_no_cache(&headers);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_serves_file_with_non_utf8_name() {
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let name = std::ffi::OsStr::from_bytes(b"caf\xe9.txt");
        std::fs::write(dir.path().join(name), "latin").unwrap();
        let state = state_for(dir.path());

        let (status, headers, body) = send(&state, Method::GET, "/caf%E9.txt", &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"latin");
        assert_no_cache(&headers);
    }

    #[test]
    fn test_version_label() {
        assert_eq!(version_label(Version::HTTP_10), "1.0");
        assert_eq!(version_label(Version::HTTP_11), "1.1");
    }
}
