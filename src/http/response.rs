//! HTTP response building module
//!
//! Builders for the responses the file server produces. None of them set the
//! cache-suppression headers; those are added once, after routing.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED, LOCATION};
use hyper::{Response, StatusCode};

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
const ERROR_CONTENT_TYPE: &str = "text/html;charset=utf-8";

/// Build a file response; `content_length` is the file size even when the body is omitted for HEAD
pub fn build_file_response(
    body: Bytes,
    content_type: &str,
    content_length: u64,
    last_modified: Option<&str>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, content_length);

    if let Some(last_modified) = last_modified {
        builder = builder.header(LAST_MODIFIED, last_modified);
    }

    builder.body(Full::new(body)).unwrap_or_else(|e| {
        log_build_error("200", &e);
        Response::new(Full::new(Bytes::new()))
    })
}

/// Build generic HTML response
pub fn build_html_response(content: String, is_head: bool) -> Response<Full<Bytes>> {
    let content_length = content.len();
    let body = if is_head {
        Bytes::new()
    } else {
        Bytes::from(content)
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, HTML_CONTENT_TYPE)
        .header(CONTENT_LENGTH, content_length)
        .body(Full::new(body))
        .unwrap_or_else(|e| {
            log_build_error("HTML", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build 301 redirect response (used to add the trailing slash to directory URLs)
pub fn build_redirect_response(location: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(LOCATION, location)
        .header(CONTENT_LENGTH, 0)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|e| {
            log_build_error("301", &e);
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
            response
        })
}

/// Build 304 Not Modified response
pub fn build_304_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NOT_MODIFIED;
    response
}

/// Build an HTML error page
///
/// `message` defaults to the status' reason phrase. The body is omitted for
/// HEAD requests and for statuses that cannot carry one.
pub fn build_error_response(
    status: StatusCode,
    message: Option<&str>,
    is_head: bool,
) -> Response<Full<Bytes>> {
    let reason = status.canonical_reason().unwrap_or("Unknown");
    let message = message.unwrap_or(reason);
    let page = error_page(status, message);
    let content_length = page.len();

    let body_allowed = !is_head
        && !status.is_informational()
        && !matches!(
            status,
            StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT | StatusCode::NOT_MODIFIED
        );
    let body = if body_allowed {
        Bytes::from(page)
    } else {
        Bytes::new()
    };

    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, ERROR_CONTENT_TYPE)
        .header(CONNECTION, "close")
        .header(CONTENT_LENGTH, content_length)
        .body(Full::new(body))
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = status;
            response
        })
}

/// 404 with the given message
pub fn build_404_response(message: &str, is_head: bool) -> Response<Full<Bytes>> {
    build_error_response(StatusCode::NOT_FOUND, Some(message), is_head)
}

/// 501 for any method other than GET and HEAD
pub fn build_501_response(method: &str, is_head: bool) -> Response<Full<Bytes>> {
    build_error_response(
        StatusCode::NOT_IMPLEMENTED,
        Some(&format!("Unsupported method ('{method}')")),
        is_head,
    )
}

fn explain(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "Bad request syntax or unsupported method",
        StatusCode::FORBIDDEN => "Request forbidden -- authorization will not help",
        StatusCode::NOT_FOUND => "Nothing matches the given URI",
        StatusCode::METHOD_NOT_ALLOWED => "Specified method is invalid for this resource",
        StatusCode::INTERNAL_SERVER_ERROR => "Server got itself in trouble",
        StatusCode::NOT_IMPLEMENTED => "Server does not support this operation",
        _ => status.canonical_reason().unwrap_or("Unknown"),
    }
}

fn error_page(status: StatusCode, message: &str) -> String {
    let code = status.as_u16();
    format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <title>Error response</title>\n\
         </head>\n\
         <body>\n\
         <h1>Error response</h1>\n\
         <p>Error code: {code}</p>\n\
         <p>Message: {}.</p>\n\
         <p>Error code explanation: {code} - {}.</p>\n\
         </body>\n\
         </html>\n",
        escape_html(message),
        escape_html(explain(status)),
    )
}

/// Escape text for an HTML text node
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}
