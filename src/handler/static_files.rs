//! Static file serving module
//!
//! Maps request paths onto the root directory and answers with file contents,
//! directory listings, trailing-slash redirects or 404s.

use crate::config::AppState;
use crate::handler::listing;
use crate::handler::router::RequestContext;
use crate::http::{self, cache, mime};
use crate::logger;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use percent_encoding::percent_decode_str;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;

/// Translate a URL path into a filesystem path under `root`
///
/// The path is percent-decoded to raw bytes and normalized lexically: empty
/// and `.` segments are dropped, `..` removes the previous segment but never
/// climbs above `root`, and segments that are not a single plain path
/// component (separators, drive prefixes, NUL bytes) are ignored. On unix the
/// decoded bytes become the file name as-is, so names that are not valid UTF-8
/// stay reachable.
pub fn translate_path(root: &Path, request_path: &str) -> PathBuf {
    let decoded: Vec<u8> = percent_decode_str(request_path).collect();
    let mut segments: Vec<OsString> = Vec::new();

    for segment in decoded.split(|&b| b == b'/') {
        match segment {
            b"" | b"." => {}
            b".." => {
                segments.pop();
            }
            s => {
                if let Some(name) = plain_component(s) {
                    segments.push(name);
                }
            }
        }
    }

    let mut path = root.to_path_buf();
    path.extend(segments);
    path
}

fn plain_component(segment: &[u8]) -> Option<OsString> {
    if segment.contains(&0) {
        return None;
    }
    let name = segment_name(segment);
    let mut components = Path::new(&name).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    plain.then_some(name)
}

#[cfg(unix)]
fn segment_name(segment: &[u8]) -> OsString {
    use std::os::unix::ffi::OsStrExt;
    std::ffi::OsStr::from_bytes(segment).to_os_string()
}

#[cfg(not(unix))]
fn segment_name(segment: &[u8]) -> OsString {
    OsString::from(String::from_utf8_lossy(segment).into_owned())
}

/// Serve whatever the request path maps to
pub async fn serve(ctx: &RequestContext<'_>, state: &AppState) -> Response<Full<Bytes>> {
    let fs_path = translate_path(state.root(), ctx.path);
    let trailing_slash = ctx.path.ends_with('/');

    let is_dir = fs::metadata(&fs_path).await.is_ok_and(|meta| meta.is_dir());
    if is_dir {
        if !trailing_slash {
            return http::build_redirect_response(&slash_location(ctx));
        }
        return match find_index_file(&fs_path, state.index_files()).await {
            Some(index) => serve_file(ctx, &index).await,
            None => serve_listing(ctx, &fs_path).await,
        };
    }

    if trailing_slash {
        return http::build_404_response("File not found", ctx.is_head);
    }

    serve_file(ctx, &fs_path).await
}

/// Directory URL with the trailing slash added and the query string kept
fn slash_location(ctx: &RequestContext<'_>) -> String {
    match ctx.query {
        Some(query) => format!("{}/?{query}", ctx.path),
        None => format!("{}/", ctx.path),
    }
}

/// First configured index file that exists as a regular file in `dir`
async fn find_index_file(dir: &Path, index_files: &[String]) -> Option<PathBuf> {
    for name in index_files {
        let candidate = dir.join(name);
        if fs::metadata(&candidate)
            .await
            .is_ok_and(|meta| meta.is_file())
        {
            return Some(candidate);
        }
    }
    None
}

async fn serve_listing(ctx: &RequestContext<'_>, dir: &Path) -> Response<Full<Bytes>> {
    let entries = match listing::read_entries(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            logger::log_warning(&format!(
                "Cannot list directory '{}': {e}",
                dir.display()
            ));
            return http::build_404_response("No permission to list directory", ctx.is_head);
        }
    };

    let display_path = percent_decode_str(ctx.path).decode_utf8_lossy();
    let html = listing::render_listing(&display_path, &entries);
    http::build_html_response(html, ctx.is_head)
}

async fn serve_file(ctx: &RequestContext<'_>, path: &Path) -> Response<Full<Bytes>> {
    let not_found = || http::build_404_response("File not found", ctx.is_head);

    // Missing or unreadable files are an ordinary 404
    let Ok(mut file) = fs::File::open(path).await else {
        return not_found();
    };

    let metadata = match file.metadata().await {
        Ok(meta) if meta.is_file() => meta,
        Ok(_) => return not_found(),
        Err(e) => {
            logger::log_error(&format!("Failed to stat '{}': {e}", path.display()));
            return not_found();
        }
    };

    let modified = metadata.modified().ok();
    if let Some(modified) = modified {
        if ctx.if_none_match.is_none()
            && cache::not_modified_since(ctx.if_modified_since.as_deref(), modified)
        {
            return http::build_304_response();
        }
    }
    let last_modified = modified.map(cache::format_http_date);
    let content_type = mime::content_type_for(path);

    if ctx.is_head {
        return http::build_file_response(
            Bytes::new(),
            content_type,
            metadata.len(),
            last_modified.as_deref(),
        );
    }

    let mut content = Vec::with_capacity(usize::try_from(metadata.len()).unwrap_or(0));
    match file.read_to_end(&mut content).await {
        Ok(_) => {}
        Err(e) => {
            logger::log_error(&format!("Failed to read file '{}': {e}", path.display()));
            return not_found();
        }
    }

    let content_length = content.len() as u64;
    http::build_file_response(
        Bytes::from(content),
        content_type,
        content_length,
        last_modified.as_deref(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/srv/site")
    }

    #[test]
    fn test_translate_plain_path() {
        assert_eq!(
            translate_path(&root(), "/css/site.css"),
            root().join("css").join("site.css")
        );
        assert_eq!(translate_path(&root(), "/"), root());
    }

    #[test]
    fn test_translate_decodes_percent_escapes() {
        assert_eq!(
            translate_path(&root(), "/my%20notes.txt"),
            root().join("my notes.txt")
        );
    }

    #[test]
    fn test_translate_cannot_escape_root() {
        assert_eq!(translate_path(&root(), "/../../etc/passwd"), root().join("etc").join("passwd"));
        assert_eq!(translate_path(&root(), "/%2e%2e/%2e%2e/etc"), root().join("etc"));
        assert_eq!(translate_path(&root(), "/a/../../b"), root().join("b"));
        assert_eq!(translate_path(&root(), "/a/./b/../c"), root().join("a").join("c"));
    }

    #[test]
    fn test_translate_encoded_slash_is_a_separator() {
        assert_eq!(
            translate_path(&root(), "/a%2F..%2F..%2Fsecret"),
            root().join("secret")
        );
    }

    #[test]
    fn test_translate_drops_nul_segments() {
        assert_eq!(translate_path(&root(), "/bad%00name/ok"), root().join("ok"));
    }

    #[test]
    fn test_plain_component() {
        assert_eq!(plain_component(b"index.html"), Some(OsString::from("index.html")));
        assert_eq!(plain_component(b".."), None);
        assert_eq!(plain_component(b"a\0b"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_translate_keeps_non_utf8_bytes() {
        use std::os::unix::ffi::OsStrExt;
        assert_eq!(
            translate_path(&root(), "/caf%E9.txt"),
            root().join(std::ffi::OsStr::from_bytes(b"caf\xe9.txt"))
        );
    }

    fn listing_ctx(path: &str) -> RequestContext<'_> {
        RequestContext {
            path,
            query: None,
            is_head: false,
            if_modified_since: None,
            if_none_match: None,
        }
    }

    #[tokio::test]
    async fn test_unreadable_directory_listing_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = listing_ctx("/gone/");

        let response = serve_listing(&ctx, &dir.path().join("gone")).await;
        assert_eq!(response.status(), hyper::StatusCode::NOT_FOUND);
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("No permission to list directory"));
    }
}
