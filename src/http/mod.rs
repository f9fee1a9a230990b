//! HTTP protocol layer module
//!
//! Provides HTTP protocol-related base functionality, decoupled from the
//! file-serving logic: MIME detection, cache headers and response builders.

pub mod cache;
pub mod mime;
pub mod response;

// Re-export commonly used items
pub use cache::apply_no_cache_headers;
pub use response::{
    build_304_response, build_404_response, build_501_response, build_error_response,
    build_file_response, build_html_response, build_redirect_response,
};
