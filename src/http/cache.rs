//! HTTP cache control module
//!
//! Cache-suppression headers added to every response, plus the
//! `Last-Modified` / `If-Modified-Since` handling for served files.

use chrono::{DateTime, NaiveDateTime, Utc};
use hyper::header::{HeaderValue, CACHE_CONTROL, EXPIRES, PRAGMA};
use hyper::Response;
use std::time::SystemTime;

pub const CACHE_CONTROL_VALUE: &str = "no-store, no-cache, must-revalidate, max-age=0";
pub const PRAGMA_VALUE: &str = "no-cache";
pub const EXPIRES_VALUE: &str = "0";

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";
/// Obsolete RFC 850 date, e.g. `Sunday, 06-Nov-94 08:49:37 GMT`
const RFC850_DATE: &str = "%A, %d-%b-%y %H:%M:%S GMT";
/// asctime date, e.g. `Sun Nov  6 08:49:37 1994`
const ASCTIME_DATE: &str = "%a %b %e %H:%M:%S %Y";

/// Insert the no-cache headers, replacing any value already present
pub fn apply_no_cache_headers<B>(response: &mut Response<B>) {
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL_VALUE));
    headers.insert(PRAGMA, HeaderValue::from_static(PRAGMA_VALUE));
    headers.insert(EXPIRES, HeaderValue::from_static(EXPIRES_VALUE));
}

/// Format a timestamp as an HTTP date (`Last-Modified` value)
pub fn format_http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(IMF_FIXDATE).to_string()
}

/// Parse an HTTP date in any of the three formats RFC 9110 requires recipients to accept
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    [RFC850_DATE, ASCTIME_DATE]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Check whether a file modified at `modified` may be answered with 304
///
/// Dates that fail to parse never match. Sub-second precision is dropped
/// because HTTP dates only carry whole seconds.
pub fn not_modified_since(if_modified_since: Option<&str>, modified: SystemTime) -> bool {
    let Some(since) = if_modified_since.and_then(parse_http_date) else {
        return false;
    };
    DateTime::<Utc>::from(modified).timestamp() <= since.timestamp()
}
