//! Directory listing module
//!
//! Renders the HTML index shown for directories without an index file.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::Path;
use tokio::fs;

use crate::http::response::escape_html;

/// Characters left as-is in listing links: unreserved URL characters and `/`
const LINK_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// One directory entry as shown in the listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    /// Entry is (or points to) a directory
    pub is_dir: bool,
    pub is_symlink: bool,
}

impl ListingEntry {
    fn href(&self) -> String {
        let link = if self.is_dir {
            format!("{}/", self.name)
        } else {
            self.name.clone()
        };
        utf8_percent_encode(&link, LINK_ENCODE_SET).to_string()
    }

    fn display_name(&self) -> String {
        if self.is_symlink {
            format!("{}@", self.name)
        } else if self.is_dir {
            format!("{}/", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Read a directory's entries, sorted case-insensitively by name
pub async fn read_entries(dir: &Path) -> std::io::Result<Vec<ListingEntry>> {
    let mut read_dir = fs::read_dir(dir).await?;
    let mut entries = Vec::new();

    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_symlink = entry
            .file_type()
            .await
            .is_ok_and(|file_type| file_type.is_symlink());
        // metadata() follows symlinks so links to directories get a trailing slash
        let is_dir = fs::metadata(entry.path())
            .await
            .is_ok_and(|meta| meta.is_dir());
        entries.push(ListingEntry {
            name,
            is_dir,
            is_symlink,
        });
    }

    entries.sort_by_cached_key(|entry| entry.name.to_lowercase());
    Ok(entries)
}

/// Render the listing page for `display_path` (the decoded request path)
pub fn render_listing(display_path: &str, entries: &[ListingEntry]) -> String {
    let title = format!("Directory listing for {}", escape_html(display_path));
    let mut html = String::with_capacity(256 + entries.len() * 64);

    html.push_str("<!DOCTYPE HTML>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n"));
    html.push_str("<hr>\n<ul>\n");
    for entry in entries {
        html.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            entry.href(),
            escape_html(&entry.display_name())
        ));
    }
    html.push_str("</ul>\n<hr>\n</body>\n</html>\n");
    html
}
