//! Google Drive share link handling.
//!
//! Share links (`/file/d/{id}/view`, `open?id={id}`, `uc?id={id}`) are mapped
//! to the usercontent download endpoint. Large files are served behind a
//! "virus scan warning" HTML page; [`interstitial_url`] recovers the
//! follow-up URL from that page.

use std::sync::LazyLock;

use regex::Regex;

use super::compile_static_regex;

const DRIVE_HOSTS: [&str; 3] = [
    "drive.google.com",
    "docs.google.com",
    "drive.usercontent.google.com",
];

const DOWNLOAD_ENDPOINT: &str = "https://drive.usercontent.google.com/download";

static FILE_PATH_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"/file/d/([a-zA-Z0-9_-]+)"));

static QUERY_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"[?&]id=([a-zA-Z0-9_-]+)"));

/// Confirm-token patterns, most specific first.
static CONFIRM_RES: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        compile_static_regex(r#"href="[^"]*[?&]confirm=([^&"]+)"#),
        compile_static_regex(r#""downloadUrl":"[^"]*[?&]confirm=([^&"]+)"#),
        compile_static_regex(r"confirm=([a-zA-Z0-9_-]+)"),
    ]
});

static UUID_RES: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        compile_static_regex(r#"name="uuid"\s+value="([^"]+)""#),
        compile_static_regex(r#"uuid=([^&"]+)"#),
    ]
});

pub(crate) fn is_drive_host(host: &str) -> bool {
    DRIVE_HOSTS.contains(&host)
}

/// Extracts the Drive file id from a share URL.
#[must_use]
pub fn extract_file_id(url: &str) -> Option<String> {
    FILE_PATH_ID_RE
        .captures(url)
        .or_else(|| QUERY_ID_RE.captures(url))
        .map(|caps| caps[1].to_string())
}

/// Builds the direct download URL for a Drive file id.
#[must_use]
pub fn direct_download_url(file_id: &str) -> String {
    format!("{DOWNLOAD_ENDPOINT}?id={file_id}&export=download&confirm=t")
}

/// Other Drive download endpoints for `file_id`, in the order they are tried
/// after [`direct_download_url`] is refused or serves a page instead of a file.
#[must_use]
pub fn fallback_urls(file_id: &str) -> Vec<String> {
    vec![
        format!("https://drive.google.com/uc?export=download&id={file_id}&confirm=t"),
        format!("https://drive.google.com/uc?id={file_id}&export=download"),
        format!("https://docs.google.com/uc?export=download&id={file_id}"),
    ]
}

/// Returns true when an HTML body is Drive's "can't scan for viruses" page.
#[must_use]
pub fn is_interstitial(html: &str) -> bool {
    let lower = html.to_lowercase();
    lower.contains("virus scan warning")
        || lower.contains("download anyway")
        || lower.contains("can't scan this file for viruses")
}

/// Builds the follow-up download URL from a Drive interstitial page.
///
/// Prefers an explicit `confirm` token and falls back to the form `uuid`.
/// Returns `None` when the page is not an interstitial or carries neither.
#[must_use]
pub fn interstitial_url(html: &str, file_id: &str) -> Option<String> {
    if !is_interstitial(html) {
        return None;
    }

    if let Some(token) = CONFIRM_RES
        .iter()
        .find_map(|re| re.captures(html).map(|caps| caps[1].to_string()))
    {
        return Some(format!(
            "{DOWNLOAD_ENDPOINT}?id={file_id}&export=download&confirm={token}"
        ));
    }

    UUID_RES
        .iter()
        .find_map(|re| re.captures(html).map(|caps| caps[1].to_string()))
        .map(|uuid| {
            format!("{DOWNLOAD_ENDPOINT}?id={file_id}&export=download&confirm=t&uuid={uuid}")
        })
}
