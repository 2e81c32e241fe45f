//! URL normalization for known file-hosting providers.
//!
//! Listing pages link to share pages rather than files. This module maps a
//! share URL onto a directly fetchable URL using a small closed set of
//! provider strategies selected by host:
//!
//! - [`Provider::GoogleDrive`] - extracts the file id and targets the direct download endpoint
//! - [`Provider::GovCloud`] - appends `/download` to government cloud share links
//! - [`Provider::Direct`] - passthrough for everything else
//!
//! Normalization is pure string work with no network I/O. Inputs a strategy
//! cannot interpret are returned unchanged so the fetch is still attempted.
//!
//! # Example
//!
//! ```
//! use textbook_core::normalize::{normalize, Provider};
//!
//! let normalized = normalize("https://drive.google.com/file/d/ABC123/view");
//! assert_eq!(normalized.provider, Provider::GoogleDrive);
//! assert!(normalized.fetch_url.contains("ABC123"));
//! ```

pub mod google_drive;
pub mod govcloud;

use std::fmt;

use regex::Regex;
use tracing::debug;
use url::Url;

/// Compiles a regex from a static pattern.
///
/// # Panics
///
/// Panics if `pattern` is not a valid regex; patterns are compile-time constants.
pub(crate) fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Normalizes a host string: trim, strip leading "www.", trailing '.', and lowercases.
pub(crate) fn canonical_host(host: &str) -> String {
    host.trim()
        .trim_start_matches("www.")
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

/// Hosting provider strategy selected for a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Google Drive file share links.
    GoogleDrive,
    /// Government cloud (Nextcloud-style) share links.
    GovCloud,
    /// Any other host; fetched as-is.
    Direct,
}

impl Provider {
    /// Selects the provider strategy for a parsed URL by host.
    #[must_use]
    pub fn detect(url: &Url) -> Self {
        let Some(host) = url.host_str().map(canonical_host) else {
            return Self::Direct;
        };
        if google_drive::is_drive_host(&host) {
            Self::GoogleDrive
        } else if govcloud::is_govcloud_host(&host) {
            Self::GovCloud
        } else {
            Self::Direct
        }
    }

    /// Returns the stable label used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GoogleDrive => "google_drive",
            Self::GovCloud => "govcloud",
            Self::Direct => "direct",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source URL paired with the URL that should actually be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    /// URL to request.
    pub fetch_url: String,
    /// Strategy that produced `fetch_url`.
    pub provider: Provider,
    /// Provider file identifier, when one was extracted.
    pub file_id: Option<String>,
    /// Other endpoints serving the same file, tried in order when
    /// `fetch_url` answers with an error status or a non-PDF body.
    pub alternates: Vec<String>,
}

impl NormalizedUrl {
    /// Wraps a URL that needs no transformation.
    #[must_use]
    pub fn passthrough(url: impl Into<String>) -> Self {
        Self {
            fetch_url: url.into(),
            provider: Provider::Direct,
            file_id: None,
            alternates: Vec::new(),
        }
    }
}

/// Maps a share URL to a directly fetchable URL.
///
/// Never fails: malformed URLs and provider URLs missing the expected
/// identifier come back unchanged.
#[must_use]
pub fn normalize(source_url: &str) -> NormalizedUrl {
    let trimmed = source_url.trim();
    let Ok(parsed) = Url::parse(trimmed) else {
        debug!(url = %trimmed, "unparseable URL, fetching as-is");
        return NormalizedUrl::passthrough(trimmed);
    };

    let provider = Provider::detect(&parsed);
    match provider {
        Provider::GoogleDrive => match google_drive::extract_file_id(trimmed) {
            Some(id) => NormalizedUrl {
                fetch_url: google_drive::direct_download_url(&id),
                provider,
                alternates: google_drive::fallback_urls(&id),
                file_id: Some(id),
            },
            None => {
                debug!(url = %trimmed, "no Drive file id found, fetching as-is");
                NormalizedUrl {
                    fetch_url: trimmed.to_string(),
                    provider,
                    file_id: None,
                    alternates: Vec::new(),
                }
            }
        },
        Provider::GovCloud => NormalizedUrl {
            fetch_url: govcloud::download_url(&parsed).unwrap_or_else(|| trimmed.to_string()),
            provider,
            file_id: None,
            alternates: Vec::new(),
        },
        Provider::Direct => NormalizedUrl::passthrough(trimmed),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_google_drive_view_link_embeds_file_id() {
        let normalized = normalize("https://drive.google.com/file/d/ABC123/view");
        assert_eq!(normalized.provider, Provider::GoogleDrive);
        assert_eq!(normalized.file_id.as_deref(), Some("ABC123"));
        assert_eq!(
            normalized.fetch_url,
            "https://drive.usercontent.google.com/download?id=ABC123&export=download&confirm=t"
        );
        assert_eq!(normalized.alternates, google_drive::fallback_urls("ABC123"));
    }

    #[test]
    fn test_google_drive_without_id_is_unchanged() {
        let url = "https://drive.google.com/drive/folders";
        let normalized = normalize(url);
        assert_eq!(normalized.provider, Provider::GoogleDrive);
        assert_eq!(normalized.fetch_url, url);
        assert!(normalized.file_id.is_none());
    }

    #[test]
    fn test_govcloud_share_gets_download_suffix() {
        let normalized = normalize("https://drive.egovcloud.gov.bd/index.php/s/AbCdEf");
        assert_eq!(normalized.provider, Provider::GovCloud);
        assert_eq!(
            normalized.fetch_url,
            "https://drive.egovcloud.gov.bd/index.php/s/AbCdEf/download"
        );
        assert!(normalized.alternates.is_empty());
    }

    #[test]
    fn test_other_hosts_pass_through() {
        let url = "https://nctb.portal.gov.bd/sites/default/files/book.pdf";
        let normalized = normalize(url);
        assert_eq!(normalized, NormalizedUrl::passthrough(url));
    }

    #[test]
    fn test_malformed_url_passes_through() {
        let normalized = normalize("not a url");
        assert_eq!(normalized.fetch_url, "not a url");
        assert_eq!(normalized.provider, Provider::Direct);
    }

    #[test]
    fn test_provider_detect_ignores_www_and_case() {
        let url = Url::parse("https://WWW.Drive.Google.com/open?id=X").unwrap();
        assert_eq!(Provider::detect(&url), Provider::GoogleDrive);
    }
}
