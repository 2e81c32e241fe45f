//! Government cloud share link handling.
//!
//! The government cloud is a Nextcloud deployment: a public share page at
//! `/index.php/s/{token}` serves the file itself at `/index.php/s/{token}/download`.

use url::Url;

const GOVCLOUD_DOMAIN: &str = "egovcloud.gov.bd";
const SHARE_PATH_MARKER: &str = "/index.php/s/";
const DOWNLOAD_SUFFIX: &str = "/download";

pub(crate) fn is_govcloud_host(host: &str) -> bool {
    host == GOVCLOUD_DOMAIN || host.ends_with(&format!(".{GOVCLOUD_DOMAIN}"))
}

/// Returns the direct download URL for a share link, or `None` for
/// non-share URLs on the host.
#[must_use]
pub fn download_url(url: &Url) -> Option<String> {
    let path = url.path();
    if !path.contains(SHARE_PATH_MARKER) {
        return None;
    }

    let trimmed = path.trim_end_matches('/');
    if trimmed.ends_with(DOWNLOAD_SUFFIX) {
        return Some(url.to_string());
    }

    let mut direct = url.clone();
    direct.set_path(&format!("{trimmed}{DOWNLOAD_SUFFIX}"));
    Some(direct.to_string())
}
