//! Single-attempt HTTP fetch primitive.
//!
//! [`HttpClient`] streams one URL into a `.part` file next to the final
//! destination, validates the payload, and renames it into place. Retries
//! live in the engine; this module makes exactly one logical attempt. Within
//! it, a Google Drive file may be requested from its alternate endpoints and
//! through one follow-up for the virus-scan interstitial per endpoint.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::DownloadError;
use super::filename::temp_path;
use super::validate::{FileValidator, HEADER_LEN, PDF_MAGIC, RejectReason, Validation};
use crate::normalize::{NormalizedUrl, Provider, google_drive};

/// HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Longest a single read may stall (2 minutes).
pub const READ_TIMEOUT_SECS: u64 = 120;

/// Upper bound on one whole transfer, body included (1 hour).
const MAX_TRANSFER_SECS: u64 = 60 * 60;

/// Most of a non-PDF body kept in memory to look for a Drive confirm form.
const MAX_HTML_BYTES: usize = 512 * 1024;

/// Share hosts serve different pages to non-browser agents.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                                  (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const ACCEPT_PDF: &str = "application/pdf,application/octet-stream,*/*";

/// A validated PDF moved into its final location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    /// Final path of the file.
    pub path: PathBuf,
    /// Size in bytes.
    pub bytes: u64,
}

/// One download attempt: fetch `url`, validate, and place the file at `dest`.
///
/// Implementations must never leave a partial or rejected file at `dest`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs a single attempt.
    async fn fetch(&self, url: &NormalizedUrl, dest: &Path) -> Result<FetchedFile, DownloadError>;
}

/// Streaming reqwest-backed [`Fetcher`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    validator: FileValidator,
}

/// How a response body ended up.
enum Streamed {
    /// Body written to the temp file; `header` holds its first bytes.
    Written { bytes: u64, header: Vec<u8> },
    /// Body did not start like a PDF; nothing was written to disk.
    NotPdf { body: Vec<u8> },
}

impl HttpClient {
    /// Creates a client with the default timeouts.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
    }

    /// Creates a client with explicit connect and read timeouts.
    ///
    /// `read` bounds each wait for the next chunk, so a slow body that keeps
    /// arriving is never cut off; only a stalled one is.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the TLS backend cannot be initialised.
    pub fn with_timeouts(connect: Duration, read: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_PDF));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .connect_timeout(connect)
            .read_timeout(read)
            .timeout(Duration::from_secs(MAX_TRANSFER_SECS))
            .gzip(true)
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            validator: FileValidator::default(),
        })
    }

    /// Replaces the validator applied to every payload.
    #[must_use]
    pub fn with_validator(mut self, validator: FileValidator) -> Self {
        self.validator = validator;
        self
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }

    async fn attempt(&self, url: &str, temp: &Path) -> Result<Streamed, DownloadError> {
        let response = self.send(url).await?;
        stream_to_file(response, url, temp, &self.validator).await
    }

    async fn place(
        &self,
        url: &str,
        temp: &Path,
        dest: &Path,
        bytes: u64,
        header: &[u8],
    ) -> Result<FetchedFile, DownloadError> {
        if let Validation::Reject(reason) = self.validator.validate(header, bytes) {
            return Err(DownloadError::rejected(url, reason));
        }
        tokio::fs::rename(temp, dest)
            .await
            .map_err(|e| DownloadError::io(dest, e))?;
        Ok(FetchedFile {
            path: dest.to_path_buf(),
            bytes,
        })
    }

    /// Fetches one endpoint, following a Drive confirmation page at most once.
    async fn fetch_from(
        &self,
        url: &NormalizedUrl,
        endpoint: &str,
        temp: &Path,
        dest: &Path,
    ) -> Result<FetchedFile, DownloadError> {
        let mut target = endpoint.to_string();
        let mut followed_interstitial = false;

        loop {
            let result = match self.attempt(&target, temp).await {
                Ok(Streamed::Written { bytes, header }) => {
                    self.place(&target, temp, dest, bytes, &header).await
                }
                Ok(Streamed::NotPdf { body }) => {
                    if !followed_interstitial
                        && let Some(next) = drive_follow_up(url, &body)
                    {
                        debug!(next = %next, "following Drive confirmation page");
                        followed_interstitial = true;
                        target = next;
                        continue;
                    }
                    Err(DownloadError::rejected(&target, reject_reason(&self.validator, &body)))
                }
                Err(e) => Err(e),
            };

            if result.is_err() {
                debug!(path = %temp.display(), "cleaning up partial file after error");
                let _ = tokio::fs::remove_file(temp).await;
            }
            return result;
        }
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    #[instrument(skip(self), fields(url = %url.fetch_url, provider = %url.provider))]
    async fn fetch(&self, url: &NormalizedUrl, dest: &Path) -> Result<FetchedFile, DownloadError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let temp = temp_path(dest);
        let mut result = self.fetch_from(url, &url.fetch_url, &temp, dest).await;
        for alternate in &url.alternates {
            let Err(error) = &result else { break };
            if !tries_next_endpoint(error) {
                break;
            }
            debug!(error = %error, next = %alternate, "trying alternate endpoint");
            result = self.fetch_from(url, alternate, &temp, dest).await;
        }

        if let Ok(fetched) = &result {
            info!(path = %fetched.path.display(), bytes = fetched.bytes, "download complete");
        }
        result
    }
}

/// Another endpoint may serve the file when this one refused or served a page.
fn tries_next_endpoint(error: &DownloadError) -> bool {
    matches!(
        error,
        DownloadError::HttpStatus { .. } | DownloadError::Rejected { .. }
    )
}

fn drive_follow_up(url: &NormalizedUrl, body: &[u8]) -> Option<String> {
    if url.provider != Provider::GoogleDrive {
        return None;
    }
    let file_id = url.file_id.as_deref()?;
    google_drive::interstitial_url(&String::from_utf8_lossy(body), file_id)
}

fn reject_reason(validator: &FileValidator, body: &[u8]) -> RejectReason {
    let header = &body[..body.len().min(HEADER_LEN)];
    validator
        .check_signature(header)
        .unwrap_or_else(|| RejectReason::BadSignature {
            found: String::from_utf8_lossy(header).into_owned(),
        })
}

/// Streams a response body into `temp`.
///
/// The first bytes are checked before anything touches the disk; a body that
/// cannot be a PDF is buffered (bounded) instead so a Drive confirmation form
/// can be parsed out of it.
async fn stream_to_file(
    response: reqwest::Response,
    url: &str,
    temp: &Path,
    validator: &FileValidator,
) -> Result<Streamed, DownloadError> {
    let mut stream = response.bytes_stream();
    let mut header: Vec<u8> = Vec::with_capacity(HEADER_LEN);
    let mut writer: Option<BufWriter<File>> = None;
    let mut not_pdf = false;
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::from_reqwest(url, e))?;

        if let Some(w) = writer.as_mut() {
            w.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(temp, e))?;
            bytes_written += chunk.len() as u64;
            continue;
        }

        header.extend_from_slice(&chunk);
        if not_pdf {
            if header.len() >= MAX_HTML_BYTES {
                break;
            }
            continue;
        }
        if header.len() < PDF_MAGIC.len() {
            continue;
        }
        if validator.check_signature(&header).is_some() {
            not_pdf = true;
            continue;
        }

        let file = File::create(temp)
            .await
            .map_err(|e| DownloadError::io(temp, e))?;
        let mut new_writer = BufWriter::new(file);
        new_writer
            .write_all(&header)
            .await
            .map_err(|e| DownloadError::io(temp, e))?;
        bytes_written = header.len() as u64;
        header.truncate(HEADER_LEN);
        writer = Some(new_writer);
    }

    // Also covers bodies shorter than the PDF signature.
    let Some(mut writer) = writer else {
        header.truncate(MAX_HTML_BYTES);
        return Ok(Streamed::NotPdf { body: header });
    };

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(temp, e))?;
    writer
        .get_ref()
        .sync_all()
        .await
        .map_err(|e| DownloadError::io(temp, e))?;

    Ok(Streamed::Written {
        bytes: bytes_written,
        header,
    })
}
