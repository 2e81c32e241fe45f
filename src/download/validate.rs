//! Payload validation for downloaded PDFs.
//!
//! Servers behind share links happily answer `200 OK` with an HTML error or
//! login page. A payload is only accepted when it starts with the PDF magic
//! bytes and is larger than a plausible minimum size.

use std::fmt;
use std::path::Path;

use tokio::io::AsyncReadExt;

/// Minimum plausible size of a real textbook PDF (bytes).
pub const MIN_PDF_SIZE_BYTES: u64 = 1000;

/// Magic bytes every PDF starts with.
pub const PDF_MAGIC: &[u8] = b"%PDF";

/// Number of leading bytes kept for validation.
pub const HEADER_LEN: usize = 64;

/// Why a payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The payload is an HTML document (error, login, or interstitial page).
    HtmlPage,
    /// The payload does not start with the PDF signature.
    BadSignature {
        /// Escaped rendering of the first bytes.
        found: String,
    },
    /// The payload is smaller than the plausible minimum.
    TooSmall {
        /// Actual size in bytes.
        size: u64,
        /// Configured minimum in bytes.
        min: u64,
    },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HtmlPage => write!(f, "received an HTML page instead of a PDF"),
            Self::BadSignature { found } => {
                write!(f, "not a PDF (first bytes: \"{found}\")")
            }
            Self::TooSmall { size, min } => {
                write!(f, "file too small: {size} bytes (minimum {min})")
            }
        }
    }
}

/// Outcome of validating a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Genuine, complete PDF.
    Accept,
    /// Payload must be discarded.
    Reject(RejectReason),
}

impl Validation {
    /// Returns true for [`Validation::Accept`].
    #[must_use]
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Signature and size checks applied to every downloaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileValidator {
    min_size: u64,
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new(MIN_PDF_SIZE_BYTES)
    }
}

impl FileValidator {
    /// Creates a validator with a custom minimum size.
    #[must_use]
    pub fn new(min_size: u64) -> Self {
        Self { min_size }
    }

    /// Returns the configured minimum size in bytes.
    #[must_use]
    pub fn min_size(&self) -> u64 {
        self.min_size
    }

    /// Checks only the leading bytes.
    ///
    /// Returns `None` while fewer than [`PDF_MAGIC`] bytes are available and
    /// the bytes seen so far still match, so callers can check early chunks.
    #[must_use]
    pub fn check_signature(&self, header: &[u8]) -> Option<RejectReason> {
        if looks_like_html(header) {
            return Some(RejectReason::HtmlPage);
        }
        let n = header.len().min(PDF_MAGIC.len());
        if header[..n] != PDF_MAGIC[..n] {
            return Some(RejectReason::BadSignature {
                found: escape_header(header),
            });
        }
        None
    }

    /// Validates a complete payload from its leading bytes and total size.
    ///
    /// The signature is checked first, so a non-PDF is rejected regardless
    /// of its size.
    #[must_use]
    pub fn validate(&self, header: &[u8], size: u64) -> Validation {
        if header.len() < PDF_MAGIC.len() {
            return Validation::Reject(
                self.check_signature(header)
                    .unwrap_or_else(|| RejectReason::BadSignature {
                        found: escape_header(header),
                    }),
            );
        }
        if let Some(reason) = self.check_signature(header) {
            return Validation::Reject(reason);
        }
        if size < self.min_size {
            return Validation::Reject(RejectReason::TooSmall {
                size,
                min: self.min_size,
            });
        }
        Validation::Accept
    }

    /// Validates a file already on disk.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the file cannot be opened or read.
    pub async fn validate_file(&self, path: &Path) -> std::io::Result<(Validation, u64)> {
        let mut file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let mut header = Vec::with_capacity(HEADER_LEN);
        (&mut file)
            .take(HEADER_LEN as u64)
            .read_to_end(&mut header)
            .await?;
        Ok((self.validate(&header, size), size))
    }
}

fn looks_like_html(header: &[u8]) -> bool {
    let start = header
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(header.len());
    let lowered = header[start..].to_ascii_lowercase();
    lowered.starts_with(b"<!doctype") || lowered.starts_with(b"<html")
}

fn escape_header(header: &[u8]) -> String {
    header
        .iter()
        .take(16)
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pdf_bytes(size: usize) -> Vec<u8> {
        let mut bytes = b"%PDF-1.7\n".to_vec();
        bytes.resize(size, b'x');
        bytes
    }

    #[test]
    fn test_accepts_pdf_above_minimum() {
        let validator = FileValidator::default();
        let bytes = pdf_bytes(4096);
        assert_eq!(validator.validate(&bytes, 4096), Validation::Accept);
    }

    #[test]
    fn test_rejects_small_pdf() {
        let validator = FileValidator::default();
        let bytes = pdf_bytes(200);
        assert_eq!(
            validator.validate(&bytes, 200),
            Validation::Reject(RejectReason::TooSmall {
                size: 200,
                min: MIN_PDF_SIZE_BYTES
            })
        );
    }

    #[test]
    fn test_rejects_html_error_page_regardless_of_size() {
        let validator = FileValidator::default();
        let html = b"  <!DOCTYPE html><html><body>Quota exceeded</body></html>";
        assert_eq!(
            validator.validate(html, 10_000_000),
            Validation::Reject(RejectReason::HtmlPage)
        );
    }

    #[test]
    fn test_rejects_wrong_signature_regardless_of_size() {
        let validator = FileValidator::default();
        let result = validator.validate(b"PK\x03\x04zipdata", 5_000_000);
        match result {
            Validation::Reject(RejectReason::BadSignature { found }) => {
                assert!(found.starts_with("PK"), "{found}");
            }
            other => panic!("expected BadSignature, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_empty_payload() {
        let validator = FileValidator::default();
        assert!(!validator.validate(b"", 0).is_accept());
    }

    #[test]
    fn test_check_signature_accepts_partial_prefix() {
        let validator = FileValidator::default();
        assert_eq!(validator.check_signature(b"%P"), None);
        assert!(validator.check_signature(b"<h").is_some());
    }

    #[tokio::test]
    async fn test_validate_file_reads_header_and_size() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("book_1.pdf");
        std::fs::write(&path, pdf_bytes(2048)).unwrap();

        let (validation, size) = FileValidator::default()
            .validate_file(&path)
            .await
            .unwrap();
        assert!(validation.is_accept());
        assert_eq!(size, 2048);
    }

    #[test]
    fn test_reject_reason_display() {
        let msg = RejectReason::TooSmall { size: 10, min: 1000 }.to_string();
        assert!(msg.contains("10 bytes"));
        assert!(RejectReason::HtmlPage.to_string().contains("HTML"));
    }
}
