//! Fetching, validating, and storing textbook PDFs.
//!
//! # Features
//!
//! - Streaming downloads into a `.part` file, renamed into place only after
//!   the payload validates as a PDF
//! - Early abort when the first bytes are an HTML page, with a single
//!   follow-up for Google Drive's virus-scan confirmation page
//! - Bounded retries with exponential backoff for transient failures
//! - Deterministic output paths with stable collision suffixes
//! - Bounded worker pool recording each outcome in the index as it completes
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use textbook_core::download::{Fetcher, HttpClient};
//! use textbook_core::normalize;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new()?;
//! let url = normalize("https://drive.google.com/file/d/ABC123/view");
//! let fetched = client.fetch(&url, Path::new("./out/PDFs/Math_1.pdf")).await?;
//! println!("Downloaded {} bytes", fetched.bytes);
//! # Ok(())
//! # }
//! ```

mod client;
mod engine;
mod error;
pub mod filename;
mod retry;
mod validate;

pub use client::{CONNECT_TIMEOUT_SECS, FetchedFile, Fetcher, HttpClient, READ_TIMEOUT_SECS};
pub use engine::{
    DEFAULT_CONCURRENCY, DownloadEngine, DownloadOutcome, DownloadStats, EngineError, Job, Plan,
    RunMode, RunReport,
};
pub use error::DownloadError;
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};
pub use validate::{
    FileValidator, HEADER_LEN, MIN_PDF_SIZE_BYTES, PDF_MAGIC, RejectReason, Validation,
};
