//! Textbook Downloader Core Library
//!
//! This library provides the core functionality for the textbook downloader,
//! which turns markdown tables of textbook download links into an archived,
//! resumable folder tree of PDFs.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`item`] - Work item identity shared by every other module
//! - [`source`] - Markdown table scanning (title, category, link triples)
//! - [`normalize`] - Provider-specific share URL to direct URL transforms
//! - [`download`] - Validation, retry policy, HTTP fetch, and the worker pool
//! - [`index`] - Durable JSON index of per-item outcomes used for resume

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod index;
pub mod item;
pub mod normalize;
pub mod source;

// Re-export commonly used types
pub use download::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DownloadEngine, DownloadError, DownloadOutcome,
    DownloadStats, EngineError, FailureType, FetchedFile, Fetcher, FileValidator, HttpClient,
    MIN_PDF_SIZE_BYTES, Plan, RejectReason, RetryDecision, RetryPolicy, RunMode, RunReport,
    Validation, classify_error,
};
pub use index::{DownloadRecord, DownloadStatus, Index, IndexError, IndexStore, IndexSummary};
pub use item::{WorkItem, WorkItemKey};
pub use normalize::{NormalizedUrl, Provider, normalize};
pub use source::{ScanResult, SourceError, parse_markdown, scan_root};
