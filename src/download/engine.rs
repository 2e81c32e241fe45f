//! Download engine: resume planning and the bounded worker pool.
//!
//! A run has two phases. [`DownloadEngine::plan`] consults the index and
//! decides, per work item, whether it is already complete or which path it
//! will be written to. [`DownloadEngine::process`] then fetches every planned
//! job with bounded concurrency, retrying per the [`RetryPolicy`], and
//! records each outcome in the [`IndexStore`] as soon as it is known.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use textbook_core::download::{
//!     DownloadEngine, DownloadStats, FileValidator, HttpClient, RetryPolicy, RunMode,
//! };
//! use textbook_core::{IndexStore, scan_root};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scan = scan_root(Path::new("./2025"))?;
//! let store = Arc::new(IndexStore::open(Path::new("./out/index.json"))?);
//! let engine = DownloadEngine::new(3, RetryPolicy::default(), FileValidator::default())?;
//!
//! let plan = engine
//!     .plan(&scan.items, &store, Path::new("./out"), RunMode::All)
//!     .await;
//! let report = engine
//!     .run(plan, store, Arc::new(HttpClient::new()?), Arc::new(DownloadStats::new()))
//!     .await?;
//! println!("succeeded: {}, failed: {}", report.succeeded(), report.failed());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, instrument, warn};

use super::client::Fetcher;
use super::filename::{PathPlanner, is_safe_relative, resolve};
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use super::validate::{FileValidator, Validation};
use crate::index::{DownloadRecord, DownloadStatus, Index, IndexError, IndexStore, now_unix};
use crate::item::WorkItem;
use crate::normalize::{NormalizedUrl, normalize};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 32;

/// Default number of simultaneous fetches.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Error type for download engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Recording an outcome in the index failed.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Which items a run considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Every item not already complete.
    #[default]
    All,
    /// Only items whose last recorded outcome is `failed`.
    RetryFailedOnly,
}

/// One item to fetch, with its resolved URL and destination.
#[derive(Debug, Clone)]
pub struct Job {
    pub item: WorkItem,
    pub url: NormalizedUrl,
    /// Destination relative to the output root, as stored in the index.
    pub relative_path: String,
    /// Absolute destination.
    pub dest: PathBuf,
}

/// Result of resume planning.
#[derive(Debug, Default)]
pub struct Plan {
    /// Items that need work, in key order.
    pub jobs: Vec<Job>,
    /// Items already complete with a valid file on disk.
    pub skipped: Vec<WorkItem>,
    /// Items left out by [`RunMode::RetryFailedOnly`].
    pub excluded: usize,
}

/// Final outcome of one job.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub item: WorkItem,
    pub record: DownloadRecord,
    /// True when a valid file already at the destination was accepted
    /// without a fetch.
    pub adopted: bool,
}

/// Outcomes of a whole run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Outcomes in completion order.
    pub outcomes: Vec<DownloadOutcome>,
}

impl RunReport {
    /// Number of jobs that ended in `success` (including adopted files).
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.record.status == DownloadStatus::Success)
            .count()
    }

    /// Number of jobs that ended in `failed`.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    /// Outcomes that ended in `failed`.
    pub fn failures(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.record.status == DownloadStatus::Failed)
    }
}

/// Live counters shared between workers and the progress display.
#[derive(Debug, Default)]
pub struct DownloadStats {
    total: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    adopted: AtomicUsize,
    retried: AtomicUsize,
    filesystem_errors: AtomicUsize,
    bytes: AtomicU64,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs handed to the pool.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Fetched and validated downloads.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    /// Jobs that exhausted their attempts.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Items skipped because they were already complete.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Existing valid files accepted without a fetch.
    #[must_use]
    pub fn adopted(&self) -> usize {
        self.adopted.load(Ordering::SeqCst)
    }

    /// Retry attempts made across all jobs.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Failures caused by the local filesystem.
    #[must_use]
    pub fn filesystem_errors(&self) -> usize {
        self.filesystem_errors.load(Ordering::SeqCst)
    }

    /// Bytes of fetched and adopted files.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    /// Jobs finished so far.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.succeeded() + self.failed() + self.adopted()
    }

    fn add_total(&self, n: usize) {
        self.total.fetch_add(n, Ordering::SeqCst);
    }

    fn add_skipped(&self, n: usize) {
        self.skipped.fetch_add(n, Ordering::SeqCst);
    }

    fn increment_succeeded(&self, bytes: u64) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    fn increment_adopted(&self, bytes: u64) {
        self.adopted.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_filesystem_errors(&self) {
        self.filesystem_errors.fetch_add(1, Ordering::SeqCst);
    }
}

/// Bounded-concurrency downloader.
///
/// # Concurrency Model
///
/// - Each job runs in its own Tokio task
/// - A semaphore permit is acquired before spawning each task
/// - Permits are released automatically when the task ends (RAII)
/// - Outcomes are written to the index as each task finishes
#[derive(Debug)]
pub struct DownloadEngine {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    retry_policy: RetryPolicy,
    validator: FileValidator,
}

impl DownloadEngine {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `concurrency` is
    /// outside 1..=32.
    ///
    /// # Example
    ///
    /// ```
    /// use textbook_core::download::{DownloadEngine, FileValidator, RetryPolicy};
    ///
    /// let engine = DownloadEngine::new(3, RetryPolicy::default(), FileValidator::default()).unwrap();
    /// assert_eq!(engine.concurrency(), 3);
    /// ```
    pub fn new(
        concurrency: usize,
        retry_policy: RetryPolicy,
        validator: FileValidator,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            max_retries = retry_policy.max_retries(),
            min_size = validator.min_size(),
            "creating download engine"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            retry_policy,
            validator,
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Decides which items need work and where each one is written.
    ///
    /// Items are visited in key order so path disambiguation is stable.
    /// An item is skipped when its record is `success` and the recorded file
    /// still exists and validates.
    pub async fn plan(
        &self,
        items: &[WorkItem],
        store: &IndexStore,
        root: &Path,
        mode: RunMode,
    ) -> Plan {
        let index = store.snapshot().await;
        self.plan_against(items, &index, root, mode).await
    }

    /// Same as [`DownloadEngine::plan`], against an already loaded index.
    ///
    /// Dry runs use this with [`IndexStore::read_snapshot`] so no lock is
    /// taken and nothing is written.
    #[instrument(skip(self, items, index), fields(items = items.len(), root = %root.display()))]
    pub async fn plan_against(
        &self,
        items: &[WorkItem],
        index: &Index,
        root: &Path,
        mode: RunMode,
    ) -> Plan {
        let mut sorted: Vec<&WorkItem> = items.iter().collect();
        sorted.sort_by_key(|item| item.key());
        sorted.dedup_by_key(|item| item.key());

        let recorded_path = |item: &WorkItem| {
            index
                .get(&item.key())
                .and_then(|r| r.local_path.clone())
                .filter(|p| is_safe_relative(p))
        };

        let mut planner = PathPlanner::new();
        for item in &sorted {
            if let Some(path) = recorded_path(*item) {
                planner.reserve(&item.key(), &path);
            }
        }

        let mut plan = Plan::default();
        for item in sorted {
            let record = index.get(&item.key());
            let status = record.map(|r| r.status);
            let relative_path = recorded_path(item).unwrap_or_else(|| planner.assign(item));

            if mode == RunMode::RetryFailedOnly && status != Some(DownloadStatus::Failed) {
                plan.excluded += 1;
                continue;
            }

            let dest = resolve(root, &relative_path);
            if status == Some(DownloadStatus::Success) {
                match self.validator.validate_file(&dest).await {
                    Ok((Validation::Accept, _)) => {
                        plan.skipped.push(item.clone());
                        continue;
                    }
                    Ok((Validation::Reject(reason), _)) => {
                        warn!(path = %dest.display(), %reason, "recorded file is invalid, downloading again");
                    }
                    Err(e) => {
                        warn!(path = %dest.display(), error = %e, "recorded file is missing, downloading again");
                    }
                }
            }

            plan.jobs.push(Job {
                item: item.clone(),
                url: normalize(&item.source_url),
                relative_path,
                dest,
            });
        }

        info!(
            jobs = plan.jobs.len(),
            skipped = plan.skipped.len(),
            excluded = plan.excluded,
            "planned run"
        );
        plan
    }

    /// Processes every job in `plan` with bounded concurrency.
    ///
    /// Each outcome is recorded in `store` as soon as it is known and then
    /// sent on `outcomes` (if given). Individual download failures never make
    /// this method fail.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Index`] if any outcome could not be persisted
    /// (after every job has finished), or [`EngineError::SemaphoreClosed`].
    #[instrument(skip_all, fields(jobs = plan.jobs.len()))]
    pub async fn process(
        &self,
        plan: Plan,
        store: Arc<IndexStore>,
        fetcher: Arc<dyn Fetcher>,
        stats: Arc<DownloadStats>,
        outcomes: Option<mpsc::UnboundedSender<DownloadOutcome>>,
    ) -> Result<(), EngineError> {
        stats.add_skipped(plan.skipped.len());
        stats.add_total(plan.jobs.len());
        let mut handles = Vec::with_capacity(plan.jobs.len());

        info!(concurrency = self.concurrency, "starting downloads");

        for job in plan.jobs {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let store = Arc::clone(&store);
            let fetcher = Arc::clone(&fetcher);
            let stats = Arc::clone(&stats);
            let outcomes = outcomes.clone();
            let policy = self.retry_policy.clone();
            let validator = self.validator;

            handles.push(tokio::spawn(async move {
                let _permit = permit;

                let outcome = run_job(job, fetcher.as_ref(), &policy, &validator, &stats).await;
                let key = outcome.item.key();
                let persisted = store.record(&key, outcome.record.clone()).await;
                if let Err(e) = &persisted {
                    error!(key = %key, error = %e, "failed to record outcome in index");
                }
                if let Some(tx) = outcomes {
                    let _ = tx.send(outcome);
                }
                persisted
            }));
        }

        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => warn!(error = %e, "download task panicked"),
            }
        }

        info!(
            succeeded = stats.succeeded(),
            failed = stats.failed(),
            adopted = stats.adopted(),
            skipped = stats.skipped(),
            retried = stats.retried(),
            "downloads complete"
        );

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Runs [`DownloadEngine::process`] and collects every outcome.
    ///
    /// # Errors
    ///
    /// Same as [`DownloadEngine::process`].
    pub async fn run(
        &self,
        plan: Plan,
        store: Arc<IndexStore>,
        fetcher: Arc<dyn Fetcher>,
        stats: Arc<DownloadStats>,
    ) -> Result<RunReport, EngineError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.process(plan, store, fetcher, stats, Some(tx)).await?;

        let mut report = RunReport::default();
        while let Some(outcome) = rx.recv().await {
            report.outcomes.push(outcome);
        }
        Ok(report)
    }
}

/// Adopts an existing valid file or fetches with retries.
#[instrument(skip_all, fields(key = %job.item.key(), url = %job.url.fetch_url))]
async fn run_job(
    job: Job,
    fetcher: &dyn Fetcher,
    policy: &RetryPolicy,
    validator: &FileValidator,
    stats: &DownloadStats,
) -> DownloadOutcome {
    if let Ok((Validation::Accept, size)) = validator.validate_file(&job.dest).await {
        info!(path = %job.dest.display(), bytes = size, "valid file already present, adopting");
        stats.increment_adopted(size);
        let record = DownloadRecord::success(&job.item, &job.relative_path, size, 0, now_unix());
        return DownloadOutcome {
            item: job.item,
            record,
            adopted: true,
        };
    }

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        debug!(attempt, "attempting download");

        match fetcher.fetch(&job.url, &job.dest).await {
            Ok(fetched) => {
                stats.increment_succeeded(fetched.bytes);
                let record = DownloadRecord::success(
                    &job.item,
                    &job.relative_path,
                    fetched.bytes,
                    attempt - 1,
                    now_unix(),
                );
                return DownloadOutcome {
                    item: job.item,
                    record,
                    adopted: false,
                };
            }
            Err(e) => {
                let failure_type = classify_error(&e);
                match policy.should_retry(failure_type, attempt) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next_attempt,
                    } => {
                        info!(
                            attempt = next_attempt,
                            max_attempts = policy.max_attempts(),
                            delay_ms = delay.as_millis(),
                            error = %e,
                            "retrying download"
                        );
                        stats.increment_retried();
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        if failure_type == FailureType::Filesystem {
                            error!(path = %job.dest.display(), error = %e, "filesystem error, check the output directory");
                            stats.increment_filesystem_errors();
                        } else {
                            warn!(attempts = attempt, %reason, error = %e, "download failed");
                        }
                        stats.increment_failed();
                        let record = DownloadRecord::failed(
                            &job.item,
                            &job.relative_path,
                            e.to_string(),
                            attempt - 1,
                            now_unix(),
                        );
                        return DownloadOutcome {
                            item: job.item,
                            record,
                            adopted: false,
                        };
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::download::{DownloadError, FetchedFile, RejectReason};

    fn pdf(size: usize) -> Vec<u8> {
        let mut bytes = b"%PDF-1.4\n".to_vec();
        bytes.resize(size, b'0');
        bytes
    }

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Pdf(usize),
        HtmlPage,
        NotFound,
    }

    /// Fetcher that replays scripted results and counts calls.
    struct ScriptedFetcher {
        script: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<Step>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(
            &self,
            url: &NormalizedUrl,
            dest: &Path,
        ) -> Result<FetchedFile, DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Step::Pdf(2000));
            match next {
                Step::Pdf(size) => {
                    std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
                    std::fs::write(dest, pdf(size)).unwrap();
                    Ok(FetchedFile {
                        path: dest.to_path_buf(),
                        bytes: size as u64,
                    })
                }
                Step::HtmlPage => Err(DownloadError::rejected(
                    &url.fetch_url,
                    RejectReason::HtmlPage,
                )),
                Step::NotFound => Err(DownloadError::http_status(&url.fetch_url, 404)),
            }
        }
    }

    fn engine() -> DownloadEngine {
        DownloadEngine::new(3, RetryPolicy::immediate(2), FileValidator::default()).unwrap()
    }

    fn items() -> Vec<WorkItem> {
        vec![
            WorkItem::new("Book", "primary", 1, "https://example.com/b1"),
            WorkItem::new("Book", "primary", 2, "https://example.com/b2"),
        ]
    }

    #[test]
    fn test_engine_new_valid_concurrency() {
        for value in [1, DEFAULT_CONCURRENCY, 32] {
            let engine =
                DownloadEngine::new(value, RetryPolicy::default(), FileValidator::default())
                    .unwrap();
            assert_eq!(engine.concurrency(), value);
        }
    }

    #[test]
    fn test_engine_new_invalid_concurrency() {
        for value in [0, 33] {
            assert!(matches!(
                DownloadEngine::new(value, RetryPolicy::default(), FileValidator::default()),
                Err(EngineError::InvalidConcurrency { value: v }) if v == value
            ));
        }
    }

    #[test]
    fn test_engine_error_display() {
        let msg = EngineError::InvalidConcurrency { value: 0 }.to_string();
        assert!(msg.contains("invalid concurrency"));
        assert!(msg.contains("32"));
    }

    #[tokio::test]
    async fn test_run_records_every_outcome() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(IndexStore::open(&temp.path().join("index.json")).unwrap());
        let fetcher = Arc::new(ScriptedFetcher::new(vec![]));
        let engine = engine();

        let plan = engine.plan(&items(), &store, temp.path(), RunMode::All).await;
        assert_eq!(plan.jobs.len(), 2);
        let report = engine
            .run(plan, Arc::clone(&store), fetcher.clone(), Arc::new(DownloadStats::new()))
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 2);
        assert!(temp.path().join("primary/PDFs/Book_1.pdf").exists());
        assert!(temp.path().join("primary/PDFs/Book_2.pdf").exists());
        assert_eq!(store.summary().await.total_succeeded, 2);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_records_retry_count() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(IndexStore::open(&temp.path().join("index.json")).unwrap());
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Step::HtmlPage, Step::HtmlPage, Step::HtmlPage]));
        let engine =
            DownloadEngine::new(1, RetryPolicy::immediate(2), FileValidator::default()).unwrap();
        let book = items().remove(0);
        let stats = Arc::new(DownloadStats::new());

        let plan = engine.plan(&[book.clone()], &store, temp.path(), RunMode::All).await;
        let report = engine
            .run(plan, Arc::clone(&store), fetcher.clone(), Arc::clone(&stats))
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), 3);
        assert_eq!(report.failed(), 1);
        let record = store.get(&book.key()).await.unwrap();
        assert_eq!(record.status, DownloadStatus::Failed);
        assert_eq!(record.retry_count, 2);
        assert!(record.error_message.unwrap().contains("HTML"));
        assert_eq!(stats.retried(), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(IndexStore::open(&temp.path().join("index.json")).unwrap());
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Step::NotFound]));
        let engine =
            DownloadEngine::new(1, RetryPolicy::immediate(2), FileValidator::default()).unwrap();
        let book = items().remove(0);

        let plan = engine.plan(&[book.clone()], &store, temp.path(), RunMode::All).await;
        engine
            .run(plan, Arc::clone(&store), fetcher.clone(), Arc::new(DownloadStats::new()))
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(store.get(&book.key()).await.unwrap().retry_count, 0);
    }

    #[tokio::test]
    async fn test_transient_failure_then_success_counts_retries() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(IndexStore::open(&temp.path().join("index.json")).unwrap());
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Step::HtmlPage, Step::Pdf(5000)]));
        let engine =
            DownloadEngine::new(1, RetryPolicy::immediate(2), FileValidator::default()).unwrap();
        let book = items().remove(0);

        let plan = engine.plan(&[book.clone()], &store, temp.path(), RunMode::All).await;
        engine
            .run(plan, Arc::clone(&store), fetcher.clone(), Arc::new(DownloadStats::new()))
            .await
            .unwrap();

        let record = store.get(&book.key()).await.unwrap();
        assert_eq!(record.status, DownloadStatus::Success);
        assert_eq!(record.retry_count, 1);
        assert_eq!(record.file_size_bytes, 5000);
    }

    #[tokio::test]
    async fn test_second_run_skips_completed_items() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(IndexStore::open(&temp.path().join("index.json")).unwrap());
        let fetcher = Arc::new(ScriptedFetcher::new(vec![]));
        let engine = engine();

        let plan = engine.plan(&items(), &store, temp.path(), RunMode::All).await;
        engine
            .run(plan, Arc::clone(&store), fetcher.clone(), Arc::new(DownloadStats::new()))
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 2);

        let plan = engine.plan(&items(), &store, temp.path(), RunMode::All).await;
        assert!(plan.jobs.is_empty());
        assert_eq!(plan.skipped.len(), 2);
    }

    #[tokio::test]
    async fn test_deleted_file_is_downloaded_again() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(IndexStore::open(&temp.path().join("index.json")).unwrap());
        let fetcher = Arc::new(ScriptedFetcher::new(vec![]));
        let engine = engine();

        let plan = engine.plan(&items(), &store, temp.path(), RunMode::All).await;
        engine
            .run(plan, Arc::clone(&store), fetcher.clone(), Arc::new(DownloadStats::new()))
            .await
            .unwrap();
        std::fs::remove_file(temp.path().join("primary/PDFs/Book_2.pdf")).unwrap();

        let plan = engine.plan(&items(), &store, temp.path(), RunMode::All).await;
        assert_eq!(plan.jobs.len(), 1);
        assert_eq!(plan.jobs[0].item.link_index, 2);
        assert_eq!(plan.jobs[0].relative_path, "primary/PDFs/Book_2.pdf");
    }

    #[tokio::test]
    async fn test_existing_valid_file_is_adopted_without_fetch() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(IndexStore::open(&temp.path().join("index.json")).unwrap());
        let fetcher = Arc::new(ScriptedFetcher::new(vec![]));
        let dest = temp.path().join("primary/PDFs/Book_1.pdf");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, pdf(3000)).unwrap();

        let engine = engine();
        let stats = Arc::new(DownloadStats::new());
        let book = items().remove(0);
        let plan = engine.plan(&[book.clone()], &store, temp.path(), RunMode::All).await;
        let report = engine
            .run(plan, Arc::clone(&store), fetcher.clone(), Arc::clone(&stats))
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), 0);
        assert!(report.outcomes[0].adopted);
        assert_eq!(stats.adopted(), 1);
        assert_eq!(
            store.get(&book.key()).await.unwrap().file_size_bytes,
            3000
        );
    }

    #[tokio::test]
    async fn test_retry_failed_only_selects_failed_records() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(IndexStore::open(&temp.path().join("index.json")).unwrap());
        let [one, two]: [WorkItem; 2] = items().try_into().unwrap();
        store
            .record(&one.key(), DownloadRecord::failed(&one, "primary/PDFs/Book_1.pdf", "HTTP 500", 2, 1))
            .await
            .unwrap();
        store.register(&[two.clone()]).await.unwrap();

        let plan = engine()
            .plan(&[one.clone(), two], &store, temp.path(), RunMode::RetryFailedOnly)
            .await;
        assert_eq!(plan.jobs.len(), 1);
        assert_eq!(plan.jobs[0].item, one);
        assert_eq!(plan.excluded, 1);
    }

    #[tokio::test]
    async fn test_plan_against_snapshot_matches_store_plan() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.json");
        let store = Arc::new(IndexStore::open(&path).unwrap());
        let fetcher = Arc::new(ScriptedFetcher::new(vec![]));
        let engine = engine();
        let book = items().remove(0);

        let plan = engine.plan(&[book.clone()], &store, temp.path(), RunMode::All).await;
        engine
            .run(plan, Arc::clone(&store), fetcher, Arc::new(DownloadStats::new()))
            .await
            .unwrap();

        let snapshot = IndexStore::read_snapshot(&path).unwrap();
        let plan = engine
            .plan_against(&items(), &snapshot, temp.path(), RunMode::All)
            .await;
        assert_eq!(plan.skipped, vec![book]);
        assert_eq!(plan.jobs.len(), 1);
        assert_eq!(plan.jobs[0].relative_path, "primary/PDFs/Book_2.pdf");
    }

    #[tokio::test]
    async fn test_outcomes_are_streamed_on_channel() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(IndexStore::open(&temp.path().join("index.json")).unwrap());
        let engine = engine();
        let plan = engine.plan(&items(), &store, temp.path(), RunMode::All).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        engine
            .process(
                plan,
                store,
                Arc::new(ScriptedFetcher::new(vec![])),
                Arc::new(DownloadStats::new()),
                Some(tx),
            )
            .await
            .unwrap();

        let mut received = 0;
        while let Ok(outcome) = rx.try_recv() {
            assert_eq!(outcome.record.status, DownloadStatus::Success);
            received += 1;
        }
        assert_eq!(received, 2);
    }

    #[test]
    fn test_download_stats_thread_safe() {
        use std::thread;

        let stats = Arc::new(DownloadStats::new());
        let mut handles = Vec::new();
        for _ in 0..10 {
            let stats = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    stats.increment_succeeded(10);
                    stats.increment_failed();
                    stats.increment_retried();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.succeeded(), 1000);
        assert_eq!(stats.failed(), 1000);
        assert_eq!(stats.retried(), 1000);
        assert_eq!(stats.bytes(), 10_000);
        assert_eq!(stats.finished(), 2000);
    }
}
