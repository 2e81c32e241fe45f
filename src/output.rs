//! CLI output formatting and display helpers.

use std::path::Path;

use textbook_core::download::Plan;
use textbook_core::{DownloadRecord, DownloadStats};
use tracing::{info, warn};

/// Failures listed individually before the rest are summarised.
pub(crate) const MAX_LISTED_FAILURES: usize = 20;

/// Returns terminal width from COLUMNS, or 80 if unset/invalid.
pub(crate) fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|width| *width >= 20)
        .unwrap_or(80)
}

/// Truncates text to at most `width` chars, appending ellipsis if truncated.
pub(crate) fn truncate_to_width(text: &str, width: usize) -> String {
    let text_len = text.chars().count();
    if text_len <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    if width == 1 {
        return "…".to_string();
    }

    let mut output: String = text.chars().take(width - 1).collect();
    output.push('…');
    output
}

pub(crate) fn format_megabytes(bytes: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let mb = bytes as f64 / (1024.0 * 1024.0);
    format!("{mb:.2} MB")
}

/// Counts shown in the end-of-run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) found: usize,
    /// Items left out by `--retry-failed`.
    pub(crate) excluded: usize,
    pub(crate) skipped: usize,
    pub(crate) adopted: usize,
    pub(crate) succeeded: usize,
    pub(crate) failed: usize,
    /// Failures caused by the local disk rather than the remote side.
    pub(crate) filesystem_errors: usize,
    pub(crate) bytes: u64,
}

impl RunSummary {
    pub(crate) fn from_stats(found: usize, excluded: usize, stats: &DownloadStats) -> Self {
        Self {
            found,
            excluded,
            skipped: stats.skipped(),
            adopted: stats.adopted(),
            succeeded: stats.succeeded(),
            failed: stats.failed(),
            filesystem_errors: stats.filesystem_errors(),
            bytes: stats.bytes(),
        }
    }

    /// Share of selected items that are complete after this run.
    pub(crate) fn success_rate(&self) -> f64 {
        let selected = self.found.saturating_sub(self.excluded);
        if selected == 0 {
            return 100.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = (self.skipped + self.succeeded) as f64 / selected as f64 * 100.0;
        rate
    }
}

pub(crate) fn render_summary_lines(summary: &RunSummary) -> Vec<String> {
    let mut lines = vec![
        "Download Summary".to_string(),
        format!("  Found:                {}", summary.found),
    ];
    if summary.excluded > 0 {
        lines.push(format!("  Not selected:         {}", summary.excluded));
    }
    lines.extend([
        format!("  Skipped (complete):   {}", summary.skipped),
        format!("  Adopted from disk:    {}", summary.adopted),
        format!("  Downloaded:           {}", summary.succeeded),
        format!("  Failed:               {}", summary.failed),
    ]);
    if summary.filesystem_errors > 0 {
        lines.push(format!(
            "  Filesystem errors:    {} (check disk space and permissions)",
            summary.filesystem_errors
        ));
    }
    lines.extend([
        format!("  Total size:           {}", format_megabytes(summary.bytes)),
        format!("  Success rate:         {:.1}%", summary.success_rate()),
    ]);
    lines
}

pub(crate) fn render_failure_lines(failures: &[DownloadRecord], width: usize) -> Vec<String> {
    if failures.is_empty() {
        return Vec::new();
    }

    let mut lines = vec![format!("Failed downloads ({}):", failures.len())];
    for record in failures.iter().take(MAX_LISTED_FAILURES) {
        let line = format!(
            "  {} (Link {}): {} — {}",
            record.title,
            record.link_index,
            record.source_url,
            record.error_message.as_deref().unwrap_or("unknown error")
        );
        lines.push(truncate_to_width(&line, width));
    }
    if failures.len() > MAX_LISTED_FAILURES {
        lines.push(format!(
            "  … and {} more",
            failures.len() - MAX_LISTED_FAILURES
        ));
    }
    lines
}

/// Prints the end-of-run summary to stdout.
pub(crate) fn print_completion_summary(
    summary: &RunSummary,
    failures: &[DownloadRecord],
    output_root: &Path,
    index_path: &Path,
) {
    info!(
        found = summary.found,
        succeeded = summary.succeeded,
        failed = summary.failed,
        output_root = %output_root.display(),
        index = %index_path.display(),
        "run complete"
    );
    if summary.filesystem_errors > 0 {
        warn!(
            count = summary.filesystem_errors,
            "downloads failed on local filesystem errors"
        );
    }

    for line in render_summary_lines(summary) {
        println!("{line}");
    }
    for line in render_failure_lines(failures, terminal_width().max(120)) {
        println!("{line}");
    }
}

pub(crate) fn render_dry_run_lines(plan: &Plan) -> Vec<String> {
    let mut lines = Vec::with_capacity(plan.jobs.len() + plan.skipped.len() + 1);
    for item in &plan.skipped {
        lines.push(format!(
            "skip   {} (Link {}): already downloaded",
            item.title, item.link_index
        ));
    }
    for job in &plan.jobs {
        lines.push(format!(
            "fetch  {} -> {}",
            job.url.fetch_url, job.relative_path
        ));
    }
    lines.push(format!(
        "Dry run: {} to download, {} already complete, {} not selected",
        plan.jobs.len(),
        plan.skipped.len(),
        plan.excluded
    ));
    lines
}
