//! Persisted index document: per-item records plus aggregate counters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::item::{WorkItem, WorkItemKey};

/// Outcome state of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Seen in the listings, not yet attempted.
    Pending,
    /// A validated file exists at `local_path`.
    Success,
    /// Every allowed attempt failed.
    Failed,
}

/// Durable outcome for one work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub status: DownloadStatus,
    /// Path relative to the output root, `/`-separated.
    #[serde(default)]
    pub local_path: Option<String>,
    #[serde(default)]
    pub file_size_bytes: u64,
    /// Attempts beyond the first one.
    #[serde(default)]
    pub retry_count: u32,
    /// Unix seconds of the last attempt.
    #[serde(default)]
    pub last_attempt_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub title: String,
    pub category_path: String,
    pub link_index: u8,
    pub source_url: String,
}

impl DownloadRecord {
    /// A record for an item that has not been attempted yet.
    #[must_use]
    pub fn pending(item: &WorkItem) -> Self {
        Self {
            status: DownloadStatus::Pending,
            local_path: None,
            file_size_bytes: 0,
            retry_count: 0,
            last_attempt_timestamp: None,
            error_message: None,
            title: item.title.clone(),
            category_path: item.category_path.clone(),
            link_index: item.link_index,
            source_url: item.source_url.clone(),
        }
    }

    /// A record for a validated file stored at `local_path`.
    #[must_use]
    pub fn success(
        item: &WorkItem,
        local_path: impl Into<String>,
        file_size_bytes: u64,
        retry_count: u32,
        timestamp: u64,
    ) -> Self {
        Self {
            status: DownloadStatus::Success,
            local_path: Some(local_path.into()),
            file_size_bytes,
            retry_count,
            last_attempt_timestamp: Some(timestamp),
            ..Self::pending(item)
        }
    }

    /// A record for an item whose attempts were exhausted.
    #[must_use]
    pub fn failed(
        item: &WorkItem,
        local_path: impl Into<String>,
        error_message: impl Into<String>,
        retry_count: u32,
        timestamp: u64,
    ) -> Self {
        Self {
            status: DownloadStatus::Failed,
            local_path: Some(local_path.into()),
            retry_count,
            last_attempt_timestamp: Some(timestamp),
            error_message: Some(error_message.into()),
            ..Self::pending(item)
        }
    }

    /// Rebuilds the work item this record describes.
    #[must_use]
    pub fn item(&self) -> WorkItem {
        WorkItem::new(
            self.title.clone(),
            self.category_path.clone(),
            self.link_index,
            self.source_url.clone(),
        )
    }

    /// Identity key of the described item.
    #[must_use]
    pub fn key(&self) -> WorkItemKey {
        self.item().key()
    }
}

/// Aggregate counters stored at the top of the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSummary {
    pub total_found: usize,
    pub total_succeeded: usize,
    pub total_failed: usize,
    pub total_pending: usize,
    pub total_size_bytes: u64,
    /// Unix seconds of the last mutation.
    pub updated_at: u64,
}

/// Complete index document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Index {
    pub summary: IndexSummary,
    /// Records keyed by the string form of [`WorkItemKey`].
    pub records: BTreeMap<String, DownloadRecord>,
}

impl Index {
    /// Returns the record for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &WorkItemKey) -> Option<&DownloadRecord> {
        self.records.get(&key.to_string())
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true when no records exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Recomputes `summary` from the records.
    pub fn refresh_summary(&mut self, now: u64) {
        let mut summary = IndexSummary {
            total_found: self.records.len(),
            updated_at: now,
            ..IndexSummary::default()
        };
        for record in self.records.values() {
            match record.status {
                DownloadStatus::Pending => summary.total_pending += 1,
                DownloadStatus::Failed => summary.total_failed += 1,
                DownloadStatus::Success => {
                    summary.total_succeeded += 1;
                    summary.total_size_bytes += record.file_size_bytes;
                }
            }
        }
        self.summary = summary;
    }
}
