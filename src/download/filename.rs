//! Deterministic output paths for downloaded PDFs.
//!
//! Paths are stored in the index relative to the output root, always with
//! `/` separators, so an archive can be moved between machines.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::item::{WorkItem, WorkItemKey};

/// Longest normalized title, in bytes, before the `_{link}.pdf` suffix.
pub const MAX_TITLE_BYTES: usize = 180;

/// Directory under each category that holds the PDFs.
pub const PDF_DIR: &str = "PDFs";

const PDF_EXTENSION: &str = ".pdf";
const PARTIAL_SUFFIX: &str = ".part";

/// Makes a listing title safe to use as a file name.
///
/// Question marks and double quotes are dropped, path separators and other
/// reserved characters become `_`, runs of whitespace collapse to one
/// space, and the result is truncated on a character boundary.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    let replaced: String = title
        .chars()
        .filter(|c| !matches!(c, '?' | '"'))
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '<' | '>' | '|' => '_',
            '\n' | '\r' | '\t' => ' ',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated = truncate_at_char_boundary(&collapsed, MAX_TITLE_BYTES);
    // Windows refuses names ending in a dot or space.
    let trimmed = truncated.trim_end_matches(['.', ' ']);

    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

fn truncate_at_char_boundary(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Relative path of an item's PDF: `{category_path}/PDFs/{title}_{link}.pdf`.
#[must_use]
pub fn relative_path(item: &WorkItem) -> String {
    with_suffix(item, None)
}

fn with_suffix(item: &WorkItem, suffix: Option<u32>) -> String {
    let name = normalize_title(&item.title);
    let file = match suffix {
        Some(n) => format!("{name}_{}_{n}{PDF_EXTENSION}", item.link_index),
        None => format!("{name}_{}{PDF_EXTENSION}", item.link_index),
    };
    if item.category_path.is_empty() {
        format!("{PDF_DIR}/{file}")
    } else {
        format!("{}/{PDF_DIR}/{file}", item.category_path)
    }
}

/// Absolute location of an item's PDF under `root`.
#[must_use]
pub fn output_path(root: &Path, item: &WorkItem) -> PathBuf {
    resolve(root, &relative_path(item))
}

/// Joins a `/`-separated relative path onto `root` using native separators.
#[must_use]
pub fn resolve(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

/// Returns true for a recorded path that stays inside the output root.
#[must_use]
pub fn is_safe_relative(relative: &str) -> bool {
    !relative.is_empty()
        && !relative.starts_with('/')
        && !relative.contains('\\')
        && !relative.contains(':')
        && relative.split('/').all(|segment| segment != "..")
}

/// Temporary download location next to the final path.
#[must_use]
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.file_name().unwrap_or_default().to_os_string();
    name.push(PARTIAL_SUFFIX);
    final_path.with_file_name(name)
}

/// Assigns unique relative paths to a batch of items.
///
/// Callers reserve recorded paths first, then assign the rest in key order,
/// which keeps the outcome identical between runs over the same input.
#[derive(Debug, Default)]
pub struct PathPlanner {
    claimed: HashMap<String, WorkItemKey>,
}

impl PathPlanner {
    /// Creates an empty planner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a path already recorded in the index for `key`.
    pub fn reserve(&mut self, key: &WorkItemKey, relative: &str) {
        self.claimed
            .entry(relative.to_string())
            .or_insert_with(|| key.clone());
    }

    /// Returns the path for `item`, disambiguating clashes with other keys.
    pub fn assign(&mut self, item: &WorkItem) -> String {
        let key = item.key();
        let mut candidate = relative_path(item);
        let mut suffix = 1;

        loop {
            match self.claimed.get(&candidate) {
                Some(owner) if *owner == key => return candidate,
                Some(_) => {
                    suffix += 1;
                    candidate = with_suffix(item, Some(suffix));
                }
                None => {
                    self.claimed.insert(candidate.clone(), key);
                    return candidate;
                }
            }
        }
    }
}
