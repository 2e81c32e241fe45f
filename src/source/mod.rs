//! Link source reading from markdown listings.
//!
//! The portal listings are stored as markdown files whose tables carry a
//! title column and one or more download-link columns. The folder that holds
//! each markdown file encodes the curriculum category (level, stream, class
//! range), which becomes the [`WorkItem::category_path`].
//!
//! # Example
//!
//! ```
//! use textbook_core::source::parse_markdown;
//!
//! let items = parse_markdown(
//!     "| 1 | Mathematics | [Link-1](https://example.com/math.pdf) |",
//!     "secondary/class-9",
//! );
//! assert_eq!(items.len(), 1);
//! assert_eq!(items[0].title, "Mathematics");
//! ```

mod error;
mod markdown;

pub use error::SourceError;
pub use markdown::parse_markdown;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::item::WorkItem;

/// Result of scanning an input root.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Unique work items in scan order.
    pub items: Vec<WorkItem>,
    /// Number of markdown files read.
    pub files_scanned: usize,
    /// Table rows with links but no recognizable title.
    pub skipped_rows: usize,
    /// Items dropped because their key was already seen.
    pub duplicates: usize,
}

impl ScanResult {
    /// Returns the number of unique items found.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true when no items were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Scans every markdown file under `root` and collects unique work items.
///
/// # Errors
///
/// Returns [`SourceError::InvalidRoot`] if `root` is not a directory, or
/// [`SourceError::Io`] if a directory or file under it cannot be read.
#[tracing::instrument(fields(root = %root.display()))]
pub fn scan_root(root: &Path) -> Result<ScanResult, SourceError> {
    if !root.is_dir() {
        return Err(SourceError::invalid_root(root));
    }

    let files = collect_markdown_files(root)?;
    let mut result = ScanResult {
        files_scanned: files.len(),
        ..ScanResult::default()
    };
    let mut seen = HashSet::new();

    for file in &files {
        let content = fs::read_to_string(file).map_err(|e| SourceError::io(file, e))?;
        let category_path = category_path_for(root, file);
        let parsed = markdown::parse_document(&content, &category_path);

        if parsed.items.is_empty() {
            debug!(file = %file.display(), "no download links found");
        } else {
            debug!(
                file = %file.display(),
                links = parsed.items.len(),
                "parsed markdown listing"
            );
        }

        result.skipped_rows += parsed.skipped_rows;
        for item in parsed.items {
            if seen.insert(item.key()) {
                result.items.push(item);
            } else {
                result.duplicates += 1;
            }
        }
    }

    if result.duplicates > 0 {
        warn!(
            duplicates = result.duplicates,
            "duplicate title/link entries ignored"
        );
    }
    info!(
        files = result.files_scanned,
        items = result.items.len(),
        skipped_rows = result.skipped_rows,
        "scanned markdown listings"
    );

    Ok(result)
}

/// Recursively collects markdown files under `root`, sorted and deduplicated.
///
/// # Errors
///
/// Returns [`SourceError::Io`] if a directory cannot be read.
pub fn collect_markdown_files(root: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let mut files = Vec::new();
    collect_recursive(root, &mut files)?;
    files.sort();
    files.dedup();
    Ok(files)
}

fn collect_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), SourceError> {
    let entries = fs::read_dir(dir).map_err(|e| SourceError::io(dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| SourceError::io(dir, e))?;
        let path = entry.path();

        if path.is_dir() {
            collect_recursive(&path, files)?;
        } else if path.is_file() && is_markdown_file(&path) {
            files.push(path);
        }
    }

    Ok(())
}

fn is_markdown_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };

    matches!(ext.to_ascii_lowercase().as_str(), "md" | "markdown")
}

/// Category of a markdown file: its parent directory relative to `root`,
/// `/`-separated. Files directly under `root` have an empty category.
#[must_use]
pub fn category_path_for(root: &Path, file: &Path) -> String {
    file.parent()
        .and_then(|parent| parent.strip_prefix(root).ok())
        .map(|relative| {
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_root_uses_parent_directory_as_category() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "secondary/general/classes 6-9/index.md",
            "| 1 | Physics | [Link-1](https://example.com/p.pdf) |\n",
        );
        write(
            temp.path(),
            "primary/index.md",
            "| 1 | Math | [Link-1](https://example.com/m.pdf) |\n",
        );

        let result = scan_root(temp.path()).unwrap();
        assert_eq!(result.files_scanned, 2);
        assert_eq!(result.len(), 2);

        let categories: Vec<_> = result
            .items
            .iter()
            .map(|i| i.category_path.as_str())
            .collect();
        assert!(categories.contains(&"primary"));
        assert!(categories.contains(&"secondary/general/classes 6-9"));
    }

    #[test]
    fn test_scan_root_drops_duplicate_keys() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "a/index.md",
            "| Math | [Link-1](https://x.example/1) |\n| Math | [Link-1](https://x.example/dup) |\n",
        );

        let result = scan_root(temp.path()).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.duplicates, 1);
        assert_eq!(result.items[0].source_url, "https://x.example/1");
    }

    #[test]
    fn test_scan_root_rejects_missing_directory() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing");
        assert!(matches!(
            scan_root(&missing),
            Err(SourceError::InvalidRoot { .. })
        ));
    }

    #[test]
    fn test_collect_ignores_non_markdown_files() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a/index.md", "");
        write(temp.path(), "a/PDFs/book_1.pdf", "%PDF");
        write(temp.path(), "b/notes.MARKDOWN", "");

        let files = collect_markdown_files(temp.path()).unwrap();
        assert_eq!(files.len(), 2);
    }
}
