//! Work item identity.
//!
//! A [`WorkItem`] names one file to download. Its identity is the
//! `(category_path, title, link_index)` triple captured in [`WorkItemKey`],
//! which is also the key under which outcomes are stored in the index.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Separator used in the string form of a [`WorkItemKey`].
const KEY_SEPARATOR: &str = "::";

/// One title + link that needs downloading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Display name as found in the listing (may be non-ASCII).
    pub title: String,
    /// Folder location relative to the input root, `/`-separated.
    pub category_path: String,
    /// 1 or 2, disambiguating multiple links for the same title.
    pub link_index: u8,
    /// Original, possibly indirect, share URL.
    pub source_url: String,
}

impl WorkItem {
    /// Creates a work item, normalizing the category path separators.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        category_path: impl Into<String>,
        link_index: u8,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into().trim().to_string(),
            category_path: normalize_category_path(&category_path.into()),
            link_index,
            source_url: source_url.into().trim().to_string(),
        }
    }

    /// Returns the identity key of this item.
    #[must_use]
    pub fn key(&self) -> WorkItemKey {
        WorkItemKey {
            category_path: self.category_path.clone(),
            title: self.title.clone(),
            link_index: self.link_index,
        }
    }
}

/// Identity of a [`WorkItem`] used for resume and skip decisions.
///
/// Ordering is by category, then title, then link index, which keeps path
/// planning and index output stable between runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkItemKey {
    pub category_path: String,
    pub title: String,
    pub link_index: u8,
}

impl fmt::Display for WorkItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}",
            self.category_path, self.title, self.link_index
        )
    }
}

impl FromStr for WorkItemKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Titles may contain the separator, so split off the outer fields only.
        let (category_path, rest) = s
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| format!("invalid work item key: {s}"))?;
        let (title, link_index) = rest
            .rsplit_once(KEY_SEPARATOR)
            .ok_or_else(|| format!("invalid work item key: {s}"))?;
        let link_index = link_index
            .parse::<u8>()
            .map_err(|_| format!("invalid link index in work item key: {s}"))?;
        Ok(Self {
            category_path: category_path.to_string(),
            title: title.to_string(),
            link_index,
        })
    }
}

fn normalize_category_path(raw: &str) -> String {
    raw.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}
