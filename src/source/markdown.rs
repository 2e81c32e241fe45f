//! Markdown table row parsing.

use std::sync::LazyLock;

use regex::Regex;

use crate::item::WorkItem;
use crate::normalize::compile_static_regex;

/// `[link text](http(s)://...)`
static MARKDOWN_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"\[([^\]]+)\]\((https?://[^)\s]+)\)"));

/// Cells containing any of these are header or label cells, never titles.
/// ("class", "download", "serial", and the danda sentence terminator.)
const LABEL_MARKERS: [&str; 4] = ["শ্রেণি", "ডাউনলোড", "ক্রমিক", "।"];

/// Link text markers for the second mirror of a title.
const SECOND_LINK_MARKERS: [&str; 3] = ["লিংক-২", "link-2", "link 2"];

/// Link text markers for the first mirror of a title.
const FIRST_LINK_MARKERS: [&str; 3] = ["লিংক-১", "link-1", "link 1"];

/// Result of parsing one markdown document.
#[derive(Debug, Default)]
pub struct ParsedDocument {
    /// Work items in document order.
    pub items: Vec<WorkItem>,
    /// Table rows that carried links but no usable title.
    pub skipped_rows: usize,
}

/// Extracts work items from the tables of one markdown document.
///
/// Every `http(s)` link in a table row becomes one item titled by the row's
/// first plain-text cell. Link text such as `লিংক-২` / `Link-2` selects link
/// index 2. Unmarked links take the lowest index no marked link in the same
/// row holds, in row order.
#[must_use]
pub fn parse_markdown(content: &str, category_path: &str) -> Vec<WorkItem> {
    parse_document(content, category_path).items
}

pub(crate) fn parse_document(content: &str, category_path: &str) -> ParsedDocument {
    let mut parsed = ParsedDocument::default();

    for line in content.lines() {
        let line = line.trim();
        if !line.starts_with('|') || !MARKDOWN_LINK_RE.is_match(line) {
            continue;
        }

        let cells = split_row(line);
        let Some(title_index) = cells.iter().position(|cell| is_title_cell(cell)) else {
            parsed.skipped_rows += 1;
            continue;
        };
        let title = cells[title_index];

        let links: Vec<(Option<u8>, &str)> = cells
            .iter()
            .copied()
            .enumerate()
            .filter(|(index, _)| *index != title_index)
            .flat_map(|(_, cell)| MARKDOWN_LINK_RE.captures_iter(cell))
            .filter_map(|caps| {
                let text = caps.get(1)?.as_str();
                let url = caps.get(2)?.as_str();
                Some((link_index_from_text(text), url))
            })
            .collect();

        let mut taken: Vec<u8> = links.iter().filter_map(|(marked, _)| *marked).collect();
        for (marked, url) in links {
            let link_index = marked.unwrap_or_else(|| {
                let free = (1..=u8::MAX).find(|n| !taken.contains(n)).unwrap_or(u8::MAX);
                taken.push(free);
                free
            });
            parsed
                .items
                .push(WorkItem::new(title, category_path, link_index, url));
        }
    }

    parsed
}

fn split_row(line: &str) -> Vec<&str> {
    let inner = line.strip_prefix('|').unwrap_or(line);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(str::trim).collect()
}

fn is_title_cell(cell: &str) -> bool {
    if cell.is_empty() || cell.starts_with('[') {
        return false;
    }
    if cell.chars().all(|c| c.is_numeric() || c == '.') {
        return false;
    }
    if cell.chars().all(|c| matches!(c, '-' | ':' | ' ')) {
        return false;
    }
    !LABEL_MARKERS.iter().any(|marker| cell.contains(marker))
}

fn link_index_from_text(text: &str) -> Option<u8> {
    let lower = text.to_lowercase();
    if SECOND_LINK_MARKERS.iter().any(|m| lower.contains(m)) {
        Some(2)
    } else if FIRST_LINK_MARKERS.iter().any(|m| lower.contains(m)) {
        Some(1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
# ষষ্ঠ শ্রেণি

| ক্রমিক | বইয়ের নাম | ডাউনলোড লিংক-১ | ডাউনলোড লিংক-২ |
|---|---|---|---|
| ১ | আনন্দপাঠ | [ডাউনলোড লিংক-১](https://drive.google.com/file/d/AAA111/view) | [ডাউনলোড লিংক-২](https://drive.egovcloud.gov.bd/index.php/s/xyz) |
| 2 | English For Today | [ডাউনলোড](https://example.com/eft.pdf) | |
";

    #[test]
    fn test_parse_extracts_titles_and_link_indices() {
        let items = parse_markdown(LISTING, "secondary/class-6");
        assert_eq!(items.len(), 3);

        assert_eq!(items[0].title, "আনন্দপাঠ");
        assert_eq!(items[0].link_index, 1);
        assert_eq!(items[0].source_url, "https://drive.google.com/file/d/AAA111/view");
        assert_eq!(items[0].category_path, "secondary/class-6");

        assert_eq!(items[1].title, "আনন্দপাঠ");
        assert_eq!(items[1].link_index, 2);

        assert_eq!(items[2].title, "English For Today");
        assert_eq!(items[2].link_index, 1);
    }

    #[test]
    fn test_header_and_separator_rows_are_ignored() {
        let items = parse_markdown(
            "| ক্রমিক | বইয়ের নাম |\n|---|---|\n",
            "primary",
        );
        assert!(items.is_empty());
    }

    #[test]
    fn test_row_without_title_is_counted_as_skipped() {
        let doc = parse_document(
            "| ১ | [ডাউনলোড](https://example.com/a.pdf) |\n",
            "primary",
        );
        assert!(doc.items.is_empty());
        assert_eq!(doc.skipped_rows, 1);
    }

    #[test]
    fn test_unmarked_links_are_numbered_in_order() {
        let items = parse_markdown(
            "| Math | [a](https://a.example/1) | [b](https://b.example/2) |\n",
            "x",
        );
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].link_index, 1);
        assert_eq!(items[1].link_index, 2);
    }

    #[test]
    fn test_unmarked_link_after_marked_second_link_takes_first_index() {
        let items = parse_markdown(
            "| 1 | Math | [ডাউনলোড লিংক-২](https://a.example/2) | [ডাউনলোড](https://a.example/1) |\n",
            "x",
        );
        let indices: Vec<u8> = items.iter().map(|item| item.link_index).collect();
        assert_eq!(indices, vec![2, 1]);
        assert_eq!(items[1].source_url, "https://a.example/1");
    }

    #[test]
    fn test_unmarked_link_skips_index_held_by_marked_link() {
        let items = parse_markdown(
            "| Math | [plain](https://a.example/x) | [Link-1](https://a.example/1) |\n",
            "x",
        );
        let indices: Vec<u8> = items.iter().map(|item| item.link_index).collect();
        assert_eq!(indices, vec![2, 1]);
    }

    #[test]
    fn test_english_link_markers_are_recognized() {
        let items = parse_markdown("| Physics | [Link-2](https://a.example/p) |\n", "x");
        assert_eq!(items[0].link_index, 2);
    }

    #[test]
    fn test_non_table_links_are_ignored() {
        let items = parse_markdown("See [portal](https://nctb.gov.bd) for details.\n", "x");
        assert!(items.is_empty());
    }

    #[test]
    fn test_bengali_digit_cell_is_not_a_title() {
        assert!(!is_title_cell("১২"));
        assert!(is_title_cell("গণিত"));
    }
}
