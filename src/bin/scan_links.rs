use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use textbook_core::source::{category_path_for, collect_markdown_files, parse_markdown};

/// Count the download links in a tree of markdown listings, per category.
#[derive(Parser, Debug)]
#[command(name = "scan-links")]
#[command(
    author,
    version,
    about = "Count textbook download links per category in markdown listings"
)]
struct Args {
    /// Directory tree of markdown listings
    root: PathBuf,

    /// Emit the report as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Output file path (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Link counts for one category folder.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
struct CategoryCounts {
    files: usize,
    books: usize,
    links: usize,
    link_1: usize,
    link_2: usize,
}

impl CategoryCounts {
    fn add(&mut self, other: &Self) {
        self.files += other.files;
        self.books += other.books;
        self.links += other.links;
        self.link_1 += other.link_1;
        self.link_2 += other.link_2;
    }
}

#[derive(Debug, Default, Serialize)]
struct LinkReport {
    categories: BTreeMap<String, CategoryCounts>,
    totals: CategoryCounts,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if !args.root.is_dir() {
        bail!("Input root is not a directory: {}", args.root.display());
    }

    let report = build_report(&args.root)?;
    let rendered = if args.json {
        serde_json::to_string_pretty(&report).context("Failed to serialize report")? + "\n"
    } else {
        render_table(&report)
    };
    write_output(&rendered, args.output.as_deref())?;

    eprintln!(
        "Scanned {} markdown file(s) in {} categor{}, found {} link(s)",
        report.totals.files,
        report.categories.len(),
        if report.categories.len() == 1 { "y" } else { "ies" },
        report.totals.links
    );

    Ok(())
}

fn build_report(root: &Path) -> Result<LinkReport> {
    let files = collect_markdown_files(root)
        .with_context(|| format!("Failed to scan {}", root.display()))?;

    let mut report = LinkReport::default();
    for file in &files {
        let content = fs::read_to_string(file)
            .with_context(|| format!("Failed to read file: {}", file.display()))?;
        let category = category_path_for(root, file);
        let items = parse_markdown(&content, &category);

        let books: BTreeSet<&str> = items.iter().map(|item| item.title.as_str()).collect();
        let counts = CategoryCounts {
            files: 1,
            books: books.len(),
            links: items.len(),
            link_1: items.iter().filter(|item| item.link_index == 1).count(),
            link_2: items.iter().filter(|item| item.link_index == 2).count(),
        };

        let label = if category.is_empty() {
            "root".to_string()
        } else {
            category
        };
        report.categories.entry(label).or_default().add(&counts);
        report.totals.add(&counts);
    }

    Ok(report)
}

fn render_table(report: &LinkReport) -> String {
    let width = report
        .categories
        .keys()
        .map(|name| name.chars().count())
        .max()
        .unwrap_or(0)
        .max("CATEGORY".len());

    let mut out = format!(
        "{:<width$}  {:>5}  {:>5}  {:>5}  {:>6}  {:>6}\n",
        "CATEGORY", "FILES", "BOOKS", "LINKS", "LINK-1", "LINK-2"
    );
    let mut row = |name: &str, counts: &CategoryCounts| {
        out.push_str(&format!(
            "{name:<width$}  {:>5}  {:>5}  {:>5}  {:>6}  {:>6}\n",
            counts.files, counts.books, counts.links, counts.link_1, counts.link_2
        ));
    };
    for (name, counts) in &report.categories {
        row(name, counts);
    }
    row("TOTAL", &report.totals);
    out
}

fn write_output(rendered: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("Failed to write output file: {}", path.display())),
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(rendered.as_bytes())
                .context("Failed to write to stdout")
        }
    }
}
