use std::fs;
use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use textbook_core::{
    DownloadEngine, DownloadRecord, DownloadStats, Fetcher, FileValidator, HttpClient, IndexStore,
    RetryPolicy, RunMode, scan_root,
};
use tracing::{debug, info};

use crate::app::{config_runtime, progress_manager, terminal};
use crate::{ProcessExit, app_config, output};

pub(crate) async fn run_downloader() -> Result<ProcessExit> {
    let (cli, cli_sources) = config_runtime::parse_cli_with_sources();
    let loaded = app_config::load_file_config(cli.config.as_deref())?;
    let file_config = loaded.config.as_ref();
    let cli = config_runtime::apply_config_defaults(cli, &cli_sources, file_config)?;

    let default_level = config_runtime::resolve_default_log_level(&cli);
    let force_cli_log_level = config_runtime::should_force_cli_log_level(&cli_sources);
    let no_color = terminal::is_no_color_requested(&cli);
    terminal::init_tracing(default_level, force_cli_log_level, no_color);

    debug!(?cli, "CLI arguments parsed");
    if let (Some(path), Some(_)) = (&loaded.path, file_config) {
        info!(path = %path.display(), "Loaded config file");
    }

    if !cli.input_root.is_dir() {
        bail!(
            "Input root '{}' does not exist or is not a directory",
            cli.input_root.display()
        );
    }

    let output_root = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| cli.input_root.clone());
    let index_path = cli
        .index
        .clone()
        .unwrap_or_else(|| output_root.join("index.json"));

    let scan = scan_root(&cli.input_root)
        .with_context(|| format!("Failed to scan '{}'", cli.input_root.display()))?;
    if scan.is_empty() {
        info!("No download links found in markdown listings");
    }

    let validator = FileValidator::new(config_runtime::resolve_min_pdf_size(file_config));
    let policy = RetryPolicy::with_max_retries(u32::from(cli.max_retries));
    let engine = DownloadEngine::new(usize::from(cli.concurrency), policy, validator)?;
    let mode = if cli.retry_failed {
        RunMode::RetryFailedOnly
    } else {
        RunMode::All
    };

    if cli.dry_run {
        let index = IndexStore::read_snapshot(&index_path)
            .with_context(|| format!("Failed to read index '{}'", index_path.display()))?;
        let plan = engine
            .plan_against(&scan.items, &index, &output_root, mode)
            .await;
        for line in output::render_dry_run_lines(&plan) {
            println!("{line}");
        }
        return Ok(ProcessExit::Success);
    }

    if !output_root.exists() {
        fs::create_dir_all(&output_root).with_context(|| {
            format!("Failed to create output root '{}'", output_root.display())
        })?;
        info!(dir = %output_root.display(), "Created output directory");
    }

    let store = Arc::new(
        IndexStore::open(&index_path)
            .with_context(|| format!("Failed to open index '{}'", index_path.display()))?,
    );
    let registered = store.register(&scan.items).await?;
    debug!(registered, "Registered new work items");

    let plan = engine.plan(&scan.items, &store, &output_root, mode).await;
    let excluded = plan.excluded;
    let total_jobs = plan.jobs.len();

    let timeouts = config_runtime::resolve_http_timeouts(&cli, file_config);
    let fetcher: Arc<dyn Fetcher> = Arc::new(
        HttpClient::with_timeouts(
            Duration::from_secs(timeouts.connect_secs),
            Duration::from_secs(timeouts.read_secs),
        )?
        .with_validator(validator),
    );

    let stats = Arc::new(DownloadStats::new());
    let show_progress = terminal::should_show_progress(
        io::stderr().is_terminal(),
        cli.quiet,
        terminal::is_dumb_terminal(),
    );
    let (progress_handle, stop_progress) =
        progress_manager::spawn_progress_ui(show_progress, Arc::clone(&stats), total_jobs);

    let result = engine
        .run(plan, Arc::clone(&store), fetcher, Arc::clone(&stats))
        .await;

    stop_progress.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    let report = result.with_context(|| {
        format!(
            "Failed to record download outcomes in '{}'",
            index_path.display()
        )
    })?;

    if !cli.quiet {
        let mut failures: Vec<DownloadRecord> =
            report.failures().map(|outcome| outcome.record.clone()).collect();
        failures.sort_by_key(DownloadRecord::key);
        let summary = output::RunSummary::from_stats(scan.len(), excluded, &stats);
        output::print_completion_summary(&summary, &failures, &output_root, &index_path);
    }

    Ok(ProcessExit::Success)
}
