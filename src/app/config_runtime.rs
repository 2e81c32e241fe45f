use anyhow::{Result, bail};
use clap::{ArgMatches, CommandFactory, FromArgMatches, parser::ValueSource};
use textbook_core::MIN_PDF_SIZE_BYTES;
use textbook_core::download::CONNECT_TIMEOUT_SECS;

use crate::app_config::{FileConfig, VerbositySetting};
use crate::cli::Cli;

/// Which flags were given explicitly on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) output_dir: bool,
    pub(crate) concurrency: bool,
    pub(crate) max_retries: bool,
    pub(crate) timeout: bool,
    pub(crate) verbose: bool,
    pub(crate) quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HttpTimeoutSettings {
    pub(crate) connect_secs: u64,
    pub(crate) read_secs: u64,
}

pub(crate) fn parse_cli_with_sources() -> (Cli, CliValueSources) {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    (cli, sources_from_matches(&matches))
}

fn sources_from_matches(matches: &ArgMatches) -> CliValueSources {
    CliValueSources {
        output_dir: is_commandline_value(matches, "output_dir"),
        concurrency: is_commandline_value(matches, "concurrency"),
        max_retries: is_commandline_value(matches, "max_retries"),
        timeout: is_commandline_value(matches, "timeout"),
        verbose: is_commandline_value(matches, "verbose"),
        quiet: is_commandline_value(matches, "quiet"),
    }
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Fills every flag not given on the command line from the config file.
pub(crate) fn apply_config_defaults(
    mut cli: Cli,
    cli_sources: &CliValueSources,
    file_config: Option<&FileConfig>,
) -> Result<Cli> {
    if let Some(file_config) = file_config {
        if !cli_sources.output_dir
            && cli.output_dir.is_none()
            && let Some(output_dir) = &file_config.output_dir
        {
            cli.output_dir = Some(output_dir.clone());
        }

        if !cli_sources.concurrency
            && let Some(concurrency) = file_config.concurrency
        {
            cli.concurrency = concurrency;
        }

        if !cli_sources.max_retries
            && let Some(max_retries) = file_config.max_retries
        {
            cli.max_retries = max_retries;
        }

        if !cli_sources.timeout
            && let Some(timeout) = file_config.read_timeout_secs
        {
            cli.timeout = timeout;
        }

        if !cli_sources.verbose
            && !cli_sources.quiet
            && let Some(verbosity) = file_config.verbosity
        {
            apply_config_verbosity(&mut cli, verbosity);
        }
    }

    if !(1..=32).contains(&cli.concurrency) {
        bail!(
            "Invalid effective concurrency value: {}. Expected range: 1..=32",
            cli.concurrency
        );
    }

    Ok(cli)
}

fn apply_config_verbosity(cli: &mut Cli, verbosity: VerbositySetting) {
    let (quiet, verbose) = match verbosity {
        VerbositySetting::Default => (false, 0),
        VerbositySetting::Verbose => (false, 1),
        VerbositySetting::Quiet => (true, 0),
        VerbositySetting::Debug => (false, 2),
    };
    cli.quiet = quiet;
    cli.verbose = verbose;
}

pub(crate) fn resolve_http_timeouts(cli: &Cli, file_config: Option<&FileConfig>) -> HttpTimeoutSettings {
    HttpTimeoutSettings {
        connect_secs: file_config
            .and_then(|c| c.connect_timeout_secs)
            .unwrap_or(CONNECT_TIMEOUT_SECS),
        read_secs: cli.timeout,
    }
}

pub(crate) fn resolve_min_pdf_size(file_config: Option<&FileConfig>) -> u64 {
    file_config
        .and_then(|c| c.min_pdf_size_bytes)
        .unwrap_or(MIN_PDF_SIZE_BYTES)
}

pub(crate) fn resolve_default_log_level(cli: &Cli) -> &'static str {
    if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

pub(crate) fn should_force_cli_log_level(cli_sources: &CliValueSources) -> bool {
    cli_sources.verbose || cli_sources.quiet
}
