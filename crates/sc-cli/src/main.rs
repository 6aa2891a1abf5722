//! CLI entry point for sibscan.
//!
//! This binary finds file-synchronization conflict copies under a directory,
//! groups each copy with the original it conflicts over, and reports the
//! groups that still need attention.
//!
//! # Usage
//!
//! ```bash
//! sibscan [OPTIONS] <COMMAND>
//!
//! # Scan and list groups as they are found
//! sibscan scan ~/Sync
//!
//! # Write a JSON report
//! sibscan report ~/Sync --format json --output conflicts.json
//!
//! # Show the original a conflict copy belongs to
//! sibscan canonical 'notes.sync-conflict-20230723-000249-ONMECE6.md'
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod describe;

use std::io::{self, Write};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{WrapErr, eyre};
use sc_core::{Config, ConfigError, FxHashSet, ProgressSnapshot, canonical_path, conflict_stamp};
use sc_scanner::{
    MemberKind, MembershipChange, ScanConfig as ScannerConfig, ScanSession, SessionEvent,
    SibshipId, SibshipRegistry, StatsSnapshot, WalkReport,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::describe::{GroupView, format_size};

/// How long the consuming loop waits for an event before looking again.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Characters of the current directory shown in the progress line.
const PROGRESS_DIR_CHARS: usize = 40;

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Find sync-conflict copies and group them with their originals.
#[derive(Parser)]
#[command(name = "sibscan", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file.
    #[arg(short, long, global = true, env = "SIBSCAN_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Directory name to leave out of the walk (repeatable).
    #[arg(long = "skip-dir", global = true, value_name = "NAME")]
    skip_dirs: Vec<String>,

    /// Skip hidden files and directories.
    #[arg(long, global = true)]
    skip_hidden: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Scan a directory and list conflict groups as they are found.
    Scan {
        /// Directory to scan (defaults to the configured root, then `.`).
        #[arg(env = "SIBSCAN_PATH")]
        path: Option<Utf8PathBuf>,

        /// Don't print the progress line.
        #[arg(short, long)]
        quiet: bool,
    },

    /// Scan a directory and write a report of the conflict groups.
    Report {
        /// Directory to scan (defaults to the configured root, then `.`).
        #[arg(env = "SIBSCAN_PATH")]
        path: Option<Utf8PathBuf>,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Json)]
        format: ReportFormat,

        /// Output file (defaults to stdout).
        #[arg(short, long)]
        output: Option<Utf8PathBuf>,

        /// Include groups with at most one remaining file.
        #[arg(long)]
        all: bool,
    },

    /// Print the original path each conflict copy belongs to.
    Canonical {
        /// Paths to normalize.
        #[arg(required = true)]
        paths: Vec<Utf8PathBuf>,
    },
}

/// Report output format.
#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    /// JSON format.
    Json,
    /// CSV format.
    Csv,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default. Logs go
/// to stderr so reports on stdout stay clean.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},ignore=warn,globset=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(use_ansi)
                .with_writer(io::stderr),
        )
        .with(filter)
        .init();
}

/// Builds a [`Config`] from the configuration file and CLI arguments.
///
/// The scan root is the first of: the `path` argument, the configured root,
/// the current directory. It is made absolute and must be a directory.
fn build_config(cli: &Cli, path: Option<&Utf8Path>) -> color_eyre::Result<Config> {
    let mut config = match &cli.config {
        Some(file) => Config::load(file)
            .wrap_err_with(|| format!("Failed to load configuration from {file}"))?,
        None => Config::default(),
    };

    let root = match path {
        Some(path) => path.to_owned(),
        None if !config.scan.root_path.as_str().is_empty() => config.scan.root_path.clone(),
        None => Utf8PathBuf::from("."),
    };
    let root = absolute(&root)?;

    if !root.is_dir() {
        return Err(ConfigError::MissingDirectory(root).into());
    }

    config.scan.root_path = root;
    config.scan.skip_dirs.extend(cli.skip_dirs.iter().cloned());
    config.scan.skip_hidden |= cli.skip_hidden;
    config.validate()?;

    Ok(config)
}

/// Makes `path` absolute without resolving symbolic links.
fn absolute(path: &Utf8Path) -> color_eyre::Result<Utf8PathBuf> {
    let absolute = std::path::absolute(path.as_std_path())
        .wrap_err_with(|| format!("Cannot resolve path: {path}"))?;
    Utf8PathBuf::from_path_buf(absolute)
        .map_err(|p| eyre!("Path is not valid UTF-8: {}", p.display()))
}

/// First error hit while printing membership changes to stdout.
type OutputFailure = Arc<OnceLock<io::Error>>;

/// Prints membership changes as groups form.
///
/// After the first failed write nothing more is printed and the error is kept
/// in `failure` for the command to report.
struct ChangePrinter<W> {
    out: W,
    announced: FxHashSet<SibshipId>,
    failure: OutputFailure,
}

impl<W: Write> ChangePrinter<W> {
    fn new(out: W, failure: OutputFailure) -> Self {
        Self {
            out,
            announced: FxHashSet::default(),
            failure,
        }
    }

    fn on_change(&mut self, change: &MembershipChange<'_>) {
        if self.failure.get().is_some() {
            return;
        }
        if let Err(err) = self.print(change) {
            debug!(error = %err, "Stopped printing membership changes");
            let _ = self.failure.set(err);
        }
    }

    fn print(&mut self, change: &MembershipChange<'_>) -> io::Result<()> {
        let id = change.sibship.id();
        if self.announced.insert(id) {
            writeln!(self.out, "{id} {}", change.sibship.canonical())?;
        }
        let tag = match change.kind {
            MemberKind::Canonical => "original",
            MemberKind::Conflict => "conflict",
        };
        writeln!(self.out, "    {tag:<8} {}", change.path)
    }
}

/// Starts a session; with `changes` set, its registry prints every
/// membership change and records a failed write there.
fn start_session(
    config: &Config,
    changes: Option<&OutputFailure>,
) -> color_eyre::Result<ScanSession> {
    let mut registry = SibshipRegistry::new();

    if let Some(failure) = changes {
        let mut printer = ChangePrinter::new(io::stdout(), Arc::clone(failure));
        registry = registry
            .with_listener(move |change: &MembershipChange<'_>| printer.on_change(change));
    }

    ScanSession::start(ScannerConfig::from_settings(config), registry)
        .map_err(|e| eyre!("Failed to start scan: {e}"))
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Runs a scan, printing groups as they form and a summary at the end.
async fn run_scan(config: &Config, quiet: bool) -> color_eyre::Result<()> {
    info!(root = %config.scan.root_path, "Starting scan");

    let failure = OutputFailure::default();
    let mut session = start_session(config, Some(&failure))?;
    let interrupted = consume(&mut session, !quiet, Some(&failure)).await;

    let (report, registry) = session
        .join()
        .map_err(|e| eyre!("Scan failed: {e}"))?;

    if let Some(err) = failure.get() {
        return Err(eyre!("Cannot write scan output: {err}"));
    }

    let groups: Vec<GroupView> = registry
        .unresolved()
        .map(|sibship| GroupView::new(&registry, sibship, &config.display))
        .collect();

    print_groups(&groups)?;
    print_walk_summary(&report, registry.len(), groups.len())?;

    if interrupted {
        warn!("Scan was interrupted; results are incomplete");
    }

    Ok(())
}

/// Generates a report of the conflict groups.
async fn run_report(
    config: &Config,
    format: ReportFormat,
    output: Option<&Utf8Path>,
    all: bool,
) -> color_eyre::Result<()> {
    info!(root = %config.scan.root_path, "Generating report");

    let mut session = start_session(config, None)?;
    let interrupted = consume(&mut session, false, None).await;
    if interrupted {
        return Err(eyre!("Scan was interrupted; no report written"));
    }

    let (report, registry) = session
        .join()
        .map_err(|e| eyre!("Scan failed: {e}"))?;

    let groups: Vec<GroupView> = registry
        .iter()
        .filter(|sibship| all || registry.extant_count(sibship.id()) > 1)
        .map(|sibship| GroupView::new(&registry, sibship, &config.display))
        .collect();

    let content = match format {
        ReportFormat::Json => generate_json_report(&config.scan.root_path, &report.stats, &groups)?,
        ReportFormat::Csv => generate_csv_report(&groups),
    };

    if let Some(output_path) = output {
        std::fs::write(output_path.as_std_path(), &content)?;
        info!(path = %output_path, groups = groups.len(), "Report written");
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        write!(handle, "{content}")?;
    }

    Ok(())
}

/// Prints the canonical path of each argument.
fn run_canonical(paths: &[Utf8PathBuf]) -> color_eyre::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    for path in paths {
        let canonical = canonical_path(path);
        match path.file_name().and_then(conflict_stamp) {
            Some(stamp) => writeln!(
                handle,
                "{canonical}\t{} {}",
                stamp.timestamp(),
                stamp.device
            )?,
            None => writeln!(handle, "{canonical}")?,
        }
    }

    Ok(())
}

/// Polls the session until the walk has finished, Ctrl-C is pressed, or
/// `output` records a failed write.
///
/// Returns `true` if the scan was stopped early.
async fn consume(
    session: &mut ScanSession,
    show_progress: bool,
    output: Option<&OutputFailure>,
) -> bool {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            result = &mut ctrl_c, if !interrupted => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                warn!("Interrupted, stopping scan");
                session.cancel();
                interrupted = true;
            }
            event = tokio::time::timeout(POLL_INTERVAL, session.next()) => match event {
                Ok(Some(SessionEvent::Progress(snapshot))) => {
                    if show_progress {
                        print_progress(&snapshot);
                    }
                }
                Ok(Some(SessionEvent::Conflict { .. })) | Err(_) => {}
                Ok(None) => break,
            },
        }

        if !interrupted && output.is_some_and(|failure| failure.get().is_some()) {
            warn!("Standard output is closed, stopping scan");
            session.cancel();
            interrupted = true;
        }
    }

    interrupted
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

/// Rewrites the progress line on stderr.
fn print_progress(snapshot: &ProgressSnapshot) {
    let stderr = io::stderr();
    let mut handle = stderr.lock();

    if snapshot.is_terminal() {
        let _ = writeln!(handle, "\r\x1b[2KScanned {} entries", snapshot.examined);
        return;
    }

    let directory = snapshot
        .directory
        .as_deref()
        .map(|dir| tail_chars(dir.as_str(), PROGRESS_DIR_CHARS))
        .unwrap_or_default();

    let _ = write!(
        handle,
        "\r\x1b[2K{:>6.0}/s  scanned {}  left here {}  {directory}",
        snapshot.rate, snapshot.examined, snapshot.remaining
    );
    let _ = handle.flush();
}

/// Returns the last `max` characters of `s`, prefixed with `...` if cut.
fn tail_chars(s: &str, max: usize) -> String {
    let count = s.chars().count();
    if count <= max {
        return s.to_owned();
    }
    let tail: String = s.chars().skip(count - max).collect();
    format!("...{tail}")
}

/// Prints the unresolved groups with their member details.
fn print_groups(groups: &[GroupView]) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    if groups.is_empty() {
        writeln!(handle)?;
        writeln!(handle, "No unresolved conflicts.")?;
        return Ok(());
    }

    writeln!(handle)?;
    writeln!(handle, "Unresolved Conflicts")?;
    writeln!(handle, "====================")?;

    for group in groups {
        writeln!(handle)?;
        let mut flags = Vec::new();
        if let Some(size) = group.same_size {
            flags.push(format!("same size: {}", format_size(size)));
        }
        if let Some(hash) = &group.same_content {
            flags.push(format!("same content: {hash}"));
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        writeln!(handle, "{} ({} files){flags}", group.canonical, group.extant)?;

        for member in &group.members {
            let name = member.path.file_name().unwrap_or(member.path.as_str());
            if !member.exists {
                writeln!(handle, "  {name:<50} (missing)")?;
                continue;
            }
            writeln!(
                handle,
                "  {name:<50} {:>10}  {:<19}  {}",
                member.size.map(format_size).unwrap_or_default(),
                member.modified.as_deref().unwrap_or(""),
                member.hash.as_deref().unwrap_or("-"),
            )?;
        }
    }

    Ok(())
}

/// Prints walk statistics and any errors encountered.
fn print_walk_summary(report: &WalkReport, groups: usize, unresolved: usize) -> io::Result<()> {
    let stats = &report.stats;
    {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle)?;
        writeln!(handle, "Entries examined:   {}", stats.examined)?;
        writeln!(handle, "Directories:        {}", stats.directories)?;
        writeln!(handle, "Conflict copies:    {}", stats.conflicts)?;
        writeln!(handle, "Groups:             {groups} ({unresolved} unresolved)")?;
        if report.cancelled {
            writeln!(handle, "Walk stopped early.")?;
        }
    }

    if !report.errors.is_empty() {
        let stderr = io::stderr();
        let mut handle = stderr.lock();
        writeln!(handle)?;
        writeln!(handle, "Errors ({}):", report.errors.len())?;
        for error in &report.errors {
            writeln!(handle, "  {error}")?;
        }
    }

    Ok(())
}

/// Generates a JSON report.
fn generate_json_report(
    root: &Utf8Path,
    stats: &StatsSnapshot,
    groups: &[GroupView],
) -> color_eyre::Result<String> {
    #[derive(serde::Serialize)]
    struct Report<'a> {
        root: &'a Utf8Path,
        stats: &'a StatsSnapshot,
        groups: &'a [GroupView],
    }

    let report = Report {
        root,
        stats,
        groups,
    };
    serde_json::to_string_pretty(&report)
        .map_err(|e| eyre!("Failed to serialize JSON: {}", e))
}

/// Generates a CSV report with one row per group member.
fn generate_csv_report(groups: &[GroupView]) -> String {
    use std::fmt::Write;

    let mut output =
        String::from("canonical,extant,path,is_canonical,exists,size,modified,hash,conflict\n");

    for group in groups {
        let canonical = escape_csv(group.canonical.as_str());
        for member in &group.members {
            let _ = writeln!(
                output,
                "{canonical},{},{},{},{},{},{},{},{}",
                group.extant,
                escape_csv(member.path.as_str()),
                member.canonical,
                member.exists,
                member.size.map(|s| s.to_string()).unwrap_or_default(),
                member.modified.as_deref().unwrap_or(""),
                member.hash.as_deref().unwrap_or(""),
                member.conflict.as_deref().unwrap_or(""),
            );
        }
    }

    output
}

/// Escapes a string for CSV output.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_owned()
    }
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Route to appropriate command
    match &cli.command {
        Commands::Scan { path, quiet } => {
            let config = build_config(&cli, path.as_deref())?;
            run_scan(&config, *quiet).await
        }
        Commands::Report {
            path,
            format,
            output,
            all,
        } => {
            let config = build_config(&cli, path.as_deref())?;
            run_report(&config, *format, output.as_deref(), *all).await
        }
        Commands::Canonical { paths } => run_canonical(paths),
    }
}
