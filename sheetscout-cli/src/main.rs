use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use sheetscout::{
    metrics::ScanStats, CalamineSource, EventSink, FailurePolicy, MatchMode, MatchRecord,
    ProgressUpdate, RowContextPolicy, ScanConfig, ScanRequest, Scanner, SearchError,
};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Which cells of a matching row are printed as its context
#[derive(Clone, Copy, ValueEnum)]
enum ContextArg {
    /// Every cell of the row
    All,
    /// Every cell except column A
    SkipFirst,
    /// Every cell except the matching one
    SkipMatched,
}

impl From<ContextArg> for RowContextPolicy {
    fn from(arg: ContextArg) -> Self {
        match arg {
            ContextArg::All => RowContextPolicy::AllCells,
            ContextArg::SkipFirst => RowContextPolicy::SkipFirstColumn,
            ContextArg::SkipMatched => RowContextPolicy::SkipMatchedColumn,
        }
    }
}

#[derive(Parser)]
struct CliSearchArgs {
    /// Keyword to search for
    #[arg(short = 'k', long)]
    keyword: Option<String>,

    /// Root directory to search in
    #[arg(short = 'd', long, default_value = ".")]
    root: PathBuf,

    /// Treat the keyword as a case-insensitive regular expression
    #[arg(short = 'r', long)]
    regex: bool,

    /// Number of workbooks searched at the same time
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Report unreadable workbooks and keep scanning instead of aborting
    #[arg(long)]
    keep_going: bool,

    /// Workbook extensions to include (e.g. xlsx,xlsm)
    #[arg(short = 'e', long)]
    extensions: Option<String>,

    /// Patterns to ignore (glob format)
    #[arg(short, long)]
    ignore: Vec<String>,

    /// Cells printed as the row context of a match
    #[arg(long, value_enum)]
    context: Option<ContextArg>,

    /// Also search Office lock files (~$Book.xlsx)
    #[arg(long)]
    include_lock_files: bool,

    /// Print one JSON object per match
    #[arg(long)]
    json: bool,

    /// Show only statistics, not matches
    #[arg(short, long)]
    stats: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Configuration file layered over the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl CliSearchArgs {
    fn to_config(&self) -> ScanConfig {
        let defaults = ScanConfig::default();
        ScanConfig {
            keyword: self.keyword.clone().unwrap_or_default(),
            root_path: self.root.clone(),
            mode: if self.regex {
                MatchMode::Regex
            } else {
                MatchMode::Literal
            },
            concurrency: self.threads.unwrap_or(defaults.concurrency),
            failure_policy: if self.keep_going {
                FailurePolicy::Continue
            } else {
                FailurePolicy::FailFast
            },
            extensions: self
                .extensions
                .as_ref()
                .map(|e| {
                    e.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.extensions),
            ignore_patterns: self.ignore.clone(),
            skip_lock_files: !self.include_lock_files,
            row_context: self.context.map(Into::into).unwrap_or_default(),
            log_level: self.log_level.clone().unwrap_or(defaults.log_level),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Search workbooks for a keyword
    Search(Box<CliSearchArgs>),

    /// Print the effective configuration as YAML
    ShowConfig {
        /// Configuration file layered over the default locations
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Search(args) => {
            let config = ScanConfig::load_from(args.config.as_deref())
                .context("Failed to load configuration")?
                .merge_with_cli(args.to_config());
            init_logging(&config.log_level);
            run_search(&config, &args)
        }
        Commands::ShowConfig { config } => {
            let config =
                ScanConfig::load_from(config.as_deref()).context("Failed to load configuration")?;
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_search(config: &ScanConfig, args: &CliSearchArgs) -> anyhow::Result<()> {
    let request = ScanRequest::new(config)?;
    debug!("Effective configuration: {:?}", config);

    let sink = Arc::new(TerminalSink::new(
        args.json,
        args.stats,
        args.no_progress || args.json,
    ));
    let scanner = Scanner::new(Arc::new(CalamineSource::new()), sink.clone());
    scanner.start_scan(request)?;
    scanner.wait();

    sink.finish()
}

/// Prints matches as they arrive and drives the progress bar
struct TerminalSink {
    json: bool,
    stats_only: bool,
    bar: ProgressBar,
    state: Mutex<SinkState>,
}

#[derive(Default)]
struct SinkState {
    files_with_matches: HashSet<PathBuf>,
    failed_files: usize,
    total_matches: Option<usize>,
    aborted: Option<SearchError>,
    stats: Option<ScanStats>,
}

impl TerminalSink {
    fn new(json: bool, stats_only: bool, hide_progress: bool) -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
        if hide_progress {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} workbooks {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }

        Self {
            json,
            stats_only,
            bar,
            state: Mutex::new(SinkState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn print_match(&self, record: &MatchRecord) {
        let line = if self.json {
            match serde_json::to_string(record) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to encode match as JSON: {}", e);
                    return;
                }
            }
        } else {
            format!(
                "{} [{}!{}] {} | {}",
                record.file_path.display().to_string().blue(),
                record.sheet_name,
                record.cell.to_string().green(),
                record.cell_content,
                record.row_context
            )
        };
        self.bar.suspend(|| println!("{}", line));
    }

    /// Clears the progress bar and reports the end of the run
    fn finish(&self) -> anyhow::Result<()> {
        self.bar.finish_and_clear();
        let mut state = self.state();

        if let Some(error) = state.aborted.take() {
            return Err(anyhow!(error));
        }
        let Some(total_matches) = state.total_matches else {
            bail!("Scan ended without completing");
        };

        let summary = format!(
            "Found {} matches in {} files",
            total_matches,
            state.files_with_matches.len()
        );
        // Keep stdout parseable in JSON mode
        if self.json {
            eprintln!("{}", summary);
        } else {
            println!("\n{}", summary);
        }
        if state.failed_files > 0 {
            eprintln!(
                "{}",
                format!("Skipped {} unreadable workbooks", state.failed_files).yellow()
            );
        }
        if self.stats_only {
            if let Some(stats) = &state.stats {
                print_stats(stats);
            }
        }
        Ok(())
    }
}

impl EventSink for TerminalSink {
    fn on_match(&self, _index: usize, record: MatchRecord) {
        if !self.stats_only {
            self.print_match(&record);
        }
        self.state().files_with_matches.insert(record.file_path);
    }

    fn on_progress(&self, progress: ProgressUpdate) {
        self.bar.set_length(progress.total_files as u64);
        self.bar.set_position(progress.completed_files as u64);
        if let Some(name) = progress.current_file.file_name() {
            self.bar.set_message(name.to_string_lossy().into_owned());
        }
    }

    fn on_error(&self, error: SearchError) {
        match error {
            SearchError::RunAborted { .. } => {
                self.state().aborted = Some(error);
            }
            other => {
                self.bar.suspend(|| eprintln!("{} {}", "warning:".yellow(), other));
                self.state().failed_files += 1;
            }
        }
    }

    fn on_completed(&self, total_matches: usize) {
        self.state().total_matches = Some(total_matches);
    }

    fn on_stats(&self, stats: ScanStats) {
        self.state().stats = Some(stats);
    }
}

fn print_stats(stats: &ScanStats) {
    println!(
        "Searched {} of {} workbooks ({} failed): {} sheets, {} rows, {} cells in {:.2?}",
        stats.files_searched,
        stats.files_discovered,
        stats.files_failed,
        stats.sheets_read,
        stats.rows_read,
        stats.cells_scanned,
        stats.elapsed
    );
}
