use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::errors::{SearchError, SearchResult};
use crate::search::matcher::{MatchMode, Matcher};

/// Configuration for a scan.
///
/// # Configuration Locations
///
/// Sources are layered in order of increasing precedence:
/// 1. Global `$CONFIG_DIR/sheetscout/config.yaml`
/// 2. Local `.sheetscout.yaml` in the current directory
/// 3. Custom config file specified via `--config`
/// 4. `SHEETSCOUT_*` environment variables (e.g. `SHEETSCOUT_CONCURRENCY=8`)
///
/// Command-line arguments are applied last through [`ScanConfig::merge_with_cli`].
///
/// # Configuration Format
///
/// ```yaml
/// keyword: "invoice"
/// root_path: "/data/finance"
/// mode: regex                 # literal | regex
/// concurrency: 4
/// failure_policy: fail-fast   # fail-fast | continue
/// extensions: ["xlsx", "xlsm"]
/// ignore_patterns: ["**/archive/**"]
/// skip_lock_files: true
/// row_context: all-cells      # all-cells | skip-first-column | skip-matched-column
/// log_level: "warn"
/// ```
///
/// A config is only a description. [`ScanRequest::new`] validates it and compiles
/// the keyword once before a scan may start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// The keyword to look for
    #[serde(default)]
    pub keyword: String,

    /// Root directory to start the scan from
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,

    /// Literal substring or case-insensitive regex
    #[serde(default)]
    pub mode: MatchMode,

    /// Number of workbooks searched at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: NonZeroUsize,

    /// What happens to the run when one workbook cannot be read
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Recognized workbook extensions, compared case-insensitively
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Patterns to ignore (glob syntax)
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Skip Office owner files (`~$Book.xlsx`) left next to open workbooks
    #[serde(default = "default_true")]
    pub skip_lock_files: bool,

    /// Which cells make up the row context of a match
    #[serde(default)]
    pub row_context: RowContextPolicy,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Run-level reaction to a workbook that cannot be read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the run on the first failure and report it once
    #[default]
    FailFast,
    /// Report each failure and keep scanning the other files
    Continue,
}

/// Which cells of a matching row are joined into its context text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowContextPolicy {
    /// Every cell of the row, the matching cell included
    #[default]
    AllCells,
    /// Every cell except column A
    SkipFirstColumn,
    /// Every cell except the matching one
    SkipMatchedColumn,
}

impl RowContextPolicy {
    /// Builds the context text for a match in `column` (1-based)
    pub fn context(&self, cells: &[String], column: u32) -> String {
        let skip = match self {
            RowContextPolicy::AllCells => None,
            RowContextPolicy::SkipFirstColumn => Some(1),
            RowContextPolicy::SkipMatchedColumn => Some(column),
        };
        let parts: Vec<&str> = cells
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i as u32 + 1) != skip)
            .map(|(_, cell)| cell.as_str())
            .collect();
        parts.join(" ").trim().to_string()
    }
}

fn default_root_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_concurrency() -> NonZeroUsize {
    NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN)
}

fn default_extensions() -> Vec<String> {
    vec!["xlsx".to_string(), "xlsm".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            root_path: default_root_path(),
            mode: MatchMode::default(),
            concurrency: default_concurrency(),
            failure_policy: FailurePolicy::default(),
            extensions: default_extensions(),
            ignore_patterns: Vec::new(),
            skip_lock_files: true,
            row_context: RowContextPolicy::default(),
            log_level: default_log_level(),
        }
    }
}

impl ScanConfig {
    /// Creates a config for `keyword` under `root_path` with every other field defaulted
    pub fn new(keyword: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
        Self {
            keyword: keyword.into(),
            root_path: root_path.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration, layering an explicit file on top of the default locations
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        let default_files = [
            dirs::config_dir().map(|p| p.join("sheetscout/config.yaml")),
            Some(PathBuf::from(".sheetscout.yaml")),
        ];
        for path in default_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // An explicit file must exist
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(Environment::with_prefix("SHEETSCOUT").try_parsing(true));

        builder.build()?.try_deserialize()
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli_config: ScanConfig) -> Self {
        let defaults = ScanConfig::default();

        // CLI values take precedence over config file values
        if !cli_config.keyword.is_empty() {
            self.keyword = cli_config.keyword;
        }
        if cli_config.root_path != defaults.root_path {
            self.root_path = cli_config.root_path;
        }
        if cli_config.mode != defaults.mode {
            self.mode = cli_config.mode;
        }
        if cli_config.concurrency != defaults.concurrency {
            self.concurrency = cli_config.concurrency;
        }
        if cli_config.failure_policy != defaults.failure_policy {
            self.failure_policy = cli_config.failure_policy;
        }
        if cli_config.extensions != defaults.extensions {
            self.extensions = cli_config.extensions;
        }
        if !cli_config.ignore_patterns.is_empty() {
            self.ignore_patterns = cli_config.ignore_patterns;
        }
        if !cli_config.skip_lock_files {
            self.skip_lock_files = false;
        }
        if cli_config.row_context != defaults.row_context {
            self.row_context = cli_config.row_context;
        }
        if cli_config.log_level != defaults.log_level {
            self.log_level = cli_config.log_level;
        }
        self
    }

    /// Renders the configuration as YAML
    pub fn to_yaml(&self) -> SearchResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// A validated scan request.
///
/// Building one is the only place a keyword is checked or compiled, so every
/// configuration error surfaces here, before any file is touched.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub root_path: PathBuf,
    pub matcher: Matcher,
    pub concurrency: NonZeroUsize,
    pub failure_policy: FailurePolicy,
    /// Lowercase, without leading dots
    pub extensions: Vec<String>,
    pub ignore_patterns: Vec<Pattern>,
    pub skip_lock_files: bool,
    pub row_context: RowContextPolicy,
}

impl ScanRequest {
    pub fn new(config: &ScanConfig) -> SearchResult<Self> {
        let matcher = Matcher::new(&config.keyword, config.mode)?;

        if !config.root_path.is_dir() {
            return Err(SearchError::config_error(format!(
                "Root directory does not exist: {}",
                config.root_path.display()
            )));
        }

        let extensions: Vec<String> = config
            .extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        if extensions.is_empty() {
            return Err(SearchError::config_error(
                "At least one workbook extension is required",
            ));
        }

        let ignore_patterns = config
            .ignore_patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    SearchError::config_error(format!("Invalid ignore pattern '{}': {}", p, e))
                })
            })
            .collect::<SearchResult<Vec<_>>>()?;

        Ok(Self {
            root_path: config.root_path.clone(),
            matcher,
            concurrency: config.concurrency,
            failure_policy: config.failure_policy,
            extensions,
            ignore_patterns,
            skip_lock_files: config.skip_lock_files,
            row_context: config.row_context,
        })
    }
}
