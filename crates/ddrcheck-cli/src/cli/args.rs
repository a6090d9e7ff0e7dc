use clap::{Parser, Subcommand};
use ddrcheck_core::config::AppConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ddrcheck",
    version,
    about = "Validate delimited data extracts against their data dictionary"
)]
pub struct Cli {
    /// Root directory holding one folder per scope
    #[arg(long, global = true)]
    pub scopes_dir: Option<PathBuf>,

    /// tracing filter, e.g. `info` or `ddrcheck_core=debug`
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

impl Cli {
    /// Flags win over `DDRCHECK_*` environment values.
    pub fn apply_overrides(&self, cfg: &mut AppConfig) {
        if let Some(dir) = &self.scopes_dir {
            cfg.scopes_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            cfg.log_level = level.clone();
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a sample scope, sample input files and a ddr.yaml template
    Init(InitArgs),
    /// List configured scopes
    Scopes,
    /// List the versions of a scope
    Versions(VersionsArgs),
    /// Run every test against every expected file of a scope version
    Run(RunArgs),
    /// Page through a file's cached rows, optionally with a SELECT
    Query(QueryArgs),
    /// Manage the per-file SQLite caches of an input directory
    Cache(CacheArgs),
    /// Generate structure files from data dictionary sheets
    Import(ImportArgs),
    /// Print version
    Version,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InitArgs {
    /// Where to write the sample input files
    #[arg(long, default_value = "demo-input")]
    pub input: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct VersionsArgs {
    #[arg(long)]
    pub scope: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub scope: String,

    #[arg(long = "version")]
    pub scope_version: String,

    /// Directory holding the data files
    #[arg(long)]
    pub input: PathBuf,

    /// Maximum concurrent tests (defaults to DDRCHECK_WORKERS or the CPU count)
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Output format: text | json
    #[arg(long, default_value = "text")]
    pub format: String,

    /// Also write the JSON report to this path
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Write one CSV of violations per failing cell into this directory
    #[arg(long)]
    pub export_errors: Option<PathBuf>,

    /// Print the violation tree under each failing cell
    #[arg(long)]
    pub show_errors: bool,

    /// Violation lines printed per cell with --show-errors
    #[arg(long, default_value_t = ddrcheck_core::report::errors::DEFAULT_MAX_LINES)]
    pub max_lines: usize,

    /// Treat warnings as failures for the exit code
    #[arg(long)]
    pub strict: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct QueryArgs {
    #[arg(long)]
    pub scope: String,

    #[arg(long = "version")]
    pub scope_version: String,

    /// Expected file name (the structure folder)
    #[arg(long)]
    pub file: String,

    #[arg(long)]
    pub input: PathBuf,

    /// SELECT over the `data` table; all rows when omitted
    #[arg(long)]
    pub sql: Option<String>,

    /// 0-based page number
    #[arg(long, default_value_t = 0)]
    pub page: usize,

    #[arg(long)]
    pub page_size: Option<usize>,

    /// Output format: text | json
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(Parser, Debug, Clone)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub cmd: CacheSub,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheSub {
    /// Parse every expected file into its SQLite cache
    Build(CacheBuildArgs),
    /// Delete the cache directory of an input folder
    Clear(CacheClearArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct CacheBuildArgs {
    #[arg(long)]
    pub scope: String,

    #[arg(long = "version")]
    pub scope_version: String,

    #[arg(long)]
    pub input: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CacheClearArgs {
    #[arg(long)]
    pub input: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ImportArgs {
    #[arg(long)]
    pub scope: String,

    #[arg(long = "version")]
    pub scope_version: String,

    /// Data dictionary workbook, or a directory of per-sheet CSV exports
    #[arg(long)]
    pub sheets: PathBuf,
}
