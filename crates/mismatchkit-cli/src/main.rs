//! mismatchkit CLI
//!
//! Command-line interface for preparing Mismatch Finder imports:
//! - Filtering a birth-year mismatch file against live Wikidata statements
//! - Fixing statement GUID delimiters
//! - Checking, splitting and uploading mismatch files

use anyhow::{anyhow, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use mismatchkit_core::AbsentOccupationPolicy;
use std::path::PathBuf;
use tracing::Level;

mod files;
mod filter;
mod upload;

#[derive(Parser)]
#[command(name = "mismatchkit")]
#[command(
    author,
    version,
    about = "mismatchkit: filter, check and upload Wikidata mismatch files"
)]
struct Cli {
    /// Log per-record decisions and requests
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep only the entities whose mismatches are worth reviewing.
    ///
    /// Every distinct item is fetched once from the Wikibase REST API
    /// (`WIKIDATA_REST_URL`, `WIKIDATA_USER_AGENT`); all rows of an entity
    /// with at least one flagged row are written to the output.
    Filter(FilterArgs),

    /// Replace the first `-` of each statement GUID with `$`.
    NormalizeGuids {
        /// Input mismatch file
        #[arg(short, long)]
        input: PathBuf,
        /// Output mismatch file
        #[arg(short, long)]
        output: PathBuf,
        /// JSON configuration (for custom GUID separators)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Check a mismatch file against the import formatting rules.
    Check {
        /// Mismatch file to check
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Split a file over the import size limit into numbered parts.
    Split {
        /// Mismatch file to split
        #[arg(short, long)]
        input: PathBuf,
        /// Directory for the parts (default: a directory named after the input)
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Size limit per part, in MiB
        #[arg(long, default_value_t = 10)]
        limit_mb: u64,
        /// Delete the input once the parts are written
        #[arg(long)]
        delete_input: bool,
    },

    /// Upload a mismatch file or a directory of them to Mismatch Finder.
    Upload(UploadArgs),
}

#[derive(Args)]
pub struct FilterArgs {
    /// Input mismatch file
    #[arg(short, long)]
    pub input: PathBuf,
    /// Output mismatch file (rows of the entities worth reviewing)
    #[arg(short, long)]
    pub output: PathBuf,
    /// CSV report of records and entities that could not be classified
    #[arg(long)]
    pub failures: Option<PathBuf>,
    /// JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Maximum number of entity fetches in flight
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Skip malformed input rows instead of failing
    #[arg(long)]
    pub partial: bool,
    /// Leave statement GUIDs as they are
    #[arg(long)]
    pub no_guid_fix: bool,
    /// How to treat entities with no occupation statement (no-signal | flag)
    #[arg(long)]
    pub absent_occupation: Option<AbsentOccupationPolicy>,
}

#[derive(Args)]
#[command(group(ArgGroup::new("source").required(true).args(["file", "dir"])))]
pub struct UploadArgs {
    /// Mismatch Finder API token (default: $MISMATCH_FINDER_TOKEN)
    #[arg(long)]
    pub access_token: Option<String>,
    /// A single mismatch file
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// A directory containing only mismatch files
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Name of the external source (at most 100 characters)
    #[arg(long)]
    pub external_source: String,
    /// Description of the import (at most 350 characters)
    #[arg(long)]
    pub description: Option<String>,
    /// URL of the external source
    #[arg(long)]
    pub external_source_url: Option<String>,
    /// Date the mismatches expire (YYYY-MM-DD)
    #[arg(long)]
    pub expires: Option<String>,
    /// Request timeout in seconds
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        Level::DEBUG
    } else if quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Filter(args) => filter::cmd_filter(&args).await,
        Commands::NormalizeGuids {
            input,
            output,
            config,
        } => files::cmd_normalize_guids(&input, &output, config.as_deref()),
        Commands::Check { input } => {
            if files::cmd_check(&input)? {
                Ok(())
            } else {
                Err(anyhow!("{} does not meet the import requirements", input.display()))
            }
        }
        Commands::Split {
            input,
            out_dir,
            limit_mb,
            delete_input,
        } => files::cmd_split(&input, out_dir.as_deref(), limit_mb, delete_input),
        Commands::Upload(args) => upload::cmd_upload(&args).await,
    }
}
