//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Kiln - lock-file restore engine
///
/// Resolves project references from a lock file and restores packages
/// through a disk cache shared safely between concurrent processes.
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "KILN_CONFIG")]
    pub config: Option<PathBuf>,

    /// HTTP cache directory (overrides config)
    #[arg(long, global = true, env = "KILN_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a dependency name to a local project
    Resolve(ResolveArgs),

    /// Restore every library in a project's lock file
    Restore(RestoreArgs),

    /// Fetch a single URI through the HTTP cache
    Fetch(FetchArgs),

    /// Inspect or clear the HTTP cache
    Cache(CacheArgs),
}

/// Arguments for the resolve command
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Dependency name as recorded in the lock file
    pub name: String,

    /// Project directory holding the lock file (defaults to current directory)
    #[arg(short, long)]
    pub project: Option<PathBuf>,
}

/// Arguments for the restore command
#[derive(Parser, Debug)]
pub struct RestoreArgs {
    /// Project directory holding the lock file (defaults to current directory)
    #[arg(short, long)]
    pub project: Option<PathBuf>,

    /// Source name from config (defaults to the first configured source)
    #[arg(short, long)]
    pub source: Option<String>,

    /// Maximum cache age in seconds (0 bypasses the cache)
    #[arg(long)]
    pub max_age: Option<u64>,

    /// Maximum concurrent downloads
    #[arg(long)]
    pub parallel: Option<usize>,
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Absolute URI to fetch
    pub uri: String,

    /// Cache key for the content
    #[arg(short, long)]
    pub key: String,

    /// Base URI that owns the cache folder (defaults to the URI's parent)
    #[arg(long)]
    pub base: Option<String>,

    /// Maximum cache age in seconds (0 bypasses the cache)
    #[arg(long)]
    pub max_age: Option<u64>,

    /// Write the content to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show the cache directory
    Path,

    /// List cached entries
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove cached entries
    ///
    /// Entries another process still has open are kept, and scratch
    /// downloads left for over an hour are removed. The `.dat.lock` file
    /// beside each entry is never removed: concurrent processes serialize
    /// on it, so deleting it could let two writers in at once.
    Clear {
        /// Only remove entries older than N seconds
        #[arg(long)]
        older_than: Option<u64>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
