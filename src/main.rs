//! treecache - cached project directory trees.
//!
//! Usage:
//!   treecache tree [PATH]          Show the (possibly cached) tree summary
//!   treecache stats                Show cache statistics
//!   treecache invalidate PATH      Drop entries related to PATH
//!   treecache clear                Empty the cache
//!   treecache sweep                Remove expired entries
//!   treecache --help               Show help

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result};
use tracing_subscriber::EnvFilter;

use treecache_cache::{CacheConfig, TreeCache};

#[derive(Parser)]
#[command(
    name = "treecache",
    version,
    about = "Cached project directory trees",
    long_about = "treecache scans a project directory once and serves the tree from \
                  memory or disk until it goes stale or is invalidated."
)]
struct Cli {
    /// Cache directory (defaults to the platform cache dir)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// JSON file with cache settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Get the tree for a directory, scanning only if needed
    Tree {
        /// Project root
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Ignore pattern (repeatable); replaces the defaults
        #[arg(short, long = "ignore", value_name = "PATTERN")]
        ignore: Vec<String>,

        /// Apply no ignore patterns at all
        #[arg(long, conflicts_with = "ignore")]
        no_ignore: bool,

        /// Rescan even if a fresh entry exists
        #[arg(short, long)]
        refresh: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show cache statistics
    Stats {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Remove entries rooted at, above, or below a path
    Invalidate {
        path: PathBuf,
    },

    /// Remove every entry
    Clear,

    /// Remove expired entries now
    Sweep,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cache = open_cache(cli.cache_dir, cli.config.as_deref())?;

    match cli.command {
        Command::Tree {
            path,
            ignore,
            no_ignore,
            refresh,
            format,
        } => {
            let patterns = if no_ignore {
                Some(Vec::new())
            } else if ignore.is_empty() {
                None
            } else {
                Some(ignore)
            };
            run_tree(&cache, &path, patterns.as_deref(), refresh, format)?;
        }
        Command::Stats { format } => {
            run_stats(&cache, format)?;
        }
        Command::Invalidate { path } => {
            let removed = cache.invalidate(&path);
            println!("Removed {} entr{}", removed, if removed == 1 { "y" } else { "ies" });
        }
        Command::Clear => {
            cache.clear().context("Failed to clear cache")?;
            println!("Cleared {}", cache.cache_dir().display());
        }
        Command::Sweep => {
            let report = cache.sweep();
            println!(
                "Removed {} memory and {} disk entries",
                report.memory_removed, report.disk_removed
            );
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Build the cache from an optional config file, then apply `--cache-dir`.
fn open_cache(cache_dir: Option<PathBuf>, config_path: Option<&Path>) -> Result<TreeCache> {
    let mut config = match config_path {
        Some(path) => CacheConfig::from_json_file(path)
            .with_context(|| format!("Invalid config file {}", path.display()))?,
        None => CacheConfig::default(),
    };
    if let Some(dir) = cache_dir {
        config.cache_dir = dir;
    }
    TreeCache::new(config).context("Failed to open cache")
}

/// Fetch a tree and print a summary.
fn run_tree(
    cache: &TreeCache,
    path: &Path,
    patterns: Option<&[String]>,
    refresh: bool,
    format: OutputFormat,
) -> Result<()> {
    let (tree, meta) = cache
        .get_tree(path, patterns, refresh)
        .with_context(|| format!("Failed to get tree for {}", path.display()))?;

    match format {
        OutputFormat::Text => {
            println!();
            println!("{}", "─".repeat(60));
            println!(" {} - {}", meta.root.display(), format_size(meta.total_size));
            println!(" {} files, {} directories", meta.file_count, meta.dir_count);
            println!(
                " Served from {} (scanned in {:.2}s)",
                meta.source,
                meta.scan_duration.as_secs_f64()
            );
            println!(" Structural hash {}", tree.structural_hash().to_hex());
            if !meta.ignore_patterns.is_empty() {
                println!(" Ignoring: {}", meta.ignore_patterns.join(", "));
            }
            println!("{}", "─".repeat(60));

            if meta.warning_count > 0 {
                println!();
                println!("{} warning(s) during scan", meta.warning_count);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "meta": meta,
                "source": meta.source.to_string(),
                "tree": &*tree,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn run_stats(cache: &TreeCache, format: OutputFormat) -> Result<()> {
    let stats = cache.get_stats();

    match format {
        OutputFormat::Text => {
            println!(" Cache directory: {}", cache.cache_dir().display());
            println!(" Disk entries:    {}", stats.disk_entries);
            println!(
                " Memory entries:  {} ({})",
                stats.memory_entries,
                format_size(stats.memory_bytes)
            );
            println!(
                " Hits/misses:     {}/{} ({:.0}%)",
                stats.hits,
                stats.misses,
                stats.hit_rate * 100.0
            );
            println!(" Evictions:       {}", stats.evictions);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
