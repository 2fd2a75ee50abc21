//! Cache command - inspect and clear the HTTP cache

use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::{KilnError, KilnResult};
use crate::fslock::{FileLock, OpenFileProbe, SharedLockProbe};
use crate::http::cache::file_age;
use crate::http::source::SCRATCH_DIR;
use crate::http::CACHE_FILE_SUFFIX;
use chrono::{DateTime, Utc};
use console::style;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> KilnResult<()> {
    let root = ConfigManager::cache_dir(config);

    match args.action {
        CacheAction::Path => {
            println!("{}", root.display());
            Ok(())
        }
        CacheAction::List { format } => list_entries(&root, format).await,
        CacheAction::Clear { older_than, yes } => {
            clear_entries(&root, older_than.map(Duration::from_secs), yes).await
        }
    }
}

/// Scratch files this old belong to no live download
const ABANDONED_SCRATCH_AGE: Duration = Duration::from_secs(60 * 60);

/// What a clear did
#[derive(Debug, Default, PartialEq, Eq)]
struct ClearStats {
    removed: usize,
    /// Entries another process still had open
    skipped: usize,
    /// Abandoned scratch downloads deleted
    scratch: usize,
}

/// One content file in the cache
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Per-base-URI folder name
    folder: String,
    key: String,
    path: PathBuf,
    size: u64,
    age: Duration,
    modified: DateTime<Utc>,
}

/// Scan `<root>/<folder>/<key>.dat`; hidden folders hold scratch files
fn scan(root: &Path) -> KilnResult<Vec<CacheEntry>> {
    let folders = match fs::read_dir(root) {
        Ok(folders) => folders,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(KilnError::io(format!("reading {}", root.display()), e)),
    };

    let mut entries = Vec::new();
    for folder in folders.flatten() {
        let folder_name = folder.file_name().to_string_lossy().into_owned();
        if folder_name.starts_with('.') || !folder.path().is_dir() {
            continue;
        }
        let files = fs::read_dir(folder.path())
            .map_err(|e| KilnError::io(format!("reading {}", folder.path().display()), e))?;
        for file in files.flatten() {
            let name = file.file_name().to_string_lossy().into_owned();
            let Some(key) = name.strip_suffix(CACHE_FILE_SUFFIX) else {
                continue;
            };
            let Ok(metadata) = file.metadata() else {
                continue;
            };
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            entries.push(CacheEntry {
                folder: folder_name.clone(),
                key: key.to_string(),
                path: file.path(),
                size: metadata.len(),
                age: file_age(&metadata),
                modified,
            });
        }
    }

    entries.sort_by(|a, b| (&a.folder, &a.key).cmp(&(&b.folder, &b.key)));
    Ok(entries)
}

async fn list_entries(root: &Path, format: OutputFormat) -> KilnResult<()> {
    let scan_root = root.to_path_buf();
    let entries = tokio::task::spawn_blocking(move || scan(&scan_root)).await??;

    if entries.is_empty() {
        println!("No cached entries in {}.", root.display());
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_entry_table(&entries),
        OutputFormat::Json => print_entry_json(&entries)?,
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}", entry.path.display());
            }
        }
    }

    Ok(())
}

fn print_entry_table(entries: &[CacheEntry]) {
    println!("{:<40} {:>12} {:<20}", "KEY", "SIZE", "MODIFIED");
    println!("{}", "-".repeat(74));

    let mut folder = None;
    for entry in entries {
        if folder != Some(&entry.folder) {
            println!("{}", style(&entry.folder).dim());
            folder = Some(&entry.folder);
        }
        println!(
            "{:<40} {:>12} {:<20}",
            entry.key,
            entry.size,
            entry.modified.format("%Y-%m-%d %H:%M")
        );
    }

    let total: u64 = entries.iter().map(|e| e.size).sum();
    println!();
    println!("Total: {} entries, {} bytes", entries.len(), total);
}

fn print_entry_json(entries: &[CacheEntry]) -> KilnResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson {
        folder: String,
        key: String,
        path: String,
        size: u64,
        age_secs: u64,
        modified: String,
    }

    let json_entries: Vec<EntryJson> = entries
        .iter()
        .map(|e| EntryJson {
            folder: e.folder.clone(),
            key: e.key.clone(),
            path: e.path.display().to_string(),
            size: e.size,
            age_secs: e.age.as_secs(),
            modified: e.modified.to_rfc3339(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json_entries)?);
    Ok(())
}

/// Delete an entry under its named lock unless a reader still holds it
fn remove_entry(entry: &CacheEntry, probe: &dyn OpenFileProbe) -> KilnResult<bool> {
    let _lock = FileLock::acquire(&entry.path)?;
    if probe.is_open_by_another_process(&entry.path) {
        debug!("{} is in use, skipping", entry.path.display());
        return Ok(false);
    }
    match fs::remove_file(&entry.path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(KilnError::io(
            format!("removing {}", entry.path.display()),
            e,
        )),
    }
}

/// Delete scratch files at least `min_age` old. Younger ones may still be
/// downloads in flight in another process.
fn sweep_scratch(root: &Path, min_age: Duration) -> KilnResult<usize> {
    let dir = root.join(SCRATCH_DIR);
    let files = match fs::read_dir(&dir) {
        Ok(files) => files,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(KilnError::io(format!("reading {}", dir.display()), e)),
    };

    let mut swept = 0;
    for file in files.flatten() {
        let Ok(metadata) = file.metadata() else {
            continue;
        };
        if !metadata.is_file() || file_age(&metadata) < min_age {
            continue;
        }
        match fs::remove_file(file.path()) {
            Ok(()) => swept += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(KilnError::io(
                    format!("removing {}", file.path().display()),
                    e,
                ))
            }
        }
    }
    Ok(swept)
}

/// Lock sidecars stay behind so every process keeps locking the same file
fn clear(root: &Path, older_than: Option<Duration>) -> KilnResult<ClearStats> {
    let entries: Vec<CacheEntry> = scan(root)?
        .into_iter()
        .filter(|e| older_than.is_none_or(|min| e.age >= min))
        .collect();

    let mut stats = ClearStats::default();
    for entry in &entries {
        if remove_entry(entry, &SharedLockProbe)? {
            stats.removed += 1;
        } else {
            stats.skipped += 1;
        }
    }

    let scratch_age = older_than.map_or(ABANDONED_SCRATCH_AGE, |age| age.max(ABANDONED_SCRATCH_AGE));
    stats.scratch = sweep_scratch(root, scratch_age)?;
    Ok(stats)
}

async fn clear_entries(root: &Path, older_than: Option<Duration>, yes: bool) -> KilnResult<()> {
    if !yes {
        print!("Remove cached entries in {}? [y/N] ", root.display());
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let clear_root = root.to_path_buf();
    let stats = tokio::task::spawn_blocking(move || clear(&clear_root, older_than)).await??;

    println!("{} removed {} entries", style("✓").green(), stats.removed);
    if stats.skipped > 0 {
        println!("  {} {} in use, kept", style("•").yellow(), stats.skipped);
    }
    if stats.scratch > 0 {
        println!(
            "  {} {} abandoned downloads removed",
            style("•").dim(),
            stats.scratch
        );
    }
    Ok(())
}
