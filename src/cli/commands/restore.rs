//! Restore command - bring every lock file library into the cache

use super::{configured_source, project_dir};
use crate::cli::args::RestoreArgs;
use crate::config::Config;
use crate::error::{KilnError, KilnResult};
use crate::lockfile::LockFile;
use crate::project::{JsonProjectReader, ProjectReader};
use crate::resolver::ProjectResolver;
use crate::restore::{PackageOutcome, RestoreOptions, Restorer};
use console::style;
use std::sync::Arc;
use std::time::Duration;

/// Execute the restore command
pub async fn execute(args: RestoreArgs, config: &Config) -> KilnResult<()> {
    let project_dir = project_dir(args.project)?;
    let lock_file = Arc::new(LockFile::load(&LockFile::default_path(&project_dir)).await?);

    let reader = Arc::new(JsonProjectReader);
    let mut resolver = ProjectResolver::new(&project_dir, lock_file, reader.clone());
    if let Some(root) = reader.read_project(&project_dir)? {
        resolver = resolver.with_projects([Arc::new(root)]);
    }

    let source = configured_source(config, args.source.as_deref())?;
    let options = RestoreOptions {
        max_age: args
            .max_age
            .map(Duration::from_secs)
            .unwrap_or_else(|| config.cache.max_age()),
        parallel: args.parallel.unwrap_or(config.restore.parallel),
    };

    println!(
        "Restoring {} from {}",
        style(project_dir.display()).bold(),
        source.base_uri()
    );

    let restorer = Restorer::new(Arc::new(resolver), Arc::new(source), options);
    let summary = restorer.restore().await?;

    for name in &summary.projects_missing {
        println!("  {} project {} not found", style("✗").red(), name);
    }
    for package in &summary.packages {
        match &package.outcome {
            PackageOutcome::Cached => {
                println!("  {} {} {}", style("✓").green(), package.identity, style("(cached)").dim())
            }
            PackageOutcome::Fetched => println!("  {} {}", style("✓").green(), package.identity),
            PackageOutcome::Missing => println!(
                "  {} {} {}",
                style("✗").red(),
                package.identity,
                style("not found").red()
            ),
            PackageOutcome::Failed { reason, retryable } => {
                let retry = if *retryable { " (retryable)" } else { "" };
                println!(
                    "  {} {} {}{}",
                    style("✗").red(),
                    package.identity,
                    reason,
                    style(retry).dim()
                )
            }
        }
    }

    println!();
    if summary.is_success() {
        println!("{} {}", style("Restored").green().bold(), summary);
        Ok(())
    } else {
        Err(KilnError::User(format!("restore incomplete: {}", summary)))
    }
}
