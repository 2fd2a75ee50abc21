//! Resolve command - look up a project reference in the lock file

use super::project_dir;
use crate::cli::args::ResolveArgs;
use crate::config::Config;
use crate::error::{KilnError, KilnResult};
use crate::lockfile::LockFile;
use crate::project::paths::resolve_root_directory;
use crate::project::{JsonProjectReader, ProjectReader};
use crate::resolver::ProjectResolver;
use console::style;
use std::sync::Arc;
use tracing::{debug, info};

/// Execute the resolve command
pub async fn execute(args: ResolveArgs, _config: &Config) -> KilnResult<()> {
    let project_dir = project_dir(args.project)?;
    let lock_path = LockFile::default_path(&project_dir);
    let lock_file = Arc::new(LockFile::load(&lock_path).await?);

    debug!(
        "Workspace root {}",
        resolve_root_directory(&project_dir).display()
    );

    let reader = Arc::new(JsonProjectReader);
    let mut resolver = ProjectResolver::new(&project_dir, lock_file, reader.clone());
    // The project being built is already known; never re-read it
    if let Some(root) = reader.read_project(&project_dir)? {
        resolver = resolver.with_projects([Arc::new(root)]);
    }
    let resolver = Arc::new(resolver);

    let name = args.name.clone();
    let lookup = Arc::clone(&resolver);
    let project = tokio::task::spawn_blocking(move || lookup.try_resolve(&name)).await?;

    for path in resolver.search_paths() {
        info!("Search path {}", path.display());
    }

    match project {
        Some(project) => {
            println!(
                "{} {} {}",
                style("✓").green(),
                style(&project.name).bold(),
                project.version
            );
            println!("  {}", project.project_file_path.display());
            Ok(())
        }
        None => Err(KilnError::User(format!(
            "'{}' is not a project reference in {}",
            args.name,
            lock_path.display()
        ))),
    }
}
