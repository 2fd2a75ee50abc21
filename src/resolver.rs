//! Lock-file based project resolution
//!
//! Turns a dependency name into a loaded [`Project`] using the project
//! libraries recorded in the lock file. Results, including misses, are
//! memoized for the life of the resolver, and concurrent lookups of the
//! same name share a single disk read.

use crate::lockfile::LockFile;
use crate::project::{Project, ProjectReader};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, warn};

type Slot = Arc<OnceLock<Option<Arc<Project>>>>;

/// Resolves project references recorded in a lock file
pub struct ProjectResolver {
    base_dir: PathBuf,
    lock_file: Arc<LockFile>,
    reader: Arc<dyn ProjectReader>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ProjectResolver {
    /// `base_dir` is the directory holding the lock file
    pub fn new(
        base_dir: impl Into<PathBuf>,
        lock_file: Arc<LockFile>,
        reader: Arc<dyn ProjectReader>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            lock_file,
            reader,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Pre-seed projects that are already in memory, such as the one being
    /// built. These are never re-read from disk.
    pub fn with_projects(self, projects: impl IntoIterator<Item = Arc<Project>>) -> Self {
        {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            for project in projects {
                debug!("Seeding resolver with {}", project.name);
                slots.insert(
                    project.name.clone(),
                    Arc::new(OnceLock::from(Some(project))),
                );
            }
        }
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn lock_file(&self) -> &LockFile {
        &self.lock_file
    }

    /// Resolve `name` to a project, or `None` when it is not a local
    /// project reference (the caller then tries package libraries).
    pub fn try_resolve(&self, name: &str) -> Option<Arc<Project>> {
        let slot = self.slot(name);
        slot.get_or_init(|| self.load(name)).clone()
    }

    /// Directories of every known project location
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .lock_file
            .project_libraries()
            .iter()
            .map(|library| {
                let location = library.resolve(&self.base_dir);
                project_dir_of(&location)
            })
            .collect();

        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for slot in slots.values() {
            if let Some(Some(project)) = slot.get() {
                paths.push(project.directory().to_path_buf());
            }
        }
        drop(slots);

        paths.sort();
        paths.dedup();
        paths
    }

    /// Number of names resolved to a project so far
    pub fn resolved_count(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .values()
            .filter(|slot| matches!(slot.get(), Some(Some(_))))
            .count()
    }

    /// The once-cell for `name`, created on first use. The map lock is
    /// held only long enough to find or insert the cell.
    fn slot(&self, name: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(name) {
            return Arc::clone(slot);
        }
        let slot = Slot::default();
        slots.insert(name.to_string(), Arc::clone(&slot));
        slot
    }

    fn load(&self, name: &str) -> Option<Arc<Project>> {
        let Some(library) = self.lock_file.project_library(name) else {
            debug!("{} is not a project reference", name);
            return None;
        };

        let location = library.resolve(&self.base_dir);
        match self.reader.read_project(&location) {
            Ok(Some(project)) => {
                debug!(
                    "Resolved project {} at {}",
                    name,
                    project.project_file_path.display()
                );
                Some(Arc::new(project))
            }
            Ok(None) => {
                debug!("No project for {} at {}", name, location.display());
                None
            }
            Err(e) => {
                warn!("Ignoring project {} at {}: {}", name, location.display(), e);
                None
            }
        }
    }
}

fn project_dir_of(location: &Path) -> PathBuf {
    if location.extension().is_some_and(|ext| ext == "json") {
        location
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| location.to_path_buf())
    } else {
        location.to_path_buf()
    }
}
