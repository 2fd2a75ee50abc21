//! Lock file model
//!
//! A lock file is an immutable snapshot of a resolved dependency graph:
//! remote package libraries keyed by `(name, version)` and project
//! libraries keyed by name. It is only populated while loading or while
//! walking a fresh graph, never after it is handed to a resolver.

pub mod item;
pub mod library;

pub use item::LockFileItem;
pub use library::{LockFilePackageLibrary, LockFileProjectLibrary, ProjectPathAnchor};

use crate::error::{KilnError, KilnResult};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Default lock file name, next to the project definition
pub const LOCK_FILE_NAME: &str = "project.lock.json";

/// Format version written by this crate
pub const LOCK_FILE_VERSION: u32 = 2;

/// Resolved dependency graph snapshot
#[derive(Debug, Clone)]
pub struct LockFile {
    version: u32,
    package_libraries: Vec<LockFilePackageLibrary>,
    project_libraries: Vec<LockFileProjectLibrary>,
    packages_by_identity: HashMap<(String, Version), usize>,
    projects_by_name: HashMap<String, usize>,
}

/// Persisted layout
#[derive(Serialize, Deserialize)]
struct RawLockFile {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    libraries: Vec<LockFilePackageLibrary>,
    #[serde(default)]
    projects: Vec<LockFileProjectLibrary>,
}

fn default_version() -> u32 {
    LOCK_FILE_VERSION
}

impl LockFile {
    /// Build a lock file, rejecting duplicate identities
    pub fn new(
        version: u32,
        package_libraries: Vec<LockFilePackageLibrary>,
        project_libraries: Vec<LockFileProjectLibrary>,
    ) -> KilnResult<Self> {
        let mut packages_by_identity = HashMap::with_capacity(package_libraries.len());
        for (index, library) in package_libraries.iter().enumerate() {
            let key = (library.name.clone(), library.version.clone());
            if packages_by_identity.insert(key, index).is_some() {
                return Err(KilnError::LockFileDuplicate {
                    kind: "package",
                    name: library.identity(),
                });
            }
        }

        let mut projects_by_name = HashMap::with_capacity(project_libraries.len());
        for (index, library) in project_libraries.iter().enumerate() {
            if projects_by_name.insert(library.name.clone(), index).is_some() {
                return Err(KilnError::LockFileDuplicate {
                    kind: "project",
                    name: library.name.clone(),
                });
            }
        }

        Ok(Self {
            version,
            package_libraries,
            project_libraries,
            packages_by_identity,
            projects_by_name,
        })
    }

    /// An empty lock file (no dependencies)
    pub fn empty() -> Self {
        Self {
            version: LOCK_FILE_VERSION,
            package_libraries: Vec::new(),
            project_libraries: Vec::new(),
            packages_by_identity: HashMap::new(),
            projects_by_name: HashMap::new(),
        }
    }

    /// Parse a lock file from JSON text
    pub fn from_json(content: &str) -> KilnResult<Self> {
        let raw: RawLockFile = serde_json::from_str(content)?;
        Self::new(raw.version, raw.libraries, raw.projects)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> KilnResult<String> {
        let raw = RawLockFile {
            version: self.version,
            libraries: self.package_libraries.clone(),
            projects: self.project_libraries.clone(),
        };
        Ok(serde_json::to_string_pretty(&raw)?)
    }

    /// Load a lock file from disk
    pub async fn load(path: &Path) -> KilnResult<Self> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KilnError::LockFileNotFound(path.to_path_buf()));
            }
            Err(e) => {
                return Err(KilnError::io(
                    format!("reading lock file {}", path.display()),
                    e,
                ))
            }
        };

        let lock_file = Self::from_json(&content).map_err(|e| KilnError::LockFileInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        debug!(
            "Loaded lock file {} ({} packages, {} projects)",
            path.display(),
            lock_file.package_libraries.len(),
            lock_file.project_libraries.len()
        );
        Ok(lock_file)
    }

    /// Write the lock file to disk
    pub async fn save(&self, path: &Path) -> KilnResult<()> {
        let content = self.to_json()?;
        fs::write(path, content)
            .await
            .map_err(|e| KilnError::io(format!("writing lock file {}", path.display()), e))
    }

    /// Default lock file location for a project directory
    pub fn default_path(project_dir: &Path) -> PathBuf {
        project_dir.join(LOCK_FILE_NAME)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn package_libraries(&self) -> &[LockFilePackageLibrary] {
        &self.package_libraries
    }

    pub fn project_libraries(&self) -> &[LockFileProjectLibrary] {
        &self.project_libraries
    }

    /// Look up a package library by identity
    pub fn package_library(&self, name: &str, version: &Version) -> Option<&LockFilePackageLibrary> {
        self.packages_by_identity
            .get(&(name.to_string(), version.clone()))
            .map(|&index| &self.package_libraries[index])
    }

    /// Look up a project library by name
    pub fn project_library(&self, name: &str) -> Option<&LockFileProjectLibrary> {
        self.projects_by_name
            .get(name)
            .map(|&index| &self.project_libraries[index])
    }
}

impl Default for LockFile {
    fn default() -> Self {
        Self::empty()
    }
}
