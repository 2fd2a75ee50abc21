//! Package and project library entries

use crate::lockfile::item::LockFileItem;
use crate::project::{paths, Project};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A resolved remote package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFilePackageLibrary {
    pub name: String,

    pub version: Version,

    /// Whether the package may be replaced by a servicing update
    #[serde(default, rename = "serviceable")]
    pub is_serviceable: bool,

    /// Base64 SHA-512 of the package archive
    #[serde(default)]
    pub sha512: String,

    /// Files inside the package, in archive order
    #[serde(default)]
    pub files: Vec<LockFileItem>,
}

impl LockFilePackageLibrary {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            is_serviceable: false,
            sha512: String::new(),
            files: Vec::new(),
        }
    }

    /// Identity used for duplicate detection and lookups
    pub fn identity(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

/// Which directory a project library path is relative to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProjectPathAnchor {
    /// Relative to the directory holding the lock file
    #[default]
    LockFile,

    /// Relative to the directory of the project that references it
    Project(PathBuf),
}

/// A reference to another project in the same workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFileProjectLibrary {
    pub name: String,

    /// Portable path (always `/`-separated) to the project definition
    pub path: String,

    #[serde(skip)]
    pub anchor: ProjectPathAnchor,
}

impl LockFileProjectLibrary {
    /// Location read back from a persisted lock file
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            anchor: ProjectPathAnchor::LockFile,
        }
    }

    /// Location computed while walking `project`'s references
    pub fn from_projects(project: &Project, reference: &Project) -> Self {
        let from = project.directory();
        Self {
            name: reference.name.clone(),
            path: paths::relative_path(from, &reference.project_file_path),
            anchor: ProjectPathAnchor::Project(from.to_path_buf()),
        }
    }

    /// Absolute location, given the lock file's base directory
    pub fn resolve(&self, lock_file_dir: &Path) -> PathBuf {
        let base = match &self.anchor {
            ProjectPathAnchor::LockFile => lock_file_dir,
            ProjectPathAnchor::Project(dir) => dir.as_path(),
        };
        paths::normalize(&base.join(&self.path))
    }
}
