//! Project definitions as seen by the resolver
//!
//! Projects are owned by the project-file reader; the resolver only loads
//! them through [`ProjectReader`] and hands out shared references.

pub mod paths;

use crate::error::{KilnError, KilnResult};
use semver::Version;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Project definition file name
pub const PROJECT_FILE_NAME: &str = "project.json";

/// A loaded project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub version: Version,
    /// Absolute path to the definition file
    pub project_file_path: PathBuf,
}

impl Project {
    pub fn new(name: impl Into<String>, version: Version, project_file_path: PathBuf) -> Self {
        Self {
            name: name.into(),
            version,
            project_file_path,
        }
    }

    /// Directory holding the definition file
    pub fn directory(&self) -> &Path {
        self.project_file_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
    }
}

/// Reads project definitions from disk
pub trait ProjectReader: Send + Sync {
    /// Load the project at `path` (a directory or a definition file).
    ///
    /// `Ok(None)` means no definition exists there; `Err` means one exists
    /// but could not be understood.
    fn read_project(&self, path: &Path) -> KilnResult<Option<Project>>;
}

/// Reads `project.json`; the project name defaults to its directory name
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonProjectReader;

#[derive(Deserialize)]
struct ProjectDefinition {
    name: Option<String>,
    version: Option<String>,
}

impl JsonProjectReader {
    fn definition_path(path: &Path) -> Option<PathBuf> {
        if path.is_dir() {
            Some(path.join(PROJECT_FILE_NAME))
        } else if path.file_name().is_some_and(|name| name == PROJECT_FILE_NAME) {
            Some(path.to_path_buf())
        } else {
            None
        }
    }
}

impl ProjectReader for JsonProjectReader {
    fn read_project(&self, path: &Path) -> KilnResult<Option<Project>> {
        let Some(file) = Self::definition_path(path) else {
            debug!("No project directory at {}", path.display());
            return Ok(None);
        };

        let content = match fs::read_to_string(&file) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(KilnError::io(
                    format!("reading project file {}", file.display()),
                    e,
                ))
            }
        };

        let file = std::path::absolute(&file)
            .map_err(|e| KilnError::io(format!("resolving {}", file.display()), e))?;
        let file = paths::normalize(&file);

        let definition: ProjectDefinition =
            serde_json::from_str(&content).map_err(|e| KilnError::ProjectInvalid {
                path: file.clone(),
                reason: e.to_string(),
            })?;

        let name = match definition.name {
            Some(name) => name,
            None => file
                .parent()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| KilnError::ProjectInvalid {
                    path: file.clone(),
                    reason: "cannot infer project name".to_string(),
                })?,
        };

        let version = match definition.version.as_deref() {
            Some(raw) => Version::parse(raw).map_err(|e| KilnError::ProjectInvalid {
                path: file.clone(),
                reason: format!("invalid version '{}': {}", raw, e),
            })?,
            None => Version::new(1, 0, 0),
        };

        debug!("Read project {} {} from {}", name, version, file.display());
        Ok(Some(Project::new(name, version, file)))
    }
}
