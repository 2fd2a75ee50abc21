//! One restore pass over a lock file
//!
//! Project libraries are resolved through the [`ProjectResolver`]; package
//! libraries are fetched through the [`HttpSource`] with bounded
//! concurrency. Faults are collected per package so one bad download does
//! not hide the state of the others.

use crate::error::KilnResult;
use crate::http::{GetOptions, HttpSource, IntegrityValidator};
use crate::lockfile::LockFilePackageLibrary;
use crate::resolver::ProjectResolver;
use futures_util::stream::{self, StreamExt};
use semver::Version;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Package archive URI on a feed
pub fn package_uri(base_uri: &str, name: &str, version: &Version) -> String {
    format!(
        "{}/{}/{}/{}.{}.nupkg",
        base_uri.trim_end_matches('/'),
        name,
        version,
        name,
        version
    )
}

/// Cache key for a package archive
pub fn package_key(name: &str, version: &Version) -> String {
    format!("{}-{}", name, version)
}

#[derive(Debug, Clone)]
pub struct RestoreOptions {
    pub max_age: Duration,
    /// Maximum concurrent package downloads
    pub parallel: usize,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(30 * 60),
            parallel: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    Cached,
    Fetched,
    Missing,
    Failed {
        reason: String,
        /// A transport fault or server error that may succeed on a later run
        retryable: bool,
    },
}

#[derive(Debug, Clone)]
pub struct PackageReport {
    /// `name/version`
    pub identity: String,
    pub outcome: PackageOutcome,
}

/// What a restore did
#[derive(Debug, Clone, Default)]
pub struct RestoreSummary {
    pub projects_resolved: Vec<String>,
    pub projects_missing: Vec<String>,
    pub packages: Vec<PackageReport>,
}

impl RestoreSummary {
    fn count(&self, matches: impl Fn(&PackageOutcome) -> bool) -> usize {
        self.packages.iter().filter(|p| matches(&p.outcome)).count()
    }

    pub fn cached(&self) -> usize {
        self.count(|o| *o == PackageOutcome::Cached)
    }

    pub fn fetched(&self) -> usize {
        self.count(|o| *o == PackageOutcome::Fetched)
    }

    pub fn missing(&self) -> usize {
        self.count(|o| *o == PackageOutcome::Missing)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PackageReport> {
        self.packages
            .iter()
            .filter(|p| matches!(p.outcome, PackageOutcome::Failed { .. }))
    }

    pub fn is_success(&self) -> bool {
        self.projects_missing.is_empty()
            && self.missing() == 0
            && self.failures().next().is_none()
    }
}

impl fmt::Display for RestoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} projects, {} packages ({} cached, {} fetched, {} missing, {} failed)",
            self.projects_resolved.len(),
            self.packages.len(),
            self.cached(),
            self.fetched(),
            self.missing(),
            self.failures().count()
        )
    }
}

/// Drives a restore for one lock file against one feed
pub struct Restorer {
    resolver: Arc<ProjectResolver>,
    source: Arc<HttpSource>,
    options: RestoreOptions,
}

impl Restorer {
    pub fn new(
        resolver: Arc<ProjectResolver>,
        source: Arc<HttpSource>,
        options: RestoreOptions,
    ) -> Self {
        Self {
            resolver,
            source,
            options,
        }
    }

    pub async fn restore(&self) -> KilnResult<RestoreSummary> {
        let mut summary = RestoreSummary::default();

        let resolver = Arc::clone(&self.resolver);
        let (resolved, missing) = tokio::task::spawn_blocking(move || {
            let mut resolved = Vec::new();
            let mut missing = Vec::new();
            for library in resolver.lock_file().project_libraries() {
                match resolver.try_resolve(&library.name) {
                    Some(project) => resolved.push(project.name.clone()),
                    None => missing.push(library.name.clone()),
                }
            }
            (resolved, missing)
        })
        .await?;
        for name in &missing {
            warn!("Project {} could not be resolved", name);
        }
        info!(
            "Resolved {} of {} project references",
            self.resolver.resolved_count(),
            resolved.len() + missing.len()
        );
        summary.projects_resolved = resolved;
        summary.projects_missing = missing;

        let libraries = self.resolver.lock_file().package_libraries().to_vec();
        info!(
            "Restoring {} packages from {}",
            libraries.len(),
            self.source.base_uri()
        );

        summary.packages = stream::iter(libraries)
            .map(|library| self.restore_package(library))
            .buffer_unordered(self.options.parallel.max(1))
            .collect()
            .await;
        summary.packages.sort_by(|a, b| a.identity.cmp(&b.identity));

        Ok(summary)
    }

    async fn restore_package(&self, library: LockFilePackageLibrary) -> PackageReport {
        let identity = library.identity();
        let uri = package_uri(self.source.base_uri(), &library.name, &library.version);
        let mut options =
            GetOptions::new(package_key(&library.name, &library.version), self.options.max_age)
                .allow_not_found();
        if !library.sha512.is_empty() {
            options = options.validator(Arc::new(IntegrityValidator::sha512(&library.sha512)));
        }

        let outcome = match self.source.get(&uri, options).await {
            Ok(result) if result.is_empty() => {
                warn!("{} not found at {}", identity, uri);
                PackageOutcome::Missing
            }
            Ok(result) if result.from_cache => PackageOutcome::Cached,
            Ok(_) => PackageOutcome::Fetched,
            Err(e) => {
                warn!("Failed to restore {}: {}", identity, e);
                PackageOutcome::Failed {
                    reason: e.to_string(),
                    retryable: e.is_retryable(),
                }
            }
        };
        debug!("{} -> {:?}", identity, outcome);

        PackageReport { identity, outcome }
    }
}
