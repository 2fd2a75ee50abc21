//! CLI command implementations

pub mod cache;
pub mod fetch;
pub mod resolve;
pub mod restore;

pub use cache::execute as cache;
pub use fetch::execute as fetch;
pub use resolve::execute as resolve;
pub use restore::execute as restore;

use crate::config::{Config, ConfigManager};
use crate::error::{KilnError, KilnResult};
use crate::http::{HttpSource, HttpSourceOptions, UreqTransport};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

/// Project directory from `--project`, or the current directory
fn project_dir(project: Option<PathBuf>) -> KilnResult<PathBuf> {
    match project {
        Some(p) => Ok(p.canonicalize().unwrap_or(p)),
        None => env::current_dir().map_err(|e| KilnError::io("getting current directory", e)),
    }
}

/// HTTP source for the configured source named `name`
fn configured_source(config: &Config, name: Option<&str>) -> KilnResult<HttpSource> {
    let source = match (config.source(name), name) {
        (Some(source), _) => source,
        (None, Some(name)) => {
            return Err(KilnError::User(format!("no source named '{}' in config", name)))
        }
        (None, None) => return Err(KilnError::NoSource),
    };

    let options = HttpSourceOptions::new(ConfigManager::cache_dir(config))
        .with_credentials(source.credentials());
    Ok(HttpSource::new(&source.url, options, transport(config)?))
}

fn transport(config: &Config) -> KilnResult<Arc<UreqTransport>> {
    Ok(Arc::new(UreqTransport::new(&config.proxy)?))
}
