//! Fetch command - pull one URI through the HTTP cache

use super::transport;
use crate::cli::args::FetchArgs;
use crate::config::{Config, ConfigManager};
use crate::error::{KilnError, KilnResult};
use crate::http::{GetOptions, HttpSource, HttpSourceOptions};
use console::style;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Execute the fetch command
pub async fn execute(args: FetchArgs, config: &Config) -> KilnResult<()> {
    let base = match args.base {
        Some(base) => base,
        None => parent_uri(&args.uri)?,
    };

    // Reuse credentials of the configured source that owns this URI
    let credentials = config
        .sources
        .iter()
        .find(|s| s.owns(&args.uri))
        .and_then(|s| s.credentials());
    if credentials.is_some() {
        debug!("Using configured credentials for {}", args.uri);
    }

    let options =
        HttpSourceOptions::new(ConfigManager::cache_dir(config)).with_credentials(credentials);
    let source = HttpSource::new(&base, options, transport(config)?);

    let max_age = args
        .max_age
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.cache.max_age());
    let result = source.get(&args.uri, GetOptions::new(&args.key, max_age)).await?;
    let from_cache = result.from_cache;
    let cache_file = result.cache_file.clone();
    let content = result.into_bytes().await?;

    match args.output {
        Some(path) => {
            write_output(&path, &content).await?;
            eprintln!(
                "{} {} bytes to {}{}",
                style("✓").green(),
                content.len(),
                path.display(),
                if from_cache { " (cached)" } else { "" }
            );
        }
        None => {
            std::io::stdout()
                .write_all(&content)
                .map_err(|e| KilnError::io("writing to stdout", e))?;
        }
    }

    if let Some(file) = cache_file {
        debug!("Content at {}", file.display());
    }
    Ok(())
}

/// `https://feed/a/b/pkg.nupkg` -> `https://feed/a/b/`
fn parent_uri(uri: &str) -> KilnResult<String> {
    let scheme_end = uri.find("://").map(|i| i + 3).unwrap_or(0);
    match uri[scheme_end..].rfind('/') {
        Some(i) => Ok(uri[..scheme_end + i + 1].to_string()),
        None => Err(KilnError::User(format!(
            "cannot derive a base URI from '{}', pass --base",
            uri
        ))),
    }
}

async fn write_output(path: &Path, content: &[u8]) -> KilnResult<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| KilnError::io(format!("writing {}", path.display()), e))
}
