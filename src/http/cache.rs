//! On-disk layout and cache-aside lookup for the HTTP source
//!
//! Layout: `<cache_root>/<base-uri folder>/<sanitized key>.dat`. The folder
//! name is derived from the source's base URI so feeds never collide.

use crate::error::{KilnError, KilnResult};
use crate::fslock::{open_shared, FileLock};
use sha2::{Digest, Sha256};
use std::fs::{self, File, Metadata};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Suffix of every content file in the cache
pub const CACHE_FILE_SUFFIX: &str = ".dat";

/// Replacement for characters that cannot appear in a file name
pub const PLACEHOLDER: char = '_';

/// Trailing URI characters kept in the folder name for debugging
const TRAILING_URI_CHARS: usize = 32;

const INVALID_FILE_NAME_CHARS: &[char] = &['"', '<', '>', '|', ':', '*', '?', '\\', '/'];

/// Make `value` safe as a file name on every platform.
///
/// Invalid characters become `_` and runs of `_` collapse to one, so the
/// result never contains `__` and sanitizing twice is a no-op.
pub fn sanitize_file_name(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        let ch = if ch.is_control() || INVALID_FILE_NAME_CHARS.contains(&ch) {
            PLACEHOLDER
        } else {
            ch
        };
        if ch == PLACEHOLDER && out.ends_with(PLACEHOLDER) {
            continue;
        }
        out.push(ch);
    }
    out
}

/// Folder name for a base URI: SHA-256 hex, `$`, then the URI's tail
pub fn base_uri_folder(base_uri: &str) -> String {
    let digest = Sha256::digest(base_uri.as_bytes());

    let count = base_uri.chars().count();
    let trailing: String = base_uri
        .chars()
        .skip(count.saturating_sub(TRAILING_URI_CHARS))
        .collect();

    sanitize_file_name(&format!("{}${}", hex::encode(digest), trailing))
}

/// Full cache file path for a key under a given base URI
pub fn cache_file_path(cache_root: &Path, base_uri: &str, cache_key: &str) -> PathBuf {
    cache_root
        .join(base_uri_folder(base_uri))
        .join(format!("{}{}", sanitize_file_name(cache_key), CACHE_FILE_SUFFIX))
}

/// Age of a file from its last write time.
///
/// Unknown timestamps count as infinitely old; timestamps in the future
/// count as brand new.
pub fn file_age(metadata: &Metadata) -> Duration {
    match metadata.modified() {
        Ok(modified) => SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
        Err(_) => Duration::MAX,
    }
}

/// Open the cache file for shared reading if it is younger than `max_age`.
///
/// Runs under the file's named lock so it never opens a file a peer is in
/// the middle of replacing. Blocking; call from `spawn_blocking`.
pub fn open_if_fresh(cache_file: &Path, max_age: Duration) -> KilnResult<Option<File>> {
    let _lock = FileLock::acquire(cache_file)?;

    let metadata = match fs::metadata(cache_file) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(KilnError::io(
                format!("inspecting cache file {}", cache_file.display()),
                e,
            ))
        }
    };

    let age = file_age(&metadata);
    if age >= max_age {
        debug!(
            "Cache file {} is stale ({}s old)",
            cache_file.display(),
            age.as_secs()
        );
        return Ok(None);
    }

    let file = open_shared(cache_file).map_err(|e| {
        KilnError::io(format!("opening cache file {}", cache_file.display()), e)
    })?;
    Ok(Some(file))
}
