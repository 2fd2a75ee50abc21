//! Cache-aside HTTP package source
//!
//! A fetch first looks for a fresh cache file. On a miss the response is
//! streamed to a private scratch file, validated, and then promoted into
//! the shared cache under the cache file's named lock:
//!
//! 1. copy the content to a sibling `-new` file
//! 2. delete the resident file, unless a peer still has it open
//! 3. rename the `-new` file into place if the name is free
//! 4. otherwise keep whatever a peer promoted first
//! 5. open the resident file for shared reading
//!
//! Every candidate is complete, valid content for the key, so whichever
//! process wins the race leaves a correct cache.

use crate::error::{KilnError, KilnResult};
use crate::fslock::{open_shared, FileLock, OpenFileProbe, SharedLockProbe};
use crate::http::cache::{self, open_if_fresh};
use crate::http::transport::{HttpRequest, HttpTransport};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, ErrorKind, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::{NamedTempFile, TempPath};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Directory under the cache root for in-flight downloads
pub const SCRATCH_DIR: &str = ".scratch";

const HTTP_NOT_FOUND: u16 = 404;

/// Basic-auth credentials for a source
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `Authorization` header value
    pub fn authorization(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {}", token)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Checks downloaded content before it can enter the cache
pub trait ContentValidator: Send + Sync {
    /// Inspect the complete download, positioned at its start.
    /// Returns the reason on rejection.
    fn validate(&self, content: &mut File) -> Result<(), String>;
}

impl<F> ContentValidator for F
where
    F: Fn(&mut File) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, content: &mut File) -> Result<(), String> {
        self(content)
    }
}

/// Construction-time settings for an [`HttpSource`]
#[derive(Debug, Clone)]
pub struct HttpSourceOptions {
    /// Root of the shared HTTP cache
    pub cache_root: PathBuf,
    /// Where private scratch and zero-TTL files live
    pub scratch_dir: PathBuf,
    pub credentials: Option<Credentials>,
}

impl HttpSourceOptions {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        let cache_root = cache_root.into();
        Self {
            scratch_dir: cache_root.join(SCRATCH_DIR),
            cache_root,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Per-request settings
#[derive(Clone)]
pub struct GetOptions {
    /// Logical cache key, sanitized into a file name
    pub cache_key: String,
    /// Maximum age of a usable cache file; zero forces a private fetch
    pub max_age: Duration,
    pub validator: Option<Arc<dyn ContentValidator>>,
    /// When false a 404 yields an empty result instead of an error
    pub not_found_is_error: bool,
}

impl GetOptions {
    pub fn new(cache_key: impl Into<String>, max_age: Duration) -> Self {
        Self {
            cache_key: cache_key.into(),
            max_age,
            validator: None,
            not_found_is_error: true,
        }
    }

    pub fn validator(mut self, validator: Arc<dyn ContentValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn allow_not_found(mut self) -> Self {
        self.not_found_is_error = false;
        self
    }
}

/// Outcome of a fetch. The caller owns the stream.
#[derive(Debug, Default)]
pub struct HttpSourceResult {
    pub stream: Option<tokio::fs::File>,
    pub cache_file: Option<PathBuf>,
    /// Served from a fresh cache file without a network request
    pub from_cache: bool,
    /// Zero-TTL download, deleted when the result is dropped
    private: Option<TempPath>,
}

impl HttpSourceResult {
    fn new(file: File, path: PathBuf, from_cache: bool) -> Self {
        Self {
            stream: Some(tokio::fs::File::from_std(file)),
            cache_file: Some(path),
            from_cache,
            private: None,
        }
    }

    fn private(file: File, path: TempPath) -> Self {
        Self {
            stream: Some(tokio::fs::File::from_std(file)),
            cache_file: Some(path.to_path_buf()),
            from_cache: false,
            private: Some(path),
        }
    }

    /// Result for a tolerated 404
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.stream.is_none()
    }

    /// Read the whole stream, releasing it afterwards
    pub async fn into_bytes(self) -> KilnResult<Vec<u8>> {
        let mut content = Vec::new();
        if let Some(mut stream) = self.stream {
            stream
                .read_to_end(&mut content)
                .await
                .map_err(|e| KilnError::io("reading fetched content", e))?;
        }
        Ok(content)
    }
}

/// A remote package feed backed by the shared disk cache
pub struct HttpSource {
    base_uri: String,
    options: HttpSourceOptions,
    transport: Arc<dyn HttpTransport>,
    probe: Arc<dyn OpenFileProbe>,
}

impl HttpSource {
    pub fn new(
        base_uri: &str,
        options: HttpSourceOptions,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let base_uri = if base_uri.ends_with('/') || base_uri.ends_with("index.json") {
            base_uri.to_string()
        } else {
            format!("{}/", base_uri)
        };

        Self {
            base_uri,
            options,
            transport,
            probe: Arc::new(SharedLockProbe),
        }
    }

    /// Replace the open-file check used during promotion
    pub fn with_probe(mut self, probe: Arc<dyn OpenFileProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Where the shared cache keeps content for `cache_key`
    pub fn cache_file_path(&self, cache_key: &str) -> PathBuf {
        cache::cache_file_path(&self.options.cache_root, &self.base_uri, cache_key)
    }

    /// Fetch `uri`, serving it from the cache when fresh enough.
    pub async fn get(&self, uri: &str, options: GetOptions) -> KilnResult<HttpSourceResult> {
        let started = Instant::now();
        let cache_file = self.cache_file_path(&options.cache_key);
        let ephemeral = options.max_age.is_zero();

        if !ephemeral {
            if let Some(file) = self.try_cache(&cache_file, options.max_age).await? {
                info!("  CACHE {}", uri);
                return Ok(HttpSourceResult::new(file, cache_file, true));
            }
        }

        info!("  GET {}", uri);

        let scratch = self.create_scratch()?;
        let dest = scratch
            .as_file()
            .try_clone()
            .map_err(|e| KilnError::io("duplicating scratch handle", e))?;

        let request = HttpRequest {
            uri: uri.to_string(),
            authorization: self
                .options
                .credentials
                .as_ref()
                .map(Credentials::authorization),
        };
        // Dropping this future drops `scratch`, which deletes it
        let status = self.transport.download(&request, dest).await?;

        if status == HTTP_NOT_FOUND && !options.not_found_is_error {
            info!("  {} {} {}ms", status, uri, started.elapsed().as_millis());
            return Ok(HttpSourceResult::empty());
        }
        if !(200..300).contains(&status) {
            return Err(KilnError::HttpStatus {
                uri: uri.to_string(),
                status,
            });
        }

        let validator = options.validator.clone();
        let probe = Arc::clone(&self.probe);
        let uri_owned = uri.to_string();
        let target = cache_file.clone();

        let result = tokio::task::spawn_blocking(move || {
            let mut scratch = scratch;
            if let Some(validator) = validator {
                rewind(scratch.as_file_mut())?;
                validator
                    .validate(scratch.as_file_mut())
                    .map_err(|reason| KilnError::content_invalid(&uri_owned, reason))?;
            }

            if ephemeral {
                into_private(scratch)
            } else {
                promote(scratch, &target, probe.as_ref())
                    .map(|file| HttpSourceResult::new(file, target, false))
            }
        })
        .await??;

        info!("  {} {} {}ms", status, uri, started.elapsed().as_millis());
        Ok(result)
    }

    async fn try_cache(&self, cache_file: &Path, max_age: Duration) -> KilnResult<Option<File>> {
        let cache_file = cache_file.to_path_buf();
        tokio::task::spawn_blocking(move || open_if_fresh(&cache_file, max_age)).await?
    }

    fn create_scratch(&self) -> KilnResult<NamedTempFile> {
        let dir = &self.options.scratch_dir;
        fs::create_dir_all(dir)
            .map_err(|e| KilnError::io(format!("creating scratch dir {}", dir.display()), e))?;
        tempfile::Builder::new()
            .prefix("kiln-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| KilnError::io(format!("creating scratch file in {}", dir.display()), e))
    }
}

fn rewind(file: &mut File) -> KilnResult<()> {
    file.seek(SeekFrom::Start(0))
        .map(|_| ())
        .map_err(|e| KilnError::io("rewinding downloaded content", e))
}

/// Zero-TTL fetches hand the scratch file itself to the caller and never
/// touch the cache. It is deleted once the caller drops the result.
fn into_private(scratch: NamedTempFile) -> KilnResult<HttpSourceResult> {
    let (mut file, path) = scratch.into_parts();
    rewind(&mut file)?;
    debug!("Serving uncached download from {}", path.display());
    Ok(HttpSourceResult::private(file, path))
}

/// Atomically make the scratch content the resident cache file.
///
/// Blocking; runs under the cache file's named lock.
fn promote(
    mut scratch: NamedTempFile,
    cache_file: &Path,
    probe: &dyn OpenFileProbe,
) -> KilnResult<File> {
    let promote_error = |reason: String| KilnError::CachePromote {
        path: cache_file.to_path_buf(),
        reason,
    };

    let folder = cache_file
        .parent()
        .ok_or_else(|| promote_error("cache file has no parent directory".to_string()))?;
    let file_name = cache_file
        .file_name()
        .ok_or_else(|| promote_error("cache file has no name".to_string()))?
        .to_string_lossy()
        .into_owned();

    fs::create_dir_all(folder)
        .map_err(|e| KilnError::io(format!("creating cache dir {}", folder.display()), e))?;

    let _lock = FileLock::acquire(cache_file)?;

    let mut candidate = tempfile::Builder::new()
        .prefix(&format!("{}-new", file_name))
        .tempfile_in(folder)
        .map_err(|e| KilnError::io(format!("creating {}-new", file_name), e))?;

    rewind(scratch.as_file_mut())?;
    io::copy(scratch.as_file_mut(), candidate.as_file_mut())
        .and_then(|_| candidate.as_file().sync_all())
        .map_err(|e| KilnError::io(format!("writing {}-new", file_name), e))?;

    if cache_file.exists() {
        if probe.is_open_by_another_process(cache_file) {
            debug!("{} is open elsewhere, not deleting", cache_file.display());
        } else {
            match fs::remove_file(cache_file) {
                Ok(()) => debug!("Removed stale {}", cache_file.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(KilnError::io(
                        format!("removing stale cache file {}", cache_file.display()),
                        e,
                    ))
                }
            }
        }
    }

    match candidate.persist_noclobber(cache_file) {
        Ok(_) => debug!("Promoted {}", cache_file.display()),
        // A peer got there first (or the old file is still live); its
        // content is just as valid. Dropping the error deletes ours.
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
            debug!("Keeping resident {}", cache_file.display());
        }
        Err(e) => return Err(promote_error(e.error.to_string())),
    }

    open_shared(cache_file)
        .map_err(|e| KilnError::io(format!("opening cache file {}", cache_file.display()), e))
}
