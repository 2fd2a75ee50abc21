//! Cross-process file primitives
//!
//! Cache files are shared between every process that uses the same cache
//! directory, so in-process mutexes are not enough. Mutation of a cache
//! file happens under a named exclusive lock (`<file>.lock`), and readers
//! hold a shared advisory lock on the cache file itself for as long as
//! their handle is open.

pub mod probe;

pub use probe::{OpenFileProbe, SharedLockProbe};

use crate::error::{KilnError, KilnResult};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix of the sidecar file used as a named lock
pub const LOCK_SUFFIX: &str = ".lock";

/// Exclusive lock on a named resource, released when dropped
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until the lock guarding `resource` is held.
    ///
    /// Call from a blocking context (`spawn_blocking`), never directly on
    /// the async executor.
    pub fn acquire(resource: &Path) -> KilnResult<Self> {
        let path = lock_path(resource);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                KilnError::io(format!("creating lock directory {}", parent.display()), e)
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| KilnError::io(format!("opening lock {}", path.display()), e))?;

        fs4::FileExt::lock_exclusive(&file)
            .map_err(|e| KilnError::io(format!("locking {}", path.display()), e))?;

        debug!("Acquired lock {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = fs4::FileExt::unlock(&self.file) {
            debug!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}

/// Sidecar lock path for a resource
pub fn lock_path(resource: &Path) -> PathBuf {
    let mut name: OsString = resource.as_os_str().to_owned();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

/// Open a file for reading while holding a shared lock on it.
///
/// The lock lives as long as the returned handle, which tells writers the
/// file is in use.
pub fn open_shared(path: &Path) -> io::Result<File> {
    let file = File::open(path)?;
    fs4::FileExt::lock_shared(&file)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn lock_path_appends_suffix() {
        assert_eq!(
            lock_path(Path::new("/c/abc/pkg.dat")),
            PathBuf::from("/c/abc/pkg.dat.lock")
        );
    }

    #[test]
    fn acquire_creates_parent() {
        let temp = TempDir::new().unwrap();
        let resource = temp.path().join("nested").join("pkg.dat");

        let lock = FileLock::acquire(&resource).unwrap();

        assert!(lock.path().exists());
        assert!(!resource.exists());
    }

    #[test]
    fn lock_is_exclusive_until_dropped() {
        let temp = TempDir::new().unwrap();
        let resource = temp.path().join("pkg.dat");
        let released = Arc::new(AtomicBool::new(false));

        let first = FileLock::acquire(&resource).unwrap();

        let waiter = {
            let resource = resource.clone();
            let released = Arc::clone(&released);
            thread::spawn(move || {
                let _second = FileLock::acquire(&resource).unwrap();
                assert!(released.load(Ordering::SeqCst));
            })
        };

        thread::sleep(Duration::from_millis(100));
        released.store(true, Ordering::SeqCst);
        drop(first);

        waiter.join().unwrap();
    }

    #[test]
    fn shared_open_reads_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pkg.dat");
        fs::write(&path, b"payload").unwrap();

        let file = open_shared(&path).unwrap();
        let content = io::read_to_string(file).unwrap();

        assert_eq!(content, "payload");
    }
}
