//! Detect whether a peer process still has a file open

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;

/// Platform check used before deleting a shared cache file.
///
/// Deleting a file another process is reading can appear to succeed while
/// its bytes stay live, so the promotion step skips deletion when this
/// reports `true`.
pub trait OpenFileProbe: Send + Sync {
    fn is_open_by_another_process(&self, path: &Path) -> bool;
}

/// Treats any shared lock on the file as "open elsewhere"
#[derive(Debug, Default, Clone, Copy)]
pub struct SharedLockProbe;

impl OpenFileProbe for SharedLockProbe {
    fn is_open_by_another_process(&self, path: &Path) -> bool {
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return false,
            // Cannot tell: assume someone has it
            Err(_) => return true,
        };

        match fs4::FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                let _ = fs4::FileExt::unlock(&file);
                false
            }
            Err(_) => true,
        }
    }
}
