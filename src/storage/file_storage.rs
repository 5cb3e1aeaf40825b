use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::StorageHandler;

const FILE_PREFIX: &str = "sess_";

/// Session handler storing each session in its own file (`sess_<id>`).
///
/// Built with [`FileStorage::new`] the directory is fixed. Built with
/// [`FileStorage::unbound`] the directory is taken from the `save_path` passed to `open`,
/// falling back to the system temp directory when that is empty.
pub struct FileStorage {
    base_path: Mutex<Option<PathBuf>>,
    pinned: bool,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).map_err(|e| {
            error!("Failed to create session dir {}: {}", base_path.display(), e);
            StorageError::ConnectionFailed
        })?;
        info!("FileStorage initialized at {}", base_path.display());
        Ok(Self {
            base_path: Mutex::new(Some(base_path)),
            pinned: true,
        })
    }

    pub fn unbound() -> Self {
        Self {
            base_path: Mutex::new(None),
            pinned: false,
        }
    }

    fn dir(&self) -> PathBuf {
        match self.base_path.lock() {
            Ok(guard) => guard.clone().unwrap_or_else(std::env::temp_dir),
            Err(poisoned) => poisoned.into_inner().clone().unwrap_or_else(std::env::temp_dir),
        }
    }

    fn session_file(&self, id: &str, err: StorageError) -> Result<PathBuf, StorageError> {
        // ids become file names: nothing that could leave the directory
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == ',' || c == '-') {
            error!("Refusing unsafe session id {:?} for file storage", id);
            return Err(err);
        }
        Ok(self.dir().join(format!("{}{}", FILE_PREFIX, id)))
    }
}

impl StorageHandler for FileStorage {
    fn open(&self, save_path: &str, name: &str) -> Result<bool, StorageError> {
        if !self.pinned {
            let dir = if save_path.is_empty() {
                std::env::temp_dir()
            } else {
                PathBuf::from(save_path)
            };
            if let Ok(mut guard) = self.base_path.lock() {
                *guard = Some(dir);
            }
        }
        let dir = self.dir();
        fs::create_dir_all(&dir).map_err(|e| {
            error!("Failed to create session dir {}: {}", dir.display(), e);
            StorageError::ConnectionFailed
        })?;
        debug!("FileStorage opened {} for session name {}", dir.display(), name);
        Ok(true)
    }

    fn close(&self) -> Result<bool, StorageError> {
        Ok(true)
    }

    fn read(&self, id: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.session_file(id, StorageError::ReadFailed)?;
        match fs::read(&path) {
            Ok(buf) => {
                debug!("Read {} byte(s) from {}", buf.len(), path.display());
                Ok(buf)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => {
                error!("Read failed {}: {}", path.display(), e);
                Err(StorageError::ReadFailed)
            }
        }
    }

    fn write(&self, id: &str, data: &[u8]) -> Result<bool, StorageError> {
        let path = self.session_file(id, StorageError::WriteFailed)?;
        fs::write(&path, data).map_err(|e| {
            error!("Write failed {}: {}", path.display(), e);
            StorageError::WriteFailed
        })?;
        debug!("Wrote {} byte(s) to {}", data.len(), path.display());
        Ok(true)
    }

    fn destroy(&self, id: &str) -> Result<bool, StorageError> {
        let path = self.session_file(id, StorageError::DestroyFailed)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => {
                error!("Failed to remove {}: {}", path.display(), e);
                Err(StorageError::DestroyFailed)
            }
        }
    }

    fn gc(&self, max_age: i64) -> Result<bool, StorageError> {
        let dir = self.dir();
        let cutoff = Utc::now().timestamp().saturating_sub(max_age);
        let entries = fs::read_dir(&dir).map_err(|e| {
            error!("Failed to read session dir {}: {}", dir.display(), e);
            StorageError::GcFailed
        })?;
        let mut removed = 0usize;
        for entry in entries {
            let entry = entry.map_err(|e| {
                error!("Dir entry error: {}", e);
                StorageError::GcFailed
            })?;
            if !entry.file_name().to_string_lossy().starts_with(FILE_PREFIX) {
                continue;
            }
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => DateTime::<Utc>::from(t).timestamp(),
                Err(e) => {
                    warn!("Skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            if modified < cutoff {
                fs::remove_file(entry.path()).map_err(|e| {
                    error!("Failed to remove {}: {}", entry.path().display(), e);
                    StorageError::GcFailed
                })?;
                removed += 1;
            }
        }
        info!(
            "Removed {} expired session file(s) from {} (cutoff: {})",
            removed,
            dir.display(),
            cutoff
        );
        Ok(true)
    }
}
