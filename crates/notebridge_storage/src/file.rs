//! File-based state store with atomic replacement.

use crate::backend::StateStore;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Suffix of the temporary file used for atomic writes.
const TEMP_SUFFIX: &str = ".tmp";
/// Suffix of the advisory lock file.
const LOCK_SUFFIX: &str = ".lock";

/// A state store backed by a single file.
///
/// ```text
/// <dir>/
/// ├─ sync_state.json        # current blob
/// ├─ sync_state.json.tmp    # only exists mid-write
/// └─ sync_state.json.lock   # advisory lock, held while the store is open
/// ```
///
/// # Durability
///
/// `write_atomic` uses the write-then-rename pattern:
/// 1. Write the blob to `<file>.tmp`
/// 2. `sync_all` the temporary file
/// 3. Rename it over `<file>`
/// 4. Fsync the parent directory so the rename itself is durable
///
/// # Exclusivity
///
/// Opening the store takes an exclusive `fs2` lock on `<file>.lock` that is
/// held until the store is dropped, so two engines can never run passes
/// against the same state file concurrently.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    temp_path: PathBuf,
    /// Serializes writers inside this process.
    write_guard: Mutex<()>,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl FileStateStore {
    /// Opens the store at `path`, creating parent directories if needed.
    ///
    /// The blob file itself is not created until the first write.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `path` names a directory
    /// - another process (or another store in this process) holds the lock
    ///   (returns [`StorageError::Locked`])
    /// - I/O errors occur
    pub fn open(path: &Path) -> StorageResult<Self> {
        if path.is_dir() {
            return Err(StorageError::InvalidPath(format!(
                "{} is a directory",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = with_suffix(path, LOCK_SUFFIX);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.to_path_buf()));
        }

        // A leftover temp file is the residue of a crash before the rename;
        // the previous blob is still authoritative.
        let temp_path = with_suffix(path, TEMP_SUFFIX);
        if temp_path.exists() {
            tracing::warn!(path = %temp_path.display(), "removing stale temporary state file");
            fs::remove_file(&temp_path)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            temp_path,
            write_guard: Mutex::new(()),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the blob file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        // Directory fsync is not directly supported on Windows
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn read(&self) -> StorageResult<Option<Vec<u8>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&self.path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(data))
    }

    fn write_atomic(&self, data: &[u8]) -> StorageResult<()> {
        let _guard = self.write_guard.lock();

        let mut file = File::create(&self.temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.temp_path, &self.path)?;
        self.sync_directory()?;

        tracing::debug!(path = %self.path.display(), bytes = data.len(), "state written");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
