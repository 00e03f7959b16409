//! Advisory `flock` locks for serialising writers.
//!
//! The repository indexer assumes a single writer per repository directory. Callers that
//! may run concurrently take a [`FileLock`] keyed by the resource they mutate.

use std::{
    fs::{self, File, OpenOptions},
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

use crate::{
    error::{LockError, LockResult},
    hash::checksum_bytes,
};

/// A file-based lock using `flock`.
///
/// The lock is released when `FileLock` is dropped.
pub struct FileLock {
    _file: nix::fcntl::Flock<File>,
    path: PathBuf,
}

impl FileLock {
    /// Uses `$XDG_RUNTIME_DIR/bolt/locks`, falling back to the system temp dir.
    fn lock_dir() -> LockResult<PathBuf> {
        let base = std::env::var_os("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);

        let lock_dir = base.join("bolt").join("locks");
        if !lock_dir.exists() {
            fs::create_dir_all(&lock_dir)?;
        }

        Ok(lock_dir)
    }

    fn lock_path(name: &str) -> LockResult<PathBuf> {
        let sanitized = name
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>();

        Ok(Self::lock_dir()?.join(format!("{sanitized}.lock")))
    }

    fn open(lock_path: &Path) -> LockResult<File> {
        Ok(OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?)
    }

    /// Acquire an exclusive lock, blocking until it becomes available.
    pub fn acquire(name: &str) -> LockResult<Self> {
        let lock_path = Self::lock_path(name)?;
        let file = Self::open(&lock_path)?;

        let file = nix::fcntl::Flock::lock(file, nix::fcntl::FlockArg::LockExclusive).map_err(
            |(_, err)| LockError::AcquireFailed(format!("{}: {}", lock_path.display(), err)),
        )?;

        Ok(FileLock {
            path: lock_path,
            _file: file,
        })
    }

    /// Try to acquire an exclusive lock without blocking.
    ///
    /// Returns `None` if the lock is already held elsewhere.
    pub fn try_acquire(name: &str) -> LockResult<Option<Self>> {
        let lock_path = Self::lock_path(name)?;
        let file = Self::open(&lock_path)?;

        match nix::fcntl::Flock::lock(file, nix::fcntl::FlockArg::LockExclusiveNonblock) {
            Ok(file) => Ok(Some(FileLock {
                path: lock_path,
                _file: file,
            })),
            Err((_, nix::errno::Errno::EWOULDBLOCK)) => Ok(None),
            Err((_, err)) => Err(LockError::AcquireFailed(format!(
                "{}: {}",
                lock_path.display(),
                err
            ))),
        }
    }

    /// Lock name for `dir`: its last component plus a digest of the canonical
    /// path, so distinct directories never share a lock file.
    fn dir_lock_name(dir: &Path) -> String {
        let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let digest = checksum_bytes(canonical.as_os_str().as_bytes());
        let base = canonical
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("dir-{base}-{}", &digest[..16])
    }

    /// Lock keyed by a directory, e.g. a repository root. Blocks until free.
    pub fn acquire_for_dir(dir: &Path) -> LockResult<Self> {
        Self::acquire(&Self::dir_lock_name(dir))
    }

    /// Non-blocking variant of [`FileLock::acquire_for_dir`].
    pub fn try_acquire_for_dir(dir: &Path) -> LockResult<Option<Self>> {
        Self::try_acquire(&Self::dir_lock_name(dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
