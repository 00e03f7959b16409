use std::{fs, path::Path};

use crate::error::{FileSystemError, FileSystemResult};

pub trait FileSystemProvider {
    /// Creates a directory structure if it doesn't exist.
    ///
    /// # Errors
    ///
    /// * [`FileSystemError::Directory`] if the directory could not be created.
    /// * [`FileSystemError::NotADirectory`] if the path exists but is not a directory.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use bolt_utils::error::FileSystemResult;
    /// use bolt_utils::fs::{FileSystemProvider, StandardFileSystemProvider};
    ///
    /// fn main() -> FileSystemResult<()> {
    ///     let fs = StandardFileSystemProvider;
    ///     fs.ensure_dir_exists("/tmp/bolt-doc/sources/hello")?;
    ///     Ok(())
    /// }
    /// ```
    fn ensure_dir_exists<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<()>;

    /// Removes every symlink directly inside `dir`, leaving other entries alone.
    ///
    /// Returns the number of links removed.
    fn remove_symlinks<P: AsRef<Path>>(&self, dir: P) -> FileSystemResult<usize>;
}

#[derive(Default, Clone)]
pub struct StandardFileSystemProvider;

impl FileSystemProvider for StandardFileSystemProvider {
    fn ensure_dir_exists<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path).map_err(|err| FileSystemError::Directory {
                path: path.to_path_buf(),
                action: "create",
                source: err,
            })?;
        } else if !path.is_dir() {
            return Err(FileSystemError::NotADirectory {
                path: path.to_path_buf(),
            });
        }

        Ok(())
    }

    fn remove_symlinks<P: AsRef<Path>>(&self, dir: P) -> FileSystemResult<usize> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|err| FileSystemError::Directory {
            path: dir.to_path_buf(),
            action: "read",
            source: err,
        })?;

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|err| FileSystemError::Directory {
                path: dir.to_path_buf(),
                action: "read",
                source: err,
            })?;
            let is_symlink = entry
                .file_type()
                .map(|t| t.is_symlink())
                .unwrap_or(false);
            if !is_symlink {
                continue;
            }

            let path = entry.path();
            fs::remove_file(&path).map_err(|err| FileSystemError::File {
                path: path.clone(),
                action: "remove",
                source: err,
            })?;
            removed += 1;
        }

        Ok(removed)
    }
}

/// Creates a directory structure if it doesn't exist.
///
/// See [`FileSystemProvider::ensure_dir_exists`] for detailed documentation.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    StandardFileSystemProvider.ensure_dir_exists(path)
}

/// Removes every symlink directly inside `dir`.
///
/// See [`FileSystemProvider::remove_symlinks`] for detailed documentation.
pub fn remove_symlinks<P: AsRef<Path>>(dir: P) -> FileSystemResult<usize> {
    StandardFileSystemProvider.remove_symlinks(dir)
}
