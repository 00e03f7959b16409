//! Incremental indexing of a pool of binary packages.
//!
//! [`RepoIndexer::update_package_index`] runs one cycle: load the previously
//! published `Packages.gz`, scan the pool for packages not yet indexed, prune
//! records whose archive is gone, republish atomically and refresh the
//! `by-hash/SHA256` link.

mod index;

use std::{
    cmp::Ordering,
    fs::{self, File, Permissions},
    io::{BufReader, Read},
    os::unix::fs::{symlink, PermissionsExt},
    path::{Path, PathBuf},
};

use bolt_package::{archive, compare_versions, ControlMetadata};
use bolt_utils::{
    fs::{ensure_dir_exists, remove_symlinks},
    hash::calculate_checksum,
};
pub use index::{RepositoryIndex, VersionComparator};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{error::ErrorContext, BoltError, BoltResult};

pub const INDEX_FILE: &str = "Packages.gz";
pub const PACKAGE_EXTENSION: &str = ".bolt";
pub const BY_HASH_DIR: &str = "by-hash/SHA256";

const CONTROL_ARCHIVE_PREFIX: &str = "control.tar.";
const CONTROL_FILE: &str = "control";
const INDEX_MODE: u32 = 0o644;

/// Maintains `Packages.gz` for one repository directory.
///
/// Callers must make sure only one indexer writes to a directory at a time.
pub struct RepoIndexer {
    repo_dir: PathBuf,
    force_full: bool,
    compare: Box<VersionComparator>,
}

impl RepoIndexer {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            force_full: false,
            compare: Box::new(compare_versions),
        }
    }

    /// Ignores the published index and re-extracts every package.
    pub fn force_full(mut self, force_full: bool) -> Self {
        self.force_full = force_full;
        self
    }

    /// Replaces the version ordering used when publishing.
    pub fn comparator<F>(mut self, compare: F) -> Self
    where
        F: Fn(&str, &str) -> Ordering + Send + Sync + 'static,
    {
        self.compare = Box::new(compare);
        self
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.repo_dir.join(INDEX_FILE)
    }

    /// Runs a full load, scan, prune, publish and hash-link cycle.
    ///
    /// Returns the index as published.
    pub fn update_package_index(&self) -> BoltResult<RepositoryIndex> {
        let mut index = if self.force_full {
            RepositoryIndex::new()
        } else {
            self.load_package_index()?
        };

        let scanned = self.scan(&index).collect::<BoltResult<Vec<_>>>()?;
        let added = scanned
            .into_iter()
            .filter(|metadata| index.insert_if_absent(metadata.clone()))
            .count();
        let pruned = self.prune_package_index(&mut index);

        info!(
            "{}: {} packages indexed, {} added, {} pruned",
            self.repo_dir.display(),
            index.len(),
            added,
            pruned
        );

        self.store_package_index(&index)?;
        self.make_hash_links()?;

        Ok(index)
    }

    /// Reads the published index, or an empty one if there is none.
    pub fn load_package_index(&self) -> BoltResult<RepositoryIndex> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(RepositoryIndex::new());
        }

        let mut text = String::new();
        archive::open_decompressed(&path)?
            .read_to_string(&mut text)
            .with_context(|| format!("reading {}", path.display()))?;

        let index = RepositoryIndex::parse(&text);
        debug!("loaded {} records from {}", index.len(), path.display());
        Ok(index)
    }

    /// Walks the pool and yields control data of packages missing from `index`.
    ///
    /// Files that are not named `<name>_<version>_<arch>.bolt` and archives that
    /// cannot be read are skipped. Each call starts a fresh walk.
    pub fn scan<'a>(
        &'a self,
        index: &'a RepositoryIndex,
    ) -> impl Iterator<Item = BoltResult<ControlMetadata>> + 'a {
        WalkDir::new(&self.repo_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| {
                entry
                    .map_err(|err| warn!("skipping unreadable pool entry: {}", err))
                    .ok()
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(move |entry| {
                let file_name = entry.file_name().to_str()?;
                let stem = file_name.strip_suffix(PACKAGE_EXTENSION)?;

                let parts: Vec<&str> = stem.split('_').collect();
                let [name, version, _arch] = parts[..] else {
                    debug!("skipping {}: not a package file name", file_name);
                    return None;
                };

                if index.contains(name, version) {
                    return None;
                }

                match self.extract_control_data(entry.path()) {
                    Ok(metadata) => Some(Ok(metadata)),
                    Err(err) if err.is_recoverable() => {
                        debug!("{}", err);
                        None
                    }
                    Err(err) => Some(Err(err)),
                }
            })
    }

    /// Drops records whose `Filename` no longer exists. Returns the number
    /// removed.
    pub fn prune_package_index(&self, index: &mut RepositoryIndex) -> usize {
        index.retain(|metadata| {
            metadata
                .filename()
                .is_some_and(|filename| self.repo_dir.join(filename).exists())
        })
    }

    /// Atomically publishes `index` as `Packages.gz`.
    ///
    /// An empty index is not published. Returns whether a file was written.
    pub fn store_package_index(&self, index: &RepositoryIndex) -> BoltResult<bool> {
        if index.is_empty() {
            debug!("index is empty, not publishing");
            return Ok(false);
        }

        let text = index.serialize(self.compare.as_ref());
        let path = self.index_path();

        let tmp = NamedTempFile::new_in(&self.repo_dir)
            .with_context(|| format!("creating temporary file in {}", self.repo_dir.display()))?;
        let tmp = archive::gzip(text.as_bytes(), tmp)?;

        tmp.as_file()
            .sync_all()
            .with_context(|| format!("syncing {}", tmp.path().display()))?;
        fs::set_permissions(tmp.path(), Permissions::from_mode(INDEX_MODE))
            .with_context(|| format!("setting permissions on {}", tmp.path().display()))?;

        tmp.persist(&path)
            .map_err(|err| err.error)
            .with_context(|| format!("publishing {}", path.display()))?;

        info!("published {}", path.display());
        Ok(true)
    }

    /// Points `by-hash/SHA256/<digest>` at the published index, removing stale
    /// links. Does nothing if the link is already current or nothing is
    /// published.
    pub fn make_hash_links(&self) -> BoltResult<()> {
        let index_path = self.index_path();
        if !index_path.is_file() {
            return Ok(());
        }

        let digest = calculate_checksum(&index_path)?;
        let hash_dir = self.repo_dir.join(BY_HASH_DIR);
        let link = hash_dir.join(&digest);

        if link.exists() {
            return Ok(());
        }

        ensure_dir_exists(&hash_dir)?;
        let removed = remove_symlinks(&hash_dir)?;
        debug!("removed {} stale hash links", removed);

        let target = Path::new("../..").join(INDEX_FILE);
        symlink(&target, &link).with_context(|| format!("creating link {}", link.display()))?;
        Ok(())
    }

    /// Reads the control block embedded in the package at `path`.
    ///
    /// The `control.tar.*` member is streamed to a scratch directory that is
    /// removed on every exit path, then searched for the `control` file.
    /// `Filename`, `SHA256` and `Size` are appended.
    pub fn extract_control_data(&self, path: &Path) -> BoltResult<ControlMetadata> {
        let malformed = |reason: String| {
            BoltError::MalformedPackage {
                path: path.to_path_buf(),
                reason,
            }
        };

        let scratch =
            tempfile::tempdir().with_context(|| "creating scratch directory".to_string())?;
        let control_archive = scratch.path().join("control.tar");

        {
            let mut out = File::create(&control_archive)
                .with_context(|| format!("creating {}", control_archive.display()))?;
            let is_control_archive = |name: &str| name.starts_with(CONTROL_ARCHIVE_PREFIX);

            let found = if archive::is_ar_archive(path)? {
                let reader =
                    File::open(path).with_context(|| format!("opening {}", path.display()))?;
                archive::copy_ar_member(BufReader::new(reader), is_control_archive, &mut out)
            } else {
                archive::open_decompressed(path)
                    .and_then(|reader| archive::copy_tar_member(reader, is_control_archive, &mut out))
            };

            found
                .map_err(|err| malformed(err.to_string()))?
                .ok_or_else(|| malformed("no control archive member".into()))?;
        }

        let mut control = Vec::new();
        archive::open_decompressed(&control_archive)
            .and_then(|reader| {
                archive::copy_tar_member(reader, |name| name == CONTROL_FILE, &mut control)
            })
            .map_err(|err| malformed(err.to_string()))?
            .ok_or_else(|| malformed("no control file in control archive".into()))?;

        let text =
            String::from_utf8(control).map_err(|_| malformed("control file is not UTF-8".into()))?;
        let mut metadata =
            ControlMetadata::parse(text.trim()).map_err(|err| malformed(err.to_string()))?;

        if metadata.package().is_none() || metadata.version().is_none() {
            return Err(malformed("control file lacks Package or Version".into()));
        }

        let relative = path.strip_prefix(&self.repo_dir).unwrap_or(path);
        let size = fs::metadata(path)
            .with_context(|| format!("reading metadata of {}", path.display()))?
            .len();

        metadata.set("Filename", relative.to_string_lossy());
        metadata.set("SHA256", calculate_checksum(path)?);
        metadata.set("Size", size.to_string());

        Ok(metadata)
    }
}
