//! Local cache of upstream source archives.

use std::{
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use bolt_config::config::Config;
use bolt_dl::{utils::join_url, Downloader};
use bolt_utils::{fs::ensure_dir_exists, hash::verify_checksum};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::{error::ErrorContext, BoltResult};

/// Resolves source archives of a package to local files.
pub trait SourceCache {
    /// Returns a local path for `archive`, fetching it if necessary.
    ///
    /// An empty `sha256` skips verification. `None` means the archive could not
    /// be produced, including when its checksum did not match.
    fn find_and_retrieve(
        &self,
        name: &str,
        version: &str,
        archive: &str,
        sha256: &str,
    ) -> BoltResult<Option<PathBuf>>;
}

/// Source cache laid out as `<cache>/<first letter>/<name>/<version>/<archive>`,
/// optionally backed by a mirror with the same layout.
pub struct LocalSourceCache {
    cache_dir: PathBuf,
    mirror: Option<String>,
    timeout: Duration,
    downloader: Downloader,
}

impl LocalSourceCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            mirror: None,
            timeout: bolt_dl::downloader::DEFAULT_TIMEOUT,
            downloader: Downloader::new(),
        }
    }

    pub fn from_config(config: &Config) -> BoltResult<Self> {
        let mut cache = Self::new(config.source_cache_path()?).timeout(config.fetch_timeout());
        if let Some(mirror) = &config.source_mirror {
            cache = cache.mirror(mirror);
        }
        Ok(cache)
    }

    pub fn mirror(mut self, url: impl Into<String>) -> Self {
        self.mirror = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path of an archive relative to the cache root, `None` for an empty name.
    pub fn relative_path(name: &str, version: &str, archive: &str) -> Option<PathBuf> {
        let first = name.chars().next()?;
        Some(
            PathBuf::from(first.to_string())
                .join(name)
                .join(version)
                .join(archive),
        )
    }

    fn fetch(&self, mirror: &str, relative: &Path, dest: &Path, sha256: &str) -> BoltResult<bool> {
        let url = join_url(mirror, &relative.to_string_lossy());
        let parent = dest.parent().unwrap_or(&self.cache_dir);
        ensure_dir_exists(parent)?;

        info!("fetching {}", url);

        let mut tmp = NamedTempFile::new_in(parent)
            .with_context(|| format!("creating temporary file in {}", parent.display()))?;
        let mut digest = Sha256::new();

        for chunk in self.downloader.get(&url, Some(&mut digest), self.timeout)? {
            tmp.write_all(&chunk?)
                .with_context(|| format!("writing {}", tmp.path().display()))?;
        }

        let actual = hex::encode(digest.finalize());
        if !sha256.is_empty() && !actual.eq_ignore_ascii_case(sha256) {
            warn!(
                "checksum mismatch for {}: expected {}, got {}",
                url, sha256, actual
            );
            return Ok(false);
        }

        tmp.persist(dest)
            .map_err(|err| err.error)
            .with_context(|| format!("moving download to {}", dest.display()))?;
        Ok(true)
    }
}

impl SourceCache for LocalSourceCache {
    fn find_and_retrieve(
        &self,
        name: &str,
        version: &str,
        archive: &str,
        sha256: &str,
    ) -> BoltResult<Option<PathBuf>> {
        let Some(relative) = Self::relative_path(name, version, archive) else {
            return Ok(None);
        };
        let path = self.cache_dir.join(&relative);

        if path.is_file() {
            if sha256.is_empty() || verify_checksum(&path, sha256)? {
                debug!("cache hit for {}", path.display());
                return Ok(Some(path));
            }
            warn!("cached {} does not match its checksum", path.display());
        }

        let Some(mirror) = &self.mirror else {
            debug!("{} not cached and no mirror configured", relative.display());
            return Ok(None);
        };

        Ok(self
            .fetch(mirror, &relative, &path, sha256)?
            .then_some(path))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use bolt_utils::hash::checksum_bytes;
    use httpmock::prelude::*;

    use super::*;

    const ARCHIVE_PATH: &str = "/h/hello/1.0/hello-1.0.tar.gz";

    fn serve_archive<'a>(server: &'a MockServer, body: &[u8]) -> httpmock::Mock<'a> {
        server.mock(|when, then| {
            when.method(GET).path(ARCHIVE_PATH);
            then.status(200).body(body);
        })
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_relative_path_layout() {
        assert_eq!(
            LocalSourceCache::relative_path("hello", "2.12", "hello-2.12.tar.gz"),
            Some(PathBuf::from("h/hello/2.12/hello-2.12.tar.gz"))
        );
        assert_eq!(LocalSourceCache::relative_path("", "1", "x"), None);
    }

    #[test]
    fn test_cache_hit_with_and_without_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalSourceCache::new(dir.path());
        let path = dir.path().join("h/hello/1.0/hello-1.0.tar.gz");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"archive").unwrap();

        let found = cache
            .find_and_retrieve("hello", "1.0", "hello-1.0.tar.gz", "")
            .unwrap();
        assert_eq!(found, Some(path.clone()));

        let sha = checksum_bytes(b"archive");
        let found = cache
            .find_and_retrieve("hello", "1.0", "hello-1.0.tar.gz", &sha.to_uppercase())
            .unwrap();
        assert_eq!(found, Some(path));
    }

    #[test]
    fn test_checksum_mismatch_without_mirror_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalSourceCache::new(dir.path());
        let path = dir.path().join("h/hello/1.0/hello-1.0.tar.gz");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"tampered").unwrap();

        let found = cache
            .find_and_retrieve("hello", "1.0", "hello-1.0.tar.gz", &checksum_bytes(b"archive"))
            .unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn test_missing_without_mirror_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalSourceCache::new(dir.path());
        assert_eq!(
            cache
                .find_and_retrieve("zlib", "1.3", "zlib-1.3.tar.xz", "")
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_from_config() {
        let config = Config {
            source_cache: Some("/var/cache/bolt".into()),
            source_mirror: Some("https://mirror.example.org/src".into()),
            fetch_timeout: Some(7),
            ..Default::default()
        };
        let cache = LocalSourceCache::from_config(&config).unwrap();
        assert_eq!(cache.cache_dir(), Path::new("/var/cache/bolt"));
        assert_eq!(cache.mirror.as_deref(), Some("https://mirror.example.org/src"));
        assert_eq!(cache.timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_mirror_fetch_persists_verified_archive() {
        let server = MockServer::start();
        let mock = serve_archive(&server, b"upstream archive");
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalSourceCache::new(dir.path()).mirror(server.base_url());

        let found = cache
            .find_and_retrieve(
                "hello",
                "1.0",
                "hello-1.0.tar.gz",
                &checksum_bytes(b"upstream archive"),
            )
            .unwrap();

        let path = dir.path().join("h/hello/1.0/hello-1.0.tar.gz");
        assert_eq!(found, Some(path.clone()));
        assert_eq!(fs::read(&path).unwrap(), b"upstream archive");
        assert_eq!(dir_entries(path.parent().unwrap()), vec!["hello-1.0.tar.gz"]);
        mock.assert();

        // Served from disk the second time.
        let found = cache
            .find_and_retrieve("hello", "1.0", "hello-1.0.tar.gz", "")
            .unwrap();
        assert_eq!(found, Some(path));
        mock.assert_hits(1);
    }

    #[test]
    fn test_mirror_checksum_mismatch_discards_download() {
        let server = MockServer::start();
        let mock = serve_archive(&server, b"corrupted archive");
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalSourceCache::new(dir.path()).mirror(server.base_url());

        let found = cache
            .find_and_retrieve(
                "hello",
                "1.0",
                "hello-1.0.tar.gz",
                &checksum_bytes(b"upstream archive"),
            )
            .unwrap();

        assert_eq!(found, None);
        let parent = dir.path().join("h/hello/1.0");
        assert!(!parent.join("hello-1.0.tar.gz").exists());
        assert!(dir_entries(&parent).is_empty());
        mock.assert();
    }

    #[test]
    fn test_mirror_replaces_stale_cached_archive() {
        let server = MockServer::start();
        serve_archive(&server, b"upstream archive");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h/hello/1.0/hello-1.0.tar.gz");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"stale").unwrap();

        let cache = LocalSourceCache::new(dir.path()).mirror(server.base_url());
        let found = cache
            .find_and_retrieve(
                "hello",
                "1.0",
                "hello-1.0.tar.gz",
                &checksum_bytes(b"upstream archive"),
            )
            .unwrap();

        assert_eq!(found, Some(path.clone()));
        assert_eq!(fs::read(&path).unwrap(), b"upstream archive");
    }

    #[test]
    fn test_mirror_fetch_without_checksum() {
        let server = MockServer::start();
        serve_archive(&server, b"anything");
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalSourceCache::new(dir.path()).mirror(server.base_url());

        let found = cache
            .find_and_retrieve("hello", "1.0", "hello-1.0.tar.gz", "")
            .unwrap();
        assert_eq!(fs::read(found.unwrap()).unwrap(), b"anything");
    }

    #[test]
    fn test_mirror_http_error_propagates() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(ARCHIVE_PATH);
            then.status(404);
        });
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalSourceCache::new(dir.path()).mirror(server.base_url());

        assert!(cache
            .find_and_retrieve("hello", "1.0", "hello-1.0.tar.gz", "")
            .is_err());
        assert!(!dir.path().join("h/hello/1.0/hello-1.0.tar.gz").exists());
    }
}
