use std::{io::Read as _, time::Duration};

use rand::{distributions::Alphanumeric, Rng};
use sha2::{digest::Update, Digest, Sha256};
use tracing::trace;
use ureq::{
    http::{
        header::{CONTENT_LENGTH, ETAG, LAST_MODIFIED},
        Response,
    },
    Body, BodyReader,
};
use url::Url;

use crate::{error::DownloadError, http_client::SHARED_AGENT, types::Progress};

pub const DEFAULT_CHUNK_SIZE: usize = 8192;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

type ProgressFn = Box<dyn Fn(Progress) + Send + Sync>;

/// Streams remote resources through the shared HTTP agent.
pub struct Downloader {
    chunk_size: usize,
    on_progress: Option<ProgressFn>,
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            on_progress: None,
        }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Registers a progress callback.
    ///
    /// The callback only fires for responses that declare a `Content-Length`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bolt_dl::{Downloader, Progress};
    ///
    /// let _dl = Downloader::new().progress(|event: Progress| {
    ///     if let Progress::Chunk { current, total } = event {
    ///         eprintln!("{current}/{total}");
    ///     }
    /// });
    /// ```
    pub fn progress<F>(mut self, on_progress: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Box::new(on_progress));
        self
    }

    /// Opens a streaming GET on `url` and returns its body as a sequence of chunks.
    ///
    /// When `digest` is given every chunk is folded into it before being yielded. The
    /// connection is released when the returned [`Chunks`] is dropped, whether or not it
    /// was read to the end.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use bolt_dl::Downloader;
    /// use sha2::{Digest, Sha256};
    ///
    /// let mut sha = Sha256::new();
    /// let downloader = Downloader::new();
    /// let mut body = Vec::new();
    /// for chunk in downloader
    ///     .get("https://example.com/hello.tar.gz", Some(&mut sha), Duration::from_secs(30))
    ///     .unwrap()
    /// {
    ///     body.extend(chunk.unwrap());
    /// }
    /// println!("{:x}", sha.finalize());
    /// ```
    pub fn get<'a>(
        &'a self,
        url: &str,
        digest: Option<&'a mut dyn Update>,
        timeout: Duration,
    ) -> Result<Chunks<'a>, DownloadError> {
        validate_url(url)?;

        let resp = SHARED_AGENT
            .get(url)
            .config()
            .timeout_connect(Some(timeout))
            .build()
            .call()
            .map_err(|err| DownloadError::request(url, err))?;

        let total = content_length(&resp);
        trace!(url, ?total, "streaming response");

        let progress = match (&self.on_progress, total) {
            (Some(cb), Some(total)) => {
                cb(Progress::Starting { total });
                Some(cb.as_ref())
            }
            _ => None,
        };

        Ok(Chunks {
            url: url.to_string(),
            reader: resp.into_body().into_reader(),
            digest,
            progress,
            total: total.unwrap_or(0),
            bytes_read: 0,
            chunk_size: self.chunk_size,
            finished: false,
        })
    }

    /// Derives a 16 hex character change-detection tag for `url` from a HEAD request.
    ///
    /// The tag hashes the `ETag` and `Last-Modified` headers. A missing `Last-Modified`
    /// is replaced by random characters, so such resources always appear changed.
    pub fn tag(&self, url: &str, timeout: Duration) -> Result<String, DownloadError> {
        validate_url(url)?;

        let resp = SHARED_AGENT
            .head(url)
            .config()
            .timeout_connect(Some(timeout))
            .build()
            .call()
            .map_err(|err| DownloadError::Tag {
                url: url.to_string(),
                source: Box::new(err),
            })?;

        let header = |name| {
            resp.headers()
                .get(name)
                .and_then(|h| h.to_str().ok())
                .map(String::from)
        };

        Ok(tag_from_headers(
            header(ETAG).as_deref(),
            header(LAST_MODIFIED).as_deref(),
        ))
    }
}

/// Lazy, finite, non-restartable body stream returned by [`Downloader::get`].
pub struct Chunks<'a> {
    url: String,
    reader: BodyReader<'static>,
    digest: Option<&'a mut dyn Update>,
    progress: Option<&'a (dyn Fn(Progress) + Send + Sync)>,
    total: u64,
    bytes_read: u64,
    chunk_size: usize,
    finished: bool,
}

impl Chunks<'_> {
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl Iterator for Chunks<'_> {
    type Item = Result<Vec<u8>, DownloadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut buffer = vec![0u8; self.chunk_size];
        let n = match self.reader.read(&mut buffer) {
            Ok(n) => n,
            Err(err) => {
                self.finished = true;
                return Some(Err(DownloadError::Read {
                    url: self.url.clone(),
                    source: err,
                }));
            }
        };

        if n == 0 {
            self.finished = true;
            if let Some(cb) = self.progress {
                cb(Progress::Complete { total: self.total });
            }
            return None;
        }

        buffer.truncate(n);
        self.bytes_read += n as u64;

        if let Some(digest) = self.digest.as_mut() {
            digest.update(&buffer);
        }
        if let Some(cb) = self.progress {
            cb(Progress::Chunk {
                current: self.bytes_read,
                total: self.total,
            });
        }

        Some(Ok(buffer))
    }
}

/// Builds the change-detection token from response header values.
pub fn tag_from_headers(etag: Option<&str>, last_modified: Option<&str>) -> String {
    let last_modified = match last_modified {
        Some(value) => value.to_string(),
        None => rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect(),
    };

    let mut sha256 = Sha256::new();
    Digest::update(&mut sha256, etag.unwrap_or("").as_bytes());
    Digest::update(&mut sha256, last_modified.as_bytes());

    let mut tag = hex::encode(sha256.finalize());
    tag.truncate(16);
    tag
}

fn validate_url(url: &str) -> Result<(), DownloadError> {
    Url::parse(url)
        .map(|_| ())
        .map_err(|source| DownloadError::InvalidUrl {
            url: url.to_string(),
            source,
        })
}

fn content_length(resp: &Response<Body>) -> Option<u64> {
    resp.headers()
        .get(CONTENT_LENGTH)
        .and_then(|h| h.to_str().ok())
        .and_then(|len| len.parse::<u64>().ok())
}
