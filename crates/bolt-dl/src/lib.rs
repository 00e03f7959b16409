//! Streaming HTTP retrieval used by the source cache and the `bolt fetch` command.
//!
//! [`Downloader::get`](downloader::Downloader::get) yields the body of a resource as a
//! lazy sequence of chunks, optionally folding every chunk into a caller owned digest.
//! [`Downloader::tag`](downloader::Downloader::tag) derives a cheap change-detection token
//! from a `HEAD` request.

pub mod downloader;
pub mod error;
pub mod http_client;
pub mod types;
pub mod utils;

pub use downloader::{Chunks, Downloader};
pub use error::DownloadError;
pub use types::Progress;
