use std::{io::Write, path::PathBuf};

use bolt_config::config::get_config;
use bolt_core::{
    error::{BoltError, ErrorContext},
    BoltResult,
};
use bolt_dl::{utils::filename_from_url, Downloader};
use bolt_utils::{fs::ensure_dir_exists, path::resolve_path};
use nu_ansi_term::Color::{Blue, Green};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::info;

use crate::{
    progress::{create_progress_bar, handle_progress},
    utils::Colored,
};

fn output_path(url: &str, output: Option<&str>) -> BoltResult<PathBuf> {
    if let Some(output) = output {
        return Ok(resolve_path(output)?);
    }

    match filename_from_url(url) {
        Some(name) if !name.contains('/') && name != "." && name != ".." => {
            Ok(resolve_path(&name)?)
        }
        _ => {
            Err(BoltError::Custom(format!(
                "can't derive a file name from '{url}', pass --output"
            )))
        }
    }
}

/// Streams `url` into a file, renaming it into place once complete.
pub fn fetch(url: &str, output: Option<&str>, print_sha256: bool, quiet: bool) -> BoltResult<()> {
    let dest = output_path(url, output)?;
    let parent = match dest.parent() {
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("."),
    };
    ensure_dir_exists(&parent)?;

    let mut downloader = Downloader::new();
    let progress_bar = (!quiet).then(|| {
        let name = dest
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        create_progress_bar(&name)
    });
    if let Some(pb) = progress_bar.clone() {
        downloader = downloader.progress(move |progress| handle_progress(progress, &pb));
    }

    let mut tmp = NamedTempFile::new_in(&parent)
        .with_context(|| format!("creating temporary file in {}", parent.display()))?;
    let mut digest = Sha256::new();

    for chunk in downloader.get(url, Some(&mut digest), get_config().fetch_timeout())? {
        tmp.write_all(&chunk?)
            .with_context(|| format!("writing {}", tmp.path().display()))?;
    }

    if let Some(pb) = progress_bar {
        pb.finish_and_clear();
    }

    tmp.persist(&dest)
        .map_err(|err| err.error)
        .with_context(|| format!("moving download to {}", dest.display()))?;

    info!("{} {}", Colored(Green, "saved"), Colored(Blue, dest.display()));

    if print_sha256 {
        println!("{}  {}", hex::encode(digest.finalize()), dest.display());
    }

    Ok(())
}

pub fn print_tag(url: &str) -> BoltResult<()> {
    let tag = Downloader::new().tag(url, get_config().fetch_timeout())?;
    println!("{tag}");
    Ok(())
}
