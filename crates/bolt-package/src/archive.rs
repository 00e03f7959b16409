//! Archive and compression handling.
//!
//! Package archives nest containers: an `ar` (or tar) outer archive carries a
//! compressed `control.tar.*` member, which in turn carries the `control` file.
//! Source archives are compressed tarballs or single compressed diffs. The
//! helpers here sniff compression from magic bytes rather than trusting file
//! names, so a member suffix never has to match its content.

use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, Read, Write},
    path::{Component, Path, PathBuf},
};

use flate2::{write::GzEncoder, Compression as GzLevel};
use tempfile::NamedTempFile;
use tracing::trace;

use crate::error::{ErrorContext, PackageError, Result};

/// Magic bytes at the start of an `ar` archive.
pub const AR_MAGIC_BYTES: [u8; 8] = *b"!<arch>\n";

/// Magic bytes for gzip streams.
pub const GZIP_MAGIC_BYTES: [u8; 2] = [0x1f, 0x8b];

/// Magic bytes for xz streams.
pub const XZ_MAGIC_BYTES: [u8; 6] = [0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00];

/// Magic bytes for bzip2 streams.
pub const BZIP2_MAGIC_BYTES: [u8; 3] = *b"BZh";

/// Magic bytes for zstd frames.
pub const ZSTD_MAGIC_BYTES: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Single stream compression formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Xz,
    Bzip2,
    Zstd,
}

impl Compression {
    /// Detects the compression of a stream from its leading bytes.
    pub fn detect(header: &[u8]) -> Self {
        if header.starts_with(&GZIP_MAGIC_BYTES) {
            Self::Gzip
        } else if header.starts_with(&XZ_MAGIC_BYTES) {
            Self::Xz
        } else if header.starts_with(&BZIP2_MAGIC_BYTES) {
            Self::Bzip2
        } else if header.starts_with(&ZSTD_MAGIC_BYTES) {
            Self::Zstd
        } else {
            Self::None
        }
    }
}

/// Wraps `reader` in a decompressor matching its magic bytes.
///
/// Uncompressed input is passed through unchanged.
pub fn decoder<'a, R>(mut reader: R) -> Result<Box<dyn Read + 'a>>
where
    R: BufRead + 'a,
{
    let header = reader
        .fill_buf()
        .with_context(|| "reading stream header".to_string())?;
    let compression = Compression::detect(header);
    trace!(?compression, "detected stream compression");

    Ok(match compression {
        Compression::None => Box::new(reader),
        Compression::Gzip => Box::new(flate2::bufread::MultiGzDecoder::new(reader)),
        Compression::Xz => Box::new(xz2::bufread::XzDecoder::new(reader)),
        Compression::Bzip2 => Box::new(bzip2::bufread::BzDecoder::new(reader)),
        Compression::Zstd => {
            Box::new(
                zstd::stream::read::Decoder::with_buffer(reader)
                    .with_context(|| "initializing zstd decoder".to_string())?,
            )
        }
    })
}

/// Opens `path` and returns a reader over its decompressed content.
pub fn open_decompressed(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    decoder(BufReader::new(file))
}

/// Returns true if `path` starts with the `ar` archive signature.
pub fn is_ar_archive(path: &Path) -> Result<bool> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut magic = [0u8; 8];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == AR_MAGIC_BYTES),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

/// Decompresses the single stream at `src` into `dest`.
///
/// Nothing is written when the payload is empty. Returns the number of bytes
/// written.
pub fn decompress_to_file(src: &Path, dest: &Path) -> Result<u64> {
    let mut reader = open_decompressed(src)?;
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));

    let mut tmp =
        NamedTempFile::new_in(dir).with_context(|| format!("creating file in {}", dir.display()))?;
    let written = io::copy(&mut reader, &mut tmp)
        .with_context(|| format!("decompressing {}", src.display()))?;

    if written == 0 {
        return Ok(0);
    }

    tmp.persist(dest)
        .map_err(|err| err.error)
        .with_context(|| format!("writing {}", dest.display()))?;
    Ok(written)
}

/// Removes `strip` leading components from an archive member path.
///
/// Returns `None` when nothing is left. Leading `/` and `.` components are
/// ignored; `..` is rejected.
pub fn strip_components(path: &Path, strip: usize) -> Result<Option<PathBuf>> {
    let mut stripped = PathBuf::new();
    let mut skipped = 0;

    for component in path.components() {
        match component {
            Component::Normal(part) => {
                if skipped < strip {
                    skipped += 1;
                } else {
                    stripped.push(part);
                }
            }
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(PackageError::UnsafePath {
                    path: path.to_path_buf(),
                });
            }
        }
    }

    Ok((!stripped.as_os_str().is_empty()).then_some(stripped))
}

/// Extracts a tar stream into `dest`, dropping `strip` leading path components
/// from every member.
///
/// Members that vanish under stripping (the wrapper directory itself) are
/// skipped. Returns the number of members written.
pub fn extract_tar<R: Read>(reader: R, dest: &Path, strip: usize) -> Result<usize> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    let mut count = 0;
    for entry in archive
        .entries()
        .with_context(|| "reading tar entries".to_string())?
    {
        let mut entry = entry.with_context(|| "reading tar entry".to_string())?;
        let member = entry
            .path()
            .with_context(|| "decoding member path".to_string())?
            .into_owned();

        let Some(relative) = strip_components(&member, strip)? else {
            trace!("skipping {}", member.display());
            continue;
        };
        let target = dest.join(&relative);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }

        if entry.header().entry_type().is_hard_link() {
            let link = entry
                .link_name()
                .with_context(|| "decoding link target".to_string())?
                .map(|link| link.into_owned());
            if let Some(source) = link {
                if let Some(source) = strip_components(&source, strip)? {
                    let _ = fs::remove_file(&target);
                    fs::hard_link(dest.join(source), &target)
                        .with_context(|| format!("linking {}", target.display()))?;
                    count += 1;
                }
            }
            continue;
        }

        entry
            .unpack(&target)
            .with_context(|| format!("extracting {}", member.display()))?;
        count += 1;
    }

    Ok(count)
}

/// Extracts the (possibly compressed) tarball at `path` into `dest`.
pub fn extract_tarball(path: &Path, dest: &Path, strip: usize) -> Result<usize> {
    let reader = open_decompressed(path)?;
    extract_tar(reader, dest, strip)
}

/// Copies the first `ar` member whose name satisfies `predicate` into `out`.
///
/// Returns the matched member name, or `None` if no member matched.
pub fn copy_ar_member<R, W, P>(reader: R, mut predicate: P, out: &mut W) -> Result<Option<String>>
where
    R: Read,
    W: Write,
    P: FnMut(&str) -> bool,
{
    let mut archive = ar::Archive::new(reader);
    while let Some(entry) = archive.next_entry() {
        let mut entry = entry.with_context(|| "reading ar entry".to_string())?;
        let name = String::from_utf8_lossy(entry.header().identifier()).into_owned();

        if predicate(&name) {
            io::copy(&mut entry, out).with_context(|| format!("reading member {name}"))?;
            return Ok(Some(name));
        }
    }
    Ok(None)
}

/// Copies the first tar member whose path satisfies `predicate` into `out`.
///
/// The path handed to `predicate` has any leading `./` removed.
pub fn copy_tar_member<R, W, P>(reader: R, mut predicate: P, out: &mut W) -> Result<Option<String>>
where
    R: Read,
    W: Write,
    P: FnMut(&str) -> bool,
{
    let mut archive = tar::Archive::new(reader);
    for entry in archive
        .entries()
        .with_context(|| "reading tar entries".to_string())?
    {
        let mut entry = entry.with_context(|| "reading tar entry".to_string())?;
        let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let name = path.trim_start_matches("./");

        if predicate(name) {
            let name = name.to_string();
            io::copy(&mut entry, out).with_context(|| format!("reading member {name}"))?;
            return Ok(Some(name));
        }
    }
    Ok(None)
}

/// Gzip-compresses `data` into `out`.
///
/// The gzip header carries no timestamp or file name, so identical input
/// always yields identical output.
pub fn gzip<W: Write>(data: &[u8], out: W) -> Result<W> {
    let mut encoder = GzEncoder::new(out, GzLevel::default());
    encoder
        .write_all(data)
        .with_context(|| "compressing data".to_string())?;
    encoder
        .finish()
        .with_context(|| "finishing gzip stream".to_string())
}
