//! Gzip/tar extraction restricted to directories and regular files.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::error::ArchiveError;

/// Counters reported after a successful extraction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractStats {
    pub directories: usize,
    pub files: usize,
    pub bytes: u64,
}

/// Unpack a gzip-compressed tar stream into `dest`.
pub fn extract_tar_gz<R: Read>(reader: R, dest: &Path) -> Result<ExtractStats, ArchiveError> {
    extract_tar(GzDecoder::new(reader), dest)
}

/// Unpack an uncompressed tar stream into `dest`, which must already exist.
///
/// Every entry name is validated before anything is written for it: absolute
/// names and names with a `..` segment fail with
/// [`ArchiveError::UnsafePath`]. Only directories and regular files are
/// accepted. Extraction is not transactional; on error whatever was written
/// so far stays in `dest`.
pub fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<ExtractStats, ArchiveError> {
    let mut archive = Archive::new(reader);
    let mut stats = ExtractStats::default();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();
        // Extension headers describe other entries and carry no content.
        if kind.is_pax_global_extensions() || kind.is_pax_local_extensions() {
            continue;
        }

        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let target = extract_path(dest, &name)?;

        match kind {
            EntryType::Directory => {
                fs::create_dir_all(&target)?;
                stats.directories += 1;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut out = File::create(&target)?;
                stats.bytes += io::copy(&mut entry, &mut out)?;
                stats.files += 1;
            }
            other => {
                tracing::error!(entry = %name, kind = ?other, "unsupported entry in dataset archive");
                return Err(ArchiveError::UnsupportedEntry {
                    kind: format!("{other:?}"),
                    name,
                });
            }
        }
    }

    tracing::debug!(
        dest = %dest.display(),
        files = stats.files,
        directories = stats.directories,
        bytes = stats.bytes,
        "archive extracted"
    );
    Ok(stats)
}

/// Join an archive entry name onto `dest`, refusing anything that could
/// resolve outside of it.
fn extract_path(dest: &Path, name: &str) -> Result<PathBuf, ArchiveError> {
    let unsafe_path = || {
        tracing::error!(entry = %name, "rejecting unsafe path in dataset archive");
        ArchiveError::UnsafePath {
            name: name.to_string(),
        }
    };

    if name.is_empty() || name.starts_with('/') || name.starts_with('\\') {
        return Err(unsafe_path());
    }
    // Backslash is a plain character on unix but a separator elsewhere.
    if name.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(unsafe_path());
    }

    let rel = Path::new(name);
    if rel.is_absolute()
        || rel
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return Err(unsafe_path());
    }
    Ok(dest.join(rel))
}
