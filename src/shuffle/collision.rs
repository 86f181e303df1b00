use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use hex::encode as hex_encode;
use log::{debug, trace};
use sha2::{Digest, Sha256};

/// What to do when the destination already holds a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DuplicatePolicy {
    /// Never delete; the incoming file always gets a suffixed name.
    KeepBoth,
    /// Delete the incoming file when it is byte-identical to the existing one.
    DeleteIdentical,
}

/// How a move into a possibly occupied destination ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// Moved to the requested destination.
    Moved(PathBuf),
    /// The destination held identical content, so the source was deleted.
    DeletedDuplicate,
    /// The destination was taken; moved to a suffixed name instead.
    KeptWithSuffix(PathBuf),
}

/// Moves `source` to `desired` without ever overwriting an existing file.
///
/// When `desired` is occupied the source is either deleted as a confirmed duplicate (same size
/// and SHA-256, only under [DuplicatePolicy::DeleteIdentical]) or moved to
/// `<stem> (<label> N)<.ext>` for the smallest free `N`.
pub(crate) fn resolve(
    source: &Path,
    desired: &Path,
    label: &str,
    policy: DuplicatePolicy,
) -> io::Result<Resolution> {
    if source == desired {
        return Ok(Resolution::Moved(desired.to_path_buf()));
    }

    if !desired.exists() {
        fs::rename(source, desired)?;
        trace!("{} -> {}", source.display(), desired.display());
        return Ok(Resolution::Moved(desired.to_path_buf()));
    }

    if policy == DuplicatePolicy::DeleteIdentical && same_content(source, desired)? {
        fs::remove_file(source)?;
        debug!(
            "Deleted {} (identical to {})",
            source.display(),
            desired.display()
        );
        return Ok(Resolution::DeletedDuplicate);
    }

    let alternative = disambiguate(desired, label);
    fs::rename(source, &alternative)?;
    debug!(
        "{} exists, moved {} -> {}",
        desired.display(),
        source.display(),
        alternative.display()
    );
    Ok(Resolution::KeptWithSuffix(alternative))
}

/// First free path of the form `<stem> (<label> N)<.ext>`, starting at `N = 1`.
pub(crate) fn disambiguate(path: &Path, label: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1u32..)
        .map(|n| path.with_file_name(format!("{} ({} {}){}", stem, label, n, extension)))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Whether two files have the same size and SHA-256 digest.
pub(crate) fn same_content(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }

    Ok(sha256_file(a)? == sha256_file(b)?)
}

/// Hex SHA-256 of a file, read in 1 MiB chunks.
pub(crate) fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 1024 * 1024];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex_encode(hasher.finalize()))
}
