use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use log::{debug, error, info, warn};
use regex::Regex;
use walkdir::WalkDir;

use crate::shuffle::collision::{DuplicatePolicy, Resolution, resolve};

lazy_static! {
    /// A shuffled name; the payload is everything after the token.
    static ref SHUFFLED_NAME: Regex =
        Regex::new(r"^shuf-[0-9a-f]{32}_(?<payload>.+)$").unwrap();
    static ref SEQUENCE: Regex = Regex::new(r"^\d{5}_").unwrap();
}

/// Totals for one global clean.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CleanReport {
    pub(crate) cleaned: usize,
    pub(crate) deleted_duplicates: usize,
    pub(crate) kept_with_suffix: usize,
    pub(crate) skipped: usize,
    pub(crate) failed: usize,
}

/// Name a shuffled file goes back to, or `None` when `name` carries no session token.
pub(crate) fn restored_name(name: &str) -> Option<String> {
    let payload = SHUFFLED_NAME.captures(name)?.name("payload")?.as_str();
    let stripped = SEQUENCE.replace(payload, "");
    if stripped.is_empty() {
        return None;
    }
    Some(stripped.into_owned())
}

/// Strips the session token from every shuffled file under `roots`, without a mapping.
///
/// Matches are collected before anything is renamed so the walk never sees its own output.
/// Unreadable entries and per-file failures are counted and never stop the walk.
pub(crate) fn clean_roots(roots: &[PathBuf]) -> CleanReport {
    let mut report = CleanReport::default();
    let mut matches = Vec::new();

    for root in roots {
        info!("Searching {}", root.display());
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Error accessing path: {}", e);
                    report.failed += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let restored = entry.file_name().to_str().and_then(restored_name);
            match restored {
                Some(name) => matches.push((entry.into_path(), name)),
                None => report.skipped += 1,
            }
        }
    }

    info!("Found {} shuffled files", matches.len());
    for (path, name) in matches {
        clean_file(&path, &name, &mut report);
    }

    info!(
        "Cleaned {} files ({} duplicates deleted, {} kept with suffix, {} skipped, {} failed)",
        report.cleaned,
        report.deleted_duplicates,
        report.kept_with_suffix,
        report.skipped,
        report.failed
    );
    report
}

fn clean_file(path: &Path, name: &str, report: &mut CleanReport) {
    let desired = path.with_file_name(name);
    match resolve(path, &desired, "cleaned", DuplicatePolicy::DeleteIdentical) {
        Ok(Resolution::Moved(_)) => report.cleaned += 1,
        Ok(Resolution::DeletedDuplicate) => report.deleted_duplicates += 1,
        Ok(Resolution::KeptWithSuffix(kept)) => {
            warn!("{} is taken, kept as {}", desired.display(), kept.display());
            report.kept_with_suffix += 1;
        }
        Err(e) => {
            error!("Could not clean {}: {}", path.display(), e);
            report.failed += 1;
        }
    }
}

/// Every filesystem root: `/` on Unix, each existing drive letter on Windows.
pub(crate) fn filesystem_roots() -> Vec<PathBuf> {
    if cfg!(windows) {
        (b'A'..=b'Z')
            .map(|letter| PathBuf::from(format!("{}:\\", letter as char)))
            .filter(|root| root.exists())
            .collect()
    } else {
        vec![PathBuf::from("/")]
    }
}
