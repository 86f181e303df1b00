use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use crate::shuffle::collision::{DuplicatePolicy, Resolution, resolve};
use crate::shuffle::{MAPPING_PREFIX, ShuffleError, read_mapping};

/// Totals for one restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RestoreReport {
    pub(crate) restored: usize,
    pub(crate) kept_with_suffix: usize,
    pub(crate) missing: usize,
    pub(crate) failed: usize,
    /// Mapping files that could not be read; they are left on disk.
    pub(crate) unreadable_mappings: usize,
}

/// Puts every file recorded in the mapping back under its original name, then deletes the
/// mapping.
///
/// Pairs are undone in reverse order. A shuffled file that no longer exists is skipped. An
/// occupied original name is never overwritten; the file goes to `<stem> (original N)<.ext>`.
pub(crate) fn restore_from_mapping(mapping_path: &Path) -> Result<RestoreReport, ShuffleError> {
    let entries = read_mapping(mapping_path)?;
    let mut report = RestoreReport::default();

    for entry in entries.iter().rev() {
        if !entry.new_path.exists() {
            debug!("Shuffled file {} is gone, skipping", entry.new_path.display());
            report.missing += 1;
            continue;
        }

        match resolve(
            &entry.new_path,
            &entry.old_path,
            "original",
            DuplicatePolicy::KeepBoth,
        ) {
            Ok(Resolution::Moved(_)) => report.restored += 1,
            Ok(Resolution::KeptWithSuffix(path)) => {
                warn!(
                    "{} is taken, restored to {}",
                    entry.old_path.display(),
                    path.display()
                );
                report.kept_with_suffix += 1;
            }
            Ok(Resolution::DeletedDuplicate) => {}
            Err(e) => {
                error!("Could not restore {}: {}", entry.new_path.display(), e);
                report.failed += 1;
            }
        }
    }

    if let Err(e) = fs::remove_file(mapping_path) {
        warn!("Could not delete mapping {}: {}", mapping_path.display(), e);
    }

    info!(
        "Restored {} files ({} with suffix, {} missing, {} failed)",
        report.restored, report.kept_with_suffix, report.missing, report.failed
    );
    Ok(report)
}

/// Mapping files directly inside `folder`, sorted by name.
pub(crate) fn find_mappings(folder: &Path) -> Result<Vec<PathBuf>, ShuffleError> {
    if !folder.is_dir() {
        return Err(ShuffleError::FolderNotFound(folder.to_path_buf()));
    }

    let mut mappings: Vec<PathBuf> = fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(MAPPING_PREFIX) && n.ends_with(".json"))
        })
        .collect();

    mappings.sort();
    Ok(mappings)
}

/// Restores every session recorded in `folder`. Fails with [ShuffleError::MappingNotFound]
/// when there is none. A mapping that cannot be read is logged and skipped.
pub(crate) fn restore_folder(folder: &Path) -> Result<RestoreReport, ShuffleError> {
    let mappings = find_mappings(folder)?;
    if mappings.is_empty() {
        return Err(ShuffleError::MappingNotFound(folder.to_path_buf()));
    }

    let mut total = RestoreReport::default();
    for mapping in mappings {
        info!("Restoring from {}", mapping.display());
        let report = match restore_from_mapping(&mapping) {
            Ok(report) => report,
            Err(e) => {
                error!("Skipping {}: {}", mapping.display(), e);
                total.unreadable_mappings += 1;
                continue;
            }
        };
        total.restored += report.restored;
        total.kept_with_suffix += report.kept_with_suffix;
        total.missing += report.missing;
        total.failed += report.failed;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shuffle::{ShuffleOptions, shuffle_folder};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::tempdir;

    fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<(String, Vec<u8>)> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.is_file())
            .map(|p| {
                (
                    p.file_name().unwrap().to_string_lossy().into_owned(),
                    fs::read(&p).unwrap(),
                )
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_restore_is_exact() {
        let dir = tempdir().unwrap();
        for (name, body) in [("a.jpg", "1"), ("b.png", "2"), ("c.gif", "3"), ("d.txt", "4")] {
            fs::write(dir.path().join(name), body).unwrap();
        }
        let before = snapshot(dir.path());
        let mut rng = StdRng::seed_from_u64(42);

        let session = shuffle_folder(dir.path(), &ShuffleOptions::new(false, None), &mut rng)
            .unwrap()
            .unwrap();
        assert_ne!(snapshot(dir.path()), before);

        let report = restore_from_mapping(&session.mapping_path).unwrap();

        assert_eq!(report.restored, 3);
        assert!(!session.mapping_path.exists());
        assert_eq!(snapshot(dir.path()), before);
    }

    #[test]
    fn test_occupied_original_gets_suffix() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), "shuffled").unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let session = shuffle_folder(dir.path(), &ShuffleOptions::new(false, None), &mut rng)
            .unwrap()
            .unwrap();
        fs::write(dir.path().join("a.jpg"), "newcomer").unwrap();

        let report = restore_from_mapping(&session.mapping_path).unwrap();

        assert_eq!(report.kept_with_suffix, 1);
        assert_eq!(fs::read_to_string(dir.path().join("a.jpg")).unwrap(), "newcomer");
        assert_eq!(
            fs::read_to_string(dir.path().join("a (original 1).jpg")).unwrap(),
            "shuffled"
        );
    }

    #[test]
    fn test_missing_shuffled_file_is_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), "1").unwrap();
        fs::write(dir.path().join("b.jpg"), "2").unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let session = shuffle_folder(dir.path(), &ShuffleOptions::new(false, None), &mut rng)
            .unwrap()
            .unwrap();
        let gone = &session.entries[0];
        fs::remove_file(&gone.new_path).unwrap();

        let report = restore_from_mapping(&session.mapping_path).unwrap();

        assert_eq!(report.restored, 1);
        assert_eq!(report.missing, 1);
        assert!(!gone.old_path.exists());
        assert!(session.entries[1].old_path.exists());
    }

    #[test]
    fn test_folder_without_mapping_exits_with_two() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), "1").unwrap();

        let err = restore_folder(dir.path()).unwrap_err();
        assert!(matches!(err, ShuffleError::MappingNotFound(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_corrupt_mapping_is_kept() {
        let dir = tempdir().unwrap();
        let mapping = dir.path().join(".shuffle_map_shuf-broken.json");
        fs::write(&mapping, "{not json").unwrap();

        let err = restore_from_mapping(&mapping).unwrap_err();
        assert!(matches!(err, ShuffleError::Json(_)));
        assert!(mapping.exists());
    }

    #[test]
    fn test_corrupt_mapping_does_not_block_other_sessions() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), "1").unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        shuffle_folder(dir.path(), &ShuffleOptions::new(false, None), &mut rng).unwrap();
        let corrupt = dir.path().join(".shuffle_map_shuf-00000000000000000000000000000000.json");
        fs::write(&corrupt, "[{").unwrap();

        let report = restore_folder(dir.path()).unwrap();

        assert_eq!(report.restored, 1);
        assert_eq!(report.unreadable_mappings, 1);
        assert!(dir.path().join("a.jpg").exists());
        assert!(corrupt.exists());
    }

    #[test]
    fn test_restore_folder_finds_session() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), "1").unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        shuffle_folder(dir.path(), &ShuffleOptions::new(false, None), &mut rng).unwrap();

        let report = restore_folder(dir.path()).unwrap();

        assert_eq!(report.restored, 1);
        assert!(dir.path().join("a.jpg").exists());
        assert!(find_mappings(dir.path()).unwrap().is_empty());
    }
}
