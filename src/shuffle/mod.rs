//! Reversible anonymized renaming of image folders.
//!
//! A shuffle run renames every image to `<token>_<sequence>_<stem>.<ext>` in random order and
//! records the pairs in a mapping file inside the folder. The names can be restored from that
//! file ([restore]) or, without it, by stripping the token prefix ([clean]).

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use walkdir::WalkDir;

pub(crate) mod clean;
pub(crate) mod collision;
pub(crate) mod restore;

/// Fixed marker at the start of every session token.
pub(crate) const TOKEN_PREFIX: &str = "shuf-";

/// Mapping files are `<MAPPING_PREFIX><token>.json` inside the shuffled folder.
pub(crate) const MAPPING_PREFIX: &str = ".shuffle_map_";

/// Extensions shuffled when none are given.
pub(crate) const DEFAULT_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Failures that end a shuffle or restore run.
#[derive(Error, Debug)]
pub(crate) enum ShuffleError {
    #[error("Folder not found: {0}")]
    FolderNotFound(PathBuf),

    #[error("No mapping file found: {0}")]
    MappingNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Mapping file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShuffleError {
    /// Process exit code for this failure.
    pub(crate) fn exit_code(&self) -> i32 {
        match self {
            ShuffleError::FolderNotFound(_) => 1,
            ShuffleError::MappingNotFound(_) => 2,
            ShuffleError::Io(_) | ShuffleError::Json(_) => 1,
        }
    }
}

/// Per-run random marker, `shuf-` followed by 32 lowercase hex digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SessionToken(String);

impl SessionToken {
    pub(crate) fn generate() -> Self {
        Self(format!("{}{}", TOKEN_PREFIX, Uuid::new_v4().simple()))
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    /// Where this session's mapping lives.
    pub(crate) fn mapping_path(&self, folder: &Path) -> PathBuf {
        folder.join(format!("{}{}.json", MAPPING_PREFIX, self.0))
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One renamed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct MappingEntry {
    #[serde(rename = "OldPath")]
    pub(crate) old_path: PathBuf,
    #[serde(rename = "NewPath")]
    pub(crate) new_path: PathBuf,
}

/// Writes the mapping through a temporary file so a crash never leaves half a JSON array.
pub(crate) fn write_mapping(path: &Path, entries: &[MappingEntry]) -> Result<(), ShuffleError> {
    let json = serde_json::to_string_pretty(entries)?;
    let temporary = path.with_extension("json.tmp");
    fs::write(&temporary, json)?;
    fs::rename(&temporary, path)?;
    Ok(())
}

/// Reads a mapping file.
pub(crate) fn read_mapping(path: &Path) -> Result<Vec<MappingEntry>, ShuffleError> {
    if !path.is_file() {
        return Err(ShuffleError::MappingNotFound(path.to_path_buf()));
    }
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

/// What to shuffle.
#[derive(Debug, Clone)]
pub(crate) struct ShuffleOptions {
    pub(crate) recursive: bool,
    /// Lowercase, without the leading dot.
    pub(crate) extensions: Vec<String>,
}

impl ShuffleOptions {
    pub(crate) fn new(recursive: bool, extensions: Option<Vec<String>>) -> Self {
        let extensions = match extensions {
            Some(list) if !list.is_empty() => list
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            _ => DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        };

        Self { recursive, extensions }
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
    }
}

/// A completed shuffle whose mapping has been persisted.
#[derive(Debug, Clone)]
pub(crate) struct ShuffleSession {
    pub(crate) token: SessionToken,
    pub(crate) mapping_path: PathBuf,
    pub(crate) entries: Vec<MappingEntry>,
    pub(crate) failed: usize,
}

/// Lists matching image files under `folder`, sorted by path.
pub(crate) fn collect_images(folder: &Path, options: &ShuffleOptions) -> Vec<PathBuf> {
    let max_depth = if options.recursive { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Error accessing path in {}: {}", folder.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| options.matches(path))
        .collect();

    files.sort();
    files
}

/// Shuffled name for a file: `<token>_<sequence:05>_<stem>.<lowercased ext>`.
pub(crate) fn shuffled_name(token: &SessionToken, sequence: usize, original: &Path) -> Option<String> {
    let stem = original.file_stem()?.to_str()?;
    let extension = original.extension()?.to_str()?.to_lowercase();
    Some(format!("{}_{:05}_{}.{}", token, sequence, stem, extension))
}

/// Renames every matching image in `folder` into a uniformly random order.
///
/// The planned mapping is written before the first rename and rewritten with only the
/// successful renames afterwards, so an interrupted run can always be restored. Returns
/// `Ok(None)` when there is nothing to shuffle.
pub(crate) fn shuffle_folder<R: Rng + ?Sized>(
    folder: &Path,
    options: &ShuffleOptions,
    rng: &mut R,
) -> Result<Option<ShuffleSession>, ShuffleError> {
    if !folder.is_dir() {
        return Err(ShuffleError::FolderNotFound(folder.to_path_buf()));
    }
    let folder = std::path::absolute(folder)?;

    let mut files = collect_images(&folder, options);
    if files.is_empty() {
        info!("No matching files in {}", folder.display());
        return Ok(None);
    }
    files.shuffle(rng);

    let token = SessionToken::generate();
    let mapping_path = token.mapping_path(&folder);
    debug!("Session token {}", token);

    let mut planned = Vec::with_capacity(files.len());
    for original in files {
        let Some(name) = shuffled_name(&token, planned.len() + 1, &original) else {
            warn!("Skipping {}: name is not valid UTF-8", original.display());
            continue;
        };
        let new_path = original.with_file_name(name);
        planned.push(MappingEntry { old_path: original, new_path });
    }
    write_mapping(&mapping_path, &planned)?;

    let progress_bar = ProgressBar::new(planned.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut entries = Vec::with_capacity(planned.len());
    let mut failed = 0;
    for entry in planned {
        if entry.new_path.exists() {
            error!("Refusing to overwrite {}", entry.new_path.display());
            failed += 1;
        } else {
            match fs::rename(&entry.old_path, &entry.new_path) {
                Ok(()) => entries.push(entry),
                Err(e) => {
                    error!("Rename failed for {}: {}", entry.old_path.display(), e);
                    failed += 1;
                }
            }
        }
        progress_bar.inc(1);
    }
    progress_bar.finish_and_clear();

    write_mapping(&mapping_path, &entries)?;
    info!(
        "Shuffled {} files ({} failed). Mapping saved to {}",
        entries.len(),
        failed,
        mapping_path.display()
    );

    Ok(Some(ShuffleSession {
        token,
        mapping_path,
        entries,
        failed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazy_static::lazy_static;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use regex::Regex;
    use std::collections::HashSet;
    use tempfile::tempdir;

    lazy_static! {
        static ref SHUFFLED: Regex =
            Regex::new(r"^shuf-[0-9a-f]{32}_\d{5}_.+\.(jpg|png)$").unwrap();
    }

    fn populate(dir: &Path, names: &[&str]) {
        for name in names {
            let path = dir.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, name.as_bytes()).unwrap();
        }
    }

    #[test]
    fn test_token_shape() {
        let token = SessionToken::generate();
        assert!(token.as_str().starts_with(TOKEN_PREFIX));
        let hex = &token.as_str()[TOKEN_PREFIX.len()..];
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(token, SessionToken::generate());
    }

    #[test]
    fn test_shuffled_name_lowercases_extension() {
        let token = SessionToken("shuf-0123456789abcdef0123456789abcdef".to_string());
        assert_eq!(
            shuffled_name(&token, 7, Path::new("/x/Holiday Photo.JPG")).unwrap(),
            "shuf-0123456789abcdef0123456789abcdef_00007_Holiday Photo.jpg"
        );
    }

    #[test]
    fn test_options_normalise_extensions() {
        let options = ShuffleOptions::new(false, Some(vec![".PNG".into(), " jpg ".into()]));
        assert_eq!(options.extensions, vec!["png", "jpg"]);
        assert!(options.matches(Path::new("a.Png")));
        assert!(!options.matches(Path::new("a.gif")));
        assert_eq!(ShuffleOptions::new(false, None).extensions.len(), DEFAULT_EXTENSIONS.len());
    }

    #[test]
    fn test_shuffle_is_a_bijection() {
        let dir = tempdir().unwrap();
        populate(dir.path(), &["a.jpg", "b.PNG", "c.jpg", "notes.txt", "sub/d.jpg"]);
        let mut rng = StdRng::seed_from_u64(7);

        let session = shuffle_folder(dir.path(), &ShuffleOptions::new(false, None), &mut rng)
            .unwrap()
            .unwrap();

        assert_eq!(session.entries.len(), 3);
        assert_eq!(session.failed, 0);

        let originals: HashSet<_> = session.entries.iter().map(|e| e.old_path.clone()).collect();
        assert_eq!(originals.len(), 3);
        for entry in &session.entries {
            assert!(!entry.old_path.exists());
            assert!(entry.new_path.exists());
            let name = entry.new_path.file_name().unwrap().to_str().unwrap();
            assert!(SHUFFLED.is_match(name), "{}", name);
            assert!(name.starts_with(session.token.as_str()));
        }

        let mut sequences: Vec<_> = session
            .entries
            .iter()
            .map(|e| e.new_path.file_name().unwrap().to_str().unwrap()[38..43].to_string())
            .collect();
        sequences.sort();
        assert_eq!(sequences, vec!["00001", "00002", "00003"]);

        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("sub/d.jpg").exists());
        assert_eq!(read_mapping(&session.mapping_path).unwrap(), session.entries);
    }

    #[test]
    fn test_recursive_shuffle_renames_in_place() {
        let dir = tempdir().unwrap();
        populate(dir.path(), &["a.jpg", "sub/b.jpg"]);
        let mut rng = StdRng::seed_from_u64(1);

        let session = shuffle_folder(dir.path(), &ShuffleOptions::new(true, None), &mut rng)
            .unwrap()
            .unwrap();

        assert_eq!(session.entries.len(), 2);
        for entry in &session.entries {
            assert_eq!(entry.old_path.parent(), entry.new_path.parent());
        }
    }

    #[test]
    fn test_empty_folder_has_nothing_to_shuffle() {
        let dir = tempdir().unwrap();
        populate(dir.path(), &["notes.txt"]);
        let mut rng = StdRng::seed_from_u64(1);

        let result = shuffle_folder(dir.path(), &ShuffleOptions::new(false, None), &mut rng).unwrap();
        assert!(result.is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_folder_exits_with_one() {
        let dir = tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let err = shuffle_folder(&dir.path().join("gone"), &ShuffleOptions::new(false, None), &mut rng)
            .unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_mapping_json_field_names() {
        let entries = vec![MappingEntry {
            old_path: PathBuf::from("a.jpg"),
            new_path: PathBuf::from("b.jpg"),
        }];
        let json = serde_json::to_string(&entries).unwrap();
        assert_eq!(json, r#"[{"OldPath":"a.jpg","NewPath":"b.jpg"}]"#);
    }
}
