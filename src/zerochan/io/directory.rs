use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;

use crate::zerochan::tag::Tag;

lazy_static! {
    /// `<dotted tag>_<id>.<ext>` as written by the fetcher.
    static ref DOWNLOADED_NAME: Regex =
        Regex::new(r"(?i)^(?P<tag>.+?)_(?P<id>\d+)\.(?:jpg|jpeg|png)$").unwrap();
}

/// Suffix of a download still being written.
pub(crate) const PARTIAL_SUFFIX: &str = ".part";

/// Identifiers already present in the download directory, keyed by lowercased dotted tag.
///
/// Always rebuilt from a directory scan; nothing is persisted, so the files on disk stay the
/// only source of truth.
#[derive(Debug, Clone, Default)]
pub(crate) struct ExistingIndex {
    root_dir: PathBuf,
    ids: HashMap<String, HashSet<u64>>,
}

impl ExistingIndex {
    /// Creates the download directory if needed and scans it.
    pub(crate) fn scan(root_dir: &Path) -> Result<Self> {
        fs::create_dir_all(root_dir)
            .with_context(|| format!("Failed to create download directory at {:?}", root_dir))?;

        let mut ids: HashMap<String, HashSet<u64>> = HashMap::new();
        let entries = fs::read_dir(root_dir)
            .with_context(|| format!("Failed to read download directory at {:?}", root_dir))?;

        for entry in entries.filter_map(Result::ok) {
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }

            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            if name.ends_with(PARTIAL_SUFFIX) {
                remove_partial(&entry.path());
                continue;
            }

            if let Some((key, id)) = parse_downloaded_name(name) {
                ids.entry(key).or_default().insert(id);
            }
        }

        info!("Preflight index built for {} tags", ids.len());
        debug!(
            "Preflight index holds {} identifiers",
            ids.values().map(HashSet::len).sum::<usize>()
        );

        Ok(Self {
            root_dir: root_dir.to_path_buf(),
            ids,
        })
    }

    /// The scanned directory.
    pub(crate) fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Number of identifiers on disk for a tag.
    pub(crate) fn count_for(&self, tag: &Tag) -> usize {
        self.ids.get(&tag.index_key()).map_or(0, HashSet::len)
    }

    /// Whether the identifier is already downloaded for the tag.
    pub(crate) fn contains(&self, tag: &Tag, id: u64) -> bool {
        self.ids
            .get(&tag.index_key())
            .is_some_and(|set| set.contains(&id))
    }

    /// Records a successful download so later work in the same run skips it.
    pub(crate) fn mark_downloaded(&mut self, tag: &Tag, id: u64) {
        self.ids.entry(tag.index_key()).or_default().insert(id);
    }
}

/// Deletes a download left half-written by an interrupted run.
fn remove_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed leftover partial download {}", path.display()),
        Err(e) => warn!("Could not remove partial download {}: {}", path.display(), e),
    }
}

/// Splits a downloaded file name into its index key and identifier.
fn parse_downloaded_name(name: &str) -> Option<(String, u64)> {
    let captures = DOWNLOADED_NAME.captures(name)?;
    let key = captures.name("tag")?.as_str().to_lowercase();
    let id = captures.name("id")?.as_str().parse().ok()?;
    Some((key, id))
}
