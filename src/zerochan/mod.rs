use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, trace, warn};

use crate::zerochan::grabber::Grabber;
use crate::zerochan::io::FetchConfig;
use crate::zerochan::io::directory::{ExistingIndex, PARTIAL_SUFFIX};
use crate::zerochan::sender::Transport;
use crate::zerochan::tag::{ASSET_EXTENSIONS, Tag};

pub(crate) mod grabber;
pub(crate) mod io;
pub(crate) mod sender;
pub(crate) mod tag;

/// What happened to a single identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DownloadOutcome {
    /// Written to disk at this path.
    Saved(PathBuf),
    /// A file for this identifier was already on disk.
    AlreadyPresent,
    /// Every extension answered not-found.
    Missing,
    /// A request or write failed; no further extensions were tried.
    Failed,
}

/// Totals for one fetch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FetchReport {
    pub(crate) tags: usize,
    pub(crate) found: usize,
    pub(crate) downloaded: usize,
    pub(crate) already_present: usize,
    pub(crate) missing: usize,
    pub(crate) failed: usize,
}

impl FetchReport {
    fn record(&mut self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Saved(_) => self.downloaded += 1,
            DownloadOutcome::AlreadyPresent => self.already_present += 1,
            DownloadOutcome::Missing => self.missing += 1,
            DownloadOutcome::Failed => self.failed += 1,
        }
    }
}

/// Downloads new images for subscribed tags, skipping identifiers already on disk.
pub(crate) struct Fetcher<T: Transport> {
    transport: T,
    config: FetchConfig,
}

impl<T: Transport> Fetcher<T> {
    pub(crate) fn new(transport: T, config: FetchConfig) -> Self {
        Self { transport, config }
    }

    /// Processes every tag in order. Per-page and per-image failures are logged and never stop
    /// the run; only an unusable download directory does.
    pub(crate) fn run(&self, tags: &[Tag]) -> Result<FetchReport> {
        let mut index = ExistingIndex::scan(&self.config.download_directory)?;
        let mut report = FetchReport::default();

        for tag in tags {
            self.fetch_tag(tag, &mut index, &mut report);
            report.tags += 1;
        }

        info!(
            "New images downloaded this run: {} ({} already present, {} not found, {} failed)",
            report.downloaded, report.already_present, report.missing, report.failed
        );
        Ok(report)
    }

    /// Scans a tag's listing pages and downloads the identifiers missing from the index.
    fn fetch_tag(&self, tag: &Tag, index: &mut ExistingIndex, report: &mut FetchReport) {
        info!(
            "Checking {} (stored IDs: {})",
            console::style(format!("\"{}\"", tag)).color256(39).italic(),
            index.count_for(tag)
        );

        let grabber = Grabber::new(&self.transport, &self.config);
        let found = grabber.grab_ids(tag);
        if found.is_empty() {
            info!("No IDs found on tag pages for \"{}\"", tag);
            return;
        }

        let missing: Vec<u64> = found
            .iter()
            .copied()
            .filter(|id| !index.contains(tag, *id))
            .collect();
        report.found += found.len();
        report.already_present += found.len() - missing.len();
        info!("Found {} IDs; missing {} new", found.len(), missing.len());

        if missing.is_empty() {
            return;
        }

        let progress_bar = ProgressBar::new(missing.len() as u64);
        let progress_style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        progress_bar.set_style(progress_style);

        for id in missing {
            progress_bar.set_message(format!("{}", id));
            let outcome = self.download_id(tag, id, index.root_dir());
            grabber.pause();

            match &outcome {
                DownloadOutcome::Saved(path) => {
                    trace!("Saved {}", path.display());
                    index.mark_downloaded(tag, id);
                }
                DownloadOutcome::AlreadyPresent => {
                    debug!("Skipping {}: already on disk", id);
                    index.mark_downloaded(tag, id);
                }
                DownloadOutcome::Missing => {
                    warn!("Could not fetch id={} as {}", id, ASSET_EXTENSIONS.join("/"));
                }
                DownloadOutcome::Failed => {}
            }

            report.record(&outcome);
            progress_bar.inc(1);
        }

        progress_bar.finish_and_clear();
        trace!("Tag {} is finished downloading...", tag);
    }

    /// Tries each asset extension in order, falling through only on not-found responses.
    pub(crate) fn download_id(&self, tag: &Tag, id: u64, dir: &Path) -> DownloadOutcome {
        let on_disk = ASSET_EXTENSIONS
            .iter()
            .any(|ext| dir.join(tag.file_name(id, ext)).exists());
        if on_disk {
            return DownloadOutcome::AlreadyPresent;
        }

        for ext in ASSET_EXTENSIONS {
            let url = tag.asset_url(id, ext);
            let bytes = match self.transport.get_bytes(&url) {
                Ok(bytes) => bytes,
                Err(e) if e.is_not_found() => {
                    debug!("{} -> {}, trying next extension", url, e);
                    continue;
                }
                Err(e) => {
                    error!("Failed to download {}: {}", url, e);
                    return DownloadOutcome::Failed;
                }
            };

            let path = dir.join(tag.file_name(id, ext));
            return match write_atomically(&path, &bytes) {
                Ok(()) => DownloadOutcome::Saved(path),
                Err(e) => {
                    error!("Failed to save image {}: {:#}", path.display(), e);
                    DownloadOutcome::Failed
                }
            };
        }

        DownloadOutcome::Missing
    }
}

/// Writes to a `.part` sibling and renames it into place, so an interrupted write never leaves
/// a file the index would count as downloaded.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);

    fs::write(&partial, bytes)
        .with_context(|| format!("Failed to write to file {}", partial.display()))?;

    match fs::rename(&partial, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            if let Err(remove_error) = fs::remove_file(&partial) {
                warn!("Could not remove {}: {}", partial.display(), remove_error);
            }
            Err(e).with_context(|| format!("Failed to move {} into place", partial.display()))
        }
    }
}
