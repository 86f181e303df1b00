use std::fs::{read_to_string, write};
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, trace};

use crate::zerochan::tag::Tag;

/// Written when the subscription file does not exist yet.
pub(crate) const SUBSCRIPTIONS_EXAMPLE: &str = "\
# One Zerochan tag per line, exactly as it appears in the site URL.
# Use + for spaces; blank lines and lines starting with # are ignored.
#
# Artoria+Pendragon
# Hatsune+Miku
";

/// Parses subscription file contents into tags, skipping blank and comment lines.
pub(crate) fn parse_subscriptions(contents: &str) -> Vec<Tag> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(Tag::new)
        .collect()
}

/// Loads the subscription file.
pub(crate) fn load_subscriptions(path: &Path) -> Result<Vec<Tag>> {
    let contents = read_to_string(path)
        .with_context(|| format!("Failed to read subscription file: {}", path.display()))?;
    let tags = parse_subscriptions(&contents);

    info!("Loaded {} subscriptions", tags.len());
    trace!("Subscriptions: {:?}", tags.iter().map(Tag::as_str).collect::<Vec<_>>());
    Ok(tags)
}

/// Creates the subscription file with commented examples.
pub(crate) fn create_subscriptions(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory for {}", path.display()))?;
    }
    write(path, SUBSCRIPTIONS_EXAMPLE)
        .with_context(|| format!("Failed to write subscription file: {}", path.display()))?;
    trace!("Subscription file \"{}\" created...", path.display());
    Ok(())
}
