use std::fs::{read_to_string, write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) mod directory;
pub(crate) mod subscriptions;

/// Errors raised while loading or writing the configuration file.
#[derive(Error, Debug)]
pub(crate) enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub(crate) type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub(crate) struct Paths {
    /// Where images are saved. A leading `~` is the user's home directory.
    pub(crate) download_directory: String,
    /// The subscription list, one tag per line.
    pub(crate) subscriptions_file: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub(crate) struct Fetch {
    #[serde(default = "default_max_pages_per_tag")]
    pub(crate) max_pages_per_tag: u32,
    #[serde(default = "default_request_delay_secs")]
    pub(crate) request_delay_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub(crate) timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub(crate) struct DebugFlags {
    #[serde(default)]
    pub(crate) debug: bool,
    /// Dump every fetched listing page into `<download_directory>/_debug/`.
    #[serde(default)]
    pub(crate) save_html_debug: bool,
}

fn default_max_pages_per_tag() -> u32 { 3 }
fn default_request_delay_secs() -> u64 { 2 }
fn default_timeout_secs() -> u64 { 20 }

/// Contents of `zerochan.toml`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub(crate) struct WatchConfig {
    pub(crate) paths: Paths,
    pub(crate) fetch: Fetch,
    #[serde(default)]
    pub(crate) debug: DebugFlags,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            paths: Paths {
                download_directory: "~/Pictures/Zerochan".to_string(),
                subscriptions_file: "subscriptions.txt".to_string(),
            },
            fetch: Fetch {
                max_pages_per_tag: default_max_pages_per_tag(),
                request_delay_secs: default_request_delay_secs(),
                timeout_secs: default_timeout_secs(),
            },
            debug: DebugFlags {
                debug: true,
                save_html_debug: false,
            },
        }
    }
}

/// A loaded configuration and whether the file had to be created first.
#[derive(Debug)]
pub(crate) struct LoadedConfig {
    pub(crate) config: WatchConfig,
    pub(crate) created: bool,
}

impl WatchConfig {
    /// Reads the configuration at `path`, writing the defaults there first if it is missing.
    ///
    /// Runs before the logger exists, so nothing here may log.
    pub(crate) fn load_or_create(path: &Path) -> ConfigResult<LoadedConfig> {
        if !path.exists() {
            let config = WatchConfig::default();
            config.save(path)?;
            return Ok(LoadedConfig { config, created: true });
        }

        let config: WatchConfig = toml::from_str(&read_to_string(path)?)?;
        Ok(LoadedConfig { config, created: false })
    }

    /// Writes the configuration as TOML.
    pub(crate) fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Builds the value handed to the fetcher, applying any command line overrides.
    pub(crate) fn fetch_config(&self, overrides: FetchOverrides) -> FetchConfig {
        FetchConfig {
            download_directory: overrides
                .dest
                .unwrap_or_else(|| expand_home(&self.paths.download_directory)),
            max_pages: overrides.max_pages.unwrap_or(self.fetch.max_pages_per_tag),
            request_delay: Duration::from_secs(
                overrides.delay_secs.unwrap_or(self.fetch.request_delay_secs),
            ),
            timeout: Duration::from_secs(self.fetch.timeout_secs),
            save_html_debug: self.debug.save_html_debug,
        }
    }

    /// The subscription file, honouring an override.
    pub(crate) fn subscriptions_file(&self, overridden: Option<PathBuf>) -> PathBuf {
        overridden.unwrap_or_else(|| expand_home(&self.paths.subscriptions_file))
    }
}

/// Command line values that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub(crate) struct FetchOverrides {
    pub(crate) dest: Option<PathBuf>,
    pub(crate) max_pages: Option<u32>,
    pub(crate) delay_secs: Option<u64>,
}

/// Everything the fetcher needs, resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FetchConfig {
    pub(crate) download_directory: PathBuf,
    pub(crate) max_pages: u32,
    pub(crate) request_delay: Duration,
    pub(crate) timeout: Duration,
    pub(crate) save_html_debug: bool,
}

impl FetchConfig {
    /// Directory for listing-page dumps.
    pub(crate) fn debug_directory(&self) -> PathBuf {
        self.download_directory.join("_debug")
    }
}

/// Expands a leading `~` to the home directory. Other paths are returned unchanged.
pub(crate) fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) => rest,
        None => return PathBuf::from(path),
    };

    match dirs::home_dir() {
        Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zerochan.toml");

        let loaded = WatchConfig::load_or_create(&path).unwrap();
        assert!(loaded.created);
        assert!(path.exists());
        assert_eq!(loaded.config, WatchConfig::default());

        let reloaded = WatchConfig::load_or_create(&path).unwrap();
        assert!(!reloaded.created);
        assert_eq!(reloaded.config, WatchConfig::default());
    }

    #[test]
    fn test_partial_fetch_section_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zerochan.toml");
        std::fs::write(
            &path,
            "[paths]\ndownload_directory = \"out\"\nsubscriptions_file = \"subs.txt\"\n\n[fetch]\nmax_pages_per_tag = 7\n",
        )
        .unwrap();

        let config = WatchConfig::load_or_create(&path).unwrap().config;
        assert_eq!(config.fetch.max_pages_per_tag, 7);
        assert_eq!(config.fetch.request_delay_secs, 2);
        assert!(!config.debug.save_html_debug);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let config = WatchConfig::default();
        let fetch = config.fetch_config(FetchOverrides {
            dest: Some(PathBuf::from("elsewhere")),
            max_pages: Some(1),
            delay_secs: Some(0),
        });

        assert_eq!(fetch.download_directory, PathBuf::from("elsewhere"));
        assert_eq!(fetch.max_pages, 1);
        assert_eq!(fetch.request_delay, Duration::ZERO);
        assert_eq!(fetch.timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("downloads/"), PathBuf::from("downloads/"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/Pictures"), home.join("Pictures"));
        }
    }
}
