use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use console::Term;
use dialoguer::Confirm;
use log::{error, info, trace, warn};

use crate::Commands;
use crate::shuffle::clean::{clean_roots, filesystem_roots};
use crate::shuffle::restore::{RestoreReport, restore_folder, restore_from_mapping};
use crate::shuffle::{ShuffleError, ShuffleOptions, shuffle_folder};
use crate::zerochan::Fetcher;
use crate::zerochan::io::subscriptions::{create_subscriptions, load_subscriptions};
use crate::zerochan::io::{FetchOverrides, WatchConfig};
use crate::zerochan::sender::RequestSender;

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The authors who created the package.
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

/// How the shuffle command hands control back after renaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitMode {
    /// Exit right away; restore later with the `restore` command.
    NoWait,
    /// Restore as soon as ENTER is pressed.
    PressEnter,
    /// Ask before restoring.
    Confirm,
}

impl WaitMode {
    fn from_flags(no_wait: bool, yes: bool) -> Self {
        match (no_wait, yes) {
            (true, _) => WaitMode::NoWait,
            (false, true) => WaitMode::PressEnter,
            (false, false) => WaitMode::Confirm,
        }
    }
}

/// Runs one subcommand and turns its result into a process exit code.
pub(crate) struct Program {
    config: WatchConfig,
}

impl Program {
    pub(crate) fn new(config: WatchConfig) -> Self {
        Self { config }
    }

    /// Runs the chosen subcommand.
    pub(crate) fn run(&self, command: Commands) -> Result<i32, Error> {
        Term::stdout().set_title("zerochan watch");
        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);
        trace!("Program Authors: {}", AUTHORS);

        match command {
            Commands::Fetch {
                dest,
                subscriptions,
                max_pages,
                delay,
            } => self.fetch(
                subscriptions,
                FetchOverrides {
                    dest,
                    max_pages,
                    delay_secs: delay,
                },
            ),
            Commands::Shuffle {
                folder,
                recursive,
                ext,
                no_wait,
                yes,
            } => Ok(self.shuffle(
                &folder,
                ShuffleOptions::new(recursive, ext),
                WaitMode::from_flags(no_wait, yes),
            )),
            Commands::Restore { folder, mapping } => Ok(self.restore(&folder, mapping.as_deref())),
            Commands::Clean { roots, all_roots } => Ok(self.clean(roots, all_roots)),
        }
    }

    fn fetch(&self, subscriptions: Option<PathBuf>, overrides: FetchOverrides) -> Result<i32, Error> {
        let subscriptions = self.config.subscriptions_file(subscriptions);
        if !subscriptions.exists() {
            info!("Subscription file does not exist, creating it...");
            create_subscriptions(&subscriptions)?;
            info!(
                "Add the tags you want to follow to {} and run again.",
                subscriptions.display()
            );
            return Ok(0);
        }

        let tags = load_subscriptions(&subscriptions)?;
        if tags.is_empty() {
            warn!("{} has no tags, nothing to do", subscriptions.display());
            return Ok(0);
        }

        let config = self.config.fetch_config(overrides);
        info!("Saving into {}", config.download_directory.display());
        trace!("Fetch settings: {:?}", config);

        let sender = RequestSender::new(config.timeout).context("Failed to build HTTP client")?;
        let report = Fetcher::new(sender, config).run(&tags)?;

        info!(
            "Checked {} tags, {} IDs found. Done.",
            report.tags, report.found
        );
        Ok(0)
    }

    fn shuffle(&self, folder: &Path, options: ShuffleOptions, wait: WaitMode) -> i32 {
        trace!("Shuffle options: {:?}", options);
        let mut rng = rand::rng();

        let session = match shuffle_folder(folder, &options, &mut rng) {
            Ok(Some(session)) => session,
            Ok(None) => {
                info!("No files with extensions {} found.", options.extensions.join(", "));
                return 0;
            }
            Err(e) => {
                error!("{}", e);
                return e.exit_code();
            }
        };

        info!(
            "Session {}: {} files shuffled, {} failed",
            session.token,
            session.entries.len(),
            session.failed
        );
        info!(
            "Mapping saved to {}",
            console::style(session.mapping_path.display()).color256(39).italic()
        );

        let restore_now = match wait {
            WaitMode::NoWait => {
                info!("Run `restore {}` to put the names back.", folder.display());
                false
            }
            WaitMode::PressEnter => {
                println!("Press ENTER to restore original names...");
                if let Err(e) = Term::stdout().read_line() {
                    warn!("Failed to read from terminal: {}", e);
                }
                true
            }
            WaitMode::Confirm => Confirm::new()
                .with_prompt("Restore original names now?")
                .show_default(true)
                .default(true)
                .interact()
                .unwrap_or_else(|e| {
                    warn!("Confirmation prompt failed: {}", e);
                    false
                }),
        };

        if !restore_now {
            info!("Leaving files shuffled.");
            return 0;
        }

        match restore_from_mapping(&session.mapping_path) {
            Ok(report) => {
                log_restore(&report);
                0
            }
            Err(e) => {
                error!("{}", e);
                e.exit_code()
            }
        }
    }

    fn restore(&self, folder: &Path, mapping: Option<&Path>) -> i32 {
        if !folder.is_dir() {
            let e = ShuffleError::FolderNotFound(folder.to_path_buf());
            error!("{}", e);
            return e.exit_code();
        }

        let result = match mapping {
            Some(mapping) => restore_from_mapping(mapping),
            None => restore_folder(folder),
        };

        match result {
            Ok(report) => {
                log_restore(&report);
                0
            }
            Err(e) => {
                error!("{}", e);
                e.exit_code()
            }
        }
    }

    fn clean(&self, roots: Vec<PathBuf>, all_roots: bool) -> i32 {
        let roots = if all_roots {
            let roots = filesystem_roots();
            warn!(
                "Searching every filesystem root: {}",
                roots.iter().map(|r| r.display().to_string()).collect::<Vec<_>>().join(", ")
            );
            roots
        } else if roots.is_empty() {
            error!("Give at least one directory to search, or pass --all-roots.");
            return 1;
        } else {
            roots
        };

        let report = clean_roots(&roots);
        info!(
            "Cleaned: {}  Deleted duplicates: {}  Kept with suffix: {}  Skipped: {}  Failed: {}",
            report.cleaned,
            report.deleted_duplicates,
            report.kept_with_suffix,
            report.skipped,
            report.failed
        );
        0
    }
}

fn log_restore(report: &RestoreReport) {
    info!(
        "Restored: {}  Kept with suffix: {}  Missing: {}  Failed: {}  Unreadable mappings: {}",
        report.restored,
        report.kept_with_suffix,
        report.missing,
        report.failed,
        report.unreadable_mappings
    );
}
