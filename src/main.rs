#[macro_use]
extern crate log;

use std::env::consts::{ARCH, FAMILY, OS};
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, TermLogger, TerminalMode, WriteLogger,
};

use crate::program::Program;
use crate::zerochan::io::{LoadedConfig, WatchConfig};

mod program;
mod shuffle;
mod zerochan;

/// Name of the log file written next to the working directory.
const LOG_NAME: &str = "zerochan_watch.log";

/// Tag-subscription downloader for Zerochan, plus a shuffle/restore tool for viewing
/// image folders anonymized.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub(crate) struct Args {
    /// Path of the TOML configuration file
    #[arg(short, long, global = true, default_value = "zerochan.toml")]
    config: PathBuf,

    /// Print debug output to the terminal
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Download new images for every subscribed tag
    Fetch {
        /// Destination directory (overrides the config file)
        #[arg(short, long)]
        dest: Option<PathBuf>,

        /// Subscription list, one tag per line (overrides the config file)
        #[arg(short, long)]
        subscriptions: Option<PathBuf>,

        /// Number of listing pages to scan per tag
        #[arg(short, long)]
        max_pages: Option<u32>,

        /// Seconds to wait between requests
        #[arg(long)]
        delay: Option<u64>,
    },
    /// Rename every image in a folder to a random order, then restore on confirmation
    Shuffle {
        /// Folder holding the images
        folder: PathBuf,

        /// Include images in subfolders
        #[arg(short, long, default_value_t = false)]
        recursive: bool,

        /// Image extensions to include (case-insensitive)
        #[arg(long, value_delimiter = ',')]
        ext: Option<Vec<String>>,

        /// Stop after shuffling; restore later with the `restore` command
        #[arg(long, default_value_t = false)]
        no_wait: bool,

        /// Restore without asking once the user presses ENTER
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },
    /// Restore a shuffled folder from its mapping file(s)
    Restore {
        /// Folder that was shuffled
        folder: PathBuf,

        /// A specific mapping file to restore from
        #[arg(short, long)]
        mapping: Option<PathBuf>,
    },
    /// Strip shuffle prefixes from file names under the given roots, no mapping needed
    Clean {
        /// Directories to search recursively
        roots: Vec<PathBuf>,

        /// Search every filesystem root instead of an explicit list
        #[arg(long, default_value_t = false)]
        all_roots: bool,
    },
}

/// A buffered file writer so the trace-level file log does not hit the disk per line.
struct BufferedFileWriter {
    inner: BufWriter<std::fs::File>,
}

impl BufferedFileWriter {
    fn new() -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(LOG_NAME)?;

        Ok(Self {
            inner: BufWriter::with_capacity(64 * 1024, file),
        })
    }
}

impl Write for BufferedFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let size = self.inner.write(buf)?;

        // Flush on line boundaries so an interrupted run still leaves a readable log.
        if buf.contains(&b'\n') {
            self.inner.flush()?;
        }

        Ok(size)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn main() {
    let args = Args::parse();

    let loaded = match WatchConfig::load_or_create(&args.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Unable to load {}: {}", args.config.display(), e);
            exit(1);
        }
    };

    let debug = args.debug || loaded.config.debug.debug;
    initialize_logger(debug);
    log_system_information();

    let LoadedConfig { config, created } = loaded;
    if created {
        info!("Created default configuration at {}", args.config.display());
    }

    let program = Program::new(config);
    match program.run(args.command) {
        Ok(code) => exit(code),
        Err(e) => {
            error!("{:#}", e);
            exit(1);
        }
    }
}

/// Initializes the terminal logger and the trace-level file logger.
fn initialize_logger(debug: bool) {
    let term_level = if debug { LevelFilter::Debug } else { LevelFilter::Info };

    let mut config = ConfigBuilder::new();
    config.add_filter_allow_str("zerochan_watch");

    let file_writer = match BufferedFileWriter::new() {
        Ok(writer) => writer,
        Err(e) => {
            eprintln!("Failed to open {}: {}. Logging will only output to terminal.", LOG_NAME, e);
            let _ = TermLogger::init(
                term_level,
                Config::default(),
                TerminalMode::Mixed,
                ColorChoice::Auto,
            );
            return;
        }
    };

    if let Err(e) = CombinedLogger::init(vec![
        TermLogger::new(
            term_level,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::max(), config.build(), file_writer),
    ]) {
        eprintln!("Failed to initialize combined logger: {}. Falling back to terminal-only logging.", e);
        let _ = TermLogger::init(
            term_level,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        );
    }
}

/// Logs information about the system being used.
fn log_system_information() {
    trace!("Printing system information out into log for debug purposes...");
    trace!("ARCH:           \"{}\"", ARCH);
    trace!("FAMILY:         \"{}\"", FAMILY);
    trace!("OS:             \"{}\"", OS);
}
