use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use log::warn;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::console::Target;
use log4rs::append::file::FileAppender;
use log4rs::config::Appender;
use log4rs::config::Config;
use log4rs::config::Root;
use log4rs::encode::pattern::PatternEncoder;
use log4rs::filter::threshold::ThresholdFilter;

use crate::config;

// The terminal is in raw mode while the client runs, so a bare newline
// would not return the cursor.
static CONSOLE_PATTERN: &str = "{h({l})} {m}\r\n";
static FILE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {l} [{T}] {M} - {m}{n}";

fn log_file_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix(config::APP_NAME)
        .context("Failed to determine cache directory")?;
    xdg_dirs
        .place_cache_file(config::LOG_FILE_NAME)
        .context("Failed to create cache directory")
}

fn build_config(verbose: bool, log_file: Option<&Path>) -> Result<Config> {
    let console_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(CONSOLE_PATTERN)))
        .build();
    let mut builder = Config::builder().appender(
        Appender::builder()
            .filter(Box::new(ThresholdFilter::new(console_level)))
            .build("stderr", Box::new(stderr)),
    );
    let mut root = Root::builder().appender("stderr");
    if let Some(log_file) = log_file {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
            .build(log_file)
            .with_context(|| format!("Failed to open log file {:?}", log_file))?;
        builder = builder.appender(Appender::builder().build("file", Box::new(file)));
        root = root.appender("file");
    }
    builder
        .build(root.build(LevelFilter::Debug))
        .context("Invalid logging configuration")
}

/// Logs to stderr and, if possible, to a file in the cache directory.
pub fn init(verbose: bool) -> Result<()> {
    let log_file = log_file_path();
    let config = match &log_file {
        Ok(path) => build_config(verbose, Some(path.as_path()))
            .or_else(|_| build_config(verbose, None))?,
        Err(_) => build_config(verbose, None)?,
    };
    log4rs::init_config(config).context("Failed to initialize logging")?;
    if let Err(e) = log_file {
        warn!("Not logging to a file: {:#}", e);
    }
    Ok(())
}
