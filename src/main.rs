pub mod args;
pub mod classifier;
pub mod client;
pub mod config;
pub mod config_file;
pub mod errors;
pub mod hook;
pub mod logging;
pub mod path_utils;
pub mod recording;
pub mod run;
pub mod shutdown;
pub mod song;
pub mod terminal;
pub mod transcript;

use std::fs;

use anyhow::Context;
use anyhow::Result;
use args::Opts;
use clap::Parser;
use config_file::ConfigFile;
use log::error;
use log::info;

fn main() -> Result<(), anyhow::Error> {
    let args = Opts::parse();
    logging::init(args.verbose)?;
    let mut config_file = ConfigFile::read(args.config.as_deref())?;
    config_file.apply_opts(&args)?;
    fs::create_dir_all(&config_file.save_dir)
        .context(format!("Failed to create save directory {:?}", config_file.save_dir))?;
    if config_file.install_event_hook {
        let hook = hook::install_event_hook(&hook::client_config_dir()?)?;
        info!("Using event hook {:?}", hook);
    }
    info!("Saving songs to: {:?}", config_file.save_dir);
    let reason = run::run(&config_file)?;
    if reason.is_failure() {
        error!("Stopped: {}", reason);
        std::process::exit(1);
    }
    info!("Stopped: {}", reason);
    Ok(())
}
