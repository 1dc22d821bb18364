use std::path::PathBuf;

use clap::Parser;

/// Records the songs played by a terminal streaming client, one file per song.
#[derive(Parser, Debug, Default)]
#[clap(version, about)]
pub struct Opts {
    /// Directory that receives one subdirectory per station.
    #[clap(long)]
    pub save_dir: Option<PathBuf>,
    /// Audio source to record from instead of the default sink's monitor.
    #[clap(long)]
    pub source: Option<String>,
    /// Read this config file instead of the one in the config directory.
    #[clap(long)]
    pub config: Option<PathBuf>,
    #[clap(short, long)]
    pub verbose: bool,
    /// Do not register the song-finished hook with the client.
    #[clap(long)]
    pub no_event_hook: bool,
    /// Client command line, e.g. `-- pianobar`.
    #[clap(last = true)]
    pub client: Vec<String>,
}
