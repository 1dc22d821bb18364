use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use anyhow::Context;
use anyhow::Result;
use log::info;
use serde::Deserialize;
use serde::Serialize;

use crate::args::Opts;
use crate::client::ClientConfig;
use crate::config;
use crate::recording::encoder::EncoderConfig;
use crate::recording::CaptureSettings;
use crate::recording::SupervisorTimeouts;

#[derive(Deserialize, Serialize, Debug, PartialEq)]
#[serde(default)]
pub struct ConfigFile {
    pub save_dir: PathBuf,
    pub source: Option<String>,
    pub quit_key: char,
    pub install_event_hook: bool,
    pub completion_threshold_secs: u64,
    pub min_file_size_bytes: u64,
    pub client: ClientConfig,
    pub encoder: EncoderConfig,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from(config::DEFAULT_SAVE_DIR),
            source: None,
            quit_key: config::DEFAULT_QUIT_KEY,
            install_event_hook: true,
            completion_threshold_secs: config::COMPLETION_THRESHOLD.as_secs(),
            min_file_size_bytes: config::MIN_FILE_SIZE_BYTES,
            client: ClientConfig::default(),
            encoder: EncoderConfig::default(),
        }
    }
}

impl ConfigFile {
    /// Reads `path` if given. Otherwise reads the file in the config
    /// directory, creating it with default values if there is none.
    pub fn read(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return ConfigFile::from_file(path);
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix(config::APP_NAME)
            .context("Failed to determine config directory")?;
        match xdg_dirs.find_config_file(config::CONFIG_FILE_NAME) {
            Some(config_path) => ConfigFile::from_file(&config_path),
            None => {
                let config_path = xdg_dirs
                    .place_config_file(config::CONFIG_FILE_NAME)
                    .context("Failed to create config directory")?;
                ConfigFile::create_default(&config_path)
            }
        }
    }

    fn from_file(file: &Path) -> Result<ConfigFile> {
        let data =
            fs::read_to_string(file).context(format!("While reading config file at {:?}", file))?;
        let config_file: ConfigFile =
            serde_yaml::from_str(&data).context("Reading config file contents")?;
        config_file.expand_paths()
    }

    fn create_default(file: &Path) -> Result<ConfigFile> {
        let config_file = ConfigFile::default();
        let data = serde_yaml::to_string(&config_file).context("Serializing default config")?;
        fs::write(file, data).context(format!("While writing default config to {:?}", file))?;
        info!("Wrote default config to {:?}", file);
        config_file.expand_paths()
    }

    fn expand_paths(mut self) -> Result<Self> {
        self.save_dir = expanduser(&self.save_dir)?;
        Ok(self)
    }

    /// Command line options take precedence over the file.
    pub fn apply_opts(&mut self, opts: &Opts) -> Result<()> {
        if let Some(save_dir) = &opts.save_dir {
            self.save_dir = expanduser(save_dir)?;
        }
        if let Some(source) = &opts.source {
            self.source = Some(source.clone());
        }
        if opts.no_event_hook {
            self.install_event_hook = false;
        }
        if let Some((command, args)) = opts.client.split_first() {
            self.client = ClientConfig {
                command: command.clone(),
                args: args.to_vec(),
            };
        }
        Ok(())
    }

    pub fn quit_key_byte(&self) -> Result<u8> {
        if self.quit_key.is_ascii() {
            Ok(self.quit_key as u8)
        } else {
            Err(anyhow!("Quit key must be an ASCII character, got {:?}", self.quit_key))
        }
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            save_dir: self.save_dir.clone(),
            extension: self.encoder.extension.clone(),
            completion_threshold: Duration::from_secs(self.completion_threshold_secs),
            min_file_size: self.min_file_size_bytes,
            timeouts: SupervisorTimeouts::default(),
        }
    }
}

/// Expands a leading `~`. The path does not need to exist.
pub fn expanduser(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow!("Path is not valid UTF-8: {:?}", path))?;
    let expanded = shellexpand::tilde(path_str);
    Ok(PathBuf::from(&*expanded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.yaml");
        fs::write(
            &file,
            "save_dir: /srv/music\nencoder:\n  codec: flac\n  extension: flac\n",
        )
        .unwrap();
        let config_file = ConfigFile::from_file(&file).unwrap();
        assert_eq!(config_file.save_dir, PathBuf::from("/srv/music"));
        assert_eq!(config_file.encoder.codec, "flac");
        assert_eq!(config_file.encoder.program, "ffmpeg");
        assert_eq!(config_file.client.command, "pianobar");
        assert_eq!(config_file.quit_key, 'q');
        assert!(config_file.install_event_hook);
        let settings = config_file.capture_settings();
        assert_eq!(settings.extension, "flac");
        assert_eq!(settings.completion_threshold, Duration::from_secs(5));
    }

    #[test]
    fn test_default_file_is_written_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.yaml");
        let created = ConfigFile::create_default(&file).unwrap();
        assert!(!created.save_dir.starts_with("~"));
        let read_back = ConfigFile::from_file(&file).unwrap();
        assert_eq!(created, read_back);
    }

    #[test]
    fn test_unreadable_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ConfigFile::read(Some(&dir.path().join("missing.yaml"))).is_err());
        let file = dir.path().join("broken.yaml");
        fs::write(&file, "save_dir: [unclosed").unwrap();
        assert!(ConfigFile::read(Some(&file)).is_err());
    }

    #[test]
    fn test_command_line_overrides_file() {
        let mut config_file = ConfigFile::default();
        let opts = Opts {
            save_dir: Some(PathBuf::from("/tmp/songs")),
            source: Some("alsa.monitor".into()),
            no_event_hook: true,
            client: vec!["pianobar".into(), "-x".into()],
            ..Opts::default()
        };
        config_file.apply_opts(&opts).unwrap();
        assert_eq!(config_file.save_dir, PathBuf::from("/tmp/songs"));
        assert_eq!(config_file.source.as_deref(), Some("alsa.monitor"));
        assert!(!config_file.install_event_hook);
        assert_eq!(config_file.client.args, vec!["-x"]);
    }

    #[test]
    fn test_quit_key_must_be_ascii() {
        let mut config_file = ConfigFile::default();
        assert_eq!(config_file.quit_key_byte().unwrap(), b'q');
        config_file.quit_key = 'ü';
        assert!(config_file.quit_key_byte().is_err());
    }

    #[test]
    fn test_expanduser_keeps_absolute_paths() {
        assert_eq!(
            expanduser(Path::new("/srv/music")).unwrap(),
            PathBuf::from("/srv/music")
        );
        assert!(!expanduser(Path::new("~/Music")).unwrap().starts_with("~"));
    }
}
