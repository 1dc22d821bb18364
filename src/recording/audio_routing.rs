use std::process::Command;
use std::process::Output;
use std::sync::Mutex;

use anyhow::anyhow;
use anyhow::Context;
use anyhow::Result;
use log::debug;
use log::info;
use regex::Regex;

/// Provides the audio source the encoder records from and keeps the
/// playback audible while recording.
pub trait AudioRouting: Send + Sync {
    fn source(&self) -> &str;
    /// Called before every capture session starts.
    fn prepare_capture(&self) -> Result<()>;
    /// Undo whatever was changed since acquiring.
    fn release(&self) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct SinkState {
    volume_percent: u32,
    muted: bool,
}

pub struct PulseRouting {
    source: String,
    original_state: Mutex<Option<SinkState>>,
}

static DEFAULT_SINK: &str = "@DEFAULT_SINK@";

fn run_command_and_check_success(command: &mut Command) -> Result<Output> {
    let output = command
        .output()
        .with_context(|| format!("Failed to run {:?} - is pactl installed?", command))?;
    if !output.status.success() {
        return Err(anyhow!(
            "{:?} failed: {}",
            command,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(output)
}

fn pactl(args: &[&str]) -> Result<String> {
    let output = run_command_and_check_success(Command::new("pactl").args(args))?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

impl PulseRouting {
    /// Uses `source` if given, otherwise the monitor of the default sink.
    pub fn acquire(source: Option<&str>) -> Result<Self> {
        let source = match source {
            Some(source) => source.to_string(),
            None => get_default_monitor_source()?,
        };
        let original_state = get_sink_state()
            .map_err(|e| debug!("Could not read sink state: {:#}", e))
            .ok();
        Ok(Self {
            source,
            original_state: Mutex::new(original_state),
        })
    }
}

impl AudioRouting for PulseRouting {
    fn source(&self) -> &str {
        &self.source
    }

    fn prepare_capture(&self) -> Result<()> {
        pactl(&["set-sink-volume", DEFAULT_SINK, "100%"])?;
        pactl(&["set-sink-mute", DEFAULT_SINK, "0"])?;
        Ok(())
    }

    fn release(&self) -> Result<()> {
        let state = self
            .original_state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(state) = state {
            info!("Restoring sink volume to {}%", state.volume_percent);
            let volume = format!("{}%", state.volume_percent);
            pactl(&["set-sink-volume", DEFAULT_SINK, volume.as_str()])?;
            pactl(&["set-sink-mute", DEFAULT_SINK, if state.muted { "1" } else { "0" }])?;
        }
        Ok(())
    }
}

fn get_default_monitor_source() -> Result<String> {
    let sink = pactl(&["get-default-sink"]).context("Failed to get name of default sink")?;
    let sources = pactl(&["list", "sources"]).context("Failed to list audio sources")?;
    find_monitor_source(&sources, sink.trim())
        .ok_or_else(|| anyhow!("No monitor source found for default sink {}", sink.trim()))
}

fn find_monitor_source(sources: &str, sink: &str) -> Option<String> {
    sources
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Name:"))
        .map(|name| name.trim())
        .find(|name| name.ends_with(".monitor") && name.starts_with(sink))
        .map(|name| name.to_string())
}

fn get_sink_state() -> Result<SinkState> {
    let volume = pactl(&["get-sink-volume", DEFAULT_SINK])?;
    let mute = pactl(&["get-sink-mute", DEFAULT_SINK])?;
    Ok(SinkState {
        volume_percent: parse_volume_percent(&volume)?,
        muted: parse_mute(&mute)?,
    })
}

fn parse_volume_percent(output: &str) -> Result<u32> {
    let re = Regex::new(r"(\d+)%").context("Invalid volume pattern")?;
    let capture = re
        .captures(output)
        .ok_or_else(|| anyhow!("No volume in pactl output: {}", output.trim()))?;
    capture[1]
        .parse::<u32>()
        .context("Integer conversion failed for sink volume")
}

fn parse_mute(output: &str) -> Result<bool> {
    match output.trim().strip_prefix("Mute:").map(str::trim) {
        Some("yes") => Ok(true),
        Some("no") => Ok(false),
        _ => Err(anyhow!("Unexpected pactl mute output: {}", output.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SOURCES: &str = "Source #55
	State: SUSPENDED
	Name: alsa_output.pci-0000_00_1f.3.analog-stereo.monitor
	Description: Monitor of Built-in Audio
Source #56
	State: RUNNING
	Name: alsa_input.pci-0000_00_1f.3.analog-stereo
	Description: Built-in Audio Analog Stereo
";

    #[test]
    fn test_find_monitor_source() {
        assert_eq!(
            find_monitor_source(SOURCES, "alsa_output.pci-0000_00_1f.3.analog-stereo"),
            Some("alsa_output.pci-0000_00_1f.3.analog-stereo.monitor".to_string())
        );
        assert_eq!(find_monitor_source(SOURCES, "bluez_output.headset"), None);
        assert_eq!(find_monitor_source(SOURCES, "alsa_input.pci-0000_00_1f.3.analog-stereo"), None);
    }

    #[test]
    fn test_parse_volume() {
        let output = "Volume: front-left: 42598 /  65% / -11.23 dB,   front-right: 42598 /  65% / -11.23 dB\n        balance 0.00\n";
        assert_eq!(parse_volume_percent(output).unwrap(), 65);
        assert!(parse_volume_percent("garbage").is_err());
    }

    #[test]
    fn test_parse_mute() {
        assert!(parse_mute("Mute: yes\n").unwrap());
        assert!(!parse_mute("Mute: no\n").unwrap());
        assert!(parse_mute("").is_err());
    }
}
