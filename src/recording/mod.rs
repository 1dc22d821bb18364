pub mod audio_routing;
pub mod encoder;
pub mod progress;
pub mod recording_session;
pub mod session_controller;
mod watchdog;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub use audio_routing::AudioRouting;
pub use audio_routing::PulseRouting;
pub use encoder::FfmpegEncoder;
pub use progress::Progress;
pub use session_controller::SessionController;

use crate::classifier::InterruptReason;
use crate::config;

/// Bounds on how long the supervisor waits for an encoder and when it gives
/// up on a session.
#[derive(Clone, Debug)]
pub struct SupervisorTimeouts {
    pub terminate_grace: Duration,
    pub reap_timeout: Duration,
    pub stall_grace: Duration,
    pub stall_sample_interval: Duration,
    pub stall_min_size: u64,
    pub max_duration: Duration,
    pub exit_poll_interval: Duration,
}

impl Default for SupervisorTimeouts {
    fn default() -> Self {
        Self {
            terminate_grace: config::ENCODER_TERMINATE_GRACE,
            reap_timeout: config::ENCODER_REAP_TIMEOUT,
            stall_grace: config::STALL_GRACE_PERIOD,
            stall_sample_interval: config::STALL_SAMPLE_INTERVAL,
            stall_min_size: config::STALL_MIN_FILE_SIZE_BYTES,
            max_duration: config::MAX_RECORDING_DURATION,
            exit_poll_interval: config::ENCODER_EXIT_POLL_INTERVAL,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CaptureSettings {
    pub save_dir: PathBuf,
    pub extension: String,
    pub completion_threshold: Duration,
    pub min_file_size: u64,
    pub timeouts: SupervisorTimeouts,
}

/// Why a recording session was stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopCause {
    StationChanged,
    NextTrack,
    Skipped,
    Countdown,
    FinishMarker,
    Interrupted(InterruptReason),
    Stalled,
    HardTimeout,
    Shutdown,
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StopCause::StationChanged => write!(f, "station changed"),
            StopCause::NextTrack => write!(f, "next track started"),
            StopCause::Skipped => write!(f, "track skipped"),
            StopCause::Countdown => write!(f, "track played to the end"),
            StopCause::FinishMarker => write!(f, "client reported end of track"),
            StopCause::Interrupted(reason) => write!(f, "interrupted: {}", reason),
            StopCause::Stalled => write!(f, "output file stopped growing"),
            StopCause::HardTimeout => write!(f, "maximum recording duration exceeded"),
            StopCause::Shutdown => write!(f, "shutting down"),
        }
    }
}
