use std::time::Duration;

pub static CONFIG_FILE_NAME: &str = "config.yaml";
pub static APP_NAME: &str = "pianotrap";
pub static LOG_FILE_NAME: &str = "pianotrap.log";

pub static DEFAULT_SAVE_DIR: &str = "~/Music";
pub static DEFAULT_CLIENT_COMMAND: &str = "pianobar";
pub static DEFAULT_ENCODER: &str = "ffmpeg";
pub static DEFAULT_INPUT_FORMAT: &str = "pulse";
pub static DEFAULT_CODEC: &str = "libmp3lame";
pub static DEFAULT_EXTENSION: &str = "mp3";
pub static DEFAULT_FILTER: &str = "volume=2";
pub static DEFAULT_QUIT_KEY: char = 'q';

/// Directory name used when a song is announced before any station.
pub static UNKNOWN_STATION: &str = "Unknown Station";

pub static CLIENT_CONFIG_PREFIX: &str = "pianobar";
pub static CLIENT_CONFIG_FILE: &str = "config";
pub static EVENT_HOOK_FILE: &str = "eventcmd.sh";
pub static FINISH_MARKER: &str = "SONGFINISH";

/// A song that is interrupted with at most this much playback time left
/// counts as finished and its file is kept.
pub static COMPLETION_THRESHOLD: Duration = Duration::from_secs(5);

/// Files smaller than this are considered spurious captures and removed.
pub static MIN_FILE_SIZE_BYTES: u64 = 50 * 1024;

// Stall detection only starts once the encoder had time to write its header
// and a few seconds of audio.
pub static STALL_GRACE_PERIOD: Duration = Duration::from_secs(30);
pub static STALL_SAMPLE_INTERVAL: Duration = Duration::from_secs(10);
pub static STALL_MIN_FILE_SIZE_BYTES: u64 = 16 * 1024;

pub static MAX_RECORDING_DURATION: Duration = Duration::from_secs(30 * 60);

pub static ENCODER_TERMINATE_GRACE: Duration = Duration::from_millis(300);
pub static ENCODER_REAP_TIMEOUT: Duration = Duration::from_secs(3);
pub static ENCODER_EXIT_POLL_INTERVAL: Duration = Duration::from_millis(200);
pub static ENCODER_STDERR_LINES: usize = 20;

pub static CLIENT_TERMINATE_GRACE: Duration = Duration::from_secs(1);
pub static CLIENT_REAP_TIMEOUT: Duration = Duration::from_secs(3);
pub static CLIENT_EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// Wide enough that "now playing" lines are never wrapped by the client.
pub static PTY_COLUMNS: u16 = 200;
pub static PTY_ROWS: u16 = 50;

pub static READ_RETRY_DELAY: Duration = Duration::from_millis(50);
pub static READ_BUFFER_SIZE: usize = 4096;
pub static MAX_PENDING_LINE_BYTES: usize = 16 * 1024;
pub static INPUT_POLL_TIMEOUT_MILLIS: u16 = 100;
