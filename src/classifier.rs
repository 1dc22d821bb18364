use std::fmt;

use anyhow::Context;
use anyhow::Result;
use regex::Captures;
use regex::Regex;

use crate::config::FINISH_MARKER;
use crate::recording::progress::parse_clock;
use crate::recording::Progress;
use crate::song::Track;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InterruptReason {
    NetworkError,
    ConnectionLost,
    Paused,
}

impl fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NetworkError => "network error",
            Self::ConnectionLost => "connection lost",
            Self::Paused => "playback paused",
        };
        write!(f, "{}", text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaybackEvent {
    StationChanged { name: String },
    TrackAnnounced(Track),
    ProgressTick(Progress),
    PlaybackInterrupted { reason: InterruptReason },
    TrackFinished,
}

/// Turns lines of client output into playback events. Holds only the
/// compiled patterns, so one instance can be reused for the whole run.
pub struct Classifier {
    station: Regex,
    track: Regex,
    progress: Regex,
    interruptions: Vec<(Regex, InterruptReason)>,
}

impl Classifier {
    pub fn new() -> Result<Self> {
        let interruptions = vec![
            (r"(?i)network error", InterruptReason::NetworkError),
            (r"(?i)connection lost", InterruptReason::ConnectionLost),
            // Only matches if something prints it: pianobar's pause key
            // itself produces no output.
            (r"(?i)^\W*(?:\(i\)\s*)?paused\b", InterruptReason::Paused),
        ]
        .into_iter()
        .map(|(pattern, reason)| Ok((compile(pattern)?, reason)))
        .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            station: compile(r#"\|>\s+Station\s+"(?P<name>.+)""#)?,
            track: compile(
                r#"\|>\s+"(?P<title>.+?)"\s+by\s+"(?P<artist>.+?)"(?:\s+on\s+"(?P<album>.+?)")?"#,
            )?,
            progress: compile(
                r"#\s+(?P<sign>-)?(?P<left>(?:\d+:)?\d+:\d{2})/(?P<total>(?:\d+:)?\d+:\d{2})",
            )?,
            interruptions,
        })
    }

    /// Classifies one line of output. Lines that match nothing produce no
    /// events; the first matching pattern family wins.
    pub fn classify(&self, line: &str) -> Vec<PlaybackEvent> {
        self.classify_line(line).into_iter().collect()
    }

    fn classify_line(&self, line: &str) -> Option<PlaybackEvent> {
        if line.trim_start().starts_with(FINISH_MARKER) {
            return Some(PlaybackEvent::TrackFinished);
        }
        if let Some(captures) = self.station.captures(line) {
            return Some(PlaybackEvent::StationChanged {
                name: captures["name"].trim().to_string(),
            });
        }
        if let Some(captures) = self.track.captures(line) {
            return Some(PlaybackEvent::TrackAnnounced(get_track_from_capture(&captures)));
        }
        if let Some(captures) = self.progress.captures(line) {
            return get_progress_from_capture(&captures).map(PlaybackEvent::ProgressTick);
        }
        self.interruptions
            .iter()
            .find(|(pattern, _)| pattern.is_match(line))
            .map(|(_, reason)| PlaybackEvent::PlaybackInterrupted { reason: *reason })
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).with_context(|| format!("Invalid output pattern: {}", pattern))
}

fn get_track_from_capture(captures: &Captures) -> Track {
    Track::new(
        &captures["title"],
        &captures["artist"],
        captures.name("album").map(|album| album.as_str()),
    )
}

fn get_progress_from_capture(captures: &Captures) -> Option<Progress> {
    let left = parse_clock(&captures["left"])?;
    let total = parse_clock(&captures["total"])?;
    // The client counts down with a leading minus; a plain value is elapsed time.
    Some(match captures.name("sign") {
        Some(_) => Progress::new(left, total),
        None => Progress::from_elapsed(left, total),
    })
}
