use std::time::Duration;

/// Countdown of the song currently playing. Both fields are zero when
/// nothing is known, e.g. right after a session stopped.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub remaining: Duration,
    pub total: Duration,
}

impl Progress {
    pub fn new(remaining: Duration, total: Duration) -> Self {
        Self {
            remaining: remaining.min(total),
            total,
        }
    }

    pub fn from_elapsed(elapsed: Duration, total: Duration) -> Self {
        Self::new(total.saturating_sub(elapsed), total)
    }

    pub fn is_known(&self) -> bool {
        !self.total.is_zero()
    }

    /// The countdown reached zero for a song of known length.
    pub fn is_finished(&self) -> bool {
        self.is_known() && self.remaining.is_zero()
    }

    /// Decides whether a song interrupted at this point should be kept.
    /// Without any countdown information the interruption is assumed to be
    /// the regular transition to the next song.
    pub fn is_effectively_finished(&self, threshold: Duration) -> bool {
        !self.is_known() || self.remaining <= threshold
    }
}

/// Parses `MM:SS` or `H:MM:SS`.
pub fn parse_clock(text: &str) -> Option<Duration> {
    let fields = text
        .trim()
        .split(':')
        .map(|field| field.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    let (hours, minutes, seconds) = match fields.as_slice() {
        [minutes, seconds] if *seconds < 60 => (0, *minutes, *seconds),
        [hours, minutes, seconds] if *minutes < 60 && *seconds < 60 => {
            (*hours, *minutes, *seconds)
        }
        _ => return None,
    };
    let secs = hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)?;
    Some(Duration::from_secs(secs))
}
