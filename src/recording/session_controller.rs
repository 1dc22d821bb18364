use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use log::debug;
use log::error;
use log::info;
use log::warn;

use super::audio_routing::AudioRouting;
use super::encoder::CaptureExit;
use super::encoder::Encoder;
use super::recording_session::accept_file;
use super::recording_session::discard_file;
use super::recording_session::RecordingSession;
use super::watchdog::spawn_watchdogs;
use super::CaptureSettings;
use super::Progress;
use super::StopCause;
use crate::classifier::InterruptReason;
use crate::classifier::PlaybackEvent;
use crate::errors::CaptureError;
use crate::path_utils::sanitize_file_name;
use crate::path_utils::station_dir;
use crate::path_utils::track_file;
use crate::song::Track;

#[derive(Default)]
struct SessionState {
    station: Option<String>,
    last_track: Option<Track>,
    progress: Progress,
    active: Option<RecordingSession>,
    closed: bool,
}

/// Decides when recordings start and stop. All state lives behind one lock
/// that is held for the whole of every transition, so stopping a session
/// always completes before the next one can start.
pub struct SessionController {
    settings: CaptureSettings,
    encoder: Box<dyn Encoder>,
    routing: Arc<dyn AudioRouting>,
    state: Mutex<SessionState>,
    next_id: AtomicU64,
}

impl SessionController {
    pub fn new(
        settings: CaptureSettings,
        encoder: Box<dyn Encoder>,
        routing: Arc<dyn AudioRouting>,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            encoder,
            routing,
            state: Mutex::new(SessionState::default()),
            next_id: AtomicU64::new(0),
        })
    }

    pub fn handle_event(self: &Arc<Self>, event: PlaybackEvent) {
        let mut state = self.lock_state();
        match event {
            PlaybackEvent::StationChanged { name } => self.on_station_changed(&mut state, &name),
            PlaybackEvent::TrackAnnounced(track) => self.on_track_announced(&mut state, track),
            PlaybackEvent::ProgressTick(progress) => self.on_progress(&mut state, progress),
            PlaybackEvent::TrackFinished => self.on_finish_marker(&mut state),
            PlaybackEvent::PlaybackInterrupted { reason } => {
                self.on_interrupted(&mut state, reason)
            }
        }
    }

    fn on_station_changed(&self, state: &mut SessionState, name: &str) {
        let station = sanitize_file_name(name);
        if state.station.as_deref() == Some(station.as_str()) {
            return;
        }
        self.stop_locked(state, true, StopCause::StationChanged);
        state.last_track = None;
        info!("Switched to station: {}", station);
        let dir = station_dir(&self.settings.save_dir, Some(&station));
        if let Err(e) = fs::create_dir_all(&dir) {
            error!("Failed to create station directory {:?}: {}", dir, e);
        }
        state.station = Some(station);
    }

    fn on_track_announced(self: &Arc<Self>, state: &mut SessionState, track: Track) {
        // The client redraws the current song now and then.
        if state.last_track.as_ref() == Some(&track) {
            debug!("Ignoring repeated announcement of {}", track);
            return;
        }
        if state.active.is_some() {
            let finished = state
                .progress
                .is_effectively_finished(self.settings.completion_threshold);
            let cause = if finished {
                StopCause::NextTrack
            } else {
                StopCause::Skipped
            };
            self.stop_locked(state, !finished, cause);
        }
        state.last_track = Some(track.clone());
        if let Err(e) = self.start_locked(state, track) {
            error!("Could not start recording: {}", display_chain(&e));
        }
    }

    fn on_progress(&self, state: &mut SessionState, progress: Progress) {
        state.progress = progress;
        if state.active.is_some() && progress.is_finished() {
            self.stop_locked(state, false, StopCause::Countdown);
        }
    }

    /// The client reports the end of every song, skipped ones included, so
    /// the marker only keeps the file if the countdown agrees.
    fn on_finish_marker(&self, state: &mut SessionState) {
        if state.active.is_none() {
            return;
        }
        if state
            .progress
            .is_effectively_finished(self.settings.completion_threshold)
        {
            self.stop_locked(state, false, StopCause::FinishMarker);
        } else {
            self.stop_locked(state, true, StopCause::Skipped);
        }
    }

    fn on_interrupted(&self, state: &mut SessionState, reason: InterruptReason) {
        if state.active.is_some() {
            warn!("Playback interrupted: {}", reason);
        }
        self.stop_locked(state, true, StopCause::Interrupted(reason));
        // Resuming the same song afterwards has to start a new recording.
        state.last_track = None;
    }

    fn start_locked(
        self: &Arc<Self>,
        state: &mut SessionState,
        track: Track,
    ) -> Result<(), CaptureError> {
        if state.closed {
            return Err(CaptureError::Closed);
        }
        debug_assert!(state.active.is_none());
        let path = track_file(
            &self.settings.save_dir,
            state.station.as_deref(),
            &track,
            &self.settings.extension,
        );
        create_parent_dir(&path)?;
        if let Err(e) = self.routing.prepare_capture() {
            warn!("Failed to prepare audio output for capture: {:#}", e);
        }
        let process = self.encoder.spawn(self.routing.source(), &path)?;
        info!("Song detected - saving to {:?}", path);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let session = RecordingSession::new(id, path, track, process);
        spawn_watchdogs(self, &session, &self.settings.timeouts);
        state.progress = Progress::default();
        state.active = Some(session);
        Ok(())
    }

    /// Stops the active session, if any, and either deletes its file or
    /// keeps it subject to the minimum size check. Returns once the encoder
    /// was reaped or abandoned.
    fn stop_locked(&self, state: &mut SessionState, delete: bool, cause: StopCause) {
        let session = match state.active.take() {
            Some(session) => session,
            None => return,
        };
        info!("Stopping recording of {} ({})", session.track, cause);
        let termination = session.terminate(&self.settings.timeouts);
        debug!(
            "Encoder for session {} after {:?}: {:?}",
            session.id,
            session.time_since_start(),
            termination
        );
        if delete {
            discard_file(&session.path);
        } else {
            accept_file(&session.path, self.settings.min_file_size);
        }
        state.progress = Progress::default();
    }

    /// Stops and discards the active session and refuses to start new ones.
    pub fn close(&self) {
        let mut state = self.lock_state();
        state.closed = true;
        self.stop_locked(&mut state, true, StopCause::Shutdown);
    }

    /// Called by the watchdog. Does nothing if the session already ended.
    pub(super) fn abort_session(&self, id: u64, cause: StopCause) {
        let mut state = self.lock_state();
        if state.active.as_ref().map(|session| session.id) == Some(id) {
            warn!("Aborting recording: {}", cause);
            self.stop_locked(&mut state, true, cause);
        }
    }

    /// Called when the encoder exited without being asked to.
    pub(super) fn finish_session(&self, id: u64, exit: CaptureExit) {
        let mut state = self.lock_state();
        if state.active.as_ref().map(|session| session.id) != Some(id) {
            return;
        }
        let session = match state.active.take() {
            Some(session) => session,
            None => return,
        };
        session.cancelled.store(true, Ordering::SeqCst);
        state.progress = Progress::default();
        match exit {
            CaptureExit::Failed(status) => {
                error!(
                    "Error capturing audio for {:?}: encoder exited with {}\n{}",
                    session.path,
                    status,
                    session.stderr_tail().join("\n")
                );
                discard_file(&session.path);
            }
            _ => {
                accept_file(&session.path, self.settings.min_file_size);
            }
        }
    }

    #[cfg(test)]
    pub fn is_recording(&self) -> bool {
        self.lock_state().active.is_some()
    }

    pub fn recording_path(&self) -> Option<PathBuf> {
        self.lock_state()
            .active
            .as_ref()
            .map(|session| session.path.clone())
    }

    #[cfg(test)]
    pub fn current_station(&self) -> Option<String> {
        self.lock_state().station.clone()
    }

    #[cfg(test)]
    pub fn progress(&self) -> Progress {
        self.lock_state().progress
    }

    fn lock_state(&self) -> MutexGuard<SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn create_parent_dir(path: &Path) -> Result<(), CaptureError> {
    match path.parent() {
        Some(dir) => fs::create_dir_all(dir).map_err(|source| CaptureError::OutputDir {
            path: dir.to_owned(),
            source,
        }),
        None => Ok(()),
    }
}

fn display_chain(error: &dyn std::error::Error) -> String {
    match error.source() {
        Some(source) => format!("{}: {}", error, display_chain(source)),
        None => error.to_string(),
    }
}
