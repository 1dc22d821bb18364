use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use log::debug;

use super::recording_session::file_size;
use super::recording_session::lock_process;
use super::recording_session::RecordingSession;
use super::recording_session::SharedProcess;
use super::session_controller::SessionController;
use super::StopCause;
use super::SupervisorTimeouts;

static CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Sleeps in small slices so a cancelled session is noticed promptly.
/// Returns false if the session got cancelled meanwhile.
fn sleep_unless_cancelled(cancelled: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancelled.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(CANCEL_CHECK_INTERVAL.min(deadline - now));
    }
}

struct Watched {
    id: u64,
    path: PathBuf,
    start_time: Instant,
    cancelled: Arc<AtomicBool>,
    process: SharedProcess,
}

impl Watched {
    fn new(session: &RecordingSession) -> Self {
        Self {
            id: session.id,
            path: session.path.clone(),
            start_time: session.start_time,
            cancelled: session.cancelled.clone(),
            process: session.process.clone(),
        }
    }
}

/// Starts the background threads that supervise one session: one samples
/// the output file for stalls and enforces the hard ceiling, the other
/// notices when the encoder exits on its own.
pub fn spawn_watchdogs(
    controller: &Arc<SessionController>,
    session: &RecordingSession,
    timeouts: &SupervisorTimeouts,
) {
    {
        let controller = controller.clone();
        let watched = Watched::new(session);
        let timeouts = timeouts.clone();
        thread::spawn(move || watch_output(controller, watched, timeouts));
    }
    {
        let controller = controller.clone();
        let watched = Watched::new(session);
        let poll_interval = timeouts.exit_poll_interval;
        thread::spawn(move || wait_for_exit(controller, watched, poll_interval));
    }
}

fn watch_output(controller: Arc<SessionController>, watched: Watched, timeouts: SupervisorTimeouts) {
    let mut last_size = None;
    while sleep_unless_cancelled(&watched.cancelled, timeouts.stall_sample_interval) {
        let elapsed = watched.start_time.elapsed();
        if elapsed >= timeouts.max_duration {
            controller.abort_session(watched.id, StopCause::HardTimeout);
            return;
        }
        if elapsed < timeouts.stall_grace {
            continue;
        }
        let size = file_size(&watched.path);
        if last_size == Some(size) && size > timeouts.stall_min_size {
            controller.abort_session(watched.id, StopCause::Stalled);
            return;
        }
        last_size = Some(size);
    }
    debug!("Output watchdog for session {} finished", watched.id);
}

fn wait_for_exit(controller: Arc<SessionController>, watched: Watched, poll_interval: Duration) {
    loop {
        let exit = lock_process(&watched.process).poll();
        if watched.cancelled.load(Ordering::SeqCst) {
            return;
        }
        if let Some(exit) = exit {
            controller.finish_session(watched.id, exit);
            return;
        }
        if !sleep_unless_cancelled(&watched.cancelled, poll_interval) {
            return;
        }
    }
}
