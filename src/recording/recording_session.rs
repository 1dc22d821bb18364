use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use std::time::Instant;

use log::info;
use log::warn;

use super::encoder::CaptureExit;
use super::encoder::CaptureProcess;
use super::SupervisorTimeouts;
use crate::song::Track;

pub type SharedProcess = Arc<Mutex<Box<dyn CaptureProcess>>>;

/// One encoder run for one song. Owned by the session controller; the
/// watchdog threads only get the shared process handle and the cancel flag.
pub struct RecordingSession {
    pub id: u64,
    pub path: PathBuf,
    pub track: Track,
    pub start_time: Instant,
    pub process: SharedProcess,
    pub cancelled: Arc<AtomicBool>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Termination {
    Exited(CaptureExit),
    Abandoned,
}

impl RecordingSession {
    pub fn new(id: u64, path: PathBuf, track: Track, process: Box<dyn CaptureProcess>) -> Self {
        Self {
            id,
            path,
            track,
            start_time: Instant::now(),
            process: Arc::new(Mutex::new(process)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn time_since_start(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Graceful terminate, short grace period, kill, then a bounded wait.
    /// A process that survives all of that is abandoned.
    pub fn terminate(&self, timeouts: &SupervisorTimeouts) -> Termination {
        self.cancelled.store(true, Ordering::SeqCst);
        let mut process = lock_process(&self.process);
        if let Some(exit) = process.poll() {
            return Termination::Exited(exit);
        }
        if let Err(e) = process.terminate() {
            warn!("Failed to terminate encoder: {}", e);
        }
        if let Ok(Some(exit)) = process.wait_timeout(timeouts.terminate_grace) {
            return Termination::Exited(exit);
        }
        if let Err(e) = process.kill() {
            warn!("Failed to kill encoder: {}", e);
        }
        match process.wait_timeout(timeouts.reap_timeout) {
            Ok(Some(exit)) => Termination::Exited(exit),
            Ok(None) => {
                warn!(
                    "Encoder for {:?} did not exit within {:?}, abandoning it",
                    self.path, timeouts.reap_timeout
                );
                process.detach();
                Termination::Abandoned
            }
            Err(e) => {
                warn!("Failed to wait for encoder: {}, abandoning it", e);
                process.detach();
                Termination::Abandoned
            }
        }
    }

    pub fn stderr_tail(&self) -> Vec<String> {
        lock_process(&self.process).stderr_tail()
    }
}

pub fn lock_process(process: &SharedProcess) -> MutexGuard<Box<dyn CaptureProcess>> {
    process.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Size of the file or zero if it does not exist (yet).
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|metadata| metadata.len()).unwrap_or(0)
}

pub fn discard_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => info!("Removed incomplete file: {:?}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {:?}: {}", path, e),
    }
}

/// Keeps the file if it is large enough to be a real song. Returns whether
/// the file was kept.
pub fn accept_file(path: &Path, min_size: u64) -> bool {
    if !path.exists() {
        warn!("File not found after capture: {:?}", path);
        return false;
    }
    let size = file_size(path);
    if size < min_size {
        info!("Skipping incomplete track ({} bytes): {:?}", size, path);
        discard_file(path);
        false
    } else {
        info!("Saved: {:?} ({} bytes)", path, size);
        true
    }
}
