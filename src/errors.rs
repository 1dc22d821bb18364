use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Reasons a capture session could not be started. None of these are fatal:
/// the session is dropped and the next announced song gets a fresh attempt.
#[derive(Debug)]
pub enum CaptureError {
    OutputDir { path: PathBuf, source: io::Error },
    Spawn { program: String, source: io::Error },
    Closed,
}

impl Error for CaptureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CaptureError::OutputDir { source, .. } => Some(source),
            CaptureError::Spawn { source, .. } => Some(source),
            CaptureError::Closed => None,
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CaptureError::OutputDir { path, .. } => {
                write!(f, "Failed to create output directory {:?}", path)
            }
            CaptureError::Spawn { program, .. } => {
                write!(f, "Failed to start {} - is it installed?", program)
            }
            CaptureError::Closed => write!(f, "Recorder is shutting down"),
        }
    }
}
