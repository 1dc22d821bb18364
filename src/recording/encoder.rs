use std::collections::VecDeque;
use std::fs::File;
use std::io;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use log::debug;
use serde::Deserialize;
use serde::Serialize;
use subprocess::Exec;
use subprocess::ExitStatus;
use subprocess::NullFile;
use subprocess::Popen;
use subprocess::PopenError;
use subprocess::Redirection;

use crate::config;
use crate::config::ENCODER_STDERR_LINES;
use crate::errors::CaptureError;

/// How a capture process ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureExit {
    Success,
    Signaled,
    Failed(String),
}

impl From<ExitStatus> for CaptureExit {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Exited(0) => Self::Success,
            ExitStatus::Signaled(_) => Self::Signaled,
            other => Self::Failed(format!("{:?}", other)),
        }
    }
}

/// A running encoder writing one output file.
pub trait CaptureProcess: Send {
    fn poll(&mut self) -> Option<CaptureExit>;
    fn terminate(&mut self) -> io::Result<()>;
    fn kill(&mut self) -> io::Result<()>;
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<CaptureExit>>;
    /// Stop caring about the process, so dropping the handle does not wait for it.
    fn detach(&mut self) {}
    fn stderr_tail(&self) -> Vec<String> {
        vec![]
    }
}

pub trait Encoder: Send + Sync {
    fn spawn(&self, source: &str, output: &Path) -> Result<Box<dyn CaptureProcess>, CaptureError>;
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EncoderConfig {
    pub program: String,
    pub input_format: String,
    pub codec: String,
    pub extension: String,
    pub filter: Option<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: config::DEFAULT_ENCODER.into(),
            input_format: config::DEFAULT_INPUT_FORMAT.into(),
            codec: config::DEFAULT_CODEC.into(),
            extension: config::DEFAULT_EXTENSION.into(),
            filter: Some(config::DEFAULT_FILTER.into()),
        }
    }
}

pub struct FfmpegEncoder {
    config: EncoderConfig,
}

impl FfmpegEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    fn command(&self, source: &str, output: &Path) -> Exec {
        let mut cmd = Exec::cmd(&self.config.program)
            .arg("-hide_banner")
            .arg("-nostdin")
            .arg("-loglevel")
            .arg("warning")
            .arg("-f")
            .arg(&self.config.input_format)
            .arg("-i")
            .arg(source);
        if let Some(filter) = &self.config.filter {
            cmd = cmd.arg("-af").arg(filter);
        }
        cmd.arg("-acodec")
            .arg(&self.config.codec)
            .arg("-y")
            .arg(output)
            .stdin(NullFile)
            .stdout(NullFile)
            .stderr(Redirection::Pipe)
    }
}

impl Encoder for FfmpegEncoder {
    fn spawn(&self, source: &str, output: &Path) -> Result<Box<dyn CaptureProcess>, CaptureError> {
        let mut process = self.command(source, output).popen().map_err(|e| CaptureError::Spawn {
            program: self.config.program.clone(),
            source: into_io_error(e),
        })?;
        let stderr_tail = Arc::new(Mutex::new(VecDeque::new()));
        if let Some(stderr) = process.stderr.take() {
            drain_stderr(stderr, stderr_tail.clone());
        }
        debug!("Started {} for {:?}", self.config.program, output);
        Ok(Box::new(EncoderProcess {
            process,
            stderr_tail,
        }))
    }
}

fn into_io_error(error: PopenError) -> io::Error {
    match error {
        PopenError::IoError(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}

/// The encoder blocks once its stderr pipe is full, so it is read
/// continuously. Only the last few lines are kept for error reports.
fn drain_stderr(stderr: File, tail: Arc<Mutex<VecDeque<String>>>) {
    thread::spawn(move || {
        for line in BufReader::new(stderr).split(b'\n') {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            let mut tail = tail.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if tail.len() == ENCODER_STDERR_LINES {
                tail.pop_front();
            }
            tail.push_back(String::from_utf8_lossy(&line).trim_end().to_string());
        }
    });
}

struct EncoderProcess {
    process: Popen,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
}

impl CaptureProcess for EncoderProcess {
    fn poll(&mut self) -> Option<CaptureExit> {
        self.process.poll().map(CaptureExit::from)
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.process.terminate()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.process.kill()
    }

    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<CaptureExit>> {
        self.process
            .wait_timeout(timeout)
            .map(|status| status.map(CaptureExit::from))
            .map_err(into_io_error)
    }

    fn detach(&mut self) {
        self.process.detach();
    }

    fn stderr_tail(&self) -> Vec<String> {
        self.stderr_tail
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_mapping() {
        assert_eq!(CaptureExit::from(ExitStatus::Exited(0)), CaptureExit::Success);
        assert_eq!(CaptureExit::from(ExitStatus::Signaled(15)), CaptureExit::Signaled);
        assert!(matches!(
            CaptureExit::from(ExitStatus::Exited(1)),
            CaptureExit::Failed(_)
        ));
    }

    #[test]
    fn test_command_line() {
        let encoder = FfmpegEncoder::new(EncoderConfig::default());
        let cmdline = encoder
            .command("sink.monitor", Path::new("/music/A/Song1 - Artist1.mp3"))
            .to_cmdline_lossy();
        assert!(cmdline.starts_with("ffmpeg "));
        assert!(cmdline.contains("-f pulse -i sink.monitor"));
        assert!(cmdline.contains("volume=2"));
        assert!(cmdline.contains("-acodec libmp3lame -y"));
        assert!(cmdline.contains("Song1 - Artist1.mp3"));
    }

    #[test]
    fn test_missing_program_is_a_spawn_error() {
        let encoder = FfmpegEncoder::new(EncoderConfig {
            program: "pianotrap-no-such-encoder".into(),
            ..EncoderConfig::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let result = encoder.spawn("default.monitor", &dir.path().join("out.mp3"));
        assert!(matches!(result, Err(CaptureError::Spawn { .. })));
    }
}
