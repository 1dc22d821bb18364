use std::io;
use std::io::IsTerminal;
use std::io::Read;
use std::io::Write;
use std::os::fd::AsFd;
use std::sync::Mutex;
use std::thread;
use std::thread::JoinHandle;

use anyhow::Context;
use anyhow::Result;
use log::debug;
use log::warn;
use nix::errno::Errno;
use nix::poll::poll;
use nix::poll::PollFd;
use nix::poll::PollFlags;
use nix::poll::PollTimeout;
use nix::sys::termios;
use nix::sys::termios::SetArg;
use nix::sys::termios::Termios;

use crate::config::INPUT_POLL_TIMEOUT_MILLIS;
use crate::shutdown::Shutdown;
use crate::shutdown::ShutdownReason;

// Reads of at least the size of std's stdin buffer go straight to the fd,
// so nothing is left buffered behind the poll.
const INPUT_BUFFER_SIZE: usize = 8192;

/// Puts the controlling terminal into raw mode and remembers the previous
/// mode. Restoring happens at most once.
pub struct RawModeGuard {
    original: Mutex<Option<Termios>>,
}

impl RawModeGuard {
    /// Returns None if stdin is not a terminal.
    pub fn enable() -> Result<Option<Self>> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            debug!("stdin is not a terminal, leaving it alone");
            return Ok(None);
        }
        let original = termios::tcgetattr(stdin.as_fd()).context("Failed to read terminal mode")?;
        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(stdin.as_fd(), SetArg::TCSANOW, &raw)
            .context("Failed to put terminal into raw mode")?;
        Ok(Some(Self {
            original: Mutex::new(Some(original)),
        }))
    }

    pub fn restore(&self) -> Result<()> {
        let original = self
            .original
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(original) = original {
            termios::tcsetattr(io::stdin().as_fd(), SetArg::TCSANOW, &original)
                .context("Failed to restore terminal mode")?;
        }
        Ok(())
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!("{:#}", e);
        }
    }
}

/// Splits off everything before the first quit key. The second value tells
/// whether the quit key was seen.
fn split_at_quit_key(bytes: &[u8], quit_key: u8) -> (&[u8], bool) {
    match bytes.iter().position(|byte| *byte == quit_key) {
        Some(index) => (&bytes[..index], true),
        None => (bytes, false),
    }
}

/// Copies keystrokes from stdin to the client until the quit key is pressed
/// or the shutdown starts. The quit key itself is not forwarded.
pub fn spawn_input_forwarder(
    input: Box<dyn Write + Send>,
    quit_key: u8,
    shutdown: Shutdown,
) -> JoinHandle<()> {
    thread::spawn(move || {
        if let Err(e) = forward_input(input, quit_key, &shutdown) {
            warn!("Stopped forwarding input: {:#}", e);
        }
        debug!("Input forwarder finished");
    })
}

fn forward_input(mut input: Box<dyn Write + Send>, quit_key: u8, shutdown: &Shutdown) -> Result<()> {
    let stdin = io::stdin();
    let mut buf = [0u8; INPUT_BUFFER_SIZE];
    while !shutdown.is_triggered() {
        let mut fds = [PollFd::new(stdin.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(INPUT_POLL_TIMEOUT_MILLIS)) {
            Ok(0) => continue,
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e).context("Failed to poll stdin"),
        }
        let n = match stdin.lock().read(&mut buf) {
            Ok(0) => {
                debug!("stdin closed");
                return Ok(());
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("Failed to read stdin"),
        };
        let (forward, quit) = split_at_quit_key(&buf[..n], quit_key);
        if !forward.is_empty() {
            input
                .write_all(forward)
                .and_then(|_| input.flush())
                .context("Failed to write to client")?;
        }
        if quit {
            shutdown.trigger(ShutdownReason::QuitKey);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_at_quit_key() {
        assert_eq!(split_at_quit_key(b"abc", b'q'), (&b"abc"[..], false));
        assert_eq!(split_at_quit_key(b"abqc", b'q'), (&b"ab"[..], true));
        assert_eq!(split_at_quit_key(b"q", b'q'), (&b""[..], true));
        assert_eq!(split_at_quit_key(b"", b'q'), (&b""[..], false));
    }
}
