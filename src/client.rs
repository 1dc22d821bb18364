use std::io::Read;
use std::io::Write;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use anyhow::anyhow;
use anyhow::Context;
use anyhow::Result;
use log::debug;
use log::info;
use log::warn;
use nix::sys::signal;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use portable_pty::native_pty_system;
use portable_pty::Child;
use portable_pty::CommandBuilder;
use portable_pty::MasterPty;
use portable_pty::PtySize;
use serde::Deserialize;
use serde::Serialize;

use crate::config;
use crate::shutdown::Shutdown;
use crate::shutdown::ShutdownReason;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            command: config::DEFAULT_CLIENT_COMMAND.into(),
            args: vec![],
        }
    }
}

/// The two ends of the client's pseudo-terminal that the rest of the
/// program talks to.
pub struct ClientIo {
    pub output: Box<dyn Read + Send>,
    pub input: Box<dyn Write + Send>,
}

/// The streaming client running inside a pseudo-terminal.
pub struct StreamingClient {
    child: Mutex<Box<dyn Child + Send + Sync>>,
    // Kept open for as long as the client runs.
    _master: Mutex<Box<dyn MasterPty + Send>>,
    pid: Option<u32>,
}

impl StreamingClient {
    pub fn spawn(client_config: &ClientConfig) -> Result<(Self, ClientIo)> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: config::PTY_ROWS,
                cols: config::PTY_COLUMNS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| anyhow!("Failed to open pseudo-terminal: {}", e))?;
        let mut command = CommandBuilder::new(&client_config.command);
        command.args(&client_config.args);
        if std::env::var_os("TERM").is_none() {
            command.env("TERM", "xterm-256color");
        }
        let child = pair
            .slave
            .spawn_command(command)
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("Failed to start {}", client_config.command))?;
        // Without our copy of the slave, the client exiting closes the terminal.
        drop(pair.slave);
        let output = pair
            .master
            .try_clone_reader()
            .map_err(|e| anyhow!("Failed to read from pseudo-terminal: {}", e))?;
        let input = pair
            .master
            .take_writer()
            .map_err(|e| anyhow!("Failed to write to pseudo-terminal: {}", e))?;
        let pid = child.process_id();
        info!("Started {} (pid {:?})", client_config.command, pid);
        Ok((
            Self {
                child: Mutex::new(child),
                _master: Mutex::new(pair.master),
                pid,
            },
            ClientIo { output, input },
        ))
    }

    /// Returns whether the client exited successfully, or None while it runs.
    pub fn try_wait(&self) -> Result<Option<bool>> {
        let status = self
            .lock_child()
            .try_wait()
            .context("Failed to check client status")?;
        Ok(status.map(|status| status.success()))
    }

    /// Asks the client to quit, kills it if it does not, and stops waiting
    /// after `reap_timeout`.
    pub fn terminate(&self, grace: Duration, reap_timeout: Duration) -> Result<()> {
        if self.try_wait()?.is_some() {
            return Ok(());
        }
        if let Some(pid) = self.pid {
            debug!("Sending SIGTERM to client (pid {})", pid);
            if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!("Failed to signal client: {}", e);
            }
            if self.wait_for_exit(grace)? {
                return Ok(());
            }
        }
        info!("Client did not quit, killing it");
        self.lock_child()
            .kill()
            .context("Failed to kill client")?;
        if !self.wait_for_exit(reap_timeout)? {
            warn!("Client did not exit within {:?}, giving up on it", reap_timeout);
        }
        Ok(())
    }

    fn wait_for_exit(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_wait()?.is_some() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(config::CLIENT_EXIT_POLL_INTERVAL);
        }
    }

    fn lock_child(&self) -> MutexGuard<Box<dyn Child + Send + Sync>> {
        self.child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Polls the client until it exits or the shutdown starts for another reason.
pub fn watch_client_exit(client: &StreamingClient, shutdown: &Shutdown) {
    loop {
        match client.try_wait() {
            Ok(Some(success)) => {
                shutdown.trigger(ShutdownReason::ClientExited { success });
                return;
            }
            Ok(None) => {}
            Err(e) => warn!("{:#}", e),
        }
        if shutdown.sleep(config::CLIENT_EXIT_POLL_INTERVAL) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ClientConfig {
        ClientConfig {
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
        }
    }

    #[test]
    fn test_client_output_is_readable() {
        let (client, mut io) = StreamingClient::spawn(&sh("echo hello")).unwrap();
        let mut output = vec![];
        let mut buf = [0u8; 256];
        loop {
            match io.output.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => output.extend_from_slice(&buf[..n]),
            }
        }
        assert!(String::from_utf8_lossy(&output).contains("hello"));
        assert!(client.wait_for_exit(Duration::from_secs(5)).unwrap());
        assert_eq!(client.try_wait().unwrap(), Some(true));
    }

    #[test]
    fn test_exit_watcher_reports_failure() {
        let (client, _io) = StreamingClient::spawn(&sh("exit 3")).unwrap();
        let shutdown = Shutdown::new();
        watch_client_exit(&client, &shutdown);
        assert_eq!(
            shutdown.reason(),
            Some(ShutdownReason::ClientExited { success: false })
        );
    }

    #[test]
    fn test_terminate_stops_running_client() {
        let (client, _io) = StreamingClient::spawn(&sh("sleep 30")).unwrap();
        let start = Instant::now();
        client
            .terminate(Duration::from_millis(500), Duration::from_secs(2))
            .unwrap();
        assert!(client.try_wait().unwrap().is_some());
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_missing_client_fails_to_spawn() {
        let config = ClientConfig {
            command: "pianotrap-no-such-client".into(),
            args: vec![],
        };
        assert!(StreamingClient::spawn(&config).is_err());
    }
}
