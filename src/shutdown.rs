use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use anyhow::Result;
use log::debug;
use log::error;
use log::info;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    QuitKey,
    Signal,
    ClientExited { success: bool },
    TranscriptClosed,
    TranscriptFailed(String),
}

impl ShutdownReason {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ClientExited { success: false } | Self::TranscriptFailed(_)
        )
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuitKey => write!(f, "quit key pressed"),
            Self::Signal => write!(f, "received termination signal"),
            Self::ClientExited { success: true } => write!(f, "client exited"),
            Self::ClientExited { success: false } => write!(f, "client exited with an error"),
            Self::TranscriptClosed => write!(f, "client terminal closed"),
            Self::TranscriptFailed(e) => write!(f, "reading client output failed: {}", e),
        }
    }
}

struct ShutdownState {
    triggered: AtomicBool,
    reason: Mutex<Option<ShutdownReason>>,
    condvar: Condvar,
}

/// Shared "done" signal. Every thread checks it at its blocking points; the
/// first reason to arrive is the one reported.
#[derive(Clone)]
pub struct Shutdown {
    state: Arc<ShutdownState>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            state: Arc::new(ShutdownState {
                triggered: AtomicBool::new(false),
                reason: Mutex::new(None),
                condvar: Condvar::new(),
            }),
        }
    }

    pub fn trigger(&self, reason: ShutdownReason) {
        let mut current = self.lock_reason();
        if current.is_none() {
            info!("Shutting down: {}", reason);
            *current = Some(reason);
        } else {
            debug!("Ignoring shutdown trigger: {}", reason);
        }
        self.state.triggered.store(true, Ordering::SeqCst);
        self.state.condvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        self.state.triggered.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.lock_reason().clone()
    }

    /// Blocks until some thread triggered the shutdown.
    pub fn wait(&self) -> ShutdownReason {
        let mut reason = self.lock_reason();
        loop {
            if let Some(reason) = reason.as_ref() {
                return reason.clone();
            }
            reason = self
                .state
                .condvar
                .wait(reason)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Sleeps for `duration` unless the shutdown is triggered earlier.
    /// Returns whether it was triggered.
    pub fn sleep(&self, duration: Duration) -> bool {
        let reason = self.lock_reason();
        let (reason, _) = self
            .state
            .condvar
            .wait_timeout_while(reason, duration, |reason| reason.is_none())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        reason.is_some()
    }

    fn lock_reason(&self) -> MutexGuard<Option<ShutdownReason>> {
        self.state
            .reason
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct TeardownStep {
    name: &'static str,
    action: Box<dyn FnOnce() -> Result<()> + Send>,
}

impl TeardownStep {
    pub fn new<F>(name: &'static str, action: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Self {
            name,
            action: Box::new(action),
        }
    }
}

/// Ordered teardown that runs at most once, no matter how many triggers
/// race to execute it. A concurrent caller waits until the first run is
/// complete.
pub struct Teardown {
    steps: Mutex<Option<Vec<TeardownStep>>>,
}

impl Teardown {
    pub fn new(steps: Vec<TeardownStep>) -> Self {
        Self {
            steps: Mutex::new(Some(steps)),
        }
    }

    /// Returns whether this call performed the teardown.
    pub fn run(&self) -> bool {
        let mut steps = self
            .steps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let steps = match steps.take() {
            Some(steps) => steps,
            None => return false,
        };
        for step in steps {
            debug!("Teardown: {}", step.name);
            if let Err(e) = (step.action)() {
                error!("Teardown step '{}' failed: {:#}", step.name, e);
            }
        }
        true
    }
}
