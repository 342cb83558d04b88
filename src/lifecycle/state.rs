//! Proxy run state.
//!
//! # State Transitions
//! ```text
//! Stopped → Running: successful bind
//! Stopped → Failed:  bind error (no listener exists)
//! Running → Stopped: stop(), or a fatal accept error
//! Failed  → Running: a later successful start()
//! ```

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::watch;

/// Whether the front listener currently exists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Stopped,
    Running {
        local_addr: SocketAddr,
    },
    Failed {
        reason: String,
    },
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running { .. })
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Stopped => write!(f, "stopped"),
            RunState::Running { local_addr } => write!(f, "running on {}", local_addr),
            RunState::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Publishes [`RunState`] changes to any number of observers.
#[derive(Debug)]
pub struct StateCell {
    tx: watch::Sender<RunState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(RunState::Stopped);
        Self { tx }
    }

    pub fn get(&self) -> RunState {
        self.tx.borrow().clone()
    }

    pub fn set(&self, state: RunState) {
        tracing::debug!(state = %state, "Proxy state changed");
        self.tx.send_replace(state);
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.tx.subscribe()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
