//! Front-facing proxy server.
//!
//! # Responsibilities
//! - Own the listening socket and the accept loop
//! - Spawn one independent task per accepted connection
//! - Expose start/stop and an observable run state
//!
//! # Design Decisions
//! - `start` and `stop` are idempotent
//! - `stop` waits for the accept loop to exit, so the port is free on return
//! - In-flight connections are never aborted by `stop`

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::http::handler::{handle_connection, ProxyContext};
use crate::lifecycle::{RunState, Shutdown, ShutdownSignal, StateCell};
use crate::net::{ConnectionTracker, Listener, ListenerError};

/// A running accept loop.
struct Session {
    shutdown: Shutdown,
    task: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// The intercepting proxy.
pub struct ProxyServer {
    config: ProxyConfig,
    context: Arc<ProxyContext>,
    state: Arc<StateCell>,
    tracker: ConnectionTracker,
    session: Mutex<Option<Session>>,
}

impl ProxyServer {
    /// Create a stopped server with the given configuration.
    pub fn new(config: ProxyConfig) -> Self {
        let context = Arc::new(ProxyContext::from_config(&config));
        Self {
            config,
            context,
            state: Arc::new(StateCell::new()),
            tracker: ConnectionTracker::new(),
            session: Mutex::new(None),
        }
    }

    /// Bind the front listener and start accepting.
    ///
    /// A no-op returning the current address when already running.
    pub async fn start(&self) -> Result<SocketAddr, ListenerError> {
        let mut session = self.session.lock().await;
        if let Some(current) = session.as_ref() {
            if !current.task.is_finished() {
                return Ok(current.local_addr);
            }
        }

        let listener = match Listener::bind(&self.config.listener).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(
                    bind_address = %self.config.listener.bind_address,
                    error = %e,
                    "Failed to start proxy"
                );
                self.state.set(RunState::Failed {
                    reason: e.to_string(),
                });
                *session = None;
                return Err(e);
            }
        };
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        let shutdown = Shutdown::new();
        self.state.set(RunState::Running { local_addr });
        let task = tokio::spawn(accept_loop(
            listener,
            shutdown.subscribe(),
            Arc::clone(&self.context),
            self.tracker.clone(),
            Arc::clone(&self.state),
        ));

        tracing::info!(
            address = %local_addr,
            backend = %self.config.backend.address,
            "Proxy started"
        );

        *session = Some(Session {
            shutdown,
            task,
            local_addr,
        });
        Ok(local_addr)
    }

    /// Stop accepting connections and release the port.
    ///
    /// Safe to call when not running.
    pub async fn stop(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };
        session.shutdown.trigger();
        if let Err(e) = session.task.await {
            tracing::error!(error = %e, "Accept loop panicked");
        }
        self.state.set(RunState::Stopped);
        tracing::info!(
            address = %session.local_addr,
            in_flight = self.tracker.active_count(),
            "Proxy stopped"
        );
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    /// Watch run-state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.state.get().is_running()
    }

    /// Address the listener is bound to, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self.state.get() {
            RunState::Running { local_addr } => Some(local_addr),
            _ => None,
        }
    }

    /// Live-connection tracker, used to drain on exit.
    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }
}

async fn accept_loop(
    listener: Listener,
    mut shutdown: ShutdownSignal,
    context: Arc<ProxyContext>,
    tracker: ConnectionTracker,
    state: Arc<StateCell>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("Accept loop received shutdown signal");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => {
                    let guard = tracker.track();
                    let span = tracing::info_span!("conn", id = %guard.id(), peer = %peer);
                    let context = Arc::clone(&context);
                    tokio::spawn(
                        async move {
                            handle_connection(&context, stream).await;
                            drop(permit);
                            drop(guard);
                        }
                        .instrument(span),
                    );
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(error = %e, "Transient accept error");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Listener failed, stopping");
                    state.set(RunState::Stopped);
                    break;
                }
            }
        }
    }
}
