//! Relay Worker
//!
//! Orchestrates scanning, connecting and command ingestion as one
//! controllable unit with start/stop semantics matching the host service
//! lifecycle: starting twice is a no-op, stopping twice is a no-op, and
//! stop always releases the transport within a bounded time.

use crate::domain::models::{RelayState, TargetSpec};
use crate::relay::ingest::{self, CommandStream};
use crate::relay::manager::{ConnectionManager, ManagerHandle};
use crate::relay::transport::TransportBuilder;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Tunables for one relay worker.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Pause between a failed connect attempt and the next scan cycle.
    pub connect_backoff: Duration,
    /// How long `stop` waits for the supervisory task before force-aborting.
    pub stop_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_backoff: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    /// The target spec names neither a peripheral name nor an address.
    #[error("target spec is empty: configure a peripheral name and/or address")]
    EmptyTarget,
}

struct RunningRelay {
    manager: ManagerHandle,
    supervisor: JoinHandle<()>,
    ingest: JoinHandle<()>,
}

/// The lifecycle surface the host consumes: `start`, `stop` and an
/// observable state plus free-text status.
pub struct RelayWorker {
    build_transport: TransportBuilder,
    commands: CommandStream,
    config: RelayConfig,
    state: Arc<watch::Sender<RelayState>>,
    status: Arc<watch::Sender<String>>,
    running: Option<RunningRelay>,
}

impl RelayWorker {
    pub fn new(
        build_transport: TransportBuilder,
        commands: CommandStream,
        config: RelayConfig,
    ) -> Self {
        Self {
            build_transport,
            commands,
            config,
            state: Arc::new(watch::channel(RelayState::Idle).0),
            status: Arc::new(watch::channel("idle".to_string()).0),
            running: None,
        }
    }

    /// Begin the supervised relay loop for `target`.
    ///
    /// A fresh transport is built for the run, so the worker is restartable
    /// after `stop`. Calling `start` while a run is alive is a logged no-op.
    pub fn start(&mut self, target: TargetSpec) -> Result<(), RelayError> {
        if target.is_empty() {
            return Err(RelayError::EmptyTarget);
        }
        if self.is_running() {
            info!("relay already running, start ignored");
            return Ok(());
        }

        let (manager, supervisor) = ConnectionManager::spawn(
            &self.build_transport,
            target,
            &self.config,
            self.state.clone(),
            self.status.clone(),
        );
        let ingest = tokio::spawn(ingest::run(self.commands.clone(), manager.clone()));

        self.running = Some(RunningRelay {
            manager,
            supervisor,
            ingest,
        });
        info!("relay worker started");
        Ok(())
    }

    /// Stop the relay and release the transport.
    ///
    /// Signals the supervisory task, waits up to the configured bound, then
    /// force-aborts so an unresponsive peripheral can never wedge shutdown.
    /// Idempotent.
    pub async fn stop(&mut self) {
        let Some(run) = self.running.take() else {
            debug!("relay already stopped");
            return;
        };

        run.manager.stop();
        let mut supervisor = run.supervisor;
        if tokio::time::timeout(self.config.stop_timeout, &mut supervisor)
            .await
            .is_err()
        {
            warn!(
                "supervisor did not stop within {:?}, aborting",
                self.config.stop_timeout
            );
            supervisor.abort();
            // the aborted task cannot publish its final transition
            self.state.send_replace(RelayState::Idle);
            self.status.send_replace("stopped (forced)".to_string());
        }
        run.ingest.abort();
        info!("relay worker stopped");
    }

    /// True while a supervised run is alive (including one parked in a
    /// terminal `Failed` state awaiting `stop`).
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|run| !run.supervisor.is_finished())
    }

    /// Latest published state.
    pub fn state(&self) -> RelayState {
        self.state.borrow().clone()
    }

    /// Free-text status reflecting the latest meaningful transition.
    pub fn status(&self) -> String {
        self.status.borrow().clone()
    }

    /// Subscribe to state transitions.
    pub fn watch_state(&self) -> watch::Receiver<RelayState> {
        self.state.subscribe()
    }
}
