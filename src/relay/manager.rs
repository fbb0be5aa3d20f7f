//! Connection Manager
//!
//! One supervisory task owning the scan -> connect -> ready -> retry state
//! machine and the single live [`ConnectionHandle`]. All transport events
//! and caller commands arrive as messages on channels; the task is the only
//! place that touches the transport or mutates the published state.

use crate::domain::codec::CommandFrame;
use crate::domain::models::{PeripheralDescriptor, RelayState, TargetSpec};
use crate::relay::transport::{
    ConnectionHandle, Transport, TransportBuilder, TransportError, TransportEvent,
};
use crate::relay::worker::RelayConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why a frame did not reach the peripheral.
#[derive(Debug, Error)]
pub enum SendError {
    /// No peripheral is connected; the frame is dropped, the next snapshot
    /// supersedes it.
    #[error("no peripheral connected")]
    NotConnected,
    /// The transport rejected the write.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The supervisory task is gone.
    #[error("relay is not running")]
    Closed,
}

pub(crate) enum ManagerCommand {
    Send {
        frame: CommandFrame,
        reply: oneshot::Sender<Result<(), SendError>>,
    },
    Stop,
}

/// Cloneable caller-side handle to a running connection manager.
#[derive(Clone)]
pub struct ManagerHandle {
    commands: mpsc::UnboundedSender<ManagerCommand>,
    state: watch::Receiver<RelayState>,
}

impl ManagerHandle {
    /// Current state as last published by the supervisory task.
    pub fn state(&self) -> RelayState {
        self.state.borrow().clone()
    }

    /// Deliver one frame, best effort. Fails fast with
    /// [`SendError::NotConnected`] unless the manager is `Ready`; a
    /// transport failure is returned without retry.
    pub async fn send(&self, frame: CommandFrame) -> Result<(), SendError> {
        if *self.state.borrow() != RelayState::Ready {
            return Err(SendError::NotConnected);
        }
        let (reply, response) = oneshot::channel();
        self.commands
            .send(ManagerCommand::Send { frame, reply })
            .map_err(|_| SendError::Closed)?;
        response.await.map_err(|_| SendError::Closed)?
    }

    /// Request shutdown. Safe to call from any state, any number of times.
    pub fn stop(&self) {
        let _ = self.commands.send(ManagerCommand::Stop);
    }
}

enum Step {
    Command(Option<ManagerCommand>),
    Event(Option<TransportEvent>),
}

enum ScanWait {
    Found(PeripheralDescriptor),
    Fatal(String),
    Stop,
}

enum ConnectWait {
    Connected(ConnectionHandle),
    Failed(String),
    Stop,
}

enum ReadyExit {
    Disconnected,
    Stop,
}

pub(crate) struct ConnectionManager {
    transport: Box<dyn Transport>,
    target: TargetSpec,
    backoff: Duration,
    commands: mpsc::UnboundedReceiver<ManagerCommand>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    state: Arc<watch::Sender<RelayState>>,
    status: Arc<watch::Sender<String>>,
    connection: Option<ConnectionHandle>,
}

impl ConnectionManager {
    /// Build a transport for this run and spawn the supervisory task.
    pub(crate) fn spawn(
        build_transport: &TransportBuilder,
        target: TargetSpec,
        config: &RelayConfig,
        state: Arc<watch::Sender<RelayState>>,
        status: Arc<watch::Sender<String>>,
    ) -> (ManagerHandle, JoinHandle<()>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let transport = build_transport(event_tx);

        let handle = ManagerHandle {
            commands: command_tx,
            state: state.subscribe(),
        };
        let manager = Self {
            transport,
            target,
            backoff: config.connect_backoff,
            commands: command_rx,
            events: event_rx,
            state,
            status,
            connection: None,
        };
        (handle, tokio::spawn(manager.run()))
    }

    async fn run(mut self) {
        if let Some(reason) = self.supervise().await {
            self.transport.stop_scan();
            self.set_state(RelayState::Failed(reason.clone()), &format!("failed: {reason}"));
            self.park_failed().await;
        }
        self.release();
        self.set_state(RelayState::Idle, "stopped");
    }

    /// The retry loop. Returns `None` on requested stop, `Some(reason)` on
    /// a terminal failure.
    async fn supervise(&mut self) -> Option<String> {
        loop {
            self.set_state(RelayState::Scanning, "scanning for peripheral");
            if let Err(e) = self.transport.start_scan() {
                return Some(e.to_string());
            }

            let peripheral = match self.await_match().await {
                ScanWait::Found(peripheral) => peripheral,
                ScanWait::Fatal(reason) => return Some(reason),
                ScanWait::Stop => return None,
            };
            // at most one scan session: stop before connecting
            self.transport.stop_scan();
            self.set_state(
                RelayState::Connecting,
                &format!("found {}, connecting", peripheral.label()),
            );

            if let Err(e) = self.transport.connect(&peripheral) {
                warn!("connect attempt not started: {e}");
                self.set_status(&format!("connect failed: {e}"));
                if self.backoff_interrupted().await {
                    return None;
                }
                continue;
            }

            match self.await_connected().await {
                ConnectWait::Connected(handle) => {
                    info!("connected to {}", handle.peripheral.label());
                    self.connection = Some(handle);
                    self.set_state(RelayState::Ready, "connected");
                }
                ConnectWait::Failed(reason) => {
                    warn!("connect failed: {reason}");
                    self.set_status(&format!("connect failed: {reason}"));
                    if self.backoff_interrupted().await {
                        return None;
                    }
                    continue;
                }
                ConnectWait::Stop => return None,
            }

            match self.serve_ready().await {
                ReadyExit::Disconnected => {
                    self.drop_connection();
                    self.set_state(
                        RelayState::Disconnected,
                        "peripheral disconnected, rescanning",
                    );
                    continue;
                }
                ReadyExit::Stop => return None,
            }
        }
    }

    async fn next_step(&mut self) -> Step {
        tokio::select! {
            command = self.commands.recv() => Step::Command(command),
            event = self.events.recv() => Step::Event(event),
        }
    }

    async fn await_match(&mut self) -> ScanWait {
        loop {
            match self.next_step().await {
                Step::Command(None | Some(ManagerCommand::Stop)) => return ScanWait::Stop,
                Step::Command(Some(ManagerCommand::Send { reply, .. })) => {
                    let _ = reply.send(Err(SendError::NotConnected));
                }
                Step::Event(Some(TransportEvent::Discovered(peripheral))) => {
                    debug!(
                        name = %peripheral.name,
                        address = %peripheral.address,
                        "discovered peripheral"
                    );
                    if self.target.matches(&peripheral) {
                        return ScanWait::Found(peripheral);
                    }
                }
                Step::Event(Some(TransportEvent::ScanFailed(reason))) => {
                    return ScanWait::Fatal(reason)
                }
                Step::Event(Some(_)) => {} // stale event from a previous session
                Step::Event(None) => {
                    warn!("transport event channel closed");
                    return ScanWait::Stop;
                }
            }
        }
    }

    async fn await_connected(&mut self) -> ConnectWait {
        loop {
            match self.next_step().await {
                Step::Command(None | Some(ManagerCommand::Stop)) => return ConnectWait::Stop,
                Step::Command(Some(ManagerCommand::Send { reply, .. })) => {
                    let _ = reply.send(Err(SendError::NotConnected));
                }
                Step::Event(Some(TransportEvent::Connected(handle))) => {
                    return ConnectWait::Connected(handle)
                }
                Step::Event(Some(TransportEvent::ConnectFailed(reason))) => {
                    return ConnectWait::Failed(reason)
                }
                Step::Event(Some(TransportEvent::Disconnected)) => {
                    return ConnectWait::Failed("link lost during setup".into())
                }
                Step::Event(Some(_)) => {} // late advertisement
                Step::Event(None) => {
                    warn!("transport event channel closed");
                    return ConnectWait::Stop;
                }
            }
        }
    }

    async fn serve_ready(&mut self) -> ReadyExit {
        loop {
            match self.next_step().await {
                Step::Command(None | Some(ManagerCommand::Stop)) => return ReadyExit::Stop,
                Step::Command(Some(ManagerCommand::Send { frame, reply })) => {
                    let _ = reply.send(self.write_frame(&frame));
                }
                Step::Event(Some(TransportEvent::Disconnected)) => return ReadyExit::Disconnected,
                Step::Event(Some(_)) => {} // late advertisement or connect result
                Step::Event(None) => {
                    warn!("transport event channel closed");
                    return ReadyExit::Stop;
                }
            }
        }
    }

    /// Write one frame over the live connection. A failure is folded into
    /// status text; the connection stays up and the next snapshot
    /// supersedes the lost frame.
    fn write_frame(&mut self, frame: &CommandFrame) -> Result<(), SendError> {
        let Some(handle) = self.connection.as_ref() else {
            return Err(SendError::NotConnected);
        };
        match self.transport.write(handle, &frame.to_bytes()) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("frame write failed: {e}");
                self.set_status(&format!("send failed: {e}"));
                Err(SendError::Transport(e))
            }
        }
    }

    /// Terminal failure: keep answering callers until stop is requested so
    /// the host process never sees a crash.
    async fn park_failed(&mut self) {
        loop {
            match self.next_step().await {
                Step::Command(None | Some(ManagerCommand::Stop)) => return,
                Step::Command(Some(ManagerCommand::Send { reply, .. })) => {
                    let _ = reply.send(Err(SendError::NotConnected));
                }
                Step::Event(None) => return,
                Step::Event(Some(_)) => {}
            }
        }
    }

    /// Interruptible backoff between connect attempts. Returns true when
    /// stop was requested.
    async fn backoff_interrupted(&mut self) -> bool {
        let sleep = tokio::time::sleep(self.backoff);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                command = self.commands.recv() => match command {
                    None | Some(ManagerCommand::Stop) => return true,
                    Some(ManagerCommand::Send { reply, .. }) => {
                        let _ = reply.send(Err(SendError::NotConnected));
                    }
                },
            }
        }
    }

    fn drop_connection(&mut self) {
        if let Some(handle) = self.connection.take() {
            self.transport.disconnect(handle);
        }
    }

    /// Release every transport resource. Runs on every exit path.
    fn release(&mut self) {
        self.transport.stop_scan();
        self.drop_connection();
    }

    fn set_state(&self, state: RelayState, status: &str) {
        info!(%state, "{status}");
        self.state.send_replace(state);
        self.set_status(status);
    }

    fn set_status(&self, status: &str) {
        self.status.send_replace(status.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::loopback::{LoopbackConfig, LoopbackPeripheral, LoopbackTransport};

    fn spawn_manager(
        config: LoopbackConfig,
        target: TargetSpec,
    ) -> (ManagerHandle, JoinHandle<()>) {
        let (builder, _monitor) = LoopbackTransport::builder(config);
        let state = Arc::new(watch::channel(RelayState::Idle).0);
        let status = Arc::new(watch::channel(String::new()).0);
        ConnectionManager::spawn(&builder, target, &RelayConfig::default(), state, status)
    }

    #[tokio::test]
    async fn test_send_while_scanning_is_not_connected() {
        // nothing advertised, so the manager stays in Scanning
        let (handle, task) = spawn_manager(
            LoopbackConfig::default(),
            TargetSpec::by_name("missing-device"),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.state(), RelayState::Scanning);
        assert!(matches!(
            handle.send(CommandFrame::default()).await,
            Err(SendError::NotConnected)
        ));
        handle.stop();
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_from_any_state() {
        let (handle, task) = spawn_manager(
            LoopbackConfig::default(),
            TargetSpec::by_name("missing-device"),
        );
        handle.stop();
        handle.stop();
        let _ = task.await;
        assert_eq!(handle.state(), RelayState::Idle);
        assert!(matches!(
            handle.send(CommandFrame::default()).await,
            Err(SendError::NotConnected | SendError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_scan_unavailable_is_terminal() {
        let config = LoopbackConfig {
            scanner_available: false,
            peripherals: vec![LoopbackPeripheral::advertising("beacon-1", "AA:BB")],
            ..LoopbackConfig::default()
        };
        let (handle, task) = spawn_manager(config, TargetSpec::by_name("beacon-1"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(handle.state(), RelayState::Failed(_)));
        // still answering callers, still stoppable
        assert!(matches!(
            handle.send(CommandFrame::default()).await,
            Err(SendError::NotConnected)
        ));
        handle.stop();
        let _ = task.await;
        assert_eq!(handle.state(), RelayState::Idle);
    }
}
