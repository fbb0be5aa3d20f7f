//! Transport Seam
//!
//! The four operations the relay core needs from a transport layer, plus
//! the event messages a transport delivers back. Completions and
//! notifications never call into the core directly: every external event
//! becomes a [`TransportEvent`] on the supervisory loop's channel, so
//! shared state is only ever mutated from that one task.

use crate::domain::models::PeripheralDescriptor;
use thiserror::Error;
use tokio::sync::mpsc;

/// One live session with a peripheral. Owned exclusively by the connection
/// manager; destroyed on disconnect, error or worker shutdown.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub peripheral: PeripheralDescriptor,
    pub session: u64,
}

/// Failures surfaced by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Discovery capability is missing. Terminal for the current run.
    #[error("scanning unavailable: {0}")]
    ScanUnavailable(String),
    /// A connect attempt could not even be started.
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    /// The connected peripheral exposes nothing writable.
    #[error("peripheral has no writable command channel")]
    NoWritableTarget,
    /// A best-effort write was rejected or lost.
    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// Asynchronous results and notifications from the transport, consumed by
/// the supervisory loop.
#[derive(Debug)]
pub enum TransportEvent {
    /// A peripheral advertisement was observed while scanning.
    Discovered(PeripheralDescriptor),
    /// The scan session died; terminal for the current run.
    ScanFailed(String),
    /// A previously requested connect completed.
    Connected(ConnectionHandle),
    /// A previously requested connect did not complete.
    ConnectFailed(String),
    /// The link dropped, peer-initiated or through link loss.
    Disconnected,
}

/// Sender half handed to a transport at construction time; all transport
/// events flow through it.
pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// Builds a fresh transport per worker run, wired to the run's event
/// channel.
pub type TransportBuilder = Box<dyn Fn(TransportEvents) -> Box<dyn Transport> + Send + Sync>;

/// Capability surface the relay core consumes.
///
/// Implementations own any platform resources (watchers, sockets, GATT
/// sessions) and must release them on drop, including half-open scans and
/// in-flight connects.
pub trait Transport: Send {
    /// Begin discovery. Advertisements arrive as
    /// [`TransportEvent::Discovered`]; at most one scan session is active.
    fn start_scan(&mut self) -> Result<(), TransportError>;

    /// End the current scan session, if any. Idempotent.
    fn stop_scan(&mut self);

    /// Begin connecting to a discovered peripheral. The outcome arrives as
    /// [`TransportEvent::Connected`] or [`TransportEvent::ConnectFailed`].
    fn connect(&mut self, peripheral: &PeripheralDescriptor) -> Result<(), TransportError>;

    /// Best-effort write of one encoded frame. No retry, no queueing.
    fn write(&mut self, handle: &ConnectionHandle, payload: &[u8]) -> Result<(), TransportError>;

    /// Release a session obtained through [`TransportEvent::Connected`].
    fn disconnect(&mut self, handle: ConnectionHandle);
}
