//! Relay core for forwarding joystick commands to a BLE remote-control
//! peripheral.
//!
//! The crate keeps a long-lived worker alive that scans for a configured
//! peripheral, maintains a connection to it and forwards joystick snapshots
//! from a push-based command source, repacked into a compact 8-byte frame.
//! Transport access (BLE or otherwise) and the command source are injected
//! behind narrow seams, so the whole pipeline runs against the in-process
//! loopback transport in tests and in the demo binary.

pub mod domain;
pub mod infrastructure;
pub mod relay;

pub use domain::codec::{CommandFrame, CommandUpdate};
pub use domain::models::{MatchMode, PeripheralDescriptor, RelayState, TargetSpec};
pub use relay::ingest::{CommandFeed, CommandStream};
pub use relay::manager::{ManagerHandle, SendError};
pub use relay::transport::{
    ConnectionHandle, Transport, TransportBuilder, TransportError, TransportEvent, TransportEvents,
};
pub use relay::worker::{RelayConfig, RelayError, RelayWorker};
