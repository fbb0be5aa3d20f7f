//! Relay Module
//!
//! The device-connection and data-relay core.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      RelayWorker                        │
//! │   (start/stop lifecycle, observable state and status)   │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌────────────────┐        ┌──────────────────┐
//! │   Connection   │◄───────│     Command      │
//! │    Manager     │  send  │    Ingestion     │
//! │                │        │                  │
//! │ - scan/connect │        │ - snapshot feed  │
//! │   state machine│        │ - coalescing     │
//! │ - one live     │        │ - codec          │
//! │   connection   │        │                  │
//! └───────┬────────┘        └──────────────────┘
//!         │ events
//!         ▼
//! ┌────────────────┐
//! │   Transport    │
//! │   (injected)   │
//! └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`transport`] - the injected transport seam and its event messages
//! - [`manager`] - scan/connect/ready state machine owning the connection
//! - [`ingest`] - coalescing snapshot channel feeding the manager
//! - [`worker`] - orchestrator exposed to the host

pub mod ingest;
pub mod manager;
pub mod transport;
pub mod worker;

pub use worker::RelayWorker;
