//! Loopback Transport
//!
//! In-process transport backed by scripted peripherals. It advertises a
//! configured inventory, accepts or refuses connections and records every
//! delivered frame, so the full relay pipeline can run without radio
//! hardware. Used by the demo binary and the test suite.

use crate::domain::models::PeripheralDescriptor;
use crate::relay::transport::{
    ConnectionHandle, Transport, TransportBuilder, TransportError, TransportEvent, TransportEvents,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// One scripted peripheral in the loopback inventory.
#[derive(Debug, Clone)]
pub struct LoopbackPeripheral {
    pub name: String,
    pub address: String,
    /// Whether a connect attempt succeeds.
    pub connectable: bool,
    /// Whether the peripheral exposes a writable command channel.
    pub writable: bool,
}

impl LoopbackPeripheral {
    pub fn advertising(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            connectable: true,
            writable: true,
        }
    }

    pub fn refusing_connections(mut self) -> Self {
        self.connectable = false;
        self
    }

    pub fn without_writable_channel(mut self) -> Self {
        self.writable = false;
        self
    }

    fn descriptor(&self) -> PeripheralDescriptor {
        PeripheralDescriptor::new(self.name.clone(), self.address.clone())
    }
}

/// Scripted environment for a [`LoopbackTransport`].
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    pub peripherals: Vec<LoopbackPeripheral>,
    /// Pause between advertisement rounds.
    pub advertise_interval: Duration,
    /// Simulated connect setup time.
    pub connect_latency: Duration,
    /// When false, `start_scan` reports the scanner as unavailable.
    pub scanner_available: bool,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            peripherals: Vec::new(),
            advertise_interval: Duration::from_millis(20),
            connect_latency: Duration::from_millis(5),
            scanner_available: true,
        }
    }
}

#[derive(Default)]
struct MonitorInner {
    frames: Mutex<Vec<Vec<u8>>>,
    connected_addresses: Mutex<Vec<String>>,
    events: Mutex<Option<TransportEvents>>,
    builds: AtomicU32,
    disconnects: AtomicU32,
    write_failures: AtomicU32,
}

/// Shared observer handle for the transport: inspect delivered frames,
/// inject faults, sever the link.
#[derive(Clone, Default)]
pub struct LoopbackMonitor {
    inner: Arc<MonitorInner>,
}

impl LoopbackMonitor {
    /// Frames delivered to the peripheral so far, in order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.inner.frames.lock().expect("frames lock").clone()
    }

    /// Addresses of peripherals connected so far, in order.
    pub fn connected_addresses(&self) -> Vec<String> {
        self.inner
            .connected_addresses
            .lock()
            .expect("connects lock")
            .clone()
    }

    /// How many transports were built (one per worker run).
    pub fn builds(&self) -> u32 {
        self.inner.builds.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> u32 {
        self.inner.disconnects.load(Ordering::SeqCst)
    }

    /// Make the next `n` writes fail.
    pub fn fail_next_writes(&self, n: u32) {
        self.inner.write_failures.store(n, Ordering::SeqCst);
    }

    /// Sever the live link, as a peer-initiated disconnect would.
    pub fn drop_link(&self) {
        if let Some(events) = self.inner.events.lock().expect("events lock").as_ref() {
            let _ = events.send(TransportEvent::Disconnected);
        }
    }

    fn attach(&self, events: TransportEvents) {
        *self.inner.events.lock().expect("events lock") = Some(events);
        self.inner.builds.fetch_add(1, Ordering::SeqCst);
    }

    fn record_frame(&self, payload: &[u8]) {
        self.inner
            .frames
            .lock()
            .expect("frames lock")
            .push(payload.to_vec());
    }

    fn record_connect(&self, address: &str) {
        self.inner
            .connected_addresses
            .lock()
            .expect("connects lock")
            .push(address.to_string());
    }

    fn take_write_failure(&self) -> bool {
        self.inner
            .write_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub struct LoopbackTransport {
    config: LoopbackConfig,
    events: TransportEvents,
    monitor: LoopbackMonitor,
    scan_task: Option<JoinHandle<()>>,
    connect_task: Option<JoinHandle<()>>,
    /// Session counter plus the writability of the current session.
    next_session: u64,
    connected_writable: Option<bool>,
}

impl LoopbackTransport {
    /// Builder suitable for [`RelayWorker::new`](crate::RelayWorker::new),
    /// plus the monitor observing every transport built from it.
    pub fn builder(config: LoopbackConfig) -> (TransportBuilder, LoopbackMonitor) {
        let monitor = LoopbackMonitor::default();
        let observer = monitor.clone();
        let builder: TransportBuilder = Box::new(move |events: TransportEvents| {
            observer.attach(events.clone());
            let transport: Box<dyn Transport> = Box::new(LoopbackTransport {
                config: config.clone(),
                events,
                monitor: observer.clone(),
                scan_task: None,
                connect_task: None,
                next_session: 0,
                connected_writable: None,
            });
            transport
        });
        (builder, monitor)
    }
}

impl Transport for LoopbackTransport {
    fn start_scan(&mut self) -> Result<(), TransportError> {
        if !self.config.scanner_available {
            return Err(TransportError::ScanUnavailable(
                "loopback scanner disabled".into(),
            ));
        }
        self.stop_scan();

        let advertisements: Vec<PeripheralDescriptor> =
            self.config.peripherals.iter().map(|p| p.descriptor()).collect();
        let interval = self.config.advertise_interval;
        let events = self.events.clone();
        self.scan_task = Some(tokio::spawn(async move {
            loop {
                for peripheral in &advertisements {
                    if events
                        .send(TransportEvent::Discovered(peripheral.clone()))
                        .is_err()
                    {
                        return;
                    }
                }
                tokio::time::sleep(interval).await;
            }
        }));
        Ok(())
    }

    fn stop_scan(&mut self) {
        if let Some(task) = self.scan_task.take() {
            task.abort();
        }
    }

    fn connect(&mut self, peripheral: &PeripheralDescriptor) -> Result<(), TransportError> {
        let scripted = self
            .config
            .peripherals
            .iter()
            .find(|p| p.address == peripheral.address)
            .cloned();

        self.next_session += 1;
        let session = self.next_session;
        self.connected_writable = scripted.as_ref().map(|p| p.writable);

        let latency = self.config.connect_latency;
        let events = self.events.clone();
        let monitor = self.monitor.clone();
        let peripheral = peripheral.clone();
        self.connect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let accepted = scripted.map(|p| p.connectable).unwrap_or(false);
            let event = if accepted {
                monitor.record_connect(&peripheral.address);
                TransportEvent::Connected(ConnectionHandle {
                    peripheral,
                    session,
                })
            } else {
                TransportEvent::ConnectFailed("peripheral refused the connection".into())
            };
            let _ = events.send(event);
        }));
        Ok(())
    }

    fn write(&mut self, handle: &ConnectionHandle, payload: &[u8]) -> Result<(), TransportError> {
        if self.monitor.take_write_failure() {
            return Err(TransportError::WriteFailed("injected write failure".into()));
        }
        match self.connected_writable {
            Some(true) => {
                self.monitor.record_frame(payload);
                Ok(())
            }
            Some(false) => Err(TransportError::NoWritableTarget),
            None => Err(TransportError::WriteFailed(format!(
                "session {} is gone",
                handle.session
            ))),
        }
    }

    fn disconnect(&mut self, handle: ConnectionHandle) {
        debug!("loopback session {} released", handle.session);
        self.connected_writable = None;
        self.monitor.inner.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.stop_scan();
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
    }
}
