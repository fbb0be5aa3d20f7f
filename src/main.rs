//! Loopback demo: runs the full relay pipeline against a simulated
//! peripheral. A synthetic joystick sweep is published at the cadence of
//! the real command source and every encoded frame lands in the loopback
//! peripheral instead of a radio.

use anyhow::Result;
use drone_relay::domain::settings::SettingsService;
use drone_relay::infrastructure::logging;
use drone_relay::infrastructure::loopback::{
    LoopbackConfig, LoopbackPeripheral, LoopbackTransport,
};
use drone_relay::{CommandFeed, CommandUpdate, RelayWorker};
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = SettingsService::new()?;
    let _logging = logging::init_logger(&settings.get().log_settings)?;

    let target = settings.get().target();
    info!("starting drone relay, target: {:?}", target);

    // Simulated environment: one decoy plus the configured target.
    let target_name = target.name.clone().unwrap_or_else(|| "demo-remote".into());
    let loopback = LoopbackConfig {
        peripherals: vec![
            LoopbackPeripheral::advertising("some-other-device", "11:22:33:44:55:66"),
            LoopbackPeripheral::advertising(target_name, "AA:BB:CC:DD:EE:FF"),
        ],
        advertise_interval: Duration::from_millis(500),
        connect_latency: Duration::from_millis(100),
        ..LoopbackConfig::default()
    };
    let (transport, monitor) = LoopbackTransport::builder(loopback);

    let (feed, stream) = CommandFeed::channel();
    let mut worker = RelayWorker::new(transport, stream, settings.get().relay_config());
    worker.start(target)?;

    let mut states = worker.watch_state();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            info!(%state, "relay state changed");
        }
    });

    // Joystick sweep at the real source's 20 Hz cadence.
    let sweep = tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(50));
        let mut t: f64 = 0.0;
        loop {
            tick.tick().await;
            t += 0.05;
            let mut update = CommandUpdate::new();
            update.insert(0, (128.0 + 127.0 * t.sin()) as i64); // throttle
            update.insert(1, (128.0 + 127.0 * (0.7 * t).cos()) as i64); // yaw
            update.insert(2, (128.0 + 127.0 * (1.3 * t).sin()) as i64); // pitch
            update.insert(3, (128.0 + 127.0 * (0.4 * t).cos()) as i64); // roll
            update.insert(4, 100); // camera
            update.insert(5, 0); // mode
            feed.publish(update);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    sweep.abort();
    worker.stop().await;
    info!(frames = monitor.frames().len(), "relay stopped");

    Ok(())
}
