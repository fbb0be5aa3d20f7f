//! Command Ingestion Channel
//!
//! Bridges the external push source to the connection manager. Snapshots
//! land in a watch channel, so a burst arriving while a send is in flight
//! collapses to the latest snapshot: one send at a time, no backlog, and
//! stale commands are silently superseded.

use crate::domain::codec::{CommandFrame, CommandUpdate};
use crate::relay::manager::{ManagerHandle, SendError};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// Receive half consumed by the ingestion task. Cloneable; each worker run
/// picks up from the latest snapshot.
pub type CommandStream = watch::Receiver<Option<CommandUpdate>>;

/// Push side handed to the external data source. Each published snapshot
/// fully replaces the previous one.
pub struct CommandFeed {
    updates: watch::Sender<Option<CommandUpdate>>,
}

impl CommandFeed {
    pub fn channel() -> (CommandFeed, CommandStream) {
        let (updates, stream) = watch::channel(None);
        (CommandFeed { updates }, stream)
    }

    /// Publish one snapshot. A snapshot identical to the previous one is
    /// suppressed, matching the upstream clients that only write on change.
    pub fn publish(&self, update: CommandUpdate) {
        let published = self.updates.send_if_modified(|slot| {
            if slot.as_ref() == Some(&update) {
                false
            } else {
                *slot = Some(update);
                true
            }
        });
        if published {
            trace!("snapshot published");
        }
    }

    /// Record a source-side error. Errors never reach the wire; the relay
    /// keeps running on the last good snapshot.
    pub fn publish_error(&self, error: &str) {
        warn!(%error, "command source error, snapshot dropped");
    }
}

/// Consume snapshots in arrival order, one send at a time. Runs until the
/// feed or the manager goes away.
pub(crate) async fn run(mut stream: CommandStream, manager: ManagerHandle) {
    while stream.changed().await.is_ok() {
        let update = stream.borrow_and_update().clone();
        let Some(update) = update else { continue };

        let frame = CommandFrame::from_update(&update);
        match manager.send(frame).await {
            Ok(()) => trace!("frame delivered"),
            Err(SendError::NotConnected) => debug!("no peripheral ready, snapshot dropped"),
            Err(SendError::Transport(e)) => {
                // fire and forget: the next snapshot supersedes this one
                warn!("frame dropped: {e}");
            }
            Err(SendError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_snapshots_suppressed() {
        let (feed, stream) = CommandFeed::channel();
        let mut update = CommandUpdate::new();
        update.insert(0, 42);

        feed.publish(update.clone());
        let first_version = {
            let mut probe = stream.clone();
            probe.borrow_and_update();
            probe
        };
        feed.publish(update.clone());
        assert!(!first_version.has_changed().unwrap());

        update.insert(1, 7);
        feed.publish(update);
        assert!(first_version.has_changed().unwrap());
    }

    #[test]
    fn test_burst_retains_only_latest() {
        let (feed, mut stream) = CommandFeed::channel();
        for value in 0..5 {
            let mut update = CommandUpdate::new();
            update.insert(0, value);
            feed.publish(update);
        }
        let mut expected = CommandUpdate::new();
        expected.insert(0, 4);
        assert_eq!(stream.borrow_and_update().clone(), Some(expected));
    }
}
