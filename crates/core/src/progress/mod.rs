//! Run progress events and their broadcaster.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Kind of progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    Start,
    Progress,
    Complete,
    Error,
}

impl ProgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressKind::Start => "start",
            ProgressKind::Progress => "progress",
            ProgressKind::Complete => "complete",
            ProgressKind::Error => "error",
        }
    }
}

/// Cumulative counters for the active run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounters {
    pub publications_found: u32,
    pub files_downloaded: u32,
    pub files_pending: u32,
    pub records_extracted: u32,
}

/// A structured progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    pub run_id: String,
    /// Coordinator state the event was emitted in (e.g., "downloading").
    pub phase: String,
    pub message: String,
    pub counters: ProgressCounters,
}

/// Fan-out of progress events to any number of subscribers.
///
/// Sending never blocks the run; subscribers that fall behind skip events.
#[derive(Debug, Clone)]
pub struct ProgressBroadcaster {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit(&self, event: ProgressEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
