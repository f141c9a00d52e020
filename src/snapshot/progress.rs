//! Progress delivery from a running snapshot job to whoever watches it.

use std::sync::mpsc::Sender;
use tracing::{debug, info, warn};

/// One entry of the ordered progress stream of a job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    Message(String),
    /// Terminal, emitted exactly once per job.
    Outcome(bool),
}

pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, message: &str);

    fn on_outcome(&self, success: bool);
}

/// Forwards every event to a channel, typically drained by a front end on
/// another thread. A dropped receiver is not an error for the job.
pub struct ChannelSink {
    tx: Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, message: &str) {
        debug!("{message}");
        if self.tx.send(ProgressEvent::Message(message.to_owned())).is_err() {
            warn!("Progress receiver is gone, dropping message");
        }
    }

    fn on_outcome(&self, success: bool) {
        if self.tx.send(ProgressEvent::Outcome(success)).is_err() {
            warn!("Progress receiver is gone, dropping outcome {success}");
        }
    }
}

/// Sink for headless runs: progress only goes to the log.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn on_progress(&self, message: &str) {
        info!("{message}");
    }

    fn on_outcome(&self, success: bool) {
        if success {
            info!("Snapshot job succeeded");
        } else {
            warn!("Snapshot job failed");
        }
    }
}
