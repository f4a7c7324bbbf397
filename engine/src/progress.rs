//! Progress events for long-running operations.
//!
//! Sinks are optional collaborators: every operation that accepts one must
//! behave identically when `None` is passed.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProgressStage {
    Validation,
    SupersededCleanup,
    IndexOptimization,
    ContentCopy,
    DatabaseBackup,
    DatabaseRestore,
    ExternalTool,
    Finished,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    pub message: String,
    pub current: Option<u64>,
    pub total: Option<u64>,
}

impl ProgressEvent {
    pub fn message(stage: ProgressStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            current: None,
            total: None,
        }
    }

    pub fn counted(
        stage: ProgressStage,
        message: impl Into<String>,
        current: u64,
        total: Option<u64>,
    ) -> Self {
        Self {
            stage,
            message: message.into(),
            current: Some(current),
            total,
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn report(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Forward events into a channel, e.g. for a dashboard task.
pub struct ChannelSink {
    sender: UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(sender: UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressSink for ChannelSink {
    fn report(&self, event: ProgressEvent) {
        if self.sender.send(event).is_err() {
            debug!("Progress receiver dropped; event discarded");
        }
    }
}

/// Emit an event to an optional sink.
pub(crate) fn emit(sink: Option<&dyn ProgressSink>, event: ProgressEvent) {
    if let Some(sink) = sink {
        sink.report(event);
    }
}
