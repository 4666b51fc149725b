//! Pipeline progress events.

use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEventKind {
    Started,
    StepStarted,
    StepSucceeded,
    StepFailed,
    /// The run ended. `failed` is set when a step failure aborted it.
    Finished {
        failed: bool,
    },
    Cancelled,
}

/// One transition of a sync run, broadcast to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub kind: SyncEventKind,
    pub step: Option<String>,
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

impl SyncEvent {
    pub(crate) fn new(kind: SyncEventKind, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            step: None,
            message: None,
            at,
        }
    }

    pub(crate) fn with_step(mut self, step: &str) -> Self {
        self.step = Some(step.to_string());
        self
    }

    pub(crate) fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            SyncEventKind::Started => "started",
            SyncEventKind::StepStarted => "step started",
            SyncEventKind::StepSucceeded => "step succeeded",
            SyncEventKind::StepFailed => "step failed",
            SyncEventKind::Finished { failed: false } => "finished",
            SyncEventKind::Finished { failed: true } => "finished with errors",
            SyncEventKind::Cancelled => "cancelled",
        };
        write!(f, "{}", label)?;
        if let Some(step) = &self.step {
            write!(f, " [{}]", step)?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let event = SyncEvent::new(SyncEventKind::StepFailed, Utc::now())
            .with_step("pull_operations")
            .with_message("disk full");
        assert_eq!(event.to_string(), "step failed [pull_operations]: disk full");

        let event = SyncEvent::new(SyncEventKind::Finished { failed: true }, Utc::now());
        assert_eq!(event.to_string(), "finished with errors");
    }
}
