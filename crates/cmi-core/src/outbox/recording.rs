use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;

use crate::{
    outbox::{OutboundRequest, Outbox},
    Result,
};

/// Outbox that only remembers what it was given.
///
/// Useful wherever delivery should be observed rather than performed.
#[derive(Debug, Default)]
pub struct RecordingOutbox {
    queued: Mutex<Vec<(OutboundRequest, Duration)>>,
}

impl RecordingOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything enqueued so far, with its delay, oldest first.
    pub fn queued(&self) -> Vec<(OutboundRequest, Duration)> {
        self.queued
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.queued().into_iter().map(|(r, _)| r).collect()
    }

    /// Return and forget everything enqueued so far.
    pub fn take(&self) -> Vec<OutboundRequest> {
        self.queued
            .lock()
            .map(|mut q| q.drain(..).map(|(r, _)| r).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Outbox for RecordingOutbox {
    async fn enqueue(&self, request: OutboundRequest, delay: Duration) -> Result<()> {
        if let Ok(mut q) = self.queued.lock() {
            q.push((request, delay));
        }
        Ok(())
    }
}
