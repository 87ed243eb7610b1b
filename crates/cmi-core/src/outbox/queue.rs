use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{sync::mpsc, time::sleep};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use crate::{
    errors::Error,
    outbox::{DeliveryError, DeliveryPort, OutboundRequest, Outbox},
    Result,
};

/// A queued request in its serialised form.
#[derive(Clone, Debug)]
pub struct OutboxTask {
    pub payload: String,
    pub delay: Duration,
}

/// Create a connected outbox handle and the receiving end for [`OutboxWorker`].
pub fn outbox_channel() -> (QueueOutbox, mpsc::UnboundedReceiver<OutboxTask>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueOutbox { tx }, rx)
}

/// Outbox backed by an in-process queue.
#[derive(Clone, Debug)]
pub struct QueueOutbox {
    tx: mpsc::UnboundedSender<OutboxTask>,
}

#[async_trait]
impl Outbox for QueueOutbox {
    async fn enqueue(&self, request: OutboundRequest, delay: Duration) -> Result<()> {
        let method = request.method();
        let payload = serde_json::to_string(&request)?;
        debug!(method, %payload, ?delay, "outbox payload");

        self.tx
            .send(OutboxTask { payload, delay })
            .map_err(|_| Error::Outbox("outbox queue is closed".to_string()))?;
        info!(method, "request queued");
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts for a request that keeps failing (at least one).
    pub max_attempts: u32,
    /// Wait after the n-th failed attempt is `base_delay * n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Drains the outbox queue into a [`DeliveryPort`].
///
/// Each task is delivered on its own tokio task once its delay has passed, so
/// a slow or retried delivery never holds up the rest of the queue.
pub struct OutboxWorker {
    rx: mpsc::UnboundedReceiver<OutboxTask>,
    delivery: Arc<dyn DeliveryPort>,
    policy: RetryPolicy,
    tracker: TaskTracker,
}

impl OutboxWorker {
    pub fn new(
        rx: mpsc::UnboundedReceiver<OutboxTask>,
        delivery: Arc<dyn DeliveryPort>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            rx,
            delivery,
            policy,
            tracker: TaskTracker::new(),
        }
    }

    /// Run until `cancel` fires or every outbox handle is dropped, then finish
    /// whatever was already queued.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("outbox worker started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                task = self.rx.recv() => match task {
                    Some(task) => self.spawn(task),
                    None => break,
                },
            }
        }

        self.rx.close();
        while let Ok(task) = self.rx.try_recv() {
            self.spawn(task);
        }

        self.tracker.close();
        info!(pending = self.tracker.len(), "outbox worker draining");
        self.tracker.wait().await;
        info!("outbox worker stopped");
    }

    fn spawn(&self, task: OutboxTask) {
        let delivery = self.delivery.clone();
        let policy = self.policy;
        self.tracker.spawn(async move {
            process(task, delivery, policy).await;
        });
    }
}

async fn process(task: OutboxTask, delivery: Arc<dyn DeliveryPort>, policy: RetryPolicy) {
    if !task.delay.is_zero() {
        sleep(task.delay).await;
    }

    let request: OutboundRequest = match serde_json::from_str(&task.payload) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, payload = %task.payload, "dropping undecodable outbox payload");
            return;
        }
    };
    let method = request.method();

    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match delivery.deliver(request.clone()).await {
            Ok(()) => {
                info!(method, attempt, "request delivered");
                return;
            }
            Err(DeliveryError::Benign(msg)) => {
                info!(method, reason = %msg, "delivery skipped");
                return;
            }
            Err(DeliveryError::Failed(msg)) if attempt < max_attempts => {
                warn!(method, attempt, reason = %msg, "delivery failed, retrying");
                sleep(policy.delay_after(attempt)).await;
            }
            Err(DeliveryError::Failed(msg)) => {
                error!(method, attempt, reason = %msg, "delivery failed, giving up");
            }
        }
    }
}
