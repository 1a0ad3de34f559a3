//! The deferred mail queue
//!
//! Submissions enqueue messages while the request is being handled; a flush
//! later drains the spool through the transport. A flush claims each message
//! before sending it, so any number of flushes (in this process or another
//! one sharing the spool directory) can overlap without sending a message
//! twice.

use std::{fmt, sync::Arc, time::Duration};

use formpost_common::internal;
use formpost_spool::{BackingStore, Message, MessageId, SpooledMessage};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::{FlushTrigger, TransportError, transport::Transport};

const fn default_send_timeout() -> u64 {
    30
}

/// Queue behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Upper bound on a single send attempt (in seconds)
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            send_timeout_secs: default_send_timeout(),
        }
    }
}

/// Outcome of one flush
#[derive(Debug, Default, Serialize)]
pub struct FlushReport {
    /// Messages delivered and removed from the spool
    pub sent: usize,
    /// Messages whose attempt failed; they remain pending
    pub failed: usize,
    /// Messages another flush claimed first
    pub skipped: usize,
    #[serde(serialize_with = "serialize_errors")]
    pub errors: Vec<(MessageId, TransportError)>,
}

#[derive(Serialize)]
struct ErrorEntry {
    error: String,
    transient: bool,
}

fn serialize_errors<S>(errors: &[(MessageId, TransportError)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_map(errors.iter().map(|(id, e)| {
        (
            id.to_string(),
            ErrorEntry {
                error: e.to_string(),
                transient: e.is_transient(),
            },
        )
    }))
}

impl FlushReport {
    /// `true` when no delivery attempt failed
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for FlushReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent: {}, failed: {}, skipped: {}",
            self.sent, self.failed, self.skipped
        )
    }
}

/// Deferred delivery of spooled messages
#[derive(Debug, Clone)]
pub struct MailQueue {
    spool: Arc<dyn BackingStore>,
    transport: Arc<dyn Transport>,
    send_timeout: Duration,
}

impl MailQueue {
    #[must_use]
    pub fn new(
        spool: Arc<dyn BackingStore>,
        transport: Arc<dyn Transport>,
        config: &QueueConfig,
    ) -> Self {
        Self {
            spool,
            transport,
            send_timeout: Duration::from_secs(config.send_timeout_secs),
        }
    }

    /// Persist a message for delivery on a later flush
    ///
    /// # Errors
    /// [`SpoolError::Write`](formpost_spool::SpoolError::Write) if the spool
    /// could not store the message. Nothing was queued in that case.
    pub async fn enqueue(&self, message: Message) -> formpost_spool::Result<MessageId> {
        let id = self.spool.append(message).await?;
        debug!(message_id = %id, "Queued message");
        Ok(id)
    }

    /// Messages waiting for delivery, oldest first
    ///
    /// # Errors
    /// If the spool cannot be listed
    pub async fn pending(&self) -> formpost_spool::Result<Vec<SpooledMessage>> {
        self.spool.list_pending().await
    }

    /// Run a flush on behalf of `trigger`
    ///
    /// # Errors
    /// See [`flush`](Self::flush)
    pub async fn on_trigger(&self, trigger: FlushTrigger) -> formpost_spool::Result<FlushReport> {
        internal!(level = INFO, "Flush triggered by {trigger}");
        self.flush().await
    }

    /// Attempt delivery of every pending message, oldest first
    ///
    /// Delivery failures are recorded on the message and counted in the
    /// report; they are never retried within the same flush.
    ///
    /// # Errors
    /// Only if the spool cannot be listed. Errors settling an individual
    /// message are logged and the flush carries on.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn flush(&self) -> formpost_spool::Result<FlushReport> {
        let pending = self.spool.list_pending().await?;
        let mut report = FlushReport::default();

        internal!("Flushing {} pending messages", pending.len());

        for candidate in pending {
            let id = candidate.id;

            let spooled = match self.spool.claim(&id).await {
                Ok(Some(spooled)) => spooled,
                Ok(None) => {
                    debug!(message_id = %id, "Message claimed elsewhere, skipping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(message_id = %id, error = %e, "Unable to claim message");
                    report.skipped += 1;
                    continue;
                }
            };

            let guard = ClaimGuard::new(&self.spool, &id);

            match self.send(&spooled).await {
                Ok(()) => {
                    report.sent += 1;
                    // Delivered: releasing now would send it again
                    guard.settle();
                    if let Err(e) = self.spool.remove(&id).await {
                        error!(message_id = %id, error = %e, "Delivered message could not be removed");
                    }
                }
                Err(reason) => {
                    report.failed += 1;
                    warn!(
                        message_id = %id,
                        attempts = spooled.attempts.saturating_add(1),
                        error = %reason,
                        transient = reason.is_transient(),
                        "Delivery failed, message stays queued"
                    );
                    match self.spool.mark_failed(&id, &reason.to_string()).await {
                        Ok(()) => guard.settle(),
                        Err(e) => {
                            error!(message_id = %id, error = %e, "Unable to record failed delivery");
                        }
                    }
                    report.errors.push((id, reason));
                }
            }
        }

        internal!(level = INFO, "Flush complete: {report}");

        Ok(report)
    }

    async fn send(&self, spooled: &SpooledMessage) -> Result<(), TransportError> {
        tokio::time::timeout(self.send_timeout, self.transport.send(&spooled.message))
            .await
            .unwrap_or(Err(TransportError::Timeout(self.send_timeout)))
    }
}

/// Returns a claimed message to pending unless it was settled
///
/// A flush future can be dropped at any await point, e.g. when the host
/// aborts the task that runs it. Without this the claim would outlive the
/// flush and the message would sit unlisted until the next stale-claim
/// recovery.
struct ClaimGuard {
    spool: Arc<dyn BackingStore>,
    id: Option<MessageId>,
}

impl ClaimGuard {
    fn new(spool: &Arc<dyn BackingStore>, id: &MessageId) -> Self {
        Self {
            spool: Arc::clone(spool),
            id: Some(id.clone()),
        }
    }

    fn settle(mut self) {
        self.id = None;
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(message_id = %id, "No runtime to release an abandoned claim on");
            return;
        };

        warn!(message_id = %id, "Flush abandoned before delivery settled, releasing claim");
        let spool = Arc::clone(&self.spool);
        runtime.spawn(async move {
            if let Err(e) = spool.release(&id).await {
                error!(message_id = %id, error = %e, "Unable to release abandoned claim");
            }
        });
    }
}
