use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use formpost_spool::Message;
use parking_lot::Mutex;

use super::Transport;
use crate::TransportError;

/// Testing transport that records what it was asked to send
///
/// Failures are scripted: each call to [`fail_next`](Self::fail_next) queues
/// one error, consumed by the next attempt. A delay makes every attempt
/// sleep first, for exercising the send timeout.
#[derive(Debug, Clone, Default)]
pub struct TestTransport {
    sent: Arc<Mutex<Vec<Message>>>,
    failures: Arc<Mutex<VecDeque<TransportError>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    attempts: Arc<AtomicUsize>,
}

impl TestTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next attempt with `error`
    pub fn fail_next(&self, error: TransportError) {
        self.failures.lock().push_back(error);
    }

    /// Sleep for `delay` before every attempt
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Messages successfully sent, in send order
    #[must_use]
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    /// Number of attempts, successful or not
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for TestTransport {
    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }

        self.sent.lock().push(message.clone());
        Ok(())
    }
}
