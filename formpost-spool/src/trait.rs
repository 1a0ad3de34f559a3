use async_trait::async_trait;

use crate::{Result, message::Message, message::SpooledMessage, types::MessageId};

/// Storage for messages waiting to be delivered.
///
/// Every mutating operation is atomic for a single message and durable once
/// it returns. No operation locks the whole store for longer than one
/// message's bookkeeping, so request handling can keep appending while a
/// flush is running.
///
/// Delivery is a claim/settle cycle: [`claim`](Self::claim) hands one flush
/// exclusive ownership of a message, then either [`remove`](Self::remove)
/// (delivered) or [`mark_failed`](Self::mark_failed) (returned to pending
/// with its attempt count bumped) settles it.
#[async_trait]
pub trait BackingStore: Send + Sync + std::fmt::Debug {
    /// Persist a message and return its newly assigned ID
    ///
    /// # Errors
    /// [`SpoolError::Write`](crate::SpoolError::Write) if the storage is
    /// unavailable or full
    async fn append(&self, message: Message) -> Result<MessageId>;

    /// Snapshot of every unclaimed message, oldest first
    async fn list_pending(&self) -> Result<Vec<SpooledMessage>>;

    /// Take exclusive ownership of a pending message
    ///
    /// Returns `Ok(None)` if the message is already claimed by someone else,
    /// or no longer exists.
    async fn claim(&self, id: &MessageId) -> Result<Option<SpooledMessage>>;

    /// Return a claimed message to pending without recording an attempt
    async fn release(&self, id: &MessageId) -> Result<()>;

    /// Record a failed attempt and return the message to pending
    async fn mark_failed(&self, id: &MessageId, error: &str) -> Result<()>;

    /// Delete a message after delivery
    ///
    /// A message that is already gone is not an error: a concurrent flush may
    /// have removed it first.
    async fn remove(&self, id: &MessageId) -> Result<()>;
}
