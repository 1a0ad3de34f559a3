use std::{
    collections::BTreeMap,
    io,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use tracing::warn;

use crate::{
    SpoolError,
    message::{Message, SpooledMessage},
    r#trait::BackingStore,
    types::MessageId,
};

#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub(crate) message: SpooledMessage,
    pub(crate) claimed: bool,
}

/// In-memory backing store implementation
///
/// Messages live in a `BTreeMap` keyed by their (monotonic) ID behind an
/// `RwLock`, so iteration order is enqueue order. Intended for tests and
/// development; nothing survives a restart.
///
/// # Capacity Management
/// The store can be configured with a maximum capacity. When capacity is
/// reached, `append` fails with [`SpoolError::Write`], the same error a full
/// disk produces for the file store.
///
/// # Concurrency
/// Claims are taken under the write lock, so two flushes sharing one store
/// can never both own the same message.
#[derive(Debug, Clone)]
pub struct MemoryBackingStore {
    pub(crate) messages: Arc<RwLock<BTreeMap<MessageId, Slot>>>,
    /// Maximum number of messages to store (None = unlimited)
    capacity: Option<usize>,
}

impl MemoryBackingStore {
    /// Create a new empty memory-backed store with unlimited capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: Arc::new(RwLock::new(BTreeMap::new())),
            capacity: None,
        }
    }

    /// Create a new memory-backed store with a capacity limit
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Arc::new(RwLock::new(BTreeMap::new())),
            capacity: Some(capacity),
        }
    }

    /// Get the current number of messages in the store, claimed or not
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the configured capacity (None = unlimited)
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl Default for MemoryBackingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackingStore for MemoryBackingStore {
    async fn append(&self, message: Message) -> crate::Result<MessageId> {
        let id = MessageId::generate();
        let mut messages = self.messages.write()?;

        if let Some(cap) = self.capacity
            && messages.len() >= cap
        {
            return Err(SpoolError::Write(io::Error::new(
                io::ErrorKind::StorageFull,
                format!("Memory spool capacity exceeded: {}/{cap} messages", messages.len()),
            )));
        }

        messages.insert(
            id.clone(),
            Slot {
                message: SpooledMessage::new(id.clone(), message),
                claimed: false,
            },
        );

        Ok(id)
    }

    async fn list_pending(&self) -> crate::Result<Vec<SpooledMessage>> {
        Ok(self
            .messages
            .read()?
            .values()
            .filter(|slot| !slot.claimed)
            .map(|slot| slot.message.clone())
            .collect())
    }

    async fn claim(&self, id: &MessageId) -> crate::Result<Option<SpooledMessage>> {
        let mut messages = self.messages.write()?;

        Ok(messages.get_mut(id).and_then(|slot| {
            if slot.claimed {
                None
            } else {
                slot.claimed = true;
                Some(slot.message.clone())
            }
        }))
    }

    async fn release(&self, id: &MessageId) -> crate::Result<()> {
        match self.messages.write()?.get_mut(id) {
            Some(slot) => slot.claimed = false,
            None => warn!(message_id = %id, "Release of a message that is not spooled"),
        }

        Ok(())
    }

    async fn mark_failed(&self, id: &MessageId, error: &str) -> crate::Result<()> {
        let mut messages = self.messages.write()?;
        let slot = messages
            .get_mut(id)
            .ok_or_else(|| SpoolError::NotFound(id.clone()))?;

        slot.message.record_failure(error);
        slot.claimed = false;

        Ok(())
    }

    async fn remove(&self, id: &MessageId) -> crate::Result<()> {
        if self.messages.write()?.remove(id).is_none() {
            warn!(message_id = %id, "Message already removed from spool");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use formpost_common::Address;

    use super::*;

    fn create_test_message(subject: &str) -> Message {
        Message::builder()
            .form("contact")
            .from(Address::parse("site@example.com").expect("valid"))
            .to(Address::parse("admin@example.com").expect("valid"))
            .subject(subject)
            .text("test message")
            .build()
            .expect("complete message")
    }

    #[tokio::test]
    async fn test_memory_store_basic_operations() {
        let store = MemoryBackingStore::new();

        let id = store
            .append(create_test_message("one"))
            .await
            .expect("Failed to append");

        let pending = store.list_pending().await.expect("Failed to list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].attempts, 0);

        let claimed = store.claim(&id).await.expect("Failed to claim");
        assert!(claimed.is_some());
        assert!(store.list_pending().await.expect("Failed to list").is_empty());

        store.remove(&id).await.expect("Failed to remove");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = MemoryBackingStore::new();
        let id = store
            .append(create_test_message("one"))
            .await
            .expect("Failed to append");

        assert!(store.claim(&id).await.expect("claim").is_some());
        assert!(store.claim(&id).await.expect("claim").is_none());

        store.release(&id).await.expect("release");
        assert!(store.claim(&id).await.expect("claim").is_some());
    }

    #[tokio::test]
    async fn test_mark_failed_returns_message_to_pending() {
        let store = MemoryBackingStore::new();
        let id = store
            .append(create_test_message("one"))
            .await
            .expect("Failed to append");

        store.claim(&id).await.expect("claim");
        store
            .mark_failed(&id, "connection refused")
            .await
            .expect("mark failed");

        let pending = store.list_pending().await.expect("Failed to list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_remove_missing_is_silent() {
        let store = MemoryBackingStore::new();
        assert!(store.remove(&MessageId::generate()).await.is_ok());
        assert!(
            store
                .mark_failed(&MessageId::generate(), "boom")
                .await
                .is_err_and(|e| e.is_not_found())
        );
    }

    #[tokio::test]
    async fn test_memory_store_capacity_limit() {
        let store = MemoryBackingStore::with_capacity(2);

        store
            .append(create_test_message("1"))
            .await
            .expect("First append should succeed");
        store
            .append(create_test_message("2"))
            .await
            .expect("Second append should succeed");

        let result = store.append(create_test_message("3")).await;
        assert!(matches!(result, Err(SpoolError::Write(_))));

        // After removing one, we should be able to append again
        let pending = store.list_pending().await.expect("Failed to list");
        store.remove(&pending[0].id).await.expect("Failed to remove");

        assert!(store.append(create_test_message("3")).await.is_ok());
    }

    #[tokio::test]
    async fn test_message_ordering() {
        let store = MemoryBackingStore::new();

        let mut appended = Vec::new();
        for i in 0..10 {
            let id = store
                .append(create_test_message(&format!("message {i}")))
                .await
                .expect("Failed to append");
            appended.push(id);
        }

        let listed: Vec<_> = store
            .list_pending()
            .await
            .expect("Failed to list")
            .into_iter()
            .map(|m| m.id)
            .collect();

        assert_eq!(appended, listed, "Pending messages should be in enqueue order");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_appends_get_unique_ids() {
        let store = MemoryBackingStore::new();

        let mut handles = vec![];
        for i in 0..100 {
            let store_clone = store.clone();
            handles.push(tokio::spawn(async move {
                store_clone
                    .append(create_test_message(&format!("message {i}")))
                    .await
            }));
        }

        for handle in handles {
            handle.await.expect("Task panicked").expect("Append failed");
        }

        let ids: std::collections::HashSet<_> = store
            .list_pending()
            .await
            .expect("Failed to list")
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_capacity_methods() {
        assert_eq!(MemoryBackingStore::new().capacity(), None);
        assert_eq!(MemoryBackingStore::with_capacity(100).capacity(), Some(100));
    }
}
