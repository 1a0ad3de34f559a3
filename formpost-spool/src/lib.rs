//! Durable storage for outgoing form notification messages.
//!
//! Messages are appended while a request is being handled and delivered
//! later by a flush. See [`BackingStore`] for the claim/settle cycle that
//! keeps overlapping flushes from delivering a message twice.

pub mod backends;
pub mod config;
pub mod error;
pub mod message;
pub mod r#trait;
pub mod types;

pub use backends::{FileBackingStore, FileBackingStoreBuilder, MemoryBackingStore, TestBackingStore};
pub use config::{MemoryConfig, SpoolConfig};
pub use error::{Result, SerializationError, SpoolError, ValidationError};
pub use message::{Attachment, Body, BuildError, Message, MessageBuilder, SpooledMessage};
pub use r#trait::BackingStore;
pub use types::MessageId;
