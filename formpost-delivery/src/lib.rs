//! Deferred delivery for formpost.
//!
//! [`MailQueue`] drains the spool through a [`Transport`] whenever a
//! [`FlushTrigger`] fires.

pub mod error;
pub mod queue;
pub mod transport;
pub mod trigger;

pub use error::TransportError;
pub use queue::{FlushReport, MailQueue, QueueConfig};
pub use transport::{
    LogTransport, SmtpConfig, SmtpTransport, TestTransport, TlsMode, Transport, TransportConfig,
};
pub use trigger::FlushTrigger;
