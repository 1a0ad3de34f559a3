//! Outbound delivery of spooled messages
//!
//! - `smtp`: relay through an SMTP server using `lettre`
//! - `log`: write messages to the log instead of sending them (development)
//! - `test`: record messages in memory, with scripted failures

pub mod log;
pub mod smtp;
pub mod test;

use std::sync::Arc;

use async_trait::async_trait;
use formpost_spool::Message;
use serde::Deserialize;

pub use self::{
    log::LogTransport,
    smtp::{SmtpConfig, SmtpTransport, TlsMode},
    test::TestTransport,
};
use crate::TransportError;

/// Something that can hand a message to the outside world.
///
/// A transport performs exactly one attempt per call. Retrying is the
/// queue's job, on a later flush.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn send(&self, message: &Message) -> Result<(), TransportError>;
}

/// Transport selection in the configuration file
///
/// ```ron
/// transport: Smtp(
///     host: "smtp.example.com",
///     username: "formpost",
///     password: "secret",
/// ),
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub enum TransportConfig {
    Smtp(SmtpConfig),
    /// Log messages instead of sending them
    #[default]
    Log,
}

impl TransportConfig {
    /// Build the configured transport
    ///
    /// # Errors
    /// If the SMTP relay configuration is invalid (e.g. a bad hostname for TLS)
    pub fn into_transport(self) -> Result<Arc<dyn Transport>, TransportError> {
        Ok(match self {
            Self::Smtp(config) => Arc::new(SmtpTransport::from_config(&config)?),
            Self::Log => Arc::new(LogTransport),
        })
    }
}
