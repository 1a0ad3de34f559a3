//! Deferred notification mail for form submissions.
//!
//! Load a [`Formpost`] configuration, [`init`](Formpost::init) it, then
//! call [`Plugin::submit`] for every validated submission and
//! [`Plugin::request_terminated`] once the response has gone out. Messages
//! are spooled during the request and sent by the flush at its end, so
//! submitters never wait on the mail relay.

pub mod config;

use std::sync::Arc;

use formpost_common::{internal, logging};
use formpost_delivery::{
    FlushReport, FlushTrigger, MailQueue, QueueConfig, Transport, TransportConfig, TransportError,
};
use formpost_forms::{
    DebugConfig, FormConfig, FormProcessor, FormsConfig, MappingTable, ProcessError, Submission,
};
use formpost_spool::{MessageId, SpoolConfig, SpoolError, SpooledMessage};
use serde::Deserialize;
use thiserror::Error;
use tracing::error;

pub use formpost_delivery as delivery;
pub use formpost_forms as forms;
pub use formpost_spool as spool;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Unable to initialise spool: {0}")]
    Spool(#[from] SpoolError),

    #[error("Unable to configure transport: {0}")]
    Transport(#[from] TransportError),
}

/// Static configuration, read once at startup
///
/// ```ron
/// Formpost (
///     spool: File(path: "/var/spool/formpost"),
///     transport: Smtp(host: "smtp.example.com"),
///     forms: {
///         "contact": (
///             confirmation: (
///                 from: "Website <site@example.com>",
///                 subject: "Thanks for your message",
///                 body: "Hi {{ name }}, we'll be in touch.",
///             ),
///         ),
///     },
/// )
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Formpost {
    #[serde(default)]
    spool: SpoolConfig,
    #[serde(default)]
    transport: TransportConfig,
    #[serde(default)]
    queue: QueueConfig,
    #[serde(default)]
    debug: DebugConfig,
    #[serde(default)]
    fieldmap: MappingTable,
    #[serde(default)]
    forms: std::collections::HashMap<String, FormConfig>,
}

impl Formpost {
    /// Initialise logging and the spool, and build the configured transport
    ///
    /// # Errors
    /// If the spool directory cannot be prepared or the transport
    /// configuration is invalid
    pub fn init(self) -> Result<Plugin, InitError> {
        let transport = self.transport.clone().into_transport()?;
        self.init_with_transport(transport)
    }

    /// As [`init`](Self::init), delivering through `transport` instead of the
    /// configured one
    ///
    /// # Errors
    /// If the spool directory cannot be prepared
    pub fn init_with_transport(self, transport: Arc<dyn Transport>) -> Result<Plugin, InitError> {
        logging::init();

        if let Some(path) = self.spool.path() {
            internal!(level = INFO, "Using spool at {}", path.display());
        }

        let spool = self.spool.into_backing_store()?;
        let queue = MailQueue::new(spool, transport, &self.queue);
        let processor = FormProcessor::new(
            FormsConfig {
                debug: self.debug,
                fieldmap: self.fieldmap,
                forms: self.forms,
            },
            queue.clone(),
        );

        internal!("Formpost initialised");

        Ok(Plugin { queue, processor })
    }
}

/// The running plugin
#[derive(Debug, Clone)]
pub struct Plugin {
    queue: MailQueue,
    processor: FormProcessor,
}

impl Plugin {
    /// Queue the messages for a validated submission
    ///
    /// In debug mode the queue is flushed straight away. A failure of that
    /// flush is logged; the submission itself has succeeded once its messages
    /// are spooled.
    ///
    /// # Errors
    /// See [`FormProcessor::on_submission`]
    pub async fn submit(&self, submission: &Submission) -> Result<Vec<MessageId>, ProcessError> {
        let ids = self.processor.on_submission(submission).await?;

        if self.processor.is_debug()
            && let Err(e) = self.queue.on_trigger(FlushTrigger::Debug).await
        {
            error!(error = %e, "Debug flush failed");
        }

        Ok(ids)
    }

    /// The host finished handling a request: deliver what it queued
    ///
    /// # Errors
    /// If the spool cannot be listed
    pub async fn request_terminated(&self) -> Result<FlushReport, SpoolError> {
        self.queue.on_trigger(FlushTrigger::RequestTerminated).await
    }

    /// Flush on behalf of `trigger`
    ///
    /// # Errors
    /// If the spool cannot be listed
    pub async fn flush(&self, trigger: FlushTrigger) -> Result<FlushReport, SpoolError> {
        self.queue.on_trigger(trigger).await
    }

    /// Messages waiting for delivery, oldest first
    ///
    /// # Errors
    /// If the spool cannot be listed
    pub async fn pending(&self) -> Result<Vec<SpooledMessage>, SpoolError> {
        self.queue.pending().await
    }

    #[must_use]
    pub const fn queue(&self) -> &MailQueue {
        &self.queue
    }
}
