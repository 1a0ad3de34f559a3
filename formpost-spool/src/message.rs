use std::{path::PathBuf, sync::Arc};

use formpost_common::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::MessageId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("at least one recipient required")]
    NoRecipients,

    #[error("from address required")]
    NoSender,

    #[error("subject required")]
    NoSubject,

    #[error("body required (text or html)")]
    NoBody,
}

/// The rendered body of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Body {
    /// Plain text only.
    Text(String),
    /// HTML only.
    Html(String),
    /// Both plain text and HTML (multipart/alternative).
    Multipart { text: String, html: String },
}

/// A file attached by reference
///
/// The content stays where the upload manager stored it and is only read
/// when the message is handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub path: PathBuf,
    /// Name presented to the recipient
    pub filename: String,
    pub content_type: Option<String>,
}

impl Attachment {
    /// Attach the file at `path`, naming it after the last path component
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map_or_else(|| "attachment".to_string(), |f| f.to_string_lossy().into_owned());

        Self {
            path,
            filename,
            content_type: None,
        }
    }
}

/// The content of an outgoing message.
///
/// Once spooled this never changes; delivery bookkeeping lives in
/// [`SpooledMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Name of the form whose submission produced this message
    pub form: String,
    pub from: Address,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub reply_to: Option<Address>,
    pub subject: String,
    pub body: Body,
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Create a new message builder.
    #[must_use]
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Every envelope recipient: to, cc and bcc
    pub fn recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(&self.cc).chain(&self.bcc)
    }
}

/// A message as it sits in the spool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpooledMessage {
    pub id: MessageId,
    pub message: Arc<Message>,
    /// Milliseconds since the Unix epoch at enqueue time
    pub queued_at: u64,
    /// Number of failed delivery attempts so far
    pub attempts: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<u64>,
}

impl SpooledMessage {
    #[must_use]
    pub fn new(id: MessageId, message: Message) -> Self {
        Self {
            queued_at: id.timestamp_ms(),
            id,
            message: Arc::new(message),
            attempts: 0,
            last_error: None,
            last_attempt_at: None,
        }
    }

    /// Record a failed delivery attempt
    pub fn record_failure(&mut self, error: &str) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error.to_string());
        self.last_attempt_at = Some(now_ms());
    }
}

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Builder for constructing [`Message`] instances.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    form: String,
    from: Option<Address>,
    to: Vec<Address>,
    cc: Vec<Address>,
    bcc: Vec<Address>,
    reply_to: Option<Address>,
    subject: Option<String>,
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<Attachment>,
}

impl MessageBuilder {
    #[must_use]
    pub fn form(mut self, form: impl Into<String>) -> Self {
        self.form = form.into();
        self
    }

    /// Set the sender address (required).
    #[must_use]
    pub fn from(mut self, address: Address) -> Self {
        self.from = Some(address);
        self
    }

    /// Add a primary recipient.
    #[must_use]
    pub fn to(mut self, address: Address) -> Self {
        self.to.push(address);
        self
    }

    /// Add multiple primary recipients.
    #[must_use]
    pub fn to_many(mut self, addresses: impl IntoIterator<Item = Address>) -> Self {
        self.to.extend(addresses);
        self
    }

    #[must_use]
    pub fn cc_many(mut self, addresses: impl IntoIterator<Item = Address>) -> Self {
        self.cc.extend(addresses);
        self
    }

    #[must_use]
    pub fn bcc_many(mut self, addresses: impl IntoIterator<Item = Address>) -> Self {
        self.bcc.extend(addresses);
        self
    }

    #[must_use]
    pub fn reply_to(mut self, address: Option<Address>) -> Self {
        self.reply_to = address;
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set plain text body content.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set HTML body content.
    #[must_use]
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    #[must_use]
    pub fn attachments(mut self, attachments: impl IntoIterator<Item = Attachment>) -> Self {
        self.attachments.extend(attachments);
        self
    }

    /// Build the message, validating required fields.
    pub fn build(self) -> Result<Message, BuildError> {
        if self.to.is_empty() {
            return Err(BuildError::NoRecipients);
        }

        let from = self.from.ok_or(BuildError::NoSender)?;
        let subject = self.subject.ok_or(BuildError::NoSubject)?;

        let body = match (self.text, self.html) {
            (Some(text), Some(html)) => Body::Multipart { text, html },
            (Some(text), None) => Body::Text(text),
            (None, Some(html)) => Body::Html(html),
            (None, None) => return Err(BuildError::NoBody),
        };

        Ok(Message {
            form: self.form,
            from,
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            reply_to: self.reply_to,
            subject,
            body,
            attachments: self.attachments,
        })
    }
}
