use std::{fmt, time::Duration};

use async_trait::async_trait;
use formpost_common::{Address, outgoing};
use formpost_spool::{Attachment, Body, Message};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::{self, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use serde::Deserialize;
use tracing::debug;

use super::Transport;
use crate::TransportError;

const fn default_port() -> u16 {
    587
}

const fn default_timeout() -> u64 {
    10
}

/// How the connection to the relay is secured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum TlsMode {
    /// Plain connection upgraded with STARTTLS (required)
    #[default]
    Starttls,
    /// TLS from the first byte (usually port 465)
    Tls,
    /// No encryption at all; only for relays on localhost or in tests
    Plaintext,
}

/// Relay settings for [`SmtpTransport`]
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub tls: TlsMode,

    /// Connection and command timeout (in seconds)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Sends messages through an SMTP relay
#[derive(Clone)]
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    relay: String,
    timeout: Duration,
}

impl fmt::Debug for SmtpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpTransport")
            .field("relay", &self.relay)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SmtpTransport {
    /// Create a transport from relay configuration
    ///
    /// No connection is made until the first message is sent.
    ///
    /// # Errors
    /// If TLS parameters cannot be built for `host`
    pub fn from_config(config: &SmtpConfig) -> Result<Self, TransportError> {
        let invalid = |e: lettre::transport::smtp::Error| {
            TransportError::ConnectionFailed(format!("Invalid relay {}: {e}", config.host))
        };

        let mut builder = match config.tls {
            TlsMode::Plaintext => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host).map_err(invalid)?,
            TlsMode::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host).map_err(invalid)?
            }
        };

        let timeout = Duration::from_secs(config.timeout_secs);
        builder = builder.port(config.port).timeout(Some(timeout));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            relay: format!("{}:{}", config.host, config.port),
            timeout,
        })
    }

    /// Convert a spooled message into a MIME message
    ///
    /// Attachments are read from disk here, at send time.
    async fn build_message(message: &Message) -> Result<message::Message, TransportError> {
        let mut builder = message::Message::builder()
            .from(mailbox(&message.from)?)
            .subject(message.subject.as_str());

        for to in &message.to {
            builder = builder.to(mailbox(to)?);
        }

        for cc in &message.cc {
            builder = builder.cc(mailbox(cc)?);
        }

        for bcc in &message.bcc {
            builder = builder.bcc(mailbox(bcc)?);
        }

        if let Some(reply_to) = &message.reply_to {
            builder = builder.reply_to(mailbox(reply_to)?);
        }

        let built = if message.attachments.is_empty() {
            match &message.body {
                Body::Text(text) => builder.singlepart(SinglePart::plain(text.clone())),
                Body::Html(html) => builder.singlepart(SinglePart::html(html.clone())),
                Body::Multipart { text, html } => builder.multipart(
                    MultiPart::alternative_plain_html(text.clone(), html.clone()),
                ),
            }
        } else {
            let mut mixed = match &message.body {
                Body::Text(text) => MultiPart::mixed().singlepart(SinglePart::plain(text.clone())),
                Body::Html(html) => MultiPart::mixed().singlepart(SinglePart::html(html.clone())),
                Body::Multipart { text, html } => MultiPart::mixed().multipart(
                    MultiPart::alternative_plain_html(text.clone(), html.clone()),
                ),
            };

            for attachment in &message.attachments {
                mixed = mixed.singlepart(read_attachment(attachment).await?);
            }

            builder.multipart(mixed)
        };

        built.map_err(|e| TransportError::InvalidMessage(e.to_string()))
    }
}

fn mailbox(address: &Address) -> Result<Mailbox, TransportError> {
    let email = address
        .addr
        .parse::<lettre::Address>()
        .map_err(|e| TransportError::InvalidMessage(format!("{address}: {e}")))?;

    Ok(Mailbox::new(address.display_name.clone(), email))
}

async fn read_attachment(attachment: &Attachment) -> Result<SinglePart, TransportError> {
    let content = tokio::fs::read(&attachment.path).await.map_err(|e| {
        TransportError::InvalidMessage(format!(
            "Unable to read attachment {}: {e}",
            attachment.path.display()
        ))
    })?;

    let content_type = ContentType::parse(
        attachment
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream"),
    )
    .map_err(|e| TransportError::InvalidMessage(format!("{}: {e}", attachment.filename)))?;

    Ok(message::Attachment::new(attachment.filename.clone()).body(content, content_type))
}

#[async_trait]
impl Transport for SmtpTransport {
    #[tracing::instrument(level = "debug", skip_all, fields(relay = %self.relay, form = %message.form))]
    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        let email = Self::build_message(message).await?;

        outgoing!("Relaying message via {}", self.relay);

        match self.transport.send(email).await {
            Ok(response) => {
                debug!("Relay accepted message: {:?}", response.code());
                Ok(())
            }
            Err(e) if e.is_timeout() => Err(TransportError::Timeout(self.timeout)),
            Err(e) if e.is_permanent() || e.is_transient() => {
                Err(TransportError::Rejected(e.to_string()))
            }
            Err(e) => Err(TransportError::ConnectionFailed(e.to_string())),
        }
    }
}
