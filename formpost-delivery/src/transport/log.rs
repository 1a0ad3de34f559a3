use async_trait::async_trait;
use formpost_common::outgoing;
use formpost_spool::Message;

use super::Transport;
use crate::TransportError;

/// Logs each message at INFO and reports it as sent
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        let recipients = message
            .recipients()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        outgoing!(
            level = INFO,
            "[{}] {} -> {recipients}: {}",
            message.form,
            message.from,
            message.subject
        );

        Ok(())
    }
}
