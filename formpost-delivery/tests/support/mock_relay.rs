//! Minimal SMTP relay for exercising `SmtpTransport`
//!
//! Speaks just enough plaintext SMTP for `lettre`: EHLO, MAIL, RCPT, DATA,
//! RSET, NOOP and QUIT. Responses to RCPT and to the end of DATA can be
//! overridden to inject rejections, and every received message body is
//! recorded for inspection.
#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::Mutex,
};

#[derive(Debug, Clone)]
struct Reply {
    code: u16,
    message: String,
}

impl Reply {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn line(&self) -> String {
        format!("{} {}\r\n", self.code, self.message)
    }
}

#[derive(Debug, Clone)]
struct RelayConfig {
    rcpt_to: Reply,
    data_end: Reply,
    response_delay: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            rcpt_to: Reply::new(250, "OK"),
            data_end: Reply::new(250, "OK: queued"),
            response_delay: None,
        }
    }
}

/// A relay listening on an ephemeral localhost port
pub struct MockRelay {
    addr: SocketAddr,
    recipients: Arc<Mutex<Vec<String>>>,
    messages: Arc<Mutex<Vec<String>>>,
}

impl MockRelay {
    #[must_use]
    pub fn builder() -> MockRelayBuilder {
        MockRelayBuilder::default()
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Raw `RCPT TO` arguments, in order received
    pub async fn recipients(&self) -> Vec<String> {
        self.recipients.lock().await.clone()
    }

    /// Message content received after each accepted DATA
    pub async fn messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }

    async fn handle_client(
        stream: TcpStream,
        config: Arc<RelayConfig>,
        recipients: Arc<Mutex<Vec<String>>>,
        messages: Arc<Mutex<Vec<String>>>,
    ) -> std::io::Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        writer.write_all(b"220 mock relay ready\r\n").await?;

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }

            if let Some(delay) = config.response_delay {
                tokio::time::sleep(delay).await;
            }

            let command = line.trim_end();
            let verb = command
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_uppercase();

            let reply = match verb.as_str() {
                "EHLO" => "250-mock.relay\r\n250 8BITMIME\r\n".to_string(),
                "HELO" | "MAIL" | "RSET" | "NOOP" => Reply::new(250, "OK").line(),
                "RCPT" => {
                    recipients
                        .lock()
                        .await
                        .push(command["RCPT TO:".len().min(command.len())..].to_string());
                    config.rcpt_to.line()
                }
                "DATA" => {
                    writer
                        .write_all(Reply::new(354, "End data with <CR><LF>.<CR><LF>").line().as_bytes())
                        .await?;

                    let mut content = String::new();
                    loop {
                        line.clear();
                        if reader.read_line(&mut line).await? == 0 {
                            return Ok(());
                        }
                        if line.trim_end() == "." {
                            break;
                        }
                        content.push_str(&line);
                    }

                    if config.data_end.code < 400 {
                        messages.lock().await.push(content);
                    }
                    config.data_end.line()
                }
                "QUIT" => {
                    writer.write_all(Reply::new(221, "Bye").line().as_bytes()).await?;
                    return Ok(());
                }
                _ => Reply::new(500, "Unknown command").line(),
            };

            writer.write_all(reply.as_bytes()).await?;
        }
    }
}

#[derive(Debug, Default)]
pub struct MockRelayBuilder {
    config: RelayConfig,
}

impl MockRelayBuilder {
    /// Reply to every `RCPT TO`
    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to = Reply::new(code, message);
        self
    }

    /// Reply after the message content
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end = Reply::new(code, message);
        self
    }

    /// Delay before each reply
    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.config.response_delay = Some(delay);
        self
    }

    /// Bind to a random localhost port and start serving
    pub async fn build(self) -> std::io::Result<MockRelay> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let recipients = Arc::new(Mutex::new(Vec::new()));
        let messages = Arc::new(Mutex::new(Vec::new()));

        let (task_recipients, task_messages) = (Arc::clone(&recipients), Arc::clone(&messages));
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(MockRelay::handle_client(
                    stream,
                    Arc::clone(&config),
                    Arc::clone(&task_recipients),
                    Arc::clone(&task_messages),
                ));
            }
        });

        Ok(MockRelay {
            addr,
            recipients,
            messages,
        })
    }
}
