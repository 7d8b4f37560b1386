//! Scripted SMTP relay for delivery tests
//!
//! Accepts any number of connections on a loopback port, records every
//! command, and answers each stage of the session from a reply script. By
//! default every stage succeeds; individual stages or recipients can be made
//! to refuse.
//!
//! ```rust,no_run
//! use support::mock_server::{MockSmtpServer, Stage};
//!
//! # async fn example() -> std::io::Result<()> {
//! let server = MockSmtpServer::builder()
//!     .reply(Stage::Ehlo, 502, "Command not implemented")
//!     .reject_recipient("bad@@", 550, "Invalid address")
//!     .build()
//!     .await?;
//!
//! // Point an SmtpSender at server.addr()
//!
//! server.shutdown();
//! # Ok(())
//! # }
//! ```
#![allow(dead_code)]

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream, tcp::OwnedWriteHalf},
    sync::{Mutex, watch},
};

/// Command received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    /// Address between the angle brackets
    MailFrom(String),
    /// Address between the angle brackets
    RcptTo(String),
    Data,
    /// Everything between `DATA` and the terminating `.`, as received
    MessageContent(String),
    Quit,
    Other(String),
}

/// Points in a session the relay replies at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Greeting,
    Ehlo,
    Helo,
    MailFrom,
    RcptTo,
    Data,
    /// After the terminating `.`
    Content,
    Quit,
}

impl Stage {
    const fn default_reply(self) -> (u16, &'static str) {
        match self {
            Self::Greeting => (220, "mock.relay ESMTP ready"),
            Self::Ehlo => (250, "mock.relay"),
            Self::Helo => (250, "mock.relay greets you"),
            Self::MailFrom | Self::RcptTo => (250, "OK"),
            Self::Data => (354, "End data with <CR><LF>.<CR><LF>"),
            Self::Content => (250, "OK: queued"),
            Self::Quit => (221, "Bye"),
        }
    }
}

#[derive(Debug, Clone)]
struct Reply {
    code: u16,
    text: String,
}

impl Reply {
    fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    const fn is_positive(&self) -> bool {
        self.code < 400
    }
}

#[derive(Debug, Default)]
struct Script {
    replies: HashMap<Stage, Reply>,
    recipients: HashMap<String, Reply>,
}

impl Script {
    fn reply(&self, stage: Stage) -> Reply {
        self.replies.get(&stage).cloned().unwrap_or_else(|| {
            let (code, text) = stage.default_reply();
            Reply::new(code, text)
        })
    }

    fn recipient_reply(&self, address: &str) -> Reply {
        self.recipients
            .get(address)
            .cloned()
            .unwrap_or_else(|| self.reply(Stage::RcptTo))
    }
}

type Journal = Arc<Mutex<Vec<SmtpCommand>>>;

/// Strips `FROM:` / `TO:` and the angle brackets from a command argument.
fn mailbox(argument: &str) -> String {
    argument
        .split_once(':')
        .map_or(argument, |(_, address)| address)
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}

/// One client connection.
struct Session {
    script: Arc<Script>,
    journal: Journal,
    writer: OwnedWriteHalf,
}

impl Session {
    async fn send(&mut self, reply: &Reply) -> std::io::Result<()> {
        self.writer
            .write_all(format!("{} {}\r\n", reply.code, reply.text).as_bytes())
            .await?;
        self.writer.flush().await
    }

    async fn record(&self, command: SmtpCommand) {
        self.journal.lock().await.push(command);
    }

    async fn serve(stream: TcpStream, script: Arc<Script>, journal: Journal) -> std::io::Result<()> {
        let (reader, writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        let mut session = Self {
            script,
            journal,
            writer,
        };

        let greeting = session.script.reply(Stage::Greeting);
        session.send(&greeting).await?;
        if !greeting.is_positive() {
            return Ok(());
        }

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            tracing::debug!("Mock relay received: {line}");

            let (verb, argument) = line.split_once(' ').unwrap_or((line, ""));
            let (command, reply) = match verb.to_ascii_uppercase().as_str() {
                "EHLO" => (
                    SmtpCommand::Ehlo(argument.to_string()),
                    session.script.reply(Stage::Ehlo),
                ),
                "HELO" => (
                    SmtpCommand::Helo(argument.to_string()),
                    session.script.reply(Stage::Helo),
                ),
                "MAIL" => (
                    SmtpCommand::MailFrom(mailbox(argument)),
                    session.script.reply(Stage::MailFrom),
                ),
                "RCPT" => {
                    let address = mailbox(argument);
                    let reply = session.script.recipient_reply(&address);
                    (SmtpCommand::RcptTo(address), reply)
                }
                "DATA" => (SmtpCommand::Data, session.script.reply(Stage::Data)),
                "QUIT" => {
                    session.record(SmtpCommand::Quit).await;
                    let reply = session.script.reply(Stage::Quit);
                    return session.send(&reply).await;
                }
                _ => (
                    SmtpCommand::Other(line.to_string()),
                    Reply::new(500, "Unrecognised command"),
                ),
            };

            let reading_content = command == SmtpCommand::Data && reply.is_positive();
            session.record(command).await;
            session.send(&reply).await?;

            if reading_content {
                let mut content = String::new();
                loop {
                    let Some(line) = lines.next_line().await? else {
                        return Ok(());
                    };
                    if line == "." {
                        break;
                    }
                    content.push_str(&line);
                    content.push_str("\r\n");
                }

                session.record(SmtpCommand::MessageContent(content)).await;
                let reply = session.script.reply(Stage::Content);
                session.send(&reply).await?;
            }
        }

        Ok(())
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    journal: Journal,
    stop: watch::Sender<bool>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            script: Script::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Every command received so far, across all connections
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.journal.lock().await.clone()
    }

    /// Addresses declared with `RCPT TO`, in order
    pub async fn recipients(&self) -> Vec<String> {
        self.commands()
            .await
            .into_iter()
            .filter_map(|command| match command {
                SmtpCommand::RcptTo(address) => Some(address),
                _ => None,
            })
            .collect()
    }

    /// Message contents received, one per accepted `DATA`, with CRLF line
    /// endings and still dot-stuffed
    pub async fn messages(&self) -> Vec<String> {
        self.commands()
            .await
            .into_iter()
            .filter_map(|command| match command {
                SmtpCommand::MessageContent(content) => Some(content),
                _ => None,
            })
            .collect()
    }

    /// Stops accepting connections. Sessions already open run to completion.
    pub fn shutdown(&self) {
        self.stop.send_replace(true);
    }
}

impl Drop for MockSmtpServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct MockSmtpServerBuilder {
    script: Script,
}

impl MockSmtpServerBuilder {
    /// Answer `stage` with the given reply instead of the default
    #[must_use]
    pub fn reply(mut self, stage: Stage, code: u16, text: impl Into<String>) -> Self {
        self.script.replies.insert(stage, Reply::new(code, text));
        self
    }

    /// Answer `RCPT TO` for `address` with the given reply
    #[must_use]
    pub fn reject_recipient(
        mut self,
        address: impl Into<String>,
        code: u16,
        text: impl Into<String>,
    ) -> Self {
        self.script
            .recipients
            .insert(address.into(), Reply::new(code, text));
        self
    }

    /// Binds to a random loopback port and starts accepting connections.
    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let script = Arc::new(self.script);
        let journal = Journal::default();
        let (stop, mut stopped) = watch::channel(false);

        let accepted = Arc::clone(&journal);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    accept = listener.accept() => {
                        let Ok((stream, _peer)) = accept else {
                            continue;
                        };

                        let script = Arc::clone(&script);
                        let journal = Arc::clone(&accepted);
                        tokio::spawn(async move {
                            if let Err(e) = Session::serve(stream, script, journal).await {
                                tracing::debug!("Mock relay session error: {e}");
                            }
                        });
                    }
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            journal,
            stop,
        })
    }
}
