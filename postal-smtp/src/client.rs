//! A plain TCP session with the relay.

use postal_common::{incoming, outgoing};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

use crate::{
    error::{ClientError, Result},
    reply::{ReplyBuilder, ReplyLine, Response},
};

/// Longest reply line accepted from the relay, terminator included.
pub const MAX_REPLY_LINE: usize = 4096;

/// Prepares a message for transmission after `DATA`.
///
/// Line endings become CRLF, lines starting with `.` are dot-stuffed
/// (RFC 5321 section 4.5.2), and the `.` end-of-data line is appended.
#[must_use]
pub fn encode_data(data: &str) -> String {
    let body = data
        .strip_suffix("\r\n")
        .or_else(|| data.strip_suffix('\n'))
        .unwrap_or(data);

    let mut encoded = String::with_capacity(body.len() + 16);
    for line in body.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with('.') {
            encoded.push('.');
        }
        encoded.push_str(line);
        encoded.push_str("\r\n");
    }
    encoded.push_str(".\r\n");

    encoded
}

/// One SMTP session.
///
/// Every command waits for its reply before returning. The socket is closed
/// when the client is dropped, whatever state the transaction was left in.
#[derive(Debug)]
pub struct SmtpClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl SmtpClient {
    /// Opens a TCP connection to `addr` (`host:port`). The greeting is not
    /// read; see [`Self::read_greeting`].
    pub async fn connect(addr: &str) -> Result<Self> {
        let (reader, writer) = TcpStream::connect(addr).await?.into_split();

        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_reply().await
    }

    pub async fn ehlo(&mut self, name: &str) -> Result<Response> {
        self.command(&format!("EHLO {name}")).await
    }

    pub async fn helo(&mut self, name: &str) -> Result<Response> {
        self.command(&format!("HELO {name}")).await
    }

    pub async fn mail_from(&mut self, sender: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{sender}>")).await
    }

    pub async fn rcpt_to(&mut self, recipient: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{recipient}>")).await
    }

    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Sends the message content after an accepted `DATA`, terminated by
    /// `<CRLF>.<CRLF>`, and reads the relay's verdict.
    pub async fn send_data(&mut self, data: &str) -> Result<Response> {
        let encoded = encode_data(data);
        outgoing!("<{} bytes of message data>", encoded.len());

        self.writer.write_all(encoded.as_bytes()).await?;
        self.writer.flush().await?;

        self.read_reply().await
    }

    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    async fn command(&mut self, command: &str) -> Result<Response> {
        outgoing!("{command}");

        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;

        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<Response> {
        let mut builder = ReplyBuilder::default();

        loop {
            let line = self.read_line().await?;
            if line.is_empty() {
                continue;
            }

            if let Some(response) = builder.push(ReplyLine::parse(&line)?)? {
                incoming!("{} {}", response.code, response.message());
                return Ok(response);
            }
        }
    }

    /// Reads one line and strips its terminator.
    async fn read_line(&mut self) -> Result<String> {
        let mut raw = Vec::new();
        let read = (&mut self.reader)
            .take(MAX_REPLY_LINE as u64)
            .read_until(b'\n', &mut raw)
            .await?;

        if read == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        if raw.last() != Some(&b'\n') {
            return Err(if read >= MAX_REPLY_LINE {
                ClientError::ReplyTooLong(MAX_REPLY_LINE)
            } else {
                ClientError::ConnectionClosed
            });
        }

        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }

        String::from_utf8(raw).map_err(|e| ClientError::Malformed(e.to_string()))
    }
}
