//! SMTP client used to hand outbox messages to the relay host.
//!
//! Only the subset of the protocol needed for relaying is implemented:
//! greeting, `EHLO`/`HELO`, `MAIL FROM`, `RCPT TO`, `DATA` and `QUIT` over
//! plain TCP.
//!
//! ```no_run
//! use postal_smtp::SmtpClient;
//!
//! # async fn relay() -> Result<(), postal_smtp::ClientError> {
//! let mut client = SmtpClient::connect("relay.example.com:25").await?;
//! client.read_greeting().await?;
//! client.ehlo("postal.example.com").await?;
//! client.mail_from("noreply@example.com").await?;
//! client.rcpt_to("someone@example.org").await?;
//! client.data().await?;
//! client.send_data("Subject: Hello\r\n\r\nHello there").await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod reply;

pub use client::{MAX_REPLY_LINE, SmtpClient, encode_data};
pub use error::{ClientError, Result};
pub use reply::Response;
