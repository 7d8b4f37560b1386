//! SMTP hand-off of rendered messages.
//!
//! Each message gets its own session:
//! 1. Connect and read the greeting
//! 2. `EHLO`, falling back to `HELO`
//! 3. `MAIL FROM`
//! 4. `RCPT TO` for every recipient, then every Cc address
//! 5. `DATA` and the message content
//! 6. `QUIT`
//!
//! The first refused step ends the session with that step's error. The
//! connection is closed when the client is dropped, on every path.

use std::fmt::Debug;

use async_trait::async_trait;
use postal_common::{config::SmtpSettings, internal, tracing};
use postal_smtp::{Response, SmtpClient};

use crate::{error::DeliveryError, render::RenderedEmail};

/// Something that can hand a rendered message to a relay.
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    /// Delivers `email` from `sender` to `recipients` and then `cc`.
    ///
    /// # Errors
    /// The first step of the hand-off that failed
    async fn send(
        &self,
        email: &RenderedEmail,
        sender: &str,
        recipients: &[String],
        cc: &[String],
    ) -> Result<(), DeliveryError>;
}

fn describe(response: &Response) -> String {
    format!("{} {}", response.code, response.message())
}

/// Plain-TCP SMTP transport to a single relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSender {
    address: String,
    helo_name: String,
}

impl SmtpSender {
    /// `address` is `host:port`.
    pub fn new(address: impl Into<String>, helo_name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            helo_name: helo_name.into(),
        }
    }

    pub fn from_settings(settings: &SmtpSettings) -> Self {
        Self::new(settings.address(), settings.helo_name.clone())
    }

    async fn connect_and_greet(&self) -> Result<SmtpClient, DeliveryError> {
        let mut client =
            SmtpClient::connect(&self.address)
                .await
                .map_err(|e| DeliveryError::Dial {
                    address: self.address.clone(),
                    reason: e.to_string(),
                })?;

        let greeting = client.read_greeting().await?;
        if !greeting.is_success() {
            return Err(DeliveryError::Greeting(describe(&greeting)));
        }

        Ok(client)
    }

    async fn hello(&self, client: &mut SmtpClient) -> Result<(), DeliveryError> {
        let ehlo = client.ehlo(&self.helo_name).await?;
        if ehlo.is_success() {
            return Ok(());
        }

        tracing::debug!(
            server = %self.address,
            response = %describe(&ehlo),
            "EHLO refused, falling back to HELO"
        );

        let helo = client.helo(&self.helo_name).await?;
        if helo.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Hello(describe(&helo)))
        }
    }

    async fn envelope(
        client: &mut SmtpClient,
        sender: &str,
        recipients: &[String],
        cc: &[String],
    ) -> Result<(), DeliveryError> {
        let response = client.mail_from(sender).await?;
        if !response.is_success() {
            return Err(DeliveryError::Sender {
                sender: sender.to_string(),
                reason: describe(&response),
            });
        }

        for recipient in recipients.iter().chain(cc) {
            let response = client.rcpt_to(recipient).await?;
            if !response.is_success() {
                return Err(DeliveryError::Recipient {
                    recipient: recipient.clone(),
                    reason: describe(&response),
                });
            }
        }

        Ok(())
    }

    async fn content(client: &mut SmtpClient, email: &RenderedEmail) -> Result<(), DeliveryError> {
        let response = client.data().await?;
        if !response.is_intermediate() {
            return Err(DeliveryError::Data(describe(&response)));
        }

        let response = client.send_data(&email.to_wire()).await?;
        if !response.is_success() {
            return Err(DeliveryError::Data(describe(&response)));
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for SmtpSender {
    async fn send(
        &self,
        email: &RenderedEmail,
        sender: &str,
        recipients: &[String],
        cc: &[String],
    ) -> Result<(), DeliveryError> {
        let mut client = self.connect_and_greet().await?;

        self.hello(&mut client).await?;
        Self::envelope(&mut client, sender, recipients, cc).await?;
        Self::content(&mut client, email).await?;

        // The relay has accepted the message; a failed QUIT changes nothing.
        if let Err(e) = client.quit().await {
            internal!(
                level = DEBUG,
                "QUIT to {} failed after delivery: {e}",
                self.address
            );
        }

        Ok(())
    }
}
