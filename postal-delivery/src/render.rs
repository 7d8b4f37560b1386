//! Turns an outbox row into the message handed to the relay.

use core::fmt::{self, Display, Formatter};

use postal_common::QueuedMessage;
use serde::{Deserialize, Serialize};

/// How the body is inspected to choose between `text/html` and `text/plain`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentTypeDetection {
    /// HTML only when the body contains `<HTML`, matched case-sensitively
    #[default]
    Legacy,
    /// HTML when the body contains `<html`, `<!doctype html` or `<body` in
    /// any case
    Inspect,
}

const INSPECT_MARKERS: [&str; 3] = ["<html", "<!doctype html", "<body"];

impl ContentTypeDetection {
    pub fn detect(self, body: &str) -> ContentType {
        let is_html = match self {
            Self::Legacy => body.contains("<HTML"),
            Self::Inspect => {
                let body = body.to_ascii_lowercase();
                INSPECT_MARKERS.iter().any(|marker| body.contains(marker))
            }
        };

        if is_html {
            ContentType::Html
        } else {
            ContentType::Plain
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Plain,
    Html,
}

impl ContentType {
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Plain => "text/plain",
            Self::Html => "text/html",
        }
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}; charset=UTF-8", self.mime())
    }
}

/// A message ready to be streamed after `DATA`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    /// Header fields, in emission order
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl RenderedEmail {
    /// Value of the first header called `name` (ASCII case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Header block, blank line, then the body verbatim.
    pub fn to_wire(&self) -> String {
        let mut wire = String::with_capacity(self.body.len() + 256);
        for (field, value) in &self.headers {
            wire.push_str(field);
            wire.push_str(": ");
            wire.push_str(value);
            wire.push_str("\r\n");
        }
        wire.push_str("\r\n");
        wire.push_str(&self.body);
        wire
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageRenderer {
    detection: ContentTypeDetection,
}

impl MessageRenderer {
    pub const fn new(detection: ContentTypeDetection) -> Self {
        Self { detection }
    }

    /// Builds the headers and body for `message`. Header values are used as
    /// stored: no encoding or folding is applied.
    pub fn render(&self, message: &QueuedMessage) -> RenderedEmail {
        let mut headers = Vec::with_capacity(5);
        headers.push(("From", message.sender.clone()));
        headers.push(("To", message.recipients_column()));
        if !message.cc.is_empty() {
            headers.push(("Cc", message.cc_column()));
        }
        headers.push((
            "Content-Type",
            self.detection.detect(&message.body).to_string(),
        ));
        headers.push(("Subject", message.subject.clone()));

        RenderedEmail {
            headers,
            body: message.body.clone(),
        }
    }
}
