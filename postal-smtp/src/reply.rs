//! SMTP replies (RFC 5321 section 4.2).

use crate::error::{ClientError, Result};

/// A complete reply from the relay, possibly spanning several lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    /// Text of each line, without the code and separator
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// The reply text, lines joined by `\n`.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// 2xx
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, 200..=299)
    }

    /// 3xx, e.g. `354` after `DATA`
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        matches!(self.code, 300..=399)
    }

    /// 5xx
    #[must_use]
    pub const fn is_permanent_failure(&self) -> bool {
        matches!(self.code, 500..=599)
    }
}

/// One line of a reply, borrowed from the read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReplyLine<'a> {
    pub code: u16,
    /// `false` when the code is followed by `-`
    pub last: bool,
    pub text: &'a str,
}

impl<'a> ReplyLine<'a> {
    /// Parses one line with its terminator already removed.
    pub(crate) fn parse(line: &'a str) -> Result<Self> {
        let (digits, rest) = line
            .split_at_checked(3)
            .ok_or_else(|| ClientError::Malformed(format!("line too short: {line:?}")))?;

        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ClientError::Malformed(format!("bad reply code: {digits:?}")));
        }
        let code = digits
            .parse()
            .map_err(|_| ClientError::Malformed(format!("bad reply code: {digits:?}")))?;

        let (last, text) = match rest.as_bytes().first() {
            None => (true, ""),
            Some(b' ') => (true, &rest[1..]),
            Some(b'-') => (false, &rest[1..]),
            Some(_) => {
                return Err(ClientError::Malformed(format!(
                    "bad separator after code: {line:?}"
                )));
            }
        };

        Ok(Self { code, last, text })
    }
}

/// Collects reply lines until the last one.
#[derive(Debug, Default)]
pub(crate) struct ReplyBuilder {
    code: Option<u16>,
    lines: Vec<String>,
}

impl ReplyBuilder {
    /// Adds a line. Returns the finished reply once the last line is pushed.
    pub(crate) fn push(&mut self, line: ReplyLine<'_>) -> Result<Option<Response>> {
        match self.code {
            Some(code) if code != line.code => {
                return Err(ClientError::Malformed(format!(
                    "multi-line reply switched code from {code} to {}",
                    line.code
                )));
            }
            Some(_) => {}
            None => self.code = Some(line.code),
        }

        self.lines.push(line.text.to_string());

        if line.last {
            Ok(Some(Response::new(line.code, std::mem::take(&mut self.lines))))
        } else {
            Ok(None)
        }
    }
}
