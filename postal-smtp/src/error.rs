use std::io;

use thiserror::Error;

/// A session with the relay broke down.
///
/// Replies the relay sends, including rejections, are never errors here;
/// they come back as a [`crate::Response`] for the caller to judge.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    /// The relay sent something that is not an SMTP reply.
    #[error("malformed reply: {0}")]
    Malformed(String),

    /// A reply line did not end within [`crate::MAX_REPLY_LINE`] bytes.
    #[error("reply line longer than {0} bytes")]
    ReplyTooLong(usize),

    #[error("relay closed the connection")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
