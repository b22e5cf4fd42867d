use std::{borrow::Cow, fmt, io};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::registry::SessionId;

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Every line the server can emit, rendered with [`fmt::Display`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    Welcome { username: String },
    Promoted,
    NewCoordinator { username: String },
    Chat { timestamp: String, sender: String, text: String },
    Private { sender: String, text: String },
    Members(Vec<(SessionId, String)>),
    Error(ProtocolError),
}

/// Errors reported back to the session that caused them. The connection stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    InvalidPrivateFormat,
    InvalidRecipient,
    RecipientNotFound,
    InvalidCoordinatorId,
    UnknownCoordinatorTarget,
    AlreadyCoordinator,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ProtocolError::InvalidPrivateFormat => "Invalid private message format.",
            ProtocolError::InvalidRecipient => "Invalid recipient ID.",
            ProtocolError::RecipientNotFound => "Recipient not found.",
            ProtocolError::InvalidCoordinatorId => "Invalid coordinator ID format.",
            ProtocolError::UnknownCoordinatorTarget => "Client ID does not exist.",
            ProtocolError::AlreadyCoordinator => "This client is already the coordinator.",
        };
        f.write_str(text)
    }
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerLine::Welcome { username } => write!(f, "Welcome, {username}"),
            ServerLine::Promoted => f.write_str("You are now the coordinator"),
            ServerLine::NewCoordinator { username } => write!(f, "New coordinator is {username}"),
            ServerLine::Chat {
                timestamp,
                sender,
                text,
            } => write!(f, "{timestamp} {sender}: {text}"),
            ServerLine::Private { sender, text } => write!(f, "Private from {sender}: {text}"),
            ServerLine::Members(members) if members.is_empty() => {
                f.write_str("Active Members: No other members connected.")
            }
            ServerLine::Members(members) => {
                f.write_str("Active Members: ")?;
                for (index, (id, username)) in members.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{username} (ID: {id})")?;
                }
                Ok(())
            }
            ServerLine::Error(error) => write!(f, "{error}"),
        }
    }
}

/// Reads the next non-empty line, without its line ending. `None` means end of stream.
///
/// Invalid UTF-8 is replaced with U+FFFD instead of failing the read.
pub async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    // Plain newline framing keeps the server usable from netcat-style tools.
    let mut raw = Vec::new();
    loop {
        raw.clear();
        let bytes = reader.read_until(b'\n', &mut raw).await?;
        if bytes == 0 {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&raw);
        if let Cow::Owned(_) = line {
            debug!(bytes, "replaced invalid UTF-8 in received line");
        }
        let trimmed = line.trim_end_matches(LINE_ENDINGS);
        if trimmed.trim().is_empty() {
            continue;
        }

        return Ok(Some(trimmed.to_string()));
    }
}

pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = Vec::with_capacity(line.len() + 1);
    encoded.extend_from_slice(line.as_bytes());
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}
