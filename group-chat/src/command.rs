//! Line parsing for client commands.
//!
//! Keywords are matched case-insensitively. Prefix keywords keep their separating space, so
//! they are matched before trailing whitespace is dropped: `JOIN ` is a join with an empty
//! name, while a bare `JOIN` is ordinary text. Parsing never fails:
//! anything that is not a recognised command becomes an implicit [`Command::Broadcast`].
//! Arguments of `PRIVATE_MSG` and `SET_COORDINATOR` are kept raw, because a malformed target
//! is reported to the sender by the router rather than rejected here.

/// One parsed client line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join { username: String },
    Msg { text: String },
    PrivateMsg { raw_args: String },
    Leave,
    RequestMembers,
    SetCoordinator { raw_id: String },
    Info,
    Broadcast { text: String },
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let raw = line.trim_start();
        let line = raw.trim_end();

        if line.eq_ignore_ascii_case("REQUEST_MEMBERS") {
            return Command::RequestMembers;
        }
        if let Some(rest) = strip_keyword(raw, "JOIN ") {
            return Command::Join {
                username: rest.trim().to_string(),
            };
        }
        if let Some(rest) = strip_keyword(raw, "MSG ") {
            return Command::Msg {
                text: rest.trim().to_string(),
            };
        }
        if let Some(rest) = strip_keyword(raw, "PRIVATE_MSG ") {
            return Command::PrivateMsg {
                raw_args: rest.trim().to_string(),
            };
        }
        if line.eq_ignore_ascii_case("LEAVE") {
            return Command::Leave;
        }
        if let Some(rest) = strip_keyword(raw, "SET_COORDINATOR ") {
            return Command::SetCoordinator {
                raw_id: rest.trim().to_string(),
            };
        }
        if strip_keyword(line, "INFO").is_some() {
            return Command::Info;
        }

        Command::Broadcast {
            text: line.to_string(),
        }
    }
}

/// Returns the text after `keyword` when `line` starts with it, ignoring ASCII case.
fn strip_keyword<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let prefix = line.get(..keyword.len())?;
    if prefix.eq_ignore_ascii_case(keyword) {
        line.get(keyword.len()..)
    } else {
        None
    }
}
