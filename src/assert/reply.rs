//! Replies to assert prompts.
//!
//! Anything written to the backend's stdin passes two independent gates: [`sanitize`] cuts the
//! candidate down to a single line free of protocol text, [`validate_reply`] then checks its
//! shape. [`ReplyWriter`] applies both before a single byte reaches the backend.

use crate::assert::MARKER;
use crate::error::Error;
use std::io::Write;

/// Reply that accepts backend's default value.
pub const ACCEPT_DEFAULT: &str = "";
/// Reply that explicitly ignores the access.
pub const IGNORE: &str = "-";

/// Reduce a candidate reply to a single safe line.
///
/// Missing input is an empty reply. CR characters are removed, only the text before the first
/// LF is kept, then trimmed. A candidate containing the protocol marker collapses to an empty
/// reply.
pub fn sanitize(input: Option<&str>) -> String {
    let input = input.unwrap_or_default().replace('\r', "");
    let line = input.split('\n').next().unwrap_or_default().trim();
    if line.contains(MARKER) {
        return String::new();
    }
    line.to_string()
}

/// True for `0x` prefixed hexadecimal and plain decimal literals.
pub fn is_numeric_literal(s: &str) -> bool {
    match s.strip_prefix("0x") {
        Some(hex) => !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()),
        None => !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()),
    }
}

/// Check reply shape: empty (accept default), `-` (ignore), hex or decimal literal.
pub fn validate_reply(reply: &str) -> Result<(), Error> {
    if reply == ACCEPT_DEFAULT || reply == IGNORE || is_numeric_literal(reply) {
        Ok(())
    } else {
        Err(Error::InvalidReply(reply.to_string()))
    }
}

/// Sanitize and validate a candidate reply.
pub fn prepare_reply(input: Option<&str>) -> Result<String, Error> {
    let reply = sanitize(input);
    validate_reply(&reply)?;
    Ok(reply)
}

/// Writes prompt replies into backend input.
pub struct ReplyWriter<W: Write> {
    writer: W,
}

impl<W: Write> ReplyWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Send a reply, newline terminated. Return the reply actually sent.
    pub fn send(&mut self, input: Option<&str>) -> Result<String, Error> {
        let reply = prepare_reply(input)?;
        log::debug!(target: "assert", "send prompt reply {reply:?}");
        writeln!(self.writer, "{reply}")?;
        self.writer.flush()?;
        Ok(reply)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
