//! GDB machine interface (MI) output decoding.
//!
//! Every backend line goes through [`parse_line`] which classifies it into a typed [`MiRecord`].
//! Decoding is total: lines that are not MI output (prompts, garbage, assert prompt text)
//! give [`None`].

pub mod stop;
pub mod value;

pub use stop::StopReason;
pub use value::{
    parse_cstring, parse_results, parse_value, quote_cstring, MiValue, Results, MAX_DEPTH,
};

use serde::Serialize;

/// Prompt printed by the backend when it is ready for the next command.
pub const PROMPT: &str = "(gdb)";

#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// `^` - result of a command.
    ResultRecord,
    /// `*` - asynchronous execution state change.
    AsyncExec,
    /// `+` - asynchronous progress of a slow operation.
    AsyncStatus,
    /// `=` - asynchronous notification.
    AsyncNotify,
    /// `~` - console output.
    StreamConsole,
    /// `@` - output of the debugged program.
    StreamTarget,
    /// `&` - backend internal log.
    StreamLog,
}

impl RecordKind {
    fn from_sigil(sigil: char) -> Option<Self> {
        let kind = match sigil {
            '^' => RecordKind::ResultRecord,
            '*' => RecordKind::AsyncExec,
            '+' => RecordKind::AsyncStatus,
            '=' => RecordKind::AsyncNotify,
            '~' => RecordKind::StreamConsole,
            '@' => RecordKind::StreamTarget,
            '&' => RecordKind::StreamLog,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_stream(self) -> bool {
        matches!(
            self,
            RecordKind::StreamConsole | RecordKind::StreamTarget | RecordKind::StreamLog
        )
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordBody {
    /// Results of result and async records.
    Results(Results),
    /// Decoded text of stream records.
    Output(String),
}

/// Single line of MI output.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct MiRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<u64>,
    pub kind: RecordKind,
    /// Record class (`done`, `stopped`, `breakpoint-modified`, ...), empty for streams.
    pub class: String,
    pub body: RecordBody,
}

impl MiRecord {
    pub fn results(&self) -> Option<&Results> {
        match &self.body {
            RecordBody::Results(results) => Some(results),
            RecordBody::Output(_) => None,
        }
    }

    pub fn raw_output(&self) -> Option<&str> {
        match &self.body {
            RecordBody::Output(output) => Some(output.as_str()),
            RecordBody::Results(_) => None,
        }
    }

    /// Return result value by name.
    pub fn get(&self, key: &str) -> Option<&MiValue> {
        self.results().and_then(|r| r.get(key))
    }

    /// Return stop reason if record is an `*stopped` notification.
    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.kind != RecordKind::AsyncExec || self.class != "stopped" {
            return None;
        }
        let reason = self.get("reason").and_then(MiValue::as_str).unwrap_or_default();
        Some(StopReason::from(reason))
    }
}

/// Decode a single line of MI output.
///
/// Return [`None`] for blank lines, bare prompts and lines without a known record sigil.
pub fn parse_line(line: &str) -> Option<MiRecord> {
    let line = line.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed == PROMPT {
        return None;
    }

    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    let token = if digits > 0 {
        line[..digits].parse().ok()
    } else {
        None
    };

    let rest = &line[digits..];
    let sigil = rest.chars().next()?;
    let Some(kind) = RecordKind::from_sigil(sigil) else {
        log::trace!(target: "mi", "skip non-MI line: {line:?}");
        return None;
    };
    let rest = &rest[sigil.len_utf8()..];

    let record = if kind.is_stream() {
        MiRecord {
            token,
            kind,
            class: String::new(),
            body: RecordBody::Output(parse_cstring(rest)),
        }
    } else {
        let (class, results) = match rest.split_once(',') {
            Some((class, tail)) => (class, parse_results(tail).0),
            None => (rest, Results::new()),
        };
        MiRecord {
            token,
            kind,
            class: class.to_string(),
            body: RecordBody::Results(results),
        }
    };
    Some(record)
}

/// Decode a line that may be not valid UTF-8, invalid sequences are replaced.
pub fn parse_line_bytes(line: &[u8]) -> Option<MiRecord> {
    parse_line(&String::from_utf8_lossy(line))
}
