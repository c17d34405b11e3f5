//! Value grammar of the GDB machine interface.
//!
//! Grammar (loosely, as real backends emit it):
//!
//! ```text
//! value   = c-string | tuple | list | raw
//! tuple   = "{" [ result *( "," result ) ] "}"
//! list    = "[" [ ( value | result ) *( "," ( value | result ) ) ] "]"
//! result  = key "=" value
//! ```
//!
//! Parsing never fails. Unterminated strings and containers are closed at the end of input,
//! a key without `=` gets an empty value. Nesting is tracked on a heap stack. Containers deeper
//! than [`MAX_DEPTH`] are kept as raw text, so rendering, cloning and comparing of a parsed value
//! never run out of stack.

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::fmt::Write;

/// Mapping of result names into values. On duplicate names the last one wins.
pub type Results = IndexMap<String, MiValue>;

/// Deepest container nesting decoded into [`MiValue`] tuples and lists. A container that starts
/// deeper is stored as a [`MiValue::String`] with its raw text.
pub const MAX_DEPTH: usize = 512;

/// Single value of MI output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MiValue {
    String(String),
    Tuple(Results),
    List(Vec<MiValue>),
}

impl Default for MiValue {
    fn default() -> Self {
        MiValue::String(String::new())
    }
}

impl Drop for MiValue {
    fn drop(&mut self) {
        let mut pending = vec![];
        self.take_children(&mut pending);
        while let Some(mut value) = pending.pop() {
            value.take_children(&mut pending);
        }
    }
}

impl MiValue {
    /// Move nested values out, so the value is dropped without recursion.
    fn take_children(&mut self, out: &mut Vec<MiValue>) {
        match self {
            MiValue::String(_) => {}
            MiValue::Tuple(entries) => out.extend(entries.drain(..).map(|(_, v)| v)),
            MiValue::List(items) => out.append(items),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MiValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&Results> {
        match self {
            MiValue::Tuple(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MiValue]> {
        match self {
            MiValue::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }

    /// Return tuple member by name, [`None`] for missing members and non-tuple values.
    pub fn get(&self, key: &str) -> Option<&MiValue> {
        self.as_tuple().and_then(|t| t.get(key))
    }
}

/// Renders value in MI syntax, `parse_value` of the output gives back an equal value.
impl fmt::Display for MiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiValue::String(s) => f.write_str(&quote_cstring(s)),
            MiValue::Tuple(entries) => {
                f.write_char('{')?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i != 0 {
                        f.write_char(',')?;
                    }
                    write!(f, "{key}={value}")?;
                }
                f.write_char('}')
            }
            MiValue::List(items) => {
                f.write_char('[')?;
                for (i, value) in items.iter().enumerate() {
                    if i != 0 {
                        f.write_char(',')?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_char(']')
            }
        }
    }
}

/// Quote string as a C-string, the inverse of [`parse_cstring`].
pub fn quote_cstring(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Decode a quoted C-string.
///
/// `\n`, `\t`, `\\` and `\"` are unescaped, for any other escape the backslash is dropped and
/// the next character kept. Without a closing quote the rest of the input is returned.
/// Input that doesn't start with a quote is returned as is.
pub fn parse_cstring(text: &str) -> String {
    if !text.starts_with('"') {
        return text.to_string();
    }
    cstring_at(text, 0).0
}

/// Decode C-string which opening quote placed at `start`.
/// Return decoded content and index after the closing quote.
fn cstring_at(text: &str, start: usize) -> (String, usize) {
    let body = &text[start + 1..];
    let mut out = String::with_capacity(body.len().min(4096));
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return (out, start + 1 + i + 1),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, escaped)) => out.push(escaped),
                None => break,
            },
            c => out.push(c),
        }
    }
    (out, text.len())
}

/// Read unquoted token until the next unescaped `,`, `}` or `]`.
fn raw_token_at(text: &str, start: usize) -> (String, usize) {
    let bytes = text.as_bytes();
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b',' | b'}' | b']' => break,
            _ => i += 1,
        }
    }
    let end = i.min(bytes.len());
    (text[start..end].to_string(), end)
}

/// Find the end of a container opened at `start`, quoted strings are skipped.
/// Return the index after the closing bracket or the end of input.
fn skip_container(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut i = start;
    while i < bytes.len() {
        match (in_string, bytes[i]) {
            (true, b'\\') => i += 1,
            (true, b'"') => in_string = false,
            (false, b'"') => in_string = true,
            (false, b'{' | b'[') => depth += 1,
            (false, b'}' | b']') => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Find the end of a result name. Return the end index and `true` if the name is followed by `=`.
fn scan_key(bytes: &[u8], start: usize) -> (usize, bool) {
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'=' => return (i, true),
            b',' | b'}' | b']' => return (i, false),
            _ => i += 1,
        }
    }
    (i, false)
}

/// Container under construction.
enum Frame {
    Tuple {
        entries: Results,
        key: Option<String>,
    },
    List {
        items: Vec<MiValue>,
        key: Option<String>,
    },
}

impl Frame {
    fn tuple() -> Self {
        Frame::Tuple {
            entries: Results::new(),
            key: None,
        }
    }

    fn list() -> Self {
        Frame::List {
            items: vec![],
            key: None,
        }
    }

    fn accept(&mut self, value: MiValue) {
        match self {
            Frame::Tuple { entries, key } => {
                let key = key.take().unwrap_or_default();
                entries.insert(key, value);
            }
            Frame::List { items, key } => match key.take() {
                // `name=value` inside a list becomes a single member tuple
                Some(key) => {
                    let mut pair = Results::with_capacity(1);
                    pair.insert(key, value);
                    items.push(MiValue::Tuple(pair));
                }
                None => items.push(value),
            },
        }
    }

    fn into_value(self) -> MiValue {
        match self {
            Frame::Tuple { entries, .. } => MiValue::Tuple(entries),
            Frame::List { items, .. } => MiValue::List(items),
        }
    }
}

/// Pop innermost container and pass it to the parent.
/// Return a value if there is no parent anymore.
fn close(stack: &mut Vec<Frame>) -> Option<MiValue> {
    let value = stack.pop()?.into_value();
    match stack.last_mut() {
        Some(parent) => {
            parent.accept(value);
            None
        }
        None => Some(value),
    }
}

/// Close all unterminated containers.
fn unwind(mut stack: Vec<Frame>) -> MiValue {
    let Some(frame) = stack.pop() else {
        return MiValue::default();
    };
    let mut value = frame.into_value();
    while let Some(mut parent) = stack.pop() {
        parent.accept(value);
        value = parent.into_value();
    }
    value
}

enum Step {
    /// Value expected at current position.
    Value,
    /// Next member of innermost container (or its end) expected.
    Member,
    /// Member separator (or container end) expected.
    Separator,
}

/// Parse a value starting at `index`. Return the value and index of the first unconsumed byte.
pub fn parse_value(text: &str, index: usize) -> (MiValue, usize) {
    let bytes = text.as_bytes();
    let mut pos = index.min(bytes.len());
    while !text.is_char_boundary(pos) {
        pos += 1;
    }

    let mut stack: Vec<Frame> = vec![];
    let mut step = Step::Value;
    loop {
        match step {
            Step::Value => {
                let value = match bytes.get(pos) {
                    Some(b'{' | b'[') if stack.len() >= MAX_DEPTH => {
                        let end = skip_container(bytes, pos);
                        let raw = text[pos..end].to_string();
                        pos = end;
                        MiValue::String(raw)
                    }
                    Some(b'{') => {
                        stack.push(Frame::tuple());
                        pos += 1;
                        step = Step::Member;
                        continue;
                    }
                    Some(b'[') => {
                        stack.push(Frame::list());
                        pos += 1;
                        step = Step::Member;
                        continue;
                    }
                    Some(b'"') => {
                        let (s, next) = cstring_at(text, pos);
                        pos = next;
                        MiValue::String(s)
                    }
                    _ => {
                        let (s, next) = raw_token_at(text, pos);
                        pos = next;
                        MiValue::String(s)
                    }
                };
                match stack.last_mut() {
                    Some(frame) => {
                        frame.accept(value);
                        step = Step::Separator;
                    }
                    None => return (value, pos),
                }
            }
            Step::Separator => match bytes.get(pos) {
                Some(b',') => {
                    pos += 1;
                    step = Step::Member;
                }
                Some(b'}') | Some(b']') => {
                    pos += 1;
                    if let Some(value) = close(&mut stack) {
                        return (value, pos);
                    }
                }
                // garbage after a member, read it as the next one
                Some(_) => step = Step::Member,
                None => return (unwind(stack), pos),
            },
            Step::Member => {
                let Some(&c) = bytes.get(pos) else {
                    return (unwind(stack), pos);
                };
                if c == b'}' || c == b']' {
                    pos += 1;
                    if let Some(value) = close(&mut stack) {
                        return (value, pos);
                    }
                    step = Step::Separator;
                    continue;
                }

                let opens_value = matches!(c, b'"' | b'{' | b'[');
                match stack.last_mut() {
                    Some(Frame::Tuple { entries, key }) => {
                        if opens_value {
                            // anonymous member
                            *key = Some(String::new());
                            step = Step::Value;
                            continue;
                        }
                        let (end, has_value) = scan_key(bytes, pos);
                        let name = text[pos..end].trim().to_string();
                        if has_value {
                            *key = Some(name);
                            pos = end + 1;
                            step = Step::Value;
                        } else {
                            if !name.is_empty() {
                                entries.insert(name, MiValue::default());
                            }
                            pos = end;
                            step = Step::Separator;
                        }
                    }
                    Some(Frame::List { key, .. }) => {
                        if !opens_value {
                            let (end, is_result) = scan_key(bytes, pos);
                            if is_result {
                                *key = Some(text[pos..end].trim().to_string());
                                pos = end + 1;
                            }
                        }
                        step = Step::Value;
                    }
                    None => return (MiValue::default(), pos),
                }
            }
        }
    }
}

/// Parse comma separated `name=value` results. Return results and index where parsing stopped
/// (at the end of input or at an unbalanced `}` or `]`).
pub fn parse_results(text: &str) -> (Results, usize) {
    let bytes = text.as_bytes();
    let mut results = Results::new();
    let mut pos = 0;
    while pos < bytes.len() {
        if matches!(bytes[pos], b'}' | b']') {
            break;
        }

        let (end, has_value) = scan_key(bytes, pos);
        let key = text[pos..end].trim().to_string();
        if has_value {
            let (value, next) = parse_value(text, end + 1);
            if !key.is_empty() {
                results.insert(key, value);
            }
            pos = next;
        } else {
            if !key.is_empty() {
                results.insert(key, MiValue::default());
            }
            pos = end;
        }

        if bytes.get(pos) == Some(&b',') {
            pos += 1;
        }
    }
    (results, pos)
}
