//! Decoder of simulator assert prompts.
//!
//! When the simulator meets an MMIO access without a predetermined outcome it stops and prints
//! a prompt block, for example:
//!
//! ```text
//! [ASSERT] MMIO READ addr=0x40001000 size=4 pc=0x80000124
//! [ASSERT] Peripheral: UART0
//! [ASSERT] Register: STATUS
//! [ASSERT] Hint: polling loop waits for TXE
//! [ASSERT] Decisions:
//! [ASSERT]   0x1 -> 0x80000130: addi a0,a0,1 (exit loop)
//! [ASSERT]   0 -> 0x80000124: lw a5,0(a4) (loop again)
//! [ASSERT] Read value (default 0x0):
//! ```
//!
//! The last line is left without a line feed while the simulator waits for the reply, so it is
//! processed as soon as it shows up in the input.

pub mod reply;

use crate::assert::reply::is_numeric_literal;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use strum_macros::Display;

/// Prefix of every assert prompt line.
pub const MARKER: &str = "[ASSERT]";
const READ_PROMPT: &str = "Read value";
const WRITE_PROMPT: &str = "Write expect";
const ARROW: &str = "->";

/// Partial line longer than this is decoded without waiting for a line feed.
const MAX_PENDING_LINE: usize = 1 << 20;
/// Tail of an already checked partial line that is checked again, a prompt text may be split
/// between chunks.
const PROMPT_OVERLAP: usize = WRITE_PROMPT.len() - 1;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    #[strum(serialize = "read")]
    Read,
    #[strum(serialize = "write")]
    Write,
}

/// One way to resolve a prompt.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Decision {
    /// Reply that selects this decision, always a decimal or `0x` hex literal.
    pub input: String,
    /// Human readable effect.
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_program_counter: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_disassembly: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// MMIO access that waits for a decision.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct AssertPrompt {
    pub access: AccessType,
    pub address: u64,
    /// Access width in bytes: 1, 2 or 4.
    pub size: u8,
    pub program_counter: u64,
    pub hints: Vec<String>,
    pub decisions: Vec<Decision>,
    pub raw_lines: Vec<String>,
    pub register: Option<String>,
    pub reset: Option<String>,
    pub fields: Option<String>,
    pub value: Option<String>,
    pub peripheral: Option<String>,
    /// Backend printed the final prompt line and waits for a reply.
    pub awaiting_reply: bool,
}

impl AssertPrompt {
    fn new(access: AccessType, address: u64, size: u8, program_counter: u64) -> Self {
        Self {
            access,
            address,
            size,
            program_counter,
            hints: vec![],
            decisions: vec![],
            raw_lines: vec![],
            register: None,
            reset: None,
            fields: None,
            value: None,
            peripheral: None,
            awaiting_reply: false,
        }
    }
}

/// Receiver of prompt updates.
///
/// The prompt is owned by the decoder and changed in place by the following lines,
/// clone it to keep a snapshot.
pub trait PromptHook {
    fn on_update(&mut self, prompt: &AssertPrompt);
}

impl<F: FnMut(&AssertPrompt)> PromptHook for F {
    fn on_update(&mut self, prompt: &AssertPrompt) {
        self(prompt)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DecoderState {
    Idle,
    ActivePrompt,
    DecisionCapture,
}

/// Stateful decoder of the assert prompt stream, one per backend session.
pub struct AssertDecoder<H: PromptHook> {
    hook: H,
    buffer: String,
    /// Length of the partial line already checked for a prompt text.
    scanned: usize,
    after_cr: bool,
    prompt: Option<AssertPrompt>,
    capture_decisions: bool,
}

impl<H: PromptHook> AssertDecoder<H> {
    pub fn new(hook: H) -> Self {
        Self {
            hook,
            buffer: String::new(),
            scanned: 0,
            after_cr: false,
            prompt: None,
            capture_decisions: false,
        }
    }

    pub fn state(&self) -> DecoderState {
        match (&self.prompt, self.capture_decisions) {
            (None, _) => DecoderState::Idle,
            (Some(_), false) => DecoderState::ActivePrompt,
            (Some(_), true) => DecoderState::DecisionCapture,
        }
    }

    /// Return current prompt.
    pub fn current(&self) -> Option<&AssertPrompt> {
        self.prompt.as_ref()
    }

    /// True if backend waits for a reply on the current prompt.
    pub fn is_awaiting_reply(&self) -> bool {
        self.prompt.as_ref().is_some_and(|p| p.awaiting_reply)
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    /// Forget current prompt and buffered input, hook is not called.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.after_cr = false;
        self.prompt = None;
        self.capture_decisions = false;
    }

    /// Feed a chunk of backend output. Complete lines are decoded in order.
    pub fn feed(&mut self, chunk: &str) {
        for c in chunk.chars() {
            match c {
                '\r' => {
                    self.end_line();
                    self.after_cr = true;
                }
                '\n' => {
                    if !self.after_cr {
                        self.end_line();
                    }
                    self.after_cr = false;
                }
                c => {
                    self.buffer.push(c);
                    self.after_cr = false;
                }
            }
        }

        let mut from = self.scanned.saturating_sub(PROMPT_OVERLAP);
        while !self.buffer.is_char_boundary(from) {
            from -= 1;
        }
        let fresh = &self.buffer[from..];
        if fresh.contains(READ_PROMPT)
            || fresh.contains(WRITE_PROMPT)
            || self.buffer.len() > MAX_PENDING_LINE
        {
            self.end_line();
        } else {
            self.scanned = self.buffer.len();
        }
    }

    fn end_line(&mut self) {
        let mut line = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        self.process_line(&line);
        line.clear();
        self.buffer = line;
    }

    fn process_line(&mut self, line: &str) {
        if let Some(prompt) = parse_header(line) {
            log::debug!(
                target: "assert",
                "{} prompt at {:#x} (pc {:#x})",
                prompt.access,
                prompt.address,
                prompt.program_counter
            );
            self.capture_decisions = false;
            let prompt = self.prompt.insert(prompt);
            prompt.raw_lines.push(line.to_string());
            self.hook.on_update(prompt);
            return;
        }

        let Some(prompt) = self.prompt.as_mut() else {
            return;
        };
        prompt.raw_lines.push(line.to_string());
        let body = strip_marker(line);

        if self.capture_decisions {
            if body.contains(ARROW) {
                match parse_decision(body) {
                    Some(decision) => {
                        prompt.decisions.push(decision);
                        self.hook.on_update(prompt);
                    }
                    None => log::warn!(target: "assert", "malformed decision: {body:?}"),
                }
                return;
            }
            if body.is_empty() {
                return;
            }
            self.capture_decisions = false;
        }

        if body.contains(READ_PROMPT) || body.contains(WRITE_PROMPT) {
            prompt.awaiting_reply = true;
            self.hook.on_update(prompt);
        } else if apply_annotation(prompt, body) {
            self.hook.on_update(prompt);
        } else if body.contains("Decision") {
            self.capture_decisions = true;
        }
    }
}

fn strip_marker(line: &str) -> &str {
    let line = line.trim();
    line.strip_prefix(MARKER).map(str::trim).unwrap_or(line)
}

fn header_regex() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*\[ASSERT\]\s+MMIO\s+(READ|WRITE)\s+(?:addr(?:ess)?=)?0x([0-9a-f]+)\s+(?:size=)?(\d+)\s+(?:pc=)?0x([0-9a-f]+)",
        )
        .expect("valid header regex")
    })
}

/// Parse MMIO prompt header line.
fn parse_header(line: &str) -> Option<AssertPrompt> {
    let caps = header_regex().captures(line)?;
    let access = if caps[1].eq_ignore_ascii_case("read") {
        AccessType::Read
    } else {
        AccessType::Write
    };
    let address = u64::from_str_radix(&caps[2], 16).ok()?;
    let size: u8 = caps[3].parse().ok()?;
    if !matches!(size, 1 | 2 | 4) {
        log::warn!(target: "assert", "unsupported access size {size}: {line:?}");
        return None;
    }
    let pc = u64::from_str_radix(&caps[4], 16).ok()?;
    Some(AssertPrompt::new(access, address, size, pc))
}

/// Apply `Label: value` annotation. Return `false` if line is not an annotation.
fn apply_annotation(prompt: &mut AssertPrompt, body: &str) -> bool {
    let Some((label, value)) = body.split_once(':') else {
        return false;
    };
    let value = value.trim().to_string();
    match label.trim() {
        "Hint" => prompt.hints.push(value),
        "Register" => prompt.register = Some(value),
        "Reset" => prompt.reset = Some(value),
        "Fields" => prompt.fields = Some(value),
        "Value" => prompt.value = Some(value),
        "Peripheral" => prompt.peripheral = Some(value),
        _ => return false,
    }
    true
}

/// Parse a program counter: `0x` prefixed hex, or bare hex with at least one decimal digit
/// (so words like `dead` or `add` are not addresses).
fn parse_pc(s: &str) -> Option<u64> {
    let digits = match s.strip_prefix("0x") {
        Some(digits) => digits,
        None if s.bytes().any(|b| b.is_ascii_digit()) => s,
        None => return None,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Split a trailing `(note)` off the decision effect. Parentheses inside the note are balanced,
/// the note is either the whole effect or separated from the target by whitespace.
fn split_note(effect: &str) -> (&str, Option<&str>) {
    let Some(inner) = effect.strip_suffix(')') else {
        return (effect, None);
    };
    let mut depth = 1usize;
    for (i, c) in inner.char_indices().rev() {
        match c {
            ')' => depth += 1,
            '(' => {
                depth -= 1;
                if depth == 0 {
                    let target = &inner[..i];
                    if !target.is_empty() && !target.ends_with(char::is_whitespace) {
                        return (effect, None);
                    }
                    return (target.trim_end(), Some(inner[i + 1..].trim()));
                }
            }
            _ => {}
        }
    }
    (effect, None)
}

/// Parse `<input> -> [<pc>: <disassembly>] [(<note>)]` decision line.
///
/// Return [`None`] if input is not a decimal or hex literal, such decision can't be sent back.
pub fn parse_decision(line: &str) -> Option<Decision> {
    let (input, effect) = strip_marker(line).split_once(ARROW)?;
    let input = input.trim();
    if !is_numeric_literal(input) {
        return None;
    }

    let (target, note) = split_note(effect.trim());

    let (target_program_counter, target_disassembly) = match target.split_once(':') {
        Some((pc, disasm)) => match parse_pc(pc.trim()) {
            Some(pc) => {
                let disasm = disasm.trim();
                (Some(pc), (!disasm.is_empty()).then(|| disasm.to_string()))
            }
            None => (None, None),
        },
        None => (None, None),
    };

    Some(Decision {
        input: input.to_string(),
        target: target.to_string(),
        target_program_counter,
        target_disassembly,
        note: note.map(str::to_string),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_decision_parsing() {
        struct TestCase {
            line: &'static str,
            expected: Option<Decision>,
        }
        let test_cases = vec![
            TestCase {
                line: "0x10 -> 0x2000: addi sp,sp,-16 (fallthrough)",
                expected: Some(Decision {
                    input: "0x10".to_string(),
                    target: "0x2000: addi sp,sp,-16".to_string(),
                    target_program_counter: Some(0x2000),
                    target_disassembly: Some("addi sp,sp,-16".to_string()),
                    note: Some("fallthrough".to_string()),
                }),
            },
            TestCase {
                line: "[ASSERT]   0 -> 80000124: lw a5,0(a4)",
                expected: Some(Decision {
                    input: "0".to_string(),
                    target: "80000124: lw a5,0(a4)".to_string(),
                    target_program_counter: Some(0x80000124),
                    target_disassembly: Some("lw a5,0(a4)".to_string()),
                    note: None,
                }),
            },
            TestCase {
                line: "0x41 -> accept write",
                expected: Some(Decision {
                    input: "0x41".to_string(),
                    target: "accept write".to_string(),
                    target_program_counter: None,
                    target_disassembly: None,
                    note: None,
                }),
            },
            TestCase {
                line: "7 -> (keep polling)",
                expected: Some(Decision {
                    input: "7".to_string(),
                    target: "".to_string(),
                    target_program_counter: None,
                    target_disassembly: None,
                    note: Some("keep polling".to_string()),
                }),
            },
            TestCase {
                line: "0x1 -> dead: loop forever",
                expected: Some(Decision {
                    input: "0x1".to_string(),
                    target: "dead: loop forever".to_string(),
                    target_program_counter: None,
                    target_disassembly: None,
                    note: None,
                }),
            },
            TestCase {
                line: "0x2 -> 0xdead: j 0xdead",
                expected: Some(Decision {
                    input: "0x2".to_string(),
                    target: "0xdead: j 0xdead".to_string(),
                    target_program_counter: Some(0xdead),
                    target_disassembly: Some("j 0xdead".to_string()),
                    note: None,
                }),
            },
            TestCase {
                line: "3 -> x (loop (again))",
                expected: Some(Decision {
                    input: "3".to_string(),
                    target: "x".to_string(),
                    target_program_counter: None,
                    target_disassembly: None,
                    note: Some("loop (again)".to_string()),
                }),
            },
            TestCase {
                line: "4 -> 0x100: sw a0,4(a5)",
                expected: Some(Decision {
                    input: "4".to_string(),
                    target: "0x100: sw a0,4(a5)".to_string(),
                    target_program_counter: Some(0x100),
                    target_disassembly: Some("sw a0,4(a5)".to_string()),
                    note: None,
                }),
            },
            TestCase {
                line: "note: something -> else",
                expected: None,
            },
            TestCase {
                line: "0x1,0x2 -> two",
                expected: None,
            },
            TestCase {
                line: "0x1 0x2 -> two",
                expected: None,
            },
            TestCase {
                line: "a=1 -> x",
                expected: None,
            },
            TestCase {
                line: "[ASSERT] -> x",
                expected: None,
            },
        ];

        for tc in test_cases {
            assert_eq!(parse_decision(tc.line), tc.expected, "line: {}", tc.line);
        }
    }

    #[test]
    fn test_header_parsing() {
        let prompt = parse_header("[ASSERT] MMIO READ addr=0x40001000 size=4 pc=0x80000124").unwrap();
        assert_eq!(prompt.access, AccessType::Read);
        assert_eq!(prompt.address, 0x40001000);
        assert_eq!(prompt.size, 4);
        assert_eq!(prompt.program_counter, 0x80000124);

        let prompt = parse_header("[ASSERT] mmio write 0x10 2 0x20").unwrap();
        assert_eq!(prompt.access, AccessType::Write);
        assert_eq!(prompt.size, 2);

        assert!(parse_header("[ASSERT] MMIO READ addr=0x10 size=3 pc=0x20").is_none());
        assert!(parse_header("MMIO READ addr=0x10 size=4 pc=0x20").is_none());
        assert!(
            parse_header("[ASSERT] MMIO READ addr=0xffffffffffffffffff size=4 pc=0x20").is_none()
        );
    }

    #[test]
    fn test_partial_prompt_line() {
        let updates = Rc::new(RefCell::new(0));
        let counter = updates.clone();
        let mut decoder = AssertDecoder::new(move |_: &AssertPrompt| *counter.borrow_mut() += 1);

        decoder.feed("[ASSERT] MMIO READ addr=0x10 size=4 pc=0x20\r\n[ASSERT] Register: ST");
        assert_eq!(*updates.borrow(), 1);
        assert_eq!(decoder.current().unwrap().register, None);

        decoder.feed("ATUS\r");
        decoder.feed("\n[ASSERT] Read value (default 0x0): ");
        assert!(decoder.is_awaiting_reply());
        let prompt = decoder.current().unwrap();
        assert_eq!(prompt.register.as_deref(), Some("STATUS"));
        assert_eq!(prompt.raw_lines.len(), 3);
        assert_eq!(*updates.borrow(), 3);
    }

    #[test]
    fn test_states() {
        let mut decoder = AssertDecoder::new(|_: &AssertPrompt| {});
        assert_eq!(decoder.state(), DecoderState::Idle);

        decoder.feed("[ASSERT] Hint: ignored without prompt\n");
        assert_eq!(decoder.state(), DecoderState::Idle);

        decoder.feed("[ASSERT] MMIO WRITE addr=0x10 size=1 pc=0x20\n");
        assert_eq!(decoder.state(), DecoderState::ActivePrompt);

        decoder.feed("[ASSERT] Decisions:\n[ASSERT]   0x1 -> one\n[ASSERT]\n");
        assert_eq!(decoder.state(), DecoderState::DecisionCapture);

        decoder.feed("[ASSERT]   2 -> two\n[ASSERT] Hint: after decisions\n");
        assert_eq!(decoder.state(), DecoderState::ActivePrompt);
        let prompt = decoder.current().unwrap();
        assert_eq!(prompt.decisions.len(), 2);
        assert_eq!(prompt.hints, vec!["after decisions".to_string()]);

        decoder.clear();
        assert_eq!(decoder.state(), DecoderState::Idle);
        assert!(decoder.current().is_none());
    }
}
