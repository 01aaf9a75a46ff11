//! Tracing tokens back to the source code they came from.
//!
//! Every token carries a 32-bit [Key].
//! When source code is pushed into the VM it is registered with the [Tracer],
//!     which hands back a [KeyRange] with one key per character of the source.
//! The lexer assigns these keys in order, so given a key the tracer can find the source,
//!     and from the offset within the source, the line and column of the token.
//! Keeping this information off the token keeps [Token] small.
use crate::token::{CommandRef, CsNameInterner, Token, Value};
use std::collections::BTreeMap;
use std::ops::Bound::Included;
use std::path::PathBuf;

/// Key attached to tokens to enable tracing them.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Key(u32);

impl Key {
    /// A key that does not trace to any source code.
    pub fn dummy() -> Key {
        Key(u32::MAX)
    }
}

/// Range of keys reserved for one piece of source code.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyRange {
    next: u32,
    limit: u32,
}

impl KeyRange {
    /// Take the next key. Once the range is used up this returns [Key::dummy].
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Key {
        let key = self.peek();
        if self.next < self.limit {
            self.next += 1;
        }
        key
    }

    /// The key that [KeyRange::next] would return.
    pub fn peek(&self) -> Key {
        if self.next >= self.limit {
            return Key::dummy();
        }
        Key(self.next)
    }

    pub fn empty() -> KeyRange {
        KeyRange { next: 0, limit: 0 }
    }

    #[cfg(test)]
    pub fn for_testing() -> KeyRange {
        KeyRange {
            next: 0,
            limit: u32::MAX - 1,
        }
    }
}

/// Where a piece of source code came from.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Origin {
    File(PathBuf),
    Terminal,
    /// Tokens built by primitives rather than read from any source.
    Unknown,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::File(path) => write!(f, "{}", path.display()),
            Origin::Terminal => write!(f, "<terminal>"),
            Origin::Unknown => write!(f, "<unknown>"),
        }
    }
}

/// The position of a token, or of the end of input, in the source code.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SourceCodeTrace {
    pub origin: Origin,
    /// The full line the token appeared in.
    pub line_content: String,
    /// Line number, starting at 1.
    pub line_number: usize,
    /// Character index of the token within the line, starting at 0.
    pub index: usize,
    /// The token as it appears in the source; e.g. `\def`.
    pub value: String,
    /// The token, or [None] for end of input traces.
    pub token: Option<Token>,
}

impl SourceCodeTrace {
    /// Column number, starting at 1.
    pub fn column(&self) -> usize {
        self.index + 1
    }
}

impl std::fmt::Display for SourceCodeTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.origin, self.line_number, self.column())
    }
}

#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct Checkpoint {
    origin: Origin,
    content: String,
}

/// Records the source code registered with the VM so that tokens can be traced.
#[derive(Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tracer {
    checkpoints: BTreeMap<u32, Checkpoint>,
    next_key: u32,
    // First key of the last source code that was pushed from outside of TeX
    last_external_input: Option<u32>,
}

impl Tracer {
    /// Register source code and get the keys to assign to its characters.
    ///
    /// `token` is the token that caused the source to be added, or [None] if it was added
    ///     from outside of TeX.
    pub fn register_source_code(
        &mut self,
        token: Option<Token>,
        origin: Origin,
        source_code: &str,
    ) -> KeyRange {
        // One extra key is reserved so that the end of the input can be traced.
        let len = u32::try_from(source_code.chars().count())
            .unwrap_or(u32::MAX)
            .saturating_add(1);
        let next = self.next_key;
        let limit = next.saturating_add(len).min(u32::MAX - 1);
        self.checkpoints.insert(
            next,
            Checkpoint {
                origin,
                content: source_code.to_string(),
            },
        );
        if token.is_none() {
            self.last_external_input = Some(next);
        }
        self.next_key = limit;
        KeyRange { next, limit }
    }

    /// Trace a token.
    pub fn trace(&self, token: Token, cs_name_interner: &CsNameInterner) -> SourceCodeTrace {
        let value = match token.value() {
            Value::CommandRef(CommandRef::ControlSequence(cs_name)) => {
                CommandRef::ControlSequence(cs_name).to_string(cs_name_interner)
            }
            _ => token.char().map(String::from).unwrap_or_default(),
        };
        let key = token.trace_key().0;
        let checkpoint = match self.checkpoints.range((Included(&0), Included(&key))).next_back() {
            Some((first_key, checkpoint)) if key < self.next_key => Some((*first_key, checkpoint)),
            _ => None,
        };
        let Some((first_key, checkpoint)) = checkpoint else {
            return SourceCodeTrace {
                origin: Origin::Unknown,
                line_content: value.clone(),
                line_number: 0,
                index: 0,
                value,
                token: Some(token),
            };
        };
        let char_offset = (key - first_key) as usize;
        let mut line_number = 1;
        let mut byte_line_start = 0;
        let mut char_line_start = 0;
        for (char_index, (byte_index, c)) in checkpoint.content.char_indices().enumerate() {
            if char_index == char_offset {
                break;
            }
            if c == '\n' {
                byte_line_start = byte_index + 1;
                char_line_start = char_index + 1;
                line_number += 1;
            }
        }
        let tail = &checkpoint.content[byte_line_start..];
        let line_content = tail.split('\n').next().unwrap_or_default().to_string();
        SourceCodeTrace {
            origin: checkpoint.origin.clone(),
            line_content,
            line_number,
            index: char_offset.saturating_sub(char_line_start),
            value,
            token: Some(token),
        }
    }

    /// Trace the end of the input: the end of the last non-empty line of the last external source.
    pub fn trace_end_of_input(&self) -> SourceCodeTrace {
        let checkpoint = self
            .last_external_input
            .and_then(|key| self.checkpoints.get(&key));
        let Some(checkpoint) = checkpoint else {
            return SourceCodeTrace {
                origin: Origin::Unknown,
                line_content: String::new(),
                line_number: 0,
                index: 0,
                value: " ".to_string(),
                token: None,
            };
        };
        let (line_number, line_content) = checkpoint
            .content
            .split('\n')
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .last()
            .map(|(i, line)| (i + 1, line.trim_end()))
            .unwrap_or((1, ""));
        SourceCodeTrace {
            origin: checkpoint.origin.clone(),
            line_content: line_content.to_string(),
            line_number,
            index: line_content.chars().count(),
            value: " ".to_string(),
            token: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_positions() {
        let mut tracer: Tracer = Default::default();
        let mut interner: CsNameInterner = Default::default();
        let greet = interner.get_or_intern("greet");
        let source = "hé\nab\\greet";
        let mut range =
            tracer.register_source_code(None, Origin::File("input.tex".into()), source);
        let h = Token::new_letter('h', range.next());
        let _e = range.next();
        let _newline = range.next();
        let a = Token::new_letter('a', range.next());
        let _b = range.next();
        let cs = Token::new_control_sequence(greet, range.next());

        let trace = tracer.trace(h, &interner);
        assert_eq!((trace.line_number, trace.column()), (1, 1));
        assert_eq!(trace.line_content, "hé");

        let trace = tracer.trace(a, &interner);
        assert_eq!((trace.line_number, trace.column()), (2, 1));

        let trace = tracer.trace(cs, &interner);
        assert_eq!((trace.line_number, trace.column()), (2, 3));
        assert_eq!(trace.value, r"\greet");
        assert_eq!(trace.line_content, r"ab\greet");
        assert_eq!(format!("{trace}"), "input.tex:2:3");
    }

    #[test]
    fn trace_across_sources() {
        let mut tracer: Tracer = Default::default();
        let interner: CsNameInterner = Default::default();
        let mut range_1 = tracer.register_source_code(None, Origin::File("a.tex".into()), "a");
        let mut range_2 = tracer.register_source_code(None, Origin::Terminal, "xb");
        let a = Token::new_letter('a', range_1.next());
        range_2.next();
        let b = Token::new_letter('b', range_2.next());
        assert_eq!(tracer.trace(a, &interner).origin, Origin::File("a.tex".into()));
        let trace = tracer.trace(b, &interner);
        assert_eq!(trace.origin, Origin::Terminal);
        assert_eq!(trace.column(), 2);
    }

    #[test]
    fn dummy_key_traces_to_unknown() {
        let tracer: Tracer = Default::default();
        let interner: CsNameInterner = Default::default();
        let trace = tracer.trace(Token::new_other('x', Key::dummy()), &interner);
        assert_eq!(trace.origin, Origin::Unknown);
        assert_eq!(trace.value, "x");
    }

    #[test]
    fn end_of_input_skips_trailing_blank_lines() {
        let mut tracer: Tracer = Default::default();
        tracer.register_source_code(None, Origin::File("a.tex".into()), "first\nsecond  \n\n  \n");
        let trace = tracer.trace_end_of_input();
        assert_eq!(trace.line_number, 2);
        assert_eq!(trace.line_content, "second");
        assert_eq!(trace.column(), 7);
        assert_eq!(trace.token, None);
    }
}
