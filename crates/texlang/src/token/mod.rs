//! TeX tokens and category codes.
//!
//! A [Token] is a small `Copy` value: a [Value] (category code plus payload)
//!     and a [trace::Key] that records where the token came from.
//! Control sequence names are interned in a [CsNameInterner] owned by the VM,
//!     so a control sequence token carries a 32-bit [CsName] rather than a string.

mod catcode;
pub mod lexer;
pub mod trace;

pub use catcode::CatCode;
pub use catcode::CatCodeTable;
pub use catcode::MalformedCatCode;
use std::num;
use texcraft_stdext::collections::interner;

/// Interned name of a control sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CsName(num::NonZeroU32);

impl CsName {
    /// A dense index for the name, suitable for indexing into a vector.
    #[inline]
    pub fn to_usize(&self) -> usize {
        interner::Key::into_usize(self.0)
    }
}

/// String interner for control sequence names.
pub type CsNameInterner = interner::Interner<CsName>;

impl interner::Key for CsName {
    fn try_from_usize(index: usize) -> Option<Self> {
        num::NonZeroU32::try_from_usize(index).map(CsName)
    }

    fn into_usize(self) -> usize {
        self.0.into_usize()
    }
}

/// The value of a token.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    BeginGroup(char),
    EndGroup(char),
    MathShift(char),
    AlignmentTab(char),
    Parameter(char),
    Superscript(char),
    Subscript(char),
    Space(char),
    Letter(char),
    Other(char),
    CommandRef(CommandRef),
}

/// The value of a token that is looked up in the commands map.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CommandRef {
    ControlSequence(CsName),
    ActiveCharacter(char),
}

impl CommandRef {
    pub fn to_string(&self, cs_name_interner: &CsNameInterner) -> String {
        match self {
            CommandRef::ControlSequence(cs_name) => {
                format!("\\{}", cs_name_interner.resolve(*cs_name).unwrap_or("?"))
            }
            CommandRef::ActiveCharacter(c) => format!("{c}"),
        }
    }
}

impl Value {
    /// Build the value of a character token.
    ///
    /// Returns [None] for category codes that only exist inside the lexer:
    ///     escape, end of line, ignored, comment and invalid.
    pub fn new(c: char, cat_code: CatCode) -> Option<Value> {
        Some(match cat_code {
            CatCode::BeginGroup => Value::BeginGroup(c),
            CatCode::EndGroup => Value::EndGroup(c),
            CatCode::MathShift => Value::MathShift(c),
            CatCode::AlignmentTab => Value::AlignmentTab(c),
            CatCode::Parameter => Value::Parameter(c),
            CatCode::Superscript => Value::Superscript(c),
            CatCode::Subscript => Value::Subscript(c),
            CatCode::Space => Value::Space(c),
            CatCode::Letter => Value::Letter(c),
            CatCode::Other => Value::Other(c),
            CatCode::Active => Value::CommandRef(CommandRef::ActiveCharacter(c)),
            CatCode::Escape
            | CatCode::EndOfLine
            | CatCode::Ignored
            | CatCode::Comment
            | CatCode::Invalid => return None,
        })
    }
}

/// A TeX token.
///
/// Equality and hashing only consider the [Value]; two tokens with the same
///     category code and payload are equal wherever they came from.
#[derive(Debug, Eq, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Token {
    value: Value,
    trace_key: trace::Key,
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl std::hash::Hash for Token {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state)
    }
}

macro_rules! token_constructor {
    ($name: ident, $value: expr) => {
        pub fn $name(c: char, trace_key: trace::Key) -> Token {
            Token {
                value: $value(c),
                trace_key,
            }
        }
    };
}

impl Token {
    token_constructor!(new_begin_group, Value::BeginGroup);
    token_constructor!(new_end_group, Value::EndGroup);
    token_constructor!(new_math_shift, Value::MathShift);
    token_constructor!(new_alignment_tab, Value::AlignmentTab);
    token_constructor!(new_parameter, Value::Parameter);
    token_constructor!(new_superscript, Value::Superscript);
    token_constructor!(new_subscript, Value::Subscript);
    token_constructor!(new_space, Value::Space);
    token_constructor!(new_letter, Value::Letter);
    token_constructor!(new_other, Value::Other);

    pub fn new_active_character(c: char, trace_key: trace::Key) -> Token {
        Token {
            value: Value::CommandRef(CommandRef::ActiveCharacter(c)),
            trace_key,
        }
    }

    pub fn new_control_sequence(name: CsName, trace_key: trace::Key) -> Token {
        Token {
            value: Value::CommandRef(CommandRef::ControlSequence(name)),
            trace_key,
        }
    }

    pub fn new_command_ref(command_ref: CommandRef, trace_key: trace::Key) -> Token {
        Token {
            value: Value::CommandRef(command_ref),
            trace_key,
        }
    }

    pub fn new_from_value(value: Value, trace_key: trace::Key) -> Token {
        Token { value, trace_key }
    }

    #[inline]
    pub fn value(&self) -> Value {
        self.value
    }

    #[inline]
    pub fn trace_key(&self) -> trace::Key {
        self.trace_key
    }

    /// The command reference, if this is a control sequence or active character.
    #[inline]
    pub fn command_ref(&self) -> Option<CommandRef> {
        match self.value {
            Value::CommandRef(command_ref) => Some(command_ref),
            _ => None,
        }
    }

    /// The character payload; [None] for control sequences.
    pub fn char(&self) -> Option<char> {
        match self.value {
            Value::BeginGroup(c)
            | Value::EndGroup(c)
            | Value::MathShift(c)
            | Value::AlignmentTab(c)
            | Value::Parameter(c)
            | Value::Superscript(c)
            | Value::Subscript(c)
            | Value::Space(c)
            | Value::Letter(c)
            | Value::Other(c)
            | Value::CommandRef(CommandRef::ActiveCharacter(c)) => Some(c),
            Value::CommandRef(CommandRef::ControlSequence(_)) => None,
        }
    }

    /// The category code; [None] for control sequences.
    pub fn cat_code(&self) -> Option<CatCode> {
        Some(match self.value {
            Value::BeginGroup(_) => CatCode::BeginGroup,
            Value::EndGroup(_) => CatCode::EndGroup,
            Value::MathShift(_) => CatCode::MathShift,
            Value::AlignmentTab(_) => CatCode::AlignmentTab,
            Value::Parameter(_) => CatCode::Parameter,
            Value::Superscript(_) => CatCode::Superscript,
            Value::Subscript(_) => CatCode::Subscript,
            Value::Space(_) => CatCode::Space,
            Value::Letter(_) => CatCode::Letter,
            Value::Other(_) => CatCode::Other,
            Value::CommandRef(CommandRef::ActiveCharacter(_)) => CatCode::Active,
            Value::CommandRef(CommandRef::ControlSequence(_)) => return None,
        })
    }
}

/// Write tokens as TeX source.
///
/// A space is inserted after a control sequence whose name is made of letters
///     when the next token is a letter, so that the output lexes back to the same tokens
///     under the plainTeX category codes.
pub fn write_tokens<'a, T>(tokens: T, interner: &CsNameInterner) -> String
where
    T: IntoIterator<Item = &'a Token>,
{
    let mut s = String::new();
    let mut pending_word_separator = false;
    for token in tokens {
        match token.value {
            Value::CommandRef(CommandRef::ControlSequence(cs_name)) => {
                let name = interner.resolve(cs_name).unwrap_or("?");
                s.push('\\');
                s.push_str(name);
                pending_word_separator = name.chars().any(|c| c.is_alphabetic());
            }
            Value::Letter(c) => {
                if pending_word_separator {
                    s.push(' ');
                }
                s.push(c);
                pending_word_separator = false;
            }
            _ => {
                if let Some(c) = token.char() {
                    s.push(c);
                }
                pending_word_separator = false;
            }
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error;

    #[test]
    fn equality_ignores_trace_key() {
        let a = Token::new_letter('a', trace::Key::dummy());
        let b = Token::new_letter('a', trace::KeyRange::for_testing().next());
        assert_eq!(a, b);
        assert_ne!(a, Token::new_other('a', trace::Key::dummy()));
    }

    #[test]
    fn value_new_rejects_lexer_only_codes() {
        assert_eq!(Value::new('\\', CatCode::Escape), None);
        assert_eq!(Value::new('%', CatCode::Comment), None);
        assert_eq!(Value::new('x', CatCode::Letter), Some(Value::Letter('x')));
        assert_eq!(
            Value::new('~', CatCode::Active),
            Some(Value::CommandRef(CommandRef::ActiveCharacter('~')))
        );
    }

    #[test]
    fn write_tokens_separates_words() {
        let mut interner = CsNameInterner::default();
        let key = trace::Key::dummy();
        let tokens = vec![
            Token::new_control_sequence(interner.get_or_intern("hbox"), key),
            Token::new_letter('t', key),
            Token::new_letter('o', key),
            Token::new_control_sequence(interner.get_or_intern("{"), key),
            Token::new_letter('x', key),
            Token::new_space(' ', key),
            Token::new_begin_group('{', key),
        ];
        assert_eq!(write_tokens(&tokens, &interner), r"\hbox to\{x {");
    }

    #[test]
    fn token_size() {
        assert_eq!(std::mem::size_of::<Value>(), 8);
        assert_eq!(std::mem::size_of::<Token>(), 12);
        assert_eq!(std::mem::size_of::<Result<Token, Box<error::Error>>>(), 16);
    }
}
