//! Category codes and category code tables.
use std::collections::HashMap;

use CatCode::*;

/// The 16 category codes of TeX.
///
/// Each variant's documentation gives a character that has that category code in plainTeX.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CatCode {
    /// Starts a control sequence name. Example: `\`.
    ///
    /// Never seen outside of the lexer.
    Escape = 0,
    /// Opens a group. Example: `{`.
    BeginGroup = 1,
    /// Closes a group. Example: `}`.
    EndGroup = 2,
    /// Example: `$`.
    MathShift = 3,
    /// Example: `&`.
    AlignmentTab = 4,
    /// Marks the end of a line in the input. Example: `\n`.
    ///
    /// Behaves like [Space], except that two or more end of lines in a row
    ///     (ignoring intervening spaces) produce a `\par` control sequence,
    ///     and an end of line terminates a [Comment].
    ///
    /// Never seen outside of the lexer.
    EndOfLine = 5,
    /// Introduces a macro parameter. Example: `#`.
    Parameter = 6,
    /// Example: `^`.
    Superscript = 7,
    /// Example: `_`.
    Subscript = 8,
    /// Dropped by the lexer. Example: ASCII null.
    Ignored = 9,
    /// Example: ` `.
    Space = 10,
    /// May appear in multi-character control sequence names. Examples: `[a-zA-Z]`.
    Letter = 11,
    /// Every other character. Example: `@`.
    #[default]
    Other = 12,
    /// A single character that is looked up like a control sequence. Example: `~`.
    Active = 13,
    /// Starts a comment that runs to the end of the line. Example: `%`.
    ///
    /// Never seen outside of the lexer.
    Comment = 14,
    /// Rejected by the lexer. Example: ASCII delete.
    Invalid = 15,
}

/// Error returned when converting an integer outside of the range 0..=15 to a [CatCode].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedCatCode(pub i64);

impl std::fmt::Display for MalformedCatCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} is not a category code; valid codes are 0 through 15", self.0)
    }
}

impl TryFrom<i64> for CatCode {
    type Error = MalformedCatCode;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Escape,
            1 => BeginGroup,
            2 => EndGroup,
            3 => MathShift,
            4 => AlignmentTab,
            5 => EndOfLine,
            6 => Parameter,
            7 => Superscript,
            8 => Subscript,
            9 => Ignored,
            10 => Space,
            11 => Letter,
            12 => Other,
            13 => Active,
            14 => Comment,
            15 => Invalid,
            _ => return Err(MalformedCatCode(value)),
        })
    }
}

impl TryFrom<u8> for CatCode {
    type Error = MalformedCatCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        CatCode::try_from(value as i64)
    }
}

impl std::fmt::Display for CatCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({})", self, *self as u8)
    }
}

impl CatCode {
    /// The category code that INITEX assigns to the character.
    ///
    /// See section 232 of "TeX: the program" and p343 of the TeXBook.
    pub fn initex_default(c: char) -> CatCode {
        match c {
            '\\' => Escape,
            '\r' | '\n' => EndOfLine,
            ' ' => Space,
            '%' => Comment,
            '\0' => Ignored,
            '\u{7F}' => Invalid,
            'a'..='z' | 'A'..='Z' => Letter,
            _ => Other,
        }
    }

    /// The category code that plainTeX assigns to the character.
    pub fn plain_tex_default(c: char) -> CatCode {
        match c {
            '{' => BeginGroup,
            '}' => EndGroup,
            '$' => MathShift,
            '&' => AlignmentTab,
            '#' => Parameter,
            '^' => Superscript,
            '_' => Subscript,
            '\t' => Space,
            '~' | '\u{0C}' => Active,
            _ => CatCode::initex_default(c),
        }
    }
}

/// A mutable mapping from characters to category codes.
///
/// Characters that have never been assigned have category code [Other].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CatCodeTable {
    low: Vec<CatCode>,
    high: HashMap<char, CatCode>,
}

const LOW_SIZE: usize = 128;

impl Default for CatCodeTable {
    fn default() -> Self {
        CatCodeTable {
            low: vec![Other; LOW_SIZE],
            high: Default::default(),
        }
    }
}

impl CatCodeTable {
    /// A table populated with the INITEX defaults.
    pub fn initex() -> CatCodeTable {
        Self::from_fn(CatCode::initex_default)
    }

    /// A table populated with the plainTeX defaults.
    pub fn plain_tex() -> CatCodeTable {
        Self::from_fn(CatCode::plain_tex_default)
    }

    fn from_fn(f: fn(char) -> CatCode) -> CatCodeTable {
        CatCodeTable {
            low: (0..LOW_SIZE as u8).map(|u| f(u as char)).collect(),
            high: Default::default(),
        }
    }

    #[inline]
    pub fn get(&self, c: char) -> CatCode {
        match self.low.get(c as usize) {
            Some(code) => *code,
            None => self.high.get(&c).copied().unwrap_or_default(),
        }
    }

    /// Set the category code of the character, returning the previous code.
    pub fn set(&mut self, c: char, code: CatCode) -> CatCode {
        match self.low.get_mut(c as usize) {
            Some(slot) => std::mem::replace(slot, code),
            None => self.high.insert(c, code).unwrap_or_default(),
        }
    }
}
