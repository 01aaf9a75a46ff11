//! The TeX lexer, which turns characters into tokens.
//!
//! The lexer is "just in time": it produces one token per request.
//! Category codes can change between requests (e.g. through `\catcode`),
//!     so lexing a batch of tokens ahead of time would give the wrong answer.
//! For example in
//! ```tex
//! \catcode`\A=10 AB
//! ```
//! the `A` must be lexed as a space, and thus trimmed, only after `\catcode` has run.

use crate::token::trace;
use crate::token::CatCode;
use crate::token::CsNameInterner;
use crate::token::Token;

/// Error returned by the lexer.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The character has category code [CatCode::Invalid].
    InvalidCharacter(char, trace::Key),
}

/// Source of category codes for the lexer.
pub trait CatCodeFn {
    fn cat_code(&self, c: char) -> CatCode;
}

impl CatCodeFn for crate::token::CatCodeTable {
    fn cat_code(&self, c: char) -> CatCode {
        self.get(c)
    }
}

/// The Texlang lexer
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Lexer {
    raw_lexer: RawLexer,
    trim_next_whitespace: bool,
    #[cfg_attr(feature = "serde", serde(skip))]
    buffer: String,
}

impl Lexer {
    pub fn new(source_code: String, trace_key_range: trace::KeyRange) -> Lexer {
        Lexer {
            raw_lexer: RawLexer::new(source_code, trace_key_range),
            trim_next_whitespace: false,
            buffer: Default::default(),
        }
    }

    /// Return the next token, or [None] if the source code is exhausted.
    pub fn next<F: CatCodeFn>(
        &mut self,
        cat_code_fn: &F,
        cs_name_interner: &mut CsNameInterner,
    ) -> Result<Option<Token>, Error> {
        while let Some(raw_token) = self.raw_lexer.next(cat_code_fn) {
            let (c, key) = (raw_token.char, raw_token.trace_key);
            let token = match raw_token.code {
                CatCode::Escape => {
                    let (cs_name, is_word) = self.read_control_sequence(cat_code_fn, cs_name_interner);
                    self.trim_next_whitespace = is_word;
                    return Ok(Some(Token::new_control_sequence(cs_name, key)));
                }
                CatCode::EndOfLine | CatCode::Space => {
                    let mut num_new_lines = self.consume_whitespace(cat_code_fn);
                    if raw_token.code == CatCode::EndOfLine {
                        num_new_lines += 1;
                    }
                    if num_new_lines >= 2 {
                        self.trim_next_whitespace = false;
                        return Ok(Some(Token::new_control_sequence(
                            cs_name_interner.get_or_intern("par"),
                            key,
                        )));
                    }
                    if self.trim_next_whitespace {
                        continue;
                    }
                    Token::new_space(c, key)
                }
                CatCode::Superscript => {
                    if self.raw_lexer.maybe_apply_caret_notation(c, true) {
                        continue;
                    }
                    Token::new_superscript(c, key)
                }
                CatCode::Comment => {
                    while let Some(next) = self.raw_lexer.peek(cat_code_fn) {
                        if next.code == CatCode::EndOfLine {
                            break;
                        }
                        self.raw_lexer.advance();
                    }
                    // The end of line that finishes the comment does not produce a space.
                    self.trim_next_whitespace = true;
                    continue;
                }
                CatCode::Ignored => continue,
                CatCode::Invalid => return Err(Error::InvalidCharacter(c, key)),
                CatCode::BeginGroup => Token::new_begin_group(c, key),
                CatCode::EndGroup => Token::new_end_group(c, key),
                CatCode::MathShift => Token::new_math_shift(c, key),
                CatCode::AlignmentTab => Token::new_alignment_tab(c, key),
                CatCode::Parameter => Token::new_parameter(c, key),
                CatCode::Subscript => Token::new_subscript(c, key),
                CatCode::Letter => Token::new_letter(c, key),
                CatCode::Other => Token::new_other(c, key),
                CatCode::Active => Token::new_active_character(c, key),
            };
            self.trim_next_whitespace = false;
            return Ok(Some(token));
        }
        Ok(None)
    }

    // Returns the number of end of line characters consumed.
    fn consume_whitespace<F: CatCodeFn>(&mut self, cat_code_fn: &F) -> usize {
        let mut num_new_lines: usize = 0;
        while let Some(raw_token) = self.raw_lexer.peek(cat_code_fn) {
            match raw_token.code {
                CatCode::EndOfLine => num_new_lines += 1,
                CatCode::Space => {}
                _ => break,
            }
            self.raw_lexer.advance();
        }
        num_new_lines
    }

    // Returns the name and whether it is a control word (made of letters).
    fn read_control_sequence<F: CatCodeFn>(
        &mut self,
        cat_code_fn: &F,
        cs_name_interner: &mut CsNameInterner,
    ) -> (crate::token::CsName, bool) {
        self.buffer.clear();
        let mut is_word = false;
        loop {
            let Some(first) = self.raw_lexer.next(cat_code_fn) else {
                // An escape character at the very end of the input.
                break;
            };
            match first.code {
                CatCode::Superscript
                    if self.raw_lexer.maybe_apply_caret_notation(first.char, true) =>
                {
                    continue;
                }
                CatCode::Letter => {
                    is_word = true;
                    self.buffer.push(first.char);
                    while let Some(raw_token) = self.raw_lexer.peek(cat_code_fn) {
                        match raw_token.code {
                            CatCode::Letter => {
                                self.raw_lexer.advance();
                                self.buffer.push(raw_token.char);
                            }
                            CatCode::Superscript
                                if self
                                    .raw_lexer
                                    .maybe_apply_caret_notation(raw_token.char, false) => {}
                            _ => break,
                        }
                    }
                }
                // A control space skips following spaces, like a control word.
                CatCode::Space => {
                    is_word = true;
                    self.buffer.push(first.char);
                }
                _ => {
                    self.buffer.push(first.char);
                }
            }
            break;
        }
        (cs_name_interner.get_or_intern(&self.buffer), is_word)
    }
}

struct RawToken {
    code: CatCode,
    char: char,
    trace_key: trace::Key,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct RawLexer {
    source_code: String,
    pos: usize,
    trace_key_range: trace::KeyRange,
    // Character produced by caret notation (`^^M` and friends) that has not been read yet.
    substitute: Option<(char, trace::Key)>,
}

impl RawLexer {
    fn new(source_code: String, trace_key_range: trace::KeyRange) -> RawLexer {
        RawLexer {
            source_code,
            pos: 0,
            trace_key_range,
            substitute: None,
        }
    }

    fn peek_char(&self) -> Option<(char, trace::Key)> {
        if let Some(substitute) = self.substitute {
            return Some(substitute);
        }
        let c = self.source_code[self.pos..].chars().next()?;
        Some((c, self.trace_key_range.peek()))
    }

    fn upcoming(&self, n: usize) -> Option<char> {
        self.substitute
            .map(|(c, _)| c)
            .into_iter()
            .chain(self.source_code[self.pos..].chars())
            .nth(n)
    }

    fn advance(&mut self) {
        if self.substitute.take().is_some() {
            return;
        }
        if let Some(c) = self.source_code[self.pos..].chars().next() {
            self.pos += c.len_utf8();
            self.trace_key_range.next();
        }
    }

    fn next<F: CatCodeFn>(&mut self, cat_code_fn: &F) -> Option<RawToken> {
        let raw_token = self.peek(cat_code_fn)?;
        self.advance();
        Some(raw_token)
    }

    fn peek<F: CatCodeFn>(&self, cat_code_fn: &F) -> Option<RawToken> {
        let (c, trace_key) = self.peek_char()?;
        Some(RawToken {
            code: cat_code_fn.cat_code(c),
            char: c,
            trace_key,
        })
    }

    /// Apply TeX's `^^` notation if the input is at `^^X`, where `^` is the provided
    ///     superscript character and `X` is ASCII.
    ///
    /// `first_consumed` says whether the first `^` has already been read.
    /// On success the three characters are consumed and replaced by a single character
    ///     that will be returned by the next read.
    fn maybe_apply_caret_notation(&mut self, first: char, first_consumed: bool) -> bool {
        let offset = if first_consumed { 0 } else { 1 };
        if self.upcoming(offset) != Some(first) {
            return false;
        }
        let Some(x) = self.upcoming(offset + 1) else {
            // TeX does not transform if the input ends after `^^`; TeXBook section 355.
            return false;
        };
        if !x.is_ascii() {
            return false;
        }
        let trace_key = match self.peek_char() {
            Some((_, key)) => key,
            None => return false,
        };
        for _ in 0..offset + 2 {
            self.advance();
        }
        let u = x as u8;
        let m = if u < 0x40 { u + 0x40 } else { u - 0x40 };
        self.substitute = Some((m as char, trace_key));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::CatCode::*;
    use crate::token::CatCodeTable;
    use crate::token::Value;

    enum Expected {
        Character(char, CatCode),
        ControlSequence(&'static str),
    }
    use Expected::Character;
    use Expected::ControlSequence;

    fn lexer_test(input: &str, expected: Vec<Expected>) {
        let mut table = CatCodeTable::plain_tex();
        table.set('X', EndOfLine);
        table.set('Y', Space);
        table.set('Z', Ignored);
        let mut lexer = Lexer::new(input.into(), trace::KeyRange::for_testing());
        let mut interner: CsNameInterner = Default::default();
        let mut actual = Vec::new();
        while let Some(t) = lexer.next(&table, &mut interner).unwrap() {
            actual.push(t.value());
        }
        let expected: Vec<Value> = expected
            .into_iter()
            .map(|e| match e {
                ControlSequence(name) => Token::new_control_sequence(
                    interner.get_or_intern(name),
                    trace::Key::dummy(),
                )
                .value(),
                Character(c, code) => Value::new(c, code).unwrap(),
            })
            .collect();
        assert_eq!(expected, actual);
    }

    macro_rules! lexer_tests {
        ($( ( $name: ident, $input: expr, $ ( $expected_token : expr, ) * ), )+) => {
            $(
            #[test]
            fn $name() {
                lexer_test($input, vec!( $( $expected_token ),* ));
            }
            )+
        };
    }

    lexer_tests![
        (
            control_word_then_group,
            r"\a{b}",
            ControlSequence("a"),
            Character('{', BeginGroup),
            Character('b', Letter),
            Character('}', EndGroup),
        ),
        (
            spaces_after_control_word_are_skipped,
            "\\a  b",
            ControlSequence("a"),
            Character('b', Letter),
        ),
        (
            newline_after_control_word_is_skipped,
            "\\a\n b",
            ControlSequence("a"),
            Character('b', Letter),
        ),
        (
            control_symbol_keeps_following_space,
            "\\{ A",
            ControlSequence("{"),
            Character(' ', Space),
            Character('A', Letter),
        ),
        (
            control_space_skips_following_spaces,
            "\\  A",
            ControlSequence(" "),
            Character('A', Letter),
        ),
        (
            control_word_ends_at_non_letter,
            "\\greet1",
            ControlSequence("greet"),
            Character('1', Other),
        ),
        (
            escape_at_end_of_input,
            "a\\",
            Character('a', Letter),
            ControlSequence(""),
        ),
        (
            comment_is_dropped,
            "A%a comment here\nC",
            Character('A', Letter),
            Character('C', Letter),
        ),
        (comment_at_end, "A%a comment here", Character('A', Letter),),
        (
            comment_then_blank_line_is_par,
            "A%\n\n B",
            Character('A', Letter),
            ControlSequence("par"),
            Character('B', Letter),
        ),
        (
            double_space_creates_one_space,
            "A  B",
            Character('A', Letter),
            Character(' ', Space),
            Character('B', Letter),
        ),
        (
            single_newline_creates_one_space,
            "A\nB",
            Character('A', Letter),
            Character('\n', Space),
            Character('B', Letter),
        ),
        (
            double_newline_creates_par,
            "A\n\nB",
            Character('A', Letter),
            ControlSequence("par"),
            Character('B', Letter),
        ),
        (
            newline_space_newline_creates_par,
            "A\n \nB",
            Character('A', Letter),
            ControlSequence("par"),
            Character('B', Letter),
        ),
        (
            custom_space_character,
            "AYB",
            Character('A', Letter),
            Character('Y', Space),
            Character('B', Letter),
        ),
        (
            custom_end_of_line_character,
            "AXB",
            Character('A', Letter),
            Character('X', Space),
            Character('B', Letter),
        ),
        (ignored_character, "Z",),
        (caret_notation_subtracts, "^^k", Character('+', Other),),
        (caret_notation_adds, "^^+", Character('k', Letter),),
        (
            caret_notation_at_end_of_input,
            "^^",
            Character('^', Superscript),
            Character('^', Superscript),
        ),
        (caret_notation_in_control_word, "\\a^^-", ControlSequence("am"),),
        (caret_notation_starts_control_word, "\\^^-a", ControlSequence("ma"),),
        (
            caret_notation_control_symbol,
            "\\^^ma",
            ControlSequence("-"),
            Character('a', Letter),
        ),
        (
            single_caret_in_control_word,
            "\\a^a",
            ControlSequence("a"),
            Character('^', Superscript),
            Character('a', Letter),
        ),
    ];

    #[test]
    fn invalid_character() {
        let table = CatCodeTable::plain_tex();
        let mut lexer = Lexer::new("a\u{7F}".into(), trace::KeyRange::for_testing());
        let mut interner: CsNameInterner = Default::default();
        assert!(lexer.next(&table, &mut interner).unwrap().is_some());
        assert!(matches!(
            lexer.next(&table, &mut interner),
            Err(Error::InvalidCharacter('\u{7F}', _))
        ));
    }

    #[test]
    fn category_codes_are_read_just_in_time() {
        let mut table = CatCodeTable::plain_tex();
        let mut lexer = Lexer::new("ab".into(), trace::KeyRange::for_testing());
        let mut interner: CsNameInterner = Default::default();
        let a = lexer.next(&table, &mut interner).unwrap().unwrap();
        assert_eq!(a.value(), Value::Letter('a'));
        table.set('b', Other);
        let b = lexer.next(&table, &mut interner).unwrap().unwrap();
        assert_eq!(b.value(), Value::Other('b'));
    }
}
