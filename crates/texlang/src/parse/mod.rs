//! Logic for parsing elements of the TeX grammar from token streams.
//!
//! This parsing module is based around the [Parsable] trait, which is the most important type in the module.
//! This trait is implemented by Rust types that correspond to elements of the TeX grammar.
//! The trait implementation provides a way to parse grammar elements out of the input stream.
//!
//! The module contains implementations of [Parsable] for tuples where each element is parsable.
//! This allows expressions like `<control sequence><optional equals>` to be parsed by one invocation
//!     of [Parsable::parse], in this case on the type `(token::CommandRef, OptionalEqualsUnexpanded)`.
//!
//! Finally this module contains some functions for special situation like parsing lists of tokens.

#[macro_use]
mod helpers;

mod equals;
mod number;
#[cfg(test)]
mod testing;

pub use equals::OptionalEquals;
pub use equals::OptionalEqualsUnexpanded;
pub use helpers::next_or_end_of_input;
pub use number::Uint;

use crate::error;
use crate::prelude as txl;
use crate::token;
use crate::token::trace;
use crate::traits::*;
use crate::vm;

/// Implementations of this trait are elements of the TeX grammar than can be parsed from a stream of tokens.
pub trait Parsable<S: TexlangState>: Sized {
    /// Parses a value from an input stream.
    ///
    /// This method just delegates to [Parsable::parse_impl].
    #[inline]
    fn parse<I>(input: &mut I) -> txl::Result<Self>
    where
        I: AsMut<vm::ExpandedStream<S>>,
    {
        Parsable::parse_impl(input.as_mut())
    }

    /// Parses a value from the [vm::ExpandedStream].
    fn parse_impl(input: &mut vm::ExpandedStream<S>) -> txl::Result<Self>;
}

/// Error returned when the input does not contain the expected grammar element.
#[derive(Debug)]
pub struct Error {
    pub code: error::Code,
    pub expected: String,
    pub got: trace::SourceCodeTrace,
    pub got_override: String,
    pub annotation_override: String,
    pub guidance: String,
}

impl error::TexError for Error {
    fn code(&self) -> error::Code {
        self.code
    }

    fn kind(&self) -> error::Kind {
        match self.got.token {
            None => error::Kind::EndOfInput(&self.got),
            Some(_) => error::Kind::Token(&self.got),
        }
    }

    fn title(&self) -> String {
        let got = if self.got_override.is_empty() {
            match self.got.token {
                None => "the input ended".to_string(),
                Some(token) => match token.value() {
                    token::Value::Letter(c) => format!["found the letter {c}"],
                    token::Value::Other(c) => format!["found a non-letter character {c}"],
                    _ => match (token.char(), token.cat_code()) {
                        (Some(c), Some(code)) => {
                            format!["found a token with value {c} and category code {code}"]
                        }
                        _ => format!("found the control sequence {}", self.got.value),
                    },
                },
            }
        } else {
            self.got_override.clone()
        };
        format!["expected {}, instead {}", self.expected, got]
    }

    fn notes(&self) -> Vec<error::display::Note> {
        if self.guidance.is_empty() {
            return vec![];
        }
        vec![self.guidance.clone().into()]
    }

    fn source_annotation(&self) -> String {
        if !self.annotation_override.is_empty() {
            return self.annotation_override.clone();
        }
        error::TexError::default_source_annotation(self)
    }
}

impl Error {
    pub fn new<S, T: Into<String>, R: Into<String>>(
        vm: &vm::VM<S>,
        expected: T,
        got: Option<token::Token>,
        guidance: R,
    ) -> Self {
        let (code, got) = match got {
            None => (error::Code::UnexpectedEndOfInput, vm.trace_end_of_input()),
            Some(token) => (error::Code::UnexpectedToken, vm.trace(token)),
        };
        Error {
            code,
            expected: expected.into(),
            got,
            got_override: "".into(),
            annotation_override: "".into(),
            guidance: guidance.into(),
        }
    }

    pub fn with_code(mut self, code: error::Code) -> Self {
        self.code = code;
        self
    }

    pub fn with_got_override<T: Into<String>>(mut self, got_override: T) -> Self {
        self.got_override = got_override.into();
        self
    }

    pub fn with_annotation_override<T: Into<String>>(mut self, annotation_override: T) -> Self {
        self.annotation_override = annotation_override.into();
        self
    }
}

macro_rules! generate_tuple_impls {
    ( $first: ident ) => {};
    ( $first: ident, $( $name: ident ),+ ) => {
        generate_tuple_impls![ $( $name ),+];

        impl<S: TexlangState, $first : Parsable<S>, $( $name : Parsable<S> ),+> Parsable<S> for ($first, $( $name ),+) {
            fn parse_impl(input: &mut vm::ExpandedStream<S>) -> txl::Result<Self> {
                Ok(($first::parse(input)?, $( $name::parse(input)? ),+))
            }
        }
    };
}

generate_tuple_impls![T1, T2, T3, T4];

/// Parses the target of an assignment like `\def` or `\let`.
///
/// Leading spaces are skipped and the input is not expanded.
impl<S: TexlangState> Parsable<S> for token::CommandRef {
    fn parse_impl(input: &mut vm::ExpandedStream<S>) -> txl::Result<Self> {
        let token = next_non_space_unexpanded(input.unexpanded())?;
        match token {
            Some(token) => match token.command_ref() {
                Some(command_ref) => Ok(command_ref),
                None => Err(Error::new(
                    input.vm(),
                    "a control sequence or active character",
                    Some(token),
                    "a command must be a control sequence or an active character",
                )
                .into()),
            },
            None => Err(Error::new(
                input.vm(),
                "a control sequence or active character",
                None,
                "a command must be a control sequence or an active character",
            )
            .into()),
        }
    }
}

/// Returns the next token that is not a space, without performing expansion.
pub fn next_non_space_unexpanded<S: TexlangState>(
    stream: &mut vm::UnexpandedStream<S>,
) -> txl::Result<Option<token::Token>> {
    while let Some(token) = stream.next()? {
        if !matches!(token.value(), token::Value::Space(_)) {
            return Ok(Some(token));
        }
    }
    Ok(None)
}

/// Peeks at the next token that is not a space, without performing expansion.
///
/// Spaces before the token are consumed.
pub fn peek_non_space_unexpanded<S: TexlangState>(
    stream: &mut vm::UnexpandedStream<S>,
) -> txl::Result<Option<token::Token>> {
    match next_non_space_unexpanded(stream)? {
        None => Ok(None),
        Some(token) => {
            stream.back(token);
            Ok(Some(token))
        }
    }
}

/// Parses balanced tokens from the stream.
///
/// The opening brace is assumed to have been consumed already.
/// The closing brace is consumed but not added to the result.
/// Returns false if the input ended before balanced tokens completed.
pub fn parse_balanced_tokens<S: TokenStream>(
    stream: &mut S,
    result: &mut Vec<token::Token>,
) -> txl::Result<bool> {
    let mut scope_depth = 0;
    while let Some(token) = stream.next()? {
        match token.value() {
            token::Value::BeginGroup(_) => {
                scope_depth += 1;
            }
            token::Value::EndGroup(_) => {
                if scope_depth == 0 {
                    return Ok(true);
                }
                scope_depth -= 1;
            }
            _ => (),
        }
        result.push(token);
    }
    Ok(false)
}
