use crate::error;
use crate::prelude as txl;
use crate::token::Token;
use crate::traits::*;

/// Returns the next token in the stream, or an end of input error if the stream is exhausted.
///
/// The string `doing` completes the sentence "the input ended while ...".
pub fn next_or_end_of_input<I: TokenStream>(input: &mut I, doing: &str) -> txl::Result<Token> {
    match input.next()? {
        Some(token) => Ok(token),
        None => Err(error::SimpleEndOfInputError::new(
            input.vm(),
            format!["the input ended while {doing}"],
        )
        .into()),
    }
}

macro_rules! get_optional_element {
    ($stream :expr, $($pat:pat => $result:expr,)+) => {
        match ($stream).next()? {
            None => None,
            Some(token) => match token.value() {
                 $(
                     $pat => Some($result),
                 )+
                 _ => {
                    $stream.back(token);
                    None
                 }
            }
        }
    };
}

macro_rules! get_optional_element_with_token {
    ($stream :expr, $($pat:pat => $result:expr,)+) => {
       match ($stream).next()? {
            None => None,
            Some(token) => match token.value() {
                 $(
                     $pat => {
                        Some(($result, token))
                    },
                 )+
                 _ => {
                    $stream.back(token);
                    None
                 },
            }
        }
    };
}
