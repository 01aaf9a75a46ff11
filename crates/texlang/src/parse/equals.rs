use crate::prelude as txl;
use crate::traits::*;
use crate::*;

/// When parsed, this type consumes spaces and then an optional equals sign from the expanded stream.
///
/// Corresponds to the `scan_optional_equals` procedure in Knuth's TeX (405).
#[derive(Debug, PartialEq, Eq)]
pub struct OptionalEquals;

impl<S: TexlangState> Parsable<S> for OptionalEquals {
    fn parse_impl(input: &mut vm::ExpandedStream<S>) -> txl::Result<Self> {
        while let Some(found_equals) = get_optional_element![
            input,
            token::Value::Other('=') => true,
            token::Value::Space(_) => false,
        ] {
            if found_equals {
                break;
            }
        }
        Ok(OptionalEquals {})
    }
}

/// When parsed, this type consumes the optional equals sign of a `\let` assignment without performing expansion.
///
/// Spaces are skipped, then an optional equals sign is consumed.
/// If there was an equals sign, at most one space after it is consumed too.
#[derive(Debug, PartialEq, Eq)]
pub struct OptionalEqualsUnexpanded;

impl<S: TexlangState> Parsable<S> for OptionalEqualsUnexpanded {
    fn parse_impl(input: &mut vm::ExpandedStream<S>) -> txl::Result<Self> {
        let input = input.unexpanded();
        while let Some(found_equals) = get_optional_element![
            input,
            token::Value::Other('=') => true,
            token::Value::Space(_) => false,
        ] {
            if found_equals {
                get_optional_element![
                    input,
                    token::Value::Space(_) => (),
                ];
                break;
            }
        }
        Ok(OptionalEqualsUnexpanded {})
    }
}
