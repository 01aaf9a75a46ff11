//! Number parsing.
//!
//! The number may be octal, decimal, hexadecimal or cast from a character token.
//! The full definition of a number in the TeX grammar is given in chapter 24 of the TeXBook.

use crate::prelude as txl;
use crate::token::Value;
use crate::traits::*;
use crate::*;

impl<S: TexlangState> Parsable<S> for i32 {
    fn parse_impl(input: &mut vm::ExpandedStream<S>) -> txl::Result<Self> {
        let (_, i): (token::Token, i32) = parse_number_internal(input)?;
        Ok(i)
    }
}

/// An integer in the range `[0, N)`.
#[derive(Debug, PartialEq, Eq, Default)]
pub struct Uint<const N: usize>(pub usize);

impl<S: TexlangState, const N: usize> Parsable<S> for Uint<N> {
    fn parse_impl(input: &mut vm::ExpandedStream<S>) -> txl::Result<Self> {
        let (first_token, i): (token::Token, i32) = parse_number_internal(input)?;
        match usize::try_from(i) {
            Ok(u) if u < N => Ok(Uint(u)),
            _ => Err(parse::Error::new(
                input.vm(),
                format!["an integer in the range [0, {})", N],
                Some(first_token),
                "",
            )
            .with_got_override(format!["got {i}"])
            .with_annotation_override("this is where the number started")
            .into()),
        }
    }
}

/// Parses a character code, like the first argument of `\catcode`.
impl<S: TexlangState> Parsable<S> for char {
    fn parse_impl(input: &mut vm::ExpandedStream<S>) -> txl::Result<Self> {
        let (first_token, i): (token::Token, i32) = parse_number_internal(input)?;
        match u32::try_from(i).ok().and_then(char::from_u32) {
            Some(c) => Ok(c),
            None => Err(parse::Error::new(
                input.vm(),
                "a character code",
                Some(first_token),
                "a character code is a non-negative integer corresponding to a Unicode scalar value",
            )
            .with_got_override(format!["got {i}"])
            .with_annotation_override("this is where the number started")
            .into()),
        }
    }
}

impl<S: TexlangState> Parsable<S> for token::CatCode {
    fn parse_impl(input: &mut vm::ExpandedStream<S>) -> txl::Result<Self> {
        let (first_token, i): (token::Token, i32) = parse_number_internal(input)?;
        match token::CatCode::try_from(i as i64) {
            Ok(cat_code) => Ok(cat_code),
            Err(_) => Err(parse::Error::new(
                input.vm(),
                "a category code number (an integer in the range [0, 15])",
                Some(first_token),
                "",
            )
            .with_code(error::Code::MalformedCategory)
            .with_got_override(format!["got the integer {i}"])
            .with_annotation_override("this is where the number started")
            .into()),
        }
    }
}

const GUIDANCE_BEGINNING: &str =
    "a number begins with zero or more minus signs followed by one of the following:
- A decimal digit (0-9), which begins a decimal number.
- The character ', which indicates the beginning of an octal number
- The character \", which indicates the beginning of a hexadecimal number
- The character `, followed by a character token. The character is converted into its Unicode number.
";

fn parse_number_internal<S: TexlangState>(
    stream: &mut vm::ExpandedStream<S>,
) -> txl::Result<(token::Token, i32)> {
    let sign = parse_optional_signs(stream)?;
    let first_token = parse::next_or_end_of_input(stream, "parsing a number")?;
    let result: i32 = match first_token.value() {
        Value::Other(c @ '0'..='9') => parse_constant::<S, 10>(stream, c as i32 - '0' as i32)?,
        Value::Other('\'') => parse_constant::<S, 8>(stream, 0)?,
        Value::Other('"') => parse_constant::<S, 16>(stream, 0)?,
        Value::Other('`') => parse_character(stream)?,
        _ => {
            let annotation = match first_token.command_ref() {
                None => String::new(),
                Some(command_ref) => match stream.commands_map().get_command(&command_ref) {
                    None => "undefined control sequence".to_string(),
                    Some(cmd) => format!["control sequence referencing {cmd}"],
                },
            };
            let err = parse::Error::new(
                stream.vm(),
                "the beginning of a number",
                Some(first_token),
                GUIDANCE_BEGINNING,
            )
            .with_annotation_override(annotation);
            return Err(err.into());
        }
    };
    get_optional_element![stream, Value::Space(_) => (),];
    let result = match sign {
        None => result,
        // The only i32 that is not safe to multiply by -1 is i32::MIN.
        // Experimentally we observe in this case that TeX wraps and the result
        // is i32::MIN again.
        Some(_) => result.wrapping_mul(-1),
    };
    Ok((first_token, result))
}

/// Parses optional signs and spaces.
///
/// If the combination of the signs is positive, [None] is returned.
/// Otherwise, the Token corresponding to the last negative sign is returned.
fn parse_optional_signs<S: TexlangState>(
    stream: &mut vm::ExpandedStream<S>,
) -> txl::Result<Option<token::Token>> {
    let mut result = None;
    while let Some((sign, token)) = get_optional_element_with_token![
        stream,
        Value::Other('+') => true,
        Value::Other('-') => false,
        Value::Space(_) => true,
    ] {
        result = match (result, sign) {
            (None, false) => Some(token),
            (Some(_), false) => None,
            (result, true) => result,
        };
    }
    Ok(result)
}

// TeX.2021.442
fn parse_character<S: TexlangState>(input: &mut vm::ExpandedStream<S>) -> txl::Result<i32> {
    let token = parse::next_or_end_of_input(input.unexpanded(), "parsing a character")?;
    let c = match token.value() {
        Value::CommandRef(token::CommandRef::ControlSequence(cs_name)) => {
            let name = input
                .vm()
                .cs_name_interner()
                .resolve(cs_name)
                .unwrap_or_default();
            let mut iter = name.chars();
            match (iter.next(), iter.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(parse::Error::new(
                        input.vm(),
                        "a character",
                        Some(token),
                        r"a character is a character token or single-character control sequence like \a",
                    )
                    .into())
                }
            }
        }
        Value::CommandRef(token::CommandRef::ActiveCharacter(c)) => c,
        _ => token.char().unwrap_or_default(),
    };
    Ok(c as i32)
}

fn parse_constant<S: TexlangState, const RADIX: i32>(
    stream: &mut vm::ExpandedStream<S>,
    mut result: i32,
) -> txl::Result<i32> {
    let mut started = RADIX == 10;
    loop {
        let next = match stream.next()? {
            None => break,
            Some(next) => next,
        };
        let lsd_or = match next.value() {
            token::Value::Other(c) => {
                let d = (c as u32).wrapping_sub('0' as u32);
                if d < 10 && d < (RADIX as u32) {
                    Some(d as i32)
                } else if RADIX == 16 {
                    let d = (c as u32).wrapping_sub('A' as u32);
                    if d < 6 {
                        Some(d as i32 + 10)
                    } else {
                        None
                    }
                } else {
                    None
                }
            }
            token::Value::Letter(c) => {
                let d = (c as u32).wrapping_sub('A' as u32);
                if RADIX == 16 && d < 6 {
                    Some(d as i32 + 10)
                } else {
                    None
                }
            }
            _ => None,
        };
        let lsd = match lsd_or {
            None => {
                stream.back(next);
                break;
            }
            Some(lsd) => lsd,
        };
        started = true;
        result = match add_lsd::<RADIX>(result, lsd) {
            Some(n) => n,
            None => return Err(add_lsd_error::<S, RADIX>(stream.vm(), next, result, lsd).into()),
        }
    }
    if !started {
        let (expected, guidance) = match RADIX {
            8 => {
                ("an octal digit",
                "an octal digit is a token with value 0-7 and category other")
            },
            _ => {
                ("a hexadecimal digit",
                "a hexadecimal digit is either:\n- A character token with value 0-9 and category other, or\n- A character token with value A-F and category letter or other")
            }
        };
        let got = stream.peek()?.copied();
        return Err(parse::Error::new(stream.vm(), expected, got, guidance).into());
    }
    Ok(result)
}

fn add_lsd<const RADIX: i32>(n: i32, lsd: i32) -> Option<i32> {
    match n.checked_mul(RADIX) {
        None => None,
        Some(n) => n.checked_add(lsd),
    }
}

fn add_lsd_error<S, const RADIX: i32>(
    vm: &vm::VM<S>,
    token: token::Token,
    n: i32,
    lsd: i32,
) -> parse::Error {
    let (got, range) = match RADIX {
        8 => (
            format!["got '{n:o}{lsd:o}"],
            format!["'{:o}, '{:o}", i32::MIN, i32::MAX],
        ),
        16 => (
            format!["got 0x{n:X}{lsd:X}"],
            format!["0x{:X}, 0x{:X}", i32::MIN, i32::MAX],
        ),
        _ => (
            format!["got {n}{lsd}"],
            format!["{}, {}", i32::MIN, i32::MAX],
        ),
    };
    parse::Error::new(vm, format!["a number in the range [{range}]"], Some(token), "")
        .with_got_override(got)
        .with_annotation_override("this digit makes the number too big")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::testing::*;

    parse_success_tests![
        (octal_0, "'0", 0),
        (octal_7, "'7", 7),
        (octal_8, "'10", 8),
        (octal_129, "'201", 129),
        (octal_max, "'17777777777", 2147483647),
        (octal_min, "-'17777777777", -2147483647),
        (decimal_0, "0", 0),
        (decimal_9, "9", 9),
        (decimal_10, "10", 10),
        (decimal_1_with_0_padding, "00019", 19),
        (decimal_201, "201", 201),
        (decimal_max, "2147483647", 2147483647),
        (decimal_min, "-2147483647", -2147483647),
        (hexadecimal_0, "\"0", 0),
        (hexadecimal_9, "\"9", 9),
        (hexadecimal_10, "\"A", 10),
        (hexadecimal_15, "\"F", 15),
        (hexadecimal_16, "\"10", 16),
        (hexadecimal_31, "\"1F", 31),
        (hexadecimal_513, "\"201", 513),
        (hexadecimal_max, "\"7FFFFFFF", 2147483647),
        (hexadecimal_min, "-\"7FFFFFFF", -2147483647),
        (number_from_character, "`A", 65),
        (number_from_length_1_control_sequence, r"`\A", 65),
        (number_from_character_non_ascii, "`ö", 0x00F6),
        (number_from_length_1_control_sequence_non_ascii, r"`\ö", 0x00F6),
        (number_from_escaped_percent, r"`\%", 37),
        (signs_plus, r"+4", 4),
        (signs_minus, r"-4", -4),
        (signs_plus_minus, r"+-4", -4),
        (signs_minus_minus, r"--4", 4),
        (signs_minus_minus_spaces, r"  -  - 4", 4),
        (category_code, "11", token::CatCode::Letter),
        (category_code_hexadecimal, "\"F", token::CatCode::Invalid),
        (character_code, "`\\@", '@'),
        (small_uint, "15", Uint::<16>(15)),
    ];

    #[derive(Default)]
    struct State;

    impl TexlangState for State {
        fn cat_code(&self, c: char) -> token::CatCode {
            if c == '9' {
                return token::CatCode::Letter;
            }
            token::CatCode::plain_tex_default(c)
        }
    }

    parse_failure_tests![
        i32,
        State,
        (number_with_letter_catcode, "9", error::Code::UnexpectedToken),
        (octal_too_big, "'177777777770"),
        (octal_empty, "'", error::Code::UnexpectedEndOfInput),
        (decimal_too_big_1, "2147483648"),
        (decimal_too_big_2, "500000000000000"),
        (decimal_too_negative, "-5000000000000"),
        (hexadecimal_too_big, "\"7FFFFFFF0"),
        (hexadecimal_empty, "\""),
        (character, "A"),
        (character_missing, r"`", error::Code::UnexpectedEndOfInput),
        (control_sequence_too_big, r"`\BC"),
        (undefined_control_sequence, r"\undefined"),
    ];

    parse_failure_tests![
        Uint::<16>,
        State,
        (number_too_big, "16"),
        (number_is_negative, "-1"),
    ];

    parse_failure_tests![
        token::CatCode,
        (),
        (category_code_too_big, "16", error::Code::MalformedCategory),
        (category_code_negative, "-1", error::Code::MalformedCategory),
    ];
}
