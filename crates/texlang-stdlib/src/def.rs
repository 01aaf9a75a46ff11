//! Primitives for creating user-defined macros (`\def` and friends).

use crate::expansion;
use crate::prefix;
use texcraft_stdext::algorithms::substringsearch::Matcher;
use texlang::parse::Parsable;
use texlang::prelude as txl;
use texlang::texmacro::*;
use texlang::token::Token;
use texlang::token::Value;
use texlang::traits::*;
use texlang::*;

pub const DEF_DOC: &str = "Define a custom macro";

static DEF_TAG: command::StaticTag = command::StaticTag::new();

/// Returns the tag shared by `\def`, `\gdef`, `\edef` and `\xdef`.
///
/// Commands with this tag accept every prefix.
pub fn def_tag() -> command::Tag {
    DEF_TAG.get()
}

/// Get the `\def` command.
pub fn get_def<S: HasComponent<prefix::Component>>() -> command::BuiltIn<S> {
    command::BuiltIn::new_execution(def_primitive_fn)
        .with_tag(def_tag())
        .with_doc(DEF_DOC)
}

/// Get the `\gdef` command.
pub fn get_gdef<S: HasComponent<prefix::Component>>() -> command::BuiltIn<S> {
    command::BuiltIn::new_execution(gdef_primitive_fn)
        .with_tag(def_tag())
        .with_doc("Define a custom macro globally")
}

/// Get the `\edef` command.
pub fn get_edef<S: HasComponent<prefix::Component>>() -> command::BuiltIn<S> {
    command::BuiltIn::new_execution(edef_primitive_fn)
        .with_tag(def_tag())
        .with_doc("Define a custom macro whose replacement text is fully expanded")
}

/// Get the `\xdef` command.
pub fn get_xdef<S: HasComponent<prefix::Component>>() -> command::BuiltIn<S> {
    command::BuiltIn::new_execution(xdef_primitive_fn)
        .with_tag(def_tag())
        .with_doc("Define a custom macro globally whose replacement text is fully expanded")
}

fn def_primitive_fn<S: HasComponent<prefix::Component>>(
    def_token: Token,
    input: &mut vm::ExecutionInput<S>,
) -> txl::Result<()> {
    parse_and_set_macro(def_token, input, false, false)
}

fn gdef_primitive_fn<S: HasComponent<prefix::Component>>(
    def_token: Token,
    input: &mut vm::ExecutionInput<S>,
) -> txl::Result<()> {
    parse_and_set_macro(def_token, input, true, false)
}

fn edef_primitive_fn<S: HasComponent<prefix::Component>>(
    def_token: Token,
    input: &mut vm::ExecutionInput<S>,
) -> txl::Result<()> {
    parse_and_set_macro(def_token, input, false, true)
}

fn xdef_primitive_fn<S: HasComponent<prefix::Component>>(
    def_token: Token,
    input: &mut vm::ExecutionInput<S>,
) -> txl::Result<()> {
    parse_and_set_macro(def_token, input, true, true)
}

fn parse_and_set_macro<S: HasComponent<prefix::Component>>(
    def_token: Token,
    input: &mut vm::ExecutionInput<S>,
    set_globally_override: bool,
    expand_replacement_text: bool,
) -> txl::Result<()> {
    let component = input.state_mut().component_mut();
    let mut scope = component.take_scope();
    let flags = component.take_flags();
    if set_globally_override {
        scope = command::Scope::Global;
    }
    let name = token::CommandRef::parse(input)?;
    let (prefix, raw_parameters, replacement_end_token) = parse_prefix_and_parameters(input)?;
    let parameters: Vec<Parameter> = raw_parameters
        .into_iter()
        .map(|raw_parameter| match raw_parameter {
            RawParameter::Undelimited => Parameter::Undelimited,
            RawParameter::Delimited(delimiter) => match Matcher::new(delimiter) {
                None => Parameter::Undelimited,
                Some(matcher) => Parameter::Delimited(matcher),
            },
        })
        .collect();
    let replacement = parse_replacement_text(
        input,
        replacement_end_token,
        parameters.len(),
        expand_replacement_text,
    )?;
    log::trace!(
        "defining {} with {} parameter(s) in {:?} scope",
        name.to_string(input.vm().cs_name_interner()),
        parameters.len(),
        scope,
    );
    let user_defined_macro = Macro::new(prefix, parameters, replacement).with_flags(flags);
    input
        .commands_map_mut()
        .insert_macro(name, user_defined_macro, scope);
    Ok(())
}

enum RawParameter {
    Undelimited,
    Delimited(Vec<Value>),
}

impl RawParameter {
    fn push(&mut self, t: Token) {
        match self {
            RawParameter::Undelimited => {
                *self = RawParameter::Delimited(vec![t.value()]);
            }
            RawParameter::Delimited(vec) => {
                vec.push(t.value());
            }
        }
    }
}

fn char_to_parameter_index(c: char) -> Option<usize> {
    match c {
        '1'..='9' => c.to_digit(10).map(|d| d as usize - 1),
        _ => None,
    }
}

const PARAMETER_GUIDANCE: &str =
    "a parameter token must be followed by a single digit number, another parameter token, or a closing brace {.";

// Reads the next token of the parameter text or replacement text, which may not be an outer macro.
fn next_definition_token<S: TexlangState>(
    input: &mut vm::ExecutionInput<S>,
    expand: bool,
    doing: &str,
) -> txl::Result<Token> {
    let token = match expand {
        true => expansion::next_fully_expanded(
            input.expanded(),
            expansion::FullExpansion::MacroDefinition,
        )?,
        false => input.unexpanded().next()?,
    };
    let token = match token {
        None => {
            return Err(error::SimpleEndOfInputError::new(
                input.vm(),
                format!["unexpected end of input while scanning the {doing} of a macro definition"],
            )
            .into())
        }
        Some(token) => token,
    };
    if let Some(command_ref) = token.command_ref() {
        if is_outer(input.commands_map(), &command_ref) {
            return Err(outer_in_definition_error(input.vm(), token));
        }
    }
    Ok(token)
}

/// Returns the error for an outer macro that appears inside a macro definition.
pub(crate) fn outer_in_definition_error<S>(vm: &vm::VM<S>, token: Token) -> Box<error::Error> {
    error::SimpleTokenError::new(
        vm,
        token,
        "forbidden control sequence found while scanning a macro definition",
    )
    .with_code(error::Code::OuterInContext)
    .with_note("macros defined with \\outer may not appear in parameter texts or replacement texts")
    .into()
}

fn parse_prefix_and_parameters<S: TexlangState>(
    input: &mut vm::ExecutionInput<S>,
) -> txl::Result<(Vec<Token>, Vec<RawParameter>, Option<Token>)> {
    let mut prefix = Vec::new();
    let mut parameters: Vec<RawParameter> = Vec::new();
    let doing = "parameter text";

    loop {
        let token = next_definition_token(input, false, doing)?;
        match token.value() {
            Value::BeginGroup(_) => {
                return Ok((prefix, parameters, None));
            }
            Value::EndGroup(_) => {
                return Err(error::SimpleTokenError::new(
                    input.vm(),
                    token,
                    "unexpected end group token while parsing the parameter text of a macro definition",
                )
                .with_note("the parameter text of a macro must end with an opening brace {")
                .into());
            }
            Value::Parameter(_) => {
                let parameter_token = next_definition_token(input, false, doing)?;
                match parameter_token.value() {
                    Value::BeginGroup(_) => {
                        // In this case we end the group according to the special #{ rule
                        match parameters.last_mut() {
                            None => {
                                prefix.push(parameter_token);
                            }
                            Some(spec) => {
                                spec.push(parameter_token);
                            }
                        }
                        return Ok((prefix, parameters, Some(parameter_token)));
                    }
                    Value::CommandRef(..) => {
                        return Err(error::SimpleTokenError::new(
                            input.vm(),
                            parameter_token,
                            "unexpected control sequence after a parameter token",
                        )
                        .with_note(PARAMETER_GUIDANCE)
                        .into());
                    }
                    _ => {
                        let parameter_index =
                            match parameter_token.char().and_then(char_to_parameter_index) {
                                None => {
                                    return Err(error::SimpleTokenError::new(
                                        input.vm(),
                                        parameter_token,
                                        "unexpected character after a parameter token",
                                    )
                                    .with_note(PARAMETER_GUIDANCE)
                                    .into());
                                }
                                Some(n) => n,
                            };
                        if parameter_index != parameters.len() {
                            return Err(error::SimpleTokenError::new(
                                input.vm(),
                                parameter_token,
                                format!["unexpected parameter number {}", parameter_index + 1],
                            )
                            .with_note(format![
                                "this macro has {} parameter(s) so far, so parameter number #{} was expected.",
                                parameters.len(),
                                parameters.len() + 1
                            ])
                            .into());
                        }
                        parameters.push(RawParameter::Undelimited);
                    }
                }
            }
            _ => match parameters.last_mut() {
                None => {
                    prefix.push(token);
                }
                Some(parameter) => {
                    parameter.push(token);
                }
            },
        }
    }
}

fn parse_replacement_text<S: TexlangState>(
    input: &mut vm::ExecutionInput<S>,
    opt_final_token: Option<Token>,
    num_parameters: usize,
    expand: bool,
) -> txl::Result<Vec<Replacement>> {
    let mut result = vec![];
    let mut scope_depth = 0_usize;
    let push = |result: &mut Vec<Replacement>, token| match result.last_mut() {
        Some(Replacement::Tokens(tokens)) => {
            tokens.push(token);
        }
        _ => {
            result.push(Replacement::Tokens(vec![token]));
        }
    };
    let doing = "replacement text";

    loop {
        let token = next_definition_token(input, expand, doing)?;
        match token.value() {
            Value::BeginGroup(_) => {
                scope_depth += 1;
            }
            Value::EndGroup(_) => {
                if scope_depth == 0 {
                    if let Some(final_token) = opt_final_token {
                        push(&mut result, final_token);
                    }
                    return Ok(result);
                }
                scope_depth -= 1;
            }
            Value::Parameter(_) => {
                let parameter_token = next_definition_token(input, expand, doing)?;
                if let Value::Parameter(_) = parameter_token.value() {
                    push(&mut result, parameter_token);
                    continue;
                }
                let parameter_index = match parameter_token.char().and_then(char_to_parameter_index) {
                    None => {
                        return Err(error::SimpleTokenError::new(
                            input.vm(),
                            parameter_token,
                            "unexpected token while reading a parameter number",
                        )
                        .with_note("expected a number between 1 and 9 inclusive, or another parameter token")
                        .into())
                    }
                    Some(n) => n,
                };
                if parameter_index >= num_parameters {
                    let note = match num_parameters {
                        0 => "no parameter token because this macro has 0 parameters".to_string(),
                        1 => "the number 1 because this macro has only 1 parameter".to_string(),
                        n => format![
                            "a number between 1 and {n} inclusive because this macro has only {n} parameters"
                        ],
                    };
                    return Err(error::SimpleTokenError::new(
                        input.vm(),
                        parameter_token,
                        format!["unexpected parameter number {}", parameter_index + 1],
                    )
                    .with_note(format!["expected {note}"])
                    .into());
                }
                result.push(Replacement::Parameter(parameter_index));
                continue;
            }
            _ => {}
        }

        push(&mut result, token);
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;
    use crate::{catcode, expansion};
    use texlang::vm::implement_has_component;
    use texlang_testing::*;

    #[derive(Default)]
    struct State {
        catcode: catcode::Component,
        prefix: prefix::Component,
        testing: TestingComponent,
    }

    impl TexlangState for State {
        fn cat_code(&self, c: char) -> token::CatCode {
            catcode::cat_code(self, c)
        }

        fn expansion_override_hook(
            token: Token,
            input: &mut vm::ExpansionInput<Self>,
            tag: Option<command::Tag>,
        ) -> txl::Result<Option<Token>> {
            expansion::noexpand_hook(token, input, tag)
        }

        fn begin_group_hook(&mut self) {
            self.catcode.begin_group();
        }

        fn end_group_hook(&mut self) {
            self.catcode.end_group();
        }
    }

    implement_has_component![
        State,
        (catcode::Component, catcode),
        (prefix::Component, prefix),
        (TestingComponent, testing),
    ];

    fn built_in_commands() -> HashMap<&'static str, command::BuiltIn<State>> {
        HashMap::from([
            ("catcode", catcode::get_catcode()),
            ("def", get_def()),
            ("edef", get_edef()),
            ("gdef", get_gdef()),
            ("xdef", get_xdef()),
            ("global", prefix::get_global()),
            ("outer", prefix::get_outer()),
            ("protected", prefix::get_protected()),
            ("noexpand", expansion::get_noexpand()),
            ("assertGlobalIsFalse", prefix::get_assert_global_is_false()),
        ])
    }

    test_suite![
        expansion_equality_tests(
            (def_parsed_successfully, "\\def\\A{abc}", ""),
            (output_is_correct, "\\def\\A{abc}\\A", "abc"),
            (output_twice, "\\def\\A{abc}\\A\\A", "abcabc"),
            (parse_one_parameter, "\\def\\A#1{a-#1-b}", ""),
            (one_undelimited_parameter, "\\def\\A#1{a-#1-b}\\A1", "a-1-b"),
            (
                one_undelimited_parameter_multiple_times,
                "\\def\\A#1{#1 #1 #1}\\A1",
                "1 1 1"
            ),
            (
                one_undelimited_parameter_multiple_tokens,
                "\\def\\A#1{a-#1-b}\\A{123}",
                "a-123-b"
            ),
            (two_undelimited_parameters, "\\def\\A#1#2{#2-#1}\\A56", "6-5"),
            (
                two_undelimited_parameters_multiple_token_inputs,
                "\\def\\A#1#2{#2-#1}\\A{abc}{xyz}",
                "xyz-abc"
            ),
            (
                undelimited_parameters_brace_stripping,
                "\\def\\A#1#2{(#1)(#2)}\\A{xy}z",
                "(xy)(z)"
            ),
            (
                undelimited_parameter_skips_spaces,
                "\\def\\A#1#2{(#1)(#2)}\\A x   y",
                "(x)(y)"
            ),
            (consume_prefix_correctly, "\\def\\A fgh{567}\\A fghi", "567i"),
            (
                one_undelimited_parameter_with_prefix,
                "\\def\\A abc#1{y#1z}\\A abcdefg",
                "ydzefg"
            ),
            (
                one_delimited_parameter,
                "\\def\\A #1xxx{y#1z}\\A abcxxx",
                "yabcz"
            ),
            (
                one_delimited_parameter_comma,
                "\\def\\A#1,{[#1]}\\A ab,cd",
                "[ab]cd"
            ),
            (
                one_delimited_parameter_empty,
                "\\def\\A #1xxx{y#1z}\\A xxx",
                "yz"
            ),
            (
                one_delimited_parameter_with_scope,
                "\\def\\A #1xxx{#1}\\A abc{123xxx}xxx",
                "abc{123xxx}"
            ),
            (
                one_delimited_parameter_with_prefix,
                "\\def\\A a#1c{x#1y}\\A abcdef",
                "xbydef"
            ),
            (
                two_delimited_parameters_with_prefix,
                r"\def\A a#1c#2e{x#2y#1z}\A abcdef",
                "xdybzf"
            ),
            (
                one_delimited_parameter_grouped_value,
                r"\def\A #1c{x#1y}\A {Hello}c",
                "xHelloy"
            ),
            (
                one_delimited_parameter_two_groups,
                r"\def\A #1c{x#1y}\A {He}{llo}c",
                "x{He}{llo}y"
            ),
            (
                delimiter_partial_match_restarts,
                r"\def\A #1aab{(#1)}\A aaab",
                "(a)"
            ),
            (
                parameter_brace_special_case,
                r"\def\A #{Mint says }\A{hello}",
                "Mint says {hello}"
            ),
            (
                greet,
                r"\def\greet#1{Hello, #1!}\greet{World}",
                "Hello, World!"
            ),
            (
                grouping,
                r"\def\A{Hello}\A{\def\A{World}\A}\A",
                r"HelloWorldHello"
            ),
            (
                grouping_global,
                r"\def\A{Hello}\A{\global\def\A{World}\A}\A",
                r"HelloWorldWorld"
            ),
            (
                gdef,
                r"\def\A{Hello}\A{\gdef\A{World}\A}\A",
                r"HelloWorldWorld"
            ),
            (
                gdef_global,
                r"\def\A{Hello}\A{\global\gdef\A{World}\A}\A",
                r"HelloWorldWorld"
            ),
            (
                def_takes_global,
                r"\global\def\A{Hello}\assertGlobalIsFalse",
                r""
            ),
            (
                gdef_takes_global,
                r"\global\gdef\A{Hello}\assertGlobalIsFalse",
                r""
            ),
            (
                edef_takes_global,
                r"\global\edef\A{Hello}\assertGlobalIsFalse",
                r""
            ),
            (
                local_definitions_are_rolled_back_exactly,
                r"\def\A{a}{\def\A{b}\def\A{c}{\def\A{d}}\A}\A",
                r"ca"
            ),
            (
                global_definition_discards_inner_local_definitions,
                r"\def\A{a}{\def\A{b}{\def\A{c}\global\def\A{d}\A}\A}\A",
                r"ddd"
            ),
            (
                active_character,
                r"\def~{Hello}~",
                r"Hello"
            ),
            (
                texbook_exercise_20_1,
                r"\def\mustnt{I must not talk in class.}%
                  \def\five{\mustnt\mustnt\mustnt\mustnt\mustnt}%
                  \def\twenty{\five\five\five\five}%
                  \def\punishment{\twenty\twenty\twenty\twenty\twenty}%
                  \punishment",
                "I must not talk in class.".repeat(100)
            ),
            (
                texbook_exercise_20_2,
                r"\def\a{\b}%
                  \def\b{A\def\a{B\def\a{C\def\a{\b}}}}%
                  \def\puzzle{\a\a\a\a\a}%
                  \puzzle",
                "ABCAB"
            ),
            (
                texbook_exercise_20_4_part_1,
                r#"\def\mustnt#1#2{I must not #1 in #2.}%
                   \def\five#1#2{\mustnt{#1}{#2}\mustnt{#1}{#2}\mustnt{#1}{#2}\mustnt{#1}{#2}\mustnt{#1}{#2}}%
                   \def\twenty#1#2{\five{#1}{#2}\five{#1}{#2}\five{#1}{#2}\five{#1}{#2}}%
                   \def\punishment#1#2{\twenty{#1}{#2}\twenty{#1}{#2}\twenty{#1}{#2}\twenty{#1}{#2}\twenty{#1}{#2}}%
                   \punishment{run}{the halls}"#,
                "I must not run in the halls.".repeat(100)
            ),
            (
                texbook_exercise_20_5,
                r"\def\a#1{\def\b##1{##1#1}}\a!\b{Hello}",
                "Hello!"
            ),
            (
                texbook_exercise_20_5_temp,
                r"\def\b#1{#1!}\b{Hello}",
                "Hello!"
            ),
            (
                texbook_exercise_20_6,
                r"\def\b#1{And #1, World!}\def\a#{\b}\a{Hello}",
                "And Hello, World!"
            ),
            (
                texbook_exercise_20_7,
                r"\catcode`\[=1 \catcode`\]=2 \catcode`\!=6 \def\!!1#2![{!#]#!!2}\! x{[y]][z}",
                r"\catcode`\[=1 \catcode`\]=2 \catcode`\!=6 {#]![y][z}",
            ),
            (
                edef_expands_macros,
                r"\def\A{a}\def\B{\A b}\edef\C{\B c}\def\A{x}\C",
                "abc"
            ),
            (
                edef_expands_parameters,
                r"\def\A{a}\edef\C#1{\A#1\A}\def\A{x}\C{y}",
                "aya"
            ),
            (
                edef_noexpand,
                r"\def\A{a}\edef\C{\noexpand\A}\def\A{x}\C",
                "x"
            ),
            (
                edef_protected,
                r"\protected\def\A{a}\edef\C{\A}\protected\def\A{x}\C",
                "x"
            ),
            (
                edef_macro_producing_parameter_token,
                r"\def\hash{##}\edef\C#1{\hash1}\C{y}",
                "y"
            ),
            (
                xdef,
                r"\def\A{a}{\xdef\C{\A}}\C",
                "a"
            ),
            (par_delimits_argument, r"\def\A#1\par{[#1]}\A x\par", "[x]"),
            (par_in_prefix, r"\def\A\par{y}\A\par", "y"),
            (
                par_ends_multi_token_delimiter,
                r"\def\A#1.\par{[#1]}\A x.\par",
                "[x]"
            ),
        ),
    ];

    test_suite![
        failure_tests(
            (end_of_input_scanning_target, "\\def", error::Code::UnexpectedEndOfInput),
            (
                end_of_input_scanning_argument_text,
                "\\def\\A",
                error::Code::UnexpectedEndOfInput
            ),
            (
                end_of_input_scanning_replacement,
                "\\def\\A{",
                error::Code::UnexpectedEndOfInput
            ),
            (
                end_of_input_scanning_nested_replacement,
                "\\def\\A{{}",
                error::Code::UnexpectedEndOfInput
            ),
            (
                end_of_input_reading_parameter_number,
                "\\def\\A#",
                error::Code::UnexpectedEndOfInput
            ),
            (
                end_of_input_scanning_argument,
                "\\def\\A#1{} \\A",
                error::Code::RunawayArgument
            ),
            (
                end_of_input_reading_value_for_parameter,
                "\\def\\A#1{} \\A{this {is parameter 1 but it never ends}",
                error::Code::RunawayArgument
            ),
            (
                end_of_input_reading_prefix,
                "\\def\\A abc{} \\A ab",
                error::Code::RunawayArgument
            ),
            (
                end_of_input_reading_delimiter,
                "\\def\\A #1abc{} \\A {first parameter}ab",
                error::Code::RunawayArgument
            ),
            (
                end_of_input_reading_comma_delimiter,
                "\\def\\A #1,{} \\A abcd",
                error::Code::RunawayArgument
            ),
            (unexpected_token_target, "\\def a", error::Code::UnexpectedToken),
            (unexpected_token_argument, "\\def\\A }", error::Code::UnexpectedToken),
            (
                unexpected_token_parameter_number,
                "\\def\\A #a}",
                error::Code::UnexpectedToken
            ),
            (
                unexpected_parameter_number_in_argument,
                "\\def\\A #2{}",
                error::Code::UnexpectedToken
            ),
            (
                unexpected_parameter_token_in_replacement,
                "\\def\\A #1{#a}",
                error::Code::UnexpectedToken
            ),
            (
                unexpected_parameter_number_in_replacement,
                "\\def\\A {#2}",
                error::Code::UnexpectedToken
            ),
            (
                unexpected_parameter_number_in_replacement_2,
                "\\def\\A #1{#2}",
                error::Code::UnexpectedToken
            ),
            (
                unexpected_token_in_prefix,
                "\\def\\A abc{d} \\A abd",
                error::Code::PatternMismatch
            ),
            (
                extra_end_group_in_undelimited_argument,
                "\\def\\A #1{} \\A }",
                error::Code::ExtraEndGroup
            ),
            (
                extra_end_group_in_delimited_argument,
                "\\def\\A #1.{} \\A a}.",
                error::Code::ExtraEndGroup
            ),
            (
                par_in_argument_of_short_macro,
                "\\def\\A #1.{} \\A a\\par b.",
                error::Code::RunawayArgument
            ),
            (
                par_where_prefix_expects_other_token,
                r"\def\A x{} \A\par",
                error::Code::RunawayArgument
            ),
            (
                par_after_partial_delimiter,
                r"\def\A #1.x{} \A a.\par",
                error::Code::RunawayArgument
            ),
            (
                outer_macro_in_argument,
                "\\outer\\def\\B{}\\def\\A #1{} \\A \\B",
                error::Code::OuterInContext
            ),
            (
                outer_macro_in_parameter_text,
                "\\outer\\def\\B{}\\def\\A \\B{}",
                error::Code::OuterInContext
            ),
            (
                outer_macro_in_replacement_text,
                "\\outer\\def\\B{}\\def\\A{\\B}",
                error::Code::OuterInContext
            ),
            (
                outer_macro_in_edef,
                "\\outer\\def\\B{}\\edef\\A{\\B}",
                error::Code::OuterInContext
            ),
            (
                end_of_input_in_edef,
                "\\def\\B{}\\edef\\A{\\B",
                error::Code::UnexpectedEndOfInput
            ),
        ),
    ];
}
