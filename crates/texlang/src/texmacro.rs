//! Implementation of TeX user defined macros.
//!
//! A macro is a template: a parameter text describing how arguments are read from the input,
//!     and a replacement text into which those arguments are substituted.
//! Calling a macro matches the parameter text against the unexpanded input
//!     and pushes the substituted replacement text back onto the front of the input.

use crate::command;
use crate::error;
use crate::prelude as txl;
use crate::token;
use crate::token::CommandRef;
use crate::token::Token;
use crate::token::Value;
use crate::traits::*;
use crate::vm;
use texcraft_stdext::algorithms::substringsearch::Matcher;

/// The prefixes `\long`, `\outer` and `\protected` that may modify a macro definition.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Flags {
    /// Arguments may contain the control sequence `\par`.
    pub long: bool,
    /// The macro may not appear in arguments, parameter texts or replacement texts.
    pub outer: bool,
    /// The macro is not expanded inside `\edef` and `\xdef`.
    pub protected: bool,
}

/// A TeX Macro.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Macro {
    flags: Flags,
    prefix: Vec<Token>,
    parameters: Vec<Parameter>,
    replacements: Vec<Replacement>,
}

/// A token list or parameter in a replacement text.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Replacement {
    /// A list of tokens.
    Tokens(Vec<Token>),

    /// A parameter.
    ///
    /// In order to be valid, the parameters index must be less than the number
    /// of parameters in the macro.
    Parameter(usize),
}

/// How the argument for a single parameter is read from the input.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parameter {
    /// The argument is a single token, or a braced group whose braces are removed.
    Undelimited,
    /// The argument is every token up to the first balanced occurrence of the delimiter.
    Delimited(Matcher<Value>),
}

impl Macro {
    /// Create a new macro with no flags set.
    ///
    /// The caller is responsible for ensuring that every [Replacement::Parameter]
    ///     index is smaller than the number of parameters.
    pub fn new(
        prefix: Vec<Token>,
        parameters: Vec<Parameter>,
        replacement_text: Vec<Replacement>,
    ) -> Macro {
        Macro {
            flags: Default::default(),
            prefix,
            parameters,
            replacements: replacement_text,
        }
    }

    pub fn with_flags(mut self, flags: Flags) -> Macro {
        self.flags = flags;
        self
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn prefix(&self) -> &[Token] {
        &self.prefix
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn replacements(&self) -> &[Replacement] {
        &self.replacements
    }

    /// Expand the macro.
    ///
    /// The token is the control sequence or active character that invoked the macro.
    /// It has already been removed from the input.
    pub fn call<S: TexlangState>(
        &self,
        token: Token,
        input: &mut vm::ExpansionInput<S>,
    ) -> txl::Result<()> {
        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "expanding macro {} with {} parameter(s)",
                macro_name(input.vm(), token),
                self.parameters.len()
            );
        }
        self.match_prefix(token, input.unexpanded())?;
        let mut argument_indices: Vec<(usize, usize)> = Vec::with_capacity(self.parameters.len());
        let mut argument_tokens = input.checkout_token_buffer();
        for (i, parameter) in self.parameters.iter().enumerate() {
            let start_index = argument_tokens.len();
            let trim_outer_braces = match parameter {
                Parameter::Undelimited => self.read_undelimited_argument(
                    token,
                    input.unexpanded(),
                    &mut argument_tokens,
                )?,
                Parameter::Delimited(matcher) => self.read_delimited_argument(
                    token,
                    input.unexpanded(),
                    matcher,
                    &mut argument_tokens,
                )?,
            };
            log::trace!("read argument #{} ({} tokens)", i + 1, argument_tokens.len() - start_index);
            argument_indices.push(match trim_outer_braces {
                true => (start_index + 1, argument_tokens.len() - 1),
                false => (start_index, argument_tokens.len()),
            });
        }

        let arguments: Vec<&[Token]> = argument_indices
            .iter()
            .map(|(i, j)| &argument_tokens[*i..*j])
            .collect();

        let result = input.expansions_mut();
        let num_tokens = Macro::perform_replacement(&self.replacements, &arguments, result);

        // To keep the borrow checker happy we need to downgrade result to a shared reference.
        let result = input.expansions();
        S::post_macro_expansion_hook(
            token,
            input,
            self,
            &arguments,
            &result[result.len() - num_tokens..result.len()],
        );

        drop(arguments);
        input.return_token_buffer(argument_tokens);
        Ok(())
    }

    /// Pushes the replacement text, with arguments substituted, onto the stack of expansions.
    ///
    /// Because the stack is reversed, the replacement is written from last token to first.
    /// Returns the number of tokens written.
    fn perform_replacement(
        replacements: &[Replacement],
        arguments: &[&[Token]],
        result: &mut Vec<Token>,
    ) -> usize {
        let argument = |i: usize| -> &[Token] { arguments.get(i).copied().unwrap_or(&[]) };
        let mut output_size = 0;
        for replacement in replacements.iter() {
            output_size += match replacement {
                Replacement::Tokens(tokens) => tokens.len(),
                Replacement::Parameter(i) => argument(*i).len(),
            };
        }
        result.reserve(output_size);
        for replacement in replacements.iter().rev() {
            match replacement {
                Replacement::Tokens(tokens) => {
                    result.extend(tokens.iter().rev().copied());
                }
                Replacement::Parameter(i) => {
                    result.extend(argument(*i).iter().rev().copied());
                }
            }
        }
        output_size
    }

    fn match_prefix<S: TexlangState>(
        &self,
        macro_token: Token,
        stream: &mut vm::UnexpandedStream<S>,
    ) -> txl::Result<()> {
        for prefix_token in self.prefix.iter() {
            let stream_token = self.next_argument_token(macro_token, stream)?;
            if stream_token != *prefix_token {
                self.check_par(macro_token, stream_token, stream)?;
                return Err(error::SimpleTokenError::new(
                    stream.vm(),
                    stream_token,
                    format![
                        "use of {} doesn't match its definition",
                        macro_name(stream.vm(), macro_token)
                    ],
                )
                .with_code(error::Code::PatternMismatch)
                .with_note(format![
                    "the parameter text requires the tokens `{}` here",
                    token::write_tokens(&self.prefix, stream.vm().cs_name_interner())
                ])
                .into());
            }
        }
        Ok(())
    }

    // Returns true if the outer braces of the argument should be trimmed.
    fn read_undelimited_argument<S: TexlangState>(
        &self,
        macro_token: Token,
        stream: &mut vm::UnexpandedStream<S>,
        result: &mut Vec<Token>,
    ) -> txl::Result<bool> {
        let first = loop {
            let token = self.next_argument_token(macro_token, stream)?;
            self.check_par(macro_token, token, stream)?;
            if !matches!(token.value(), Value::Space(_)) {
                break token;
            }
        };
        match first.value() {
            Value::BeginGroup(_) => {}
            Value::EndGroup(_) => {
                return Err(self.extra_end_group_error(macro_token, first, stream));
            }
            _ => {
                result.push(first);
                return Ok(false);
            }
        }
        result.push(first);
        let mut depth = 1_usize;
        while depth > 0 {
            let token = self.next_argument_token(macro_token, stream)?;
            self.check_par(macro_token, token, stream)?;
            match token.value() {
                Value::BeginGroup(_) => depth += 1,
                Value::EndGroup(_) => depth -= 1,
                _ => {}
            }
            result.push(token);
        }
        Ok(true)
    }

    // Returns true if the outer braces of the argument should be trimmed.
    fn read_delimited_argument<S: TexlangState>(
        &self,
        macro_token: Token,
        stream: &mut vm::UnexpandedStream<S>,
        matcher: &Matcher<Value>,
        result: &mut Vec<Token>,
    ) -> txl::Result<bool> {
        let start_index = result.len();
        let mut search = matcher.start();
        let mut depth = 0_usize;
        loop {
            let token = self.next_argument_token(macro_token, stream)?;
            // Delimiters never contain braces, except for a final `{` that comes from `#{`.
            // Only tokens at depth zero can therefore be part of a match.
            let at_top_level = match token.value() {
                Value::BeginGroup(_) => {
                    depth += 1;
                    depth == 1
                }
                Value::EndGroup(_) => {
                    if depth == 0 {
                        return Err(self.extra_end_group_error(macro_token, token, stream));
                    }
                    depth -= 1;
                    depth == 0
                }
                _ => depth == 0,
            };
            result.push(token);
            if !at_top_level {
                self.check_par(macro_token, token, stream)?;
                search = matcher.start();
                continue;
            }
            if search.next(&token.value()) {
                result.truncate(result.len() - matcher.pattern().len());
                return Ok(is_single_group(&result[start_index..]));
            }
            // A `\par` that is part of the delimiter is not part of the argument.
            if search.matched() == 0 {
                self.check_par(macro_token, token, stream)?;
            }
        }
    }

    // Reads the next token of an argument or prefix, enforcing the restriction on outer macros.
    fn next_argument_token<S: TexlangState>(
        &self,
        macro_token: Token,
        stream: &mut vm::UnexpandedStream<S>,
    ) -> txl::Result<Token> {
        let token = match stream.next()? {
            None => {
                return Err(error::SimpleEndOfInputError::new(
                    stream.vm(),
                    format![
                        "file ended while scanning use of {}",
                        macro_name(stream.vm(), macro_token)
                    ],
                )
                .with_code(error::Code::RunawayArgument)
                .into())
            }
            Some(token) => token,
        };
        let command_ref = match token.command_ref() {
            None => return Ok(token),
            Some(command_ref) => command_ref,
        };
        if is_outer(stream.commands_map(), &command_ref) {
            return Err(error::SimpleTokenError::new(
                stream.vm(),
                token,
                format![
                    "forbidden control sequence found while scanning use of {}",
                    macro_name(stream.vm(), macro_token)
                ],
            )
            .with_code(error::Code::OuterInContext)
            .with_note("macros defined with \\outer may not appear in macro arguments")
            .into());
        }
        Ok(token)
    }

    // Fails if the token is `\par` and the macro is not long.
    // Only tokens that end up in an argument are checked, so `\par` may appear in delimiters.
    fn check_par<S: TexlangState>(
        &self,
        macro_token: Token,
        token: Token,
        stream: &vm::UnexpandedStream<S>,
    ) -> txl::Result<()> {
        if self.flags.long
            || token.command_ref()
                != Some(CommandRef::ControlSequence(stream.vm().par_cs_name()))
        {
            return Ok(());
        }
        Err(error::SimpleTokenError::new(
            stream.vm(),
            token,
            format![
                "paragraph ended before {} was complete",
                macro_name(stream.vm(), macro_token)
            ],
        )
        .with_code(error::Code::RunawayArgument)
        .with_note("only macros defined with \\long may receive \\par in their arguments")
        .into())
    }

    fn extra_end_group_error<S: TexlangState>(
        &self,
        macro_token: Token,
        token: Token,
        stream: &vm::UnexpandedStream<S>,
    ) -> Box<error::Error> {
        error::SimpleTokenError::new(
            stream.vm(),
            token,
            format![
                "argument of {} has an extra }}",
                macro_name(stream.vm(), macro_token)
            ],
        )
        .with_code(error::Code::ExtraEndGroup)
        .into()
    }

    /// Returns the meaning of the macro as `\meaning` prints it.
    ///
    /// For example, `\long macro:#1,->[#1]`.
    pub fn meaning(&self, interner: &token::CsNameInterner) -> String {
        let mut s = String::new();
        if self.flags.protected {
            s.push_str("\\protected");
        }
        if self.flags.long {
            s.push_str("\\long");
        }
        if self.flags.outer {
            s.push_str("\\outer");
        }
        if !s.is_empty() {
            s.push(' ');
        }
        s.push_str("macro:");
        s.push_str(&token::write_tokens(&self.prefix, interner));
        for (i, parameter) in self.parameters.iter().enumerate() {
            s.push_str(&format!["#{}", i + 1]);
            if let Parameter::Delimited(matcher) = parameter {
                let delimiter: Vec<Token> = matcher
                    .pattern()
                    .iter()
                    .map(|value| Token::new_from_value(*value, token::trace::Key::dummy()))
                    .collect();
                s.push_str(&token::write_tokens(&delimiter, interner));
            }
        }
        s.push_str("->");
        for replacement in &self.replacements {
            match replacement {
                Replacement::Parameter(i) => s.push_str(&format!["#{}", i + 1]),
                Replacement::Tokens(tokens) => {
                    for chunk in tokens.split_inclusive(|t| matches!(t.value(), Value::Parameter(_)))
                    {
                        s.push_str(&token::write_tokens(chunk, interner));
                        if let Some(Value::Parameter(c)) = chunk.last().map(Token::value) {
                            s.push(c);
                        }
                    }
                }
            }
        }
        s
    }
}

/// Returns true if the command bound to the command reference is an outer macro.
pub fn is_outer<S>(commands_map: &command::Map<S>, command_ref: &CommandRef) -> bool {
    match commands_map.get_command(command_ref) {
        Some(command::Command::Macro(tex_macro)) => tex_macro.flags.outer,
        _ => false,
    }
}

/// Returns true if the list is a single group `{...}` whose outer braces match each other.
fn is_single_group(list: &[Token]) -> bool {
    match (list.first().map(Token::value), list.last().map(Token::value)) {
        (Some(Value::BeginGroup(_)), Some(Value::EndGroup(_))) if list.len() >= 2 => {}
        _ => return false,
    }
    let mut depth = 0_usize;
    for (i, token) in list.iter().enumerate() {
        match token.value() {
            Value::BeginGroup(_) => depth += 1,
            Value::EndGroup(_) => {
                depth -= 1;
                if depth == 0 {
                    return i + 1 == list.len();
                }
            }
            _ => {}
        }
    }
    false
}

fn macro_name<S>(vm: &vm::VM<S>, token: Token) -> String {
    match token.command_ref() {
        None => "a macro".into(),
        Some(command_ref) => command_ref.to_string(vm.cs_name_interner()),
    }
}
