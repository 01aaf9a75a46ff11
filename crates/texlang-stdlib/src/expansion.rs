//! Commands that alter the expansion process

use texlang::prelude as txl;
use texlang::token::Token;
use texlang::token::Value;
use texlang::traits::*;
use texlang::*;

/// Get the `\noexpand` command.
pub fn get_noexpand<S: TexlangState>() -> command::BuiltIn<S> {
    command::BuiltIn::new_expansion(noexpand_fn)
        .with_tag(NO_EXPAND_TAG.get())
        .with_doc("Prevent the next token from being expanded")
}

static NO_EXPAND_TAG: command::StaticTag = command::StaticTag::new();

// The primitive normally operates through the `\noexpand` hook, which is a method on
// the `TexlangState` trait. This function only runs if the state does not install the hook,
// in which case the next token is left in the input unmarked.
fn noexpand_fn<S: TexlangState>(_: Token, input: &mut vm::ExpansionInput<S>) -> txl::Result<()> {
    log::warn!("the \\noexpand hook is not installed in this VM; \\noexpand has no effect");
    let token = next_or_noexpand_error(input.unexpanded())?;
    input.expansions_mut().push(token);
    Ok(())
}

/// Hook that implements `\noexpand`.
///
/// States that include the `\noexpand` primitive should call this function
/// from their implementation of [TexlangState::expansion_override_hook].
#[inline]
pub fn noexpand_hook<S: TexlangState>(
    token: Token,
    input: &mut vm::ExpansionInput<S>,
    tag: Option<command::Tag>,
) -> txl::Result<Option<Token>> {
    // Fast path: this is not the \noexpand command.
    // We want this check to be inlined into the VM functions that perform expansion.
    if tag != Some(NO_EXPAND_TAG.get()) {
        return Ok(None);
    }
    // Slow path: this is the \noexpand command.
    // We don't want this check to be inlined because it will take up space in the instruction cache.
    noexpand_hook_finish(token, input)
}

fn noexpand_hook_finish<S: TexlangState>(
    _: Token,
    input: &mut vm::ExpansionInput<S>,
) -> txl::Result<Option<Token>> {
    Ok(Some(next_or_noexpand_error(input.unexpanded())?))
}

fn next_or_noexpand_error<S: TexlangState>(
    stream: &mut vm::UnexpandedStream<S>,
) -> txl::Result<Token> {
    match stream.next()? {
        None => Err(error::SimpleEndOfInputError::new(
            stream.vm(),
            "unexpected end of input while expanding a `\\noexpand` command",
        )
        .with_note("the `\\noexpand` command must be followed by 1 token")
        .into()),
        Some(token) => Ok(token),
    }
}

/// The context in which [next_fully_expanded] is reading tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullExpansion {
    /// Reading the replacement text of `\edef` or `\xdef`.
    ///
    /// Protected macros are not expanded and outer macros are an error.
    MacroDefinition,
    /// Reading the name between `\csname` and `\endcsname`.
    ControlSequenceName,
}

enum FullExpansionAction {
    Return,
    Expand,
    NoExpand,
}

/// Returns the next token in the input after expanding all expandable commands in front of it.
///
/// A `\noexpand` command is honored even if the state does not install the `\noexpand` hook:
/// the token following it is returned without being expanded.
///
/// Tokens that an `\expandafter` deferred until after a non-expandable token
///     are put back in front of the input once that token has been returned.
pub fn next_fully_expanded<S: TexlangState>(
    stream: &mut vm::ExpandedStream<S>,
    context: FullExpansion,
) -> txl::Result<Option<Token>> {
    let mark = stream.deferred_insertions();
    loop {
        let token = match stream.unexpanded().next()? {
            None => return Ok(None),
            Some(token) => token,
        };
        let action = match token.command_ref() {
            None => FullExpansionAction::Return,
            Some(command_ref) => match stream.commands_map().get_command(&command_ref) {
                Some(command::Command::Macro(texmacro)) => {
                    let flags = texmacro.flags();
                    match context {
                        FullExpansion::MacroDefinition if flags.outer => {
                            return Err(crate::def::outer_in_definition_error(stream.vm(), token));
                        }
                        FullExpansion::MacroDefinition if flags.protected => {
                            FullExpansionAction::Return
                        }
                        _ => FullExpansionAction::Expand,
                    }
                }
                Some(command::Command::Expansion(_, tag)) => {
                    if *tag == Some(NO_EXPAND_TAG.get()) {
                        FullExpansionAction::NoExpand
                    } else {
                        FullExpansionAction::Expand
                    }
                }
                _ => FullExpansionAction::Return,
            },
        };
        match action {
            FullExpansionAction::Return => {
                stream.flush_deferred_insertions(mark);
                return Ok(Some(token));
            }
            FullExpansionAction::NoExpand => {
                let token = next_or_noexpand_error(stream.unexpanded())?;
                stream.flush_deferred_insertions(mark);
                return Ok(Some(token));
            }
            FullExpansionAction::Expand => {
                stream.back(token);
                stream.expand_once()?;
            }
        }
    }
}

/// Get the simple `\expandafter` command.
///
/// The command reads a token `t` and then processes the token `u` after it.
/// If `u` is expandable it is expanded one level and `t` is put back in front of the result.
/// Otherwise `u` is left to be executed (or, inside `\edef` and `\csname`, consumed)
///     and `t` is inserted straight after it.
pub fn get_expandafter_simple<S: TexlangState>() -> command::BuiltIn<S> {
    command::BuiltIn::new_expansion(expandafter_simple_fn)
}

/// Get the optimized `\expandafter` command.
///
/// This is a more complex implementation of `\expandafter` that is optimized for handling
/// repeated `\expandafter` tokens.
/// It contains two optimizations, as described below.
/// Both the optimized and simple `\expandafter` implementations are maintained
/// and tested against each other.
///
/// **First**, `\expandafter` control sequences are often linked together in the following format:
///
/// ```tex
/// \expandafter<token 1>\expandafter<token 2>...\expandafter<token n><token n+1>
/// ```
///
/// Here, to expand the first `\expandafter` we just need to expand `<token n+1>`.
/// In TeX this works via recursion: the ith `\expandafter`
/// requests expansion of the second-to-next token, which is the (i+1)th `\expandafter`.
/// After n recursions, the last token is finally expanded.
/// Here the token stream is instead scanned ahead for as long as the pattern
/// `\expandafter<token i>` repeats.
/// The token `<token n+1>` is expanded and the intermediate `\expandafter` tokens are dropped from the input.
/// This is still an O(n) operation, but results in only 1 Rust function stack being used, rather than n.
///
/// **Second**, `\expandafter` commands are often grouped together like this:
///
/// ```tex
/// \expandafter\expandafter\expandafter\A\expandafter\B\C
/// ```
///
/// This TeX code causes `\C` to be expanded first, then `\B\` and finally `\A`.
/// When the leading `\expandafter` is expanded, the first optimization kicks in and `\C` will be expanded, leaving:
///
/// ```tex
/// \expandafter\A\B\Cexpanded
/// ```
///
/// The second optimization is that the leading `\expandafter` that is left over will also be expanded
///     without yielding control to the main expansion loop.
/// If, after this pass, the leading token is again an `\expandafter` token, it will be expanded too.
/// This process continues repeatedly until no `\expandafter` tokens are left at the start of the token stream.
pub fn get_expandafter_optimized<S: TexlangState>() -> command::BuiltIn<S> {
    command::BuiltIn::new_expansion(expandafter_optimized_fn)
        .with_doc("Expand the token after the next token, then put the next token back in front")
}

fn expandafter_simple_fn<S: TexlangState>(
    expandafter_token: Token,
    input: &mut vm::ExpansionInput<S>,
) -> txl::Result<()> {
    let next = match input.unexpanded().next()? {
        None => {
            return Err(expandafter_missing_first_token_error(
                input.vm(),
                expandafter_token,
            ));
        }
        Some(next) => next,
    };
    if input.unexpanded().peek()?.is_none() {
        return Err(expandafter_missing_second_token_error(
            input.vm(),
            expandafter_token,
            next,
        ));
    }
    if expand_once_before(input, &[next])? {
        input.expansions_mut().push(next);
    }
    Ok(())
}

/// Expands the next token once.
///
/// Returns true if the tokens still need to be put in front of the expansion.
/// Returns false if they have been scheduled to come after a non-expandable token instead.
/// This happens when the next token is not expandable, or when expanding it
///     scheduled its own tokens in this way (a nested `\expandafter`).
fn expand_once_before<S: TexlangState>(
    input: &mut vm::ExpansionInput<S>,
    tokens: &[Token],
) -> txl::Result<bool> {
    let stream = input.expanded();
    let mark = stream.deferred_insertions();
    if !stream.expand_once()? {
        stream.insert_after_next(tokens);
        return Ok(false);
    }
    Ok(!stream.prepend_to_deferred_insertion(mark, tokens))
}

fn expandafter_optimized_fn<S: TexlangState>(
    expandafter_token: Token,
    input: &mut vm::ExpansionInput<S>,
) -> txl::Result<()> {
    let mut buffer: Vec<Token> = input.checkout_token_buffer();
    let unexpanded_input = input.unexpanded();
    loop {
        let first = match unexpanded_input.next()? {
            None => {
                return Err(expandafter_missing_first_token_error(
                    input.vm(),
                    expandafter_token,
                ))
            }
            Some(next) => next,
        };
        buffer.push(first);
        let token = match unexpanded_input.peek()? {
            None => {
                return Err(expandafter_missing_second_token_error(
                    input.vm(),
                    expandafter_token,
                    first,
                ))
            }
            Some(token) => *token,
        };
        if token.value() != expandafter_token.value() {
            break;
        }
        // Remove the \expandafter token from the stream
        _ = unexpanded_input.next()?;
    }
    if !expand_once_before(input, &buffer)? {
        input.return_token_buffer(buffer);
        return Ok(());
    }

    while let Some(&root) = buffer.first() {
        if root.value() != expandafter_token.value() {
            input.expansions_mut().extend(buffer.iter().rev());
            break;
        }
        let mut last_expandafter_index = 0;
        while let Some(next) = buffer.get(last_expandafter_index + 2) {
            if next.value() != root.value() {
                break;
            }
            last_expandafter_index += 2;
        }
        // The buffer must end exactly one token after the last \expandafter token.
        // There are three cases depending on whether the buffer is under-full, overfull, or exactly right.
        // The buffer always contains the last \expandafter token, so the subtraction does not underflow.
        match buffer.len() - (last_expandafter_index + 1) {
            // Under-full
            0 => {
                let next = match input.unexpanded().next()? {
                    None => return Err(expandafter_missing_first_token_error(input.vm(), root)),
                    Some(next) => next,
                };
                buffer.push(next);
            }
            // Exactly right
            1 => {}
            // Overfull
            _ => {
                input
                    .expansions_mut()
                    .extend(buffer[last_expandafter_index + 2..].iter().rev());
                buffer.truncate(last_expandafter_index + 2);
            }
        }
        // Check there is another token in the input. This is only relevant in the under-full and
        // exactly right cases, but it's easier to put it here.
        if input.unexpanded().peek()?.is_none() {
            let first = buffer.last().copied().unwrap_or(root);
            return Err(expandafter_missing_second_token_error(
                input.vm(),
                root,
                first,
            ));
        }
        remove_even_indices(&mut buffer);
        if !expand_once_before(input, &buffer)? {
            break;
        }
    }
    input.return_token_buffer(buffer);
    Ok(())
}

fn remove_even_indices(v: &mut Vec<Token>) {
    let mut src = 1;
    let mut dest = 0;
    while let Some(token) = v.get(src) {
        v[dest] = *token;
        dest += 1;
        src += 2;
    }
    v.truncate(dest);
}

fn expandafter_missing_first_token_error<S>(
    vm: &vm::VM<S>,
    expandafter_token: Token,
) -> Box<error::Error> {
    _ = expandafter_token;
    error::SimpleEndOfInputError::new(
        vm,
        "unexpected end of input while expanding an `\\expandafter` command",
    )
    .with_note("the `\\expandafter` command must be followed by 2 tokens")
    .with_note("no more tokens were found")
    .into()
}

fn expandafter_missing_second_token_error<S>(
    vm: &vm::VM<S>,
    expandafter_token: Token,
    first_token: Token,
) -> Box<error::Error> {
    _ = expandafter_token;
    error::SimpleEndOfInputError::new(
        vm,
        "unexpected end of input while expanding an `\\expandafter` command",
    )
    .with_note("the `\\expandafter` command must be followed by 2 tokens")
    .with_note(format![
        "only 1 more token was found: {}",
        token::write_tokens(&[first_token], vm.cs_name_interner())
    ])
    .into()
}

/// Get the `\relax` command.
pub fn get_relax<S>() -> command::BuiltIn<S> {
    command::BuiltIn::from(command::Command::Relax).with_doc("Do nothing")
}

static END_CS_NAME_TAG: command::StaticTag = command::StaticTag::new();

/// Get the `\csname` command.
pub fn get_csname<S: TexlangState>() -> command::BuiltIn<S> {
    command::BuiltIn::new_expansion(csname_fn)
        .with_doc("Build a control sequence from the characters up to \\endcsname")
}

/// Get the `\endcsname` command.
pub fn get_endcsname<S: TexlangState>() -> command::BuiltIn<S> {
    command::BuiltIn::new_execution(endcsname_fn)
        .with_tag(END_CS_NAME_TAG.get())
        .with_doc("Terminate a \\csname command")
}

fn csname_fn<S: TexlangState>(
    csname_token: Token,
    input: &mut vm::ExpansionInput<S>,
) -> txl::Result<()> {
    let end_cs_name_tag = END_CS_NAME_TAG.get();
    let mut name = String::new();
    loop {
        let token = match next_fully_expanded(
            input.expanded(),
            FullExpansion::ControlSequenceName,
        )? {
            None => {
                return Err(error::SimpleEndOfInputError::new(
                    input.vm(),
                    "unexpected end of input while reading the name in a `\\csname` command",
                )
                .with_note("the name must be terminated by an `\\endcsname` command")
                .into())
            }
            Some(token) => token,
        };
        match token.value() {
            Value::CommandRef(command_ref) => {
                if input.commands_map().get_tag(&command_ref) == Some(end_cs_name_tag) {
                    break;
                }
                return Err(error::SimpleTokenError::new(
                    input.vm(),
                    token,
                    "unexpected command while reading the name in a `\\csname` command",
                )
                .with_note("only character tokens may appear between `\\csname` and `\\endcsname`")
                .with_note("the command may be missing an `\\endcsname`")
                .into());
            }
            Value::Space(_) => {}
            _ => {
                if let Some(c) = token.char() {
                    name.push(c);
                }
            }
        }
    }
    let cs_name = input.control_sequence_or_relax(&name);
    input
        .expansions_mut()
        .push(Token::new_control_sequence(cs_name, csname_token.trace_key()));
    Ok(())
}

fn endcsname_fn<S: TexlangState>(
    endcsname_token: Token,
    input: &mut vm::ExecutionInput<S>,
) -> txl::Result<()> {
    Err(error::SimpleTokenError::new(
        input.vm(),
        endcsname_token,
        "extra `\\endcsname` command",
    )
    .with_code(error::Code::ExtraTerminator)
    .with_note("an `\\endcsname` command is only valid after a matching `\\csname` command")
    .into())
}

/// Get the `\meaning` command.
pub fn get_meaning<S: TexlangState>() -> command::BuiltIn<S> {
    command::BuiltIn::new_expansion(meaning_fn)
        .with_doc("Output a description of the meaning of the next token")
}

fn meaning_fn<S: TexlangState>(
    meaning_token: Token,
    input: &mut vm::ExpansionInput<S>,
) -> txl::Result<()> {
    let token = match input.unexpanded().next()? {
        None => {
            return Err(error::SimpleEndOfInputError::new(
                input.vm(),
                "unexpected end of input while expanding a `\\meaning` command",
            )
            .with_note("the `\\meaning` command must be followed by 1 token")
            .into())
        }
        Some(token) => token,
    };
    let description = describe(input.vm(), token);
    let trace_key = meaning_token.trace_key();
    let output: Vec<Token> = description
        .chars()
        .map(|c| match c {
            ' ' => Token::new_space(c, trace_key),
            _ => Token::new_other(c, trace_key),
        })
        .collect();
    input.push_expansion(&output);
    Ok(())
}

/// Returns the TeX description of the meaning of a token, as printed by `\meaning`.
pub fn describe<S>(vm: &vm::VM<S>, token: Token) -> String {
    let command_ref = match token.value() {
        Value::CommandRef(command_ref) => command_ref,
        value => return describe_character(value),
    };
    let interner = vm.cs_name_interner();
    match vm.commands_map.get_command(&command_ref) {
        None => "undefined".to_string(),
        Some(command::Command::Macro(texmacro)) => texmacro.meaning(interner),
        Some(command::Command::CharacterTokenAlias(value)) => describe_character(*value),
        Some(command::Command::Relax) => "\\relax".to_string(),
        Some(command::Command::Expansion(..)) | Some(command::Command::Execution(..)) => {
            match vm.commands_map.primitive_name(&command_ref) {
                None => command_ref.to_string(interner),
                Some(cs_name) => format!["\\{}", interner.resolve(cs_name).unwrap_or("?")],
            }
        }
    }
}

fn describe_character(value: Value) -> String {
    match value {
        Value::BeginGroup(c) => format!["begin-group character {c}"],
        Value::EndGroup(c) => format!["end-group character {c}"],
        Value::MathShift(c) => format!["math shift character {c}"],
        Value::AlignmentTab(c) => format!["alignment tab character {c}"],
        Value::Parameter(c) => format!["macro parameter character {c}"],
        Value::Superscript(c) => format!["superscript character {c}"],
        Value::Subscript(c) => format!["subscript character {c}"],
        Value::Space(c) => format!["blank space {c}"],
        Value::Letter(c) => format!["the letter {c}"],
        Value::Other(c) => format!["the character {c}"],
        Value::CommandRef(token::CommandRef::ActiveCharacter(c)) => format!["active character {c}"],
        Value::CommandRef(token::CommandRef::ControlSequence(_)) => "control sequence".to_string(),
    }
}
