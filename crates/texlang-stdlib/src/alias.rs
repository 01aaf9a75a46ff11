//! Aliasing commands (`\let` and `\futurelet`)

use crate::prefix;
use texlang::parse::OptionalEqualsUnexpanded;
use texlang::prelude as txl;
use texlang::token::Token;
use texlang::traits::*;
use texlang::*;

pub const LET_DOC: &str = "Assign a command or character to a control sequence";

/// Get the `\let` command.
pub fn get_let<S: HasComponent<prefix::Component>>() -> command::BuiltIn<S> {
    command::BuiltIn::new_execution(let_primitive_fn)
        .with_tag(let_tag())
        .with_doc(LET_DOC)
}

static LET_TAG: command::StaticTag = command::StaticTag::new();

pub fn let_tag() -> command::Tag {
    LET_TAG.get()
}

fn let_primitive_fn<S: HasComponent<prefix::Component>>(
    _: Token,
    input: &mut vm::ExecutionInput<S>,
) -> txl::Result<()> {
    let scope = input.state_mut().component_mut().take_scope();
    let (alias, _) = <(token::CommandRef, OptionalEqualsUnexpanded)>::parse(input)?;
    let token = parse::next_or_end_of_input(
        input.unexpanded(),
        "reading the right hand side of a \\let assignment",
    )?;
    assign(input, alias, token, scope)
}

/// Get the `\futurelet` command.
pub fn get_futurelet<S: HasComponent<prefix::Component>>() -> command::BuiltIn<S> {
    command::BuiltIn::new_execution(futurelet_primitive_fn)
        .with_tag(futurelet_tag())
        .with_doc("Assign the meaning of the token after next, then continue with the next token")
}

static FUTURELET_TAG: command::StaticTag = command::StaticTag::new();

pub fn futurelet_tag() -> command::Tag {
    FUTURELET_TAG.get()
}

fn futurelet_primitive_fn<S: HasComponent<prefix::Component>>(
    _: Token,
    input: &mut vm::ExecutionInput<S>,
) -> txl::Result<()> {
    let scope = input.state_mut().component_mut().take_scope();
    let alias = token::CommandRef::parse(input)?;
    let doing = "reading the tokens after a \\futurelet assignment";
    let first = parse::next_or_end_of_input(input.unexpanded(), doing)?;
    let second = parse::next_or_end_of_input(input.unexpanded(), doing)?;
    assign(input, alias, second, scope)?;
    input.push_expansion(&[first, second]);
    Ok(())
}

fn assign<S: TexlangState>(
    input: &mut vm::ExecutionInput<S>,
    alias: token::CommandRef,
    token: Token,
    scope: command::Scope,
) -> txl::Result<()> {
    match token.command_ref() {
        Some(command_ref) => {
            match input
                .commands_map_mut()
                .alias_control_sequence(alias, &command_ref, scope)
            {
                Ok(()) => Ok(()),
                Err(_) => Err(error::UndefinedCommandError::new(input.vm(), token).into()),
            }
        }
        None => {
            input.commands_map_mut().alias_token(alias, token, scope);
            Ok(())
        }
    }
}
