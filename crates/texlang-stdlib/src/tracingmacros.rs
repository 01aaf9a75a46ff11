//! TeX macro debugging (`\tracingmacros`)
//!
//! When `\tracingmacros` is positive, every macro expansion is logged at the info level
//!     in the same format TeX writes to the log file:
//!
//! ```txt
//! \greet #1->Hello, #1!
//! #1<-World
//! ```

use crate::prefix;
use texcraft_stdext::collections::scopedmap::ScopedVec;
use texlang::parse::OptionalEquals;
use texlang::prelude as txl;
use texlang::token::{write_tokens, Token};
use texlang::traits::*;
use texlang::*;

const TRACING_MACROS: usize = 0;

/// Component for storing state related to macro tracing.
#[derive(Default)]
pub struct Component {
    values: ScopedVec<i32>,
}

impl Component {
    /// Returns the current value of `\tracingmacros`.
    pub fn tracing_macros(&self) -> i32 {
        self.values.get(&TRACING_MACROS).copied().unwrap_or(0)
    }

    pub fn set_tracing_macros(&mut self, value: i32, scope: command::Scope) {
        self.values.insert(TRACING_MACROS, value, scope);
    }

    pub fn begin_group(&mut self) {
        self.values.begin_group();
    }

    pub fn end_group(&mut self) {
        if self.values.end_group().is_err() {
            log::warn!("\\tracingmacros: ended a group that was never begun");
        }
    }
}

static TRACING_MACROS_TAG: command::StaticTag = command::StaticTag::new();

pub fn tracingmacros_tag() -> command::Tag {
    TRACING_MACROS_TAG.get()
}

/// Get the `\tracingmacros` command.
pub fn get_tracingmacros<S>() -> command::BuiltIn<S>
where
    S: HasComponent<Component> + HasComponent<prefix::Component>,
{
    command::BuiltIn::new_execution(tracingmacros_primitive_fn::<S>)
        .with_tag(tracingmacros_tag())
        .with_doc("Log every macro expansion when set to a positive number")
}

fn tracingmacros_primitive_fn<S>(_: Token, input: &mut vm::ExecutionInput<S>) -> txl::Result<()>
where
    S: HasComponent<Component> + HasComponent<prefix::Component>,
{
    let scope = HasComponent::<prefix::Component>::component_mut(input.state_mut()).take_scope();
    let (_, value) = <(OptionalEquals, i32)>::parse(input)?;
    HasComponent::<Component>::component_mut(input.state_mut()).set_tracing_macros(value, scope);
    Ok(())
}

/// Hook that logs macro expansions.
///
/// States that include this component should call this function
/// from their implementation of [TexlangState::post_macro_expansion_hook].
pub fn hook<S: HasComponent<Component>>(
    token: Token,
    input: &vm::ExpansionInput<S>,
    tex_macro: &texmacro::Macro,
    arguments: &[&[Token]],
    reversed_expansion: &[Token],
) {
    _ = reversed_expansion;
    if input.state().component().tracing_macros() <= 0 {
        return;
    }
    let name = match token.command_ref() {
        None => return,
        Some(command_ref) => command_ref.to_string(input.vm().cs_name_interner()),
    };
    for line in format(&name, tex_macro, arguments, input.vm().cs_name_interner()) {
        log::info!("{line}");
    }
}

/// Returns the lines TeX logs for an expansion of the macro with the provided arguments.
pub fn format(
    name: &str,
    tex_macro: &texmacro::Macro,
    arguments: &[&[Token]],
    interner: &token::CsNameInterner,
) -> Vec<String> {
    let meaning = tex_macro.meaning(interner);
    let definition = match meaning.split_once("macro:") {
        None => meaning.as_str(),
        Some((_, definition)) => definition,
    };
    let separator = if name.chars().skip(1).any(char::is_alphabetic) {
        " "
    } else {
        ""
    };
    let mut lines = vec![format!["{name}{separator}{definition}"]];
    for (i, argument) in arguments.iter().enumerate() {
        lines.push(format!["#{}<-{}", i + 1, write_tokens(*argument, interner)]);
    }
    lines
}
