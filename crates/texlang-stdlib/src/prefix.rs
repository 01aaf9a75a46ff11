//! The `\global`, `\long`, `\outer` and `\protected` prefix commands
//!
//! The `\long`, `\outer` and `\protected` prefixes change how a macro behaves when it is used.
//! A macro defined with `\long` may receive `\par` in its arguments.
//! A macro defined with `\outer` may not appear in arguments, parameter texts or replacement texts.
//! A macro defined with `\protected` is not expanded inside `\edef` and `\xdef`.
//! These three prefixes can only come before `\def`, `\gdef`, `\edef` and `\xdef`.
//! The `\global` prefix can additionally come before `\let`, `\futurelet`, `\catcode`
//!     and the other commands registered in [Component].
//!
//! # Developer notes
//!
//! The prefixes change, at run time, the behavior of the command that follows them.
//! It is impossible to scope the prefixes tightly because of this.
//!
//! We maintain a component which stores the pending prefixes.
//! They are set by the prefix commands and read by the prefixed command.
//! The problem is that the prefixes need to be reset at some point;
//!     otherwise, `\global` would make *all* subsequent assignments global.
//! To do this we introduce a convention: any command which can be prefixed
//!   reads the prefixes a single time using the [Component::take_global]
//!   or [Component::take_flags] methods.
//! These methods return the pending value and reset it.
//!
//! In order for the convention to work correctly it is essential that *all* code
//!   paths within the command call the take methods, even if they don't use the result!
//! For example `\gdef` always creates a macro in the global scope, but it still needs to
//!   call [take_global](Component::take_global).
//! This behavior should be verified with unit tests, and this module provides
//!   an [assert_global_is_false](get_assert_global_is_false) execution command
//!   to make this easy.

use std::collections::HashSet;
use texlang::prelude as txl;
use texlang::texmacro;
use texlang::token::trace;
use texlang::traits::*;
use texlang::*;

/// Component for the prefix commands.
pub struct Component {
    global: bool,
    flags: texmacro::Flags,
    prefixable_with_global: HashSet<command::Tag>,
    prefixable_with_any: HashSet<command::Tag>,
}

impl Default for Component {
    fn default() -> Self {
        Component {
            global: false,
            flags: Default::default(),
            prefixable_with_global: [
                crate::alias::let_tag(),
                crate::alias::futurelet_tag(),
                crate::catcode::catcode_tag(),
                crate::tracingmacros::tracingmacros_tag(),
            ]
            .into_iter()
            .collect(),
            prefixable_with_any: [crate::def::def_tag()].into_iter().collect(),
        }
    }
}

impl Component {
    /// Get the value of the global flag and reset the flag to false.
    ///
    /// See the module documentation for correct usage of this method.
    pub fn take_global(&mut self) -> bool {
        std::mem::take(&mut self.global)
    }

    /// Get the scope implied by the global flag and reset the flag.
    pub fn take_scope(&mut self) -> command::Scope {
        if self.take_global() {
            command::Scope::Global
        } else {
            command::Scope::Local
        }
    }

    /// Get the pending macro flags and reset them.
    pub fn take_flags(&mut self) -> texmacro::Flags {
        std::mem::take(&mut self.flags)
    }
}

#[derive(Default, Clone, Copy)]
struct Prefix {
    global: Option<token::Token>,
    long: Option<token::Token>,
    outer: Option<token::Token>,
    protected: Option<token::Token>,
}

impl Prefix {
    fn get_one(&self) -> (token::Token, Kind) {
        if let Some(global_token) = self.global {
            (global_token, Kind::Global)
        } else if let Some(long_token) = self.long {
            (long_token, Kind::Long)
        } else if let Some(outer_token) = self.outer {
            (outer_token, Kind::Outer)
        } else if let Some(protected_token) = self.protected {
            (protected_token, Kind::Protected)
        } else {
            unreachable!("a prefix is created with at least one token")
        }
    }

    // Returns a prefix other than \global, if there is one.
    fn get_non_global(&self) -> Option<(token::Token, Kind)> {
        if let Some(long_token) = self.long {
            Some((long_token, Kind::Long))
        } else if let Some(outer_token) = self.outer {
            Some((outer_token, Kind::Outer))
        } else {
            self.protected
                .map(|protected_token| (protected_token, Kind::Protected))
        }
    }

    fn set(&mut self, kind: Kind, token: token::Token) {
        match kind {
            Kind::Global => self.global = Some(token),
            Kind::Long => self.long = Some(token),
            Kind::Outer => self.outer = Some(token),
            Kind::Protected => self.protected = Some(token),
        }
    }
}

static GLOBAL_TAG: command::StaticTag = command::StaticTag::new();
static LONG_TAG: command::StaticTag = command::StaticTag::new();
static OUTER_TAG: command::StaticTag = command::StaticTag::new();
static PROTECTED_TAG: command::StaticTag = command::StaticTag::new();

/// Get the `\global` command.
pub fn get_global<S: HasComponent<Component>>() -> command::BuiltIn<S> {
    command::BuiltIn::new_execution(global_primitive_fn)
        .with_tag(GLOBAL_TAG.get())
        .with_doc("Make the following assignment global")
}

/// Get the `\long` command.
pub fn get_long<S: HasComponent<Component>>() -> command::BuiltIn<S> {
    command::BuiltIn::new_execution(long_primitive_fn)
        .with_tag(LONG_TAG.get())
        .with_doc("Allow the following macro to receive \\par in its arguments")
}

/// Get the `\outer` command.
pub fn get_outer<S: HasComponent<Component>>() -> command::BuiltIn<S> {
    command::BuiltIn::new_execution(outer_primitive_fn)
        .with_tag(OUTER_TAG.get())
        .with_doc("Forbid the following macro from appearing in arguments and definitions")
}

/// Get the `\protected` command.
pub fn get_protected<S: HasComponent<Component>>() -> command::BuiltIn<S> {
    command::BuiltIn::new_execution(protected_primitive_fn)
        .with_tag(PROTECTED_TAG.get())
        .with_doc("Stop the following macro from being expanded inside \\edef")
}

fn global_primitive_fn<S: HasComponent<Component>>(
    global_token: token::Token,
    input: &mut vm::ExecutionInput<S>,
) -> txl::Result<()> {
    let mut prefix: Prefix = Default::default();
    prefix.set(Kind::Global, global_token);
    process_prefixes(prefix, input)
}

fn long_primitive_fn<S: HasComponent<Component>>(
    long_token: token::Token,
    input: &mut vm::ExecutionInput<S>,
) -> txl::Result<()> {
    let mut prefix: Prefix = Default::default();
    prefix.set(Kind::Long, long_token);
    process_prefixes(prefix, input)
}

fn outer_primitive_fn<S: HasComponent<Component>>(
    outer_token: token::Token,
    input: &mut vm::ExecutionInput<S>,
) -> txl::Result<()> {
    let mut prefix: Prefix = Default::default();
    prefix.set(Kind::Outer, outer_token);
    process_prefixes(prefix, input)
}

fn protected_primitive_fn<S: HasComponent<Component>>(
    protected_token: token::Token,
    input: &mut vm::ExecutionInput<S>,
) -> txl::Result<()> {
    let mut prefix: Prefix = Default::default();
    prefix.set(Kind::Protected, protected_token);
    process_prefixes(prefix, input)
}

fn process_prefixes<S: HasComponent<Component>>(
    mut prefix: Prefix,
    input: &mut vm::ExecutionInput<S>,
) -> txl::Result<()> {
    complete_prefix(&mut prefix, input)?;
    let t = match input.peek()? {
        None => {
            let (prefix_token, kind) = prefix.get_one();
            return Err(error::SimpleEndOfInputError::new(
                input.vm(),
                format![
                    "end of input after the prefix command {}",
                    input.vm().trace(prefix_token).value
                ],
            )
            .with_note(kind.guidance())
            .into());
        }
        Some(&t) => t,
    };
    let tag = match t.command_ref() {
        None => {
            let (prefix_token, _) = prefix.get_one();
            return Err(InvalidPrefixError::new(input.vm(), t, prefix_token, None).into());
        }
        Some(command_ref) => input.commands_map().get_tag(&command_ref),
    };
    let component = input.state().component();
    let (accepts_global, accepts_any) = match tag {
        None => (false, false),
        Some(tag) => (
            component.prefixable_with_global.contains(&tag),
            component.prefixable_with_any.contains(&tag),
        ),
    };
    if accepts_any {
        let component = input.state_mut().component_mut();
        component.global = prefix.global.is_some();
        component.flags = texmacro::Flags {
            long: prefix.long.is_some(),
            outer: prefix.outer.is_some(),
            protected: prefix.protected.is_some(),
        };
        return Ok(());
    }
    if accepts_global {
        if let Some((prefix_token, kind)) = prefix.get_non_global() {
            return Err(InvalidPrefixError::new(input.vm(), t, prefix_token, Some(kind)).into());
        }
        input.state_mut().component_mut().global = true;
        return Ok(());
    }
    let (prefix_token, kind) = prefix.get_one();
    Err(InvalidPrefixError::new(input.vm(), t, prefix_token, Some(kind)).into())
}

// Consumes any further prefix commands, along with spaces and \relax commands between them.
fn complete_prefix<S: HasComponent<Component>>(
    prefix: &mut Prefix,
    input: &mut vm::ExecutionInput<S>,
) -> txl::Result<()> {
    loop {
        let t = match input.peek()? {
            None => return Ok(()),
            Some(&t) => t,
        };
        let command_ref = match t.value() {
            token::Value::Space(_) => {
                input.consume()?;
                continue;
            }
            token::Value::CommandRef(command_ref) => command_ref,
            _ => return Ok(()),
        };
        if let Some(command::Command::Relax) = input.commands_map().get_command(&command_ref) {
            input.consume()?;
            continue;
        }
        let kind = match input.commands_map().get_tag(&command_ref) {
            Some(tag) if tag == GLOBAL_TAG.get() => Kind::Global,
            Some(tag) if tag == LONG_TAG.get() => Kind::Long,
            Some(tag) if tag == OUTER_TAG.get() => Kind::Outer,
            Some(tag) if tag == PROTECTED_TAG.get() => Kind::Protected,
            _ => return Ok(()),
        };
        prefix.set(kind, t);
        input.consume()?;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Global,
    Long,
    Outer,
    Protected,
}

impl Kind {
    fn guidance(&self) -> &'static str {
        match self {
            Kind::Global => {
                r"the \global prefix can be used with \def, \gdef, \edef, \xdef, \let, \futurelet, \catcode and \tracingmacros"
            }
            Kind::Long => {
                r"the \long prefix can only be used with \def, \gdef, \edef and \xdef (or their aliases)"
            }
            Kind::Outer => {
                r"the \outer prefix can only be used with \def, \gdef, \edef and \xdef (or their aliases)"
            }
            Kind::Protected => {
                r"the \protected prefix can only be used with \def, \gdef, \edef and \xdef (or their aliases)"
            }
        }
    }
}

/// Error returned when a prefix is followed by a token that cannot be prefixed.
#[derive(Debug)]
pub struct InvalidPrefixError {
    target: trace::SourceCodeTrace,
    prefix: trace::SourceCodeTrace,
    // None if the target is a character token.
    kind: Option<Kind>,
}

impl InvalidPrefixError {
    fn new<S>(
        vm: &vm::VM<S>,
        target: token::Token,
        prefix: token::Token,
        kind: Option<Kind>,
    ) -> InvalidPrefixError {
        InvalidPrefixError {
            target: vm.trace(target),
            prefix: vm.trace(prefix),
            kind,
        }
    }
}

impl error::TexError for InvalidPrefixError {
    fn code(&self) -> error::Code {
        error::Code::InvalidPrefix
    }

    fn kind(&self) -> error::Kind {
        error::Kind::Token(&self.target)
    }

    fn title(&self) -> String {
        match self.kind {
            None => format![
                "character tokens cannot be prefixed with {}",
                self.prefix.value
            ],
            Some(_) => format![
                "the command {} cannot be prefixed with {}",
                self.target.value, self.prefix.value
            ],
        }
    }

    fn notes(&self) -> Vec<error::display::Note> {
        match self.kind {
            None => vec![],
            Some(kind) => vec![kind.guidance().into()],
        }
    }
}

/// Get an execution command that checks that the global flag is off.
///
/// This command is used for unit testing Texlang.
/// It tests that functions that can be prefixed with `\global`
/// are following the convention described in the module docs.
/// To use it, create a test for the following TeX snippet:
/// ```tex
/// \global \command <input to command> \assertGlobalIsFalse
/// ```
pub fn get_assert_global_is_false<S: HasComponent<Component>>() -> command::BuiltIn<S> {
    fn noop_execution_cmd_fn<S: HasComponent<Component>>(
        token: token::Token,
        input: &mut vm::ExecutionInput<S>,
    ) -> txl::Result<()> {
        if input.state_mut().component_mut().take_global() {
            Err(error::SimpleTokenError::new(input.vm(), token, "assertion failed: global is true").into())
        } else {
            Ok(())
        }
    }
    command::BuiltIn::new_execution(noop_execution_cmd_fn)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{alias, def, expansion};
    use std::collections::HashMap;
    use texlang::vm::implement_has_component;
    use texlang_testing::*;

    #[derive(Default)]
    struct State {
        prefix: Component,
        testing: TestingComponent,
    }

    impl TexlangState for State {}

    implement_has_component![
        State,
        (Component, prefix),
        (TestingComponent, testing),
    ];

    fn built_in_commands() -> HashMap<&'static str, command::BuiltIn<State>> {
        HashMap::from([
            ("def", def::get_def()),
            ("edef", def::get_edef()),
            ("let", alias::get_let()),
            ("global", get_global()),
            ("long", get_long()),
            ("outer", get_outer()),
            ("protected", get_protected()),
            ("relax", expansion::get_relax()),
            ("assertGlobalIsFalse", get_assert_global_is_false()),
        ])
    }

    test_suite![
        expansion_equality_tests(
            (long, r"\long\def\A{Hello}\A", "Hello"),
            (outer, r"\outer\def\A{Hello}\A", "Hello"),
            (protected, r"\protected\def\A{Hello}\A", "Hello"),
            (
                many_prefixes,
                r"\long\outer\global\long\global\outer\protected\def\A{Hello}\A",
                "Hello"
            ),
            (
                prefixes_separated_by_spaces_and_relax,
                r"\global \relax\long  \def\A{Hello}\A",
                "Hello"
            ),
            (global_def, r"{\global\def\A{Hello}}\A", "Hello"),
            (global_global_def, r"{\global\global\def\A{Hello}}\A", "Hello"),
            (global_let, r"\def\B{Hello}{\global\let\A=\B}\A", "Hello"),
            (
                global_is_reset,
                r"\global\def\A{Hello}\assertGlobalIsFalse",
                ""
            ),
            (long_accepts_par, r"\long\def\A#1{x}\A\par", "x"),
            (
                prefix_target_from_macro,
                r"\def\mydef{\def}{\global\mydef\A{Hello}}\A",
                "Hello"
            ),
        ),
    ];

    test_suite![
        failure_tests(
            (global_end_of_input, r"\global", error::Code::UnexpectedEndOfInput),
            (global_with_character, r"\global a", error::Code::InvalidPrefix),
            (
                global_with_undefined_command,
                r"\global \undefinedCommand",
                error::Code::InvalidPrefix
            ),
            (
                global_with_relax_then_character,
                r"\global\relax a",
                error::Code::InvalidPrefix
            ),
            (
                flags_are_reset,
                r"\long\def\A{}\def\B#1{x}\B\par",
                error::Code::RunawayArgument
            ),
            (
                global_with_relax_at_end,
                r"\global\relax",
                error::Code::UnexpectedEndOfInput
            ),
            (long_let, r"\long\let\A=\def", error::Code::InvalidPrefix),
            (outer_let, r"\outer\let\A=\def", error::Code::InvalidPrefix),
            (protected_let, r"\protected\let\A=\def", error::Code::InvalidPrefix),
            (
                global_with_execution_command,
                r"\global\assertGlobalIsFalse",
                error::Code::InvalidPrefix
            ),
        ),
    ];

    #[test]
    fn long_flag_reaches_macro() {
        let mut vm = vm::VM::<State>::new(built_in_commands());
        vm.push_source("", r"\long\outer\def\A{} \def\B{}");
        vm.run::<vm::DefaultHandlers>().unwrap();
        let name = vm.cs_name_interner().get("A").unwrap();
        match vm
            .commands_map
            .get_command(&token::CommandRef::ControlSequence(name))
        {
            Some(command::Command::Macro(tex_macro)) => {
                assert_eq!(
                    tex_macro.flags(),
                    texmacro::Flags {
                        long: true,
                        outer: true,
                        protected: false
                    }
                );
            }
            _ => panic!("expected a macro"),
        }
        let name = vm.cs_name_interner().get("B").unwrap();
        match vm
            .commands_map
            .get_command(&token::CommandRef::ControlSequence(name))
        {
            Some(command::Command::Macro(tex_macro)) => {
                assert_eq!(tex_macro.flags(), Default::default());
            }
            _ => panic!("expected a macro"),
        }
    }
}
