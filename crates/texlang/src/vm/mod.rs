//! The Texlang virtual machine (VM).
//!
//! This module contains the definition of the runtime VM,
//!     various input streams that wrap the VM
//!     and the main function that is used to run Texlang.

use super::token::CsName;
use crate::command;
use crate::command::BuiltIn;
use crate::command::Command;
use crate::error;
use crate::prelude as txl;
use crate::texmacro;
use crate::token;
use crate::token::lexer;
use crate::token::trace;
use crate::token::CsNameInterner;
use crate::token::Token;
use crate::token::Value;
use std::collections::HashMap;
use std::path::PathBuf;

mod streams;
pub use streams::*;

/// Implementations of this trait determine how the VM handles non-execution-command tokens.
///
/// The main loop of the VM reads the next expanded token and performs
///     some action based on the token.
/// Many cases are handled automatically based on the semantics of the TeX language:
///
/// | token type | example | action |
/// | -- | -- | -- |
/// | execution command | `\def` | run the command |
/// | token alias | `\a` after `\let\a=a` | run the main VM loop for the token that is aliased |
/// | relax | `\relax` | do nothing |
/// | begin group character | `{` | begin a group
/// | end group character | `}` | end the current group
///
/// The remaining cases are not specified by the TeX language but instead by
///     the business logic of the TeX engine being built.
/// The behavior in these cases is specified by implementing the associated handler.
/// These cases and handlers are:
///
/// | token type | example | handler | default |
/// | --- | --- | --- | --- |
/// | character token | `b` | [character_handler](Handlers::character_handler) | do nothing
/// | undefined command | `\b` where `\b` was never defined | [undefined_command_handler](Handlers::undefined_command_handler) | return an undefined control sequence error
/// | unexpanded expansion command | `\a` in `\noexpand\a` | [unexpanded_expansion_command](Handlers::unexpanded_expansion_command) | do nothing
///
/// Each of the handlers has the same function signature as an execution command.
/// The character handler is the sink through which fully expanded text leaves the VM.
pub trait Handlers<S: TexlangState> {
    /// Handler to invoke for character tokens.
    ///
    /// This is _not_ invoked for tokens whose category code is begin group (1), end group (2) or active character (13).
    /// These cases are handled automatically by the VM based on the semantics of the TeX language.
    fn character_handler(token: token::Token, input: &mut ExecutionInput<S>) -> txl::Result<()> {
        _ = (token, input);
        Ok(())
    }

    /// Handler to invoke for a control sequence or active character for which no command is defined.
    fn undefined_command_handler(
        token: token::Token,
        input: &mut ExecutionInput<S>,
    ) -> txl::Result<()> {
        Err(error::UndefinedCommandError::new(input.vm(), token).into())
    }

    /// Handler to invoke for expansion commands that were not expanded.
    ///
    /// This handles the `\a` token in `\noexpand\a`.
    fn unexpanded_expansion_command(
        token: token::Token,
        input: &mut ExecutionInput<S>,
    ) -> txl::Result<()> {
        _ = (token, input);
        Ok(())
    }
}

pub struct DefaultHandlers;

impl<S: TexlangState> Handlers<S> for DefaultHandlers {}

impl<S: TexlangState> VM<S> {
    /// Run the VM.
    ///
    /// It is assumed that the VM has been preloaded with TeX source code using the
    /// [VM::push_source] method.
    pub fn run<H: Handlers<S>>(&mut self) -> txl::Result<()> {
        self.internal.deferred_insertions.clear();
        let input = ExecutionInput::new(self);
        loop {
            let mark = input.expanded().deferred_insertions();
            let token = match input.next()? {
                None => break,
                Some(token) => token,
            };
            match token.value() {
                Value::CommandRef(command_ref) => {
                    match input.commands_map().get_command(&command_ref) {
                        Some(Command::Execution(cmd, _)) => {
                            let cmd = *cmd;
                            if let Err(err) = cmd(token, input) {
                                return Err(error::Error::new_propagated(
                                    input.vm(),
                                    error::PropagationContext::Execution,
                                    token,
                                    err,
                                ));
                            }
                        }
                        Some(Command::CharacterTokenAlias(token_value)) => {
                            let token_value = *token_value;
                            let aliased = Token::new_from_value(token_value, token.trace_key());
                            match token_value {
                                Value::BeginGroup(_) => input.begin_group(GroupKind::Brace),
                                Value::EndGroup(_) => input.end_group(aliased, GroupKind::Brace)?,
                                _ => H::character_handler(aliased, input)?,
                            }
                        }
                        Some(Command::Expansion(_, _)) | Some(Command::Macro(_)) => {
                            H::unexpanded_expansion_command(token, input)?
                        }
                        Some(Command::Relax) => {}
                        None => H::undefined_command_handler(token, input)?,
                    }
                }
                Value::BeginGroup(_) => {
                    input.begin_group(GroupKind::Brace);
                }
                Value::EndGroup(_) => {
                    input.end_group(token, GroupKind::Brace)?;
                }
                Value::MathShift(_)
                | Value::AlignmentTab(_)
                | Value::Parameter(_)
                | Value::Superscript(_)
                | Value::Subscript(_)
                | Value::Space(_)
                | Value::Letter(_)
                | Value::Other(_) => H::character_handler(token, input)?,
            };
            input.expanded().flush_deferred_insertions(mark);
        }
        Ok(())
    }
}

/// The kind of a group.
///
/// A group must be closed by the same kind of token or command that opened it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// A group delimited by `{` and `}`.
    Brace,
    /// A group delimited by `\begingroup` and `\endgroup`.
    Semisimple,
    /// A group opened from Rust using [VM::begin_scope].
    Scope,
}

#[derive(Debug)]
struct EndOfGroupError {
    trace: trace::SourceCodeTrace,
    expected: Option<GroupKind>,
}

impl error::TexError for EndOfGroupError {
    fn code(&self) -> error::Code {
        error::Code::ExtraEndGroup
    }

    fn kind(&self) -> error::Kind {
        error::Kind::Token(&self.trace)
    }

    fn title(&self) -> String {
        match self.expected {
            None => "there is no group to end".into(),
            Some(GroupKind::Brace) => "this group was opened with `{` and must be closed with `}`".into(),
            Some(GroupKind::Semisimple) => {
                "this group was opened with `\\begingroup` and must be closed with `\\endgroup`".into()
            }
            Some(GroupKind::Scope) => "this group was opened by the engine and cannot be closed here".into(),
        }
    }
}

#[derive(Debug)]
struct InvalidCharacterError {
    trace: trace::SourceCodeTrace,
}

impl error::TexError for InvalidCharacterError {
    fn code(&self) -> error::Code {
        error::Code::InvalidCharacter
    }

    fn kind(&self) -> error::Kind {
        error::Kind::Token(&self.trace)
    }

    fn title(&self) -> String {
        format!["invalid character `{}`", self.trace.value]
    }

    fn notes(&self) -> Vec<error::display::Note> {
        vec!["characters with category code 15 (invalid) may not appear in the input".into()]
    }
}

/// The Texlang virtual machine.
pub struct VM<S> {
    /// The state
    pub state: S,

    /// The commands map
    pub commands_map: command::Map<S>,

    internal: Internal,
}

/// Implementations of this trait may be used as the state in a Texlang VM.
///
/// The most important thing to know about this trait is that it has no required methods.
/// For any type it can be implemented trivially:
/// ```
/// # use texlang::traits::TexlangState;
/// struct SomeNewType;
///
/// impl TexlangState for SomeNewType {}
/// ```
///
/// Methods of the trait are invoked at certain points when the VM is running,
///     and in general offer a way of customizing the behavior of the VM.
/// The trait methods are all dispatched statically, which is important for performance.
pub trait TexlangState: Sized {
    /// Get the cat code for the provided character.
    ///
    /// The default implementation returns the cat code used in plainTeX.
    fn cat_code(&self, c: char) -> token::CatCode {
        token::CatCode::plain_tex_default(c)
    }

    /// Hook that is invoked after a TeX macro is expanded.
    ///
    /// This hook is designed to support the `\tracingmacros` primitive.
    fn post_macro_expansion_hook(
        token: Token,
        input: &ExpansionInput<Self>,
        tex_macro: &texmacro::Macro,
        arguments: &[&[Token]],
        reversed_expansion: &[Token],
    ) {
        _ = (token, input, tex_macro, arguments, reversed_expansion);
    }

    /// Hook that potentially overrides the expansion of a command.
    ///
    /// This hook is invoked before an expandable token is expanded.
    /// If the result of the hook is a token, that token is considered the expansion of
    ///   the command and it is not expanded further.
    ///
    /// This hook is designed to support the `\noexpand` primitive.
    fn expansion_override_hook(
        token: token::Token,
        input: &mut ExpansionInput<Self>,
        tag: Option<command::Tag>,
    ) -> txl::Result<Option<Token>> {
        _ = (token, input, tag);
        Ok(None)
    }

    /// Hook that is invoked when a group begins.
    ///
    /// State that is scoped to groups, like the category code table, should open a scope here.
    fn begin_group_hook(&mut self) {}

    /// Hook that is invoked when a group ends.
    ///
    /// This is the counterpart of [TexlangState::begin_group_hook]
    ///     and is invoked exactly once for each group that was begun.
    fn end_group_hook(&mut self) {}
}

impl TexlangState for () {}

impl<S: Default> VM<S> {
    /// Create a new VM.
    pub fn new(initial_built_ins: HashMap<&str, BuiltIn<S>>) -> Box<VM<S>> {
        let mut internal = Internal::new(Default::default());
        let initial_built_ins = initial_built_ins
            .into_iter()
            .map(|(key, value)| (internal.cs_name_interner.get_or_intern(key), value))
            .collect();
        Box::new(VM {
            state: Default::default(),
            commands_map: command::Map::new(initial_built_ins),
            internal,
        })
    }
}

impl<S: TexlangState> VM<S> {
    /// Add new source code to the VM.
    ///
    /// TeX input source code is organized as a stack.
    /// Pushing source code onto the stack will mean it is executed first.
    pub fn push_source<T1: Into<PathBuf>, T2: Into<String>>(
        &mut self,
        file_name: T1,
        source_code: T2,
    ) {
        self.internal
            .push_source(trace::Origin::File(file_name.into()), source_code.into())
    }

    /// Begin a group that ends when the returned guard is dropped.
    ///
    /// Local assignments made through the guard are undone when it goes out of scope,
    ///     including when the scope is exited early through `?`.
    pub fn begin_scope(&mut self) -> Scope<'_, S> {
        self.begin_group(GroupKind::Scope);
        Scope { vm: self }
    }
}

impl<S> VM<S> {
    /// Clear all source code from the VM.
    pub fn clear_sources(&mut self) {
        self.internal.clear_sources()
    }

    /// Return a regular hash map with all the commands as they are currently defined.
    ///
    /// This function is extremely slow and is only intended to be invoked on error paths.
    pub fn get_commands_as_map_slow(&self) -> HashMap<String, BuiltIn<S>> {
        let map_1: HashMap<CsName, BuiltIn<S>> = self.commands_map.to_hash_map_slow();
        let mut map = HashMap::new();
        for (cs_name, cmd) in map_1 {
            let cs_name_str = match self.internal.cs_name_interner.resolve(cs_name) {
                None => continue,
                Some(cs_name_str) => cs_name_str,
            };
            map.insert(cs_name_str.to_string(), cmd);
        }
        map
    }

    /// Names of all control sequences that currently have a meaning.
    pub fn defined_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.get_commands_as_map_slow().into_keys().collect();
        names.sort();
        names
    }

    /// Return a reference to the control sequence name string interner.
    ///
    /// This interner can be used to resolve [CsName] types into regular strings.
    #[inline]
    pub fn cs_name_interner(&self) -> &CsNameInterner {
        &self.internal.cs_name_interner
    }

    /// Return a mutable reference to the control sequence name string interner.
    #[inline]
    pub fn cs_name_interner_mut(&mut self) -> &mut CsNameInterner {
        &mut self.internal.cs_name_interner
    }

    /// Name of the control sequence `\par`.
    ///
    /// Macros that are not `\long` may not receive this control sequence in their arguments.
    #[inline]
    pub fn par_cs_name(&self) -> CsName {
        self.internal.par_cs_name
    }

    pub fn trace(&self, token: Token) -> trace::SourceCodeTrace {
        self.internal
            .tracer
            .trace(token, &self.internal.cs_name_interner)
    }

    pub fn trace_end_of_input(&self) -> trace::SourceCodeTrace {
        self.internal.tracer.trace_end_of_input()
    }

    /// Number of groups that are currently open.
    pub fn group_depth(&self) -> usize {
        self.internal.groups.len()
    }
}

impl<S: TexlangState> VM<S> {
    fn begin_group(&mut self, kind: GroupKind) {
        log::trace!("begin group {:?} at depth {}", kind, self.internal.groups.len());
        self.commands_map.begin_group();
        self.state.begin_group_hook();
        self.internal.groups.push(kind);
    }

    fn end_group(&mut self, token: Option<Token>, kind: GroupKind) -> txl::Result<()> {
        let trace = || match token {
            Some(token) => self.trace(token),
            None => self.trace_end_of_input(),
        };
        match self.internal.groups.last() {
            None => {
                return Err(EndOfGroupError {
                    trace: trace(),
                    expected: None,
                }
                .into())
            }
            Some(open) if *open != kind => {
                return Err(EndOfGroupError {
                    trace: trace(),
                    expected: Some(*open),
                }
                .into())
            }
            Some(_) => {}
        }
        self.internal.groups.pop();
        // The commands map and the groups stack are always pushed together.
        _ = self.commands_map.end_group();
        self.state.end_group_hook();
        log::trace!("end group {:?} at depth {}", kind, self.internal.groups.len());
        Ok(())
    }
}

/// Guard for a group opened with [VM::begin_scope].
///
/// The guard dereferences to the VM.
/// Dropping it ends the group.
pub struct Scope<'a, S: TexlangState> {
    vm: &'a mut VM<S>,
}

impl<'a, S: TexlangState> std::ops::Deref for Scope<'a, S> {
    type Target = VM<S>;
    fn deref(&self) -> &VM<S> {
        self.vm
    }
}

impl<'a, S: TexlangState> std::ops::DerefMut for Scope<'a, S> {
    fn deref_mut(&mut self) -> &mut VM<S> {
        self.vm
    }
}

impl<'a, S: TexlangState> Drop for Scope<'a, S> {
    fn drop(&mut self) {
        // Groups opened by TeX code inside the scope are closed too.
        while let Some(kind) = self.vm.internal.groups.last().copied() {
            _ = self.vm.end_group(None, kind);
            if kind == GroupKind::Scope {
                break;
            }
        }
    }
}

/// Parts of the VM that are private.
struct Internal {
    // The sources form a stack. We store the top element directly on the VM
    // for performance reasons.
    current_source: Source,
    sources: Vec<Source>,

    cs_name_interner: CsNameInterner,
    par_cs_name: CsName,

    tracer: trace::Tracer,

    token_buffers: std::collections::BinaryHeap<TokenBuffer>,

    groups: Vec<GroupKind>,

    // Tokens waiting to be inserted once the token currently at the front of the input
    // has been processed. Used by `\expandafter` when its second token is not expandable.
    deferred_insertions: Vec<Vec<Token>>,
}

impl Internal {
    fn new(mut cs_name_interner: CsNameInterner) -> Self {
        let par_cs_name = cs_name_interner.get_or_intern("par");
        Internal {
            current_source: Default::default(),
            sources: Default::default(),
            cs_name_interner,
            par_cs_name,
            tracer: Default::default(),
            token_buffers: Default::default(),
            groups: Default::default(),
            deferred_insertions: Default::default(),
        }
    }

    fn push_source(&mut self, origin: trace::Origin, source_code: String) {
        let trace_key_range = self
            .tracer
            .register_source_code(None, origin, &source_code);
        let mut new_source = Source::new(source_code, trace_key_range);
        std::mem::swap(&mut new_source, &mut self.current_source);
        self.sources.push(new_source);
    }

    fn clear_sources(&mut self) {
        self.current_source = Default::default();
        self.sources.clear();
    }

    #[inline]
    fn push_expansion(&mut self, expansion: &[Token]) {
        self.current_source
            .expansions
            .extend(expansion.iter().rev());
    }

    fn flush_deferred_insertions(&mut self, since: usize) {
        while self.deferred_insertions.len() > since {
            if let Some(tokens) = self.deferred_insertions.pop() {
                self.push_expansion(&tokens);
            }
        }
    }

    #[inline]
    fn expansions(&self) -> &Vec<Token> {
        &self.current_source.expansions
    }

    #[inline]
    fn expansions_mut(&mut self) -> &mut Vec<Token> {
        &mut self.current_source.expansions
    }

    fn pop_source(&mut self) -> bool {
        match self.sources.pop() {
            None => false,
            Some(source) => {
                self.current_source = source;
                true
            }
        }
    }
}

struct Source {
    // Tokens pushed back onto the input. This is a stack: the next token is the last element.
    expansions: Vec<Token>,
    root: lexer::Lexer,
}

impl Source {
    pub fn new(source_code: String, trace_key_range: trace::KeyRange) -> Source {
        Source {
            expansions: Vec::with_capacity(32),
            root: lexer::Lexer::new(source_code, trace_key_range),
        }
    }
}

impl Default for Source {
    fn default() -> Self {
        Source::new("".into(), trace::KeyRange::empty())
    }
}

#[derive(Default)]
struct TokenBuffer(Vec<Token>);

impl PartialEq for TokenBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.0.capacity() == other.0.capacity()
    }
}

impl Eq for TokenBuffer {}

impl PartialOrd for TokenBuffer {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TokenBuffer {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.capacity().cmp(&other.0.capacity())
    }
}

/// Helper trait for implementing the component pattern in Texlang.
///
/// In the component pattern, the state needed by a specific command (for example,
///     the pending prefixes read by `\global` and `\long`) is isolated in a _component_,
///     a concrete Rust type defined in the same module as the command.
/// The internals of the component are private to that module,
///     so the state can only be mutated by the commands implemented there.
///
/// The command specifies `HasComponent<Component>` in its trait bounds
///     and uses the trait to access the component.
/// Different VM states can include the same component and thus reuse the same commands,
///     and combining many commands into one state just involves having the state include
///     all of the relevant components.
///
/// This trait requires that the type also implements [TexlangState],
///     which saves commands from spelling out both bounds.
pub trait HasComponent<C>: TexlangState {
    /// Return a immutable reference to the component.
    fn component(&self) -> &C;

    /// Return a mutable reference to the component.
    fn component_mut(&mut self) -> &mut C;
}

/// This macro is for implementing the [HasComponent] trait in the special (but common)
///     case when the state is a struct and the component is a direct field of the struct.
///
/// ## Examples
///
/// Implementing a single component:
///
/// ```
/// # mod mylibrary{
/// #   pub struct Component;
/// # }
/// # use texlang::vm::implement_has_component;
/// # use texlang::traits::*;
/// #
/// struct MyState {
///     component: mylibrary::Component,
/// }
///
/// impl TexlangState for MyState {}
///
/// implement_has_component![MyState, mylibrary::Component, component];
/// ```
///
/// Implementing multiple components:
///
/// ```
/// # mod mylibrary1{
/// #   pub struct Component;
/// # }
/// # mod mylibrary2{
/// #   pub struct Component;
/// # }
/// # use texlang::vm::implement_has_component;
/// # use texlang::traits::*;
/// #
/// struct MyState {
///     component_1: mylibrary1::Component,
///     component_2: mylibrary2::Component,
/// }
///
/// impl TexlangState for MyState {}
///
/// implement_has_component![
///     MyState,
///     (mylibrary1::Component, component_1),
///     (mylibrary2::Component, component_2),
/// ];
/// ```
#[macro_export]
macro_rules! implement_has_component {
    ( $type: path, $component: path, $field: ident ) => {
        $crate::implement_has_component![$type, ($component, $field),];
    };
    ( $type: path, $(($component: path, $field: ident),)+) => {
        $(
            impl $crate::vm::HasComponent<$component> for $type {
                #[inline]
                fn component(&self) -> &$component {
                    &self.$field
                }
                #[inline]
                fn component_mut(&mut self) -> &mut $component {
                    &mut self.$field
                }
            }
        )*
    };
}

pub use implement_has_component;
