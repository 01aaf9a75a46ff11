//! Meanings that control sequences and active characters can be bound to
//!
//! Every control sequence or active character either has no meaning or is bound to a [Command].
//! Built-in primitives are Rust functions registered when the VM is created.
//! Macros are built at run time by the `\def` family.
//! The `\let` family copies an existing meaning, which may be a character token.
//!
//! Primitives come in two flavors.
//! *Expansion* primitives read tokens from the input and push tokens back.
//! `\expandafter`, `\noexpand` and `\csname` are expansion primitives.
//! They run whenever the VM reads expanded input, including inside `\edef` and `\csname`.
//! *Execution* primitives change the state, for example by binding a name or
//!     changing a category code.
//! They only run in the VM's main loop, so `\edef` copies them into the replacement text unchanged.
//! `\futurelet` is unusual in that it is an execution primitive that also pushes a token back.

use crate::prelude as txl;
use crate::texmacro;
use crate::token;
use crate::vm;
use std::num;
use std::rc;
use std::sync;

pub(crate) mod map;

pub use map::Map;
pub use map::Scope;

/// Function that implements an expansion primitive.
pub type ExpansionFn<S> =
    fn(token: token::Token, input: &mut vm::ExpansionInput<S>) -> txl::Result<()>;

/// Function that implements an execution primitive.
pub type ExecutionFn<S> =
    fn(token: token::Token, input: &mut vm::ExecutionInput<S>) -> txl::Result<()>;

/// A TeX command: the meaning bound to a control sequence or active character.
pub enum Command<S> {
    /// A primitive that rearranges the input.
    ///
    /// Examples: `\expandafter`, `\csname`.
    Expansion(ExpansionFn<S>, Option<Tag>),

    /// A macro built by `\def`, `\edef` and friends.
    Macro(rc::Rc<texmacro::Macro>),

    /// A primitive that changes the state. It is never run during expansion.
    ///
    /// Examples: `\def`, `\let`.
    Execution(ExecutionFn<S>, Option<Tag>),

    /// The meaning of a character token, copied with `\let\cmd=<character>`.
    ///
    /// Reading the command behaves like reading the character.
    CharacterTokenAlias(token::Value),

    /// The do-nothing command `\relax`.
    ///
    /// This is also the meaning given to a control sequence built by `\csname`
    ///     that had no meaning before.
    Relax,
}

impl<S> std::fmt::Display for Command<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Expansion(_, _) => write![f, "an expansion command"],
            Command::Macro(_) => write![f, "a user-defined macro"],
            Command::Execution(_, _) => write![f, "an execution command"],
            Command::CharacterTokenAlias(_) => write![f, "a character token alias"],
            Command::Relax => write![f, "the relax command"],
        }
    }
}

impl<S> Command<S> {
    /// The command's tag. Macros, aliases and `\relax` are never tagged.
    pub fn tag(&self) -> Option<Tag> {
        match self {
            Command::Expansion(_, tag) => *tag,
            Command::Execution(_, tag) => *tag,
            Command::Macro(_) | Command::CharacterTokenAlias(_) | Command::Relax => None,
        }
    }

    /// Whether the VM expands this command when reading expanded input.
    pub fn is_expandable(&self) -> bool {
        matches!(self, Command::Expansion(_, _) | Command::Macro(_))
    }
}

/// A command registered when the VM is created, with optional documentation.
///
/// The documentation is what `texlang-expand doc` prints.
pub struct BuiltIn<S> {
    cmd: Command<S>,
    doc: Option<&'static str>,
}

impl<S> BuiltIn<S> {
    /// Wrap an expansion function.
    pub fn new_expansion(t: ExpansionFn<S>) -> BuiltIn<S> {
        t.into()
    }

    /// Wrap an execution function.
    pub fn new_execution(t: ExecutionFn<S>) -> BuiltIn<S> {
        t.into()
    }

    /// Attach a tag so that other primitives can recognize this command.
    ///
    /// Only primitives carry tags; calling this on any other command panics.
    pub fn with_tag(mut self, tag: Tag) -> BuiltIn<S> {
        match &mut self.cmd {
            Command::Expansion(_, t) => *t = Some(tag),
            Command::Execution(_, t) => *t = Some(tag),
            Command::Macro(_) | Command::CharacterTokenAlias(_) | Command::Relax => {
                panic!("cannot add a tag to this type of command")
            }
        }
        self
    }

    pub fn with_doc(mut self, doc: &'static str) -> BuiltIn<S> {
        self.doc = Some(doc);
        self
    }

    pub fn cmd(&self) -> &Command<S> {
        &self.cmd
    }

    pub fn doc(&self) -> Option<&'static str> {
        self.doc
    }
}

// Implemented by hand: deriving would require `S: Clone`.
impl<S> Clone for Command<S> {
    fn clone(&self) -> Self {
        match self {
            Command::Expansion(e, t) => Command::Expansion::<S>(*e, *t),
            Command::Macro(m) => Command::Macro(m.clone()),
            Command::Execution(e, t) => Command::Execution(*e, *t),
            Command::CharacterTokenAlias(tv) => Command::CharacterTokenAlias(*tv),
            Command::Relax => Command::Relax,
        }
    }
}

impl<S> Clone for BuiltIn<S> {
    fn clone(&self) -> Self {
        Self {
            cmd: self.cmd.clone(),
            doc: self.doc,
        }
    }
}

impl<S> From<ExpansionFn<S>> for BuiltIn<S> {
    fn from(cmd: ExpansionFn<S>) -> Self {
        Command::Expansion(cmd, None).into()
    }
}

impl<S> From<rc::Rc<texmacro::Macro>> for BuiltIn<S> {
    fn from(cmd: rc::Rc<texmacro::Macro>) -> Self {
        Command::Macro(cmd).into()
    }
}

impl<S> From<ExecutionFn<S>> for BuiltIn<S> {
    fn from(cmd: ExecutionFn<S>) -> Self {
        Command::Execution(cmd, None).into()
    }
}

impl<S> From<Command<S>> for BuiltIn<S> {
    fn from(cmd: Command<S>) -> Self {
        BuiltIn { cmd, doc: None }
    }
}

/// Identifier attached to a primitive so that other primitives can recognize it.
///
/// Tags are used to implement TeX language semantics in which one command
///     reacts to the identity of another command it reads from the input.
/// An example is `\noexpand`.
/// When the VM is about to expand a command, it checks whether the command carries the
///     `\noexpand` tag and, if so, lets the state's expansion override hook decide
///     what happens to the following token.
/// Another example is `\csname`, which scans tokens until it finds a command
///     with the `\endcsname` tag.
///
/// Because the check is done on the tag and not on the control sequence name,
///     `\let\stop=\endcsname` produces a command that also ends a `\csname` scan.
///
/// Several commands may share a tag. A command has at most one.
///
/// Tags are handed out from a global counter starting at 1.
/// The value is a `NonZeroU32`, so `Option<Tag>` fits in 4 bytes.
#[derive(PartialEq, Eq, Clone, Copy, Debug, PartialOrd, Ord, Hash)]
pub struct Tag(num::NonZeroU32);

static NEXT_TAG_VALUE: sync::atomic::AtomicU32 = sync::atomic::AtomicU32::new(1);

impl Tag {
    /// Returns a tag that differs from every tag created before.
    ///
    /// ```
    /// # use texlang::command::Tag;
    /// assert_ne!(Tag::new(), Tag::new());
    /// ```
    // No Default impl: each call consumes a value of the global counter.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Tag {
        let n = NEXT_TAG_VALUE.fetch_add(1, sync::atomic::Ordering::Relaxed);
        match num::NonZeroU32::new(n) {
            Some(n) => Tag(n),
            None => panic!("all 2^32-1 tags have been used"),
        }
    }
}

/// A tag that can live in a `static`; it is created on first use.
///
/// ```
/// # use texlang::command::StaticTag;
/// static END_TAG: StaticTag = StaticTag::new();
///
/// assert_eq!(END_TAG.get(), END_TAG.get());
/// ```
pub struct StaticTag(std::sync::OnceLock<Tag>);

impl Default for StaticTag {
    fn default() -> Self {
        StaticTag::new()
    }
}

impl StaticTag {
    pub const fn new() -> StaticTag {
        StaticTag(std::sync::OnceLock::new())
    }

    /// The tag, created on the first call. Later calls return the same tag.
    ///
    /// Each call checks the lazy cell. Hot paths such as the `\noexpand` hook call it once per expansion,
    ///     which is cheap but not free.
    pub fn get(&self) -> Tag {
        *self.0.get_or_init(Tag::new)
    }
}

/// Identity of a primitive: its function pointer and tag.
///
/// Commands with equal keys are the same primitive.
/// This is used to recover the built-in name of a primitive that was copied with `\let`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum PrimitiveKey {
    Execution(usize, Option<Tag>),
    Expansion(usize, Option<Tag>),
    Relax,
}

impl PrimitiveKey {
    pub(crate) fn new<S>(command: &Command<S>) -> Option<Self> {
        match command {
            Command::Expansion(f, tag) => Some(PrimitiveKey::Expansion(*f as usize, *tag)),
            Command::Execution(f, tag) => Some(PrimitiveKey::Execution(*f as usize, *tag)),
            Command::Relax => Some(PrimitiveKey::Relax),
            Command::Macro(_) | Command::CharacterTokenAlias(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_size() {
        assert_eq!(std::mem::size_of::<Command<()>>(), 16);
    }

    static FIRST: StaticTag = StaticTag::new();
    static SECOND: StaticTag = StaticTag::new();

    #[test]
    fn static_tags_are_stable_and_distinct() {
        let first = FIRST.get();
        let fresh = Tag::new();
        let second = SECOND.get();
        assert_eq!(FIRST.get(), first);
        assert_eq!(SECOND.get(), second);
        assert_ne!(first, second);
        assert_ne!(first, fresh);
        assert_ne!(second, fresh);
    }

    #[test]
    fn tag_size() {
        assert_eq!(std::mem::size_of::<Option<Tag>>(), 4);
    }
}
