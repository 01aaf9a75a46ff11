use super::GroupKind;
use super::TexlangState;
use crate::prelude as txl;
use crate::token::trace;
use crate::token::Token;
use crate::*;

/// A stream of tokens generated on demand.
///
/// This trait describes a general stream of tokens where the front of the stream may
/// retrieved using [TokenStream::next] or peeked at using [TokenStream::peek].
/// In practice, all [TokenStreams](TokenStream) in Texlang
/// are either [ExecutionInput], [ExpansionInput] or [UnexpandedStream].
/// This trait exists to allow a generic function to accept any of these types.
///
/// # Note on lazy loading
///
/// The simplest example of a stream is a vector of tokens. However, streams are more general
/// than this and can encompass situations in which the full contents cannot be determined in
/// advance.
/// The classic example of this kind of stream comes from the following snippet:
/// ```tex
/// \catcode`\@=11 \do@
/// ```
/// If we were to lex this input all at once we would
/// get the control sequence `do` followed by the character `@`.
/// This is not the correct result: the `\catcode` assignment makes `@` a letter,
/// so the correct input is the control sequence `do@`.
pub trait TokenStream {
    /// The type of the custom state in the VM.
    type S;

    /// Gets the next token in the stream.
    ///
    /// This method is almost the same
    /// as the `next` method in Rust's iterator trait, except a stream can return an error.
    ///
    /// As with iterators, a result of `Ok(None)` indicates that the stream is exhausted.
    fn next(&mut self) -> txl::Result<Option<Token>>;

    /// Peeks at the next token in the stream without removing it.
    ///
    /// The peek method requires a mutable reference to the stream because
    ///     some processing may be needed in order to determine what the next token is.
    /// For example when performing expansion on a stream, the next token in the stream
    ///     may need to be expanded rather than returned.
    /// The next token will be the first token in the expansion in this case,
    ///     or the following token in the remaining stream if the expansion returns no tokens.
    /// This mutation is generally irreversible.
    fn peek(&mut self) -> txl::Result<Option<&Token>>;

    /// Consumes the next token in the stream without returning it.
    ///
    /// This method is mostly to make code self-documenting. It is typically used in
    /// situations where a peek has already occurred, and the token itself is not needed.
    fn consume(&mut self) -> txl::Result<()> {
        self.next().map(|_| ())
    }

    /// Returns a reference to the VM.
    fn vm(&self) -> &vm::VM<Self::S>;

    /// Returns a reference to the commands map.
    #[inline]
    fn commands_map(&self) -> &command::Map<Self::S> {
        &self.vm().commands_map
    }

    /// Returns a reference to the custom state.
    #[inline]
    fn state(&self) -> &Self::S {
        &self.vm().state
    }

    fn trace(&self, token: Token) -> trace::SourceCodeTrace {
        self.vm().trace(token)
    }

    fn trace_end_of_input(&self) -> trace::SourceCodeTrace {
        self.vm().trace_end_of_input()
    }
}

/// A [TokenStream] that performs expansion.
///
/// The unexpanded tokens are retrieved from the unexpanded stream returned by the
/// [unexpanded](ExpandedStream::unexpanded) method.
#[repr(transparent)]
pub struct ExpandedStream<S>(UnexpandedStream<S>);

impl<S> std::convert::AsMut<ExpandedStream<S>> for ExpandedStream<S> {
    fn as_mut(&mut self) -> &mut ExpandedStream<S> {
        self
    }
}

impl<S: TexlangState> ExpandedStream<S> {
    /// Returns the underlying unexpanded stream.
    pub fn unexpanded(&mut self) -> &mut UnexpandedStream<S> {
        &mut self.0
    }

    /// Push a token back onto the front of the input.
    ///
    /// It will be the next token returned.
    #[inline]
    pub fn back(&mut self, token: Token) {
        self.expansions_mut().push(token);
    }

    /// Expand the next token in the input.
    ///
    /// This method only expands a single token. If, after the expansion, the next token
    /// is expandable it will not be expanded.
    /// Returns false if the next token is not expandable.
    pub fn expand_once(&mut self) -> txl::Result<bool> {
        stream::expand_once(&mut self.unexpanded().0)
    }

    /// Returns a mutable reference to the expanded tokens stack for the current input source.
    ///
    /// The tokens are a stack, so the next token is the last token in the vector.
    #[inline]
    pub fn expansions_mut(&mut self) -> &mut Vec<Token> {
        self.0 .0.internal.expansions_mut()
    }

    /// Number of pending deferred insertions.
    ///
    /// Consumers record this before reading a token and pass it to
    ///     [flush_deferred_insertions](ExpandedStream::flush_deferred_insertions)
    ///     once the token has been processed.
    #[inline]
    pub fn deferred_insertions(&self) -> usize {
        self.0 .0.internal.deferred_insertions.len()
    }

    /// Insert the tokens in front of the input after the token currently at the front
    ///     of the input has been processed.
    ///
    /// The main loop processes a token by executing it.
    /// Scans that fully expand the input, like the one in `\edef`, process a token by consuming it.
    pub fn insert_after_next(&mut self, tokens: &[Token]) {
        self.0 .0.internal.deferred_insertions.push(tokens.to_vec());
    }

    /// Prepend the tokens to the most recent deferred insertion, if one was registered
    ///     since the provided mark.
    ///
    /// Returns false, and does nothing, if no insertion was registered since the mark.
    pub fn prepend_to_deferred_insertion(&mut self, since: usize, tokens: &[Token]) -> bool {
        let deferred = &mut self.0 .0.internal.deferred_insertions;
        if deferred.len() <= since {
            return false;
        }
        match deferred.last_mut() {
            None => false,
            Some(last) => {
                last.splice(0..0, tokens.iter().copied());
                true
            }
        }
    }

    /// Push every insertion deferred since the mark onto the front of the input.
    pub fn flush_deferred_insertions(&mut self, since: usize) {
        self.0 .0.internal.flush_deferred_insertions(since)
    }

    /// View this stream as an [ExpansionInput].
    ///
    /// This does not escalate privileges: [ExpansionInput] has read only access to the VM.
    #[inline]
    pub fn as_expansion_input(&mut self) -> &mut ExpansionInput<S> {
        ExpansionInput::new(&mut self.0 .0)
    }
}

impl<S: TexlangState> TokenStream for ExpandedStream<S> {
    type S = S;

    #[inline]
    fn next(&mut self) -> txl::Result<Option<Token>> {
        stream::next_expanded(&mut self.unexpanded().0)
    }

    #[inline]
    fn peek(&mut self) -> txl::Result<Option<&Token>> {
        stream::peek_expanded(&mut self.unexpanded().0)
    }

    #[inline]
    fn vm(&self) -> &vm::VM<Self::S> {
        &self.0 .0
    }
}

/// Stream that returns input tokens without performing expansion.
///
/// The unexpanded stream is used when reading tokens without performing expansion;
/// e.g., when reading the replacement text for a macro defined using `\def`.
///
/// It be obtained from either the [ExecutionInput] or the [ExpansionInput]
/// using their `unexpanded` methods.
#[repr(transparent)]
pub struct UnexpandedStream<S>(vm::VM<S>);

impl<S: TexlangState> UnexpandedStream<S> {
    /// Push a token back onto the front of the input.
    ///
    /// It will be the next token returned.
    #[inline]
    pub fn back(&mut self, token: Token) {
        self.0.internal.expansions_mut().push(token);
    }
}

impl<S: TexlangState> TokenStream for UnexpandedStream<S> {
    type S = S;

    #[inline]
    fn next(&mut self) -> txl::Result<Option<Token>> {
        stream::next_unexpanded(&mut self.0)
    }

    #[inline]
    fn peek(&mut self) -> txl::Result<Option<&Token>> {
        stream::peek_unexpanded(&mut self.0)
    }

    #[inline]
    fn vm(&self) -> &vm::VM<S> {
        &self.0
    }
}

/// Input type for expansion primitives.
///
/// This type provides:
///
/// - Access to the input stream (with or without expansion). Its implementation of the [TokenStream]
///     trait returns expanded tokens.
///     To read the input stream without performing expansion, use the
///     [unexpanded](ExpansionInput::unexpanded) method.
///
/// - Read only access to the VM.
///
/// - The ability to push token expansions to the front of the input stream
///     using [ExpansionInput::push_expansion] or [ExpansionInput::expansions_mut].
///
/// - Access to token buffers using the [ExpansionInput::checkout_token_buffer] and
///     [ExpansionInput::return_token_buffer] methods.
#[repr(transparent)]
pub struct ExpansionInput<S>(ExpandedStream<S>);

impl<S> std::convert::AsMut<ExpandedStream<S>> for ExpansionInput<S> {
    fn as_mut(&mut self) -> &mut ExpandedStream<S> {
        &mut self.0
    }
}

impl<S: TexlangState> TokenStream for ExpansionInput<S> {
    type S = S;

    fn next(&mut self) -> txl::Result<Option<Token>> {
        self.0.next()
    }

    fn peek(&mut self) -> txl::Result<Option<&Token>> {
        self.0.peek()
    }

    fn vm(&self) -> &vm::VM<Self::S> {
        self.0.vm()
    }
}

impl<S> ExpansionInput<S> {
    /// Creates a mutable reference to this type from the [VM](vm::VM) type.
    #[inline]
    pub fn new(vm: &mut vm::VM<S>) -> &mut ExpansionInput<S> {
        unsafe { &mut *(vm as *mut vm::VM<S> as *mut ExpansionInput<S>) }
    }

    #[inline]
    pub fn unexpanded(&mut self) -> &mut UnexpandedStream<S> {
        &mut self.0 .0
    }

    #[inline]
    pub fn expanded(&mut self) -> &mut ExpandedStream<S> {
        &mut self.0
    }

    /// Push tokens to the front of the input stream.
    ///
    /// The first token in the provided slice will be the next token read.
    #[inline]
    pub fn push_expansion(&mut self, expansion: &[Token]) {
        self.0 .0 .0.internal.push_expansion(expansion)
    }

    /// Returns a reference to the expanded tokens stack for the current input source.
    ///
    /// The tokens are a stack, so the next token is the last token in the vector.
    #[inline]
    pub fn expansions(&self) -> &Vec<Token> {
        self.0 .0 .0.internal.expansions()
    }

    /// Returns a mutable reference to the expanded tokens stack for the current input source.
    ///
    /// The tokens are a stack, so the next token is the last token in the vector.
    ///
    /// Adding tokens to the front of the input using this method can be more efficient
    /// than using [ExpansionInput::push_expansion] because an allocation is avoided.
    #[inline]
    pub fn expansions_mut(&mut self) -> &mut Vec<Token> {
        self.0 .0 .0.internal.expansions_mut()
    }

    #[inline]
    pub fn state_and_expansions_mut(&mut self) -> (&S, &mut Vec<Token>) {
        (&self.0 .0 .0.state, self.0 .0 .0.internal.expansions_mut())
    }

    /// Returns a vector than can be used as a token buffer, potentially without allocating memory.
    ///
    /// The returned vector is empty, but will generally have non-zero capacity from previous uses of the buffer.
    /// Token buffers are used in macro expansion, and at any point in time multiple macros may be in
    ///     the process of expansion, so each expansion checks out its own buffer.
    ///
    /// When finished with the buffer, please return it using [return_token_buffer](ExpansionInput::return_token_buffer).
    pub fn checkout_token_buffer(&mut self) -> Vec<Token> {
        self.0
             .0
             .0
            .internal
            .token_buffers
            .pop()
            .unwrap_or_default()
            .0
    }

    /// Return a token buffer, allowing it to be reused.
    pub fn return_token_buffer(&mut self, mut token_buffer: Vec<Token>) {
        token_buffer.clear();
        self.0
             .0
             .0
            .internal
            .token_buffers
            .push(super::TokenBuffer(token_buffer))
    }

    /// Return the control sequence with the given name, giving it the meaning `\relax`
    ///     if it currently has no meaning.
    ///
    /// This is the only change to the commands map that an expansion command may make.
    /// It exists for `\csname`, whose result is never an undefined control sequence.
    pub fn control_sequence_or_relax(&mut self, name: &str) -> token::CsName {
        let vm = &mut self.0 .0 .0;
        let cs_name = vm.internal.cs_name_interner.get_or_intern(name);
        let command_ref = token::CommandRef::ControlSequence(cs_name);
        if vm.commands_map.get_command(&command_ref).is_none() {
            log::debug!("binding \\{name} to \\relax");
            vm.commands_map
                .insert(command_ref, command::Command::Relax, command::Scope::Local);
        }
        cs_name
    }
}

/// Input type for execution primitives.
///
/// This type provides:
///
/// - Access to the input stream (with or without expansion). Its implementation of the [TokenStream]
///     trait returns expanded tokens.
///     To read the input stream without performing expansion, use the
///     [unexpanded](ExecutionInput::unexpanded) method.
///
/// - Mutable access to the state and the commands map
///     the [ExecutionInput::state_mut]
///     and [ExecutionInput::commands_map_mut] methods.
#[repr(transparent)]
pub struct ExecutionInput<S>(ExpandedStream<S>);

impl<S> std::convert::AsMut<ExpandedStream<S>> for ExecutionInput<S> {
    fn as_mut(&mut self) -> &mut ExpandedStream<S> {
        &mut self.0
    }
}

impl<S: TexlangState> TokenStream for ExecutionInput<S> {
    type S = S;

    fn next(&mut self) -> txl::Result<Option<Token>> {
        self.0.next()
    }

    fn peek(&mut self) -> txl::Result<Option<&Token>> {
        self.0.peek()
    }

    fn vm(&self) -> &vm::VM<Self::S> {
        self.0.vm()
    }
}

impl<S> ExecutionInput<S> {
    /// Creates a mutable reference to this type from the [VM](vm::VM) type.
    #[inline]
    pub fn new(vm: &mut vm::VM<S>) -> &mut ExecutionInput<S> {
        unsafe { &mut *(vm as *mut vm::VM<S> as *mut ExecutionInput<S>) }
    }

    #[inline]
    pub fn unexpanded(&mut self) -> &mut UnexpandedStream<S> {
        &mut self.0 .0
    }

    #[inline]
    pub fn expanded(&mut self) -> &mut ExpandedStream<S> {
        &mut self.0
    }

    #[inline]
    pub fn commands_map_mut(&mut self) -> &mut command::Map<S> {
        &mut self.0 .0 .0.commands_map
    }

    /// Returns a mutable reference to the state.
    #[inline]
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.0 .0 .0.state
    }

    /// Push tokens to the front of the input stream.
    ///
    /// The first token in the provided slice will be the next token read.
    #[inline]
    pub fn push_expansion(&mut self, expansion: &[Token]) {
        self.0 .0 .0.internal.push_expansion(expansion)
    }

    /// Return a token buffer, allowing it to be reused.
    pub fn return_token_buffer(&mut self, mut token_buffer: Vec<Token>) {
        token_buffer.clear();
        self.0
             .0
             .0
            .internal
            .token_buffers
            .push(super::TokenBuffer(token_buffer))
    }

    /// See [ExpansionInput::checkout_token_buffer].
    pub fn checkout_token_buffer(&mut self) -> Vec<Token> {
        ExpansionInput::new(&mut self.0 .0 .0).checkout_token_buffer()
    }
}

impl<S: TexlangState> ExecutionInput<S> {
    pub fn begin_group(&mut self, kind: GroupKind) {
        self.0 .0 .0.begin_group(kind)
    }

    pub fn end_group(&mut self, token: Token, kind: GroupKind) -> txl::Result<()> {
        self.0 .0 .0.end_group(Some(token), kind)
    }
}

/// Strips the lifetime from the token.
///
/// This function is intended to get around limitations of the borrow checker only. It
/// should only be used when the code is actually fine but the borrow checker is being
/// too conservative. Don't do anything fancy.
///
/// See this question for the type of code this function is designed for:
/// https://stackoverflow.com/questions/69680201/is-this-use-of-unsafe-trivially-safe
#[inline]
unsafe fn launder<'a>(token: &Token) -> &'a Token {
    &*(token as *const Token)
}

mod stream {
    use super::*;
    use crate::token::lexer;

    struct StateCatCodes<'a, S>(&'a S);

    impl<'a, S: TexlangState> lexer::CatCodeFn for StateCatCodes<'a, S> {
        #[inline]
        fn cat_code(&self, c: char) -> token::CatCode {
            self.0.cat_code(c)
        }
    }

    // Reads the next token from the lexers, popping exhausted sources.
    fn lex<S: TexlangState>(vm: &mut vm::VM<S>) -> txl::Result<Option<Token>> {
        loop {
            match vm.internal.current_source.root.next(
                &StateCatCodes(&vm.state),
                &mut vm.internal.cs_name_interner,
            ) {
                Ok(Some(token)) => return Ok(Some(token)),
                Ok(None) => {}
                Err(lexer::Error::InvalidCharacter(c, trace_key)) => {
                    return Err(vm::InvalidCharacterError {
                        trace: vm.trace(Token::new_other(c, trace_key)),
                    }
                    .into());
                }
            }
            if !vm.internal.pop_source() {
                return Ok(None);
            }
            if let Some(token) = vm.internal.current_source.expansions.pop() {
                return Ok(Some(token));
            }
        }
    }

    #[inline]
    pub fn next_unexpanded<S: TexlangState>(vm: &mut vm::VM<S>) -> txl::Result<Option<Token>> {
        if let Some(token) = vm.internal.current_source.expansions.pop() {
            return Ok(Some(token));
        }
        lex(vm)
    }

    #[inline]
    pub fn peek_unexpanded<S: TexlangState>(vm: &mut vm::VM<S>) -> txl::Result<Option<&Token>> {
        if let Some(token) = vm.internal.current_source.expansions.last() {
            return Ok(Some(unsafe { launder(token) }));
        }
        match lex(vm)? {
            None => Ok(None),
            Some(token) => {
                vm.internal.current_source.expansions.push(token);
                Ok(vm.internal.current_source.expansions.last())
            }
        }
    }

    pub fn next_expanded<S: TexlangState>(vm: &mut vm::VM<S>) -> txl::Result<Option<Token>> {
        loop {
            let token = match next_unexpanded(vm)? {
                None => return Ok(None),
                Some(token) => token,
            };
            match expand_token(vm, token)? {
                Expansion::NotExpandable => return Ok(Some(token)),
                Expansion::Expanded => {}
                Expansion::Overridden(token) => return Ok(Some(token)),
            }
        }
    }

    pub fn peek_expanded<S: TexlangState>(vm: &mut vm::VM<S>) -> txl::Result<Option<&Token>> {
        loop {
            let token = match peek_unexpanded(vm)? {
                None => return Ok(None),
                Some(token) => *token,
            };
            if !is_expandable(vm, &token) {
                break;
            }
            consume_peek(vm);
            match expand_token(vm, token)? {
                Expansion::NotExpandable | Expansion::Expanded => {}
                Expansion::Overridden(token) => {
                    vm.internal.expansions_mut().push(token);
                    break;
                }
            }
        }
        peek_unexpanded(vm)
    }

    pub fn expand_once<S: TexlangState>(vm: &mut vm::VM<S>) -> txl::Result<bool> {
        let token = match peek_unexpanded(vm)? {
            None => return Ok(false),
            Some(token) => *token,
        };
        if !is_expandable(vm, &token) {
            return Ok(false);
        }
        consume_peek(vm);
        match expand_token(vm, token)? {
            Expansion::NotExpandable => Ok(false),
            Expansion::Expanded => Ok(true),
            Expansion::Overridden(token) => {
                vm.internal.expansions_mut().push(token);
                Ok(true)
            }
        }
    }

    fn is_expandable<S>(vm: &vm::VM<S>, token: &Token) -> bool {
        match token.command_ref() {
            None => false,
            Some(command_ref) => matches!(
                vm.commands_map.get_command(&command_ref),
                Some(command::Command::Expansion(_, _)) | Some(command::Command::Macro(_))
            ),
        }
    }

    enum Expansion {
        NotExpandable,
        Expanded,
        // The expansion override hook replaced the expansion with this token.
        // The token must not be expanded again.
        Overridden(Token),
    }

    // Expands the token, which has already been removed from the input.
    // The input is untouched if the token is not expandable.
    fn expand_token<S: TexlangState>(vm: &mut vm::VM<S>, token: Token) -> txl::Result<Expansion> {
        let command = match token.command_ref() {
            None => return Ok(Expansion::NotExpandable),
            Some(command_ref) => vm.commands_map.get_command(&command_ref),
        };
        match command {
            Some(command::Command::Expansion(command, tag)) => {
                let command = *command;
                let tag = *tag;
                match S::expansion_override_hook(token, ExpansionInput::new(vm), tag) {
                    Ok(None) => (),
                    Ok(Some(override_expansion)) => {
                        return Ok(Expansion::Overridden(override_expansion));
                    }
                    Err(err) => return Err(convert_command_error(vm, token, err)),
                };
                if let Err(err) = command(token, ExpansionInput::new(vm)) {
                    return Err(convert_command_error(vm, token, err));
                };
                Ok(Expansion::Expanded)
            }
            Some(command::Command::Macro(command)) => {
                let command = command.clone();
                if let Err(err) = command.call(token, ExpansionInput::new(vm)) {
                    return Err(convert_command_error(vm, token, err));
                }
                Ok(Expansion::Expanded)
            }
            _ => Ok(Expansion::NotExpandable),
        }
    }

    #[inline]
    pub fn consume_peek<S>(vm: &mut vm::VM<S>) {
        // When we peek at a token, it is placed on top of the expansions stack.
        // So to consume the token, we just need to remove it from the stack.
        vm.internal.current_source.expansions.pop();
    }

    fn convert_command_error<S: TexlangState>(
        vm: &mut vm::VM<S>,
        token: Token,
        err: Box<error::Error>,
    ) -> Box<error::Error> {
        error::Error::new_propagated(vm, error::PropagationContext::Expansion, token, err)
    }
}
