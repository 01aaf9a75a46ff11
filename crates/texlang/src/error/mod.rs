//! Error types and error display logic.
//!
//! Every error raised while running TeX code is a [TexError].
//! When the error crosses a command boundary (for example, it occurs while the VM is
//!     expanding a macro), it is wrapped in a [PropagatedError] that records the command.
//! The root error carries a machine readable [Code] and, through [Kind], the position
//!     in the source code at which the problem was detected.

use crate::token;
use crate::token::trace;
use crate::vm;
use texcraft_stdext::algorithms::spellcheck;

pub mod display;

/// A TeX error, possibly propagated through a chain of commands.
#[derive(Debug)]
pub enum Error {
    Tex(Box<dyn TexError + 'static>),
    Propagated(PropagatedError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        display::format_error(f, self)
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn new_propagated<S>(
        vm: &vm::VM<S>,
        context: PropagationContext,
        token: token::Token,
        error: Box<Error>,
    ) -> Box<Error> {
        Box::new(Error::Propagated(PropagatedError {
            context,
            token,
            trace: vm.trace(token),
            error,
        }))
    }

    /// Returns the propagation stack, outermost command first, and the root error.
    pub fn stack_view(&self) -> (Vec<&PropagatedError>, &dyn TexError) {
        let mut stack: Vec<&PropagatedError> = vec![];
        let mut last = self;
        loop {
            match last {
                Error::Tex(error) => {
                    return (stack, error.as_ref());
                }
                Error::Propagated(propagated) => {
                    stack.push(propagated);
                    last = &propagated.error;
                }
            }
        }
    }

    /// The code of the root error.
    pub fn code(&self) -> Code {
        self.stack_view().1.code()
    }

    /// The position in the source code the root error refers to.
    ///
    /// For failed precondition errors this is the position of the innermost
    ///     command that was running when the error occurred.
    pub fn position(&self) -> Option<&trace::SourceCodeTrace> {
        let (stack, root) = self.stack_view();
        match root.kind() {
            Kind::Token(trace) | Kind::EndOfInput(trace) => Some(trace),
            Kind::FailedPrecondition => stack.last().map(|propagated| &propagated.trace),
        }
    }
}

impl<T: TexError + 'static> From<T> for Box<Error> {
    fn from(err: T) -> Self {
        Box::new(Error::Tex(Box::new(err)))
    }
}

#[derive(Debug)]
pub struct PropagatedError {
    pub context: PropagationContext,
    pub token: token::Token,
    pub trace: trace::SourceCodeTrace,
    pub error: Box<Error>,
}

/// Machine readable classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// A control sequence or active character with no meaning was invoked.
    UndefinedControlSequence,
    /// A literal token in a macro's parameter text did not match the input.
    PatternMismatch,
    /// An argument ran off the end of the input, or contained `\par` when not allowed.
    RunawayArgument,
    /// The input ended while a construct was incomplete.
    UnexpectedEndOfInput,
    /// A terminator like `\endcsname` appeared with nothing to terminate.
    ExtraTerminator,
    /// A category code outside the range 0 to 15.
    MalformedCategory,
    /// An `\outer` macro appeared where outer macros are forbidden.
    OuterInContext,
    /// A token of the wrong kind, for example a missing `{` after `\def\a`.
    UnexpectedToken,
    /// A `}` with no open group.
    ExtraEndGroup,
    /// A character with category code 15 (invalid).
    InvalidCharacter,
    /// A prefix like `\global` followed by a command that does not accept it.
    InvalidPrefix,
}

impl Code {
    /// All error codes.
    pub fn all() -> &'static [Code] {
        use Code::*;
        &[
            UndefinedControlSequence,
            PatternMismatch,
            RunawayArgument,
            UnexpectedEndOfInput,
            ExtraTerminator,
            MalformedCategory,
            OuterInContext,
            UnexpectedToken,
            ExtraEndGroup,
            InvalidCharacter,
            InvalidPrefix,
        ]
    }

    /// Stable message key for the code.
    pub fn key(&self) -> &'static str {
        use Code::*;
        match self {
            UndefinedControlSequence => "undefined-control-sequence",
            PatternMismatch => "pattern-mismatch",
            RunawayArgument => "runaway-argument",
            UnexpectedEndOfInput => "unexpected-end-of-input",
            ExtraTerminator => "extra-terminator",
            MalformedCategory => "malformed-category",
            OuterInContext => "outer-in-context",
            UnexpectedToken => "unexpected-token",
            ExtraEndGroup => "extra-end-group",
            InvalidCharacter => "invalid-character",
            InvalidPrefix => "invalid-prefix",
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug)]
pub enum Kind<'a> {
    Token(&'a trace::SourceCodeTrace),
    EndOfInput(&'a trace::SourceCodeTrace),
    FailedPrecondition,
}

/// Implementations of this trait describe an error in TeX source code.
pub trait TexError: std::fmt::Debug {
    fn code(&self) -> Code;

    fn kind(&self) -> Kind;

    fn title(&self) -> String;

    fn notes(&self) -> Vec<display::Note> {
        vec![]
    }

    fn source_annotation(&self) -> String {
        TexError::default_source_annotation(self)
    }

    fn default_source_annotation(&self) -> String {
        match TexError::kind(self) {
            Kind::Token(s) => match s.token.and_then(|t| t.char().zip(t.cat_code())) {
                Some((c, code)) => {
                    format!["character token with value {c} and category code {code}",]
                }
                None => "control sequence".to_string(),
            },
            Kind::EndOfInput(_) => "input ended here".into(),
            Kind::FailedPrecondition => {
                "failed precondition error while running this command".into()
            }
        }
    }
}

#[derive(Debug)]
pub enum PropagationContext {
    Expansion,
    Execution,
}

impl PropagationContext {
    fn action(&self) -> &'static str {
        match self {
            PropagationContext::Expansion => "expanding this command",
            PropagationContext::Execution => "executing this command",
        }
    }
}

/// Error attached to a single token.
#[derive(Debug)]
pub struct SimpleTokenError {
    pub code: Code,
    pub trace: trace::SourceCodeTrace,
    pub title: String,
    pub text_notes: Vec<String>,
}

impl SimpleTokenError {
    /// Create a new simple token error with code [Code::UnexpectedToken].
    pub fn new<S, T: AsRef<str>>(
        vm: &vm::VM<S>,
        token: token::Token,
        title: T,
    ) -> SimpleTokenError {
        SimpleTokenError {
            code: Code::UnexpectedToken,
            trace: vm.trace(token),
            title: title.as_ref().into(),
            text_notes: vec![],
        }
    }

    pub fn with_code(mut self, code: Code) -> Self {
        self.code = code;
        self
    }

    pub fn with_note<T: Into<String>>(mut self, note: T) -> Self {
        self.text_notes.push(note.into());
        self
    }
}

impl TexError for SimpleTokenError {
    fn code(&self) -> Code {
        self.code
    }

    fn kind(&self) -> Kind {
        Kind::Token(&self.trace)
    }

    fn title(&self) -> String {
        self.title.clone()
    }

    fn notes(&self) -> Vec<display::Note> {
        self.text_notes.iter().map(display::Note::from).collect()
    }
}

/// Error for input that ended prematurely.
#[derive(Debug)]
pub struct SimpleEndOfInputError {
    pub code: Code,
    pub trace: trace::SourceCodeTrace,
    pub title: String,
    pub text_notes: Vec<String>,
}

impl SimpleEndOfInputError {
    /// Create a new end of input error with code [Code::UnexpectedEndOfInput].
    pub fn new<S, T: AsRef<str>>(vm: &vm::VM<S>, title: T) -> Self {
        Self {
            code: Code::UnexpectedEndOfInput,
            trace: vm.trace_end_of_input(),
            title: title.as_ref().into(),
            text_notes: vec![],
        }
    }

    pub fn with_code(mut self, code: Code) -> Self {
        self.code = code;
        self
    }

    pub fn with_note<T: Into<String>>(mut self, note: T) -> Self {
        self.text_notes.push(note.into());
        self
    }
}

impl TexError for SimpleEndOfInputError {
    fn code(&self) -> Code {
        self.code
    }

    fn kind(&self) -> Kind {
        Kind::EndOfInput(&self.trace)
    }

    fn title(&self) -> String {
        self.title.clone()
    }

    fn notes(&self) -> Vec<display::Note> {
        self.text_notes.iter().map(display::Note::from).collect()
    }
}

/// Error for a control sequence or active character with no meaning.
#[derive(Debug)]
pub struct UndefinedCommandError {
    pub trace: trace::SourceCodeTrace,
    pub close_names: Vec<spellcheck::Suggestion>,
}

impl UndefinedCommandError {
    pub fn new<S>(vm: &vm::VM<S>, token: token::Token) -> UndefinedCommandError {
        let trace = vm.trace(token);
        let close_names = match token.command_ref() {
            Some(token::CommandRef::ControlSequence(cs_name)) => {
                let name = vm.cs_name_interner().resolve(cs_name).unwrap_or_default();
                let defined = vm.defined_names();
                spellcheck::find_close_words(defined.iter().map(String::as_str), name, 2)
            }
            _ => vec![],
        };
        UndefinedCommandError { trace, close_names }
    }
}

impl TexError for UndefinedCommandError {
    fn code(&self) -> Code {
        Code::UndefinedControlSequence
    }

    fn kind(&self) -> Kind {
        Kind::Token(&self.trace)
    }

    fn title(&self) -> String {
        format!["undefined control sequence {}", &self.trace.value]
    }

    fn notes(&self) -> Vec<display::Note> {
        use texcraft_stdext::color::Colorize;
        match self.close_names.first() {
            None => vec![],
            Some(suggestion) => {
                vec![format!["did you mean \\{}?\n", suggestion.word.as_str().bold()].into()]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_have_distinct_keys() {
        use Code::*;
        let codes = [
            UndefinedControlSequence,
            PatternMismatch,
            RunawayArgument,
            UnexpectedEndOfInput,
            ExtraTerminator,
            MalformedCategory,
            OuterInContext,
            UnexpectedToken,
            ExtraEndGroup,
            InvalidCharacter,
            InvalidPrefix,
        ];
        let keys: std::collections::HashSet<&str> = codes.iter().map(Code::key).collect();
        assert_eq!(keys.len(), codes.len());
    }
}
