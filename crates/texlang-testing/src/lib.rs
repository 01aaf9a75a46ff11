/*!
Test runners for Texlang primitives

A test feeds TeX source to a fresh VM and checks what comes out of it:
    the character tokens that reach the main loop, or the error that stops it.
The primitives in `texlang-stdlib` are all tested this way.

## The state under test

Each test runs against a state type chosen by the test writer.
The state must implement [`TexlangState`] and [`Default`],
    and it must carry a [`TestingComponent`] through
    [`HasComponent<TestingComponent>`](texlang::traits::HasComponent<TestingComponent>).
The component collects the output tokens.
Tests of primitives that need no state of their own can use [`State`].

## Runners

- [`run_expansion_equality_test`] runs two snippets and compares their output tokens.
    `\def\a#1{(#1)}\a x` and `(x)` pass, for instance.
    Only the output is compared, never the VM state: in this example only the first VM defines `\a`.
- [`run_failure_test`] passes if the snippet fails, and returns the error.
- [`run_error_code_test`] also checks the [`error::Code`] of the error.
- [`run_output_test`] compares the output with a plain string.
    It suits primitives like `\meaning` whose output is easier to spell out than to produce.

Whole suites are usually written with [`test_suite`].

## Logging

The runners initialize [`env_logger`] in test mode,
    so running a test with `RUST_LOG=trace` prints the trace of groups and macro expansions.
*/

use std::collections::HashMap;

use texlang::traits::*;
use texlang::vm::implement_has_component;
use texlang::vm::VM;
use texlang::*;

/// Component that records what a test VM outputs.
#[derive(Default)]
pub struct TestingComponent {
    allow_undefined_command: bool,
    tokens: Vec<token::Token>,
}

impl TestingComponent {
    fn take_tokens(&mut self) -> Vec<token::Token> {
        std::mem::take(&mut self.tokens)
    }
}

/// State for tests of primitives that need no components besides the testing one.
#[derive(Default)]
pub struct State {
    testing: TestingComponent,
}

impl TexlangState for State {}

implement_has_component![State, TestingComponent, testing];

/// Configuration for the test runners.
///
/// When an option is given more than once the last one wins.
pub enum TestOption<'a, S> {
    /// Function returning the commands the VM starts with.
    BuiltInCommands(fn() -> HashMap<&'static str, command::BuiltIn<S>>),

    /// Like `BuiltInCommands`, but a closure; used to choose between variants of a primitive.
    BuiltInCommandsDyn(Box<dyn Fn() -> HashMap<&'static str, command::BuiltIn<S>> + 'a>),

    /// Called on the VM before the source is pushed, for example to change the state.
    CustomVMInitialization(fn(&mut VM<S>)),

    /// Closure form of `CustomVMInitialization`.
    #[allow(clippy::type_complexity)]
    CustomVMInitializationDyn(Box<dyn Fn(&mut VM<S>) + 'a>),

    /// If true, undefined control sequences are written to the output instead of failing the run.
    AllowUndefinedCommands(bool),
}

fn init_logging() {
    _ = env_logger::builder().is_test(true).try_init();
}

/// Asserts that both snippets run to completion and output the same tokens.
pub fn run_expansion_equality_test<S>(lhs: &str, rhs: &str, options: &[TestOption<S>])
where
    S: Default + HasComponent<TestingComponent>,
{
    init_logging();
    let options = ResolvedOptions::new(options);

    let mut vm_1 = initialize_vm(&options);
    let output_1 = execute_source_code(&mut vm_1, lhs, &options)
        .map_err(|err| {
            println!("{err}");
            err
        })
        .unwrap();

    let mut vm_2 = initialize_vm(&options);
    let output_2 = execute_source_code(&mut vm_2, rhs, &options)
        .map_err(|err| {
            println!("{err}");
            err
        })
        .unwrap();
    compare_output(output_1, &vm_1, output_2, &vm_2);
}

fn compare_output<S>(
    mut output_1: Vec<token::Token>,
    vm_1: &vm::VM<S>,
    mut output_2: Vec<token::Token>,
    vm_2: &vm::VM<S>,
) {
    let trim_space = |v: &mut Vec<token::Token>| {
        if let Some(last) = v.last() {
            if last.cat_code() == Some(token::CatCode::Space) {
                v.pop();
            }
        }
    };
    trim_space(&mut output_1);
    trim_space(&mut output_2);

    use ::texlang::token::CommandRef::ControlSequence;
    use ::texlang::token::Value::CommandRef;
    let equal = match output_1.len() == output_2.len() {
        false => {
            println!(
                "output lengths do not match: {} != {}",
                output_1.len(),
                output_2.len()
            );
            false
        }
        true => output_1
            .iter()
            .zip(output_2.iter())
            .all(|(token_1, token_2)| match (token_1.value(), token_2.value()) {
                // The two VMs have different interners, so names must be compared as strings.
                (CommandRef(ControlSequence(cs_name_1)), CommandRef(ControlSequence(cs_name_2))) => {
                    vm_1.cs_name_interner().resolve(cs_name_1)
                        == vm_2.cs_name_interner().resolve(cs_name_2)
                }
                _ => token_1 == token_2,
            }),
    };

    if !equal {
        println!("Expansion output is different:");
        println!("------[lhs]------");
        println!(
            "'{}'",
            ::texlang::token::write_tokens(&output_1, vm_1.cs_name_interner())
        );
        println!("------[rhs]------");
        println!(
            "'{}'",
            ::texlang::token::write_tokens(&output_2, vm_2.cs_name_interner())
        );
        println!("-----------------");
        panic!("Expansion test failed");
    }
}

/// Asserts that running the snippet fails, and returns the error for further checks.
pub fn run_failure_test<S>(input: &str, options: &[TestOption<S>]) -> Box<error::Error>
where
    S: Default + HasComponent<TestingComponent>,
{
    init_logging();
    let options = ResolvedOptions::new(options);

    let mut vm = initialize_vm(&options);
    match execute_source_code(&mut vm, input, &options) {
        Ok(output) => {
            println!("Expansion succeeded:");
            println!(
                "{}",
                ::texlang::token::write_tokens(&output, vm.cs_name_interner())
            );
            panic!("Expansion failure test did not pass: expansion successful");
        }
        Err(err) => {
            println!("{err}");
            err
        }
    }
}

/// Asserts that running the snippet fails with the given code.
pub fn run_error_code_test<S>(input: &str, want: error::Code, options: &[TestOption<S>])
where
    S: Default + HasComponent<TestingComponent>,
{
    let err = run_failure_test(input, options);
    assert_eq!(err.code(), want, "unexpected error code for error:\n{err}");
}

/// Asserts that the snippet's output, written back out as text, is the given string.
///
/// `\meaning` needs this: its output is all category code 12 (other) and space tokens,
///     which no plain snippet reproduces without changing category codes.
pub fn run_output_test<S>(input: &str, want: &str, options: &[TestOption<S>])
where
    S: Default + HasComponent<TestingComponent>,
{
    init_logging();
    let options = ResolvedOptions::new(options);

    let mut vm = initialize_vm(&options);
    let output = execute_source_code(&mut vm, input, &options)
        .map_err(|err| {
            println!("{err}");
            err
        })
        .unwrap();
    let got = ::texlang::token::write_tokens(&output, vm.cs_name_interner());
    assert_eq!(got, want);
}

struct ResolvedOptions<'a, S> {
    built_in_commands: &'a dyn Fn() -> HashMap<&'static str, command::BuiltIn<S>>,
    custom_vm_initialization: &'a dyn Fn(&mut VM<S>),
    allow_undefined_commands: bool,
}

impl<'a, S> ResolvedOptions<'a, S> {
    pub fn new(options: &'a [TestOption<S>]) -> Self {
        let mut resolved = Self {
            built_in_commands: &HashMap::new,
            custom_vm_initialization: &|_| {},
            allow_undefined_commands: false,
        };
        for option in options {
            match option {
                TestOption::BuiltInCommands(f) => resolved.built_in_commands = f,
                TestOption::BuiltInCommandsDyn(f) => resolved.built_in_commands = f,
                TestOption::CustomVMInitialization(f) => resolved.custom_vm_initialization = f,
                TestOption::CustomVMInitializationDyn(f) => resolved.custom_vm_initialization = f,
                TestOption::AllowUndefinedCommands(b) => resolved.allow_undefined_commands = *b,
            }
        }
        resolved
    }
}

fn initialize_vm<S: Default>(options: &ResolvedOptions<S>) -> Box<vm::VM<S>> {
    let mut vm = VM::<S>::new((options.built_in_commands)());
    (options.custom_vm_initialization)(&mut vm);
    vm
}

fn execute_source_code<S>(
    vm: &mut vm::VM<S>,
    source: &str,
    options: &ResolvedOptions<S>,
) -> Result<Vec<token::Token>, Box<error::Error>>
where
    S: Default + HasComponent<TestingComponent>,
{
    vm.push_source("testing.tex", source);
    vm.state.component_mut().allow_undefined_command = options.allow_undefined_commands;
    vm.run::<Handlers>()?;
    Ok(vm.state.component_mut().take_tokens())
}

struct Handlers;

impl<S: HasComponent<TestingComponent>> vm::Handlers<S> for Handlers {
    fn character_handler(
        token: token::Token,
        input: &mut vm::ExecutionInput<S>,
    ) -> prelude::Result<()> {
        input.state_mut().component_mut().tokens.push(token);
        Ok(())
    }

    fn undefined_command_handler(
        token: token::Token,
        input: &mut vm::ExecutionInput<S>,
    ) -> prelude::Result<()> {
        if input.state().component().allow_undefined_command {
            input.state_mut().component_mut().tokens.push(token);
            Ok(())
        } else {
            Err(error::UndefinedCommandError::new(input.vm(), token).into())
        }
    }

    fn unexpanded_expansion_command(
        token: token::Token,
        input: &mut vm::ExecutionInput<S>,
    ) -> prelude::Result<()> {
        input.state_mut().component_mut().tokens.push(token);
        Ok(())
    }
}

/// Generates one `#[test]` function per case.
///
/// ```
/// # use texlang_testing::*;
/// # use std::collections::HashMap;
/// # fn built_in_commands() -> HashMap<&'static str, texlang::command::BuiltIn<State>> {
/// #   HashMap::new()
/// # }
/// test_suite![
///     expansion_equality_tests(
///         (plain_text_is_output, "abc", "abc"),
///     ),
///     failure_tests(
///         (unmatched_brace, "}", texlang::error::Code::ExtraEndGroup),
///     ),
/// ];
/// ```
///
/// Sections:
///
/// - `state(T)` sets the state type. Without it the type named `State` in scope is used.
/// - `options(...)` lists the [TestOption]s shared by every case.
///     Without it the suite uses `TestOption::BuiltInCommands(built_in_commands)`,
///     so the calling module must define a `built_in_commands` function.
/// - `expansion_equality_tests((name, lhs, rhs), ...)` runs [run_expansion_equality_test].
/// - `failure_tests((name, input), ...)` runs [run_failure_test].
///     With `(name, input, code)` cases it runs [run_error_code_test] instead.
///     A single section uses one form for all of its cases.
///
/// `state` comes first and `options` second, when present.
/// The test sections follow in any order, and may repeat.
#[macro_export]
macro_rules! test_suite {
    ( state($state: ty), options $options: tt, expansion_equality_tests ( $( ($name: ident, $lhs: expr, $rhs: expr $(,)? ) ),* $(,)? ) $(,)? ) => (
        $(
            #[test]
            fn $name() {
                let lhs = $lhs;
                let rhs = $rhs;
                let options = vec! $options;
                texlang_testing::run_expansion_equality_test::<$state>(&lhs, &rhs, &options);
            }
        )*
    );
    ( state($state: ty), options $options: tt, expansion_equality_tests $test_body: tt $(,)? ) => (
        compile_error!("Invalid test cases for expansion_equality_tests: must be a list of tuples (name, lhs, rhs)");
    );
    ( state($state: ty), options $options: tt, failure_tests ( $( ($name: ident, $input: expr $(,)? ) ),* $(,)? ) $(,)? ) => (
        $(
            #[test]
            fn $name() {
                let input = $input;
                let options = vec! $options;
                texlang_testing::run_failure_test::<$state>(&input, &options);
            }
        )*
    );
    ( state($state: ty), options $options: tt, failure_tests ( $( ($name: ident, $input: expr, $code: expr $(,)? ) ),* $(,)? ) $(,)? ) => (
        $(
            #[test]
            fn $name() {
                let input = $input;
                let options = vec! $options;
                texlang_testing::run_error_code_test::<$state>(&input, $code, &options);
            }
        )*
    );
    ( state($state: ty), options $options: tt, $test_kind: ident $test_cases: tt $(,)? ) => (
        compile_error!("Invalid keyword: test_suite! only accepts the following keywords: `state, `options`, `expansion_equality_tests`, `failure_tests`");
    );
    ( state($state: ty), options $options: tt, $( $test_kind: ident $test_cases: tt ),+ $(,)? ) => (
        $(
            texlang_testing::test_suite![state($state), options $options, $test_kind $test_cases,];
        )+
    );
    ( options $options: tt, $( $test_kind: ident $test_cases: tt ),+ $(,)? ) => (
        texlang_testing::test_suite![state(State), options $options, $( $test_kind $test_cases, )+ ];
    );
    ( $( $test_kind: ident $test_cases: tt ),+ $(,)? ) => (
        texlang_testing::test_suite![options (texlang_testing::TestOption::BuiltInCommands(built_in_commands)), $( $test_kind $test_cases, )+ ];
    );
}
