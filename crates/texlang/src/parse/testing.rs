//! Helpers for unit testing [Parsable] implementations.
//!
//! Each case parses a value from a short snippet in a VM with no commands defined.

use crate::error;
use crate::prelude as txl;
use crate::traits::*;
use crate::vm;
use std::collections::HashMap;
use std::fmt::Debug;

fn parse_snippet<S: TexlangState + Default, T: Parsable<S>>(source: &str) -> txl::Result<T> {
    let mut vm = vm::VM::<S>::new(HashMap::new());
    vm.push_source("parse.tex", source);
    T::parse(vm::ExecutionInput::new(&mut vm))
}

pub fn run_parse_success_test<S: TexlangState + Default, T: Parsable<S> + Debug + Eq>(
    source: &str,
    want: T,
) {
    match parse_snippet::<S, T>(source) {
        Ok(got) => assert_eq!(got, want),
        Err(err) => panic!["failed to parse {source:?}:\n{err}"],
    }
}

/// Parses the snippet, which must fail, and returns the error code.
pub fn run_parse_failure_test<S: TexlangState + Default, T: Parsable<S> + Debug>(
    source: &str,
) -> error::Code {
    match parse_snippet::<S, T>(source) {
        Ok(value) => panic![
            "parsed {value:?} as {} from {source:?}, which should be invalid",
            std::any::type_name::<T>()
        ],
        Err(err) => err.code(),
    }
}

/// Cases are `(test name, snippet, expected value)`; the state is `()`.
macro_rules! parse_success_tests {
    ($( ($name: ident, $input: expr, $expected: expr $(,)? ) ),+ $(,)? ) => {
        $(
        #[test]
        fn $name() {
            run_parse_success_test::<(), _>(&$input, $expected);
        }
        )+
    };
}

pub(crate) use parse_success_tests;

/// The first two arguments are the parsed type and the state.
/// Cases are `(test name, snippet)`, optionally followed by the expected error code.
macro_rules! parse_failure_tests {
    ( $parsable_type: ty, $state: ty, $( ($name: ident, $input: expr $(, $code: expr)? ), )+) => {
        $(
        #[test]
        fn $name() {
            let _got = run_parse_failure_test::<$state, $parsable_type>(&$input);
            $(
                assert_eq!(_got, $code);
            )?
        }
        )+
    };
}

pub(crate) use parse_failure_tests;
