//! # The Texlang standard library
//!
//! This crate contains implementations of the TeX primitives that control macro expansion:
//! macro definition (`\def` and friends), aliasing (`\let`, `\futurelet`),
//! expansion control (`\expandafter`, `\noexpand`, `\csname`), grouping,
//! category codes and macro tracing.
//!
//! The [StdLibState] type is a state that is compatible with every primitive in the library.

extern crate texcraft_stdext;
extern crate texlang;

use std::collections::HashMap;

use texlang::command;
use texlang::error;
use texlang::prelude as txl;
use texlang::token;
use texlang::traits::*;
use texlang::vm;
use texlang::vm::implement_has_component;

pub mod alias;
pub mod catcode;
pub mod def;
pub mod expansion;
pub mod group;
pub mod prefix;
pub mod tracingmacros;

/// A state struct that is compatible with every primitive in the Texlang standard library.
#[derive(Default)]
pub struct StdLibState {
    pub catcode: catcode::Component,
    pub prefix: prefix::Component,
    pub tracing_macros: tracingmacros::Component,
    #[cfg(test)]
    testing: texlang_testing::TestingComponent,
}

impl TexlangState for StdLibState {
    #[inline]
    fn cat_code(&self, c: char) -> token::CatCode {
        catcode::cat_code(self, c)
    }

    #[inline]
    fn post_macro_expansion_hook(
        token: token::Token,
        input: &vm::ExpansionInput<Self>,
        tex_macro: &texlang::texmacro::Macro,
        arguments: &[&[token::Token]],
        reversed_expansion: &[token::Token],
    ) {
        tracingmacros::hook(token, input, tex_macro, arguments, reversed_expansion)
    }

    #[inline]
    fn expansion_override_hook(
        token: token::Token,
        input: &mut vm::ExpansionInput<Self>,
        tag: Option<command::Tag>,
    ) -> txl::Result<Option<token::Token>> {
        expansion::noexpand_hook(token, input, tag)
    }

    fn begin_group_hook(&mut self) {
        self.catcode.begin_group();
        self.tracing_macros.begin_group();
    }

    fn end_group_hook(&mut self) {
        self.catcode.end_group();
        self.tracing_macros.end_group();
    }
}

impl StdLibState {
    /// Create a state whose category codes start from the provided table
    ///     rather than the plainTeX defaults.
    pub fn with_cat_code_table(table: token::CatCodeTable) -> StdLibState {
        StdLibState {
            catcode: catcode::Component::new(table),
            ..Default::default()
        }
    }

    pub fn all_initial_built_ins() -> HashMap<&'static str, command::BuiltIn<StdLibState>> {
        HashMap::from([
            ("begingroup", group::get_begingroup()),
            //
            ("catcode", catcode::get_catcode()),
            ("csname", expansion::get_csname()),
            //
            ("def", def::get_def()),
            //
            ("edef", def::get_edef()),
            ("endcsname", expansion::get_endcsname()),
            ("endgroup", group::get_endgroup()),
            ("expandafter", expansion::get_expandafter_optimized()),
            //
            ("futurelet", alias::get_futurelet()),
            //
            ("gdef", def::get_gdef()),
            ("global", prefix::get_global()),
            //
            ("let", alias::get_let()),
            ("long", prefix::get_long()),
            //
            ("meaning", expansion::get_meaning()),
            //
            ("noexpand", expansion::get_noexpand()),
            //
            ("outer", prefix::get_outer()),
            //
            ("protected", prefix::get_protected()),
            //
            ("relax", expansion::get_relax()),
            //
            ("tracingmacros", tracingmacros::get_tracingmacros()),
            //
            ("xdef", def::get_xdef()),
        ])
    }

    /// Create a new VM that uses the standard library's state and all of its commands.
    pub fn new_vm() -> Box<vm::VM<StdLibState>> {
        vm::VM::<StdLibState>::new(StdLibState::all_initial_built_ins())
    }
}

implement_has_component![
    StdLibState,
    (catcode::Component, catcode),
    (prefix::Component, prefix),
    (tracingmacros::Component, tracing_macros),
];

#[cfg(test)]
implement_has_component![StdLibState, texlang_testing::TestingComponent, testing];

/// A TeX snippet that exercises some error case in the standard library.
pub struct ErrorCase {
    pub description: &'static str,
    pub source_code: &'static str,
    pub code: error::Code,
}

impl ErrorCase {
    /// Returns a vector of TeX snippets that exercise all error paths in Texlang.
    pub fn all_error_cases() -> Vec<ErrorCase> {
        use error::Code::*;
        let mut cases = vec![];
        for (description, source_code, code) in vec![
            ("undefined control sequence", r"\elephant", UndefinedControlSequence),
            (
                r"undefined control sequence on the right of \let",
                r"\let\a=\elephant",
                UndefinedControlSequence,
            ),
            ("use does not match definition", r"\def\a abc{} \a abd", PatternMismatch),
            (
                "delimiter never found",
                r"\def\a#1.x{} \a y.z",
                RunawayArgument,
            ),
            ("runaway undelimited argument", r"\def\a#1{} \a", RunawayArgument),
            ("runaway delimited argument", r"\def\a#1,{} \a abcd", RunawayArgument),
            ("paragraph in argument", r"\def\a#1{} \a\par", RunawayArgument),
            ("end of input after \\global", r"\global", UnexpectedEndOfInput),
            ("end of input in parameter text", r"\def\a#1", UnexpectedEndOfInput),
            ("end of input in replacement text", r"\def\a{abc", UnexpectedEndOfInput),
            ("end of input in \\csname", r"\csname abc", UnexpectedEndOfInput),
            ("end of input after \\expandafter", r"\expandafter", UnexpectedEndOfInput),
            ("end of input after \\noexpand", r"\noexpand", UnexpectedEndOfInput),
            ("end of input after \\let", r"\let", UnexpectedEndOfInput),
            ("extra \\endcsname", r"\endcsname", ExtraTerminator),
            ("category code out of bounds", r"\catcode 0 = 17", MalformedCategory),
            (
                "category code out of bounds (negative)",
                r"\catcode 0 = -1",
                MalformedCategory,
            ),
            (
                "outer macro in argument",
                r"\outer\def\b{}\def\a#1{}\a\b",
                OuterInContext,
            ),
            (
                "outer macro in replacement text",
                r"\outer\def\b{}\def\a{\b}",
                OuterInContext,
            ),
            ("missing brace after parameter text", r"\def\a}", UnexpectedToken),
            ("parameters out of order", r"\def\a#2{}", UnexpectedToken),
            ("parameter number too large", r"\def\a#1{#2}", UnexpectedToken),
            ("invalid command target", r"\let a = \def", UnexpectedToken),
            ("non-character in \\csname", r"\csname\relax\endcsname", UnexpectedToken),
            ("invalid end of group", r"}", ExtraEndGroup),
            ("mismatched group", r"\begingroup}", ExtraEndGroup),
            ("invalid character", "\u{7F}", InvalidCharacter),
            ("can't be prefixed by \\global", r"\global\relax a", InvalidPrefix),
            ("can't be prefixed by \\long", r"\long \let \a = \def", InvalidPrefix),
            ("can't be prefixed by \\outer", r"\outer \let \a = \def", InvalidPrefix),
            ("\\global can't prefix \\endgroup", r"\global\endgroup", InvalidPrefix),
        ] {
            cases.push(ErrorCase {
                description,
                source_code,
                code,
            })
        }
        cases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use texlang_testing::*;

    type State = StdLibState;

    fn built_in_commands() -> HashMap<&'static str, command::BuiltIn<State>> {
        StdLibState::all_initial_built_ins()
    }

    test_suite![
        expansion_equality_tests(
            (
                literal_body_round_trip,
                r"\def\a{x{y}\relax z}\a\a",
                r"x{y}\relax zx{y}\relax z"
            ),
            (delimited_argument, r"\def\a#1,{(#1)}\a ab,cd", r"(ab)cd"),
            (
                undelimited_brace_stripping,
                r"\def\a#1#2{(#1)(#2)}\a{xy}z",
                r"(xy)(z)"
            ),
            (
                scope_rollback,
                r"\def\a{1}{\def\a{2}\def\a{3}{\global\def\b{4}}\a}\a\b",
                r"314"
            ),
            (
                scope_rollback_restores_undefined,
                r"\def\b{x}{\def\a{1}}\let\c=\b\csname a\endcsname\c",
                r"x"
            ),
            (
                let_copies_meaning,
                r"\def\b{old}\let\a=\b\def\b{new}\a\b",
                r"oldnew"
            ),
            (
                csname_totalizes,
                r"\csname abc\endcsname\abc\def\x{ok}\x",
                r"ok"
            ),
            (
                expandafter_reordering,
                r"\def\u{PQ}\expandafter t\u",
                r"tPQ"
            ),
            (
                greet,
                r"\def\greet#1{Hello, #1!}\greet{World}",
                r"Hello, World!"
            ),
            (
                edef_with_noexpand_and_csname,
                r"\def\x{X}\edef\a{\x\noexpand\x\csname x\endcsname}\def\x{Y}\a",
                r"XYX"
            ),
            (
                futurelet_lookahead,
                r"\def\t{T}\futurelet\n\relax\t\n",
                r"TT"
            ),
            (
                semisimple_group_with_catcode,
                r"\begingroup\catcode`\[=1 \catcode`\]=2 \def\a[x]\a\endgroup[]",
                r"x[]"
            ),
        ),
    ];

    #[test]
    fn all_error_cases() {
        let options = vec![
            TestOption::BuiltInCommands(StdLibState::all_initial_built_ins),
            TestOption::AllowUndefinedCommands(false),
        ];
        for case in ErrorCase::all_error_cases() {
            println!("CASE {}", case.description);
            run_error_code_test::<StdLibState>(case.source_code, case.code, &options)
        }
    }

    #[test]
    fn every_error_code_has_a_case() {
        let cases = ErrorCase::all_error_cases();
        for code in error::Code::all() {
            assert!(
                cases.iter().any(|case| case.code == *code),
                "no error case for {code}"
            );
        }
    }

    #[test]
    fn error_position_points_at_the_source() {
        let mut vm = StdLibState::new_vm();
        vm.push_source("input.tex", "\\def\\a abc{}\n\\a abd");
        let err = vm.run::<vm::DefaultHandlers>().unwrap_err();
        assert_eq!(err.code(), error::Code::PatternMismatch);
        let position = err.position().unwrap();
        assert_eq!(position.line_number, 2);
    }

    #[test]
    fn custom_cat_code_table() {
        let mut vm = vm::VM::<StdLibState>::new(StdLibState::all_initial_built_ins());
        vm.state = StdLibState::with_cat_code_table(token::CatCodeTable::initex());
        assert_eq!(vm.state.cat_code('{'), token::CatCode::Other);
        assert_eq!(vm.state.cat_code('\\'), token::CatCode::Escape);
    }
}
