//! Semi-simple groups (`\begingroup` and `\endgroup`)

use texlang::prelude as txl;
use texlang::traits::*;
use texlang::vm::GroupKind;
use texlang::*;

/// Get the `\begingroup` command.
pub fn get_begingroup<S: TexlangState>() -> command::BuiltIn<S> {
    command::BuiltIn::new_execution(begingroup_primitive_fn)
        .with_doc("Begin a group that must be ended by \\endgroup")
}

/// Get the `\endgroup` command.
pub fn get_endgroup<S: TexlangState>() -> command::BuiltIn<S> {
    command::BuiltIn::new_execution(endgroup_primitive_fn)
        .with_doc("End a group begun by \\begingroup")
}

fn begingroup_primitive_fn<S: TexlangState>(
    _: token::Token,
    input: &mut vm::ExecutionInput<S>,
) -> txl::Result<()> {
    input.begin_group(GroupKind::Semisimple);
    Ok(())
}

fn endgroup_primitive_fn<S: TexlangState>(
    token: token::Token,
    input: &mut vm::ExecutionInput<S>,
) -> txl::Result<()> {
    input.end_group(token, GroupKind::Semisimple)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{def, prefix};
    use texlang::vm::implement_has_component;
    use texlang_testing::*;

    #[derive(Default)]
    struct State {
        prefix: prefix::Component,
        testing: TestingComponent,
    }

    impl TexlangState for State {}

    implement_has_component![
        State,
        (prefix::Component, prefix),
        (TestingComponent, testing),
    ];

    fn built_in_commands() -> HashMap<&'static str, command::BuiltIn<State>> {
        HashMap::from([
            ("begingroup", get_begingroup()),
            ("def", def::get_def()),
            ("endgroup", get_endgroup()),
            ("global", prefix::get_global()),
        ])
    }

    test_suite![
        expansion_equality_tests(
            (
                local_definition_rolled_back,
                r"\def\A{a}\begingroup\def\A{b}\A\endgroup\A",
                "ba"
            ),
            (
                global_definition_kept,
                r"\def\A{a}\begingroup\global\def\A{b}\A\endgroup\A",
                "bb"
            ),
            (
                nested_with_braces,
                r"\def\A{a}\begingroup{\def\A{b}\A}\A\endgroup\A",
                "baa"
            ),
        ),
        failure_tests(
            (endgroup_without_begingroup, r"\endgroup", error::Code::ExtraEndGroup),
            (
                begingroup_closed_by_brace,
                r"\begingroup}",
                error::Code::ExtraEndGroup
            ),
            (
                brace_closed_by_endgroup,
                r"{\endgroup",
                error::Code::ExtraEndGroup
            ),
        ),
    ];
}
