//! The `\catcode` primitive and the scoped category code table

use crate::prefix;
use texcraft_stdext::collections::scopedmap::ScopedHashMap;
use texlang::parse::OptionalEquals;
use texlang::prelude as txl;
use texlang::token::CatCode;
use texlang::token::CatCodeTable;
use texlang::traits::*;
use texlang::*;

/// Component that stores the category code of every character.
///
/// Assignments made with `\catcode` are layered on top of a fixed base table
///     and are undone when the group they were made in ends.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Component {
    table: CatCodeTable,
    assignments: ScopedHashMap<char, CatCode>,
}

impl Component {
    /// Create a component whose base table is the provided table.
    pub fn new(table: CatCodeTable) -> Component {
        Component {
            table,
            assignments: Default::default(),
        }
    }

    #[inline]
    pub fn get(&self, c: char) -> CatCode {
        if self.assignments.is_empty() {
            return self.table.get(c);
        }
        match self.assignments.get(&c) {
            None => self.table.get(c),
            Some(cat_code) => *cat_code,
        }
    }

    pub fn set(&mut self, c: char, cat_code: CatCode, scope: command::Scope) {
        self.assignments.insert(c, cat_code, scope);
    }

    pub fn begin_group(&mut self) {
        self.assignments.begin_group();
    }

    pub fn end_group(&mut self) {
        if self.assignments.end_group().is_err() {
            log::warn!("category code table: ended a group that was never begun");
        }
    }
}

impl Default for Component {
    fn default() -> Self {
        Component::new(CatCodeTable::plain_tex())
    }
}

/// Returns the category code of the character.
///
/// States that include this component should call this from [TexlangState::cat_code].
#[inline]
pub fn cat_code<S: HasComponent<Component>>(state: &S, c: char) -> CatCode {
    state.component().get(c)
}

pub const CATCODE_DOC: &str = "Set the category code of a character";

static CATCODE_TAG: command::StaticTag = command::StaticTag::new();

pub fn catcode_tag() -> command::Tag {
    CATCODE_TAG.get()
}

/// Get the `\catcode` command.
pub fn get_catcode<S>() -> command::BuiltIn<S>
where
    S: HasComponent<Component> + HasComponent<prefix::Component>,
{
    command::BuiltIn::new_execution(catcode_primitive_fn::<S>)
        .with_tag(catcode_tag())
        .with_doc(CATCODE_DOC)
}

fn catcode_primitive_fn<S>(_: token::Token, input: &mut vm::ExecutionInput<S>) -> txl::Result<()>
where
    S: HasComponent<Component> + HasComponent<prefix::Component>,
{
    let scope = HasComponent::<prefix::Component>::component_mut(input.state_mut()).take_scope();
    let (c, _, cat_code) = <(char, OptionalEquals, CatCode)>::parse(input)?;
    log::trace!("setting the category code of {c:?} to {cat_code} in {scope:?} scope");
    HasComponent::<Component>::component_mut(input.state_mut()).set(c, cat_code, scope);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{def, expansion};
    use texlang::vm::implement_has_component;
    use texlang_testing::*;

    #[derive(Default)]
    struct State {
        catcode: Component,
        prefix: prefix::Component,
        testing: TestingComponent,
    }

    impl TexlangState for State {
        fn cat_code(&self, c: char) -> CatCode {
            cat_code(self, c)
        }

        fn begin_group_hook(&mut self) {
            self.catcode.begin_group();
        }

        fn end_group_hook(&mut self) {
            self.catcode.end_group();
        }
    }

    implement_has_component![
        State,
        (Component, catcode),
        (prefix::Component, prefix),
        (TestingComponent, testing),
    ];

    fn built_in_commands() -> HashMap<&'static str, command::BuiltIn<State>> {
        HashMap::from([
            ("catcode", get_catcode()),
            ("def", def::get_def()),
            ("gdef", def::get_gdef()),
            ("global", prefix::get_global()),
            ("meaning", expansion::get_meaning()),
        ])
    }

    test_suite![
        expansion_equality_tests(
            (
                brackets_as_braces,
                r"\catcode`\[=1 \catcode`\]=2 \def\A[x]\A",
                "x"
            ),
            (
                new_escape_character,
                r"\catcode`\|=0 |def|A{x}|A",
                "x"
            ),
            (
                letter_extends_control_sequence_name,
                r"\catcode`\@=11 \def\A@{y}\A@",
                "y"
            ),
            (
                assignment_rolled_back_at_group_end,
                r"\def\A{x}{\catcode`\@=11 \gdef\A@{y}\A@}\A@",
                "yx@"
            ),
            (
                global_assignment_survives_group_end,
                r"\def\A{x}{\global\catcode`\@=11 \gdef\A@{y}}\A@",
                "y"
            ),
            (
                decimal_character_code,
                r"\catcode 91 = 1 \catcode 93 2 \def\A[x]\A",
                "x"
            ),
            (
                ignored_character,
                r"\catcode`\Z=9 aZb",
                "ab"
            ),
        ),
        failure_tests(
            (catcode_value_too_large, r"\catcode 48 16", error::Code::MalformedCategory),
            (catcode_value_negative, r"\catcode 48 = -1", error::Code::MalformedCategory),
            (catcode_end_of_input, r"\catcode 48 =", error::Code::UnexpectedEndOfInput),
            (invalid_character, r"\catcode`\!=15 !", error::Code::InvalidCharacter),
        ),
    ];

    macro_rules! output_tests {
        ( $( ( $name: ident, $input: expr, $want: expr ) ),* $(,)? ) => {
            $(
                #[test]
                fn $name() {
                    let options = vec![TestOption::BuiltInCommands(built_in_commands)];
                    run_output_test($input, $want, &options);
                }
            )*
        };
    }

    output_tests![
        (digit_is_other_by_default, r"\meaning 0", "the character 0"),
        (digit_as_letter, r"\catcode 48 = 11 \meaning 0", "the letter 0"),
        (
            grouping,
            r"{\catcode 48 = 11 }\meaning 0",
            "the character 0"
        ),
        (
            nested_grouping,
            r"{\catcode 48 = 11 {\catcode 48 = 13 }\meaning 0}",
            "the letter 0"
        ),
        (
            global,
            r"{{\global\catcode 48 = 11 }}\meaning 0",
            "the letter 0"
        ),
        (
            global_then_local,
            r"{\global\catcode 48 = 11 \catcode 48 = 13 }\meaning 0",
            "the letter 0"
        ),
    ];

    #[test]
    fn base_table_is_used_without_assignments() {
        let component = Component::new(CatCodeTable::initex());
        assert_eq!(component.get('{'), CatCode::initex_default('{'));
        let component = Component::default();
        assert_eq!(component.get('{'), CatCode::BeginGroup);
    }
}
