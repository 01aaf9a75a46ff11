//! Map type
use super::*;
use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use texcraft_stdext::collections::interner::Key;
use texcraft_stdext::collections::scopedmap;
use texcraft_stdext::collections::scopedmap::ScopedHashMap;
use texcraft_stdext::collections::scopedmap::ScopedVec;

pub use scopedmap::Scope;

/// Map is a map type where the keys are command references and the values are TeX commands.
///
/// This is the binding table of the VM.
/// Lookups of control sequences are fast: the interned control sequence name is an index
///     into a vector of commands.
/// Active characters are stored in a separate hash map.
///
/// Both containers are scoped.
/// A local insertion made after [Map::begin_group] is undone by the matching [Map::end_group];
///     a global insertion survives every open group.
pub struct Map<S> {
    commands: ScopedVec<Command<S>>,
    active_char: ScopedHashMap<char, Command<S>>,

    built_in_commands: HashMap<token::CsName, BuiltIn<S>>,
    primitive_key_to_built_in_lazy: RefCell<Option<HashMap<PrimitiveKey, token::CsName>>>,
}

impl<S> Map<S> {
    pub(crate) fn new(built_in_commands: HashMap<token::CsName, BuiltIn<S>>) -> Map<S> {
        let mut commands: ScopedVec<Command<S>> = Default::default();
        for (cs_name, built_in) in &built_in_commands {
            commands.insert(cs_name.to_usize(), built_in.cmd.clone(), Scope::Global);
        }
        Self {
            commands,
            active_char: Default::default(),
            built_in_commands,
            primitive_key_to_built_in_lazy: Default::default(),
        }
    }

    /// Look up the meaning of a command reference.
    #[inline]
    pub fn get_command(&self, command_ref: &token::CommandRef) -> Option<&Command<S>> {
        match command_ref {
            token::CommandRef::ControlSequence(name) => self.commands.get(&name.to_usize()),
            token::CommandRef::ActiveCharacter(c) => self.active_char.get(c),
        }
    }

    pub fn get_tag(&self, command_ref: &token::CommandRef) -> Option<Tag> {
        self.get_command(command_ref).and_then(Command::tag)
    }

    pub fn built_in_commands(&self) -> &HashMap<token::CsName, BuiltIn<S>> {
        &self.built_in_commands
    }

    /// Look up a command along with its documentation, if it is a built-in primitive.
    pub fn get_command_slow(&self, command_ref: &token::CommandRef) -> Option<BuiltIn<S>> {
        let command = self.get_command(command_ref)?;
        if let Some(ref key) = PrimitiveKey::new(command) {
            if let Some(built_in) = self.primitive_key_to_built_in().get(key) {
                return self.built_in_commands.get(built_in).cloned();
            }
        }
        Some(BuiltIn {
            cmd: command.clone(),
            doc: None,
        })
    }

    /// Returns the name under which the command's primitive was provided to the VM.
    ///
    /// This recovers `\def` from a control sequence created by `\let\define=\def`.
    /// Returns [None] for macros, character aliases and undefined commands.
    pub fn primitive_name(&self, command_ref: &token::CommandRef) -> Option<token::CsName> {
        let key = PrimitiveKey::new(self.get_command(command_ref)?)?;
        self.primitive_key_to_built_in().get(&key).copied()
    }

    pub fn insert_macro(
        &mut self,
        name: token::CommandRef,
        texmacro: texmacro::Macro,
        scope: Scope,
    ) {
        self.insert(name, Command::Macro(rc::Rc::new(texmacro)), scope);
    }

    /// Give `alias` the current meaning of `command`.
    ///
    /// Returns an error if `command` has no meaning.
    pub fn alias_control_sequence(
        &mut self,
        alias: token::CommandRef,
        command: &token::CommandRef,
        scope: Scope,
    ) -> std::result::Result<(), InvalidAlias> {
        let command = match self.get_command(command) {
            None => return Err(InvalidAlias {}),
            Some(t) => t.clone(),
        };
        self.insert(alias, command, scope);
        Ok(())
    }

    /// Make `alias` a stand-in for the character token.
    pub fn alias_token(&mut self, alias: token::CommandRef, token: token::Token, scope: Scope) {
        self.insert(alias, Command::CharacterTokenAlias(token.value()), scope);
    }

    pub fn insert(&mut self, command_ref: token::CommandRef, func: Command<S>, scope: Scope) {
        match command_ref {
            token::CommandRef::ControlSequence(name) => {
                self.commands.insert(name.to_usize(), func, scope);
            }
            token::CommandRef::ActiveCharacter(c) => {
                self.active_char.insert(c, func, scope);
            }
        }
    }

    /// Return all control sequences that currently have a meaning.
    pub fn to_hash_map_slow(&self) -> HashMap<token::CsName, BuiltIn<S>> {
        let mut result = HashMap::new();
        for (key, _) in self.commands.iter() {
            let cs_name = match token::CsName::try_from_usize(key) {
                None => continue,
                Some(cs_name) => cs_name,
            };
            let command_ref = token::CommandRef::ControlSequence(cs_name);
            if let Some(cmd) = self.get_command_slow(&command_ref) {
                result.insert(cs_name, cmd);
            }
        }
        result
    }

    pub(crate) fn begin_group(&mut self) {
        self.commands.begin_group();
        self.active_char.begin_group();
    }

    pub(crate) fn end_group(&mut self) -> std::result::Result<(), scopedmap::NoGroupToEndError> {
        self.commands.end_group()?;
        self.active_char.end_group()?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.commands.len() + self.active_char.len()
    }

    fn primitive_key_to_built_in(&self) -> Ref<'_, HashMap<PrimitiveKey, token::CsName>> {
        if let Ok(r) = Ref::filter_map(self.primitive_key_to_built_in_lazy.borrow(), Option::as_ref)
        {
            return r;
        }
        *self.primitive_key_to_built_in_lazy.borrow_mut() = Some(
            self.built_in_commands
                .iter()
                .filter_map(|(cs_name, built_in)| {
                    PrimitiveKey::new(built_in.cmd()).map(|key| (key, *cs_name))
                })
                .collect(),
        );
        self.primitive_key_to_built_in()
    }
}

#[derive(Debug)]
pub struct InvalidAlias;

impl fmt::Display for InvalidAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid alias: the control sequence to alias is undefined"
        )
    }
}

impl std::error::Error for InvalidAlias {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::CsNameInterner;

    fn noop(_: token::Token, _: &mut vm::ExecutionInput<()>) -> txl::Result<()> {
        Ok(())
    }

    fn cs(interner: &mut CsNameInterner, name: &str) -> token::CommandRef {
        token::CommandRef::ControlSequence(interner.get_or_intern(name))
    }

    fn is_relax(map: &Map<()>, command_ref: &token::CommandRef) -> bool {
        matches!(map.get_command(command_ref), Some(Command::Relax))
    }

    #[test]
    fn local_binding_is_undone_at_end_of_group() {
        let mut interner = CsNameInterner::default();
        let a = cs(&mut interner, "a");
        let mut map: Map<()> = Map::new(HashMap::new());
        map.begin_group();
        map.insert(a, Command::Relax, Scope::Local);
        assert!(is_relax(&map, &a));
        map.end_group().unwrap();
        assert!(map.get_command(&a).is_none());
    }

    #[test]
    fn global_binding_survives_groups() {
        let mut interner = CsNameInterner::default();
        let a = cs(&mut interner, "a");
        let mut map: Map<()> = Map::new(HashMap::new());
        map.begin_group();
        map.begin_group();
        map.insert(a, Command::Relax, Scope::Local);
        map.insert(a, Command::Execution(noop, None), Scope::Global);
        map.end_group().unwrap();
        map.end_group().unwrap();
        assert!(matches!(map.get_command(&a), Some(Command::Execution(_, _))));
    }

    #[test]
    fn active_characters_are_scoped() {
        let mut map: Map<()> = Map::new(HashMap::new());
        let tilde = token::CommandRef::ActiveCharacter('~');
        map.insert(tilde, Command::Relax, Scope::Local);
        map.begin_group();
        map.insert(
            tilde,
            Command::CharacterTokenAlias(token::Value::Letter('x')),
            Scope::Local,
        );
        map.end_group().unwrap();
        assert!(is_relax(&map, &tilde));
    }

    #[test]
    fn alias_of_undefined_command_fails() {
        let mut interner = CsNameInterner::default();
        let a = cs(&mut interner, "a");
        let b = cs(&mut interner, "b");
        let mut map: Map<()> = Map::new(HashMap::new());
        assert!(map.alias_control_sequence(a, &b, Scope::Local).is_err());
        map.insert(b, Command::Relax, Scope::Local);
        assert!(map.alias_control_sequence(a, &b, Scope::Local).is_ok());
        assert!(is_relax(&map, &a));
    }

    #[test]
    fn end_group_without_begin_fails() {
        let mut map: Map<()> = Map::new(HashMap::new());
        assert!(map.end_group().is_err());
    }

    #[test]
    fn built_in_documentation_survives_aliasing() {
        let mut interner = CsNameInterner::default();
        let noop_name = interner.get_or_intern("noop");
        let other = cs(&mut interner, "other");
        let mut built_ins = HashMap::new();
        built_ins.insert(
            noop_name,
            BuiltIn::<()>::new_execution(noop).with_doc("does nothing"),
        );
        let mut map = Map::new(built_ins);
        map.alias_control_sequence(
            other,
            &token::CommandRef::ControlSequence(noop_name),
            Scope::Local,
        )
        .unwrap();
        let built_in = map.get_command_slow(&other).unwrap();
        assert_eq!(built_in.doc(), Some("does nothing"));
        assert_eq!(map.primitive_name(&other), Some(noop_name));
    }

    #[test]
    fn primitive_name_of_undefined_command() {
        let mut interner = CsNameInterner::default();
        let a = cs(&mut interner, "a");
        let map: Map<()> = Map::new(HashMap::new());
        assert_eq!(map.primitive_name(&a), None);
    }
}
