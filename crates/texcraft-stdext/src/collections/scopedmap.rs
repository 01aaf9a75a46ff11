//! Associative containers with nested scopes and exact rollback.
//!
//! A [ScopedContainer] wraps a backing map and adds a stack of scopes.
//! Scopes are opened with [begin_group](ScopedContainer::begin_group)
//!     and closed with [end_group](ScopedContainer::end_group).
//! Every local insertion made while a scope is open is undone when the scope closes.
//!
//! Each open scope records, for every key it changed locally, the value
//!     (or absence of value) that was visible when the key was first changed in the scope.
//! Later local changes to the same key in the same scope record nothing,
//!     so a scope uses memory proportional to the number of distinct keys it touches.
//! Closing the scope restores the recorded values.
//!
//! ```
//! # use texcraft_stdext::collections::scopedmap::ScopedHashMap;
//! # use texcraft_stdext::collections::scopedmap::Scope;
//! let mut cats = ScopedHashMap::default();
//! cats.insert("paganini", "black", Scope::Local);
//! cats.begin_group();
//! cats.insert("paganini", "gray", Scope::Local);
//! cats.insert("paganini", "white", Scope::Local);
//! cats.insert("mint", "ginger", Scope::Local);
//! assert_eq!(cats.get(&"paganini"), Some(&"white"));
//! assert_eq!(cats.end_group(), Ok(()));
//! assert_eq!(cats.get(&"paganini"), Some(&"black"));
//! assert_eq!(cats.get(&"mint"), None);
//! ```
//!
//! A global insertion removes the key from the records of every open scope,
//!     so the value survives all of the scopes closing.
//! ```
//! # use texcraft_stdext::collections::scopedmap::ScopedHashMap;
//! # use texcraft_stdext::collections::scopedmap::Scope;
//! let mut cats = ScopedHashMap::default();
//! cats.insert("paganini", "black", Scope::Local);
//! cats.begin_group();
//! cats.insert("paganini", "gray", Scope::Local);
//! cats.begin_group();
//! cats.insert("paganini", "white", Scope::Global);
//! assert_eq!(cats.end_group(), Ok(()));
//! assert_eq!(cats.end_group(), Ok(()));
//! assert_eq!(cats.get(&"paganini"), Some(&"white"));
//! ```
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;

/// Trait for maps that can back a [ScopedContainer].
pub trait BackingContainer<K, V>: Default {
    /// Set the value at the key, returning the value that was there before.
    fn insert(&mut self, k: K, v: V) -> Option<V>;

    /// Get the value at the key.
    fn get(&self, k: &K) -> Option<&V>;

    /// Remove the value at the key, returning it.
    fn remove(&mut self, k: &K) -> Option<V>;

    /// Iterate over all `(key, value)` pairs.
    fn iter(&self) -> Box<dyn Iterator<Item = (K, &V)> + '_>;

    /// Number of keys with a value.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone, V> BackingContainer<K, V> for HashMap<K, V> {
    #[inline]
    fn insert(&mut self, k: K, v: V) -> Option<V> {
        HashMap::insert(self, k, v)
    }
    #[inline]
    fn get(&self, k: &K) -> Option<&V> {
        HashMap::get(self, k)
    }
    #[inline]
    fn remove(&mut self, k: &K) -> Option<V> {
        HashMap::remove(self, k)
    }
    fn iter(&self) -> Box<dyn Iterator<Item = (K, &V)> + '_> {
        Box::new(HashMap::iter(self).map(|(k, v)| (k.clone(), v)))
    }
    fn len(&self) -> usize {
        HashMap::len(self)
    }
}

/// Dense map keyed by small integers.
impl<V> BackingContainer<usize, V> for Vec<Option<V>> {
    #[inline]
    fn insert(&mut self, k: usize, v: V) -> Option<V> {
        if k >= self.len() {
            self.resize_with(k + 1, Default::default);
        }
        self[k].replace(v)
    }
    #[inline]
    fn get(&self, k: &usize) -> Option<&V> {
        <[Option<V>]>::get(self, *k).and_then(Option::as_ref)
    }
    #[inline]
    fn remove(&mut self, k: &usize) -> Option<V> {
        <[Option<V>]>::get_mut(self, *k).and_then(Option::take)
    }
    fn iter(&self) -> Box<dyn Iterator<Item = (usize, &V)> + '_> {
        Box::new(
            <[Option<V>]>::iter(self)
                .enumerate()
                .filter_map(|(k, v)| v.as_ref().map(|v| (k, v))),
        )
    }
    fn len(&self) -> usize {
        <[Option<V>]>::iter(self).filter(|v| v.is_some()).count()
    }
}

/// The scope an insertion applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Scope {
    /// The insertion is undone when the innermost open scope closes.
    Local,
    /// The insertion persists after every open scope closes.
    Global,
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
enum Restore<V> {
    Value(V),
    Delete,
}

/// Error returned by [ScopedContainer::end_group] when no scope is open.
#[derive(Debug, PartialEq, Eq)]
pub struct NoGroupToEndError;

/// A map with nested scopes; see the module documentation.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScopedContainer<K, V, T> {
    backing_container: T,
    // One entry per open scope, innermost last. The outermost (global) scope needs no cleanup
    // and has no entry.
    #[cfg_attr(
        feature = "serde",
        serde(bound(
            deserialize = "K: Eq + Hash + serde::Deserialize<'de>, V: serde::Deserialize<'de>"
        ))
    )]
    scopes: Vec<HashMap<K, Restore<V>>>,
}

/// A scoped container backed by a [HashMap].
pub type ScopedHashMap<K, V> = ScopedContainer<K, V, HashMap<K, V>>;

/// A scoped container backed by a vector, with [usize] keys used as indices.
pub type ScopedVec<V> = ScopedContainer<usize, V, Vec<Option<V>>>;

impl<K, V, T: Default> Default for ScopedContainer<K, V, T> {
    fn default() -> Self {
        Self {
            backing_container: Default::default(),
            scopes: Default::default(),
        }
    }
}

impl<K: Eq + Hash + Clone, V, T: BackingContainer<K, V>> ScopedContainer<K, V, T> {
    /// Insert a value in the provided scope.
    ///
    /// Returns whether a value was previously visible at the key.
    pub fn insert(&mut self, key: K, val: V, scope: Scope) -> bool {
        match scope {
            Scope::Local => {
                let previous = self.backing_container.insert(key.clone(), val);
                let existed = previous.is_some();
                if let Some(changes) = self.scopes.last_mut() {
                    if let Entry::Vacant(vacant) = changes.entry(key) {
                        vacant.insert(match previous {
                            None => Restore::Delete,
                            Some(previous) => Restore::Value(previous),
                        });
                    }
                }
                existed
            }
            Scope::Global => {
                for changes in &mut self.scopes {
                    changes.remove(&key);
                }
                self.backing_container.insert(key, val).is_some()
            }
        }
    }

    /// Get the currently visible value at the key.
    #[inline]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.backing_container.get(key)
    }

    /// Open a new scope.
    pub fn begin_group(&mut self) {
        // An empty map does not allocate, so scopes with no local changes are free.
        self.scopes.push(HashMap::new());
    }

    /// Close the innermost scope, undoing its local insertions.
    pub fn end_group(&mut self) -> Result<(), NoGroupToEndError> {
        let changes = self.scopes.pop().ok_or(NoGroupToEndError)?;
        for (key, restore) in changes {
            match restore {
                Restore::Delete => {
                    self.backing_container.remove(&key);
                }
                Restore::Value(val) => {
                    self.backing_container.insert(key, val);
                }
            }
        }
        Ok(())
    }

    /// Number of open scopes, not counting the global scope.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Iterate over all currently visible `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> + '_ {
        self.backing_container.iter()
    }

    pub fn backing_container(&self) -> &T {
        &self.backing_container
    }

    pub fn len(&self) -> usize {
        self.backing_container.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backing_container.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get() {
        let mut map = ScopedHashMap::default();
        assert!(!map.insert(3, 5, Scope::Local));
        assert_eq!(map.get(&3), Some(&5));
        assert!(map.insert(3, 6, Scope::Local));
        assert_eq!(map.get(&3), Some(&6));
    }

    #[test]
    fn local_insert_is_rolled_back() {
        let mut map = ScopedHashMap::default();
        map.insert(3, 5, Scope::Local);
        map.begin_group();
        map.insert(3, 6, Scope::Local);
        assert_eq!(map.end_group(), Ok(()));
        assert_eq!(map.get(&3), Some(&5));
    }

    #[test]
    fn local_insert_of_new_key_is_removed() {
        let mut map = ScopedHashMap::default();
        map.begin_group();
        map.insert(3, 5, Scope::Local);
        assert_eq!(map.end_group(), Ok(()));
        assert_eq!(map.get(&3), None);
    }

    #[test]
    fn repeated_local_inserts_restore_original() {
        let mut map = ScopedHashMap::default();
        map.insert(1, 1, Scope::Local);
        map.begin_group();
        for i in 2..10 {
            map.insert(1, i, Scope::Local);
        }
        assert_eq!(map.get(&1), Some(&9));
        map.end_group().unwrap();
        assert_eq!(map.get(&1), Some(&1));
    }

    #[test]
    fn repeated_local_inserts_record_one_restore() {
        let mut map = ScopedHashMap::default();
        map.insert(1, 0, Scope::Local);
        map.begin_group();
        for i in 0..1000 {
            map.insert(1, i, Scope::Local);
            map.insert(2, i, Scope::Local);
        }
        assert_eq!(map.scopes.last().map(HashMap::len), Some(2));
        assert_eq!(
            map.scopes.last().and_then(|scope| scope.get(&1)),
            Some(&Restore::Value(0))
        );
        assert_eq!(
            map.scopes.last().and_then(|scope| scope.get(&2)),
            Some(&Restore::Delete)
        );
        map.end_group().unwrap();
        assert_eq!(map.get(&1), Some(&0));
        assert_eq!(map.get(&2), None);
    }

    #[test]
    fn global_insert_clears_records_in_open_scopes() {
        let mut map = ScopedHashMap::default();
        map.begin_group();
        map.insert(1, 1, Scope::Local);
        map.begin_group();
        map.insert(1, 2, Scope::Local);
        map.insert(1, 3, Scope::Global);
        assert!(map.scopes.iter().all(HashMap::is_empty));
        map.end_group().unwrap();
        map.end_group().unwrap();
        assert_eq!(map.get(&1), Some(&3));
    }

    #[test]
    fn nested_scopes_restore_layer_by_layer() {
        let mut map = ScopedHashMap::default();
        map.insert(1, 1, Scope::Local);
        map.begin_group();
        map.insert(1, 2, Scope::Local);
        map.begin_group();
        map.insert(1, 3, Scope::Local);
        map.end_group().unwrap();
        assert_eq!(map.get(&1), Some(&2));
        map.end_group().unwrap();
        assert_eq!(map.get(&1), Some(&1));
    }

    #[test]
    fn global_insert_survives_all_scopes() {
        let mut map = ScopedHashMap::default();
        map.insert(1, 1, Scope::Local);
        map.begin_group();
        map.insert(1, 2, Scope::Local);
        map.begin_group();
        map.insert(1, 3, Scope::Global);
        map.end_group().unwrap();
        map.end_group().unwrap();
        assert_eq!(map.get(&1), Some(&3));
    }

    #[test]
    fn local_after_global_in_same_scope() {
        let mut map = ScopedHashMap::default();
        map.begin_group();
        map.insert(1, 1, Scope::Global);
        map.insert(1, 2, Scope::Local);
        map.end_group().unwrap();
        assert_eq!(map.get(&1), Some(&1));
    }

    #[test]
    fn global_insert_of_new_key() {
        let mut map = ScopedHashMap::default();
        map.begin_group();
        map.insert(3, 5, Scope::Global);
        map.end_group().unwrap();
        assert_eq!(map.get(&3), Some(&5));
    }

    #[test]
    fn end_group_without_group() {
        let mut map = ScopedHashMap::<usize, usize>::default();
        assert_eq!(map.end_group(), Err(NoGroupToEndError));
    }

    #[test]
    fn vec_backed_container() {
        let mut map = ScopedVec::default();
        map.insert(7, "a", Scope::Local);
        map.begin_group();
        map.insert(2, "b", Scope::Local);
        map.insert(7, "c", Scope::Local);
        assert_eq!(map.len(), 2);
        map.end_group().unwrap();
        assert_eq!(map.get(&7), Some(&"a"));
        assert_eq!(map.get(&2), None);
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(7, &"a")]);
    }
}
