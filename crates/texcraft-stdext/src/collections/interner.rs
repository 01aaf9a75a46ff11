//! String interning
//!
//! An interner maps strings to small integer keys and back.
//! Interning the same string twice returns the same key,
//!     so keys can be compared and hashed in place of the strings themselves.
//! Interned strings are never freed.
//!
//! ```
//! # use texcraft_stdext::collections::interner::Interner;
//! let mut interner: Interner = Default::default();
//! let hello_1 = interner.get_or_intern("hello");
//! let world = interner.get_or_intern("world");
//! let hello_2 = interner.get_or_intern("hello");
//! assert_eq!(hello_1, hello_2);
//! assert_ne!(hello_1, world);
//! assert_eq!(interner.resolve(world), Some("world"));
//! assert_eq!(interner.get("other"), None);
//! ```
//!
//! The interner is an ordinary value.
//! Two interpreters that each own an interner never observe each other's keys.

use std::collections::HashMap;
use std::num;
use std::rc::Rc;

/// Types that can be used as keys in the [Interner].
pub trait Key: Copy {
    /// Build the key for the `index`-th interned string, or [None] if the key space is exhausted.
    fn try_from_usize(index: usize) -> Option<Self>;

    /// Recover the index the key was built from.
    fn into_usize(self) -> usize;
}

impl Key for num::NonZeroU32 {
    fn try_from_usize(index: usize) -> Option<Self> {
        let u: u32 = index.checked_add(1)?.try_into().ok()?;
        num::NonZeroU32::new(u)
    }

    fn into_usize(self) -> usize {
        self.get() as usize - 1
    }
}

/// String interner; see the module documentation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(from = "Vec<String>", into = "Vec<String>", bound = "K: Key")
)]
pub struct Interner<K = num::NonZeroU32> {
    strings: Vec<Rc<str>>,
    keys: HashMap<Rc<str>, K>,
}

impl<K> Default for Interner<K> {
    fn default() -> Self {
        Self {
            strings: Default::default(),
            keys: Default::default(),
        }
    }
}

/// Error returned when the key type cannot represent any more strings.
#[derive(Debug, PartialEq, Eq)]
pub struct KeySpaceExhausted;

impl<K: Key> Interner<K> {
    /// Intern the string and return its key.
    ///
    /// Panics if the key space is exhausted; use [Interner::try_get_or_intern] to handle that case.
    pub fn get_or_intern(&mut self, s: &str) -> K {
        match self.try_get_or_intern(s) {
            Ok(key) => key,
            Err(_) => panic!("interner key space exhausted after {} strings", self.len()),
        }
    }

    /// Intern the string and return its key, or an error if no more keys are available.
    pub fn try_get_or_intern(&mut self, s: &str) -> Result<K, KeySpaceExhausted> {
        if let Some(key) = self.keys.get(s) {
            return Ok(*key);
        }
        let key = K::try_from_usize(self.strings.len()).ok_or(KeySpaceExhausted)?;
        let s: Rc<str> = s.into();
        self.strings.push(s.clone());
        self.keys.insert(s, key);
        Ok(key)
    }

    /// Get the key of the string if it has already been interned.
    pub fn get(&self, s: &str) -> Option<K> {
        self.keys.get(s).copied()
    }

    /// Return the string that the key was returned for.
    pub fn resolve(&self, k: K) -> Option<&str> {
        self.strings.get(k.into_usize()).map(AsRef::as_ref)
    }

    /// Number of distinct interned strings.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl<K: Key> From<Vec<String>> for Interner<K> {
    fn from(strings: Vec<String>) -> Self {
        let mut interner: Interner<K> = Default::default();
        for s in strings {
            interner.get_or_intern(&s);
        }
        interner
    }
}

impl<K> From<Interner<K>> for Vec<String> {
    fn from(interner: Interner<K>) -> Self {
        interner.strings.iter().map(|s| s.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_dense() {
        let mut interner: Interner = Default::default();
        let a = interner.get_or_intern("a");
        let b = interner.get_or_intern("b");
        assert_eq!(a.into_usize(), 0);
        assert_eq!(b.into_usize(), 1);
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn empty_string() {
        let mut interner: Interner = Default::default();
        let empty = interner.get_or_intern("");
        assert_eq!(interner.resolve(empty), Some(""));
        assert_eq!(interner.get(""), Some(empty));
    }

    #[test]
    fn resolve_unknown_key() {
        let interner: Interner = Default::default();
        assert_eq!(interner.resolve(num::NonZeroU32::new(7).unwrap()), None);
    }

    #[test]
    fn exhausted_key_space() {
        #[derive(Clone, Copy, Debug, PartialEq)]
        struct TinyKey(u8);
        impl Key for TinyKey {
            fn try_from_usize(index: usize) -> Option<Self> {
                if index < 2 {
                    Some(TinyKey(index as u8))
                } else {
                    None
                }
            }
            fn into_usize(self) -> usize {
                self.0 as usize
            }
        }
        let mut interner: Interner<TinyKey> = Default::default();
        interner.get_or_intern("a");
        interner.get_or_intern("b");
        assert_eq!(interner.try_get_or_intern("a"), Ok(TinyKey(0)));
        assert_eq!(interner.try_get_or_intern("c"), Err(KeySpaceExhausted));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_round_trip_preserves_keys() {
        let mut interner: Interner = Default::default();
        let hello = interner.get_or_intern("hello");
        let world = interner.get_or_intern("world");
        let serialized = serde_json::to_string(&interner).unwrap();
        let deserialized: Interner = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.resolve(hello), Some("hello"));
        assert_eq!(deserialized.get("world"), Some(world));
    }
}
