//! Knuth–Morris–Pratt substring search
//!
//! A [Matcher] is built once for a fixed, non-empty pattern.
//! Searches are then run against strings whose elements arrive one at a time,
//!     which is how macro argument delimiters are found in a token stream
//!     whose length is not known in advance.
//!
//! ```
//! # use texcraft_stdext::algorithms::substringsearch::Matcher;
//! let matcher = Matcher::new(vec![2, 3, 2]).unwrap();
//! let mut search = matcher.start();
//! assert_eq![search.next(&1), false];
//! assert_eq![search.next(&2), false];
//! assert_eq![search.next(&3), false];
//! assert_eq![search.next(&2), true];
//! assert_eq![search.next(&3), false];
//! assert_eq![search.next(&2), true];
//! ```

/// A pattern together with its KMP failure function.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Matcher<T> {
    pattern: Vec<T>,
    // failure[i] is the length of the longest proper prefix of pattern[..=i]
    // that is also a suffix of it.
    failure: Vec<usize>,
}

impl<T: PartialEq> Matcher<T> {
    /// Build a matcher for the pattern, or [None] if the pattern is empty.
    pub fn new(pattern: Vec<T>) -> Option<Matcher<T>> {
        if pattern.is_empty() {
            return None;
        }
        let mut failure = Vec::with_capacity(pattern.len());
        failure.push(0);
        let mut k = 0;
        for i in 1..pattern.len() {
            while k > 0 && pattern[k] != pattern[i] {
                k = failure[k - 1];
            }
            if pattern[k] == pattern[i] {
                k += 1;
            }
            failure.push(k);
        }
        Some(Matcher { pattern, failure })
    }

    /// Start a new search.
    pub fn start(&self) -> Search<'_, T> {
        Search {
            matcher: self,
            matched: 0,
        }
    }

    /// The pattern being searched for. It is never empty.
    pub fn pattern(&self) -> &[T] {
        &self.pattern
    }
}

/// An in-progress search.
pub struct Search<'a, T> {
    matcher: &'a Matcher<T>,
    matched: usize,
}

impl<'a, T: PartialEq> Search<'a, T> {
    /// Feed the next element; returns true if the elements fed so far end with the pattern.
    pub fn next(&mut self, element: &T) -> bool {
        let pattern = &self.matcher.pattern;
        while self.matched > 0 && &pattern[self.matched] != element {
            self.matched = self.matcher.failure[self.matched - 1];
        }
        if &pattern[self.matched] == element {
            self.matched += 1;
        }
        if self.matched == pattern.len() {
            self.matched = self.matcher.failure[self.matched - 1];
            return true;
        }
        false
    }

    /// Length of the longest prefix of the pattern that the elements fed so far end with.
    ///
    /// This is zero right after a complete match unless the pattern overlaps itself.
    pub fn matched(&self) -> usize {
        self.matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find_all(pattern: &str, text: &str) -> Vec<usize> {
        let matcher = Matcher::new(pattern.chars().collect()).unwrap();
        let mut search = matcher.start();
        text.chars()
            .enumerate()
            .filter_map(|(i, c)| search.next(&c).then_some(i))
            .collect()
    }

    #[test]
    fn empty_pattern_is_rejected() {
        assert!(Matcher::<u8>::new(vec![]).is_none());
    }

    #[test]
    fn single_element() {
        assert_eq!(find_all("a", "banana"), vec![1, 3, 5]);
    }

    #[test]
    fn overlapping_matches() {
        assert_eq!(find_all("aa", "aaaa"), vec![1, 2, 3]);
        assert_eq!(find_all("aba", "ababa"), vec![2, 4]);
    }

    #[test]
    fn matched_tracks_partial_match() {
        let matcher = Matcher::new(vec!['x', 'y', 'z']).unwrap();
        let mut search = matcher.start();
        search.next(&'x');
        assert_eq!(search.matched(), 1);
        search.next(&'y');
        assert_eq!(search.matched(), 2);
        search.next(&'x');
        assert_eq!(search.matched(), 1);
        search.next(&'a');
        assert_eq!(search.matched(), 0);
    }

    #[test]
    fn partial_match_then_restart() {
        assert_eq!(find_all("xxy", "xxxy"), vec![3]);
        assert_eq!(find_all("abd", "abcabd"), vec![5]);
    }
}
