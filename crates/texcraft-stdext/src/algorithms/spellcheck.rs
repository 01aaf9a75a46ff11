//! Spell checking using Levenshtein distance
//!
//! [find_close_words] ranks a dictionary by
//!     [Levenshtein distance](https://en.wikipedia.org/wiki/Levenshtein_distance)
//!     to a search word.
//! It is used to build "did you mean ...?" hints for misspelled control sequence names.
//!
//! ```
//! # use texcraft_stdext::algorithms::spellcheck::find_close_words;
//! let dictionary = ["expandafter", "endcsname", "csname"];
//! let suggestions = find_close_words(dictionary, "expandafer", 2);
//! assert_eq!(suggestions.len(), 1);
//! assert_eq!(suggestions[0].word, "expandafter");
//! assert_eq!(suggestions[0].distance, 1);
//! ```

/// A dictionary word together with its distance to the search word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub word: String,
    pub distance: usize,
}

/// Return the dictionary words within `max_distance` of `word`, closest first.
///
/// Ties are broken alphabetically so the output is deterministic.
pub fn find_close_words<'a, I>(dictionary: I, word: &str, max_distance: usize) -> Vec<Suggestion>
where
    I: IntoIterator<Item = &'a str>,
{
    let word: Vec<char> = word.chars().collect();
    let mut suggestions: Vec<Suggestion> = dictionary
        .into_iter()
        .filter_map(|candidate| {
            let distance = levenshtein_distance(&word, candidate);
            (distance <= max_distance).then(|| Suggestion {
                word: candidate.to_string(),
                distance,
            })
        })
        .collect();
    suggestions.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.word.cmp(&b.word)));
    suggestions
}

// Two-row dynamic programming: row[j] is the distance between a[..i] and b[..j].
fn levenshtein_distance(a: &[char], b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, a_char) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, b_char) in b.iter().enumerate() {
            current[j + 1] = if a_char == b_char {
                previous[j]
            } else {
                1 + previous[j].min(previous[j + 1]).min(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distance(a: &str, b: &str) -> usize {
        levenshtein_distance(&a.chars().collect::<Vec<_>>(), b)
    }

    #[test]
    fn distances() {
        assert_eq!(distance("", ""), 0);
        assert_eq!(distance("abc", ""), 3);
        assert_eq!(distance("", "abc"), 3);
        assert_eq!(distance("kitten", "sitting"), 3);
        assert_eq!(distance("def", "edef"), 1);
        assert_eq!(distance("let", "let"), 0);
    }

    #[test]
    fn ordering_is_by_distance_then_word() {
        let got = find_close_words(["gdef", "xdef", "edef", "relax"], "def", 1);
        let words: Vec<&str> = got.iter().map(|s| s.word.as_str()).collect();
        assert_eq!(words, vec!["edef", "gdef", "xdef"]);
    }

    #[test]
    fn nothing_close_enough() {
        assert!(find_close_words(["expandafter"], "let", 2).is_empty());
    }
}
