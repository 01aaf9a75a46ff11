//! Data structures and algorithms used in Texlang that are not specific to TeX.

pub mod algorithms {
    pub mod spellcheck;
    pub mod substringsearch;
}

pub mod collections {
    pub mod interner;
    pub mod scopedmap;
}

pub mod color;
