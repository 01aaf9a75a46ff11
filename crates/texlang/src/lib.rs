//! # Texlang: a TeX language interpreter.
//!
//! This crate implements the macro layer of the TeX language:
//!     category codes, tokens, scoped command bindings,
//!     user defined macros and the machinery for expanding them.
//! The primitives themselves (`\def`, `\let`, `\csname` and friends) live in the
//!     `texlang-stdlib` crate and are plugged into the [vm::VM] as built-in commands.

extern crate texcraft_stdext;

pub mod command;
pub mod error;
pub mod parse;
pub mod prelude;
pub mod texmacro;
pub mod token;
pub mod vm;

/// Module that re-exports all of the crate's traits.
///
/// This is useful for getting all of the traits in scope in a Rust module:
/// ```
/// use texlang::traits::*;
/// ```
pub mod traits {
    pub use super::error::TexError;
    pub use super::parse::Parsable;
    pub use super::vm::HasComponent;
    pub use super::vm::TexlangState;
    pub use super::vm::TokenStream;
}
