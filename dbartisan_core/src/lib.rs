//! Database independent building blocks of `dbartisan`: SQL dialect resolution,
//! recipe discovery and the SQL file grammars.

pub mod dialect;
pub mod recipe;

pub use dialect::Dialect;
pub use recipe::{RecipeError, SplitMode};
