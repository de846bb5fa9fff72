pub mod ast;
pub mod lexer;
#[allow(clippy::module_inception)]
pub mod parser;

pub use parser::{parse, parse_expanded, split_sequence};
