// Formula tokenization, reference resolution, parsing and evaluation

pub mod token;
pub mod refs;
pub mod resolve;
pub mod parser;
pub mod eval;

pub use eval::{evaluate, evaluate_with, Resolution};
pub use resolve::{display_to_stored, hydrate, ids_to_display, ids_to_names, names_to_ids};
pub use token::{parse, FormulaSequence, Operator, Token, TokenId, TokenKind};
