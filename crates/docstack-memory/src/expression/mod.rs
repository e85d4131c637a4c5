//! The expression subset understood by the in-memory store.

pub mod ast;
pub mod evaluator;
pub mod parser;

pub use evaluator::EvalContext;
pub use parser::{ExpressionError, parse_condition, parse_update};
