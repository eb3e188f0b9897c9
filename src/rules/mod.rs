//! Rule Conditions
//!
//! Condition language for targeting rules: lexer, parser, typed values and the evaluator that
//! selects the effective rule for each feed row.

mod eval;
mod evaluator;
mod lexer;
mod parser;
mod value;

pub use eval::infer_kind;
pub use evaluator::ConditionEvaluator;
pub use parser::{parse, Expr};
pub use value::{compare, Kind, Period, Value};
