//! Sandboxed arithmetic expressions for formula placeholders
//!
//! Expressions are lexed with logos, parsed with chumsky into a small AST,
//! and evaluated by a tree-walking interpreter. The grammar only admits
//! numbers, names, `+ - * /`, parentheses, unary minus and calls to the
//! allow-listed math functions.
//!
//! ```rust
//! use blueprint_formula::expr::{evaluate, Value, Variables};
//!
//! let mut vars = Variables::new();
//! vars.insert("mmA".to_string(), Value::Number(1500.0));
//! assert_eq!(evaluate("mmA * 2", &vars), Ok(Value::Number(3000.0)));
//! assert!(evaluate("mmA.real", &vars).is_err());
//! ```

pub mod ast;
mod eval;
mod grammar;
pub mod lexer;

pub use ast::{BinaryOp, Expr};
pub use eval::{
    evaluate, evaluate_with_limits, is_builtin, MathFunction, Namespace, Value, Variables,
    CONSTANTS,
};
pub use grammar::{parse, parse_with_limits, ParseLimits};
