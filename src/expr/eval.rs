//! Tree-walking interpreter over a closed namespace
//!
//! The namespace is the fixed set of math constants and functions below,
//! overlaid by caller-supplied variables. Nothing else is reachable: there is
//! no attribute access, no indexing and no way to name a host function.

use std::collections::BTreeMap;

use crate::error::ExprError;
use crate::expr::ast::{BinaryOp, Expr};
use crate::expr::grammar::{parse_with_limits, ParseLimits};

/// A variable or result value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    /// Text placed into the document for this value.
    ///
    /// Numbers are rounded to the nearest integer with ties going to the even
    /// neighbour; text passes through unchanged.
    pub fn display_text(&self) -> String {
        match self {
            Value::Number(n) => {
                let rounded = n.round_ties_even();
                if rounded == 0.0 {
                    // avoid "-0"
                    "0".to_string()
                } else {
                    format!("{}", rounded)
                }
            }
            Value::Text(s) => s.clone(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(_) => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// Variable bindings for one evaluation pass
pub type Variables = BTreeMap<String, Value>;

/// Named constants in the namespace
pub const CONSTANTS: &[(&str, f64)] = &[
    ("pi", std::f64::consts::PI),
    ("e", std::f64::consts::E),
    ("tau", std::f64::consts::TAU),
];

/// Functions callable from an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFunction {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    Asinh,
    Acosh,
    Atanh,
    Exp,
    Expm1,
    Log,
    Log1p,
    Log10,
    Log2,
    Sqrt,
    Cbrt,
    Pow,
    Fabs,
    Ceil,
    Floor,
    Trunc,
    Fmod,
    Hypot,
    Degrees,
    Radians,
    Copysign,
}

impl MathFunction {
    pub const ALL: &'static [MathFunction] = &[
        MathFunction::Sin,
        MathFunction::Cos,
        MathFunction::Tan,
        MathFunction::Asin,
        MathFunction::Acos,
        MathFunction::Atan,
        MathFunction::Atan2,
        MathFunction::Sinh,
        MathFunction::Cosh,
        MathFunction::Tanh,
        MathFunction::Asinh,
        MathFunction::Acosh,
        MathFunction::Atanh,
        MathFunction::Exp,
        MathFunction::Expm1,
        MathFunction::Log,
        MathFunction::Log1p,
        MathFunction::Log10,
        MathFunction::Log2,
        MathFunction::Sqrt,
        MathFunction::Cbrt,
        MathFunction::Pow,
        MathFunction::Fabs,
        MathFunction::Ceil,
        MathFunction::Floor,
        MathFunction::Trunc,
        MathFunction::Fmod,
        MathFunction::Hypot,
        MathFunction::Degrees,
        MathFunction::Radians,
        MathFunction::Copysign,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MathFunction::Sin => "sin",
            MathFunction::Cos => "cos",
            MathFunction::Tan => "tan",
            MathFunction::Asin => "asin",
            MathFunction::Acos => "acos",
            MathFunction::Atan => "atan",
            MathFunction::Atan2 => "atan2",
            MathFunction::Sinh => "sinh",
            MathFunction::Cosh => "cosh",
            MathFunction::Tanh => "tanh",
            MathFunction::Asinh => "asinh",
            MathFunction::Acosh => "acosh",
            MathFunction::Atanh => "atanh",
            MathFunction::Exp => "exp",
            MathFunction::Expm1 => "expm1",
            MathFunction::Log => "log",
            MathFunction::Log1p => "log1p",
            MathFunction::Log10 => "log10",
            MathFunction::Log2 => "log2",
            MathFunction::Sqrt => "sqrt",
            MathFunction::Cbrt => "cbrt",
            MathFunction::Pow => "pow",
            MathFunction::Fabs => "fabs",
            MathFunction::Ceil => "ceil",
            MathFunction::Floor => "floor",
            MathFunction::Trunc => "trunc",
            MathFunction::Fmod => "fmod",
            MathFunction::Hypot => "hypot",
            MathFunction::Degrees => "degrees",
            MathFunction::Radians => "radians",
            MathFunction::Copysign => "copysign",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    fn check_arity(self, found: usize) -> Result<(), ExprError> {
        let (ok, expected) = match self {
            MathFunction::Atan2
            | MathFunction::Pow
            | MathFunction::Fmod
            | MathFunction::Hypot
            | MathFunction::Copysign => (found == 2, "2"),
            MathFunction::Log => ((1..=2).contains(&found), "1 or 2"),
            _ => (found == 1, "1"),
        };
        if ok {
            Ok(())
        } else {
            Err(ExprError::Arity {
                function: self.name().to_string(),
                expected,
                found,
            })
        }
    }

    /// Apply the function to already-evaluated arguments.
    ///
    /// Inputs outside a function's domain are errors rather than NaN, and an
    /// infinite result is an overflow.
    pub fn apply(self, args: &[f64]) -> Result<f64, ExprError> {
        self.check_arity(args.len())?;
        let domain = || ExprError::Domain {
            function: self.name().to_string(),
        };
        let x = args[0];

        let result = match self {
            MathFunction::Sin => x.sin(),
            MathFunction::Cos => x.cos(),
            MathFunction::Tan => x.tan(),
            MathFunction::Asin | MathFunction::Acos if !(-1.0..=1.0).contains(&x) => {
                return Err(domain())
            }
            MathFunction::Asin => x.asin(),
            MathFunction::Acos => x.acos(),
            MathFunction::Atan => x.atan(),
            MathFunction::Atan2 => x.atan2(args[1]),
            MathFunction::Sinh => x.sinh(),
            MathFunction::Cosh => x.cosh(),
            MathFunction::Tanh => x.tanh(),
            MathFunction::Asinh => x.asinh(),
            MathFunction::Acosh if x < 1.0 => return Err(domain()),
            MathFunction::Acosh => x.acosh(),
            MathFunction::Atanh if x <= -1.0 || x >= 1.0 => return Err(domain()),
            MathFunction::Atanh => x.atanh(),
            MathFunction::Exp => x.exp(),
            MathFunction::Expm1 => x.exp_m1(),
            MathFunction::Log1p if x <= -1.0 => return Err(domain()),
            MathFunction::Log1p => x.ln_1p(),
            MathFunction::Log | MathFunction::Log10 | MathFunction::Log2 if x <= 0.0 => {
                return Err(domain())
            }
            MathFunction::Log => match args.get(1) {
                Some(&base) if base <= 0.0 || base == 1.0 => return Err(domain()),
                Some(&base) => x.ln() / base.ln(),
                None => x.ln(),
            },
            MathFunction::Log10 => x.log10(),
            MathFunction::Log2 => x.log2(),
            MathFunction::Sqrt if x < 0.0 => return Err(domain()),
            MathFunction::Sqrt => x.sqrt(),
            MathFunction::Cbrt => x.cbrt(),
            MathFunction::Pow => {
                let y = args[1];
                if x == 0.0 && y < 0.0 {
                    return Err(domain());
                }
                if x < 0.0 && y.fract() != 0.0 {
                    return Err(domain());
                }
                x.powf(y)
            }
            MathFunction::Fabs => x.abs(),
            MathFunction::Ceil => x.ceil(),
            MathFunction::Floor => x.floor(),
            MathFunction::Trunc => x.trunc(),
            MathFunction::Fmod if args[1] == 0.0 => return Err(domain()),
            MathFunction::Fmod => x % args[1],
            MathFunction::Hypot => x.hypot(args[1]),
            MathFunction::Degrees => x.to_degrees(),
            MathFunction::Radians => x.to_radians(),
            MathFunction::Copysign => x.copysign(args[1]),
        };

        if result.is_nan() {
            return Err(domain());
        }
        if result.is_infinite() {
            return Err(ExprError::Overflow);
        }
        Ok(result)
    }
}

/// True when `name` is one of the built-in constants or functions
pub fn is_builtin(name: &str) -> bool {
    CONSTANTS.iter().any(|(c, _)| *c == name) || MathFunction::from_name(name).is_some()
}

/// Evaluate an expression against variable bindings with default limits
pub fn evaluate(expression: &str, variables: &Variables) -> Result<Value, ExprError> {
    evaluate_with_limits(expression, variables, ParseLimits::default())
}

/// Parse and evaluate an expression.
///
/// Every failure, from a syntax error to a domain error, comes back as an
/// `ExprError`; this never panics on user input. For fixed inputs the result
/// is always the same.
pub fn evaluate_with_limits(
    expression: &str,
    variables: &Variables,
    limits: ParseLimits,
) -> Result<Value, ExprError> {
    let expr = parse_with_limits(expression, limits)?;
    Namespace::new(variables).eval(&expr)
}

/// Names visible to an expression. Variables shadow built-in constants.
pub struct Namespace<'a> {
    variables: &'a Variables,
}

impl<'a> Namespace<'a> {
    pub fn new(variables: &'a Variables) -> Self {
        Self { variables }
    }

    fn lookup(&self, name: &str) -> Result<Value, ExprError> {
        if let Some(value) = self.variables.get(name) {
            return Ok(value.clone());
        }
        if let Some((_, value)) = CONSTANTS.iter().find(|(c, _)| *c == name) {
            return Ok(Value::Number(*value));
        }
        if MathFunction::from_name(name).is_some() {
            return Err(ExprError::FunctionAsValue {
                name: name.to_string(),
            });
        }
        Err(ExprError::UndefinedName {
            name: name.to_string(),
        })
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, ExprError> {
        match expr {
            // literals such as 1e999 read as infinity
            Expr::Number(n) if !n.is_finite() => Err(ExprError::Overflow),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Name(name) => self.lookup(name),
            Expr::Neg(inner) => {
                let value = self.eval_number(inner)?;
                Ok(Value::Number(-value))
            }
            Expr::Binary { op, lhs, rhs } => {
                let a = self.eval_number(lhs)?;
                let b = self.eval_number(rhs)?;
                let result = match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div if b == 0.0 => return Err(ExprError::DivisionByZero),
                    BinaryOp::Div => a / b,
                };
                if !result.is_finite() {
                    return Err(ExprError::Overflow);
                }
                Ok(Value::Number(result))
            }
            Expr::Call { function, args } => {
                // A variable of the same name shadows the function, and
                // variables are never callable
                if self.variables.contains_key(function) {
                    return Err(ExprError::NotCallable {
                        name: function.clone(),
                    });
                }
                let f = MathFunction::from_name(function).ok_or_else(|| {
                    ExprError::UnknownFunction {
                        name: function.clone(),
                    }
                })?;
                let values = args
                    .iter()
                    .map(|arg| self.eval_number(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                f.apply(&values).map(Value::Number)
            }
        }
    }

    fn eval_number(&self, expr: &Expr) -> Result<f64, ExprError> {
        match self.eval(expr)? {
            Value::Number(n) => Ok(n),
            Value::Text(s) => Err(ExprError::NonNumeric { value: s }),
        }
    }
}
