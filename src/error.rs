//! Error types for formula expressions and template documents

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Errors produced while parsing or evaluating a formula expression.
///
/// None of these abort a batch: the mutator turns every one of them into an
/// in-document error marker for the node the formula targets.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("Unexpected character '{found}' at {span:?}")]
    InvalidToken { span: Span, found: String },

    #[error("Parse error at {span:?}: {message}")]
    Syntax {
        span: Span,
        message: String,
        expected: Vec<String>,
    },

    #[error("expression nests deeper than {limit} levels")]
    TooDeep { limit: usize },

    #[error("expression has more than {limit} tokens")]
    TooLong { limit: usize },

    #[error("undefined name '{name}'")]
    UndefinedName { name: String },

    #[error("'{name}' is a function and must be called")]
    FunctionAsValue { name: String },

    #[error("'{name}' is not callable")]
    NotCallable { name: String },

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("{function} expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: &'static str,
        found: usize,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("math domain error in {function}")]
    Domain { function: String },

    #[error("numeric result out of range")]
    Overflow,

    #[error("operand '{value}' is not numeric")]
    NonNumeric { value: String },
}

impl ExprError {
    /// Source span for errors raised while reading the expression text
    pub fn span(&self) -> Option<&Span> {
        match self {
            ExprError::InvalidToken { span, .. } | ExprError::Syntax { span, .. } => Some(span),
            _ => None,
        }
    }

    /// Format the error with source context using ariadne
    ///
    /// Errors without a source location fall back to their display text.
    pub fn format(&self, source: &str, name: &str) -> String {
        let Some(span) = self.span() else {
            return format!("Error: {}\n", self);
        };

        let label = match self {
            ExprError::Syntax {
                message, expected, ..
            } if !expected.is_empty() => {
                format!("{} (expected {})", message, expected.join(", "))
            }
            ExprError::Syntax { message, .. } => message.clone(),
            other => other.to_string(),
        };

        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, name, span.start)
            .with_message(self.to_string())
            .with_label(
                Label::new((name, span.clone()))
                    .with_message(label)
                    .with_color(Color::Red),
            )
            .finish()
            .write((name, Source::from(source)), &mut buf);

        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => format!("Error: {}\n", self),
        }
    }
}

impl<'a> From<chumsky::error::Rich<'a, crate::expr::lexer::Token>> for ExprError {
    fn from(err: chumsky::error::Rich<'a, crate::expr::lexer::Token>) -> Self {
        use chumsky::error::RichPattern;

        let message = match err.found() {
            Some(tok) => format!("Unexpected {}", tok.describe()),
            None => "Unexpected end of expression".to_string(),
        };

        let mut expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                RichPattern::Token(tok) => Some(tok.describe()),
                RichPattern::EndOfInput => Some("end of expression".to_string()),
                _ => None,
            })
            .collect();
        expected.sort();
        expected.dedup();

        ExprError::Syntax {
            span: err.span().into_range(),
            message,
            expected,
        }
    }
}

/// Errors raised while reading or writing a template document.
///
/// A document that cannot be parsed is the one fatal case for a template:
/// extraction and mutation of that template stop, other templates continue.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("malformed document at byte {position}: {message}")]
    Malformed { message: String, position: u64 },

    #[error("malformed document: unclosed element <{name}>")]
    Unclosed { name: String },

    #[error("malformed document: more than one root element")]
    MultipleRoots,

    #[error("malformed document: no root element")]
    Empty,

    #[error("failed to serialize document: {0}")]
    Write(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_syntax_error_mentions_expected() {
        let err = ExprError::Syntax {
            span: 4..5,
            message: "Unexpected '*'".to_string(),
            expected: vec!["number".to_string()],
        };
        let text = err.format("mmA **", "formula");
        assert!(text.contains("Unexpected '*'"));
        assert!(text.contains("expected number"));
    }

    #[test]
    fn test_format_runtime_error_has_no_report() {
        let text = ExprError::DivisionByZero.format("1 / 0", "formula");
        assert_eq!(text, "Error: division by zero\n");
    }
}
