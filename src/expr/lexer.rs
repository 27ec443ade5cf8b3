//! Lexer for formula expressions using logos

use logos::Logos;

use crate::error::{ExprError, Span};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token(",")]
    Comma,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),
}

impl Token {
    /// Human-readable form used in syntax errors
    pub fn describe(&self) -> String {
        match self {
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::ParenOpen => "'('".to_string(),
            Token::ParenClose => "')'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Ident(s) => format!("name '{}'", s),
            Token::Number(n) => format!("number {}", n),
        }
    }
}

/// Lex an expression into tokens with spans.
///
/// Unlike a forgiving lexer, any character outside the grammar is an error:
/// attribute access (`.`), indexing, string literals and the like never reach
/// the parser.
pub fn lex(input: &str) -> Result<Vec<(Token, Span)>, ExprError> {
    Token::lexer(input)
        .spanned()
        .map(|(tok, span)| match tok {
            Ok(t) => Ok((t, span)),
            Err(()) => Err(ExprError::InvalidToken {
                found: input[span.clone()].to_string(),
                span,
            }),
        })
        .collect()
}
