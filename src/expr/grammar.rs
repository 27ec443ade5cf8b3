//! Expression parser implementation using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::{ExprError, Span};
use crate::expr::ast::{BinaryOp, Expr};
use crate::expr::lexer::{lex, Token};

/// Bounds checked before the token stream reaches the recursive parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Maximum nesting of parentheses and prefix operators
    pub max_depth: usize,
    /// Maximum number of tokens in one expression
    pub max_tokens: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_tokens: 1024,
        }
    }
}

/// Parse a formula expression with the default limits
pub fn parse(input: &str) -> Result<Expr, ExprError> {
    parse_with_limits(input, ParseLimits::default())
}

/// Parse a formula expression into an AST.
///
/// Pathologically deep or long inputs are rejected before parsing so that
/// neither the parser nor the evaluator can recurse without bound.
pub fn parse_with_limits(input: &str, limits: ParseLimits) -> Result<Expr, ExprError> {
    let tokens = lex(input)?;

    if tokens.len() > limits.max_tokens {
        return Err(ExprError::TooLong {
            limit: limits.max_tokens,
        });
    }
    if nesting_depth(&tokens) > limits.max_depth {
        return Err(ExprError::TooDeep {
            limit: limits.max_depth,
        });
    }

    let len = input.len();
    let token_iter = tokens
        .into_iter()
        .map(|(tok, span)| (tok, SimpleSpan::from(span)));

    // Turn the token iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter)
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    expression_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| match errs.into_iter().next() {
            Some(err) => err.into(),
            None => ExprError::Syntax {
                span: len..len,
                message: "Unparseable expression".to_string(),
                expected: vec![],
            },
        })
}

/// Deepest point reached by open parentheses plus runs of prefix minus signs
fn nesting_depth(tokens: &[(Token, Span)]) -> usize {
    let mut parens = 0usize;
    let mut prefix_run = 0usize;
    let mut deepest = 0usize;
    let mut previous: Option<&Token> = None;

    for (tok, _) in tokens {
        match tok {
            Token::ParenOpen => parens += 1,
            Token::ParenClose => parens = parens.saturating_sub(1),
            _ => {}
        }

        // A minus is a prefix operator unless it follows an operand
        let is_prefix = *tok == Token::Minus
            && !matches!(
                previous,
                Some(Token::Number(_) | Token::Ident(_) | Token::ParenClose)
            );
        prefix_run = if is_prefix { prefix_run + 1 } else { 0 };

        deepest = deepest.max(parens + prefix_run);
        previous = Some(tok);
    }
    deepest
}

fn expression_parser<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let expr = recursive(|expr| {
        let number = select! {
            Token::Number(n) => Expr::Number(n),
        };

        let name = select! {
            Token::Ident(s) => s,
        };

        // Function call: name(arg, ...) - which names are callable is
        // decided by the evaluator's allow-list, not by the grammar
        let call = name
            .clone()
            .then(
                expr.clone()
                    .separated_by(just(Token::Comma))
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
            )
            .map(|(function, args)| Expr::Call { function, args });

        let atom = choice((
            number,
            call,
            name.map(Expr::Name),
            expr.delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        ))
        .boxed();

        let unary = just(Token::Minus)
            .repeated()
            .foldr(atom, |_op, rhs| Expr::Neg(Box::new(rhs)))
            .boxed();

        let product = unary
            .clone()
            .foldl(
                choice((
                    just(Token::Star).to(BinaryOp::Mul),
                    just(Token::Slash).to(BinaryOp::Div),
                ))
                .then(unary)
                .repeated(),
                |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
            )
            .boxed();

        product
            .clone()
            .foldl(
                choice((
                    just(Token::Plus).to(BinaryOp::Add),
                    just(Token::Minus).to(BinaryOp::Sub),
                ))
                .then(product)
                .repeated(),
                |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
            )
            .boxed()
    });

    expr.then_ignore(end())
}
