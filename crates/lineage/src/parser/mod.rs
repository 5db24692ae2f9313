use crate::error::Diagnostic;
use crate::expr::{BinOp, Expr};
use crate::position::{OriginId, PosTable};
use crate::symbol::SymbolTable;
use chumsky::{input::ValueInput, pratt::*, prelude::*};
use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

mod lexer;
pub use lexer::{Token, lexer};

mod lower;

pub use chumsky::prelude::{Input, Parser};

pub type Span = SimpleSpan;
pub type ParseError<'code, T> = Rich<'code, T, Span>;

#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

/// Zero-width span used as the end-of-input marker for token streams.
pub fn span_at(offset: usize) -> Span {
    Span::from(offset..offset)
}

/// Lex, parse and lower one expression registered under `origin`.
pub fn parse_expr(
    source_code: &str,
    origin: OriginId,
    symbols: &mut SymbolTable,
    positions: &mut PosTable,
) -> Result<Rc<Expr>, Vec<Diagnostic>> {
    let (tokens, lex_errors) = lexer().parse(source_code).into_output_errors();
    if !lex_errors.is_empty() {
        return Err(lex_errors.iter().map(diagnostic).collect());
    }
    let mut tokens = tokens.unwrap_or_default();

    tokens.retain(|t| !matches!(t.node, Token::Comment(_)));

    let input = tokens.map(span_at(source_code.len()), |Spanned { node, span }| (node, span));

    let (expression, parse_errors) = parser().parse(input).into_output_errors();
    if !parse_errors.is_empty() {
        return Err(parse_errors.iter().map(diagnostic).collect());
    }
    let expression = expression.ok_or_else(|| {
        vec![Diagnostic {
            message: "expected an expression".to_owned(),
            reason: "empty input".to_owned(),
            span: 0..source_code.len(),
        }]
    })?;

    lower::lower(&expression, origin, symbols, positions)
}

fn diagnostic<T: fmt::Display>(error: &ParseError<'_, T>) -> Diagnostic {
    Diagnostic {
        message: error.to_string(),
        reason: error.reason().to_string(),
        span: error.span().into_range(),
    }
}

pub fn parser<'code, I>()
-> impl Parser<'code, I, Spanned<Expression<'code>>, extra::Err<ParseError<'code, Token<'code>>>>
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    recursive(|expression| {
        let bracket_round_open = just(Token::BracketRoundOpen);
        let bracket_round_close = just(Token::BracketRoundClose);
        let bracket_curly_open = just(Token::BracketCurlyOpen);
        let bracket_curly_close = just(Token::BracketCurlyClose);
        let bracket_square_open = just(Token::BracketSquareOpen);
        let bracket_square_close = just(Token::BracketSquareClose);

        let identifier = select! { Token::Identifier(identifier) => identifier }.map_with(
            |identifier, extra| Spanned {
                node: identifier,
                span: extra.span(),
            },
        );

        let binding = identifier
            .clone()
            .then_ignore(just(Token::Assign))
            .then(expression.clone())
            .then_ignore(just(Token::Semicolon))
            .map_with(|(name, value), extra| Spanned {
                node: Binding { name, value },
                span: extra.span(),
            });

        let bindings = binding.repeated().collect::<Vec<_>>();

        // Operands of application and list items: an atom followed by `.name` selections
        let select = recursive(|select| {
            let int = select! { Token::Int(number) => Expression::Int(number) };
            let float = select! { Token::Float(number) => Expression::Float(number) };
            let text = select! { Token::Text(raw) => raw }.try_map(|raw: &str, span: Span| {
                text_parts(raw, span.start + 1)
                    .map(Expression::Text)
                    .map_err(|message| ParseError::custom(span, message))
            });
            let variable = select! { Token::Identifier(identifier) => Expression::Variable(identifier) };

            let record = bindings
                .clone()
                .delimited_by(bracket_curly_open, bracket_curly_close)
                .map(|bindings| Expression::Record { bindings });

            let list = select
                .repeated()
                .collect()
                .delimited_by(bracket_square_open, bracket_square_close)
                .map(|items| Expression::List { items });

            let nested = expression
                .clone()
                .delimited_by(bracket_round_open, bracket_round_close);

            let atom = choice((int, float, text, variable, record, list))
                .map_with(|expression, extra| Spanned {
                    node: expression,
                    span: extra.span(),
                })
                .or(nested);

            atom.then(
                just(Token::Dot)
                    .ignore_then(identifier.clone())
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map_with(|(base, path), extra| {
                if path.is_empty() {
                    base
                } else {
                    Spanned {
                        node: Expression::Select {
                            base: Box::new(base),
                            path,
                        },
                        span: extra.span(),
                    }
                }
            })
        });

        let application =
            select
                .clone()
                .foldl_with(select.repeated(), |function, argument, extra| Spanned {
                    node: Expression::Apply {
                        function: Box::new(function),
                        argument: Box::new(argument),
                    },
                    span: extra.span(),
                });

        let operators = application.pratt((
            // Precedence 9 (highest): Negation
            prefix(9, just(Token::Minus), |_, operand, extra| Spanned {
                node: Expression::Negate {
                    operand: Box::new(operand),
                },
                span: extra.span(),
            }),
            // Precedence 7: List concatenation
            infix(right(7), just(Token::Concat), |l, _, r, extra| {
                binary(BinOp::Concat, l, r, extra.span())
            }),
            // Precedence 5: Multiplicative operators
            infix(left(5), just(Token::Asterisk), |l, _, r, extra| {
                binary(BinOp::Mul, l, r, extra.span())
            }),
            infix(left(5), just(Token::Slash), |l, _, r, extra| {
                binary(BinOp::Div, l, r, extra.span())
            }),
            // Precedence 3: Additive operators
            infix(left(3), just(Token::Plus), |l, _, r, extra| {
                binary(BinOp::Add, l, r, extra.span())
            }),
            infix(left(3), just(Token::Minus), |l, _, r, extra| {
                binary(BinOp::Sub, l, r, extra.span())
            }),
            // Precedence 1 (lowest): Record update
            infix(right(1), just(Token::Update), |l, _, r, extra| {
                binary(BinOp::Update, l, r, extra.span())
            }),
        ));

        let let_in = just(Token::Let)
            .ignore_then(bindings)
            .then_ignore(just(Token::In))
            .then(expression)
            .map_with(|(bindings, body), extra| Spanned {
                node: Expression::Let {
                    bindings,
                    body: Box::new(body),
                },
                span: extra.span(),
            });

        let_in.or(operators)
    })
}

fn binary<'code>(
    operator: BinOp,
    operand_a: Spanned<Expression<'code>>,
    operand_b: Spanned<Expression<'code>>,
    span: Span,
) -> Spanned<Expression<'code>> {
    Spanned {
        node: Expression::BinaryOperator {
            operator,
            operand_a: Box::new(operand_a),
            operand_b: Box::new(operand_b),
        },
        span,
    }
}

/// Split raw string contents into literal text and `${a.b}` interpolations.
///
/// `offset` is the absolute position of `raw` in the source, so the
/// interpolated names get real spans.
fn text_parts(raw: &str, offset: usize) -> Result<Vec<TextPart<'_>>, String> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = raw.char_indices().peekable();

    while let Some((index, character)) = chars.next() {
        match character {
            '\\' => match chars.next() {
                Some((_, 'n')) => literal.push('\n'),
                Some((_, 't')) => literal.push('\t'),
                Some((_, 'r')) => literal.push('\r'),
                Some((_, escaped)) => literal.push(escaped),
                None => return Err("Unterminated escape sequence".to_owned()),
            },
            '$' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                let start = index + 2;
                let Some(end) = raw[start..].find('}').map(|end| start + end) else {
                    return Err("Unterminated interpolation, missing '}'".to_owned());
                };
                while chars.peek().is_some_and(|&(next, _)| next <= end) {
                    chars.next();
                }
                if !literal.is_empty() {
                    parts.push(TextPart::Text(Cow::Owned(std::mem::take(&mut literal))));
                }
                parts.push(TextPart::Interpolation {
                    path: interpolation_path(&raw[start..end], offset + start)?,
                });
            }
            _ => literal.push(character),
        }
    }
    if !literal.is_empty() {
        parts.push(TextPart::Text(Cow::Owned(literal)));
    }
    Ok(parts)
}

fn interpolation_path(inner: &str, offset: usize) -> Result<Vec<Spanned<&str>>, String> {
    let mut path = Vec::new();
    let mut segment_start = 0;
    for segment in inner.split('.') {
        let name = segment.trim();
        let leading = segment.len() - segment.trim_start().len();
        let valid = name
            .chars()
            .next()
            .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '\'' | '-'));
        if !valid {
            return Err(format!(
                "Only attribute paths like 'a.b' can be interpolated, found '{}'",
                inner.trim()
            ));
        }
        let start = offset + segment_start + leading;
        path.push(Spanned {
            node: name,
            span: Span::from(start..start + name.len()),
        });
        segment_start += segment.len() + 1;
    }
    Ok(path)
}

#[derive(Debug, Clone)]
pub enum Expression<'code> {
    Int(i64),
    Float(f64),
    Text(Vec<TextPart<'code>>),
    Variable(&'code str),
    Select {
        base: Box<Spanned<Self>>,
        path: Vec<Spanned<&'code str>>,
    },
    Record {
        bindings: Vec<Spanned<Binding<'code>>>,
    },
    List {
        items: Vec<Spanned<Self>>,
    },
    Let {
        bindings: Vec<Spanned<Binding<'code>>>,
        body: Box<Spanned<Self>>,
    },
    Apply {
        function: Box<Spanned<Self>>,
        argument: Box<Spanned<Self>>,
    },
    Negate {
        operand: Box<Spanned<Self>>,
    },
    BinaryOperator {
        operator: BinOp,
        operand_a: Box<Spanned<Self>>,
        operand_b: Box<Spanned<Self>>,
    },
}

#[derive(Debug, Clone)]
pub struct Binding<'code> {
    pub name: Spanned<&'code str>,
    pub value: Spanned<Expression<'code>>,
}

#[derive(Debug, Clone)]
pub enum TextPart<'code> {
    // Plain text with escapes resolved
    Text(Cow<'code, str>),
    // Interpolated attribute path: ${a.b}
    Interpolation { path: Vec<Spanned<&'code str>> },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(code: &str) -> Spanned<Expression<'_>> {
        let tokens = lexer().parse(code).into_result().unwrap();
        let tokens: &_ = Box::leak(Box::new(tokens));
        let input = tokens.map(span_at(code.len()), |Spanned { node, span }| (node, span));
        parser().parse(input).into_result().unwrap()
    }

    #[test]
    fn test_application_binds_tighter_than_operators() {
        let expression = parse("f a + g b");
        let Expression::BinaryOperator {
            operator: BinOp::Add,
            operand_a,
            operand_b,
        } = expression.node
        else {
            panic!("expected addition, found {:?}", expression.node);
        };
        assert!(matches!(operand_a.node, Expression::Apply { .. }));
        assert!(matches!(operand_b.node, Expression::Apply { .. }));
    }

    #[test]
    fn test_list_items_are_not_applications() {
        let expression = parse("[ a b.c (f x) ]");
        let Expression::List { items } = expression.node else {
            panic!("expected a list");
        };
        assert_eq!(items.len(), 3);
        assert!(matches!(items[1].node, Expression::Select { .. }));
        assert!(matches!(items[2].node, Expression::Apply { .. }));
    }

    #[test]
    fn test_update_is_right_associative_and_loosest() {
        let expression = parse("a // b // c ++ d");
        let Expression::BinaryOperator {
            operator: BinOp::Update,
            operand_b,
            ..
        } = expression.node
        else {
            panic!("expected update");
        };
        assert!(matches!(
            operand_b.node,
            Expression::BinaryOperator {
                operator: BinOp::Update,
                ..
            }
        ));
    }

    #[test]
    fn test_let_and_record() {
        let expression = parse("let x = { a = 1; b = \"s\"; }; in x.a");
        let Expression::Let { bindings, body } = expression.node else {
            panic!("expected let");
        };
        assert_eq!(bindings[0].node.name.node, "x");
        assert!(matches!(bindings[0].node.value.node, Expression::Record { ref bindings } if bindings.len() == 2));
        assert!(matches!(body.node, Expression::Select { ref path, .. } if path[0].node == "a"));
    }

    #[test]
    fn test_text_parts_with_escapes_and_interpolation() {
        let parts = text_parts(r#"a\"b ${ x.y } \${z}"#, 10).unwrap();
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], TextPart::Text(text) if text == "a\"b "));
        let TextPart::Interpolation { path } = &parts[1] else {
            panic!("expected interpolation");
        };
        let names: Vec<&str> = path.iter().map(|segment| segment.node).collect();
        assert_eq!(names, vec!["x", "y"]);
        assert_eq!(path[0].span.into_range(), 18..19);
        assert!(matches!(&parts[2], TextPart::Text(text) if text == " ${z}"));
    }

    #[test]
    fn test_text_rejects_arbitrary_interpolations() {
        assert!(text_parts("${1 + 2}", 0).is_err());
        assert!(text_parts("${a", 0).is_err());
    }
}
