use super::{ParseError, Spanned};
use chumsky::prelude::*;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'code> {
    BracketRoundOpen,
    BracketRoundClose,
    BracketCurlyOpen,
    BracketCurlyClose,
    BracketSquareOpen,
    BracketSquareClose,
    Comment(&'code str),
    Int(i64),
    Float(f64),
    /// Raw contents between the quotes, escapes and `${...}` still in place.
    Text(&'code str),
    Identifier(&'code str),
    Let,
    In,
    Assign,
    Semicolon,
    Dot,
    Concat,
    Update,
    Plus,
    Minus,
    Asterisk,
    Slash,
}

impl<'code> Token<'code> {
    pub fn into_cow_str(self) -> Cow<'code, str> {
        match self {
            Self::BracketRoundOpen => "(".into(),
            Self::BracketRoundClose => ")".into(),
            Self::BracketCurlyOpen => "{".into(),
            Self::BracketCurlyClose => "}".into(),
            Self::BracketSquareOpen => "[".into(),
            Self::BracketSquareClose => "]".into(),
            Self::Comment(comment) => comment.into(),
            Self::Int(number) => number.to_string().into(),
            Self::Float(number) => number.to_string().into(),
            Self::Text(text) => format!("\"{text}\"").into(),
            Self::Identifier(identifier) => identifier.into(),
            Self::Let => "let".into(),
            Self::In => "in".into(),
            Self::Assign => "=".into(),
            Self::Semicolon => ";".into(),
            Self::Dot => ".".into(),
            Self::Concat => "++".into(),
            Self::Update => "//".into(),
            Self::Plus => "+".into(),
            Self::Minus => "-".into(),
            Self::Asterisk => "*".into(),
            Self::Slash => "/".into(),
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.into_cow_str())
    }
}

pub fn lexer<'code>()
-> impl Parser<'code, &'code str, Vec<Spanned<Token<'code>>>, extra::Err<ParseError<'code, char>>> {
    let bracket = choice((
        just('(').to(Token::BracketRoundOpen),
        just(')').to(Token::BracketRoundClose),
        just('{').to(Token::BracketCurlyOpen),
        just('}').to(Token::BracketCurlyClose),
        just('[').to(Token::BracketSquareOpen),
        just(']').to(Token::BracketSquareClose),
    ));

    // `++` and `//` have to win over `+` and `/`
    let operator = choice((
        just("++").to(Token::Concat),
        just("//").to(Token::Update),
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('*').to(Token::Asterisk),
        just('/').to(Token::Slash),
        just('=').to(Token::Assign),
        just(';').to(Token::Semicolon),
        just('.').to(Token::Dot),
    ));

    let comment = just('#')
        .ignore_then(any().and_is(text::newline().not()).repeated())
        .to_slice()
        .map(Token::Comment);

    let float = text::int(10)
        .then(just('.').then(text::digits(10)))
        .to_slice()
        .from_str()
        .unwrapped()
        .map(Token::Float);

    let int = text::int(10)
        .to_slice()
        .try_map(|digits: &str, span| {
            digits.parse().map(Token::Int).map_err(|_| {
                ParseError::custom(span, format!("Integer literal '{digits}' is too large"))
            })
        });

    let text = just('"')
        .ignore_then(
            none_of("\"\\")
                .ignored()
                .or(just('\\').then(any()).ignored())
                .repeated()
                .to_slice(),
        )
        .then_ignore(just('"'))
        .map(Token::Text);

    let identifier_or_keyword = any()
        .filter(|character: &char| character.is_ascii_alphabetic() || *character == '_')
        .then(
            any()
                .filter(|character: &char| {
                    character.is_ascii_alphanumeric() || matches!(character, '_' | '\'' | '-')
                })
                .repeated(),
        )
        .to_slice()
        .map(|identifier| match identifier {
            "let" => Token::Let,
            "in" => Token::In,
            _ => Token::Identifier(identifier),
        });

    let token = choice((
        bracket,
        comment,
        float,
        int,
        text,
        operator,
        identifier_or_keyword,
    ));

    token
        .map_with(|token, extra| Spanned {
            node: token,
            span: extra.span(),
        })
        .padded_by(text::whitespace())
        .recover_with(skip_then_retry_until(any().ignored(), end()))
        .repeated()
        .collect()
}
