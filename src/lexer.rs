//! The tokenizer for model text.
//!
//! Comments (`/* … */` and `#`) and whitespace are discarded here; the parser only ever sees
//! meaningful tokens. Spans are byte offsets into the source, converted to line/column positions
//! when a diagnostic is reported.
use crate::error::{CompileError, CompileResult};
use logos::Logos;
use std::fmt;

/// A token of the modelling notation.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"#[^\n]*")]
#[logos(skip r"/\*[^*]*\*+(?:[^/*][^*]*\*+)*/")]
pub enum Token {
    /// The `set` keyword
    #[token("set")]
    Set,
    /// The `param` keyword
    #[token("param")]
    Param,
    /// The `var` keyword
    #[token("var")]
    Var,
    /// The `s.t.` keyword introducing a constraint family
    #[token("s.t.")]
    SubjectTo,
    /// The `maximize` keyword
    #[token("maximize")]
    Maximize,
    /// The `minimize` keyword
    #[token("minimize")]
    Minimize,
    /// The `solve` marker
    #[token("solve")]
    Solve,
    /// The `data` keyword opening a data block
    #[token("data")]
    Data,
    /// The `end` marker
    #[token("end")]
    End,
    /// The `integer` domain annotation
    #[token("integer")]
    Integer,
    /// The `binary` domain annotation
    #[token("binary")]
    Binary,
    /// The `sum` comprehension keyword
    #[token("sum")]
    Sum,
    /// The `in` keyword of an index-header entry
    #[token("in")]
    In,
    /// The `if` keyword
    #[token("if")]
    If,
    /// The `then` keyword
    #[token("then")]
    Then,
    /// The `else` keyword
    #[token("else")]
    Else,
    /// The `and` connective
    #[token("and")]
    And,
    /// The `or` connective
    #[token("or")]
    Or,
    /// The `not` connective
    #[token("not")]
    Not,

    /// An identifier (set, parameter, variable, constraint or index-variable name)
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
    /// An integer literal
    #[regex(r"[0-9]+", |lex| lex.slice().parse().ok())]
    Int(i64),
    /// A floating-point literal
    #[regex(r"[0-9]+\.[0-9]+(?:[eE][+-]?[0-9]+)?|[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse().ok())]
    Float(f64),

    /// `{`
    #[token("{")]
    BraceOpen,
    /// `}`
    #[token("}")]
    BraceClose,
    /// `[`
    #[token("[")]
    BracketOpen,
    /// `]`
    #[token("]")]
    BracketClose,
    /// `(`
    #[token("(")]
    ParenOpen,
    /// `)`
    #[token(")")]
    ParenClose,
    /// `,`
    #[token(",")]
    Comma,
    /// `;`
    #[token(";")]
    Semi,
    /// `:`
    #[token(":")]
    Colon,
    /// `:=`
    #[token(":=")]
    Assign,
    /// `..`
    #[token("..")]
    DotDot,
    /// `+`
    #[token("+")]
    Plus,
    /// `-`
    #[token("-")]
    Minus,
    /// `*`
    #[token("*")]
    Star,
    /// `/`
    #[token("/")]
    Slash,
    /// `=` or `==`
    #[token("=")]
    #[token("==")]
    Eq,
    /// `<>` or `!=`
    #[token("<>")]
    #[token("!=")]
    NotEq,
    /// `<`
    #[token("<")]
    Lt,
    /// `<=`
    #[token("<=")]
    LtEq,
    /// `>`
    #[token(">")]
    Gt,
    /// `>=`
    #[token(">=")]
    GtEq,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Set => write!(f, "`set`"),
            Token::Param => write!(f, "`param`"),
            Token::Var => write!(f, "`var`"),
            Token::SubjectTo => write!(f, "`s.t.`"),
            Token::Maximize => write!(f, "`maximize`"),
            Token::Minimize => write!(f, "`minimize`"),
            Token::Solve => write!(f, "`solve`"),
            Token::Data => write!(f, "`data`"),
            Token::End => write!(f, "`end`"),
            Token::Integer => write!(f, "`integer`"),
            Token::Binary => write!(f, "`binary`"),
            Token::Sum => write!(f, "`sum`"),
            Token::In => write!(f, "`in`"),
            Token::If => write!(f, "`if`"),
            Token::Then => write!(f, "`then`"),
            Token::Else => write!(f, "`else`"),
            Token::And => write!(f, "`and`"),
            Token::Or => write!(f, "`or`"),
            Token::Not => write!(f, "`not`"),
            Token::Ident(name) => write!(f, "identifier `{name}`"),
            Token::Int(value) => write!(f, "number `{value}`"),
            Token::Float(value) => write!(f, "number `{value}`"),
            Token::BraceOpen => write!(f, "`{{`"),
            Token::BraceClose => write!(f, "`}}`"),
            Token::BracketOpen => write!(f, "`[`"),
            Token::BracketClose => write!(f, "`]`"),
            Token::ParenOpen => write!(f, "`(`"),
            Token::ParenClose => write!(f, "`)`"),
            Token::Comma => write!(f, "`,`"),
            Token::Semi => write!(f, "`;`"),
            Token::Colon => write!(f, "`:`"),
            Token::Assign => write!(f, "`:=`"),
            Token::DotDot => write!(f, "`..`"),
            Token::Plus => write!(f, "`+`"),
            Token::Minus => write!(f, "`-`"),
            Token::Star => write!(f, "`*`"),
            Token::Slash => write!(f, "`/`"),
            Token::Eq => write!(f, "`=`"),
            Token::NotEq => write!(f, "`<>`"),
            Token::Lt => write!(f, "`<`"),
            Token::LtEq => write!(f, "`<=`"),
            Token::Gt => write!(f, "`>`"),
            Token::GtEq => write!(f, "`>=`"),
        }
    }
}

/// A byte range in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Byte offset of the first byte
    pub start: usize,
    /// Byte offset one past the last byte
    pub end: usize,
}

/// Convert a byte offset into a 1-based (line, column) position.
pub fn line_col(src: &str, offset: usize) -> (usize, usize) {
    let prefix = &src[..offset.min(src.len())];
    let line = prefix.matches('\n').count() + 1;
    let column = offset - prefix.rfind('\n').map_or(0, |p| p + 1) + 1;
    (line, column)
}

/// Tokenize the whole source, failing on the first unrecognized character.
pub fn lex(src: &str) -> CompileResult<Vec<(Token, Span)>> {
    let mut tokens = Vec::new();
    for (result, range) in Token::lexer(src).spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                let (line, column) = line_col(src, span.start);
                return Err(CompileError::Syntax {
                    line,
                    column,
                    expected: "a token".to_string(),
                    found: format!("`{}`", &src[span.start..span.end]),
                });
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lex_declaration() {
        let tokens = lex("set MONTHS := 1..n;").unwrap();
        let kinds: Vec<_> = tokens.into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            kinds,
            vec![
                Token::Set,
                Token::Ident("MONTHS".to_string()),
                Token::Assign,
                Token::Int(1),
                Token::DotDot,
                Token::Ident("n".to_string()),
                Token::Semi,
            ]
        );
    }

    #[test]
    fn test_lex_comments_discarded() {
        let tokens = lex("/* block */ solve; # trailing\nend;").unwrap();
        let kinds: Vec<_> = tokens.into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            kinds,
            vec![Token::Solve, Token::Semi, Token::End, Token::Semi]
        );
    }

    #[test]
    fn test_lex_operators() {
        let kinds: Vec<_> = lex("<= >= <> != == =")
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        assert_eq!(
            kinds,
            vec![
                Token::LtEq,
                Token::GtEq,
                Token::NotEq,
                Token::NotEq,
                Token::Eq,
                Token::Eq,
            ]
        );
    }

    #[test]
    fn test_lex_range_is_not_a_float() {
        let kinds: Vec<_> = lex("1..3").unwrap().into_iter().map(|(t, _)| t).collect();
        assert_eq!(kinds, vec![Token::Int(1), Token::DotDot, Token::Int(3)]);
    }

    #[test]
    fn test_lex_unrecognized_character() {
        let err = lex("set $bad;").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { column: 5, .. }));
    }

    #[test]
    fn test_line_col() {
        let src = "set A;\nparam b;\n";
        assert_eq!(line_col(src, 0), (1, 1));
        assert_eq!(line_col(src, 7), (2, 1));
        assert_eq!(line_col(src, 13), (2, 7));
    }
}
