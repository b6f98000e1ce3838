//! Label-set selector expressions.
//!
//! Rules reference peers and namespaces with selector strings of the form
//! `app == 'foo' && has(env)`. This module parses that dialect and evaluates
//! it against a label map.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr  := and ( '||' and )*
//! and   := unary ( '&&' unary )*
//! unary := '!' unary | '(' expr ')' | prim
//! prim  := 'all()' | 'global()' | 'has(' key ')'
//!        | key '==' value | key '!=' value
//!        | key 'in' set | key 'not' 'in' set
//! set   := '{' value ( ',' value )* '}'
//! ```
//!
//! Values are single- or double-quoted. Keys follow the Kubernetes label-key
//! charset (alphanumerics plus `.`, `_`, `-`, `/`). The empty expression
//! parses to `all()`: an absent selector matches every label set.

use crate::Labels;
use std::fmt;
use std::str::FromStr;

/// A parsed, reusable selector expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    expr: Expr,
    original: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Expr {
    All,
    Has(String),
    Eq(String, String),
    NotEq(String, String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected character {ch:?} at offset {at}")]
    UnexpectedChar { at: usize, ch: char },

    #[error("expected {expected} at offset {at}")]
    Expected { at: usize, expected: &'static str },

    #[error("unterminated string literal at offset {at}")]
    UnterminatedString { at: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,
}

// === impl Selector ===

impl Selector {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let tokens = lex(input)?;
        let expr = if tokens.is_empty() {
            Expr::All
        } else {
            let mut parser = Parser { tokens, pos: 0 };
            let expr = parser.expr()?;
            if let Some(&(at, _)) = parser.peek() {
                return Err(ParseError::Expected {
                    at,
                    expected: "end of expression",
                });
            }
            expr
        };
        Ok(Self {
            expr,
            original: input.to_string(),
        })
    }

    /// Whether the selector accepts the given label set.
    pub fn evaluate(&self, labels: &Labels) -> bool {
        self.expr.evaluate(labels)
    }
}

impl FromStr for Selector {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, ParseError> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.original.fmt(f)
    }
}

// === impl Expr ===

impl Expr {
    fn evaluate(&self, labels: &Labels) -> bool {
        match self {
            Expr::All => true,
            Expr::Has(key) => labels.contains_key(key),
            Expr::Eq(key, value) => labels.get(key).is_some_and(|v| v == value),
            // `!=` also accepts label sets that lack the key entirely.
            Expr::NotEq(key, value) => labels.get(key).is_none_or(|v| v != value),
            Expr::In(key, values) => labels
                .get(key)
                .is_some_and(|v| values.iter().any(|candidate| candidate == v)),
            Expr::NotIn(key, values) => labels
                .get(key)
                .is_none_or(|v| !values.iter().any(|candidate| candidate == v)),
            Expr::Not(inner) => !inner.evaluate(labels),
            Expr::And(exprs) => exprs.iter().all(|e| e.evaluate(labels)),
            Expr::Or(exprs) => exprs.iter().any(|e| e.evaluate(labels)),
        }
    }
}

// === lexer ===

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Ident(String),
    Literal(String),
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Bang,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
}

fn ident_start(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/')
}

fn lex(input: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(at, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push((at, Token::LParen));
            }
            ')' => {
                chars.next();
                tokens.push((at, Token::RParen));
            }
            '{' => {
                chars.next();
                tokens.push((at, Token::LBrace));
            }
            '}' => {
                chars.next();
                tokens.push((at, Token::RBrace));
            }
            ',' => {
                chars.next();
                tokens.push((at, Token::Comma));
            }
            '&' => {
                chars.next();
                match chars.next() {
                    Some((_, '&')) => tokens.push((at, Token::AndAnd)),
                    _ => return Err(ParseError::Expected { at, expected: "`&&`" }),
                }
            }
            '|' => {
                chars.next();
                match chars.next() {
                    Some((_, '|')) => tokens.push((at, Token::OrOr)),
                    _ => return Err(ParseError::Expected { at, expected: "`||`" }),
                }
            }
            '=' => {
                chars.next();
                match chars.next() {
                    Some((_, '=')) => tokens.push((at, Token::EqEq)),
                    _ => return Err(ParseError::Expected { at, expected: "`==`" }),
                }
            }
            '!' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                    tokens.push((at, Token::NotEq));
                } else {
                    tokens.push((at, Token::Bang));
                }
            }
            quote @ ('\'' | '"') => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some((_, c)) if c == quote => break,
                        Some((_, c)) => value.push(c),
                        None => return Err(ParseError::UnterminatedString { at }),
                    }
                }
                tokens.push((at, Token::Literal(value)));
            }
            c if ident_start(c) => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if !ident_continue(c) {
                        break;
                    }
                    ident.push(c);
                    chars.next();
                }
                tokens.push((at, Token::Ident(ident)));
            }
            c => return Err(ParseError::UnexpectedChar { at, ch: c }),
        }
    }
    Ok(tokens)
}

// === parser ===

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(usize, Token)> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let pos = self.pos;
        if pos < self.tokens.len() {
            self.pos += 1;
        }
        self.tokens.get(pos).cloned()
    }

    fn eat(&mut self, token: &Token, expected: &'static str) -> Result<(), ParseError> {
        match self.next() {
            Some((_, t)) if &t == token => Ok(()),
            Some((at, _)) => Err(ParseError::Expected { at, expected }),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let first = self.and()?;
        if !matches!(self.peek(), Some((_, Token::OrOr))) {
            return Ok(first);
        }
        let mut terms = vec![first];
        while matches!(self.peek(), Some((_, Token::OrOr))) {
            self.next();
            terms.push(self.and()?);
        }
        Ok(Expr::Or(terms))
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let first = self.unary()?;
        if !matches!(self.peek(), Some((_, Token::AndAnd))) {
            return Ok(first);
        }
        let mut terms = vec![first];
        while matches!(self.peek(), Some((_, Token::AndAnd))) {
            self.next();
            terms.push(self.unary()?);
        }
        Ok(Expr::And(terms))
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some((_, Token::Bang)) => {
                self.next();
                Ok(Expr::Not(Box::new(self.unary()?)))
            }
            Some((_, Token::LParen)) => {
                self.next();
                let inner = self.expr()?;
                self.eat(&Token::RParen, "`)`")?;
                Ok(inner)
            }
            _ => self.prim(),
        }
    }

    fn prim(&mut self) -> Result<Expr, ParseError> {
        let (at, ident) = match self.next() {
            Some((at, Token::Ident(ident))) => (at, ident),
            Some((at, _)) => {
                return Err(ParseError::Expected {
                    at,
                    expected: "a label key or predicate",
                })
            }
            None => return Err(ParseError::UnexpectedEnd),
        };

        // `has(...)`, `all()`, and `global()` are only predicates when the
        // paren follows; otherwise the word is an ordinary label key.
        if matches!(self.peek(), Some((_, Token::LParen))) {
            match ident.as_str() {
                "all" | "global" => {
                    self.next();
                    self.eat(&Token::RParen, "`)`")?;
                    return Ok(Expr::All);
                }
                "has" => {
                    self.next();
                    let key = match self.next() {
                        Some((_, Token::Ident(key))) => key,
                        Some((at, _)) => {
                            return Err(ParseError::Expected {
                                at,
                                expected: "a label key",
                            })
                        }
                        None => return Err(ParseError::UnexpectedEnd),
                    };
                    self.eat(&Token::RParen, "`)`")?;
                    return Ok(Expr::Has(key));
                }
                _ => {
                    return Err(ParseError::Expected {
                        at,
                        expected: "`has`, `all`, or `global`",
                    })
                }
            }
        }

        match self.next() {
            Some((_, Token::EqEq)) => Ok(Expr::Eq(ident, self.literal()?)),
            Some((_, Token::NotEq)) => Ok(Expr::NotEq(ident, self.literal()?)),
            Some((_, Token::Ident(word))) if word == "in" => Ok(Expr::In(ident, self.set()?)),
            Some((_, Token::Ident(word))) if word == "not" => {
                match self.next() {
                    Some((_, Token::Ident(word))) if word == "in" => {}
                    Some((at, _)) => {
                        return Err(ParseError::Expected {
                            at,
                            expected: "`in`",
                        })
                    }
                    None => return Err(ParseError::UnexpectedEnd),
                }
                Ok(Expr::NotIn(ident, self.set()?))
            }
            Some((at, _)) => Err(ParseError::Expected {
                at,
                expected: "`==`, `!=`, `in`, or `not in`",
            }),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn literal(&mut self) -> Result<String, ParseError> {
        match self.next() {
            Some((_, Token::Literal(value))) => Ok(value),
            Some((at, _)) => Err(ParseError::Expected {
                at,
                expected: "a quoted value",
            }),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn set(&mut self) -> Result<Vec<String>, ParseError> {
        self.eat(&Token::LBrace, "`{`")?;
        let mut values = vec![self.literal()?];
        loop {
            match self.next() {
                Some((_, Token::Comma)) => values.push(self.literal()?),
                Some((_, Token::RBrace)) => return Ok(values),
                Some((at, _)) => {
                    return Err(ParseError::Expected {
                        at,
                        expected: "`,` or `}`",
                    })
                }
                None => return Err(ParseError::UnexpectedEnd),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn evaluates() {
        let cases: &[(&str, &[(&str, &str)], bool)] = &[
            ("", &[("app", "foo")], true),
            ("all()", &[], true),
            ("global()", &[("any", "thing")], true),
            ("has(app)", &[("app", "foo")], true),
            ("has(app)", &[("env", "prod")], false),
            ("app == 'foo'", &[("app", "foo"), ("env", "prod")], true),
            ("app == 'foo'", &[("app", "bar")], false),
            ("app == \"foo\"", &[("app", "foo")], true),
            ("app != 'foo'", &[("app", "bar")], true),
            // != matches when the key is absent.
            ("app != 'foo'", &[("env", "prod")], true),
            ("app != 'foo'", &[("app", "foo")], false),
            ("env in {'prod', 'staging'}", &[("env", "staging")], true),
            ("env in {'prod', 'staging'}", &[("env", "dev")], false),
            ("env not in {'prod'}", &[("env", "dev")], true),
            ("env not in {'prod'}", &[], true),
            ("env not in {'prod'}", &[("env", "prod")], false),
            ("!has(app)", &[("env", "prod")], true),
            ("!has(app)", &[("app", "foo")], false),
            (
                "app == 'foo' && env == 'prod'",
                &[("app", "foo"), ("env", "prod")],
                true,
            ),
            ("app == 'foo' && env == 'prod'", &[("app", "foo")], false),
            ("app == 'foo' || env == 'prod'", &[("env", "prod")], true),
            // && binds tighter than ||.
            (
                "has(a) || has(b) && has(c)",
                &[("a", "1")],
                true,
            ),
            (
                "has(a) || has(b) && has(c)",
                &[("b", "1")],
                false,
            ),
            ("(has(a) || has(b)) && has(c)", &[("a", "1")], false),
            (
                "app.kubernetes.io/name == 'web'",
                &[("app.kubernetes.io/name", "web")],
                true,
            ),
        ];

        for (expr, pairs, expected) in cases {
            let selector = Selector::parse(expr).expect(expr);
            assert_eq!(
                selector.evaluate(&labels(pairs)),
                *expected,
                "selector {expr:?} against {pairs:?}"
            );
        }
    }

    #[test]
    fn parse_errors() {
        for expr in [
            "not.a.real.selector",
            "app =",
            "app == foo",
            "app == 'foo",
            "has(app",
            "env in {'prod'",
            "env in 'prod'",
            "&& has(app)",
            "has(app) &&",
            "app ? 'foo'",
            "has(app) has(env)",
        ] {
            assert!(Selector::parse(expr).is_err(), "{expr:?} should not parse");
        }
    }

    #[test]
    fn display_round_trips_source() {
        let selector = Selector::parse("app == 'foo' && has(env)").unwrap();
        assert_eq!(selector.to_string(), "app == 'foo' && has(env)");
    }

    #[test]
    fn empty_selector_matches_everything() {
        let selector = Selector::parse("   ").unwrap();
        assert!(selector.evaluate(&Labels::default()));
        assert!(selector.evaluate(&labels(&[("app", "foo")])));
    }
}
