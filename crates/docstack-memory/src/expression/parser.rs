//! Lexer and recursive-descent parser for condition and update expressions.
//!
//! Only the subset the document engine emits is accepted: `SET path = :v`,
//! `REMOVE path`, comparisons with `=` and `<>`, `attribute_exists`,
//! `attribute_not_exists`, `AND`, `OR`, `NOT` and parentheses. Keywords are
//! matched case-insensitively.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use super::ast::{AttributePath, CompareOp, Expr, Operand, SetAction, UpdateExpr};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors produced while parsing or evaluating an expression.
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    /// An unexpected token was encountered.
    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken {
        /// What was expected.
        expected: String,
        /// What was found.
        found: String,
    },
    /// A `#name` placeholder has no substitution.
    #[error("Unresolved expression attribute name: {name}")]
    UnresolvedName {
        /// The placeholder.
        name: String,
    },
    /// A `:value` placeholder has no substitution.
    #[error("Unresolved expression attribute value: {name}")]
    UnresolvedValue {
        /// The placeholder.
        name: String,
    },
    /// A path cannot be written.
    #[error("Invalid path {path}: {message}")]
    InvalidPath {
        /// The path as written.
        path: String,
        /// Explanation.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    ExprAttrName(String),
    ExprAttrValue(String),
    Eq,
    Ne,
    Dot,
    Comma,
    LParen,
    RParen,
    And,
    Or,
    Not,
    Set,
    Remove,
    AttributeExists,
    AttributeNotExists,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(s) => write!(f, "identifier '{s}'"),
            Self::ExprAttrName(s) | Self::ExprAttrValue(s) => f.write_str(s),
            Self::Eq => f.write_str("="),
            Self::Ne => f.write_str("<>"),
            Self::Dot => f.write_str("."),
            Self::Comma => f.write_str(","),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
            Self::And => f.write_str("AND"),
            Self::Or => f.write_str("OR"),
            Self::Not => f.write_str("NOT"),
            Self::Set => f.write_str("SET"),
            Self::Remove => f.write_str("REMOVE"),
            Self::AttributeExists => f.write_str("attribute_exists"),
            Self::AttributeNotExists => f.write_str("attribute_not_exists"),
            Self::Eof => f.write_str("EOF"),
        }
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ExpressionError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok == Token::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ExpressionError> {
        while self.chars.peek().is_some_and(char::is_ascii_whitespace) {
            self.chars.next();
        }

        let Some(&ch) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        match ch {
            '#' => {
                self.chars.next();
                self.read_placeholder('#').map(Token::ExprAttrName)
            }
            ':' => {
                self.chars.next();
                self.read_placeholder(':').map(Token::ExprAttrValue)
            }
            '<' => {
                self.chars.next();
                if self.chars.next_if_eq(&'>').is_some() {
                    Ok(Token::Ne)
                } else {
                    Err(ExpressionError::UnexpectedToken {
                        expected: "'<>'".to_owned(),
                        found: "'<'".to_owned(),
                    })
                }
            }
            '=' | '.' | ',' | '(' | ')' => {
                self.chars.next();
                Ok(match ch {
                    '=' => Token::Eq,
                    '.' => Token::Dot,
                    ',' => Token::Comma,
                    '(' => Token::LParen,
                    _ => Token::RParen,
                })
            }
            c if is_ident_start(c) => Ok(self.read_identifier_or_keyword()),
            _ => Err(ExpressionError::UnexpectedToken {
                expected: "valid token".to_owned(),
                found: format!("'{ch}'"),
            }),
        }
    }

    fn read_placeholder(&mut self, sigil: char) -> Result<String, ExpressionError> {
        let name = self.read_ident_chars();
        if name.is_empty() {
            return Err(ExpressionError::UnexpectedToken {
                expected: format!("name after '{sigil}'"),
                found: "empty".to_owned(),
            });
        }
        Ok(format!("{sigil}{name}"))
    }

    fn read_ident_chars(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.chars.next_if(|c| is_ident_continue(*c)) {
            s.push(c);
        }
        s
    }

    fn read_identifier_or_keyword(&mut self) -> Token {
        let ident = self.read_ident_chars();
        match ident.to_ascii_lowercase().as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "set" => Token::Set,
            "remove" => Token::Remove,
            "attribute_exists" => Token::AttributeExists,
            "attribute_not_exists" => Token::AttributeNotExists,
            _ => Token::Identifier(ident),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExpressionError> {
        let tok = self.advance();
        if &tok == expected {
            Ok(())
        } else {
            Err(unexpected(&expected.to_string(), &tok))
        }
    }

    fn expect_end(&mut self) -> Result<(), ExpressionError> {
        match self.peek() {
            Token::Eof => Ok(()),
            other => Err(unexpected("end of expression", other)),
        }
    }

    // -- conditions ---------------------------------------------------------

    fn parse_or_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and_expr()?;
        while self.peek() == &Token::Or {
            self.advance();
            let right = self.parse_and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_not_expr()?;
        while self.peek() == &Token::And {
            self.advance();
            let right = self.parse_not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not_expr(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek() == &Token::Not {
            self.advance();
            let inner = self.parse_not_expr()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary_expr()
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek() {
            Token::LParen => {
                self.advance();
                let expr = self.parse_or_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::AttributeExists | Token::AttributeNotExists => {
                let exists = self.advance() == Token::AttributeExists;
                self.expect(&Token::LParen)?;
                let path = self.parse_attribute_path()?;
                self.expect(&Token::RParen)?;
                Ok(if exists {
                    Expr::Exists(path)
                } else {
                    Expr::NotExists(path)
                })
            }
            _ => {
                let left = self.parse_operand()?;
                let op = match self.advance() {
                    Token::Eq => CompareOp::Eq,
                    Token::Ne => CompareOp::Ne,
                    other => return Err(unexpected("comparison operator", &other)),
                };
                let right = self.parse_operand()?;
                Ok(Expr::Compare { left, op, right })
            }
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, ExpressionError> {
        if let Token::ExprAttrValue(name) = self.peek() {
            let name = name.clone();
            self.advance();
            return Ok(Operand::Value(name));
        }
        self.parse_attribute_path().map(Operand::Path)
    }

    fn parse_attribute_path(&mut self) -> Result<AttributePath, ExpressionError> {
        let mut elements = vec![self.parse_path_element()?];
        while self.peek() == &Token::Dot {
            self.advance();
            elements.push(self.parse_path_element()?);
        }
        Ok(AttributePath { elements })
    }

    fn parse_path_element(&mut self) -> Result<String, ExpressionError> {
        match self.advance() {
            Token::Identifier(name) | Token::ExprAttrName(name) => Ok(name),
            other => Err(unexpected("attribute name", &other)),
        }
    }

    // -- updates ------------------------------------------------------------

    fn parse_update_expr(&mut self) -> Result<UpdateExpr, ExpressionError> {
        let mut update = UpdateExpr::default();
        let mut seen_set = false;
        let mut seen_remove = false;

        loop {
            match self.peek() {
                Token::Set if !seen_set => {
                    self.advance();
                    seen_set = true;
                    loop {
                        let path = self.parse_attribute_path()?;
                        self.expect(&Token::Eq)?;
                        let value = self.parse_operand()?;
                        update.set_actions.push(SetAction { path, value });
                        if !self.eat_comma() {
                            break;
                        }
                    }
                }
                Token::Remove if !seen_remove => {
                    self.advance();
                    seen_remove = true;
                    loop {
                        update.remove_actions.push(self.parse_attribute_path()?);
                        if !self.eat_comma() {
                            break;
                        }
                    }
                }
                Token::Eof if seen_set || seen_remove => return Ok(update),
                other => return Err(unexpected("SET or REMOVE", other)),
            }
        }
    }

    fn eat_comma(&mut self) -> bool {
        if self.peek() == &Token::Comma {
            self.advance();
            true
        } else {
            false
        }
    }
}

fn unexpected(expected: &str, found: &Token) -> ExpressionError {
    ExpressionError::UnexpectedToken {
        expected: expected.to_owned(),
        found: found.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Parse a condition expression.
pub fn parse_condition(input: &str) -> Result<Expr, ExpressionError> {
    let mut parser = Parser::new(Lexer::new(input).tokenize()?);
    let expr = parser.parse_or_expr()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parse an update expression.
pub fn parse_update(input: &str) -> Result<UpdateExpr, ExpressionError> {
    let mut parser = Parser::new(Lexer::new(input).tokenize()?);
    parser.parse_update_expr()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(elements: &[&str]) -> AttributePath {
        AttributePath {
            elements: elements.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    #[test]
    fn test_should_parse_update_with_set_and_remove() {
        let update = parse_update("SET #value.email = :v0, gsi1pk = :v1 REMOVE #value.#n0, gsi2sk")
            .unwrap();
        assert_eq!(
            update.set_actions,
            vec![
                SetAction {
                    path: path(&["#value", "email"]),
                    value: Operand::Value(":v0".to_owned()),
                },
                SetAction {
                    path: path(&["gsi1pk"]),
                    value: Operand::Value(":v1".to_owned()),
                },
            ]
        );
        assert_eq!(
            update.remove_actions,
            vec![path(&["#value", "#n0"]), path(&["gsi2sk"])]
        );
    }

    #[test]
    fn test_should_parse_remove_before_set() {
        let update = parse_update("remove a set b = :v0").unwrap();
        assert_eq!(update.remove_actions, vec![path(&["a"])]);
        assert_eq!(update.set_actions.len(), 1);
    }

    #[test]
    fn test_should_reject_repeated_or_empty_clauses() {
        assert!(parse_update("").is_err());
        assert!(parse_update("   ").is_err());
        assert!(parse_update("SET a = :v0 SET b = :v1").is_err());
        assert!(parse_update("SET a").is_err());
    }

    #[test]
    fn test_should_parse_condition_precedence() {
        let expr = parse_condition(
            "attribute_not_exists(pk) AND (#value.a = :v0 OR NOT #value.b <> :v1)",
        )
        .unwrap();
        let Expr::And(left, right) = expr else {
            panic!("expected AND");
        };
        assert_eq!(*left, Expr::NotExists(path(&["pk"])));
        assert!(matches!(*right, Expr::Or(_, ref r) if matches!(**r, Expr::Not(_))));
    }

    #[test]
    fn test_should_parse_keywords_case_insensitively() {
        let expr = parse_condition("ATTRIBUTE_EXISTS(pk) and attribute_exists(sk)").unwrap();
        assert!(matches!(expr, Expr::And(_, _)));
    }

    #[test]
    fn test_should_reject_trailing_tokens() {
        assert!(parse_condition("attribute_exists(pk) pk").is_err());
        assert!(parse_condition("a < :v0").is_err());
    }
}
