//! # Expression Evaluation
//!
//! Command arguments and assignment right-hand sides are plain strings such
//! as `3`, `kasi` or `(kasi + 1) * 2`. [`ExpressionEvaluator::evaluate`]
//! resolves them in three steps:
//!
//! 1. a numeric literal is returned as is,
//! 2. a known variable name returns its value,
//! 3. anything else is parsed as arithmetic over `+ - * / ( )`, numbers and
//!    variable references.
//!
//! The arithmetic path is a small recursive-descent parser; it never
//! executes anything but those four operators.
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := ('+' | '-') factor | number | identifier | '(' expr ')'
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use super::context::VariableStore;

lazy_static! {
    static ref NUMBER_LITERAL: Regex =
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").unwrap();
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Hakuna thamani ya kutathmini")]
    Empty,

    #[error("Kigezo kisichojulikana au sintaksia batili: {expression}")]
    UnknownVariable { name: String, expression: String },

    #[error("Imeshindwa kutathmini: {expression} ({reason})")]
    InvalidSyntax { expression: String, reason: String },

    #[error("Haiwezekani kugawanya kwa sifuri: {expression}")]
    DivisionByZero { expression: String },

    #[error("Matokeo si nambari halali: {expression}")]
    NonFinite { expression: String },
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Deepest chain of parentheses and unary signs the parser descends into.
pub const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ExpressionEvaluator;

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, expression: &str, variables: &VariableStore) -> EvalResult<f64> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(EvalError::Empty);
        }

        if NUMBER_LITERAL.is_match(expression) {
            return parse_number(expression, expression);
        }

        if let Some(value) = variables.get(expression) {
            return Ok(value);
        }

        let tokens = tokenize(expression)?;

        // Unresolvable names are reported before any syntax problem.
        if let Some(name) = tokens.iter().find_map(|token| match token {
            Token::Identifier(name) if !variables.contains(name) => Some(name.clone()),
            _ => None,
        }) {
            return Err(EvalError::UnknownVariable {
                name,
                expression: expression.to_string(),
            });
        }

        let mut parser = Parser {
            tokens: &tokens,
            position: 0,
            depth: 0,
            variables,
            expression,
        };
        let value = parser.parse_expression()?;
        if let Some(token) = parser.peek() {
            return Err(parser.syntax_error(format!("unexpected {:?}", token)));
        }
        if !value.is_finite() {
            return Err(EvalError::NonFinite {
                expression: expression.to_string(),
            });
        }
        Ok(value)
    }
}

fn parse_number(text: &str, expression: &str) -> EvalResult<f64> {
    text.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| EvalError::InvalidSyntax {
            expression: expression.to_string(),
            reason: format!("invalid number '{}'", text),
        })
}

fn tokenize(expression: &str) -> EvalResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(parse_number(
                    &expression[start..end],
                    expression,
                )?));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Identifier(expression[start..end].to_string()));
            }
            _ => {
                let token = match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    other => {
                        return Err(EvalError::InvalidSyntax {
                            expression: expression.to_string(),
                            reason: format!("unexpected character '{}'", other),
                        })
                    }
                };
                tokens.push(token);
                chars.next();
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
    depth: usize,
    variables: &'a VariableStore,
    expression: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.position);
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn syntax_error(&self, reason: String) -> EvalError {
        EvalError::InvalidSyntax {
            expression: self.expression.to_string(),
            reason,
        }
    }

    fn parse_expression(&mut self) -> EvalResult<f64> {
        let mut value = self.parse_term()?;
        while let Some(token) = self.peek() {
            match token {
                Token::Plus => {
                    self.advance();
                    value += self.parse_term()?;
                }
                Token::Minus => {
                    self.advance();
                    value -= self.parse_term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_term(&mut self) -> EvalResult<f64> {
        let mut value = self.parse_factor()?;
        while let Some(token) = self.peek() {
            match token {
                Token::Star => {
                    self.advance();
                    value *= self.parse_factor()?;
                }
                Token::Slash => {
                    self.advance();
                    let divisor = self.parse_factor()?;
                    if divisor == 0.0 {
                        return Err(EvalError::DivisionByZero {
                            expression: self.expression.to_string(),
                        });
                    }
                    value /= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_factor(&mut self) -> EvalResult<f64> {
        if self.depth >= MAX_NESTING {
            return Err(self.syntax_error("expression nested too deeply".to_string()));
        }
        self.depth += 1;
        let value = self.parse_primary();
        self.depth -= 1;
        value
    }

    fn parse_primary(&mut self) -> EvalResult<f64> {
        match self.advance().cloned() {
            Some(Token::Plus) => self.parse_factor(),
            Some(Token::Minus) => Ok(-self.parse_factor()?),
            Some(Token::Number(value)) => Ok(value),
            Some(Token::Identifier(name)) => {
                self.variables
                    .get(&name)
                    .ok_or_else(|| EvalError::UnknownVariable {
                        name,
                        expression: self.expression.to_string(),
                    })
            }
            Some(Token::LParen) => {
                let value = self.parse_expression()?;
                if matches!(self.advance(), Some(Token::RParen)) {
                    Ok(value)
                } else {
                    Err(self.syntax_error("missing ')'".to_string()))
                }
            }
            Some(token) => Err(self.syntax_error(format!("unexpected {:?}", token))),
            None => Err(self.syntax_error("unexpected end of expression".to_string())),
        }
    }
}
