//! Build constraints: `@if(expr)` and `@ignore()` file attributes.
//!
//! Only attributes that precede the package clause count. Evaluation visits
//! every identifier in the expression (no short-circuiting) so that the tag
//! callback observes each tag the file depends on.

use std::path::Path;

use crate::error::{Error, Result};
use crate::instance::ExcludeReason;
use crate::syntax::SyntaxFile;

/// A parsed `@if` expression.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildExpr {
    Tag(String),
    Not(Box<BuildExpr>),
    And(Box<BuildExpr>, Box<BuildExpr>),
    Or(Box<BuildExpr>, Box<BuildExpr>),
}

impl BuildExpr {
    pub fn parse(src: &str) -> std::result::Result<BuildExpr, String> {
        let tokens = tokenize(src)?;
        let mut parser = ExprParser { tokens, pos: 0 };
        let expr = parser.or()?;
        match parser.tokens.get(parser.pos) {
            None => Ok(expr),
            Some(tok) => Err(format!("unexpected {:?} in build attribute", tok)),
        }
    }

    /// Evaluates the expression, calling `is_set` once per identifier
    /// occurrence.
    pub fn eval(&self, is_set: &mut dyn FnMut(&str) -> bool) -> bool {
        match self {
            BuildExpr::Tag(name) => is_set(name),
            BuildExpr::Not(inner) => !inner.eval(is_set),
            BuildExpr::And(a, b) => {
                let a = a.eval(is_set);
                let b = b.eval(is_set);
                a && b
            }
            BuildExpr::Or(a, b) => {
                let a = a.eval(is_set);
                let b = b.eval(is_set);
                a || b
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("invalid operator {} in build attribute", other)),
        }
    }
    Ok(tokens)
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn or(&mut self) -> std::result::Result<BuildExpr, String> {
        let mut lhs = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.and()?;
            lhs = BuildExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> std::result::Result<BuildExpr, String> {
        let mut lhs = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = BuildExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> std::result::Result<BuildExpr, String> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        match tok {
            Some(Token::Not) => Ok(BuildExpr::Not(Box::new(self.unary()?))),
            Some(Token::Ident(name)) => Ok(BuildExpr::Tag(name)),
            Some(Token::LParen) => {
                let inner = self.or()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err("missing ')' in build attribute".to_string());
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(other) => Err(format!("unexpected {:?} in build attribute", other)),
            None => Err("unexpected end of build attribute".to_string()),
        }
    }
}

/// Decides whether `file` takes part in the build.
///
/// Returns the exclusion reason when it does not. Errors are reported for
/// malformed `@if` expressions and for more than one `@if` attribute.
pub fn should_build(
    file: &SyntaxFile,
    is_set: &mut dyn FnMut(&str) -> bool,
) -> Result<Option<ExcludeReason>> {
    let filename: &Path = &file.filename;
    let mut condition = None;
    let mut ignored = false;
    for attr in &file.attributes {
        match attr.name.as_str() {
            "if" => {
                if condition.is_some() {
                    return Err(Error::MultipleIfAttributes {
                        file: filename.to_path_buf(),
                    });
                }
                condition = Some(attr);
            }
            "ignore" => ignored = true,
            _ => {}
        }
    }

    if let Some(attr) = condition {
        let expr = BuildExpr::parse(&attr.body).map_err(|message| {
            Error::InvalidBuildAttribute {
                file: filename.to_path_buf(),
                message,
            }
        })?;
        if !expr.eval(is_set) {
            return Ok(Some(ExcludeReason::ConstraintMismatch {
                expr: attr.body.clone(),
            }));
        }
    }
    if ignored {
        return Ok(Some(ExcludeReason::IgnoreAttribute));
    }
    Ok(None)
}
