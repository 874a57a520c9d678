//! Recursive descent parser for filter expressions.
//!
//! ```text
//! expr    := and ("or" and)*
//! and     := not ("and" not)*
//! not     := "not" not | primary
//! primary := "(" expr ")"
//!          | field op value
//!          | field "in" "(" value ("," value)* ")"
//!          | field "exists"
//! ```

use crate::ast::{CmpOp, Expr, Literal};
use crate::error::CompileError;
use crate::fields::Field;
use crate::lexer::{tokenize, Token, TokenKind};

/// Maximum nesting of parentheses and `not`
pub const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    depth: usize,
    end: usize,
}

/// Parse an expression into its tree.
pub fn parse(input: &str) -> Result<Expr, CompileError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(CompileError::new(0, "empty filter expression"));
    }

    let mut parser = Parser {
        tokens,
        idx: 0,
        depth: 0,
        end: input.len(),
    };
    let expr = parser.parse_or()?;
    if let Some(tok) = parser.peek() {
        return Err(CompileError::new(tok.pos, "unexpected token after end of expression"));
    }
    Ok(expr)
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.idx)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.idx).cloned();
        if tok.is_some() {
            self.idx += 1;
        }
        tok
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Word(w),
                ..
            }) if w.eq_ignore_ascii_case(keyword) => {
                self.idx += 1;
                true
            }
            _ => false,
        }
    }

    fn enter(&mut self, pos: usize) -> Result<(), CompileError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CompileError::new(pos, "expression nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn unexpected_end(&self, what: &str) -> CompileError {
        CompileError::new(self.end, format!("unexpected end of expression, expected {}", what))
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let mut terms = vec![self.parse_and()?];
        while self.eat_keyword("or") {
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let mut terms = vec![self.parse_not()?];
        while self.eat_keyword("and") {
            terms.push(self.parse_not()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::And(terms)
        })
    }

    fn parse_not(&mut self) -> Result<Expr, CompileError> {
        let pos = self.peek().map(|t| t.pos).unwrap_or(self.end);
        if self.eat_keyword("not") {
            self.enter(pos)?;
            let inner = self.parse_not()?;
            self.leave();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let tok = self
            .next()
            .ok_or_else(|| self.unexpected_end("a field name or '('"))?;

        match tok.kind {
            TokenKind::LParen => {
                self.enter(tok.pos)?;
                let expr = self.parse_or()?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => {}
                    Some(other) => return Err(CompileError::new(other.pos, "expected ')'")),
                    None => return Err(self.unexpected_end("')'")),
                }
                self.leave();
                Ok(expr)
            }
            TokenKind::Word(name) => {
                let field = Field::parse(&name).ok_or_else(|| {
                    CompileError::new(tok.pos, format!("expected field name, found '{}'", name))
                })?;
                self.parse_condition(field)
            }
            _ => Err(CompileError::new(tok.pos, "expected a field name or '('")),
        }
    }

    fn parse_condition(&mut self, field: Field) -> Result<Expr, CompileError> {
        let tok = self
            .next()
            .ok_or_else(|| self.unexpected_end("a comparison operator"))?;

        let op = match &tok.kind {
            TokenKind::Eq => CmpOp::Eq,
            TokenKind::Ne => CmpOp::Ne,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::Le => CmpOp::Le,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::Ge => CmpOp::Ge,
            TokenKind::Word(w) if w.eq_ignore_ascii_case("exists") => {
                return Ok(Expr::Exists(field));
            }
            TokenKind::Word(w) if w.eq_ignore_ascii_case("in") => {
                let values = self.parse_list()?;
                return Ok(Expr::In { field, values });
            }
            TokenKind::Word(w) => CmpOp::from_keyword(w).ok_or_else(|| {
                CompileError::new(tok.pos, format!("unknown operator '{}'", w))
            })?,
            _ => {
                return Err(CompileError::new(
                    tok.pos,
                    format!("expected comparison operator after '{}'", field),
                ))
            }
        };

        let value = self.parse_literal()?;
        Ok(Expr::Compare { field, op, value })
    }

    fn parse_literal(&mut self) -> Result<Literal, CompileError> {
        let tok = self.next().ok_or_else(|| self.unexpected_end("a value"))?;
        match tok.kind {
            TokenKind::Word(w) => Ok(Literal::from_word(&w)),
            TokenKind::Str(s) => Ok(Literal::quoted(s)),
            _ => Err(CompileError::new(tok.pos, "expected a value")),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<Literal>, CompileError> {
        match self.next() {
            Some(Token {
                kind: TokenKind::LParen,
                ..
            }) => {}
            Some(other) => return Err(CompileError::new(other.pos, "expected '(' after 'in'")),
            None => return Err(self.unexpected_end("'('")),
        }

        let mut values = Vec::new();
        loop {
            if values.is_empty() {
                if let Some(Token {
                    kind: TokenKind::RParen,
                    pos,
                }) = self.peek()
                {
                    return Err(CompileError::new(*pos, "empty value list"));
                }
            }
            values.push(self.parse_literal()?);
            match self.next() {
                Some(Token {
                    kind: TokenKind::Comma,
                    ..
                }) => continue,
                Some(Token {
                    kind: TokenKind::RParen,
                    ..
                }) => break,
                Some(other) => return Err(CompileError::new(other.pos, "expected ',' or ')'")),
                None => return Err(self.unexpected_end("')'")),
            }
        }
        Ok(values)
    }
}
