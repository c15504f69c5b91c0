// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Expression trees and evaluation.
//!
//! Operand expressions are parsed once when a statement is constructed and
//! re-evaluated on every layout pass, since symbol values move between
//! passes. Evaluation failures carry a list of diagnostic messages; an
//! empty list tells the caller to substitute its generic message.

use std::fmt;

/// Error returned from expression parsing or evaluation.
#[derive(Debug, Clone)]
pub struct EvalError {
    messages: Vec<String>,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }

    /// An error with no detail; the caller substitutes its own message.
    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.messages.first() {
            Some(msg) => write!(f, "{msg}"),
            None => write!(f, "Invalid expression"),
        }
    }
}

impl std::error::Error for EvalError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    And,
    Or,
    Xor,
}

/// A parsed-but-unevaluated operand expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number(i64),
    Symbol(String),
    /// The current assembly position, written `.` in source.
    CurrentAddress,
    Unary(UnaryOp, Box<Expression>),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
}

/// Context for expression evaluation.
pub trait EvalContext {
    /// Look up a symbol's value by name.
    fn lookup_symbol(&self, name: &str) -> Option<i64>;

    /// The current assembly position (`.`).
    fn current_address(&self) -> Option<i64>;
}

/// Evaluate an expression to a numeric value.
pub fn eval_expr(expr: &Expression, ctx: &dyn EvalContext) -> Result<i64, EvalError> {
    match expr {
        Expression::Number(value) => Ok(*value),
        Expression::Symbol(name) => ctx
            .lookup_symbol(name)
            .ok_or_else(|| EvalError::new(format!("Undefined symbol: {name}"))),
        Expression::CurrentAddress => ctx
            .current_address()
            .ok_or_else(|| EvalError::new("Current address (.) not available")),
        Expression::Unary(op, inner) => {
            let value = eval_expr(inner, ctx)?;
            Ok(match op {
                UnaryOp::Neg => value.wrapping_neg(),
                UnaryOp::BitNot => !value,
            })
        }
        Expression::Binary(op, lhs, rhs) => {
            let left = eval_expr(lhs, ctx)?;
            let right = eval_expr(rhs, ctx)?;
            match op {
                BinaryOp::Add => Ok(left.wrapping_add(right)),
                BinaryOp::Sub => Ok(left.wrapping_sub(right)),
                BinaryOp::Mul => Ok(left.wrapping_mul(right)),
                BinaryOp::Div => {
                    if right == 0 {
                        Err(EvalError::new("Division by zero"))
                    } else {
                        Ok(left.wrapping_div(right))
                    }
                }
                BinaryOp::Mod => {
                    if right == 0 {
                        Err(EvalError::new("Division by zero"))
                    } else {
                        Ok(left.wrapping_rem(right))
                    }
                }
                BinaryOp::Shl => Ok(left.wrapping_shl(right as u32)),
                BinaryOp::Shr => Ok(((left as u64) >> (right as u32 & 63)) as i64),
                BinaryOp::And => Ok(left & right),
                BinaryOp::Or => Ok(left | right),
                BinaryOp::Xor => Ok(left ^ right),
            }
        }
    }
}

impl Expression {
    /// Parse an expression from source text.
    pub fn parse(text: &str) -> Result<Self, EvalError> {
        let tokens = tokenize(text)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_binary(0)?;
        if parser.pos != parser.tokens.len() {
            return Err(EvalError::new(format!(
                "Unexpected trailing input in expression: {text}"
            )));
        }
        Ok(expr)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(i64),
    Symbol(String),
    Dot,
    Op(char),
    Shl,
    Shr,
    LParen,
    RParen,
}

fn tokenize(text: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '<' | '>' => {
                if i + 1 < chars.len() && chars[i + 1] == c {
                    tokens.push(if c == '<' { Token::Shl } else { Token::Shr });
                    i += 2;
                } else {
                    return Err(EvalError::new(format!("Unexpected character: {c}")));
                }
            }
            '+' | '-' | '*' | '/' | '%' | '&' | '|' | '^' | '~' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let lexeme: String = chars[start..i].iter().filter(|c| **c != '_').collect();
                let value = parse_number(&lexeme)
                    .ok_or_else(|| EvalError::new(format!("Invalid number: {lexeme}")))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '@' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '@')
                {
                    i += 1;
                }
                tokens.push(Token::Symbol(chars[start..i].iter().collect()));
            }
            other => return Err(EvalError::new(format!("Unexpected character: {other}"))),
        }
    }
    Ok(tokens)
}

fn parse_number(lexeme: &str) -> Option<i64> {
    if let Some(hex) = lexeme.strip_prefix("0x").or_else(|| lexeme.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(|v| v as i64);
    }
    if let Some(bin) = lexeme.strip_prefix("0b").or_else(|| lexeme.strip_prefix("0B")) {
        return u64::from_str_radix(bin, 2).ok().map(|v| v as i64);
    }
    lexeme.parse::<i64>().ok()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

fn precedence(token: &Token) -> Option<(BinaryOp, u8)> {
    match token {
        Token::Op('|') => Some((BinaryOp::Or, 1)),
        Token::Op('^') => Some((BinaryOp::Xor, 2)),
        Token::Op('&') => Some((BinaryOp::And, 3)),
        Token::Shl => Some((BinaryOp::Shl, 4)),
        Token::Shr => Some((BinaryOp::Shr, 4)),
        Token::Op('+') => Some((BinaryOp::Add, 5)),
        Token::Op('-') => Some((BinaryOp::Sub, 5)),
        Token::Op('*') => Some((BinaryOp::Mul, 6)),
        Token::Op('/') => Some((BinaryOp::Div, 6)),
        Token::Op('%') => Some((BinaryOp::Mod, 6)),
        _ => None,
    }
}

impl Parser {
    fn parse_binary(&mut self, min_prec: u8) -> Result<Expression, EvalError> {
        let mut lhs = self.parse_unary()?;
        while let Some(token) = self.tokens.get(self.pos) {
            let Some((op, prec)) = precedence(token) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let rhs = self.parse_binary(prec + 1)?;
            lhs = Expression::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expression, EvalError> {
        match self.tokens.get(self.pos) {
            Some(Token::Op('-')) => {
                self.pos += 1;
                let inner = self.parse_unary()?;
                Ok(Expression::Unary(UnaryOp::Neg, Box::new(inner)))
            }
            Some(Token::Op('~')) => {
                self.pos += 1;
                let inner = self.parse_unary()?;
                Ok(Expression::Unary(UnaryOp::BitNot, Box::new(inner)))
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expression, EvalError> {
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Number(value)) => {
                self.pos += 1;
                Ok(Expression::Number(value))
            }
            Some(Token::Symbol(name)) => {
                self.pos += 1;
                Ok(Expression::Symbol(name))
            }
            Some(Token::Dot) => {
                self.pos += 1;
                Ok(Expression::CurrentAddress)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_binary(0)?;
                match self.tokens.get(self.pos) {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(EvalError::new("Missing closing parenthesis")),
                }
            }
            _ => Err(EvalError::new("Expected expression")),
        }
    }
}
