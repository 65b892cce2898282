//! AST and recursive-descent parser/evaluator for the bundled expression
//! grammar: literals, dotted variable paths, comparisons, boolean
//! operators, array literals, and unary host-function calls — the set
//! named in §9 "Evaluator plug-in boundary" as sufficient for a
//! deterministic expression engine, plus the `In(state_id)` built-in.

use std::collections::HashMap;
use std::sync::Arc;

use super::lexer::{Lexer, Token};
use crate::datamodel::{CompiledExpression, Data, EvaluationContext, HostFunction};
use crate::error::ExpressionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Data),
    Path(Vec<String>),
    Array(Vec<Expr>),
    Call(String, Vec<Expr>),
    Unary(bool, Box<Expr>), // true = logical not, false = numeric negate
    Binary(BinOp, Box<Expr>, Box<Expr>),
    NoOp,
}

pub fn compile(source: &str) -> Result<Expr, ExpressionError> {
    if source.trim().is_empty() {
        return Ok(Expr::NoOp);
    }
    let tokens = Lexer::new(source).tokenize().map_err(|reason| ExpressionError::Compile {
        source: source.to_string(),
        reason,
    })?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr().map_err(|reason| ExpressionError::Compile {
        source: source.to_string(),
        reason,
    })?;
    parser.expect(Token::Eof).map_err(|reason| ExpressionError::Compile {
        source: source.to_string(),
        reason,
    })?;
    Ok(expr)
}

/// Parses `source` strictly as a dotted path, used for assignment
/// locations (§4.F `resolve_location`). Rejects anything but
/// `ident(.ident)*`, and leading/trailing whitespace.
pub fn parse_location(source: &str) -> Result<Vec<String>, ExpressionError> {
    if source != source.trim() {
        return Err(ExpressionError::InvalidLocation {
            source: source.to_string(),
            reason: "leading/trailing whitespace is not allowed".to_string(),
        });
    }
    let tokens = Lexer::new(source).tokenize().map_err(|reason| ExpressionError::InvalidLocation {
        source: source.to_string(),
        reason,
    })?;
    let mut parser = Parser { tokens, pos: 0 };
    let path = parser.parse_path().map_err(|reason| ExpressionError::InvalidLocation {
        source: source.to_string(),
        reason,
    })?;
    parser
        .expect(Token::Eof)
        .map_err(|reason| ExpressionError::InvalidLocation {
            source: source.to_string(),
            reason,
        })?;
    Ok(path)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(format!("expected {:?}, found {:?}", expected, self.peek()))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while *self.peek() == Token::OrOr {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_eq()?;
        while *self.peek() == Token::AndAnd {
            self.advance();
            let rhs = self.parse_eq()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_eq(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_rel()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinOp::Eq,
                Token::NotEq => BinOp::NotEq,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_rel()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_rel(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_add()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_add()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Token::Not => {
                self.advance();
                Ok(Expr::Unary(true, Box::new(self.parse_unary()?)))
            }
            Token::Minus => {
                self.advance();
                Ok(Expr::Unary(false, Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Literal(Data::Double(n))),
            Token::Str(s) => Ok(Expr::Literal(Data::String(s))),
            Token::True => Ok(Expr::Literal(Data::Boolean(true))),
            Token::False => Ok(Expr::Literal(Data::Boolean(false))),
            Token::Null => Ok(Expr::Literal(Data::Null)),
            Token::LParen => {
                let e = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(e)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if *self.peek() != Token::RBracket {
                    items.push(self.parse_expr()?);
                    while *self.peek() == Token::Comma {
                        self.advance();
                        items.push(self.parse_expr()?);
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expr::Array(items))
            }
            Token::Ident(name) => {
                if *self.peek() == Token::LParen {
                    self.advance();
                    let mut args = Vec::new();
                    if *self.peek() != Token::RParen {
                        args.push(self.parse_expr()?);
                        while *self.peek() == Token::Comma {
                            self.advance();
                            args.push(self.parse_expr()?);
                        }
                    }
                    self.expect(Token::RParen)?;
                    Ok(Expr::Call(name, args))
                } else {
                    let mut path = vec![name];
                    while *self.peek() == Token::Dot {
                        self.advance();
                        match self.advance() {
                            Token::Ident(part) => path.push(part),
                            other => return Err(format!("expected identifier after '.', found {other:?}")),
                        }
                    }
                    Ok(Expr::Path(path))
                }
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }

    fn parse_path(&mut self) -> Result<Vec<String>, String> {
        match self.advance() {
            Token::Ident(name) => {
                let mut path = vec![name];
                while *self.peek() == Token::Dot {
                    self.advance();
                    match self.advance() {
                        Token::Ident(part) => path.push(part),
                        other => return Err(format!("expected identifier after '.', found {other:?}")),
                    }
                }
                Ok(path)
            }
            other => Err(format!("expected a location path, found {other:?}")),
        }
    }
}

pub fn evaluate(
    expr: &Expr,
    ctx: &EvaluationContext,
    functions: &HashMap<String, HostFunction>,
) -> Result<Data, ExpressionError> {
    match expr {
        Expr::NoOp => Ok(Data::Null),
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Array(items) => {
            let values = items
                .iter()
                .map(|i| evaluate(i, ctx, functions))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Data::Array(values))
        }
        Expr::Path(path) => Ok(resolve_path_value(path, ctx).unwrap_or(Data::Null)),
        Expr::Call(name, args) => {
            let f = functions.get(name).ok_or_else(|| ExpressionError::Evaluate {
                reason: format!("unknown function '{name}'"),
            })?;
            let values = args
                .iter()
                .map(|a| evaluate(a, ctx, functions))
                .collect::<Result<Vec<_>, _>>()?;
            f(&values, ctx)
        }
        Expr::Unary(is_not, inner) => {
            let v = evaluate(inner, ctx, functions)?;
            if *is_not {
                Ok(Data::Boolean(!truthy(&v)))
            } else {
                Ok(Data::Double(-as_number(&v)))
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let l = evaluate(lhs, ctx, functions)?;
            match op {
                BinOp::And => {
                    if !truthy(&l) {
                        return Ok(Data::Boolean(false));
                    }
                    let r = evaluate(rhs, ctx, functions)?;
                    Ok(Data::Boolean(truthy(&r)))
                }
                BinOp::Or => {
                    if truthy(&l) {
                        return Ok(Data::Boolean(true));
                    }
                    let r = evaluate(rhs, ctx, functions)?;
                    Ok(Data::Boolean(truthy(&r)))
                }
                _ => {
                    let r = evaluate(rhs, ctx, functions)?;
                    eval_binary(*op, &l, &r)
                }
            }
        }
    }
}

fn eval_binary(op: BinOp, l: &Data, r: &Data) -> Result<Data, ExpressionError> {
    match op {
        BinOp::Eq => Ok(Data::Boolean(l == r)),
        BinOp::NotEq => Ok(Data::Boolean(l != r)),
        BinOp::Lt => Ok(Data::Boolean(as_number(l) < as_number(r))),
        BinOp::Le => Ok(Data::Boolean(as_number(l) <= as_number(r))),
        BinOp::Gt => Ok(Data::Boolean(as_number(l) > as_number(r))),
        BinOp::Ge => Ok(Data::Boolean(as_number(l) >= as_number(r))),
        BinOp::Add => match (l, r) {
            (Data::String(a), _) => Ok(Data::String(format!("{a}{r}"))),
            (_, Data::String(b)) => Ok(Data::String(format!("{l}{b}"))),
            _ => Ok(Data::Double(as_number(l) + as_number(r))),
        },
        BinOp::Sub => Ok(Data::Double(as_number(l) - as_number(r))),
        BinOp::Mul => Ok(Data::Double(as_number(l) * as_number(r))),
        BinOp::Div => Ok(Data::Double(as_number(l) / as_number(r))),
        BinOp::And | BinOp::Or => unreachable!("short-circuited above"),
    }
}

fn truthy(v: &Data) -> bool {
    match v {
        Data::Boolean(b) => *b,
        Data::Null => false,
        Data::Integer(i) => *i != 0,
        Data::Double(d) => *d != 0.0,
        Data::String(s) => !s.is_empty(),
        Data::Array(a) => !a.is_empty(),
        Data::Map(m) => !m.is_empty(),
    }
}

fn as_number(v: &Data) -> f64 {
    match v {
        Data::Integer(i) => *i as f64,
        Data::Double(d) => *d,
        Data::String(s) => s.parse().unwrap_or(f64::NAN),
        Data::Boolean(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => f64::NAN,
    }
}

fn resolve_path_value(path: &[String], ctx: &EvaluationContext) -> Option<Data> {
    let mut current = ctx.lookup(&path[0])?;
    for part in &path[1..] {
        current = current.as_map()?.get(part)?.clone();
    }
    Some(current)
}

pub fn into_compiled(source: &str, expr: Expr) -> CompiledExpression {
    CompiledExpression::new(source, Arc::new(expr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel::DataStore;

    fn ctx<'a>(datamodel: &'a DataStore, config: &'a [String]) -> EvaluationContext<'a> {
        EvaluationContext {
            datamodel,
            event_name: None,
            event_data: None,
            configuration: config,
            session_id: "sess-1",
            document_name: None,
        }
    }

    #[test]
    fn literal_and_path() {
        let mut dm = DataStore::new();
        dm.set("x", Data::Integer(3));
        let cfg = vec![];
        let c = ctx(&dm, &cfg);
        let functions = HashMap::new();
        let expr = compile("x").unwrap();
        assert_eq!(evaluate(&expr, &c, &functions).unwrap(), Data::Integer(3));
    }

    #[test]
    fn comparison_and_boolean_ops() {
        let dm = DataStore::new();
        let cfg = vec![];
        let c = ctx(&dm, &cfg);
        let functions = HashMap::new();
        let expr = compile("1 < 2 && true").unwrap();
        assert_eq!(evaluate(&expr, &c, &functions).unwrap(), Data::Boolean(true));
    }

    #[test]
    fn in_function_call() {
        let dm = DataStore::new();
        let cfg = vec!["a".to_string(), "b".to_string()];
        let c = ctx(&dm, &cfg);
        let mut functions: HashMap<String, HostFunction> = HashMap::new();
        functions.insert(
            "In".to_string(),
            Arc::new(|args: &[Data], _ctx: &EvaluationContext| {
                let id = match &args[0] {
                    Data::String(s) => s.clone(),
                    _ => return Ok(Data::Boolean(false)),
                };
                Ok(Data::Boolean(false || id == "a" || id == "b"))
            }),
        );
        let expr = compile("In('a')").unwrap();
        assert_eq!(evaluate(&expr, &c, &functions).unwrap(), Data::Boolean(true));
    }

    #[test]
    fn location_rejects_whitespace() {
        assert!(parse_location(" x").is_err());
        assert!(parse_location("x.y").is_ok());
    }
}
