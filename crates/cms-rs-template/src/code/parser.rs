//! Recursive-descent parser for the inline-code language.
//!
//! Produces a [`Program`]: a statement list plus the function declarations
//! hoisted out of it. Both brace blocks (`if (...) { ... }`) and the
//! alternative syntax templates favour (`if (...): ... endif;`) are accepted.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use cms_rs_core::error::EngineError;

use super::lexer::{Spanned, StrPart, Token};

/// Deepest nesting of blocks and sub-expressions the parser accepts.
const MAX_NESTING: usize = 64;

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    /// `$this`
    This,
    /// `[k => v, v]` or `array(...)`; entries without a key are appended.
    Array(Vec<(Option<Expr>, Expr)>),
    Index(Box<Expr>, Box<Expr>),
    /// `$a[]`, only valid as an assignment target.
    Push(Box<Expr>),
    Property(Box<Expr>, String),
    MethodCall(Box<Expr>, String, Vec<Expr>),
    Call(String, Vec<Expr>),
    Isset(Vec<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Option<Box<Expr>>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    NotEq,
    Identical,
    NotIdentical,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Concat,
    Add,
    Sub,
}

/// A statement and the line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Text(String),
    Echo(Vec<Expr>),
    Expr(Expr),
    Assign {
        target: Expr,
        op: AssignOp,
        value: Expr,
    },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Option<Vec<Stmt>>,
    },
    Foreach {
        subject: Expr,
        key: Option<String>,
        value: String,
        body: Vec<Stmt>,
    },
    Block(Vec<Stmt>),
    Return(Option<Expr>),
    Throw {
        class: String,
        args: Vec<Expr>,
    },
}

/// A user-defined function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub line: usize,
}

/// A parsed compilation unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
    /// Keyed by lowercased name; function names are case-insensitive.
    pub functions: HashMap<String, Arc<FunctionDef>>,
}

/// Parses a token stream into a [`Program`].
///
/// # Errors
///
/// Returns a parse-error diagnostic carrying the offending line.
pub fn parse(tokens: &[Spanned]) -> Result<Program, EngineError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        functions: HashMap::new(),
    };
    let body = parser.parse_statements(&[])?;
    if let Some(token) = parser.peek() {
        return Err(parser.unexpected(&token.token));
    }
    Ok(Program {
        body,
        functions: parser.functions,
    })
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    depth: usize,
    functions: HashMap<String, Arc<FunctionDef>>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&'a Token> {
        self.peek().map(|s| &s.token)
    }

    fn line(&self) -> usize {
        self.peek()
            .or_else(|| self.tokens.last())
            .map_or(1, |s| s.line)
    }

    fn next(&mut self) -> Option<&'a Spanned> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_symbol(&self, symbol: &str) -> bool {
        matches!(self.peek_token(), Some(Token::Symbol(s)) if *s == symbol)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek_token(), Some(Token::Ident(name)) if name.eq_ignore_ascii_case(keyword))
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        let found = self.at_symbol(symbol);
        if found {
            self.pos += 1;
        }
        found
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let found = self.at_keyword(keyword);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<(), EngineError> {
        if self.eat_symbol(symbol) {
            return Ok(());
        }
        Err(match self.peek() {
            Some(token) => self.unexpected(&token.token),
            None => self.error(format!("syntax error, unexpected end of file, expecting '{symbol}'")),
        })
    }

    fn expect_variable(&mut self) -> Result<String, EngineError> {
        match self.next() {
            Some(Spanned {
                token: Token::Variable(name),
                ..
            }) => Ok(name.clone()),
            Some(other) => {
                let other = other.token.clone();
                self.pos -= 1;
                Err(self.unexpected(&other))
            }
            None => Err(self.error("syntax error, unexpected end of file, expecting variable")),
        }
    }

    fn expect_ident(&mut self) -> Result<String, EngineError> {
        match self.next() {
            Some(Spanned {
                token: Token::Ident(name),
                ..
            }) => Ok(name.clone()),
            Some(other) => {
                let other = other.token.clone();
                self.pos -= 1;
                Err(self.unexpected(&other))
            }
            None => Err(self.error("syntax error, unexpected end of file, expecting identifier")),
        }
    }

    /// Runs `parse` one nesting level deeper, failing past [`MAX_NESTING`].
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!(
                "syntax error, nesting deeper than {MAX_NESTING} levels"
            )));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn error(&self, message: impl Into<String>) -> EngineError {
        EngineError::parse(message, Some(self.line()))
    }

    fn unexpected(&self, token: &Token) -> EngineError {
        let shown = match token {
            Token::InlineText(_) => "inline text".to_string(),
            Token::OpenEcho => "'<?='".to_string(),
            Token::CloseTag => "'?>'".to_string(),
            Token::Variable(name) => format!("'${name}'"),
            Token::Ident(name) => format!("'{name}'"),
            Token::Str(s) => format!("'\"{s}\"'"),
            Token::Interpolated(_) => "string".to_string(),
            Token::Int(n) => format!("'{n}'"),
            Token::Float(f) => format!("'{f}'"),
            Token::Symbol(s) => format!("'{s}'"),
        };
        self.error(format!("syntax error, unexpected {shown}"))
    }

    /// A statement ends at `;`, at `?>` or at end of input. Text that
    /// immediately follows a `?>` is left for the next statement.
    fn end_statement(&mut self) -> Result<(), EngineError> {
        match self.peek_token() {
            None => Ok(()),
            Some(Token::Symbol(";") | Token::CloseTag) => {
                self.pos += 1;
                Ok(())
            }
            Some(Token::InlineText(_)) => Ok(()),
            Some(other) => Err(self.unexpected(&other.clone())),
        }
    }

    /// Parses statements until end of input, a `}` or one of `terminators`
    /// (alternative-syntax keywords such as `endif`).
    fn parse_statements(&mut self, terminators: &[&str]) -> Result<Vec<Stmt>, EngineError> {
        let mut body = Vec::new();
        loop {
            match self.peek_token() {
                None | Some(Token::Symbol("}")) => break,
                Some(Token::Ident(name))
                    if terminators.iter().any(|t| name.eq_ignore_ascii_case(t)) =>
                {
                    break
                }
                _ => {}
            }
            if let Some(stmt) = self.parse_statement()? {
                body.push(stmt);
            }
        }
        Ok(body)
    }

    fn parse_statement(&mut self) -> Result<Option<Stmt>, EngineError> {
        let Some(spanned) = self.peek() else {
            return Ok(None);
        };
        let line = spanned.line;
        let kind = match &spanned.token {
            Token::InlineText(text) => {
                let text = text.clone();
                self.pos += 1;
                StmtKind::Text(text)
            }
            Token::CloseTag | Token::Symbol(";") => {
                self.pos += 1;
                return Ok(None);
            }
            Token::OpenEcho => {
                self.pos += 1;
                let exprs = self.parse_expr_list()?;
                self.end_statement()?;
                StmtKind::Echo(exprs)
            }
            Token::Symbol("{") => {
                self.pos += 1;
                let body = self.parse_statements(&[])?;
                self.expect_symbol("}")?;
                StmtKind::Block(body)
            }
            Token::Ident(word) => match word.to_ascii_lowercase().as_str() {
                "echo" | "print" => {
                    self.pos += 1;
                    let exprs = self.parse_expr_list()?;
                    self.end_statement()?;
                    StmtKind::Echo(exprs)
                }
                "if" => {
                    self.pos += 1;
                    self.parse_if()?
                }
                "foreach" => {
                    self.pos += 1;
                    self.parse_foreach()?
                }
                "function" => {
                    self.pos += 1;
                    self.parse_function(line)?;
                    return Ok(None);
                }
                "return" => {
                    self.pos += 1;
                    let value = if matches!(
                        self.peek_token(),
                        None | Some(Token::Symbol(";") | Token::CloseTag)
                    ) {
                        None
                    } else {
                        Some(self.parse_expr()?)
                    };
                    self.end_statement()?;
                    StmtKind::Return(value)
                }
                "throw" => {
                    self.pos += 1;
                    self.eat_keyword("new");
                    let class = self.expect_ident()?;
                    self.expect_symbol("(")?;
                    let args = self.parse_args()?;
                    self.end_statement()?;
                    StmtKind::Throw { class, args }
                }
                _ => self.parse_simple_statement()?,
            },
            _ => self.parse_simple_statement()?,
        };
        Ok(Some(Stmt { kind, line }))
    }

    fn parse_simple_statement(&mut self) -> Result<StmtKind, EngineError> {
        let expr = self.parse_expr()?;
        let op = if self.eat_symbol("=") {
            Some(AssignOp::Set)
        } else if self.eat_symbol(".=") {
            Some(AssignOp::Concat)
        } else if self.eat_symbol("+=") {
            Some(AssignOp::Add)
        } else if self.eat_symbol("-=") {
            Some(AssignOp::Sub)
        } else {
            None
        };

        let kind = if let Some(op) = op {
            if !is_assignable(&expr) {
                return Err(self.error("syntax error, cannot assign to this expression"));
            }
            let value = self.parse_expr()?;
            StmtKind::Assign {
                target: expr,
                op,
                value,
            }
        } else if self.eat_symbol("++") {
            Self::increment(expr, AssignOp::Add)
        } else if self.eat_symbol("--") {
            Self::increment(expr, AssignOp::Sub)
        } else {
            StmtKind::Expr(expr)
        };
        self.end_statement()?;
        Ok(kind)
    }

    fn increment(target: Expr, op: AssignOp) -> StmtKind {
        StmtKind::Assign {
            target,
            op,
            value: Expr::Literal(Value::from(1)),
        }
    }

    /// A braced block, the alternative `: ... endkeyword;` form, or a single statement.
    fn parse_block(&mut self, alt_terminators: &[&str]) -> Result<(Vec<Stmt>, bool), EngineError> {
        self.nested(|parser| parser.parse_block_body(alt_terminators))
    }

    fn parse_block_body(&mut self, alt_terminators: &[&str]) -> Result<(Vec<Stmt>, bool), EngineError> {
        if self.eat_symbol("{") {
            let body = self.parse_statements(&[])?;
            self.expect_symbol("}")?;
            return Ok((body, false));
        }
        if self.eat_symbol(":") {
            let body = self.parse_statements(alt_terminators)?;
            return Ok((body, true));
        }
        let stmt = self.parse_statement()?;
        Ok((stmt.into_iter().collect(), false))
    }

    fn parse_condition(&mut self) -> Result<Expr, EngineError> {
        self.expect_symbol("(")?;
        let cond = self.parse_expr()?;
        self.expect_symbol(")")?;
        Ok(cond)
    }

    fn parse_if(&mut self) -> Result<StmtKind, EngineError> {
        const ALT: &[&str] = &["elseif", "else", "endif"];

        let mut branches = Vec::new();
        let cond = self.parse_condition()?;
        let (body, alt) = self.parse_block(ALT)?;
        branches.push((cond, body));
        let mut otherwise = None;

        loop {
            if self.at_keyword("elseif")
                || (self.at_keyword("else")
                    && matches!(self.tokens.get(self.pos + 1), Some(Spanned { token: Token::Ident(w), .. }) if w.eq_ignore_ascii_case("if")))
            {
                if !self.eat_keyword("elseif") {
                    self.pos += 2;
                }
                let cond = self.parse_condition()?;
                let (body, _) = self.parse_block(ALT)?;
                branches.push((cond, body));
                continue;
            }
            if self.eat_keyword("else") {
                let (body, _) = self.parse_block(ALT)?;
                otherwise = Some(body);
            }
            break;
        }

        if alt {
            if !self.eat_keyword("endif") {
                return Err(self.error("syntax error, unexpected end of file, expecting 'endif'"));
            }
            self.end_statement()?;
        }
        Ok(StmtKind::If {
            branches,
            otherwise,
        })
    }

    fn parse_foreach(&mut self) -> Result<StmtKind, EngineError> {
        self.expect_symbol("(")?;
        let subject = self.parse_expr()?;
        if !self.eat_keyword("as") {
            return Err(self.error("syntax error, expecting 'as'"));
        }
        let first = self.expect_variable()?;
        let (key, value) = if self.eat_symbol("=>") {
            (Some(first), self.expect_variable()?)
        } else {
            (None, first)
        };
        self.expect_symbol(")")?;

        let (body, alt) = self.parse_block(&["endforeach"])?;
        if alt {
            if !self.eat_keyword("endforeach") {
                return Err(
                    self.error("syntax error, unexpected end of file, expecting 'endforeach'")
                );
            }
            self.end_statement()?;
        }
        Ok(StmtKind::Foreach {
            subject,
            key,
            value,
            body,
        })
    }

    fn parse_function(&mut self, line: usize) -> Result<(), EngineError> {
        let name = self.expect_ident()?;
        self.expect_symbol("(")?;
        let mut params = Vec::new();
        if !self.eat_symbol(")") {
            loop {
                params.push(self.expect_variable()?);
                if self.eat_symbol(")") {
                    break;
                }
                self.expect_symbol(",")?;
            }
        }
        self.expect_symbol("{")?;
        let body = self.nested(|parser| parser.parse_statements(&[]))?;
        self.expect_symbol("}")?;

        let key = name.to_ascii_lowercase();
        if self.functions.contains_key(&key) {
            return Err(EngineError::fatal(
                format!("Cannot redeclare {name}()"),
                Some(line),
            ));
        }
        self.functions.insert(
            key,
            Arc::new(FunctionDef {
                name,
                params,
                body,
                line,
            }),
        );
        Ok(())
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>, EngineError> {
        let mut exprs = vec![self.parse_expr()?];
        while self.eat_symbol(",") {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    /// Arguments up to and including the closing `)`.
    fn parse_args(&mut self) -> Result<Vec<Expr>, EngineError> {
        let mut args = Vec::new();
        if self.eat_symbol(")") {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.eat_symbol(")") {
                return Ok(args);
            }
            self.expect_symbol(",")?;
            // Trailing comma.
            if self.eat_symbol(")") {
                return Ok(args);
            }
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, EngineError> {
        self.nested(Self::parse_ternary)
    }

    fn parse_ternary(&mut self) -> Result<Expr, EngineError> {
        let cond = self.parse_binary(0)?;
        if !self.eat_symbol("?") {
            return Ok(cond);
        }
        // `$a ?: $b`
        let then = if self.at_symbol(":") {
            None
        } else {
            Some(Box::new(self.nested(Self::parse_ternary)?))
        };
        self.expect_symbol(":")?;
        let otherwise = self.nested(Self::parse_ternary)?;
        Ok(Expr::Ternary(Box::new(cond), then, Box::new(otherwise)))
    }

    /// Precedence climbing over the binary operator table.
    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr, EngineError> {
        let mut left = self.parse_unary()?;
        loop {
            let Some(Token::Symbol(symbol)) = self.peek_token() else {
                break;
            };
            let Some((op, precedence)) = binary_op(symbol) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            self.pos += 1;
            let right = self.parse_binary(precedence + 1)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, EngineError> {
        if self.eat_symbol("!") {
            return Ok(Expr::Not(Box::new(self.nested(Self::parse_unary)?)));
        }
        if self.eat_symbol("-") {
            return Ok(Expr::Neg(Box::new(self.nested(Self::parse_unary)?)));
        }
        if self.eat_symbol("+") {
            return self.nested(Self::parse_unary);
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, EngineError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_symbol("[") {
                if self.eat_symbol("]") {
                    expr = Expr::Push(Box::new(expr));
                    continue;
                }
                let index = self.parse_expr()?;
                self.expect_symbol("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat_symbol("->") {
                let name = self.expect_ident()?;
                if self.eat_symbol("(") {
                    let args = self.parse_args()?;
                    expr = Expr::MethodCall(Box::new(expr), name, args);
                } else {
                    expr = Expr::Property(Box::new(expr), name);
                }
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, EngineError> {
        let Some(spanned) = self.next() else {
            return Err(self.error("syntax error, unexpected end of file"));
        };
        let expr = match &spanned.token {
            Token::Variable(name) if name == "this" => Expr::This,
            Token::Variable(name) => Expr::Var(name.clone()),
            Token::Str(s) => Expr::Literal(Value::String(s.clone())),
            Token::Interpolated(parts) => interpolation(parts),
            Token::Int(n) => Expr::Literal(Value::from(*n)),
            Token::Float(f) => Expr::Literal(Value::from(*f)),
            Token::Symbol("(") => {
                let inner = self.parse_expr()?;
                self.expect_symbol(")")?;
                inner
            }
            Token::Symbol("[") => Expr::Array(self.parse_array_entries("]")?),
            Token::Ident(name) => {
                let name = name.clone();
                match name.to_ascii_lowercase().as_str() {
                    "true" => Expr::Literal(Value::Bool(true)),
                    "false" => Expr::Literal(Value::Bool(false)),
                    "null" => Expr::Literal(Value::Null),
                    "array" if self.at_symbol("(") => {
                        self.pos += 1;
                        Expr::Array(self.parse_array_entries(")")?)
                    }
                    "isset" if self.at_symbol("(") => {
                        self.pos += 1;
                        Expr::Isset(self.parse_args()?)
                    }
                    _ if self.at_symbol("(") => {
                        self.pos += 1;
                        Expr::Call(name, self.parse_args()?)
                    }
                    _ => {
                        return Err(
                            self.error(format!("Use of undefined constant {name}"))
                        )
                    }
                }
            }
            other => {
                let other = other.clone();
                self.pos -= 1;
                return Err(self.unexpected(&other));
            }
        };
        Ok(expr)
    }

    fn parse_array_entries(&mut self, close: &str) -> Result<Vec<(Option<Expr>, Expr)>, EngineError> {
        let mut entries = Vec::new();
        while !self.eat_symbol(close) {
            let first = self.parse_expr()?;
            if self.eat_symbol("=>") {
                entries.push((Some(first), self.parse_expr()?));
            } else {
                entries.push((None, first));
            }
            if !self.eat_symbol(",") {
                self.expect_symbol(close)?;
                break;
            }
        }
        Ok(entries)
    }
}

fn binary_op(symbol: &str) -> Option<(BinaryOp, u8)> {
    Some(match symbol {
        "||" => (BinaryOp::Or, 1),
        "&&" => (BinaryOp::And, 2),
        "==" => (BinaryOp::Eq, 3),
        "!=" => (BinaryOp::NotEq, 3),
        "===" => (BinaryOp::Identical, 3),
        "!==" => (BinaryOp::NotIdentical, 3),
        "<" => (BinaryOp::Lt, 4),
        ">" => (BinaryOp::Gt, 4),
        "<=" => (BinaryOp::LtEq, 4),
        ">=" => (BinaryOp::GtEq, 4),
        "+" => (BinaryOp::Add, 5),
        "-" => (BinaryOp::Sub, 5),
        "." => (BinaryOp::Concat, 5),
        "*" => (BinaryOp::Mul, 6),
        "/" => (BinaryOp::Div, 6),
        "%" => (BinaryOp::Mod, 6),
        _ => return None,
    })
}

fn interpolation(parts: &[StrPart]) -> Expr {
    parts
        .iter()
        .map(|part| match part {
            StrPart::Literal(s) => Expr::Literal(Value::String(s.clone())),
            StrPart::Var(name) => Expr::Var(name.clone()),
        })
        .reduce(|acc, next| Expr::Binary(BinaryOp::Concat, Box::new(acc), Box::new(next)))
        .unwrap_or_else(|| Expr::Literal(Value::String(String::new())))
}

fn is_assignable(expr: &Expr) -> bool {
    match expr {
        Expr::Var(_) => true,
        Expr::Index(base, _) | Expr::Push(base) => is_assignable(base) || is_this_data(base),
        _ => false,
    }
}

/// `$this->data`
pub(crate) fn is_this_data(expr: &Expr) -> bool {
    matches!(expr, Expr::Property(base, name) if **base == Expr::This && name == "data")
}
