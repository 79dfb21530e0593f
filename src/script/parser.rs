//! Recursive-descent parser producing [`Stmt`] trees.
//!
//! Operator precedence, loosest first:
//!
//! ```text
//!   =  += -= *= /= %=          (right associative)
//!   ||
//!   &&
//!   |
//!   ^
//!   &
//!   ==  !=
//!   <  <=  >  >=
//!   <<  >>
//!   +  -
//!   *  /  %
//!   unary  - ! ~ + ++ --
//!   postfix  ++ --
//! ```
//!
//! A missing `;` is tolerated right before `}` or the end of the script.
//! Statements, expressions and unary chains share one nesting limit.

use super::ast::{BinOp, Expr, Object, Place, Stmt, UnaryOp};
use super::lexer::{Tok, Token, tokenize};
use crate::error::ScriptError;

/// Deepest statement/expression nesting a script may use.
pub const MAX_NESTING: usize = 256;

/// Parsed statements and the variable names the script declares.
pub struct Parsed {
    pub body: Vec<Stmt>,
    pub locals: Vec<String>,
}

pub fn parse_source(source: &str) -> Result<Parsed, ScriptError> {
    let mut p = Parser {
        toks: tokenize(source)?,
        pos: 0,
        depth: 0,
        locals: Vec::new(),
    };
    let mut body = Vec::new();
    while !p.check(&Tok::Eof) {
        body.push(p.statement()?);
    }
    Ok(Parsed {
        body,
        locals: p.locals,
    })
}

struct Parser {
    toks: Vec<Token>,
    pos: usize,
    depth: usize,
    locals: Vec<String>,
}

impl Parser {
    // ── Token cursor ──────────────────────────────────────────

    fn current(&self) -> &Token {
        // The token list always ends with `Eof`; the cursor never passes it.
        &self.toks[self.pos.min(self.toks.len() - 1)]
    }

    fn peek(&self) -> &Tok {
        &self.current().tok
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if tok.tok != Tok::Eof {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.check(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        let t = self.current();
        ScriptError::Parse {
            line: t.line,
            column: t.column,
            message: message.into(),
        }
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> Result<(), ScriptError> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, ScriptError> {
        match self.peek().clone() {
            Tok::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, ScriptError>) -> Result<T, ScriptError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!("nesting deeper than {MAX_NESTING}")));
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    fn end_stmt(&mut self) -> Result<(), ScriptError> {
        if self.eat(&Tok::Semi) || matches!(self.peek(), Tok::RBrace | Tok::Eof) {
            Ok(())
        } else {
            Err(self.error("expected ';'"))
        }
    }

    // ── Statements ────────────────────────────────────────────

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        self.nested(Self::statement_inner)
    }

    fn statement_inner(&mut self) -> Result<Stmt, ScriptError> {
        match self.peek() {
            Tok::Var => {
                self.advance();
                let decl = self.var_decl()?;
                self.end_stmt()?;
                Ok(decl)
            }
            Tok::If => {
                self.advance();
                self.expect(&Tok::LParen, "'(' after if")?;
                let cond = self.expr()?;
                self.expect(&Tok::RParen, "')'")?;
                let then = Box::new(self.statement()?);
                let otherwise = if self.eat(&Tok::Else) {
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    cond,
                    then,
                    otherwise,
                })
            }
            Tok::While => {
                self.advance();
                self.expect(&Tok::LParen, "'(' after while")?;
                let cond = self.expr()?;
                self.expect(&Tok::RParen, "')'")?;
                let body = Box::new(self.statement()?);
                Ok(Stmt::While { cond, body })
            }
            Tok::For => self.for_loop(),
            Tok::LBrace => {
                self.advance();
                let mut stmts = Vec::new();
                while !self.check(&Tok::RBrace) {
                    if self.check(&Tok::Eof) {
                        return Err(self.error("expected '}'"));
                    }
                    stmts.push(self.statement()?);
                }
                self.advance();
                Ok(Stmt::Block(stmts))
            }
            Tok::Break => self.keyword_stmt(Stmt::Break),
            Tok::Continue => self.keyword_stmt(Stmt::Continue),
            Tok::Return => self.keyword_stmt(Stmt::Return),
            Tok::Goto => {
                self.advance();
                let label = self.ident("label after goto")?;
                self.end_stmt()?;
                Ok(Stmt::Goto {
                    label,
                    target: None,
                })
            }
            Tok::Semi => {
                self.advance();
                Ok(Stmt::Empty)
            }
            _ => {
                let e = self.expr()?;
                self.end_stmt()?;
                Ok(Stmt::Expr(e))
            }
        }
    }

    fn keyword_stmt(&mut self, stmt: Stmt) -> Result<Stmt, ScriptError> {
        self.advance();
        self.end_stmt()?;
        Ok(stmt)
    }

    fn var_decl(&mut self) -> Result<Stmt, ScriptError> {
        let mut decls = Vec::new();
        loop {
            let name = self.ident("variable name")?;
            let init = if self.eat(&Tok::Assign) {
                Some(self.expr()?)
            } else {
                None
            };
            if !self.locals.contains(&name) {
                self.locals.push(name.clone());
            }
            decls.push((name, init));
            if !self.eat(&Tok::Comma) {
                return Ok(Stmt::Var(decls));
            }
        }
    }

    fn for_loop(&mut self) -> Result<Stmt, ScriptError> {
        self.advance();
        self.expect(&Tok::LParen, "'(' after for")?;
        let init = if self.check(&Tok::Semi) {
            None
        } else if self.eat(&Tok::Var) {
            Some(Box::new(self.var_decl()?))
        } else {
            Some(Box::new(Stmt::Expr(self.expr()?)))
        };
        self.expect(&Tok::Semi, "';' in for")?;
        let cond = if self.check(&Tok::Semi) {
            None
        } else {
            Some(self.expr()?)
        };
        self.expect(&Tok::Semi, "';' in for")?;
        let step = if self.check(&Tok::RParen) {
            None
        } else {
            Some(self.expr()?)
        };
        self.expect(&Tok::RParen, "')'")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    // ── Expressions ───────────────────────────────────────────

    fn expr(&mut self) -> Result<Expr, ScriptError> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> Result<Expr, ScriptError> {
        let lhs = self.binary(1)?;
        let op = match self.peek() {
            Tok::Assign => None,
            Tok::PlusAssign => Some(BinOp::Add),
            Tok::MinusAssign => Some(BinOp::Sub),
            Tok::StarAssign => Some(BinOp::Mul),
            Tok::SlashAssign => Some(BinOp::Div),
            Tok::PercentAssign => Some(BinOp::Rem),
            _ => return Ok(lhs),
        };
        let target = self.place(lhs, "invalid assignment target")?;
        self.advance();
        let value = Box::new(self.expr()?);
        Ok(Expr::Assign { target, op, value })
    }

    fn place(&self, e: Expr, message: &str) -> Result<Place, ScriptError> {
        match e {
            Expr::Var(name) => Ok(Place::Var(name)),
            Expr::Field { object, field } => Ok(Place::Field { object, field }),
            _ => Err(self.error(message)),
        }
    }

    fn binary(&mut self, min_prec: u8) -> Result<Expr, ScriptError> {
        let mut lhs = self.unary()?;
        while let Some((op, prec)) = binop(self.peek()) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.binary(prec + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        self.nested(Self::unary_inner)
    }

    fn unary_inner(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek() {
            Tok::Minus => UnaryOp::Neg,
            Tok::Bang => UnaryOp::Not,
            Tok::Tilde => UnaryOp::BitNot,
            Tok::Plus => {
                self.advance();
                return self.unary();
            }
            Tok::PlusPlus | Tok::MinusMinus => {
                let delta = if self.advance().tok == Tok::PlusPlus { 1 } else { -1 };
                let operand = self.unary()?;
                let target = self.place(operand, "invalid increment target")?;
                return Ok(Expr::IncDec {
                    target,
                    delta,
                    prefix: true,
                });
            }
            _ => return self.postfix(),
        };
        self.advance();
        let operand = self.unary()?;
        Ok(match (op, operand) {
            (UnaryOp::Neg, Expr::Int(v)) => Expr::Int(v.wrapping_neg()),
            (UnaryOp::Neg, Expr::Float(v)) => Expr::Float(-v),
            (op, operand) => Expr::Unary(op, Box::new(operand)),
        })
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let e = self.primary()?;
        let delta = match self.peek() {
            Tok::PlusPlus => 1,
            Tok::MinusMinus => -1,
            _ => return Ok(e),
        };
        let target = self.place(e, "invalid increment target")?;
        self.advance();
        Ok(Expr::IncDec {
            target,
            delta,
            prefix: false,
        })
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let start = self.pos;
        let token = self.advance();
        match token.tok {
            // Literals above i32::MAX (hex masks) keep their bit pattern.
            Tok::Int(v) => Ok(Expr::Int(v as i32)),
            Tok::Float(v) => Ok(Expr::Float(v)),
            Tok::Str(s) => Ok(Expr::Str(s)),
            Tok::True => Ok(Expr::Bool(true)),
            Tok::False => Ok(Expr::Bool(false)),
            Tok::LParen => {
                let e = self.expr()?;
                self.expect(&Tok::RParen, "')'")?;
                Ok(e)
            }
            Tok::This => self.member(Object::This),
            Tok::Ident(name) if self.check(&Tok::LBracket) => {
                self.advance();
                let index = Box::new(self.expr()?);
                self.expect(&Tok::RBracket, "']'")?;
                let object = match name.as_str() {
                    "sensor" | "s" => Object::Sensor(index),
                    "module" | "m" => Object::Module(index),
                    "led" => Object::Led(index),
                    "timer" => Object::Timer(index),
                    _ => {
                        self.pos = start;
                        return Err(self.error(format!("'{name}' cannot be indexed")));
                    }
                };
                self.member(object)
            }
            Tok::Ident(name) if self.check(&Tok::LParen) => {
                self.advance();
                let args = self.args()?;
                Ok(Expr::Call { name, args })
            }
            Tok::Ident(name) => Ok(Expr::Var(name)),
            _ => {
                self.pos = start;
                Err(self.error("expected expression"))
            }
        }
    }

    /// `.field` or `.method(args)` after an object.
    fn member(&mut self, object: Object) -> Result<Expr, ScriptError> {
        self.expect(&Tok::Dot, "'.' after object")?;
        let name = self.ident("field name")?;
        if self.eat(&Tok::LParen) {
            let args = self.args()?;
            Ok(Expr::Method {
                object,
                method: name,
                args,
            })
        } else {
            Ok(Expr::Field {
                object,
                field: name,
            })
        }
    }

    /// Argument list after the opening parenthesis.
    fn args(&mut self) -> Result<Vec<Expr>, ScriptError> {
        let mut args = Vec::new();
        if self.eat(&Tok::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if !self.eat(&Tok::Comma) {
                self.expect(&Tok::RParen, "')'")?;
                return Ok(args);
            }
        }
    }
}

fn binop(tok: &Tok) -> Option<(BinOp, u8)> {
    Some(match tok {
        Tok::OrOr => (BinOp::Or, 1),
        Tok::AndAnd => (BinOp::And, 2),
        Tok::Pipe => (BinOp::BitOr, 3),
        Tok::Caret => (BinOp::BitXor, 4),
        Tok::Amp => (BinOp::BitAnd, 5),
        Tok::EqEq => (BinOp::Eq, 6),
        Tok::Ne => (BinOp::Ne, 6),
        Tok::Lt => (BinOp::Lt, 7),
        Tok::Le => (BinOp::Le, 7),
        Tok::Gt => (BinOp::Gt, 7),
        Tok::Ge => (BinOp::Ge, 7),
        Tok::Shl => (BinOp::Shl, 8),
        Tok::Shr => (BinOp::Shr, 8),
        Tok::Plus => (BinOp::Add, 9),
        Tok::Minus => (BinOp::Sub, 9),
        Tok::Star => (BinOp::Mul, 10),
        Tok::Slash => (BinOp::Div, 10),
        Tok::Percent => (BinOp::Rem, 10),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(src: &str) -> Stmt {
        let mut p = parse_source(src).unwrap();
        assert_eq!(p.body.len(), 1, "{src}");
        p.body.remove(0)
    }

    fn int(v: i32) -> Box<Expr> {
        Box::new(Expr::Int(v))
    }

    #[test]
    fn precedence() {
        assert_eq!(
            one("1 + 2 * 3;"),
            Stmt::Expr(Expr::Binary(
                BinOp::Add,
                int(1),
                Box::new(Expr::Binary(BinOp::Mul, int(2), int(3)))
            ))
        );
        // Left associative.
        assert_eq!(
            one("8 - 4 - 2"),
            Stmt::Expr(Expr::Binary(
                BinOp::Sub,
                Box::new(Expr::Binary(BinOp::Sub, int(8), int(4))),
                int(2)
            ))
        );
    }

    #[test]
    fn field_assignment() {
        assert_eq!(
            one("sensor[1].alarm = 1;"),
            Stmt::Expr(Expr::Assign {
                target: Place::Field {
                    object: Object::Sensor(int(1)),
                    field: "alarm".into()
                },
                op: None,
                value: int(1),
            })
        );
    }

    #[test]
    fn method_call() {
        assert_eq!(
            one("led[0].flash(500);"),
            Stmt::Expr(Expr::Method {
                object: Object::Led(int(0)),
                method: "flash".into(),
                args: vec![Expr::Int(500)],
            })
        );
    }

    #[test]
    fn for_loop_over_slots() {
        let s = one("for (var i = 1; i <= 160; i++) { sensor[i].en = false; }");
        let Stmt::For {
            init, cond, step, ..
        } = s
        else {
            panic!("not a for loop");
        };
        assert!(matches!(init.as_deref(), Some(Stmt::Var(_))));
        assert!(matches!(cond, Some(Expr::Binary(BinOp::Le, ..))));
        assert!(matches!(step, Some(Expr::IncDec { prefix: false, .. })));
    }

    #[test]
    fn declared_locals_are_collected_once() {
        let p = parse_source("var a = 1, b; var a; if (a) { var c; }").unwrap();
        assert_eq!(p.locals, vec!["a", "b", "c"]);
    }

    #[test]
    fn goto_is_unresolved_after_parse() {
        assert_eq!(
            one("goto flood;"),
            Stmt::Goto {
                label: "flood".into(),
                target: None
            }
        );
    }

    #[test]
    fn negative_literals_fold() {
        assert_eq!(one("-5"), Stmt::Expr(Expr::Int(-5)));
        assert_eq!(one("0xFFFFFFFF"), Stmt::Expr(Expr::Int(-1)));
    }

    #[test]
    fn aliases_for_sensor_and_module() {
        assert!(matches!(
            one("s[3].en"),
            Stmt::Expr(Expr::Field {
                object: Object::Sensor(_),
                ..
            })
        ));
        assert!(matches!(
            one("m[3].en"),
            Stmt::Expr(Expr::Field {
                object: Object::Module(_),
                ..
            })
        ));
    }

    #[test]
    fn errors_carry_position() {
        let Err(ScriptError::Parse { line, column, .. }) = parse_source("x = 1;\ny = ;") else {
            panic!("expected parse error");
        };
        assert_eq!((line, column), (2, 5));
    }

    #[test]
    fn rejects_bad_targets() {
        assert!(parse_source("1 = 2;").is_err());
        assert!(parse_source("foo[1].x;").is_err());
        assert!(parse_source("a b").is_err());
        assert!(parse_source("{ a = 1;").is_err());
    }

    #[test]
    fn deep_nesting_is_a_parse_error() {
        let deep = |open: &str, close: &str, n: usize| format!("var x; x = {}1{};", open.repeat(n), close.repeat(n));
        assert!(parse_source(&deep("(", ")", 60)).is_ok());
        for src in [
            deep("(", ")", 200_000),
            deep("-", "", 200_000),
            deep("!", "", MAX_NESTING + 1),
            format!("{}x = 1;{}", "{".repeat(200_000), "}".repeat(200_000)),
            format!("{}x = 1;", "if (1) ".repeat(200_000)),
        ] {
            let Err(ScriptError::Parse { message, .. }) = parse_source(&src) else {
                panic!("expected parse error");
            };
            assert!(message.contains("nesting"), "{message}");
        }
    }
}
