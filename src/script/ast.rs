//! Syntax tree of the event script language.

/// Index into the program's linear block table.
pub type BlockId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Indexed or implicit object a field or method is applied to.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Sensor(Box<Expr>),
    Module(Box<Expr>),
    Led(Box<Expr>),
    Timer(Box<Expr>),
    This,
}

/// Assignable location.
#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    Var(String),
    Field { object: Object, field: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i32),
    Float(f32),
    Bool(bool),
    Str(String),
    Var(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `target = value` or, with `op`, `target op= value`.
    Assign {
        target: Place,
        op: Option<BinOp>,
        value: Box<Expr>,
    },
    IncDec {
        target: Place,
        delta: i32,
        prefix: bool,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Field {
        object: Object,
        field: String,
    },
    Method {
        object: Object,
        method: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Var(Vec<(String, Option<Expr>)>),
    Expr(Expr),
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Block(Vec<Stmt>),
    Break,
    Continue,
    Return,
    /// `target` is filled in when the program is linked.
    Goto {
        label: String,
        target: Option<BlockId>,
    },
    Empty,
}

impl Stmt {
    /// Visit every nested `goto` mutably.
    pub fn for_each_goto<E>(
        &mut self,
        f: &mut impl FnMut(&str, &mut Option<BlockId>) -> Result<(), E>,
    ) -> Result<(), E> {
        match self {
            Self::Goto { label, target } => f(label, target),
            Self::If {
                then, otherwise, ..
            } => {
                then.for_each_goto(f)?;
                match otherwise {
                    Some(s) => s.for_each_goto(f),
                    None => Ok(()),
                }
            }
            Self::While { body, .. } => body.for_each_goto(f),
            Self::For { init, body, .. } => {
                if let Some(s) = init {
                    s.for_each_goto(f)?;
                }
                body.for_each_goto(f)
            }
            Self::Block(stmts) => stmts.iter_mut().try_for_each(|s| s.for_each_goto(f)),
            Self::Var(_) | Self::Expr(_) | Self::Break | Self::Continue | Self::Return | Self::Empty => {
                Ok(())
            }
        }
    }
}
