//! The recovered Python AST — a strict tree, no cross-references.
//!
//! Covers the source-language subset the VM compiler emits for the
//! supported bytecode version. Nested function bodies are owned outright
//! by their `FunctionDef`; the descriptor map is consulted once at lift
//! time and never retained here.

/// Whether a name/attribute/subscript/tuple occurs as a use or as an
/// assignment target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ctx {
    Load,
    Store,
}

/// A statement plus the source line the bytecode preserved for it.
#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: Option<u32>,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self { kind, line: None }
    }

    pub fn at(kind: StmtKind, line: Option<u32>) -> Self {
        Self { kind, line }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    FunctionDef {
        name: String,
        args: Vec<String>,
        body: Vec<Stmt>,
        /// Always empty for the supported bytecode version; kept so the
        /// unparser handles decorated definitions uniformly.
        decorators: Vec<Expr>,
    },
    ClassDef {
        name: String,
        bases: Vec<Expr>,
        keywords: Vec<Keyword>,
        body: Vec<Stmt>,
        decorators: Vec<Expr>,
    },
    Import {
        names: Vec<Alias>,
    },
    ImportFrom {
        module: String,
        names: Vec<Alias>,
        level: u32,
    },
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AugAssign {
        target: Expr,
        op: BinOpKind,
        value: Expr,
    },
    Return {
        value: Option<Expr>,
    },
    /// An expression evaluated for effect (a discarded call, usually).
    Expr {
        value: Expr,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Pass,
}

/// `import x as y` / `from m import x as y` binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alias {
    pub name: String,
    pub asname: Option<String>,
}

impl Alias {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            asname: None,
        }
    }
}

/// A `name=value` keyword argument.
#[derive(Clone, Debug, PartialEq)]
pub struct Keyword {
    pub arg: String,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Constant(Constant),
    Name {
        id: String,
        ctx: Ctx,
    },
    Tuple {
        elts: Vec<Expr>,
        ctx: Ctx,
    },
    List {
        elts: Vec<Expr>,
        ctx: Ctx,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
        ctx: Ctx,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
        ctx: Ctx,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    BinOp {
        left: Box<Expr>,
        op: BinOpKind,
        right: Box<Expr>,
        /// True when lifted from an in-place dunder (`__iadd__` etc.);
        /// lets the store that follows recover `x += y`.
        inplace: bool,
    },
    UnaryOp {
        op: UnaryOpKind,
        operand: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOp>,
        comparators: Vec<Expr>,
    },
    /// Placeholder for an opcode the lifter does not understand.
    Unknown {
        opcode: String,
        operands: String,
    },
}

impl Expr {
    pub fn name(id: impl Into<String>, ctx: Ctx) -> Expr {
        Expr::Name { id: id.into(), ctx }
    }

    /// Structural equality of assignment targets, ignoring the Load/Store
    /// context tags. Used to recognize `x = x + y` as `x += y`.
    pub fn same_target(&self, other: &Expr) -> bool {
        match (self, other) {
            (Expr::Name { id: a, .. }, Expr::Name { id: b, .. }) => a == b,
            (
                Expr::Attribute {
                    value: va,
                    attr: aa,
                    ..
                },
                Expr::Attribute {
                    value: vb,
                    attr: ab,
                    ..
                },
            ) => aa == ab && va.same_target(vb),
            (
                Expr::Subscript {
                    value: va,
                    index: ia,
                    ..
                },
                Expr::Subscript {
                    value: vb,
                    index: ib,
                    ..
                },
            ) => va.same_target(vb) && ia == ib,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    None,
    True,
    False,
    Int(i64),
    Str(String),
    /// A literal the VM printed in `<kind>=<value>` form (floats, bytes,
    /// big ints); kept verbatim and re-emitted as-is.
    Literal(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinOpKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOpKind::Add => "+",
            BinOpKind::Sub => "-",
            BinOpKind::Mul => "*",
            BinOpKind::Div => "/",
            BinOpKind::FloorDiv => "//",
            BinOpKind::Mod => "%",
            BinOpKind::Pow => "**",
            BinOpKind::LShift => "<<",
            BinOpKind::RShift => ">>",
            BinOpKind::BitAnd => "&",
            BinOpKind::BitOr => "|",
            BinOpKind::BitXor => "^",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOpKind {
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
        }
    }
}

/// The root of a decompiled module.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
}
