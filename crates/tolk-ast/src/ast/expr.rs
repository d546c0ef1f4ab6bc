use std::fmt;

use tolk_common::Span;

use super::stmt::Block;
use crate::symbols::{ConstId, FunctionId, GlobalVarId, LocalVarId, StructId};
use crate::ty::Ty;

/// An expression. `ty` is empty until the checker assigns it.
#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub ty: Option<Ty>,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Expr { kind, span: Span::default(), ty: None }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// The assigned type; `unknown` before inference.
    pub fn ty(&self) -> Ty {
        self.ty.clone().unwrap_or(Ty::Unknown)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Int(i128),
    Bool(bool),
    Str(String),
    Null,
    /// `_` on the left of an assignment.
    Underscore,
    LocalVar(LocalVarId),
    /// A local introduced by `var` / `val` on the left of a declaration.
    DeclareLocal(LocalVarId),
    GlobalVar(GlobalVarId),
    Const(ConstId),
    FunctionRef(FunctionRef),
    Paren(Box<Expr>),
    /// `expr!`
    NotNull(Box<Expr>),
    Tensor(Vec<Expr>),
    Brackets(Vec<Expr>),
    Dot(DotAccess),
    Call(Call),
    Assign { lhs: Box<Expr>, rhs: Box<Expr> },
    /// `lhs op= rhs`
    SetAssign { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Ternary { cond: Box<Expr>, when_true: Box<Expr>, when_false: Box<Expr> },
    /// `expr as T`
    Cast { expr: Box<Expr>, target: Ty },
    /// `expr is T`, or `expr !is T` when `negated`.
    IsType { expr: Box<Expr>, target: Ty, negated: bool },
    Match(Match),
    StructLiteral(StructLiteral),
}

/// A function referenced by name, optionally with explicit type arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionRef {
    pub fun: FunctionId,
    pub type_args: Option<Vec<Ty>>,
    /// The instantiation the reference resolved to, for generic functions.
    pub resolved: Option<FunctionId>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DotField {
    /// `t.0`
    Index(u32),
    Name(String),
}

impl fmt::Display for DotField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DotField::Index(i) => write!(f, "{}", i),
            DotField::Name(n) => write!(f, "{}", n),
        }
    }
}

/// What `obj.field` was resolved to.
#[derive(Clone, Debug, PartialEq)]
pub enum DotTarget {
    TensorIndex(u32),
    TupleIndex(u32),
    StructField(StructId, u32),
    Method(FunctionId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct DotAccess {
    pub obj: Box<Expr>,
    pub field: DotField,
    /// `obj.method<int>` explicit type arguments.
    pub type_args: Option<Vec<Ty>>,
    pub target: Option<DotTarget>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Arg {
    pub expr: Expr,
    /// Passed as `mutate x`.
    pub is_mutate: bool,
}

impl From<Expr> for Arg {
    fn from(expr: Expr) -> Self {
        Arg { expr, is_mutate: false }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub callee: Box<Expr>,
    pub args: Vec<Arg>,
    /// The function (or instantiation) actually called; `None` when the
    /// callee is a callable value.
    pub fun: Option<FunctionId>,
    /// `obj.method(..)` where `obj` is passed as `self`.
    pub has_receiver: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MatchPattern {
    /// `int => ...`
    Type(Ty),
    /// `0 => ...`
    Value(Expr),
    Else,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ArmBody {
    Expr(Expr),
    Block(Block),
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatchArm {
    pub pattern: MatchPattern,
    pub body: ArmBody,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Match {
    pub subject: Box<Expr>,
    pub arms: Vec<MatchArm>,
    /// Used as a statement; arm values are discarded.
    pub is_statement: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldInit {
    pub name: String,
    pub span: Span,
    pub value: Expr,
}

/// `Point { x: 1, y: 2 }`, or `{ x: 1, y: 2 }` when the struct comes from
/// the expected type.
#[derive(Clone, Debug, PartialEq)]
pub struct StructLiteral {
    pub struct_ty: Option<Ty>,
    pub fields: Vec<FieldInit>,
    pub resolved: Option<StructId>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    /// Logical `!`
    Not,
    /// Bitwise `~`
    BitNot,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        };
        write!(f, "{}", s)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Ne)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}
