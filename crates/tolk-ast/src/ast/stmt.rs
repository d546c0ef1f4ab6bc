use tolk_common::Span;

use super::expr::Expr;
use crate::symbols::LocalVarId;

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
    /// Span of the first statement that can never execute, once checked.
    pub first_unreachable: Option<Span>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Stmt { kind, span: Span::default() }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Block(Block),
    Expr(Expr),
    /// `var pattern = init`. The pattern is built from `DeclareLocal`,
    /// tensors, brackets and `_`. Without an initializer the declared
    /// locals stay unassigned until written.
    VarDecl { pattern: Expr, init: Option<Expr> },
    Return(Option<Expr>),
    If { cond: Expr, then_body: Block, else_body: Option<Block> },
    While { cond: Expr, body: Block },
    DoWhile { body: Block, cond: Expr },
    Repeat { count: Expr, body: Block },
    Throw { code: Expr, arg: Option<Expr> },
    Assert { cond: Expr, code: Expr },
    /// `try { } catch (code, arg) { }`; either catch variable may be absent.
    TryCatch { try_body: Block, catch_vars: [Option<LocalVarId>; 2], catch_body: Block },
    Empty,
}
