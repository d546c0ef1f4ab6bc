//! The resolved syntax tree: identifiers already point at symbols, type
//! nodes are `Ty` values that may still mention generic parameters.

mod expr;
mod stmt;

pub use expr::{
    Arg, ArmBody, BinaryOp, Call, DotAccess, DotField, DotTarget, Expr, ExprKind, FieldInit,
    FunctionRef, Match, MatchArm, MatchPattern, StructLiteral, UnaryOp,
};
pub use stmt::{Block, Stmt, StmtKind};
