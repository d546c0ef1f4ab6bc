//! Resolved program representation for the Tolk type checker.
//!
//! The checker receives programs in this form: name resolution is done,
//! identifiers point at symbol ids, and type annotations are `Ty` values.
//! Inference fills the `ty` slots of expressions and the inferred parts of
//! symbols in place.

pub mod ast;
pub mod build;
pub mod generics;
pub mod symbols;
pub mod ty;

pub use generics::{GenericsDeclaration, GenericsItem, GenericsSubstitutions};
pub use symbols::{
    AliasData, AliasId, ConstData, ConstId, FunctionBody, FunctionData, FunctionId, GlobalVarData,
    GlobalVarId, InferenceState, LocalVarData, LocalVarId, StructData, StructField, StructId,
    SymbolRef, SymbolTable,
};
pub use ty::{GenericBase, Ty};
