//! Tolk type checker: inference, call binding, generic instantiation and
//! flow-sensitive smart casts.
//!
//! The checker consumes a resolved tree (every name already bound to a
//! symbol in a [`SymbolTable`]) and annotates it in place: every expression
//! gets its type, every call its bound function, and generic functions,
//! structs and aliases are instantiated on demand.
//!
//! # Architecture
//!
//! - [`flow`]: sink expressions and the per-path facts about them
//! - [`unify`]: least common type of two types and the branch unifier
//! - [`generics`]: deducing generic parameters from call arguments
//! - [`resolve`]: validating declared types and instantiating `Name<args>`
//! - [`instantiate`]: the memoized monomorphization of generic declarations
//! - [`builtins`]: the builtin and asm functions of the standard prelude
//! - [`infer`]: the inference engine over statements and expressions
//! - [`error`]: type errors and warnings with provenance tracking
//! - [`diagnostics`]: ariadne rendering of errors and warnings

pub mod builtins;
pub mod diagnostics;
pub mod error;
pub mod flow;
pub mod generics;
pub mod infer;
pub mod instantiate;
pub mod resolve;
pub mod unify;

use serde::Deserialize;
use tolk_ast::SymbolTable;

use crate::error::{TypeError, TypeWarning};
use crate::infer::InferCtx;

/// Knobs of a checker run. Deserializable so drivers can read them from
/// their own config files.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CheckOptions {
    /// Report statements that can never execute.
    pub warn_unreachable: bool,
    /// Report functions whose inferred return type became a union of
    /// unrelated types.
    pub warn_inferred_union: bool,
    /// How deep one generic instantiation (function, struct or alias) may
    /// trigger another before checking gives up.
    pub max_instantiation_depth: usize,
}

impl Default for CheckOptions {
    fn default() -> Self {
        CheckOptions { warn_unreachable: true, warn_inferred_union: true, max_instantiation_depth: 16 }
    }
}

/// The result of checking a program.
///
/// Types and bound symbols are written into the tree and the symbol table;
/// this only carries what went wrong.
#[derive(Debug, Default)]
pub struct TypeckResult {
    /// The first error; checking stops there.
    pub error: Option<TypeError>,
    pub warnings: Vec<TypeWarning>,
}

impl TypeckResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Render the error and all warnings against the source text.
    pub fn render(&self, source: &str, options: &diagnostics::DiagnosticOptions) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(err) = &self.error {
            out.push(diagnostics::render_diagnostic(err, source, options));
        }
        for warning in &self.warnings {
            out.push(diagnostics::render_warning(warning, source, options));
        }
        out
    }
}

/// Check a whole program.
///
/// Declared types are resolved first, then constants are inferred, then
/// every non-generic function body. Functions without a declared return
/// type are inferred earlier, on demand, when a caller needs them; generic
/// functions are only ever inferred through their instantiations.
pub fn check(symbols: &mut SymbolTable, options: &CheckOptions) -> TypeckResult {
    let mut ctx = InferCtx::new(symbols, options);
    let error = ctx.check_program().err();
    if let Some(err) = &error {
        tracing::debug!(%err, "type checking failed");
    }
    TypeckResult { error, warnings: ctx.into_warnings() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_when_fields_missing() {
        let opts: CheckOptions = serde_json::from_str(r#"{ "warn_unreachable": false }"#).unwrap();
        assert!(!opts.warn_unreachable);
        assert!(opts.warn_inferred_union);
        assert_eq!(opts.max_instantiation_depth, 16);
    }
}
