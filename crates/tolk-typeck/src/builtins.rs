//! The builtin and asm functions of the standard prelude.
//!
//! Registers the handful of stdlib functions the checker itself relies on
//! (`__expect_type`, `__isNull`, `sizeof`) plus the common cell, builder,
//! slice and tuple operations. Every one has a declared return type, so
//! calling them never triggers inference.

use tolk_ast::build::FunctionBuilder;
use tolk_ast::{FunctionId, SymbolTable, Ty};

/// Register all builtins into `symbols`.
///
/// After this call the table contains:
/// - tuples: `createEmptyTuple`, `tuple.size`, `tuple.get<T>`, `tuple.push<T>`
/// - cells: `beginCell`, `builder.storeInt`, `builder.endCell`,
///   `cell.beginParse`, `slice.loadInt`
/// - integers: `min`, `max`
/// - checker intrinsics: `__isNull<X>`, `sizeof<T>`, `__expect_type`
pub fn register_builtins(symbols: &mut SymbolTable) -> Vec<FunctionId> {
    let mut ids = Vec::new();
    let mut add = |builder: FunctionBuilder| ids.push(symbols.add_function(builder.finish()));

    // ── Tuples ─────────────────────────────────────────────────────────

    let mut f = FunctionBuilder::new("createEmptyTuple");
    f.returns(Ty::Tuple).asm(&["NIL"]);
    add(f);

    let mut f = FunctionBuilder::method(Ty::Tuple, "size");
    f.self_param(false);
    f.returns(Ty::Int).asm(&["TLEN"]);
    add(f);

    let mut f = FunctionBuilder::method(Ty::Tuple, "get");
    f.generics(&["T"]);
    f.self_param(false);
    f.param("index", Ty::Int);
    f.returns(Ty::generic("T")).asm(&["INDEXVAR"]);
    add(f);

    let mut f = FunctionBuilder::method(Ty::Tuple, "push");
    f.generics(&["T"]);
    f.self_param(true);
    f.param("value", Ty::generic("T"));
    f.returns(Ty::Void).asm(&["TPUSH"]);
    add(f);

    // ── Cells ──────────────────────────────────────────────────────────

    let mut f = FunctionBuilder::new("beginCell");
    f.returns(Ty::Builder).asm(&["NEWC"]);
    add(f);

    let mut f = FunctionBuilder::method(Ty::Builder, "storeInt");
    f.self_param(true);
    f.param("x", Ty::Int);
    f.param("len", Ty::Int);
    f.returns(Ty::Builder).returns_self().asm(&["STIX"]);
    add(f);

    let mut f = FunctionBuilder::method(Ty::Builder, "endCell");
    f.self_param(false);
    f.returns(Ty::Cell).asm(&["ENDC"]);
    add(f);

    let mut f = FunctionBuilder::method(Ty::Cell, "beginParse");
    f.self_param(false);
    f.returns(Ty::Slice).asm(&["CTOS"]);
    add(f);

    let mut f = FunctionBuilder::method(Ty::Slice, "loadInt");
    f.self_param(true);
    f.param("len", Ty::Int);
    f.returns(Ty::Int).asm(&["LDIX"]);
    add(f);

    // ── Integers ───────────────────────────────────────────────────────

    for (name, op) in [("min", "MIN"), ("max", "MAX")] {
        let mut f = FunctionBuilder::new(name);
        f.param("x", Ty::Int);
        f.param("y", Ty::Int);
        f.returns(Ty::Int).asm(&[op]);
        add(f);
    }

    // ── Checker intrinsics ─────────────────────────────────────────────

    let mut f = FunctionBuilder::new("__isNull");
    f.generics(&["X"]);
    f.param("x", Ty::generic("X"));
    f.returns(Ty::Bool).asm(&["ISNULL"]);
    add(f);

    // the width of `T` is what it measures
    let mut f = FunctionBuilder::new("sizeof");
    f.generics(&["T"]);
    f.param("x", Ty::generic("T"));
    f.returns(Ty::Int).allow_variadic_width().builtin();
    add(f);

    let mut f = FunctionBuilder::new("__expect_type");
    f.param("value", Ty::Unknown);
    f.param("expected", Ty::Slice);
    f.returns(Ty::Void).builtin();
    add(f);

    tracing::debug!(count = ids.len(), "builtins registered");
    ids
}
