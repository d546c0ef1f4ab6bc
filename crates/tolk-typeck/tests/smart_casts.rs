//! Flow-sensitive narrowing: null checks, type tests, assignments, loops
//! and the merging of facts where control flow joins.
//!
//! Expected types are asserted from inside the checked programs through
//! `__expect_type`, which fails checking when the type at that point does
//! not print as given.

use tolk_ast::ast::{BinaryOp, Expr, Stmt};
use tolk_ast::build::*;
use tolk_ast::*;
use tolk_typeck::builtins::register_builtins;
use tolk_typeck::error::TypeError;
use tolk_typeck::{CheckOptions, TypeckResult};

// ── Helpers ────────────────────────────────────────────────────────────

struct Program {
    symbols: SymbolTable,
    expect: FunctionId,
}

impl Program {
    fn new() -> Self {
        let mut symbols = SymbolTable::new();
        register_builtins(&mut symbols);
        let expect = symbols.lookup_function("__expect_type").unwrap();
        Program { symbols, expect }
    }

    /// `__expect_type(e, "ty")`
    fn expect(&self, e: Expr, ty: &str) -> Stmt {
        expr_stmt(call_fn(self.expect, vec![e, string(ty)]))
    }

    fn add(&mut self, f: FunctionBuilder) -> FunctionId {
        self.symbols.add_function(f.finish())
    }

    fn check(&mut self) -> TypeckResult {
        tolk_typeck::check(&mut self.symbols, &CheckOptions::default())
    }
}

fn assert_ok(result: &TypeckResult) {
    assert!(result.is_ok(), "unexpected error: {:?}", result.error);
}

fn int_or_null() -> Ty {
    Ty::nullable(Ty::Int)
}

// ── Null checks ────────────────────────────────────────────────────────

#[test]
fn null_check_narrows_both_branches_and_merges_after() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let x = f.param("x", int_or_null());
    f.body(vec![
        if_(
            ne(local(x), null()),
            vec![p.expect(local(x), "int")],
            Some(vec![p.expect(local(x), "null")]),
        ),
        p.expect(local(x), "int?"),
    ]);
    p.add(f);
    assert_ok(&p.check());
}

#[test]
fn early_return_keeps_the_narrowing_for_the_rest_of_the_body() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let x = f.param("x", int_or_null());
    f.body(vec![if_(eq(local(x), null()), vec![ret_void()], None), p.expect(local(x), "int")]);
    p.add(f);
    assert_ok(&p.check());
}

#[test]
fn reading_outside_the_checked_branch_sees_the_declared_type() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let x = f.param("x", int_or_null());
    f.body(vec![if_(ne(local(x), null()), vec![], None), p.expect(local(x), "int")]);
    p.add(f);
    let result = p.check();
    match result.error {
        Some(TypeError::ExpectTypeFailed { expected, found, .. }) => {
            assert_eq!(expected, "int");
            assert_eq!(found, int_or_null());
        }
        other => panic!("expected ExpectTypeFailed, got {:?}", other),
    }
}

#[test]
fn and_condition_narrows_its_right_operand() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let x = f.param("x", int_or_null());
    f.body(vec![if_(
        and(ne(local(x), null()), binary(BinaryOp::Gt, local(x), int(0))),
        vec![p.expect(local(x), "int")],
        None,
    )]);
    p.add(f);
    assert_ok(&p.check());
}

#[test]
fn or_condition_narrows_with_the_left_operand_false() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let x = f.param("x", int_or_null());
    f.returns(Ty::Bool).body(vec![ret(or(eq(local(x), null()), binary(BinaryOp::Gt, local(x), int(0))))]);
    p.add(f);
    assert_ok(&p.check());
}

#[test]
fn comparing_a_null_value_is_an_operator_error() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let x = f.param("x", int_or_null());
    // `x != null || x > 0`: on the right side `x` is null
    f.returns(Ty::Bool).body(vec![ret(or(ne(local(x), null()), binary(BinaryOp::Gt, local(x), int(0))))]);
    p.add(f);
    let result = p.check();
    assert!(
        matches!(result.error, Some(TypeError::OperatorMismatch { ref lhs, .. }) if *lhs == Ty::Null),
        "got {:?}",
        result.error
    );
}

#[test]
fn not_null_assertion_strips_null() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let x = f.param("x", int_or_null());
    f.body(vec![p.expect(not_null(local(x)), "int")]);
    p.add(f);
    assert_ok(&p.check());
}

// ── Type tests and match ───────────────────────────────────────────────

#[test]
fn type_test_narrows_a_union() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let v = f.param("v", Ty::union([Ty::Int, Ty::Slice]));
    f.body(vec![if_(
        is_type(local(v), Ty::Int),
        vec![p.expect(local(v), "int")],
        Some(vec![p.expect(local(v), "slice")]),
    )]);
    p.add(f);
    assert_ok(&p.check());
}

#[test]
fn negated_type_test_swaps_the_branches() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let v = f.param("v", Ty::union([Ty::Int, Ty::Slice]));
    f.body(vec![if_(not_is_type(local(v), Ty::Int), vec![p.expect(local(v), "slice")], None)]);
    p.add(f);
    assert_ok(&p.check());
}

#[test]
fn match_arms_see_their_variant() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let v = f.param("v", Ty::union([Ty::Int, Ty::Slice]));
    f.returns(Ty::Int).body(vec![ret(match_expr(
        local(v),
        vec![arm_type(Ty::Int, local(v)), arm_type(Ty::Slice, int(0))],
    ))]);
    p.add(f);
    assert_ok(&p.check());
}

#[test]
fn match_else_arm_sees_the_remaining_variants() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let v = f.param("v", Ty::union([Ty::Int, Ty::Slice, Ty::Cell]));
    f.body(vec![match_stmt(
        local(v),
        vec![
            arm_type_block(Ty::Int, vec![p.expect(local(v), "int")]),
            arm_type_block(Ty::Cell, vec![]),
            arm_else(call_fn(p.expect, vec![local(v), string("slice")])),
        ],
    )]);
    p.add(f);
    assert_ok(&p.check());
}

// ── Assignments ────────────────────────────────────────────────────────

#[test]
fn assignment_narrows_a_nullable_variable() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let y = f.local("y", Some(int_or_null()));
    f.body(vec![
        var_decl(y, int(5)),
        p.expect(local(y), "int"),
        assign_stmt(local(y), null()),
        p.expect(local(y), "null"),
    ]);
    p.add(f);
    assert_ok(&p.check());
}

#[test]
fn assigning_null_is_allowed_where_the_variable_is_narrowed() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let x = f.param("x", int_or_null());
    f.body(vec![if_(ne(local(x), null()), vec![assign_stmt(local(x), null())], None), p.expect(local(x), "null")]);
    p.add(f);
    assert_ok(&p.check());
}

#[test]
fn tensor_items_narrow_separately() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let t = f.local("t", Some(Ty::Tensor(vec![int_or_null(), int_or_null()])));
    f.body(vec![
        var_decl(t, tensor(vec![int(1), null()])),
        p.expect(index(local(t), 0), "int?"),
        if_(ne(index(local(t), 0), null()), vec![p.expect(index(local(t), 0), "int")], None),
        p.expect(index(local(t), 0), "int?"),
        p.expect(index(local(t), 1), "int?"),
        p.expect(local(t), "(int?, int?)"),
    ]);
    p.add(f);
    assert_ok(&p.check());
}

#[test]
fn early_return_keeps_item_narrowing_the_returning_path_also_knew() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let t = f.param("t", Ty::Tensor(vec![int_or_null(), int_or_null()]));
    f.body(vec![
        if_(eq(index(local(t), 0), null()), vec![ret_void()], None),
        p.expect(index(local(t), 0), "int"),
    ]);
    p.add(f);
    assert_ok(&p.check());
}

#[test]
fn returning_branch_that_never_narrowed_an_item_drops_that_fact() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let c = f.param("c", Ty::Bool);
    let t = f.param("t", Ty::Tensor(vec![int_or_null(), int_or_null()]));
    f.body(vec![
        if_(
            local(c),
            vec![ret_void()],
            Some(vec![if_(eq(index(local(t), 0), null()), vec![ret_void()], None)]),
        ),
        p.expect(index(local(t), 0), "int?"),
        p.expect(local(c), "bool"),
    ]);
    p.add(f);
    assert_ok(&p.check());
}

// ── Try / catch ────────────────────────────────────────────────────────

#[test]
fn catch_starts_from_the_flow_before_try() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let x = f.param("x", int_or_null());
    let code = f.local("code", None);
    f.body(vec![
        assign_stmt(local(x), int(1)),
        try_catch(
            vec![assign_stmt(local(x), null()), p.expect(local(x), "null")],
            [Some(code), None],
            vec![p.expect(local(x), "int"), p.expect(local(code), "int")],
        ),
        p.expect(local(x), "int?"),
    ]);
    let f = p.add(f);
    assert_ok(&p.check());
    assert_eq!(p.symbols.function(f).local(code).inferred_type, Some(Ty::Int));
}

#[test]
fn throwing_try_body_leaves_only_the_catch_flow() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let x = f.param("x", int_or_null());
    f.body(vec![
        try_catch(
            vec![assign_stmt(local(x), null()), throw(int(5))],
            [None, None],
            vec![assign_stmt(local(x), int(2))],
        ),
        p.expect(local(x), "int"),
    ]);
    p.add(f);
    assert_ok(&p.check());
}

#[test]
fn ternary_branches_unify_to_a_nullable() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let c = f.param("c", Ty::Bool);
    let r = f.local("r", None);
    f.body(vec![var_decl(r, ternary(local(c), int(1), null())), p.expect(local(r), "int?")]);
    p.add(f);
    assert_ok(&p.check());
}

#[test]
fn ternary_without_a_common_type_is_an_error() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let c = f.param("c", Ty::Bool);
    let r = f.local("r", None);
    f.body(vec![var_decl(r, ternary(local(c), int(1), string("s")))]);
    p.add(f);
    let result = p.check();
    match result.error {
        Some(TypeError::IncompatibleBranches { first, second, .. }) => {
            assert_eq!((first, second), (Ty::Int, Ty::Slice));
        }
        other => panic!("expected IncompatibleBranches, got {:?}", other),
    }
}

#[test]
fn ternary_with_a_declared_union_accepts_unrelated_branches() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let c = f.param("c", Ty::Bool);
    let r = f.local("r", Some(Ty::union([Ty::Int, Ty::Slice])));
    f.body(vec![var_decl(r, ternary(local(c), int(1), string("s"))), p.expect(local(r), "int | slice")]);
    p.add(f);
    assert_ok(&p.check());
}

// ── Loops ──────────────────────────────────────────────────────────────

#[test]
fn while_loop_merges_the_entry_with_the_body() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let c = f.param("c", Ty::Bool);
    let i = f.local("i", Some(int_or_null()));
    f.body(vec![
        var_decl(i, null()),
        while_(local(c), vec![assign_stmt(local(i), int(1))]),
        p.expect(local(i), "int?"),
    ]);
    p.add(f);
    assert_ok(&p.check());
}

#[test]
fn do_while_body_always_runs_once() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let c = f.param("c", Ty::Bool);
    let i = f.local("i", Some(int_or_null()));
    f.body(vec![
        var_decl(i, null()),
        do_while(vec![assign_stmt(local(i), int(1))], local(c)),
        p.expect(local(i), "int"),
    ]);
    p.add(f);
    assert_ok(&p.check());
}

#[test]
fn repeat_may_run_zero_times() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let i = f.local("i", Some(int_or_null()));
    f.body(vec![var_decl(i, null()), repeat(int(3), vec![assign_stmt(local(i), int(1))]), p.expect(local(i), "int?")]);
    p.add(f);
    assert_ok(&p.check());
}

// ── Mutate arguments ───────────────────────────────────────────────────

#[test]
fn mutate_argument_resets_the_narrowing() {
    let mut p = Program::new();
    let mut reset = FunctionBuilder::new("reset");
    let x = reset.mutate_param("x", int_or_null());
    reset.body(vec![assign_stmt(local(x), null())]);
    let reset = p.add(reset);

    let mut f = FunctionBuilder::new("f");
    let v = f.local("v", Some(int_or_null()));
    f.body(vec![
        var_decl(v, int(1)),
        p.expect(local(v), "int"),
        expr_stmt(call_args(fun_ref(reset), vec![mutate(local(v))])),
        p.expect(local(v), "int?"),
    ]);
    p.add(f);
    assert_ok(&p.check());
}

// ── Definite assignment ────────────────────────────────────────────────

#[test]
fn variable_assigned_on_every_path_can_be_read() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let c = f.param("c", Ty::Bool);
    let x = f.local("x", Some(Ty::Int));
    f.body(vec![
        var_decl_uninit(x),
        if_(local(c), vec![assign_stmt(local(x), int(1))], Some(vec![assign_stmt(local(x), int(2))])),
        ret(local(x)),
    ]);
    let f = p.add(f);
    assert_ok(&p.check());
    assert_eq!(p.symbols.function(f).inferred_return_type, Some(Ty::Int));
}

#[test]
fn variable_assigned_on_one_path_is_used_before_assignment() {
    let mut p = Program::new();
    let mut f = FunctionBuilder::new("f");
    let c = f.param("c", Ty::Bool);
    let x = f.local("x", Some(Ty::Int));
    f.body(vec![var_decl_uninit(x), if_(local(c), vec![assign_stmt(local(x), int(1))], None), ret(local(x))]);
    p.add(f);
    let result = p.check();
    assert!(
        matches!(&result.error, Some(TypeError::UsedBeforeAssignment { name, .. }) if name == "x"),
        "got {:?}",
        result.error
    );
}
