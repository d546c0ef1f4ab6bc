//! Flow-sensitive facts: what is known about local variables (and constant
//! index paths into them) at a point of a function body.
//!
//! A `FlowContext` is threaded forward through statements, cloned at every
//! branch and merged where branches rejoin. A local that has never been
//! assigned on the current path has no entry at all.

use std::collections::BTreeMap;

use tolk_ast::ast::{DotField, DotTarget, Expr, ExprKind};
use tolk_ast::{LocalVarId, Ty};

use crate::unify::calculate_type_lca;

/// Deepest index path that is still tracked (`v.0.1.2...`).
pub const MAX_SINK_DEPTH: usize = 8;

// ── SinkExpression ─────────────────────────────────────────────────────

/// A trackable storage location: a local, optionally followed by constant
/// tensor / tuple / struct field indices.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SinkExpression {
    pub var: LocalVarId,
    pub index_path: Vec<u32>,
}

impl SinkExpression {
    pub fn local(var: LocalVarId) -> Self {
        SinkExpression { var, index_path: Vec::new() }
    }

    /// `self.idx`, or `None` when that would be nested too deep to track.
    pub fn child(&self, idx: u32) -> Option<Self> {
        if self.index_path.len() >= MAX_SINK_DEPTH {
            return None;
        }
        let mut index_path = self.index_path.clone();
        index_path.push(idx);
        Some(SinkExpression { var: self.var, index_path })
    }

    pub fn is_root(&self) -> bool {
        self.index_path.is_empty()
    }

    /// `other` is `self` or lies inside it (`v.1` contains `v.1.2`).
    pub fn contains(&self, other: &SinkExpression) -> bool {
        self.var == other.var && other.index_path.starts_with(&self.index_path)
    }
}

/// The location `expr` denotes, if it is trackable. Parentheses and `!`
/// are transparent. Globals, constants, calls and anything else are not.
pub fn extract_sink_expression(expr: &Expr) -> Option<SinkExpression> {
    match &expr.kind {
        ExprKind::LocalVar(id) | ExprKind::DeclareLocal(id) => Some(SinkExpression::local(*id)),
        ExprKind::Paren(inner) | ExprKind::NotNull(inner) => extract_sink_expression(inner),
        ExprKind::Dot(dot) => {
            let idx = match (&dot.target, &dot.field) {
                (Some(DotTarget::TensorIndex(i)), _) | (Some(DotTarget::TupleIndex(i)), _) => *i,
                (Some(DotTarget::StructField(_, i)), _) => *i,
                (Some(DotTarget::Method(_)), _) => return None,
                (None, DotField::Index(i)) => *i,
                (None, DotField::Name(_)) => return None,
            };
            extract_sink_expression(&dot.obj)?.child(idx)
        }
        _ => None,
    }
}

// ── Facts ──────────────────────────────────────────────────────────────

/// Known sign of an integer value. Nothing sets it yet; it only merges.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum SignState {
    #[default]
    Unknown,
    Zero,
    Positive,
    Negative,
}

impl SignState {
    pub fn merge(self, other: SignState) -> SignState {
        if self == other {
            self
        } else {
            SignState::Unknown
        }
    }
}

/// Known truth value of a boolean. Nothing sets it yet; it only merges.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum BoolState {
    #[default]
    Unknown,
    AlwaysTrue,
    AlwaysFalse,
}

impl BoolState {
    pub fn merge(self, other: BoolState) -> BoolState {
        if self == other {
            self
        } else {
            BoolState::Unknown
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FactsAboutExpr {
    pub ty: Ty,
    pub sign_state: SignState,
    pub bool_state: BoolState,
}

impl FactsAboutExpr {
    pub fn new(ty: Ty) -> Self {
        FactsAboutExpr { ty, sign_state: SignState::Unknown, bool_state: BoolState::Unknown }
    }
}

/// Why a path became unreachable. Only reported in traces.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnreachableKind {
    ReturnStatement,
    ThrowStatement,
    /// A narrowing left no possible type (`x is int` where `x: int` is false).
    CantHappen,
    /// A condition that is a constant.
    ConstantCondition,
    /// A call to a function returning `never`.
    CallNeverReturns,
}

// ── FlowContext ────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowContext {
    facts: BTreeMap<SinkExpression, FactsAboutExpr>,
    unreachable: bool,
}

impl FlowContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_unreachable(&self) -> bool {
        self.unreachable
    }

    pub fn mark_unreachable(&mut self, reason: UnreachableKind) {
        tracing::trace!(?reason, "flow became unreachable");
        self.unreachable = true;
    }

    /// Current smart-cast type of `s_expr`, if tracked.
    pub fn smart_cast(&self, s_expr: &SinkExpression) -> Option<&Ty> {
        self.facts.get(s_expr).map(|f| &f.ty)
    }

    /// Whether the local has been assigned on every path reaching here.
    pub fn is_assigned(&self, var: LocalVarId) -> bool {
        self.facts.contains_key(&SinkExpression::local(var))
    }

    /// Forget `s_expr` and everything inside it, then record `ty` for it.
    pub fn register_known_type(&mut self, s_expr: SinkExpression, ty: Ty) {
        self.invalidate(&s_expr);
        self.facts.insert(s_expr, FactsAboutExpr::new(ty));
    }

    /// Forget `s_expr` and everything inside it.
    pub fn invalidate(&mut self, s_expr: &SinkExpression) {
        self.facts.retain(|k, _| !s_expr.contains(k));
    }

    /// Join two flows at a control-flow rejoin.
    ///
    /// When only one side reaches here, its facts survive for locals and
    /// for the index paths the dead side also tracked; a path fact the
    /// dead side never established is dropped.
    pub fn merge(c1: FlowContext, c2: FlowContext) -> FlowContext {
        let (dead, live) = match (c1.unreachable, c2.unreachable) {
            (true, false) => (c1, c2),
            (false, true) => (c2, c1),
            _ => return Self::merge_facts(c1, c2),
        };
        let facts = live
            .facts
            .into_iter()
            .filter(|(s_expr, _)| s_expr.is_root() || dead.facts.contains_key(s_expr))
            .collect();
        FlowContext { facts, unreachable: false }
    }

    fn merge_facts(c1: FlowContext, c2: FlowContext) -> FlowContext {
        let mut unified = BTreeMap::new();
        let mut other = c2.facts;
        for (s_expr, f1) in c1.facts {
            let Some(f2) = other.remove(&s_expr) else {
                continue;
            };
            let merged = if f1 == f2 {
                f1
            } else {
                FactsAboutExpr {
                    ty: calculate_type_lca(&f1.ty, &f2.ty)
                        .unwrap_or_else(|| Ty::union([f1.ty.clone(), f2.ty.clone()])),
                    sign_state: f1.sign_state.merge(f2.sign_state),
                    bool_state: f1.bool_state.merge(f2.bool_state),
                }
            };
            unified.insert(s_expr, merged);
        }
        FlowContext { facts: unified, unreachable: c1.unreachable && c2.unreachable }
    }
}

// ── ExprFlow ───────────────────────────────────────────────────────────

/// The flow after evaluating an expression. The true/false flows exist
/// only when the expression was evaluated as a condition.
#[derive(Clone, Debug)]
pub struct ExprFlow {
    pub out_flow: FlowContext,
    pub true_flow: Option<FlowContext>,
    pub false_flow: Option<FlowContext>,
}

impl ExprFlow {
    /// Plain flow; when `used_as_condition`, both branch flows start as
    /// copies of it.
    pub fn new(out_flow: FlowContext, used_as_condition: bool) -> Self {
        if used_as_condition {
            ExprFlow {
                true_flow: Some(out_flow.clone()),
                false_flow: Some(out_flow.clone()),
                out_flow,
            }
        } else {
            ExprFlow { out_flow, true_flow: None, false_flow: None }
        }
    }

    pub fn with_branches(out_flow: FlowContext, true_flow: FlowContext, false_flow: FlowContext) -> Self {
        ExprFlow { out_flow, true_flow: Some(true_flow), false_flow: Some(false_flow) }
    }

    /// Flow where the expression evaluated to true.
    pub fn true_flow(&self) -> FlowContext {
        self.true_flow.clone().unwrap_or_else(|| self.out_flow.clone())
    }

    /// Flow where the expression evaluated to false.
    pub fn false_flow(&self) -> FlowContext {
        self.false_flow.clone().unwrap_or_else(|| self.out_flow.clone())
    }

    /// `(true_flow, false_flow)`, consuming the result.
    pub fn into_branches(self) -> (FlowContext, FlowContext) {
        match (self.true_flow, self.false_flow) {
            (Some(t), Some(f)) => (t, f),
            (t, f) => (
                t.unwrap_or_else(|| self.out_flow.clone()),
                f.unwrap_or_else(|| self.out_flow.clone()),
            ),
        }
    }

    /// `!e`: the true and false flows trade places.
    pub fn swapped(self) -> Self {
        ExprFlow { out_flow: self.out_flow, true_flow: self.false_flow, false_flow: self.true_flow }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tolk_ast::build::*;

    fn sink(var: u32, path: &[u32]) -> SinkExpression {
        SinkExpression { var: LocalVarId(var), index_path: path.to_vec() }
    }

    #[test]
    fn wrappers_are_transparent() {
        let base = index(index(local(LocalVarId(2)), 1), 0);
        let expected = extract_sink_expression(&base);
        assert_eq!(expected, Some(sink(2, &[1, 0])));
        assert_eq!(extract_sink_expression(&paren(paren(base.clone()))), expected);
        assert_eq!(extract_sink_expression(&not_null(base.clone())), expected);
        assert_eq!(extract_sink_expression(&index(not_null(local(LocalVarId(2))), 1)), Some(sink(2, &[1])));
    }

    #[test]
    fn untrackable_expressions() {
        assert_eq!(extract_sink_expression(&int(1)), None);
        assert_eq!(extract_sink_expression(&global(tolk_ast::GlobalVarId(0))), None);
        assert_eq!(extract_sink_expression(&index(call(int(0), vec![]), 0)), None);
        assert_eq!(extract_sink_expression(&field(local(LocalVarId(0)), "x")), None);
    }

    #[test]
    fn depth_is_bounded() {
        let mut e = local(LocalVarId(0));
        for _ in 0..MAX_SINK_DEPTH {
            e = index(e, 0);
        }
        assert!(extract_sink_expression(&e).is_some());
        assert_eq!(extract_sink_expression(&index(e, 0)), None);
    }

    #[test]
    fn register_invalidates_extensions_only() {
        let mut flow = FlowContext::new();
        flow.register_known_type(sink(0, &[]), Ty::Tensor(vec![Ty::Int, Ty::Tensor(vec![Ty::Int, Ty::Int])]));
        flow.register_known_type(sink(0, &[0]), Ty::Int);
        flow.register_known_type(sink(0, &[1]), Ty::Tensor(vec![Ty::Int, Ty::Int]));
        flow.register_known_type(sink(0, &[1, 0]), Ty::Int);
        flow.register_known_type(sink(1, &[]), Ty::Slice);

        flow.register_known_type(sink(0, &[1]), Ty::Tensor(vec![Ty::Int, Ty::Null]));
        assert_eq!(flow.smart_cast(&sink(0, &[0])), Some(&Ty::Int));
        assert_eq!(flow.smart_cast(&sink(0, &[1, 0])), None);
        assert_eq!(flow.smart_cast(&sink(0, &[1])), Some(&Ty::Tensor(vec![Ty::Int, Ty::Null])));

        flow.register_known_type(sink(0, &[]), Ty::Unknown);
        assert_eq!(flow.smart_cast(&sink(0, &[])), Some(&Ty::Unknown));
        assert_eq!(flow.smart_cast(&sink(0, &[0])), None);
        assert_eq!(flow.smart_cast(&sink(0, &[1])), None);
        assert_eq!(flow.smart_cast(&sink(1, &[])), Some(&Ty::Slice));
    }

    #[test]
    fn merge_with_unreachable_keeps_locals_and_shared_paths() {
        let mut dead = FlowContext::new();
        dead.register_known_type(sink(0, &[]), Ty::Null);
        dead.register_known_type(sink(0, &[0]), Ty::Null);
        dead.mark_unreachable(UnreachableKind::ReturnStatement);

        let mut live = FlowContext::new();
        live.register_known_type(sink(0, &[]), Ty::Int);
        live.register_known_type(sink(0, &[0]), Ty::Int);
        live.register_known_type(sink(0, &[1]), Ty::Int);
        live.register_known_type(sink(3, &[]), Ty::Slice);

        let merged = FlowContext::merge(dead.clone(), live.clone());
        assert!(!merged.is_unreachable());
        assert_eq!(merged.smart_cast(&sink(0, &[])), Some(&Ty::Int));
        assert_eq!(merged.smart_cast(&sink(3, &[])), Some(&Ty::Slice));
        assert_eq!(merged.smart_cast(&sink(0, &[0])), Some(&Ty::Int));
        assert_eq!(merged.smart_cast(&sink(0, &[1])), None);
        assert_eq!(FlowContext::merge(live, dead), merged);
    }

    #[test]
    fn merge_both_unreachable_stays_unreachable() {
        let mut a = FlowContext::new();
        a.mark_unreachable(UnreachableKind::ThrowStatement);
        let b = a.clone();
        assert!(FlowContext::merge(a, b).is_unreachable());
    }

    #[test]
    fn merge_reachable_takes_lca_of_common_keys() {
        let mut a = FlowContext::new();
        a.register_known_type(sink(0, &[]), Ty::Int);
        a.register_known_type(sink(1, &[]), Ty::Int);
        let mut b = FlowContext::new();
        b.register_known_type(sink(0, &[]), Ty::Null);
        b.register_known_type(sink(2, &[]), Ty::Int);

        let merged = FlowContext::merge(a, b);
        assert_eq!(merged.smart_cast(&sink(0, &[])), Some(&Ty::nullable(Ty::Int)));
        assert!(!merged.is_assigned(LocalVarId(1)));
        assert!(!merged.is_assigned(LocalVarId(2)));
    }

    #[test]
    fn swapped_exchanges_branches() {
        let mut t = FlowContext::new();
        t.register_known_type(sink(0, &[]), Ty::Int);
        let f = FlowContext::new();
        let flow = ExprFlow::with_branches(FlowContext::new(), t.clone(), f.clone()).swapped();
        let (tt, ff) = flow.into_branches();
        assert_eq!(tt, f);
        assert_eq!(ff, t);
    }
}
