//! Expressions other than calls.
//!
//! Every case assigns a type to the node and returns the flow after it;
//! when the expression is used as a condition the true/false flows are
//! specialized too (`x != null`, `x is int`, `&&`, `||`, `!`).

use tolk_ast::ast::{
    ArmBody, BinaryOp, DotAccess, DotField, DotTarget, Expr, ExprKind, FunctionRef, Match,
    MatchPattern, StructLiteral, UnaryOp,
};
use tolk_ast::{FunctionId, GenericBase, LocalVarId, StructId, Ty};
use tolk_common::Span;

use super::{FunctionInferrer, Result};
use crate::error::{ConstraintOrigin, TypeError};
use crate::flow::{extract_sink_expression, ExprFlow, FlowContext, SinkExpression, UnreachableKind};
use crate::generics::GenericSubstitutionsDeducing;
use crate::instantiate;
use crate::resolve::resolve_type;
use crate::unify::TypeInferringUnifyStrategy;

/// A node's type together with the flow after it.
pub(crate) type Inferred = (Ty, ExprFlow);

/// The smart cast a local (or a part of it) gets after being assigned a
/// value of type `rhs`, given its declared type.
///
/// Only union-typed targets narrow. A tensor with nullable items keeps its
/// declared type even when assigned a tensor of non-null values; its items
/// are narrowed separately by later checks.
pub(crate) fn calc_smart_cast_type_on_assignment(declared: &Ty, rhs: &Ty) -> Ty {
    let Some(variants) = declared.unwrap_alias().try_as_union() else {
        return declared.clone();
    };
    if rhs.is_null() {
        return Ty::Null;
    }
    if variants.contains(rhs) {
        return rhs.clone();
    }
    if let Some(rhs_variants) = rhs.try_as_union() {
        if rhs_variants.iter().all(|r| variants.contains(r)) {
            return rhs.clone();
        }
    }
    let mut accepting = variants.iter().filter(|v| v.can_rhs_be_assigned(rhs));
    match (accepting.next(), accepting.next()) {
        (Some(only), None) => only.clone(),
        _ => declared.clone(),
    }
}

/// Types a sink has after `e is target` is true and after it is false.
fn narrow_by_type(expr_ty: &Ty, target: &Ty) -> (Ty, Ty) {
    if expr_ty == target {
        return (target.clone(), Ty::Never);
    }
    if expr_ty.is_unknown() {
        return (target.clone(), Ty::Unknown);
    }
    if expr_ty.unwrap_alias().try_as_union().is_some() {
        let rest = expr_ty.subtract(target);
        if &rest == expr_ty.unwrap_alias() {
            return (Ty::Never, expr_ty.clone());
        }
        return (target.clone(), rest);
    }
    (Ty::Never, expr_ty.clone())
}

/// Record what a branch learned about `sink`; a branch where the sink can
/// have no type at all never executes.
fn narrow_flow(flow: &mut FlowContext, sink: Option<&SinkExpression>, ty: Ty) {
    if ty.is_never() {
        flow.mark_unreachable(UnreachableKind::CantHappen);
    } else if let Some(sink) = sink {
        flow.register_known_type(sink.clone(), ty);
    }
}

/// A condition whose value is known: one of its branches never executes.
fn constant_condition(flow: FlowContext, used_as_condition: bool, value: bool) -> ExprFlow {
    if !used_as_condition {
        return ExprFlow::new(flow, false);
    }
    let mut true_flow = flow.clone();
    let mut false_flow = flow.clone();
    if value {
        false_flow.mark_unreachable(UnreachableKind::ConstantCondition);
    } else {
        true_flow.mark_unreachable(UnreachableKind::ConstantCondition);
    }
    ExprFlow::with_branches(flow, true_flow, false_flow)
}

/// The tracked location of `obj.<target>`.
pub(crate) fn dot_sink(dot: &DotAccess) -> Option<SinkExpression> {
    let idx = match &dot.target {
        Some(DotTarget::TensorIndex(i)) | Some(DotTarget::TupleIndex(i)) | Some(DotTarget::StructField(_, i)) => *i,
        _ => return None,
    };
    extract_sink_expression(&dot.obj)?.child(idx)
}

fn binary_result_type(op: BinaryOp, lhs: &Ty, rhs: &Ty) -> Option<Ty> {
    let lenient = |t: &Ty| t.is_unknown() || t.is_never();
    let int_like = |t: &Ty| t.is_integer() || lenient(t);
    let bool_like = |t: &Ty| t.is_bool() || lenient(t);
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Shl | BinaryOp::Shr => {
            (int_like(lhs) && int_like(rhs)).then_some(Ty::Int)
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
            if lhs.is_bool() && rhs.is_bool() {
                Some(Ty::Bool)
            } else {
                (int_like(lhs) && int_like(rhs)).then_some(Ty::Int)
            }
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            (int_like(lhs) && int_like(rhs)).then_some(Ty::Bool)
        }
        BinaryOp::Eq | BinaryOp::Ne => {
            let comparable = (int_like(lhs) && int_like(rhs))
                || (bool_like(lhs) && bool_like(rhs))
                || (matches!(lhs.unwrap_alias(), Ty::Address) && matches!(rhs.unwrap_alias(), Ty::Address))
                || (lhs.is_null() && rhs.can_hold_null())
                || (rhs.is_null() && lhs.can_hold_null())
                || lhs.is_null()
                || rhs.is_null();
            comparable.then_some(Ty::Bool)
        }
        BinaryOp::And | BinaryOp::Or => {
            let cond = |t: &Ty| t.is_bool() || int_like(t);
            (cond(lhs) && cond(rhs)).then_some(Ty::Bool)
        }
    }
}

fn cast_allowed(from: &Ty, to: &Ty) -> bool {
    if to.can_rhs_be_assigned(from) || from.can_rhs_be_assigned(to) {
        return true;
    }
    if from.has_unknown_inside() || to.has_unknown_inside() || from.is_never() {
        return true;
    }
    if (from.is_integer() || from.is_bool()) && to.is_integer() {
        return true;
    }
    match (from.unwrap_alias(), to.unwrap_alias()) {
        (Ty::Tensor(a), Ty::Tensor(b)) | (Ty::Brackets(a), Ty::Brackets(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| cast_allowed(x, y))
        }
        _ => false,
    }
}

enum StructTarget {
    Concrete(StructId),
    Generic(StructId),
}

impl FunctionInferrer<'_, '_> {
    /// Infer `expr`, store its type and return the flow after it.
    pub(crate) fn infer_expr(
        &mut self,
        expr: &mut Expr,
        flow: FlowContext,
        used_as_condition: bool,
        hint: Option<&Ty>,
    ) -> Result<ExprFlow> {
        let span = expr.span;
        let (ty, after) = match &mut expr.kind {
            ExprKind::Int(v) => (Ty::Int, constant_condition(flow, used_as_condition, *v != 0)),
            ExprKind::Bool(b) => (Ty::Bool, constant_condition(flow, used_as_condition, *b)),
            ExprKind::Str(_) => (Ty::Slice, ExprFlow::new(flow, used_as_condition)),
            ExprKind::Null => (Ty::Null, ExprFlow::new(flow, used_as_condition)),
            ExprKind::Underscore => (hint.cloned().unwrap_or(Ty::Unknown), ExprFlow::new(flow, used_as_condition)),
            ExprKind::LocalVar(id) => self.infer_local_var(*id, span, flow, used_as_condition)?,
            ExprKind::DeclareLocal(id) => (self.local_declared_type(*id), ExprFlow::new(flow, used_as_condition)),
            ExprKind::GlobalVar(id) => {
                let ty = self.ctx.symbols.global(*id).declared_type.clone();
                (ty, ExprFlow::new(flow, used_as_condition))
            }
            ExprKind::Const(id) => {
                self.ctx.ensure_const_inferred(*id, span)?;
                let ty = self.ctx.symbols.constant(*id).inferred_type.clone().unwrap_or(Ty::Unknown);
                (ty, ExprFlow::new(flow, used_as_condition))
            }
            ExprKind::FunctionRef(fun_ref) => {
                let ty = self.infer_function_ref(fun_ref, span)?;
                (ty, ExprFlow::new(flow, used_as_condition))
            }
            ExprKind::Paren(inner) => {
                let after = self.infer_expr(inner, flow, used_as_condition, hint)?;
                (inner.ty(), after)
            }
            ExprKind::NotNull(inner) => {
                let after = self.infer_expr(inner, flow, used_as_condition, hint)?;
                let ty = inner.ty();
                let ty = if ty.is_never() { ty } else { ty.without_null() };
                (ty, after)
            }
            ExprKind::Tensor(items) => {
                let hints = hint.and_then(|h| h.unwrap_alias().try_as_tensor()).filter(|h| h.len() == items.len());
                let (tys, flow) = self.infer_items(items, flow, hints)?;
                (Ty::Tensor(tys), ExprFlow::new(flow, used_as_condition))
            }
            ExprKind::Brackets(items) => {
                let hints = hint.and_then(|h| h.unwrap_alias().try_as_brackets()).filter(|h| h.len() == items.len());
                let (tys, flow) = self.infer_items(items, flow, hints)?;
                (Ty::Brackets(tys), ExprFlow::new(flow, used_as_condition))
            }
            ExprKind::Dot(dot) => self.infer_dot(dot, span, flow, used_as_condition, hint)?,
            ExprKind::Call(call) => self.infer_call(call, span, flow, used_as_condition, hint)?,
            ExprKind::Assign { lhs, rhs } => self.infer_assign(lhs, rhs, flow, used_as_condition)?,
            ExprKind::SetAssign { op, lhs, rhs } => {
                self.infer_set_assign(*op, lhs, rhs, span, flow, used_as_condition)?
            }
            ExprKind::Unary { op, operand } => self.infer_unary(*op, operand, span, flow, used_as_condition)?,
            ExprKind::Binary { op, lhs, rhs } => self.infer_binary(*op, lhs, rhs, span, flow, used_as_condition)?,
            ExprKind::Ternary { cond, when_true, when_false } => {
                self.infer_ternary(cond, when_true, when_false, span, flow, used_as_condition, hint)?
            }
            ExprKind::Cast { expr: inner, target } => self.infer_cast(inner, target, span, flow, used_as_condition)?,
            ExprKind::IsType { expr: inner, target, negated } => {
                self.infer_is_type(inner, target, *negated, span, flow, used_as_condition)?
            }
            ExprKind::Match(m) => self.infer_match(m, span, flow, hint)?,
            ExprKind::StructLiteral(lit) => self.infer_struct_literal(lit, span, flow, used_as_condition, hint)?,
        };
        expr.ty = Some(ty);
        Ok(after)
    }

    fn infer_items(
        &mut self,
        items: &mut [Expr],
        mut flow: FlowContext,
        hints: Option<&[Ty]>,
    ) -> Result<(Vec<Ty>, FlowContext)> {
        let mut tys = Vec::with_capacity(items.len());
        for (idx, item) in items.iter_mut().enumerate() {
            let hint = hints.and_then(|h| h.get(idx));
            flow = self.infer_expr(item, flow, false, hint)?.out_flow;
            tys.push(item.ty());
        }
        Ok((tys, flow))
    }

    // ── Names ──────────────────────────────────────────────────────────

    /// A local reads as its current smart cast, which also proves it was
    /// assigned on every path reaching here.
    fn infer_local_var(&mut self, id: LocalVarId, span: Span, flow: FlowContext, used_as_condition: bool) -> Result<Inferred> {
        let ty = match flow.smart_cast(&SinkExpression::local(id)) {
            Some(ty) => ty.clone(),
            None if flow.is_unreachable() => self.local_declared_type(id),
            None => {
                return Err(TypeError::UsedBeforeAssignment { name: self.local(id).name.clone(), span });
            }
        };
        Ok((ty, ExprFlow::new(flow, used_as_condition)))
    }

    /// A function used as a value. Generic functions need explicit type
    /// arguments here; only calls deduce them.
    fn infer_function_ref(&mut self, fun_ref: &mut FunctionRef, span: Span) -> Result<Ty> {
        let data = self.ctx.symbols.function(fun_ref.fun);
        let target = if data.is_generic() {
            let Some(type_args) = fun_ref.type_args.clone() else {
                return Err(TypeError::GenericFunctionAsValue { name: data.name.clone(), span });
            };
            let inst = self.instantiate_explicit(fun_ref.fun, type_args, span)?;
            fun_ref.resolved = Some(inst);
            inst
        } else {
            self.ctx.ensure_function_inferred(fun_ref.fun, span)?;
            fun_ref.fun
        };
        Ok(self.callable_type_of(target))
    }

    pub(crate) fn callable_type_of(&self, fun: FunctionId) -> Ty {
        self.ctx.symbols.function(fun).callable_type().unwrap_or(Ty::Unknown)
    }

    // ── Dot access ─────────────────────────────────────────────────────

    fn infer_dot(&mut self, dot: &mut DotAccess, span: Span, flow: FlowContext, used_as_condition: bool, hint: Option<&Ty>) -> Result<Inferred> {
        let flow = self.infer_expr(&mut dot.obj, flow, false, None)?.out_flow;
        let obj_ty = dot.obj.ty();
        let declared = self.resolve_dot_field(dot, &obj_ty, span, hint)?;
        let ty = match dot_sink(dot) {
            Some(sink) => flow.smart_cast(&sink).cloned().unwrap_or(declared),
            None => declared,
        };
        Ok((ty, ExprFlow::new(flow, used_as_condition)))
    }

    /// Bind `obj.field` to a tensor/tuple element or a struct field and
    /// return its declared type.
    pub(crate) fn resolve_dot_field(&self, dot: &mut DotAccess, obj_ty: &Ty, span: Span, hint: Option<&Ty>) -> Result<Ty> {
        let no_such_field = |field: &DotField| TypeError::NoSuchField { ty: obj_ty.clone(), field: field.to_string(), span };
        match (&dot.field, obj_ty.unwrap_alias()) {
            (DotField::Index(idx), Ty::Tensor(items)) => {
                let idx = *idx;
                let item = items
                    .get(idx as usize)
                    .ok_or_else(|| TypeError::IndexOutOfBounds { index: idx, ty: obj_ty.clone(), span })?;
                dot.target = Some(DotTarget::TensorIndex(idx));
                Ok(item.clone())
            }
            (DotField::Index(idx), Ty::Brackets(items)) => {
                let idx = *idx;
                let item = items
                    .get(idx as usize)
                    .ok_or_else(|| TypeError::IndexOutOfBounds { index: idx, ty: obj_ty.clone(), span })?;
                dot.target = Some(DotTarget::TupleIndex(idx));
                Ok(item.clone())
            }
            (DotField::Index(idx), Ty::Tuple) => {
                let idx = *idx;
                match hint.filter(|h| !h.is_unknown()) {
                    Some(hint) => {
                        dot.target = Some(DotTarget::TupleIndex(idx));
                        Ok(hint.clone())
                    }
                    None => Err(TypeError::UntypedTupleIndex { index: idx, span }),
                }
            }
            (DotField::Name(name), Ty::Struct(id, _)) => {
                let id = *id;
                match self.ctx.symbols.struct_data(id).find_field(name) {
                    Some((idx, field)) => {
                        let ty = field.declared_type.clone();
                        dot.target = Some(DotTarget::StructField(id, idx as u32));
                        Ok(ty)
                    }
                    None => Err(no_such_field(&dot.field)),
                }
            }
            (field, _) => Err(no_such_field(field)),
        }
    }

    // ── Assignment ─────────────────────────────────────────────────────

    fn infer_assign(&mut self, lhs: &mut Expr, rhs: &mut Expr, flow: FlowContext, used_as_condition: bool) -> Result<Inferred> {
        let flow = self.infer_lhs(lhs, flow)?;
        let declared = lhs.ty();
        let hint = (!declared.is_unknown()).then_some(declared);
        let mut flow = self.infer_expr(rhs, flow, false, hint.as_ref())?.out_flow;
        let rhs_ty = rhs.ty();
        self.assign_to_pattern(lhs, &rhs_ty, rhs.span, false, &mut flow)?;
        Ok((rhs_ty, ExprFlow::new(flow, used_as_condition)))
    }

    /// Infer an assignment target for its declared type, ignoring what the
    /// flow currently knows about it: `x = null` is fine for `x: int?` even
    /// where `x` is smart cast to `int`.
    fn infer_lhs(&mut self, lhs: &mut Expr, flow: FlowContext) -> Result<FlowContext> {
        let span = lhs.span;
        match &mut lhs.kind {
            ExprKind::LocalVar(id) | ExprKind::DeclareLocal(id) => {
                let ty = self.local_declared_type(*id);
                lhs.ty = Some(ty);
                Ok(flow)
            }
            ExprKind::Underscore => {
                lhs.ty = Some(Ty::Unknown);
                Ok(flow)
            }
            ExprKind::Paren(inner) => {
                let flow = self.infer_lhs(inner, flow)?;
                lhs.ty = Some(inner.ty());
                Ok(flow)
            }
            ExprKind::Tensor(items) | ExprKind::Brackets(items) => {
                let mut flow = flow;
                let mut tys = Vec::with_capacity(items.len());
                for item in items.iter_mut() {
                    flow = self.infer_lhs(item, flow)?;
                    tys.push(item.ty());
                }
                let ty = match &lhs.kind {
                    ExprKind::Brackets(_) => Ty::Brackets(tys),
                    _ => Ty::Tensor(tys),
                };
                lhs.ty = Some(ty);
                Ok(flow)
            }
            ExprKind::Dot(dot) => {
                let flow = self.infer_expr(&mut dot.obj, flow, false, None)?.out_flow;
                let obj_ty = dot.obj.ty();
                let ty = match (&dot.field, obj_ty.unwrap_alias()) {
                    // writing into an untyped tuple stores whatever is given
                    (DotField::Index(idx), Ty::Tuple) => {
                        dot.target = Some(DotTarget::TupleIndex(*idx));
                        Ty::Unknown
                    }
                    _ => self.resolve_dot_field(dot, &obj_ty, span, None)?,
                };
                lhs.ty = Some(ty);
                Ok(flow)
            }
            _ => Ok(self.infer_expr(lhs, flow, false, None)?.out_flow),
        }
    }

    /// Check `rhs_ty` against an assignment target (or declaration pattern)
    /// and record the smart casts the assignment establishes.
    pub(crate) fn assign_to_pattern(
        &mut self,
        lhs: &mut Expr,
        rhs_ty: &Ty,
        rhs_span: Span,
        is_declaration: bool,
        flow: &mut FlowContext,
    ) -> Result<()> {
        let lhs_span = lhs.span;
        let is_brackets = matches!(lhs.kind, ExprKind::Brackets(_));
        match &mut lhs.kind {
            ExprKind::Underscore => {
                lhs.ty = Some(rhs_ty.clone());
                Ok(())
            }
            ExprKind::Paren(inner) => {
                self.assign_to_pattern(inner, rhs_ty, rhs_span, is_declaration, flow)?;
                lhs.ty = Some(inner.ty());
                Ok(())
            }
            ExprKind::Tensor(items) | ExprKind::Brackets(items) => {
                let rhs_items = if is_brackets {
                    rhs_ty.unwrap_alias().try_as_brackets()
                } else {
                    rhs_ty.unwrap_alias().try_as_tensor()
                };
                let rhs_items: Vec<Ty> = match rhs_items {
                    Some(r) if r.len() == items.len() => r.to_vec(),
                    _ if rhs_ty.is_unknown() || rhs_ty.is_never() => vec![rhs_ty.clone(); items.len()],
                    _ => {
                        return Err(TypeError::PatternArity {
                            pattern_len: items.len(),
                            value_ty: rhs_ty.clone(),
                            span: lhs_span,
                        });
                    }
                };
                let mut tys = Vec::with_capacity(items.len());
                for (item, item_rhs) in items.iter_mut().zip(&rhs_items) {
                    self.assign_to_pattern(item, item_rhs, rhs_span, is_declaration, flow)?;
                    tys.push(item.ty());
                }
                lhs.ty = Some(if is_brackets { Ty::Brackets(tys) } else { Ty::Tensor(tys) });
                Ok(())
            }
            ExprKind::DeclareLocal(id) => {
                let id = *id;
                let local = self.local(id);
                let ty = match local.declared_type.clone() {
                    Some(declared) => {
                        let origin = ConstraintOrigin::VarDecl { binding_span: lhs_span };
                        self.check_assignable(&declared, rhs_ty, rhs_span, origin)?;
                        declared
                    }
                    None => {
                        if rhs_ty.is_null() {
                            return Err(TypeError::AlwaysNull { name: local.name.clone(), span: lhs_span });
                        }
                        self.local_mut(id).inferred_type = Some(rhs_ty.clone());
                        rhs_ty.clone()
                    }
                };
                flow.register_known_type(SinkExpression::local(id), calc_smart_cast_type_on_assignment(&ty, rhs_ty));
                lhs.ty = Some(ty);
                Ok(())
            }
            _ => {
                let declared = lhs.ty();
                let origin = if is_declaration {
                    ConstraintOrigin::VarDecl { binding_span: lhs_span }
                } else {
                    ConstraintOrigin::Assignment { lhs_span, rhs_span }
                };
                self.check_assignable(&declared, rhs_ty, rhs_span, origin)?;
                if let Some(sink) = extract_sink_expression(lhs) {
                    flow.register_known_type(sink, calc_smart_cast_type_on_assignment(&declared, rhs_ty));
                }
                Ok(())
            }
        }
    }

    /// `lhs op= rhs`: both sides are read, the result must fit `lhs`.
    fn infer_set_assign(
        &mut self,
        op: BinaryOp,
        lhs: &mut Expr,
        rhs: &mut Expr,
        span: Span,
        flow: FlowContext,
        used_as_condition: bool,
    ) -> Result<Inferred> {
        let flow = self.infer_expr(lhs, flow, false, None)?.out_flow;
        let lhs_ty = lhs.ty();
        let flow = self.infer_expr(rhs, flow, false, Some(&lhs_ty))?.out_flow;
        let rhs_ty = rhs.ty();
        let result = binary_result_type(op, &lhs_ty, &rhs_ty).ok_or_else(|| TypeError::OperatorMismatch {
            op: format!("{}=", op),
            lhs: lhs_ty.clone(),
            rhs: rhs_ty.clone(),
            span,
        })?;
        let origin = ConstraintOrigin::Assignment { lhs_span: lhs.span, rhs_span: rhs.span };
        self.check_assignable(&lhs_ty, &result, span, origin)?;
        Ok((lhs_ty, ExprFlow::new(flow, used_as_condition)))
    }

    // ── Operators ──────────────────────────────────────────────────────

    fn infer_unary(&mut self, op: UnaryOp, operand: &mut Expr, span: Span, flow: FlowContext, used_as_condition: bool) -> Result<Inferred> {
        let is_not = op == UnaryOp::Not;
        let after = self.infer_expr(operand, flow, used_as_condition && is_not, None)?;
        let operand_ty = operand.ty();
        let lenient = operand_ty.is_unknown() || operand_ty.is_never();
        let ty = match op {
            UnaryOp::Neg if operand_ty.is_integer() || lenient => Some(Ty::Int),
            UnaryOp::BitNot if operand_ty.is_bool() => Some(Ty::Bool),
            UnaryOp::BitNot if operand_ty.is_integer() || lenient => Some(Ty::Int),
            UnaryOp::Not if operand_ty.is_bool() || operand_ty.is_integer() || lenient => Some(Ty::Bool),
            _ => None,
        };
        let ty = ty.ok_or_else(|| TypeError::UnaryOperator { op: op.to_string(), operand: operand_ty, span })?;
        let after = if is_not && used_as_condition {
            after.swapped()
        } else {
            ExprFlow::new(after.out_flow, used_as_condition)
        };
        Ok((ty, after))
    }

    fn infer_binary(
        &mut self,
        op: BinaryOp,
        lhs: &mut Expr,
        rhs: &mut Expr,
        span: Span,
        flow: FlowContext,
        used_as_condition: bool,
    ) -> Result<Inferred> {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.infer_logical(op, lhs, rhs, span, flow, used_as_condition);
        }
        let flow = self.infer_expr(lhs, flow, false, None)?.out_flow;
        let lhs_ty = lhs.ty();
        let rhs_hint = (op.is_equality() && !lhs_ty.is_unknown()).then(|| lhs_ty.clone());
        let flow = self.infer_expr(rhs, flow, false, rhs_hint.as_ref())?.out_flow;
        let rhs_ty = rhs.ty();
        let ty = binary_result_type(op, &lhs_ty, &rhs_ty).ok_or_else(|| TypeError::OperatorMismatch {
            op: op.to_string(),
            lhs: lhs_ty.clone(),
            rhs: rhs_ty.clone(),
            span,
        })?;

        if op.is_equality() && used_as_condition {
            // `x == null` / `x != null` narrow the tracked side
            let narrowed = match (&lhs.kind, &rhs.kind) {
                (_, ExprKind::Null) => extract_sink_expression(lhs).map(|s| (s, lhs_ty.clone())),
                (ExprKind::Null, _) => extract_sink_expression(rhs).map(|s| (s, rhs_ty.clone())),
                _ => None,
            };
            if let Some((sink, current)) = narrowed {
                let without_null = current.without_null();
                let (true_ty, false_ty) = if op == BinaryOp::Eq {
                    (Ty::Null, without_null)
                } else {
                    (without_null, Ty::Null)
                };
                let mut true_flow = flow.clone();
                let mut false_flow = flow.clone();
                narrow_flow(&mut true_flow, Some(&sink), true_ty);
                narrow_flow(&mut false_flow, Some(&sink), false_ty);
                return Ok((ty, ExprFlow::with_branches(flow, true_flow, false_flow)));
            }
        }
        Ok((ty, ExprFlow::new(flow, used_as_condition)))
    }

    /// `&&` evaluates its right side only where the left one is true, `||`
    /// only where it is false; the branch flows keep that short circuit.
    fn infer_logical(
        &mut self,
        op: BinaryOp,
        lhs: &mut Expr,
        rhs: &mut Expr,
        span: Span,
        flow: FlowContext,
        used_as_condition: bool,
    ) -> Result<Inferred> {
        let after_lhs = self.infer_expr(lhs, flow, true, None)?;
        let (lhs_true, lhs_false) = after_lhs.into_branches();
        let rhs_flow = if op == BinaryOp::And { lhs_true.clone() } else { lhs_false.clone() };
        let after_rhs = self.infer_expr(rhs, rhs_flow, true, None)?;
        let ty = binary_result_type(op, &lhs.ty(), &rhs.ty()).ok_or_else(|| TypeError::OperatorMismatch {
            op: op.to_string(),
            lhs: lhs.ty(),
            rhs: rhs.ty(),
            span,
        })?;
        let (rhs_true, rhs_false) = after_rhs.into_branches();
        let after = if op == BinaryOp::And {
            let out = FlowContext::merge(lhs_false.clone(), FlowContext::merge(rhs_true.clone(), rhs_false.clone()));
            if used_as_condition {
                ExprFlow::with_branches(out, rhs_true, FlowContext::merge(lhs_false, rhs_false))
            } else {
                ExprFlow::new(out, false)
            }
        } else {
            let out = FlowContext::merge(lhs_true.clone(), FlowContext::merge(rhs_true.clone(), rhs_false.clone()));
            if used_as_condition {
                ExprFlow::with_branches(out, FlowContext::merge(lhs_true, rhs_true), rhs_false)
            } else {
                ExprFlow::new(out, false)
            }
        };
        Ok((ty, after))
    }

    #[allow(clippy::too_many_arguments)]
    fn infer_ternary(
        &mut self,
        cond: &mut Expr,
        when_true: &mut Expr,
        when_false: &mut Expr,
        span: Span,
        flow: FlowContext,
        used_as_condition: bool,
        hint: Option<&Ty>,
    ) -> Result<Inferred> {
        let (true_flow, false_flow) = self.infer_condition(cond, flow)?.into_branches();
        let after_true = self.infer_expr(when_true, true_flow, used_as_condition, hint)?;
        let after_false = self.infer_expr(when_false, false_flow, used_as_condition, hint)?;

        let mut unifier = TypeInferringUnifyStrategy::new();
        unifier.unify_with(&when_true.ty(), hint);
        unifier.unify_with(&when_false.ty(), hint);
        if let Some((first, second)) = unifier.conflict() {
            if hint.map_or(true, Ty::is_unknown) {
                return Err(TypeError::IncompatibleBranches { first: first.clone(), second: second.clone(), span });
            }
        }
        let ty = unifier.into_result().unwrap_or(Ty::Unknown);

        let out = FlowContext::merge(after_true.out_flow.clone(), after_false.out_flow.clone());
        let after = if used_as_condition {
            let t = FlowContext::merge(after_true.true_flow(), after_false.true_flow());
            let f = FlowContext::merge(after_true.false_flow(), after_false.false_flow());
            ExprFlow::with_branches(out, t, f)
        } else {
            ExprFlow::new(out, false)
        };
        Ok((ty, after))
    }

    // ── Casts and type tests ───────────────────────────────────────────

    fn infer_cast(&mut self, inner: &mut Expr, target: &mut Ty, span: Span, flow: FlowContext, used_as_condition: bool) -> Result<Inferred> {
        *target = resolve_type(self.ctx, target, span, None)?;
        let after = self.infer_expr(inner, flow, false, Some(&*target))?;
        let from = inner.ty();
        if !cast_allowed(&from, target) {
            return Err(TypeError::InvalidCast { from, to: target.clone(), span });
        }
        Ok((target.clone(), ExprFlow::new(after.out_flow, used_as_condition)))
    }

    fn infer_is_type(
        &mut self,
        inner: &mut Expr,
        target: &mut Ty,
        negated: bool,
        span: Span,
        flow: FlowContext,
        used_as_condition: bool,
    ) -> Result<Inferred> {
        *target = resolve_type(self.ctx, target, span, None)?;
        let out = self.infer_expr(inner, flow, false, None)?.out_flow;
        if !used_as_condition {
            return Ok((Ty::Bool, ExprFlow::new(out, false)));
        }
        let (mut true_ty, mut false_ty) = narrow_by_type(&inner.ty(), target);
        if negated {
            std::mem::swap(&mut true_ty, &mut false_ty);
        }
        let sink = extract_sink_expression(inner);
        let mut true_flow = out.clone();
        let mut false_flow = out.clone();
        narrow_flow(&mut true_flow, sink.as_ref(), true_ty);
        narrow_flow(&mut false_flow, sink.as_ref(), false_ty);
        Ok((Ty::Bool, ExprFlow::with_branches(out, true_flow, false_flow)))
    }

    // ── Match ──────────────────────────────────────────────────────────

    fn infer_match(&mut self, m: &mut Match, span: Span, flow: FlowContext, hint: Option<&Ty>) -> Result<Inferred> {
        let subject_flow = self.infer_expr(&mut m.subject, flow, false, None)?.out_flow;
        let subject_ty = m.subject.ty();
        let sink = extract_sink_expression(&m.subject);
        let is_type_match = m.arms.iter().any(|a| matches!(a.pattern, MatchPattern::Type(_)));
        let has_else = m.arms.iter().any(|a| matches!(a.pattern, MatchPattern::Else));
        let arm_hint = if m.is_statement { None } else { hint };

        let mut remaining = subject_ty.clone();
        let mut unifier = TypeInferringUnifyStrategy::new();
        let mut out: Option<FlowContext> = None;

        for arm in &mut m.arms {
            let mut arm_flow = subject_flow.clone();
            match &mut arm.pattern {
                MatchPattern::Type(t) => {
                    *t = resolve_type(self.ctx, t, arm.span, None)?;
                    if !subject_ty.is_unknown() && !subject_ty.has_variant(t) {
                        return Err(TypeError::MatchArmNotVariant {
                            subject: subject_ty.clone(),
                            arm: t.clone(),
                            span: arm.span,
                        });
                    }
                    remaining = remaining.subtract(t);
                    narrow_flow(&mut arm_flow, sink.as_ref(), t.clone());
                }
                MatchPattern::Value(value) => {
                    arm_flow = self.infer_expr(value, arm_flow, false, Some(&subject_ty))?.out_flow;
                }
                MatchPattern::Else => {
                    if is_type_match {
                        narrow_flow(&mut arm_flow, sink.as_ref(), remaining.clone());
                    }
                }
            }
            let (arm_ty, arm_out) = match &mut arm.body {
                ArmBody::Expr(e) => {
                    let arm_out = self.infer_expr(e, arm_flow, false, arm_hint)?.out_flow;
                    (e.ty(), arm_out)
                }
                ArmBody::Block(block) => {
                    let arm_out = self.process_block(block, arm_flow)?;
                    let ty = if arm_out.is_unreachable() { Ty::Never } else { Ty::Void };
                    (ty, arm_out)
                }
            };
            if !m.is_statement {
                unifier.unify_with(&arm_ty, arm_hint);
            }
            out = Some(match out {
                None => arm_out,
                Some(prev) => FlowContext::merge(prev, arm_out),
            });
        }

        if is_type_match && !has_else && !remaining.is_never() && !subject_ty.is_unknown() {
            return Err(TypeError::NonExhaustiveMatch { subject: subject_ty, missing: remaining, span });
        }
        if !is_type_match && !has_else && !m.is_statement {
            return Err(TypeError::MatchWithoutElse { span });
        }

        let mut out = out.unwrap_or_else(|| subject_flow.clone());
        if !is_type_match && !has_else {
            // no arm matched
            out = FlowContext::merge(out, subject_flow);
        }

        let ty = if m.is_statement {
            Ty::Void
        } else {
            if let Some((first, second)) = unifier.conflict() {
                if hint.map_or(true, Ty::is_unknown) {
                    return Err(TypeError::IncompatibleBranches { first: first.clone(), second: second.clone(), span });
                }
            }
            unifier.into_result().unwrap_or(Ty::Never)
        };
        Ok((ty, ExprFlow::new(out, false)))
    }

    // ── Struct literals ────────────────────────────────────────────────

    fn infer_struct_literal(
        &mut self,
        lit: &mut StructLiteral,
        span: Span,
        flow: FlowContext,
        used_as_condition: bool,
        hint: Option<&Ty>,
    ) -> Result<Inferred> {
        let target = match lit.struct_ty.clone() {
            Some(ty) => self.struct_from_type(&ty, span)?,
            None => self.struct_from_hint(hint, span)?,
        };
        let (id, flow) = match target {
            StructTarget::Concrete(id) => {
                let mut flow = flow;
                for init in &mut lit.fields {
                    let data = self.ctx.symbols.struct_data(id);
                    let Some((_, field)) = data.find_field(&init.name) else {
                        return Err(TypeError::UnknownField {
                            struct_name: data.name.clone(),
                            field: init.name.clone(),
                            span: init.span,
                        });
                    };
                    let field_ty = field.declared_type.clone();
                    flow = self.infer_expr(&mut init.value, flow, false, Some(&field_ty))?.out_flow;
                }
                (id, flow)
            }
            StructTarget::Generic(base) => self.infer_generic_struct_literal(base, lit, span, flow, hint)?,
        };
        self.check_struct_fields(id, lit, span)?;
        self.ctx.ensure_struct_ready(id)?;
        lit.resolved = Some(id);
        let name = self.ctx.symbols.struct_data(id).name.clone();
        Ok((Ty::Struct(id, name), ExprFlow::new(flow, used_as_condition)))
    }

    fn struct_from_type(&mut self, ty: &Ty, span: Span) -> Result<StructTarget> {
        match ty.unwrap_alias() {
            Ty::Struct(id, _) if self.ctx.symbols.struct_data(*id).is_generic() => Ok(StructTarget::Generic(*id)),
            Ty::Struct(id, _) => Ok(StructTarget::Concrete(*id)),
            app @ Ty::GenericApp(GenericBase::Struct(_), _, _) => match resolve_type(self.ctx, app, span, None)? {
                Ty::Struct(id, _) => Ok(StructTarget::Concrete(id)),
                _ => Err(TypeError::UntypedStructLiteral { span }),
            },
            _ => Err(TypeError::UntypedStructLiteral { span }),
        }
    }

    /// `{ x: 1 }` takes its struct from the expected type, also when that
    /// is a nullable struct.
    fn struct_from_hint(&self, hint: Option<&Ty>, span: Span) -> Result<StructTarget> {
        let Some(hint) = hint else {
            return Err(TypeError::UntypedStructLiteral { span });
        };
        match hint.unwrap_alias() {
            Ty::Struct(id, _) => Ok(StructTarget::Concrete(*id)),
            Ty::Union(variants) => {
                let mut structs = variants.iter().filter_map(Ty::try_as_struct);
                match (structs.next(), structs.next()) {
                    (Some(id), None) => Ok(StructTarget::Concrete(id)),
                    _ => Err(TypeError::UntypedStructLiteral { span }),
                }
            }
            _ => Err(TypeError::UntypedStructLiteral { span }),
        }
    }

    /// `Wrapper { value: 1 }` for `struct Wrapper<T>`: deduce `T` from the
    /// field values like call arguments, then from the expected type, then
    /// from defaults.
    fn infer_generic_struct_literal(
        &mut self,
        base: StructId,
        lit: &mut StructLiteral,
        span: Span,
        mut flow: FlowContext,
        hint: Option<&Ty>,
    ) -> Result<(StructId, FlowContext)> {
        let data = self.ctx.symbols.struct_data(base);
        let struct_name = data.name.clone();
        let decl = data.generics.clone().unwrap_or_default();
        let mut deducer = GenericSubstitutionsDeducing::new(&decl);

        for init in &mut lit.fields {
            let data = self.ctx.symbols.struct_data(base);
            let Some((_, field)) = data.find_field(&init.name) else {
                return Err(TypeError::UnknownField {
                    struct_name: struct_name.clone(),
                    field: init.name.clone(),
                    span: init.span,
                });
            };
            let param_ty = field.declared_type.clone();
            let field_hint = deducer.replace_known(&param_ty);
            let field_hint = (!field_hint.has_generic_inside()).then_some(field_hint);
            flow = self.infer_expr(&mut init.value, flow, false, field_hint.as_ref())?.out_flow;
            deducer.consider_next_condition(self.ctx.symbols, &param_ty, &init.value.ty());
        }

        if deducer.first_undeduced().is_some() {
            if let Some(hint) = hint {
                let self_ty = Ty::GenericApp(
                    GenericBase::Struct(base),
                    struct_name.clone(),
                    decl.items.iter().map(|i| Ty::generic(i.name.clone())).collect(),
                );
                deducer.consider_next_condition(self.ctx.symbols, &self_ty, hint);
            }
        }
        deducer.apply_defaults();
        if let Some(param) = deducer.first_undeduced() {
            return Err(TypeError::CannotDeduce { fun: struct_name, param: param.to_string(), span });
        }
        let id = instantiate::instantiate_struct(self.ctx, base, deducer.into_substitutions(), span)?;
        Ok((id, flow))
    }

    fn check_struct_fields(&self, id: StructId, lit: &StructLiteral, span: Span) -> Result<()> {
        let data = self.ctx.symbols.struct_data(id);
        for init in &lit.fields {
            let Some((_, field)) = data.find_field(&init.name) else {
                return Err(TypeError::UnknownField {
                    struct_name: data.name.clone(),
                    field: init.name.clone(),
                    span: init.span,
                });
            };
            let origin = ConstraintOrigin::FieldInit { struct_name: data.name.clone(), field: field.name.clone() };
            self.check_assignable(&field.declared_type, &init.value.ty(), init.value.span, origin)?;
        }
        for field in &data.fields {
            if field.default_value.is_none() && !lit.fields.iter().any(|f| f.name == field.name) {
                return Err(TypeError::MissingField {
                    struct_name: data.name.clone(),
                    field: field.name.clone(),
                    span,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullable_narrows_on_assignment() {
        let declared = Ty::nullable(Ty::Int);
        assert_eq!(calc_smart_cast_type_on_assignment(&declared, &Ty::Int), Ty::Int);
        assert_eq!(calc_smart_cast_type_on_assignment(&declared, &Ty::Null), Ty::Null);
        assert_eq!(calc_smart_cast_type_on_assignment(&declared, &Ty::int_n(8)), Ty::Int);
    }

    #[test]
    fn tensor_with_nullable_items_keeps_declared_type() {
        let declared = Ty::Tensor(vec![Ty::nullable(Ty::Int), Ty::nullable(Ty::Int)]);
        let rhs = Ty::Tensor(vec![Ty::Int, Ty::Null]);
        assert_eq!(calc_smart_cast_type_on_assignment(&declared, &rhs), declared);
    }

    #[test]
    fn wide_union_narrows_to_subset() {
        let declared = Ty::union([Ty::Int, Ty::Slice, Ty::Builder]);
        let rhs = Ty::union([Ty::Int, Ty::Slice]);
        assert_eq!(calc_smart_cast_type_on_assignment(&declared, &rhs), rhs);
    }

    #[test]
    fn type_test_narrowing() {
        let u = Ty::union([Ty::Int, Ty::Slice]);
        assert_eq!(narrow_by_type(&u, &Ty::Int), (Ty::Int, Ty::Slice));
        assert_eq!(narrow_by_type(&Ty::Int, &Ty::Int), (Ty::Int, Ty::Never));
        assert_eq!(narrow_by_type(&Ty::Int, &Ty::Slice), (Ty::Never, Ty::Int));
        assert_eq!(narrow_by_type(&u, &Ty::Cell), (Ty::Never, u.clone()));
    }

    #[test]
    fn operator_typing() {
        assert_eq!(binary_result_type(BinaryOp::Add, &Ty::int_n(8), &Ty::Int), Some(Ty::Int));
        assert_eq!(binary_result_type(BinaryOp::BitAnd, &Ty::Bool, &Ty::Bool), Some(Ty::Bool));
        assert_eq!(binary_result_type(BinaryOp::Lt, &Ty::Int, &Ty::Slice), None);
        assert_eq!(binary_result_type(BinaryOp::Eq, &Ty::nullable(Ty::Cell), &Ty::Null), Some(Ty::Bool));
        assert_eq!(binary_result_type(BinaryOp::Eq, &Ty::Cell, &Ty::Cell), None);
    }

    #[test]
    fn casts() {
        assert!(cast_allowed(&Ty::Bool, &Ty::Int));
        assert!(cast_allowed(&Ty::nullable(Ty::Int), &Ty::Int));
        assert!(cast_allowed(&Ty::Int, &Ty::uint_n(8)));
        assert!(!cast_allowed(&Ty::Slice, &Ty::Int));
    }
}
