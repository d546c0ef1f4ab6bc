//! Statements: sequencing, branches, the two-pass loop approximation,
//! returns, throws and try/catch.

use tolk_ast::ast::{Block, Expr, ExprKind, Stmt, StmtKind};
use tolk_ast::{LocalVarId, Ty};
use tolk_common::Span;

use super::{FunctionInferrer, Result};
use crate::error::{ConstraintOrigin, TypeError, TypeWarning};
use crate::flow::{FlowContext, SinkExpression, UnreachableKind};

impl FunctionInferrer<'_, '_> {
    /// Thread `flow` through the statements of `block`. Statements after an
    /// unreachable point are still inferred; the first of them is recorded.
    pub(crate) fn process_block(&mut self, block: &mut Block, mut flow: FlowContext) -> Result<FlowContext> {
        for stmt in &mut block.stmts {
            if flow.is_unreachable() && !matches!(stmt.kind, StmtKind::Empty) && block.first_unreachable.is_none() {
                block.first_unreachable = Some(stmt.span);
                if self.ctx.options.warn_unreachable {
                    self.ctx.warn(TypeWarning::UnreachableCode { span: stmt.span });
                }
            }
            flow = self.process_stmt(stmt, flow)?;
        }
        Ok(flow)
    }

    pub(crate) fn process_stmt(&mut self, stmt: &mut Stmt, flow: FlowContext) -> Result<FlowContext> {
        let span = stmt.span;
        match &mut stmt.kind {
            StmtKind::Block(block) => self.process_block(block, flow),
            StmtKind::Expr(expr) => {
                let mut out = self.infer_expr(expr, flow, false, None)?.out_flow;
                if expr.ty().is_never() && !out.is_unreachable() {
                    out.mark_unreachable(UnreachableKind::CallNeverReturns);
                }
                Ok(out)
            }
            StmtKind::VarDecl { pattern, init } => self.process_var_decl(pattern, init.as_mut(), flow),
            StmtKind::Return(value) => self.process_return(value.as_mut(), span, flow),
            StmtKind::If { cond, then_body, else_body } => {
                let (true_flow, false_flow) = self.infer_condition(cond, flow)?.into_branches();
                let then_out = self.process_block(then_body, true_flow)?;
                let else_out = match else_body {
                    Some(else_body) => self.process_block(else_body, false_flow)?,
                    None => false_flow,
                };
                Ok(FlowContext::merge(then_out, else_out))
            }
            StmtKind::While { cond, body } => self.process_while(cond, body, flow),
            StmtKind::DoWhile { body, cond } => self.process_do_while(body, cond, flow),
            StmtKind::Repeat { count, body } => self.process_repeat(count, body, flow),
            StmtKind::Throw { code, arg } => {
                let mut out = self.infer_expr(code, flow, false, None)?.out_flow;
                self.check_integer(code, "throw")?;
                if let Some(arg) = arg {
                    out = self.infer_expr(arg, out, false, None)?.out_flow;
                }
                out.mark_unreachable(UnreachableKind::ThrowStatement);
                Ok(out)
            }
            StmtKind::Assert { cond, code } => {
                let after = self.infer_condition(cond, flow)?;
                let (true_flow, false_flow) = after.into_branches();
                self.infer_expr(code, false_flow, false, None)?;
                self.check_integer(code, "assert")?;
                Ok(true_flow)
            }
            StmtKind::TryCatch { try_body, catch_vars, catch_body } => {
                let before_try = flow.clone();
                let try_end = self.process_block(try_body, flow)?;
                let mut catch_flow = before_try;
                let catch_types = [Ty::Int, Ty::Unknown];
                for (var, ty) in catch_vars.iter().zip(catch_types) {
                    if let Some(var) = var {
                        self.bind_catch_var(*var, ty, &mut catch_flow);
                    }
                }
                let catch_end = self.process_block(catch_body, catch_flow)?;
                Ok(FlowContext::merge(try_end, catch_end))
            }
            StmtKind::Empty => Ok(flow),
        }
    }

    fn check_integer(&self, expr: &Expr, what: &str) -> Result<()> {
        let ty = expr.ty();
        if ty.is_integer() || ty.is_unknown() || ty.is_never() {
            Ok(())
        } else {
            Err(TypeError::Mismatch {
                expected: Ty::Int,
                found: ty,
                origin: ConstraintOrigin::Operand { what: what.to_string() },
                span: expr.span,
            })
        }
    }

    fn bind_catch_var(&mut self, var: LocalVarId, ty: Ty, flow: &mut FlowContext) {
        let local = self.local_mut(var);
        if local.declared_type.is_none() {
            local.inferred_type = Some(ty.clone());
        }
        let ty = local.declared_type.clone().unwrap_or(ty);
        flow.register_known_type(SinkExpression::local(var), ty);
    }

    // ── Declarations and returns ───────────────────────────────────────

    fn process_var_decl(&mut self, pattern: &mut Expr, init: Option<&mut Expr>, flow: FlowContext) -> Result<FlowContext> {
        let Some(init) = init else {
            // `var x: int;` stays unassigned until written
            self.declare_uninitialized(pattern)?;
            return Ok(flow);
        };
        let hint = self.declared_pattern_type(pattern);
        let mut flow = self.infer_expr(init, flow, false, hint.as_ref())?.out_flow;
        let rhs_ty = init.ty();
        self.assign_to_pattern(pattern, &rhs_ty, init.span, true, &mut flow)?;
        Ok(flow)
    }

    fn declare_uninitialized(&mut self, pattern: &mut Expr) -> Result<()> {
        match &mut pattern.kind {
            ExprKind::DeclareLocal(id) => {
                let local = self.local(*id);
                match local.declared_type.clone() {
                    Some(ty) => {
                        pattern.ty = Some(ty);
                        Ok(())
                    }
                    None => Err(TypeError::MissingTypeAnnotation { name: local.name.clone(), span: pattern.span }),
                }
            }
            ExprKind::Tensor(items) | ExprKind::Brackets(items) => {
                let mut tys = Vec::with_capacity(items.len());
                for item in items.iter_mut() {
                    self.declare_uninitialized(item)?;
                    tys.push(item.ty());
                }
                pattern.ty = Some(match &pattern.kind {
                    ExprKind::Brackets(_) => Ty::Brackets(tys),
                    _ => Ty::Tensor(tys),
                });
                Ok(())
            }
            _ => {
                pattern.ty = Some(Ty::Unknown);
                Ok(())
            }
        }
    }

    /// The type a declaration pattern expects from its initializer, if the
    /// pattern declares any types at all.
    fn declared_pattern_type(&self, pattern: &Expr) -> Option<Ty> {
        match &pattern.kind {
            ExprKind::DeclareLocal(id) => self.local(*id).declared_type.clone(),
            ExprKind::Paren(inner) => self.declared_pattern_type(inner),
            ExprKind::Tensor(items) | ExprKind::Brackets(items) => {
                let hints: Vec<Option<Ty>> = items.iter().map(|i| self.declared_pattern_type(i)).collect();
                if hints.iter().all(Option::is_none) {
                    return None;
                }
                let tys = hints.into_iter().map(|h| h.unwrap_or(Ty::Unknown)).collect();
                Some(match &pattern.kind {
                    ExprKind::Brackets(_) => Ty::Brackets(tys),
                    _ => Ty::Tensor(tys),
                })
            }
            _ => None,
        }
    }

    fn process_return(&mut self, value: Option<&mut Expr>, span: Span, flow: FlowContext) -> Result<FlowContext> {
        let fun = self.owner();
        let declared = self.ctx.symbols.function(fun).declared_return_type.clone();
        let mut out = match value {
            Some(value) => {
                let hint = declared.clone().or_else(|| self.return_unifier.result().cloned());
                let out = self.infer_expr(value, flow, false, hint.as_ref())?.out_flow;
                let ty = value.ty();
                match &declared {
                    Some(declared) => {
                        let origin = ConstraintOrigin::Return { fun: self.owner_name(), return_span: span };
                        self.check_assignable(declared, &ty, value.span, origin)?;
                    }
                    None => {
                        self.return_unifier.unify_with(&ty, None);
                    }
                }
                out
            }
            None => {
                match &declared {
                    Some(declared) if !declared.is_void() && !declared.is_unknown() => {
                        return Err(TypeError::Mismatch {
                            expected: declared.clone(),
                            found: Ty::Void,
                            origin: ConstraintOrigin::Return { fun: self.owner_name(), return_span: span },
                            span,
                        });
                    }
                    Some(_) => {}
                    None => {
                        self.return_unifier.unify_with(&Ty::Void, None);
                    }
                }
                flow
            }
        };
        out.mark_unreachable(UnreachableKind::ReturnStatement);
        Ok(out)
    }

    // ── Loops ──────────────────────────────────────────────────────────
    //
    // Every loop body is inferred twice: once from the entry flow to see
    // what one iteration changes, then again from the entry flow merged
    // with that result. This is an approximation, not a fixed point.

    fn process_while(&mut self, cond: &mut Expr, body: &mut Block, flow: FlowContext) -> Result<FlowContext> {
        let loop_entry = flow.clone();
        let after_cond = self.infer_condition(cond, flow)?;
        let body_out = self.process_block(body, after_cond.true_flow())?;

        tracing::trace!("while: second pass");
        let loop_entry = FlowContext::merge(loop_entry, body_out);
        let after_cond2 = self.infer_condition(cond, loop_entry)?;
        let (true_flow, false_flow) = after_cond2.into_branches();
        self.process_block(body, true_flow)?;
        Ok(false_flow)
    }

    fn process_do_while(&mut self, body: &mut Block, cond: &mut Expr, flow: FlowContext) -> Result<FlowContext> {
        let body_out = self.process_block(body, flow.clone())?;
        let after_cond = self.infer_condition(cond, body_out)?;

        tracing::trace!("do-while: second pass");
        let loop_entry = FlowContext::merge(flow, after_cond.true_flow());
        let body_out = self.process_block(body, loop_entry)?;
        let after_cond2 = self.infer_condition(cond, body_out)?;
        Ok(after_cond2.false_flow())
    }

    fn process_repeat(&mut self, count: &mut Expr, body: &mut Block, flow: FlowContext) -> Result<FlowContext> {
        let flow = self.infer_expr(count, flow, false, None)?.out_flow;
        self.check_integer(count, "repeat")?;
        let body_out = self.process_block(body, flow.clone())?;

        tracing::trace!("repeat: second pass");
        let flow = FlowContext::merge(flow, body_out);
        let body_out = self.process_block(body, flow.clone())?;
        Ok(FlowContext::merge(flow, body_out))
    }
}
