//! Calls: choosing the callee, matching arguments to parameters, deducing
//! generic parameters and binding the call to a concrete instantiation.

use tolk_ast::ast::{Arg, Call, DotField, DotTarget, Expr, ExprKind};
use tolk_ast::{FunctionId, GenericsDeclaration, Ty};
use tolk_common::Span;

use super::expr::{calc_smart_cast_type_on_assignment, dot_sink, Inferred};
use super::{FunctionInferrer, Result};
use crate::error::{ConstraintOrigin, TypeError};
use crate::flow::{extract_sink_expression, ExprFlow, FlowContext, UnreachableKind};
use crate::generics::GenericSubstitutionsDeducing;
use crate::instantiate;
use crate::resolve::resolve_type;

/// Name of the builtin that asserts the inferred type of its argument.
const EXPECT_TYPE: &str = "__expect_type";

#[derive(Clone, Debug)]
struct ParamSig {
    name: String,
    ty: Ty,
    is_mutate: bool,
    has_default: bool,
}

/// What a call needs to know about its callee, read once up front.
#[derive(Clone, Debug)]
struct CalleeSignature {
    name: String,
    /// All parameters, `self` first for methods.
    params: Vec<ParamSig>,
    generics: Option<GenericsDeclaration>,
    declared_return: Option<Ty>,
    is_generic: bool,
}

impl FunctionInferrer<'_, '_> {
    fn callee_signature(&self, fun: FunctionId) -> CalleeSignature {
        let data = self.ctx.symbols.function(fun);
        CalleeSignature {
            name: data.name.clone(),
            params: data
                .params()
                .iter()
                .map(|p| ParamSig {
                    name: p.name.clone(),
                    ty: p.declared_or_inferred().cloned().unwrap_or(Ty::Unknown),
                    is_mutate: p.is_mutate,
                    has_default: p.default_value.is_some(),
                })
                .collect(),
            generics: data.generics.clone(),
            declared_return: data.declared_return_type.clone(),
            is_generic: data.is_generic(),
        }
    }

    pub(crate) fn infer_call(
        &mut self,
        call: &mut Call,
        span: Span,
        flow: FlowContext,
        used_as_condition: bool,
        hint: Option<&Ty>,
    ) -> Result<Inferred> {
        let Call { callee, args, fun, has_receiver } = call;
        let callee_span = callee.span;

        let (bound, ty, mut flow) = match &mut callee.kind {
            ExprKind::FunctionRef(fun_ref) => {
                let explicit = fun_ref.type_args.clone();
                let (target, ty, flow) = self.infer_bound_call(fun_ref.fun, None, args, explicit, span, flow, hint)?;
                if target != fun_ref.fun {
                    fun_ref.resolved = Some(target);
                }
                (Some(target), ty, flow)
            }
            ExprKind::Dot(dot) if matches!(dot.field, DotField::Name(_)) => {
                let flow = self.infer_expr(&mut dot.obj, flow, false, None)?.out_flow;
                let obj_ty = dot.obj.ty();
                let name = dot.field.to_string();
                if self.callable_field(&obj_ty, &name) {
                    // `obj.onDone(..)` where `onDone` is a field holding a function
                    let field_ty = self.resolve_dot_field(dot, &obj_ty, callee_span, None)?;
                    let field_ty = dot_sink(dot)
                        .and_then(|s| flow.smart_cast(&s).cloned())
                        .unwrap_or(field_ty);
                    let (ty, flow) = self.infer_value_call(&field_ty, args, span, flow)?;
                    (None, ty, flow)
                } else {
                    let method = self.find_method(&obj_ty, &name, callee_span)?;
                    let explicit = dot.type_args.clone();
                    let (target, ty, flow) =
                        self.infer_bound_call(method, Some(&mut dot.obj), args, explicit, span, flow, hint)?;
                    dot.target = Some(DotTarget::Method(target));
                    *has_receiver = true;
                    (Some(target), ty, flow)
                }
            }
            _ => {
                let flow = self.infer_expr(callee, flow, false, None)?.out_flow;
                let callee_ty = callee.ty();
                let (ty, flow) = self.infer_value_call(&callee_ty, args, span, flow)?;
                (None, ty, flow)
            }
        };

        if let Some(target) = bound {
            callee.ty = Some(self.callable_type_of(target));
            *fun = Some(target);
        } else if callee.ty.is_none() {
            callee.ty = Some(Ty::Unknown);
        }
        if ty.is_never() {
            flow.mark_unreachable(UnreachableKind::CallNeverReturns);
        }
        Ok((ty, ExprFlow::new(flow, used_as_condition)))
    }

    fn callable_field(&self, obj_ty: &Ty, name: &str) -> bool {
        let Some(id) = obj_ty.try_as_struct() else {
            return false;
        };
        self.ctx
            .symbols
            .struct_data(id)
            .find_field(name)
            .is_some_and(|(_, f)| f.declared_type.unwrap_alias().try_as_callable().is_some())
    }

    // ── Method lookup ──────────────────────────────────────────────────

    /// Pick the method `name` for a receiver of type `obj_ty`.
    ///
    /// Candidates are tried in order: a receiver equal to `obj_ty`, one
    /// accepting it, a generic receiver like `Wrapper<T>` that deduces to
    /// it, and finally a bare `T` receiver.
    fn find_method(&self, obj_ty: &Ty, name: &str, span: Span) -> Result<FunctionId> {
        let symbols = &*self.ctx.symbols;
        let candidates: Vec<(FunctionId, Ty)> = symbols
            .methods_named(name)
            .iter()
            .filter_map(|&id| {
                let data = symbols.function(id);
                let has_self = data.params().first().is_some_and(|p| p.name == "self");
                let receiver = data.receiver_type.clone()?;
                has_self.then_some((id, receiver))
            })
            .collect();

        let exact = candidates.iter().find(|(_, r)| !r.has_generic_inside() && r == obj_ty);
        let accepting = || {
            candidates
                .iter()
                .find(|(_, r)| !r.has_generic_inside() && r.can_rhs_be_assigned(obj_ty) && !obj_ty.is_unknown())
        };
        let deduced = || {
            candidates.iter().find(|(id, r)| {
                if !r.has_generic_inside() || matches!(r, Ty::Generic(_)) {
                    return false;
                }
                let Some(decl) = &symbols.function(*id).generics else {
                    return false;
                };
                let mut deducer = GenericSubstitutionsDeducing::new(decl);
                deducer.consider_next_condition(symbols, r, obj_ty);
                // `Wrapper<T>` only deduces from instances of `Wrapper`
                let substituted = deducer.replace_known(r);
                !substituted.has_generic_inside()
                    && (matches!(substituted, Ty::GenericApp(..)) || substituted.can_rhs_be_assigned(obj_ty))
            })
        };
        let any_receiver = || candidates.iter().find(|(_, r)| matches!(r, Ty::Generic(_)));

        if let Some((id, _)) = exact.or_else(accepting).or_else(deduced).or_else(any_receiver) {
            tracing::trace!(method = name, receiver = %obj_ty, "method resolved");
            return Ok(*id);
        }

        let suggestion = candidates
            .first()
            .map(|(_, r)| format!("`{}` is declared for `{}`", name, r));
        Err(TypeError::NoSuchMethod { ty: obj_ty.clone(), method: name.to_string(), suggestion, span })
    }

    // ── Bound calls ────────────────────────────────────────────────────

    /// Explicit type arguments as substitutions, after the ones coming from
    /// the receiver.
    fn explicit_deducer(
        &mut self,
        sig: &CalleeSignature,
        type_args: Option<Vec<Ty>>,
        span: Span,
    ) -> Result<Option<GenericSubstitutionsDeducing>> {
        let Some(decl) = sig.generics.as_ref().filter(|_| sig.is_generic) else {
            if let Some(type_args) = type_args {
                return Err(TypeError::GenericArgsCount {
                    name: sig.name.clone(),
                    expected: 0,
                    found: type_args.len(),
                    span,
                });
            }
            return Ok(None);
        };
        let Some(type_args) = type_args else {
            return Ok(Some(GenericSubstitutionsDeducing::new(decl)));
        };
        let expected = decl.len() - decl.n_from_receiver;
        if type_args.len() != expected {
            return Err(TypeError::GenericArgsCount {
                name: sig.name.clone(),
                expected,
                found: type_args.len(),
                span,
            });
        }
        let mut resolved = Vec::with_capacity(type_args.len());
        for ty in &type_args {
            resolved.push(resolve_type(self.ctx, ty, span, None)?);
        }
        Ok(Some(GenericSubstitutionsDeducing::with_explicit(decl, decl.n_from_receiver, resolved)))
    }

    /// `f<int>` as a value.
    pub(crate) fn instantiate_explicit(&mut self, fun: FunctionId, type_args: Vec<Ty>, span: Span) -> Result<FunctionId> {
        let sig = self.callee_signature(fun);
        let Some(mut deducer) = self.explicit_deducer(&sig, Some(type_args), span)? else {
            return Ok(fun);
        };
        deducer.apply_defaults();
        if let Some(param) = deducer.first_undeduced() {
            return Err(TypeError::CannotDeduce { fun: sig.name, param: param.to_string(), span });
        }
        instantiate::instantiate_function(self.ctx, fun, deducer.into_substitutions(), span)
    }

    /// A call to a known function or method: returns the function actually
    /// called (an instantiation for generic callees), the call's type and
    /// the flow after the arguments.
    #[allow(clippy::too_many_arguments)]
    fn infer_bound_call(
        &mut self,
        fun: FunctionId,
        receiver: Option<&mut Box<Expr>>,
        args: &mut [Arg],
        type_args: Option<Vec<Ty>>,
        span: Span,
        mut flow: FlowContext,
        hint: Option<&Ty>,
    ) -> Result<(FunctionId, Ty, FlowContext)> {
        let sig = self.callee_signature(fun);
        let n_implicit = usize::from(receiver.is_some());
        let user_params = &sig.params[n_implicit.min(sig.params.len())..];

        let max = user_params.len();
        let min = user_params.iter().take_while(|p| !p.has_default).count();
        if args.len() < min || args.len() > max {
            return Err(TypeError::ArityMismatch { name: sig.name.clone(), min, max, found: args.len(), span });
        }

        let mut deducer = self.explicit_deducer(&sig, type_args, span)?;

        if let (Some(receiver), Some(deducer), Some(self_param)) = (&receiver, &mut deducer, sig.params.first()) {
            deducer.consider_next_condition(self.ctx.symbols, &self_param.ty, &receiver.ty());
        }

        for (arg, param) in args.iter_mut().zip(user_params) {
            match (param.is_mutate, arg.is_mutate) {
                (true, false) => {
                    return Err(TypeError::MissingMutate { param: param.name.clone(), span: arg.expr.span });
                }
                (false, true) => {
                    return Err(TypeError::UnexpectedMutate { param: param.name.clone(), span: arg.expr.span });
                }
                _ => {}
            }
            let arg_hint = match &deducer {
                Some(deducer) => {
                    let known = deducer.replace_known(&param.ty);
                    (!known.has_generic_inside()).then_some(known)
                }
                None => Some(param.ty.clone()),
            };
            let arg_hint = arg_hint.filter(|h| !h.is_unknown());
            flow = self.infer_expr(&mut arg.expr, flow, false, arg_hint.as_ref())?.out_flow;
            if let Some(deducer) = &mut deducer {
                deducer.consider_next_condition(self.ctx.symbols, &param.ty, &arg.expr.ty());
            }
        }

        let target = match deducer {
            Some(mut deducer) => {
                if deducer.first_undeduced().is_some() {
                    if let (Some(hint), Some(ret)) = (hint, &sig.declared_return) {
                        deducer.consider_next_condition(self.ctx.symbols, ret, hint);
                    }
                }
                deducer.apply_defaults();
                if let Some(param) = deducer.first_undeduced() {
                    return Err(TypeError::CannotDeduce { fun: sig.name.clone(), param: param.to_string(), span });
                }
                instantiate::instantiate_function(self.ctx, fun, deducer.into_substitutions(), span)?
            }
            None => fun,
        };

        // check everything against the concrete signature
        let bound = if target == fun { sig.clone() } else { self.callee_signature(target) };
        if let (Some(receiver), Some(self_param)) = (&receiver, bound.params.first()) {
            let origin = ConstraintOrigin::Receiver { fun: bound.name.clone(), call_site: span };
            self.check_assignable(&self_param.ty, &receiver.ty(), receiver.span, origin)?;
        }
        let bound_user_params = &bound.params[n_implicit.min(bound.params.len())..];
        for (idx, (arg, param)) in args.iter().zip(bound_user_params).enumerate() {
            let origin = ConstraintOrigin::FnArg { fun: bound.name.clone(), param_idx: idx, call_site: span };
            self.check_assignable(&param.ty, &arg.expr.ty(), arg.expr.span, origin)?;
        }

        // a `mutate` parameter may be written by the callee
        for (arg, param) in args.iter().zip(bound_user_params) {
            if param.is_mutate {
                self.register_mutated(&arg.expr, &param.ty, &mut flow)?;
            }
        }
        if let (Some(receiver), Some(self_param)) = (&receiver, bound.params.first()) {
            if self_param.is_mutate {
                self.register_mutated(receiver, &self_param.ty, &mut flow)?;
            }
        }

        self.ctx.ensure_function_inferred(target, span)?;
        if sig.name == EXPECT_TYPE {
            self.check_expect_type(args, span)?;
        }

        let data = self.ctx.symbols.function(target);
        let ty = match (&receiver, data.returns_self) {
            (Some(receiver), true) => receiver.ty(),
            _ => data.return_type().cloned().unwrap_or(Ty::Unknown),
        };
        Ok((target, ty, flow))
    }

    /// After a call, an argument passed as `mutate` holds some value of the
    /// parameter's type.
    fn register_mutated(&self, arg: &Expr, param_ty: &Ty, flow: &mut FlowContext) -> Result<()> {
        let Some(sink) = extract_sink_expression(arg) else {
            return Ok(());
        };
        let ty = if sink.is_root() {
            let declared = self.local_declared_type(sink.var);
            let origin = ConstraintOrigin::Assignment { lhs_span: arg.span, rhs_span: arg.span };
            self.check_assignable(&declared, param_ty, arg.span, origin)?;
            calc_smart_cast_type_on_assignment(&declared, param_ty)
        } else {
            param_ty.clone()
        };
        flow.register_known_type(sink, ty);
        Ok(())
    }

    /// `__expect_type(expr, "int?")` fails unless `expr` has exactly that
    /// type as printed.
    fn check_expect_type(&self, args: &[Arg], span: Span) -> Result<()> {
        let [value, expected] = args else {
            return Ok(());
        };
        let ExprKind::Str(expected) = &expected.expr.kind else {
            return Ok(());
        };
        let found = value.expr.ty();
        if found.to_string() != *expected {
            return Err(TypeError::ExpectTypeFailed { expected: expected.clone(), found, span });
        }
        Ok(())
    }

    // ── Calls of values ────────────────────────────────────────────────

    /// Calling something of a callable type: no defaults, no generics, no
    /// `mutate`.
    fn infer_value_call(&mut self, callee_ty: &Ty, args: &mut [Arg], span: Span, mut flow: FlowContext) -> Result<(Ty, FlowContext)> {
        let Some((params, ret)) = callee_ty.try_as_callable() else {
            if callee_ty.is_unknown() {
                for arg in args.iter_mut() {
                    flow = self.infer_expr(&mut arg.expr, flow, false, None)?.out_flow;
                }
                return Ok((Ty::Unknown, flow));
            }
            return Err(TypeError::NotAFunction { ty: callee_ty.clone(), span });
        };
        let (params, ret) = (params.to_vec(), ret.clone());
        if params.len() != args.len() {
            return Err(TypeError::ArityMismatch {
                name: callee_ty.to_string(),
                min: params.len(),
                max: params.len(),
                found: args.len(),
                span,
            });
        }
        for (idx, (arg, param)) in args.iter_mut().zip(&params).enumerate() {
            if arg.is_mutate {
                return Err(TypeError::UnexpectedMutate { param: format!("#{}", idx + 1), span: arg.expr.span });
            }
            flow = self.infer_expr(&mut arg.expr, flow, false, Some(param))?.out_flow;
            let origin = ConstraintOrigin::FnArg { fun: callee_ty.to_string(), param_idx: idx, call_site: span };
            self.check_assignable(param, &arg.expr.ty(), arg.expr.span, origin)?;
        }
        Ok((ret, flow))
    }
}
