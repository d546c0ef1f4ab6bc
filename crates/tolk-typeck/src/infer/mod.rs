//! The inference engine.
//!
//! [`InferCtx`] is the program-wide state: the symbol table, options,
//! collected warnings and the recursion guards of on-demand inference.
//! [`FunctionInferrer`] walks one body (or one constant / default value
//! initializer), threading a [`FlowContext`] forward through statements
//! and expressions. Its methods are split over:
//!
//! - `stmt`: statements, including the two-pass loop approximation
//! - `expr`: every expression kind except calls
//! - `call`: call binding, method lookup and generic deduction at calls

mod call;
mod expr;
mod stmt;

use tolk_ast::ast::{Block, Expr};
use tolk_ast::{
    ConstId, FunctionBody, FunctionId, InferenceState, LocalVarData, LocalVarId, StructId,
    SymbolTable, Ty,
};
use tolk_common::Span;

use crate::error::{ConstraintOrigin, TypeError, TypeWarning};
use crate::flow::{ExprFlow, FlowContext, SinkExpression};
use crate::resolve;
use crate::unify::TypeInferringUnifyStrategy;
use crate::CheckOptions;

// ── InferCtx ───────────────────────────────────────────────────────────

/// Program-wide checker state.
pub struct InferCtx<'a> {
    pub symbols: &'a mut SymbolTable,
    pub options: &'a CheckOptions,
    warnings: Vec<TypeWarning>,
    /// Functions whose bodies are being inferred right now, outermost first.
    /// Meeting one of them again is a circular dependency.
    inferring: Vec<FunctionId>,
    /// Constants whose initializers are being inferred right now.
    constants_inferring: Vec<ConstId>,
    /// How many instantiated bodies are being inferred inside each other.
    pub(crate) instantiation_depth: usize,
}

impl<'a> InferCtx<'a> {
    pub fn new(symbols: &'a mut SymbolTable, options: &'a CheckOptions) -> Self {
        InferCtx {
            symbols,
            options,
            warnings: Vec::new(),
            inferring: Vec::new(),
            constants_inferring: Vec::new(),
            instantiation_depth: 0,
        }
    }

    pub fn into_warnings(self) -> Vec<TypeWarning> {
        self.warnings
    }

    /// Record a warning once; the second pass over a loop body reports the
    /// same findings again.
    pub(crate) fn warn(&mut self, warning: TypeWarning) {
        if self.warnings.contains(&warning) {
            return;
        }
        tracing::warn!(%warning, "type checker warning");
        self.warnings.push(warning);
    }

    /// Resolve declarations, then infer constants and every non-generic
    /// function body that was not already inferred on demand.
    pub fn check_program(&mut self) -> Result<()> {
        resolve::resolve_declarations(self)?;

        let consts: Vec<ConstId> = self.symbols.const_ids().collect();
        for id in consts {
            let span = self.symbols.constant(id).span;
            self.ensure_const_inferred(id, span)?;
        }

        let structs: Vec<StructId> = self.symbols.struct_ids().collect();
        for id in structs {
            if !self.symbols.struct_data(id).is_generic() {
                self.ensure_struct_ready(id)?;
            }
        }

        let functions: Vec<FunctionId> = self.symbols.function_ids().collect();
        for id in functions {
            let data = self.symbols.function(id);
            if data.is_generic() || !data.is_code_function() || data.state != InferenceState::NotStarted {
                continue;
            }
            self.infer_function(id)?;
        }
        Ok(())
    }

    /// Make the return type of `fun` known before a caller uses it.
    ///
    /// Functions with a declared return type are left for the main loop.
    /// A function without one that is already being inferred means its
    /// return type depends on itself.
    pub(crate) fn ensure_function_inferred(&mut self, fun: FunctionId, span: Span) -> Result<()> {
        let data = self.symbols.function(fun);
        if data.is_generic() || !data.is_code_function() || data.declared_return_type.is_some() {
            return Ok(());
        }
        if data.state == InferenceState::Done {
            return Ok(());
        }
        if self.inferring.contains(&fun) {
            return Err(TypeError::CircularInference { name: data.name.clone(), span });
        }
        tracing::debug!(fun = %data.name, "inferring on demand");
        self.infer_function(fun)
    }

    /// Infer one function body. The body is moved out of the symbol table
    /// while it is walked and put back afterwards.
    pub(crate) fn infer_function(&mut self, fun: FunctionId) -> Result<()> {
        let data = self.symbols.function_mut(fun);
        data.state = InferenceState::InProgress;
        let mut body = match std::mem::replace(&mut data.body, FunctionBody::Code(Block::default())) {
            FunctionBody::Code(block) => block,
            other => {
                data.body = other;
                data.state = InferenceState::Done;
                return Ok(());
            }
        };
        let mut defaults: Vec<(usize, Expr)> = data.locals[..data.n_params]
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, p)| p.default_value.take().map(|e| (idx, e)))
            .collect();
        tracing::debug!(fun = %data.name, depth = self.inferring.len(), "inferring function");

        self.inferring.push(fun);
        let result = FunctionInferrer::new(self, Some(fun)).infer_function_body(&mut body, &mut defaults);
        self.inferring.pop();

        let data = self.symbols.function_mut(fun);
        data.body = FunctionBody::Code(body);
        for (idx, default) in defaults {
            data.locals[idx].default_value = Some(default);
        }
        let return_type = result?;
        if data.declared_return_type.is_none() {
            data.inferred_return_type = Some(return_type);
        }
        data.state = InferenceState::Done;
        Ok(())
    }

    /// Infer a constant's initializer once.
    pub(crate) fn ensure_const_inferred(&mut self, id: ConstId, span: Span) -> Result<()> {
        let data = self.symbols.constant(id);
        if data.state == InferenceState::Done {
            return Ok(());
        }
        if self.constants_inferring.contains(&id) {
            return Err(TypeError::CircularConstant { name: data.name.clone(), span });
        }
        let declared = data.declared_type.clone();
        let name = data.name.clone();
        let data = self.symbols.constant_mut(id);
        data.state = InferenceState::InProgress;
        let mut init = std::mem::replace(&mut data.init, Expr::new(tolk_ast::ast::ExprKind::Null));

        tracing::trace!(constant = %name, "inferring constant");
        self.constants_inferring.push(id);
        let result = FunctionInferrer::new(self, None).infer_initializer(
            &mut init,
            declared.as_ref(),
            ConstraintOrigin::Constant { name },
        );
        self.constants_inferring.pop();

        let data = self.symbols.constant_mut(id);
        data.init = init;
        let ty = result?;
        data.inferred_type = Some(declared.unwrap_or(ty));
        data.state = InferenceState::Done;
        Ok(())
    }

    /// Infer the default values of a struct's fields once.
    pub(crate) fn ensure_struct_ready(&mut self, id: StructId) -> Result<()> {
        let data = self.symbols.struct_mut(id);
        if data.state != InferenceState::NotStarted {
            return Ok(());
        }
        data.state = InferenceState::InProgress;
        let n_fields = data.fields.len();
        for idx in 0..n_fields {
            let field = &mut self.symbols.struct_mut(id).fields[idx];
            let Some(mut default) = field.default_value.take() else {
                continue;
            };
            let declared = field.declared_type.clone();
            let origin = ConstraintOrigin::DefaultValue { name: field.name.clone() };
            let result = FunctionInferrer::new(self, None).infer_initializer(&mut default, Some(&declared), origin);
            self.symbols.struct_mut(id).fields[idx].default_value = Some(default);
            result?;
        }
        self.symbols.struct_mut(id).state = InferenceState::Done;
        Ok(())
    }
}

// ── FunctionInferrer ───────────────────────────────────────────────────

type Result<T> = std::result::Result<T, TypeError>;

/// Walks one body. `owner` is `None` for constant and field initializers,
/// which can not mention locals.
pub(crate) struct FunctionInferrer<'c, 'a> {
    pub(crate) ctx: &'c mut InferCtx<'a>,
    owner: Option<FunctionId>,
    return_unifier: TypeInferringUnifyStrategy,
}

impl<'c, 'a> FunctionInferrer<'c, 'a> {
    pub(crate) fn new(ctx: &'c mut InferCtx<'a>, owner: Option<FunctionId>) -> Self {
        FunctionInferrer { ctx, owner, return_unifier: TypeInferringUnifyStrategy::new() }
    }

    fn owner(&self) -> FunctionId {
        match self.owner {
            Some(fun) => fun,
            None => unreachable!("local variable referenced outside of a function body"),
        }
    }

    fn owner_name(&self) -> String {
        self.owner.map(|f| self.ctx.symbols.function(f).name.clone()).unwrap_or_default()
    }

    pub(crate) fn local(&self, id: LocalVarId) -> &LocalVarData {
        self.ctx.symbols.function(self.owner()).local(id)
    }

    pub(crate) fn local_mut(&mut self, id: LocalVarId) -> &mut LocalVarData {
        let owner = self.owner();
        self.ctx.symbols.function_mut(owner).local_mut(id)
    }

    /// Type of a local as declared, or as inferred from its initializer.
    pub(crate) fn local_declared_type(&self, id: LocalVarId) -> Ty {
        self.local(id).declared_or_inferred().cloned().unwrap_or(Ty::Unknown)
    }

    /// Infer the body, returning the declared or inferred return type.
    fn infer_function_body(&mut self, body: &mut Block, defaults: &mut [(usize, Expr)]) -> Result<Ty> {
        let fun = self.owner();
        let data = self.ctx.symbols.function(fun);
        let fun_name = data.name.clone();
        let declared_return = data.declared_return_type.clone();

        let mut flow = FlowContext::new();
        for (idx, param) in data.params().iter().enumerate() {
            let ty = param.declared_or_inferred().cloned().unwrap_or(Ty::Unknown);
            flow.register_known_type(SinkExpression::local(LocalVarId(idx as u32)), ty);
        }

        for (idx, default) in defaults.iter_mut() {
            let param = self.local(LocalVarId(*idx as u32));
            let declared = param.declared_or_inferred().cloned().unwrap_or(Ty::Unknown);
            let origin = ConstraintOrigin::DefaultValue { name: param.name.clone() };
            self.infer_initializer(default, Some(&declared), origin)?;
        }

        let end = self.process_block(body, flow)?;

        if let Some(declared) = declared_return {
            if !end.is_unreachable() && !declared.is_void() && !declared.is_unknown() {
                return Err(TypeError::MissingReturn { fun: fun_name, span: body.span });
            }
            return Ok(declared);
        }

        if end.is_unreachable() {
            if self.return_unifier.result().is_none() {
                // every path throws or loops forever
                return Ok(Ty::Never);
            }
        } else if !self.return_unifier.unify_with_implicit_return_void() {
            return Err(TypeError::MissingReturn { fun: fun_name, span: body.span });
        }

        if let Some((first, second)) = self.return_unifier.conflict().cloned() {
            tracing::debug!(fun = %fun_name, %first, %second, "return types have no common type");
            if self.ctx.options.warn_inferred_union {
                let ty = self.return_unifier.result().cloned().unwrap_or(Ty::Unknown);
                self.ctx.warn(TypeWarning::InferredUnion { fun: fun_name, ty, span: body.span });
            }
        }
        Ok(self.return_unifier.result().cloned().unwrap_or(Ty::Void))
    }

    /// Infer a standalone initializer (constant, field or parameter
    /// default) against its declared type.
    fn infer_initializer(&mut self, init: &mut Expr, declared: Option<&Ty>, origin: ConstraintOrigin) -> Result<Ty> {
        self.infer_expr(init, FlowContext::new(), false, declared)?;
        let ty = init.ty();
        if let Some(declared) = declared {
            self.check_assignable(declared, &ty, init.span, origin)?;
        }
        Ok(ty)
    }

    pub(crate) fn check_assignable(&self, expected: &Ty, found: &Ty, span: Span, origin: ConstraintOrigin) -> Result<()> {
        if expected.can_rhs_be_assigned(found) {
            Ok(())
        } else {
            Err(TypeError::Mismatch { expected: expected.clone(), found: found.clone(), origin, span })
        }
    }

    /// Conditions are booleans or integers.
    pub(crate) fn check_condition(&self, cond: &Expr) -> Result<()> {
        let ty = cond.ty();
        if ty.is_bool() || ty.is_integer() || ty.is_unknown() || ty.is_never() {
            Ok(())
        } else {
            Err(TypeError::NotACondition { found: ty, span: cond.span })
        }
    }

    /// Infer `cond` as a condition and return its branch flows.
    pub(crate) fn infer_condition(&mut self, cond: &mut Expr, flow: FlowContext) -> Result<ExprFlow> {
        let after = self.infer_expr(cond, flow, true, None)?;
        self.check_condition(cond)?;
        Ok(after)
    }
}
