//! Memoized monomorphization of generic functions, structs and aliases.
//!
//! An instantiation is a structural copy of the generic declaration with
//! every generic parameter replaced, registered in the symbol table under
//! its canonical name (`f<int>`, `Wrapper<slice?>`). Asking for the same
//! substitutions again returns the symbol created the first time; the
//! name doubles as the memo key.

use tolk_ast::ast::{ArmBody, Block, Expr, ExprKind, MatchPattern, Stmt, StmtKind};
use tolk_ast::{
    AliasData, AliasId, FunctionBody, FunctionId, GenericsSubstitutions, InferenceState, StructId,
    Ty,
};
use tolk_common::Span;

use crate::error::TypeError;
use crate::infer::InferCtx;
use crate::resolve::{resolve_function_signature, resolve_type};

type Result<T> = std::result::Result<T, TypeError>;

/// `base<arg1, arg2>` with every argument printed as a type.
pub fn canonical_name(base: &str, subs: &GenericsSubstitutions) -> String {
    let args: Vec<String> = subs.values().map(ToString::to_string).collect();
    format!("{}<{}>", base, args.join(", "))
}

// ── Functions ──────────────────────────────────────────────────────────

/// The instantiation of generic function `base` for `subs`, creating and
/// inferring it on first use.
///
/// Asm and builtin functions only accept single-slot types for their
/// parameters unless declared otherwise: their bodies manipulate the stack
/// directly.
pub fn instantiate_function(
    ctx: &mut InferCtx<'_>,
    base: FunctionId,
    subs: GenericsSubstitutions,
    span: Span,
) -> Result<FunctionId> {
    let data = ctx.symbols.function(base);
    let name = canonical_name(&data.name, &subs);
    if let Some(id) = ctx.symbols.lookup_function(&name) {
        tracing::trace!(%name, "instantiation cache hit");
        return Ok(id);
    }

    if !data.is_code_function() && !data.allow_variadic_width_t {
        for (idx, ty) in subs.values().enumerate() {
            let width = ctx.symbols.width_of(ty);
            if width != 1 {
                return Err(TypeError::GenericWidth {
                    fun: data.name.clone(),
                    param: subs.declaration().name_at(idx).to_string(),
                    ty: ty.clone(),
                    width,
                    span,
                });
            }
        }
    }

    check_depth(ctx, &name, span)?;

    let mut inst = data.clone();
    inst.name = name.clone();
    inst.receiver_type = inst.receiver_type.map(|t| subs.substitute(&t));
    inst.declared_return_type = inst.declared_return_type.map(|t| subs.substitute(&t));
    inst.inferred_return_type = None;
    for local in &mut inst.locals {
        local.declared_type = local.declared_type.take().map(|t| subs.substitute(&t));
        local.inferred_type = None;
        if let Some(default) = &mut local.default_value {
            substitute_expr(default, &subs);
        }
    }
    if let FunctionBody::Code(block) = &mut inst.body {
        substitute_block(block, &subs);
    }
    inst.base_fun = Some(base);
    inst.substitutions = Some(subs);
    inst.state = InferenceState::NotStarted;
    let is_code = inst.is_code_function();

    let id = ctx.symbols.add_function(inst);
    tracing::debug!(%name, depth = ctx.instantiation_depth, "instantiated function");
    resolve_function_signature(ctx, id)?;

    if is_code {
        nested(ctx, |ctx| ctx.infer_function(id))?;
    } else {
        ctx.symbols.function_mut(id).state = InferenceState::Done;
    }
    Ok(id)
}

/// Instantiations nest when one needs another (`f<T>` calling
/// `f<(T, T)>`, `A<T>` holding an `A<(T, T)>?`); past the configured depth
/// that is treated as runaway recursion.
fn check_depth(ctx: &InferCtx<'_>, name: &str, span: Span) -> Result<()> {
    let max_depth = ctx.options.max_instantiation_depth;
    if ctx.instantiation_depth >= max_depth {
        return Err(TypeError::InstantiationTooDeep { name: name.to_string(), depth: max_depth, span });
    }
    Ok(())
}

fn nested<T>(ctx: &mut InferCtx<'_>, f: impl FnOnce(&mut InferCtx<'_>) -> Result<T>) -> Result<T> {
    ctx.instantiation_depth += 1;
    let result = f(ctx);
    ctx.instantiation_depth -= 1;
    result
}

// ── Structs and aliases ────────────────────────────────────────────────

/// The instantiation of generic struct `base` for `subs`. Field defaults
/// are inferred later, when a literal of the struct is first checked.
pub fn instantiate_struct(
    ctx: &mut InferCtx<'_>,
    base: StructId,
    subs: GenericsSubstitutions,
    span: Span,
) -> Result<StructId> {
    let data = ctx.symbols.struct_data(base);
    let name = canonical_name(&data.name, &subs);
    if let Some(id) = ctx.symbols.lookup_struct(&name) {
        tracing::trace!(%name, "instantiation cache hit");
        return Ok(id);
    }
    check_depth(ctx, &name, span)?;

    let mut inst = data.clone();
    inst.name = name.clone();
    for field in &mut inst.fields {
        field.declared_type = subs.substitute(&field.declared_type);
        if let Some(default) = &mut field.default_value {
            substitute_expr(default, &subs);
        }
    }
    inst.base_struct = Some(base);
    inst.substitutions = Some(subs);
    inst.state = InferenceState::NotStarted;

    // registered before its fields resolve, so `Node<T> { next: Node<T>? }`
    // finds itself
    let id = ctx.symbols.add_struct(inst);
    tracing::debug!(%name, "instantiated struct");
    let n_fields = ctx.symbols.struct_data(id).fields.len();
    for idx in 0..n_fields {
        let field = &ctx.symbols.struct_data(id).fields[idx];
        let field_span = if field.span.is_empty() { span } else { field.span };
        let declared = field.declared_type.clone();
        let resolved = nested(ctx, |ctx| resolve_type(ctx, &declared, field_span, None))?;
        ctx.symbols.struct_mut(id).fields[idx].declared_type = resolved;
    }
    Ok(id)
}

/// The instantiation of generic alias `base` for `subs`, as a type.
pub fn instantiate_alias(ctx: &mut InferCtx<'_>, base: AliasId, subs: GenericsSubstitutions, span: Span) -> Result<Ty> {
    let data = ctx.symbols.alias(base);
    let name = canonical_name(&data.name, &subs);
    if let Some(id) = ctx.symbols.lookup_alias(&name) {
        let underlying = ctx.symbols.alias(id).underlying.clone();
        return Ok(Ty::Alias(id, name, Box::new(underlying)));
    }

    check_depth(ctx, &name, span)?;
    let underlying = subs.substitute(&data.underlying);
    let underlying = nested(ctx, |ctx| resolve_type(ctx, &underlying, span, None))?;
    let base_data = ctx.symbols.alias(base);
    let inst = AliasData {
        name: name.clone(),
        span: base_data.span,
        underlying: underlying.clone(),
        generics: base_data.generics.clone(),
        substitutions: Some(subs),
        base_alias: Some(base),
    };
    let id = ctx.symbols.add_alias(inst);
    tracing::debug!(%name, "instantiated alias");
    Ok(Ty::Alias(id, name, Box::new(underlying)))
}

// ── Substitution over trees ────────────────────────────────────────────

fn substitute_block(block: &mut Block, subs: &GenericsSubstitutions) {
    block.first_unreachable = None;
    for stmt in &mut block.stmts {
        substitute_stmt(stmt, subs);
    }
}

fn substitute_stmt(stmt: &mut Stmt, subs: &GenericsSubstitutions) {
    match &mut stmt.kind {
        StmtKind::Block(block) => substitute_block(block, subs),
        StmtKind::Expr(e) | StmtKind::Return(Some(e)) => substitute_expr(e, subs),
        StmtKind::VarDecl { pattern, init } => {
            substitute_expr(pattern, subs);
            if let Some(init) = init {
                substitute_expr(init, subs);
            }
        }
        StmtKind::If { cond, then_body, else_body } => {
            substitute_expr(cond, subs);
            substitute_block(then_body, subs);
            if let Some(else_body) = else_body {
                substitute_block(else_body, subs);
            }
        }
        StmtKind::While { cond, body } | StmtKind::DoWhile { body, cond } => {
            substitute_expr(cond, subs);
            substitute_block(body, subs);
        }
        StmtKind::Repeat { count, body } => {
            substitute_expr(count, subs);
            substitute_block(body, subs);
        }
        StmtKind::Throw { code, arg } => {
            substitute_expr(code, subs);
            if let Some(arg) = arg {
                substitute_expr(arg, subs);
            }
        }
        StmtKind::Assert { cond, code } => {
            substitute_expr(cond, subs);
            substitute_expr(code, subs);
        }
        StmtKind::TryCatch { try_body, catch_body, .. } => {
            substitute_block(try_body, subs);
            substitute_block(catch_body, subs);
        }
        StmtKind::Return(None) | StmtKind::Empty => {}
    }
}

fn substitute_types(types: &mut [Ty], subs: &GenericsSubstitutions) {
    for ty in types {
        *ty = subs.substitute(ty);
    }
}

fn substitute_expr(expr: &mut Expr, subs: &GenericsSubstitutions) {
    expr.ty = None;
    match &mut expr.kind {
        ExprKind::Int(_)
        | ExprKind::Bool(_)
        | ExprKind::Str(_)
        | ExprKind::Null
        | ExprKind::Underscore
        | ExprKind::LocalVar(_)
        | ExprKind::DeclareLocal(_)
        | ExprKind::GlobalVar(_)
        | ExprKind::Const(_) => {}
        ExprKind::FunctionRef(fun_ref) => {
            fun_ref.resolved = None;
            if let Some(args) = &mut fun_ref.type_args {
                substitute_types(args, subs);
            }
        }
        ExprKind::Paren(inner) | ExprKind::NotNull(inner) => substitute_expr(inner, subs),
        ExprKind::Tensor(items) | ExprKind::Brackets(items) => {
            for item in items {
                substitute_expr(item, subs);
            }
        }
        ExprKind::Dot(dot) => {
            dot.target = None;
            substitute_expr(&mut dot.obj, subs);
            if let Some(args) = &mut dot.type_args {
                substitute_types(args, subs);
            }
        }
        ExprKind::Call(call) => {
            call.fun = None;
            call.has_receiver = false;
            substitute_expr(&mut call.callee, subs);
            for arg in &mut call.args {
                substitute_expr(&mut arg.expr, subs);
            }
        }
        ExprKind::Assign { lhs, rhs } | ExprKind::SetAssign { lhs, rhs, .. } | ExprKind::Binary { lhs, rhs, .. } => {
            substitute_expr(lhs, subs);
            substitute_expr(rhs, subs);
        }
        ExprKind::Unary { operand, .. } => substitute_expr(operand, subs),
        ExprKind::Ternary { cond, when_true, when_false } => {
            substitute_expr(cond, subs);
            substitute_expr(when_true, subs);
            substitute_expr(when_false, subs);
        }
        ExprKind::Cast { expr: inner, target } | ExprKind::IsType { expr: inner, target, .. } => {
            substitute_expr(inner, subs);
            *target = subs.substitute(target);
        }
        ExprKind::Match(m) => {
            substitute_expr(&mut m.subject, subs);
            for arm in &mut m.arms {
                match &mut arm.pattern {
                    MatchPattern::Type(t) => *t = subs.substitute(t),
                    MatchPattern::Value(v) => substitute_expr(v, subs),
                    MatchPattern::Else => {}
                }
                match &mut arm.body {
                    ArmBody::Expr(e) => substitute_expr(e, subs),
                    ArmBody::Block(b) => substitute_block(b, subs),
                }
            }
        }
        ExprKind::StructLiteral(lit) => {
            lit.resolved = None;
            if let Some(t) = &mut lit.struct_ty {
                *t = subs.substitute(t);
            }
            for field in &mut lit.fields {
                substitute_expr(&mut field.value, subs);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tolk_ast::build::{cast, local};
    use tolk_ast::{GenericsDeclaration, LocalVarId};

    fn subs_t(ty: Ty) -> GenericsSubstitutions {
        GenericsSubstitutions::from_values(&GenericsDeclaration::new(&["T"]), vec![ty])
    }

    #[test]
    fn canonical_names() {
        assert_eq!(canonical_name("f", &subs_t(Ty::Int)), "f<int>");
        let decl = GenericsDeclaration::new(&["K", "V"]);
        let subs = GenericsSubstitutions::from_values(&decl, vec![Ty::Slice, Ty::nullable(Ty::Cell)]);
        assert_eq!(canonical_name("Map", &subs), "Map<slice, cell?>");
    }

    #[test]
    fn substitution_reaches_nested_types() {
        let mut e = cast(local(LocalVarId(0)), Ty::nullable(Ty::generic("T")));
        e.ty = Some(Ty::Unknown);
        substitute_expr(&mut e, &subs_t(Ty::Slice));
        assert_eq!(e.ty, None);
        match &e.kind {
            ExprKind::Cast { target, .. } => assert_eq!(*target, Ty::nullable(Ty::Slice)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
