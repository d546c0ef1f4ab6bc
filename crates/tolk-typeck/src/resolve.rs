//! Validating declared types and instantiating `Name<args>` type nodes.
//!
//! Declared types arrive as written: `int8`, `Wrapper<int>`, `T`. Before
//! any body is inferred every declaration's types are checked (widths in
//! range, generic parameters in scope, the right count of type arguments)
//! and each fully concrete `Name<args>` is replaced by the instantiated
//! struct or alias.

use tolk_ast::{FunctionId, GenericBase, GenericsDeclaration, GenericsSubstitutions, Ty};
use tolk_common::Span;

use crate::error::TypeError;
use crate::infer::InferCtx;
use crate::instantiate::{instantiate_alias, instantiate_struct};

type Result<T> = std::result::Result<T, TypeError>;

fn width_in_range(ty: &Ty) -> bool {
    match *ty {
        Ty::IntN { bits, unsigned: false } => (1..=257).contains(&bits),
        Ty::IntN { bits, unsigned: true } => (1..=256).contains(&bits),
        Ty::BytesN { width, bits: true } => (1..=1023).contains(&width),
        Ty::BytesN { width, bits: false } => (1..=127).contains(&width),
        _ => true,
    }
}

/// Check `ty` and replace every concrete `Name<args>` inside it by its
/// instantiation. Generic parameters must belong to `scope`.
pub fn resolve_type(ctx: &mut InferCtx<'_>, ty: &Ty, span: Span, scope: Option<&GenericsDeclaration>) -> Result<Ty> {
    match ty {
        Ty::Generic(name) => {
            if scope.is_some_and(|s| s.find(name).is_some()) {
                Ok(ty.clone())
            } else {
                Err(TypeError::UnknownType { name: name.clone(), span })
            }
        }
        Ty::IntN { .. } | Ty::BytesN { .. } => {
            if width_in_range(ty) {
                Ok(ty.clone())
            } else {
                Err(TypeError::InvalidTypeWidth { name: ty.to_string(), span })
            }
        }
        Ty::Struct(id, name) => {
            if ctx.symbols.struct_data(*id).is_generic() {
                // `Wrapper` alone means `Wrapper` with all defaults
                apply_generic(ctx, GenericBase::Struct(*id), name, Vec::new(), span)
            } else {
                Ok(ty.clone())
            }
        }
        Ty::Alias(id, name, underlying) => {
            if ctx.symbols.alias(*id).is_generic() {
                apply_generic(ctx, GenericBase::Alias(*id), name, Vec::new(), span)
            } else {
                let underlying = resolve_type(ctx, underlying, span, scope)?;
                Ok(Ty::Alias(*id, name.clone(), Box::new(underlying)))
            }
        }
        Ty::GenericApp(base, name, args) => {
            let mut resolved = Vec::with_capacity(args.len());
            for arg in args {
                resolved.push(resolve_type(ctx, arg, span, scope)?);
            }
            apply_generic(ctx, *base, name, resolved, span)
        }
        Ty::Callable(params, ret) => {
            let mut resolved = Vec::with_capacity(params.len());
            for p in params {
                resolved.push(resolve_type(ctx, p, span, scope)?);
            }
            Ok(Ty::callable(resolved, resolve_type(ctx, ret, span, scope)?))
        }
        Ty::Tensor(items) => Ok(Ty::Tensor(resolve_all(ctx, items, span, scope)?)),
        Ty::Brackets(items) => Ok(Ty::Brackets(resolve_all(ctx, items, span, scope)?)),
        Ty::Union(variants) => Ok(Ty::union(resolve_all(ctx, variants, span, scope)?)),
        _ => Ok(ty.clone()),
    }
}

fn resolve_all(ctx: &mut InferCtx<'_>, items: &[Ty], span: Span, scope: Option<&GenericsDeclaration>) -> Result<Vec<Ty>> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(resolve_type(ctx, item, span, scope)?);
    }
    Ok(out)
}

/// `Name<args>`: trailing arguments may be omitted when they have
/// defaults. Arguments still mentioning generic parameters keep the node
/// as is; it is instantiated once those are substituted.
fn apply_generic(ctx: &mut InferCtx<'_>, base: GenericBase, name: &str, args: Vec<Ty>, span: Span) -> Result<Ty> {
    let decl = match base {
        GenericBase::Struct(id) => ctx.symbols.struct_data(id).generics.clone(),
        GenericBase::Alias(id) => ctx.symbols.alias(id).generics.clone(),
    };
    let Some(decl) = decl else {
        return Err(TypeError::GenericArgsCount { name: name.to_string(), expected: 0, found: args.len(), span });
    };
    let count_error = || TypeError::GenericArgsCount {
        name: name.to_string(),
        expected: decl.len(),
        found: args.len(),
        span,
    };
    if args.len() > decl.len() {
        return Err(count_error());
    }
    if args.iter().any(Ty::has_generic_inside) {
        return Ok(Ty::GenericApp(base, name.to_string(), args));
    }
    let mut subs = GenericsSubstitutions::from_values(&decl, args.clone());
    subs.apply_defaults();
    if !subs.is_complete() {
        return Err(count_error());
    }
    match base {
        GenericBase::Struct(id) => {
            let inst = instantiate_struct(ctx, id, subs, span)?;
            let inst_name = ctx.symbols.struct_data(inst).name.clone();
            Ok(Ty::Struct(inst, inst_name))
        }
        GenericBase::Alias(id) => instantiate_alias(ctx, id, subs, span),
    }
}

// ── Declarations ───────────────────────────────────────────────────────

/// Resolve the declared types of every alias, struct, global, constant and
/// function signature of the program.
pub fn resolve_declarations(ctx: &mut InferCtx<'_>) -> Result<()> {
    let aliases: Vec<_> = ctx.symbols.alias_ids().collect();
    for id in aliases {
        let data = ctx.symbols.alias(id);
        if data.base_alias.is_some() {
            continue;
        }
        let (underlying, span, scope) = (data.underlying.clone(), data.span, data.generics.clone());
        let underlying = resolve_type(ctx, &underlying, span, scope.as_ref())?;
        ctx.symbols.alias_mut(id).underlying = underlying;
    }

    let structs: Vec<_> = ctx.symbols.struct_ids().collect();
    for id in structs {
        let data = ctx.symbols.struct_data(id);
        if data.base_struct.is_some() {
            continue;
        }
        let scope = data.generics.clone();
        for idx in 0..data.fields.len() {
            let field = &ctx.symbols.struct_data(id).fields[idx];
            let (ty, span) = (field.declared_type.clone(), field.span);
            let ty = resolve_type(ctx, &ty, span, scope.as_ref())?;
            ctx.symbols.struct_mut(id).fields[idx].declared_type = ty;
        }
    }

    let globals: Vec<_> = ctx.symbols.global_ids().collect();
    for id in globals {
        let data = ctx.symbols.global(id);
        let (ty, span) = (data.declared_type.clone(), data.span);
        let ty = resolve_type(ctx, &ty, span, None)?;
        ctx.symbols.global_mut(id).declared_type = ty;
    }

    let consts: Vec<_> = ctx.symbols.const_ids().collect();
    for id in consts {
        let data = ctx.symbols.constant(id);
        let span = data.span;
        let Some(ty) = data.declared_type.clone() else {
            continue;
        };
        let ty = resolve_type(ctx, &ty, span, None)?;
        ctx.symbols.constant_mut(id).declared_type = Some(ty);
    }

    let functions: Vec<FunctionId> = ctx.symbols.function_ids().collect();
    for id in functions {
        if ctx.symbols.function(id).is_instantiation() {
            continue;
        }
        resolve_function_signature(ctx, id)?;
    }
    tracing::debug!(functions = ctx.symbols.function_count(), "declarations resolved");
    Ok(())
}

/// Resolve the receiver, every local's declared type and the declared
/// return type of one function, in the scope of its own generics.
pub fn resolve_function_signature(ctx: &mut InferCtx<'_>, id: FunctionId) -> Result<()> {
    let data = ctx.symbols.function(id);
    // an instantiation has nothing generic left to resolve against
    let scope = if data.is_instantiation() { None } else { data.generics.clone() };
    let fun_span = data.span;

    if let Some(receiver) = data.receiver_type.clone() {
        let receiver = resolve_type(ctx, &receiver, fun_span, scope.as_ref())?;
        ctx.symbols.function_mut(id).receiver_type = Some(receiver);
    }

    let n_locals = ctx.symbols.function(id).locals.len();
    for idx in 0..n_locals {
        let local = &ctx.symbols.function(id).locals[idx];
        let Some(ty) = local.declared_type.clone() else {
            continue;
        };
        let span = if local.span.is_empty() { fun_span } else { local.span };
        let ty = resolve_type(ctx, &ty, span, scope.as_ref())?;
        ctx.symbols.function_mut(id).locals[idx].declared_type = Some(ty);
    }

    if let Some(ret) = ctx.symbols.function(id).declared_return_type.clone() {
        let ret = resolve_type(ctx, &ret, fun_span, scope.as_ref())?;
        ctx.symbols.function_mut(id).declared_return_type = Some(ret);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        assert!(width_in_range(&Ty::int_n(257)));
        assert!(!width_in_range(&Ty::uint_n(257)));
        assert!(!width_in_range(&Ty::int_n(0)));
        assert!(width_in_range(&Ty::bits_n(1023)));
        assert!(!width_in_range(&Ty::bytes_n(128)));
    }
}
