//! Helpers for constructing resolved trees without a parser.
//!
//! Used by tests and by the builtin prelude. Everything gets a default
//! span; call `.at(span)` on an `Expr` or `Stmt` when positions matter.

use tolk_common::Span;

use crate::ast::*;
use crate::generics::{GenericsDeclaration, GenericsItem};
use crate::symbols::{
    AliasData, ConstId, FunctionBody, FunctionData, FunctionId, GlobalVarId, LocalVarData,
    LocalVarId, StructData, StructField,
};
use crate::ty::Ty;

// ── Functions ──────────────────────────────────────────────────────────

pub struct FunctionBuilder {
    data: FunctionData,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        FunctionBuilder { data: FunctionData::new(name) }
    }

    /// A method `receiver.method`. Its full name is `Receiver.method`.
    pub fn method(receiver: Ty, method: impl Into<String>) -> Self {
        let method = method.into();
        let mut data = FunctionData::new(format!("{}.{}", receiver, method));
        data.receiver_type = Some(receiver);
        data.method_name = Some(method);
        FunctionBuilder { data }
    }

    pub fn span(&mut self, span: Span) -> &mut Self {
        self.data.span = span;
        self
    }

    pub fn generics(&mut self, names: &[&str]) -> &mut Self {
        let decl = self.data.generics.get_or_insert_with(GenericsDeclaration::default);
        decl.items.extend(
            names.iter().map(|n| GenericsItem { name: n.to_string(), default_type: None }),
        );
        self
    }

    pub fn generic_with_default(&mut self, name: &str, default: Ty) -> &mut Self {
        let decl = self.data.generics.get_or_insert_with(GenericsDeclaration::default);
        decl.items.push(GenericsItem { name: name.to_string(), default_type: Some(default) });
        self
    }

    /// Generic parameters that come from the receiver type (`Wrapper<T>`).
    pub fn receiver_generics(&mut self, names: &[&str]) -> &mut Self {
        self.generics(names);
        if let Some(decl) = &mut self.data.generics {
            decl.n_from_receiver += names.len();
        }
        self
    }

    fn push_param(&mut self, mut var: LocalVarData) -> LocalVarId {
        assert_eq!(
            self.data.locals.len(),
            self.data.n_params,
            "parameters must be declared before locals"
        );
        var.param_idx = Some(self.data.n_params);
        self.data.locals.push(var);
        self.data.n_params += 1;
        LocalVarId(self.data.n_params as u32 - 1)
    }

    pub fn param(&mut self, name: &str, ty: Ty) -> LocalVarId {
        self.push_param(LocalVarData::new(name, Some(ty)))
    }

    pub fn mutate_param(&mut self, name: &str, ty: Ty) -> LocalVarId {
        let mut var = LocalVarData::new(name, Some(ty));
        var.is_mutate = true;
        self.push_param(var)
    }

    pub fn param_with_default(&mut self, name: &str, ty: Ty, default: Expr) -> LocalVarId {
        let mut var = LocalVarData::new(name, Some(ty));
        var.default_value = Some(default);
        self.push_param(var)
    }

    /// `self` typed as the receiver.
    pub fn self_param(&mut self, mutate: bool) -> LocalVarId {
        let ty = self.data.receiver_type.clone().unwrap_or(Ty::Unknown);
        let mut var = LocalVarData::new("self", Some(ty));
        var.is_mutate = mutate;
        self.push_param(var)
    }

    /// A local with an optional declared type.
    pub fn local(&mut self, name: &str, ty: Option<Ty>) -> LocalVarId {
        self.data.locals.push(LocalVarData::new(name, ty));
        LocalVarId(self.data.locals.len() as u32 - 1)
    }

    pub fn returns(&mut self, ty: Ty) -> &mut Self {
        self.data.declared_return_type = Some(ty);
        self
    }

    pub fn returns_self(&mut self) -> &mut Self {
        self.data.returns_self = true;
        self
    }

    pub fn allow_variadic_width(&mut self) -> &mut Self {
        self.data.allow_variadic_width_t = true;
        self
    }

    pub fn body(&mut self, stmts: Vec<Stmt>) -> &mut Self {
        self.data.body = FunctionBody::Code(block(stmts));
        self
    }

    pub fn asm(&mut self, ops: &[&str]) -> &mut Self {
        self.data.body = FunctionBody::Asm(ops.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn builtin(&mut self) -> &mut Self {
        self.data.body = FunctionBody::Builtin;
        self
    }

    pub fn finish(self) -> FunctionData {
        self.data
    }
}

// ── Structs and aliases ────────────────────────────────────────────────

pub struct StructBuilder {
    data: StructData,
}

impl StructBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        StructBuilder { data: StructData::new(name) }
    }

    pub fn generics(&mut self, names: &[&str]) -> &mut Self {
        self.data.generics = Some(GenericsDeclaration::new(names));
        self
    }

    pub fn field(&mut self, name: &str, ty: Ty) -> &mut Self {
        self.data.fields.push(StructField {
            name: name.to_string(),
            span: Span::default(),
            declared_type: ty,
            default_value: None,
        });
        self
    }

    pub fn field_with_default(&mut self, name: &str, ty: Ty, default: Expr) -> &mut Self {
        self.data.fields.push(StructField {
            name: name.to_string(),
            span: Span::default(),
            declared_type: ty,
            default_value: Some(default),
        });
        self
    }

    pub fn finish(self) -> StructData {
        self.data
    }
}

pub fn alias(name: &str, generics: &[&str], underlying: Ty) -> AliasData {
    let mut data = AliasData::new(name, underlying);
    if !generics.is_empty() {
        data.generics = Some(GenericsDeclaration::new(generics));
    }
    data
}

// ── Expressions ────────────────────────────────────────────────────────

fn mk(kind: ExprKind) -> Expr {
    Expr::new(kind)
}

pub fn int(v: i128) -> Expr {
    mk(ExprKind::Int(v))
}

pub fn boolean(v: bool) -> Expr {
    mk(ExprKind::Bool(v))
}

pub fn string(s: &str) -> Expr {
    mk(ExprKind::Str(s.to_string()))
}

pub fn null() -> Expr {
    mk(ExprKind::Null)
}

pub fn underscore() -> Expr {
    mk(ExprKind::Underscore)
}

pub fn local(id: LocalVarId) -> Expr {
    mk(ExprKind::LocalVar(id))
}

pub fn declare(id: LocalVarId) -> Expr {
    mk(ExprKind::DeclareLocal(id))
}

pub fn global(id: GlobalVarId) -> Expr {
    mk(ExprKind::GlobalVar(id))
}

pub fn constant(id: ConstId) -> Expr {
    mk(ExprKind::Const(id))
}

pub fn fun_ref(fun: FunctionId) -> Expr {
    mk(ExprKind::FunctionRef(FunctionRef { fun, type_args: None, resolved: None }))
}

pub fn fun_ref_with(fun: FunctionId, type_args: Vec<Ty>) -> Expr {
    mk(ExprKind::FunctionRef(FunctionRef { fun, type_args: Some(type_args), resolved: None }))
}

pub fn paren(e: Expr) -> Expr {
    mk(ExprKind::Paren(Box::new(e)))
}

pub fn not_null(e: Expr) -> Expr {
    mk(ExprKind::NotNull(Box::new(e)))
}

pub fn tensor(items: Vec<Expr>) -> Expr {
    mk(ExprKind::Tensor(items))
}

pub fn brackets(items: Vec<Expr>) -> Expr {
    mk(ExprKind::Brackets(items))
}

/// `obj.0`
pub fn index(obj: Expr, idx: u32) -> Expr {
    mk(ExprKind::Dot(DotAccess {
        obj: Box::new(obj),
        field: DotField::Index(idx),
        type_args: None,
        target: None,
    }))
}

/// `obj.name`
pub fn field(obj: Expr, name: &str) -> Expr {
    mk(ExprKind::Dot(DotAccess {
        obj: Box::new(obj),
        field: DotField::Name(name.to_string()),
        type_args: None,
        target: None,
    }))
}

pub fn call_args(callee: Expr, args: Vec<Arg>) -> Expr {
    mk(ExprKind::Call(Call { callee: Box::new(callee), args, fun: None, has_receiver: false }))
}

pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    call_args(callee, args.into_iter().map(Arg::from).collect())
}

/// `f(args)` for a known function.
pub fn call_fn(fun: FunctionId, args: Vec<Expr>) -> Expr {
    call(fun_ref(fun), args)
}

/// `obj.method(args)`
pub fn method_call(obj: Expr, method: &str, args: Vec<Expr>) -> Expr {
    call(field(obj, method), args)
}

/// `mutate e` as a call argument.
pub fn mutate(e: Expr) -> Arg {
    Arg { expr: e, is_mutate: true }
}

pub fn assign(lhs: Expr, rhs: Expr) -> Expr {
    mk(ExprKind::Assign { lhs: Box::new(lhs), rhs: Box::new(rhs) })
}

pub fn set_assign(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    mk(ExprKind::SetAssign { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    mk(ExprKind::Unary { op, operand: Box::new(operand) })
}

pub fn not(operand: Expr) -> Expr {
    unary(UnaryOp::Not, operand)
}

pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    mk(ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
}

pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Eq, lhs, rhs)
}

pub fn ne(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Ne, lhs, rhs)
}

pub fn and(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::And, lhs, rhs)
}

pub fn or(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Or, lhs, rhs)
}

pub fn ternary(cond: Expr, when_true: Expr, when_false: Expr) -> Expr {
    mk(ExprKind::Ternary {
        cond: Box::new(cond),
        when_true: Box::new(when_true),
        when_false: Box::new(when_false),
    })
}

pub fn cast(e: Expr, target: Ty) -> Expr {
    mk(ExprKind::Cast { expr: Box::new(e), target })
}

pub fn is_type(e: Expr, target: Ty) -> Expr {
    mk(ExprKind::IsType { expr: Box::new(e), target, negated: false })
}

pub fn not_is_type(e: Expr, target: Ty) -> Expr {
    mk(ExprKind::IsType { expr: Box::new(e), target, negated: true })
}

pub fn match_expr(subject: Expr, arms: Vec<MatchArm>) -> Expr {
    mk(ExprKind::Match(Match { subject: Box::new(subject), arms, is_statement: false }))
}

pub fn match_stmt(subject: Expr, arms: Vec<MatchArm>) -> Stmt {
    expr_stmt(mk(ExprKind::Match(Match {
        subject: Box::new(subject),
        arms,
        is_statement: true,
    })))
}

pub fn arm_type(ty: Ty, body: Expr) -> MatchArm {
    MatchArm { pattern: MatchPattern::Type(ty), body: ArmBody::Expr(body), span: Span::default() }
}

pub fn arm_type_block(ty: Ty, stmts: Vec<Stmt>) -> MatchArm {
    MatchArm {
        pattern: MatchPattern::Type(ty),
        body: ArmBody::Block(block(stmts)),
        span: Span::default(),
    }
}

pub fn arm_value(value: Expr, body: Expr) -> MatchArm {
    MatchArm { pattern: MatchPattern::Value(value), body: ArmBody::Expr(body), span: Span::default() }
}

pub fn arm_else(body: Expr) -> MatchArm {
    MatchArm { pattern: MatchPattern::Else, body: ArmBody::Expr(body), span: Span::default() }
}

pub fn struct_lit(struct_ty: Option<Ty>, fields: Vec<(&str, Expr)>) -> Expr {
    mk(ExprKind::StructLiteral(StructLiteral {
        struct_ty,
        fields: fields
            .into_iter()
            .map(|(name, value)| FieldInit { name: name.to_string(), span: value.span, value })
            .collect(),
        resolved: None,
    }))
}

// ── Statements ─────────────────────────────────────────────────────────

pub fn block(stmts: Vec<Stmt>) -> Block {
    let span = match (stmts.first(), stmts.last()) {
        (Some(first), Some(last)) => first.span.merge(last.span),
        _ => Span::default(),
    };
    Block { stmts, span, first_unreachable: None }
}

pub fn block_stmt(stmts: Vec<Stmt>) -> Stmt {
    Stmt::new(StmtKind::Block(block(stmts)))
}

pub fn expr_stmt(e: Expr) -> Stmt {
    let span = e.span;
    Stmt::new(StmtKind::Expr(e)).at(span)
}

/// `var x = init`
pub fn var_decl(id: LocalVarId, init: Expr) -> Stmt {
    var_decl_pattern(declare(id), init)
}

/// `var (a, [b, _]) = init`
pub fn var_decl_pattern(pattern: Expr, init: Expr) -> Stmt {
    let span = pattern.span.merge(init.span);
    Stmt::new(StmtKind::VarDecl { pattern, init: Some(init) }).at(span)
}

/// `var x: T;` with no initializer.
pub fn var_decl_uninit(id: LocalVarId) -> Stmt {
    Stmt::new(StmtKind::VarDecl { pattern: declare(id), init: None })
}

pub fn assign_stmt(lhs: Expr, rhs: Expr) -> Stmt {
    expr_stmt(assign(lhs, rhs))
}

pub fn ret(e: Expr) -> Stmt {
    let span = e.span;
    Stmt::new(StmtKind::Return(Some(e))).at(span)
}

pub fn ret_void() -> Stmt {
    Stmt::new(StmtKind::Return(None))
}

pub fn if_(cond: Expr, then_body: Vec<Stmt>, else_body: Option<Vec<Stmt>>) -> Stmt {
    Stmt::new(StmtKind::If { cond, then_body: block(then_body), else_body: else_body.map(block) })
}

pub fn while_(cond: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::new(StmtKind::While { cond, body: block(body) })
}

pub fn do_while(body: Vec<Stmt>, cond: Expr) -> Stmt {
    Stmt::new(StmtKind::DoWhile { body: block(body), cond })
}

pub fn repeat(count: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::new(StmtKind::Repeat { count, body: block(body) })
}

pub fn throw(code: Expr) -> Stmt {
    Stmt::new(StmtKind::Throw { code, arg: None })
}

pub fn assert_(cond: Expr, code: Expr) -> Stmt {
    Stmt::new(StmtKind::Assert { cond, code })
}

pub fn try_catch(try_body: Vec<Stmt>, catch_vars: [Option<LocalVarId>; 2], catch_body: Vec<Stmt>) -> Stmt {
    Stmt::new(StmtKind::TryCatch {
        try_body: block(try_body),
        catch_vars,
        catch_body: block(catch_body),
    })
}
