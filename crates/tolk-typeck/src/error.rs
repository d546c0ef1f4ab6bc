//! Type errors and warnings with provenance tracking.
//!
//! Every error carries the `Span` it is reported at. Mismatches also carry
//! a `ConstraintOrigin` recording why the two types had to agree, so the
//! rendered diagnostic can say "argument 2 of `f`" rather than only
//! "expected int, found slice".

use std::fmt;

use tolk_ast::Ty;
use tolk_common::Span;

/// Where a "these types must agree" requirement came from.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstraintOrigin {
    /// `f(x)`: the argument must fit parameter `param_idx` of `fun`.
    FnArg { fun: String, param_idx: usize, call_site: Span },
    /// `obj.method()`: the receiver must fit `self`.
    Receiver { fun: String, call_site: Span },
    /// `return e` against the declared return type.
    Return { fun: String, return_span: Span },
    /// `var x: T = e`
    VarDecl { binding_span: Span },
    /// `lhs = rhs`
    Assignment { lhs_span: Span, rhs_span: Span },
    /// `Point { x: e }`
    FieldInit { struct_name: String, field: String },
    /// Parameter default value or struct field default.
    DefaultValue { name: String },
    /// Constant initializer against its declared type.
    Constant { name: String },
    /// An operand with a fixed type, like the code of `throw`.
    Operand { what: String },
}

impl ConstraintOrigin {
    /// The secondary location worth pointing at, if any.
    pub fn span(&self) -> Option<Span> {
        match self {
            ConstraintOrigin::FnArg { call_site, .. } => Some(*call_site),
            ConstraintOrigin::Receiver { call_site, .. } => Some(*call_site),
            ConstraintOrigin::Return { return_span, .. } => Some(*return_span),
            ConstraintOrigin::VarDecl { binding_span } => Some(*binding_span),
            ConstraintOrigin::Assignment { lhs_span, .. } => Some(*lhs_span),
            ConstraintOrigin::FieldInit { .. }
            | ConstraintOrigin::DefaultValue { .. }
            | ConstraintOrigin::Constant { .. }
            | ConstraintOrigin::Operand { .. } => None,
        }
    }
}

impl fmt::Display for ConstraintOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintOrigin::FnArg { fun, param_idx, .. } => {
                write!(f, "argument {} of `{}`", param_idx + 1, fun)
            }
            ConstraintOrigin::Receiver { fun, .. } => write!(f, "receiver of `{}`", fun),
            ConstraintOrigin::Return { fun, .. } => write!(f, "return value of `{}`", fun),
            ConstraintOrigin::VarDecl { .. } => write!(f, "variable initializer"),
            ConstraintOrigin::Assignment { .. } => write!(f, "assignment"),
            ConstraintOrigin::FieldInit { struct_name, field } => {
                write!(f, "field `{}` of `{}`", field, struct_name)
            }
            ConstraintOrigin::DefaultValue { name } => write!(f, "default value of `{}`", name),
            ConstraintOrigin::Constant { name } => write!(f, "constant `{}`", name),
            ConstraintOrigin::Operand { what } => write!(f, "operand of `{}`", what),
        }
    }
}

fn expected_count(min: &usize, max: &usize) -> String {
    if min == max {
        min.to_string()
    } else {
        format!("{} to {}", min, max)
    }
}

/// A fatal type error. The first one aborts checking.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("unknown type name `{name}`")]
    UnknownType { name: String, span: Span },

    #[error("invalid width of `{name}`")]
    InvalidTypeWidth { name: String, span: Span },

    #[error("wrong count of type arguments for `{name}`: expected {expected}, found {found}")]
    GenericArgsCount { name: String, expected: usize, found: usize, span: Span },

    #[error("wrong count of arguments for `{name}`: expected {}, found {found}", expected_count(.min, .max))]
    ArityMismatch { name: String, min: usize, max: usize, found: usize, span: Span },

    #[error("can not destructure `{value_ty}` into a pattern of {pattern_len} items")]
    PatternArity { pattern_len: usize, value_ty: Ty, span: Span },

    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    Mismatch { expected: Ty, found: Ty, origin: ConstraintOrigin, span: Span },

    #[error("condition of type `{found}` is neither bool nor integer")]
    NotACondition { found: Ty, span: Span },

    #[error("branches have incompatible types `{first}` and `{second}`")]
    IncompatibleBranches { first: Ty, second: Ty, span: Span },

    #[error("can not deduce the type of element {index} of an untyped tuple")]
    UntypedTupleIndex { index: u32, span: Span },

    #[error("index {index} is out of bounds for `{ty}`")]
    IndexOutOfBounds { index: u32, ty: Ty, span: Span },

    #[error("type `{ty}` has no field `{field}`")]
    NoSuchField { ty: Ty, field: String, span: Span },

    #[error("method `{method}` not found for type `{ty}`")]
    NoSuchMethod { ty: Ty, method: String, suggestion: Option<String>, span: Span },

    #[error("`{ty}` is not a function")]
    NotAFunction { ty: Ty, span: Span },

    #[error("can not deduce `{param}` for generic function `{fun}`")]
    CannotDeduce { fun: String, param: String, span: Span },

    #[error("generic function `{name}` used as a value without type arguments")]
    GenericFunctionAsValue { name: String, span: Span },

    #[error("could not infer the return type of `{name}`: it depends on itself")]
    CircularInference { name: String, span: Span },

    #[error("value of constant `{name}` depends on itself")]
    CircularConstant { name: String, span: Span },

    #[error("`{fun}` requires `{param}` to occupy one stack slot, but `{ty}` occupies {width}")]
    GenericWidth { fun: String, param: String, ty: Ty, width: usize, span: Span },

    #[error("variable `{name}` is used before being assigned")]
    UsedBeforeAssignment { name: String, span: Span },

    #[error("can not infer the type of `{name}` from `null` alone")]
    AlwaysNull { name: String, span: Span },

    #[error("variable `{name}` needs a type or an initializer")]
    MissingTypeAnnotation { name: String, span: Span },

    #[error("operator `{op}` can not be applied to `{lhs}` and `{rhs}`")]
    OperatorMismatch { op: String, lhs: Ty, rhs: Ty, span: Span },

    #[error("operator `{op}` can not be applied to `{operand}`")]
    UnaryOperator { op: String, operand: Ty, span: Span },

    #[error("type `{from}` can not be cast to `{to}`")]
    InvalidCast { from: Ty, to: Ty, span: Span },

    #[error("argument for `{param}` must be passed as `mutate`")]
    MissingMutate { param: String, span: Span },

    #[error("`mutate` passed for `{param}`, which is not a `mutate` parameter")]
    UnexpectedMutate { param: String, span: Span },

    #[error("not all code paths of `{fun}` return a value")]
    MissingReturn { fun: String, span: Span },

    #[error("`{arm}` is not a variant of `{subject}`")]
    MatchArmNotVariant { subject: Ty, arm: Ty, span: Span },

    #[error("match over `{subject}` does not cover `{missing}`")]
    NonExhaustiveMatch { subject: Ty, missing: Ty, span: Span },

    #[error("match expression over values needs an `else` arm")]
    MatchWithoutElse { span: Span },

    #[error("field `{field}` of `{struct_name}` is missing")]
    MissingField { struct_name: String, field: String, span: Span },

    #[error("struct `{struct_name}` has no field `{field}`")]
    UnknownField { struct_name: String, field: String, span: Span },

    #[error("can not infer which struct the literal creates")]
    UntypedStructLiteral { span: Span },

    #[error("expected type `{expected}`, but the expression has type `{found}`")]
    ExpectTypeFailed { expected: String, found: Ty, span: Span },

    #[error("instantiating `{name}` nests deeper than {depth} levels")]
    InstantiationTooDeep { name: String, depth: usize, span: Span },
}

impl TypeError {
    pub fn span(&self) -> Span {
        match self {
            TypeError::UnknownType { span, .. }
            | TypeError::InvalidTypeWidth { span, .. }
            | TypeError::GenericArgsCount { span, .. }
            | TypeError::ArityMismatch { span, .. }
            | TypeError::PatternArity { span, .. }
            | TypeError::Mismatch { span, .. }
            | TypeError::NotACondition { span, .. }
            | TypeError::IncompatibleBranches { span, .. }
            | TypeError::UntypedTupleIndex { span, .. }
            | TypeError::IndexOutOfBounds { span, .. }
            | TypeError::NoSuchField { span, .. }
            | TypeError::NoSuchMethod { span, .. }
            | TypeError::NotAFunction { span, .. }
            | TypeError::CannotDeduce { span, .. }
            | TypeError::GenericFunctionAsValue { span, .. }
            | TypeError::CircularInference { span, .. }
            | TypeError::CircularConstant { span, .. }
            | TypeError::GenericWidth { span, .. }
            | TypeError::UsedBeforeAssignment { span, .. }
            | TypeError::AlwaysNull { span, .. }
            | TypeError::MissingTypeAnnotation { span, .. }
            | TypeError::OperatorMismatch { span, .. }
            | TypeError::UnaryOperator { span, .. }
            | TypeError::InvalidCast { span, .. }
            | TypeError::MissingMutate { span, .. }
            | TypeError::UnexpectedMutate { span, .. }
            | TypeError::MissingReturn { span, .. }
            | TypeError::MatchArmNotVariant { span, .. }
            | TypeError::NonExhaustiveMatch { span, .. }
            | TypeError::MatchWithoutElse { span }
            | TypeError::MissingField { span, .. }
            | TypeError::UnknownField { span, .. }
            | TypeError::UntypedStructLiteral { span }
            | TypeError::ExpectTypeFailed { span, .. }
            | TypeError::InstantiationTooDeep { span, .. } => *span,
        }
    }
}

/// A non-fatal finding. Warnings never change inferred types.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeWarning {
    /// A statement follows one that never completes.
    UnreachableCode { span: Span },
    /// Return statements of `fun` disagree; the return type became a union.
    InferredUnion { fun: String, ty: Ty, span: Span },
}

impl TypeWarning {
    pub fn span(&self) -> Span {
        match self {
            TypeWarning::UnreachableCode { span } | TypeWarning::InferredUnion { span, .. } => *span,
        }
    }
}

impl fmt::Display for TypeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeWarning::UnreachableCode { .. } => write!(f, "unreachable code"),
            TypeWarning::InferredUnion { fun, ty, .. } => {
                write!(f, "return type of `{}` was inferred as a union `{}`", fun, ty)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_message_shows_range() {
        let err = TypeError::ArityMismatch {
            name: "f".into(),
            min: 1,
            max: 3,
            found: 4,
            span: Span::default(),
        };
        assert_eq!(err.to_string(), "wrong count of arguments for `f`: expected 1 to 3, found 4");
    }

    #[test]
    fn mismatch_message_uses_type_names() {
        let err = TypeError::Mismatch {
            expected: Ty::nullable(Ty::Int),
            found: Ty::Slice,
            origin: ConstraintOrigin::FnArg { fun: "f".into(), param_idx: 1, call_site: Span::new(4, 9) },
            span: Span::new(6, 8),
        };
        assert_eq!(err.to_string(), "type mismatch: expected `int?`, found `slice`");
        assert_eq!(err.span(), Span::new(6, 8));
        if let TypeError::Mismatch { origin, .. } = &err {
            assert_eq!(origin.to_string(), "argument 2 of `f`");
        }
    }
}
