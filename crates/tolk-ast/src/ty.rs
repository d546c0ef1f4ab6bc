//! Type representation for the Tolk type system.
//!
//! `Ty` is a plain structural enum: two types are equal when they have the
//! same shape and refer to the same symbols. Unions are kept flat and
//! deduplicated by the `Ty::union` constructor, so `int?` and `int | null`
//! are the same value.

use std::fmt;

use crate::symbols::{AliasId, StructId};

/// The symbol a generic-with-arguments type node refers to before
/// instantiation (`Wrapper<int>`, `Pair<T, slice>`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GenericBase {
    Struct(StructId),
    Alias(AliasId),
}

/// A Tolk type.
#[derive(Clone, Debug, Eq)]
pub enum Ty {
    Int,
    Bool,
    Cell,
    Slice,
    Builder,
    Continuation,
    Address,
    /// An untyped TVM tuple.
    Tuple,
    Void,
    /// The bottom type: the type of unreachable values.
    Never,
    Unknown,
    /// The type of the `null` literal.
    Null,
    Coins,
    /// `int8`, `uint64`, `int257`, ...
    IntN { bits: u16, unsigned: bool },
    /// `bytes32` (`bits == false`) or `bits256` (`bits == true`).
    BytesN { width: u16, bits: bool },
    /// A function value type: `(params) -> ret`.
    Callable(Vec<Ty>, Box<Ty>),
    /// `(int, slice)`: several values on the stack.
    Tensor(Vec<Ty>),
    /// `[int, slice]`: a typed tuple.
    Brackets(Vec<Ty>),
    /// A flat union of at least two distinct variants. `T?` is `T | null`.
    Union(Vec<Ty>),
    Struct(StructId, String),
    /// A named alias; equality keeps the name, assignability looks through it.
    Alias(AliasId, String, Box<Ty>),
    /// A generic parameter `T` of the enclosing declaration.
    Generic(String),
    /// A generic struct or alias applied to arguments, not yet instantiated.
    GenericApp(GenericBase, String, Vec<Ty>),
}

/// Structural equality; unions compare as sets, so `int | slice` equals
/// `slice | int`.
impl PartialEq for Ty {
    fn eq(&self, other: &Ty) -> bool {
        match (self, other) {
            (Ty::Union(a), Ty::Union(b)) => a.len() == b.len() && a.iter().all(|v| b.contains(v)),
            (Ty::IntN { bits: a, unsigned: ua }, Ty::IntN { bits: b, unsigned: ub }) => a == b && ua == ub,
            (Ty::BytesN { width: a, bits: ba }, Ty::BytesN { width: b, bits: bb }) => a == b && ba == bb,
            (Ty::Callable(pa, ra), Ty::Callable(pb, rb)) => pa == pb && ra == rb,
            (Ty::Tensor(a), Ty::Tensor(b)) | (Ty::Brackets(a), Ty::Brackets(b)) => a == b,
            (Ty::Struct(a, _), Ty::Struct(b, _)) => a == b,
            (Ty::Alias(a, _, _), Ty::Alias(b, _, _)) => a == b,
            (Ty::Generic(a), Ty::Generic(b)) => a == b,
            (Ty::GenericApp(ba, _, aa), Ty::GenericApp(bb, _, ab)) => ba == bb && aa == ab,
            (a, b) => a.is_leaf() && std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

impl Ty {
    pub fn int_n(bits: u16) -> Ty {
        Ty::IntN { bits, unsigned: false }
    }

    pub fn uint_n(bits: u16) -> Ty {
        Ty::IntN { bits, unsigned: true }
    }

    pub fn bytes_n(width: u16) -> Ty {
        Ty::BytesN { width, bits: false }
    }

    pub fn bits_n(width: u16) -> Ty {
        Ty::BytesN { width, bits: true }
    }

    pub fn callable(params: Vec<Ty>, ret: Ty) -> Ty {
        Ty::Callable(params, Box::new(ret))
    }

    pub fn generic(name: impl Into<String>) -> Ty {
        Ty::Generic(name.into())
    }

    /// Kinds without a payload: equal whenever the kinds match.
    fn is_leaf(&self) -> bool {
        matches!(
            self,
            Ty::Int
                | Ty::Bool
                | Ty::Cell
                | Ty::Slice
                | Ty::Builder
                | Ty::Continuation
                | Ty::Address
                | Ty::Tuple
                | Ty::Void
                | Ty::Never
                | Ty::Unknown
                | Ty::Null
                | Ty::Coins
        )
    }

    /// Build a union from `variants`, flattening nested unions and dropping
    /// duplicates while keeping the first-seen order.
    ///
    /// A single remaining variant is returned as-is; no variants at all
    /// collapse to `never`.
    pub fn union(variants: impl IntoIterator<Item = Ty>) -> Ty {
        let mut flat: Vec<Ty> = Vec::new();
        for v in variants {
            match v {
                Ty::Union(inner) => {
                    for i in inner {
                        if !flat.contains(&i) {
                            flat.push(i);
                        }
                    }
                }
                Ty::Never => {}
                other => {
                    if !flat.contains(&other) {
                        flat.push(other);
                    }
                }
            }
        }
        match flat.len() {
            0 => Ty::Never,
            1 => flat.pop().unwrap_or(Ty::Never),
            _ => Ty::Union(flat),
        }
    }

    /// `T?`. Nullable of something that already holds null is itself.
    pub fn nullable(inner: Ty) -> Ty {
        if inner.can_hold_null() {
            return inner;
        }
        Ty::union([inner, Ty::Null])
    }

    /// Follow alias chains down to the first non-alias type.
    pub fn unwrap_alias(&self) -> &Ty {
        let mut cur = self;
        while let Ty::Alias(_, _, underlying) = cur {
            cur = underlying;
        }
        cur
    }

    pub fn try_as_tensor(&self) -> Option<&[Ty]> {
        match self.unwrap_alias() {
            Ty::Tensor(items) => Some(items),
            _ => None,
        }
    }

    pub fn try_as_brackets(&self) -> Option<&[Ty]> {
        match self.unwrap_alias() {
            Ty::Brackets(items) => Some(items),
            _ => None,
        }
    }

    pub fn try_as_union(&self) -> Option<&[Ty]> {
        match self.unwrap_alias() {
            Ty::Union(variants) => Some(variants),
            _ => None,
        }
    }

    pub fn try_as_callable(&self) -> Option<(&[Ty], &Ty)> {
        match self.unwrap_alias() {
            Ty::Callable(params, ret) => Some((params, ret)),
            _ => None,
        }
    }

    pub fn try_as_struct(&self) -> Option<StructId> {
        match self.unwrap_alias() {
            Ty::Struct(id, _) => Some(*id),
            _ => None,
        }
    }

    /// `int`, `intN`, `uintN` and `coins`.
    pub fn is_integer(&self) -> bool {
        matches!(self.unwrap_alias(), Ty::Int | Ty::IntN { .. } | Ty::Coins)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.unwrap_alias(), Ty::Bool)
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Ty::Never)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.unwrap_alias(), Ty::Void)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.unwrap_alias(), Ty::Unknown)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.unwrap_alias(), Ty::Null)
    }

    /// Whether a value of this type may be `null` at runtime.
    pub fn can_hold_null(&self) -> bool {
        match self.unwrap_alias() {
            Ty::Null | Ty::Unknown => true,
            Ty::Union(variants) => variants.iter().any(|v| v.is_null()),
            _ => false,
        }
    }

    /// For `T?` returns `T`; for wider unions returns the union without null.
    pub fn without_null(&self) -> Ty {
        self.subtract(&Ty::Null)
    }

    /// Whether `variant` is literally one of the union's variants (or the
    /// type itself for non-unions).
    pub fn has_variant(&self, variant: &Ty) -> bool {
        match self.unwrap_alias() {
            Ty::Union(variants) => variants.contains(variant),
            other => other == variant || self == variant,
        }
    }

    /// Remove `other` (or all of its variants, when it is a union) from this
    /// type. The result may be `never`.
    pub fn subtract(&self, other: &Ty) -> Ty {
        let removed: &[Ty] = match other {
            Ty::Union(vs) => vs,
            single => std::slice::from_ref(single),
        };
        match self.unwrap_alias() {
            Ty::Union(variants) => {
                Ty::union(variants.iter().filter(|v| !removed.contains(v)).cloned())
            }
            _ if removed.contains(self) || removed.contains(self.unwrap_alias()) => Ty::Never,
            _ => self.clone(),
        }
    }

    /// Whether any generic parameter `T` occurs anywhere inside.
    pub fn has_generic_inside(&self) -> bool {
        match self {
            Ty::Generic(_) => true,
            Ty::GenericApp(_, _, args) => args.iter().any(Ty::has_generic_inside),
            Ty::Alias(_, _, underlying) => underlying.has_generic_inside(),
            other => other.children().iter().any(|c| c.has_generic_inside()),
        }
    }

    /// Whether `unknown` occurs anywhere inside.
    pub fn has_unknown_inside(&self) -> bool {
        match self {
            Ty::Unknown => true,
            other => other.children().iter().any(|c| c.has_unknown_inside()),
        }
    }

    /// Direct structural children, in order. Aliases expose nothing: their
    /// identity is the name.
    pub fn children(&self) -> Vec<&Ty> {
        match self {
            Ty::Callable(params, ret) => {
                let mut out: Vec<&Ty> = params.iter().collect();
                out.push(ret);
                out
            }
            Ty::Tensor(items) | Ty::Brackets(items) | Ty::Union(items) => items.iter().collect(),
            Ty::GenericApp(_, _, args) => args.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Rebuild this type with each direct child replaced by `f(child)`.
    /// Unions are re-normalized after the replacement.
    pub fn map_children(&self, f: &mut impl FnMut(&Ty) -> Ty) -> Ty {
        match self {
            Ty::Callable(params, ret) => {
                let params = params.iter().map(&mut *f).collect();
                Ty::Callable(params, Box::new(f(ret)))
            }
            Ty::Tensor(items) => Ty::Tensor(items.iter().map(&mut *f).collect()),
            Ty::Brackets(items) => Ty::Brackets(items.iter().map(&mut *f).collect()),
            Ty::Union(items) => Ty::union(items.iter().map(&mut *f).collect::<Vec<_>>()),
            Ty::GenericApp(base, name, args) => {
                Ty::GenericApp(*base, name.clone(), args.iter().map(&mut *f).collect())
            }
            other => other.clone(),
        }
    }

    /// Replace every generic parameter for which `lookup` has an answer.
    pub fn substitute(&self, lookup: &impl Fn(&str) -> Option<Ty>) -> Ty {
        match self {
            Ty::Generic(name) => lookup(name).unwrap_or_else(|| self.clone()),
            Ty::Alias(id, name, underlying) if underlying.has_generic_inside() => {
                Ty::Alias(*id, name.clone(), Box::new(underlying.substitute(lookup)))
            }
            other => other.map_children(&mut |c| c.substitute(lookup)),
        }
    }

    /// Assignability: may a value of type `rhs` be stored where `self` is
    /// expected?
    pub fn can_rhs_be_assigned(&self, rhs: &Ty) -> bool {
        if self == rhs {
            return true;
        }
        let lhs = self.unwrap_alias();
        let rhs = rhs.unwrap_alias();
        if lhs == rhs || matches!(rhs, Ty::Never) {
            return true;
        }
        match lhs {
            Ty::Unknown => true,
            Ty::Int => matches!(rhs, Ty::IntN { .. } | Ty::Coins),
            Ty::IntN { .. } | Ty::Coins => matches!(rhs, Ty::Int),
            Ty::Tuple => matches!(rhs, Ty::Brackets(_)),
            Ty::Union(variants) => match rhs {
                Ty::Union(rhs_variants) => rhs_variants
                    .iter()
                    .all(|r| variants.iter().any(|l| l.can_rhs_be_assigned(r))),
                _ => variants.iter().any(|l| l.can_rhs_be_assigned(rhs)),
            },
            Ty::Tensor(ls) => match rhs {
                Ty::Tensor(rs) => {
                    ls.len() == rs.len() && ls.iter().zip(rs).all(|(l, r)| l.can_rhs_be_assigned(r))
                }
                _ => false,
            },
            Ty::Brackets(ls) => match rhs {
                Ty::Brackets(rs) => {
                    ls.len() == rs.len() && ls.iter().zip(rs).all(|(l, r)| l.can_rhs_be_assigned(r))
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Number of stack slots a value occupies. Struct widths are supplied by
    /// the caller since they depend on field declarations.
    pub fn width_on_stack(&self, struct_width: &impl Fn(StructId) -> usize) -> usize {
        match self {
            Ty::Void | Ty::Never => 0,
            Ty::Alias(_, _, underlying) => underlying.width_on_stack(struct_width),
            Ty::Tensor(items) => items.iter().map(|i| i.width_on_stack(struct_width)).sum(),
            Ty::Struct(id, _) => struct_width(*id),
            Ty::Union(variants) => {
                let widest = variants
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(|v| v.width_on_stack(struct_width))
                    .max()
                    .unwrap_or(0);
                let is_primitive_nullable = variants.len() == 2
                    && self.can_hold_null()
                    && widest == 1
                    && variants.iter().all(|v| v.try_as_tensor().is_none());
                if is_primitive_nullable {
                    1
                } else {
                    widest + 1
                }
            }
            _ => 1,
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Ty]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Int => write!(f, "int"),
            Ty::Bool => write!(f, "bool"),
            Ty::Cell => write!(f, "cell"),
            Ty::Slice => write!(f, "slice"),
            Ty::Builder => write!(f, "builder"),
            Ty::Continuation => write!(f, "continuation"),
            Ty::Address => write!(f, "address"),
            Ty::Tuple => write!(f, "tuple"),
            Ty::Void => write!(f, "void"),
            Ty::Never => write!(f, "never"),
            Ty::Unknown => write!(f, "unknown"),
            Ty::Null => write!(f, "null"),
            Ty::Coins => write!(f, "coins"),
            Ty::IntN { bits, unsigned } => {
                write!(f, "{}int{}", if *unsigned { "u" } else { "" }, bits)
            }
            Ty::BytesN { width, bits } => {
                write!(f, "{}{}", if *bits { "bits" } else { "bytes" }, width)
            }
            Ty::Callable(params, ret) => {
                write!(f, "(")?;
                write_list(f, params)?;
                write!(f, ") -> {}", ret)
            }
            Ty::Tensor(items) => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            Ty::Brackets(items) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            Ty::Union(variants) => {
                if variants.len() == 2 && variants.contains(&Ty::Null) {
                    let inner = variants.iter().find(|v| !v.is_null()).unwrap_or(&Ty::Null);
                    return match inner {
                        Ty::Callable(..) => write!(f, "({})?", inner),
                        _ => write!(f, "{}?", inner),
                    };
                }
                for (i, v) in variants.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", v)?;
                }
                Ok(())
            }
            Ty::Struct(_, name) | Ty::Alias(_, name, _) | Ty::Generic(name) => write!(f, "{}", name),
            Ty::GenericApp(_, name, args) => {
                write!(f, "{}<", name)?;
                write_list(f, args)?;
                write!(f, ">")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_is_flat_and_deduplicated() {
        let u = Ty::union([Ty::Int, Ty::union([Ty::Slice, Ty::Int]), Ty::Null]);
        assert_eq!(u, Ty::Union(vec![Ty::Int, Ty::Slice, Ty::Null]));
        assert_eq!(Ty::union([Ty::Int, Ty::Int]), Ty::Int);
        assert_eq!(Ty::union(Vec::new()), Ty::Never);
    }

    #[test]
    fn union_equality_ignores_order() {
        assert_eq!(Ty::union([Ty::Int, Ty::Slice]), Ty::union([Ty::Slice, Ty::Int]));
        assert_ne!(Ty::union([Ty::Int, Ty::Slice]), Ty::union([Ty::Int, Ty::Cell]));
        assert_ne!(Ty::Tensor(vec![Ty::Int, Ty::Slice]), Ty::Tensor(vec![Ty::Slice, Ty::Int]));
    }

    #[test]
    fn nullable_display() {
        assert_eq!(Ty::nullable(Ty::Int).to_string(), "int?");
        assert_eq!(Ty::nullable(Ty::nullable(Ty::Int)), Ty::nullable(Ty::Int));
        assert_eq!(
            Ty::nullable(Ty::callable(vec![Ty::Int], Ty::Void)).to_string(),
            "((int) -> void)?"
        );
        assert_eq!(Ty::union([Ty::Int, Ty::Slice, Ty::Null]).to_string(), "int | slice | null");
    }

    #[test]
    fn display_compound() {
        let t = Ty::Tensor(vec![Ty::uint_n(64), Ty::Brackets(vec![Ty::bits_n(256), Ty::Coins])]);
        assert_eq!(t.to_string(), "(uint64, [bits256, coins])");
    }

    #[test]
    fn assignability() {
        let int_q = Ty::nullable(Ty::Int);
        assert!(int_q.can_rhs_be_assigned(&Ty::Int));
        assert!(int_q.can_rhs_be_assigned(&Ty::Null));
        assert!(!Ty::Int.can_rhs_be_assigned(&int_q));
        assert!(Ty::Int.can_rhs_be_assigned(&Ty::int_n(8)));
        assert!(Ty::int_n(8).can_rhs_be_assigned(&Ty::Int));
        assert!(!Ty::int_n(8).can_rhs_be_assigned(&Ty::int_n(16)));
        assert!(Ty::Int.can_rhs_be_assigned(&Ty::Never));
        let wide = Ty::union([Ty::Int, Ty::Slice, Ty::Null]);
        assert!(wide.can_rhs_be_assigned(&int_q));
        assert!(!int_q.can_rhs_be_assigned(&wide));
    }

    #[test]
    fn alias_is_transparent_for_assignment_only() {
        let alias = Ty::Alias(AliasId(0), "MyInt".into(), Box::new(Ty::Int));
        assert_ne!(alias, Ty::Int);
        assert!(alias.can_rhs_be_assigned(&Ty::Int));
        assert!(Ty::Int.can_rhs_be_assigned(&alias));
        assert!(alias.is_integer());
    }

    #[test]
    fn subtract_variants() {
        let u = Ty::union([Ty::Int, Ty::Slice, Ty::Null]);
        assert_eq!(u.without_null(), Ty::union([Ty::Int, Ty::Slice]));
        assert_eq!(u.subtract(&Ty::union([Ty::Int, Ty::Null])), Ty::Slice);
        assert_eq!(Ty::Int.subtract(&Ty::Int), Ty::Never);
        assert_eq!(Ty::Int.subtract(&Ty::Slice), Ty::Int);
    }

    #[test]
    fn substitute_generics() {
        let t = Ty::Tensor(vec![Ty::generic("T"), Ty::nullable(Ty::generic("U"))]);
        assert!(t.has_generic_inside());
        let r = t.substitute(&|name: &str| match name {
            "T" => Some(Ty::Int),
            "U" => Some(Ty::Null),
            _ => None,
        });
        assert_eq!(r, Ty::Tensor(vec![Ty::Int, Ty::Null]));
        assert!(!r.has_generic_inside());
    }

    #[test]
    fn widths() {
        let no_structs = |_: StructId| 0;
        assert_eq!(Ty::Int.width_on_stack(&no_structs), 1);
        assert_eq!(Ty::nullable(Ty::Int).width_on_stack(&no_structs), 1);
        let pair = Ty::Tensor(vec![Ty::Int, Ty::Int]);
        assert_eq!(pair.width_on_stack(&no_structs), 2);
        assert_eq!(Ty::nullable(pair).width_on_stack(&no_structs), 3);
        assert_eq!(Ty::Void.width_on_stack(&no_structs), 0);
    }
}
