//! Least common type ("lca") of two types and the incremental unifier used
//! for ternaries, match arms, inferred return types and flow merges.

use tolk_ast::Ty;

/// The most specific type both `a` and `b` can be assigned to, or `None`
/// when the only answer would be a union of unrelated types.
///
/// Deterministic and side-effect free.
pub fn calculate_type_lca(a: &Ty, b: &Ty) -> Option<Ty> {
    if a == b {
        return Some(a.clone());
    }
    if a.is_never() {
        return Some(b.clone());
    }
    if b.is_never() {
        return Some(a.clone());
    }
    // int8 and int16 meet at int, whichever comes first
    if is_sized_integer(a) && is_sized_integer(b) {
        return Some(Ty::Int);
    }
    if a.can_rhs_be_assigned(b) {
        return Some(a.clone());
    }
    if b.can_rhs_be_assigned(a) {
        return Some(b.clone());
    }
    if a.is_unknown() || b.is_unknown() {
        return Some(Ty::Unknown);
    }
    if a.is_null() {
        return Some(Ty::nullable(b.clone()));
    }
    if b.is_null() {
        return Some(Ty::nullable(a.clone()));
    }

    if let (Some(ta), Some(tb)) = (a.try_as_tensor(), b.try_as_tensor()) {
        return elementwise(ta, tb).map(Ty::Tensor);
    }
    if let (Some(ta), Some(tb)) = (a.try_as_brackets(), b.try_as_brackets()) {
        return elementwise(ta, tb).map(Ty::Brackets);
    }
    None
}

fn is_sized_integer(t: &Ty) -> bool {
    matches!(t.unwrap_alias(), Ty::Int | Ty::IntN { .. } | Ty::Coins)
}

fn elementwise(a: &[Ty], b: &[Ty]) -> Option<Vec<Ty>> {
    if a.len() != b.len() {
        return None;
    }
    a.iter().zip(b).map(|(x, y)| calculate_type_lca(x, y)).collect()
}

/// Folds candidate types one by one into a running common type.
///
/// When two candidates have no lca the result degrades to their union and
/// the pair is remembered; whether that is an error or a warning is the
/// caller's decision.
#[derive(Debug, Default)]
pub struct TypeInferringUnifyStrategy {
    unified: Option<Ty>,
    conflict: Option<(Ty, Ty)>,
}

impl TypeInferringUnifyStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in `next`. A `hint` that accepts both the running result and
    /// `next` wins over the computed lca. Returns `false` on conflict.
    pub fn unify_with(&mut self, next: &Ty, hint: Option<&Ty>) -> bool {
        let Some(current) = &self.unified else {
            self.unified = Some(next.clone());
            return true;
        };
        if current == next {
            return true;
        }
        if let Some(hint) = hint.filter(|h| !h.is_unknown()) {
            if hint.can_rhs_be_assigned(current) && hint.can_rhs_be_assigned(next) {
                self.unified = Some(hint.clone());
                return true;
            }
        }
        match calculate_type_lca(current, next) {
            Some(combined) => {
                self.unified = Some(combined);
                true
            }
            None => {
                if self.conflict.is_none() {
                    self.conflict = Some((current.clone(), next.clone()));
                }
                self.unified = Some(Ty::union([current.clone(), next.clone()]));
                false
            }
        }
    }

    /// A function body that falls off its end returns `void`.
    pub fn unify_with_implicit_return_void(&mut self) -> bool {
        match &self.unified {
            None => {
                self.unified = Some(Ty::Void);
                true
            }
            Some(t) => t.is_void(),
        }
    }

    pub fn result(&self) -> Option<&Ty> {
        self.unified.as_ref()
    }

    pub fn into_result(self) -> Option<Ty> {
        self.unified
    }

    /// The first pair of candidates that had no common type.
    pub fn conflict(&self) -> Option<&(Ty, Ty)> {
        self.conflict.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Ty> {
        vec![
            Ty::Int,
            Ty::Slice,
            Ty::Null,
            Ty::Never,
            Ty::int_n(8),
            Ty::uint_n(32),
            Ty::nullable(Ty::Int),
            Ty::Tensor(vec![Ty::Int, Ty::Null]),
            Ty::Tensor(vec![Ty::Null, Ty::Int]),
            Ty::Brackets(vec![Ty::Int]),
        ]
    }

    #[test]
    fn lca_identity_and_never() {
        for t in samples() {
            assert_eq!(calculate_type_lca(&t, &t), Some(t.clone()));
            assert_eq!(calculate_type_lca(&Ty::Never, &t), Some(t.clone()));
            assert_eq!(calculate_type_lca(&t, &Ty::Never), Some(t.clone()));
        }
    }

    #[test]
    fn lca_is_commutative() {
        let all = samples();
        for a in &all {
            for b in &all {
                assert_eq!(
                    calculate_type_lca(a, b),
                    calculate_type_lca(b, a),
                    "lca({}, {}) is not symmetric",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn lca_rules() {
        assert_eq!(calculate_type_lca(&Ty::Int, &Ty::Null), Some(Ty::nullable(Ty::Int)));
        assert_eq!(calculate_type_lca(&Ty::int_n(8), &Ty::uint_n(16)), Some(Ty::Int));
        assert_eq!(calculate_type_lca(&Ty::Unknown, &Ty::Slice), Some(Ty::Unknown));
        assert_eq!(
            calculate_type_lca(
                &Ty::Tensor(vec![Ty::Int, Ty::Null]),
                &Ty::Tensor(vec![Ty::Null, Ty::Int])
            ),
            Some(Ty::Tensor(vec![Ty::nullable(Ty::Int), Ty::nullable(Ty::Int)]))
        );
        assert_eq!(calculate_type_lca(&Ty::Int, &Ty::Slice), None);
        assert_eq!(
            calculate_type_lca(&Ty::Tensor(vec![Ty::Int]), &Ty::Tensor(vec![Ty::Int, Ty::Int])),
            None
        );
    }

    #[test]
    fn unifier_reports_conflict_and_keeps_union() {
        let mut u = TypeInferringUnifyStrategy::new();
        assert!(u.unify_with(&Ty::Int, None));
        assert!(!u.unify_with(&Ty::Slice, None));
        assert_eq!(u.result(), Some(&Ty::union([Ty::Int, Ty::Slice])));
        assert_eq!(u.conflict(), Some(&(Ty::Int, Ty::Slice)));
    }

    #[test]
    fn unifier_prefers_accepting_hint() {
        let hint = Ty::union([Ty::Int, Ty::Slice, Ty::Null]);
        let mut u = TypeInferringUnifyStrategy::new();
        u.unify_with(&Ty::Int, Some(&hint));
        assert!(u.unify_with(&Ty::Slice, Some(&hint)));
        assert_eq!(u.into_result(), Some(hint));
    }

    #[test]
    fn implicit_void_return() {
        let mut u = TypeInferringUnifyStrategy::new();
        assert!(u.unify_with_implicit_return_void());
        assert_eq!(u.result(), Some(&Ty::Void));
        let mut u = TypeInferringUnifyStrategy::new();
        u.unify_with(&Ty::Int, None);
        assert!(!u.unify_with_implicit_return_void());
    }
}
