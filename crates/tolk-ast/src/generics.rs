//! Generic parameter lists (`<T, U = int>`) and their substitutions.

use crate::ty::Ty;

#[derive(Clone, Debug, PartialEq)]
pub struct GenericsItem {
    pub name: String,
    pub default_type: Option<Ty>,
}

/// The `<T, U>` list of a generic function, struct or alias.
///
/// For methods of a generic receiver (`fun Wrapper<T>.get(self)`) the
/// first `n_from_receiver` items come from the receiver and are deduced
/// from it rather than given by the caller.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct GenericsDeclaration {
    pub items: Vec<GenericsItem>,
    pub n_from_receiver: usize,
}

impl GenericsDeclaration {
    pub fn new(names: &[&str]) -> Self {
        GenericsDeclaration {
            items: names
                .iter()
                .map(|n| GenericsItem { name: n.to_string(), default_type: None })
                .collect(),
            n_from_receiver: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|i| i.name == name)
    }

    pub fn name_at(&self, idx: usize) -> &str {
        &self.items[idx].name
    }
}

/// Values for each item of a `GenericsDeclaration`; `None` until deduced.
#[derive(Clone, Debug)]
pub struct GenericsSubstitutions {
    declaration: GenericsDeclaration,
    values: Vec<Option<Ty>>,
}

impl GenericsSubstitutions {
    pub fn new(declaration: &GenericsDeclaration) -> Self {
        GenericsSubstitutions {
            declaration: declaration.clone(),
            values: vec![None; declaration.len()],
        }
    }

    /// Substitutions with all values given up front (`f<int, slice>(..)`).
    pub fn from_values(declaration: &GenericsDeclaration, values: Vec<Ty>) -> Self {
        let mut out = Self::new(declaration);
        for (slot, v) in out.values.iter_mut().zip(values) {
            *slot = Some(v);
        }
        out
    }

    pub fn declaration(&self) -> &GenericsDeclaration {
        &self.declaration
    }

    pub fn get(&self, idx: usize) -> Option<&Ty> {
        self.values.get(idx).and_then(Option::as_ref)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Ty> {
        self.get(self.declaration.find(name)?)
    }

    /// Record `ty` for `name` unless a value is already present: the first
    /// binding wins. Returns whether the value was stored.
    pub fn set_if_unset(&mut self, name: &str, ty: Ty) -> bool {
        match self.declaration.find(name) {
            Some(idx) if self.values[idx].is_none() => {
                self.values[idx] = Some(ty);
                true
            }
            _ => false,
        }
    }

    pub fn set_at(&mut self, idx: usize, ty: Ty) {
        self.values[idx] = Some(ty);
    }

    /// Fill still-missing values from declared defaults.
    pub fn apply_defaults(&mut self) {
        for (slot, item) in self.values.iter_mut().zip(&self.declaration.items) {
            if slot.is_none() {
                *slot = item.default_type.clone();
            }
        }
    }

    /// Index of the first item with no value, if any.
    pub fn first_missing(&self) -> Option<usize> {
        self.values.iter().position(Option::is_none)
    }

    pub fn is_complete(&self) -> bool {
        self.first_missing().is_none()
    }

    /// The values in declaration order; only meaningful once complete.
    pub fn values(&self) -> impl Iterator<Item = &Ty> {
        self.values.iter().flatten()
    }

    /// Replace every known generic parameter inside `ty`.
    pub fn substitute(&self, ty: &Ty) -> Ty {
        ty.substitute(&|name: &str| self.get_by_name(name).cloned())
    }
}

impl PartialEq for GenericsSubstitutions {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_binding_wins() {
        let decl = GenericsDeclaration::new(&["T", "U"]);
        let mut subs = GenericsSubstitutions::new(&decl);
        assert!(subs.set_if_unset("T", Ty::Int));
        assert!(!subs.set_if_unset("T", Ty::Slice));
        assert_eq!(subs.get_by_name("T"), Some(&Ty::Int));
        assert_eq!(subs.first_missing(), Some(1));
    }

    #[test]
    fn defaults_fill_gaps() {
        let mut decl = GenericsDeclaration::new(&["T", "U"]);
        decl.items[1].default_type = Some(Ty::Null);
        let mut subs = GenericsSubstitutions::new(&decl);
        subs.set_if_unset("T", Ty::Bool);
        subs.apply_defaults();
        assert!(subs.is_complete());
        let t = subs.substitute(&Ty::Tensor(vec![Ty::generic("T"), Ty::generic("U")]));
        assert_eq!(t, Ty::Tensor(vec![Ty::Bool, Ty::Null]));
    }
}
