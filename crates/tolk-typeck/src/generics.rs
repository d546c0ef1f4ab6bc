//! Deducing generic parameters (`T`) from call arguments.
//!
//! Deduction never fails by itself: the first binding of each parameter
//! wins and later, conflicting evidence is ignored. A bad deduction shows
//! up afterwards, when the arguments are checked against the substituted
//! signature.

use tolk_ast::{GenericBase, GenericsDeclaration, GenericsSubstitutions, SymbolTable, Ty};

/// The `T | null` shape: returns `T` for a two-variant union with null.
fn or_null(t: &Ty) -> Option<&Ty> {
    match t.try_as_union()? {
        [a, b] if b.is_null() => Some(a),
        [a, b] if a.is_null() => Some(b),
        _ => None,
    }
}

#[derive(Clone, Debug)]
pub struct GenericSubstitutionsDeducing {
    deduced: GenericsSubstitutions,
}

impl GenericSubstitutionsDeducing {
    pub fn new(declaration: &GenericsDeclaration) -> Self {
        GenericSubstitutionsDeducing { deduced: GenericsSubstitutions::new(declaration) }
    }

    /// Start from explicitly given type arguments (`f<int>(..)`). They fill
    /// the parameters after the first `offset`, which come from a receiver.
    pub fn with_explicit(declaration: &GenericsDeclaration, offset: usize, type_args: Vec<Ty>) -> Self {
        let mut deduced = GenericsSubstitutions::new(declaration);
        for (idx, ty) in type_args.into_iter().enumerate() {
            deduced.set_at(offset + idx, ty);
        }
        GenericSubstitutionsDeducing { deduced }
    }

    /// `param_type` with every parameter deduced so far substituted.
    pub fn replace_known(&self, param_type: &Ty) -> Ty {
        self.deduced.substitute(param_type)
    }

    /// Match `param_type` against `arg_type`, binding every generic
    /// parameter found on the way that is still unset.
    pub fn consider_next_condition(&mut self, symbols: &SymbolTable, param_type: &Ty, arg_type: &Ty) {
        if let Ty::Generic(name) = param_type {
            self.deduced.set_if_unset(name, arg_type.clone());
            return;
        }
        if let Some(p_inner) = or_null(param_type) {
            // `T?` against `int?` binds `T = int`; against `int` as well
            match or_null(arg_type) {
                Some(a_inner) => self.consider_next_condition(symbols, p_inner, a_inner),
                None => self.consider_next_condition(symbols, p_inner, arg_type),
            }
            return;
        }
        match param_type {
            Ty::Tensor(ps) => {
                if let Some(args) = arg_type.try_as_tensor() {
                    self.consider_pairwise(symbols, ps, args);
                }
            }
            Ty::Brackets(ps) => {
                if let Some(args) = arg_type.try_as_brackets() {
                    self.consider_pairwise(symbols, ps, args);
                }
            }
            Ty::Callable(p_params, p_ret) => {
                if let Some((a_params, a_ret)) = arg_type.try_as_callable() {
                    if p_params.len() == a_params.len() {
                        self.consider_pairwise(symbols, p_params, a_params);
                        self.consider_next_condition(symbols, p_ret, a_ret);
                    }
                }
            }
            Ty::Union(p_variants) => {
                if let Some(a_variants) = arg_type.try_as_union() {
                    self.consider_union(symbols, p_variants, a_variants);
                }
            }
            Ty::GenericApp(GenericBase::Struct(base), _, p_args) => {
                if let Some(id) = arg_type.try_as_struct() {
                    let data = symbols.struct_data(id);
                    if data.base_struct == Some(*base) {
                        if let Some(subs) = &data.substitutions {
                            let a_args: Vec<Ty> = subs.values().cloned().collect();
                            self.consider_pairwise(symbols, p_args, &a_args);
                        }
                    }
                }
            }
            Ty::GenericApp(GenericBase::Alias(base), _, p_args) => {
                if let Ty::Alias(id, _, _) = arg_type {
                    let data = symbols.alias(*id);
                    if data.base_alias == Some(*base) {
                        if let Some(subs) = &data.substitutions {
                            let a_args: Vec<Ty> = subs.values().cloned().collect();
                            self.consider_pairwise(symbols, p_args, &a_args);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn consider_pairwise(&mut self, symbols: &SymbolTable, params: &[Ty], args: &[Ty]) {
        if params.len() != args.len() {
            return;
        }
        for (p, a) in params.iter().zip(args) {
            self.consider_next_condition(symbols, p, a);
        }
    }

    /// `int | T` against `int | slice | builder` binds `T = slice | builder`;
    /// `T1 | T2` against `int | slice` binds them pairwise.
    fn consider_union(&mut self, symbols: &SymbolTable, p_variants: &[Ty], a_variants: &[Ty]) {
        let mut p_generic: Vec<&Ty> = Vec::new();
        let mut a_rest: Vec<Ty> = a_variants.to_vec();
        let mut is_sub_correct = true;
        for p in p_variants {
            if p.has_generic_inside() {
                p_generic.push(p);
            } else if let Some(pos) = a_rest.iter().position(|a| a == p) {
                a_rest.remove(pos);
            } else {
                is_sub_correct = false;
            }
        }
        if !is_sub_correct {
            return;
        }
        if p_generic.len() == 1 && a_rest.len() > 1 {
            self.consider_next_condition(symbols, p_generic[0], &Ty::union(a_rest));
        } else if p_generic.len() == a_rest.len() {
            for (p, a) in p_generic.into_iter().zip(&a_rest) {
                self.consider_next_condition(symbols, p, a);
            }
        }
    }

    /// Deduce from one argument and return the parameter type with what is
    /// known so far substituted (it may still mention parameters).
    pub fn auto_deduce_from_argument(&mut self, symbols: &SymbolTable, param_type: &Ty, arg_type: &Ty) -> Ty {
        self.consider_next_condition(symbols, param_type, arg_type);
        self.replace_known(param_type)
    }

    /// Name of the first parameter without a value.
    pub fn first_undeduced(&self) -> Option<&str> {
        let idx = self.deduced.first_missing()?;
        Some(self.deduced.declaration().name_at(idx))
    }

    pub fn apply_defaults(&mut self) {
        self.deduced.apply_defaults();
    }

    pub fn substitutions(&self) -> &GenericsSubstitutions {
        &self.deduced
    }

    pub fn into_substitutions(self) -> GenericsSubstitutions {
        self.deduced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tolk_ast::build::StructBuilder;
    use tolk_ast::StructId;

    fn deducer(names: &[&str]) -> GenericSubstitutionsDeducing {
        GenericSubstitutionsDeducing::new(&GenericsDeclaration::new(names))
    }

    fn t(name: &str) -> Ty {
        Ty::generic(name)
    }

    #[test]
    fn bare_parameter_first_binding_wins() {
        let symbols = SymbolTable::new();
        let mut d = deducer(&["T"]);
        let hint = d.auto_deduce_from_argument(&symbols, &t("T"), &Ty::Int);
        assert_eq!(hint, Ty::Int);
        d.consider_next_condition(&symbols, &t("T"), &Ty::Slice);
        assert_eq!(d.substitutions().get(0), Some(&Ty::Int));
    }

    #[test]
    fn nullable_parameter() {
        let symbols = SymbolTable::new();
        let mut d = deducer(&["T"]);
        d.consider_next_condition(&symbols, &Ty::nullable(t("T")), &Ty::nullable(Ty::Cell));
        assert_eq!(d.substitutions().get(0), Some(&Ty::Cell));

        let mut d = deducer(&["T"]);
        d.consider_next_condition(&symbols, &Ty::nullable(t("T")), &Ty::Slice);
        assert_eq!(d.substitutions().get(0), Some(&Ty::Slice));
    }

    #[test]
    fn tensor_and_callable() {
        let symbols = SymbolTable::new();
        let mut d = deducer(&["A", "B"]);
        d.consider_next_condition(
            &symbols,
            &Ty::callable(vec![t("A")], Ty::Tensor(vec![t("B"), Ty::Int])),
            &Ty::callable(vec![Ty::Slice], Ty::Tensor(vec![Ty::Bool, Ty::Int])),
        );
        assert_eq!(d.substitutions().get(0), Some(&Ty::Slice));
        assert_eq!(d.substitutions().get(1), Some(&Ty::Bool));
    }

    #[test]
    fn arity_mismatch_contributes_nothing() {
        let symbols = SymbolTable::new();
        let mut d = deducer(&["T"]);
        d.consider_next_condition(&symbols, &Ty::Tensor(vec![t("T")]), &Ty::Tensor(vec![Ty::Int, Ty::Int]));
        assert_eq!(d.first_undeduced(), Some("T"));
    }

    #[test]
    fn union_absorbs_remaining_variants() {
        let symbols = SymbolTable::new();
        let mut d = deducer(&["T"]);
        d.consider_next_condition(
            &symbols,
            &Ty::union([Ty::Int, t("T")]),
            &Ty::union([Ty::Builder, Ty::Int, Ty::Slice]),
        );
        assert_eq!(d.substitutions().get(0), Some(&Ty::union([Ty::Builder, Ty::Slice])));

        let mut d = deducer(&["T1", "T2"]);
        d.consider_next_condition(&symbols, &Ty::union([t("T1"), t("T2")]), &Ty::union([Ty::Int, Ty::Slice]));
        assert_eq!(d.substitutions().get(0), Some(&Ty::Int));
        assert_eq!(d.substitutions().get(1), Some(&Ty::Slice));
    }

    #[test]
    fn generic_struct_argument() {
        let mut symbols = SymbolTable::new();
        let mut wrapper = StructBuilder::new("Wrapper");
        wrapper.generics(&["T"]).field("value", t("T"));
        let base = symbols.add_struct(wrapper.finish());

        let mut inst = StructBuilder::new("Wrapper<int>");
        inst.field("value", Ty::Int);
        let mut inst = inst.finish();
        inst.base_struct = Some(base);
        inst.substitutions = Some(GenericsSubstitutions::from_values(
            &GenericsDeclaration::new(&["T"]),
            vec![Ty::Int],
        ));
        let inst_id = symbols.add_struct(inst);
        assert_eq!(inst_id, StructId(1));

        let mut d = deducer(&["U"]);
        d.consider_next_condition(
            &symbols,
            &Ty::GenericApp(GenericBase::Struct(base), "Wrapper".into(), vec![t("U")]),
            &Ty::Struct(inst_id, "Wrapper<int>".into()),
        );
        assert_eq!(d.substitutions().get(0), Some(&Ty::Int));
    }

    #[test]
    fn explicit_arguments_skip_receiver_params() {
        let symbols = SymbolTable::new();
        let mut decl = GenericsDeclaration::new(&["T", "U"]);
        decl.n_from_receiver = 1;
        let mut d = GenericSubstitutionsDeducing::with_explicit(&decl, 1, vec![Ty::Slice]);
        assert_eq!(d.first_undeduced(), Some("T"));
        d.consider_next_condition(&symbols, &t("T"), &Ty::Int);
        assert_eq!(d.replace_known(&Ty::Tensor(vec![t("T"), t("U")])), Ty::Tensor(vec![Ty::Int, Ty::Slice]));
    }

    #[test]
    fn defaults_after_deduction() {
        let symbols = SymbolTable::new();
        let mut decl = GenericsDeclaration::new(&["T", "E"]);
        decl.items[1].default_type = Some(Ty::Null);
        let mut d = GenericSubstitutionsDeducing::new(&decl);
        d.consider_next_condition(&symbols, &t("T"), &Ty::Int);
        assert_eq!(d.first_undeduced(), Some("E"));
        d.apply_defaults();
        assert_eq!(d.first_undeduced(), None);
    }
}
