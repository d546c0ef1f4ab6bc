//! Symbol arena: functions, structs, aliases, globals and constants.
//!
//! Symbols are addressed by small copyable ids. Locals and parameters live
//! inside their owning function and are addressed by `LocalVarId` relative
//! to it; parameters always occupy the first `n_params` slots.

use rustc_hash::FxHashMap;
use tolk_common::Span;

use crate::ast::{Block, Expr};
use crate::generics::{GenericsDeclaration, GenericsSubstitutions};
use crate::ty::Ty;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AliasId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalVarId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstId(pub u32);

/// A local variable or parameter, relative to the function that owns it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalVarId(pub u32);

/// What a global name refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SymbolRef {
    Function(FunctionId),
    Struct(StructId),
    Alias(AliasId),
    GlobalVar(GlobalVarId),
    Const(ConstId),
}

/// Progress of on-demand inference for a function body or constant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum InferenceState {
    #[default]
    NotStarted,
    InProgress,
    Done,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocalVarData {
    pub name: String,
    pub span: Span,
    /// `None` when the declaration omitted the type: it is inferred from
    /// the initializer.
    pub declared_type: Option<Ty>,
    pub inferred_type: Option<Ty>,
    pub param_idx: Option<usize>,
    pub is_mutate: bool,
    /// Default value for a trailing parameter.
    pub default_value: Option<Expr>,
}

impl LocalVarData {
    pub fn new(name: impl Into<String>, declared_type: Option<Ty>) -> Self {
        LocalVarData {
            name: name.into(),
            span: Span::default(),
            declared_type,
            inferred_type: None,
            param_idx: None,
            is_mutate: false,
            default_value: None,
        }
    }

    /// The declared type, or the one inferred from the initializer.
    pub fn declared_or_inferred(&self) -> Option<&Ty> {
        self.declared_type.as_ref().or(self.inferred_type.as_ref())
    }
}

/// How a function is implemented.
#[derive(Clone, Debug, PartialEq)]
pub enum FunctionBody {
    Code(Block),
    Asm(Vec<String>),
    /// Implemented by the compiler itself.
    Builtin,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionData {
    pub name: String,
    pub span: Span,
    /// For methods: the type the method is declared for (may mention `T`).
    pub receiver_type: Option<Ty>,
    pub method_name: Option<String>,
    pub n_params: usize,
    /// Parameters first, then locals.
    pub locals: Vec<LocalVarData>,
    pub declared_return_type: Option<Ty>,
    pub inferred_return_type: Option<Ty>,
    pub generics: Option<GenericsDeclaration>,
    /// Set on instantiations of a generic function.
    pub substitutions: Option<GenericsSubstitutions>,
    pub base_fun: Option<FunctionId>,
    pub body: FunctionBody,
    /// The call evaluates to its receiver (`b.storeInt(..)` chains).
    pub returns_self: bool,
    /// Generic parameters may be instantiated with multi-slot types.
    pub allow_variadic_width_t: bool,
    pub state: InferenceState,
}

impl FunctionData {
    pub fn new(name: impl Into<String>) -> Self {
        FunctionData {
            name: name.into(),
            span: Span::default(),
            receiver_type: None,
            method_name: None,
            n_params: 0,
            locals: Vec::new(),
            declared_return_type: None,
            inferred_return_type: None,
            generics: None,
            substitutions: None,
            base_fun: None,
            body: FunctionBody::Code(Block::default()),
            returns_self: false,
            allow_variadic_width_t: false,
            state: InferenceState::NotStarted,
        }
    }

    /// A generic function that has not been instantiated. Its body is
    /// never inferred directly.
    pub fn is_generic(&self) -> bool {
        self.generics.is_some() && self.substitutions.is_none()
    }

    pub fn is_instantiation(&self) -> bool {
        self.substitutions.is_some()
    }

    pub fn is_method(&self) -> bool {
        self.receiver_type.is_some()
    }

    pub fn is_code_function(&self) -> bool {
        matches!(self.body, FunctionBody::Code(_))
    }

    pub fn params(&self) -> &[LocalVarData] {
        &self.locals[..self.n_params]
    }

    pub fn local(&self, id: LocalVarId) -> &LocalVarData {
        &self.locals[id.0 as usize]
    }

    pub fn local_mut(&mut self, id: LocalVarId) -> &mut LocalVarData {
        &mut self.locals[id.0 as usize]
    }

    /// Parameters without a default value; they come first.
    pub fn n_required_params(&self) -> usize {
        self.params().iter().take_while(|p| p.default_value.is_none()).count()
    }

    /// Declared return type, else the inferred one once known.
    pub fn return_type(&self) -> Option<&Ty> {
        self.declared_return_type.as_ref().or(self.inferred_return_type.as_ref())
    }

    /// The function's type as a value, when every part of it is known.
    pub fn callable_type(&self) -> Option<Ty> {
        let params = self
            .params()
            .iter()
            .map(|p| p.declared_or_inferred().cloned())
            .collect::<Option<Vec<_>>>()?;
        Some(Ty::callable(params, self.return_type()?.clone()))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructField {
    pub name: String,
    pub span: Span,
    pub declared_type: Ty,
    pub default_value: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructData {
    pub name: String,
    pub span: Span,
    pub fields: Vec<StructField>,
    pub generics: Option<GenericsDeclaration>,
    pub substitutions: Option<GenericsSubstitutions>,
    pub base_struct: Option<StructId>,
    /// Field types resolved and defaults checked.
    pub state: InferenceState,
}

impl StructData {
    pub fn new(name: impl Into<String>) -> Self {
        StructData {
            name: name.into(),
            span: Span::default(),
            fields: Vec::new(),
            generics: None,
            substitutions: None,
            base_struct: None,
            state: InferenceState::NotStarted,
        }
    }

    pub fn is_generic(&self) -> bool {
        self.generics.is_some() && self.substitutions.is_none()
    }

    pub fn find_field(&self, name: &str) -> Option<(usize, &StructField)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AliasData {
    pub name: String,
    pub span: Span,
    pub underlying: Ty,
    pub generics: Option<GenericsDeclaration>,
    pub substitutions: Option<GenericsSubstitutions>,
    pub base_alias: Option<AliasId>,
}

impl AliasData {
    pub fn new(name: impl Into<String>, underlying: Ty) -> Self {
        AliasData {
            name: name.into(),
            span: Span::default(),
            underlying,
            generics: None,
            substitutions: None,
            base_alias: None,
        }
    }

    pub fn is_generic(&self) -> bool {
        self.generics.is_some() && self.substitutions.is_none()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GlobalVarData {
    pub name: String,
    pub span: Span,
    pub declared_type: Ty,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConstData {
    pub name: String,
    pub span: Span,
    pub declared_type: Option<Ty>,
    pub init: Expr,
    pub inferred_type: Option<Ty>,
    pub state: InferenceState,
}

/// All global symbols of a program.
#[derive(Debug, Default)]
pub struct SymbolTable {
    functions: Vec<FunctionData>,
    structs: Vec<StructData>,
    aliases: Vec<AliasData>,
    globals: Vec<GlobalVarData>,
    constants: Vec<ConstData>,
    names: FxHashMap<String, SymbolRef>,
    /// Method name -> declared (non-instantiated) methods with that name.
    methods: FxHashMap<String, Vec<FunctionId>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function. Methods of user code are indexed by their short
    /// name; instantiations are reachable by their full name only.
    pub fn add_function(&mut self, data: FunctionData) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.names.insert(data.name.clone(), SymbolRef::Function(id));
        if let (Some(method), None) = (&data.method_name, data.base_fun) {
            self.methods.entry(method.clone()).or_default().push(id);
        }
        self.functions.push(data);
        id
    }

    pub fn add_struct(&mut self, data: StructData) -> StructId {
        let id = StructId(self.structs.len() as u32);
        self.names.insert(data.name.clone(), SymbolRef::Struct(id));
        self.structs.push(data);
        id
    }

    pub fn add_alias(&mut self, data: AliasData) -> AliasId {
        let id = AliasId(self.aliases.len() as u32);
        self.names.insert(data.name.clone(), SymbolRef::Alias(id));
        self.aliases.push(data);
        id
    }

    pub fn add_global(&mut self, name: impl Into<String>, declared_type: Ty) -> GlobalVarId {
        let id = GlobalVarId(self.globals.len() as u32);
        let name = name.into();
        self.names.insert(name.clone(), SymbolRef::GlobalVar(id));
        self.globals.push(GlobalVarData { name, span: Span::default(), declared_type });
        id
    }

    pub fn add_const(&mut self, name: impl Into<String>, declared_type: Option<Ty>, init: Expr) -> ConstId {
        let id = ConstId(self.constants.len() as u32);
        let name = name.into();
        self.names.insert(name.clone(), SymbolRef::Const(id));
        self.constants.push(ConstData {
            name,
            span: init.span,
            declared_type,
            init,
            inferred_type: None,
            state: InferenceState::NotStarted,
        });
        id
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolRef> {
        self.names.get(name).copied()
    }

    pub fn lookup_function(&self, name: &str) -> Option<FunctionId> {
        match self.lookup(name) {
            Some(SymbolRef::Function(id)) => Some(id),
            _ => None,
        }
    }

    pub fn lookup_struct(&self, name: &str) -> Option<StructId> {
        match self.lookup(name) {
            Some(SymbolRef::Struct(id)) => Some(id),
            _ => None,
        }
    }

    pub fn lookup_alias(&self, name: &str) -> Option<AliasId> {
        match self.lookup(name) {
            Some(SymbolRef::Alias(id)) => Some(id),
            _ => None,
        }
    }

    /// Declared methods named `method`, in declaration order.
    pub fn methods_named(&self, method: &str) -> &[FunctionId] {
        self.methods.get(method).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All method names, for "did you mean" suggestions.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn function(&self, id: FunctionId) -> &FunctionData {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut FunctionData {
        &mut self.functions[id.0 as usize]
    }

    pub fn struct_data(&self, id: StructId) -> &StructData {
        &self.structs[id.0 as usize]
    }

    pub fn struct_mut(&mut self, id: StructId) -> &mut StructData {
        &mut self.structs[id.0 as usize]
    }

    pub fn alias(&self, id: AliasId) -> &AliasData {
        &self.aliases[id.0 as usize]
    }

    pub fn alias_mut(&mut self, id: AliasId) -> &mut AliasData {
        &mut self.aliases[id.0 as usize]
    }

    pub fn global(&self, id: GlobalVarId) -> &GlobalVarData {
        &self.globals[id.0 as usize]
    }

    pub fn global_mut(&mut self, id: GlobalVarId) -> &mut GlobalVarData {
        &mut self.globals[id.0 as usize]
    }

    pub fn constant(&self, id: ConstId) -> &ConstData {
        &self.constants[id.0 as usize]
    }

    pub fn constant_mut(&mut self, id: ConstId) -> &mut ConstData {
        &mut self.constants[id.0 as usize]
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FunctionId> {
        (0..self.functions.len() as u32).map(FunctionId)
    }

    pub fn struct_ids(&self) -> impl Iterator<Item = StructId> {
        (0..self.structs.len() as u32).map(StructId)
    }

    pub fn alias_ids(&self) -> impl Iterator<Item = AliasId> {
        (0..self.aliases.len() as u32).map(AliasId)
    }

    pub fn global_ids(&self) -> impl Iterator<Item = GlobalVarId> {
        (0..self.globals.len() as u32).map(GlobalVarId)
    }

    pub fn const_ids(&self) -> impl Iterator<Item = ConstId> {
        (0..self.constants.len() as u32).map(ConstId)
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Stack width of a struct: the sum of its field widths.
    pub fn struct_width(&self, id: StructId) -> usize {
        self.struct_data(id)
            .fields
            .iter()
            .map(|f| self.width_of(&f.declared_type))
            .sum()
    }

    pub fn width_of(&self, ty: &Ty) -> usize {
        ty.width_on_stack(&|id| self.struct_width(id))
    }
}
