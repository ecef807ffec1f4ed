//! The type algebra.
//!
//! Type nodes live in the metadata arena and are handled through [`TypeRef`],
//! a copyable reference compared and hashed by address. Structural identity
//! is established where nodes are created: class instantiations go through the
//! generic cache and function types through the function-type table, so two
//! `TypeRef`s denote the same type exactly when they are the same pointer.
//! Typedef nodes are the exception; each typedef declaration is its own node.

use crate::runtime::class::{Class, ClassRole};
use crate::runtime::name::Name;
use dynrt_mem::global_arena;
use fxhash::FxHashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{OnceLock, PoisonError, RwLock};

/// A reference to an arena-allocated type node.
#[derive(Clone, Copy)]
pub struct TypeRef(&'static TypeNode);

pub struct TypeNode {
    kind: TypeKind,
}

pub enum TypeKind {
    Dynamic,
    Void,
    Bottom,
    /// The shared marker for host values without a registered nominal type.
    Opaque,
    /// A class without type parameters.
    Nominal(ClassType),
    /// An instantiation of a generic class. Empty `args` is the raw type.
    Generic(ClassType),
    Function(FunctionType),
    Typedef(Typedef),
}

/// The class-backed part of a nominal or generic node.
pub struct ClassType {
    class: Class,
    args: Vec<TypeRef>,
    heritage: OnceLock<Heritage>,
}

/// Super type, interfaces and mixins of a class type.
///
/// Computed on first use from the class declaration and the node's type
/// arguments, so a declaration may mention itself (`A implements
/// Comparable<A>`).
#[derive(Debug, Clone, Default)]
pub struct Heritage {
    pub super_type: Option<TypeRef>,
    pub interfaces: Vec<TypeRef>,
    pub mixins: Vec<TypeRef>,
}

impl Heritage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extends(mut self, ty: TypeRef) -> Self {
        self.super_type = Some(ty);
        self
    }

    pub fn implements(mut self, ty: TypeRef) -> Self {
        self.interfaces.push(ty);
        self
    }

    pub fn with_mixin(mut self, ty: TypeRef) -> Self {
        self.mixins.push(ty);
        self
    }
}

/// A function signature.
///
/// `named` is kept sorted by name so equal signatures intern to one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub ret: TypeRef,
    pub required: Vec<TypeRef>,
    pub optional: Vec<TypeRef>,
    pub named: Vec<(Name, TypeRef)>,
}

impl FunctionType {
    pub fn new(ret: TypeRef, required: impl IntoIterator<Item = TypeRef>) -> Self {
        FunctionType {
            ret,
            required: required.into_iter().collect(),
            optional: Vec::new(),
            named: Vec::new(),
        }
    }

    pub fn optional(mut self, optional: impl IntoIterator<Item = TypeRef>) -> Self {
        self.optional = optional.into_iter().collect();
        self
    }

    pub fn named(mut self, name: &str, ty: TypeRef) -> Self {
        let name = Name::intern(name);
        self.named.retain(|(existing, _)| *existing != name);
        self.named.push((name, ty));
        self.named.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        self
    }

    pub fn named_type(&self, name: Name) -> Option<TypeRef> {
        self.named
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, ty)| *ty)
    }

    /// Interns this signature.
    pub fn intern(self) -> TypeRef {
        TypeRef::function(self)
    }
}

pub struct Typedef {
    name: Name,
    thunk: Box<dyn Fn() -> FunctionType + Send + Sync>,
    resolved: OnceLock<TypeRef>,
}

static DYNAMIC: TypeNode = TypeNode {
    kind: TypeKind::Dynamic,
};
static VOID: TypeNode = TypeNode {
    kind: TypeKind::Void,
};
static BOTTOM: TypeNode = TypeNode {
    kind: TypeKind::Bottom,
};
static OPAQUE: TypeNode = TypeNode {
    kind: TypeKind::Opaque,
};

fn function_table() -> &'static RwLock<FxHashMap<FunctionType, TypeRef>> {
    static TABLE: OnceLock<RwLock<FxHashMap<FunctionType, TypeRef>>> = OnceLock::new();
    TABLE.get_or_init(|| RwLock::new(FxHashMap::default()))
}

impl TypeRef {
    pub fn dynamic() -> TypeRef {
        TypeRef(&DYNAMIC)
    }

    pub fn void() -> TypeRef {
        TypeRef(&VOID)
    }

    pub fn bottom() -> TypeRef {
        TypeRef(&BOTTOM)
    }

    pub fn opaque() -> TypeRef {
        TypeRef(&OPAQUE)
    }

    /// Returns the unique node for `signature`.
    pub fn function(signature: FunctionType) -> TypeRef {
        if let Some(ty) = function_table()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&signature)
        {
            return *ty;
        }

        let mut table = function_table()
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *table
            .entry(signature.clone())
            .or_insert_with(|| TypeRef::alloc(TypeKind::Function(signature)))
    }

    /// Declares a typedef whose target is computed on first use.
    pub fn typedef(
        name: &str,
        thunk: impl Fn() -> FunctionType + Send + Sync + 'static,
    ) -> TypeRef {
        TypeRef::alloc(TypeKind::Typedef(Typedef {
            name: Name::intern(name),
            thunk: Box::new(thunk),
            resolved: OnceLock::new(),
        }))
    }

    pub(crate) fn class_node(class: Class, args: Vec<TypeRef>) -> TypeRef {
        let class_type = ClassType {
            class,
            args,
            heritage: OnceLock::new(),
        };
        if class.arity() == 0 {
            TypeRef::alloc(TypeKind::Nominal(class_type))
        } else {
            TypeRef::alloc(TypeKind::Generic(class_type))
        }
    }

    fn alloc(kind: TypeKind) -> TypeRef {
        TypeRef(global_arena().alloc(TypeNode { kind }))
    }

    pub fn kind(self) -> &'static TypeKind {
        &self.0.kind
    }

    pub(crate) fn addr(self) -> usize {
        std::ptr::from_ref(self.0).addr()
    }

    pub fn is_dynamic(self) -> bool {
        matches!(self.0.kind, TypeKind::Dynamic)
    }

    pub fn is_void(self) -> bool {
        matches!(self.0.kind, TypeKind::Void)
    }

    /// `dynamic`, `void` and `Object`.
    pub fn is_top(self) -> bool {
        match &self.0.kind {
            TypeKind::Dynamic | TypeKind::Void => true,
            TypeKind::Nominal(ct) => ct.class.role() == ClassRole::Object,
            _ => false,
        }
    }

    /// `bottom` and `Null`.
    pub fn is_bottom(self) -> bool {
        match &self.0.kind {
            TypeKind::Bottom => true,
            TypeKind::Nominal(ct) => ct.class.role() == ClassRole::Null,
            _ => false,
        }
    }

    /// The universal function marker (`Function`).
    pub fn is_function_marker(self) -> bool {
        matches!(&self.0.kind, TypeKind::Nominal(ct) if ct.class.role() == ClassRole::Function)
    }

    pub fn class_type(self) -> Option<&'static ClassType> {
        match &self.0.kind {
            TypeKind::Nominal(ct) | TypeKind::Generic(ct) => Some(ct),
            _ => None,
        }
    }

    /// The function signature, looking through typedefs.
    pub fn as_function(self) -> Option<&'static FunctionType> {
        match &self.0.kind {
            TypeKind::Function(f) => Some(f),
            TypeKind::Typedef(_) => self.resolve_typedef().as_function(),
            _ => None,
        }
    }

    /// Resolves a typedef to its function node; other types are returned as is.
    pub fn resolve_typedef(self) -> TypeRef {
        match &self.0.kind {
            TypeKind::Typedef(def) => *def.resolved.get_or_init(|| {
                dynrt_log::trace!("resolving typedef {}", def.name);
                TypeRef::function((def.thunk)())
            }),
            _ => self,
        }
    }
}

impl ClassType {
    pub fn class(&self) -> Class {
        self.class
    }

    pub fn args(&self) -> &[TypeRef] {
        &self.args
    }

    pub fn heritage(&self) -> &Heritage {
        self.heritage.get_or_init(|| {
            if self.args.is_empty() && self.class.arity() > 0 {
                let defaults = vec![TypeRef::dynamic(); self.class.arity()];
                self.class.heritage_for(&defaults)
            } else {
                self.class.heritage_for(&self.args)
            }
        })
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for TypeRef {}

impl Hash for TypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.addr());
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, types: &[TypeRef]) -> fmt::Result {
    for (i, ty) in types.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{ty}")?;
    }
    Ok(())
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        write_list(f, &self.required)?;
        let mut needs_comma = !self.required.is_empty();

        if !self.optional.is_empty() {
            if needs_comma {
                f.write_str(", ")?;
            }
            f.write_str("[")?;
            write_list(f, &self.optional)?;
            f.write_str("]")?;
            needs_comma = true;
        }

        if !self.named.is_empty() {
            if needs_comma {
                f.write_str(", ")?;
            }
            f.write_str("{")?;
            for (i, (name, ty)) in self.named.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{name}: {ty}")?;
            }
            f.write_str("}")?;
        }

        write!(f, ") => {}", self.ret)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            TypeKind::Dynamic => f.write_str("dynamic"),
            TypeKind::Void => f.write_str("void"),
            TypeKind::Bottom => f.write_str("bottom"),
            TypeKind::Opaque => f.write_str("NativeObject"),
            TypeKind::Nominal(ct) => write!(f, "{}", ct.class.name()),
            TypeKind::Generic(ct) => {
                write!(f, "{}", ct.class.name())?;
                if !ct.args.is_empty() {
                    f.write_str("<")?;
                    write_list(f, &ct.args)?;
                    f.write_str(">")?;
                }
                Ok(())
            }
            TypeKind::Function(sig) => write!(f, "{sig}"),
            TypeKind::Typedef(def) => write!(f, "{}", def.name),
        }
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({self})")
    }
}
