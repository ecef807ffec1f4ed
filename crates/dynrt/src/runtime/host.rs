//! Host-native objects and constructors.
//!
//! A [`HostConstructor`] stands for a constructor of the host object model.
//! Until [`register_nominal_type`] links it to a class, its instances are
//! opaque to the type algebra. Registration happens at most once.

use crate::error::{InternalError, fatal};
use crate::runtime::class::Class;
use crate::runtime::generic::raw_class_of;
use crate::runtime::name::Name;
use crate::runtime::types::TypeRef;
use crate::runtime::value::Value;
use dynrt_mem::global_arena;
use fxhash::FxHashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

struct HostCtorInner {
    name: Name,
    nominal: OnceLock<(TypeRef, Class)>,
}

/// A host-side constructor. Compared by identity.
#[derive(Clone, Copy)]
pub struct HostConstructor(&'static HostCtorInner);

impl HostConstructor {
    pub fn new(name: &str) -> Self {
        HostConstructor(global_arena().alloc(HostCtorInner {
            name: Name::intern(name),
            nominal: OnceLock::new(),
        }))
    }

    pub fn name(self) -> Name {
        self.0.name
    }

    /// The registered nominal type, if any.
    pub fn nominal_type(self) -> Option<TypeRef> {
        self.0.nominal.get().map(|(ty, _)| *ty)
    }

    /// The class backing the registered nominal type.
    pub fn class(self) -> Option<Class> {
        self.0.nominal.get().map(|(_, class)| *class)
    }

    pub fn is_registered(self) -> bool {
        self.0.nominal.get().is_some()
    }
}

impl PartialEq for HostConstructor {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for HostConstructor {}

impl fmt::Debug for HostConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostConstructor({})", self.0.name)
    }
}

/// Attaches the nominal type `ty` to the host constructor `ctor`.
///
/// Afterwards instances of `ctor` canonicalize to `ty` and dispatch through
/// the class behind it.
///
/// # Panics
///
/// Registering a constructor twice, or with a type that is not a class type,
/// is an internal consistency error.
pub fn register_nominal_type(ctor: HostConstructor, ty: TypeRef) {
    let Some(class) = raw_class_of(ty) else {
        fatal(InternalError::NotAClassType(ty));
    };

    if ctor.0.nominal.set((ty, class)).is_err() {
        fatal(InternalError::DuplicateHostRegistration(ctor.name()));
    }
    dynrt_log::debug!("host constructor {} registered as {ty}", ctor.name());
}

struct HostInner {
    ctor: HostConstructor,
    props: RwLock<FxHashMap<Name, Value>>,
}

/// An object created by a host constructor, holding plain properties.
#[derive(Clone)]
pub struct HostObject(Arc<HostInner>);

impl HostObject {
    pub fn new(ctor: HostConstructor) -> Self {
        HostObject(Arc::new(HostInner {
            ctor,
            props: RwLock::new(FxHashMap::default()),
        }))
    }

    /// Sets a property and returns the object, for construction chains.
    pub fn with(self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value.into());
        self
    }

    pub fn constructor(&self) -> HostConstructor {
        self.0.ctor
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.get_by_name(Name::intern(name))
    }

    pub fn set(&self, name: &str, value: Value) {
        self.set_by_name(Name::intern(name), value);
    }

    pub(crate) fn get_by_name(&self, name: Name) -> Option<Value> {
        self.0
            .props
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            .cloned()
    }

    pub(crate) fn set_by_name(&self, name: Name, value: Value) {
        self.0
            .props
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, value);
    }

    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("ctor", &self.0.ctor)
            .finish_non_exhaustive()
    }
}
