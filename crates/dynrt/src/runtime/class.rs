//! Runtime classes.
//!
//! A [`Class`] is both the runtime method table of a class and the declaration
//! its type nodes refer to. Classes are registered once through
//! [`ClassBuilder`], live in the metadata arena and are unique by name.
//!
//! # Member lookup
//!
//! Members are looked up in the class's own table and then along the super
//! class chain. Successful lookups are cached per class and tagged with a
//! global epoch that every member addition bumps, so a member added to a
//! super class after a subclass cached a lookup is still seen.

use crate::error::{InternalError, Result, fatal};
use crate::runtime::core::core;
use crate::runtime::generic::{InstanceTrie, instantiate};
use crate::runtime::name::Name;
use crate::runtime::object::Object;
use crate::runtime::signature::{MergedView, Signatures};
use crate::runtime::types::{Heritage, TypeRef};
use crate::runtime::value::Value;
use dynrt_mem::global_arena;
use fxhash::FxHashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// An instance member implementation. Receives the receiver and the
/// positional arguments (a trailing [`Value::Named`] carries named ones).
pub type Method = Arc<dyn Fn(&Value, &[Value]) -> Result<Value> + Send + Sync>;

/// Runs on a freshly allocated instance with the constructor arguments.
pub type Initializer = Arc<dyn Fn(&Value, &[Value]) -> Result<()> + Send + Sync>;

type TypeFn = Box<dyn Fn(&[TypeRef]) -> TypeRef + Send + Sync>;

#[derive(Clone)]
pub enum Member {
    Method(Method),
    Getter(Method),
    Setter(Method),
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Method(_) => f.write_str("Member::Method"),
            Member::Getter(_) => f.write_str("Member::Getter"),
            Member::Setter(_) => f.write_str("Member::Setter"),
        }
    }
}

/// Classes the type algebra treats specially.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClassRole {
    Ordinary,
    Object,
    Null,
    Function,
}

pub(crate) struct ClassInner {
    name: Name,
    arity: usize,
    role: ClassRole,
    super_class: Option<Class>,
    super_type: Option<TypeFn>,
    interfaces: Vec<TypeFn>,
    mixins: Vec<TypeFn>,
    members: RwLock<FxHashMap<Name, Member>>,
    cache: RwLock<FxHashMap<Name, (u64, Member)>>,
    statics: RwLock<FxHashMap<Name, Method>>,
    constructors: RwLock<FxHashMap<Name, Method>>,
    initializer: Option<Initializer>,
    nominal: OnceLock<TypeRef>,
    pub(crate) raw: OnceLock<TypeRef>,
    pub(crate) instances: InstanceTrie,
    pub(crate) signatures: OnceLock<Signatures>,
    pub(crate) resolved_methods: MergedView,
    pub(crate) resolved_fields: MergedView,
}

/// Bumped on every member addition; stale cache entries carry an older value.
static EPOCH: AtomicU64 = AtomicU64::new(0);

fn registry() -> &'static RwLock<FxHashMap<Name, Class>> {
    static REGISTRY: OnceLock<RwLock<FxHashMap<Name, Class>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(FxHashMap::default()))
}

/// A registered runtime class.
#[derive(Clone, Copy)]
pub struct Class {
    inner: &'static ClassInner,
}

impl Class {
    /// Finds a registered class by name.
    pub fn lookup(name: &str) -> Option<Class> {
        registry()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&Name::intern(name))
            .copied()
    }

    pub fn name(&self) -> Name {
        self.inner.name
    }

    /// Number of type parameters.
    pub fn arity(&self) -> usize {
        self.inner.arity
    }

    pub fn is_generic(&self) -> bool {
        self.inner.arity > 0
    }

    pub(crate) fn role(&self) -> ClassRole {
        self.inner.role
    }

    pub(crate) fn inner(&self) -> &'static ClassInner {
        self.inner
    }

    pub fn super_class(&self) -> Option<Class> {
        self.inner.super_class
    }

    pub fn is_subclass_of(&self, other: &Class) -> bool {
        let mut current = Some(*self);
        while let Some(class) = current {
            if class == *other {
                return true;
            }
            current = class.super_class();
        }
        false
    }

    /// The type of plain instances: the nominal node, or the instantiation
    /// with every type argument `dynamic`.
    pub fn this_type(&self) -> TypeRef {
        if self.is_generic() {
            instantiate(self, &[])
        } else {
            *self
                .inner
                .nominal
                .get_or_init(|| TypeRef::class_node(*self, Vec::new()))
        }
    }

    pub(crate) fn heritage_for(&self, args: &[TypeRef]) -> Heritage {
        let inner = self.inner;
        let super_type = match (&inner.super_type, inner.super_class) {
            (Some(ty), _) => Some(ty(args)),
            (None, Some(class)) => Some(class.this_type()),
            (None, None) => None,
        };

        Heritage {
            super_type,
            interfaces: inner.interfaces.iter().map(|ty| ty(args)).collect(),
            mixins: inner.mixins.iter().map(|ty| ty(args)).collect(),
        }
    }

    /// Resolves an instance member through the super class chain.
    pub fn lookup_member(&self, name: Name) -> Option<Member> {
        let epoch = EPOCH.load(Ordering::Acquire);

        if let Some((cached_epoch, member)) = self
            .inner
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            && *cached_epoch == epoch
        {
            return Some(member.clone());
        }

        let member = self.walk_members(name)?;
        self.inner
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, (epoch, member.clone()));
        Some(member)
    }

    fn walk_members(&self, name: Name) -> Option<Member> {
        let mut current = Some(*self);
        while let Some(class) = current {
            if let Some(member) = class.own_member(name) {
                return Some(member);
            }
            current = class.super_class();
        }
        None
    }

    /// Looks up a member declared directly on this class.
    pub fn own_member(&self, name: Name) -> Option<Member> {
        self.inner
            .members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            .cloned()
    }

    pub(crate) fn own_members(&self) -> Vec<(Name, Member)> {
        self.inner
            .members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, member)| (*name, member.clone()))
            .collect()
    }

    /// Adds or replaces an instance member after registration.
    pub fn add_member(&self, name: Name, member: Member) {
        self.inner
            .members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, member);
        EPOCH.fetch_add(1, Ordering::AcqRel);
        dynrt_log::trace!("added member {name:?} to {}", self.name());
    }

    pub fn add_method(
        &self,
        name: &str,
        method: impl Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) {
        self.add_member(Name::member(name), Member::Method(Arc::new(method)));
    }

    pub fn static_method(&self, name: Name) -> Option<Method> {
        self.inner
            .statics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            .cloned()
    }

    pub fn named_constructor(&self, name: Name) -> Option<Method> {
        self.inner
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            .cloned()
    }

    pub(crate) fn own_initializer(&self) -> Option<&'static Initializer> {
        self.inner.initializer.as_ref()
    }

    /// Runs this class's initializer, or the nearest inherited one.
    pub fn run_initializer(&self, this: &Value, args: &[Value]) -> Result<()> {
        match (&self.inner.initializer, self.super_class()) {
            (Some(init), _) => init(this, args),
            (None, Some(parent)) => parent.run_initializer(this, args),
            (None, None) => Ok(()),
        }
    }

    /// Allocates an instance without running any initializer.
    pub fn allocate(&self) -> Value {
        Value::Object(Arc::new(Object::new(*self, self.this_type())))
    }

    /// Allocates an instance of [`Class::this_type`] and initializes it.
    pub fn construct(&self, args: &[Value]) -> Result<Value> {
        self.construct_as(self.this_type(), args)
    }

    /// Allocates an instance of this class instantiated with `type_args`.
    pub fn construct_generic(&self, type_args: &[TypeRef], args: &[Value]) -> Result<Value> {
        self.construct_as(instantiate(self, type_args), args)
    }

    fn construct_as(&self, ty: TypeRef, args: &[Value]) -> Result<Value> {
        let this = Value::Object(Arc::new(Object::new(*self, ty)));
        self.run_initializer(&this, args)?;
        Ok(this)
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.inner, other.inner)
    }
}

impl Eq for Class {}

impl Hash for Class {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(std::ptr::from_ref(self.inner).addr());
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.inner.name.as_str())
            .field("arity", &self.inner.arity)
            .finish()
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.name)
    }
}

/// Declares and registers a class.
///
/// ```
/// use dynrt::{ClassBuilder, Value};
///
/// let point = ClassBuilder::new("DocPoint")
///     .initializer(|this, args| {
///         let obj = this.as_object().expect("instance");
///         obj.set_field("x", args[0].clone());
///         Ok(())
///     })
///     .getter("x", |this| Ok(this.as_object().expect("instance").field("x").unwrap_or(Value::Null)))
///     .register();
///
/// let p = point.construct(&[Value::Int(3)]).unwrap();
/// assert_eq!(dynrt::dynamic_load(&p, "x").unwrap(), Value::Int(3));
/// ```
pub struct ClassBuilder {
    name: Name,
    arity: usize,
    role: ClassRole,
    root: bool,
    super_class: Option<Class>,
    super_type: Option<TypeFn>,
    interfaces: Vec<TypeFn>,
    mixins: Vec<TypeFn>,
    members: Vec<(Name, Member)>,
    statics: Vec<(Name, Method)>,
    constructors: Vec<(Name, Method)>,
    initializer: Option<Initializer>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        ClassBuilder {
            name: Name::intern(name),
            arity: 0,
            role: ClassRole::Ordinary,
            root: false,
            super_class: None,
            super_type: None,
            interfaces: Vec::new(),
            mixins: Vec::new(),
            members: Vec::new(),
            statics: Vec::new(),
            constructors: Vec::new(),
            initializer: None,
        }
    }

    /// Declares `arity` type parameters.
    pub fn type_params(mut self, arity: usize) -> Self {
        self.arity = arity;
        self
    }

    /// Sets the super class. The super type is the super class's
    /// [`Class::this_type`].
    pub fn extends(mut self, class: &Class) -> Self {
        self.super_class = Some(*class);
        self
    }

    /// Sets the super class with an explicit super type computed from this
    /// class's type arguments.
    pub fn extends_generic(
        mut self,
        class: &Class,
        super_type: impl Fn(&[TypeRef]) -> TypeRef + Send + Sync + 'static,
    ) -> Self {
        self.super_class = Some(*class);
        self.super_type = Some(Box::new(super_type));
        self
    }

    /// Declares an interface computed from this class's type arguments.
    pub fn implements(
        mut self,
        interface: impl Fn(&[TypeRef]) -> TypeRef + Send + Sync + 'static,
    ) -> Self {
        self.interfaces.push(Box::new(interface));
        self
    }

    pub fn implements_class(self, class: &Class) -> Self {
        let class = *class;
        self.implements(move |_| class.this_type())
    }

    pub(crate) fn mixin_type(mut self, mixin: TypeRef) -> Self {
        self.mixins.push(Box::new(move |_| mixin));
        self
    }

    pub fn method(
        mut self,
        name: &str,
        method: impl Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.members
            .push((Name::member(name), Member::Method(Arc::new(method))));
        self
    }

    pub fn getter(
        mut self,
        name: &str,
        getter: impl Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        let method: Method = Arc::new(move |this: &Value, _: &[Value]| getter(this));
        self.members.push((Name::member(name), Member::Getter(method)));
        self
    }

    /// Declares a setter, stored under `name=`.
    pub fn setter(
        mut self,
        name: &str,
        setter: impl Fn(&Value, Value) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        let method: Method = Arc::new(move |this: &Value, args: &[Value]| {
            setter(this, args.first().cloned().unwrap_or(Value::Null))?;
            Ok(Value::Null)
        });
        self.members
            .push((Name::member(name).setter(), Member::Setter(method)));
        self
    }

    pub fn static_method(
        mut self,
        name: &str,
        method: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        let method: Method = Arc::new(move |_: &Value, args: &[Value]| method(args));
        self.statics.push((Name::member(name), method));
        self
    }

    /// Declares a named constructor. It runs on a fresh instance, which is
    /// the result of the construction.
    pub fn constructor(
        mut self,
        name: &str,
        body: impl Fn(&Value, &[Value]) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        let method: Method = Arc::new(move |this: &Value, args: &[Value]| {
            body(this, args)?;
            Ok(this.clone())
        });
        self.constructors.push((Name::member(name), method));
        self
    }

    /// Sets the default initializer, run by [`Class::construct`].
    pub fn initializer(
        mut self,
        init: impl Fn(&Value, &[Value]) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.initializer = Some(Arc::new(init));
        self
    }

    pub(crate) fn initializer_arc(mut self, init: Initializer) -> Self {
        self.initializer = Some(init);
        self
    }

    pub(crate) fn member(mut self, name: Name, member: Member) -> Self {
        self.members.push((name, member));
        self
    }

    pub(crate) fn root(mut self) -> Self {
        self.root = true;
        self
    }

    pub(crate) fn role(mut self, role: ClassRole) -> Self {
        self.role = role;
        self
    }

    /// Registers the class.
    ///
    /// # Panics
    ///
    /// Registering a second class under the same name is an internal
    /// consistency error.
    pub fn register(self) -> Class {
        let super_class = match (self.super_class, self.root) {
            (Some(class), _) => Some(class),
            (None, true) => None,
            (None, false) => Some(core().object),
        };

        let mut registry = registry().write().unwrap_or_else(PoisonError::into_inner);
        if registry.contains_key(&self.name) {
            drop(registry);
            fatal(InternalError::DuplicateClass(self.name));
        }

        let inner: &'static ClassInner = global_arena().alloc(ClassInner {
            name: self.name,
            arity: self.arity,
            role: self.role,
            super_class,
            super_type: self.super_type,
            interfaces: self.interfaces,
            mixins: self.mixins,
            members: RwLock::new(self.members.into_iter().collect()),
            cache: RwLock::new(FxHashMap::default()),
            statics: RwLock::new(self.statics.into_iter().collect()),
            constructors: RwLock::new(self.constructors.into_iter().collect()),
            initializer: self.initializer,
            nominal: OnceLock::new(),
            raw: OnceLock::new(),
            instances: InstanceTrie::default(),
            signatures: OnceLock::new(),
            resolved_methods: RwLock::new(None),
            resolved_fields: RwLock::new(None),
        });

        let class = Class { inner };
        registry.insert(self.name, class);
        drop(registry);

        dynrt_log::debug!(
            "registered class {} (type parameters: {}, super: {:?})",
            self.name,
            self.arity,
            super_class.map(|c| c.name())
        );
        class
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn constant(value: i64) -> impl Fn(&Value, &[Value]) -> Result<Value> + Send + Sync {
        move |_, _| Ok(Value::Int(value))
    }

    #[test]
    fn test_register_and_lookup() {
        let class = ClassBuilder::new("ClassTestShape").register();

        assert_eq!(Class::lookup("ClassTestShape"), Some(class));
        assert_eq!(class.name().as_str(), "ClassTestShape");
        assert_eq!(class.super_class(), Some(core().object));
        assert!(Class::lookup("ClassTestMissing").is_none());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_registration_is_fatal() {
        ClassBuilder::new("ClassTestDuplicate").register();
        ClassBuilder::new("ClassTestDuplicate").register();
    }

    #[test]
    fn test_inherited_lookup_and_override() {
        let base = ClassBuilder::new("ClassTestBase")
            .method("area", constant(1))
            .method("sides", constant(0))
            .register();
        let derived = ClassBuilder::new("ClassTestDerived")
            .extends(&base)
            .method("area", constant(2))
            .register();

        let this = derived.allocate();
        let call = |name: &str| match derived.lookup_member(Name::intern(name)) {
            Some(Member::Method(m)) => m(&this, &[]).unwrap(),
            other => panic!("unexpected member {other:?}"),
        };

        assert_eq!(call("area"), Value::Int(2));
        assert_eq!(call("sides"), Value::Int(0));
        assert!(derived.lookup_member(Name::intern("volume")).is_none());
        assert!(derived.is_subclass_of(&base));
        assert!(!base.is_subclass_of(&derived));
    }

    #[test]
    fn test_cache_sees_late_super_members() {
        let base = ClassBuilder::new("ClassTestLateBase").register();
        let derived = ClassBuilder::new("ClassTestLateDerived")
            .extends(&base)
            .method("probe", constant(1))
            .register();

        assert!(derived.lookup_member(Name::intern("probe")).is_some());
        assert!(derived.lookup_member(Name::intern("late")).is_none());

        base.add_method("late", constant(9));
        assert!(derived.lookup_member(Name::intern("late")).is_some());

        derived.add_method("probe", constant(5));
        let this = derived.allocate();
        match derived.lookup_member(Name::intern("probe")) {
            Some(Member::Method(m)) => assert_eq!(m(&this, &[]).unwrap(), Value::Int(5)),
            other => panic!("unexpected member {other:?}"),
        }
    }

    #[test]
    fn test_initializer_falls_back_to_super() {
        let base = ClassBuilder::new("ClassTestInitBase")
            .initializer(|this, args| {
                this.as_object()
                    .ok_or_else(|| Error::thrown("not an object"))?
                    .set_field("seed", args[0].clone());
                Ok(())
            })
            .register();
        let derived = ClassBuilder::new("ClassTestInitDerived")
            .extends(&base)
            .register();

        let obj = derived.construct(&[Value::Int(11)]).unwrap();
        assert_eq!(obj.as_object().unwrap().field("seed"), Some(Value::Int(11)));
    }

    #[test]
    fn test_setter_and_getter_names() {
        let class = ClassBuilder::new("ClassTestAccessors")
            .getter("size", |_| Ok(Value::Int(4)))
            .setter("size", |_, _| Ok(()))
            .register();

        assert!(matches!(
            class.own_member(Name::intern("size")),
            Some(Member::Getter(_))
        ));
        assert!(matches!(
            class.own_member(Name::intern("size=")),
            Some(Member::Setter(_))
        ));
    }

    #[test]
    fn test_reserved_member_names_are_escaped() {
        let class = ClassBuilder::new("ClassTestReserved")
            .method("constructor", constant(1))
            .register();

        assert!(class.own_member(Name::intern("+constructor")).is_some());
        assert!(class.own_member(Name::intern("constructor")).is_none());
    }
}
