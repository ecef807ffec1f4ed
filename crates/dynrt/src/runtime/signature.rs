//! Per-class signature buckets.
//!
//! A class declares its member signatures once, as four thunks (constructors,
//! methods, statics, fields). A bucket's thunk runs on the first read of that
//! bucket, so signatures may mention classes registered later. Method and
//! field lookups also see inherited entries through a merged view per class,
//! rebuilt when any class defines signatures after the view was built.

use crate::error::{InternalError, fatal};
use crate::runtime::class::Class;
use crate::runtime::extension::logical_name;
use crate::runtime::name::Name;
use crate::runtime::types::TypeRef;
use fxhash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Bumped by every signature definition; merged views carry the value they
/// were built at.
static SIGNATURE_EPOCH: AtomicU64 = AtomicU64::new(0);

pub(crate) type SignatureTable = Arc<FxHashMap<Name, TypeRef>>;

/// A class's merged view of own and inherited signatures.
pub(crate) type MergedView = RwLock<Option<(u64, SignatureTable)>>;

fn merged(view: &MergedView, build: impl FnOnce() -> FxHashMap<Name, TypeRef>) -> SignatureTable {
    let epoch = SIGNATURE_EPOCH.load(Ordering::Acquire);
    if let Some((built_at, table)) = view.read().unwrap_or_else(PoisonError::into_inner).as_ref()
        && *built_at == epoch
    {
        return Arc::clone(table);
    }

    let table = Arc::new(build());
    *view.write().unwrap_or_else(PoisonError::into_inner) = Some((epoch, Arc::clone(&table)));
    table
}

type SignatureThunk = Box<dyn Fn() -> Vec<(&'static str, TypeRef)> + Send + Sync>;

#[derive(Default)]
struct Bucket {
    thunk: Option<SignatureThunk>,
    table: OnceLock<FxHashMap<Name, TypeRef>>,
}

impl Bucket {
    fn new(thunk: impl Fn() -> Vec<(&'static str, TypeRef)> + Send + Sync + 'static) -> Self {
        Bucket {
            thunk: Some(Box::new(thunk)),
            table: OnceLock::new(),
        }
    }

    fn table(&self) -> &FxHashMap<Name, TypeRef> {
        self.table.get_or_init(|| match &self.thunk {
            Some(thunk) => thunk()
                .into_iter()
                .map(|(name, ty)| (Name::member(name), ty))
                .collect(),
            None => FxHashMap::default(),
        })
    }

    fn get(&self, name: Name) -> Option<TypeRef> {
        self.table().get(&name).copied()
    }
}

/// The signature declarations of one class.
///
/// ```
/// use dynrt::{ClassBuilder, FunctionType, Name, Signatures, core};
///
/// let greeter = ClassBuilder::new("DocGreeter").register();
/// greeter.define_signatures(Signatures::new().methods(|| {
///     let string = core().string.this_type();
///     vec![("greet", FunctionType::new(string, [string]).intern())]
/// }));
///
/// let sig = greeter.method_signature(Name::intern("greet")).unwrap();
/// assert_eq!(sig.to_string(), "(String) => String");
/// ```
#[derive(Default)]
pub struct Signatures {
    constructors: Bucket,
    methods: Bucket,
    statics: Bucket,
    fields: Bucket,
}

impl Signatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constructors(
        mut self,
        thunk: impl Fn() -> Vec<(&'static str, TypeRef)> + Send + Sync + 'static,
    ) -> Self {
        self.constructors = Bucket::new(thunk);
        self
    }

    pub fn methods(
        mut self,
        thunk: impl Fn() -> Vec<(&'static str, TypeRef)> + Send + Sync + 'static,
    ) -> Self {
        self.methods = Bucket::new(thunk);
        self
    }

    pub fn statics(
        mut self,
        thunk: impl Fn() -> Vec<(&'static str, TypeRef)> + Send + Sync + 'static,
    ) -> Self {
        self.statics = Bucket::new(thunk);
        self
    }

    /// Declared field types. Stores through dynamic dispatch are checked
    /// against them.
    pub fn fields(
        mut self,
        thunk: impl Fn() -> Vec<(&'static str, TypeRef)> + Send + Sync + 'static,
    ) -> Self {
        self.fields = Bucket::new(thunk);
        self
    }
}

impl Class {
    /// Attaches signature declarations to this class.
    ///
    /// # Panics
    ///
    /// Defining signatures twice for one class is an internal consistency
    /// error.
    pub fn define_signatures(&self, signatures: Signatures) {
        if self.inner().signatures.set(signatures).is_err() {
            fatal(InternalError::SignaturesRedefined(self.name()));
        }
        SIGNATURE_EPOCH.fetch_add(1, Ordering::AcqRel);
        dynrt_log::debug!("signatures defined for {}", self.name());
    }

    fn signatures(&self) -> Option<&'static Signatures> {
        self.inner().signatures.get()
    }

    /// The declared signature of an instance method, own or inherited.
    ///
    /// `None` means the method is untyped, which is not an error. Extension
    /// dispatch keys resolve to the signature of their logical name.
    pub fn method_signature(&self, name: Name) -> Option<TypeRef> {
        let name = logical_name(name).unwrap_or(name);
        self.resolved_methods().get(&name).copied()
    }

    /// The declared type of a field, own or inherited.
    pub fn field_type(&self, name: Name) -> Option<TypeRef> {
        self.resolved_fields().get(&name).copied()
    }

    /// The signature of a constructor declared by this class.
    pub fn constructor_signature(&self, name: Name) -> Option<TypeRef> {
        self.signatures()?.constructors.get(name)
    }

    /// The signature of a static method declared by this class.
    pub fn static_signature(&self, name: Name) -> Option<TypeRef> {
        self.signatures()?.statics.get(name)
    }

    pub(crate) fn own_method_signatures(&self) -> Vec<(Name, TypeRef)> {
        self.signatures()
            .map(|sigs| {
                sigs.methods
                    .table()
                    .iter()
                    .map(|(name, ty)| (*name, *ty))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn resolved_methods(&self) -> SignatureTable {
        merged(&self.inner().resolved_methods, || {
            let mut merged = self
                .super_class()
                .map(|parent| parent.resolved_methods().as_ref().clone())
                .unwrap_or_default();
            if let Some(sigs) = self.signatures() {
                merged.extend(sigs.methods.table().iter().map(|(n, t)| (*n, *t)));
            }
            merged
        })
    }

    fn resolved_fields(&self) -> SignatureTable {
        merged(&self.inner().resolved_fields, || {
            let mut merged = self
                .super_class()
                .map(|parent| parent.resolved_fields().as_ref().clone())
                .unwrap_or_default();
            if let Some(sigs) = self.signatures() {
                merged.extend(sigs.fields.table().iter().map(|(n, t)| (*n, *t)));
            }
            merged
        })
    }
}
