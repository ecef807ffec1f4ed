//! Runtime values and their canonical types.

use crate::runtime::core::core;
use crate::runtime::function::Function;
use crate::runtime::generic::instantiate;
use crate::runtime::host::HostObject;
use crate::runtime::name::Name;
use crate::runtime::object::Object;
use crate::runtime::types::TypeRef;
use crate::error::{Error, Result};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A value of the host object model.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(Arc<str>),
    /// An instance of a runtime class.
    Object(Arc<Object>),
    /// A host-native object.
    Host(HostObject),
    /// A host-native growable array with a reified element type.
    Array(Array),
    Function(Function),
    /// A trailing group of named arguments.
    Named(NamedArgs),
}

impl Value {
    pub fn str(text: &str) -> Value {
        Value::Str(Arc::from(text))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<Object>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_named(&self) -> Option<&NamedArgs> {
        match self {
            Value::Named(named) => Some(named),
            _ => None,
        }
    }

    /// The canonical type of this value.
    pub fn runtime_type(&self) -> TypeRef {
        canonicalize(self)
    }

    /// Short description used in error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Object(obj) => format!("Instance of '{}'", obj.runtime_type()),
            other => format!("a value of type '{}'", canonicalize(other)),
        }
    }
}

/// Maps a value to its type.
///
/// Primitives map to the core class singletons, host objects of an
/// unregistered constructor and named-argument bags to the shared opaque
/// marker, and functions without a signature to `Function`. Never fails.
pub fn canonicalize(value: &Value) -> TypeRef {
    let core = core();
    match value {
        Value::Null => core.null.this_type(),
        Value::Bool(_) => core.bool.this_type(),
        Value::Int(_) => core.int.this_type(),
        Value::Double(_) => core.double.this_type(),
        Value::Str(_) => core.string.this_type(),
        Value::Object(obj) => obj.runtime_type(),
        Value::Host(host) => host
            .constructor()
            .nominal_type()
            .unwrap_or_else(TypeRef::opaque),
        Value::Array(items) => instantiate(&core.list, &[items.elem_type()]),
        Value::Function(f) => f
            .runtime_type()
            .unwrap_or_else(|| core.function.this_type()),
        Value::Named(_) => TypeRef::opaque(),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Host(a), Value::Host(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(&a.0, &b.0),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Named(a), Value::Named(b)) => a.0 == b.0,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) if d.is_finite() && d.fract() == 0.0 => write!(f, "{d:.1}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Str(s) => f.write_str(s),
            Value::Object(obj) => write!(f, "Instance of '{}'", obj.runtime_type()),
            Value::Host(host) => write!(f, "[object {}]", host.constructor().name()),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.to_vec().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Function(func) => match func.runtime_type() {
                Some(ty) => write!(f, "Closure: {ty}"),
                None => f.write_str("Closure"),
            },
            Value::Named(named) => {
                f.write_str("{")?;
                for (i, (name, value)) in named.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<Array> for Value {
    fn from(items: Array) -> Self {
        Value::Array(items)
    }
}

impl From<HostObject> for Value {
    fn from(host: HostObject) -> Self {
        Value::Host(host)
    }
}

impl From<NamedArgs> for Value {
    fn from(named: NamedArgs) -> Self {
        Value::Named(named)
    }
}

/// A host-native growable array.
#[derive(Clone)]
pub struct Array(Arc<ArrayInner>);

struct ArrayInner {
    elem: TypeRef,
    items: RwLock<Vec<Value>>,
}

impl Array {
    pub fn new(elem: TypeRef, items: impl IntoIterator<Item = Value>) -> Self {
        Array(Arc::new(ArrayInner {
            elem,
            items: RwLock::new(items.into_iter().collect()),
        }))
    }

    pub fn elem_type(&self) -> TypeRef {
        self.0.elem
    }

    pub fn len(&self) -> usize {
        self.0.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: i64) -> Result<Value> {
        let items = self.0.items.read().unwrap_or_else(PoisonError::into_inner);
        usize::try_from(index)
            .ok()
            .and_then(|i| items.get(i).cloned())
            .ok_or(Error::IndexOutOfRange {
                index,
                length: items.len(),
            })
    }

    pub fn set(&self, index: i64, value: Value) -> Result<()> {
        let mut items = self.0.items.write().unwrap_or_else(PoisonError::into_inner);
        let length = items.len();
        match usize::try_from(index).ok().and_then(|i| items.get_mut(i)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Error::IndexOutOfRange { index, length }),
        }
    }

    pub fn push(&self, value: Value) {
        self.0
            .items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value);
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("elem", &self.0.elem)
            .field("items", &self.to_vec())
            .finish()
    }
}

/// Named arguments, in call-site order.
#[derive(Clone, Debug)]
pub struct NamedArgs(Arc<Vec<(Name, Value)>>);

impl NamedArgs {
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        NamedArgs(Arc::new(
            entries
                .into_iter()
                .map(|(name, value)| (Name::intern(name), value))
                .collect(),
        ))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = Name::intern(name);
        self.0.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = Name> + '_ {
        self.0.iter().map(|(name, _)| *name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Name, Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
