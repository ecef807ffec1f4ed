//! Instances of runtime classes.

use crate::runtime::class::Class;
use crate::runtime::name::Name;
use crate::runtime::types::TypeRef;
use crate::runtime::value::Value;
use fxhash::FxHashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

/// A class instance.
///
/// `runtime_type` is the precise type the instance was created with, which
/// for a generic class records its type arguments.
pub struct Object {
    class: Class,
    runtime_type: TypeRef,
    fields: RwLock<FxHashMap<Name, Value>>,
}

impl Object {
    pub(crate) fn new(class: Class, runtime_type: TypeRef) -> Self {
        Object {
            class,
            runtime_type,
            fields: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn runtime_type(&self) -> TypeRef {
        self.runtime_type
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.field_by_name(Name::member(name))
    }

    pub fn set_field(&self, name: &str, value: Value) {
        self.set_field_by_name(Name::member(name), value);
    }

    pub(crate) fn field_by_name(&self, name: Name) -> Option<Value> {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            .cloned()
    }

    pub(crate) fn set_field_by_name(&self, name: Name, value: Value) {
        self.fields
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, value);
    }

    pub(crate) fn has_field(&self, name: Name) -> bool {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&name)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type", &self.runtime_type)
            .finish_non_exhaustive()
    }
}
