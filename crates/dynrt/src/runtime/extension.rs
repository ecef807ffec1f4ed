//! Extension members.
//!
//! Host-native receivers (primitives, arrays, functions and host objects with
//! a registered nominal type) do not own method tables the runtime can name
//! freely. Their members are published under private dispatch keys: each
//! logical name maps to one [`Name::unique`] key for the life of the process,
//! and the implementation is copied onto the class under that key. Dispatch
//! on such a receiver first maps the name through this table.

use crate::error::{InternalError, fatal};
use crate::runtime::class::Class;
use crate::runtime::core::core;
use crate::runtime::name::Name;
use crate::runtime::value::Value;
use fxhash::FxHashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

#[derive(Default)]
struct Table {
    forward: FxHashMap<Name, Name>,
    reverse: FxHashMap<Name, Name>,
}

fn table() -> &'static RwLock<Table> {
    static TABLE: OnceLock<RwLock<Table>> = OnceLock::new();
    TABLE.get_or_init(|| RwLock::new(Table::default()))
}

/// The dispatch key published for `logical`, if any.
pub fn extension_key(logical: &str) -> Option<Name> {
    table()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .forward
        .get(&Name::member(logical))
        .copied()
}

/// The logical name behind a dispatch key.
pub(crate) fn logical_name(key: Name) -> Option<Name> {
    if key.is_interned() {
        return None;
    }
    table()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .reverse
        .get(&key)
        .copied()
}

/// Returns the key for `logical`, creating it on first publication.
fn publish(logical: Name) -> Name {
    let mut table = table().write().unwrap_or_else(PoisonError::into_inner);
    if let Some(key) = table.forward.get(&logical) {
        return *key;
    }

    let key = Name::unique(logical.as_str());
    table.forward.insert(logical, key);
    table.reverse.insert(key, logical);
    dynrt_log::trace!("published extension key for {logical}");
    key
}

/// Publishes `names` as extension members of `class`.
///
/// Each implementation, own or inherited, is copied onto `class` under the
/// name's dispatch key.
///
/// # Panics
///
/// Naming a member `class` does not have is an internal consistency error.
pub fn install_extension_members(class: &Class, names: &[&str]) {
    for text in names {
        let logical = Name::member(text);
        let Some(member) = class.lookup_member(logical) else {
            fatal(InternalError::MissingExtensionMember {
                class: class.name(),
                member: logical,
            });
        };
        class.add_member(publish(logical), member);
    }
    dynrt_log::debug!(
        "installed {} extension member(s) on {}",
        names.len(),
        class.name()
    );
}

/// Whether dispatch on `value` goes through the extension table.
pub fn is_extension_typed(value: &Value) -> bool {
    match value {
        Value::Null
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Double(_)
        | Value::Str(_)
        | Value::Array(_)
        | Value::Function(_) => true,
        Value::Host(host) => host.constructor().is_registered(),
        Value::Object(_) | Value::Named(_) => false,
    }
}

/// Maps a member name to the key dispatch looks up on `receiver`.
///
/// `None` when an extension-typed receiver has no member published under
/// that name. Host objects fall back to the verbatim name, which addresses
/// their native properties only, never the methods of their class.
pub fn canonical_member(receiver: &Value, name: &str) -> Option<Name> {
    match receiver {
        Value::Host(_) => Some(extension_key(name).unwrap_or_else(|| Name::intern(name))),
        Value::Object(_) | Value::Named(_) => Some(Name::member(name)),
        _ => extension_key(name),
    }
}

/// The class whose method table serves `receiver`.
pub(crate) fn dispatch_class(receiver: &Value) -> Option<Class> {
    let core = core();
    match receiver {
        Value::Null => Some(core.null),
        Value::Bool(_) => Some(core.bool),
        Value::Int(_) => Some(core.int),
        Value::Double(_) => Some(core.double),
        Value::Str(_) => Some(core.string),
        Value::Array(_) => Some(core.list),
        Value::Function(_) => Some(core.function),
        Value::Object(obj) => Some(obj.class()),
        Value::Host(host) => host.constructor().class(),
        Value::Named(_) => None,
    }
}
