//! Interned member and class names.
//!
//! Every distinct spelling has exactly one [`Name`] in the metadata arena, so
//! comparison is a pointer check and the hash is computed once. Extension
//! dispatch keys are also `Name`s, but they are created with
//! [`Name::unique`] and never enter the intern table, so no user spelling can
//! ever collide with one.

use dynrt_mem::global_arena;
use fxhash::{FxHashMap, FxHasher};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{OnceLock, PoisonError, RwLock};

struct NameData {
    text: &'static str,
    hash: u64,
    interned: bool,
}

/// An interned identifier.
#[derive(Clone, Copy)]
pub struct Name(&'static NameData);

fn table() -> &'static RwLock<FxHashMap<&'static str, Name>> {
    static TABLE: OnceLock<RwLock<FxHashMap<&'static str, Name>>> = OnceLock::new();
    TABLE.get_or_init(|| RwLock::new(FxHashMap::default()))
}

fn hash_text(text: &str) -> u64 {
    let mut hasher = FxHasher::default();
    text.hash(&mut hasher);
    hasher.finish()
}

impl Name {
    /// Returns the unique name spelled `text`.
    pub fn intern(text: &str) -> Name {
        if let Some(name) = table()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(text)
        {
            return *name;
        }

        let mut table = table().write().unwrap_or_else(PoisonError::into_inner);
        if let Some(name) = table.get(text) {
            return *name;
        }

        let arena = global_arena();
        let text = arena.alloc_str(text);
        let name = Name(arena.alloc(NameData {
            text,
            hash: hash_text(text),
            interned: true,
        }));
        table.insert(text, name);
        name
    }

    /// Interns a member name, escaping names reserved by the host object
    /// model (`constructor`, `prototype`).
    pub fn member(text: &str) -> Name {
        match text {
            "constructor" | "prototype" => Name::intern(&format!("+{text}")),
            _ => Name::intern(text),
        }
    }

    /// Creates a fresh name that is equal only to itself.
    ///
    /// `desc` is used for display only.
    pub fn unique(desc: &str) -> Name {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let serial = COUNTER.fetch_add(1, Ordering::Relaxed);

        let arena = global_arena();
        let text = arena.alloc_str(desc);
        Name(arena.alloc(NameData {
            text,
            hash: hash_text(text) ^ serial.rotate_left(32),
            interned: false,
        }))
    }

    pub fn as_str(self) -> &'static str {
        self.0.text
    }

    pub fn is_interned(self) -> bool {
        self.0.interned
    }

    /// The setter name for this name (`foo` becomes `foo=`).
    pub fn setter(self) -> Name {
        Name::intern(&format!("{}=", self.as_str()))
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl From<&str> for Name {
    fn from(text: &str) -> Self {
        Name::intern(text)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.text)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.interned {
            write!(f, "Name({:?})", self.0.text)
        } else {
            write!(f, "Name(unique {:?})", self.0.text)
        }
    }
}
