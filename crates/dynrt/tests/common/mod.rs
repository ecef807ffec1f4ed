// Common test utilities for integration tests
//
// Shared fixtures: unique class names, shorthand for core types and a
// thread-safe call log for initializer and cleanup ordering.

#![allow(dead_code)]

use dynrt::{FunctionType, TypeRef, core};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// Class names are process-wide, so every test registers under its own.
pub fn unique(prefix: &str) -> String {
    format!("{prefix}_{}", NEXT_ID.fetch_add(1, Ordering::SeqCst))
}

pub fn int() -> TypeRef {
    core().int.this_type()
}

pub fn num() -> TypeRef {
    core().num.this_type()
}

pub fn string() -> TypeRef {
    core().string.this_type()
}

/// `(params) -> ret`, interned.
pub fn fn_type(ret: TypeRef, params: impl IntoIterator<Item = TypeRef>) -> TypeRef {
    FunctionType::new(ret, params).intern()
}

/// An ordered record of events shared between closures.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }
}
