//! Memory infrastructure for the `dynrt` runtime.
//!
//! Runtime metadata (type nodes, class records, interned member names) is
//! allocated once into a process-lifetime arena so that it can be shared by
//! `'static` reference and compared by address.

pub mod arena;

pub use arena::{ArenaStats, GlobalArena, global_arena};
