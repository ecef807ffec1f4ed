//! Bump arena for runtime metadata.
//!
//! Type nodes, class records and interned names are allocated once and live
//! until the process exits. Handing them out as `&'static` references gives
//! every piece of metadata a stable address, which the runtime relies on for
//! identity comparison and for keying its memo tables.
//!
//! # Architecture
//!
//! - [`GlobalArena`]: thread-safe arena made of a growing list of chunks
//! - [`Chunk`]: a fixed block of memory with an atomic bump pointer
//!
//! Values placed in the arena are never dropped.
//!
//! # Example
//!
//! ```
//! use dynrt_mem::arena::GlobalArena;
//!
//! let arena = GlobalArena::new(16 * 1024);
//! let a = arena.alloc(7u32);
//! let s = arena.alloc_str("List");
//!
//! assert_eq!(*a, 7);
//! assert_eq!(s, "List");
//! ```

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

/// Alignment every chunk base is rounded to.
const CHUNK_ALIGNMENT: usize = 16;

/// Smallest chunk the arena will request from the system allocator.
const MIN_CHUNK_SIZE: usize = 8 * 1024;

/// Chunks stop doubling once they reach this size.
const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Default chunk size for [`global_arena`].
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Allocation statistics for an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    /// Bytes handed out, alignment padding excluded.
    pub total_allocated: usize,
    /// Number of chunks owned by the arena.
    pub chunk_count: usize,
    /// Sum of all chunk capacities in bytes.
    pub total_capacity: usize,
}

/// A block of memory with an atomic bump pointer.
///
/// Several threads may bump the same chunk concurrently. A chunk is never
/// released once created, so pointers into it stay valid for the process.
pub struct Chunk {
    start: NonNull<u8>,
    cursor: AtomicPtr<u8>,
    capacity: usize,
}

impl Chunk {
    fn layout(capacity: usize) -> Layout {
        match Layout::from_size_align(capacity, CHUNK_ALIGNMENT) {
            Ok(layout) => layout,
            Err(_) => panic!("arena chunk of {capacity} bytes has no valid layout"),
        }
    }

    /// Requests a fresh chunk from the system allocator.
    fn new(capacity: usize) -> NonNull<Chunk> {
        let capacity = capacity.max(MIN_CHUNK_SIZE);
        let layout = Self::layout(capacity);

        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc(layout) };
        let Some(start) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };

        let chunk = Box::new(Chunk {
            start,
            cursor: AtomicPtr::new(start.as_ptr()),
            capacity,
        });
        NonNull::from(Box::leak(chunk))
    }

    /// Reserves `size` bytes aligned to `align`, or `None` when the chunk is full.
    #[inline]
    fn try_bump(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let end = self.start.as_ptr().addr() + self.capacity;

        loop {
            let current = self.cursor.load(Ordering::Acquire);
            let aligned = current.addr().checked_add(align - 1)? & !(align - 1);
            let next = aligned.checked_add(size)?;
            if next > end {
                return None;
            }

            if self
                .cursor
                .compare_exchange_weak(
                    current,
                    current.with_addr(next),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                // SAFETY: aligned lies inside this chunk and is non-null.
                return Some(unsafe { NonNull::new_unchecked(current.with_addr(aligned)) });
            }
        }
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Thread-safe arena for metadata that lives as long as the process.
///
/// There is no reset and no per-value drop. Callers that need a `'static`
/// reference use [`global_arena`].
pub struct GlobalArena {
    chunks: Mutex<Vec<NonNull<Chunk>>>,
    current: AtomicPtr<Chunk>,
    chunk_size: usize,
    allocated: AtomicUsize,
}

// SAFETY: chunks are only reachable through the arena, every mutation of the
// bump pointer is atomic and the chunk list is guarded by a mutex.
unsafe impl Send for GlobalArena {}
unsafe impl Sync for GlobalArena {}

impl GlobalArena {
    /// Creates an arena whose chunks start at `chunk_size` bytes.
    ///
    /// The size is clamped to at least 8 KiB and rounded to a power of two.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(MIN_CHUNK_SIZE).next_power_of_two();
        let first = Chunk::new(chunk_size);

        GlobalArena {
            chunks: Mutex::new(vec![first]),
            current: AtomicPtr::new(first.as_ptr()),
            chunk_size,
            allocated: AtomicUsize::new(0),
        }
    }

    /// Moves `value` into the arena and returns a reference to it.
    ///
    /// The value is never dropped.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc<T>(&self, value: T) -> &mut T {
        let size = size_of::<T>();
        let ptr = self.bump(size, align_of::<T>()).cast::<T>();

        // SAFETY: ptr is freshly reserved, correctly aligned and large enough.
        unsafe {
            ptr.as_ptr().write(value);
            &mut *ptr.as_ptr()
        }
    }

    /// Copies `s` into the arena.
    pub fn alloc_str(&self, s: &str) -> &str {
        if s.is_empty() {
            return "";
        }

        let ptr = self.bump(s.len(), 1);

        // SAFETY: the reserved range holds exactly s.len() bytes and the
        // copied bytes are valid UTF-8.
        unsafe {
            std::ptr::copy_nonoverlapping(s.as_ptr(), ptr.as_ptr(), s.len());
            let bytes = std::slice::from_raw_parts(ptr.as_ptr(), s.len());
            std::str::from_utf8_unchecked(bytes)
        }
    }

    /// Returns allocation statistics.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        let chunks = self.chunks.lock().unwrap_or_else(PoisonError::into_inner);
        let total_capacity = chunks
            .iter()
            // SAFETY: chunk pointers come from Chunk::new and are never freed.
            .map(|chunk| unsafe { chunk.as_ref() }.capacity())
            .sum();

        ArenaStats {
            total_allocated: self.allocated.load(Ordering::Relaxed),
            chunk_count: chunks.len(),
            total_capacity,
        }
    }

    fn bump(&self, size: usize, align: usize) -> NonNull<u8> {
        if size == 0 {
            return NonNull::dangling().with_addr(
                std::num::NonZeroUsize::new(align).unwrap_or(std::num::NonZeroUsize::MIN),
            );
        }

        loop {
            let current = self.current.load(Ordering::Acquire);
            // SAFETY: current always points to a live chunk.
            let chunk = unsafe { &*current };
            if let Some(ptr) = chunk.try_bump(size, align) {
                self.allocated.fetch_add(size, Ordering::Relaxed);
                return ptr;
            }
            self.grow(current, size + align);
        }
    }

    #[cold]
    fn grow(&self, exhausted: *mut Chunk, min_size: usize) {
        let mut chunks = self.chunks.lock().unwrap_or_else(PoisonError::into_inner);

        // Another thread already replaced the exhausted chunk.
        if self.current.load(Ordering::Acquire) != exhausted {
            return;
        }

        let doubled = (self.chunk_size << chunks.len().min(7)).min(MAX_CHUNK_SIZE);
        let chunk = Chunk::new(doubled.max(min_size.next_power_of_two()));
        chunks.push(chunk);
        self.current.store(chunk.as_ptr(), Ordering::Release);
    }
}

/// The process-wide metadata arena.
#[must_use]
pub fn global_arena() -> &'static GlobalArena {
    static ARENA: OnceLock<GlobalArena> = OnceLock::new();
    ARENA.get_or_init(|| GlobalArena::new(DEFAULT_CHUNK_SIZE))
}
