//! Single-threaded coroutine support.
//!
//! Everything here runs on the current thread and is driven by the
//! thread-local microtask queue in [`scheduler`]: promise callbacks and
//! coroutine resumptions are queued as microtasks and run in FIFO order by
//! [`run_microtasks`].
//!
//! - [`promise`]: single-assignment promises and completers
//! - [`async_fn`]: the single-shot adapter driving an [`AsyncBody`]
//! - [`stream`]: single-subscription streams with pause and cancellation
//! - [`async_star`]: the multi-value controller driving an [`AsyncStarBody`]

pub mod async_fn;
pub mod async_star;
pub mod promise;
pub mod scheduler;
pub mod stream;

pub use async_fn::{AsyncBody, AsyncStep, Resume, spawn_async, spawn_async_with};
pub use async_star::{
    AsyncStar, AsyncStarBody, CoroutineState, StarResume, StarStep, from_iter, spawn_async_star,
};
pub use promise::{Await, Completer, Promise};
pub use scheduler::{pending_microtasks, run_microtasks, run_until_settled, schedule_microtask};
pub use stream::{Stream, StreamController, Subscription, WeakStreamController};
