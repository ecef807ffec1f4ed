//! The thread-local microtask queue.

use crate::coro::promise::Promise;
use crate::error::Result;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

type Microtask = Box<dyn FnOnce()>;

thread_local! {
    static QUEUE: RefCell<VecDeque<Microtask>> = RefCell::new(VecDeque::new());
    static DRAINING: Cell<bool> = const { Cell::new(false) };
}

/// Queues `task` behind every task already queued on this thread.
pub fn schedule_microtask(task: impl FnOnce() + 'static) {
    QUEUE.with(|queue| queue.borrow_mut().push_back(Box::new(task)));
}

pub fn pending_microtasks() -> usize {
    QUEUE.with(|queue| queue.borrow().len())
}

/// Runs queued microtasks, including ones queued while running, until the
/// queue is empty. Returns how many ran.
///
/// A nested call from inside a microtask returns 0 immediately; the outer
/// call keeps draining.
pub fn run_microtasks() -> usize {
    if DRAINING.with(Cell::get) {
        return 0;
    }
    DRAINING.with(|draining| draining.set(true));

    let mut ran = 0;
    // The borrow ends before the task runs, so tasks may queue more tasks.
    while let Some(task) = QUEUE.with(|queue| queue.borrow_mut().pop_front()) {
        task();
        ran += 1;
    }

    DRAINING.with(|draining| draining.set(false));
    if ran > 0 {
        dynrt_log::trace!("ran {ran} microtask(s)");
    }
    ran
}

/// Drains the queue and returns the promise's outcome, or `None` when it is
/// still pending once nothing is left to run.
pub fn run_until_settled<T: Clone + 'static>(promise: &Promise<T>) -> Option<Result<T>> {
    run_microtasks();
    promise.peek()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_fifo_and_nested_scheduling() {
        let log = Rc::new(RefCell::new(Vec::new()));

        let outer = Rc::clone(&log);
        schedule_microtask(move || {
            outer.borrow_mut().push(1);
            let inner = Rc::clone(&outer);
            schedule_microtask(move || inner.borrow_mut().push(3));
        });
        let second = Rc::clone(&log);
        schedule_microtask(move || second.borrow_mut().push(2));

        assert_eq!(pending_microtasks(), 2);
        assert_eq!(run_microtasks(), 3);
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
        assert_eq!(pending_microtasks(), 0);
    }

    #[test]
    fn test_nested_drain_is_noop() {
        let nested = Rc::new(Cell::new(usize::MAX));
        let slot = Rc::clone(&nested);
        schedule_microtask(move || slot.set(run_microtasks()));

        run_microtasks();
        assert_eq!(nested.get(), 0);
    }
}
