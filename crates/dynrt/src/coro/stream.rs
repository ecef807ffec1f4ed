//! Single-subscription streams.
//!
//! A [`StreamController`] produces events for exactly one listener. Events
//! are delivered synchronously and in order; while the subscription is
//! paused, or before anyone listens, they are buffered. Callbacks run with no
//! internal borrow held, so a listener may pause, resume or cancel from
//! inside a callback.

use crate::coro::promise::{Completer, Promise};
use crate::error::{Error, Result};
use crate::runtime::core::core;
use crate::runtime::generic::instantiate;
use crate::runtime::types::TypeRef;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

type Hook = Rc<RefCell<dyn FnMut()>>;
type CancelHook = Rc<RefCell<dyn FnMut() -> Option<Promise<()>>>>;

enum Event<T> {
    Data(T),
    Error(Error),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenState {
    Unlistened,
    Listening,
    Cancelled,
    Done,
}

struct Listener<T> {
    on_data: Box<dyn FnMut(T)>,
    on_error: Box<dyn FnMut(Error)>,
    on_done: Box<dyn FnMut()>,
}

struct Shared<T> {
    elem_type: TypeRef,
    state: ListenState,
    closed: bool,
    pause_count: usize,
    pending: VecDeque<Event<T>>,
    delivering: bool,
    listener: Option<Rc<RefCell<Listener<T>>>>,
    on_listen: Option<Hook>,
    on_pause: Option<Hook>,
    on_resume: Option<Hook>,
    on_cancel: Option<CancelHook>,
}

type SharedRef<T> = Rc<RefCell<Shared<T>>>;

fn run_hook(hook: Option<Hook>) {
    if let Some(hook) = hook {
        let mut hook = hook.borrow_mut();
        (&mut *hook)();
    }
}

/// Delivers buffered events until the buffer is empty, the listener is
/// gone or the subscription is paused. A nested call returns immediately.
fn flush<T: 'static>(shared: &SharedRef<T>) {
    {
        let mut inner = shared.borrow_mut();
        if inner.delivering {
            return;
        }
        inner.delivering = true;
    }

    loop {
        let (event, listener) = {
            let mut inner = shared.borrow_mut();
            if inner.state != ListenState::Listening || inner.pause_count > 0 {
                break;
            }
            let Some(listener) = inner.listener.clone() else {
                break;
            };
            let Some(event) = inner.pending.pop_front() else {
                break;
            };
            (event, listener)
        };

        let mut listener = listener.borrow_mut();
        match event {
            Event::Data(value) => (listener.on_data)(value),
            Event::Error(error) => (listener.on_error)(error),
            Event::Done => {
                {
                    let mut inner = shared.borrow_mut();
                    inner.state = ListenState::Done;
                    inner.listener = None;
                }
                (listener.on_done)();
            }
        }
    }

    shared.borrow_mut().delivering = false;
}

/// The producing side of a stream.
pub struct StreamController<T> {
    shared: SharedRef<T>,
}

impl<T> Clone for StreamController<T> {
    fn clone(&self) -> Self {
        StreamController {
            shared: Rc::clone(&self.shared),
        }
    }
}

/// A handle on a [`StreamController`] that does not keep it alive.
pub struct WeakStreamController<T> {
    shared: Weak<RefCell<Shared<T>>>,
}

impl<T> Clone for WeakStreamController<T> {
    fn clone(&self) -> Self {
        WeakStreamController {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<T> WeakStreamController<T> {
    /// The controller, unless every stream, subscription and controller
    /// handle on it was dropped.
    pub fn upgrade(&self) -> Option<StreamController<T>> {
        self.shared.upgrade().map(|shared| StreamController { shared })
    }
}

impl<T: 'static> StreamController<T> {
    pub fn downgrade(&self) -> WeakStreamController<T> {
        WeakStreamController {
            shared: Rc::downgrade(&self.shared),
        }
    }

    pub fn new(elem_type: TypeRef) -> Self {
        StreamController {
            shared: Rc::new(RefCell::new(Shared {
                elem_type,
                state: ListenState::Unlistened,
                closed: false,
                pause_count: 0,
                pending: VecDeque::new(),
                delivering: false,
                listener: None,
                on_listen: None,
                on_pause: None,
                on_resume: None,
                on_cancel: None,
            })),
        }
    }

    pub fn stream(&self) -> Stream<T> {
        Stream {
            shared: Rc::clone(&self.shared),
        }
    }

    /// Sends a data event. Dropped once the subscription was cancelled.
    pub fn add(&self, value: T) -> Result<()> {
        self.push(Event::Data(value))
    }

    /// Sends an error event. Dropped once the subscription was cancelled.
    pub fn add_error(&self, error: Error) -> Result<()> {
        self.push(Event::Error(error))
    }

    fn push(&self, event: Event<T>) -> Result<()> {
        {
            let mut inner = self.shared.borrow_mut();
            if inner.closed {
                return Err(Error::StreamClosed);
            }
            let state = inner.state;
            match state {
                ListenState::Cancelled | ListenState::Done => return Ok(()),
                ListenState::Unlistened | ListenState::Listening => inner.pending.push_back(event),
            }
        }
        flush(&self.shared);
        Ok(())
    }

    /// Sends the done event. Closing twice is a no-op.
    pub fn close(&self) {
        {
            let mut inner = self.shared.borrow_mut();
            if inner.closed {
                return;
            }
            inner.closed = true;
            if matches!(
                inner.state,
                ListenState::Unlistened | ListenState::Listening
            ) {
                inner.pending.push_back(Event::Done);
            }
        }
        flush(&self.shared);
    }

    pub fn has_listener(&self) -> bool {
        self.shared.borrow().state == ListenState::Listening
    }

    /// Whether an event added now would be buffered rather than delivered.
    /// True before anyone listens; false once the subscription ended.
    pub fn is_paused(&self) -> bool {
        let inner = self.shared.borrow();
        match inner.state {
            ListenState::Unlistened => true,
            ListenState::Listening => inner.pause_count > 0,
            ListenState::Cancelled | ListenState::Done => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.borrow().closed
    }

    pub fn set_on_listen(&self, hook: impl FnMut() + 'static) {
        self.shared.borrow_mut().on_listen = Some(Rc::new(RefCell::new(hook)));
    }

    pub fn set_on_pause(&self, hook: impl FnMut() + 'static) {
        self.shared.borrow_mut().on_pause = Some(Rc::new(RefCell::new(hook)));
    }

    pub fn set_on_resume(&self, hook: impl FnMut() + 'static) {
        self.shared.borrow_mut().on_resume = Some(Rc::new(RefCell::new(hook)));
    }

    /// The hook may return a promise that the subscription's `cancel`
    /// returns in turn.
    pub fn set_on_cancel(&self, hook: impl FnMut() -> Option<Promise<()>> + 'static) {
        self.shared.borrow_mut().on_cancel = Some(Rc::new(RefCell::new(hook)));
    }

    /// Drops every hook.
    pub fn clear_hooks(&self) {
        let mut inner = self.shared.borrow_mut();
        inner.on_listen = None;
        inner.on_pause = None;
        inner.on_resume = None;
        inner.on_cancel = None;
    }
}

/// The consuming side of a stream. Can be listened to once.
pub struct Stream<T> {
    shared: SharedRef<T>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Stream {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: Clone + 'static> Stream<T> {
    pub fn elem_type(&self) -> TypeRef {
        self.shared.borrow().elem_type
    }

    /// `Stream<T>`.
    pub fn runtime_type(&self) -> TypeRef {
        instantiate(&core().stream, &[self.elem_type()])
    }

    /// Attaches the listener. Buffered events are delivered right away.
    pub fn listen(
        &self,
        on_data: impl FnMut(T) + 'static,
        on_error: impl FnMut(Error) + 'static,
        on_done: impl FnMut() + 'static,
    ) -> Result<Subscription<T>> {
        let hook = {
            let mut inner = self.shared.borrow_mut();
            if inner.state != ListenState::Unlistened {
                return Err(Error::StreamAlreadyListened);
            }
            inner.state = ListenState::Listening;
            inner.listener = Some(Rc::new(RefCell::new(Listener {
                on_data: Box::new(on_data),
                on_error: Box::new(on_error),
                on_done: Box::new(on_done),
            })));
            inner.on_listen.clone()
        };

        run_hook(hook);
        flush(&self.shared);
        Ok(Subscription {
            shared: Rc::clone(&self.shared),
        })
    }

    fn list_type(&self) -> TypeRef {
        instantiate(&core().list, &[self.elem_type()])
    }

    /// Collects every element. Rejects with the first error event.
    pub fn to_list(&self) -> Promise<Vec<T>> {
        let completer = Completer::new(self.list_type());
        let promise = completer.promise();
        let items = Rc::new(RefCell::new(Vec::new()));
        let subscription: Rc<RefCell<Option<Subscription<T>>>> = Rc::default();

        let sink = Rc::clone(&items);
        let on_error = completer.clone();
        let to_cancel = Rc::clone(&subscription);
        let on_done = completer.clone();
        let result = self.listen(
            move |value| sink.borrow_mut().push(value),
            move |error| {
                on_error.complete_error(error);
                let current = to_cancel.borrow().clone();
                if let Some(sub) = current {
                    sub.cancel();
                }
            },
            move || {
                on_done.complete(items.take());
            },
        );

        match result {
            Ok(sub) => *subscription.borrow_mut() = Some(sub),
            Err(error) => {
                completer.complete_error(error);
            }
        }
        promise
    }

    /// Collects the first `n` elements, then cancels the subscription. The
    /// promise resolves once that cancellation has completed.
    pub fn take(&self, n: usize) -> Promise<Vec<T>> {
        let completer = Completer::new(self.list_type());
        let promise = completer.promise();
        let items = Rc::new(RefCell::new(Vec::new()));
        let subscription: Rc<RefCell<Option<Subscription<T>>>> = Rc::default();
        // Set when `n` elements arrived before `listen` returned.
        let reached_early = Rc::new(Cell::new(n == 0));

        let finish = {
            let completer = completer.clone();
            let items = Rc::clone(&items);
            move |sub: Subscription<T>| {
                let completer = completer.clone();
                let items = Rc::clone(&items);
                sub.cancel().on_settle(move |_| {
                    completer.complete(items.take());
                });
            }
        };

        let on_data = {
            let items = Rc::clone(&items);
            let subscription = Rc::clone(&subscription);
            let reached_early = Rc::clone(&reached_early);
            let finish = finish.clone();
            move |value| {
                let len = {
                    let mut items = items.borrow_mut();
                    if items.len() >= n {
                        return;
                    }
                    items.push(value);
                    items.len()
                };
                if len == n {
                    let current = subscription.borrow().clone();
                    match current {
                        Some(sub) => finish(sub),
                        None => reached_early.set(true),
                    }
                }
            }
        };
        let on_error = {
            let completer = completer.clone();
            let subscription = Rc::clone(&subscription);
            move |error| {
                if completer.complete_error(error) {
                    let current = subscription.borrow().clone();
                    if let Some(sub) = current {
                        sub.cancel();
                    }
                }
            }
        };
        let on_done = {
            let completer = completer.clone();
            let items = Rc::clone(&items);
            move || {
                completer.complete(items.take());
            }
        };

        match self.listen(on_data, on_error, on_done) {
            Ok(sub) => {
                *subscription.borrow_mut() = Some(sub.clone());
                if reached_early.get() && !completer.is_completed() {
                    finish(sub);
                }
            }
            Err(error) => {
                completer.complete_error(error);
            }
        }
        promise
    }
}

/// An active listening session.
pub struct Subscription<T> {
    shared: SharedRef<T>,
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Subscription {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: 'static> Subscription<T> {
    /// Pauses delivery. Pauses nest; each needs a matching resume.
    pub fn pause(&self) {
        let hook = {
            let mut inner = self.shared.borrow_mut();
            if inner.state != ListenState::Listening {
                return;
            }
            inner.pause_count += 1;
            if inner.pause_count == 1 {
                inner.on_pause.clone()
            } else {
                None
            }
        };
        run_hook(hook);
    }

    pub fn resume(&self) {
        let hook = {
            let mut inner = self.shared.borrow_mut();
            if inner.state != ListenState::Listening || inner.pause_count == 0 {
                return;
            }
            inner.pause_count -= 1;
            if inner.pause_count == 0 {
                inner.on_resume.clone()
            } else {
                None
            }
        };
        run_hook(hook);
        flush(&self.shared);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.borrow().pause_count > 0
    }

    /// Ends the subscription. No further events are delivered. The returned
    /// promise completes when the producer finished cleaning up.
    pub fn cancel(&self) -> Promise<()> {
        let hook = {
            let mut inner = self.shared.borrow_mut();
            if inner.state != ListenState::Listening {
                return Promise::resolved(TypeRef::void(), ());
            }
            inner.state = ListenState::Cancelled;
            inner.listener = None;
            inner.pending.clear();
            inner.on_cancel.clone()
        };

        let cancelled = hook.and_then(|hook| {
            let mut hook = hook.borrow_mut();
            (&mut *hook)()
        });
        cancelled.unwrap_or_else(|| Promise::resolved(TypeRef::void(), ()))
    }
}
