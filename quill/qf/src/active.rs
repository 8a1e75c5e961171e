//! Active objects: a state machine, a private event queue, and a priority.

use core::cell::{Cell, UnsafeCell};

use critical_section::Mutex;

use quill_core::{q_assert, QEvt, QSignal};
use quill_hsm::{QHsm, QStateHandler};

use crate::equeue::{PostResult, QEQueue};
use crate::trace::{self, records};
use crate::{pubsub, ready, registry, sched};

/// Object-safe interface the kernels and the framework use to drive an
/// active object.
pub trait Active: Sync {
    /// Unique scheduling priority, `1..=MAX_ACTIVE`.
    fn prio(&self) -> u8;

    /// FIFO post with margin. True when the event was accepted; a failed
    /// post with margin 0 is fatal.
    fn post(&self, e: QEvt, margin: u16) -> bool;

    /// LIFO post: the event will be the next one dispatched.
    fn post_lifo(&self, e: QEvt);

    /// Runs one run-to-completion step: dequeue one event, dispatch it,
    /// recycle it. Returns false when the queue was empty.
    fn dispatch_next(&self) -> bool;
}

/// An active object's state machine guarded for shared access.
///
/// The kernels guarantee a single dispatcher per active object (one task
/// per AO, run-to-completion), which is what makes the unguarded interior
/// access sound; a `busy` flag turns any violation of that contract into a
/// fatal assertion instead of silent corruption.
struct HsmCell<SM>(UnsafeCell<QHsm<SM>>);

// SAFETY: aliasing is excluded by the single-dispatcher contract above.
unsafe impl<SM: Send> Sync for HsmCell<SM> {}

/// Statically allocated active object over the application context `SM`
/// with a queue of `QLEN` ring slots (capacity `QLEN + 1`).
pub struct QActive<SM: 'static, const QLEN: usize> {
    prio: u8,
    hsm: HsmCell<SM>,
    queue: QEQueue<QLEN>,
    busy: Mutex<Cell<bool>>,
}

impl<SM: Send + 'static, const QLEN: usize> QActive<SM, QLEN> {
    /// Declares the active object. `initial` is the initial pseudostate of
    /// its state machine.
    pub const fn new(prio: u8, sm: SM, initial: QStateHandler<SM>) -> Self {
        Self {
            prio,
            hsm: HsmCell(UnsafeCell::new(QHsm::new(sm, initial))),
            queue: QEQueue::new(),
            busy: Mutex::new(Cell::new(false)),
        }
    }

    /// Registers the object and runs its topmost initial transition.
    ///
    /// Called once per object during startup, before the scheduler runs.
    pub fn start(&'static self) {
        registry::register(self);
        // Startup is single-threaded; nothing else can dispatch yet.
        let hsm = unsafe { &mut *self.hsm.0.get() };
        hsm.init();
        critical_section::with(|cs| {
            if !self.queue.is_empty() {
                ready::set(cs, self.prio);
            }
        });
    }

    /// Marks a composite state of this object's machine as retaining
    /// shallow history. Startup-phase only, before [`QActive::start`].
    pub fn retain_history(&'static self, state: QStateHandler<SM>) {
        let hsm = unsafe { &mut *self.hsm.0.get() };
        hsm.retain_history(state);
    }

    pub fn subscribe(&self, sig: QSignal) {
        pubsub::subscribe(sig, self.prio);
    }

    pub fn unsubscribe(&self, sig: QSignal) {
        pubsub::unsubscribe(sig, self.prio);
    }

    /// Moves `e` into the caller-owned deferred queue `dq`. Returns false
    /// when the deferred queue is full (the event is then untouched). Net
    /// reference count is preserved: the deferred store holds its own
    /// reference and the incoming one is released after dispatch as usual.
    pub fn defer<const M: usize>(&self, dq: &QEQueue<M>, e: QEvt) -> bool {
        let deferred = dq.try_post(e);
        if deferred {
            trace::emit(records::ao::DEFER, &trace::prio_sig(self.prio, e.sig().raw()));
        }
        deferred
    }

    /// Recalls the oldest deferred event, LIFO-posting it so it is the next
    /// event this object dispatches. Returns false when `dq` is empty.
    pub fn recall<const M: usize>(&self, dq: &QEQueue<M>) -> bool {
        match dq.get() {
            Some(e) => {
                self.post_lifo(e);
                // Release the deferred store's reference; the queue took
                // its own in post_lifo.
                quill_mem::gc(e);
                trace::emit(records::ao::RECALL, &trace::prio_sig(self.prio, e.sig().raw()));
                true
            }
            None => false,
        }
    }

    /// Read access to the application context between dispatches
    /// (startup, tests, the object's own handlers).
    pub fn with_sm<R>(&self, f: impl FnOnce(&SM) -> R) -> R {
        let hsm = unsafe { &*self.hsm.0.get() };
        f(hsm.sm())
    }
}

impl<SM: Send + 'static, const QLEN: usize> Active for QActive<SM, QLEN> {
    fn prio(&self) -> u8 {
        self.prio
    }

    fn post(&self, e: QEvt, margin: u16) -> bool {
        let stored = critical_section::with(|cs| match self.queue.post_cs(cs, e, margin) {
            PostResult::Stored { was_empty } => {
                if was_empty {
                    ready::set(cs, self.prio);
                }
                true
            }
            PostResult::Rejected => false,
        });
        if stored {
            trace::emit(records::ao::POST, &trace::prio_sig(self.prio, e.sig().raw()));
            sched::notify();
        } else {
            trace::emit(
                records::ao::POST_ATTEMPT,
                &trace::prio_sig(self.prio, e.sig().raw()),
            );
        }
        stored
    }

    fn post_lifo(&self, e: QEvt) {
        critical_section::with(|cs| {
            if self.queue.post_lifo_cs(cs, e) {
                ready::set(cs, self.prio);
            }
        });
        trace::emit(records::ao::POST_LIFO, &trace::prio_sig(self.prio, e.sig().raw()));
        sched::notify();
    }

    fn dispatch_next(&self) -> bool {
        let got = critical_section::with(|cs| {
            let got = self.queue.get_cs(cs);
            if let Some((_, now_empty)) = got {
                if now_empty {
                    ready::clear(cs, self.prio);
                }
            }
            got
        });
        let (e, _) = match got {
            Some(got) => got,
            None => return false,
        };
        trace::emit(records::ao::GET, &trace::prio_sig(self.prio, e.sig().raw()));

        critical_section::with(|cs| {
            let busy = self.busy.borrow(cs);
            // A second dispatcher on the same object breaks run-to-completion.
            q_assert!(!busy.get());
            busy.set(true);
        });

        let hsm = unsafe { &mut *self.hsm.0.get() };
        hsm.dispatch(&e);

        critical_section::with(|cs| self.busy.borrow(cs).set(false));
        quill_mem::gc(e);
        true
    }
}
