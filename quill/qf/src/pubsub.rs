//! Publish/subscribe: per-signal subscriber priority sets.

use core::cell::{Cell, RefCell};

use critical_section::Mutex;

use quill_core::{q_assert, q_error, QEvt, QPSet, QSignal};

use crate::registry;
use crate::trace::{self, records};

/// Object-safe subscriber storage, so the framework does not care how many
/// signals the application provisioned.
pub trait SubscrStore: Sync {
    fn max_signals(&self) -> usize;
    fn subscribe(&self, sig: QSignal, prio: u8);
    fn unsubscribe(&self, sig: QSignal, prio: u8);
    fn snapshot(&self, sig: QSignal) -> QPSet;
}

/// Statically allocated subscriber table covering signals `0..NSIG`.
pub struct SubscrTable<const NSIG: usize> {
    sets: Mutex<RefCell<[QPSet; NSIG]>>,
}

impl<const NSIG: usize> SubscrTable<NSIG> {
    pub const fn new() -> Self {
        Self {
            sets: Mutex::new(RefCell::new([QPSet::EMPTY; NSIG])),
        }
    }
}

impl<const NSIG: usize> Default for SubscrTable<NSIG> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const NSIG: usize> SubscrStore for SubscrTable<NSIG> {
    fn max_signals(&self) -> usize {
        NSIG
    }

    fn subscribe(&self, sig: QSignal, prio: u8) {
        q_assert!((sig.raw() as usize) < NSIG);
        critical_section::with(|cs| {
            self.sets.borrow_ref_mut(cs)[sig.raw() as usize].insert(prio);
        });
    }

    fn unsubscribe(&self, sig: QSignal, prio: u8) {
        q_assert!((sig.raw() as usize) < NSIG);
        critical_section::with(|cs| {
            self.sets.borrow_ref_mut(cs)[sig.raw() as usize].remove(prio);
        });
    }

    fn snapshot(&self, sig: QSignal) -> QPSet {
        q_assert!((sig.raw() as usize) < NSIG);
        critical_section::with(|cs| self.sets.borrow_ref(cs)[sig.raw() as usize])
    }
}

static SUBSCR: Mutex<Cell<Option<&'static dyn SubscrStore>>> = Mutex::new(Cell::new(None));

/// Supplies the application's subscriber storage. Must be called before
/// any subscribe or publish.
pub fn ps_init(table: &'static dyn SubscrStore) {
    critical_section::with(|cs| SUBSCR.borrow(cs).set(Some(table)));
}

fn store() -> &'static dyn SubscrStore {
    match critical_section::with(|cs| SUBSCR.borrow(cs).get()) {
        Some(store) => store,
        None => q_error!(),
    }
}

pub fn subscribe(sig: QSignal, prio: u8) {
    q_assert!(!sig.is_reserved());
    store().subscribe(sig, prio);
}

pub fn unsubscribe(sig: QSignal, prio: u8) {
    q_assert!(!sig.is_reserved());
    store().unsubscribe(sig, prio);
}

/// Publishes `e` to every subscriber of its signal, highest priority
/// first. Legal from any kernel-aware context. A dynamic event with no
/// subscribers is recycled immediately.
pub fn publish(e: QEvt) {
    q_assert!(!e.sig().is_reserved());
    trace::emit(records::qf::PUBLISH, &e.sig().raw().to_le_bytes());
    let mut set = store().snapshot(e.sig());
    if set.is_empty() {
        quill_mem::gc(e);
        return;
    }
    // Hold one reference across the delivery loop so an eager subscriber
    // cannot recycle the event out from under the remaining posts.
    quill_mem::incr_ref(e);
    loop {
        let prio = set.find_max();
        if prio == 0 {
            break;
        }
        set.remove(prio);
        // A subscriber that never started would lose events silently;
        // treat it as a startup-order bug.
        let ao = match registry::by_prio(prio) {
            Some(ao) => ao,
            None => q_error!(),
        };
        ao.post(e, 0);
    }
    quill_mem::gc(e);
}
