//! The global ready set: priorities of active objects with pending events.
//!
//! Maintained by the queue layer on every post and get; consumed by the
//! kernels to pick what runs next. All mutation happens under the critical
//! section of the queue operation that caused it, so a ready bit can never
//! disagree with its queue.

use core::cell::Cell;

use critical_section::{CriticalSection, Mutex};

use quill_core::QPSet;

static READY: Mutex<Cell<QPSet>> = Mutex::new(Cell::new(QPSet::EMPTY));

pub fn set(cs: CriticalSection<'_>, prio: u8) {
    let cell = READY.borrow(cs);
    let mut s = cell.get();
    s.insert(prio);
    cell.set(s);
}

pub fn clear(cs: CriticalSection<'_>, prio: u8) {
    let cell = READY.borrow(cs);
    let mut s = cell.get();
    s.remove(prio);
    cell.set(s);
}

/// Highest ready priority, or 0 when nothing is ready.
pub fn find_max(cs: CriticalSection<'_>) -> u8 {
    READY.borrow(cs).get().find_max()
}

pub fn snapshot() -> QPSet {
    critical_section::with(|cs| READY.borrow(cs).get())
}
