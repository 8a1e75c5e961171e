//! Dense priority-indexed registry of started active objects.

use core::cell::RefCell;

use critical_section::Mutex;

use quill_core::q_assert;

use crate::active::Active;

/// Highest usable active-object priority; 0 is reserved for idle.
pub const MAX_ACTIVE: usize = 32;

const VACANT: Option<&'static dyn Active> = None;

static REGISTRY: Mutex<RefCell<[Option<&'static dyn Active>; MAX_ACTIVE + 1]>> =
    Mutex::new(RefCell::new([VACANT; MAX_ACTIVE + 1]));

/// Registers a started active object under its priority.
///
/// Priorities are unique; a second registration at the same slot or a
/// priority outside `1..=MAX_ACTIVE` is fatal.
pub fn register(ao: &'static dyn Active) {
    let prio = ao.prio() as usize;
    q_assert!(prio >= 1 && prio <= MAX_ACTIVE);
    critical_section::with(|cs| {
        let mut table = REGISTRY.borrow_ref_mut(cs);
        q_assert!(table[prio].is_none());
        table[prio] = Some(ao);
    });
}

/// Looks up the active object registered at `prio`.
pub fn by_prio(prio: u8) -> Option<&'static dyn Active> {
    if prio == 0 || prio as usize > MAX_ACTIVE {
        return None;
    }
    critical_section::with(|cs| REGISTRY.borrow_ref(cs)[prio as usize])
}
