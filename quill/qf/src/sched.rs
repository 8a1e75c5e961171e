//! Kernel notification hook.
//!
//! A preemptive kernel needs to run its scheduler whenever a post makes a
//! higher-priority active object ready. The kernel registers a hook here at
//! startup; the active-object layer invokes it after every successful post,
//! outside the posting critical section. The cooperative kernel leaves the
//! hook unset and simply re-examines the ready set on its next loop turn.

use core::cell::Cell;

use critical_section::Mutex;

pub type SchedHook = fn();

static HOOK: Mutex<Cell<Option<SchedHook>>> = Mutex::new(Cell::new(None));

pub fn set_sched_hook(hook: SchedHook) {
    critical_section::with(|cs| HOOK.borrow(cs).set(Some(hook)));
}

pub(crate) fn notify() {
    let hook = critical_section::with(|cs| HOOK.borrow(cs).get());
    if let Some(hook) = hook {
        hook();
    }
}
