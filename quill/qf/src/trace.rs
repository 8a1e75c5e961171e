//! Framework instrumentation hook.
//!
//! The framework reports its interesting moments (posts, gets, deferrals,
//! publishes, time-event activity, scheduler decisions) through a single
//! registered hook; the application's port wires the hook to its trace
//! channel instance. Without a hook every emission is a no-op, so an
//! untraced build pays one load and branch per instrumentation point.

use core::cell::Cell;

use critical_section::Mutex;

pub use quill_qs::records;

/// Receives a record id (see [`records`]) and its payload bytes.
pub type TraceHook = fn(rec: u8, payload: &[u8]);

static HOOK: Mutex<Cell<Option<TraceHook>>> = Mutex::new(Cell::new(None));

pub fn set_trace_hook(hook: TraceHook) {
    critical_section::with(|cs| HOOK.borrow(cs).set(Some(hook)));
}

/// Emits one instrumentation record through the registered hook.
pub fn emit(rec: u8, payload: &[u8]) {
    let hook = critical_section::with(|cs| HOOK.borrow(cs).get());
    if let Some(hook) = hook {
        hook(rec, payload);
    }
}

/// Payload helper: active-object priority plus the event signal.
pub(crate) fn prio_sig(prio: u8, sig: u16) -> [u8; 3] {
    let sig = sig.to_le_bytes();
    [prio, sig[0], sig[1]]
}
