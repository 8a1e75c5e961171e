#![no_std]

//! # Quill QF
//!
//! The active-object framework layer: bounded event queues with the
//! front-slot fast path, active objects binding a state machine to a queue
//! and a priority, the dense priority registry, event deferral and recall,
//! publish/subscribe, and tick-driven time events.
//!
//! The kernels (`quill-qk`, `quill-qv`) sit on top of this crate: they read
//! the ready set maintained here and call [`active::Active::dispatch_next`]
//! on whichever active object they select.

use core::cell::Cell;

use critical_section::Mutex;

use quill_core::AssertHandler;

pub mod active;
pub mod equeue;
pub mod pubsub;
pub mod ready;
pub mod registry;
pub mod sched;
pub mod time;
pub mod trace;

pub use active::{Active, QActive};
pub use equeue::{PostResult, QEQueue};
pub use pubsub::{ps_init, publish, SubscrTable};
pub use quill_core::{QEvt, QPSet, QSignal};
pub use quill_mem::{gc, new_evt, new_evt_margin, pool_init};
pub use registry::MAX_ACTIVE;
pub use time::{tick, QTimeEvt, MAX_TICK_RATES};

/// Board-support callbacks supplied by the application.
///
/// Registered once through [`init`] before any active object starts; the
/// assertion hook must not return.
pub struct QBsp {
    pub on_startup: fn(),
    pub on_idle: fn(),
    pub on_cleanup: fn(),
    pub on_assert: AssertHandler,
}

static BSP: Mutex<Cell<Option<&'static QBsp>>> = Mutex::new(Cell::new(None));

/// Initializes the framework with the application's board support.
pub fn init(bsp: &'static QBsp) {
    quill_core::set_assert_handler(bsp.on_assert);
    critical_section::with(|cs| BSP.borrow(cs).set(Some(bsp)));
}

pub fn bsp() -> Option<&'static QBsp> {
    critical_section::with(|cs| BSP.borrow(cs).get())
}

/// Runs the application's startup hook, if registered.
pub fn on_startup() {
    if let Some(bsp) = bsp() {
        (bsp.on_startup)();
    }
}

/// Runs the application's idle hook; spins when none is registered.
pub fn on_idle() {
    match bsp() {
        Some(bsp) => (bsp.on_idle)(),
        None => core::hint::spin_loop(),
    }
}

pub fn on_cleanup() {
    if let Some(bsp) = bsp() {
        (bsp.on_cleanup)();
    }
}

/// Trace-channel callbacks supplied by the application's port: transport
/// bring-up, a blocking flush for pre-reset moments, target reset, and
/// the record timestamp source.
pub struct QsBsp {
    pub qs_startup: fn(),
    pub qs_flush: fn(),
    pub qs_reset: fn() -> !,
    pub qs_get_time: fn() -> u32,
}

static QS_BSP: Mutex<Cell<Option<&'static QsBsp>>> = Mutex::new(Cell::new(None));

/// Registers the trace-channel callbacks; optional, tracing works without
/// them but then has no transport or timestamps.
pub fn qs_init(bsp: &'static QsBsp) {
    critical_section::with(|cs| QS_BSP.borrow(cs).set(Some(bsp)));
    (bsp.qs_startup)();
}

pub fn qs_bsp() -> Option<&'static QsBsp> {
    critical_section::with(|cs| QS_BSP.borrow(cs).get())
}

/// Drains the trace transport if the application registered one.
pub fn qs_flush() {
    if let Some(bsp) = qs_bsp() {
        (bsp.qs_flush)();
    }
}
