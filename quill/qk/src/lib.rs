#![no_std]
#![forbid(unsafe_code)]

//! # Quill QK
//!
//! The preemptive priority kernel. A post that makes a higher-priority
//! active object ready runs it *now*: from task context by nested
//! activation (the preempted RTC step resumes when the higher one
//! completes), from interrupt context through the port's context-switch
//! request at ISR exit. A priority-ceiling lock lets a task shut out
//! preemption from a band of priorities without disabling interrupts.

use core::cell::{Cell, RefCell};

use critical_section::Mutex;

use quill_core::{q_assert, q_error};
use quill_qf::trace::{self, records};
use quill_qf::{ready, registry, sched};

/// Saved scheduler-lock state, returned by [`lock`] and consumed by
/// [`unlock`]. Nesting works by stacking these in the callers' frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QSchedStatus {
    /// The lock raised the ceiling; holds the previous ceiling.
    Locked(u8),
    /// The lock did not change anything (already at or above the ceiling).
    Unlocked,
}

impl QSchedStatus {
    pub fn is_locked(self) -> bool {
        matches!(self, QSchedStatus::Locked(_))
    }
}

/// Port operations the kernel needs on a real target.
pub trait QkPort: Sync {
    /// Requests a context switch to be taken when the last nested ISR
    /// returns (on Cortex-M: pend PendSV, then the erratum barrier).
    fn pend_context_switch(&self);
}

struct QkState {
    /// Priority of the RTC step running right now; 0 at idle.
    cur_prio: u8,
    /// Priorities at or below this do not preempt.
    lock_ceiling: u8,
    /// Depth of nested kernel-aware ISRs.
    isr_nest: u8,
}

static QK: Mutex<RefCell<QkState>> = Mutex::new(RefCell::new(QkState {
    cur_prio: 0,
    lock_ceiling: 0,
    isr_nest: 0,
}));

static PORT: Mutex<Cell<Option<&'static dyn QkPort>>> = Mutex::new(Cell::new(None));

/// Hooks the kernel into the framework's post notification. Call once
/// before any active object starts.
pub fn init() {
    sched::set_sched_hook(sched_hook);
}

/// Installs the target port. Without one (hosted builds), ISR-exit
/// scheduling degrades to synchronous activation.
pub fn set_port(port: &'static dyn QkPort) {
    critical_section::with(|cs| PORT.borrow(cs).set(Some(port)));
}

fn sched_hook() {
    let in_isr = critical_section::with(|cs| QK.borrow_ref(cs).isr_nest > 0);
    // Posts from ISRs are scheduled once, at ISR exit.
    if !in_isr {
        schedule();
    }
}

/// Runs every ready active object above both the current activation
/// priority and the lock ceiling, highest first, each to completion.
///
/// Reentrant by design: a post during a dispatch activates the
/// higher-priority object nested on the same stack, which is exactly the
/// preemption the kernel promises.
pub fn schedule() {
    loop {
        let step = critical_section::with(|cs| {
            let mut st = QK.borrow_ref_mut(cs);
            let prio = ready::find_max(cs);
            if prio > st.cur_prio && prio > st.lock_ceiling {
                let prev = st.cur_prio;
                st.cur_prio = prio;
                Some((prio, prev))
            } else {
                None
            }
        });
        let (prio, prev) = match step {
            Some(step) => step,
            None => break,
        };
        let ao = match registry::by_prio(prio) {
            Some(ao) => ao,
            None => q_error!(),
        };
        trace::emit(records::sched::NEXT, &[prio, prev]);
        ao.dispatch_next();
        critical_section::with(|cs| QK.borrow_ref_mut(cs).cur_prio = prev);
        trace::emit(records::sched::RESTORE, &[prev, prio]);
    }
}

/// Raises the scheduler ceiling to `ceiling` so that no active object at
/// or below it preempts the caller. Returns the state to pass to
/// [`unlock`]; locks nest.
pub fn lock(ceiling: u8) -> QSchedStatus {
    critical_section::with(|cs| {
        let mut st = QK.borrow_ref_mut(cs);
        if ceiling > st.lock_ceiling {
            let prev = st.lock_ceiling;
            st.lock_ceiling = ceiling;
            drop(st);
            trace::emit(records::sched::LOCK, &[prev, ceiling]);
            QSchedStatus::Locked(prev)
        } else {
            QSchedStatus::Unlocked
        }
    })
}

/// Restores the ceiling saved by the matching [`lock`] and runs anything
/// that became ready while locked.
pub fn unlock(status: QSchedStatus) {
    if let QSchedStatus::Locked(prev) = status {
        let ceiling = critical_section::with(|cs| {
            let mut st = QK.borrow_ref_mut(cs);
            q_assert!(st.lock_ceiling >= prev);
            let ceiling = st.lock_ceiling;
            st.lock_ceiling = prev;
            ceiling
        });
        trace::emit(records::sched::UNLOCK, &[ceiling, prev]);
        schedule();
    }
}

/// Brackets the body of a kernel-aware ISR: call on entry.
pub fn isr_enter() {
    critical_section::with(|cs| {
        let mut st = QK.borrow_ref_mut(cs);
        st.isr_nest += 1;
    });
}

/// Brackets the body of a kernel-aware ISR: call on exit. When the last
/// nested ISR leaves and a preempting priority is ready, requests the
/// context switch through the port.
pub fn isr_exit() {
    let request = critical_section::with(|cs| {
        let mut st = QK.borrow_ref_mut(cs);
        q_assert!(st.isr_nest > 0);
        st.isr_nest -= 1;
        let prio = ready::find_max(cs);
        st.isr_nest == 0 && prio > st.cur_prio && prio > st.lock_ceiling
    });
    if request {
        let port = critical_section::with(|cs| PORT.borrow(cs).get());
        match port {
            Some(port) => port.pend_context_switch(),
            None => schedule(),
        }
    }
}

/// Priority of the RTC step running right now (0 at idle).
pub fn current_prio() -> u8 {
    critical_section::with(|cs| QK.borrow_ref(cs).cur_prio)
}

/// Runs the preemptive kernel forever. Startup posts are drained first;
/// after that the idle loop only runs when nothing is ready.
pub fn run() -> ! {
    quill_qf::on_startup();
    schedule();
    loop {
        quill_qf::on_idle();
        schedule();
    }
}
