//! Time events: countdown timers delivered as events from a periodic tick.
//!
//! Each tick rate owns an independent wheel. Arming a time event links it
//! onto its wheel; every call to [`tick`] walks the wheel under the
//! critical section, counts armed timers down, and posts the expired ones
//! FIFO with margin 0 after the walk (so queue delivery never extends the
//! traversal's interrupt-disabled span).

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Vec;

use quill_core::{q_assert, q_error, QEvt, QSignal, QTimeEvtCtr};

use crate::registry;
use crate::trace::{self, records};

/// Independent tick rates (wheels).
pub const MAX_TICK_RATES: usize = 2;

/// Distinct time events a single wheel can carry.
pub const MAX_TIME_EVTS: usize = 16;

struct TimeEvtState {
    ctr: QTimeEvtCtr,
    interval: u32,
    linked: bool,
}

/// A statically allocated time event bound to one active object.
///
/// One-shot when armed with `interval == 0`, periodic otherwise. While
/// linked, re-arming is fatal; [`QTimeEvt::rearm`] adjusts a running timer.
pub struct QTimeEvt {
    sig: QSignal,
    ao_prio: u8,
    rate: u8,
    state: Mutex<RefCell<TimeEvtState>>,
}

type Wheel = Vec<&'static QTimeEvt, MAX_TIME_EVTS>;

const EMPTY_WHEEL: Mutex<RefCell<Wheel>> = Mutex::new(RefCell::new(Vec::new()));

static WHEELS: [Mutex<RefCell<Wheel>>; MAX_TICK_RATES] = [EMPTY_WHEEL; MAX_TICK_RATES];

impl QTimeEvt {
    /// Declares a time event that will post `sig` to the active object at
    /// priority `ao_prio`, driven by tick rate `rate`.
    pub const fn new(sig: QSignal, ao_prio: u8, rate: u8) -> Self {
        Self {
            sig,
            ao_prio,
            rate,
            state: Mutex::new(RefCell::new(TimeEvtState {
                ctr: QTimeEvtCtr::ZERO,
                interval: 0,
                linked: false,
            })),
        }
    }

    /// Arms the timer to fire after `ticks`, then every `interval` ticks
    /// (0 for one-shot). Arming an already-linked timer is fatal.
    pub fn arm(&'static self, ticks: u32, interval: u32) {
        q_assert!(ticks > 0);
        q_assert!((self.rate as usize) < MAX_TICK_RATES);
        critical_section::with(|cs| {
            {
                let mut st = self.state.borrow_ref_mut(cs);
                q_assert!(!st.linked);
                st.ctr = QTimeEvtCtr::new(ticks);
                st.interval = interval;
                st.linked = true;
            }
            self.link(cs);
        });
        trace::emit(records::te::ARM, &trace::prio_sig(self.ao_prio, self.sig.raw()));
    }

    /// Disarms the timer. Returns true when the timer was still armed,
    /// i.e. the disarm preceded delivery; calling it again returns false.
    pub fn disarm(&self) -> bool {
        let was_armed = critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            let was_armed = st.linked;
            st.linked = false;
            st.ctr = QTimeEvtCtr::ZERO;
            was_armed
        });
        let rec = if was_armed {
            records::te::DISARM
        } else {
            records::te::DISARM_ATTEMPT
        };
        trace::emit(rec, &trace::prio_sig(self.ao_prio, self.sig.raw()));
        was_armed
    }

    /// Restarts the countdown with `ticks`, re-arming an expired one-shot.
    /// Returns true when the timer was still running.
    pub fn rearm(&'static self, ticks: u32) -> bool {
        q_assert!(ticks > 0);
        trace::emit(records::te::REARM, &trace::prio_sig(self.ao_prio, self.sig.raw()));
        critical_section::with(|cs| {
            let was_armed = {
                let mut st = self.state.borrow_ref_mut(cs);
                let was_armed = st.linked;
                st.ctr = QTimeEvtCtr::new(ticks);
                st.linked = true;
                was_armed
            };
            self.link(cs);
            was_armed
        })
    }

    pub fn is_armed(&self) -> bool {
        critical_section::with(|cs| self.state.borrow_ref(cs).linked)
    }

    /// Remaining ticks until expiry; 0 when disarmed.
    pub fn ctr(&self) -> u32 {
        critical_section::with(|cs| self.state.borrow_ref(cs).ctr.ticks())
    }

    fn link(&'static self, cs: critical_section::CriticalSection<'_>) {
        let mut wheel = WHEELS[self.rate as usize].borrow_ref_mut(cs);
        if !wheel.iter().any(|t| core::ptr::eq(*t, self)) {
            let r = wheel.push(self);
            q_assert!(r.is_ok());
        }
    }
}

/// Advances tick rate `rate` by one tick; called from the BSP's periodic
/// tick source. Expired time events are posted FIFO with margin 0.
pub fn tick(rate: u8) {
    q_assert!((rate as usize) < MAX_TICK_RATES);
    trace::emit(records::qf::TICK, &[rate]);
    let mut fired: Vec<(u8, QSignal), MAX_TIME_EVTS> = Vec::new();
    critical_section::with(|cs| {
        let wheel = WHEELS[rate as usize].borrow_ref(cs);
        for t in wheel.iter() {
            let mut st = t.state.borrow_ref_mut(cs);
            if !st.linked {
                continue;
            }
            if st.ctr.decrement() {
                if st.interval > 0 {
                    let interval = st.interval;
                    st.ctr.reload(interval);
                } else {
                    st.linked = false;
                }
                // Wheel and fired list share a bound, so this cannot fail.
                let r = fired.push((t.ao_prio, t.sig));
                q_assert!(r.is_ok());
            }
        }
    });
    for (prio, sig) in fired {
        let ao = match registry::by_prio(prio) {
            Some(ao) => ao,
            None => q_error!(),
        };
        trace::emit(records::te::POST, &trace::prio_sig(prio, sig.raw()));
        ao.post(QEvt::immutable(sig), 0);
    }
}
