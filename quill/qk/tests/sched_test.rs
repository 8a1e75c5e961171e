//! Preemptive kernel: immediate activation on post, nested preemption of
//! a running RTC step, and the priority-ceiling lock.

use std::sync::Mutex;

use quill_core::{QEvt, QSignal};
use quill_hsm::{tran, QState};
use quill_qf::active::Active;
use quill_qf::QActive;
use quill_qk::QSchedStatus;

const SIG_PLAIN: QSignal = QSignal::new(60);
const SIG_SPAWN: QSignal = QSignal::new(61);

static ORDER: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

fn note(what: &'static str) {
    ORDER.lock().unwrap().push(what);
}

struct Low;
struct High;

fn low_initial(_sm: &mut Low, _e: &QEvt) -> QState<Low> {
    tran(low_running)
}

fn low_running(_sm: &mut Low, e: &QEvt) -> QState<Low> {
    match e.sig() {
        SIG_PLAIN => {
            note("low");
            QState::Handled
        }
        SIG_SPAWN => {
            note("low:begin");
            // This post preempts the current step: the high-priority
            // object runs before the line below executes.
            AO_HI.post(QEvt::immutable(SIG_PLAIN), 0);
            note("low:end");
            QState::Handled
        }
        _ => QState::Handled,
    }
}

fn high_initial(_sm: &mut High, _e: &QEvt) -> QState<High> {
    tran(high_running)
}

fn high_running(_sm: &mut High, e: &QEvt) -> QState<High> {
    if e.sig() == SIG_PLAIN {
        note("high");
        assert_eq!(quill_qk::current_prio(), 5);
    }
    QState::Handled
}

static AO_LO: QActive<Low, 4> = QActive::new(3, Low, low_initial);
static AO_HI: QActive<High, 4> = QActive::new(5, High, high_initial);

#[test]
fn preemptive_scheduling_and_ceiling_lock() {
    quill_qk::init();
    AO_LO.start();
    AO_HI.start();

    // Two objects made ready under a lock run in priority order at unlock.
    let lock = quill_qk::lock(10);
    assert!(lock.is_locked());
    AO_LO.post(QEvt::immutable(SIG_PLAIN), 0);
    AO_HI.post(QEvt::immutable(SIG_PLAIN), 0);
    assert!(ORDER.lock().unwrap().is_empty());
    quill_qk::unlock(lock);
    assert_eq!(&ORDER.lock().unwrap()[..], &["high", "low"][..]);

    // Re-locking at or below the current ceiling reports Unlocked and
    // unlock of that status is a no-op.
    let outer = quill_qk::lock(8);
    let inner = quill_qk::lock(4);
    assert_eq!(inner, QSchedStatus::Unlocked);
    quill_qk::unlock(inner);
    quill_qk::unlock(outer);

    // A post from inside a running step activates the higher priority
    // object synchronously, nested on the same stack.
    ORDER.lock().unwrap().clear();
    AO_LO.post(QEvt::immutable(SIG_SPAWN), 0);
    assert_eq!(
        &ORDER.lock().unwrap()[..],
        &["low:begin", "high", "low:end"][..]
    );
    assert_eq!(quill_qk::current_prio(), 0);
}
