//! Cooperative kernel: strict priority order between run-to-completion
//! steps, one event per step.

use std::sync::Mutex;

use quill_core::{QEvt, QSignal};
use quill_hsm::{tran, QState};
use quill_qf::active::Active;
use quill_qf::QActive;

static ORDER: Mutex<Vec<(u8, u16)>> = Mutex::new(Vec::new());

struct Tagged {
    prio: u8,
}

fn initial(_sm: &mut Tagged, _e: &QEvt) -> QState<Tagged> {
    tran(running)
}

fn running(sm: &mut Tagged, e: &QEvt) -> QState<Tagged> {
    if !e.sig().is_reserved() {
        ORDER.lock().unwrap().push((sm.prio, e.sig().raw()));
    }
    QState::Handled
}

static AO3: QActive<Tagged, 4> = QActive::new(3, Tagged { prio: 3 }, initial);
static AO5: QActive<Tagged, 4> = QActive::new(5, Tagged { prio: 5 }, initial);

#[test]
fn higher_priority_object_runs_first() {
    AO3.start();
    AO5.start();

    // Make both ready before the loop runs; the lower priority was posted
    // first and still goes second.
    AO3.post(QEvt::immutable(QSignal::new(30)), 1);
    AO3.post(QEvt::immutable(QSignal::new(31)), 1);
    AO5.post(QEvt::immutable(QSignal::new(50)), 1);

    let steps = quill_qv::run_until_idle();
    assert_eq!(steps, 3);

    let order = ORDER.lock().unwrap();
    assert_eq!(&order[..], &[(5, 50), (3, 30), (3, 31)][..]);
}
