//! Time-event wheels: periodic delivery schedule, one-shot unlinking, and
//! the idempotent-disarm law.

use heapless::Vec;
use quill_core::{QEvt, QSignal};
use quill_hsm::{tran, QState};
use quill_qf::active::Active;
use quill_qf::{tick, QActive, QTimeEvt};

const SIG_PERIODIC: QSignal = QSignal::new(50);
const SIG_ONESHOT: QSignal = QSignal::new(51);
const SIG_REARM: QSignal = QSignal::new(52);

struct Collector {
    seen: Vec<u16, 32>,
}

impl Collector {
    const fn new() -> Self {
        Self { seen: Vec::new() }
    }
}

fn initial(_sm: &mut Collector, _e: &QEvt) -> QState<Collector> {
    tran(running)
}

fn running(sm: &mut Collector, e: &QEvt) -> QState<Collector> {
    if !e.sig().is_reserved() {
        sm.seen.push(e.sig().raw()).unwrap();
    }
    QState::Handled
}

static AO_RATE0: QActive<Collector, 8> = QActive::new(4, Collector::new(), initial);
static AO_RATE1: QActive<Collector, 8> = QActive::new(7, Collector::new(), initial);

static PERIODIC: QTimeEvt = QTimeEvt::new(SIG_PERIODIC, 4, 0);
static ONESHOT: QTimeEvt = QTimeEvt::new(SIG_ONESHOT, 7, 1);
static REARMED: QTimeEvt = QTimeEvt::new(SIG_REARM, 7, 1);
static NEVER: QTimeEvt = QTimeEvt::new(QSignal::new(53), 7, 1);

fn drain<A: Active>(ao: &A) -> usize {
    let mut n = 0;
    while ao.dispatch_next() {
        n += 1;
    }
    n
}

#[test]
fn periodic_timer_fires_on_schedule() {
    AO_RATE0.start();

    // Armed with 3 ticks then every 2: deliveries on ticks 3, 5, 7, 9.
    PERIODIC.arm(3, 2);
    let mut delivered_at: Vec<u32, 8> = Vec::new();
    for now in 1..=9 {
        tick(0);
        if drain(&AO_RATE0) > 0 {
            delivered_at.push(now).unwrap();
        }
    }
    assert_eq!(&delivered_at[..], &[3, 5, 7, 9][..]);
    assert!(PERIODIC.is_armed());

    assert!(PERIODIC.disarm());
    for _ in 0..4 {
        tick(0);
    }
    assert_eq!(drain(&AO_RATE0), 0);
}

#[test]
fn oneshot_rearm_and_disarm_laws() {
    AO_RATE1.start();

    // One-shot unlinks itself at expiry.
    ONESHOT.arm(2, 0);
    tick(1);
    assert!(ONESHOT.is_armed());
    tick(1);
    assert!(!ONESHOT.is_armed());
    assert_eq!(drain(&AO_RATE1), 1);
    tick(1);
    assert_eq!(drain(&AO_RATE1), 0);

    // Disarm is idempotent: (true, false) when armed, (false, false) when
    // never armed.
    ONESHOT.arm(5, 0);
    assert!(ONESHOT.disarm());
    assert!(!ONESHOT.disarm());
    assert!(!NEVER.disarm());

    // Rearm stretches a running countdown and revives an expired one.
    REARMED.arm(1, 0);
    assert!(REARMED.rearm(3));
    tick(1);
    tick(1);
    assert_eq!(drain(&AO_RATE1), 0);
    tick(1);
    assert_eq!(drain(&AO_RATE1), 1);
    assert!(!REARMED.rearm(2));
    tick(1);
    tick(1);
    assert_eq!(drain(&AO_RATE1), 1);
}
