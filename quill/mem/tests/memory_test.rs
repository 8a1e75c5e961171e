//! Pool registry integration: size-ordered registration, smallest-fit
//! allocation, and event lifetime round-trips.
//!
//! The pool table is process-wide, so this file keeps everything in one
//! test function.

use quill_core::QSignal;
use quill_mem::{gc, incr_ref, new_evt, new_evt_margin, pool_init, with_payload, write_payload, QEvtPool};

static SMALL: QEvtPool<4, 2> = QEvtPool::new();
static LARGE: QEvtPool<16, 2> = QEvtPool::new();

const SIG: QSignal = QSignal::new(20);

#[test]
fn smallest_fit_allocation_and_recycling() {
    pool_init(&SMALL);
    pool_init(&LARGE);

    // A 4-byte payload fits the small pool.
    let a = new_evt(SIG, 4);
    assert_eq!(a.pool_id(), 1);

    // A larger payload routes past it.
    let b = new_evt(SIG, 10);
    assert_eq!(b.pool_id(), 2);

    write_payload(b, &[9, 8, 7, 6, 5]);
    let mut len = 0;
    with_payload(b, |bytes| len = bytes.len());
    assert_eq!(len, 5);

    // Two references: the first gc only drops the count.
    incr_ref(a);
    incr_ref(a);
    gc(a);
    gc(a);
    // Block is free again; the small pool can hand out two blocks.
    let c = new_evt(SIG, 1);
    let d = new_evt(SIG, 2);
    assert_eq!(c.pool_id(), 1);
    assert_eq!(d.pool_id(), 1);
    assert!(new_evt_margin(SIG, 1).is_none());

    gc(b);
    gc(c);
    gc(d);
}
