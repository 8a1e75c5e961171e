//! A pool of four blocks admits four allocations; the fifth is fatal.

use quill_core::QSignal;
use quill_mem::{new_evt, pool_init, QEvtPool};

static POOL: QEvtPool<8, 4> = QEvtPool::new();

#[test]
#[should_panic(expected = "assertion failed")]
fn fifth_allocation_without_gc_is_fatal() {
    pool_init(&POOL);
    for _ in 0..4 {
        let _ = new_evt(QSignal::new(5), 8);
    }
    let _ = new_evt(QSignal::new(5), 8);
}
