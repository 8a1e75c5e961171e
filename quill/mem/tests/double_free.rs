//! Recycling a block twice is fatal. The assertion fires inside the pool
//! critical section, so this test owns its process.

use quill_core::QSignal;
use quill_mem::{EvtPool, QEvtPool};

static POOL: QEvtPool<8, 4> = QEvtPool::new();

#[test]
#[should_panic(expected = "assertion failed")]
fn double_free_is_fatal() {
    POOL.init();
    let e = POOL.alloc(QSignal::new(5), 1).unwrap();
    POOL.gc(e.idx());
    POOL.gc(e.idx());
}
