//! Freeing a block index a pool does not own is fatal. The assertion
//! fires inside the pool critical section, so this test owns its process.

use quill_mem::{EvtPool, QEvtPool};

static POOL: QEvtPool<8, 4> = QEvtPool::new();

#[test]
#[should_panic(expected = "assertion failed")]
fn foreign_block_free_is_fatal() {
    POOL.init();
    POOL.gc(200);
}
