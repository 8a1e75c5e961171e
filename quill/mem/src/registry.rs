//! Process-wide pool table and event lifetime operations.

use core::cell::RefCell;

use critical_section::Mutex;

use quill_core::{q_assert, q_error, QEvt, QSignal};

use crate::pool::EvtPool;

/// Maximum number of registered event pools.
pub const MAX_POOLS: usize = 3;

struct PoolTable {
    pools: [Option<&'static dyn EvtPool>; MAX_POOLS],
    count: usize,
}

static POOLS: Mutex<RefCell<PoolTable>> = Mutex::new(RefCell::new(PoolTable {
    pools: [None; MAX_POOLS],
    count: 0,
}));

/// Registers `pool` as the next event pool.
///
/// Pools must be registered in non-decreasing block-size order, before the
/// scheduler starts; violating either rule is fatal.
pub fn pool_init(pool: &'static dyn EvtPool) {
    pool.init();
    critical_section::with(|cs| {
        let mut table = POOLS.borrow_ref_mut(cs);
        let n = table.count;
        q_assert!(n < MAX_POOLS);
        if n > 0 {
            let prev = table.pools[n - 1].unwrap_or_else(|| q_error!());
            q_assert!(pool.block_size() >= prev.block_size());
        }
        table.pools[n] = Some(pool);
        table.count = n + 1;
    });
}

fn by_id(pool_id: u8) -> &'static dyn EvtPool {
    critical_section::with(|cs| {
        let table = POOLS.borrow_ref(cs);
        q_assert!(pool_id >= 1 && (pool_id as usize) <= table.count);
        table.pools[pool_id as usize - 1].unwrap_or_else(|| q_error!())
    })
}

/// Allocates a dynamic event with room for `payload_len` payload bytes.
///
/// Picks the smallest registered pool whose block size fits. The fresh
/// event has a reference count of zero: the caller must post it or [`gc`]
/// it. Exhaustion of the selected pool is fatal; use [`new_evt_margin`]
/// where running dry is survivable.
pub fn new_evt(sig: QSignal, payload_len: usize) -> QEvt {
    match new_evt_margin(sig, payload_len) {
        Some(e) => e,
        None => q_error!(),
    }
}

/// Like [`new_evt`], but returns `None` instead of failing fatally when the
/// selected pool is exhausted.
pub fn new_evt_margin(sig: QSignal, payload_len: usize) -> Option<QEvt> {
    let (pool, pool_id) = critical_section::with(|cs| {
        let table = POOLS.borrow_ref(cs);
        for i in 0..table.count {
            let pool = table.pools[i].unwrap_or_else(|| q_error!());
            if pool.block_size() >= payload_len {
                return (pool, (i + 1) as u8);
            }
        }
        // No pool can hold a payload this large.
        q_error!()
    });
    pool.alloc(sig, pool_id)
}

/// Adds a reference to a dynamic event. Immutable events are unaffected.
pub fn incr_ref(e: QEvt) {
    if e.is_static() {
        return;
    }
    by_id(e.pool_id()).incr_ref(e.idx());
}

/// Releases one reference to `e`, recycling the block when no references
/// remain. Immutable events are unaffected.
pub fn gc(e: QEvt) {
    if e.is_static() {
        return;
    }
    by_id(e.pool_id()).gc(e.idx());
}

/// Copies payload bytes into a freshly allocated event. Fatal once the
/// event has been posted anywhere.
pub fn write_payload(e: QEvt, bytes: &[u8]) {
    q_assert!(!e.is_static());
    by_id(e.pool_id()).write_payload(e.idx(), bytes);
}

/// Grants read access to the payload of a dynamic event. An immutable
/// event presents an empty payload.
pub fn with_payload<F: FnMut(&[u8])>(e: QEvt, mut f: F) {
    if e.is_static() {
        f(&[]);
        return;
    }
    by_id(e.pool_id()).with_payload(e.idx(), &mut f);
}

/// Low-watermark of free blocks in pool `pool_id` since initialization.
pub fn pool_margin(pool_id: u8) -> u16 {
    by_id(pool_id).n_min()
}
