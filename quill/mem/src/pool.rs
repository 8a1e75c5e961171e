//! Fixed-block event pools.

use core::cell::RefCell;

use critical_section::Mutex;

use quill_core::{q_assert, QEvt, QSignal};

/// One block: reference count, payload length, and the payload bytes.
struct Block<const BS: usize> {
    /// Next free block index, or `FREE_END`.
    next_free: u8,
    in_use: bool,
    ref_ctr: u8,
    len: u8,
    data: [u8; BS],
}

const FREE_END: u8 = u8::MAX;

impl<const BS: usize> Block<BS> {
    const INIT: Self = Self {
        next_free: FREE_END,
        in_use: false,
        ref_ctr: 0,
        len: 0,
        data: [0; BS],
    };
}

struct PoolState<const BS: usize, const N: usize> {
    blocks: [Block<BS>; N],
    free_head: u8,
    n_free: u16,
    /// Low-watermark: minimum free blocks ever observed.
    n_min: u16,
    initialized: bool,
}

/// Statically allocated pool of `N` blocks, each holding up to `BS` payload
/// bytes.
///
/// Declared by the application and handed to the framework through
/// `pool_init`; all access after that goes through the [`EvtPool`] trait
/// under the critical section.
pub struct QEvtPool<const BS: usize, const N: usize> {
    inner: Mutex<RefCell<PoolState<BS, N>>>,
}

impl<const BS: usize, const N: usize> QEvtPool<BS, N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(PoolState {
                blocks: [Block::INIT; N],
                free_head: FREE_END,
                n_free: 0,
                n_min: 0,
                initialized: false,
            })),
        }
    }
}

impl<const BS: usize, const N: usize> Default for QEvtPool<BS, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Object-safe pool interface used by the registry.
pub trait EvtPool: Sync {
    /// Threads the free list through the blocks. Called once at
    /// registration, before the scheduler starts.
    fn init(&self);

    fn block_size(&self) -> usize;
    fn capacity(&self) -> u16;
    fn n_free(&self) -> u16;
    /// Low-watermark of free blocks since init (pool-sizing aid).
    fn n_min(&self) -> u16;

    /// Takes a free block; the fresh event has a reference count of zero
    /// and must be posted or garbage-collected by the caller.
    fn alloc(&self, sig: QSignal, pool_id: u8) -> Option<QEvt>;

    fn incr_ref(&self, idx: u8);

    /// Releases one reference; recycles the block when none remain.
    /// Returns true when the block was actually freed.
    fn gc(&self, idx: u8) -> bool;

    /// Copies payload bytes into the block. Only legal between allocation
    /// and the first post.
    fn write_payload(&self, idx: u8, bytes: &[u8]);

    /// Read access to the payload bytes of a live block.
    fn with_payload(&self, idx: u8, f: &mut dyn FnMut(&[u8]));
}

impl<const BS: usize, const N: usize> EvtPool for QEvtPool<BS, N> {
    fn init(&self) {
        q_assert!(N > 0 && N < FREE_END as usize);
        critical_section::with(|cs| {
            let mut pool = self.inner.borrow_ref_mut(cs);
            q_assert!(!pool.initialized);
            for i in 0..N {
                pool.blocks[i].next_free = if i + 1 < N { (i + 1) as u8 } else { FREE_END };
            }
            pool.free_head = 0;
            pool.n_free = N as u16;
            pool.n_min = N as u16;
            pool.initialized = true;
        });
    }

    fn block_size(&self) -> usize {
        BS
    }

    fn capacity(&self) -> u16 {
        N as u16
    }

    fn n_free(&self) -> u16 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).n_free)
    }

    fn n_min(&self) -> u16 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).n_min)
    }

    fn alloc(&self, sig: QSignal, pool_id: u8) -> Option<QEvt> {
        critical_section::with(|cs| {
            let mut pool = self.inner.borrow_ref_mut(cs);
            let state = &mut *pool;
            q_assert!(state.initialized);
            let idx = state.free_head;
            if idx == FREE_END {
                return None;
            }
            let blk = &mut state.blocks[idx as usize];
            q_assert!(!blk.in_use);
            state.free_head = blk.next_free;
            blk.in_use = true;
            blk.ref_ctr = 0;
            blk.len = 0;
            state.n_free -= 1;
            if state.n_free < state.n_min {
                state.n_min = state.n_free;
            }
            Some(QEvt::pooled(sig, pool_id, idx))
        })
    }

    fn incr_ref(&self, idx: u8) {
        critical_section::with(|cs| {
            let mut pool = self.inner.borrow_ref_mut(cs);
            q_assert!((idx as usize) < N);
            let blk = &mut pool.blocks[idx as usize];
            q_assert!(blk.in_use);
            q_assert!(blk.ref_ctr < u8::MAX);
            blk.ref_ctr += 1;
        });
    }

    fn gc(&self, idx: u8) -> bool {
        critical_section::with(|cs| {
            let mut pool = self.inner.borrow_ref_mut(cs);
            // Freeing a block this pool does not own is fatal.
            q_assert!((idx as usize) < N);
            q_assert!(pool.blocks[idx as usize].in_use);
            if pool.blocks[idx as usize].ref_ctr > 1 {
                pool.blocks[idx as usize].ref_ctr -= 1;
                false
            } else {
                let head = pool.free_head;
                let blk = &mut pool.blocks[idx as usize];
                blk.in_use = false;
                blk.ref_ctr = 0;
                blk.next_free = head;
                pool.free_head = idx;
                pool.n_free += 1;
                q_assert!(pool.n_free <= N as u16);
                true
            }
        })
    }

    fn write_payload(&self, idx: u8, bytes: &[u8]) {
        critical_section::with(|cs| {
            let mut pool = self.inner.borrow_ref_mut(cs);
            q_assert!((idx as usize) < N);
            q_assert!(bytes.len() <= BS);
            let blk = &mut pool.blocks[idx as usize];
            q_assert!(blk.in_use);
            // Events become immutable once posted.
            q_assert!(blk.ref_ctr == 0);
            blk.data[..bytes.len()].copy_from_slice(bytes);
            blk.len = bytes.len() as u8;
        });
    }

    fn with_payload(&self, idx: u8, f: &mut dyn FnMut(&[u8])) {
        critical_section::with(|cs| {
            let pool = self.inner.borrow_ref(cs);
            q_assert!((idx as usize) < N);
            let blk = &pool.blocks[idx as usize];
            q_assert!(blk.in_use);
            f(&blk.data[..blk.len as usize]);
        });
    }
}
