//! Bounded event queues.
//!
//! The queue keeps one event in a dedicated *front* slot and the rest in a
//! ring of `N` slots, so an empty queue (the common case) never touches the
//! ring: a post lands in the front slot and a get drains it. Total capacity
//! is therefore `N + 1`.
//!
//! The same type serves as the incoming queue of an active object and as a
//! "raw" thread-safe queue for event deferral or ISR-to-task handoff; only
//! the active-object layer adds ready-set bookkeeping on top.

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};

use quill_core::{q_assert, QEvt};

/// Outcome of a FIFO post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostResult {
    /// Event stored; `was_empty` reports an empty-to-non-empty transition.
    Stored { was_empty: bool },
    /// Margin not met; the event was not stored and no reference was taken.
    Rejected,
}

struct EQueueState<const N: usize> {
    front: Option<QEvt>,
    ring: [Option<QEvt>; N],
    head: u8,
    tail: u8,
    n_free: u8,
    /// Low-watermark of free slots since init.
    n_min: u8,
}

/// Event queue with `N` ring slots plus the front slot.
pub struct QEQueue<const N: usize> {
    inner: Mutex<RefCell<EQueueState<N>>>,
}

impl<const N: usize> QEQueue<N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(EQueueState {
                front: None,
                ring: [None; N],
                head: 0,
                tail: 0,
                n_free: N as u8 + 1,
                n_min: N as u8 + 1,
            })),
        }
    }

    /// Total capacity including the front slot.
    pub const fn capacity(&self) -> usize {
        N + 1
    }

    /// FIFO post under an already-entered critical section.
    ///
    /// Accepts the event iff `n_free > margin`, so a successful post leaves
    /// at least `margin` slots free. A failed post with margin 0 is fatal.
    /// On success the event gains a reference.
    pub fn post_cs(&self, cs: CriticalSection<'_>, e: QEvt, margin: u16) -> PostResult {
        let mut q = self.inner.borrow_ref_mut(cs);
        let state = &mut *q;
        if u16::from(state.n_free) > margin {
            quill_mem::incr_ref(e);
            let was_empty = state.front.is_none();
            if was_empty {
                state.front = Some(e);
            } else {
                state.ring[state.head as usize] = Some(e);
                state.head = (state.head + 1) % N as u8;
            }
            state.n_free -= 1;
            if state.n_free < state.n_min {
                state.n_min = state.n_free;
            }
            PostResult::Stored { was_empty }
        } else {
            // Margin 0 means the post must succeed.
            q_assert!(margin != 0);
            PostResult::Rejected
        }
    }

    /// LIFO post: the event becomes the next one delivered. Never takes a
    /// margin; overflow is fatal. Returns the empty-to-non-empty flag.
    pub fn post_lifo_cs(&self, cs: CriticalSection<'_>, e: QEvt) -> bool {
        let mut q = self.inner.borrow_ref_mut(cs);
        let state = &mut *q;
        q_assert!(state.n_free > 0);
        quill_mem::incr_ref(e);
        let was_empty = state.front.is_none();
        if was_empty {
            state.front = Some(e);
        } else {
            // The displaced front re-queues at the read side of the ring.
            state.tail = (state.tail + N as u8 - 1) % N as u8;
            state.ring[state.tail as usize] = state.front.take();
            state.front = Some(e);
        }
        state.n_free -= 1;
        if state.n_free < state.n_min {
            state.n_min = state.n_free;
        }
        was_empty
    }

    /// Dequeues the front event; the ring refills the front slot when it
    /// has entries. The second tuple element reports whether the queue is
    /// now empty. The caller keeps the dequeued reference and must gc it.
    pub fn get_cs(&self, cs: CriticalSection<'_>) -> Option<(QEvt, bool)> {
        let mut q = self.inner.borrow_ref_mut(cs);
        let state = &mut *q;
        let e = state.front.take()?;
        let ring_used = N as u8 - state.n_free;
        if ring_used > 0 {
            let refill = state.ring[state.tail as usize].take();
            q_assert!(refill.is_some());
            state.front = refill;
            state.tail = (state.tail + 1) % N as u8;
        }
        state.n_free += 1;
        Some((e, state.front.is_none()))
    }

    /// FIFO post from task or ISR context.
    pub fn post(&self, e: QEvt, margin: u16) -> bool {
        critical_section::with(|cs| matches!(self.post_cs(cs, e, margin), PostResult::Stored { .. }))
    }

    /// Best-effort FIFO post: accepts whenever any slot is free. This is
    /// the deferral policy, where a full deferred queue is an application
    /// decision rather than an error.
    pub fn try_post(&self, e: QEvt) -> bool {
        critical_section::with(|cs| {
            let n_free = self.inner.borrow_ref(cs).n_free;
            if n_free == 0 {
                false
            } else {
                matches!(self.post_cs(cs, e, 0), PostResult::Stored { .. })
            }
        })
    }

    /// LIFO post from task or ISR context.
    pub fn post_lifo(&self, e: QEvt) {
        critical_section::with(|cs| {
            self.post_lifo_cs(cs, e);
        });
    }

    /// Dequeues one event from task or ISR context.
    pub fn get(&self) -> Option<QEvt> {
        critical_section::with(|cs| self.get_cs(cs).map(|(e, _)| e))
    }

    pub fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).front.is_none())
    }

    /// Free slots right now (stable only while a single context uses the
    /// queue, e.g. a deferred-event store).
    pub fn n_free(&self) -> u8 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).n_free)
    }

    /// Low-watermark of free slots since init (queue-sizing aid).
    pub fn n_min(&self) -> u8 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).n_min)
    }
}

impl<const N: usize> Default for QEQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::QSignal;

    fn evt(sig: u16) -> QEvt {
        QEvt::immutable(QSignal::new(sig))
    }

    #[test]
    fn fifo_order_preserved() {
        let q: QEQueue<4> = QEQueue::new();
        for sig in [1, 2, 3] {
            assert!(q.post(evt(sig), 1));
        }
        assert_eq!(q.get().unwrap().sig(), QSignal::new(1));
        assert_eq!(q.get().unwrap().sig(), QSignal::new(2));
        assert_eq!(q.get().unwrap().sig(), QSignal::new(3));
        assert!(q.get().is_none());
    }

    #[test]
    fn lifo_event_jumps_the_line() {
        let q: QEQueue<4> = QEQueue::new();
        q.post(evt(1), 1);
        q.post(evt(2), 1);
        q.post_lifo(evt(9));
        assert_eq!(q.get().unwrap().sig(), QSignal::new(9));
        assert_eq!(q.get().unwrap().sig(), QSignal::new(1));
        assert_eq!(q.get().unwrap().sig(), QSignal::new(2));
    }

    #[test]
    fn margin_rejects_at_the_line() {
        // Ring of 2 plus the front slot: capacity 3.
        let q: QEQueue<2> = QEQueue::new();
        assert!(q.post(evt(1), 1));
        assert!(q.post(evt(2), 1));
        // Third post would leave no free slot, below the margin of 1.
        assert!(!q.post(evt(3), 1));
        assert_eq!(q.n_free(), 1);
    }

    // Overflow at margin 0 is fatal; that path is covered in the
    // `queue_overflow` integration test, which must own its process.

    #[test]
    fn free_count_plus_used_is_capacity() {
        let q: QEQueue<3> = QEQueue::new();
        assert_eq!(q.n_free(), 4);
        q.post(evt(1), 1);
        q.post(evt(2), 1);
        assert_eq!(q.n_free(), 2);
        q.get();
        assert_eq!(q.n_free(), 3);
        // Watermark keeps the lowest point.
        assert_eq!(q.n_min(), 2);
    }

    #[test]
    fn front_slot_bypasses_ring() {
        let q: QEQueue<2> = QEQueue::new();
        // Alternating post/get never engages the ring.
        for sig in 10..20 {
            q.post(evt(sig), 1);
            assert_eq!(q.get().unwrap().sig(), QSignal::new(sig));
        }
        assert_eq!(q.n_min(), 2);
    }

    #[test]
    fn lifo_into_empty_queue_uses_front() {
        let q: QEQueue<2> = QEQueue::new();
        q.post_lifo(evt(5));
        assert_eq!(q.get().unwrap().sig(), QSignal::new(5));
        assert!(q.is_empty());
    }

    #[test]
    fn try_post_fills_to_the_brim() {
        let q: QEQueue<1> = QEQueue::new();
        assert!(q.try_post(evt(1)));
        assert!(q.try_post(evt(2)));
        assert!(!q.try_post(evt(3)));
    }

    #[test]
    fn wraparound_keeps_order() {
        let q: QEQueue<3> = QEQueue::new();
        for sig in [1, 2, 3] {
            q.post(evt(sig), 1);
        }
        assert_eq!(q.get().unwrap().sig(), QSignal::new(1));
        q.post(evt(4), 1);
        assert_eq!(q.get().unwrap().sig(), QSignal::new(2));
        q.post(evt(5), 1);
        for sig in [3, 4, 5] {
            assert_eq!(q.get().unwrap().sig(), QSignal::new(sig));
        }
    }
}
