//! The trace buffer: record assembly, framing, filters, and the byte ring
//! the transport drains.
//!
//! Producers are non-blocking: a record that does not fit in the remaining
//! ring space is dropped whole and counted. The transport pulls bytes with
//! [`Qs::byte_out`] (typically from the idle loop or a TX-ready interrupt)
//! and never blocks a producer either.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Vec;

use quill_core::{q_assert, QSignal};

use crate::records::{self, Group};

/// Frame terminator byte.
pub const FLAG: u8 = 0x7E;
/// Escape byte; the following byte has bit 5 flipped.
pub const ESC: u8 = 0x7D;
/// XOR mask applied to escaped bytes.
pub const ESC_XOR: u8 = 0x20;

/// Largest assembled record payload (before framing).
pub const MAX_RECORD_LEN: usize = 64;

/// Timestamp source supplied by the BSP (`qs_get_time`).
pub type TimestampFn = fn() -> u32;

struct QsState<const N: usize> {
    ring: [u8; N],
    head: usize,
    tail: usize,
    used: usize,
    seq: u8,
    /// Records dropped because the ring was full.
    dropped: u16,
    glb_filter: u128,
    loc_filter: u128,
    timestamp: Option<TimestampFn>,
    /// Record under construction, if any.
    scratch: Option<Scratch>,
}

struct Scratch {
    rec: u8,
    bytes: Vec<u8, MAX_RECORD_LEN>,
    overflow: bool,
}

/// A statically allocated trace channel with an `N`-byte output ring.
pub struct Qs<const N: usize> {
    inner: Mutex<RefCell<QsState<N>>>,
}

impl<const N: usize> Qs<N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(QsState {
                ring: [0; N],
                head: 0,
                tail: 0,
                used: 0,
                seq: 0,
                dropped: 0,
                // Everything off until the application or the host enables
                // groups; local filters default to all-on.
                glb_filter: 0,
                loc_filter: u128::MAX,
                timestamp: None,
                scratch: None,
            })),
        }
    }

    /// Registers the BSP timestamp callback.
    pub fn set_timestamp_fn(&self, f: TimestampFn) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).timestamp = Some(f));
    }

    pub fn set_glb_filter(&self, rec: u8, enable: bool) {
        q_assert!(rec >= 1 && rec <= records::MAX_RECORD);
        critical_section::with(|cs| {
            let mut st = self.inner.borrow_ref_mut(cs);
            if enable {
                st.glb_filter |= 1u128 << rec;
            } else {
                st.glb_filter &= !(1u128 << rec);
            }
        });
    }

    /// Enables or disables a whole record group.
    pub fn filter_group(&self, group: Group, enable: bool) {
        let (lo, hi) = group.ids();
        for rec in lo..=hi {
            self.set_glb_filter(rec, enable);
        }
    }

    pub fn set_glb_mask(&self, mask: u128) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).glb_filter = mask);
    }

    /// Per-object local filter over QS object ids `0..128`.
    pub fn set_loc_filter(&self, qs_id: u8, enable: bool) {
        q_assert!(qs_id < 128);
        critical_section::with(|cs| {
            let mut st = self.inner.borrow_ref_mut(cs);
            if enable {
                st.loc_filter |= 1u128 << qs_id;
            } else {
                st.loc_filter &= !(1u128 << qs_id);
            }
        });
    }

    pub fn set_loc_mask(&self, mask: u128) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).loc_filter = mask);
    }

    /// Records dropped so far because the ring was full.
    pub fn dropped(&self) -> u16 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).dropped)
    }

    /// Opens a record if it passes the filters. Field writers and
    /// [`Qs::end`] only apply while a record is open; a filtered-out
    /// record makes them no-ops.
    pub fn begin(&self, rec: u8, qs_id: u8) -> bool {
        q_assert!(rec >= 1 && rec <= records::MAX_RECORD);
        critical_section::with(|cs| {
            let mut st = self.inner.borrow_ref_mut(cs);
            let pass = records::is_non_maskable(rec)
                || (st.glb_filter & (1u128 << rec) != 0
                    && (qs_id >= 128 || st.loc_filter & (1u128 << qs_id) != 0));
            if !pass {
                st.scratch = None;
                return false;
            }
            let mut scratch = Scratch {
                rec,
                bytes: Vec::new(),
                overflow: false,
            };
            if let Some(ts) = st.timestamp {
                let now = ts();
                scratch.push(&now.to_le_bytes());
            }
            st.scratch = Some(scratch);
            true
        })
    }

    /// Opens an untimestamped record (dictionaries, target info).
    pub fn begin_no_ts(&self, rec: u8) -> bool {
        q_assert!(rec >= 1 && rec <= records::MAX_RECORD);
        critical_section::with(|cs| {
            let mut st = self.inner.borrow_ref_mut(cs);
            let pass = records::is_non_maskable(rec) || st.glb_filter & (1u128 << rec) != 0;
            st.scratch = pass.then_some(Scratch {
                rec,
                bytes: Vec::new(),
                overflow: false,
            });
            pass
        })
    }

    pub fn u8_(&self, v: u8) {
        self.raw(&[v]);
    }

    pub fn u16_(&self, v: u16) {
        self.raw(&v.to_le_bytes());
    }

    pub fn u32_(&self, v: u32) {
        self.raw(&v.to_le_bytes());
    }

    pub fn u64_(&self, v: u64) {
        self.raw(&v.to_le_bytes());
    }

    pub fn sig_(&self, sig: QSignal) {
        self.u16_(sig.raw());
    }

    /// QS object id field (also the local-filter key).
    pub fn obj_(&self, qs_id: u8) {
        self.raw(&[qs_id]);
    }

    /// Zero-terminated string field.
    pub fn str_(&self, s: &str) {
        critical_section::with(|cs| {
            let mut st = self.inner.borrow_ref_mut(cs);
            if let Some(scratch) = st.scratch.as_mut() {
                scratch.push(s.as_bytes());
                scratch.push(&[0]);
            }
        });
    }

    fn raw(&self, bytes: &[u8]) {
        critical_section::with(|cs| {
            let mut st = self.inner.borrow_ref_mut(cs);
            if let Some(scratch) = st.scratch.as_mut() {
                scratch.push(bytes);
            }
        });
    }

    /// Closes the open record, frames it, and commits it to the ring.
    /// A record that overflowed its scratch space or the ring is dropped
    /// whole and counted.
    pub fn end(&self) {
        critical_section::with(|cs| {
            let mut st = self.inner.borrow_ref_mut(cs);
            let state = &mut *st;
            let scratch = match state.scratch.take() {
                Some(s) => s,
                None => return,
            };
            if scratch.overflow {
                state.dropped = state.dropped.saturating_add(1);
                return;
            }

            // Worst case every byte escapes: 2 bytes each for seq, type,
            // payload and checksum, plus the flag.
            let worst = 2 * (2 + scratch.bytes.len() + 1) + 1;
            if N - state.used < worst {
                state.dropped = state.dropped.saturating_add(1);
                return;
            }

            state.seq = state.seq.wrapping_add(1);
            let mut checksum: u8 = 0;

            let seq = state.seq;
            push_escaped(state, &mut checksum, seq);
            push_escaped(state, &mut checksum, scratch.rec);
            for &b in scratch.bytes.iter() {
                push_escaped(state, &mut checksum, b);
            }
            let chk = !checksum;
            let mut ignore: u8 = 0;
            push_escaped(state, &mut ignore, chk);
            push_byte(state, FLAG);
        });
    }

    /// Hands out the next byte for the transport, or `None` when the ring
    /// is drained.
    pub fn byte_out(&self) -> Option<u8> {
        critical_section::with(|cs| {
            let mut st = self.inner.borrow_ref_mut(cs);
            if st.used == 0 {
                return None;
            }
            let b = st.ring[st.tail];
            st.tail = (st.tail + 1) % N;
            st.used -= 1;
            Some(b)
        })
    }

    /// Drains everything buffered through `f` (hosted transports).
    pub fn flush_with(&self, f: &mut dyn FnMut(u8)) {
        while let Some(b) = self.byte_out() {
            f(b);
        }
    }

    pub fn bytes_used(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).used)
    }
}

impl<const N: usize> Default for Qs<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl Scratch {
    fn push(&mut self, bytes: &[u8]) {
        if self.bytes.extend_from_slice(bytes).is_err() {
            self.overflow = true;
        }
    }
}

fn push_byte<const N: usize>(st: &mut QsState<N>, b: u8) {
    st.ring[st.head] = b;
    st.head = (st.head + 1) % N;
    st.used += 1;
}

fn push_escaped<const N: usize>(st: &mut QsState<N>, checksum: &mut u8, b: u8) {
    *checksum = checksum.wrapping_add(b);
    if b == FLAG || b == ESC {
        push_byte(st, ESC);
        push_byte(st, b ^ ESC_XOR);
    } else {
        push_byte(st, b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records;

    fn collect<const N: usize>(qs: &Qs<N>) -> std::vec::Vec<u8> {
        let mut out = std::vec::Vec::new();
        qs.flush_with(&mut |b| out.push(b));
        out
    }

    /// Reverses the escaping of one frame (without the trailing flag) and
    /// checks its checksum.
    fn unescape_and_verify(frame: &[u8]) -> std::vec::Vec<u8> {
        assert_eq!(*frame.last().unwrap(), FLAG);
        let mut out = std::vec::Vec::new();
        let mut esc = false;
        for &b in &frame[..frame.len() - 1] {
            if esc {
                out.push(b ^ ESC_XOR);
                esc = false;
            } else if b == ESC {
                esc = true;
            } else {
                assert_ne!(b, FLAG, "flag byte inside frame body");
                out.push(b);
            }
        }
        let sum = out
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_add(b));
        // Checksum byte makes the whole frame sum to 0xFF.
        assert_eq!(sum, 0xFF);
        out.pop();
        out
    }

    #[test]
    fn record_is_framed_and_checksummed() {
        let qs: Qs<128> = Qs::new();
        qs.filter_group(Group::User, true);
        assert!(qs.begin(records::USER, 0));
        qs.u8_(0x12);
        qs.u16_(0xBEEF);
        qs.end();

        let frame = collect(&qs);
        let body = unescape_and_verify(&frame);
        // seq, record id, fields (no timestamp source registered).
        assert_eq!(body, [1, records::USER, 0x12, 0xEF, 0xBE]);
    }

    #[test]
    fn flag_and_escape_bytes_are_escaped() {
        let qs: Qs<128> = Qs::new();
        qs.filter_group(Group::User, true);
        assert!(qs.begin(records::USER, 0));
        qs.u8_(FLAG);
        qs.u8_(ESC);
        qs.end();

        let frame = collect(&qs);
        // Only the terminator may be a raw flag byte.
        assert_eq!(frame.iter().filter(|&&b| b == FLAG).count(), 1);
        let body = unescape_and_verify(&frame);
        assert_eq!(body, [1, records::USER, FLAG, ESC]);
    }

    #[test]
    fn filtered_record_produces_nothing() {
        let qs: Qs<128> = Qs::new();
        assert!(!qs.begin(records::sm::DISPATCH, 1));
        qs.u8_(1);
        qs.end();
        assert_eq!(qs.bytes_used(), 0);
    }

    #[test]
    fn local_filter_gates_by_object() {
        let qs: Qs<128> = Qs::new();
        qs.filter_group(Group::Sm, true);
        qs.set_loc_filter(3, false);
        assert!(!qs.begin(records::sm::DISPATCH, 3));
        assert!(qs.begin(records::sm::DISPATCH, 4));
        qs.end();
        assert!(qs.bytes_used() > 0);
    }

    #[test]
    fn dictionaries_bypass_filters() {
        let qs: Qs<128> = Qs::new();
        assert!(qs.begin_no_ts(records::meta::SIG_DICT));
        qs.sig_(QSignal::new(7));
        qs.obj_(1);
        qs.str_("TICK");
        qs.end();
        let body = unescape_and_verify(&collect(&qs));
        assert_eq!(
            body,
            [1, records::meta::SIG_DICT, 7, 0, 1, b'T', b'I', b'C', b'K', 0]
        );
    }

    #[test]
    fn full_ring_drops_whole_records() {
        let qs: Qs<16> = Qs::new();
        qs.filter_group(Group::User, true);
        for _ in 0..4 {
            qs.begin(records::USER, 0);
            qs.u32_(0xAABBCCDD);
            qs.end();
        }
        assert!(qs.dropped() > 0);
        // Whatever was committed is still well-formed.
        let bytes = collect(&qs);
        assert_eq!(*bytes.last().unwrap(), FLAG);
    }

    #[test]
    fn sequence_numbers_increment() {
        let qs: Qs<256> = Qs::new();
        qs.filter_group(Group::User, true);
        for _ in 0..3 {
            qs.begin(records::USER, 0);
            qs.end();
        }
        let bytes = collect(&qs);
        let frames: std::vec::Vec<_> = bytes.split_inclusive(|&b| b == FLAG).collect();
        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            let body = unescape_and_verify(frame);
            assert_eq!(body[0], i as u8 + 1);
        }
    }

    fn fixed_now() -> u32 {
        0x0102_0304
    }

    #[test]
    fn timestamp_is_prepended_when_registered() {
        let qs: Qs<128> = Qs::new();
        qs.filter_group(Group::User, true);
        qs.set_timestamp_fn(fixed_now);
        qs.begin(records::USER, 0);
        qs.end();
        let body = unescape_and_verify(&collect(&qs));
        assert_eq!(body, [1, records::USER, 0x04, 0x03, 0x02, 0x01]);
    }
}
