//! Dictionary and target-info records for the host handshake.
//!
//! Dictionaries map numeric signals, object ids, and user record ids to
//! names so the host tool can label the stream. They are non-maskable and
//! carry no timestamp.

use quill_core::QSignal;

use crate::buffer::Qs;
use crate::records::meta;

/// Static description of the target, sent on startup and on the host's
/// info request.
#[derive(Debug, Clone)]
pub struct TargetInfo {
    pub version: u16,
    pub signal_size: u8,
    pub timestamp_size: u8,
    pub queue_ctr_size: u8,
    pub time_evt_ctr_size: u8,
    pub pool_ctr_size: u8,
    pub max_active: u8,
    pub max_event_pools: u8,
    pub max_tick_rates: u8,
}

impl Default for TargetInfo {
    fn default() -> Self {
        Self {
            version: 40,
            signal_size: 2,
            timestamp_size: 4,
            queue_ctr_size: 1,
            time_evt_ctr_size: 4,
            pool_ctr_size: 2,
            max_active: 32,
            max_event_pools: 3,
            max_tick_rates: 2,
        }
    }
}

impl<const N: usize> Qs<N> {
    /// Associates `sig` (scoped to object `qs_id`, 0 for global) with a name.
    pub fn sig_dict(&self, sig: QSignal, qs_id: u8, name: &str) {
        if self.begin_no_ts(meta::SIG_DICT) {
            self.sig_(sig);
            self.obj_(qs_id);
            self.str_(name);
            self.end();
        }
    }

    /// Associates a QS object id with a name.
    pub fn obj_dict(&self, qs_id: u8, name: &str) {
        if self.begin_no_ts(meta::OBJ_DICT) {
            self.obj_(qs_id);
            self.str_(name);
            self.end();
        }
    }

    /// Associates an application record id with a name.
    pub fn usr_dict(&self, rec: u8, name: &str) {
        if self.begin_no_ts(meta::USR_DICT) {
            self.u8_(rec);
            self.str_(name);
            self.end();
        }
    }

    /// Emits the target-info handshake record.
    pub fn target_info(&self, info: &TargetInfo) {
        if self.begin_no_ts(meta::TARGET_INFO) {
            self.u16_(info.version);
            self.u8_(info.signal_size | (info.timestamp_size << 4));
            self.u8_(info.queue_ctr_size | (info.time_evt_ctr_size << 4));
            self.u8_(info.pool_ctr_size);
            self.u8_(info.max_active);
            self.u8_(info.max_event_pools | (info.max_tick_rates << 4));
            self.end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FLAG;

    #[test]
    fn dictionaries_emit_without_any_filters_enabled() {
        let qs: Qs<256> = Qs::new();
        qs.sig_dict(QSignal::new(9), 0, "BUTTON_PRESSED");
        qs.obj_dict(3, "blinky");
        qs.usr_dict(crate::records::USER, "position");
        let info = TargetInfo::default();
        qs.target_info(&info);

        let mut frames = 0;
        qs.flush_with(&mut |b| {
            if b == FLAG {
                frames += 1;
            }
        });
        assert_eq!(frames, 4);
    }
}
