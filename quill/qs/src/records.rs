//! Canonical trace record identifiers and filter groups.

/// State machine engine records.
pub mod sm {
    pub const STATE_ENTRY: u8 = 1;
    pub const STATE_EXIT: u8 = 2;
    pub const STATE_INIT: u8 = 3;
    pub const INIT_TRAN: u8 = 4;
    pub const INTERN_TRAN: u8 = 5;
    pub const TRAN: u8 = 6;
    pub const IGNORED: u8 = 7;
    pub const DISPATCH: u8 = 8;
    pub const TRAN_HIST: u8 = 9;
}

/// Active object records.
pub mod ao {
    pub const DEFER: u8 = 10;
    pub const RECALL: u8 = 11;
    pub const SUBSCRIBE: u8 = 12;
    pub const UNSUBSCRIBE: u8 = 13;
    pub const POST: u8 = 14;
    pub const POST_LIFO: u8 = 15;
    pub const GET: u8 = 16;
    pub const GET_LAST: u8 = 17;
    pub const POST_ATTEMPT: u8 = 18;
}

/// Raw event queue records.
pub mod eq {
    pub const POST: u8 = 19;
    pub const POST_LIFO: u8 = 20;
    pub const GET: u8 = 21;
    pub const GET_LAST: u8 = 22;
    pub const POST_ATTEMPT: u8 = 23;
}

/// Event pool records.
pub mod mp {
    pub const GET: u8 = 24;
    pub const PUT: u8 = 25;
    pub const GET_ATTEMPT: u8 = 26;
}

/// Framework-level records.
pub mod qf {
    pub const PUBLISH: u8 = 27;
    pub const NEW: u8 = 28;
    pub const NEW_ATTEMPT: u8 = 29;
    pub const GC: u8 = 30;
    pub const GC_ATTEMPT: u8 = 31;
    pub const TICK: u8 = 32;
    pub const ISR_ENTRY: u8 = 41;
    pub const ISR_EXIT: u8 = 42;
}

/// Time event records.
pub mod te {
    pub const ARM: u8 = 33;
    pub const AUTO_DISARM: u8 = 34;
    pub const DISARM_ATTEMPT: u8 = 35;
    pub const DISARM: u8 = 36;
    pub const REARM: u8 = 37;
    pub const POST: u8 = 38;
}

/// Scheduler records.
pub mod sched {
    pub const PREEMPT: u8 = 48;
    pub const RESTORE: u8 = 49;
    pub const LOCK: u8 = 50;
    pub const UNLOCK: u8 = 51;
    pub const NEXT: u8 = 52;
    pub const IDLE: u8 = 53;
}

/// Non-maskable housekeeping records (never filtered out).
pub mod meta {
    pub const SIG_DICT: u8 = 60;
    pub const OBJ_DICT: u8 = 61;
    pub const USR_DICT: u8 = 62;
    pub const TARGET_INFO: u8 = 63;
    pub const RX_STATUS: u8 = 64;
    pub const ASSERT_FAIL: u8 = 65;
}

/// First application-defined record id.
pub const USER: u8 = 100;

/// Highest record id representable in the 128-bit global filter.
pub const MAX_RECORD: u8 = 127;

pub(crate) fn is_non_maskable(rec: u8) -> bool {
    (meta::SIG_DICT..=meta::ASSERT_FAIL).contains(&rec)
}

/// Record groups for bulk filter changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    /// State machine engine records.
    Sm,
    /// Active object records.
    Ao,
    /// Event queue records.
    Eq,
    /// Event pool records.
    Mp,
    /// Time event records.
    Te,
    /// Framework records.
    Qf,
    /// Scheduler records.
    Sched,
    /// All application records.
    User,
    /// Everything maskable.
    All,
}

impl Group {
    pub(crate) fn ids(self) -> (u8, u8) {
        match self {
            Group::Sm => (sm::STATE_ENTRY, sm::TRAN_HIST),
            Group::Ao => (ao::DEFER, ao::POST_ATTEMPT),
            Group::Eq => (eq::POST, eq::POST_ATTEMPT),
            Group::Mp => (mp::GET, mp::GET_ATTEMPT),
            Group::Te => (te::ARM, te::POST),
            Group::Qf => (qf::PUBLISH, qf::ISR_EXIT),
            Group::Sched => (sched::PREEMPT, sched::IDLE),
            Group::User => (USER, MAX_RECORD),
            Group::All => (1, MAX_RECORD),
        }
    }
}
