#![no_std]
#![cfg_attr(not(test), forbid(unsafe_code))]

//! # Quill Core
//!
//! Core types, traits, and the assertion contract for the Quill real-time
//! active-object framework. Everything here is `no_std`, statically
//! allocated, and free of heap use.

#[cfg(any(test, feature = "std"))]
extern crate std;

use core::cell::Cell;
use core::fmt;

use critical_section::Mutex;

pub mod evt;
pub mod pset;
pub mod signals;
pub mod tick;

pub use evt::QEvt;
pub use pset::QPSet;
pub use signals::QSignal;
pub use tick::QTimeEvtCtr;

/// Quill framework version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the framework for recoverable failures.
pub type QResult<T> = Result<T, QError>;

/// Recoverable error conditions surfaced through the API.
///
/// Fatal invariant violations do not go through this type; they go through
/// [`assert_failed`] and the registered assertion handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QError {
    /// Event queue cannot admit the event within the requested margin
    QueueFull,
    /// Event pool has no free blocks of an adequate size
    OutOfMemory,
    /// Priority outside 1..=MAX_ACTIVE or already taken
    InvalidPriority,
    /// Signal outside the configured publish/subscribe range
    InvalidSignal,
    /// Time event operation on an unregistered or exhausted wheel
    TimerError,
}

impl fmt::Display for QError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QError::QueueFull => write!(f, "event queue full"),
            QError::OutOfMemory => write!(f, "event pool exhausted"),
            QError::InvalidPriority => write!(f, "invalid priority"),
            QError::InvalidSignal => write!(f, "signal out of range"),
            QError::TimerError => write!(f, "time event error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for QError {}

#[cfg(feature = "defmt")]
impl defmt::Format for QError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            QError::QueueFull => defmt::write!(fmt, "QueueFull"),
            QError::OutOfMemory => defmt::write!(fmt, "OutOfMemory"),
            QError::InvalidPriority => defmt::write!(fmt, "InvalidPriority"),
            QError::InvalidSignal => defmt::write!(fmt, "InvalidSignal"),
            QError::TimerError => defmt::write!(fmt, "TimerError"),
        }
    }
}

/// Handler invoked on a fatal invariant violation. Must not return.
pub type AssertHandler = fn(module: &'static str, line: u32) -> !;

static ASSERT_HANDLER: Mutex<Cell<Option<AssertHandler>>> = Mutex::new(Cell::new(None));

/// Registers the application assertion handler (the BSP's `on_assert`).
///
/// Called once by the framework init before the scheduler starts.
pub fn set_assert_handler(handler: AssertHandler) {
    critical_section::with(|cs| ASSERT_HANDLER.borrow(cs).set(Some(handler)));
}

/// Routes a failed framework assertion to the registered handler.
///
/// Without a registered handler the failure falls back to a panic, which is
/// what hosted test builds rely on.
pub fn assert_failed(module: &'static str, line: u32) -> ! {
    let handler = critical_section::with(|cs| ASSERT_HANDLER.borrow(cs).get());
    match handler {
        Some(handler) => handler(module, line),
        None => panic!("assertion failed at {module}:{line}"),
    }
}

/// Fatal framework assertion. Calls into the registered handler on failure.
#[macro_export]
macro_rules! q_assert {
    ($cond:expr) => {
        if !$cond {
            $crate::assert_failed(core::module_path!(), core::line!());
        }
    };
}

/// Marks an unreachable framework state; always fatal.
#[macro_export]
macro_rules! q_error {
    () => {
        $crate::assert_failed(core::module_path!(), core::line!())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(std::format!("{}", QError::QueueFull), "event queue full");
        assert_eq!(std::format!("{}", QError::OutOfMemory), "event pool exhausted");
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn unhandled_assertion_panics() {
        q_assert!(1 + 1 == 3);
    }
}
