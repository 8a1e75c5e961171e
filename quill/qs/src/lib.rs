#![no_std]
#![forbid(unsafe_code)]

//! # Quill QS
//!
//! Binary software tracing: instrumented framework and application code
//! emits compact records into a ring buffer that a transport drains
//! asynchronously, so tracing never blocks the traced system. A 128-bit
//! global filter over record types and per-object local filters gate
//! emission at the source; the receive side decodes host commands (filter
//! changes, reset, tick injection, user commands) carried over the same
//! frame format.
//!
//! The wire format is a little-endian byte stream. Each record:
//! sequence byte, record type byte, optional 32-bit timestamp, fields,
//! checksum byte; frames end with `0x7E`, and `0x7D` escapes either
//! special byte by flipping bit 5 of the next one.

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod buffer;
pub mod dict;
pub mod records;
pub mod rx;
pub mod user;

#[cfg(feature = "std")]
pub mod backend;

pub use buffer::{Qs, TimestampFn, ESC, ESC_XOR, FLAG, MAX_RECORD_LEN};
pub use dict::TargetInfo;
pub use records::Group;
pub use rx::{QsRx, QsRxCommand};
pub use user::{make_format, UserRecord};
