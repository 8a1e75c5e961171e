#![no_std]

//! # Quill Cortex-M port
//!
//! Target glue for ARM Cortex-M (v6-M and v7-M+): the critical section
//! comes from the `cortex-m` crate's PRIMASK implementation
//! (`critical-section-single-core`), context-switch requests go through
//! PendSV, and the idle hooks get the race-free WFI sleep sequences.
//!
//! All hardware access is compiled only for `thumbv*-none-eabi*` targets;
//! on a hosted build this crate is empty, which keeps the workspace
//! testable on the development machine.

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod arm;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use arm::*;
