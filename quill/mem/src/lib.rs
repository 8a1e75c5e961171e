#![no_std]
#![forbid(unsafe_code)]

//! # Quill Mem
//!
//! Reference-counted dynamic events backed by fixed-block pools.
//!
//! Pools are declared statically by the application, registered at startup
//! in non-decreasing block-size order, and never destroyed. An allocation
//! picks the smallest registered pool whose block size fits the request.
//! The reference count of a pooled event lives in its block; the only legal
//! lifetime operations are [`incr_ref`] and [`gc`] (posting and dispatching
//! call them on the application's behalf).

pub mod pool;
pub mod registry;

pub use pool::{EvtPool, QEvtPool};
pub use registry::{
    gc, incr_ref, new_evt, new_evt_margin, pool_init, pool_margin, with_payload, write_payload,
    MAX_POOLS,
};
