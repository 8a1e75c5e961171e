#![no_std]
#![forbid(unsafe_code)]

//! # Quill QV
//!
//! The cooperative kernel: every run-to-completion step runs on the single
//! main stack, strictly in priority order, and nothing preempts a dispatch.
//! Interrupts preempt the *loop* (between dispatches) and feed it by
//! posting events; the loop picks the highest-priority ready active object
//! each time around.

use quill_core::q_error;
use quill_qf::active::Active;
use quill_qf::{ready, registry};

/// Selects the highest-priority ready active object, or hands control to
/// the idle hook.
///
/// The selection and the idle handoff both happen inside the critical
/// section, which closes the wake race: an interrupt that posts after the
/// ready set was seen empty cannot slip between the check and the sleep.
/// The idle hook therefore runs with interrupts disabled and must
/// re-enable them (on Cortex-M, the port's sleep sequence does exactly
/// that around WFI).
fn next() -> Option<&'static dyn Active> {
    critical_section::with(|cs| {
        let prio = ready::find_max(cs);
        if prio > 0 {
            // A ready bit without a registered object means an event was
            // posted to an object that never started.
            match registry::by_prio(prio) {
                Some(ao) => Some(ao),
                None => q_error!(),
            }
        } else {
            quill_qf::on_idle();
            None
        }
    })
}

/// Runs the cooperative scheduler forever.
pub fn run() -> ! {
    quill_qf::on_startup();
    loop {
        if let Some(ao) = next() {
            // One event, run to completion, interrupts enabled.
            ao.dispatch_next();
        }
    }
}

/// Drains the ready set and returns the number of run-to-completion steps
/// taken. Hosted builds and tests drive the kernel with this instead of
/// the endless [`run`] loop.
pub fn run_until_idle() -> usize {
    let mut steps = 0;
    loop {
        let ao = critical_section::with(|cs| {
            let prio = ready::find_max(cs);
            if prio > 0 {
                match registry::by_prio(prio) {
                    Some(ao) => Some(ao),
                    None => q_error!(),
                }
            } else {
                None
            }
        });
        match ao {
            Some(ao) => {
                if !ao.dispatch_next() {
                    break;
                }
                steps += 1;
            }
            None => break,
        }
    }
    steps
}
