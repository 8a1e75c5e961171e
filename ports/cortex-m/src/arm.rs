//! Cortex-M hardware glue: PendSV, SysTick, ISR brackets, idle sleep, and
//! per-object stacks for the preemptive kernel.

use core::arch::global_asm;
use core::cell::Cell;

use cortex_m::peripheral::syst::SystClkSource;
use critical_section::Mutex;

use quill_core::q_assert;
use quill_qk::QkPort;

/// Interrupt Control and State Register.
const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
/// PENDSVSET bit in ICSR.
const PENDSVSET: u32 = 1 << 28;
/// System Handler Priority Register 3 (PendSV and SysTick slots).
const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;

/// Pends a PendSV exception so the context switch runs when the last
/// nested ISR returns.
#[inline]
pub fn pend_context_switch() {
    unsafe {
        core::ptr::write_volatile(ICSR, PENDSVSET);
    }
    // ARM erratum 838869 workaround: barrier before the exception return
    // so the pend write cannot be lost (required on ARMv7-M and above).
    cortex_m::asm::dsb();
}

/// The kernel's port hook.
pub struct CortexMPort;

impl QkPort for CortexMPort {
    fn pend_context_switch(&self) {
        pend_context_switch();
    }
}

pub static PORT: CortexMPort = CortexMPort;

/// Installs the port into the preemptive kernel and drops PendSV and
/// SysTick to the lowest exception priority so a context switch never
/// preempts an application ISR.
pub fn init() {
    unsafe {
        let v = core::ptr::read_volatile(SHPR3);
        core::ptr::write_volatile(SHPR3, v | (0xFF << 16) | (0xFF << 24));
    }
    quill_qk::set_port(&PORT);
}

/// Brackets a kernel-aware ISR body: call first in the handler.
#[inline]
pub fn isr_entry() {
    quill_qk::isr_enter();
}

/// Brackets a kernel-aware ISR body: call last in the handler.
#[inline]
pub fn isr_exit() {
    quill_qk::isr_exit();
}

/// Body of the SysTick handler: advances tick rate 0 inside the ISR
/// brackets so the exit performs the scheduling pass.
pub fn systick_handler() {
    isr_entry();
    quill_qf::tick(0);
    isr_exit();
}

/// Configures SysTick as the framework tick source.
pub fn systick_init(syst: &mut cortex_m::peripheral::SYST, core_hz: u32, tick_hz: u32) {
    let reload = core_hz / tick_hz - 1;
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(reload);
    syst.clear_current();
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Idle sleep for the cooperative kernel.
///
/// Entered with PRIMASK set (the kernel holds the critical section across
/// the ready-set check). WFI wakes on a pended interrupt even while
/// masked, so the check-then-sleep window is closed; the woken interrupt
/// runs the moment PRIMASK drops here.
#[inline]
pub fn qv_sleep() {
    cortex_m::asm::wfi();
    unsafe { cortex_m::interrupt::enable() };
}

/// Idle sleep for the preemptive kernel's idle loop (interrupts enabled).
#[inline]
pub fn qk_sleep() {
    cortex_m::asm::wfi();
}

// --- per-object stacks for the preemptive kernel -------------------------

/// Double-word-aligned stack storage for one active object.
#[repr(align(8))]
pub struct QkStack<const WORDS: usize>(pub [u32; WORDS]);

impl<const WORDS: usize> QkStack<WORDS> {
    pub const fn new() -> Self {
        Self([0; WORDS])
    }
}

impl<const WORDS: usize> Default for QkStack<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

/// Hardware-stacked words on exception entry: R0-R3, R12, LR, PC, xPSR.
const HW_FRAME_WORDS: usize = 8;
/// Software-saved words: R4-R11.
const SW_FRAME_WORDS: usize = 8;

/// xPSR with the Thumb bit set.
const INITIAL_XPSR: u32 = 0x0100_0000;

/// Address of the slot where the outgoing PSP is saved (0: discard).
static SAVE_SLOT: Mutex<Cell<usize>> = Mutex::new(Cell::new(0));
/// Stack pointer the next PendSV switches to.
static NEXT_SP: Mutex<Cell<usize>> = Mutex::new(Cell::new(0));

/// Prepares a task stack so the first PendSV "return" enters `entry`.
/// Returns the initial process stack pointer for the object's thread.
pub fn stack_init<const WORDS: usize>(
    stack: &'static mut QkStack<WORDS>,
    entry: extern "C" fn() -> !,
) -> *mut u32 {
    q_assert!(WORDS >= HW_FRAME_WORDS + SW_FRAME_WORDS + 8);
    let top = unsafe { stack.0.as_mut_ptr().add(WORDS) };
    let top = ((top as usize) & !0x7) as *mut u32;
    let frame = unsafe { top.sub(HW_FRAME_WORDS + SW_FRAME_WORDS) };
    unsafe {
        for i in 0..SW_FRAME_WORDS {
            frame.add(i).write(0); // R4-R11
        }
        frame.add(8).write(0); // R0
        frame.add(9).write(0); // R1
        frame.add(10).write(0); // R2
        frame.add(11).write(0); // R3
        frame.add(12).write(0); // R12
        frame.add(13).write(thread_ret as usize as u32); // LR
        frame.add(14).write(entry as usize as u32 & !1); // PC
        frame.add(15).write(INITIAL_XPSR); // xPSR
    }
    frame
}

/// Publishes the switch the next PendSV performs: save the outgoing PSP
/// into `save_slot` (null to discard) and resume from `next_sp`.
pub fn set_switch(save_slot: *mut u32, next_sp: *mut u32) {
    critical_section::with(|cs| {
        SAVE_SLOT.borrow(cs).set(save_slot as usize);
        NEXT_SP.borrow(cs).set(next_sp as usize);
    });
}

/// Landing pad for a task entry function that returns; parks the CPU.
extern "C" fn thread_ret() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

/// Called from the PendSV handler with the outgoing PSP; stores it and
/// returns the incoming task's stack pointer.
#[no_mangle]
extern "C" fn quill_switch_context(outgoing_psp: u32) -> u32 {
    critical_section::with(|cs| {
        let slot = SAVE_SLOT.borrow(cs).get();
        if slot != 0 {
            unsafe { (slot as *mut u32).write(outgoing_psp) };
        }
        NEXT_SP.borrow(cs).get() as u32
    })
}

global_asm!(
    "
    .section .text.PendSV
    .global PendSV
    .type PendSV, %function
    .thumb_func
PendSV:
    mrs     r0, psp
    stmdb   r0!, {{r4-r11}}
    bl      quill_switch_context
    ldmia   r0!, {{r4-r11}}
    msr     psp, r0
    ldr     r0, =0xFFFFFFFD
    bx      r0
    "
);
