use core::arch::naked_asm;
use core::ptr::write_volatile;

use cortex_m::peripheral::{
    scb::{SystemHandler, VectActive},
    SCB,
};

use crate::{cleanup, Arch, Thread, SCHEDULER};

#[cfg(not(any(armv6m, armv7m, armv8m)))]
compile_error!("no supported ARM variant selected");

pub struct Cpu;

impl Arch for Cpu {
    /// Callee-save registers r4-r11.
    type ThreadData = [usize; 8];

    const DEFAULT_THREAD_DATA: Self::ThreadData = [0; 8];

    /// Writes an exception frame to the top of `stack`, as the hardware would
    /// when entering an exception from thread mode:
    ///
    /// +---------+ <- sp
    /// |   r0    |
    /// |   r1    |
    /// |   r2    |
    /// |   r3    |
    /// |   r12   |
    /// |   LR    |
    /// |   PC    |
    /// |   PSR   |
    /// +---------+
    fn setup_stack(thread: &mut Thread, stack: &mut [u8], func: usize, arg: usize) {
        let stack_start = stack.as_ptr() as usize;

        // Reserve the exception frame plus one word, keeping the 8 byte
        // alignment the hardware expects.
        let stack_pos = ((stack_start + stack.len() - 36) & 0xFFFFFFF8) as *mut usize;

        // SAFETY: `stack_pos` points into `stack`, which is exclusively ours.
        unsafe {
            write_volatile(stack_pos.offset(0), arg); // -> R0
            write_volatile(stack_pos.offset(1), 1); // -> R1
            write_volatile(stack_pos.offset(2), 2); // -> R2
            write_volatile(stack_pos.offset(3), 3); // -> R3
            write_volatile(stack_pos.offset(4), 12); // -> R12
            write_volatile(stack_pos.offset(5), cleanup as usize); // -> LR
            write_volatile(stack_pos.offset(6), func); // -> PC
            write_volatile(stack_pos.offset(7), 0x01000000); // -> APSR
        }

        thread.sp = stack_pos as usize;
    }

    /// Pends the PendSV exception, which performs the actual switch.
    #[inline(always)]
    fn schedule() {
        SCB::set_pendsv();
        cortex_m::asm::isb();
    }

    #[inline(always)]
    fn start_threading() {
        // SAFETY: only the PendSV priority is touched, before threading starts.
        unsafe {
            let mut p = cortex_m::Peripherals::steal();
            // PendSV must be the lowest priority exception so that a context
            // switch never preempts an interrupt handler.
            p.SCB.set_priority(SystemHandler::PendSV, 0xFF);
        }
        Self::schedule();
    }

    fn wfi() {
        cortex_m::asm::wfi();

        // see https://cliffle.com/blog/stm32-wfi-bug/
        #[cfg(context = "stm32")]
        cortex_m::asm::isb();
    }

    fn in_isr() -> bool {
        SCB::vect_active() != VectActive::ThreadMode
    }
}

#[cfg(any(armv7m, armv8m))]
#[unsafe(naked)]
#[no_mangle]
#[allow(non_snake_case)]
unsafe extern "C" fn PendSV() {
    naked_asm!(
        "
        // reserve a slot for `sched()` to return `next_high_regs` in,
        // keeping the stack 8-byte aligned
        sub sp, #8
        mov r0, sp
        bl {sched}
        ldr r2, [sp]
        add sp, #8
        cmp r0, #0
        beq 99f

        msr.n psp, r0

        // r1 == 0: there is no previous thread, so there is no context to
        // save, and the next thread has none stored yet.
        cmp r1, #0
        beq 99f

        stmia r1, {{r4-r11}}
        ldmia r2, {{r4-r11}}
        99:
        movw LR, #0xFFFd
        movt LR, #0xFFFF
        bx LR
        ",
        sched = sym sched,
    )
}

#[cfg(armv6m)]
#[unsafe(naked)]
#[no_mangle]
#[allow(non_snake_case)]
unsafe extern "C" fn PendSV() {
    naked_asm!(
        "
        // reserve a slot for `sched()` to return `next_high_regs` in,
        // keeping the stack 8-byte aligned
        sub sp, #8
        mov r0, sp
        bl {sched}
        ldr r2, [sp]
        add sp, #8
        cmp r0, #0
        beq 99f

        msr.n psp, r0

        cmp r1, #0
        beq 99f

        // thumbv6 can only store/load r4-r7 directly
        str r4, [r1, #16]
        str r5, [r1, #20]
        str r6, [r1, #24]
        str r7, [r1, #28]

        mov  r4, r8
        mov  r5, r9
        mov  r6, r10
        mov  r7, r11

        str r4, [r1, #0]
        str r5, [r1, #4]
        str r6, [r1, #8]
        str r7, [r1, #12]

        ldmia r2!, {{r4-r7}}
        mov r11, r7
        mov r10, r6
        mov r9,  r5
        mov r8,  r4
        ldmia r2!, {{r4-r7}}

        99:
        ldr r0, 999f
        mov LR, r0
        bx lr

        .align 4
        999:
        .word 0xFFFFFFFD
        ",
        sched = sym sched,
    )
}

/// Picks the next thread to run. Called from PendSV.
///
/// Returns `0` if the current thread keeps running. Otherwise the low word
/// (`r0`) is the stack pointer of the next thread and the high word (`r1`)
/// points to the saved registers of the previous thread, or is null if there
/// was none. The address of the next thread's saved registers is written to
/// `next_high_regs_out`.
///
/// If no thread is runnable, this sleeps until an interrupt made one runnable.
///
/// # Safety
///
/// Only to be called from PendSV, with `next_high_regs_out` valid for writes.
unsafe extern "C" fn sched(next_high_regs_out: *mut u32) -> u64 {
    let (next_sp, prev_high_regs, next_high_regs) = loop {
        if let Some(res) = critical_section::with(|cs| {
            // SAFETY: PendSV has the lowest priority, nothing else holds a
            // borrow of the scheduler while it runs.
            let scheduler = unsafe { &mut *SCHEDULER.as_ptr(cs) };

            let Some((prev, next)) = scheduler.select_next() else {
                Cpu::wfi();
                core::sync::atomic::fence(core::sync::atomic::Ordering::Acquire);
                return None;
            };

            let mut prev_high_regs = core::ptr::null();
            if let Some(prev) = prev {
                if prev == next {
                    return Some((0, 0, 0));
                }
                let prev = scheduler.get_unchecked_mut(prev);
                prev.sp = cortex_m::register::psp::read() as usize;
                prev_high_regs = prev.data.as_ptr();
            }

            let next = scheduler.get_unchecked(next);
            Some((
                next.sp as u32,
                prev_high_regs as u32,
                next.data.as_ptr() as u32,
            ))
        }) {
            break res;
        }
    };

    // SAFETY: PendSV passes a reserved slot on its stack.
    unsafe { next_high_regs_out.write(next_high_regs) };

    // AAPCS returns a `u64` in r0 (low word) and r1 (high word).
    u64::from(next_sp) | u64::from(prev_high_regs) << 32
}
