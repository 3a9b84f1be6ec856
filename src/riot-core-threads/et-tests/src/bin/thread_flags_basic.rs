#![no_std]
#![no_main]

use cortex_m_rt::entry;
use cortex_m_semihosting::{
    debug::{self, EXIT_SUCCESS},
    hprintln as println,
};

use panic_semihosting as _;

use riot_core_threads::{self, start_threading, thread_create, thread_flags::*};

static mut STACK: [u8; 2048] = [0; 2048];
static mut STACK2: [u8; 2048] = [0; 2048];
static mut STACK3: [u8; 2048] = [0; 2048];

fn setter(_: ()) {
    let pid = riot_core_threads::current_pid().unwrap();
    println!("{}: setter() started", pid);

    set(1, 0b01);
    set(2, 0b01);
    set(2, 0b10);

    println!("{}: setter() finished", pid);
    debug::exit(EXIT_SUCCESS);
}

fn waiter_any(mask: usize) {
    let pid = riot_core_threads::current_pid().unwrap();
    let got = wait_any(mask as ThreadFlags);
    println!("{}: waiter_any() got {:#b}", pid, got);
}

fn waiter_all(mask: usize) {
    let pid = riot_core_threads::current_pid().unwrap();
    let got = wait_all(mask as ThreadFlags);
    assert_eq!(got, mask as ThreadFlags);
    println!("{}: waiter_all() got {:#b}", pid, got);
}

#[entry]
fn main() -> ! {
    // the waiters run first and block, then the setter wakes them
    thread_create(setter, (), unsafe { &mut *core::ptr::addr_of_mut!(STACK) }, 0);
    thread_create(waiter_any, 0b11, unsafe { &mut *core::ptr::addr_of_mut!(STACK2) }, 1);
    thread_create(waiter_all, 0b11, unsafe { &mut *core::ptr::addr_of_mut!(STACK3) }, 1);

    unsafe { start_threading() };

    println!("main() shouldn't be here");
    // the cortex_m_rt `entry` macro requires `main()` to never return
    loop {}
}
