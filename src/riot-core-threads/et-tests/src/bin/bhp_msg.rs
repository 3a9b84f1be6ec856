#![no_std]
#![no_main]

use core::cell::Cell;

use cortex_m::peripheral::{syst::SystClkSource, SYST};
use cortex_m_rt::{entry, exception};
use cortex_m_semihosting::{
    debug::{self, EXIT_SUCCESS},
    hprintln as println,
};
use critical_section::Mutex;
use static_cell::StaticCell;

use panic_semihosting as _;

use riot_core_bhp::msg::{self as bhp_msg, BhpMsg, BHP_MSG_BH_REQUEST};
use riot_core_threads::{msg, start_threading, thread_create_noarg};

const TICKS: usize = 3;

static mut STACK: [u8; 2048] = [0; 2048];

static BHP: StaticCell<BhpMsg> = StaticCell::new();
static TIMER: Mutex<Cell<Option<&'static BhpMsg>>> = Mutex::new(Cell::new(None));

fn bottom_half(ctx: usize) {
    println!("bottom half, ctx={}", ctx);
}

fn msg_thread() {
    msg::init_queue();

    let bhp = BHP.init(BhpMsg::new());
    bhp.init(bottom_half, 0x2a);
    bhp.claim_thread(riot_core_threads::current_pid().unwrap());
    let bhp: &'static BhpMsg = bhp;
    critical_section::with(|cs| TIMER.borrow(cs).set(Some(bhp)));

    for _ in 0..TICKS {
        let msg = msg::receive();
        if msg.msg_type == BHP_MSG_BH_REQUEST {
            bhp_msg::handler(&msg);
        }
    }
    debug::exit(EXIT_SUCCESS);
}

#[exception]
fn SysTick() {
    if let Some(bhp) = critical_section::with(|cs| TIMER.borrow(cs).get()) {
        bhp.isr_cb();
    }
}

#[entry]
fn main() -> ! {
    let mut syst = cortex_m::Peripherals::take().unwrap().SYST;
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(SYST::get_ticks_per_10ms().max(100_000));
    syst.clear_current();
    syst.enable_interrupt();
    syst.enable_counter();

    thread_create_noarg(msg_thread, unsafe { &mut *core::ptr::addr_of_mut!(STACK) }, 1);

    unsafe { start_threading() };

    println!("main() shouldn't be here");
    loop {}
}
