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

use riot_core_bhp::event::BhpEvent;
use riot_core_event::EventQueue;
use riot_core_threads::{irq, start_threading, thread_create_noarg};

const TICKS: usize = 3;

static mut STACK: [u8; 2048] = [0; 2048];

static QUEUE: EventQueue = EventQueue::new();
static BHP: StaticCell<BhpEvent> = StaticCell::new();
static TIMER: Mutex<Cell<Option<&'static BhpEvent>>> = Mutex::new(Cell::new(None));
static COUNT: Mutex<Cell<usize>> = Mutex::new(Cell::new(0));

fn bottom_half(_: usize) {
    assert!(!irq::is_in_isr());
    let count = critical_section::with(|cs| {
        let count = COUNT.borrow(cs);
        count.set(count.get() + 1);
        count.get()
    });
    println!("bottom half #{}", count);
    if count == TICKS {
        debug::exit(EXIT_SUCCESS);
    }
}

fn event_thread() {
    QUEUE.claim();
    QUEUE.run();
}

#[exception]
fn SysTick() {
    if let Some(bhp) = critical_section::with(|cs| TIMER.borrow(cs).get()) {
        bhp.isr_cb();
    }
}

#[entry]
fn main() -> ! {
    let bhp = BHP.init(BhpEvent::new());
    bhp.init(&QUEUE, bottom_half, 0);
    let bhp: &'static BhpEvent = bhp;
    critical_section::with(|cs| TIMER.borrow(cs).set(Some(bhp)));

    let mut syst = cortex_m::Peripherals::take().unwrap().SYST;
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(SYST::get_ticks_per_10ms().max(100_000));
    syst.clear_current();
    syst.enable_interrupt();
    syst.enable_counter();

    thread_create_noarg(event_thread, unsafe { &mut *core::ptr::addr_of_mut!(STACK) }, 1);

    unsafe { start_threading() };

    println!("main() shouldn't be here");
    loop {}
}
