//! Millisecond clock and periodic sampling of the pulse sensor, on TIMER0.
use crate::{SAMPLE_PERIOD_MS, SAMPLE_QUEUE_CAPACITY};
use core::cell::{Cell, RefCell};
use pulse_monitor::{
    calibration::BASELINE,
    sampling::{on_sample_edge, AsyncDelivery, Clock, SampleInbox, SampleQueue, SampleSource},
};

/// Prescaler of the internal timer (see the doc of the microprocessor)
const PRESCALER: u16 = 64;
/// Tick counts before raising an interrupt
const TIMER_COUNTS: u8 = 250;
/// Number of milliseconds to increment the counter by at each interrupt.
/// Possible Values:
///
/// ╔═══════════╦══════════════╦═══════════════════╗
/// ║ PRESCALER ║ TIMER_COUNTS ║ Overflow Interval ║
/// ╠═══════════╬══════════════╬═══════════════════╣
/// ║        64 ║          250 ║              1 ms ║
/// ║       256 ║          125 ║              2 ms ║
/// ║       256 ║          250 ║              4 ms ║
/// ╚═══════════╩══════════════╩═══════════════════╝
///
const MILLIS_INCREMENT: u32 = ((PRESCALER as u32) * (TIMER_COUNTS as u32)) / 16000u32;

/// Milliseconds since the timer was started
static MILLIS: avr_device::interrupt::Mutex<Cell<u32>> = avr_device::interrupt::Mutex::new(Cell::new(0));
/// Converter and channel of the sensor, shared by the interrupt and the fallback read
static SENSOR: avr_device::interrupt::Mutex<RefCell<Option<AnalogSensor>>> =
    avr_device::interrupt::Mutex::new(RefCell::new(None));
/// Samples taken by the interrupt, waiting for the main loop
static SAMPLES: avr_device::interrupt::Mutex<RefCell<SampleQueue<SAMPLE_QUEUE_CAPACITY>>> =
    avr_device::interrupt::Mutex::new(RefCell::new(SampleQueue::new()));

/// Pulse sensor wired on an analog input
struct AnalogSensor {
    adc: arduino_hal::Adc,
    channel: arduino_hal::adc::Channel,
}

impl SampleSource for AnalogSensor {
    fn read_raw_sample(&mut self) -> u16 {
        self.adc.read_blocking(&self.channel)
    }
}

/// Timer interrupt function. Increment the clock and, once per sample period,
/// convert one sample and push it to the queue.
#[avr_device::interrupt(atmega328p)]
fn TIMER0_COMPA() {
    avr_device::interrupt::free(|cs| {
        let millis = MILLIS.borrow(cs);
        let now = millis.get().wrapping_add(MILLIS_INCREMENT);
        millis.set(now);

        if now % SAMPLE_PERIOD_MS == 0 {
            if let Some(sensor) = SENSOR.borrow(cs).borrow_mut().as_mut() {
                on_sample_edge(sensor, &mut *SAMPLES.borrow(cs).borrow_mut());
            }
        }
    })
}

/// Initialize the registers for the hardware timer, and hand over the sensor.
pub fn init(tc0: arduino_hal::pac::TC0, adc: arduino_hal::Adc, channel: arduino_hal::adc::Channel) {
    // Configure the timer for the above interval (in CTC mode)
    // and enable its interrupt.
    tc0.tccr0a.write(|w| w.wgm0().ctc());
    tc0.ocr0a.write(|w| w.bits(TIMER_COUNTS));
    tc0.tccr0b.write(|w| match PRESCALER {
        8 => w.cs0().prescale_8(),
        64 => w.cs0().prescale_64(),
        256 => w.cs0().prescale_256(),
        1024 => w.cs0().prescale_1024(),
        _ => w.cs0().direct(),
    });
    tc0.timsk0.write(|w| w.ocie0a().set_bit());

    avr_device::interrupt::free(|cs| {
        MILLIS.borrow(cs).set(0);
        *SENSOR.borrow(cs).borrow_mut() = Some(AnalogSensor { adc, channel });
    });
}

/// Number of samples lost because the main loop was too slow.
pub fn overwritten() -> u32 {
    avr_device::interrupt::free(|cs| SAMPLES.borrow(cs).borrow().overwritten())
}

/// Global interrupt flag, the only way to stop the sampling interrupt
pub struct GlobalInterrupts;

impl AsyncDelivery for GlobalInterrupts {
    fn mask(&mut self) {
        avr_device::interrupt::disable();
    }

    fn unmask(&mut self) {
        // SAFETY: only reached when a `Masked` guard ends, never inside a critical section
        unsafe { avr_device::interrupt::enable() };
    }
}

/// Consumer end of the sample queue
pub struct QueueInbox;

impl SampleInbox for QueueInbox {
    fn take_sample(&mut self) -> Option<u16> {
        avr_device::interrupt::free(|cs| SAMPLES.borrow(cs).borrow_mut().dequeue())
    }
}

/// Synchronous read of the sensor, from the main loop
pub struct DirectSensor;

impl SampleSource for DirectSensor {
    fn read_raw_sample(&mut self) -> u16 {
        avr_device::interrupt::free(|cs| {
            SENSOR
                .borrow(cs)
                .borrow_mut()
                .as_mut()
                .map_or(BASELINE, |sensor| sensor.read_raw_sample())
        })
    }
}

/// Clock of the timer interrupt
pub struct Millis;

impl Clock for Millis {
    fn now_ms(&self) -> u32 {
        avr_device::interrupt::free(|cs| MILLIS.borrow(cs).get())
    }
}
