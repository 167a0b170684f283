//! Heart rate monitor program for ATMEGA328P microprocessor
// Compiler commands appropriate for bare-metal development
#![no_std]
#![no_main]
#![feature(abi_avr_interrupt)]

/*
References:
ATMEGA238p: https://www.e-lab.de/downloads/DOCs/mega328P.pdf
Arduino: https://content.arduino.cc/assets/A000066-full-pinout.pdf
Arduino: https://content.arduino.cc/assets/UNO-TH_Rev3e_sch.pdf
Arduino: https://docs.arduino.cc/resources/datasheets/A000066-datasheet.pdf

          +---O---+
      PC6 |1    28| PC5
  RXD PD0 |2    27| PC4
  TXD PD1 |3    26| PC3
      PD2 |4    25| PC2
      PD3 |5    24| PC1
      PD4 |6    23| PC0  ADC0 - a0
      VCC |7    22| GND
      GND |8    21| AREF
      PB6 |9    20| AVCC
      PB7 |10   19| PB5  SPI.CLK
      PD5 |11   18| PB4
      PD6 |12   17| PB3  SPI.MOSI
      PD7 |13   16| PB2  SPI.CS - d10
      PB0 |14   15| PB1
          +-------+
*/

// Pinout of the peripherals, either as ATMETA32P port or arduino labels
type BeatLedOutput = arduino_hal::hal::port::PD7; // d7
type DisplaySpiCsOutput = arduino_hal::hal::port::PB2; // d10
type DisplaySpiMosiOutput = arduino_hal::hal::port::PB3; // d11
type DisplaySpiClkOutput = arduino_hal::hal::port::PB5; // d13

/// Mapping between the electric levels (+3.3V or +5V) and the logical level of the beat led
const BEAT_LED_LOGICAL_LEVEL_HIGH: bool = true;
/// Drive the beat led from the raw sensor level instead of the detected beats
const BEAT_LED_FOLLOWS_RAW_LEVEL: bool = false;
/// Period of the sampling of the pulse sensor, in ms (500 Hz)
const SAMPLE_PERIOD_MS: u32 = 2;
/// Samples held for the main loop; older ones are overwritten
const SAMPLE_QUEUE_CAPACITY: usize = 32;
/// Brightness of the matrix display, from 0x00 to 0x0f
const DISPLAY_INTENSITY: u8 = 0x04;
/// Baud rate of the serial link
const SERIAL_BAUD_RATE: u32 = 115200;

use crate::board::{usart, DirectSensor, Display, GlobalInterrupts, Millis, QueueInbox};
use arduino_hal::{
    hal::wdt,
    port::{mode::Output, Pin},
};
use core::{
    panic::PanicInfo,
    sync::atomic::{self, Ordering},
};
use pulse_monitor::{
    calibration::RAW_PULSE_LEVEL,
    indicator::PulseIndicator,
    sampling::Clock,
    serial_commands::{self, Command, SerialBuffer},
    Acquisition, Calibration, PulseMonitor, Reading,
};

mod board;

/// The main state of the whole program, updated at every loop,
/// holding the memory.
struct MainState<const WRITE_BUFFER_SIZE: usize, const READ_BUFFER_SIZE: usize> {
    /// Beat detection, sole owner of the reading of the subject
    monitor: PulseMonitor,
    /// Collaborators of the monitor
    delivery: GlobalInterrupts,
    inbox: QueueInbox,
    sensor: DirectSensor,
    clock: Millis,
    /// Led following the beats
    indicator: PulseIndicator<Pin<Output, BeatLedOutput>>,
    /// Matrix-leds display, heart and rate
    display: Display,
    /// Serial I/O
    serial_buffer: SerialBuffer<WRITE_BUFFER_SIZE, READ_BUFFER_SIZE>,
    /// Print one line per sample taken by the interrupt
    telemetry: bool,
}

impl<const WRITE_BUFFER_SIZE: usize, const READ_BUFFER_SIZE: usize>
    MainState<WRITE_BUFFER_SIZE, READ_BUFFER_SIZE>
{
    /// Run all the tasks needed to update the state/outputs.
    fn run(&mut self) {
        usart::load(&mut self.serial_buffer);
        let reading = self
            .monitor
            .step(&mut self.delivery, &mut self.inbox, &mut self.sensor, &self.clock);
        self.process_reading(&reading);
        // Serial commands might reset the session: call it after the reading
        self.process_command();
        self.update_outputs();
    }

    /// Log the events of a reading, and update the outputs for the user.
    fn process_reading(&mut self, reading: &Reading) {
        if reading.outcome.beat.is_some() || reading.outcome.session_reset {
            ufmt::uwriteln!(&mut self.serial_buffer, "{} bpm={}", reading.outcome, reading.bpm).ok();
        }
        if self.telemetry && reading.acquisition == Acquisition::Queued {
            ufmt::uwriteln!(&mut self.serial_buffer, "{}", reading).ok();
        }
        if BEAT_LED_FOLLOWS_RAW_LEVEL {
            self.indicator.update_raw(reading.signal, RAW_PULSE_LEVEL).ok();
        } else {
            self.indicator.update(reading.beat_active).ok();
        }
        self.display.write_pulse(reading.bpm, reading.beat_active);
    }

    /// Update all the outputs for the user.
    fn update_outputs(&mut self) {
        usart::flush(&mut self.serial_buffer);
        self.display.render();
    }

    /// Process commands received on serial input, if any
    fn process_command(&mut self) {
        loop {
            match self.serial_buffer.dequeue_command() {
                Ok(None) => {
                    break;
                }
                Ok(Some(Command::QueryBpm)) => {
                    ufmt::uwriteln!(&mut self.serial_buffer, "{}", self.monitor.current_bpm()).ok();
                }
                Ok(Some(Command::QueryIntervals)) => {
                    let intervals = self.monitor.detector().intervals();
                    ufmt::uwriteln!(&mut self.serial_buffer, "{}", intervals).ok();
                }
                Ok(Some(Command::QueryEnvelope)) => {
                    let state = *self.monitor.detector().state();
                    ufmt::uwriteln!(&mut self.serial_buffer, "{}", state).ok();
                }
                Ok(Some(Command::QueryOverwrites)) => {
                    ufmt::uwriteln!(&mut self.serial_buffer, "{}", board::sampler::overwritten()).ok();
                }
                Ok(Some(Command::ResetSession)) => {
                    self.monitor.reset_session(&mut self.delivery);
                    ufmt::uwriteln!(&mut self.serial_buffer, "Ack").ok();
                }
                Ok(Some(Command::ToggleTelemetry)) => {
                    self.telemetry = !self.telemetry;
                    ufmt::uwriteln!(&mut self.serial_buffer, "Ack").ok();
                }
                Ok(Some(Command::SetMinBeatGap(gap))) => {
                    let calibration = Calibration {
                        min_beat_gap_ms: u32::from(gap),
                        ..*self.monitor.detector().calibration()
                    };
                    self.monitor.recalibrate(&mut self.delivery, calibration);
                    ufmt::uwriteln!(&mut self.serial_buffer, "Ack").ok();
                }
                Err(bad_command) => {
                    ufmt::uwriteln!(&mut self.serial_buffer, "{}", bad_command).ok();
                }
            }
        }
    }
}

/// Entry point: initialization of the devices and endless loop
#[arduino_hal::entry]
fn main() -> ! {
    // Acquire hardware objects
    let dp = arduino_hal::Peripherals::take().unwrap();
    let pins = arduino_hal::pins!(dp);

    // Sensor on a0, sampled by the timer interrupt
    let mut adc = arduino_hal::Adc::new(dp.ADC, Default::default());
    let sensor_channel = pins.a0.into_analog_input(&mut adc).into_channel();
    board::sampler::init(dp.TC0, adc, sensor_channel);

    // Create main memory structure
    let mut main = MainState::<
        { serial_commands::SERIAL_WRITE_BUFFER_SIZE },
        { serial_commands::SERIAL_READ_BUFFER_SIZE },
    > {
        monitor: PulseMonitor::new(Millis.now_ms()),
        delivery: GlobalInterrupts,
        inbox: QueueInbox,
        sensor: DirectSensor,
        clock: Millis,
        indicator: PulseIndicator::init(pins.d7.into_output(), BEAT_LED_LOGICAL_LEVEL_HIGH).unwrap(),
        display: Display::init(pins.d11, pins.d10, pins.d13).unwrap(),
        serial_buffer: Default::default(),
        telemetry: false,
    };

    // Setup the USART for serial in/out
    usart::init(arduino_hal::default_serial!(dp, pins, SERIAL_BAUD_RATE));

    // Setup the hardware watchdog, in case something goes wrong.
    let mut watchdog = wdt::Wdt::new(dp.WDT, &dp.CPU.mcusr);
    watchdog.start(wdt::Timeout::Ms1000).unwrap();
    unsafe { avr_device::interrupt::enable() };

    // Display an init message
    ufmt::uwriteln!(&mut main.serial_buffer, "Start").ok();
    main.update_outputs();

    loop {
        main.run();
        watchdog.feed();
    }
}

/// Panic handler: do nothing, the watchdog resets the microprocessor
#[inline(never)]
#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    loop {
        atomic::compiler_fence(Ordering::SeqCst);
    }
}
