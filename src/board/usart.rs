//! Hardware side of the serial link: USART0 and its receive interrupt.
use arduino_hal::hal::usart::Usart0;
use core::cell::RefCell;
use embedded_hal::serial::Read;
use pulse_monitor::serial_commands::SerialBuffer;
use ringbuffer::{ConstGenericRingBuffer, RingBuffer};

/// Size, in bytes, of the buffer filled by the receive interrupt
const RX_BUFFER_SIZE: usize = 16;

/// Interface with the hardware USART
static USART_MUTEX: avr_device::interrupt::Mutex<RefCell<Option<Usart0<arduino_hal::DefaultClock>>>> =
    avr_device::interrupt::Mutex::new(RefCell::new(None));
/// Buffer containing the input bytes read on the USART (there is no hardware buffer)
static RX_BUFFER: avr_device::interrupt::Mutex<RefCell<ConstGenericRingBuffer<u8, RX_BUFFER_SIZE>>> =
    avr_device::interrupt::Mutex::new(RefCell::new(ConstGenericRingBuffer::new()));

/// Read the received bytes into the local buffer, keeping only printable
/// characters and the line feed.
#[avr_device::interrupt(atmega328p)]
unsafe fn USART_RX() {
    avr_device::interrupt::free(|cs| {
        if let Some(ref mut usart) = USART_MUTEX.borrow(cs).borrow_mut().as_mut() {
            let mut rx_buffer = RX_BUFFER.borrow(cs).borrow_mut();
            while let Ok(byte) = usart.read() {
                if (0x20..0x7f).contains(&byte) || byte == b'\n' {
                    rx_buffer.push(byte);
                }
            }
        }
    });
}

/// Hand the USART over to the interrupt, listening to the received bytes.
pub fn init(mut usart: Usart0<arduino_hal::DefaultClock>) {
    usart.listen(arduino_hal::hal::usart::Event::RxComplete);
    avr_device::interrupt::free(|cs| {
        *USART_MUTEX.borrow(cs).borrow_mut() = Some(usart);
    });
}

/// Move the bytes received since the last call to the input of the serial buffer.
pub fn load<const W: usize, const R: usize>(serial_buffer: &mut SerialBuffer<W, R>) {
    avr_device::interrupt::free(|cs| {
        let mut rx_buffer = RX_BUFFER.borrow(cs).borrow_mut();
        while let Some(byte) = rx_buffer.dequeue() {
            serial_buffer.push_input(byte);
        }
    });
}

/// Actually print the output of the serial buffer on the USART.
/// Interrupts are only held off for one byte at a time, so that the sampling
/// goes on during long transmissions.
pub fn flush<const W: usize, const R: usize>(serial_buffer: &mut SerialBuffer<W, R>) {
    while let Some(byte) = serial_buffer.pop_output() {
        avr_device::interrupt::free(|cs| {
            if let Some(ref mut usart) = USART_MUTEX.borrow(cs).borrow_mut().as_mut() {
                usart.write_byte(byte);
            }
        });
    }
}
