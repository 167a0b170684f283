//! Board support for the Arduino Uno: the peripherals behind the
//! collaborators of the pulse monitor.
pub use display::Display;
pub use sampler::{DirectSensor, GlobalInterrupts, Millis, QueueInbox};

mod display;
pub mod sampler;
pub mod usart;
