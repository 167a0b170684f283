//! Acquisition of the raw sensor readings.
//!
//! The sampling interrupt and the main loop only share the [`SampleQueue`].
//! Everything the detector needs from the hardware (converter, clock,
//! interrupt masking) is reached through the traits of this module.
use ringbuffer::{ConstGenericRingBuffer, RingBuffer};

/// Highest raw value of the 10-bit converter
pub const RAW_MAX: u16 = 1023;

/// One analog-to-digital transaction with the sensor.
pub trait SampleSource {
    /// Blocking read of the sensor channel, in `0..=RAW_MAX`.
    fn read_raw_sample(&mut self) -> u16;
}

/// Millisecond tick source.
pub trait Clock {
    /// Milliseconds since boot, monotonic (wrapping after ~49 days).
    fn now_ms(&self) -> u32;
}

/// Switch of the asynchronous (interrupt) delivery of the samples.
/// Nesting is not required: `mask` and `unmask` are idempotent.
pub trait AsyncDelivery {
    fn mask(&mut self);
    fn unmask(&mut self);

    /// Mask the delivery until the returned guard is dropped.
    fn masked(&mut self) -> Masked<'_, Self>
    where
        Self: Sized,
    {
        self.mask();
        Masked { delivery: self }
    }
}

/// Critical section: the delivery is masked as long as this guard lives,
/// and unmasked on every exit path of the enclosing scope.
pub struct Masked<'a, D: AsyncDelivery> {
    delivery: &'a mut D,
}

impl<D: AsyncDelivery> Drop for Masked<'_, D> {
    fn drop(&mut self) {
        self.delivery.unmask();
    }
}

/// Consumer side of the queue filled by the sampling interrupt.
pub trait SampleInbox {
    /// Oldest pending sample, if any.
    fn take_sample(&mut self) -> Option<u16>;
}

/// Bounded FIFO of raw readings, single producer and single consumer.
/// When full, a new sample overwrites the oldest one: the producer never
/// blocks and the storage never grows.
pub struct SampleQueue<const N: usize> {
    samples: ConstGenericRingBuffer<u16, N>,
    /// Samples dropped by an overwrite since the creation, wrapping
    overwritten: u32,
}

impl<const N: usize> Default for SampleQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SampleQueue<N> {
    /// Create an empty queue, usable in a static.
    pub const fn new() -> Self {
        Self {
            samples: ConstGenericRingBuffer::new(),
            overwritten: 0,
        }
    }

    /// Push a sample, dropping the oldest one when the queue is full.
    pub fn enqueue(&mut self, sample: u16) {
        if self.samples.is_full() {
            self.overwritten = self.overwritten.wrapping_add(1);
        }
        self.samples.push(sample);
    }

    /// Pop the oldest sample.
    pub fn dequeue(&mut self) -> Option<u16> {
        self.samples.dequeue()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Number of samples lost to overwrites.
    pub fn overwritten(&self) -> u32 {
        self.overwritten
    }
}

impl<const N: usize> SampleInbox for SampleQueue<N> {
    fn take_sample(&mut self) -> Option<u16> {
        self.dequeue()
    }
}

/// Work of the sampling interrupt: one transaction with the source,
/// result pushed to the queue. Nothing else is touched from the interrupt.
pub fn on_sample_edge<S: SampleSource, const N: usize>(source: &mut S, queue: &mut SampleQueue<N>) {
    queue.enqueue(source.read_raw_sample());
}
