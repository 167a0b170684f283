//! Consumer side of the acquisition: the main loop iteration.
use crate::calibration::Calibration;
use crate::pulse::{BeatDetector, SampleOutcome};
use crate::sampling::{AsyncDelivery, Clock, SampleInbox, SampleSource};

/// Origin of a processed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// Taken by the sampling interrupt
    Queued,
    /// Read by the main loop itself, the queue being empty
    Direct,
}

/// Result of one iteration of the consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub signal: u16,
    pub acquisition: Acquisition,
    pub outcome: SampleOutcome,
    /// Rate after the sample, 0 during warm-up
    pub bpm: u16,
    pub beat_active: bool,
    /// Threshold after the sample
    pub threshold: u16,
}

impl ufmt::uDisplay for Reading {
    /// One telemetry line for a serial plotter: `<signal> <threshold> <bpm> <0|1>`
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        ufmt::uDisplay::fmt(&self.signal, f)?;
        f.write_str(" ")?;
        ufmt::uDisplay::fmt(&self.threshold, f)?;
        f.write_str(" ")?;
        ufmt::uDisplay::fmt(&self.bpm, f)?;
        f.write_str(if self.beat_active { " 1" } else { " 0" })
    }
}

/// Sole owner of the detector state.
/// Shares nothing with the interrupt but the sample queue.
pub struct PulseMonitor {
    detector: BeatDetector,
}

impl PulseMonitor {
    pub fn new(now_ms: u32) -> Self {
        Self {
            detector: BeatDetector::new(now_ms),
        }
    }

    pub fn with_calibration(calibration: Calibration, now_ms: u32) -> Self {
        Self {
            detector: BeatDetector::with_calibration(calibration, now_ms),
        }
    }

    /// One iteration: take the oldest queued sample, or read the sensor
    /// when nothing is pending, and advance the detector with it.
    /// The asynchronous delivery is masked for the whole iteration.
    pub fn step<D, Q, S, C>(&mut self, delivery: &mut D, inbox: &mut Q, sensor: &mut S, clock: &C) -> Reading
    where
        D: AsyncDelivery,
        Q: SampleInbox,
        S: SampleSource,
        C: Clock,
    {
        let _masked = delivery.masked();
        let (signal, acquisition) = match inbox.take_sample() {
            Some(signal) => (signal, Acquisition::Queued),
            None => (sensor.read_raw_sample(), Acquisition::Direct),
        };
        let outcome = self.detector.process_sample(signal, clock.now_ms());
        Reading {
            signal,
            acquisition,
            outcome,
            bpm: self.detector.bpm(),
            beat_active: self.detector.is_beat_active(),
            threshold: self.detector.state().threshold,
        }
    }

    /// Start a new session on request (another subject).
    pub fn reset_session<D: AsyncDelivery>(&mut self, delivery: &mut D) {
        let _masked = delivery.masked();
        self.detector.reset();
    }

    /// Apply new tuning values to the running session.
    pub fn recalibrate<D: AsyncDelivery>(&mut self, delivery: &mut D, calibration: Calibration) {
        let _masked = delivery.masked();
        self.detector.set_calibration(calibration);
    }

    pub fn current_bpm(&self) -> u16 {
        self.detector.bpm()
    }

    pub fn is_beat_active(&self) -> bool {
        self.detector.is_beat_active()
    }

    pub fn detector(&self) -> &BeatDetector {
        &self.detector
    }
}
