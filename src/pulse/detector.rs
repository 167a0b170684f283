//! Beat detector: envelope tracking and adaptive threshold.
use super::bpm::{BpmEstimator, IntervalHistory};
use crate::calibration::Calibration;

/// Progress of the warm-up: the rate is only meaningful
/// once two beats (one full interval) have been measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmUp {
    /// Waiting for the first beat of the session
    FirstBeat,
    /// Waiting for the second beat, which seeds the interval history
    SecondBeat,
    /// History seeded, every beat updates the rate. Left only by a reset.
    Steady,
}

impl ufmt::uDisplay for WarmUp {
    /// Format the warm-up phase for the serial port.
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        match self {
            WarmUp::FirstBeat => f.write_str("first"),
            WarmUp::SecondBeat => f.write_str("second"),
            WarmUp::Steady => f.write_str("steady"),
        }
    }
}

/// Envelope and timing of the current session.
/// The rate and the interval history are held by the [`BpmEstimator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorState {
    /// Milliseconds elapsed since the creation, advanced by wall time, not by samples
    pub clock_ms: u32,
    /// Timestamp of the last processed sample, as given by the clock
    pub last_tick_ms: u32,
    /// Value of `clock_ms` at the last beat onset (or at the last reset)
    pub last_beat_ms: u32,
    /// Highest value above the threshold since the last offset
    pub peak: u16,
    /// Lowest value below the threshold since the last offset
    pub trough: u16,
    /// Beat threshold, halfway between trough and peak of the last beat
    pub threshold: u16,
    /// Peak to trough amplitude of the last beat
    pub amplitude: u16,
    /// Last measured inter-beat interval, in ms
    pub interval_ms: u32,
    /// A beat is in progress: onset seen, offset not yet
    pub beat_active: bool,
    pub warm_up: WarmUp,
}

impl DetectorState {
    /// State of a cold start, at the given clock reading.
    fn cold(calibration: &Calibration, now_ms: u32) -> Self {
        Self {
            clock_ms: 0,
            last_tick_ms: now_ms,
            last_beat_ms: 0,
            peak: calibration.baseline,
            trough: calibration.baseline,
            threshold: calibration.initial_threshold,
            amplitude: 0,
            interval_ms: calibration.initial_interval_ms,
            beat_active: false,
            warm_up: WarmUp::FirstBeat,
        }
    }
}

impl ufmt::uDisplay for DetectorState {
    /// Format the envelope for the serial port,
    /// for instance `thr=656 peak=800 trough=512 amp=288 ibi=600 steady`
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        f.write_str("thr=")?;
        ufmt::uDisplay::fmt(&self.threshold, f)?;
        f.write_str(" peak=")?;
        ufmt::uDisplay::fmt(&self.peak, f)?;
        f.write_str(" trough=")?;
        ufmt::uDisplay::fmt(&self.trough, f)?;
        f.write_str(" amp=")?;
        ufmt::uDisplay::fmt(&self.amplitude, f)?;
        f.write_str(" ibi=")?;
        ufmt::uDisplay::fmt(&self.interval_ms, f)?;
        f.write_str(" ")?;
        ufmt::uDisplay::fmt(&self.warm_up, f)
    }
}

/// What happened while processing one sample.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SampleOutcome {
    /// Interval since the previous beat, when the sample is a beat onset
    pub beat: Option<u32>,
    /// The silence watchdog reset the session.
    /// Can come together with a beat, after a long gap between two samples.
    pub session_reset: bool,
}

impl ufmt::uDisplay for SampleOutcome {
    /// Format the events for the serial log, nothing when nothing happened.
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        if let Some(interval) = self.beat {
            f.write_str("beat ibi=")?;
            ufmt::uDisplay::fmt(&interval, f)?;
        }
        if self.session_reset {
            if self.beat.is_some() {
                f.write_str(" ")?;
            }
            f.write_str("reset")?;
        }
        Ok(())
    }
}

/// Adaptive-threshold beat detector, owning the whole reading of a subject.
pub struct BeatDetector {
    pub(super) calibration: Calibration,
    pub(super) state: DetectorState,
    pub(super) estimator: BpmEstimator,
}

impl BeatDetector {
    /// Cold start with the default calibration.
    pub fn new(now_ms: u32) -> Self {
        Self::with_calibration(Calibration::default(), now_ms)
    }

    /// Cold start with a specific calibration.
    pub fn with_calibration(calibration: Calibration, now_ms: u32) -> Self {
        Self {
            state: DetectorState::cold(&calibration, now_ms),
            calibration,
            estimator: BpmEstimator::default(),
        }
    }

    /// Advance the detector with one raw sample taken at `now_ms`.
    ///
    /// Never fails: out of range values only move the envelope. It collapses
    /// back at the next beat offset, or through the silence reset when the
    /// threshold ends up above every later sample.
    pub fn process_sample(&mut self, signal: u16, now_ms: u32) -> SampleOutcome {
        let mut outcome = SampleOutcome::default();

        self.state.clock_ms = self
            .state
            .clock_ms
            .wrapping_add(now_ms.wrapping_sub(self.state.last_tick_ms));
        self.state.last_tick_ms = now_ms;

        let since_beat = self.state.clock_ms.wrapping_sub(self.state.last_beat_ms);
        let refractory_over = since_beat > self.calibration.refractory_ms(self.state.interval_ms);

        // Ignore the dip right after a beat, it belongs to the same pulse
        if signal < self.state.threshold && refractory_over {
            self.state.trough = self.state.trough.min(signal);
        }

        if signal > self.state.threshold && signal > self.state.peak {
            self.state.peak = signal;
        }

        if since_beat > self.calibration.min_beat_gap_ms
            && signal > self.state.threshold
            && !self.state.beat_active
            && refractory_over
        {
            self.state.beat_active = true;
            self.state.interval_ms = since_beat;
            self.state.last_beat_ms = self.state.clock_ms;
            self.on_beat(since_beat);
            outcome.beat = Some(since_beat);
        }

        if signal < self.state.threshold && self.state.beat_active {
            self.end_beat();
        }

        if self.is_silent(since_beat) {
            self.reset();
            outcome.session_reset = true;
        }

        outcome
    }

    /// Warm-up transitions and rate update of a beat onset.
    fn on_beat(&mut self, interval_ms: u32) {
        self.state.warm_up = match self.state.warm_up {
            WarmUp::FirstBeat => WarmUp::SecondBeat,
            WarmUp::SecondBeat => {
                self.estimator.seed(interval_ms);
                self.estimator.on_beat(interval_ms);
                WarmUp::Steady
            }
            WarmUp::Steady => {
                self.estimator.on_beat(interval_ms);
                WarmUp::Steady
            }
        };
    }

    /// Beat offset: set the threshold halfway in the envelope of the beat,
    /// then collapse the envelope on it so the next beat learns it again.
    fn end_beat(&mut self) {
        let state = &mut self.state;
        state.beat_active = false;
        state.amplitude = state.peak.saturating_sub(state.trough);
        state.threshold = state.trough + state.amplitude / 2;
        state.peak = state.threshold;
        state.trough = state.threshold;
    }

    /// Current rate, 0 during warm-up.
    pub fn bpm(&self) -> u16 {
        self.estimator.bpm()
    }

    /// Beat/no-beat edge, to drive a pulsing indicator.
    pub fn is_beat_active(&self) -> bool {
        self.state.beat_active
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    /// Intervals used by the rate estimate, oldest first.
    pub fn intervals(&self) -> IntervalHistory {
        self.estimator.intervals()
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Replace the tuning values. The current session goes on with them.
    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = calibration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::BASELINE;

    /// Samples fed so far, with the beat onsets and resets seen
    #[derive(Default)]
    struct Trace {
        beats: Vec<(u32, u32)>,
        resets: Vec<u32>,
        bpm: Vec<u16>,
    }

    #[track_caller]
    fn feed(detector: &mut BeatDetector, trace: &mut Trace, samples: &[(u32, u16)]) {
        for &(t, signal) in samples {
            let was_active = detector.is_beat_active();
            let outcome = detector.process_sample(signal, t);
            if let Some(interval) = outcome.beat {
                assert!(!was_active, "onset at {} while a beat is active", t);
                trace.beats.push((t, interval));
            }
            if outcome.session_reset {
                trace.resets.push(t);
            }
            trace.bpm.push(detector.bpm());
        }
    }

    /// `count` samples of the same value, `step` ms apart, starting at `start`
    fn flat(start: u32, step: u32, count: u32, value: u16) -> Vec<(u32, u16)> {
        (0..count).map(|i| (start + i * step, value)).collect()
    }

    /// The five sample rising edge of a pulse, 20 ms apart, starting at `start`
    fn ramp(start: u32) -> Vec<(u32, u16)> {
        [600, 700, 800, 700, 600]
            .iter()
            .enumerate()
            .map(|(i, v)| (start + 20 * i as u32, *v))
            .collect()
    }

    /// Baseline at 520, a pulse, 20 samples of baseline, the same pulse 600 ms later.
    fn two_pulses(origin: u32) -> Vec<(u32, u16)> {
        let mut samples = flat(origin + 200, 20, 10, 520);
        samples.extend(ramp(origin + 400));
        samples.extend(flat(origin + 500, 24, 20, 520));
        // The first sample of the second ramp stays under the raised threshold:
        // its onset is the 700 sample, 600 ms after the first onset.
        samples.extend(ramp(origin + 980));
        samples
    }

    #[test]
    fn cold_start() {
        let detector = BeatDetector::new(1234);
        let state = detector.state();
        assert_eq!(state.clock_ms, 0);
        assert_eq!(state.last_tick_ms, 1234);
        assert_eq!(state.threshold, 525);
        assert_eq!((state.peak, state.trough), (BASELINE, BASELINE));
        assert_eq!(state.warm_up, WarmUp::FirstBeat);
        assert_eq!(detector.bpm(), 0);
        assert!(!detector.is_beat_active());
    }

    #[test]
    fn clock_follows_wall_time() {
        let mut detector = BeatDetector::new(1000);
        detector.process_sample(500, 1010);
        detector.process_sample(500, 1013);
        detector.process_sample(500, 1100);
        assert_eq!(detector.state().clock_ms, 100);
        assert_eq!(detector.state().last_tick_ms, 1100);
    }

    #[test]
    fn clock_survives_tick_wrap() {
        let mut detector = BeatDetector::new(u32::MAX - 5);
        detector.process_sample(500, 4);
        assert_eq!(detector.state().clock_ms, 10);
    }

    #[test]
    fn two_pulses_give_two_beats_at_100_bpm() {
        let mut detector = BeatDetector::new(0);
        let mut trace = Trace::default();
        feed(&mut detector, &mut trace, &two_pulses(0));

        assert_eq!(trace.beats, [(400, 400), (1000, 600)]);
        assert!(trace.resets.is_empty());
        assert_eq!(detector.state().interval_ms, 600);
        assert_eq!(detector.bpm(), 100);
        assert_eq!(detector.state().warm_up, WarmUp::Steady);
    }

    #[test]
    fn bpm_stays_zero_during_warm_up() {
        let mut detector = BeatDetector::new(0);
        let mut trace = Trace::default();
        let samples = two_pulses(0);
        // Everything but the second ramp
        let (warm_up, second) = samples.split_at(samples.len() - 5);
        feed(&mut detector, &mut trace, warm_up);

        assert_eq!(trace.beats.len(), 1);
        assert_eq!(detector.state().warm_up, WarmUp::SecondBeat);
        assert!(trace.bpm.iter().all(|bpm| *bpm == 0));
        assert_eq!(detector.intervals(), IntervalHistory::default());

        feed(&mut detector, &mut trace, second);
        assert_eq!(trace.beats.len(), 2);
        assert_eq!(detector.intervals(), IntervalHistory([600; 10]));
        assert!(detector.intervals().is_uniform());
    }

    #[test]
    fn threshold_moves_halfway_in_the_envelope() {
        let mut detector = BeatDetector::new(0);
        let mut trace = Trace::default();
        let mut samples = flat(200, 20, 10, 520);
        samples.extend(ramp(400));
        // First sample under the threshold ends the beat
        samples.push((500, 520));
        feed(&mut detector, &mut trace, &samples);

        let state = detector.state();
        assert!(!state.beat_active);
        // Trough is still the cold baseline, every quiet sample was above it
        assert_eq!(state.amplitude, 800 - 512);
        assert_eq!(state.threshold, 512 + 144);
        assert_eq!((state.peak, state.trough), (656, 656));
    }

    #[test]
    fn no_onset_inside_min_gap() {
        let calibration = Calibration {
            initial_interval_ms: 0,
            ..Default::default()
        };
        let mut detector = BeatDetector::with_calibration(calibration, 0);
        let mut trace = Trace::default();
        feed(&mut detector, &mut trace, &[(100, 900), (250, 900)]);
        assert!(trace.beats.is_empty());
        feed(&mut detector, &mut trace, &[(251, 900)]);
        assert_eq!(trace.beats, [(251, 251)]);
    }

    #[test]
    fn refractory_guard_rejects_echo() {
        let mut detector = BeatDetector::new(0);
        let mut trace = Trace::default();
        feed(&mut detector, &mut trace, &two_pulses(0));
        assert_eq!(trace.beats.len(), 2);

        // A bounce 300 ms after the last onset: above the 250 ms gap
        // but inside the refractory window of 600 * 3 / 5 = 360 ms
        feed(&mut detector, &mut trace, &[(1100, 400), (1300, 900)]);
        assert_eq!(trace.beats.len(), 2);
        feed(&mut detector, &mut trace, &[(1320, 400), (1361, 900)]);
        assert_eq!(trace.beats.len(), 3);
        assert_eq!(trace.beats[2], (1361, 361));
    }

    #[test]
    fn onsets_and_offsets_alternate() {
        let mut detector = BeatDetector::new(0);
        let mut trace = Trace::default();
        // Signal stuck high: a single onset, whatever the duration
        let mut samples = flat(0, 20, 5, 400);
        samples.extend(flat(400, 20, 100, 900));
        feed(&mut detector, &mut trace, &samples);
        assert_eq!(trace.beats.len(), 1);
        assert!(detector.is_beat_active());

        // The feed helper asserts that every onset comes with no beat active
        let mut t = 2400;
        for _ in 0..20 {
            feed(&mut detector, &mut trace, &flat(t, 20, 20, 300));
            feed(&mut detector, &mut trace, &flat(t + 400, 20, 20, 950));
            t += 800;
        }
        assert!(trace.beats.len() > 5);
        assert!(trace.resets.is_empty());
    }

    #[test]
    fn spike_recovers_through_silence_reset() {
        let mut detector = BeatDetector::new(0);
        let mut trace = Trace::default();
        let mut t = 0;
        // Regular pulses at 75 bpm, one of them with a wild spike
        for beat in 0..12u32 {
            let top = if beat == 4 { u16::MAX } else { 800 };
            feed(&mut detector, &mut trace, &flat(t, 20, 20, 300));
            feed(&mut detector, &mut trace, &flat(t + 400, 20, 5, top));
            feed(&mut detector, &mut trace, &flat(t + 500, 20, 15, 300));
            t += 800;
            if beat == 4 {
                assert_eq!(detector.state().threshold, 300 + (u16::MAX - 300) / 2);
            }
        }
        // The raised threshold hides the next pulses until the silence
        // timeout, 2520 ms after the spike onset at 3600
        assert_eq!(trace.resets, [6120]);
        assert_eq!(trace.beats.last(), Some(&(9200, 800)));
        assert_eq!(detector.state().threshold, 550);
        assert_eq!(detector.bpm(), 75);
    }
}
