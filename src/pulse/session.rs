//! Session lifecycle: silence watchdog and reset to the quiescent baseline.
use super::detector::{BeatDetector, WarmUp};

impl BeatDetector {
    /// No beat was seen for longer than the silence timeout.
    pub(super) fn is_silent(&self, since_beat_ms: u32) -> bool {
        since_beat_ms > self.calibration.silence_timeout_ms
    }

    /// Start a new session, as when the sensor is put on another subject.
    ///
    /// The envelope goes back to the quiescent baseline, the rate to 0 and the
    /// warm-up restarts. The clock keeps running and a beat in progress stays
    /// in progress: it is ended by the next sample under the threshold.
    pub fn reset(&mut self) {
        let baseline = self.calibration.baseline;
        let state = &mut self.state;
        state.threshold = baseline;
        state.peak = baseline;
        state.trough = baseline;
        state.amplitude = 0;
        state.last_beat_ms = state.clock_ms;
        state.interval_ms = self.calibration.initial_interval_ms;
        state.warm_up = WarmUp::FirstBeat;
        self.estimator.clear_bpm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::BASELINE;

    /// Square pulses: 400 ms at 400, 400 ms at 800, starting at `start`
    fn pulses(start: u32, count: u32) -> Vec<(u32, u16)> {
        let mut samples = Vec::new();
        for beat in 0..count {
            let t0 = start + beat * 800;
            samples.extend((0..20).map(|i| (t0 + i * 20, 400)));
            samples.extend((0..20).map(|i| (t0 + 400 + i * 20, 800)));
        }
        samples
    }

    /// Feed the samples, returning the onset intervals and the bpm after each sample
    fn run(detector: &mut BeatDetector, samples: &[(u32, u16)]) -> (Vec<u32>, Vec<u16>) {
        let mut beats = Vec::new();
        let mut bpm = Vec::new();
        for &(t, signal) in samples {
            let outcome = detector.process_sample(signal, t);
            assert!(!outcome.session_reset, "unexpected reset at {}", t);
            beats.extend(outcome.beat);
            bpm.push(detector.bpm());
        }
        (beats, bpm)
    }

    #[test]
    fn reset_restores_baseline() {
        let mut detector = BeatDetector::new(0);
        run(&mut detector, &pulses(0, 6));
        assert_ne!(detector.bpm(), 0);

        detector.reset();
        let state = detector.state();
        assert_eq!(state.threshold, BASELINE);
        assert_eq!(state.peak, BASELINE);
        assert_eq!(state.trough, BASELINE);
        assert_eq!(state.amplitude, 0);
        assert_eq!(state.last_beat_ms, state.clock_ms);
        assert_eq!(state.interval_ms, 600);
        assert_eq!(state.warm_up, WarmUp::FirstBeat);
        assert_eq!(detector.bpm(), 0);
    }

    #[test]
    fn reset_keeps_beat_in_progress() {
        let mut detector = BeatDetector::new(0);
        // Ends on a high half: the last beat is still active
        run(&mut detector, &pulses(0, 3));
        assert!(detector.is_beat_active());
        let clock = detector.state().clock_ms;

        detector.reset();
        assert!(detector.is_beat_active());
        assert_eq!(detector.state().clock_ms, clock);

        // First quiet sample ends it, around the baseline
        detector.process_sample(400, 2420);
        assert!(!detector.is_beat_active());
    }

    #[test]
    fn reset_then_replay_matches_fresh_detector() {
        let mut fresh = BeatDetector::new(0);
        let (fresh_beats, fresh_bpm) = run(&mut fresh, &pulses(0, 8));

        // Another subject first, then a reset at the end of a quiet half
        let mut reused = BeatDetector::new(0);
        let mut samples = pulses(0, 4);
        samples.truncate(samples.len() - 20);
        run(&mut reused, &samples);
        assert!(!reused.is_beat_active());
        reused.reset();

        // Same waveform, shifted to start on the reset instant.
        // It never sits between the two thresholds (512 and 525).
        let shifted = pulses(0, 8)
            .into_iter()
            .map(|(t, v)| (t + 2780, v))
            .collect::<Vec<_>>();
        let (beats, bpm) = run(&mut reused, &shifted);
        assert_eq!(beats, fresh_beats);
        assert_eq!(bpm, fresh_bpm);
        assert_eq!(reused.intervals(), fresh.intervals());
        assert_eq!(reused.state().threshold, fresh.state().threshold);
        assert_eq!(reused.bpm(), 75);
    }

    #[test]
    fn silence_timeout_is_strict() {
        let detector = BeatDetector::new(0);
        assert!(!detector.is_silent(2500));
        assert!(detector.is_silent(2501));
    }

    #[test]
    fn flat_line_resets_once_per_timeout() {
        let mut detector = BeatDetector::new(0);
        let mut resets = Vec::new();
        for t in (20..=5100).step_by(20) {
            if detector.process_sample(BASELINE, t).session_reset {
                resets.push(t);
            }
        }
        assert_eq!(resets, [2520, 5040]);
        assert_eq!(detector.bpm(), 0);
    }
}
