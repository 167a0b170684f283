//! Moving average of the inter-beat intervals.
use ringbuffer::{ConstGenericRingBuffer, RingBuffer};

/// Number of intervals averaged
pub const HISTORY_LEN: usize = 10;
/// Milliseconds per minute
const MS_PER_MINUTE: u32 = 60_000;

/// Smoothed rate over the last [`HISTORY_LEN`] intervals.
pub struct BpmEstimator {
    /// Inter-beat intervals in ms, oldest first
    intervals: ConstGenericRingBuffer<u32, HISTORY_LEN>,
    /// Last estimate, 0 until the history is seeded
    bpm: u16,
}

impl Default for BpmEstimator {
    fn default() -> Self {
        Self {
            intervals: ConstGenericRingBuffer::new(),
            bpm: 0,
        }
    }
}

impl BpmEstimator {
    /// Fill the whole history with the same interval, so that the average
    /// is meaningful from the first estimate instead of after 10 beats.
    pub fn seed(&mut self, interval_ms: u32) {
        self.intervals.clear();
        for _ in 0..HISTORY_LEN {
            self.intervals.push(interval_ms);
        }
    }

    /// Shift a new interval in (dropping the oldest one) and recompute the rate.
    /// The mean is the truncated sum over [`HISTORY_LEN`] slots; slots not
    /// filled yet count as zero.
    pub fn on_beat(&mut self, interval_ms: u32) -> u16 {
        self.intervals.push(interval_ms);
        let sum = self
            .intervals
            .iter()
            .fold(0u32, |acc, interval| acc.saturating_add(*interval));
        let mean = sum / HISTORY_LEN as u32;
        self.bpm = match mean {
            0 => 0,
            mean => (MS_PER_MINUTE / mean).min(u16::MAX as u32) as u16,
        };
        self.bpm
    }

    /// Forget the estimate. The history is left as is: it is seeded again
    /// when the next warm-up completes.
    pub fn clear_bpm(&mut self) {
        self.bpm = 0;
    }

    /// Last estimate, 0 during warm-up.
    pub fn bpm(&self) -> u16 {
        self.bpm
    }

    /// Snapshot of the intervals, oldest first.
    pub fn intervals(&self) -> IntervalHistory {
        let mut history = IntervalHistory::default();
        for (slot, interval) in history.0.iter_mut().zip(self.intervals.iter()) {
            *slot = *interval;
        }
        history
    }
}

/// Copy of the interval ring, oldest first. Unused slots are 0.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntervalHistory(pub [u32; HISTORY_LEN]);

impl IntervalHistory {
    /// True when every slot holds the same, non-zero interval.
    pub fn is_uniform(&self) -> bool {
        self.0[0] > 0 && self.0.iter().all(|interval| *interval == self.0[0])
    }
}

impl ufmt::uDisplay for IntervalHistory {
    /// Format the intervals for the serial port, space separated.
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        for (index, interval) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            ufmt::uDisplay::fmt(interval, f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_until_first_beat() {
        let estimator = BpmEstimator::default();
        assert_eq!(estimator.bpm(), 0);
        assert_eq!(estimator.intervals(), IntervalHistory([0; HISTORY_LEN]));
    }

    #[test]
    fn seeded_history_gives_immediate_rate() {
        let mut estimator = BpmEstimator::default();
        estimator.seed(600);
        assert!(estimator.intervals().is_uniform());
        assert_eq!(estimator.on_beat(600), 100);
        assert_eq!(estimator.intervals(), IntervalHistory([600; HISTORY_LEN]));
    }

    #[test]
    fn each_beat_shifts_and_averages() {
        let mut estimator = BpmEstimator::default();
        estimator.seed(800);
        let mut expected = [800u32; HISTORY_LEN];
        for interval in [780, 750, 760, 700, 690, 650, 655, 640, 600, 610, 590, 1200] {
            expected.rotate_left(1);
            expected[HISTORY_LEN - 1] = interval;
            let mean = expected.iter().sum::<u32>() / HISTORY_LEN as u32;

            let bpm = estimator.on_beat(interval);
            assert_eq!(estimator.intervals().0, expected);
            assert_eq!(bpm as u32, 60_000 / mean);
            assert_eq!(estimator.bpm(), bpm);
        }
    }

    #[test]
    fn truncating_mean() {
        let mut estimator = BpmEstimator::default();
        estimator.seed(601);
        // 9 * 601 + 609 = 6018, mean 601 (truncated), 60000 / 601 = 99
        assert_eq!(estimator.on_beat(609), 99);
    }

    #[test]
    fn clear_keeps_history() {
        let mut estimator = BpmEstimator::default();
        estimator.seed(500);
        estimator.on_beat(500);
        estimator.clear_bpm();
        assert_eq!(estimator.bpm(), 0);
        assert_eq!(estimator.intervals(), IntervalHistory([500; HISTORY_LEN]));
    }

    #[test]
    fn reseed_replaces_everything() {
        let mut estimator = BpmEstimator::default();
        estimator.seed(500);
        estimator.on_beat(900);
        estimator.seed(700);
        assert_eq!(estimator.intervals(), IntervalHistory([700; HISTORY_LEN]));
    }
}
