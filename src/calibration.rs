//! Calibration of the beat detector.
//!
//! These values were tuned empirically against the output range (0-999) of
//! one specific pulse sensor. They are not derived from a model and must stay
//! adjustable when another sensor is used.

/// Quiescent midpoint of the sensor output: envelope and threshold after a session reset
pub const BASELINE: u16 = 512;
/// Threshold of a cold start, slightly above the quiescent midpoint
pub const INITIAL_THRESHOLD: u16 = 525;
/// Inter-beat interval assumed before any beat was measured, in ms
pub const INITIAL_INTERVAL_MS: u32 = 600;
/// Minimum physiologically plausible gap between two beats, in ms.
/// Rejects electrical bounce of the signal.
pub const MIN_BEAT_GAP_MS: u32 = 250;
/// Silence after which the sensor is considered removed (or moved to another subject), in ms
pub const SILENCE_TIMEOUT_MS: u32 = 2500;
/// Raw level above which the sensor output alone is taken as a pulse,
/// without the adaptive threshold. Only used to drive a led.
pub const RAW_PULSE_LEVEL: u16 = 600;
/// Refractory guard: a trough or an onset needs `N > interval * 3 / 5`
pub const REFRACTORY_NUMERATOR: u32 = 3;
/// See [`REFRACTORY_NUMERATOR`]
pub const REFRACTORY_DENOMINATOR: u32 = 5;

/// Set of tuning values handed to the detector.
/// The default is made of the constants of this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    /// Envelope and threshold after a session reset
    pub baseline: u16,
    /// Threshold of a cold start
    pub initial_threshold: u16,
    /// Interval used by the refractory guard until the first beat, in ms
    pub initial_interval_ms: u32,
    /// No onset is accepted closer than this to the previous beat, in ms
    pub min_beat_gap_ms: u32,
    /// Silence triggering a session reset, in ms
    pub silence_timeout_ms: u32,
    /// Numerator of the refractory ratio
    pub refractory_numerator: u32,
    /// Denominator of the refractory ratio, never 0
    pub refractory_denominator: u32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            baseline: BASELINE,
            initial_threshold: INITIAL_THRESHOLD,
            initial_interval_ms: INITIAL_INTERVAL_MS,
            min_beat_gap_ms: MIN_BEAT_GAP_MS,
            silence_timeout_ms: SILENCE_TIMEOUT_MS,
            refractory_numerator: REFRACTORY_NUMERATOR,
            refractory_denominator: REFRACTORY_DENOMINATOR,
        }
    }
}

impl Calibration {
    /// Part of the last interval during which the echo of a beat is ignored.
    /// Truncating integer division, as the comparison must be reproducible
    /// bit for bit: 600 ms gives 360 ms, 601 ms gives 360 ms as well.
    pub fn refractory_ms(&self, interval_ms: u32) -> u32 {
        interval_ms.saturating_mul(self.refractory_numerator) / self.refractory_denominator.max(1)
    }
}
