//! Adaptive-threshold heartbeat detection.
//!
//! The [`BeatDetector`] follows the envelope (peak and trough) of the
//! waveform, sets the beat threshold halfway between them after each beat,
//! and reports rising crossings as beats. Inter-beat intervals are smoothed
//! by the [`BpmEstimator`]. A long silence resets the whole session.
pub use self::bpm::{BpmEstimator, IntervalHistory, HISTORY_LEN};
pub use self::detector::{BeatDetector, DetectorState, SampleOutcome, WarmUp};

mod bpm;
mod detector;
mod session;
